// src/extract/rss.rs
use quick_xml::de::from_str;
use serde::Deserialize;

use super::{looks_like_html, normalize_text, trim_body};
use crate::error::FetchError;

/// Items kept per feed.
pub const MAX_ITEMS: usize = 25;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub pub_date: String,
    pub description: String,
}

pub fn extract(body: &str, max_items: usize) -> Result<Vec<FeedItem>, FetchError> {
    let t = trim_body(body);
    if looks_like_html(t) {
        return Err(FetchError::MalformedResponse(
            "html document where rss was expected".into(),
        ));
    }
    let xml_clean = scrub_html_entities_for_xml(t);
    let rss: Rss =
        from_str(&xml_clean).map_err(|e| FetchError::MalformedResponse(format!("rss: {e}")))?;

    let out = rss
        .channel
        .item
        .into_iter()
        .take(max_items)
        .map(|it| FeedItem {
            title: normalize_text(it.title.as_deref().unwrap_or_default()),
            link: it.link.unwrap_or_default().trim().to_string(),
            pub_date: it.pub_date.unwrap_or_default().trim().to_string(),
            description: normalize_text(it.description.as_deref().unwrap_or_default()),
        })
        .collect();
    Ok(out)
}

/// XML only knows five named entities; feeds routinely use HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&rupee;", "\u{20B9}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Markets</title>
    <item>
      <title><![CDATA[Sensex jumps 500 pts]]></title>
      <link>https://example.test/a</link>
      <pubDate>Mon, 22 Sep 2025 10:00:00 +0530</pubDate>
      <description>Banks lead&nbsp;the rally</description>
    </item>
    <item>
      <title>Rupee &ndash; flat</title>
      <link>https://example.test/b</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_with_cdata_and_html_entities() {
        let items = extract(FEED, MAX_ITEMS).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Sensex jumps 500 pts");
        assert_eq!(items[0].description, "Banks lead the rally");
        assert_eq!(items[1].title, "Rupee - flat");
        assert_eq!(items[1].pub_date, "");
    }

    #[test]
    fn respects_item_cap() {
        let items = extract(FEED, 1).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn html_page_is_not_a_feed() {
        let err = extract("<!DOCTYPE html><html><body>blocked</body></html>", 5).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[test]
    fn empty_channel_yields_no_items() {
        let xml = r#"<rss><channel><title>x</title></channel></rss>"#;
        assert!(extract(xml, 5).unwrap().is_empty());
    }
}

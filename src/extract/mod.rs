// src/extract/mod.rs
//! Body extraction, one submodule per source kind.
//!
//! Extraction only turns a raw HTTP body into a structured intermediate
//! (`RawPayload`). Turning that into records is the mapper's job, so the
//! chain/cache logic never needs to know which format won.

pub mod html_table;
pub mod json;
pub mod rss;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::error::FetchError;
use crate::source::SourceKind;

pub use html_table::Table;
pub use rss::FeedItem;

/// Structured intermediate handed to a `ResponseMapper`.
#[derive(Debug, Clone)]
pub enum RawPayload {
    Json(serde_json::Value),
    Tables(Vec<Table>),
    Feed(Vec<FeedItem>),
}

impl RawPayload {
    pub fn kind(&self) -> SourceKind {
        match self {
            RawPayload::Json(_) => SourceKind::Json,
            RawPayload::Tables(_) => SourceKind::HtmlTable,
            RawPayload::Feed(_) => SourceKind::Rss,
        }
    }
}

/// Dispatch on the descriptor kind.
pub fn extract(kind: SourceKind, body: &str) -> Result<RawPayload, FetchError> {
    match kind {
        SourceKind::Json => json::extract(body).map(RawPayload::Json),
        SourceKind::HtmlTable => html_table::extract(body).map(RawPayload::Tables),
        SourceKind::Rss => rss::extract(body, rss::MAX_ITEMS).map(RawPayload::Feed),
    }
}

/// Strip BOM and surrounding whitespace.
pub(crate) fn trim_body(body: &str) -> &str {
    body.trim_start_matches('\u{FEFF}').trim()
}

/// True when the body is an HTML document rather than data.
pub fn looks_like_html(body: &str) -> bool {
    let head: String = trim_body(body)
        .chars()
        .take(64)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.starts_with("<head")
}

/// Visible characters at the top of a page inspected for block markers.
const BLOCK_SCAN_CHARS: usize = 400;

/// Anti-bot interstitials and access-denied pages served with a 200.
///
/// Only the `<title>` and the leading visible text are inspected: data pages
/// routinely load captcha scripts or carry "access denied" in footers.
pub fn is_block_page(body: &str) -> bool {
    static RE_BLOCK: OnceCell<Regex> = OnceCell::new();
    static RE_TITLE: OnceCell<Regex> = OnceCell::new();
    static RE_HIDDEN: OnceCell<Regex> = OnceCell::new();
    let re = RE_BLOCK.get_or_init(|| {
        Regex::new(
            r"(?i)(captcha|access denied|attention required|cf-challenge|are you a robot|request blocked|unusual traffic)",
        )
        .expect("block page regex")
    });
    let re_title =
        RE_TITLE.get_or_init(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").expect("title regex"));
    let re_hidden = RE_HIDDEN.get_or_init(|| {
        Regex::new(r"(?is)<(?:script|style|noscript|head)\b[^>]*>.*?</(?:script|style|noscript|head)>")
            .expect("hidden block regex")
    });

    if re_title
        .captures(body)
        .is_some_and(|t| re.is_match(&t[1]))
    {
        return true;
    }
    let visible = re_hidden.replace_all(body, " ");
    let lead: String = normalize_text(&visible)
        .chars()
        .take(BLOCK_SCAN_CHARS)
        .collect();
    re.is_match(&lead)
}

/// Normalize scraped text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <b>RELIANCE</b>&nbsp;&nbsp;Industries  ";
        assert_eq!(normalize_text(s), "RELIANCE Industries");
    }

    #[test]
    fn html_detection_ignores_case_and_bom() {
        assert!(looks_like_html("\u{FEFF}  <!DOCTYPE HTML><html>"));
        assert!(looks_like_html("<html lang=\"en\">"));
        assert!(!looks_like_html("{\"data\":[]}"));
        assert!(!looks_like_html("<?xml version=\"1.0\"?><rss>"));
    }

    #[test]
    fn block_page_markers() {
        assert!(is_block_page("<title>Attention Required! | Cloudflare</title>"));
        assert!(is_block_page("please solve the CAPTCHA"));
        assert!(!is_block_page("<table><tr><td>TCS</td></tr></table>"));
    }

    #[test]
    fn captcha_script_or_footer_is_not_a_block_page() {
        let page = format!(
            "<html><head><title>Top Gainers</title>\
             <script src=\"https://www.google.com/recaptcha/api.js\"></script></head>\
             <body><table><tr><th>Symbol</th></tr><tr><td>TCS</td></tr></table>{}\
             <footer>Access denied to archived reports</footer></body></html>",
            "<p>market commentary</p>".repeat(40)
        );
        assert!(!is_block_page(&page));
    }
}

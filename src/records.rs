// src/records.rs
//! Normalized record shapes served by the proxy.
//!
//! Wire names follow what downstream dashboards already consume
//! (`symbol`/`change`, `name`/`open`/`close`/`price`, `title`/`link`/`pubDate`).

use serde::{Deserialize, Serialize};

/// A gainer or loser row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mover {
    pub symbol: String,
    /// Percent change (or net change when that is all the upstream gives us).
    pub change: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipo {
    pub name: String,
    #[serde(default)]
    pub open: String,
    #[serde(default)]
    pub close: String,
    #[serde(default)]
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(rename = "pubDate", default)]
    pub pub_date: String,
}

/// One normalized record. Serialized without a tag so the HTTP payload is a
/// plain array of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Mover(Mover),
    Ipo(Ipo),
    News(NewsItem),
}

impl Record {
    pub fn shape(&self) -> RecordShape {
        match self {
            Record::Mover(_) => RecordShape::Mover,
            Record::Ipo(_) => RecordShape::Ipo,
            Record::News(_) => RecordShape::News,
        }
    }

    pub fn as_mover(&self) -> Option<&Mover> {
        match self {
            Record::Mover(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    Mover,
    Ipo,
    News,
}

/// Where a resolved payload came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    Live { source: String },
    Fallback,
}

/// Outcome of one resolution pass: never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub records: Vec<Record>,
    pub origin: Origin,
}

impl Resolved {
    pub fn live(source: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            records,
            origin: Origin::Live {
                source: source.into(),
            },
        }
    }

    pub fn fallback(records: Vec<Record>) -> Self {
        Self {
            records,
            origin: Origin::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, Origin::Fallback)
    }

    /// Source name for the `X-Data-Source` header.
    pub fn source_label(&self) -> &str {
        match &self.origin {
            Origin::Live { source } => source,
            Origin::Fallback => "fallback",
        }
    }
}

/// Parse numbers the way upstreams like to send them: `-3.2`, `"-3.20"`,
/// `"+1.00%"`, `"1,234.5"`.
pub fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '%' | '+' | ' ' | '\u{20B9}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

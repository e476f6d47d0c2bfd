// src/category.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::records::{Ipo, Mover, NewsItem, Record, RecordShape};

/// Kinds of market data the proxy resolves through a source chain.
/// Picks are derived from gainers/losers and are not a category of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Ipos,
    Gainers,
    Losers,
    News,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Ipos,
        Category::Gainers,
        Category::Losers,
        Category::News,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ipos => "ipos",
            Category::Gainers => "gainers",
            Category::Losers => "losers",
            Category::News => "news",
        }
    }

    /// Record shape every payload of this category must have.
    pub fn shape(&self) -> RecordShape {
        match self {
            Category::Ipos => RecordShape::Ipo,
            Category::Gainers | Category::Losers => RecordShape::Mover,
            Category::News => RecordShape::News,
        }
    }

    /// Gainers/losers move fast, IPO calendars barely move.
    pub fn default_ttl(&self) -> Duration {
        match self {
            Category::Ipos => Duration::from_secs(300),
            Category::Gainers | Category::Losers => Duration::from_secs(45),
            Category::News => Duration::from_secs(180),
        }
    }

    /// Placeholder payload served when the whole chain fails.
    pub fn default_fallback(&self) -> Vec<Record> {
        match self {
            Category::Ipos => vec![Record::Ipo(Ipo {
                name: "Fallback IPO".into(),
                open: "2025-09-20".into(),
                close: "2025-09-25".into(),
                price: "\u{20B9}100-\u{20B9}120".into(),
            })],
            Category::Gainers => vec![Record::Mover(Mover {
                symbol: "Fallback Gainer".into(),
                change: 1.0,
                last_price: None,
            })],
            Category::Losers => vec![Record::Mover(Mover {
                symbol: "Fallback Loser".into(),
                change: -1.0,
                last_price: None,
            })],
            Category::News => vec![Record::News(NewsItem {
                title: "No live news".into(),
                link: String::new(),
                pub_date: chrono::Utc::now().to_rfc3339(),
            })],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ipos" | "ipo" => Ok(Category::Ipos),
            "gainers" => Ok(Category::Gainers),
            "losers" | "loosers" => Ok(Category::Losers),
            "news" => Ok(Category::News),
            other => Err(anyhow::anyhow!("unknown category '{other}'")),
        }
    }
}

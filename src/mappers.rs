// src/mappers.rs
//! Built-in response mappers, selectable by name from configuration.
//!
//! Upstreams disagree on field names, so every JSON mapper walks a short list
//! of known aliases. Rows missing a required field are skipped rather than
//! half-filled.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::FetchError;
use crate::extract::json::{find_array, num_field, str_field};
use crate::extract::{RawPayload, Table};
use crate::records::{parse_number, Ipo, Mover, NewsItem, Record, RecordShape};
use crate::source::{ResponseMapper, SourceKind};

const SYMBOL_KEYS: &[&str] = &["symbol", "metaSymbol", "symbolName", "name"];
const CHANGE_KEYS: &[&str] = &["perChange", "pChange", "netPrice", "net_price", "change"];
const LAST_PRICE_KEYS: &[&str] = &["ltp", "lastPrice", "last_price", "price"];

const IPO_NAME_KEYS: &[&str] = &["companyName", "name", "company", "title", "symbol"];
const IPO_OPEN_KEYS: &[&str] = &["openDate", "issueStartDate", "startDate", "open"];
const IPO_CLOSE_KEYS: &[&str] = &["closeDate", "issueEndDate", "endDate", "close"];
const IPO_PRICE_KEYS: &[&str] = &["priceBand", "price", "issuePrice", "priceBandString"];

/// Mapper names accepted in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapperName {
    Movers,
    Ipos,
    MoversTable,
    IposTable,
    News,
}

impl MapperName {
    pub fn build(self) -> Arc<dyn ResponseMapper> {
        match self {
            MapperName::Movers => Arc::new(MoversJson),
            MapperName::Ipos => Arc::new(IposJson),
            MapperName::MoversTable => Arc::new(MoversTable),
            MapperName::IposTable => Arc::new(IposTable),
            MapperName::News => Arc::new(NewsRss),
        }
    }

    pub fn shape(self) -> RecordShape {
        match self {
            MapperName::Movers | MapperName::MoversTable => RecordShape::Mover,
            MapperName::Ipos | MapperName::IposTable => RecordShape::Ipo,
            MapperName::News => RecordShape::News,
        }
    }
}

fn wrong_kind(expected: SourceKind, raw: &RawPayload) -> FetchError {
    FetchError::MalformedResponse(format!(
        "mapper expects {:?} payload, got {:?}",
        expected,
        raw.kind()
    ))
}

/// Gainers/losers from exchange or vendor JSON.
pub struct MoversJson;

impl MoversJson {
    /// Row array in any of the shapes seen in the wild: a bare array,
    /// `data`/`all`, or NSE's index-keyed objects (`{"allSec": {"data": [...]}, ...}`).
    fn rows(v: &Value) -> Option<&Vec<Value>> {
        if let Some(arr) = find_array(v, &["data", "all"]) {
            return Some(arr);
        }
        let obj = v.as_object()?;
        if let Some(arr) = obj.get("allSec").and_then(|s| s.get("data")).and_then(Value::as_array) {
            return Some(arr);
        }
        obj.values()
            .filter_map(|inner| inner.get("data").and_then(Value::as_array))
            .find(|arr| !arr.is_empty())
    }
}

impl ResponseMapper for MoversJson {
    fn map(&self, raw: &RawPayload) -> Result<Vec<Record>, FetchError> {
        let RawPayload::Json(v) = raw else {
            return Err(wrong_kind(SourceKind::Json, raw));
        };
        let Some(rows) = Self::rows(v) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter_map(|row| {
                let symbol = str_field(row, SYMBOL_KEYS)?;
                let change = num_field(row, CHANGE_KEYS)?;
                Some(Record::Mover(Mover {
                    symbol,
                    change,
                    last_price: num_field(row, LAST_PRICE_KEYS),
                }))
            })
            .collect())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Json
    }

    fn name(&self) -> &'static str {
        "movers"
    }
}

/// IPO calendars from exchange or vendor JSON.
pub struct IposJson;

impl ResponseMapper for IposJson {
    fn map(&self, raw: &RawPayload) -> Result<Vec<Record>, FetchError> {
        let RawPayload::Json(v) = raw else {
            return Err(wrong_kind(SourceKind::Json, raw));
        };
        let Some(rows) = find_array(v, &["data", "all"]) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = str_field(row, IPO_NAME_KEYS)?;
                Some(Record::Ipo(Ipo {
                    name,
                    open: str_field(row, IPO_OPEN_KEYS).unwrap_or_default(),
                    close: str_field(row, IPO_CLOSE_KEYS).unwrap_or_default(),
                    price: str_field(row, IPO_PRICE_KEYS).unwrap_or_default(),
                }))
            })
            .collect())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Json
    }

    fn name(&self) -> &'static str {
        "ipos"
    }
}

fn cell(row: &[String], idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| row.get(i))
        .map(String::as_str)
        .filter(|s| !s.is_empty())
}

/// Gainers/losers scraped from a rendered HTML table.
pub struct MoversTable;

impl MoversTable {
    fn map_table(t: &Table) -> Vec<Record> {
        let sym = t.column(&["symbol", "company", "stock", "name"]);
        let chg = t.column(&["% chg", "%chg", "change %", "% change", "chg", "change"]);
        let ltp = t.column(&["ltp", "last price", "price"]);
        if sym.is_none() || chg.is_none() {
            return Vec::new();
        }
        t.rows
            .iter()
            .filter_map(|row| {
                let symbol = cell(row, sym)?.to_string();
                let change = parse_number(cell(row, chg)?)?;
                Some(Record::Mover(Mover {
                    symbol,
                    change,
                    last_price: cell(row, ltp).and_then(parse_number),
                }))
            })
            .collect()
    }
}

impl ResponseMapper for MoversTable {
    fn map(&self, raw: &RawPayload) -> Result<Vec<Record>, FetchError> {
        let RawPayload::Tables(tables) = raw else {
            return Err(wrong_kind(SourceKind::HtmlTable, raw));
        };
        Ok(tables
            .iter()
            .map(Self::map_table)
            .find(|recs| !recs.is_empty())
            .unwrap_or_default())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::HtmlTable
    }

    fn name(&self) -> &'static str {
        "movers_table"
    }
}

/// IPO calendar scraped from a rendered HTML table.
pub struct IposTable;

impl IposTable {
    fn map_table(t: &Table) -> Vec<Record> {
        let name = t.column(&["company", "issuer", "ipo", "name"]);
        let open = t.column(&["open", "start"]);
        let close = t.column(&["close", "end"]);
        let price = t.column(&["price band", "price"]);
        if name.is_none() {
            return Vec::new();
        }
        t.rows
            .iter()
            .filter_map(|row| {
                Some(Record::Ipo(Ipo {
                    name: cell(row, name)?.to_string(),
                    open: cell(row, open).unwrap_or_default().to_string(),
                    close: cell(row, close).unwrap_or_default().to_string(),
                    price: cell(row, price).unwrap_or_default().to_string(),
                }))
            })
            .collect()
    }
}

impl ResponseMapper for IposTable {
    fn map(&self, raw: &RawPayload) -> Result<Vec<Record>, FetchError> {
        let RawPayload::Tables(tables) = raw else {
            return Err(wrong_kind(SourceKind::HtmlTable, raw));
        };
        Ok(tables
            .iter()
            .map(Self::map_table)
            .find(|recs| !recs.is_empty())
            .unwrap_or_default())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::HtmlTable
    }

    fn name(&self) -> &'static str {
        "ipos_table"
    }
}

/// Market headlines from an RSS feed.
pub struct NewsRss;

impl ResponseMapper for NewsRss {
    fn map(&self, raw: &RawPayload) -> Result<Vec<Record>, FetchError> {
        let RawPayload::Feed(items) = raw else {
            return Err(wrong_kind(SourceKind::Rss, raw));
        };
        Ok(items
            .iter()
            .filter(|it| !it.title.is_empty())
            .map(|it| {
                Record::News(NewsItem {
                    title: it.title.clone(),
                    link: it.link.clone(),
                    pub_date: it.pub_date.clone(),
                })
            })
            .collect())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Rss
    }

    fn name(&self) -> &'static str {
        "news"
    }
}

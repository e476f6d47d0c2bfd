// src/extract/html_table.rs
//! Regex-based `<table>` scraper. Good enough for the server-rendered
//! market tables we scrape; not a general HTML parser.

use once_cell::sync::OnceCell;
use regex::Regex;

use super::{is_block_page, normalize_text};
use crate::error::FetchError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Lower-cased header labels (from `<th>` or the first row).
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Index of the first header containing any of `needles`.
    pub fn column(&self, needles: &[&str]) -> Option<usize> {
        needles
            .iter()
            .find_map(|n| self.headers.iter().position(|h| h.contains(n)))
    }
}

fn re(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("table regex"))
}

pub fn extract(body: &str) -> Result<Vec<Table>, FetchError> {
    static RE_TABLE: OnceCell<Regex> = OnceCell::new();
    static RE_ROW: OnceCell<Regex> = OnceCell::new();
    static RE_CELL: OnceCell<Regex> = OnceCell::new();
    let re_table = re(&RE_TABLE, r"(?is)<table\b[^>]*>(.*?)</table>");
    let re_row = re(&RE_ROW, r"(?is)<tr\b[^>]*>(.*?)</tr>");
    let re_cell = re(&RE_CELL, r"(?is)<(t[hd])\b[^>]*>(.*?)</t[hd]>");

    let mut tables = Vec::new();
    for t in re_table.captures_iter(body) {
        let inner = &t[1];
        let mut table = Table::default();
        for r in re_row.captures_iter(inner) {
            let mut is_header = true;
            let mut cells = Vec::new();
            for c in re_cell.captures_iter(&r[1]) {
                if c[1].eq_ignore_ascii_case("td") {
                    is_header = false;
                }
                cells.push(normalize_text(&c[2]));
            }
            if cells.is_empty() {
                continue;
            }
            if table.headers.is_empty() && (is_header || table.rows.is_empty()) {
                table.headers = cells.into_iter().map(|h| h.to_lowercase()).collect();
            } else {
                table.rows.push(cells);
            }
        }
        if !table.headers.is_empty() || !table.rows.is_empty() {
            tables.push(table);
        }
    }

    // 200 with a captcha instead of data is still a rejection
    if tables.iter().all(|t| t.rows.is_empty()) && is_block_page(body) {
        return Err(FetchError::UpstreamRejection { status: 403 });
    }
    if tables.is_empty() {
        return Err(FetchError::MalformedResponse("no <table> found".into()));
    }
    Ok(tables)
}

// src/picks.rs
//! Derived long/short picks from the current top gainer and top loser.

use serde::{Deserialize, Serialize};

use crate::records::Resolved;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickKind {
    Long,
    Short,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    #[serde(rename = "type")]
    pub kind: PickKind,
    pub stock: String,
    pub reason: String,
}

impl Pick {
    pub fn placeholder() -> Self {
        Self {
            kind: PickKind::Long,
            stock: "Fallback Pick".into(),
            reason: "No live data".into(),
        }
    }
}

/// Long the top gainer, short the top loser. Either side being placeholder
/// data collapses the whole answer to a single placeholder pick.
pub fn derive(gainers: &Resolved, losers: &Resolved) -> Vec<Pick> {
    if gainers.is_fallback() || losers.is_fallback() {
        return vec![Pick::placeholder()];
    }
    let top = |r: &Resolved| {
        r.records
            .first()
            .and_then(|rec| rec.as_mover())
            .map(|m| m.symbol.clone())
    };
    match (top(gainers), top(losers)) {
        (Some(long), Some(short)) => vec![
            Pick {
                kind: PickKind::Long,
                stock: long,
                reason: "Top gainer stock".into(),
            },
            Pick {
                kind: PickKind::Short,
                stock: short,
                reason: "Top loser stock".into(),
            },
        ],
        _ => vec![Pick::placeholder()],
    }
}

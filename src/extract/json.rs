// src/extract/json.rs
use serde_json::Value;

use super::{looks_like_html, trim_body};
use crate::error::FetchError;

/// Accept a body as JSON only if it is not an HTML page, starts like JSON,
/// and actually parses.
pub fn extract(body: &str) -> Result<Value, FetchError> {
    let t = trim_body(body);
    if t.is_empty() {
        return Err(FetchError::MalformedResponse("empty body".into()));
    }
    if t.starts_with('<') || looks_like_html(t) {
        return Err(FetchError::MalformedResponse(
            "html document where json was expected".into(),
        ));
    }
    if !(t.starts_with('{') || t.starts_with('[')) {
        return Err(FetchError::MalformedResponse(
            "body does not start with '{' or '['".into(),
        ));
    }
    serde_json::from_str(t).map_err(|e| FetchError::MalformedResponse(format!("json: {e}")))
}

/// First array found at the root or under one of `keys`.
pub fn find_array<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    if let Some(arr) = v.as_array() {
        return Some(arr);
    }
    keys.iter().find_map(|k| v.get(*k).and_then(Value::as_array))
}

/// First non-empty string (or number rendered as string) under any of `keys`.
pub fn str_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// First numeric value under any of `keys`, accepting numeric strings.
pub fn num_field(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => crate::records::parse_number(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doctype_is_rejected_even_if_braces_follow() {
        let body = "<!DOCTYPE html><html><body>{\"blocked\": true}</body></html>";
        assert!(matches!(
            extract(body),
            Err(FetchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn plain_text_and_broken_json_are_malformed() {
        assert!(extract("Service Unavailable").is_err());
        assert!(extract("{\"data\": [").is_err());
        assert!(extract("   ").is_err());
    }

    #[test]
    fn valid_json_with_bom_parses() {
        let v = extract("\u{FEFF} [1,2,3] ").unwrap();
        assert_eq!(v, json!([1, 2, 3]));
    }

    #[test]
    fn field_helpers_fall_through_keys() {
        let o = json!({"name": "", "company": "Acme", "pChange": "-2.5"});
        assert_eq!(str_field(&o, &["name", "company"]), Some("Acme".into()));
        assert_eq!(num_field(&o, &["perChange", "pChange"]), Some(-2.5));
        assert_eq!(num_field(&o, &["missing"]), None);
    }
}

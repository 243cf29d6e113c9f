//! Tolerant parsing of model output.
//!
//! Even well-prompted models wrap JSON in ```` ```json ```` fences, prepend
//! a sentence, translate enum tokens or quote numbers. Parsing here is
//! deliberately forgiving at the envelope level and strict per item:
//!
//! 1. strip an outer code fence (closing fence optional);
//! 2. cut from the first `{` to the last `}`;
//! 3. parse `{"items": [...]}`; anything else is a malformed response;
//! 4. validate each item on its own; a bad item is skipped, not fatal.

use crate::error::AnalystError;
use crate::model::{ExtractedItem, Side, Unit};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

static RE_OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n").unwrap());

static RE_CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*```").unwrap());

static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"--- PAGE (\d+) ---").unwrap());

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    let Some(opening) = RE_OPENING_FENCE.find(trimmed) else {
        return trimmed;
    };
    let body = &trimmed[opening.end()..];
    match RE_CLOSING_FENCE.find(body) {
        Some(closing) => &body[..closing.start()],
        None => body,
    }
}

/// The substring from the first `{` to the last `}`, if both exist in order.
pub fn json_object_span(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| &input[start..=end])
}

/// First `--- PAGE n ---` marker in a section text.
pub fn first_page_marker(text: &str) -> Option<usize> {
    RE_PAGE_MARKER
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// Parse an extraction response into items.
///
/// `default_page` is used for items without a usable `pageNumber`.
pub fn parse_extraction(raw: &str, default_page: usize) -> Result<Vec<ExtractedItem>, AnalystError> {
    let body = strip_code_fence(raw);
    let json = json_object_span(body).ok_or_else(|| malformed("no JSON object in response"))?;

    let envelope: Value =
        serde_json::from_str(json).map_err(|e| malformed(&format!("invalid JSON: {e}")))?;
    let entries = envelope
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing \"items\" array"))?;

    let mut items = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match parse_item(entry, default_page) {
            Ok(item) => items.push(item),
            Err(reason) => warn!("Skipping extracted item {}: {}", i, reason),
        }
    }
    debug!("Parsed {}/{} extracted items", items.len(), entries.len());
    Ok(items)
}

fn parse_item(entry: &Value, default_page: usize) -> Result<ExtractedItem, String> {
    let obj = entry.as_object().ok_or("not an object")?;

    let side_token = obj.get("side").and_then(Value::as_str).unwrap_or_default();
    let side = Side::from_token(side_token).ok_or_else(|| format!("invalid side {side_token:?}"))?;

    let description = obj
        .get("descriptionOriginal")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or("missing descriptionOriginal")?
        .to_string();

    let unit = obj
        .get("unit")
        .and_then(Value::as_str)
        .map(Unit::from_token)
        .unwrap_or_default();

    let page_number = obj
        .get("pageNumber")
        .and_then(page_from_value)
        .unwrap_or(default_page);

    let evidence_text = obj
        .get("evidenceText")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ExtractedItem {
        side,
        description,
        value: obj.get("value").and_then(number_from_value),
        unit,
        page_number,
        evidence_text,
    })
}

/// A JSON number, or a string holding one. Portuguese decimal commas and
/// thousands separators (spaces, dots before a comma) are accepted.
fn number_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let compact: String = s
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if compact.is_empty() {
        return None;
    }
    if let Ok(v) = compact.parse::<f64>() {
        return v.is_finite().then_some(v);
    }
    // "1.234,5" → "1234.5"
    let normalised = if compact.contains(',') {
        compact.replace('.', "").replace(',', ".")
    } else {
        compact
    };
    normalised.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn page_from_value(v: &Value) -> Option<usize> {
    let n = match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    usize::try_from(n).ok().filter(|&n| n > 0)
}

fn malformed(detail: &str) -> AnalystError {
    AnalystError::MalformedResponse {
        operation: "extract".into(),
        detail: detail.to_string(),
    }
}

//! Turns the collaborator's free-form reply into a total line replacement map.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{TailorError, TailorResult};
use crate::ir::{LineReplacementMap, LogicalLine, ReplacementRecord};
use crate::textutil::{normalize_for_match, truncate_at_word_boundary};

/// Field names accepted for the record array, first match wins.
const RECORD_ARRAY_FIELDS: &[&str] = &["replacements", "lines", "tailoredLines"];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LengthPolicy {
    /// Replacements longer than `trigger_ratio` x original are truncated...
    pub trigger_ratio: f64,
    /// ...to at most `truncate_ratio` x original characters.
    pub truncate_ratio: f64,
}

impl Default for LengthPolicy {
    fn default() -> Self {
        Self {
            trigger_ratio: 1.8,
            truncate_ratio: 1.5,
        }
    }
}

impl LengthPolicy {
    pub fn normalize(&self, original: &str, replacement: &str) -> String {
        let orig_len = original.chars().count();
        let new_len = replacement.chars().count();
        if orig_len == 0 || (new_len as f64) <= (orig_len as f64) * self.trigger_ratio {
            return replacement.to_string();
        }
        let max_chars = ((orig_len as f64) * self.truncate_ratio).floor() as usize;
        truncate_at_word_boundary(replacement, max_chars)
    }
}

#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub map: LineReplacementMap,
    pub bound_by_index: usize,
    pub bound_by_content: usize,
    pub skipped: usize,
    pub truncated: usize,
}

/// Finds the first balanced `{...}` span that parses as a JSON object.
pub fn locate_json_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(off) = text[from..].find('{') {
        let start = from + off;
        if let Some(end) = balanced_end(bytes, start) {
            if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Some(v);
            }
        }
        from = start + 1;
    }
    None
}

/// Index of the `}` closing the brace at `start`, skipping braces inside strings.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parsed records plus the number of array elements that were not record-shaped.
pub fn parse_records(raw: &str) -> TailorResult<(Vec<ReplacementRecord>, usize)> {
    let obj = locate_json_object(raw).ok_or_else(|| {
        TailorError::InvalidAiResponse("no JSON object found in response".to_string())
    })?;
    let arr = RECORD_ARRAY_FIELDS
        .iter()
        .find_map(|k| obj.get(*k))
        .ok_or_else(|| {
            TailorError::InvalidAiResponse("response has no replacements array".to_string())
        })?
        .as_array()
        .ok_or_else(|| {
            TailorError::InvalidAiResponse("replacements field is not an array".to_string())
        })?;

    let mut records = Vec::with_capacity(arr.len());
    let mut malformed = 0usize;
    for (n, item) in arr.iter().enumerate() {
        match serde_json::from_value::<ReplacementRecord>(item.clone()) {
            Ok(r) => records.push(r),
            Err(e) => {
                debug!(record = n, error = %e, "skipping malformed replacement record");
                malformed += 1;
            }
        }
    }
    Ok((records, malformed))
}

/// Binds records to lines: a valid `lineIndex` always wins (later records overwrite
/// earlier ones); otherwise the first unbound line whose normalized text equals or
/// contains (or is contained in) the record's `originalLine` is used. Lines left unbound
/// keep their own text, so the map is total whatever the collaborator returned.
pub fn reconcile(
    lines: &[LogicalLine],
    records: &[ReplacementRecord],
    policy: &LengthPolicy,
) -> Reconciliation {
    let normalized: Vec<String> = lines.iter().map(|l| normalize_for_match(&l.text)).collect();
    let mut bound: Vec<Option<String>> = vec![None; lines.len()];
    let mut bound_by_index = 0usize;
    let mut bound_by_content = 0usize;
    let mut skipped = 0usize;

    for rec in records {
        if rec.opted_out() {
            skipped += 1;
            continue;
        }
        let original = rec.original_line.as_deref().map(str::trim).unwrap_or("");
        let tailored = rec.tailored_line.as_deref().map(str::trim).unwrap_or("");
        if original.is_empty() || tailored.is_empty() {
            skipped += 1;
            continue;
        }

        if let Some(idx) = rec.index_hint().filter(|&i| i < lines.len()) {
            bound[idx] = Some(tailored.to_string());
            bound_by_index += 1;
            continue;
        }

        let needle = normalize_for_match(original);
        let hit = (0..lines.len()).find(|&i| {
            let hay = normalized[i].as_str();
            bound[i].is_none()
                && (hay == needle || hay.contains(needle.as_str()) || needle.contains(hay))
        });
        match hit {
            Some(idx) => {
                bound[idx] = Some(tailored.to_string());
                bound_by_content += 1;
            }
            None => {
                debug!(original = %original, "replacement matched no line");
                skipped += 1;
            }
        }
    }

    let mut map = LineReplacementMap::identity(lines);
    let mut truncated = 0usize;
    for (line, text) in lines.iter().zip(bound) {
        let Some(text) = text else {
            continue;
        };
        let normalized_text = policy.normalize(&line.text, &text);
        if normalized_text != text {
            truncated += 1;
        }
        map.set(line.index, normalized_text);
    }

    Reconciliation {
        map,
        bound_by_index,
        bound_by_content,
        skipped,
        truncated,
    }
}

/// Parses and reconciles a full batch response.
pub fn reconcile_response(
    lines: &[LogicalLine],
    raw: &str,
    policy: &LengthPolicy,
) -> TailorResult<Reconciliation> {
    let (records, malformed) = parse_records(raw)?;
    if records.is_empty() {
        warn!("collaborator returned no usable replacement records");
    }
    let mut rec = reconcile(lines, &records, policy);
    rec.skipped += malformed;
    Ok(rec)
}

/// Parses a single-line rewrite (`{"tailoredLine": "..."}`) and applies the length policy.
pub fn parse_single_rewrite(
    original: &str,
    raw: &str,
    policy: &LengthPolicy,
) -> TailorResult<String> {
    let obj = locate_json_object(raw).ok_or_else(|| {
        TailorError::InvalidAiResponse("no JSON object found in response".to_string())
    })?;
    let text = obj
        .get("tailoredLine")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            TailorError::InvalidAiResponse("response has no tailoredLine".to_string())
        })?;
    Ok(policy.normalize(original, text))
}

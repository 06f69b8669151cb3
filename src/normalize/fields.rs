//! Per-field parsing for raw source values. Nothing here fails loudly: bad
//! input comes back as `None` or a default for the caller to judge.

use serde_json::Value;

use crate::config::ImportRules;

/// Keeps only the digits of a raw course number: `"111H"` -> 111.
/// Returns `None` when nothing numeric remains or the result is zero.
pub fn course_number(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

/// Parses a percentage. Missing markers and anything non-numeric read as 0.0.
pub fn percent(raw: &str, rules: &ImportRules) -> f64 {
    let raw = raw.trim();
    if rules.is_missing(raw) {
        return 0.0;
    }
    match raw.parse::<f64>() {
        Ok(p) if p.is_finite() => p,
        _ => 0.0,
    }
}

/// Parses a student count; blank means zero, anything else non-numeric is
/// rejected.
pub fn total_students(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    raw.parse::<u32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|n| n.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(n))
            .map(|n| n as u32)
    })
}

/// Splits `"MATH111"` into `("MATH", "111")`: the leading non-digit run is
/// the subject, the remainder the raw number.
pub fn split_course_id(course_id: &str) -> (&str, &str) {
    let course_id = course_id.trim();
    let at = course_id
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(course_id.len());
    (course_id[..at].trim(), &course_id[at..])
}

/// Text form of a JSON scalar so every source shares one parse path.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

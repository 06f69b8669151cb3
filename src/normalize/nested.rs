//! Nested export keyed by course id, as published in `gradedata.js`:
//!
//! ```text
//! var groups = {
//!   "MATH111": [
//!     {"TERM_DESC": "Fall 2014", "aprec": "85.0", "dprec": "3.0",
//!      "fprec": "2.0", "instructor": "Doe, Jane", "TOT_NON_W": 30}
//!   ]
//! };
//! ```
//!
//! The `var name =` prefix and trailing semicolon are optional. Values may
//! be JSON strings or numbers.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ImportError;
use crate::normalize::fields::{split_course_id, value_text};
use crate::normalize::{RawOffering, SkipReason, SourceRow, TermSource};

#[derive(Debug, Deserialize)]
struct NestedEntry {
    #[serde(rename = "TERM_DESC")]
    term_desc: String,
    #[serde(default, rename = "TERM")]
    term: Value,
    #[serde(default)]
    instructor: String,
    #[serde(default)]
    aprec: Value,
    #[serde(default)]
    dprec: Value,
    #[serde(default)]
    fprec: Value,
    #[serde(default, rename = "TOT_NON_W")]
    total: Value,
    #[serde(default, alias = "crn", alias = "record_ref")]
    reference: Value,
}

/// Strips a JavaScript `var x = ...;` wrapper, leaving the JSON body.
pub fn strip_script(text: &str) -> &str {
    let text = text.trim().trim_start_matches('\u{feff}');
    let body = match text.strip_prefix("var ") {
        Some(rest) => rest.split_once('=').map_or(rest, |(_, body)| body),
        None => text,
    };
    body.trim().trim_end_matches(';').trim_end()
}

pub fn read(bytes: &[u8]) -> Result<Vec<SourceRow>, ImportError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let body = strip_script(text);
    if body.is_empty() {
        return Err(ImportError::Empty);
    }

    let groups: Map<String, Value> = serde_json::from_str(body)?;
    let mut rows = Vec::new();

    for (course_id, entries) in groups {
        let (subject, number) = split_course_id(&course_id);

        let Value::Array(entries) = entries else {
            warn!(%course_id, "Course entry is not a list");
            rows.push(SourceRow {
                location: course_id.clone(),
                parsed: Err(SkipReason::MalformedRow),
            });
            continue;
        };

        for (idx, entry) in entries.into_iter().enumerate() {
            let mut location = format!("{course_id}[{idx}]");
            let parsed = match serde_json::from_value::<NestedEntry>(entry) {
                Ok(entry) => {
                    if !entry.reference.is_null() {
                        location = format!("{location} ({})", value_text(&entry.reference));
                    }
                    let term = match value_text(&entry.term) {
                        code if code.trim().is_empty() => TermSource::Label,
                        code => TermSource::Code(code),
                    };
                    Ok(RawOffering {
                        term,
                        term_label: entry.term_desc,
                        subject: subject.to_string(),
                        course_number: number.to_string(),
                        instructor: entry.instructor,
                        percent_a: value_text(&entry.aprec),
                        percent_d: value_text(&entry.dprec),
                        percent_f: value_text(&entry.fprec),
                        total: value_text(&entry.total),
                    })
                }
                Err(e) => {
                    warn!(%location, error = %e, "Malformed entry");
                    Err(SkipReason::MalformedRow)
                }
            };
            rows.push(SourceRow { location, parsed });
        }
    }

    Ok(rows)
}

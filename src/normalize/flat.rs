//! Pre-normalized flat list shaped like stored grade records.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::ImportError;
use crate::normalize::fields::{split_course_id, value_text};
use crate::normalize::{RawOffering, SkipReason, SourceRow, TermSource};

#[derive(Debug, Deserialize)]
struct FlatEntry {
    #[serde(default)]
    course_id: Option<String>,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    number: Value,
    #[serde(alias = "instructor")]
    instructor_name: String,
    #[serde(default)]
    year: Value,
    #[serde(default)]
    term: String,
    #[serde(default)]
    percent_a: Value,
    #[serde(default)]
    percent_df: Value,
    #[serde(default)]
    percent_d: Value,
    #[serde(default)]
    percent_f: Value,
    #[serde(default)]
    total_students: Value,
}

impl FlatEntry {
    fn into_offering(self) -> RawOffering {
        let (subject, number) = match (&self.department, &self.course_id) {
            (Some(dept), _) => (dept.clone(), value_text(&self.number)),
            (None, Some(id)) => {
                let (subject, number) = split_course_id(id);
                let number = match &self.number {
                    Value::Null => number.to_string(),
                    n => value_text(n),
                };
                (subject.to_string(), number)
            }
            (None, None) => (String::new(), value_text(&self.number)),
        };

        // A combined D/F share stands in for D with F left at zero.
        let (percent_d, percent_f) = match &self.percent_df {
            Value::Null => (value_text(&self.percent_d), value_text(&self.percent_f)),
            df => (value_text(df), String::new()),
        };

        RawOffering {
            term: TermSource::AcademicYear(value_text(&self.year)),
            term_label: self.term,
            subject,
            course_number: number,
            instructor: self.instructor_name,
            percent_a: value_text(&self.percent_a),
            percent_d,
            percent_f,
            total: value_text(&self.total_students),
        }
    }
}

pub fn read(bytes: &[u8]) -> Result<Vec<SourceRow>, ImportError> {
    let entries: Vec<Value> = serde_json::from_slice(bytes)?;

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            let location = format!("entry {idx}");
            let parsed = serde_json::from_value::<FlatEntry>(entry)
                .map(FlatEntry::into_offering)
                .map_err(|e| {
                    warn!(%location, error = %e, "Malformed entry");
                    SkipReason::MalformedRow
                });
            SourceRow { location, parsed }
        })
        .collect())
}

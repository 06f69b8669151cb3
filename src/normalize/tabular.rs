//! Delimited tabular export: one offering per row.

use std::collections::HashMap;

use tracing::warn;

use crate::error::ImportError;
use crate::normalize::{RawOffering, SkipReason, SourceRow, TermSource};

pub const REQUIRED_COLUMNS: [&str; 9] = [
    "TERM",
    "TERM_DESC",
    "SUBJ",
    "NUMB",
    "INSTRUCTOR",
    "aprec",
    "dprec",
    "fprec",
    "TOT_NON_W",
];

/// Reads every data row. The header must carry all of [`REQUIRED_COLUMNS`];
/// extra columns are ignored. Rows are numbered as a spreadsheet would show
/// them, the header being row 1.
pub fn read(bytes: &[u8]) -> Result<Vec<SourceRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ImportError::Empty);
    }

    let positions: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(pos, name)| (name.trim_start_matches('\u{feff}').trim(), pos))
        .collect();

    let mut missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !positions.contains_key(*col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(ImportError::MissingColumns(missing));
    }
    let column = |name: &str| positions.get(name).copied().unwrap_or(usize::MAX);
    let [term, term_desc, subj, numb, instructor, aprec, dprec, fprec, total] =
        REQUIRED_COLUMNS.map(column);

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let location = format!("row {}", idx + 2);
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(%location, error = %e, "Unreadable row");
                rows.push(SourceRow {
                    location,
                    parsed: Err(SkipReason::MalformedRow),
                });
                continue;
            }
        };
        let field = |pos: usize| record.get(pos).unwrap_or_default().to_string();

        rows.push(SourceRow {
            location,
            parsed: Ok(RawOffering {
                term: TermSource::Code(field(term)),
                term_label: field(term_desc),
                subject: field(subj),
                course_number: field(numb),
                instructor: field(instructor),
                percent_a: field(aprec),
                percent_d: field(dprec),
                percent_f: field(fprec),
                total: field(total),
            }),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "TERM,TERM_DESC,SUBJ,NUMB,INSTRUCTOR,aprec,dprec,fprec,TOT_NON_W\n";

    #[test]
    fn test_reads_rows_with_line_numbers() {
        let text = format!(
            "{HEADER}201401,Fall 2014,MATH,111,\"Doe, Jane\",85.0,3.0,2.0,30\n\
             201402,Winter 2015,CIS,210,\"Lee, Ann\",50,5,5,12\n"
        );
        let rows = read(text.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].location, "row 3");
        let first = rows[0].parsed.as_ref().unwrap();
        assert_eq!(first.term, TermSource::Code("201401".into()));
        assert_eq!(first.instructor, "Doe, Jane");
        assert_eq!(first.percent_f, "2.0");
    }

    #[test]
    fn test_extra_and_reordered_columns() {
        let text = "NOTE,TOT_NON_W,fprec,dprec,aprec,INSTRUCTOR,NUMB,SUBJ,TERM_DESC,TERM\n\
                    x,30,2,3,85,\"Doe, Jane\",111,MATH,Fall 2014,201401\n";
        let rows = read(text.as_bytes()).unwrap();

        let row = rows[0].parsed.as_ref().unwrap();
        assert_eq!(row.subject, "MATH");
        assert_eq!(row.total, "30");
    }

    #[test]
    fn test_missing_columns_are_named() {
        let text = "TERM,TERM_DESC,SUBJ,NUMB,INSTRUCTOR,aprec\n201401,Fall 2014,MATH,111,x,1\n";

        match read(text.as_bytes()) {
            Err(ImportError::MissingColumns(cols)) => {
                assert_eq!(cols, ["TOT_NON_W", "dprec", "fprec"]);
            }
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_source() {
        assert!(matches!(read(b""), Err(ImportError::Empty)));
    }

    #[test]
    fn test_byte_order_mark_in_header() {
        let text = format!("\u{feff}{HEADER}201401,Fall 2014,MATH,111,x,1,0,0,3\n");
        assert_eq!(read(text.as_bytes()).unwrap().len(), 1);
    }

    #[test]
    fn test_short_row_reads_blank_fields() {
        let text = format!("{HEADER}201401,Fall 2014,MATH\n");
        let rows = read(text.as_bytes()).unwrap();

        let row = rows[0].parsed.as_ref().unwrap();
        assert_eq!(row.course_number, "");
        assert_eq!(row.total, "");
    }
}

//! Record Normalizer.
//!
//! Turns a raw grade export into canonical [`Course`] and
//! [`GradeDistribution`] records. Three source layouts are understood, each
//! with its own reader that yields [`SourceRow`]s; validation and field
//! conversion are shared. Bad rows are skipped and counted, never fatal. A
//! source that cannot be read at all fails before anything is written.

pub mod fields;
pub mod flat;
pub mod nested;
pub mod tabular;
pub mod term;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ImportRules;
use crate::error::ImportError;
use crate::records::{Course, GradeDistribution};
use crate::store::GradeStore;
use term::TermCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Delimited text with the fixed column set in [`tabular::REQUIRED_COLUMNS`].
    Tabular,
    /// Object keyed by course id, optionally wrapped in a `var x = ...;` script.
    Nested,
    /// JSON list of entries already shaped like stored grade records.
    Flat,
}

impl SourceFormat {
    /// Guesses the layout from the first non-blank character.
    pub fn detect(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(&bytes[..bytes.len().min(64)]);
        let text = text.trim_start_matches('\u{feff}').trim_start();

        if text.starts_with('[') {
            SourceFormat::Flat
        } else if text.starts_with('{') || text.starts_with("var ") {
            SourceFormat::Nested
        } else {
            SourceFormat::Tabular
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceFormat::Tabular => "tabular",
            SourceFormat::Nested => "nested",
            SourceFormat::Flat => "flat",
        };
        f.write_str(name)
    }
}

/// Why a row was left out of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InvalidTerm,
    InvalidCourseNumber,
    AllZeroPercentages,
    PercentOutOfRange,
    InvalidTotal,
    MalformedRow,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::InvalidTerm => "invalid term",
            SkipReason::InvalidCourseNumber => "invalid course number",
            SkipReason::AllZeroPercentages => "all percentages zero",
            SkipReason::PercentOutOfRange => "percentage outside 0-100",
            SkipReason::InvalidTotal => "non-numeric student total",
            SkipReason::MalformedRow => "malformed row",
        };
        f.write_str(text)
    }
}

/// Where a row's academic year comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermSource {
    /// Six-digit `YYYYQQ` code.
    Code(String),
    /// Only the human label (`"Winter 2015"`) is available.
    Label,
    /// Already an academic year.
    AcademicYear(String),
}

/// One offering as read from a source, every value still text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOffering {
    pub term: TermSource,
    pub term_label: String,
    pub subject: String,
    pub course_number: String,
    pub instructor: String,
    pub percent_a: String,
    pub percent_d: String,
    pub percent_f: String,
    pub total: String,
}

/// A reader's output for one row; `location` is only used in log lines.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub location: String,
    pub parsed: Result<RawOffering, SkipReason>,
}

/// Canonical records produced from one source, plus the bookkeeping needed
/// for the end-of-run summary.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub format: SourceFormat,
    /// One per distinct course id, in course id order.
    pub courses: Vec<Course>,
    pub grades: Vec<GradeDistribution>,
    pub rows_seen: usize,
    pub skipped_by_reason: BTreeMap<SkipReason, usize>,
    /// Accepted rows per academic year.
    pub per_year_counts: BTreeMap<i32, usize>,
    /// Accepted rows whose year falls outside the configured range.
    pub out_of_range_rows: usize,
}

impl Normalized {
    pub fn rows_skipped(&self) -> usize {
        self.skipped_by_reason.values().sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub imported_at: DateTime<Utc>,
    pub format: SourceFormat,
    pub rows_processed: usize,
    pub rows_accepted: usize,
    pub rows_skipped: usize,
    pub skipped_by_reason: BTreeMap<SkipReason, usize>,
    pub unique_courses: usize,
    pub courses_inserted: usize,
    pub grades_inserted: usize,
    pub per_year_counts: BTreeMap<i32, usize>,
    pub out_of_range_rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    rules: ImportRules,
}

impl Normalizer {
    pub fn new(rules: ImportRules) -> Self {
        Normalizer { rules }
    }

    pub fn rules(&self) -> &ImportRules {
        &self.rules
    }

    /// Reads and validates a whole source. `format` of `None` auto-detects.
    pub fn normalize(
        &self,
        format: Option<SourceFormat>,
        bytes: &[u8],
    ) -> Result<Normalized, ImportError> {
        let format = format.unwrap_or_else(|| SourceFormat::detect(bytes));
        let rows = match format {
            SourceFormat::Tabular => tabular::read(bytes)?,
            SourceFormat::Nested => nested::read(bytes)?,
            SourceFormat::Flat => flat::read(bytes)?,
        };

        let mut out = Normalized {
            format,
            courses: Vec::new(),
            grades: Vec::new(),
            rows_seen: rows.len(),
            skipped_by_reason: BTreeMap::new(),
            per_year_counts: BTreeMap::new(),
            out_of_range_rows: 0,
        };
        let mut courses: BTreeMap<String, Course> = BTreeMap::new();

        for row in rows {
            let accepted = row.parsed.and_then(|raw| self.convert(&row.location, &raw));
            match accepted {
                Ok((course, grade)) => {
                    if !self.rules.year_in_range(grade.year) {
                        warn!(
                            location = %row.location,
                            year = grade.year,
                            "Academic year outside expected range"
                        );
                        out.out_of_range_rows += 1;
                    }
                    *out.per_year_counts.entry(grade.year).or_default() += 1;
                    courses.entry(course.course_id.clone()).or_insert(course);
                    out.grades.push(grade);
                }
                Err(reason) => {
                    *out.skipped_by_reason.entry(reason).or_default() += 1;
                }
            }
        }

        out.courses = courses.into_values().collect();
        debug!(
            format = %format,
            rows = out.rows_seen,
            accepted = out.grades.len(),
            skipped = out.rows_skipped(),
            "Normalized source"
        );
        Ok(out)
    }

    /// Validates one offering and converts it to canonical records.
    pub fn convert(
        &self,
        location: &str,
        raw: &RawOffering,
    ) -> Result<(Course, GradeDistribution), SkipReason> {
        let skip = |reason: SkipReason, value: &str| {
            warn!(%location, value, %reason, "Skipping row");
            reason
        };

        let (year, code) = match &raw.term {
            TermSource::Code(code) => {
                let term = TermCode::parse(code)
                    .ok_or_else(|| skip(SkipReason::InvalidTerm, code.as_str()))?;
                (term.academic_year(), Some(term))
            }
            TermSource::Label => {
                let term = TermCode::from_label(&raw.term_label)
                    .ok_or_else(|| skip(SkipReason::InvalidTerm, raw.term_label.as_str()))?;
                (term.academic_year(), Some(term))
            }
            TermSource::AcademicYear(text) => {
                let year = text
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| skip(SkipReason::InvalidTerm, text.as_str()))?;
                (year, None)
            }
        };

        let number = fields::course_number(&raw.course_number)
            .ok_or_else(|| skip(SkipReason::InvalidCourseNumber, raw.course_number.as_str()))?;
        if raw.subject.trim().is_empty() {
            return Err(skip(SkipReason::MalformedRow, "missing subject"));
        }

        let percent_a = fields::percent(&raw.percent_a, &self.rules);
        let percent_d = fields::percent(&raw.percent_d, &self.rules);
        let percent_f = fields::percent(&raw.percent_f, &self.rules);
        if self.rules.skip_all_zero && percent_a == 0.0 && percent_d == 0.0 && percent_f == 0.0 {
            return Err(skip(SkipReason::AllZeroPercentages, raw.percent_a.as_str()));
        }

        let percent_df = percent_d + percent_f;
        let in_range = |p: f64| (0.0..=100.0).contains(&p);
        if ![percent_a, percent_d, percent_f, percent_df].into_iter().all(in_range) {
            let shown = format!("a={percent_a} d={percent_d} f={percent_f}");
            return Err(skip(SkipReason::PercentOutOfRange, shown.as_str()));
        }

        let total = fields::total_students(&raw.total)
            .ok_or_else(|| skip(SkipReason::InvalidTotal, raw.total.as_str()))?;

        let label = match (raw.term_label.trim(), code) {
            ("", Some(code)) => code.label(),
            (label, _) => label.to_string(),
        };

        let course = Course::new(&raw.subject, number);
        let grade = GradeDistribution::new(&course, raw.instructor.trim(), year, &label)
            .with_percentages(percent_a, percent_df)
            .with_total_students(total);
        Ok((course, grade))
    }
}

/// Normalizes a source and writes the result to a store: courses first,
/// then grades, one bulk call each. Nothing is written unless the whole
/// source could be read.
pub struct Importer<'a, S: GradeStore + ?Sized> {
    store: &'a S,
    normalizer: Normalizer,
}

impl<'a, S: GradeStore + ?Sized> Importer<'a, S> {
    pub fn new(store: &'a S, rules: ImportRules) -> Self {
        Importer {
            store,
            normalizer: Normalizer::new(rules),
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    #[tracing::instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn import(
        &self,
        format: Option<SourceFormat>,
        bytes: &[u8],
    ) -> Result<ImportSummary, ImportError> {
        let normalized = self.normalizer.normalize(format, bytes)?;
        self.write(normalized).await
    }

    /// Stores records that were already normalized.
    pub async fn write(&self, normalized: Normalized) -> Result<ImportSummary, ImportError> {
        let unique_courses = normalized.courses.len();
        let rows_accepted = normalized.grades.len();
        let rows_skipped = normalized.rows_skipped();

        let courses_inserted = if normalized.courses.is_empty() {
            0
        } else {
            self.store.insert_courses(normalized.courses).await?
        };
        let grades_inserted = if normalized.grades.is_empty() {
            0
        } else {
            self.store.insert_grades(normalized.grades).await?
        };

        let summary = ImportSummary {
            imported_at: Utc::now(),
            format: normalized.format,
            rows_processed: normalized.rows_seen,
            rows_accepted,
            rows_skipped,
            skipped_by_reason: normalized.skipped_by_reason,
            unique_courses,
            courses_inserted,
            grades_inserted,
            per_year_counts: normalized.per_year_counts,
            out_of_range_rows: normalized.out_of_range_rows,
        };

        info!(
            format = %summary.format,
            rows_processed = summary.rows_processed,
            rows_accepted = summary.rows_accepted,
            rows_skipped = summary.rows_skipped,
            unique_courses = summary.unique_courses,
            "Import complete"
        );
        Ok(summary)
    }
}

//! Storage gateway over the three persisted collections.
//!
//! [`GradeStore`] is the port every component receives explicitly; there is no
//! process-wide connection. [`MemoryStore`] backs tests and one-shot runs,
//! [`JsonFileStore`] persists each collection as a JSON document on disk.

mod collections;
mod file;
mod memory;

pub use collections::Collections;
pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::StoreResult;
use crate::records::{Course, GradeDistribution, Instructor, Metric};

/// The named collections and the fields of their composite lookup index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Courses,
    Instructors,
    GradeDistributions,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Courses,
        Collection::Instructors,
        Collection::GradeDistributions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Courses => "courses",
            Collection::Instructors => "instructors",
            Collection::GradeDistributions => "grade_distributions",
        }
    }

    pub fn index_fields(self) -> &'static [&'static str] {
        match self {
            Collection::Courses => &["department", "level"],
            Collection::Instructors => &["name", "departments"],
            Collection::GradeDistributions => &["course_id", "instructor_name", "year", "term"],
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub department: Option<String>,
    pub number: Option<u32>,
    pub level: Option<u32>,
    pub course_id_pattern: Option<Regex>,
}

impl CourseFilter {
    pub fn department(department: &str) -> Self {
        CourseFilter {
            department: Some(department.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, course: &Course) -> bool {
        self.department.as_ref().is_none_or(|d| *d == course.department)
            && self.number.is_none_or(|n| n == course.number)
            && self.level.is_none_or(|l| l == course.level)
            && self
                .course_id_pattern
                .as_ref()
                .is_none_or(|re| re.is_match(&course.course_id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstructorFilter {
    pub name: Option<String>,
    pub is_regular_faculty: Option<bool>,
    pub department: Option<String>,
}

impl InstructorFilter {
    pub fn regular_faculty() -> Self {
        InstructorFilter {
            is_regular_faculty: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, instructor: &Instructor) -> bool {
        self.name.as_ref().is_none_or(|n| *n == instructor.name)
            && self
                .is_regular_faculty
                .is_none_or(|f| f == instructor.is_regular_faculty)
            && self
                .department
                .as_ref()
                .is_none_or(|d| instructor.departments.contains(d))
    }
}

/// Restricts grade records. `None` means "no restriction"; an empty set
/// matches nothing.
#[derive(Debug, Clone, Default)]
pub struct GradeFilter {
    pub course_ids: Option<BTreeSet<String>>,
    pub instructor_names: Option<BTreeSet<String>>,
    pub year: Option<i32>,
}

impl GradeFilter {
    pub fn matches(&self, grade: &GradeDistribution) -> bool {
        self.course_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&grade.course_id))
            && self
                .instructor_names
                .as_ref()
                .is_none_or(|names| names.contains(&grade.instructor_name))
            && self.year.is_none_or(|y| y == grade.year)
    }
}

/// Field grade records are grouped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    InstructorName,
    CourseId,
    Year,
}

impl GroupKey {
    pub fn key_of(self, grade: &GradeDistribution) -> String {
        match self {
            GroupKey::InstructorName => grade.instructor_name.clone(),
            GroupKey::CourseId => grade.course_id.clone(),
            GroupKey::Year => grade.year.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupQuery {
    pub filter: GradeFilter,
    pub key: GroupKey,
    pub metric: Metric,
}

/// One group produced by [`GradeStore::group_grades`]: the mean of the metric
/// over the group and the number of records in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: String,
    pub average: f64,
    pub count: usize,
}

/// Target of one instructor name: every grade record currently named `from`
/// is renamed to `to` and gets the faculty flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameResolution {
    pub from: String,
    pub to: String,
    pub is_regular_faculty: bool,
}

/// Records touched by [`GradeStore::apply_resolutions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionCounts {
    pub renamed: usize,
    pub status_changes: usize,
}

/// Persistence port used by the importer, the resolver and the engine.
///
/// Bulk inserts are all-or-nothing per call. Callers are responsible for
/// running at most one import or resolution pass at a time per dataset.
#[async_trait]
pub trait GradeStore: Send + Sync {
    /// Inserts courses whose `course_id` is not stored yet; returns how many were new.
    async fn insert_courses(&self, courses: Vec<Course>) -> StoreResult<usize>;
    async fn insert_instructors(&self, instructors: Vec<Instructor>) -> StoreResult<usize>;
    async fn insert_grades(&self, grades: Vec<GradeDistribution>) -> StoreResult<usize>;

    async fn find_courses(&self, filter: &CourseFilter) -> StoreResult<Vec<Course>>;
    async fn find_instructors(&self, filter: &InstructorFilter) -> StoreResult<Vec<Instructor>>;
    async fn find_grades(&self, filter: &GradeFilter) -> StoreResult<Vec<GradeDistribution>>;

    async fn distinct_instructor_names(&self) -> StoreResult<Vec<String>>;
    async fn distinct_departments(&self) -> StoreResult<Vec<String>>;

    /// Renames and flags grade records in one pass, keyed by their current
    /// name. A blank target rejects the whole batch.
    async fn apply_resolutions(
        &self,
        resolutions: Vec<NameResolution>,
    ) -> StoreResult<ResolutionCounts>;
    /// Inserts or replaces instructors by name; returns how many changed.
    async fn upsert_instructors(&self, instructors: Vec<Instructor>) -> StoreResult<usize>;

    /// Groups matching grade records, returned in ascending key order.
    async fn group_grades(&self, query: &GroupQuery) -> StoreResult<Vec<GroupRow>>;

    /// Empties all three collections (full reload).
    async fn clear(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_filter_matches_every_given_field() {
        let course = Course::new("MATH", 411);
        let filter = CourseFilter {
            department: Some("MATH".into()),
            level: Some(400),
            ..Default::default()
        };
        assert!(filter.matches(&course));

        let filter = CourseFilter {
            department: Some("MATH".into()),
            level: Some(100),
            ..Default::default()
        };
        assert!(!filter.matches(&course));
    }

    #[test]
    fn test_empty_grade_filter_set_matches_nothing() {
        let course = Course::new("MATH", 111);
        let grade = GradeDistribution::new(&course, "Ann Lee", 2014, "Fall 2014");

        assert!(GradeFilter::default().matches(&grade));

        let filter = GradeFilter {
            course_ids: Some(BTreeSet::new()),
            ..Default::default()
        };
        assert!(!filter.matches(&grade));
    }

    #[test]
    fn test_collection_names() {
        let names: Vec<_> = Collection::ALL.iter().map(|c| c.to_string()).collect();
        assert_eq!(names, ["courses", "instructors", "grade_distributions"]);
    }
}

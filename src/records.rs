//! Canonical record shapes shared by the normalizer, the identity resolver and
//! the aggregation engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A course offered by a department, e.g. `MATH111`.
///
/// `course_id` and `level` are always derived from `department` and `number`;
/// use [`Course::new`] rather than building one by hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Course {
    pub course_id: String,
    pub department: String,
    pub number: u32,
    pub level: u32,
}

impl Course {
    pub fn new(department: &str, number: u32) -> Self {
        let department = department.trim().to_string();
        Course {
            course_id: format!("{department}{number}"),
            level: level_of(number),
            department,
            number,
        }
    }
}

/// Hundreds bucket of a course number: 111 -> 100, 4050 -> 4000.
pub fn level_of(number: u32) -> u32 {
    (number / 100) * 100
}

/// A known faculty member, keyed by canonical "First [Middle] Last" name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
    pub name: String,
    pub is_regular_faculty: bool,
    #[serde(default)]
    pub departments: BTreeSet<String>,
}

impl Instructor {
    pub fn new(name: &str, is_regular_faculty: bool) -> Self {
        Instructor {
            name: name.to_string(),
            is_regular_faculty,
            departments: BTreeSet::new(),
        }
    }

    pub fn with_department(mut self, department: &str) -> Self {
        self.departments.insert(department.to_string());
        self
    }
}

/// One observed offering of a course by an instructor in a given term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeDistribution {
    pub course_id: String,
    pub instructor_name: String,
    /// Academic year, not calendar year.
    pub year: i32,
    pub term: String,
    pub percent_a: f64,
    /// Percent D plus percent F.
    pub percent_df: f64,
    pub total_students: u32,
    /// Unset until the identity resolution pass has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_regular_faculty: Option<bool>,
}

impl GradeDistribution {
    pub fn new(course: &Course, instructor_name: &str, year: i32, term: &str) -> Self {
        GradeDistribution {
            course_id: course.course_id.clone(),
            instructor_name: instructor_name.to_string(),
            year,
            term: term.to_string(),
            percent_a: 0.0,
            percent_df: 0.0,
            total_students: 0,
            is_regular_faculty: None,
        }
    }

    pub fn with_percentages(mut self, percent_a: f64, percent_df: f64) -> Self {
        self.percent_a = percent_a;
        self.percent_df = percent_df;
        self
    }

    pub fn with_total_students(mut self, total_students: u32) -> Self {
        self.total_students = total_students;
        self
    }
}

/// The "easiness" figure being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PercentA,
    PercentDf,
}

impl Metric {
    pub fn value(self, grade: &GradeDistribution) -> f64 {
        match self {
            Metric::PercentA => grade.percent_a,
            Metric::PercentDf => grade.percent_df,
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            Metric::PercentA => "percent_a",
            Metric::PercentDf => "percent_df",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_id_is_department_then_number() {
        let course = Course::new(" MATH ", 111);

        assert_eq!(course.course_id, "MATH111");
        assert_eq!(course.department, "MATH");
        assert_eq!(course.number, 111);
        assert_eq!(course.level, 100);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level_of(99), 0);
        assert_eq!(level_of(100), 100);
        assert_eq!(level_of(199), 100);
        assert_eq!(level_of(410), 400);
        assert_eq!(level_of(4050), 4000);
    }

    #[test]
    fn test_metric_selects_field() {
        let course = Course::new("CIS", 210);
        let grade = GradeDistribution::new(&course, "Ann Lee", 2014, "Fall 2014")
            .with_percentages(42.5, 7.5);

        assert_eq!(Metric::PercentA.value(&grade), 42.5);
        assert_eq!(Metric::PercentDf.value(&grade), 7.5);
    }

    #[test]
    fn test_unresolved_faculty_flag_is_not_serialized() {
        let course = Course::new("CIS", 210);
        let grade = GradeDistribution::new(&course, "Ann Lee", 2014, "Fall 2014");
        let json = serde_json::to_string(&grade).unwrap();

        assert!(!json.contains("is_regular_faculty"));
    }
}

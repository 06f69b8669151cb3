//! Query and result types for the aggregation engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::records::Metric;
use crate::store::GroupRow;

/// Which courses a comparison covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// One course, e.g. MATH 111.
    Course { department: String, number: u32 },
    /// Every course in a department.
    Department { department: String },
    /// Courses whose stored `level` field equals `level`.
    Level { department: String, level: u32 },
    /// Courses whose `course_id` starts with the department followed by
    /// `digit`. Unlike [`Scope::Level`] this is a string prefix match, so
    /// `MATH4050` falls under digit 4.
    LevelPrefix { department: String, digit: u8 },
    /// Every course an instructor taught.
    Instructor { name: String },
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Course { department, number } => write!(f, "{department}{number}"),
            Scope::Department { department } => write!(f, "{department}"),
            Scope::Level { department, level } => write!(f, "{department} {level}-level"),
            Scope::LevelPrefix { department, digit } => write!(f, "{department}{digit}xx"),
            Scope::Instructor { name } => write!(f, "instructor {name}"),
        }
    }
}

/// What each output group represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// Compare instructors within the scoped courses.
    Instructor,
    /// Compare the scoped courses with each other.
    Course,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonQuery {
    pub scope: Scope,
    pub metric: Metric,
    pub group_by: GroupBy,
    pub faculty_only: bool,
}

impl ComparisonQuery {
    /// Instructors who taught one course.
    pub fn by_course(department: &str, number: u32, metric: Metric) -> Self {
        Self::new(
            Scope::Course {
                department: department.to_string(),
                number,
            },
            metric,
        )
    }

    /// Instructors across a whole department.
    pub fn by_department(department: &str, metric: Metric) -> Self {
        Self::new(
            Scope::Department {
                department: department.to_string(),
            },
            metric,
        )
    }

    /// Instructors across one level of a department.
    pub fn by_level(department: &str, level: u32, metric: Metric) -> Self {
        Self::new(
            Scope::Level {
                department: department.to_string(),
                level,
            },
            metric,
        )
    }

    /// Courses compared with each other within one level of a department.
    pub fn courses_in_level(department: &str, level: u32, metric: Metric) -> Self {
        Self::by_level(department, level, metric).grouped_by(GroupBy::Course)
    }

    /// Scope defaults to grouping by instructor, except instructor scopes,
    /// which group by course.
    pub fn new(scope: Scope, metric: Metric) -> Self {
        let group_by = match scope {
            Scope::Instructor { .. } => GroupBy::Course,
            _ => GroupBy::Instructor,
        };
        ComparisonQuery {
            scope,
            metric,
            group_by,
            faculty_only: false,
        }
    }

    pub fn grouped_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn faculty_only(mut self, faculty_only: bool) -> Self {
        self.faculty_only = faculty_only;
        self
    }
}

/// One bar of a comparison chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStat {
    /// Instructor name or course id, depending on [`GroupBy`].
    pub key: String,
    pub average: f64,
    pub count: usize,
}

impl From<GroupRow> for GroupStat {
    fn from(row: GroupRow) -> Self {
        GroupStat {
            key: row.key,
            average: row.average,
            count: row.count,
        }
    }
}

/// Both metrics for one instructor of one course.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseOverviewRow {
    pub instructor_name: String,
    pub average_percent_a: f64,
    pub average_percent_df: f64,
    pub count: usize,
}

/// A comparison together with the query that produced it, as handed to the
/// visualization front end.
#[derive(Debug, Serialize)]
pub struct ComparisonReport {
    pub generated_at: DateTime<Utc>,
    pub scope: String,
    pub query: ComparisonQuery,
    pub results: Vec<GroupStat>,
}

impl ComparisonReport {
    pub fn new(query: ComparisonQuery, results: Vec<GroupStat>) -> Self {
        ComparisonReport {
            generated_at: Utc::now(),
            scope: query.scope.to_string(),
            query,
            results,
        }
    }
}

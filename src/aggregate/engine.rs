use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::aggregate::types::{ComparisonQuery, CourseOverviewRow, GroupBy, GroupStat, Scope};
use crate::error::{StoreError, StoreResult};
use crate::records::Metric;
use crate::store::{
    Collection, CourseFilter, GradeFilter, GradeStore, GroupKey, GroupQuery, InstructorFilter,
};

/// Runs comparison queries against whatever store it is given. Holds no
/// state of its own, so every call sees the latest completed write.
pub struct Engine<'a, S: GradeStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: GradeStore + ?Sized> Engine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Engine { store }
    }

    /// Groups the scoped grade records and orders the groups by average,
    /// highest first. Groups with equal averages stay in ascending key order.
    #[tracing::instrument(skip(self), fields(scope = %query.scope, metric = %query.metric))]
    pub async fn compare(&self, query: &ComparisonQuery) -> StoreResult<Vec<GroupStat>> {
        let mut filter = GradeFilter::default();

        match &query.scope {
            Scope::Instructor { name } => {
                filter.instructor_names = Some(BTreeSet::from([name.clone()]));
            }
            scope => {
                let course_ids = self.resolve_courses(scope).await?;
                if course_ids.is_empty() {
                    debug!("No courses matched scope");
                    return Ok(Vec::new());
                }
                filter.course_ids = Some(course_ids);
            }
        }

        if query.faculty_only {
            let faculty = self.faculty_names().await?;
            let allowed: BTreeSet<String> = match filter.instructor_names.take() {
                Some(names) => names.intersection(&faculty).cloned().collect(),
                None => faculty,
            };
            if allowed.is_empty() {
                debug!("No regular faculty to compare");
                return Ok(Vec::new());
            }
            filter.instructor_names = Some(allowed);
        }

        let key = match query.group_by {
            GroupBy::Instructor => GroupKey::InstructorName,
            GroupBy::Course => GroupKey::CourseId,
        };

        let rows = self
            .store
            .group_grades(&GroupQuery {
                filter,
                key,
                metric: query.metric,
            })
            .await?;

        let mut stats: Vec<GroupStat> = rows.into_iter().map(GroupStat::from).collect();
        stats.sort_by(|a, b| b.average.total_cmp(&a.average));

        info!(groups = stats.len(), "Comparison complete");
        Ok(stats)
    }

    /// Course ids covered by a course-based scope.
    pub async fn resolve_courses(&self, scope: &Scope) -> StoreResult<BTreeSet<String>> {
        let filter = match scope {
            Scope::Course { department, number } => CourseFilter {
                department: Some(department.clone()),
                number: Some(*number),
                ..Default::default()
            },
            Scope::Department { department } => CourseFilter::department(department),
            Scope::Level { department, level } => CourseFilter {
                department: Some(department.clone()),
                level: Some(*level),
                ..Default::default()
            },
            Scope::LevelPrefix { department, digit } => CourseFilter {
                department: Some(department.clone()),
                course_id_pattern: Some(level_prefix_pattern(department, *digit)?),
                ..Default::default()
            },
            Scope::Instructor { .. } => CourseFilter::default(),
        };

        let courses = self.store.find_courses(&filter).await?;
        Ok(courses.into_iter().map(|c| c.course_id).collect())
    }

    /// Names of instructors flagged as regular faculty.
    pub async fn faculty_names(&self) -> StoreResult<BTreeSet<String>> {
        let faculty = self
            .store
            .find_instructors(&InstructorFilter::regular_faculty())
            .await?;
        Ok(faculty.into_iter().map(|i| i.name).collect())
    }

    /// Per-instructor averages of both metrics for one course, by instructor name.
    pub async fn course_overview(&self, course_id: &str) -> StoreResult<Vec<CourseOverviewRow>> {
        let filter = GradeFilter {
            course_ids: Some(BTreeSet::from([course_id.to_string()])),
            ..Default::default()
        };

        let mut rows: BTreeMap<String, CourseOverviewRow> = BTreeMap::new();
        for metric in [Metric::PercentA, Metric::PercentDf] {
            let groups = self
                .store
                .group_grades(&GroupQuery {
                    filter: filter.clone(),
                    key: GroupKey::InstructorName,
                    metric,
                })
                .await?;

            for g in groups {
                let row = rows.entry(g.key.clone()).or_insert_with(|| CourseOverviewRow {
                    instructor_name: g.key,
                    average_percent_a: 0.0,
                    average_percent_df: 0.0,
                    count: g.count,
                });
                match metric {
                    Metric::PercentA => row.average_percent_a = g.average,
                    Metric::PercentDf => row.average_percent_df = g.average,
                }
            }
        }

        Ok(rows.into_values().collect())
    }

    /// Number of stored grade records per academic year.
    pub async fn year_distribution(&self) -> StoreResult<BTreeMap<i32, usize>> {
        let groups = self
            .store
            .group_grades(&GroupQuery {
                filter: GradeFilter::default(),
                key: GroupKey::Year,
                metric: Metric::PercentA,
            })
            .await?;

        Ok(groups
            .into_iter()
            .filter_map(|g| g.key.parse().ok().map(|year| (year, g.count)))
            .collect())
    }
}

fn level_prefix_pattern(department: &str, digit: u8) -> StoreResult<Regex> {
    if digit > 9 {
        return Err(StoreError::Rejected {
            operation: "find",
            collection: Collection::Courses,
            reason: format!("level prefix must be a single digit, got {digit}"),
        });
    }

    Regex::new(&format!("^{}{}", regex::escape(department), digit)).map_err(|e| {
        StoreError::Rejected {
            operation: "find",
            collection: Collection::Courses,
            reason: e.to_string(),
        }
    })
}

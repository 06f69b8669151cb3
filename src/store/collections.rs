use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{StoreError, StoreResult};
use crate::records::{Course, GradeDistribution, Instructor};
use crate::store::{
    Collection, CourseFilter, GradeFilter, GroupQuery, GroupRow, InstructorFilter, NameResolution,
    ResolutionCounts,
};

type GradeKey = (String, String, i32, String);

/// Composite lookup indexes. A mutation rebuilds only the index of the
/// collection it touched. Values are positions in the owning collection vector.
#[derive(Debug, Default, Clone)]
struct Indexes {
    /// department + level
    courses: BTreeMap<(String, u32), Vec<usize>>,
    /// name + departments
    instructors: BTreeMap<(String, String), Vec<usize>>,
    /// course_id + instructor_name + year + term
    grades: BTreeMap<GradeKey, Vec<usize>>,
}

/// The three collections plus their indexes. Both store implementations
/// delegate every operation here.
#[derive(Debug, Default, Clone)]
pub struct Collections {
    courses: Vec<Course>,
    instructors: Vec<Instructor>,
    grades: Vec<GradeDistribution>,
    indexes: Indexes,
}

impl Collections {
    pub fn from_parts(
        courses: Vec<Course>,
        instructors: Vec<Instructor>,
        grades: Vec<GradeDistribution>,
    ) -> Self {
        let mut collections = Collections {
            courses,
            instructors,
            grades,
            indexes: Indexes::default(),
        };
        collections.reindex();
        collections
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn instructors(&self) -> &[Instructor] {
        &self.instructors
    }

    pub fn grades(&self) -> &[GradeDistribution] {
        &self.grades
    }

    fn reindex(&mut self) {
        self.reindex_courses();
        self.reindex_instructors();
        self.reindex_grades();
    }

    fn reindex_courses(&mut self) {
        let mut index: BTreeMap<(String, u32), Vec<usize>> = BTreeMap::new();
        for (pos, c) in self.courses.iter().enumerate() {
            index.entry((c.department.clone(), c.level)).or_default().push(pos);
        }
        self.indexes.courses = index;
    }

    fn reindex_instructors(&mut self) {
        let mut index: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
        for (pos, i) in self.instructors.iter().enumerate() {
            let departments = i.departments.iter().cloned().collect::<Vec<_>>().join(",");
            index.entry((i.name.clone(), departments)).or_default().push(pos);
        }
        self.indexes.instructors = index;
    }

    fn reindex_grades(&mut self) {
        let mut index: BTreeMap<GradeKey, Vec<usize>> = BTreeMap::new();
        for (pos, g) in self.grades.iter().enumerate() {
            index
                .entry((
                    g.course_id.clone(),
                    g.instructor_name.clone(),
                    g.year,
                    g.term.clone(),
                ))
                .or_default()
                .push(pos);
        }
        self.indexes.grades = index;
    }

    pub fn insert_courses(&mut self, courses: Vec<Course>) -> StoreResult<usize> {
        for c in &courses {
            let derived = Course::new(&c.department, c.number);
            if derived != *c {
                return Err(StoreError::Rejected {
                    operation: "insert_many",
                    collection: Collection::Courses,
                    reason: format!(
                        "course `{}` is not derived from its department and number",
                        c.course_id
                    ),
                });
            }
        }

        let mut known: BTreeSet<String> =
            self.courses.iter().map(|c| c.course_id.clone()).collect();
        let before = self.courses.len();
        for c in courses {
            if known.insert(c.course_id.clone()) {
                self.courses.push(c);
            }
        }

        self.reindex_courses();
        Ok(self.courses.len() - before)
    }

    pub fn insert_instructors(&mut self, instructors: Vec<Instructor>) -> StoreResult<usize> {
        if let Some(blank) = instructors.iter().find(|i| i.name.trim().is_empty()) {
            return Err(StoreError::Rejected {
                operation: "insert_many",
                collection: Collection::Instructors,
                reason: format!("instructor with blank name ({:?})", blank.departments),
            });
        }

        let inserted = instructors.len();
        self.instructors.extend(instructors);
        self.reindex_instructors();
        Ok(inserted)
    }

    pub fn insert_grades(&mut self, grades: Vec<GradeDistribution>) -> StoreResult<usize> {
        let in_range = |p: f64| (0.0..=100.0).contains(&p);

        for g in &grades {
            if g.course_id.is_empty() || !in_range(g.percent_a) || !in_range(g.percent_df) {
                return Err(StoreError::Rejected {
                    operation: "insert_many",
                    collection: Collection::GradeDistributions,
                    reason: format!(
                        "invalid record for `{}` ({}, {}): percent_a={} percent_df={}",
                        g.course_id, g.term, g.instructor_name, g.percent_a, g.percent_df
                    ),
                });
            }
        }

        let inserted = grades.len();
        self.grades.extend(grades);
        self.reindex_grades();
        Ok(inserted)
    }

    pub fn find_courses(&self, filter: &CourseFilter) -> Vec<Course> {
        let positions: Vec<usize> = match (&filter.department, filter.level) {
            (Some(dept), Some(level)) => self
                .indexes
                .courses
                .get(&(dept.clone(), level))
                .cloned()
                .unwrap_or_default(),
            (Some(dept), None) => self
                .indexes
                .courses
                .range((dept.clone(), 0)..=(dept.clone(), u32::MAX))
                .flat_map(|(_, positions)| positions.iter().copied())
                .collect(),
            _ => (0..self.courses.len()).collect(),
        };

        let mut found: Vec<Course> = positions
            .into_iter()
            .map(|pos| &self.courses[pos])
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.course_id.cmp(&b.course_id));
        found
    }

    pub fn find_instructors(&self, filter: &InstructorFilter) -> Vec<Instructor> {
        let positions: Vec<usize> = match &filter.name {
            Some(name) => self.instructor_positions(name).collect(),
            None => (0..self.instructors.len()).collect(),
        };

        positions
            .into_iter()
            .map(|pos| &self.instructors[pos])
            .filter(|i| filter.matches(i))
            .cloned()
            .collect()
    }

    fn instructor_positions<'a>(&'a self, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.indexes
            .instructors
            .range((name.to_string(), String::new())..)
            .take_while(move |((n, _), _)| n == name)
            .flat_map(|(_, positions)| positions.iter().copied())
    }

    fn grade_positions(&self, filter: &GradeFilter) -> Vec<usize> {
        let Some(ids) = &filter.course_ids else {
            return (0..self.grades.len())
                .filter(|&pos| filter.matches(&self.grades[pos]))
                .collect();
        };

        let mut positions = Vec::new();
        for id in ids {
            let start = (id.clone(), String::new(), i32::MIN, String::new());
            for ((course_id, ..), hits) in self.indexes.grades.range(start..) {
                if course_id != id {
                    break;
                }
                positions.extend(hits.iter().copied().filter(|&pos| filter.matches(&self.grades[pos])));
            }
        }
        positions.sort_unstable();
        positions
    }

    pub fn find_grades(&self, filter: &GradeFilter) -> Vec<GradeDistribution> {
        self.grade_positions(filter)
            .into_iter()
            .map(|pos| self.grades[pos].clone())
            .collect()
    }

    pub fn distinct_instructor_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.grades.iter().map(|g| g.instructor_name.as_str()).collect();
        names.into_iter().map(str::to_string).collect()
    }

    pub fn distinct_departments(&self) -> Vec<String> {
        let departments: BTreeSet<&str> = self.courses.iter().map(|c| c.department.as_str()).collect();
        departments.into_iter().map(str::to_string).collect()
    }

    /// Renames and flags grade records in one pass. Each record is looked up
    /// by its current name; records with no resolution are left alone.
    pub fn apply_resolutions(
        &mut self,
        resolutions: &[NameResolution],
    ) -> StoreResult<ResolutionCounts> {
        if let Some(blank) = resolutions.iter().find(|r| r.to.trim().is_empty()) {
            return Err(StoreError::Rejected {
                operation: "update_many",
                collection: Collection::GradeDistributions,
                reason: format!("blank target name for `{}`", blank.from),
            });
        }

        let by_name: HashMap<&str, &NameResolution> =
            resolutions.iter().map(|r| (r.from.as_str(), r)).collect();
        let mut counts = ResolutionCounts::default();

        for g in &mut self.grades {
            let Some(resolution) = by_name.get(g.instructor_name.as_str()) else {
                continue;
            };
            if g.instructor_name != resolution.to {
                g.instructor_name = resolution.to.clone();
                counts.renamed += 1;
            }
            if g.is_regular_faculty != Some(resolution.is_regular_faculty) {
                g.is_regular_faculty = Some(resolution.is_regular_faculty);
                counts.status_changes += 1;
            }
        }

        if counts.renamed > 0 {
            self.reindex_grades();
        }
        Ok(counts)
    }

    /// Inserts or replaces instructors by name; returns how many changed.
    /// Later entries win when a batch names the same instructor twice.
    pub fn upsert_instructors(&mut self, instructors: Vec<Instructor>) -> StoreResult<usize> {
        if let Some(blank) = instructors.iter().find(|i| i.name.trim().is_empty()) {
            return Err(StoreError::Rejected {
                operation: "upsert",
                collection: Collection::Instructors,
                reason: format!("instructor with blank name ({:?})", blank.departments),
            });
        }

        let mut incoming: BTreeMap<String, Instructor> = instructors
            .into_iter()
            .map(|i| (i.name.clone(), i))
            .collect();
        incoming.retain(|name, instructor| {
            let existing: Vec<usize> = self.instructor_positions(name).collect();
            !(existing.len() == 1 && self.instructors[existing[0]] == *instructor)
        });
        if incoming.is_empty() {
            return Ok(0);
        }

        let changed = incoming.len();
        self.instructors.retain(|i| !incoming.contains_key(&i.name));
        self.instructors.extend(incoming.into_values());
        self.reindex_instructors();
        Ok(changed)
    }

    pub fn group_grades(&self, query: &GroupQuery) -> Vec<GroupRow> {
        let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for pos in self.grade_positions(&query.filter) {
            let grade = &self.grades[pos];
            groups
                .entry(query.key.key_of(grade))
                .or_default()
                .push(query.metric.value(grade));
        }

        groups
            .into_iter()
            .map(|(key, values)| GroupRow {
                key,
                average: crate::aggregate::mean(&values),
                count: values.len(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        *self = Collections::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Metric;
    use crate::store::GroupKey;

    fn grade(course: &Course, instructor: &str, percent_a: f64) -> GradeDistribution {
        GradeDistribution::new(course, instructor, 2014, "Fall 2014").with_percentages(percent_a, 5.0)
    }

    fn sample() -> Collections {
        let math111 = Course::new("MATH", 111);
        let math112 = Course::new("MATH", 112);
        let math411 = Course::new("MATH", 411);
        let grades = vec![
            grade(&math111, "Ann Lee", 70.0),
            grade(&math111, "Bo Park", 40.0),
            grade(&math112, "Ann Lee", 90.0),
            grade(&math411, "Cy Diaz", 20.0),
        ];
        Collections::from_parts(vec![math111, math112, math411], vec![], grades)
    }

    #[test]
    fn test_insert_courses_skips_known_ids() {
        let mut c = sample();
        let inserted = c
            .insert_courses(vec![Course::new("MATH", 111), Course::new("CIS", 210)])
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(c.courses().len(), 4);
    }

    #[test]
    fn test_insert_courses_rejects_underived_id() {
        let mut c = sample();
        let mut bogus = Course::new("MATH", 251);
        bogus.course_id = "MATH-251".into();

        let err = c.insert_courses(vec![Course::new("CIS", 210), bogus]).unwrap_err();
        assert!(matches!(err, StoreError::Rejected { collection: Collection::Courses, .. }));
        // whole batch rejected
        assert_eq!(c.courses().len(), 3);
    }

    #[test]
    fn test_insert_grades_rejects_out_of_range_batch() {
        let mut c = sample();
        let course = Course::new("CIS", 210);
        let batch = vec![grade(&course, "Ann Lee", 50.0), grade(&course, "Ann Lee", 150.0)];

        assert!(c.insert_grades(batch).is_err());
        assert_eq!(c.grades().len(), 4);
    }

    #[test]
    fn test_find_courses_by_department_and_level_uses_index() {
        let c = sample();
        let found = c.find_courses(&CourseFilter {
            department: Some("MATH".into()),
            level: Some(100),
            ..Default::default()
        });

        let ids: Vec<_> = found.iter().map(|c| c.course_id.as_str()).collect();
        assert_eq!(ids, ["MATH111", "MATH112"]);
    }

    #[test]
    fn test_find_grades_by_course_set() {
        let c = sample();
        let filter = GradeFilter {
            course_ids: Some(["MATH111".to_string()].into()),
            ..Default::default()
        };

        assert_eq!(c.find_grades(&filter).len(), 2);
    }

    fn resolution(from: &str, to: &str, is_regular_faculty: bool) -> NameResolution {
        NameResolution {
            from: from.into(),
            to: to.into(),
            is_regular_faculty,
        }
    }

    #[test]
    fn test_resolutions_count_changes_once() {
        let mut c = sample();
        let batch = vec![
            resolution("Ann Lee", "Ann M. Lee", true),
            resolution("Bo Park", "Bo Park", false),
        ];

        let first = c.apply_resolutions(&batch).unwrap();
        assert_eq!(first, ResolutionCounts { renamed: 2, status_changes: 3 });
        assert_eq!(c.distinct_instructor_names(), ["Ann M. Lee", "Bo Park", "Cy Diaz"]);

        let second = c
            .apply_resolutions(&[resolution("Ann M. Lee", "Ann M. Lee", true)])
            .unwrap();
        assert_eq!(second, ResolutionCounts::default());

        let filter = GradeFilter {
            instructor_names: Some(["Ann M. Lee".to_string()].into()),
            ..GradeFilter::default()
        };
        assert_eq!(c.find_grades(&filter).len(), 2);
    }

    #[test]
    fn test_resolutions_reject_blank_target() {
        let mut c = sample();
        let err = c
            .apply_resolutions(&[
                resolution("Ann Lee", "Ann M. Lee", true),
                resolution("Bo Park", "  ", false),
            ])
            .unwrap_err();

        assert!(matches!(err, StoreError::Rejected { operation: "update_many", .. }));
        assert_eq!(c.distinct_instructor_names(), ["Ann Lee", "Bo Park", "Cy Diaz"]);
    }

    #[test]
    fn test_upsert_instructors_replaces_by_name() {
        let mut c = sample();

        assert_eq!(c.upsert_instructors(vec![Instructor::new("Ann Lee", false)]).unwrap(), 1);
        assert_eq!(c.upsert_instructors(vec![Instructor::new("Ann Lee", false)]).unwrap(), 0);
        let changed = c
            .upsert_instructors(vec![
                Instructor::new("Ann Lee", true),
                Instructor::new("Bo Park", false),
            ])
            .unwrap();
        assert_eq!(changed, 2);

        let found = c.find_instructors(&InstructorFilter::regular_faculty());
        assert_eq!(found.len(), 1);
        assert_eq!(c.instructors().len(), 2);
    }

    #[test]
    fn test_upsert_instructors_rejects_whole_batch_on_blank_name() {
        let mut c = sample();
        let err = c
            .upsert_instructors(vec![Instructor::new("Ann Lee", true), Instructor::new(" ", true)])
            .unwrap_err();

        assert!(matches!(err, StoreError::Rejected { operation: "upsert", .. }));
        assert!(c.instructors().is_empty());
    }

    #[test]
    fn test_group_by_instructor_in_key_order() {
        let c = sample();
        let rows = c.group_grades(&GroupQuery {
            filter: GradeFilter::default(),
            key: GroupKey::InstructorName,
            metric: Metric::PercentA,
        });

        assert_eq!(
            rows,
            vec![
                GroupRow { key: "Ann Lee".into(), average: 80.0, count: 2 },
                GroupRow { key: "Bo Park".into(), average: 40.0, count: 1 },
                GroupRow { key: "Cy Diaz".into(), average: 20.0, count: 1 },
            ]
        );
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut c = sample();
        c.clear();

        assert!(c.courses().is_empty());
        assert!(c.grades().is_empty());
        assert!(c.find_grades(&GradeFilter::default()).is_empty());
    }
}

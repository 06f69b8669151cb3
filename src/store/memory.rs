use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::records::{Course, GradeDistribution, Instructor};
use crate::store::{
    Collection, Collections, CourseFilter, GradeFilter, GradeStore, GroupQuery, GroupRow,
    InstructorFilter, NameResolution, ResolutionCounts,
};

/// In-process store for tests and single-run pipelines.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_collections(collections: Collections) -> Self {
        MemoryStore {
            inner: Mutex::new(collections),
        }
    }

    /// Copy of the current state, mostly for assertions.
    pub fn snapshot(&self) -> StoreResult<Collections> {
        self.with("snapshot", Collection::GradeDistributions, |c| Ok(c.clone()))
    }

    fn with<T>(
        &self,
        operation: &'static str,
        collection: Collection,
        f: impl FnOnce(&mut Collections) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned {
            operation,
            collection,
        })?;
        f(&mut guard)
    }
}

#[async_trait]
impl GradeStore for MemoryStore {
    async fn insert_courses(&self, courses: Vec<Course>) -> StoreResult<usize> {
        let inserted = self.with("insert_many", Collection::Courses, |c| c.insert_courses(courses))?;
        debug!(inserted, "Inserted courses");
        Ok(inserted)
    }

    async fn insert_instructors(&self, instructors: Vec<Instructor>) -> StoreResult<usize> {
        self.with("insert_many", Collection::Instructors, |c| {
            c.insert_instructors(instructors)
        })
    }

    async fn insert_grades(&self, grades: Vec<GradeDistribution>) -> StoreResult<usize> {
        let inserted = self.with("insert_many", Collection::GradeDistributions, |c| {
            c.insert_grades(grades)
        })?;
        debug!(inserted, "Inserted grade distributions");
        Ok(inserted)
    }

    async fn find_courses(&self, filter: &CourseFilter) -> StoreResult<Vec<Course>> {
        self.with("find", Collection::Courses, |c| Ok(c.find_courses(filter)))
    }

    async fn find_instructors(&self, filter: &InstructorFilter) -> StoreResult<Vec<Instructor>> {
        self.with("find", Collection::Instructors, |c| Ok(c.find_instructors(filter)))
    }

    async fn find_grades(&self, filter: &GradeFilter) -> StoreResult<Vec<GradeDistribution>> {
        self.with("find", Collection::GradeDistributions, |c| Ok(c.find_grades(filter)))
    }

    async fn distinct_instructor_names(&self) -> StoreResult<Vec<String>> {
        self.with("distinct", Collection::GradeDistributions, |c| {
            Ok(c.distinct_instructor_names())
        })
    }

    async fn distinct_departments(&self) -> StoreResult<Vec<String>> {
        self.with("distinct", Collection::Courses, |c| Ok(c.distinct_departments()))
    }

    async fn apply_resolutions(
        &self,
        resolutions: Vec<NameResolution>,
    ) -> StoreResult<ResolutionCounts> {
        self.with("update_many", Collection::GradeDistributions, |c| {
            c.apply_resolutions(&resolutions)
        })
    }

    async fn upsert_instructors(&self, instructors: Vec<Instructor>) -> StoreResult<usize> {
        self.with("upsert", Collection::Instructors, |c| c.upsert_instructors(instructors))
    }

    async fn group_grades(&self, query: &GroupQuery) -> StoreResult<Vec<GroupRow>> {
        self.with("aggregate", Collection::GradeDistributions, |c| {
            Ok(c.group_grades(query))
        })
    }

    async fn clear(&self) -> StoreResult<()> {
        self.with("delete_many", Collection::GradeDistributions, |c| {
            c.clear();
            Ok(())
        })
    }
}

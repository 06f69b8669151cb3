use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::records::{Course, GradeDistribution, Instructor};
use crate::store::{
    Collection, Collections, CourseFilter, GradeFilter, GradeStore, GroupQuery, GroupRow,
    InstructorFilter, NameResolution, ResolutionCounts,
};

/// Store that keeps each collection as `<dir>/<collection>.json`.
///
/// Every operation reads the current files, so results always reflect the
/// latest completed write. Writes go to a temporary file first and are then
/// renamed over the old one.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            operation: "open",
            collection: Collection::GradeDistributions,
            source,
        })?;
        Ok(JsonFileStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.name()))
    }

    async fn read_collection<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> StoreResult<Vec<T>> {
        let content = match fs::read(self.path(collection)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    operation: "read",
                    collection,
                    source,
                });
            }
        };
        serde_json::from_slice(&content).map_err(|source| StoreError::Serde {
            operation: "read",
            collection,
            source,
        })
    }

    async fn write_collection<T: Serialize + Sync>(
        &self,
        collection: Collection,
        docs: &[T],
    ) -> StoreResult<()> {
        let body = serde_json::to_vec_pretty(docs).map_err(|source| StoreError::Serde {
            operation: "write",
            collection,
            source,
        })?;

        let path = self.path(collection);
        let tmp = path.with_extension("json.tmp");
        let written = match fs::write(&tmp, body).await {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        written.map_err(|source| StoreError::Io {
            operation: "write",
            collection,
            source,
        })?;

        debug!(path = %path.display(), docs = docs.len(), "Wrote collection");
        Ok(())
    }

    async fn load(&self) -> StoreResult<Collections> {
        Ok(Collections::from_parts(
            self.read_collection(Collection::Courses).await?,
            self.read_collection(Collection::Instructors).await?,
            self.read_collection(Collection::GradeDistributions).await?,
        ))
    }

    async fn save(&self, collections: &Collections, which: &[Collection]) -> StoreResult<()> {
        for collection in which {
            match collection {
                Collection::Courses => {
                    self.write_collection(*collection, collections.courses()).await?
                }
                Collection::Instructors => {
                    self.write_collection(*collection, collections.instructors()).await?
                }
                Collection::GradeDistributions => {
                    self.write_collection(*collection, collections.grades()).await?
                }
            }
        }
        Ok(())
    }

    async fn read<T>(&self, f: impl FnOnce(&Collections) -> T + Send) -> StoreResult<T> {
        Ok(f(&self.load().await?))
    }

    async fn mutate<T>(
        &self,
        collection: Collection,
        f: impl FnOnce(&mut Collections) -> StoreResult<T> + Send,
    ) -> StoreResult<T> {
        let mut collections = self.load().await?;
        let out = f(&mut collections)?;
        self.save(&collections, &[collection]).await?;
        Ok(out)
    }
}

#[async_trait]
impl GradeStore for JsonFileStore {
    #[tracing::instrument(skip_all, fields(count = courses.len()))]
    async fn insert_courses(&self, courses: Vec<Course>) -> StoreResult<usize> {
        self.mutate(Collection::Courses, |c| c.insert_courses(courses)).await
    }

    #[tracing::instrument(skip_all, fields(count = instructors.len()))]
    async fn insert_instructors(&self, instructors: Vec<Instructor>) -> StoreResult<usize> {
        self.mutate(Collection::Instructors, |c| c.insert_instructors(instructors))
            .await
    }

    #[tracing::instrument(skip_all, fields(count = grades.len()))]
    async fn insert_grades(&self, grades: Vec<GradeDistribution>) -> StoreResult<usize> {
        self.mutate(Collection::GradeDistributions, |c| c.insert_grades(grades))
            .await
    }

    async fn find_courses(&self, filter: &CourseFilter) -> StoreResult<Vec<Course>> {
        self.read(|c| c.find_courses(filter)).await
    }

    async fn find_instructors(&self, filter: &InstructorFilter) -> StoreResult<Vec<Instructor>> {
        self.read(|c| c.find_instructors(filter)).await
    }

    async fn find_grades(&self, filter: &GradeFilter) -> StoreResult<Vec<GradeDistribution>> {
        self.read(|c| c.find_grades(filter)).await
    }

    async fn distinct_instructor_names(&self) -> StoreResult<Vec<String>> {
        self.read(Collections::distinct_instructor_names).await
    }

    async fn distinct_departments(&self) -> StoreResult<Vec<String>> {
        self.read(Collections::distinct_departments).await
    }

    #[tracing::instrument(skip_all, fields(count = resolutions.len()))]
    async fn apply_resolutions(
        &self,
        resolutions: Vec<NameResolution>,
    ) -> StoreResult<ResolutionCounts> {
        self.mutate(Collection::GradeDistributions, |c| {
            c.apply_resolutions(&resolutions)
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(count = instructors.len()))]
    async fn upsert_instructors(&self, instructors: Vec<Instructor>) -> StoreResult<usize> {
        self.mutate(Collection::Instructors, |c| c.upsert_instructors(instructors))
            .await
    }

    async fn group_grades(&self, query: &GroupQuery) -> StoreResult<Vec<GroupRow>> {
        self.read(|c| c.group_grades(query)).await
    }

    #[tracing::instrument(skip_all)]
    async fn clear(&self) -> StoreResult<()> {
        self.save(&Collections::default(), &Collection::ALL).await
    }
}

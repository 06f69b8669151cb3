//! Instructor identity reconciliation.
//!
//! Grade records and the faculty roster spell names differently. The
//! [`Resolver`] rewrites every stored instructor name into the canonical
//! `First [Middle] Last` form and flags whether that person is on the roster.
//! Running it again over already-resolved data changes nothing.

pub mod name;
pub mod roster;

pub use name::{PersonName, canonicalize};
pub use roster::{Roster, RosterEntry};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::records::Instructor;
use crate::store::{GradeFilter, GradeStore, InstructorFilter, NameResolution};

/// Counts from one resolution pass.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionSummary {
    pub finished_at: DateTime<Utc>,
    /// Distinct stored names examined.
    pub names_seen: usize,
    /// Distinct names whose canonical form differed.
    pub names_rewritten: usize,
    /// Grade records whose `instructor_name` changed.
    pub records_renamed: usize,
    /// Grade records whose `is_regular_faculty` changed.
    pub status_changes: usize,
    /// Distinct canonical names found on the roster.
    pub faculty_matched: usize,
    pub instructors_upserted: usize,
    /// Stored names that canonicalize to nothing.
    pub blank_names: usize,
}

impl ResolutionSummary {
    pub fn records_modified(&self) -> usize {
        self.records_renamed + self.status_changes
    }
}

/// Canonical form of one stored name and its roster match, if any.
#[derive(Debug, Clone)]
pub struct ResolvedName<'r> {
    pub canonical: String,
    pub roster_match: Option<&'r RosterEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchReport {
    /// (stored name, roster name) pairs.
    pub matched: Vec<(String, String)>,
    pub unmatched: Vec<String>,
}

/// Decision for one canonical name, merged over every stored spelling.
#[derive(Debug, Default)]
struct Target {
    is_faculty: bool,
    /// Decided from the roster in this pass rather than kept from storage.
    from_roster: bool,
    departments: BTreeSet<String>,
}

fn lookup_name(raw: &str) -> PersonName {
    if raw.contains(',') {
        PersonName::from_record(raw)
    } else {
        PersonName::from_roster(raw)
    }
}

pub struct Resolver<'a, S: GradeStore + ?Sized> {
    store: &'a S,
    roster: &'a Roster,
}

impl<'a, S: GradeStore + ?Sized> Resolver<'a, S> {
    pub fn new(store: &'a S, roster: &'a Roster) -> Self {
        Resolver { store, roster }
    }

    /// Canonicalizes a stored name and looks it up on the roster.
    ///
    /// Names with a comma are read in the record convention. Names without
    /// one are already in display order and are read in the roster one.
    pub fn resolve_name(&self, raw: &str) -> ResolvedName<'a> {
        let roster: &'a Roster = self.roster;
        let name = lookup_name(raw);
        let roster_match = roster.find_match(&name);
        ResolvedName {
            canonical: canonicalize(raw),
            roster_match,
        }
    }

    /// Upserts one regular-faculty instructor per roster name.
    #[tracing::instrument(skip(self), fields(roster_entries = self.roster.len()))]
    pub async fn load_roster(&self) -> StoreResult<usize> {
        let changed = self.store.upsert_instructors(self.roster.instructors()).await?;
        info!(changed, "Roster loaded");
        Ok(changed)
    }

    /// Rewrites every stored instructor name and faculty flag.
    ///
    /// A comma-free name that already carries a flag was written by an
    /// earlier pass; its flag is kept rather than looked up again. All
    /// changes go to the store as two bulk writes.
    #[tracing::instrument(skip(self), fields(roster_entries = self.roster.len()))]
    pub async fn run(&self) -> StoreResult<ResolutionSummary> {
        if self.roster.is_empty() {
            warn!("Roster is empty; every instructor will be flagged as non-faculty");
        }

        let mut stored_flags: BTreeMap<String, BTreeSet<bool>> = BTreeMap::new();
        for grade in self.store.find_grades(&GradeFilter::default()).await? {
            let flags = stored_flags.entry(grade.instructor_name).or_default();
            flags.extend(grade.is_regular_faculty);
        }

        let mut summary = ResolutionSummary {
            finished_at: Utc::now(),
            names_seen: stored_flags.len(),
            names_rewritten: 0,
            records_renamed: 0,
            status_changes: 0,
            faculty_matched: 0,
            instructors_upserted: 0,
            blank_names: 0,
        };

        let mut targets: BTreeMap<String, Target> = BTreeMap::new();
        let mut renames: Vec<(&str, String)> = Vec::new();

        for (old, flags) in &stored_flags {
            let canonical = canonicalize(old);
            if canonical.is_empty() {
                warn!(name = %old, "Instructor name is blank after canonicalization");
                summary.blank_names += 1;
                continue;
            }
            if canonical != *old {
                summary.names_rewritten += 1;
            }

            let target = targets.entry(canonical.clone()).or_default();
            if !old.contains(',') && !flags.is_empty() {
                target.is_faculty |= flags.contains(&true);
            } else {
                let name = lookup_name(old);
                if self.roster.contains(&name) {
                    target.is_faculty = true;
                    target.departments.extend(self.roster.departments_for(&name));
                }
                target.from_roster = true;
            }

            debug!(from = %old, to = %canonical, "Resolved instructor");
            renames.push((old.as_str(), canonical));
        }

        let resolutions: Vec<NameResolution> = renames
            .into_iter()
            .map(|(from, to)| NameResolution {
                from: from.to_string(),
                is_regular_faculty: targets.get(&to).is_some_and(|t| t.is_faculty),
                to,
            })
            .collect();
        if !resolutions.is_empty() {
            let counts = self.store.apply_resolutions(resolutions).await?;
            summary.records_renamed = counts.renamed;
            summary.status_changes = counts.status_changes;
        }

        let known: BTreeSet<String> = self
            .store
            .find_instructors(&InstructorFilter::default())
            .await?
            .into_iter()
            .map(|i| i.name)
            .collect();
        summary.faculty_matched = targets.values().filter(|t| t.is_faculty).count();

        let instructors: Vec<Instructor> = targets
            .into_iter()
            .filter(|(name, target)| target.from_roster || !known.contains(name))
            .map(|(name, target)| {
                let mut instructor = Instructor::new(&name, target.is_faculty);
                instructor.departments = target.departments;
                instructor
            })
            .collect();
        if !instructors.is_empty() {
            summary.instructors_upserted = self.store.upsert_instructors(instructors).await?;
        }

        summary.finished_at = Utc::now();
        info!(
            names_seen = summary.names_seen,
            names_rewritten = summary.names_rewritten,
            records_modified = summary.records_modified(),
            faculty_matched = summary.faculty_matched,
            blank_names = summary.blank_names,
            "Identity resolution complete"
        );
        Ok(summary)
    }

    /// Which stored names have a roster counterpart, without writing anything.
    pub async fn match_report(&self) -> StoreResult<MatchReport> {
        let mut report = MatchReport::default();

        for old in self.store.distinct_instructor_names().await? {
            match self.resolve_name(&old).roster_match {
                Some(entry) => report.matched.push((old, entry.name.display())),
                None => report.unmatched.push(old),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Course, GradeDistribution};
    use crate::store::MemoryStore;

    const ROSTER: &str = "Mathematics:\nJane A. Doe\nBo Park\n";

    async fn store_with(names: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        let course = Course::new("MATH", 111);
        let grades = names
            .iter()
            .map(|n| {
                GradeDistribution::new(&course, n, 2014, "Fall 2014").with_percentages(50.0, 5.0)
            })
            .collect();
        store.insert_grades(grades).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_rewrites_names_and_flags() {
        let store = store_with(&["Doe, Jane", "Doe, Jane", "Lee, Ann K."]).await;
        let roster = Roster::parse(ROSTER, ':');

        let summary = Resolver::new(&store, &roster).run().await.unwrap();

        assert_eq!(summary.names_seen, 2);
        assert_eq!(summary.names_rewritten, 2);
        assert_eq!(summary.records_renamed, 3);
        assert_eq!(summary.faculty_matched, 1);

        let grades = store.find_grades(&GradeFilter::default()).await.unwrap();
        let jane: Vec<_> = grades.iter().filter(|g| g.instructor_name == "Jane Doe").collect();
        assert_eq!(jane.len(), 2);
        assert!(jane.iter().all(|g| g.is_regular_faculty == Some(true)));

        let ann = grades.iter().find(|g| g.instructor_name == "Ann K. Lee").unwrap();
        assert_eq!(ann.is_regular_faculty, Some(false));
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let store = store_with(&["Doe, Jane", "Park, Bo Q.", "Lee, Ann", "Staff"]).await;
        let roster = Roster::parse(ROSTER, ':');
        let resolver = Resolver::new(&store, &roster);

        let first = resolver.run().await.unwrap();
        let before = store.snapshot().unwrap();
        let second = resolver.run().await.unwrap();
        let after = store.snapshot().unwrap();

        assert!(first.records_modified() > 0);
        assert_eq!(second.records_modified(), 0);
        assert_eq!(second.names_rewritten, 0);
        assert_eq!(second.instructors_upserted, 0);
        assert_eq!(before.grades(), after.grades());
        assert_eq!(before.instructors(), after.instructors());
    }

    #[tokio::test]
    async fn test_matched_instructor_joins_faculty_filter() {
        let store = store_with(&["Doe, Jane"]).await;
        let roster = Roster::parse(ROSTER, ':');
        let resolver = Resolver::new(&store, &roster);

        resolver.load_roster().await.unwrap();
        resolver.run().await.unwrap();

        let faculty = store
            .find_instructors(&InstructorFilter::regular_faculty())
            .await
            .unwrap();
        let names: Vec<_> = faculty.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"Jane Doe"));
        assert!(names.contains(&"Jane A. Doe"));

        let jane = faculty.iter().find(|i| i.name == "Jane Doe").unwrap();
        assert!(jane.departments.contains("Mathematics"));
    }

    #[tokio::test]
    async fn test_conflicting_middle_initial_is_not_faculty() {
        let store = store_with(&["Doe, Jane B."]).await;
        let roster = Roster::parse(ROSTER, ':');

        let summary = Resolver::new(&store, &roster).run().await.unwrap();

        assert_eq!(summary.faculty_matched, 0);
    }

    #[tokio::test]
    async fn test_multi_word_last_name_keeps_its_own_identity() {
        let store = store_with(&["De La Cruz, Maria"]).await;
        let roster = Roster::parse("Mathematics:\nMaria Cruz\n", ':');
        let resolver = Resolver::new(&store, &roster);

        let first = resolver.run().await.unwrap();
        let second = resolver.run().await.unwrap();

        assert_eq!(first.faculty_matched, 0);
        assert_eq!(second.faculty_matched, 0);
        assert_eq!(second.records_modified(), 0);
        let grades = store.find_grades(&GradeFilter::default()).await.unwrap();
        assert_eq!(grades[0].instructor_name, "Maria De La Cruz");
        assert_eq!(grades[0].is_regular_faculty, Some(false));
    }

    #[tokio::test]
    async fn test_departments_stay_put_across_passes() {
        let store = store_with(&["Park, Bo"]).await;
        let roster = Roster::parse("Mathematics:\nBo Park\nPhysics:\nBo K. Park\n", ':');
        let resolver = Resolver::new(&store, &roster);

        resolver.load_roster().await.unwrap();
        resolver.run().await.unwrap();
        let reloaded = resolver.load_roster().await.unwrap();
        let second = resolver.run().await.unwrap();

        assert_eq!(reloaded, 0);
        assert_eq!(second.instructors_upserted, 0);
        let bo = store
            .find_instructors(&InstructorFilter::regular_faculty())
            .await
            .unwrap()
            .into_iter()
            .find(|i| i.name == "Bo Park")
            .unwrap();
        assert_eq!(bo.departments.iter().collect::<Vec<_>>(), ["Mathematics"]);
    }

    #[tokio::test]
    async fn test_spellings_of_one_person_share_a_flag() {
        let store = store_with(&["Doe, Jane", "Jane Doe"]).await;
        let roster = Roster::parse(ROSTER, ':');

        let summary = Resolver::new(&store, &roster).run().await.unwrap();

        assert_eq!(summary.names_seen, 2);
        assert_eq!(summary.faculty_matched, 1);
        let grades = store.find_grades(&GradeFilter::default()).await.unwrap();
        assert!(grades.iter().all(|g| g.instructor_name == "Jane Doe"));
        assert!(grades.iter().all(|g| g.is_regular_faculty == Some(true)));
    }

    #[tokio::test]
    async fn test_blank_name_is_skipped() {
        let store = store_with(&[" "]).await;
        let roster = Roster::parse(ROSTER, ':');

        let summary = Resolver::new(&store, &roster).run().await.unwrap();

        assert_eq!(summary.blank_names, 1);
        assert_eq!(summary.instructors_upserted, 0);
    }

    #[tokio::test]
    async fn test_match_report_is_read_only() {
        let store = store_with(&["Doe, Jane", "Lee, Ann"]).await;
        let roster = Roster::parse(ROSTER, ':');

        let report = Resolver::new(&store, &roster).match_report().await.unwrap();

        assert_eq!(report.matched, vec![("Doe, Jane".to_string(), "Jane A. Doe".to_string())]);
        assert_eq!(report.unmatched, vec!["Lee, Ann".to_string()]);
        assert_eq!(store.distinct_instructor_names().await.unwrap(), ["Doe, Jane", "Lee, Ann"]);
    }
}

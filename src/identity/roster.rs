//! Faculty roster parsing.
//!
//! The roster is plain text grouped into department sections:
//!
//! ```text
//! Mathematics:
//! Jane A. Doe
//! Bo Park
//!
//! Physics:
//! Cy Diaz
//! ```
//!
//! Lines ending in the delimiter are section headers, blank lines are
//! ignored, every other line is one full name. Anything after a comma on a
//! name line (titles, years) is dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::identity::name::PersonName;
use crate::records::Instructor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Header of the section the name appeared under, if any.
    pub department: Option<String>,
    pub name: PersonName,
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
    by_last: HashMap<String, Vec<usize>>,
}

impl Roster {
    pub fn parse(text: &str, delimiter: char) -> Self {
        let mut department = None;
        let mut entries = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(header) = line.strip_suffix(delimiter) {
                department = Some(header.trim().to_string());
                continue;
            }

            let full = line.split(',').next().unwrap_or(line);
            let name = PersonName::from_roster(full);
            if !name.is_empty() {
                entries.push(RosterEntry {
                    department: department.clone(),
                    name,
                });
            }
        }

        Self::from_entries(entries)
    }

    pub fn load(path: impl AsRef<Path>, delimiter: char) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text, delimiter))
    }

    pub fn from_entries(entries: Vec<RosterEntry>) -> Self {
        let mut by_last: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, entry) in entries.iter().enumerate() {
            by_last.entry(entry.name.last_key()).or_default().push(pos);
        }
        Roster { entries, by_last }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First roster entry matching `name`, in roster order.
    pub fn find_match(&self, name: &PersonName) -> Option<&RosterEntry> {
        self.by_last
            .get(&name.last_key())?
            .iter()
            .map(|&pos| &self.entries[pos])
            .find(|entry| entry.name.matches(name))
    }

    pub fn contains(&self, name: &PersonName) -> bool {
        self.find_match(name).is_some()
    }

    /// Departments for `name`. Entries spelled exactly like `name` win;
    /// otherwise every wildcard match contributes.
    pub fn departments_for(&self, name: &PersonName) -> BTreeSet<String> {
        let candidates: Vec<&RosterEntry> = self
            .by_last
            .get(&name.last_key())
            .into_iter()
            .flatten()
            .map(|&pos| &self.entries[pos])
            .filter(|entry| entry.name.matches(name))
            .collect();

        let display = name.display();
        let exact: Vec<&RosterEntry> = candidates
            .iter()
            .copied()
            .filter(|entry| entry.name.display() == display)
            .collect();
        let chosen = if exact.is_empty() { candidates } else { exact };

        chosen
            .into_iter()
            .filter_map(|entry| entry.department.clone())
            .collect()
    }

    /// One regular-faculty [`Instructor`] per distinct roster name, carrying
    /// every section it was listed under. Sorted by name.
    pub fn instructors(&self) -> Vec<Instructor> {
        let mut by_name: BTreeMap<String, Instructor> = BTreeMap::new();

        for entry in &self.entries {
            let display = entry.name.display();
            let instructor = by_name
                .entry(display.clone())
                .or_insert_with(|| Instructor::new(&display, true));
            if let Some(department) = &entry.department {
                instructor.departments.insert(department.clone());
            }
        }

        by_name.into_values().collect()
    }
}

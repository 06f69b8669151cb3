//! Instructor name canonicalization.
//!
//! Two conventions meet here: the faculty roster lists people as
//! `First [Middle] Last`, grade records list them as `Last, First [M.]`.
//! Both are parsed into a [`PersonName`], rendered back as
//! `First [Middle] Last`, and compared with [`PersonName::matches`].

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonName {
    pub first: String,
    /// Middle name(s) or initial; empty when unknown.
    pub middle: String,
    pub last: String,
}

impl PersonName {
    pub fn new(first: &str, middle: &str, last: &str) -> Self {
        PersonName {
            first: first.to_string(),
            middle: middle.to_string(),
            last: last.to_string(),
        }
    }

    /// Parses `First [Middle...] Last`. One token is a bare last name; with
    /// four or more tokens every inner token joins the middle name.
    pub fn from_roster(raw: &str) -> Self {
        let parts: Vec<&str> = raw.split_whitespace().collect();

        match parts.as_slice() {
            [] => PersonName::default(),
            [last] => PersonName::new("", "", last),
            [first, last] => PersonName::new(first, "", last),
            [first, middle @ .., last] => PersonName::new(first, &middle.join(" "), last),
        }
    }

    /// Parses `Last, First [M.]` as found on grade records.
    ///
    /// The token after the first name only counts as a middle initial when it
    /// contains a period, which keeps second given names and suffixes out.
    /// A name without a comma is taken to be a bare last name, so an already
    /// canonical name renders back unchanged.
    pub fn from_record(raw: &str) -> Self {
        let Some((last, rest)) = raw.split_once(',') else {
            return PersonName::new("", "", &collapse_ws(raw));
        };

        let mut rest = rest.split_whitespace();
        let first = rest.next().unwrap_or_default();
        let middle = rest.next().filter(|t| t.contains('.')).unwrap_or_default();

        PersonName::new(first, middle, &collapse_ws(last))
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty() && self.middle.is_empty() && self.last.is_empty()
    }

    /// Non-empty components joined by single spaces.
    pub fn display(&self) -> String {
        [&self.first, &self.middle, &self.last]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lower-cased last name, the bucket key for roster lookups.
    pub fn last_key(&self) -> String {
        fold(&self.last)
    }

    /// First and last names must agree ignoring case and spacing. Middle
    /// names are only compared when both sides have one; a missing middle
    /// matches anything.
    pub fn matches(&self, other: &PersonName) -> bool {
        if self.last.is_empty() || other.last.is_empty() {
            return false;
        }

        let same_core =
            fold(&self.first) == fold(&other.first) && fold(&self.last) == fold(&other.last);
        if self.middle.is_empty() || other.middle.is_empty() {
            return same_core;
        }

        same_core && fold(&self.middle) == fold(&other.middle)
    }
}

impl fmt::Display for PersonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Canonical display form of a grade-record name.
pub fn canonicalize(raw: &str) -> String {
    PersonName::from_record(raw).display()
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold(s: &str) -> String {
    collapse_ws(s).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_token_counts() {
        assert_eq!(PersonName::from_roster("Doe"), PersonName::new("", "", "Doe"));
        assert_eq!(PersonName::from_roster("Jane Doe"), PersonName::new("Jane", "", "Doe"));
        assert_eq!(
            PersonName::from_roster("  Jane   A.  Doe "),
            PersonName::new("Jane", "A.", "Doe")
        );
        assert_eq!(
            PersonName::from_roster("Mary Ann Lou Smith"),
            PersonName::new("Mary", "Ann Lou", "Smith")
        );
        assert!(PersonName::from_roster("   ").is_empty());
    }

    #[test]
    fn test_record_name_with_initial() {
        let name = PersonName::from_record("Doe, Jane A.");
        assert_eq!(name, PersonName::new("Jane", "A.", "Doe"));
        assert_eq!(name.display(), "Jane A. Doe");
    }

    #[test]
    fn test_record_second_token_without_period_is_dropped() {
        assert_eq!(PersonName::from_record("Doe, Jane Marie").display(), "Jane Doe");
        assert_eq!(PersonName::from_record("Doe, Jane Jr").display(), "Jane Doe");
    }

    #[test]
    fn test_record_without_comma_is_unchanged() {
        assert_eq!(PersonName::from_record("Staff").display(), "Staff");
        assert_eq!(canonicalize("Jane A. Doe"), "Jane A. Doe");
        assert_eq!(canonicalize("Jane  Doe"), "Jane Doe");
    }

    #[test]
    fn test_record_comma_without_first_name() {
        assert_eq!(PersonName::from_record("Doe,").display(), "Doe");
        assert_eq!(PersonName::from_record("").display(), "");
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        for raw in ["Doe, Jane A.", "Doe, Jane", "Van Buren, Martin", "Staff"] {
            let once = canonicalize(raw);
            assert_eq!(canonicalize(&once), once);
        }
    }

    #[test]
    fn test_missing_middle_is_wildcard() {
        let ann = PersonName::new("Ann", "", "Lee");
        let ann_m = PersonName::new("Ann", "M", "Lee");
        let ann_k = PersonName::new("Ann", "K", "Lee");

        assert!(ann.matches(&ann_m));
        assert!(ann_m.matches(&ann));
        assert!(!ann_m.matches(&ann_k));
    }

    #[test]
    fn test_match_ignores_case_and_spacing() {
        let a = PersonName::new("JANE", "a.", "Van  Buren");
        let b = PersonName::new("jane", "A.", "van Buren");
        assert!(a.matches(&b));
    }

    #[test]
    fn test_different_first_name_does_not_match() {
        let a = PersonName::new("Jane", "", "Doe");
        let b = PersonName::new("John", "", "Doe");
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_empty_names_never_match() {
        assert!(!PersonName::default().matches(&PersonName::default()));
    }
}

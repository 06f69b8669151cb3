use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tunables applied while normalizing source rows.
///
/// Stored as JSON; every field is optional:
/// ```json
/// {
///   "year_min": 2013,
///   "year_max": 2016,
///   "skip_all_zero": true,
///   "missing_markers": ["", "NA", "#VALUE!"],
///   "roster_delimiter": ":"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportRules {
    /// Academic years outside `year_min..=year_max` are still imported but
    /// reported as out of range.
    pub year_min: i32,
    pub year_max: i32,
    /// Drop rows whose A, D and F percentages are all zero.
    pub skip_all_zero: bool,
    /// Cell values read as "no data". Compared case-insensitively after trimming.
    pub missing_markers: Vec<String>,
    pub roster_delimiter: char,
}

impl Default for ImportRules {
    fn default() -> Self {
        ImportRules {
            year_min: 2013,
            year_max: 2016,
            skip_all_zero: true,
            missing_markers: ["", "NA", "N/A", "#N/A", "#VALUE!", "#DIV/0!", "#REF!"]
                .into_iter()
                .map(String::from)
                .collect(),
            roster_delimiter: ':',
        }
    }
}

impl ImportRules {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading import rules from {}", path.display()))?;
        let rules: ImportRules = serde_json::from_str(&content)
            .with_context(|| format!("parsing import rules in {}", path.display()))?;
        anyhow::ensure!(
            rules.year_min <= rules.year_max,
            "year_min {} is after year_max {}",
            rules.year_min,
            rules.year_max
        );
        Ok(rules)
    }

    pub fn is_missing(&self, raw: &str) -> bool {
        let raw = raw.trim();
        self.missing_markers
            .iter()
            .any(|m| m.trim().eq_ignore_ascii_case(raw))
    }

    pub fn year_in_range(&self, year: i32) -> bool {
        (self.year_min..=self.year_max).contains(&year)
    }
}

/// Process-level settings read from the environment (after `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Directory holding the JSON collections.
    pub data_dir: PathBuf,
    pub log_file_path: PathBuf,
    pub import_rules_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Settings {
            data_dir: get("EASYA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            log_file_path: get("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs/easya.log")),
            import_rules_path: get("EASYA_IMPORT_RULES").map(PathBuf::from),
        }
    }

    /// Rules from `EASYA_IMPORT_RULES` when set, defaults otherwise.
    pub fn import_rules(&self) -> Result<ImportRules> {
        match &self.import_rules_path {
            Some(path) => ImportRules::load(path),
            None => Ok(ImportRules::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let rules = ImportRules::default();
        assert_eq!((rules.year_min, rules.year_max), (2013, 2016));
        assert!(rules.skip_all_zero);
        assert!(rules.is_missing("#value!"));
        assert!(rules.is_missing("  "));
        assert!(!rules.is_missing("0"));
        assert!(rules.year_in_range(2016));
        assert!(!rules.year_in_range(2017));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"skip_all_zero": false, "year_max": 2020}}"#).unwrap();

        let rules = ImportRules::load(file.path()).unwrap();

        assert!(!rules.skip_all_zero);
        assert_eq!(rules.year_max, 2020);
        assert_eq!(rules.year_min, 2013);
        assert_eq!(rules.roster_delimiter, ':');
    }

    #[test]
    fn test_load_rejects_inverted_years() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"year_min": 2018, "year_max": 2014}}"#).unwrap();

        assert!(ImportRules::load(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(ImportRules::load("/nonexistent/rules.json").is_err());
    }

    #[test]
    fn test_settings_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("EASYA_DATA_DIR", "/srv/easya"),
            ("LOG_FILE_PATH", ""),
        ]);
        let settings = Settings::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.data_dir, PathBuf::from("/srv/easya"));
        assert_eq!(settings.log_file_path, PathBuf::from("logs/easya.log"));
        assert_eq!(settings.import_rules_path, None);
        assert_eq!(settings.import_rules().unwrap(), ImportRules::default());
    }
}

//! Schema selection by file name or parent directory name

use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which part of the path a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    FileName,
    ParentDirName,
}

impl FromStr for MatchType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filename" => Ok(MatchType::FileName),
            "parentdirname" => Ok(MatchType::ParentDirName),
            _ => Err(()),
        }
    }
}

/// How the pattern is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    Is,
    StartsWith,
    EndsWith,
}

impl FromStr for MatchMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "is" => Ok(MatchMethod::Is),
            "startswith" => Ok(MatchMethod::StartsWith),
            "endswith" => Ok(MatchMethod::EndsWith),
            _ => Err(()),
        }
    }
}

/// One profile entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRule {
    pub match_type: MatchType,
    pub match_method: MatchMethod,
    pub pattern: String,
    pub schema_path: PathBuf,
}

impl SchemaRule {
    pub fn matches(&self, file: &Path) -> bool {
        let component = match self.match_type {
            MatchType::FileName => file.file_name(),
            MatchType::ParentDirName => file.parent().and_then(Path::file_name),
        };
        let component = match component {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };

        match self.match_method {
            MatchMethod::Is => component == self.pattern.as_str(),
            MatchMethod::StartsWith => component.starts_with(self.pattern.as_str()),
            MatchMethod::EndsWith => component.ends_with(self.pattern.as_str()),
        }
    }
}

/// Outcome of schema selection for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Schema(PathBuf),
    NoMatch,
}

/// Select the schema for `file`.
///
/// All rules are evaluated in order and the last matching one wins, so a
/// later rule overrides an earlier one for files that satisfy both.
///
/// # Arguments
/// * `rules` - Profile rules in declaration order
/// * `file` - PDF path; only its name and immediate parent directory are used
///
/// # Returns
/// The schema of the last matching rule, or `Resolution::NoMatch`
pub fn resolve(rules: &[SchemaRule], file: &Path) -> Resolution {
    let mut selected = Resolution::NoMatch;
    for rule in rules {
        if rule.matches(file) {
            selected = Resolution::Schema(rule.schema_path.clone());
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(match_type: MatchType, match_method: MatchMethod, pattern: &str, schema: &str) -> SchemaRule {
        SchemaRule {
            match_type,
            match_method,
            pattern: pattern.to_string(),
            schema_path: PathBuf::from(schema),
        }
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let rules = vec![
            rule(MatchType::ParentDirName, MatchMethod::Is, "A", "S1"),
            rule(MatchType::ParentDirName, MatchMethod::Is, "A", "S2"),
        ];
        assert_eq!(
            resolve(&rules, Path::new("/batch/A/file.pdf")),
            Resolution::Schema(PathBuf::from("S2"))
        );
    }

    #[test]
    fn test_earlier_match_kept_when_later_rules_miss() {
        let rules = vec![
            rule(MatchType::ParentDirName, MatchMethod::Is, "A", "S1"),
            rule(MatchType::FileName, MatchMethod::EndsWith, "_85.pdf", "S2"),
        ];
        assert_eq!(
            resolve(&rules, Path::new("/batch/A/scan_50.pdf")),
            Resolution::Schema(PathBuf::from("S1"))
        );
    }

    #[test]
    fn test_no_match() {
        let rules = vec![rule(MatchType::ParentDirName, MatchMethod::Is, "300ppi-50", "S1")];
        assert_eq!(resolve(&rules, Path::new("/batch/other/a.pdf")), Resolution::NoMatch);
        assert_eq!(resolve(&[], Path::new("/batch/other/a.pdf")), Resolution::NoMatch);
    }

    #[test]
    fn test_parent_is_immediate_directory_only() {
        let rules = vec![rule(MatchType::ParentDirName, MatchMethod::Is, "300ppi-50", "S1")];
        assert_eq!(
            resolve(&rules, Path::new("/batch/300ppi-50/sub/a.pdf")),
            Resolution::NoMatch
        );
    }

    #[test]
    fn test_match_methods() {
        let file = Path::new("/batch/master-tiffs/kort004_01_85.pdf");
        assert!(rule(MatchType::FileName, MatchMethod::StartsWith, "kort004", "S").matches(file));
        assert!(rule(MatchType::FileName, MatchMethod::EndsWith, "_85.pdf", "S").matches(file));
        assert!(rule(MatchType::FileName, MatchMethod::Is, "kort004_01_85.pdf", "S").matches(file));
        assert!(rule(MatchType::ParentDirName, MatchMethod::StartsWith, "master", "S").matches(file));
        assert!(!rule(MatchType::ParentDirName, MatchMethod::EndsWith, "master", "S").matches(file));
    }

    #[test]
    fn test_pattern_match_is_case_sensitive() {
        let file = Path::new("/batch/A/file.pdf");
        assert!(!rule(MatchType::ParentDirName, MatchMethod::Is, "a", "S").matches(file));
    }

    #[test]
    fn test_parse_match_keywords() {
        assert_eq!("startsWith".parse::<MatchMethod>(), Ok(MatchMethod::StartsWith));
        assert_eq!("endswith".parse::<MatchMethod>(), Ok(MatchMethod::EndsWith));
        assert_eq!("parentDirName".parse::<MatchType>(), Ok(MatchType::ParentDirName));
        assert!("contains".parse::<MatchMethod>().is_err());
    }
}

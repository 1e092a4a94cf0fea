//! Configuration for factgraph.
//!
//! Every key is optional. A missing file means defaults; a malformed value
//! is reported once and replaced by its default (see [`Config::sanitize`]).

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::extract::types::ServiceCategory;
use crate::extract::{ScanOptions, DEFAULT_INTERNAL_KEYWORDS};

/// File names looked up in the scan root, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["factgraph.yaml", ".factgraph.yaml"];

pub const DEFAULT_INCLUDE: &str = "**/*.{js,jsx,ts,tsx,mjs,cjs,prisma}";
pub const DEFAULT_LIMIT: usize = 100;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;
pub const DEFAULT_MAX_FILE_KB: u64 = 1024;

/// How the aggregator resolves two files describing the same route differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The file later in path order wins.
    #[default]
    LastWins,
    FirstWins,
    /// Abort the run.
    Error,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Inclusion globs, matched against paths relative to the scan root.
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    /// Extra exclusion globs. Dependency, build and test directories are
    /// always excluded.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Per-category output bound
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: i64,
    #[serde(default = "default_max_file_kb")]
    pub max_file_kb: i64,
    /// "business" or "utility"
    #[serde(default = "default_category")]
    pub default_service_category: String,
    #[serde(default = "default_internal_keywords")]
    pub internal_path_keywords: Vec<String>,
    /// Globs over normalized route paths (`*` does not cross `/`).
    #[serde(default)]
    pub excluded_routes: Vec<String>,
    #[serde(default)]
    pub association_conflicts: ConflictPolicy,
}

fn default_include() -> Vec<String> {
    vec![DEFAULT_INCLUDE.to_string()]
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT as i64
}

fn default_max_in_flight() -> i64 {
    DEFAULT_MAX_IN_FLIGHT as i64
}

fn default_max_file_kb() -> i64 {
    DEFAULT_MAX_FILE_KB as i64
}

fn default_category() -> String {
    ServiceCategory::default().to_string()
}

fn default_internal_keywords() -> Vec<String> {
    DEFAULT_INTERNAL_KEYWORDS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: Vec::new(),
            limit: default_limit(),
            max_in_flight: default_max_in_flight(),
            max_file_kb: default_max_file_kb(),
            default_service_category: default_category(),
            internal_path_keywords: default_internal_keywords(),
            excluded_routes: Vec::new(),
            association_conflicts: ConflictPolicy::default(),
        }
    }
}

fn route_glob(pattern: &str) -> Result<globset::Glob, globset::Error> {
    GlobBuilder::new(pattern).literal_separator(true).build()
}

/// Keep only the patterns that compile, recording an error for the rest.
fn retain_valid_globs(
    patterns: &mut Vec<String>,
    build: fn(&str) -> Result<globset::Glob, globset::Error>,
    problems: &mut Vec<ConfigError>,
) {
    patterns.retain(|pattern| match build(pattern) {
        Ok(_) => true,
        Err(source) => {
            problems.push(ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            });
            false
        }
    });
}

impl Config {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse_str(&content)
    }

    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        // An empty document is a valid, all-defaults configuration.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// The configuration file that applies to `root`, if any: the root's
    /// own file first, then the user config directory.
    pub fn discover(root: &Path) -> Option<PathBuf> {
        let local = CONFIG_FILE_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file());
        if local.is_some() {
            return local;
        }
        ProjectDirs::from("", "", "factgraph")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAMES[0]))
            .filter(|path| path.is_file())
    }

    /// Load the configuration for a scan. An explicit path must parse; a
    /// discovered file that fails to parse is reported and ignored.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::parse_file(path)?,
            None => match Self::discover(root) {
                Some(path) => {
                    debug!(config = %path.display(), "using configuration file");
                    Self::parse_file(&path).unwrap_or_else(|e| {
                        warn!(config = %path.display(), error = %e, "ignoring configuration file");
                        Self::default()
                    })
                }
                None => Self::default(),
            },
        };
        for problem in config.sanitize() {
            warn!("{}, using the default", problem);
        }
        Ok(config)
    }

    /// Replace invalid values by their defaults, returning one error per
    /// replaced value.
    pub fn sanitize(&mut self) -> Vec<ConfigError> {
        let mut problems = Vec::new();

        if self.limit <= 0 {
            problems.push(ConfigError::InvalidLimit(self.limit));
            self.limit = default_limit();
        }
        if self.max_in_flight <= 0 {
            problems.push(ConfigError::InvalidConcurrency(self.max_in_flight));
            self.max_in_flight = default_max_in_flight();
        }
        if self.max_file_kb <= 0 {
            problems.push(ConfigError::InvalidFileSize(self.max_file_kb));
            self.max_file_kb = default_max_file_kb();
        }
        if self.category().is_none() {
            problems.push(ConfigError::UnknownCategory(
                self.default_service_category.clone(),
            ));
            self.default_service_category = default_category();
        }

        retain_valid_globs(&mut self.include, globset::Glob::new, &mut problems);
        if self.include.is_empty() {
            self.include = default_include();
        }
        retain_valid_globs(&mut self.exclude, globset::Glob::new, &mut problems);
        retain_valid_globs(&mut self.excluded_routes, route_glob, &mut problems);

        self.internal_path_keywords = self
            .internal_path_keywords
            .iter()
            .map(|k| k.trim().to_ascii_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        problems
    }

    fn category(&self) -> Option<ServiceCategory> {
        match self.default_service_category.trim().to_ascii_lowercase().as_str() {
            "business" => Some(ServiceCategory::Business),
            "utility" => Some(ServiceCategory::Utility),
            _ => None,
        }
    }

    pub fn limit(&self) -> usize {
        usize::try_from(self.limit)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_LIMIT)
    }

    pub fn max_in_flight(&self) -> usize {
        usize::try_from(self.max_in_flight)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_IN_FLIGHT)
    }

    pub fn max_file_kb(&self) -> u64 {
        u64::try_from(self.max_file_kb)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_FILE_KB)
    }

    /// Detector options derived from this configuration.
    pub fn scan_options(&self) -> Result<ScanOptions, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excluded_routes {
            let glob = route_glob(pattern).map_err(|source| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let excluded_routes = builder.build().map_err(|source| ConfigError::InvalidGlob {
            pattern: self.excluded_routes.join(", "),
            source,
        })?;

        Ok(ScanOptions {
            internal_keywords: self.internal_path_keywords.clone(),
            excluded_routes,
            default_category: self.category().unwrap_or_default(),
        })
    }

    /// Compile a list of plain globs into a set.
    pub fn glob_set(patterns: &[String]) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = globset::Glob::new(pattern).map_err(|source| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|source| ConfigError::InvalidGlob {
            pattern: patterns.join(", "),
            source,
        })
    }

    /// The default configuration as a commented YAML document.
    pub fn template() -> Result<String, ConfigError> {
        let body = serde_yaml::to_string(&Self::default())?;
        Ok(format!(
            "# factgraph configuration\n#\n# Every key is optional. association_conflicts is one of\n# last_wins, first_wins or error.\n{}",
            body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::parse_str("").unwrap();
        assert_eq!(config.limit(), 100);
        assert_eq!(config.max_in_flight(), 64);
        assert_eq!(config.max_file_kb(), 1024);
        assert_eq!(config.include, vec![DEFAULT_INCLUDE.to_string()]);
        assert_eq!(config.association_conflicts, ConflictPolicy::LastWins);
        assert_eq!(config.internal_path_keywords.len(), DEFAULT_INTERNAL_KEYWORDS.len());
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
limit: 25
exclude:
  - "**/legacy/**"
default_service_category: utility
internal_path_keywords: [ops, "Health "]
excluded_routes:
  - "/health*"
association_conflicts: first_wins
"#;
        let mut config = Config::parse_str(yaml).unwrap();
        assert!(config.sanitize().is_empty());
        assert_eq!(config.limit(), 25);
        assert_eq!(config.association_conflicts, ConflictPolicy::FirstWins);
        assert_eq!(config.internal_path_keywords, vec!["ops", "health"]);

        let opts = config.scan_options().unwrap();
        assert_eq!(opts.default_category, ServiceCategory::Utility);
        assert!(opts.excluded_routes.is_match("/healthz"));
        assert!(!opts.excluded_routes.is_match("/health/deep"));
    }

    #[test]
    fn test_sanitize_replaces_invalid_values() {
        let yaml = "limit: -3\nmax_in_flight: 0\ndefault_service_category: core\nexclude: ['a/[b']\n";
        let mut config = Config::parse_str(yaml).unwrap();
        let problems = config.sanitize();
        assert_eq!(problems.len(), 4);
        assert!(matches!(problems[0], ConfigError::InvalidLimit(-3)));
        assert!(matches!(problems[1], ConfigError::InvalidConcurrency(0)));
        assert!(matches!(problems[2], ConfigError::UnknownCategory(_)));
        assert!(matches!(problems[3], ConfigError::InvalidGlob { .. }));
        assert_eq!(config.limit(), 100);
        assert_eq!(config.max_in_flight(), 64);
        assert_eq!(config.default_service_category, "business");
        assert!(config.exclude.is_empty());

        // Reported once: a second pass finds nothing left to fix.
        assert!(config.sanitize().is_empty());
    }

    #[test]
    fn test_unknown_policy_is_parse_error() {
        let err = Config::parse_str("association_conflicts: newest").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_discover_and_load() {
        let dir = TempDir::new().unwrap();
        let mut file = fs::File::create(dir.path().join(".factgraph.yaml")).unwrap();
        writeln!(file, "limit: 7").unwrap();

        assert_eq!(
            Config::discover(dir.path()),
            Some(dir.path().join(".factgraph.yaml"))
        );
        let config = Config::load(dir.path(), None).unwrap();
        assert_eq!(config.limit(), 7);
    }

    #[test]
    fn test_malformed_discovered_file_falls_back() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("factgraph.yaml"), "limit: [nope\n").unwrap();
        let config = Config::load(dir.path(), None).unwrap();
        assert_eq!(config.limit(), 100);

        let explicit = dir.path().join("factgraph.yaml");
        assert!(Config::load(dir.path(), Some(&explicit)).is_err());
    }

    #[test]
    fn test_template_round_trips() {
        let text = Config::template().unwrap();
        assert!(text.starts_with("# factgraph configuration"));
        let parsed = Config::parse_str(&text).unwrap();
        assert_eq!(parsed.limit(), 100);
        assert_eq!(parsed.include, vec![DEFAULT_INCLUDE.to_string()]);
    }
}

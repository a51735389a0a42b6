//! Configuration loading and file filtering.
//!
//! Settings live in a TOML file. Every section is optional; missing values
//! fall back to defaults, so an empty file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [watch]
//! root = "~/WatchZone"
//! home = "~"
//! max_retries = 3
//! interactive = true
//!
//! [filters.exclude]
//! filenames = ["Thumbs.db"]
//! patterns = ["*.part", "*.crdownload"]
//! extensions = ["tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [[rules]]
//! pattern = "*.pdf"
//! destination = "documents/pdfs"
//! notify = "me@example.com"
//!
//! [email]
//! smtp_host = "smtp.gmail.com"
//! smtp_port = 465
//! recipient = "me@example.com"
//! notify_on_relocation = false
//!
//! [logging]
//! level = "info"
//! directory = "~/.local/share/watchzone/logs"
//! max_files = 5
//! ```

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".watchzonerc.toml";

/// Name of the watched folder inside the home directory.
pub const DEFAULT_WATCH_DIR: &str = "WatchZone";

/// Errors that can occur during configuration loading and compilation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// The whole application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub watch: WatchSettings,
    pub filters: FilterRules,
    pub rules: Vec<RouteRule>,
    pub email: EmailSettings,
    pub logging: LoggingConfig,
}

/// Where to watch and where relocated entries go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Folder to watch. Defaults to `~/WatchZone`.
    pub root: Option<PathBuf>,
    /// Base that destinations are relative to. Defaults to the home folder.
    pub home: Option<PathBuf>,
    /// How many relocation attempts a single path gets.
    pub max_retries: u32,
    /// Prompt for destinations (true) or route by `[[rules]]` only (false).
    pub interactive: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            root: None,
            home: None,
            max_retries: 3,
            interactive: true,
        }
    }
}

impl WatchSettings {
    /// The resolved destination base.
    pub fn home(&self) -> PathBuf {
        self.home
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(home_dir)
    }

    /// The resolved watch root.
    pub fn root(&self) -> PathBuf {
        self.root
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| self.home().join(DEFAULT_WATCH_DIR))
    }
}

/// Root-level filter rules configuration.
///
/// Dotfiles are not a filter concern: the watcher always treats them as
/// reserved, whatever these rules say.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files from the watcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.part", "build/**").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "tmp", "crdownload").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// A routing rule for the non-interactive watcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteRule {
    /// Glob matched against the entry's file name.
    pub pattern: String,
    /// Destination folder, relative to the home folder.
    pub destination: String,
    /// Recipient to notify after a successful move.
    #[serde(default)]
    pub notify: Option<String>,
}

/// A routing rule with its glob compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub pattern: Pattern,
    pub destination: String,
    pub notify: Option<String>,
}

/// Outbound email settings. Credentials never live here; they come from
/// `EMAIL_SENDER` and `EMAIL_PASSWORD`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Default recipient for notifications.
    pub recipient: Option<String>,
    /// Send a notification after every successful relocation.
    pub notify_on_relocation: bool,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            recipient: None,
            notify_on_relocation: false,
        }
    }
}

/// Log file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive for the log file (`RUST_LOG` overrides it).
    pub level: String,
    /// Folder holding the rotated log files.
    pub directory: Option<PathBuf>,
    /// How many rotated files to keep.
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            max_files: 5,
        }
    }
}

impl LoggingConfig {
    /// The resolved log directory.
    pub fn directory(&self) -> PathBuf {
        match self.directory.as_deref() {
            Some(dir) => expand_tilde(dir),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| home_dir().join(".local").join("share"))
                .join("watchzone")
                .join("logs"),
        }
    }
}

impl AppConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.watchzonerc.toml` in the current directory
    /// 3. Look for `watchzone/config.toml` in the user config directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any file found cannot be parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("watchzone").join("config.toml");
            if user_config.exists() {
                return Self::load_from_file(&user_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Compile the routing rules, validating every glob.
    pub fn compile_rules(&self) -> Result<Vec<CompiledRule>, ConfigError> {
        self.rules
            .iter()
            .map(|rule| {
                let pattern = Pattern::new(&rule.pattern)
                    .map_err(|_| ConfigError::InvalidGlobPattern(rule.pattern.clone()))?;
                Ok(CompiledRule {
                    pattern,
                    destination: rule.destination.clone(),
                    notify: rule.notify.clone(),
                })
            })
            .collect()
    }
}

impl FilterRules {
    /// Compile rules into optimized filter structures for matching.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile(self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(self)
    }
}

/// Compiled, optimized filter structures for efficient file matching.
#[derive(Debug, Default)]
pub struct CompiledFilters {
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            exclude_filenames: rules.exclude.filenames.into_iter().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Check if a path should be offered to the user (not excluded).
    ///
    /// `path` is expected relative to the watch root so that folder globs
    /// such as `build/**` line up. Checks run in this order:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Exact filename match - if matched, exclude
    /// 3. File extension match - if matched, exclude
    /// 4. Glob pattern match - if matched, exclude
    /// 5. Regex pattern match - if matched, exclude
    /// 6. Default: include
    pub fn should_include(&self, path: &Path) -> bool {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.include_patterns.iter().any(|p| p.matches_path(path)) {
            return true;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self.exclude_patterns.iter().any(|p| p.matches_path(path)) {
            return false;
        }

        !self.exclude_regexes.iter().any(|r| r.is_match(&file_name))
    }
}

/// The user's home directory, or the current directory if it is unknown.
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(exclude: ExcludeRules, include: IncludeRules) -> CompiledFilters {
        FilterRules {
            exclude,
            include,
        }
        .compile()
        .unwrap()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();

        assert_eq!(config.watch.max_retries, 3);
        assert!(config.watch.interactive);
        assert!(config.rules.is_empty());
        assert_eq!(config.email.smtp_host, "smtp.gmail.com");
        assert_eq!(config.email.smtp_port, 465);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config_parses() {
        let config = AppConfig::from_toml(
            r#"
            [watch]
            root = "/tmp/drop"
            home = "/tmp/home"
            max_retries = 5
            interactive = false

            [filters.exclude]
            extensions = ["part"]

            [[rules]]
            pattern = "*.pdf"
            destination = "documents/pdfs"
            notify = "me@example.com"

            [[rules]]
            pattern = "*.png"
            destination = "images"

            [email]
            recipient = "me@example.com"
            notify_on_relocation = true
            "#,
        )
        .unwrap();

        assert_eq!(config.watch.root(), PathBuf::from("/tmp/drop"));
        assert_eq!(config.watch.home(), PathBuf::from("/tmp/home"));
        assert_eq!(config.watch.max_retries, 5);
        assert!(!config.watch.interactive);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].notify.as_deref(), Some("me@example.com"));
        assert_eq!(config.rules[1].notify, None);
        assert!(config.email.notify_on_relocation);
    }

    #[test]
    fn test_default_root_is_inside_home() {
        let settings = WatchSettings {
            home: Some(PathBuf::from("/tmp/home")),
            ..Default::default()
        };
        assert_eq!(settings.root(), PathBuf::from("/tmp/home/WatchZone"));
    }

    #[test]
    fn test_tilde_expansion() {
        let expanded = expand_tilde(Path::new("~/WatchZone"));
        assert_eq!(expanded, home_dir().join("WatchZone"));
        assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let result = AppConfig::from_toml("[watch\nmax_retries = 3");
        assert!(matches!(result, Err(ConfigError::ConfigInvalid(_))));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = AppConfig::load(Some(Path::new("/non/existent/config.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_invalid_rule_glob() {
        let config = AppConfig {
            rules: vec![RouteRule {
                pattern: "[unclosed".to_string(),
                destination: "x".to_string(),
                notify: None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            config.compile_rules(),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }

    #[test]
    fn test_default_filters_include_everything() {
        let compiled = FilterRules::default().compile().unwrap();

        // Dotfiles are reserved by the watcher, not excluded here
        assert!(compiled.should_include(Path::new(".DS_Store")));
        assert!(compiled.should_include(Path::new("notes.txt")));
    }

    #[test]
    fn test_legacy_hidden_files_key_is_ignored() {
        let config = AppConfig::from_toml(
            r#"
            [filters]
            enable_hidden_files = true

            [filters.exclude]
            extensions = ["tmp"]
            "#,
        )
        .unwrap();

        let compiled = config.filters.compile().unwrap();
        assert!(!compiled.should_include(Path::new("scratch.tmp")));
    }

    #[test]
    fn test_exclude_exact_filename() {
        let compiled = filters(
            ExcludeRules {
                filenames: vec!["Thumbs.db".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
        );

        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(compiled.should_include(Path::new("image.jpg")));
    }

    #[test]
    fn test_exclude_extensions_case_insensitive() {
        let compiled = filters(
            ExcludeRules {
                extensions: vec!["crdownload".to_string(), "part".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
        );

        assert!(!compiled.should_include(Path::new("movie.mkv.part")));
        assert!(!compiled.should_include(Path::new("setup.CRDOWNLOAD")));
        assert!(compiled.should_include(Path::new("movie.mkv")));
    }

    #[test]
    fn test_exclude_glob_respects_directory_boundaries() {
        let compiled = filters(
            ExcludeRules {
                patterns: vec!["**/logs/**".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
        );

        assert!(!compiled.should_include(Path::new("logs/file.txt")));
        assert!(!compiled.should_include(Path::new("app/logs/file.txt")));
        assert!(compiled.should_include(Path::new("my_logs/file.txt")));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let compiled = filters(
            ExcludeRules {
                extensions: vec!["tmp".to_string()],
                ..Default::default()
            },
            IncludeRules {
                patterns: vec!["keep.tmp".to_string()],
            },
        );

        assert!(compiled.should_include(Path::new("keep.tmp")));
        assert!(!compiled.should_include(Path::new("other.tmp")));
    }

    #[test]
    fn test_exclude_regex() {
        let compiled = filters(
            ExcludeRules {
                regex: vec![r"^~\$.*".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
        );

        assert!(!compiled.should_include(Path::new("~$report.docx")));
        assert!(compiled.should_include(Path::new("report.docx")));
    }

    #[test]
    fn test_invalid_patterns_return_errors() {
        let bad_regex = FilterRules {
            exclude: ExcludeRules {
                regex: vec!["[invalid(".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            bad_regex.compile(),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let bad_glob = FilterRules {
            exclude: ExcludeRules {
                patterns: vec!["[invalid".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            bad_glob.compile(),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }
}

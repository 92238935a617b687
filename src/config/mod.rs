//! Configuration management.
//!
//! Configuration is resolved in three layers: built-in defaults, an optional
//! TOML file, then `COGTRACE_*` environment variable overrides.

use crate::observability::{LogFormat, LoggingConfig};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration for cogtrace.
#[derive(Debug, Clone)]
pub struct CogtraceConfig {
    /// Path to the `SQLite` database.
    pub db_path: PathBuf,
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Payload tag stamped on rows produced by backfill.
    pub migration_tag: String,
    /// Storage table names.
    pub tables: TableNames,
    /// Defaults applied to batch ingestion.
    pub ingest: IngestDefaults,
    /// Retry policy for mutating operations.
    pub retry: RetryConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Names of the tables the engine reads and writes.
///
/// Column names are fixed; only table names vary between deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    /// Canonical per-trial response table.
    pub canonical: String,
    /// Legacy per-trial response table.
    pub legacy: String,
    /// Item table linking legacy item ids to catalog ids.
    pub item: String,
    /// Domain catalog (`domain_id` → `code`).
    pub domain_catalog: String,
    /// Exercise catalog (`exercise_id` → `code`).
    pub exercise_catalog: String,
    /// Canonical session existence catalog (`id`).
    pub session_catalog: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            canonical: "trial_response".to_string(),
            legacy: "legacy_response".to_string(),
            item: "item".to_string(),
            domain_catalog: "domain_catalog".to_string(),
            exercise_catalog: "exercise_catalog".to_string(),
            session_catalog: "assessment_session".to_string(),
        }
    }
}

impl TableNames {
    /// Checks that every table name is a plain SQL identifier.
    ///
    /// Table names are interpolated into SQL text, so anything other than
    /// `[A-Za-z_][A-Za-z0-9_]*` is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first offending table.
    pub fn validate(&self) -> Result<()> {
        for (role, name) in [
            ("canonical", &self.canonical),
            ("legacy", &self.legacy),
            ("item", &self.item),
            ("domain_catalog", &self.domain_catalog),
            ("exercise_catalog", &self.exercise_catalog),
            ("session_catalog", &self.session_catalog),
        ] {
            if !is_identifier(name) {
                return Err(Error::InvalidInput(format!(
                    "table name for '{role}' is not a valid identifier: '{name}'"
                )));
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Defaults applied to externally produced trial records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestDefaults {
    /// Payload tag stamped on ingested rows when the record carries none.
    pub payload_tag: String,
    /// Domain code used when a JSONL answer omits one.
    pub default_domain_code: String,
    /// Exercise code used when a JSONL answer omits one.
    pub default_exercise_code: String,
    /// Item id used when a JSONL answer omits one.
    pub default_item_id: String,
}

impl Default for IngestDefaults {
    fn default() -> Self {
        Self {
            payload_tag: "INGEST".to_string(),
            default_domain_code: "VPM".to_string(),
            default_exercise_code: "VPM_CFANT_S".to_string(),
            default_item_id: "demo_item_001".to_string(),
        }
    }
}

/// Retry policy for transactional operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first. Clamped to at least 1.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Database path.
    pub db_path: Option<String>,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u64>,
    /// Backfill payload tag.
    pub migration_tag: Option<String>,
    /// Table names.
    pub tables: Option<ConfigFileTables>,
    /// Ingestion defaults.
    pub ingest: Option<ConfigFileIngest>,
    /// Retry policy.
    pub retry: Option<ConfigFileRetry>,
    /// Logging settings.
    pub logging: Option<ConfigFileLogging>,
}

/// Tables section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTables {
    /// Canonical table.
    pub canonical: Option<String>,
    /// Legacy table.
    pub legacy: Option<String>,
    /// Item table.
    pub item: Option<String>,
    /// Domain catalog table.
    pub domain_catalog: Option<String>,
    /// Exercise catalog table.
    pub exercise_catalog: Option<String>,
    /// Session catalog table.
    pub session_catalog: Option<String>,
}

/// Ingest section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileIngest {
    /// Payload tag.
    pub payload_tag: Option<String>,
    /// Default domain code.
    pub default_domain_code: Option<String>,
    /// Default exercise code.
    pub default_exercise_code: Option<String>,
    /// Default item id.
    pub default_item_id: Option<String>,
}

/// Retry section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRetry {
    /// Total attempts.
    pub max_attempts: Option<u32>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Output format: "compact", "pretty" or "json".
    pub format: Option<String>,
    /// `EnvFilter` directive string.
    pub filter: Option<String>,
}

impl Default for CogtraceConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("cogtrace.db"),
            busy_timeout_ms: 5000,
            migration_tag: "LEGACY".to_string(),
            tables: TableNames::default(),
            ingest: IngestDefaults::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CogtraceConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for [`ConfigFile`].
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location, then applies env overrides.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`<config_dir>/cogtrace/config.toml`)
    /// 2. XDG-style `~/.config/cogtrace/config.toml`
    ///
    /// Falls back to defaults if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let base = Self::find_config_file()
            .and_then(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    None
                },
            })
            .unwrap_or_default();

        base.with_env_overrides()
    }

    fn find_config_file() -> Option<PathBuf> {
        let base_dirs = directories::BaseDirs::new()?;

        let platform_config = base_dirs.config_dir().join("cogtrace").join("config.toml");
        if platform_config.exists() {
            return Some(platform_config);
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("cogtrace")
            .join("config.toml");
        xdg_config.exists().then_some(xdg_config)
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("COGTRACE_DB_PATH") {
            if !v.trim().is_empty() {
                self.db_path = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("COGTRACE_BUSY_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.busy_timeout_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("COGTRACE_MIGRATION_TAG") {
            if !v.trim().is_empty() {
                self.migration_tag = v;
            }
        }
        if let Ok(v) = std::env::var("COGTRACE_RETRY_MAX_ATTEMPTS") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.retry.max_attempts = parsed.max(1);
            }
        }
        self.logging = self.logging.with_env_overrides();
        self
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Sets the table names.
    #[must_use]
    pub fn with_tables(mut self, tables: TableNames) -> Self {
        self.tables = tables;
        self
    }

    /// Sets the backfill payload tag.
    #[must_use]
    pub fn with_migration_tag(mut self, tag: impl Into<String>) -> Self {
        self.migration_tag = tag.into();
        self
    }

    /// Converts a `ConfigFile` to `CogtraceConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(db_path) = file.db_path {
            config.db_path = PathBuf::from(db_path);
        }
        if let Some(timeout) = file.busy_timeout_ms {
            config.busy_timeout_ms = timeout;
        }
        if let Some(tag) = file.migration_tag {
            config.migration_tag = tag;
        }
        if let Some(tables) = file.tables {
            let t = &mut config.tables;
            if let Some(v) = tables.canonical {
                t.canonical = v;
            }
            if let Some(v) = tables.legacy {
                t.legacy = v;
            }
            if let Some(v) = tables.item {
                t.item = v;
            }
            if let Some(v) = tables.domain_catalog {
                t.domain_catalog = v;
            }
            if let Some(v) = tables.exercise_catalog {
                t.exercise_catalog = v;
            }
            if let Some(v) = tables.session_catalog {
                t.session_catalog = v;
            }
        }
        if let Some(ingest) = file.ingest {
            if let Some(v) = ingest.payload_tag {
                config.ingest.payload_tag = v;
            }
            if let Some(v) = ingest.default_domain_code {
                config.ingest.default_domain_code = v;
            }
            if let Some(v) = ingest.default_exercise_code {
                config.ingest.default_exercise_code = v;
            }
            if let Some(v) = ingest.default_item_id {
                config.ingest.default_item_id = v;
            }
        }
        if let Some(retry) = file.retry {
            if let Some(v) = retry.max_attempts {
                config.retry.max_attempts = v.max(1);
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
            if let Some(filter) = logging.filter {
                config.logging.filter = filter;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CogtraceConfig::default();
        assert_eq!(config.migration_tag, "LEGACY");
        assert_eq!(config.tables.canonical, "trial_response");
        assert_eq!(config.retry.max_attempts, 2);
        assert!(config.tables.validate().is_ok());
    }

    #[test]
    fn test_from_toml_overrides_sections() {
        let config = CogtraceConfig::from_toml_str(
            r#"
            db_path = "/var/lib/cogtrace/panel.db"
            migration_tag = "MIGRATED"

            [tables]
            legacy = "respuesta"
            session_catalog = "sesion"

            [ingest]
            payload_tag = "JSONL"
            default_item_id = "placeholder"

            [retry]
            max_attempts = 0

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/var/lib/cogtrace/panel.db"));
        assert_eq!(config.migration_tag, "MIGRATED");
        assert_eq!(config.tables.legacy, "respuesta");
        assert_eq!(config.tables.session_catalog, "sesion");
        assert_eq!(config.tables.canonical, "trial_response");
        assert_eq!(config.ingest.payload_tag, "JSONL");
        assert_eq!(config.ingest.default_domain_code, "VPM");
        assert_eq!(config.ingest.default_item_id, "placeholder");
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_toml_is_operation_failed() {
        let result = CogtraceConfig::from_toml_str("db_path = [");
        assert!(
            matches!(result, Err(Error::OperationFailed { ref operation, .. }) if operation == "parse_config_file")
        );
    }

    #[test]
    fn test_table_name_validation() {
        let tables = TableNames {
            legacy: "respuesta; DROP TABLE item".to_string(),
            ..TableNames::default()
        };
        let err = tables.validate().unwrap_err();
        assert!(err.to_string().contains("legacy"));

        assert!(is_identifier("_tlt_respuesta2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier(""));
    }
}

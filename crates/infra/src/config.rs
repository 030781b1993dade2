//! Configuration loading and representation.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `DATABASE_URL` | Postgres connection string | required when persistent |
//! | `USE_PERSISTENT_STORES` | `true` selects Postgres | `false` |
//! | `MEMBERHUB_DB_MAX_CONNECTIONS` | pool size | `5` |
//! | `MEMBERHUB_FALLBACK_INSTITUTION_ID` | institution receiving unlinked members | none (link cleared) |
//! | `MEMBERHUB_ROLE_CATALOG` | path to a JSON role catalog | built-in roles |
//! | `MEMBERHUB_LOG_FORMAT` | `json` or `pretty` | `json` |
//! | `MEMBERHUB_LOG_FILTER` | `EnvFilter` directive | `RUST_LOG`, then `info` |

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use memberhub_auth::RoleCatalog;
use memberhub_core::UnitId;
use memberhub_observability::{LogConfig, LogFormat, ParseLogFilterError, ParseLogFormatError};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")]
    MissingDatabaseUrl,

    #[error("{key} must be a boolean, got '{value}'")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be a UUID, got '{value}'")]
    InvalidUuid { key: &'static str, value: String },

    #[error(transparent)]
    InvalidLogFormat(#[from] ParseLogFormatError),

    #[error("MEMBERHUB_LOG_FILTER is malformed: {0}")]
    InvalidLogFilter(#[from] ParseLogFilterError),

    #[error("failed to read role catalog {path}: {source}")]
    RoleCatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse role catalog {path}: {source}")]
    RoleCatalogParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberhubConfig {
    pub database_url: Option<String>,
    pub use_persistent_stores: bool,
    pub max_connections: u32,
    /// Institution that receives members when an institution is deleted with
    /// the remove-link policy and no destination is given.
    pub fallback_institution: Option<UnitId>,
    pub role_catalog_path: Option<PathBuf>,
    pub log: LogConfig,
}

impl Default for MemberhubConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            use_persistent_stores: false,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            fallback_institution: None,
            role_catalog_path: None,
            log: LogConfig::default(),
        }
    }
}

impl MemberhubConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let use_persistent_stores = match value("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
            None => false,
        };

        let database_url = value("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let max_connections = match value("MEMBERHUB_DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber {
                    key: "MEMBERHUB_DB_MAX_CONNECTIONS",
                    value: v,
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let fallback_institution = value("MEMBERHUB_FALLBACK_INSTITUTION_ID")
            .map(|v| {
                Uuid::parse_str(&v)
                    .map(UnitId::from_uuid)
                    .map_err(|_| ConfigError::InvalidUuid {
                        key: "MEMBERHUB_FALLBACK_INSTITUTION_ID",
                        value: v,
                    })
            })
            .transpose()?;

        let format = match value("MEMBERHUB_LOG_FORMAT") {
            Some(v) => v.parse::<LogFormat>()?,
            None => LogFormat::default(),
        };

        let log = LogConfig {
            filter: value("MEMBERHUB_LOG_FILTER"),
            format,
        };
        log.validate()?;

        Ok(Self {
            database_url,
            use_persistent_stores,
            max_connections,
            fallback_institution,
            role_catalog_path: value("MEMBERHUB_ROLE_CATALOG").map(PathBuf::from),
            log,
        })
    }

    /// Install the process-wide tracing subscriber described by `log`.
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        memberhub_observability::init_with(&self.log)?;
        Ok(())
    }

    /// Load the role catalog named by configuration, or the standard roles.
    pub fn load_role_catalog(&self) -> Result<RoleCatalog, ConfigError> {
        let Some(path) = &self.role_catalog_path else {
            return Ok(RoleCatalog::standard());
        };

        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::RoleCatalogRead {
            path: path.clone(),
            source,
        })?;
        RoleCatalog::from_json(&json).map_err(|source| ConfigError::RoleCatalogParse {
            path: path.clone(),
            source,
        })
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_string(),
        }),
    }
}

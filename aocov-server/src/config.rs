//! Server configuration loaded from the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use aocov_core::GradientStyle;
use thiserror::Error;

/// Default upload size limit in bytes (4 MiB).
pub const DEFAULT_UPLOAD_LIMIT: usize = 4_194_304;
/// Default public URL of the service.
pub const DEFAULT_TARGET_URL: &str = "http://localhost:3000";

const WRITE_PROBE: &str = ".aocov-write-check";

/// Configuration errors reported at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("{0} must be defined")]
    Missing(&'static str),
    /// A variable could not be parsed.
    #[error("{name} is not a valid {expected}: {value:?}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Expected kind of value.
        expected: &'static str,
        /// Raw value.
        value: String,
    },
    /// `HOST_DIR` is relative.
    #[error("HOST_DIR must be an absolute path: {0}")]
    RelativeHostDir(PathBuf),
    /// `HOST_DIR` cannot be read or written.
    #[error("HOST_DIR {path} is not usable: {source}")]
    HostDir {
        /// Configured directory.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },
}

/// Runtime settings of the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Upload token from `TOKEN`, if configured.
    pub token: Option<String>,
    /// Maximum accepted upload size in bytes.
    pub upload_limit: usize,
    /// Root of the stored artifacts and rendered landing files.
    pub host_dir: PathBuf,
    /// Directory holding templates and static assets.
    pub public_dir: PathBuf,
    /// Badge color thresholds.
    pub gradient: GradientStyle,
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Public URL of the service, used in rendered templates.
    pub target_url: String,
    /// Listen address.
    pub bind_address: String,
    /// Listen port.
    pub port: u16,
    /// Default log filter.
    pub log_level: String,
}

impl ServerConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through a variable lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let host_dir = PathBuf::from(get("HOST_DIR").ok_or(ConfigError::Missing("HOST_DIR"))?);
        if !host_dir.is_absolute() {
            return Err(ConfigError::RelativeHostDir(host_dir));
        }
        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let stage1 = parse_or("STAGE_1", get("STAGE_1"), 95.0, "number")?;
        let stage2 = parse_or("STAGE_2", get("STAGE_2"), 80.0, "number")?;
        if stage1 <= stage2 {
            log::warn!("STAGE_1 ({stage1}) should be greater than STAGE_2 ({stage2})");
        }

        Ok(Self {
            token: get("TOKEN"),
            upload_limit: parse_or("UPLOAD_LIMIT", get("UPLOAD_LIMIT"), DEFAULT_UPLOAD_LIMIT, "size")?,
            host_dir,
            public_dir: get("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            gradient: GradientStyle::new(stage1, stage2),
            database_url,
            target_url: get("TARGET_URL").unwrap_or_else(|| DEFAULT_TARGET_URL.to_string()),
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or("PORT", get("PORT"), 3000, "port")?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Check that the host directory exists and is readable and writable.
    pub fn check_host_dir(&self) -> Result<(), ConfigError> {
        check_writable_dir(&self.host_dir).map_err(|source| ConfigError::HostDir {
            path: self.host_dir.clone(),
            source,
        })
    }
}

fn parse_or<T: FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}

fn check_writable_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::read_dir(dir)?;
    let probe = dir.join(WRITE_PROBE);
    std::fs::write(&probe, b"")?;
    std::fs::remove_file(&probe)
}

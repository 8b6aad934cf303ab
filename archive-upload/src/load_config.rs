/// `load_config` module: loads the static YAML run config and the JSON credential file.
///
/// This module is the only place where user-supplied files are parsed and mapped to
/// strongly-typed structs.
///
/// # Responsibilities
/// - Parse the YAML run config (archive directory, endpoints, recipients, database)
/// - Apply environment overrides (`ARCHIVE_UPLOAD_CONCURRENCY`)
/// - Parse the credential JSON file, which is read once and never written
/// - Fail with clear diagnostics: any failure in loading must name the file and the cause
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use archive_upload_core::config::SessionConfig;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

pub const CONCURRENCY_ENV: &str = "ARCHIVE_UPLOAD_CONCURRENCY";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub session: SessionConfig,
    /// WebDAV root; the run folder is created directly below it.
    pub dav_url: String,
    /// Base URL of the share API.
    pub api_url: String,
    /// OAuth token endpoint used to rotate the refresh token.
    pub token_url: String,
    /// Path of the JSON credential file.
    pub credentials: PathBuf,
    pub database: DatabaseSection,
    #[serde(default)]
    pub http: HttpSection,
}

/// Network timeouts shared by the WebDAV and share API clients.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated while waiting on the server.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl HttpSection {
    pub fn timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            read: Duration::from_secs(self.read_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub user: String,
    pub name: String,
    /// Row holding the refresh token.
    #[serde(default = "default_token_key")]
    pub token_key: String,
}

fn default_db_port() -> u16 {
    5432
}

fn default_token_key() -> String {
    "share-api".to_string()
}

#[derive(Deserialize)]
pub struct Credentials {
    pub dav_user: String,
    pub dav_password: String,
    pub client_id: String,
    pub client_secret: String,
    pub db_password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("dav_user", &self.dav_user)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Loads the YAML run config and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Ok(raw) = std::env::var(CONCURRENCY_ENV) {
        let concurrency = raw.trim().parse::<usize>().map_err(|e| {
            error!(error = ?e, raw = %raw, "{CONCURRENCY_ENV} must be a positive integer");
            anyhow::anyhow!("{CONCURRENCY_ENV} must be a positive integer: {e}")
        })?;
        info!(concurrency, "Concurrency overridden from environment");
        config.session.concurrency = concurrency;
    }

    if config.http.connect_timeout_secs == 0 || config.http.read_timeout_secs == 0 {
        error!(http = ?config.http, "HTTP timeouts must be at least one second");
        anyhow::bail!("http timeouts must be at least 1 second");
    }

    if config.session.concurrency == 0 {
        error!("Concurrency must be at least 1");
        anyhow::bail!("concurrency must be at least 1");
    }

    config.session.trace_loaded();
    info!(
        dav_url = %config.dav_url,
        api_url = %config.api_url,
        db_host = %config.database.host,
        "Config loaded successfully"
    );
    Ok(config)
}

/// Reads the credential JSON file.
pub fn load_credentials<P: AsRef<Path>>(path: P) -> Result<Credentials> {
    let path_ref = path.as_ref();
    let raw = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read credential file {:?}", path_ref))?;
    let credentials: Credentials = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse credential file {:?}", path_ref))?;
    info!(credentials_path = ?path_ref, dav_user = %credentials.dav_user, "Credentials loaded");
    Ok(credentials)
}

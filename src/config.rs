//! # Configuration Module
//!
//! Reads the project configuration from the environment once, at startup,
//! and validates it before any client is built.
//!
//! ## Key Components
//!
//! - `Config`: project, datasets, connection and credentials
//! - `ConfigError`: the first missing or blank required variable
//!
//! The embedding API key is only checked by the jobs that embed, through
//! `Config::genai_api_key`.
//!
//! ## Features
//!
//! - Optional `.env` file loading through `dotenvy`
//! - Defaults for the warehouse location (`US`) and the AI connection location (`us`)
//! - Typed table identifiers for the staging and marts datasets

use crate::warehouse::TableId;
use thiserror::Error;

/// Environment variable names
pub mod vars {
    pub const PROJECT_ID: &str = "project_id";
    pub const STAGING_DATASET_ID: &str = "staging_dataset_id";
    pub const MARTS_DATASET_ID: &str = "marts_dataset_id";
    pub const CONNECTION_ID: &str = "connection_id";
    pub const GENAI_API_KEY: &str = "genai_api_key";
    pub const ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
    pub const BIGQUERY_LOCATION: &str = "bigquery_location";
    pub const VERTEX_LOCATION: &str = "vertex_location";
}

const DEFAULT_BIGQUERY_LOCATION: &str = "US";
const DEFAULT_VERTEX_LOCATION: &str = "us";

/// Error type for configuration loading
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or blank
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err.to_string())
    }
}

/// Validated project configuration
#[derive(Clone)]
pub struct Config {
    /// Cloud project that owns the datasets and bills the jobs
    pub project_id: String,

    /// Dataset holding raw loaded data
    pub staging_dataset_id: String,

    /// Dataset holding derived views and tables
    pub marts_dataset_id: String,

    /// Warehouse connection used by the AI SQL functions
    pub connection_id: String,

    api_key: Option<String>,

    /// OAuth bearer token for the warehouse API
    pub warehouse_access_token: String,

    /// Location warehouse jobs run in
    pub bigquery_location: String,

    /// Location of the AI connection
    pub vertex_location: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("project_id", &self.project_id)
            .field("staging_dataset_id", &self.staging_dataset_id)
            .field("marts_dataset_id", &self.marts_dataset_id)
            .field("connection_id", &self.connection_id)
            .field("genai_api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("warehouse_access_token", &"<redacted>")
            .field("bigquery_location", &self.bigquery_location)
            .field("vertex_location", &self.vertex_location)
            .finish()
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; the variables may come from the shell.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let present = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let optional =
            |name: &str, default: &str| present(name).unwrap_or_else(|| default.to_string());

        Ok(Self {
            project_id: required(vars::PROJECT_ID)?,
            staging_dataset_id: required(vars::STAGING_DATASET_ID)?,
            marts_dataset_id: required(vars::MARTS_DATASET_ID)?,
            connection_id: required(vars::CONNECTION_ID)?,
            api_key: present(vars::GENAI_API_KEY),
            warehouse_access_token: required(vars::ACCESS_TOKEN)?,
            bigquery_location: optional(vars::BIGQUERY_LOCATION, DEFAULT_BIGQUERY_LOCATION),
            vertex_location: optional(vars::VERTEX_LOCATION, DEFAULT_VERTEX_LOCATION),
        })
    }

    /// API key of the embedding provider, required only by the embedding job
    pub fn genai_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::Missing(vars::GENAI_API_KEY))
    }

    /// A table in the staging dataset
    pub fn staging_table(&self, table: &str) -> TableId {
        TableId::new(&self.project_id, &self.staging_dataset_id, table)
    }

    /// A table or view in the marts dataset
    pub fn marts_table(&self, table: &str) -> TableId {
        TableId::new(&self.project_id, &self.marts_dataset_id, table)
    }

    /// Fully qualified connection path used by the AI SQL functions
    pub fn connection_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/connections/{}",
            self.project_id, self.vertex_location, self.connection_id
        )
    }
}

//! Configuration management for irgraph.
//!
//! Configuration is loaded from (in priority order):
//! 1. `NEO4J_HOST`, `NEO4J_USER`, `NEO4J_PASSWORD`
//! 2. Environment variables (`IRGRAPH` prefix, `__` separator,
//!    e.g. `IRGRAPH__PERSIST__NODE_CHUNK_SIZE`)
//! 3. Config file (`irgraph.toml`)
//! 4. Defaults

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    #[serde(default)]
    pub persist: PersistSettings,

    #[serde(default)]
    pub query: QuerySettings,
}

/// Connection to the property-graph store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Neo4jSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Full Bolt URI; takes precedence over `host` and `port`.
    #[serde(default)]
    pub uri: Option<String>,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

impl Neo4jSettings {
    pub fn uri(&self) -> String {
        self.uri
            .clone()
            .unwrap_or_else(|| format!("bolt://{}:{}", self.host, self.port))
    }
}

/// Batching of store writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistSettings {
    #[serde(default = "default_chunk_size")]
    pub node_chunk_size: usize,

    #[serde(default = "default_chunk_size")]
    pub edge_chunk_size: usize,
}

/// Ad-hoc query execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuerySettings {
    /// Maximum number of rows any query may return.
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    7687
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_chunk_size() -> usize {
    10_000
}

fn default_result_limit() -> usize {
    150
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            uri: None,
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            node_chunk_size: default_chunk_size(),
            edge_chunk_size: default_chunk_size(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            result_limit: default_result_limit(),
        }
    }
}

impl Settings {
    /// Load settings from `<file_prefix>.toml` (optional) and the environment.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let legacy = [
            ("neo4j.host", std::env::var("NEO4J_HOST").ok()),
            ("neo4j.user", std::env::var("NEO4J_USER").ok()),
            ("neo4j.password", std::env::var("NEO4J_PASSWORD").ok()),
        ];
        Self::load_with_overrides(file_prefix, &legacy)
    }

    /// Load settings, applying `overrides` on top of file and `IRGRAPH__` values.
    pub fn load_with_overrides(
        file_prefix: &str,
        overrides: &[(&str, Option<String>)],
    ) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(environment());
        for (key, value) in overrides {
            builder = builder.set_override_option(*key, value.clone())?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        tracing::debug!(uri = %settings.neo4j.uri(), "Loaded settings");
        Ok(settings)
    }
}

/// `IRGRAPH__<SECTION>__<KEY>` variables.
fn environment() -> config::Environment {
    config::Environment::with_prefix("IRGRAPH")
        .separator("__")
        .try_parsing(true)
}

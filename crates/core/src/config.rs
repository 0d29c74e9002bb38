//! Configuration types shared across crates.
//!
//! All values are parsed strictly at startup; `AppConfig::validate` surfaces
//! format and consistency errors before the first request is accepted.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public base URL used as the prefix of receipt IRIs.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Collection IRI advertised in the service document.
    /// Defaults to `<base_url>/collection`.
    #[serde(default)]
    pub collection_iri: Option<String>,
    /// Capacity of the finalization queue. When the queue is full, ingress
    /// handlers block until the worker drains an item.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Maximum accepted size of a single payload part in bytes.
    #[serde(default = "default_max_part_size")]
    pub max_part_size: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_max_part_size() -> u64 {
    256 * 1024 * 1024 // 256 MiB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            base_url: default_base_url(),
            collection_iri: None,
            queue_capacity: default_queue_capacity(),
            max_part_size: default_max_part_size(),
        }
    }
}

impl ServerConfig {
    /// The base URL with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// The collection IRI to advertise.
    pub fn collection_iri(&self) -> String {
        self.collection_iri
            .clone()
            .unwrap_or_else(|| format!("{}/collection", self.base_url()))
    }

    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("server.queue_capacity must be at least 1".to_string());
        }
        if self.max_part_size == 0 {
            return Err("server.max_part_size must be at least 1 byte".to_string());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!(
                "server.base_url must be an absolute http(s) URL, got {}",
                self.base_url
            ));
        }
        Ok(())
    }
}

/// Staging and permanent storage locations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root for per-deposit staging directories.
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
    /// Root for promoted permanent storage directories.
    #[serde(default = "default_deposits_root")]
    pub deposits_root: PathBuf,
}

fn default_temp_root() -> PathBuf {
    PathBuf::from("./data/staging")
}

fn default_deposits_root() -> PathBuf {
    PathBuf::from("./data/deposits")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
            deposits_root: default_deposits_root(),
        }
    }
}

impl StoreConfig {
    /// Validate store configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.temp_root == self.deposits_root {
            return Err(
                "store.temp_root and store.deposits_root must be distinct directories".to_string(),
            );
        }
        Ok(())
    }
}

/// Versioning configuration.
///
/// When enabled, each accepted deposit is committed into a repository rooted
/// at its staging directory and tagged before promotion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VcsConfig {
    /// Enable versioning of accepted deposits.
    #[serde(default)]
    pub enabled: bool,
    /// Commit author name.
    #[serde(default)]
    pub user: Option<String>,
    /// Commit author email.
    #[serde(default)]
    pub email: Option<String>,
}

impl VcsConfig {
    /// Validate versioning configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        match (self.user.as_deref(), self.email.as_deref()) {
            (Some(user), Some(email)) if !user.is_empty() && !email.is_empty() => Ok(()),
            _ => Err(
                "vcs.user and vcs.email are required when vcs.enabled is true".to_string(),
            ),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage locations.
    #[serde(default)]
    pub store: StoreConfig,
    /// Versioning configuration.
    #[serde(default)]
    pub vcs: VcsConfig,
}

impl AppConfig {
    /// Validate the complete configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.store.validate()?;
        self.vcs.validate()?;
        Ok(())
    }

    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Storage roots point under `./data`; tests
    /// override them with temporary directories.
    pub fn for_testing() -> Self {
        Self::default()
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Migration Configuration Types
//
// Defines the configuration schema for aclmig, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Operating modes of a migration run
// - State store location
// - External tool paths and timeouts
// - Logging defaults

use crate::domain::repository::{SqliteConfig, StorageBackend};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "aclmig/v1";
pub const KIND: &str = "MigrationConfig";
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 32;

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigManifest {
    /// API version (must be "aclmig/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "MigrationConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: ConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Content under `spec:`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSpec {
    #[serde(default)]
    pub migration: MigrationConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Operating modes of one migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Concurrent workers, 1 to 32
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Skip items whose fingerprint matches a successful record
    #[serde(default)]
    pub incremental: bool,

    /// Also copy owner and group to the destination
    #[serde(default)]
    pub ownership: bool,

    /// Visit directories only
    #[serde(default)]
    pub folder_only: bool,

    /// NFSv4 domain suffix for named principals, empty for none
    #[serde(default)]
    pub domain: String,

    /// Also suffix owner/group names with `domain` when changing ownership
    #[serde(default)]
    pub qualify_ownership: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_backend")]
    pub backend: DatabaseBackend,

    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_getfacl")]
    pub getfacl: String,

    #[serde(default = "default_nfs4_setfacl")]
    pub nfs4_setfacl: String,

    /// Only used by `diagnose` to show the resulting destination ACL
    #[serde(default = "default_nfs4_getfacl")]
    pub nfs4_getfacl: String,

    #[serde(default = "default_chown")]
    pub chown: String,

    /// Per-invocation timeout
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_workers() -> usize {
    4
}

fn default_database_backend() -> DatabaseBackend {
    DatabaseBackend::Sqlite
}

fn default_database_path() -> PathBuf {
    PathBuf::from("acl_migration.db")
}

fn default_getfacl() -> String {
    "getfacl".to_string()
}

fn default_nfs4_setfacl() -> String {
    "nfs4_setfacl".to_string()
}

fn default_nfs4_getfacl() -> String {
    "nfs4_getfacl".to_string()
}

fn default_chown() -> String {
    "chown".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            incremental: false,
            ownership: false,
            folder_only: false,
            domain: String::new(),
            qualify_ownership: false,
        }
    }
}

impl MigrationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            anyhow::bail!(
                "workers must be between {} and {}, got {}",
                MIN_WORKERS,
                MAX_WORKERS,
                self.workers
            );
        }
        if self.domain.contains(|c: char| c == ':' || c == ',' || c == '@' || c.is_whitespace()) {
            anyhow::bail!("Invalid domain: '{}'", self.domain);
        }
        Ok(())
    }

    /// Settings that decide what a destination item ends up with.
    ///
    /// Folded into every fingerprint, so an incremental run with a different
    /// profile reapplies instead of skipping.
    pub fn output_profile(&self) -> String {
        let ownership = match (self.ownership, self.qualify_ownership && !self.domain.is_empty()) {
            (false, _) => "none",
            (true, false) => "plain",
            (true, true) => "qualified",
        };
        format!("domain={};ownership={}", self.domain, ownership)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_database_backend(),
            path: default_database_path(),
        }
    }
}

impl DatabaseConfig {
    pub fn storage_backend(&self) -> StorageBackend {
        match self.backend {
            DatabaseBackend::Sqlite => StorageBackend::Sqlite(SqliteConfig {
                path: self.path.clone(),
            }),
            DatabaseBackend::Memory => StorageBackend::InMemory,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            getfacl: default_getfacl(),
            nfs4_setfacl: default_nfs4_setfacl(),
            nfs4_getfacl: default_nfs4_getfacl(),
            chown: default_chown(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "aclmig".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ConfigSpec::default(),
        }
    }
}

impl ConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. ACLMIG_CONFIG_PATH environment variable
    /// 2. ./aclmig-config.yaml (working directory)
    /// 3. ~/.aclmig/config.yaml (user home)
    /// 4. /etc/aclmig/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ACLMIG_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aclmig-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aclmig").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/aclmig/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ACLMIG_WORKERS") {
            match val.parse::<usize>() {
                Ok(workers) => {
                    tracing::info!("Environment override: ACLMIG_WORKERS={}", workers);
                    self.spec.migration.workers = workers;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for ACLMIG_WORKERS: '{}'. Expected an integer. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("ACLMIG_DOMAIN") {
            tracing::info!("Environment override: ACLMIG_DOMAIN={}", val);
            self.spec.migration.domain = val;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        self.spec.migration.validate()?;

        if self.spec.database.backend == DatabaseBackend::Sqlite
            && self.spec.database.path.as_os_str().is_empty()
        {
            anyhow::bail!("spec.database.path cannot be empty for the sqlite backend");
        }

        let tools = &self.spec.tools;
        for (name, value) in [
            ("getfacl", &tools.getfacl),
            ("nfs4_setfacl", &tools.nfs4_setfacl),
            ("nfs4_getfacl", &tools.nfs4_getfacl),
            ("chown", &tools.chown),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("spec.tools.{} cannot be empty", name);
            }
        }
        if tools.timeout_seconds == 0 {
            anyhow::bail!("spec.tools.timeout_seconds must be greater than zero");
        }

        match self.spec.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Invalid logging level: '{}'", other),
        }

        Ok(())
    }
}

//! Host inventory loading.
//!
//! The inventory is a YAML file with connection defaults, collection settings,
//! validation thresholds, global interface exclusions and an ordered `hosts`
//! map. Per-host settings override `ssh_defaults`; global exclusion patterns
//! are appended to each host's own.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::collector::{CollectorOptions, DiscoveryMethod, Host};
use crate::orchestrator::{OrchestratorConfig, DEFAULT_CONCURRENCY, DEFAULT_HOST_TIMEOUT};
use crate::session::CollectionTarget;
use crate::topology::ValidationConfig;
use crate::transport::{expand_home, AuthType, SshExecutor, SshSettings};
use crate::utils::duration::{serde_duration, serde_duration_opt};
use crate::utils::{ExclusionError, ExclusionSet};

/// Errors raised while loading or checking an inventory
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("failed to read inventory file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse inventory: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("inventory file is empty")]
    Empty,

    #[error("no usable hosts defined in inventory")]
    NoHosts,

    #[error("invalid host '{name}': {reason}")]
    InvalidHost { name: String, reason: String },

    #[error("invalid collection settings: {0}")]
    InvalidCollection(String),

    #[error("host '{host}': {source}")]
    Exclusion {
        host: String,
        #[source]
        source: ExclusionError,
    },

    #[error("host '{0}' is not in the inventory")]
    UnknownHost(String),
}

/// Connection defaults applied to every host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshDefaults {
    pub port: u16,
    pub username: String,
    pub auth_type: AuthType,
    pub key_file: Option<String>,
    pub password: Option<String>,
    #[serde(with = "serde_duration")]
    pub timeout: Duration,
}

impl Default for SshDefaults {
    fn default() -> Self {
        Self {
            port: 22,
            username: "root".to_string(),
            auth_type: AuthType::Key,
            key_file: None,
            password: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Scheduling and method selection for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    pub concurrency: usize,
    #[serde(with = "serde_duration")]
    pub host_timeout: Duration,
    #[serde(with = "serde_duration_opt")]
    pub run_deadline: Option<Duration>,
    pub methods: Vec<DiscoveryMethod>,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            host_timeout: DEFAULT_HOST_TIMEOUT,
            run_deadline: None,
            methods: vec![DiscoveryMethod::Lldp, DiscoveryMethod::Arp],
        }
    }
}

/// Values the command line may override
#[derive(Debug, Clone, Default)]
pub struct CollectionOverrides {
    pub concurrency: Option<usize>,
    pub host_timeout: Option<Duration>,
    pub run_deadline: Option<Duration>,
    /// Enable active probing on top of the configured methods
    pub probe: bool,
}

/// One host entry as written in the file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHost {
    hostname: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    auth_type: Option<AuthType>,
    key_file: Option<String>,
    password: Option<String>,
    #[serde(with = "serde_duration_opt")]
    timeout: Option<Duration>,
    exclude_interfaces: Vec<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInventory {
    ssh_defaults: SshDefaults,
    collection: CollectionSettings,
    validation: ValidationConfig,
    exclude_interfaces: Vec<String>,
    hosts: serde_yaml::Mapping,
}

/// Fully resolved settings for one host
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub auth_type: AuthType,
    pub key_file: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub description: String,
    /// Host patterns followed by the global ones
    pub exclude_interfaces: Vec<String>,
    pub exclusions: ExclusionSet,
}

impl HostConfig {
    pub fn host(&self) -> Host {
        Host::new(&self.name, &self.hostname)
    }

    /// Connection parameters for the ssh transport
    pub fn ssh_settings(&self) -> SshSettings {
        SshSettings {
            hostname: self.hostname.clone(),
            port: self.port,
            username: self.username.clone(),
            auth_type: self.auth_type,
            key_file: self.key_file.as_deref().map(expand_home),
            password: self.password.clone(),
            timeout: self.timeout,
        }
    }

    /// Bind this host to an ssh transport
    pub fn collection_target(&self) -> CollectionTarget {
        let executor = SshExecutor::new(self.ssh_settings());
        CollectionTarget::new(self.host(), Arc::new(executor), self.exclusions.clone())
    }
}

/// A loaded, validated inventory
#[derive(Debug, Clone)]
pub struct Inventory {
    /// Hosts in file order
    pub hosts: Vec<HostConfig>,
    pub collection: CollectionSettings,
    pub validation: ValidationConfig,
}

/// Load and validate an inventory file
pub fn load_inventory(path: &Path) -> Result<Inventory, InventoryError> {
    info!("Loading inventory from: {:?}", path);
    let content = std::fs::read_to_string(path).map_err(|source| InventoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let inventory = Inventory::from_yaml(&content)?;
    info!("Loaded {} host(s)", inventory.hosts.len());
    Ok(inventory)
}

impl Inventory {
    pub fn from_yaml(content: &str) -> Result<Self, InventoryError> {
        if content.trim().is_empty() {
            return Err(InventoryError::Empty);
        }
        let raw: RawInventory = serde_yaml::from_str(content)?;

        let mut hosts = Vec::with_capacity(raw.hosts.len());
        for (key, value) in raw.hosts {
            let name = match key {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                other => {
                    return Err(InventoryError::InvalidHost {
                        name: format!("{:?}", other),
                        reason: "host names must be strings".to_string(),
                    })
                }
            };
            if value.is_null() {
                warn!("Host {} has no configuration, skipping", name);
                continue;
            }
            let host: RawHost = serde_yaml::from_value(value)?;
            if let Some(resolved) = resolve_host(name, host, &raw.ssh_defaults, &raw.exclude_interfaces)? {
                hosts.push(resolved);
            }
        }

        let inventory = Self { hosts, collection: raw.collection, validation: raw.validation };
        inventory.validate()?;
        Ok(inventory)
    }

    /// Check the settings that cannot be expressed in the types
    pub fn validate(&self) -> Result<(), InventoryError> {
        if self.hosts.is_empty() {
            return Err(InventoryError::NoHosts);
        }
        if self.collection.concurrency == 0 {
            return Err(InventoryError::InvalidCollection("concurrency must be at least 1".to_string()));
        }
        if self.collection.host_timeout.is_zero() {
            return Err(InventoryError::InvalidCollection("host_timeout must be positive".to_string()));
        }
        if self.collection.methods.is_empty() {
            warn!("No discovery methods enabled; links cannot be inferred");
        }
        Ok(())
    }

    /// Apply command-line overrides, then re-validate
    pub fn apply_overrides(&mut self, overrides: &CollectionOverrides) -> Result<(), InventoryError> {
        if let Some(concurrency) = overrides.concurrency {
            info!("Overriding concurrency: {}", concurrency);
            self.collection.concurrency = concurrency;
        }
        if let Some(timeout) = overrides.host_timeout {
            info!("Overriding host timeout: {}", humantime::format_duration(timeout));
            self.collection.host_timeout = timeout;
        }
        if let Some(deadline) = overrides.run_deadline {
            info!("Overriding run deadline: {}", humantime::format_duration(deadline));
            self.collection.run_deadline = Some(deadline);
        }
        if overrides.probe && !self.collection.methods.contains(&DiscoveryMethod::Probe) {
            self.collection.methods.push(DiscoveryMethod::Probe);
        }
        self.validate()
    }

    /// Hosts to collect: all of them, or only the named ones (in file order)
    pub fn targets(&self, only: &[String]) -> Result<Vec<&HostConfig>, InventoryError> {
        if let Some(unknown) = only.iter().find(|n| !self.hosts.iter().any(|h| &h.name == *n)) {
            return Err(InventoryError::UnknownHost(unknown.clone()));
        }
        Ok(self
            .hosts
            .iter()
            .filter(|h| only.is_empty() || only.contains(&h.name))
            .collect())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            concurrency: self.collection.concurrency,
            host_timeout: self.collection.host_timeout,
            run_deadline: self.collection.run_deadline,
            collector: CollectorOptions::with_methods(self.collection.methods.iter().copied()),
        }
    }
}

fn resolve_host(
    name: String,
    raw: RawHost,
    defaults: &SshDefaults,
    global_exclusions: &[String],
) -> Result<Option<HostConfig>, InventoryError> {
    let Some(hostname) = raw.hostname.filter(|h| !h.trim().is_empty()) else {
        warn!("Host {} has no hostname, skipping", name);
        return Ok(None);
    };

    let auth_type = raw.auth_type.unwrap_or(defaults.auth_type);
    let password = raw.password.or_else(|| defaults.password.clone());
    if auth_type == AuthType::Password && password.is_none() {
        return Err(InventoryError::InvalidHost {
            name,
            reason: "auth_type is password but no password is set".to_string(),
        });
    }

    let mut exclude_interfaces = raw.exclude_interfaces;
    exclude_interfaces.extend(global_exclusions.iter().cloned());
    let exclusions = ExclusionSet::compile(&exclude_interfaces).map_err(|source| InventoryError::Exclusion {
        host: name.clone(),
        source,
    })?;

    Ok(Some(HostConfig {
        hostname,
        port: raw.port.unwrap_or(defaults.port),
        username: raw.username.unwrap_or_else(|| defaults.username.clone()),
        auth_type,
        key_file: raw.key_file.or_else(|| defaults.key_file.clone()),
        password,
        timeout: raw.timeout.unwrap_or(defaults.timeout),
        description: raw.description.unwrap_or_default(),
        exclude_interfaces,
        exclusions,
        name,
    }))
}

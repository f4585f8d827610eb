//! Configuration types for the RRset engine
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Reconciliation engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Backing store
    #[serde(default)]
    pub store: StoreConfig,
}

impl ServiceConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.engine.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// JSON file store
    File {
        /// Path to the store file
        path: String,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::File { .. } => "file",
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// TTL floor assigned to newly created domains
    #[serde(default = "default_minimum_ttl")]
    pub minimum_ttl: u32,

    /// Upper TTL bound for every write
    #[serde(default = "default_maximum_ttl")]
    pub maximum_ttl: u32,

    /// Maximum number of times a batch is re-run after a storage fault
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay before the first retry (in milliseconds), doubled per attempt
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Deadline for a batch to reach its commit point (in milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Interval between re-pushes of changes the sync target refused (in milliseconds)
    #[serde(default = "default_resync_interval_ms")]
    pub resync_interval_ms: u64,

    /// Dynamic DNS check-in settings
    #[serde(default)]
    pub dyndns: DyndnsConfig,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.minimum_ttl == 0 {
            return Err(crate::Error::config("minimum_ttl must be > 0"));
        }
        if self.minimum_ttl > self.maximum_ttl {
            return Err(crate::Error::config(format!(
                "minimum_ttl ({}) exceeds maximum_ttl ({})",
                self.minimum_ttl, self.maximum_ttl
            )));
        }
        if self.resync_interval_ms == 0 {
            return Err(crate::Error::config("resync_interval_ms must be > 0"));
        }
        if self.request_timeout_ms == 0 {
            return Err(crate::Error::config("request_timeout_ms must be > 0"));
        }
        self.dyndns.validate(self.maximum_ttl)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minimum_ttl: default_minimum_ttl(),
            maximum_ttl: default_maximum_ttl(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            resync_interval_ms: default_resync_interval_ms(),
            dyndns: DyndnsConfig::default(),
        }
    }
}

/// Dynamic DNS check-in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DyndnsConfig {
    /// TTL written for address records
    #[serde(default = "default_dyndns_ttl")]
    pub ttl: u32,

    /// TTL floor applied to check-in writes instead of the domain's floor
    #[serde(default = "default_dyndns_ttl")]
    pub minimum_ttl: u32,
}

impl DyndnsConfig {
    fn validate(&self, maximum_ttl: u32) -> Result<(), crate::Error> {
        if self.minimum_ttl == 0 || self.ttl < self.minimum_ttl {
            return Err(crate::Error::config(format!(
                "dyndns ttl ({}) must be >= dyndns minimum_ttl ({}) and > 0",
                self.ttl, self.minimum_ttl
            )));
        }
        if self.ttl > maximum_ttl {
            return Err(crate::Error::config(format!(
                "dyndns ttl ({}) exceeds maximum_ttl ({})",
                self.ttl, maximum_ttl
            )));
        }
        Ok(())
    }
}

impl Default for DyndnsConfig {
    fn default() -> Self {
        Self {
            ttl: default_dyndns_ttl(),
            minimum_ttl: default_dyndns_ttl(),
        }
    }
}

fn default_minimum_ttl() -> u32 {
    3600
}

fn default_maximum_ttl() -> u32 {
    86400
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_resync_interval_ms() -> u64 {
    30_000
}

fn default_dyndns_ttl() -> u32 {
    60
}

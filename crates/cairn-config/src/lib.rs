//! Scheduling configuration for Cairn
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (CAIRN_* prefix, `__` between sections)
//! 2. cairn.local.toml (gitignored, local overrides)
//! 3. cairn.toml (git-tracked, project config)
//! 4. ~/.config/cairn/schedule.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! The loaded [`CairnConfig`] is wrapped in [`ScheduleOptions`], a shared
//! handle that administrative callers can mutate at runtime while the
//! checkers keep reading the current values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Default capacity of the region waiting list.
pub const DEFAULT_WAITING_LIST_CAPACITY: usize = 1000;

/// Main Cairn configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CairnConfig {
    pub schedule: ScheduleConfig,
    pub replication: ReplicationConfig,
}

/// Limits and thresholds used by the region checkers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Maximum number of in-flight replica operators.
    pub replica_schedule_limit: u64,
    /// Maximum number of in-flight merge operators.
    pub merge_schedule_limit: u64,
    /// Regions at or below this size (MiB) are merge candidates.
    pub max_merge_region_size: u64,
    /// Regions at or below this key count are merge candidates.
    pub max_merge_region_keys: u64,
    /// A freshly split region is not merged again within this window.
    pub split_merge_interval_secs: u64,
    pub waiting_list_capacity: usize,
    pub priority_queue_capacity: usize,
    /// Delay before a queued priority region is reported again.
    pub priority_retry_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            replica_schedule_limit: 64,
            merge_schedule_limit: 8,
            max_merge_region_size: 20,
            max_merge_region_keys: 200_000,
            split_merge_interval_secs: 3600,
            waiting_list_capacity: DEFAULT_WAITING_LIST_CAPACITY,
            priority_queue_capacity: 10_000,
            priority_retry_interval_secs: 10,
        }
    }
}

/// Replica placement settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Target replica count when placement rules are disabled.
    pub max_replicas: usize,
    /// Store label keys, most significant first, used to spread replicas.
    pub location_labels: Vec<String>,
    pub enable_placement_rules: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_replicas: 3,
            location_labels: Vec::new(),
            enable_placement_rules: true,
        }
    }
}

impl CairnConfig {
    /// Load configuration from default locations
    pub fn load() -> anyhow::Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML file without layering.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with placement rules turned off (legacy replica checker).
    pub fn legacy() -> Self {
        Self {
            replication: ReplicationConfig {
                enable_placement_rules: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Rejects values that would leave the controller unable to work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replication.max_replicas == 0 {
            return Err(ConfigError::ValidationError(
                "replication.max_replicas must be >= 1".to_string(),
            ));
        }
        if self.schedule.waiting_list_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "schedule.waiting_list_capacity must be >= 1".to_string(),
            ));
        }
        if self.schedule.priority_queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "schedule.priority_queue_capacity must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Runtime options
// ============================================================================

/// Shared, runtime-mutable view of the configuration.
///
/// Every getter reads the current value, so a toggle made through the
/// admin surface is observed by the next region check.
#[derive(Debug, Default)]
pub struct ScheduleOptions {
    inner: RwLock<CairnConfig>,
}

impl ScheduleOptions {
    pub fn new(config: CairnConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&CairnConfig) -> T) -> T {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write(&self, f: impl FnOnce(&mut CairnConfig)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }

    /// Returns a copy of the whole configuration.
    pub fn snapshot(&self) -> CairnConfig {
        self.read(Clone::clone)
    }

    pub fn is_placement_rules_enabled(&self) -> bool {
        self.read(|c| c.replication.enable_placement_rules)
    }

    pub fn replica_schedule_limit(&self) -> u64 {
        self.read(|c| c.schedule.replica_schedule_limit)
    }

    pub fn merge_schedule_limit(&self) -> u64 {
        self.read(|c| c.schedule.merge_schedule_limit)
    }

    pub fn max_replicas(&self) -> usize {
        self.read(|c| c.replication.max_replicas)
    }

    pub fn location_labels(&self) -> Vec<String> {
        self.read(|c| c.replication.location_labels.clone())
    }

    pub fn max_merge_region_size(&self) -> u64 {
        self.read(|c| c.schedule.max_merge_region_size)
    }

    pub fn max_merge_region_keys(&self) -> u64 {
        self.read(|c| c.schedule.max_merge_region_keys)
    }

    pub fn split_merge_interval_secs(&self) -> u64 {
        self.read(|c| c.schedule.split_merge_interval_secs)
    }

    pub fn priority_retry_interval_secs(&self) -> u64 {
        self.read(|c| c.schedule.priority_retry_interval_secs)
    }

    pub fn set_placement_rules_enabled(&self, enabled: bool) {
        self.write(|c| c.replication.enable_placement_rules = enabled);
    }

    pub fn set_replica_schedule_limit(&self, limit: u64) {
        self.write(|c| c.schedule.replica_schedule_limit = limit);
    }

    pub fn set_merge_schedule_limit(&self, limit: u64) {
        self.write(|c| c.schedule.merge_schedule_limit = limit);
    }

    pub fn set_max_replicas(&self, max_replicas: usize) {
        self.write(|c| c.replication.max_replicas = max_replicas);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CairnConfig::default();
        assert_eq!(config.schedule.replica_schedule_limit, 64);
        assert_eq!(config.schedule.merge_schedule_limit, 8);
        assert_eq!(config.schedule.waiting_list_capacity, 1000);
        assert_eq!(config.replication.max_replicas, 3);
        assert!(config.replication.enable_placement_rules);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_config() {
        let config = CairnConfig::legacy();
        assert!(!config.replication.enable_placement_rules);
        assert_eq!(config.replication.max_replicas, 3);
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = CairnConfig::default();
        config.schedule.waiting_list_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = CairnConfig::default();
        config.replication.max_replicas = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("schedule.toml");
        std::fs::write(
            &path,
            r#"
[schedule]
replica_schedule_limit = 4

[replication]
location_labels = ["zone", "host"]
"#,
        )
        .expect("Failed to write config");

        let config = CairnConfig::from_toml_file(&path).expect("Failed to parse config");
        assert_eq!(config.schedule.replica_schedule_limit, 4);
        assert_eq!(config.schedule.merge_schedule_limit, 8);
        assert_eq!(config.replication.location_labels, vec!["zone", "host"]);
    }

    #[test]
    fn test_from_toml_file_reports_parse_errors() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "[schedule\nreplica_schedule_limit = ").expect("write");

        let err = CairnConfig::from_toml_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));

        let missing = CairnConfig::from_toml_file(temp_dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_options_observe_runtime_changes() {
        let options = ScheduleOptions::new(CairnConfig::default());
        assert!(options.is_placement_rules_enabled());

        options.set_placement_rules_enabled(false);
        options.set_replica_schedule_limit(2);
        options.set_merge_schedule_limit(0);

        assert!(!options.is_placement_rules_enabled());
        assert_eq!(options.replica_schedule_limit(), 2);
        assert_eq!(options.merge_schedule_limit(), 0);
        assert_eq!(options.snapshot().schedule.replica_schedule_limit, 2);
    }
}

//! YAML configuration for the updater.
//!
//! # Storage layout
//!
//! ```text
//! ~/.repo-updater/
//!   config.yaml     (mode 0600, created by `repo-updater init`)
//!   catalog.json    (default catalog location)
//! ```
//!
//! # API pattern
//!
//! Every path-taking function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::OriginName;

pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;
pub const DEFAULT_PUBLISH_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// What a failed source means for the repositories it previously reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFailurePolicy {
    /// The failed origin reported nothing, so its stored repositories are
    /// tombstoned like any other absent repository.
    #[default]
    TreatAsAbsent,
    /// The failed origin is dropped from this cycle's listing scope; its
    /// stored repositories are left untouched until it answers again.
    ProtectUnknown,
}

/// What the publisher does when the diff channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Wait until the subscriber makes room.
    #[default]
    Block,
    /// Discard the diff that did not fit.
    DropNewest,
    /// Fail the cycle's publish step.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_publish_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PUBLISH_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// One registered origin backed by an inventory snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub origin: OriginName,
    /// JSON array of repository records exported by the origin.
    pub path: PathBuf,
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Catalog location; `None` means `<home>/.repo-updater/catalog.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default)]
    pub on_source_failure: SourceFailurePolicy,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            catalog: None,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            on_source_failure: SourceFailurePolicy::default(),
            publish: PublishConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl UpdaterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Resolved catalog path for this config under `home`.
    pub fn catalog_path(&self, home: &Path) -> PathBuf {
        self.catalog
            .clone()
            .unwrap_or_else(|| default_catalog_path_at(home))
    }

    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval_secs must be > 0".into()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be > 0".into(),
            ));
        }
        if self.publish.capacity == 0 {
            return Err(ConfigError::Invalid("publish.capacity must be > 0".into()));
        }
        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if !seen.insert(&source.origin) {
                return Err(ConfigError::Invalid(format!(
                    "origin '{}' is configured more than once",
                    source.origin
                )));
            }
        }
        Ok(())
    }
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_max_concurrent_fetches() -> usize {
    DEFAULT_MAX_CONCURRENT_FETCHES
}

fn default_publish_capacity() -> usize {
    DEFAULT_PUBLISH_CAPACITY
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.repo-updater/`
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(".repo-updater")
}

/// `<home>/.repo-updater/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("config.yaml")
}

/// `<home>/.repo-updater/catalog.json`: pure, no I/O.
pub fn default_catalog_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("catalog.json")
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load and validate `<home>/.repo-updater/config.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<UpdaterConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    let config: UpdaterConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<UpdaterConfig, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save `config` to `<home>/.repo-updater/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &UpdaterConfig) -> Result<(), ConfigError> {
    config.validate()?;
    let dir = config_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml)?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &UpdaterConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 5. Init
// ---------------------------------------------------------------------------

/// Write a default config with the given interval.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_at(home: &Path, interval_secs: u64) -> Result<UpdaterConfig, ConfigError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    let config = UpdaterConfig {
        interval_secs,
        ..UpdaterConfig::default()
    };
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(interval_secs: u64) -> Result<UpdaterConfig, ConfigError> {
    init_at(&home()?, interval_secs)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    #[test]
    fn init_writes_defaults_and_is_idempotent() {
        let home = make_home();
        let first = init_at(home.path(), 30).expect("init");
        assert_eq!(first.interval_secs, 30);
        assert!(config_path_at(home.path()).exists());

        let second = init_at(home.path(), 999).expect("init again");
        assert_eq!(second.interval_secs, 30, "existing config must be kept");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let home = make_home();
        let config = UpdaterConfig {
            interval_secs: 5,
            catalog: Some(PathBuf::from("/srv/catalog.json")),
            on_source_failure: SourceFailurePolicy::ProtectUnknown,
            publish: PublishConfig {
                capacity: 2,
                overflow: OverflowPolicy::DropNewest,
            },
            sources: vec![SourceConfig {
                origin: OriginName::from("github"),
                path: PathBuf::from("/srv/github.json"),
            }],
            ..UpdaterConfig::default()
        };
        save_at(home.path(), &config).expect("save");
        assert_eq!(load_at(home.path()).expect("load"), config);
    }

    #[test]
    fn atomic_save_cleans_up_tmp() {
        let home = make_home();
        save_at(home.path(), &UpdaterConfig::default()).expect("save");
        let tmp = config_path_at(home.path()).with_extension("yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn load_missing_config_returns_not_found() {
        let home = make_home();
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigNotFound { .. }));
    }

    #[test]
    fn catalog_path_defaults_under_home() {
        let home = make_home();
        let config = UpdaterConfig::default();
        assert_eq!(
            config.catalog_path(home.path()),
            home.path().join(".repo-updater").join("catalog.json")
        );
    }

    #[test]
    fn validate_rejects_duplicate_origins() {
        let source = SourceConfig {
            origin: OriginName::from("github"),
            path: PathBuf::from("a.json"),
        };
        let config = UpdaterConfig {
            sources: vec![source.clone(), source],
            ..UpdaterConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"), "got: {err}");
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let config = UpdaterConfig {
            interval_secs: 0,
            ..UpdaterConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}

//! Sources and the per-reconciler source registry.
//!
//! A [`Source`] reports the current repository inventory of one origin.
//! [`SourceRegistry`] maps origin names to sources; a reconciler owns its
//! registry for its whole lifetime, and the registry's origin names are the
//! exact listing scope of the catalog.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use repo_updater_core::{OriginName, Repo, UpdaterConfig};

use crate::error::{FetchError, RegistryError};

/// Point-in-time inventory of one origin.
#[async_trait]
pub trait Source: Send + Sync {
    async fn list_repos(&self) -> Result<Vec<Repo>, FetchError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Origin name → source. Sorted by origin name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<OriginName, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one source under `origin`.
    pub fn register(
        &mut self,
        origin: impl Into<OriginName>,
        source: Arc<dyn Source>,
    ) -> Result<(), RegistryError> {
        let origin = origin.into();
        if !is_valid_origin(&origin.0) {
            return Err(RegistryError::InvalidOrigin(origin.0));
        }
        if self.sources.contains_key(&origin) {
            return Err(RegistryError::DuplicateOrigin(origin));
        }
        self.sources.insert(origin, source);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(
        mut self,
        origin: impl Into<OriginName>,
        source: Arc<dyn Source>,
    ) -> Result<Self, RegistryError> {
        self.register(origin, source)?;
        Ok(self)
    }

    /// One [`FileSource`] per configured origin.
    pub fn from_config(config: &UpdaterConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for source in &config.sources {
            let file = FileSource::new(source.origin.clone(), source.path.clone());
            registry.register(source.origin.clone(), Arc::new(file))?;
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sorted origin names: the catalog listing scope.
    pub fn origin_names(&self) -> Vec<OriginName> {
        self.sources.keys().cloned().collect()
    }

    pub fn get(&self, origin: &OriginName) -> Option<Arc<dyn Source>> {
        self.sources.get(origin).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OriginName, &Arc<dyn Source>)> {
        self.sources.iter()
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("origins", &self.origin_names())
            .finish()
    }
}

fn is_valid_origin(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// Reads an exported inventory (JSON array of [`Repo`]) on every fetch.
#[derive(Debug, Clone)]
pub struct FileSource {
    origin: OriginName,
    path: PathBuf,
}

impl FileSource {
    pub fn new(origin: impl Into<OriginName>, path: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Source for FileSource {
    async fn list_repos(&self) -> Result<Vec<Repo>, FetchError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FetchError::Io {
                path: self.path.clone(),
                source,
            })?;
        let mut repos: Vec<Repo> =
            serde_json::from_str(&contents).map_err(|source| FetchError::Parse {
                path: self.path.clone(),
                source,
            })?;
        // Exports usually omit the origin; the file belongs to exactly one.
        for repo in &mut repos {
            if repo.origin.0.is_empty() {
                repo.origin = self.origin.clone();
            }
        }
        Ok(repos)
    }
}

// ---------------------------------------------------------------------------
// StaticSource
// ---------------------------------------------------------------------------

/// In-memory source for tests and embedding.
///
/// Clones share state, so a test can keep a handle and change the inventory
/// (or make the origin fail) between cycles.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    inner: Arc<Mutex<StaticInner>>,
}

#[derive(Debug, Default)]
struct StaticInner {
    repos: Vec<Repo>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: usize,
}

impl StaticSource {
    pub fn new(repos: Vec<Repo>) -> Self {
        let source = Self::default();
        source.set_repos(repos);
        source
    }

    /// A source whose every fetch fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let source = Self::default();
        source.fail_with(message);
        source
    }

    pub fn set_repos(&self, repos: Vec<Repo>) {
        let mut inner = self.lock();
        inner.repos = repos;
        inner.failure = None;
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        self.lock().failure = Some(message.into());
    }

    /// Sleep this long before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StaticInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Source for StaticSource {
    async fn list_repos(&self) -> Result<Vec<Repo>, FetchError> {
        let delay = {
            let mut inner = self.lock();
            inner.calls += 1;
            inner.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let inner = self.lock();
        match &inner.failure {
            Some(message) => Err(FetchError::Unavailable(message.clone())),
            None => Ok(inner.repos.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use repo_updater_core::SourceConfig;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn register_rejects_duplicates_and_invalid_names() {
        let mut registry = SourceRegistry::new();
        registry
            .register("github", Arc::new(StaticSource::default()))
            .expect("register");

        let dup = registry.register("github", Arc::new(StaticSource::default()));
        assert_eq!(
            dup,
            Err(RegistryError::DuplicateOrigin(OriginName::from("github")))
        );

        let invalid = registry.register("has space", Arc::new(StaticSource::default()));
        assert!(matches!(invalid, Err(RegistryError::InvalidOrigin(_))));

        let empty = registry.register("", Arc::new(StaticSource::default()));
        assert!(matches!(empty, Err(RegistryError::InvalidOrigin(_))));
    }

    #[test]
    fn origin_names_are_sorted() {
        let registry = SourceRegistry::new()
            .with("gitlab", Arc::new(StaticSource::default()))
            .and_then(|r| r.with("bitbucket", Arc::new(StaticSource::default())))
            .and_then(|r| r.with("github", Arc::new(StaticSource::default())))
            .expect("registry");

        let names: Vec<String> = registry.origin_names().into_iter().map(|o| o.0).collect();
        assert_eq!(names, vec!["bitbucket", "github", "gitlab"]);
        assert_eq!(
            format!("{registry:?}"),
            r#"SourceRegistry { origins: [OriginName("bitbucket"), OriginName("github"), OriginName("gitlab")] }"#
        );
    }

    #[tokio::test]
    async fn file_source_fills_missing_origin() {
        let dir = TempDir::new().expect("tmp");
        let path = dir.path().join("github.json");
        fs::write(
            &path,
            r#"[{"name":"tokio","language":"Rust"},{"name":"serde","origin":"github"}]"#,
        )
        .expect("write");

        let repos = FileSource::new("github", &path)
            .list_repos()
            .await
            .expect("list");
        assert_eq!(repos.len(), 2);
        assert!(repos.iter().all(|r| r.origin.0 == "github"));
        assert_eq!(repos[0].language, "Rust");
    }

    #[tokio::test]
    async fn file_source_reports_missing_and_malformed_files() {
        let dir = TempDir::new().expect("tmp");
        let missing = FileSource::new("github", dir.path().join("nope.json"));
        assert!(matches!(
            missing.list_repos().await,
            Err(FetchError::Io { .. })
        ));

        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").expect("write");
        let malformed = FileSource::new("github", &path);
        assert!(matches!(
            malformed.list_repos().await,
            Err(FetchError::Parse { .. })
        ));
    }

    #[test]
    fn from_config_registers_every_source() {
        let config = UpdaterConfig {
            sources: vec![
                SourceConfig {
                    origin: OriginName::from("github"),
                    path: PathBuf::from("/srv/github.json"),
                },
                SourceConfig {
                    origin: OriginName::from("gitlab"),
                    path: PathBuf::from("/srv/gitlab.json"),
                },
            ],
            ..UpdaterConfig::default()
        };
        let registry = SourceRegistry::from_config(&config).expect("registry");
        assert_eq!(registry.len(), 2);
        assert!(registry.get(&OriginName::from("gitlab")).is_some());
    }

    #[tokio::test]
    async fn static_source_switches_between_inventory_and_failure() {
        let source = StaticSource::new(vec![Repo::new("tokio", "github")]);
        assert_eq!(source.list_repos().await.expect("ok").len(), 1);

        source.fail_with("timeout");
        assert!(matches!(
            source.list_repos().await,
            Err(FetchError::Unavailable(msg)) if msg == "timeout"
        ));

        source.set_repos(vec![]);
        assert!(source.list_repos().await.expect("ok").is_empty());
        assert_eq!(source.calls(), 3);
    }
}

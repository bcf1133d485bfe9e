//! repo-updater core library: domain types, snapshot diffing, configuration.
//!
//! - [`types`]: newtypes and the [`Repo`] record
//! - [`diff`]: [`Diffable`] and the generic [`Diff`] engine
//! - [`config`]: YAML configuration load / save / init
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod diff;
pub mod error;
pub mod types;

pub use config::{OverflowPolicy, PublishConfig, SourceConfig, SourceFailurePolicy, UpdaterConfig};
pub use diff::{Diff, Diffable};
pub use error::ConfigError;
pub use types::{OriginName, Repo, RepoKey, RepoName};

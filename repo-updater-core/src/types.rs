//! Domain types for the repository catalog.
//!
//! A [`Repo`] is identified by its [`RepoKey`]: the `(name, origin)` pair.
//! Lifecycle timestamps use `Option<DateTime<Utc>>`; `deleted_at == None`
//! means the repository is active, `Some(_)` means it is tombstoned.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::Diffable;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for an external origin (one registered source).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct OriginName(pub String);

impl fmt::Display for OriginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for OriginName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OriginName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed repository name, unique within one origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoName(pub String);

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepoName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepoName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identity of a repository across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoKey {
    pub name: RepoName,
    pub origin: OriginName,
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.origin)
    }
}

// ---------------------------------------------------------------------------
// Repo
// ---------------------------------------------------------------------------

/// A repository record as reported by a source or held in the catalog.
///
/// Only the display name, language, fork flag, archived flag and description
/// are authoritative (owned by the origin). `id`, `metadata` and the lifecycle
/// timestamps are bookkeeping owned by the store and the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    /// Store-assigned identifier; `0` until the record is first persisted.
    #[serde(default)]
    pub id: u64,
    pub name: RepoName,
    #[serde(default)]
    pub origin: OriginName,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub description: String,
    /// Free-form source annotations (clone URLs, star counts, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Repo {
    /// A fresh, never-persisted record with empty attributes.
    pub fn new(name: impl Into<RepoName>, origin: impl Into<OriginName>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            origin: origin.into(),
            display_name: String::new(),
            language: String::new(),
            fork: false,
            archived: false,
            description: String::new(),
            metadata: BTreeMap::new(),
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }

    pub fn key(&self) -> RepoKey {
        RepoKey {
            name: self.name.clone(),
            origin: self.origin.clone(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// True iff any origin-authoritative attribute differs from `other`.
    pub fn authoritative_differs(&self, other: &Repo) -> bool {
        self.display_name != other.display_name
            || self.language != other.language
            || self.fork != other.fork
            || self.archived != other.archived
            || self.description != other.description
    }
}

impl Diffable for Repo {
    type Key = RepoKey;

    fn diff_key(&self) -> RepoKey {
        self.key()
    }

    /// Sourced records carry no store bookkeeping; take it from the stored twin.
    fn inherit(&mut self, stored: &Self) {
        self.id = stored.id;
        self.created_at = stored.created_at;
        self.updated_at = stored.updated_at;
        self.deleted_at = stored.deleted_at;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::RemoteError;
use crate::git::Protocol;
use crate::sync::ProgressCallback;

/// Kind of account that owns the repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    User,
    Org,
}

impl EntityType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Org => "org",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "org" | "organization" => Ok(Self::Org),
            other => Err(format!("unknown entity type '{other}' (expected user or org)")),
        }
    }
}

/// Visibility filter applied when listing repositories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    All,
    Public,
    Private,
}

impl Visibility {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    /// Whether a repository with the given privacy passes this filter.
    #[must_use]
    pub fn admits(self, is_private: bool) -> bool {
        match self {
            Self::All => true,
            Self::Public => !is_private,
            Self::Private => is_private,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(format!(
                "unknown visibility '{other}' (expected all, public or private)"
            )),
        }
    }
}

/// One remote repository, as seen by a single fetch.
///
/// Built once per fetch and never mutated afterwards. Filtering may drop a
/// descriptor but never changes one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Repository name, unique within one inventory.
    pub name: String,
    pub https_url: String,
    pub ssh_url: String,
    /// `<workspace>/<entity>/<name>`.
    pub local_path: PathBuf,
    /// Default branch as reported by the remote, if any.
    pub default_branch: Option<String>,
    pub is_private: bool,
    pub is_archived: bool,
    pub is_fork: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl RepositoryDescriptor {
    /// Transport URL for the given protocol.
    #[must_use]
    pub fn url_for(&self, protocol: Protocol) -> &str {
        match protocol {
            Protocol::Https => &self.https_url,
            Protocol::Ssh => &self.ssh_url,
        }
    }
}

/// Ordered inventory of an entity's repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryBatch {
    pub entity_type: EntityType,
    pub entity_name: String,
    pub fetched_at: DateTime<Utc>,
    pub repositories: Vec<RepositoryDescriptor>,
}

impl InventoryBatch {
    /// Build a batch, dropping later descriptors whose name was already seen.
    pub fn new(
        entity_type: EntityType,
        entity_name: impl Into<String>,
        fetched_at: DateTime<Utc>,
        repositories: Vec<RepositoryDescriptor>,
    ) -> Self {
        let mut seen = HashSet::new();
        let repositories = repositories
            .into_iter()
            .filter(|r| seen.insert(r.name.clone()))
            .collect();

        Self {
            entity_type,
            entity_name: entity_name.into(),
            fetched_at,
            repositories,
        }
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.repositories.len()
    }

    /// Same batch with only the descriptors matching `keep`.
    #[must_use]
    pub fn retain(&self, keep: impl Fn(&RepositoryDescriptor) -> bool) -> Self {
        Self {
            entity_type: self.entity_type,
            entity_name: self.entity_name.clone(),
            fetched_at: self.fetched_at,
            repositories: self.repositories.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }
}

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InventoryRequest {
    pub entity_type: EntityType,
    pub entity_name: String,
    pub visibility: Visibility,
}

impl InventoryRequest {
    pub fn new(
        entity_type: EntityType,
        entity_name: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        Self {
            entity_type,
            entity_name: entity_name.into(),
            visibility,
        }
    }
}

/// Quota information reported by the remote on every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed in the window.
    pub limit: usize,
    /// Requests remaining in the current window.
    pub remaining: usize,
    /// When the window resets.
    pub reset_at: DateTime<Utc>,
}

/// Source of repository inventories.
///
/// Implementations fetch every page sequentially and honor the remote's
/// rate-limit signals. A fetch either returns the complete inventory or an
/// error; partial inventories are never returned.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Fetch the complete inventory for an entity.
    ///
    /// # Errors
    ///
    /// - [`RemoteError::Auth`] for a missing, invalid or expired credential
    /// - [`RemoteError::NotFound`] if the entity does not exist
    /// - [`RemoteError::RateLimited`] once the wait-and-retry budget is spent
    /// - [`RemoteError::Transient`] after bounded retries of network or 5xx failures
    async fn fetch_inventory(
        &self,
        request: &InventoryRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<InventoryBatch, RemoteError>;
}

#[cfg(test)]
pub(crate) fn descriptor(name: &str, root: &std::path::Path) -> RepositoryDescriptor {
    RepositoryDescriptor {
        name: name.to_string(),
        https_url: format!("https://github.com/acme/{name}.git"),
        ssh_url: format!("git@github.com:acme/{name}.git"),
        local_path: root.join("acme").join(name),
        default_branch: Some("main".to_string()),
        is_private: false,
        is_archived: false,
        is_fork: false,
        last_updated: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn entity_type_parses_case_insensitively() {
        assert_eq!("USER".parse::<EntityType>().unwrap(), EntityType::User);
        assert_eq!("organization".parse::<EntityType>().unwrap(), EntityType::Org);
        assert!("team".parse::<EntityType>().is_err());
    }

    #[test]
    fn visibility_admits() {
        assert!(Visibility::All.admits(true));
        assert!(Visibility::Public.admits(false));
        assert!(!Visibility::Public.admits(true));
        assert!(Visibility::Private.admits(true));
        assert!("bogus".parse::<Visibility>().is_err());
    }

    #[test]
    fn batch_deduplicates_names_keeping_first() {
        let root = Path::new("/work");
        let mut dup = descriptor("api", root);
        dup.is_private = true;
        let batch = InventoryBatch::new(
            EntityType::Org,
            "acme",
            Utc::now(),
            vec![descriptor("api", root), descriptor("web", root), dup],
        );

        assert_eq!(batch.total_count(), 2);
        assert!(!batch.repositories[0].is_private);
        assert_eq!(batch.repositories[1].name, "web");
    }

    #[test]
    fn url_for_protocol() {
        let repo = descriptor("api", Path::new("/work"));
        assert_eq!(repo.url_for(Protocol::Https), "https://github.com/acme/api.git");
        assert_eq!(repo.url_for(Protocol::Ssh), "git@github.com:acme/api.git");
    }

    #[test]
    fn retain_keeps_order_and_metadata() {
        let root = Path::new("/work");
        let batch = InventoryBatch::new(
            EntityType::User,
            "octo",
            Utc::now(),
            vec![descriptor("a", root), descriptor("b", root), descriptor("c", root)],
        );
        let kept = batch.retain(|r| r.name != "b");
        assert_eq!(kept.entity_name, "octo");
        let names: Vec<_> = kept.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}

//! Inventory filtering, applied before probing and reconciliation.

use crate::remote::{InventoryBatch, RepositoryDescriptor, Visibility};

/// Selects the repositories of an inventory that take part in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFilter {
    /// Explicit repository names. Empty selects everything.
    pub names: Vec<String>,
    pub visibility: Visibility,
    pub exclude_archived: bool,
    pub exclude_forks: bool,
}

impl Default for RepoFilter {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            visibility: Visibility::All,
            exclude_archived: true,
            exclude_forks: false,
        }
    }
}

impl RepoFilter {
    #[must_use]
    pub fn matches(&self, repo: &RepositoryDescriptor) -> bool {
        if !self.names.is_empty()
            && !self.names.iter().any(|n| n.eq_ignore_ascii_case(&repo.name))
        {
            return false;
        }
        if self.exclude_archived && repo.is_archived {
            return false;
        }
        if self.exclude_forks && repo.is_fork {
            return false;
        }
        self.visibility.admits(repo.is_private)
    }

    #[must_use]
    pub fn apply(&self, batch: &InventoryBatch) -> InventoryBatch {
        batch.retain(|repo| self.matches(repo))
    }

    /// Requested names that the inventory does not contain at all.
    #[must_use]
    pub fn unknown_names<'a>(&'a self, batch: &InventoryBatch) -> Vec<&'a str> {
        self.names
            .iter()
            .filter(|name| {
                !batch
                    .repositories
                    .iter()
                    .any(|r| r.name.eq_ignore_ascii_case(name))
            })
            .map(String::as_str)
            .collect()
    }
}

use std::path::Path;

use super::types::GitHubRepo;
use crate::remote::RepositoryDescriptor;

/// Convert a GitHub listing entry into a descriptor rooted at
/// `<workspace_root>/<entity_name>/<repo>`.
pub fn to_descriptor(
    repo: GitHubRepo,
    workspace_root: &Path,
    entity_name: &str,
) -> RepositoryDescriptor {
    let local_path = workspace_root.join(entity_name).join(&repo.name);
    RepositoryDescriptor {
        name: repo.name,
        https_url: repo.clone_url,
        ssh_url: repo.ssh_url,
        local_path,
        default_branch: repo.default_branch.filter(|b| !b.is_empty()),
        is_private: repo.private,
        is_archived: repo.archived,
        is_fork: repo.fork,
        last_updated: repo.updated_at,
    }
}

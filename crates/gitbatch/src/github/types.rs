//! GitHub REST API payloads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Repository entry from the `/orgs/{org}/repos`, `/users/{user}/repos` and
/// `/user/repos` listings. Only the fields the inventory needs.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    pub clone_url: String,
    pub ssh_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The authenticated user (`GET /user`).
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

/// Error body GitHub returns with 4xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubErrorBody {
    pub message: String,
    #[serde(default)]
    pub documentation_url: Option<String>,
}

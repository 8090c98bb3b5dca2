//! Configuration file support for gitbatch.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (`GITBATCH_<SECTION>__<KEY>`, e.g. `GITBATCH_SYNC__MAX_WORKERS`)
//! 3. Config file (./gitbatch.toml, then ~/.config/gitbatch/config.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or GITBATCH_GITHUB__TOKEN / GITHUB_TOKEN
//! api_url = "https://api.github.com"
//!
//! [sync]
//! local_folder = "/home/me/src"
//! protocol = "ssh"
//! protocol_policy = "interactive"
//! max_workers = 4
//! timeout_secs = 300
//! visibility = "all"
//! exclude_archived = true
//! exclude_forks = false
//!
//! [cache]
//! enabled = true
//! ttl_secs = 3600
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use gitbatch::github::DEFAULT_API_URL;
use gitbatch::sync::{DEFAULT_MAX_WORKERS, DEFAULT_OPERATION_TIMEOUT, MAX_WORKERS};
use gitbatch::{Protocol, ResolutionPolicy, Visibility};
use serde::Deserialize;
use thiserror::Error;

/// Token values that are obviously copied from documentation.
const PLACEHOLDER_TOKENS: &[&str] = &[
    "your_token_here",
    "your-token-here",
    "your_github_token",
    "changeme",
    "change_me",
    "<token>",
    "token",
    "xxx",
    "ghp_xxx",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("local folder is not set (use --local-folder or [sync] local_folder)")]
    MissingLocalFolder,

    #[error("local folder must be an absolute path: {0}")]
    RelativeLocalFolder(PathBuf),

    #[error("GitHub token looks like a placeholder; set a real token or leave it empty")]
    PlaceholderToken,

    #[error("max workers must be between 1 and {MAX_WORKERS}, got {0}")]
    MaxWorkers(usize),

    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
}

/// GitHub configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// API token. Empty or absent means anonymous access to public repositories.
    pub token: Option<String>,
    /// API base URL; point at `https://host/api/v3` for GitHub Enterprise.
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Workspace root. Working copies land in `<local_folder>/<entity>/<repo>`.
    pub local_folder: Option<PathBuf>,
    pub protocol: Protocol,
    pub protocol_policy: ResolutionPolicy,
    pub max_workers: usize,
    /// Timeout for a single clone or pull, in seconds.
    pub timeout_secs: u64,
    pub visibility: Visibility,
    pub exclude_archived: bool,
    pub exclude_forks: bool,
    /// Disable proactive request pacing.
    pub no_rate_limit: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_folder: None,
            protocol: Protocol::Https,
            protocol_policy: ResolutionPolicy::Interactive,
            max_workers: DEFAULT_MAX_WORKERS,
            timeout_secs: DEFAULT_OPERATION_TIMEOUT.as_secs(),
            visibility: Visibility::All,
            exclude_archived: true,
            exclude_forks: false,
            no_rate_limit: false,
        }
    }
}

/// Inventory cache options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    /// Defaults to the XDG cache directory.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            dir: None,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/gitbatch/config.toml)
    /// 3. Local config file (./gitbatch.toml)
    /// 4. Environment variables with GITBATCH_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("gitbatch.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./gitbatch.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // GITBATCH_SYNC__MAX_WORKERS -> sync.max_workers
        builder = builder.add_source(
            Environment::with_prefix("GITBATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Check everything that must hold before the network is touched.
    ///
    /// Run after CLI overrides have been applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let folder = self
            .sync
            .local_folder
            .as_ref()
            .ok_or(ConfigError::MissingLocalFolder)?;
        if !folder.is_absolute() {
            return Err(ConfigError::RelativeLocalFolder(folder.clone()));
        }
        if let Some(token) = self.github_token()
            && is_placeholder(&token)
        {
            return Err(ConfigError::PlaceholderToken);
        }
        if !(1..=MAX_WORKERS).contains(&self.sync.max_workers) {
            return Err(ConfigError::MaxWorkers(self.sync.max_workers));
        }
        if self.sync.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// The configured token, with empty strings treated as absent.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Cache directory: the configured one, else `$XDG_CACHE_HOME/gitbatch`.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache.dir.clone().or_else(|| {
            ProjectDirs::from("", "", "gitbatch").map(|dirs| dirs.cache_dir().to_path_buf())
        })
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gitbatch").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

fn is_placeholder(token: &str) -> bool {
    let lowered = token.to_ascii_lowercase();
    PLACEHOLDER_TOKENS.contains(&lowered.as_str())
        || (lowered.starts_with('<') && lowered.ends_with('>'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml_content: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    fn valid() -> Config {
        from_toml(
            r#"
            [sync]
            local_folder = "/srv/src"
        "#,
        )
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert!(config.sync.local_folder.is_none());
        assert_eq!(config.sync.protocol, Protocol::Https);
        assert_eq!(config.sync.protocol_policy, ResolutionPolicy::Interactive);
        assert_eq!(config.sync.max_workers, 4);
        assert_eq!(config.sync.timeout_secs, 300);
        assert_eq!(config.sync.visibility, Visibility::All);
        assert!(config.sync.exclude_archived);
        assert!(!config.sync.exclude_forks);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 3600);
    }

    #[test]
    fn test_full_config_parsing() {
        let config = from_toml(
            r#"
            [github]
            token = "ghp_test123"
            api_url = "https://github.example.com/api/v3"

            [sync]
            local_folder = "/srv/src"
            protocol = "ssh"
            protocol_policy = "skip"
            max_workers = 8
            timeout_secs = 60
            visibility = "private"
            exclude_archived = false
            exclude_forks = true

            [cache]
            enabled = false
            ttl_secs = 120
            dir = "/tmp/gitbatch-cache"
        "#,
        );

        assert_eq!(config.github_token(), Some("ghp_test123".to_string()));
        assert_eq!(config.github.api_url, "https://github.example.com/api/v3");
        assert_eq!(config.sync.local_folder, Some(PathBuf::from("/srv/src")));
        assert_eq!(config.sync.protocol, Protocol::Ssh);
        assert_eq!(config.sync.protocol_policy, ResolutionPolicy::Skip);
        assert_eq!(config.sync.max_workers, 8);
        assert_eq!(config.operation_timeout(), Duration::from_secs(60));
        assert_eq!(config.sync.visibility, Visibility::Private);
        assert!(!config.sync.exclude_archived);
        assert!(config.sync.exclude_forks);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache_ttl(), Duration::from_secs(120));
        assert_eq!(config.cache_dir(), Some(PathBuf::from("/tmp/gitbatch-cache")));
    }

    #[test]
    fn test_config_partial_override() {
        let config = from_toml(
            r#"
            [sync]
            max_workers = 10
        "#,
        );
        assert_eq!(config.sync.max_workers, 10);
        assert_eq!(config.sync.timeout_secs, 300);
        assert!(config.sync.exclude_archived);
    }

    #[test]
    fn test_config_merging_order() {
        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[sync]\nmax_workers = 2\ntimeout_secs = 30",
                FileFormat::Toml,
            ))
            .add_source(config::File::from_str("[sync]\nmax_workers = 6", FileFormat::Toml))
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.sync.max_workers, 6);
        assert_eq!(config.sync.timeout_secs, 30);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let result = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[sync]\nprotocol_policy = \"sometimes\"",
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize::<Config>();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_invalid_toml() {
        let result = ConfigBuilder::builder()
            .add_source(config::File::from_str("[sync\nmax_workers = 4", FileFormat::Toml))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_accepts_minimal_config() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn test_validate_requires_absolute_local_folder() {
        assert_eq!(
            Config::default().validate(),
            Err(ConfigError::MissingLocalFolder)
        );

        let mut config = valid();
        config.sync.local_folder = Some(PathBuf::from("src"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::RelativeLocalFolder(PathBuf::from("src")))
        );
    }

    #[test]
    fn test_validate_rejects_placeholder_tokens() {
        for placeholder in ["your_token_here", "CHANGEME", "<token>", "<paste token>"] {
            let mut config = valid();
            config.github.token = Some(placeholder.to_string());
            assert_eq!(config.validate(), Err(ConfigError::PlaceholderToken), "{placeholder}");
        }
    }

    #[test]
    fn test_empty_token_means_anonymous() {
        let mut config = valid();
        config.github.token = Some("   ".to_string());
        assert_eq!(config.github_token(), None);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_bounds_workers_and_timeout() {
        let mut config = valid();
        config.sync.max_workers = 0;
        assert_eq!(config.validate(), Err(ConfigError::MaxWorkers(0)));
        config.sync.max_workers = 21;
        assert_eq!(config.validate(), Err(ConfigError::MaxWorkers(21)));

        let mut config = valid();
        config.sync.timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn test_default_config_path_mentions_gitbatch() {
        let path = Config::default_config_path().unwrap();
        assert!(path.to_string_lossy().contains("gitbatch"));
        assert!(path.ends_with("config.toml"));
    }
}

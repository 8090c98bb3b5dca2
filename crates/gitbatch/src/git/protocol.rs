use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transport used for clone and pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Https,
    Ssh,
}

impl Protocol {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Https => "https",
            Self::Ssh => "ssh",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "https" => Ok(Self::Https),
            "ssh" => Ok(Self::Ssh),
            other => Err(format!("unknown protocol '{other}' (expected https or ssh)")),
        }
    }
}

/// Remote configuration of a local working copy, as found on disk.
///
/// Derived on demand by the prober and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolState {
    /// No working copy at the target path.
    NoneLocal,
    Https,
    Ssh,
    /// A working copy whose `origin` is missing or uses another scheme.
    Unknown,
}

impl ProtocolState {
    /// The protocol in use, for the two classifiable states.
    #[must_use]
    pub fn as_protocol(self) -> Option<Protocol> {
        match self {
            Self::Https => Some(Protocol::Https),
            Self::Ssh => Some(Protocol::Ssh),
            Self::NoneLocal | Self::Unknown => None,
        }
    }

    #[must_use]
    pub fn is_local(self) -> bool {
        !matches!(self, Self::NoneLocal)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoneLocal => "none-local",
            Self::Https => "https",
            Self::Ssh => "ssh",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a configured remote URL by scheme.
///
/// `https://` is HTTPS; `ssh://` and scp-like `user@host:path` are SSH.
/// Everything else (`file://`, `http://`, local paths) is unknown.
#[must_use]
pub fn classify_remote_url(url: &str) -> ProtocolState {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("https://") {
        return ProtocolState::Https;
    }
    if lower.starts_with("ssh://") {
        return ProtocolState::Ssh;
    }
    if !lower.contains("://")
        && let Some((user_host, path)) = url.split_once(':')
        && user_host.contains('@')
        && !user_host.contains('/')
        && !path.is_empty()
    {
        return ProtocolState::Ssh;
    }
    ProtocolState::Unknown
}

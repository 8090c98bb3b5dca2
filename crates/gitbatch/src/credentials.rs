//! Credential provider boundary.
//!
//! The core never stores a token. It asks a [`TokenProvider`] right before
//! each use and drops the value afterwards.

use std::fmt;

use thiserror::Error;

/// An API token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret. Only transports and clone-URL construction call this.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// The provider could not produce a token (locked keyring, unreadable file...).
#[derive(Debug, Error)]
#[error("Token unavailable: {reason}")]
pub struct TokenUnavailable {
    pub reason: String,
}

impl TokenUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Source of API credentials.
///
/// `Ok(None)` means "no credential configured": requests go out
/// unauthenticated and only public repositories are visible.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Result<Option<Token>, TokenUnavailable>;
}

/// A token fixed at construction (config file, environment, CLI flag).
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: Token,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Token::new(token),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> Result<Option<Token>, TokenUnavailable> {
        Ok(Some(self.token.clone()))
    }
}

/// Anonymous access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn token(&self) -> Result<Option<Token>, TokenUnavailable> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_redacted_in_debug_and_display() {
        let token = Token::new("ghp_supersecret");
        assert_eq!(format!("{token:?}"), "Token(***)");
        assert_eq!(token.to_string(), "***");
        assert_eq!(token.expose(), "ghp_supersecret");
    }

    #[test]
    fn providers() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.token().unwrap().unwrap().expose(), "abc");
        assert!(NoToken.token().unwrap().is_none());
    }

    #[test]
    fn token_unavailable_message() {
        let err = TokenUnavailable::new("keyring locked");
        assert_eq!(err.to_string(), "Token unavailable: keyring locked");
    }
}

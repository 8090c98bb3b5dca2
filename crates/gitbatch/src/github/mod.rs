//! GitHub implementation of the inventory client.
//!
//! - [`client`] - paginated, rate-limit-aware listing over an injected transport
//! - [`types`] - REST payloads
//! - [`convert`] - payload to [`RepositoryDescriptor`](crate::remote::RepositoryDescriptor)
//!
//! ```ignore
//! use gitbatch::github::GitHubClient;
//! use gitbatch::http::ReqwestTransport;
//!
//! let client = GitHubClient::new(
//!     Arc::new(ReqwestTransport::with_timeout(Duration::from_secs(30))?),
//!     Arc::new(StaticTokenProvider::new(token)),
//!     Arc::new(QuotaRateLimiter::system()),
//!     "/home/me/src",
//! );
//! let batch = client.fetch_inventory(&request, None).await?;
//! ```

mod client;
mod convert;
mod types;

pub use client::{
    DEFAULT_API_URL, DEFAULT_MAX_RATE_LIMIT_WAITS, GitHubClient, PER_PAGE,
    parse_rate_limit_headers,
};
pub use convert::to_descriptor;
pub use types::{GitHubErrorBody, GitHubRepo, GitHubUser};

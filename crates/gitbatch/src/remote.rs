//! Remote inventory: the client trait, its data model and rate limiting.
//!
//! The GitHub implementation lives in [`crate::github`]; this module only
//! holds what every inventory source shares.

mod errors;
mod rate_limit;
mod types;

pub use errors::{RemoteError, short_error_message};
pub use rate_limit::{
    AnchoredClock, ApiRateLimiter, Clock, QuotaRateLimiter, RateLimitPolicy, SystemClock,
    rate_limits,
};
pub use types::{
    EntityType, InventoryBatch, InventoryClient, InventoryRequest, RateLimitInfo,
    RepositoryDescriptor, Visibility,
};

#[cfg(test)]
pub(crate) use types::descriptor;

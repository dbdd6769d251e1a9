//! Order ID generation seam.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by an ID generator backend.
#[derive(Error, Debug, Clone)]
pub enum IdError {
    /// The shared sequence store is unreachable.
    ///
    /// There is deliberately no local fallback: a locally-invented ID could
    /// collide with one minted by another process instance sharing the store.
    #[error("id generator backend error: {0}")]
    Backend(String),
}

/// Produces globally unique, roughly time-ordered 64-bit identifiers.
///
/// IDs compose a coarse time segment in the high bits with a per-category,
/// per-period sequence in the low bits, the sequence coming from a single
/// atomic increment against a store shared by all process instances.
#[async_trait]
pub trait IdGenerator: Send + Sync {
    /// Next unique ID for the given category (e.g. `"order"`).
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Backend`] when the sequence store is unavailable.
    async fn next_id(&self, category: &str) -> Result<i64, IdError>;
}

//! Error kinds surfaced by the indexer. The dispatcher uses the kind to
//! decide between retrying a work item and dropping it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("enabled-indexes must not be empty")]
    EmptyEnabledIndexes,

    #[error("denomination must not be negative, got {0}")]
    NegativeDenomination(i32),

    #[error("configuration: {0}")]
    Config(String),

    /// Network failure, 5xx or timeout talking to Elasticsearch.
    #[error("elasticsearch backend: {0}")]
    Backend(#[source] anyhow::Error),

    /// The bulk request got a 2xx response with `errors: true`.
    #[error("bulk to {index} had failed items, first: {reason}")]
    PartialBulk { index: String, reason: String },

    /// Malformed input from the node. Retrying would never succeed.
    #[error("input: {0}")]
    Input(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IndexerError {
    /// Whether the dispatcher should retry the owning work item. Scripted
    /// upserts are idempotent, so partial bulk failures retry whole.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IndexerError::Backend(_) | IndexerError::PartialBulk { .. }
        )
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// One mirrored block, keyed by height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub height: u64,
    pub block_id: String,
    pub num_transactions: u64,
    pub proposer: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Reserved soft-delete marker; never set by the indexer.
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    /// Opaque payload, currently always empty.
    pub details: Option<Value>,
}

impl BlockRecord {
    /// Fresh record stamped with `now` for both timestamps.
    pub fn new(
        height: u64,
        block_id: impl Into<String>,
        proposer: impl Into<String>,
        num_transactions: u64,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            height,
            block_id: block_id.into(),
            num_transactions,
            proposer: proposer.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            details: None,
        }
    }
}

/// Identity half of a block, as read from the `/block` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIdentity {
    pub block_id: String,
    pub proposer: String,
}

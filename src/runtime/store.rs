use borsh::{BorshDeserialize, BorshSerialize};
use std::path::Path;
use std::sync::Mutex;
use time::OffsetDateTime;

use crate::error::{IndexerError, Result};
use crate::runtime::mdb::Mdb;
use crate::schemas::BlockRecord;

/// Outcome of a point lookup. A missing row is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(BlockRecord),
    NotFound,
}

/// Durable table of block records keyed by height.
pub trait BlockGateway: Send + Sync + 'static {
    fn lookup(&self, height: u64) -> Result<Lookup>;

    /// Insert, or on height conflict overwrite the mutable fields. `created_at` and `deleted_at`
    /// of an existing row are kept; `updated_at` never moves backwards. Returns the stored row.
    fn upsert(&self, record: &BlockRecord) -> Result<BlockRecord>;

    /// Number of stored rows.
    fn count(&self) -> Result<usize>;
}

/// Borsh-encoded value stored for each height.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
struct StoredBlock {
    block_id: String,
    proposer: String,
    num_transactions: u64,
    /// JSON text of the details payload
    details: Option<String>,
    created_at_ns: i128,
    updated_at_ns: i128,
    deleted_at_ns: Option<i128>,
}

impl StoredBlock {
    fn from_record(rec: &BlockRecord) -> Result<Self> {
        let details = rec
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| IndexerError::storage(format!("encode details: {e}")))?;
        Ok(Self {
            block_id: rec.block_id.clone(),
            proposer: rec.proposer.clone(),
            num_transactions: rec.num_transactions,
            details,
            created_at_ns: rec.created_at.unix_timestamp_nanos(),
            updated_at_ns: rec.updated_at.unix_timestamp_nanos(),
            deleted_at_ns: rec.deleted_at.map(|t| t.unix_timestamp_nanos()),
        })
    }

    fn into_record(self, height: u64) -> Result<BlockRecord> {
        let ts = |ns: i128| {
            OffsetDateTime::from_unix_timestamp_nanos(ns)
                .map_err(|e| IndexerError::storage(format!("bad timestamp at {height}: {e}")))
        };
        let details = self
            .details
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| IndexerError::storage(format!("decode details at {height}: {e}")))?;
        Ok(BlockRecord {
            height,
            block_id: self.block_id,
            num_transactions: self.num_transactions,
            proposer: self.proposer,
            created_at: ts(self.created_at_ns)?,
            updated_at: ts(self.updated_at_ns)?,
            deleted_at: self.deleted_at_ns.map(ts).transpose()?,
            details,
        })
    }
}

/// RocksDB-backed gateway under the `blocks/` namespace.
pub struct RocksBlockStore {
    mdb: Mdb,
    /// Serializes read-modify-write upserts.
    write_lock: Mutex<()>,
}

impl RocksBlockStore {
    pub const MDB_PREFIX: &'static str = "blocks/";

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mdb = Mdb::open(path, Self::MDB_PREFIX)?;
        Ok(Self::from_mdb(mdb))
    }

    pub fn from_mdb(mdb: Mdb) -> Self {
        Self { mdb, write_lock: Mutex::new(()) }
    }

    #[inline]
    fn key(height: u64) -> [u8; 8] {
        // big-endian so iteration follows height order
        height.to_be_bytes()
    }

    fn read(&self, height: u64) -> Result<Option<BlockRecord>> {
        match self.mdb.get(&Self::key(height))? {
            Some(raw) => {
                let row = StoredBlock::try_from_slice(&raw).map_err(|e| {
                    IndexerError::storage(format!("borsh decode block {height}: {e}"))
                })?;
                Ok(Some(row.into_record(height)?))
            }
            None => Ok(None),
        }
    }

    /// Cheap row estimate from RocksDB table properties; may lag recent writes.
    pub fn estimated_count(&self) -> Result<u64> {
        Ok(self.mdb.estimate_num_keys()?.unwrap_or(0))
    }

    /// All stored heights, ascending. Materializes every key; meant for tests and tooling.
    pub fn indexed_heights(&self) -> Result<Vec<u64>> {
        let keys = self.mdb.scan_prefix(&[])?;
        Ok(keys
            .into_iter()
            .filter_map(|k| <[u8; 8]>::try_from(k.as_slice()).ok())
            .map(u64::from_be_bytes)
            .collect())
    }
}

impl BlockGateway for RocksBlockStore {
    fn lookup(&self, height: u64) -> Result<Lookup> {
        Ok(match self.read(height)? {
            Some(rec) => Lookup::Found(rec),
            None => Lookup::NotFound,
        })
    }

    fn upsert(&self, record: &BlockRecord) -> Result<BlockRecord> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| IndexerError::storage("upsert lock poisoned"))?;

        let now = OffsetDateTime::now_utc();
        let stored = match self.read(record.height)? {
            Some(existing) => BlockRecord {
                created_at: existing.created_at,
                updated_at: now.max(existing.updated_at),
                deleted_at: existing.deleted_at,
                ..record.clone()
            },
            None => BlockRecord {
                created_at: now,
                updated_at: now,
                deleted_at: None,
                ..record.clone()
            },
        };

        let row = StoredBlock::from_record(&stored)?;
        let bytes = borsh::to_vec(&row).map_err(|e| {
            IndexerError::storage(format!("borsh encode block {}: {e}", stored.height))
        })?;
        self.mdb.put(&Self::key(stored.height), &bytes)?;
        Ok(stored)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.mdb.count_prefix(&[])?)
    }
}

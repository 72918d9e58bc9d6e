use rocksdb::{
    BlockBasedOptions, Cache, DB, Direction, Error as RocksError, IteratorMode, Options,
    ReadOptions,
};
use std::{path::Path, sync::Arc};

/// ===== Cache / open-time tuning =====
/// LRU block cache size (data + index/filter blocks).
pub const ROCKS_BLOCK_CACHE_BYTES: usize = 256 << 20; // 256 MiB

/// Bloom filter bits/key (helps point lookups by height).
pub const BLOOM_BITS_PER_KEY: f64 = 10.0;

/// Namespaced view over a shared RocksDB handle. Every key is stored as `prefix ++ key`.
#[derive(Clone)]
pub struct Mdb {
    db: Arc<DB>,
    prefix: Vec<u8>,
}

impl Mdb {
    pub fn from_db(db: Arc<DB>, prefix: impl AsRef<[u8]>) -> Self {
        Self { db, prefix: prefix.as_ref().to_vec() }
    }

    /// Open (or create) the database at `path` with the tuned table options.
    pub fn open(path: impl AsRef<Path>, prefix: impl AsRef<[u8]>) -> Result<Self, RocksError> {
        let cache = Cache::new_lru_cache(ROCKS_BLOCK_CACHE_BYTES);

        let mut table = BlockBasedOptions::default();
        table.set_block_cache(&cache);
        table.set_cache_index_and_filter_blocks(true);
        table.set_pin_l0_filter_and_index_blocks_in_cache(true);
        table.set_bloom_filter(BLOOM_BITS_PER_KEY, false);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(-1);
        opts.set_block_based_table_factory(&table);

        let db = DB::open(&opts, path)?;
        Ok(Self::from_db(Arc::new(db), prefix))
    }

    #[inline]
    pub fn prefixed(&self, k: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + k.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(k);
        out
    }

    pub fn get(&self, k: &[u8]) -> Result<Option<Vec<u8>>, RocksError> {
        self.db.get(self.prefixed(k))
    }

    pub fn put(&self, k: &[u8], v: &[u8]) -> Result<(), RocksError> {
        self.db.put(self.prefixed(k), v)
    }

    /// Full keys under `rel_prefix` in ascending byte order, read lazily.
    fn iter_prefix(
        &self,
        rel_prefix: &[u8],
    ) -> impl Iterator<Item = Result<Box<[u8]>, RocksError>> + '_ {
        let start = self.prefixed(rel_prefix);

        // upper bound = start with its last non-0xff byte incremented
        let mut ub = start.clone();
        while let Some(last) = ub.last_mut() {
            if *last != 0xff {
                *last += 1;
                break;
            }
            ub.pop();
        }

        let mut ro = ReadOptions::default();
        if !ub.is_empty() {
            ro.set_iterate_upper_bound(ub);
        }
        ro.set_total_order_seek(true);

        let it = self.db.iterator_opt(IteratorMode::From(&start, Direction::Forward), ro);
        it.map(|kv| kv.map(|(k, _v)| k))
            .take_while(move |k| k.as_ref().map_or(true, |k| k.starts_with(&start)))
    }

    /// Relative keys under `rel_prefix`, in ascending byte order.
    pub fn scan_prefix(&self, rel_prefix: &[u8]) -> Result<Vec<Vec<u8>>, RocksError> {
        let plen = self.prefix.len();
        self.iter_prefix(rel_prefix).map(|k| k.map(|k| k[plen..].to_vec())).collect()
    }

    /// Number of keys under `rel_prefix`, counted while iterating.
    pub fn count_prefix(&self, rel_prefix: &[u8]) -> Result<usize, RocksError> {
        let mut n = 0;
        for k in self.iter_prefix(rel_prefix) {
            k?;
            n += 1;
        }
        Ok(n)
    }

    /// RocksDB's key estimate for the whole database, across every namespace.
    pub fn estimate_num_keys(&self) -> Result<Option<u64>, RocksError> {
        self.db.property_int_value("rocksdb.estimate-num-keys")
    }

    #[inline]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }
}

use thiserror::Error;

/// Failure taxonomy shared by the resolver, the fetch pipeline and the accessor.
///
/// Variants carry rendered messages instead of foreign error types so the value stays `Clone`;
/// coalesced fetches hand the same outcome to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexerError {
    /// Transport failure or a non-success HTTP status from an upstream endpoint.
    #[error("network error calling {url}: {reason}")]
    Network { url: String, reason: String },

    /// Body was not valid JSON, or a field had an unexpected shape.
    #[error("parse error in {context}: {reason}")]
    Parse { context: String, reason: String },

    /// An expected nested field was absent from an upstream response.
    #[error("field `{path}` missing in {context}")]
    FieldMissing { context: String, path: String },

    /// Persistence gateway failure other than "no such row".
    #[error("storage error: {0}")]
    Storage(String),

    /// A spawned fetch or blocking storage task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    /// The two-call composition for a height failed.
    #[error("error fetching block {height}: {source}")]
    Fetch {
        height: u64,
        #[source]
        source: Box<IndexerError>,
    },
}

impl IndexerError {
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Network { url: url.into(), reason: reason.to_string() }
    }

    pub fn parse(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse { context: context.into(), reason: reason.to_string() }
    }

    pub fn field_missing(context: impl Into<String>, path: impl Into<String>) -> Self {
        Self::FieldMissing { context: context.into(), path: path.into() }
    }

    pub fn storage(reason: impl ToString) -> Self {
        Self::Storage(reason.to_string())
    }

    pub fn task(reason: impl ToString) -> Self {
        Self::Task(reason.to_string())
    }

    pub fn fetch(height: u64, source: IndexerError) -> Self {
        Self::Fetch { height, source: Box::new(source) }
    }
}

impl From<rocksdb::Error> for IndexerError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T, E = IndexerError> = std::result::Result<T, E>;

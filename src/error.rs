use thiserror::Error;

/// Errors raised by an [`crate::adapter::Adapter`] implementation.
///
/// Every variant wraps the operation name and the underlying cause, so a
/// caller can tell which adapter call failed without parsing the message.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("{op}() sqlite error: {source}")]
    Sqlite {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("{op}() serialization error: {source}")]
    Serde {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{op}() {detail}")]
    Other {
        op: &'static str,
        detail: String,
    },
}

impl AdapterError {
    pub fn other(op: &'static str, detail: impl Into<String>) -> Self {
        AdapterError::Other {
            op,
            detail: detail.into(),
        }
    }
}

/// A record failed validation before it was allowed to enter the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid id: {0:?}")]
    InvalidId(String),
    #[error("record must be a JSON object")]
    NotAnObject,
    #[error("missing id on update")]
    MissingIdOnUpdate,
    #[error("useRecordId requires an id")]
    UseRecordIdWithoutId,
    #[error("create() does not accept an id unless useRecordId is set")]
    UnexpectedId,
}

/// `get`/`update`/`delete` referenced a record that does not exist (or is a
/// tombstone and `includeDeleted` was not set).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("record {id:?} not found")]
pub struct NotFoundError {
    pub id: String,
}

/// `create` collided with an existing record, including a tombstone
/// ("virtually deleted").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("record {id:?} already exists{}", if *.virtually_deleted { " (virtually deleted)" } else { "" })]
pub struct IdExistsError {
    pub id: String,
    pub virtually_deleted: bool,
}

/// A [`crate::transaction::TransactionProxy`] method accessed an id that was
/// not declared in the transaction's `preload` set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{id:?} was not preloaded for this transaction")]
pub struct PreloadError {
    pub id: String,
}

/// An `execute` callback returned a thenable (in this port: a `Future`)
/// instead of completing synchronously. Detecting this is a contract the
/// adapter itself enforces at the type level in this port (see
/// `adapter::Adapter::execute`'s callback bound), but the error kind is kept
/// for parity with the source design and for adapters that must check at
/// runtime (e.g. a callback erroring out because it tried to spawn async
/// work).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("callback must be synchronous")]
pub struct ProgrammerError;

/// A transformer's `encode`/`decode` step failed.
#[derive(Error, Debug)]
#[error("transform failed: {detail}")]
pub struct TransformError {
    pub detail: String,
}

/// A hook returned something other than a valid payload.
#[derive(Error, Debug)]
#[error("hook {hook_name:?} violated its contract: {detail}")]
pub struct HookContractError {
    pub hook_name: String,
    pub detail: String,
}

/// The server declared a back-off window and `ignoreBackoff` was not set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("sync refused: server requested backoff until {retry_after_ms}ms from now")]
pub struct BackoffError {
    pub retry_after_ms: i64,
}

/// The server's reported collection timestamp regressed below the local
/// watermark: the remote was flushed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("server flushed: server timestamp {server_timestamp} < local watermark {local_timestamp}")]
pub struct ServerFlushedError {
    pub local_timestamp: i64,
    pub server_timestamp: i64,
}

/// The remote signalled EOL via HTTP 410 + an `Alert` header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("service deprecated: {message}")]
pub struct DeprecationError {
    pub message: String,
}

/// A caller tried to vend a second live [`crate::collection::LocalCollection`]
/// for a (bucket, name) key that already has one open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("collection {bucket:?}/{name:?} already has a live instance")]
pub struct DuplicateCollectionError {
    pub bucket: String,
    pub name: String,
}

/// Umbrella error type returned by [`crate::collection::LocalCollection`] and
/// [`crate::sync::SyncEngine`] operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    IdExists(#[from] IdExistsError),
    #[error(transparent)]
    Preload(#[from] PreloadError),
    #[error(transparent)]
    Programmer(#[from] ProgrammerError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Hook(#[from] HookContractError),
    #[error(transparent)]
    Backoff(#[from] BackoffError),
    #[error(transparent)]
    ServerFlushed(#[from] ServerFlushedError),
    #[error(transparent)]
    Deprecation(#[from] DeprecationError),
    #[error(transparent)]
    DuplicateCollection(#[from] DuplicateCollectionError),
    #[error("remote error: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

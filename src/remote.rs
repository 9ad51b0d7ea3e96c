//! The `RemoteCollection` contract. The HTTP client itself is an external
//! collaborator — this module only specifies the shape
//! [`crate::sync::SyncEngine`] consumes, plus [`MockRemote`], an in-memory
//! double for tests. No real HTTP transport is implemented here.

use crate::adapter::Filter;
use crate::conflict::ConflictEntry;
use crate::record::Record;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct ListRecordsParams {
    pub since: Option<i64>,
    pub filters: Vec<(String, Value)>,
    pub exclude_ids: Vec<String>,
    pub headers: HashMap<String, String>,
    pub retry: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ListRecordsResult {
    pub data: Vec<Record>,
    pub last_modified: Option<i64>,
    pub has_next_page: bool,
    pub next: Option<String>,
    pub total_records: Option<usize>,
}

/// A single queued write inside a `batch()` call, safety-conditioned per
/// `If-Match` / `If-None-Match: *`.
#[derive(Debug, Clone)]
pub struct BatchOperation {
    pub method: BatchMethod,
    pub record: Record,
    pub safe: SafeHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMethod {
    Create,
    Update,
    Delete,
}

/// Conditional-concurrency precondition attached to one batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeHeader {
    /// `If-None-Match: *` — the record must not already exist server-side.
    IfNoneMatchAny,
    /// `If-Match: "<ts>"` — the record must be at exactly this timestamp.
    IfMatch(i64),
    /// `If-Match: *` — force the write regardless of server state
    /// (used by the `CLIENT_WINS` strategy's forced re-push).
    IfMatchAny,
    None,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub safe: bool,
    pub aggregate: bool,
    pub retry: Option<u32>,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub published: Vec<Record>,
    pub errors: Vec<(Record, String)>,
    pub conflicts: Vec<ConflictEntry>,
    pub skipped: Vec<Record>,
}

#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    pub batch_max_requests: usize,
}

/// Response headers the engine inspects after any remote call: `ETag`
/// (watermark), `Backoff`/`Retry-After` (back-pressure), `Alert`
/// (deprecation signalling).
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    pub etag: Option<i64>,
    pub backoff_seconds: Option<i64>,
    pub retry_after_seconds: Option<i64>,
    pub alert: Option<AlertHeader>,
}

#[derive(Debug, Clone)]
pub struct AlertHeader {
    pub code: String,
    pub message: String,
    /// `true` when the server answered with HTTP 410 (hard EOL).
    pub is_eol: bool,
}

/// The external REST collaborator this crate treats as opaque. Implementors
/// transport `listRecords`/`batch`/`getData` over whatever wire protocol the
/// real service speaks; this crate only drives the trait.
#[async_trait(?Send)]
pub trait RemoteCollection {
    async fn list_records(
        &self,
        params: ListRecordsParams,
    ) -> Result<(ListRecordsResult, ResponseHeaders), crate::error::CoreError>;

    async fn batch(
        &self,
        operations: Vec<BatchOperation>,
        opts: BatchOptions,
    ) -> Result<(BatchResult, ResponseHeaders), crate::error::CoreError>;

    async fn get_data(&self) -> Result<(Value, ResponseHeaders), crate::error::CoreError>;

    async fn fetch_server_settings(&self) -> Result<ServerSettings, crate::error::CoreError>;

    async fn fetch_server_info(&self) -> Result<Value, crate::error::CoreError>;
}

fn filter_matches(record: &Record, filters: &[(String, Value)]) -> bool {
    filters.iter().all(|(field, expected)| {
        let filter = Filter::Eq(field.clone(), expected.clone());
        filter.matches(record)
    })
}

/// An in-memory [`RemoteCollection`] test double. Not a real HTTP client —
/// it exists so [`crate::sync::SyncEngine`] can be exercised without a
/// network.
#[derive(Default, Clone)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteState>>,
}

#[derive(Default)]
struct MockRemoteState {
    records: HashMap<String, Record>,
    timestamp: i64,
    metadata: Value,
    batch_max_requests: usize,
    backoff_seconds: Option<i64>,
    alert: Option<AlertHeader>,
}

impl MockRemote {
    pub fn new() -> Self {
        MockRemote {
            inner: Arc::new(Mutex::new(MockRemoteState {
                batch_max_requests: 25,
                metadata: Value::Object(Default::default()),
                ..Default::default()
            })),
        }
    }

    /// A cheap clone sharing the same underlying server state — useful in
    /// tests that need two independent `SyncEngine`s to observe the same
    /// mock server.
    pub fn clone_handle(&self) -> Self {
        self.clone()
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    /// Seed the server-side state directly, bumping the server timestamp and
    /// stamping the record's `last_modified` to match, as a real server
    /// would on every write.
    pub fn seed(&self, mut record: Record, timestamp: i64) {
        let mut state = self.inner.lock().unwrap();
        record.set_last_modified(Some(timestamp));
        let id = record.id().expect("seeded record needs an id").to_string();
        state.records.insert(id, record);
        state.timestamp = state.timestamp.max(timestamp);
    }

    pub fn set_backoff(&self, seconds: i64) {
        self.inner.lock().unwrap().backoff_seconds = Some(seconds);
    }

    pub fn set_alert(&self, alert: AlertHeader) {
        self.inner.lock().unwrap().alert = Some(alert);
    }

    pub fn set_batch_max_requests(&self, n: usize) {
        self.inner.lock().unwrap().batch_max_requests = n;
    }

    /// Simulates a server-side flush: every record is dropped and the
    /// timestamp is reset below `new_timestamp`.
    pub fn flush(&self, new_timestamp: i64) {
        let mut state = self.inner.lock().unwrap();
        state.records.clear();
        state.timestamp = new_timestamp;
    }

    pub fn current_timestamp(&self) -> i64 {
        self.inner.lock().unwrap().timestamp
    }

    fn next_timestamp(state: &mut MockRemoteState) -> i64 {
        state.timestamp += 1;
        state.timestamp
    }

    fn headers(state: &MockRemoteState) -> ResponseHeaders {
        ResponseHeaders {
            etag: Some(state.timestamp),
            backoff_seconds: state.backoff_seconds,
            retry_after_seconds: None,
            alert: state.alert.clone(),
        }
    }
}

#[async_trait(?Send)]
impl RemoteCollection for MockRemote {
    async fn list_records(
        &self,
        params: ListRecordsParams,
    ) -> Result<(ListRecordsResult, ResponseHeaders), crate::error::CoreError> {
        let state = self.inner.lock().unwrap();
        let mut data: Vec<Record> = state
            .records
            .values()
            .filter(|r| {
                let since_ok = params
                    .since
                    .map(|s| r.last_modified().unwrap_or(0) > s)
                    .unwrap_or(true);
                let excluded = r.id().map(|id| params.exclude_ids.iter().any(|e| e == id)).unwrap_or(false);
                since_ok && !excluded && filter_matches(r, &params.filters)
            })
            .cloned()
            .collect();
        data.sort_by_key(|r| r.last_modified().unwrap_or(0));
        let total = data.len();
        let result = ListRecordsResult {
            data,
            last_modified: Some(state.timestamp),
            has_next_page: false,
            next: None,
            total_records: Some(total),
        };
        Ok((result, Self::headers(&state)))
    }

    async fn batch(
        &self,
        operations: Vec<BatchOperation>,
        _opts: BatchOptions,
    ) -> Result<(BatchResult, ResponseHeaders), crate::error::CoreError> {
        let mut state = self.inner.lock().unwrap();
        let mut result = BatchResult::default();
        for op in operations {
            let id = op.record.id().unwrap_or_default().to_string();
            let existing = state.records.get(&id).cloned();
            let precondition_ok = match op.safe {
                SafeHeader::IfNoneMatchAny => existing.is_none(),
                SafeHeader::IfMatch(ts) => existing.as_ref().and_then(Record::last_modified) == Some(ts),
                SafeHeader::IfMatchAny => true,
                SafeHeader::None => true,
            };
            if !precondition_ok {
                result.conflicts.push(ConflictEntry {
                    kind: crate::conflict::ConflictType::Outgoing,
                    local: Some(op.record.clone()),
                    remote: existing,
                });
                continue;
            }
            match op.method {
                BatchMethod::Delete => {
                    state.records.remove(&id);
                    let ts = Self::next_timestamp(&mut state);
                    let mut tomb = op.record.clone();
                    tomb.set_last_modified(Some(ts));
                    result.published.push(tomb);
                }
                BatchMethod::Create | BatchMethod::Update => {
                    let ts = Self::next_timestamp(&mut state);
                    let mut stored = op.record.clone();
                    stored.set_last_modified(Some(ts));
                    state.records.insert(id, stored.clone());
                    result.published.push(stored);
                }
            }
        }
        Ok((result, Self::headers(&state)))
    }

    async fn get_data(&self) -> Result<(Value, ResponseHeaders), crate::error::CoreError> {
        let state = self.inner.lock().unwrap();
        Ok((state.metadata.clone(), Self::headers(&state)))
    }

    async fn fetch_server_settings(&self) -> Result<ServerSettings, crate::error::CoreError> {
        let state = self.inner.lock().unwrap();
        Ok(ServerSettings {
            batch_max_requests: state.batch_max_requests,
        })
    }

    async fn fetch_server_info(&self) -> Result<Value, crate::error::CoreError> {
        Ok(Value::Object(Default::default()))
    }
}

//! The `Adapter` capability: a durable KV-like store per named collection.
//! `MemoryAdapter` (this module's sibling `memory`) is the required test
//! double; `SqliteAdapter` (sibling `sqlite`) is the durable,
//! `rusqlite`-backed variant.

mod memory;
mod sqlite;

pub use memory::MemoryAdapter;
pub use sqlite::SqliteAdapter;

use crate::error::{AdapterError, CoreError};
use crate::record::Record;
use crate::transaction::{AbortSignal, TransactionProxy};
use async_trait::async_trait;
use serde_json::Value;

/// An equality/membership/ordering filter for `list`: scalar equality, array
/// membership, and dot-path equality. Dot paths (`"meta.author"`) are
/// resolved by walking nested JSON objects.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
}

impl Filter {
    fn field(&self) -> &str {
        match self {
            Filter::Eq(f, _) | Filter::In(f, _) | Filter::NotIn(f, _) => f,
        }
    }

    fn matches(&self, record: &Record) -> bool {
        let value = resolve_path(record.as_map(), self.field());
        match self {
            Filter::Eq(_, expected) => value == Some(expected),
            Filter::In(_, options) => value.map(|v| options.contains(v)).unwrap_or(false),
            Filter::NotIn(_, options) => !value.map(|v| options.contains(v)).unwrap_or(false),
        }
    }
}

fn resolve_path<'a>(map: &'a serde_json::Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = map.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// A single sort key, `field` ascending or `-field` descending.
#[derive(Debug, Clone)]
pub struct OrderKey {
    pub field: String,
    pub desc: bool,
}

impl OrderKey {
    pub fn parse(spec: &str) -> Self {
        if let Some(field) = spec.strip_prefix('-') {
            OrderKey {
                field: field.to_string(),
                desc: true,
            }
        } else {
            OrderKey {
                field: spec.to_string(),
                desc: false,
            }
        }
    }
}

/// Parameters for `Adapter::list` / `LocalCollection::list`.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub filters: Vec<Filter>,
    pub order: Vec<OrderKey>,
}

impl ListParams {
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    pub fn sort(&self, records: &mut [Record]) {
        if self.order.is_empty() {
            return;
        }
        records.sort_by(|a, b| {
            for key in &self.order {
                let av = resolve_path(a.as_map(), &key.field);
                let bv = resolve_path(b.as_map(), &key.field);
                let ordering = compare_values(av, bv);
                let ordering = if key.desc { ordering.reverse() } else { ordering };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// The durable, per-collection storage capability consumed by
/// [`crate::collection::LocalCollection`].
///
/// `execute`'s callback runs synchronously over a preloaded snapshot so a
/// single backing transaction can be held open for its duration; this port
/// enforces that contract at the type level by requiring the callback
/// itself be non-async (`FnOnce` returning a plain `Result`, never a
/// future), rather than detecting a stray thenable at runtime the way a
/// dynamically-typed host must.
#[async_trait(?Send)]
pub trait Adapter {
    /// Idempotently prepare the backing store schema for this collection key.
    async fn open(&self) -> Result<(), AdapterError>;

    /// Idempotently release any resources held open by `open`.
    async fn close(&self) -> Result<(), AdapterError>;

    /// Remove every record for this collection key. Metadata is untouched.
    async fn clear(&self) -> Result<(), AdapterError>;

    /// Open a scoped read-write transaction, preload the ids in `preload`,
    /// run `callback` synchronously against the resulting
    /// [`TransactionProxy`], then commit every queued write atomically — or
    /// discard all of them if `callback` returns `Err` or calls
    /// [`AbortSignal::abort`].
    ///
    /// `local_fields` governs the proxy's "local-field-only change keeps
    /// prior status" check; callers must pass the same set the owning
    /// collection was configured with, since the adapter itself holds no
    /// copy of it.
    async fn execute<F, R>(&self, preload: &[String], local_fields: &[String], callback: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut TransactionProxy, &AbortSignal) -> Result<R, CoreError>;

    async fn get(&self, id: &str) -> Result<Option<Record>, AdapterError>;

    async fn list(&self, params: &ListParams) -> Result<Vec<Record>, AdapterError>;

    async fn save_last_modified(&self, value: Option<i64>) -> Result<(), AdapterError>;

    async fn get_last_modified(&self) -> Result<Option<i64>, AdapterError>;

    async fn save_metadata(&self, metadata: Value) -> Result<(), AdapterError>;

    async fn get_metadata(&self) -> Result<Option<Value>, AdapterError>;

    /// Bulk upsert that preserves already-modified local records
    /// (`importBulk`). Returns the number of records actually written.
    async fn import_bulk(&self, records: Vec<Record>) -> Result<usize, AdapterError>;
}

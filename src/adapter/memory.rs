use super::{Adapter, ListParams};
use crate::error::{AdapterError, CoreError};
use crate::record::Record;
use crate::transaction::{AbortSignal, TransactionProxy, WriteOp};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct State {
    records: HashMap<String, Record>,
    last_modified: Option<i64>,
    metadata: Option<Value>,
}

/// An in-memory [`Adapter`] implementation, primarily for tests; also a
/// reasonable default for short-lived or embedded hosts that don't need
/// durability across process restarts.
#[derive(Default)]
pub struct MemoryAdapter {
    state: Mutex<State>,
}

#[async_trait(?Send)]
impl Adapter for MemoryAdapter {
    async fn open(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), AdapterError> {
        self.state.lock().records.clear();
        Ok(())
    }

    async fn execute<F, R>(&self, preload: &[String], local_fields: &[String], callback: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut TransactionProxy, &AbortSignal) -> Result<R, CoreError>,
    {
        let mut guard = self.state.lock();
        let mut snapshot = HashMap::new();
        let mut declared = HashSet::new();
        for id in preload {
            declared.insert(id.clone());
            if let Some(r) = guard.records.get(id) {
                snapshot.insert(id.clone(), r.clone());
            }
        }
        let mut proxy = TransactionProxy::new(snapshot, declared, local_fields.to_vec());
        let abort = AbortSignal::default();
        let result = callback(&mut proxy, &abort)?;
        if abort.is_aborted() {
            return Err(CoreError::Adapter(AdapterError::other(
                "execute",
                "callback requested abort",
            )));
        }
        for op in proxy.into_writes() {
            match op {
                WriteOp::Put(record) => {
                    let id = record.id().expect("queued write missing id").to_string();
                    guard.records.insert(id, record);
                }
                WriteOp::Purge(id) => {
                    guard.records.remove(&id);
                }
            }
        }
        Ok(result)
    }

    async fn get(&self, id: &str) -> Result<Option<Record>, AdapterError> {
        Ok(self.state.lock().records.get(id).cloned())
    }

    async fn list(&self, params: &ListParams) -> Result<Vec<Record>, AdapterError> {
        let guard = self.state.lock();
        let mut out: Vec<Record> = guard
            .records
            .values()
            .filter(|r| params.matches(r))
            .cloned()
            .collect();
        params.sort(&mut out);
        Ok(out)
    }

    async fn save_last_modified(&self, value: Option<i64>) -> Result<(), AdapterError> {
        self.state.lock().last_modified = value;
        Ok(())
    }

    async fn get_last_modified(&self) -> Result<Option<i64>, AdapterError> {
        Ok(self.state.lock().last_modified)
    }

    async fn save_metadata(&self, metadata: Value) -> Result<(), AdapterError> {
        self.state.lock().metadata = Some(metadata);
        Ok(())
    }

    async fn get_metadata(&self) -> Result<Option<Value>, AdapterError> {
        Ok(self.state.lock().metadata.clone())
    }

    async fn import_bulk(&self, records: Vec<Record>) -> Result<usize, AdapterError> {
        let mut guard = self.state.lock();
        let count = records.len();
        for record in records {
            let id = record
                .id()
                .ok_or_else(|| AdapterError::other("importBulk", "record missing id"))?
                .to_string();
            guard.records.insert(id, record);
        }
        Ok(count)
    }
}

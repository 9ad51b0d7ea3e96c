use crate::error::{CoreError, IdExistsError, NotFoundError, PreloadError, ValidationError};
use crate::record::{Record, RecordStatus};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};

/// A single queued mutation, applied atomically by the adapter on commit.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put(Record),
    /// Physical removal — used for `deleteAll`/`delete` with `virtual: false`,
    /// as opposed to the tombstone produced by `TransactionProxy::delete`.
    Purge(String),
}

/// Lets an `execute` callback cancel the whole transaction explicitly, even
/// when it would otherwise return `Ok`: if the callback errors or calls
/// `abort`, all writes queued in the transaction are discarded.
#[derive(Debug, Default)]
pub struct AbortSignal(Cell<bool>);

impl AbortSignal {
    pub fn abort(&self) {
        self.0.set(true);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.get()
    }
}

/// The synchronous record API exposed inside an `Adapter::execute` callback.
/// Operates over a snapshot of the ids declared
/// in `preload`; every mutation is queued into a write-set that the adapter
/// applies atomically on commit.
pub struct TransactionProxy {
    snapshot: HashMap<String, Record>,
    declared: HashSet<String>,
    writes: Vec<WriteOp>,
    local_fields: Vec<String>,
}

impl TransactionProxy {
    pub(crate) fn new(
        preloaded: HashMap<String, Record>,
        declared: HashSet<String>,
        local_fields: Vec<String>,
    ) -> Self {
        TransactionProxy {
            snapshot: preloaded,
            declared,
            writes: Vec::new(),
            local_fields,
        }
    }

    pub(crate) fn into_writes(self) -> Vec<WriteOp> {
        self.writes
    }

    fn ensure_declared(&self, id: &str) -> Result<(), CoreError> {
        if self.declared.contains(id) || self.snapshot.contains_key(id) {
            Ok(())
        } else {
            Err(PreloadError { id: id.to_string() }.into())
        }
    }

    fn peek(&self, id: &str) -> Result<Option<Record>, CoreError> {
        self.ensure_declared(id)?;
        Ok(self.snapshot.get(id).cloned())
    }

    fn require(&self, id: &str) -> Result<Record, CoreError> {
        self.peek(id)?
            .ok_or_else(|| NotFoundError { id: id.to_string() }.into())
    }

    fn put(&mut self, id: String, record: Record) {
        self.snapshot.insert(id, record.clone());
        self.writes.push(WriteOp::Put(record));
    }

    /// `get(id)` — fails with `PreloadError` unless `id` was declared.
    pub fn get(&self, id: &str) -> Result<Record, CoreError> {
        self.require(id)
    }

    /// `getAny(id)` — same precondition, but returns `None` on miss instead
    /// of failing.
    pub fn get_any(&self, id: &str) -> Result<Option<Record>, CoreError> {
        self.peek(id)
    }

    /// `create(record)` — requires `id`; marks `_status = "created"` unless
    /// the caller already stamped a status (e.g. the `synced` import path).
    pub fn create(&mut self, record: Record) -> Result<Record, CoreError> {
        let id = record
            .id()
            .ok_or(ValidationError::UseRecordIdWithoutId)?
            .to_string();
        if let Some(existing) = self.snapshot.get(&id) {
            return Err(IdExistsError {
                id,
                virtually_deleted: existing.is_tombstone(),
            }
            .into());
        }
        let mut rec = record;
        if rec.status().is_none() {
            rec.set_status(RecordStatus::Created);
        }
        self.put(id, rec.clone());
        Ok(rec)
    }

    fn apply_update_status(&self, prior: &Record, next: &mut Record) {
        if prior.status() == Some(RecordStatus::Created) {
            next.set_status(RecordStatus::Created);
        } else if prior.equal_ignoring_local(next, &self.local_fields) {
            if let Some(status) = prior.status() {
                next.set_status(status);
            }
        } else {
            next.set_status(RecordStatus::Updated);
        }
    }

    /// `update(record)` — requires `id` and a prior version; preserves
    /// `last_modified`.
    pub fn update(&mut self, record: Record) -> Result<Record, CoreError> {
        let id = record
            .id()
            .ok_or(ValidationError::MissingIdOnUpdate)?
            .to_string();
        let prior = self.require(&id)?;
        let mut next = record;
        next.set_last_modified(prior.last_modified());
        self.apply_update_status(&prior, &mut next);
        self.put(id, next.clone());
        Ok(next)
    }

    /// `upsert(record)` — create-if-absent, update-if-present. The second
    /// element of the returned tuple is the prior version, `None` iff a new
    /// record was created.
    pub fn upsert(&mut self, record: Record) -> Result<(Record, Option<Record>), CoreError> {
        let id = record
            .id()
            .ok_or(ValidationError::MissingIdOnUpdate)?
            .to_string();
        match self.peek(&id)? {
            Some(prior) => {
                let mut next = record;
                next.set_last_modified(prior.last_modified());
                self.apply_update_status(&prior, &mut next);
                self.put(id, next.clone());
                Ok((next, Some(prior)))
            }
            None => {
                let mut next = record;
                if next.status().is_none() {
                    next.set_status(RecordStatus::Created);
                }
                self.put(id, next.clone());
                Ok((next, None))
            }
        }
    }

    /// `delete(id)` — requires prior existence; transitions to a tombstone,
    /// keeping the prior payload so it can still be encoded for push.
    pub fn delete(&mut self, id: &str) -> Result<Record, CoreError> {
        let prior = self.require(id)?;
        if prior.is_tombstone() {
            return Err(NotFoundError { id: id.to_string() }.into());
        }
        let mut next = prior;
        next.set_status(RecordStatus::Deleted);
        self.put(id.to_string(), next.clone());
        Ok(next)
    }

    /// `deleteAny(id)` — tolerant variant: never fails on a missing or
    /// already-deleted id.
    pub fn delete_any(&mut self, id: &str) -> Result<(bool, Record), CoreError> {
        match self.peek(id)? {
            Some(prior) if !prior.is_tombstone() => {
                let mut next = prior;
                next.set_status(RecordStatus::Deleted);
                self.put(id.to_string(), next.clone());
                Ok((true, next))
            }
            Some(prior) => Ok((false, prior)),
            None => {
                let mut placeholder = Record::new();
                placeholder.set_id(id);
                Ok((false, placeholder))
            }
        }
    }

    /// `deleteAll(ids)` — bulk tombstone; ids without a live record are
    /// silently skipped.
    pub fn delete_all(&mut self, ids: &[String]) -> Result<Vec<Record>, CoreError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok((true, rec)) = self.delete_any(id) {
                out.push(rec);
            }
        }
        Ok(out)
    }

    /// Physically removes `id` from the snapshot, bypassing the tombstone
    /// lifecycle. Used when a caller asks for a non-virtual delete.
    pub fn purge(&mut self, id: &str) {
        self.snapshot.remove(id);
        self.writes.push(WriteOp::Purge(id.to_string()));
    }

    /// Writes `record` verbatim, bypassing the usual create/update status
    /// transition rules. Used by callers that compute their own status
    /// stamping — conflict resolution (`resolve`) and sync strategy
    /// application both stamp status and
    /// `last_modified` directly from server state rather than deriving it
    /// from the prior local version.
    pub fn force_put(&mut self, record: Record) {
        let id = record.id().expect("force_put requires an id").to_string();
        self.put(id, record);
    }

    /// Every id currently visible in the preloaded snapshot, live or not.
    pub fn snapshot_ids(&self) -> impl Iterator<Item = &str> {
        self.snapshot.keys().map(String::as_str)
    }
}

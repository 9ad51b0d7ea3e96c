use crate::adapter::{Adapter, Filter, ListParams};
use crate::error::{CoreError, NotFoundError, ValidationError};
use crate::events::{CollectionEvent, CollectionEvents, EventTarget};
use crate::id_schema::IdSchema;
use crate::record::{Record, RecordStatus, LAST_MODIFIED, STATUS};
use crate::transaction::{AbortSignal, TransactionProxy};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    pub use_record_id: bool,
    pub synced: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub patch: bool,
    pub synced: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteOptions {
    pub virtual_: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        DeleteOptions { virtual_: true }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportBulkOutcome {
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteAnyOutcome {
    pub deleted: bool,
}

/// The public CRUD surface over a single collection. Wraps an [`Adapter`]
/// with id validation, record-status
/// tracking, and event emission.
pub struct LocalCollection<A: Adapter> {
    adapter: A,
    id_schema: Box<dyn IdSchema>,
    local_fields: Vec<String>,
    pub bucket: String,
    pub name: String,
    pub events: Arc<CollectionEvents>,
}

impl<A: Adapter> LocalCollection<A> {
    pub fn new(
        adapter: A,
        id_schema: Box<dyn IdSchema>,
        local_fields: Vec<String>,
        bucket: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        LocalCollection {
            adapter,
            id_schema,
            local_fields,
            bucket: bucket.into(),
            name: name.into(),
            events: CollectionEvents::new(),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn local_fields(&self) -> &[String] {
        &self.local_fields
    }

    pub async fn open(&self) -> crate::error::Result<()> {
        self.adapter.open().await?;
        Ok(())
    }

    fn emit(&self, action: &'static str, targets: Vec<EventTarget>) {
        if targets.is_empty() {
            return;
        }
        let event = match action {
            "create" => CollectionEvent::Create(targets[0].clone()),
            "update" => CollectionEvent::Update(targets[0].clone()),
            "delete" => CollectionEvent::Delete(targets[0].clone()),
            "deleteAll" => CollectionEvent::DeleteAll(targets.clone()),
            _ => CollectionEvent::Change(targets.clone()),
        };
        self.events.collection.emit(&event);
        self.events.collection.emit(&CollectionEvent::Change(targets));
    }

    /// `create(record, {useRecordId?, synced?})`.
    pub async fn create(
        &self,
        record: Record,
        opts: CreateOptions,
    ) -> crate::error::Result<Record> {
        let mut record = record;
        let id = if opts.use_record_id || opts.synced {
            let id = record
                .id()
                .ok_or(ValidationError::UseRecordIdWithoutId)?
                .to_string();
            if !self.id_schema.validate(&id) {
                return Err(ValidationError::InvalidId(id).into());
            }
            id
        } else {
            if record.id().is_some() {
                return Err(ValidationError::UnexpectedId.into());
            }
            let id = self.id_schema.generate(Some(&record));
            record.set_id(id.clone());
            id
        };

        if opts.synced {
            record.set_status(RecordStatus::Synced);
        } else {
            record.set_status(RecordStatus::Created);
            record.set_last_modified(None);
        }

        let preload = vec![id];
        let (result, targets) = self
            .adapter
            .execute(&preload, &self.local_fields, |proxy: &mut TransactionProxy, _abort: &AbortSignal| {
                let created = proxy.create(record.clone())?;
                let target = EventTarget {
                    action: "create",
                    data: created.clone(),
                    old_record: None,
                };
                Ok((created, vec![target]))
            })
            .await?;
        self.emit("create", targets);
        Ok(result)
    }

    /// `update(record, {patch?, synced?})`.
    pub async fn update(
        &self,
        record: Record,
        opts: UpdateOptions,
    ) -> crate::error::Result<Record> {
        let id = record
            .id()
            .ok_or(ValidationError::MissingIdOnUpdate)?
            .to_string();
        if !self.id_schema.validate(&id) {
            return Err(ValidationError::InvalidId(id).into());
        }
        let preload = vec![id.clone()];
        let patch = opts.patch;
        let synced = opts.synced;
        let incoming = record;
        let (result, targets) = self
            .adapter
            .execute(&preload, &self.local_fields, move |proxy: &mut TransactionProxy, _abort: &AbortSignal| {
                let old = proxy.get(&id)?;
                let incoming_last_modified = incoming.last_modified();
                let merged = if patch {
                    merge_record(&old, &incoming)
                } else {
                    replace_record(&old, &incoming)
                };
                let updated = if synced {
                    let mut forced = merged;
                    forced.set_last_modified(incoming_last_modified.or_else(|| old.last_modified()));
                    forced.set_status(RecordStatus::Synced);
                    proxy.force_put(forced.clone());
                    forced
                } else {
                    proxy.update(merged)?
                };
                let target = EventTarget {
                    action: "update",
                    data: updated.clone(),
                    old_record: Some(old),
                };
                Ok((updated, vec![target]))
            })
            .await?;
        self.emit("update", targets);
        Ok(result)
    }

    /// `upsert(record)` — create-if-absent, update-if-present, including
    /// tombstone resurrection.
    pub async fn upsert(&self, record: Record) -> crate::error::Result<(Record, Option<Record>)> {
        let id = record
            .id()
            .ok_or(ValidationError::MissingIdOnUpdate)?
            .to_string();
        if !self.id_schema.validate(&id) {
            return Err(ValidationError::InvalidId(id).into());
        }
        let preload = vec![id];
        let (result, targets) = self
            .adapter
            .execute(&preload, &self.local_fields, move |proxy: &mut TransactionProxy, _abort: &AbortSignal| {
                let (next, old) = proxy.upsert(record.clone())?;
                let action = if old.is_some() { "update" } else { "create" };
                let target = EventTarget {
                    action,
                    data: next.clone(),
                    old_record: old.clone(),
                };
                Ok(((next, old), vec![target]))
            })
            .await?;
        let action = if result.1.is_some() { "update" } else { "create" };
        self.emit(action, targets);
        Ok(result)
    }

    /// `get(id, {includeDeleted?})`.
    pub async fn get(&self, id: &str, opts: GetOptions) -> crate::error::Result<Record> {
        let record = self.adapter.get(id).await?;
        match record {
            Some(r) if r.is_tombstone() && !opts.include_deleted => {
                Err(NotFoundError { id: id.to_string() }.into())
            }
            Some(r) => Ok(r),
            None => Err(NotFoundError { id: id.to_string() }.into()),
        }
    }

    /// `getAny(id)` — never throws for absence.
    pub async fn get_any(&self, id: &str) -> crate::error::Result<Option<Record>> {
        Ok(self.adapter.get(id).await?)
    }

    /// `delete(id, {virtual=true})`.
    pub async fn delete(&self, id: &str, opts: DeleteOptions) -> crate::error::Result<Record> {
        let preload = vec![id.to_string()];
        let virtual_ = opts.virtual_;
        let id_owned = id.to_string();
        let (result, targets) = self
            .adapter
            .execute(&preload, &self.local_fields, move |proxy: &mut TransactionProxy, _abort: &AbortSignal| {
                if virtual_ {
                    let tombstone = proxy.delete(&id_owned)?;
                    let target = EventTarget {
                        action: "delete",
                        data: tombstone.clone(),
                        old_record: None,
                    };
                    Ok((tombstone, vec![target]))
                } else {
                    let prior = proxy.get(&id_owned)?;
                    proxy.purge(&id_owned);
                    let target = EventTarget {
                        action: "delete",
                        data: prior.clone(),
                        old_record: None,
                    };
                    Ok((prior, vec![target]))
                }
            })
            .await?;
        self.emit("delete", targets);
        Ok(result)
    }

    /// `deleteAll()` — tombstone every live record.
    pub async fn delete_all(&self) -> crate::error::Result<Vec<Record>> {
        let live = self.adapter.list(&ListParams::default()).await?;
        let ids: Vec<String> = live
            .iter()
            .filter(|r| !r.is_tombstone())
            .filter_map(|r| r.id().map(str::to_string))
            .collect();
        let preload_ids = ids.clone();
        let (result, targets) = self
            .adapter
            .execute(&preload_ids, &self.local_fields, move |proxy: &mut TransactionProxy, _abort: &AbortSignal| {
                let tombstones = proxy.delete_all(&ids)?;
                let targets: Vec<EventTarget> = tombstones
                    .iter()
                    .map(|t| EventTarget {
                        action: "delete",
                        data: t.clone(),
                        old_record: None,
                    })
                    .collect();
                Ok((tombstones, targets))
            })
            .await?;
        self.emit("deleteAll", targets);
        Ok(result)
    }

    /// `deleteAny(id)` — tolerant; returns whether a live record was found.
    pub async fn delete_any(&self, id: &str) -> crate::error::Result<(DeleteAnyOutcome, Record)> {
        let preload = vec![id.to_string()];
        let id_owned = id.to_string();
        let ((deleted, record), targets) = self
            .adapter
            .execute(&preload, &self.local_fields, move |proxy: &mut TransactionProxy, _abort: &AbortSignal| {
                let (deleted, record) = proxy.delete_any(&id_owned)?;
                let targets = if deleted {
                    vec![EventTarget {
                        action: "delete",
                        data: record.clone(),
                        old_record: None,
                    }]
                } else {
                    vec![]
                };
                Ok(((deleted, record), targets))
            })
            .await?;
        if !targets.is_empty() {
            self.emit("delete", targets);
        }
        Ok((DeleteAnyOutcome { deleted }, record))
    }

    /// `list({filters?, order?}, {includeDeleted?})`.
    pub async fn list(&self, mut params: ListParams, opts: ListOptions) -> crate::error::Result<Vec<Record>> {
        if !opts.include_deleted {
            params.filters.push(Filter::NotIn(
                STATUS.to_string(),
                vec![serde_json::Value::String(RecordStatus::Deleted.as_str().to_string())],
            ));
        }
        if params.order.is_empty() {
            params.order.push(crate::adapter::OrderKey {
                field: LAST_MODIFIED.to_string(),
                desc: true,
            });
        }
        Ok(self.adapter.list(&params).await?)
    }

    /// `importBulk(records)` — marks each `_status="synced"`; skips records
    /// whose local copy is pending (`created`/`updated`/`deleted`) or that
    /// arrive with no `last_modified`; bumps the watermark to the max
    /// imported `last_modified` only if greater than the current one.
    ///
    /// Records that already carry a
    /// `_status` other than `synced` are silently coerced to `synced` here
    /// (matching the source system's behavior) rather than rejected.
    pub async fn import_bulk(&self, records: Vec<Record>) -> crate::error::Result<ImportBulkOutcome> {
        let mut to_apply = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        for mut record in records {
            if record.last_modified().is_none() {
                skipped += 1;
                continue;
            }
            let id = match record.id() {
                Some(id) => id.to_string(),
                None => {
                    skipped += 1;
                    continue;
                }
            };
            if let Some(local) = self.adapter.get(&id).await? {
                if matches!(
                    local.status(),
                    Some(RecordStatus::Created) | Some(RecordStatus::Updated) | Some(RecordStatus::Deleted)
                ) {
                    skipped += 1;
                    continue;
                }
            }
            record.set_status(RecordStatus::Synced);
            to_apply.push(record);
        }
        let max_lm = to_apply.iter().filter_map(Record::last_modified).max();
        let applied = to_apply.len();
        self.adapter.import_bulk(to_apply).await?;
        if let Some(max_lm) = max_lm {
            let current = self.adapter.get_last_modified().await?;
            if current.map(|c| max_lm > c).unwrap_or(true) {
                self.adapter.save_last_modified(Some(max_lm)).await?;
            }
        }
        Ok(ImportBulkOutcome { applied, skipped })
    }

    /// `resetSyncStatus()` — drops tombstones, clears `last_modified`/
    /// `_status` on live records (both reset to the unsynced `created`
    /// state so a subsequent sync republishes them), clears the watermark.
    /// Returns the number of records processed.
    pub async fn reset_sync_status(&self) -> crate::error::Result<usize> {
        let all = self.adapter.list(&ListParams::default()).await?;
        let ids: Vec<String> = all.iter().filter_map(|r| r.id().map(str::to_string)).collect();
        let count = ids.len();
        self.adapter
            .execute(&ids, &self.local_fields, |proxy: &mut TransactionProxy, _abort: &AbortSignal| {
                let snapshot_ids: Vec<String> = proxy.snapshot_ids().map(str::to_string).collect();
                for id in snapshot_ids {
                    let record = proxy.get(&id)?;
                    if record.is_tombstone() {
                        proxy.purge(&id);
                    } else {
                        let mut reset = record;
                        reset.set_status(RecordStatus::Created);
                        reset.set_last_modified(None);
                        proxy.force_put(reset);
                    }
                }
                Ok(())
            })
            .await?;
        self.adapter.save_last_modified(None).await?;
        Ok(count)
    }

    /// `resolve(conflict, resolution)` — writes `resolution` locally;
    /// `_status="synced"` iff `resolution` deep-equals `conflict.remote`,
    /// else `_status="updated"`; stamps `last_modified` from the remote
    /// side of the conflict.
    pub async fn resolve(
        &self,
        conflict: &crate::conflict::ConflictEntry,
        resolution: Record,
    ) -> crate::error::Result<Record> {
        let id = conflict
            .id()
            .ok_or_else(|| NotFoundError { id: String::new() })?
            .to_string();
        let remote_lm = conflict.remote.as_ref().and_then(Record::last_modified);
        let synced = conflict
            .remote
            .as_ref()
            .map(|r| r.without_local(&self.local_fields) == resolution.without_local(&self.local_fields))
            .unwrap_or(false);
        let preload = vec![id.clone()];
        let resolution_clone = resolution.clone();
        let (result, targets) = self
            .adapter
            .execute(&preload, &self.local_fields, move |proxy: &mut TransactionProxy, _abort: &AbortSignal| {
                let mut next = resolution_clone;
                next.set_id(id.clone());
                next.set_last_modified(remote_lm);
                next.set_status(if synced { RecordStatus::Synced } else { RecordStatus::Updated });
                proxy.force_put(next.clone());
                let target = EventTarget {
                    action: "update",
                    data: next.clone(),
                    old_record: None,
                };
                Ok((next, vec![target]))
            })
            .await?;
        self.emit("update", targets);
        Ok(result)
    }

    /// Advanced escape hatch with the same semantics as `Adapter::execute`.
    pub async fn execute<F, R>(&self, preload_ids: &[String], cb: F) -> crate::error::Result<R>
    where
        F: FnOnce(&mut TransactionProxy, &AbortSignal) -> crate::error::Result<R>,
    {
        self.adapter.execute(preload_ids, &self.local_fields, cb).await
    }
}

fn replace_record(old: &Record, incoming: &Record) -> Record {
    let mut next = incoming.clone();
    next.set_id(old.id().unwrap_or_default());
    next
}

fn merge_record(old: &Record, patch: &Record) -> Record {
    let mut next = old.clone();
    for (k, v) in patch.as_map() {
        if k == STATUS || k == LAST_MODIFIED {
            continue;
        }
        next.set(k.clone(), v.clone());
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::id_schema::UuidIdSchema;
    use serde_json::json;

    fn collection() -> LocalCollection<MemoryAdapter> {
        LocalCollection::new(
            MemoryAdapter::default(),
            Box::new(UuidIdSchema),
            vec!["read".to_string()],
            "default",
            "articles",
        )
    }

    fn rec(v: serde_json::Value) -> Record {
        Record::from_map(v.as_object().unwrap().clone())
    }

    #[tokio::test]
    async fn create_read_delete_round_trip() {
        let col = collection();
        let created = col
            .create(rec(json!({"title": "foo"})), CreateOptions::default())
            .await
            .unwrap();
        let id = created.id().unwrap().to_string();
        assert_eq!(created.status(), Some(RecordStatus::Created));

        let fetched = col.get(&id, GetOptions::default()).await.unwrap();
        assert_eq!(fetched.get("title"), Some(&json!("foo")));

        col.delete(&id, DeleteOptions::default()).await.unwrap();
        let err = col.get(&id, GetOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let tombstone = col
            .get(&id, GetOptions { include_deleted: true })
            .await
            .unwrap();
        assert_eq!(tombstone.status(), Some(RecordStatus::Deleted));
    }

    #[tokio::test]
    async fn create_rejects_explicit_id_without_flag() {
        let col = collection();
        let err = col
            .create(rec(json!({"id": "x", "title": "foo"})), CreateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::UnexpectedId)));
    }

    #[tokio::test]
    async fn create_with_record_id_collides_with_tombstone() {
        let col = collection();
        let id = "11111111-1111-4111-8111-111111111111".to_string();
        col.create(
            rec(json!({"id": id, "title": "foo"})),
            CreateOptions { use_record_id: true, synced: false },
        )
        .await
        .unwrap();
        col.delete(&id, DeleteOptions::default()).await.unwrap();

        let err = col
            .create(
                rec(json!({"id": id, "title": "bar"})),
                CreateOptions { use_record_id: true, synced: false },
            )
            .await
            .unwrap_err();
        match err {
            CoreError::IdExists(e) => assert!(e.virtually_deleted),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_excludes_tombstones_by_default() {
        let col = collection();
        let a = col
            .create(rec(json!({"title": "a"})), CreateOptions::default())
            .await
            .unwrap();
        col.create(rec(json!({"title": "b"})), CreateOptions::default())
            .await
            .unwrap();
        col.delete(a.id().unwrap(), DeleteOptions::default()).await.unwrap();

        let visible = col.list(ListParams::default(), ListOptions::default()).await.unwrap();
        assert_eq!(visible.len(), 1);

        let all = col
            .list(ListParams::default(), ListOptions { include_deleted: true })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn import_bulk_preserves_newer_local_watermark() {
        let col = collection();
        col.adapter().save_last_modified(Some(1000)).await.unwrap();
        let mut incoming = rec(json!({"id": "11111111-1111-4111-8111-111111111111"}));
        incoming.set_last_modified(Some(500));
        col.import_bulk(vec![incoming]).await.unwrap();
        assert_eq!(col.adapter().get_last_modified().await.unwrap(), Some(1000));
    }

    #[tokio::test]
    async fn import_bulk_skips_locally_pending_records() {
        let col = collection();
        let created = col
            .create(rec(json!({"title": "local"})), CreateOptions::default())
            .await
            .unwrap();
        let id = created.id().unwrap().to_string();

        let mut incoming = rec(json!({"id": id.clone(), "title": "remote"}));
        incoming.set_last_modified(Some(10));
        let outcome = col.import_bulk(vec![incoming]).await.unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.applied, 0);

        let stays_local = col.get(&id, GetOptions::default()).await.unwrap();
        assert_eq!(stays_local.get("title"), Some(&json!("local")));
    }

    #[tokio::test]
    async fn reset_sync_status_clears_tombstones_and_watermark() {
        let col = collection();
        let created = col
            .create(rec(json!({"title": "a"})), CreateOptions::default())
            .await
            .unwrap();
        col.adapter().save_last_modified(Some(99)).await.unwrap();
        let tomb_id = "22222222-2222-4222-8222-222222222222";
        col.adapter()
            .import_bulk(vec![{
                let mut r = rec(json!({"id": tomb_id}));
                r.set_status(RecordStatus::Deleted);
                r.set_last_modified(Some(5));
                r
            }])
            .await
            .unwrap();

        let processed = col.reset_sync_status().await.unwrap();
        assert_eq!(processed, 2);
        assert_eq!(col.adapter().get_last_modified().await.unwrap(), None);
        assert!(col.adapter().get(tomb_id).await.unwrap().is_none());
        let live = col.get(created.id().unwrap(), GetOptions::default()).await.unwrap();
        assert_eq!(live.status(), Some(RecordStatus::Created));
        assert_eq!(live.last_modified(), None);
    }
}

//! The sync state machine: `pullMetadata` → `pullChanges` → `pushChanges` →
//! `pullChanges`, wired over an [`Adapter`] (via [`LocalCollection`]), a
//! [`RemoteCollection`], a [`TransformerPipeline`] and a [`HookPipeline`].

mod result;

pub use result::{Slot, SyncErrorEntry, SyncResult};

use crate::adapter::{Adapter, ListParams};
use crate::collection::{ListOptions, LocalCollection};
use crate::conflict::{ConflictEntry, ConflictType};
use crate::error::{BackoffError, CoreError, DeprecationError, ServerFlushedError};
use crate::events::{BackoffEvent, SyncOutcomeEvent};
use crate::hooks::{HookPipeline, IncomingChangesPayload};
use crate::record::{Record, RecordStatus};
use crate::remote::{
    BatchMethod, BatchOperation, BatchOptions, ListRecordsParams, RemoteCollection, ResponseHeaders,
    SafeHeader,
};
use crate::transform::TransformerPipeline;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// How incoming/outgoing conflicts are resolved automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStrategy {
    /// Conflicts are left in `SyncResult::conflicts`; the caller must resolve
    /// them (`LocalCollection::resolve`) before a subsequent sync can push.
    #[default]
    Manual,
    /// The server's version always wins.
    ServerWins,
    /// The local version always wins; conflicting records are force-pushed
    /// on the next push phase with `If-Match: *`.
    ClientWins,
    /// Only pull; never push, regardless of pending local changes.
    PullOnly,
}

/// Per-call sync options.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub strategy: SyncStrategy,
    pub ignore_backoff: bool,
    pub retry: Option<u32>,
    pub expected_timestamp: Option<String>,
    pub headers: std::collections::HashMap<String, String>,
    /// Extra ids to exclude from the initial pull, on top of ids the engine
    /// already excludes because they carry pending local changes.
    pub exclude: Vec<String>,
}

fn is_remote_tombstone(record: &Record) -> bool {
    record.get("deleted").and_then(|v| v.as_bool()).unwrap_or(false)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Orchestrates one collection's sync cycle against one [`RemoteCollection`].
/// Meant to be constructed once per collection and reused across repeated
/// `sync()` calls, so a server-declared back-off window is honored across
/// calls rather than forgotten.
pub struct SyncEngine<A: Adapter, R: RemoteCollection> {
    collection: Arc<LocalCollection<A>>,
    remote: R,
    transformers: TransformerPipeline,
    hooks: HookPipeline,
    backoff_until_ms: Mutex<Option<i64>>,
    force_push: Mutex<HashSet<String>>,
}

impl<A: Adapter, R: RemoteCollection> SyncEngine<A, R> {
    pub fn new(
        collection: Arc<LocalCollection<A>>,
        remote: R,
        transformers: TransformerPipeline,
        hooks: HookPipeline,
    ) -> Self {
        SyncEngine {
            collection,
            remote,
            transformers,
            hooks,
            backoff_until_ms: Mutex::new(None),
            force_push: Mutex::new(HashSet::new()),
        }
    }

    /// Runs one full sync cycle: `pullMetadata`, `pullChanges`
    /// (excluding ids with pending local changes), `pushChanges` (unless
    /// `PULL_ONLY` or the pull phase already produced conflicts/errors), then
    /// a second `pullChanges` to pick up whatever the push just published.
    pub async fn sync(&self, opts: &SyncOptions) -> crate::error::Result<SyncResult> {
        let outcome = self.sync_inner(opts).await;
        let event = SyncOutcomeEvent {
            bucket: self.collection.bucket.clone(),
            collection: self.collection.name.clone(),
        };
        match &outcome {
            Ok(result) if result.ok() => self.collection.events.sync_success.emit(&event),
            _ => self.collection.events.sync_error.emit(&event),
        }
        outcome
    }

    async fn sync_inner(&self, opts: &SyncOptions) -> crate::error::Result<SyncResult> {
        self.check_backoff(opts)?;
        let mut result = SyncResult::new();

        self.pull_metadata(opts).await?;

        // Pull A sees every remote change, including ones for ids with
        // pending local edits — that's what lets it detect conflicts.
        self.pull_phase(&opts.exclude, &mut result, opts).await?;
        self.apply_strategy_to_conflicts(&mut result, opts).await?;

        if result.ok() && opts.strategy != SyncStrategy::PullOnly {
            let published_before = result.published.len();
            self.push_phase(&mut result, opts).await?;
            if result.ok() {
                // Pull B only needs to pick up anything published elsewhere
                // since; re-fetching what we just pushed ourselves is
                // harmless (it collapses to a no-op "updated") but wasteful,
                // so skip ids this push round just confirmed.
                let mut exclude2 = opts.exclude.clone();
                exclude2.extend(
                    result.published[published_before..]
                        .iter()
                        .filter_map(|r| r.id().map(str::to_string)),
                );
                self.pull_phase(&exclude2, &mut result, opts).await?;
            }
        }

        Ok(result)
    }

    fn check_backoff(&self, opts: &SyncOptions) -> crate::error::Result<()> {
        if opts.ignore_backoff {
            return Ok(());
        }
        let deadline = *self.backoff_until_ms.lock();
        if let Some(deadline) = deadline {
            let now = now_ms();
            if now < deadline {
                let retry_after_ms = deadline - now;
                self.collection.events.backoff.emit(&BackoffEvent { retry_after_ms });
                return Err(BackoffError { retry_after_ms }.into());
            }
        }
        Ok(())
    }

    fn handle_headers(&self, headers: &ResponseHeaders) -> crate::error::Result<()> {
        if let Some(alert) = &headers.alert {
            log::warn!("server alert {}: {}", alert.code, alert.message);
            if alert.is_eol {
                return Err(DeprecationError {
                    message: alert.message.clone(),
                }
                .into());
            }
        }
        let backoff_secs = headers.backoff_seconds.or(headers.retry_after_seconds);
        if let Some(secs) = backoff_secs {
            log::info!("server requested backoff of {secs}s");
            *self.backoff_until_ms.lock() = Some(now_ms() + secs * 1000);
        }
        Ok(())
    }

    fn check_flush(&self, headers: &ResponseHeaders, local_watermark: Option<i64>) -> crate::error::Result<()> {
        if let (Some(server_ts), Some(local_ts)) = (headers.etag, local_watermark) {
            if server_ts < local_ts {
                log::warn!("server flush detected: server={server_ts} local={local_ts}");
                return Err(ServerFlushedError {
                    local_timestamp: local_ts,
                    server_timestamp: server_ts,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn with_retry<T, Fut>(&self, opts: &SyncOptions, mut f: impl FnMut() -> Fut) -> crate::error::Result<T>
    where
        Fut: std::future::Future<Output = crate::error::Result<T>>,
    {
        let attempts = opts.retry.unwrap_or(0);
        let mut last_err = None;
        for attempt in 0..=attempts {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    log::debug!("remote call failed on attempt {attempt}: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.expect("at least one attempt always runs"))
    }

    async fn pull_metadata(&self, opts: &SyncOptions) -> crate::error::Result<()> {
        let (data, headers) = self.with_retry(opts, || self.remote.get_data()).await?;
        self.handle_headers(&headers)?;
        self.collection.adapter().save_metadata(data).await?;
        Ok(())
    }

    /// `pullChanges`: list remote changes since the local watermark, run
    /// them through the `incoming-changes`
    /// hook then the transformer chain's `decode`, and classify+apply each
    /// one against local state.
    async fn pull_phase(
        &self,
        exclude: &[String],
        result: &mut SyncResult,
        opts: &SyncOptions,
    ) -> crate::error::Result<()> {
        let since = self.collection.adapter().get_last_modified().await?;
        let params = ListRecordsParams {
            since,
            filters: Vec::new(),
            exclude_ids: exclude.to_vec(),
            headers: opts.headers.clone(),
            retry: opts.retry,
        };
        let (list_result, headers) = self
            .with_retry(opts, || self.remote.list_records(params.clone()))
            .await?;
        self.handle_headers(&headers)?;
        self.check_flush(&headers, since)?;

        let raw_changes: Vec<serde_json::Value> = list_result.data.iter().map(Record::to_value).collect();
        let payload = IncomingChangesPayload {
            last_modified: list_result.last_modified,
            changes: raw_changes,
        };
        let payload = self.hooks.run_incoming_changes(payload).await?;

        let mut decoded = Vec::with_capacity(payload.changes.len());
        for value in payload.changes {
            let record = match Record::try_from(value) {
                Ok(r) => r,
                Err(e) => {
                    result.add_errors(vec![SyncErrorEntry {
                        id: None,
                        message: e.to_string(),
                    }]);
                    continue;
                }
            };
            let id = record.id().map(str::to_string);
            match self.transformers.decode(record).await {
                Ok(r) => decoded.push(r),
                Err(e) => result.add_errors(vec![SyncErrorEntry {
                    id,
                    message: e.to_string(),
                }]),
            }
        }

        for remote_record in decoded {
            self.import_one(remote_record, result).await?;
        }

        if let Some(lm) = list_result.last_modified {
            result.last_modified = Some(result.last_modified.map(|cur| cur.max(lm)).unwrap_or(lm));
            // Persisted immediately, not just at the end of `sync`, so a
            // later phase in the same cycle (push, pull B) reads an
            // up-to-date watermark instead of re-fetching what this phase
            // already applied.
            self.collection.adapter().save_last_modified(result.last_modified).await?;
        }
        Ok(())
    }

    /// Classifies and applies one incoming record against local state.
    async fn import_one(&self, remote: Record, result: &mut SyncResult) -> crate::error::Result<()> {
        let id = match remote.id() {
            Some(id) => id.to_string(),
            None => {
                result.add_errors(vec![SyncErrorEntry {
                    id: None,
                    message: "incoming record has no id".to_string(),
                }]);
                return Ok(());
            }
        };
        let remote_deleted = is_remote_tombstone(&remote);
        let local = self.collection.adapter().get(&id).await?;

        match local {
            None => {
                if remote_deleted {
                    result.add(Slot::Skipped, vec![remote]);
                } else {
                    self.accept_remote(&id, &remote, result, Slot::Created).await?;
                }
            }
            Some(local_record) => match local_record.status() {
                None | Some(RecordStatus::Synced) => {
                    if remote_deleted {
                        self.purge_local(&id).await?;
                        result.add(Slot::Deleted, vec![remote]);
                    } else {
                        self.accept_remote(&id, &remote, result, Slot::Updated).await?;
                    }
                }
                Some(RecordStatus::Created) | Some(RecordStatus::Updated) => {
                    if remote_deleted {
                        result.add_conflicts(vec![ConflictEntry {
                            kind: ConflictType::Outgoing,
                            local: Some(local_record),
                            remote: None,
                        }]);
                    } else if local_record.equal_ignoring_local(&remote, self.collection.local_fields()) {
                        self.accept_remote(&id, &remote, result, Slot::Updated).await?;
                    } else {
                        result.add_conflicts(vec![ConflictEntry {
                            kind: ConflictType::Incoming,
                            local: Some(local_record),
                            remote: Some(remote),
                        }]);
                    }
                }
                Some(RecordStatus::Deleted) => {
                    if remote_deleted {
                        self.purge_local(&id).await?;
                        result.add(Slot::Skipped, vec![remote]);
                    } else {
                        result.add_conflicts(vec![ConflictEntry {
                            kind: ConflictType::Outgoing,
                            local: Some(local_record),
                            remote: Some(remote),
                        }]);
                    }
                }
            },
        }
        Ok(())
    }

    async fn accept_remote(
        &self,
        id: &str,
        remote: &Record,
        result: &mut SyncResult,
        slot: Slot,
    ) -> crate::error::Result<()> {
        let mut applied = remote.clone();
        applied.set_status(RecordStatus::Synced);
        let preload = vec![id.to_string()];
        let to_write = applied.clone();
        self.collection
            .execute(&preload, move |proxy, _abort| {
                proxy.force_put(to_write);
                Ok(())
            })
            .await?;
        result.add(slot, vec![applied]);
        Ok(())
    }

    async fn purge_local(&self, id: &str) -> crate::error::Result<()> {
        let preload = vec![id.to_string()];
        let id_for_purge = id.to_string();
        self.collection
            .execute(&preload, move |proxy, _abort| {
                proxy.purge(&id_for_purge);
                Ok(())
            })
            .await
    }

    /// Applies `opts.strategy` to whatever conflicts the pull phase left
    /// behind, before deciding whether to push.
    async fn apply_strategy_to_conflicts(
        &self,
        result: &mut SyncResult,
        opts: &SyncOptions,
    ) -> crate::error::Result<()> {
        if result.conflicts.is_empty() || opts.strategy == SyncStrategy::Manual {
            return Ok(());
        }
        let conflicts = std::mem::take(&mut result.conflicts);
        for conflict in conflicts {
            let id = conflict.id().map(str::to_string);
            match opts.strategy {
                SyncStrategy::Manual => unreachable!(),
                SyncStrategy::ServerWins => match (&id, &conflict.remote) {
                    (Some(id), Some(remote)) => {
                        self.accept_remote(id, remote, result, Slot::Resolved).await?;
                    }
                    (Some(id), None) => {
                        self.purge_local(id).await?;
                        if let Some(local) = conflict.local {
                            result.add(Slot::Deleted, vec![local]);
                        }
                    }
                    (None, _) => {}
                },
                SyncStrategy::ClientWins => {
                    if let Some(id) = id {
                        self.force_push.lock().insert(id);
                    }
                    if let Some(local) = conflict.local {
                        result.add(Slot::Resolved, vec![local]);
                    }
                }
                SyncStrategy::PullOnly => match (&id, &conflict.remote) {
                    (Some(id), Some(remote)) => {
                        self.accept_remote(id, remote, result, Slot::Resolved).await?;
                    }
                    (Some(id), None) => {
                        self.purge_local(id).await?;
                        if let Some(local) = conflict.local {
                            result.add(Slot::Deleted, vec![local]);
                        }
                    }
                    (None, _) => {}
                },
            }
        }
        Ok(())
    }

    fn safe_header_for(&self, record: &Record, force: &HashSet<String>) -> SafeHeader {
        let id = record.id().unwrap_or_default();
        match record.status() {
            Some(RecordStatus::Deleted) => match record.last_modified() {
                Some(ts) => SafeHeader::IfMatch(ts),
                None => SafeHeader::None,
            },
            Some(RecordStatus::Created) => SafeHeader::IfNoneMatchAny,
            _ if force.contains(id) => SafeHeader::IfMatchAny,
            _ => match record.last_modified() {
                Some(ts) => SafeHeader::IfMatch(ts),
                None => SafeHeader::IfNoneMatchAny,
            },
        }
    }

    fn method_for(record: &Record) -> BatchMethod {
        match record.status() {
            Some(RecordStatus::Deleted) => BatchMethod::Delete,
            Some(RecordStatus::Created) => BatchMethod::Create,
            _ => BatchMethod::Update,
        }
    }

    /// `pushChanges`: gathers pending local records not already in
    /// conflict, encodes them, and flushes them to
    /// the remote in `batch_max_requests`-sized chunks ordered deletes, then
    /// updates, then creates. Strategy resolution already ran in `sync`
    /// before this is called.
    async fn push_phase(&self, result: &mut SyncResult, opts: &SyncOptions) -> crate::error::Result<()> {
        let pending = self
            .collection
            .list(ListParams::default(), ListOptions { include_deleted: true })
            .await?;
        let conflict_ids: HashSet<String> = result
            .conflicts
            .iter()
            .filter_map(|c| c.id().map(str::to_string))
            .collect();
        let pending: Vec<Record> = pending
            .into_iter()
            .filter(|r| {
                matches!(
                    r.status(),
                    Some(RecordStatus::Created) | Some(RecordStatus::Updated) | Some(RecordStatus::Deleted)
                )
            })
            .filter(|r| r.id().map(|id| !conflict_ids.contains(id)).unwrap_or(true))
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        let force = self.force_push.lock().clone();
        let mut deletes = Vec::new();
        let mut updates = Vec::new();
        let mut creates = Vec::new();
        for record in pending {
            let safe = self.safe_header_for(&record, &force);
            let method = Self::method_for(&record);
            let stripped = record.without_local(self.collection.local_fields());
            let encoded = self.transformers.encode(stripped).await?;
            let op = BatchOperation {
                method,
                record: encoded,
                safe,
            };
            match method {
                BatchMethod::Delete => deletes.push(op),
                BatchMethod::Create => creates.push(op),
                BatchMethod::Update => updates.push(op),
            }
        }

        let settings = self.remote.fetch_server_settings().await?;
        let chunk_size = settings.batch_max_requests.max(1);
        let mut ordered = deletes;
        ordered.extend(updates);
        ordered.extend(creates);

        let local_watermark = self.collection.adapter().get_last_modified().await?;
        for chunk in ordered.chunks(chunk_size) {
            let batch_opts = BatchOptions {
                safe: true,
                aggregate: true,
                retry: opts.retry,
                headers: opts.headers.clone(),
            };
            let chunk_vec = chunk.to_vec();
            let (batch_result, headers) = self
                .with_retry(opts, || self.remote.batch(chunk_vec.clone(), batch_opts.clone()))
                .await?;
            self.handle_headers(&headers)?;
            self.check_flush(&headers, local_watermark)?;

            for published in &batch_result.published {
                self.mark_synced(published).await?;
                self.force_push.lock().remove(published.id().unwrap_or_default());
            }
            result.add(Slot::Published, batch_result.published);
            result.add_conflicts(batch_result.conflicts);
            for (record, message) in batch_result.errors {
                result.add_errors(vec![SyncErrorEntry {
                    id: record.id().map(str::to_string),
                    message,
                }]);
            }
        }
        Ok(())
    }

    async fn mark_synced(&self, published: &Record) -> crate::error::Result<()> {
        let id = match published.id() {
            Some(id) => id.to_string(),
            None => return Ok(()),
        };
        if published.status() == Some(RecordStatus::Deleted) {
            self.purge_local(&id).await
        } else {
            let mut synced = published.clone();
            synced.set_status(RecordStatus::Synced);
            let preload = vec![id.clone()];
            self.collection
                .execute(&preload, move |proxy, _abort| {
                    proxy.force_put(synced);
                    Ok(())
                })
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::collection::CreateOptions;
    use crate::id_schema::UuidIdSchema;
    use crate::remote::MockRemote;
    use serde_json::json;

    fn collection() -> Arc<LocalCollection<MemoryAdapter>> {
        Arc::new(LocalCollection::new(
            MemoryAdapter::default(),
            Box::new(UuidIdSchema),
            vec!["read".to_string()],
            "default",
            "articles",
        ))
    }

    fn engine(col: Arc<LocalCollection<MemoryAdapter>>, remote: MockRemote) -> SyncEngine<MemoryAdapter, MockRemote> {
        SyncEngine::new(col, remote, TransformerPipeline::new(), HookPipeline::new())
    }

    #[tokio::test]
    async fn first_sync_pulls_remote_records_as_created() {
        let col = collection();
        let remote = MockRemote::new();
        let mut seeded = Record::new();
        seeded.set_id("11111111-1111-4111-8111-111111111111");
        seeded.set("title", json!("from server"));
        remote.seed(seeded, 10);

        let eng = engine(col.clone(), remote);
        let result = eng.sync(&SyncOptions::default()).await.unwrap();
        assert!(result.ok());
        assert_eq!(result.created.len(), 1);

        let local = col
            .get("11111111-1111-4111-8111-111111111111", Default::default())
            .await
            .unwrap();
        assert_eq!(local.status(), Some(RecordStatus::Synced));
    }

    #[tokio::test]
    async fn local_creation_pushes_and_becomes_synced() {
        let col = collection();
        let remote = MockRemote::new();
        let eng = engine(col.clone(), remote);

        let created = col
            .create(Record::from_map(json!({"title": "local"}).as_object().unwrap().clone()), CreateOptions::default())
            .await
            .unwrap();
        let id = created.id().unwrap().to_string();

        let result = eng.sync(&SyncOptions::default()).await.unwrap();
        assert!(result.ok());
        assert_eq!(result.published.len(), 1);

        let local = col.get(&id, Default::default()).await.unwrap();
        assert_eq!(local.status(), Some(RecordStatus::Synced));
        assert!(local.last_modified().is_some());
    }

    #[tokio::test]
    async fn conflicting_update_surfaces_under_manual_strategy() {
        let col = collection();
        let remote = MockRemote::new();
        let id = "11111111-1111-4111-8111-111111111111";

        let mut seeded = Record::new();
        seeded.set_id(id);
        seeded.set("title", json!("v1"));
        remote.seed(seeded, 10);

        let eng = engine(col.clone(), remote.clone_handle());
        eng.sync(&SyncOptions::default()).await.unwrap();

        col.update(
            {
                let mut r = Record::new();
                r.set_id(id);
                r.set("title", json!("local edit"));
                r
            },
            Default::default(),
        )
        .await
        .unwrap();

        let mut remote_edit = Record::new();
        remote_edit.set_id(id);
        remote_edit.set("title", json!("server edit"));
        remote.seed(remote_edit, 20);

        let result = eng.sync(&SyncOptions::default()).await.unwrap();
        assert!(!result.ok());
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, ConflictType::Incoming);
    }

    #[tokio::test]
    async fn server_wins_strategy_auto_resolves_and_pushes_nothing_further() {
        let col = collection();
        let remote = MockRemote::new();
        let id = "11111111-1111-4111-8111-111111111111";

        let mut seeded = Record::new();
        seeded.set_id(id);
        seeded.set("title", json!("v1"));
        remote.seed(seeded, 10);

        let eng = engine(col.clone(), remote.clone_handle());
        eng.sync(&SyncOptions::default()).await.unwrap();

        col.update(
            {
                let mut r = Record::new();
                r.set_id(id);
                r.set("title", json!("local edit"));
                r
            },
            Default::default(),
        )
        .await
        .unwrap();

        let mut remote_edit = Record::new();
        remote_edit.set_id(id);
        remote_edit.set("title", json!("server edit"));
        remote.seed(remote_edit, 20);

        let opts = SyncOptions {
            strategy: SyncStrategy::ServerWins,
            ..Default::default()
        };
        let result = eng.sync(&opts).await.unwrap();
        assert!(result.ok());
        let local = col.get(id, Default::default()).await.unwrap();
        assert_eq!(local.get("title"), Some(&json!("server edit")));
        assert_eq!(local.status(), Some(RecordStatus::Synced));
    }

    #[tokio::test]
    async fn pull_only_strategy_never_pushes_local_changes() {
        let col = collection();
        let remote = MockRemote::new();
        let eng = engine(col.clone(), remote.clone_handle());

        col.create(Record::from_map(json!({"title": "local"}).as_object().unwrap().clone()), CreateOptions::default())
            .await
            .unwrap();

        let opts = SyncOptions {
            strategy: SyncStrategy::PullOnly,
            ..Default::default()
        };
        let result = eng.sync(&opts).await.unwrap();
        assert!(result.ok());
        assert!(result.published.is_empty());
        assert_eq!(remote.record_count(), 0);
    }

    #[tokio::test]
    async fn active_backoff_rejects_a_subsequent_sync() {
        let col = collection();
        let remote = MockRemote::new();
        remote.set_backoff(60);
        let eng = engine(col.clone(), remote);

        eng.sync(&SyncOptions::default()).await.unwrap();
        let err = eng.sync(&SyncOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::Backoff(_)));
    }

    #[tokio::test]
    async fn active_backoff_emits_a_backoff_event() {
        let col = collection();
        let remote = MockRemote::new();
        remote.set_backoff(60);
        let eng = engine(col.clone(), remote);
        eng.sync(&SyncOptions::default()).await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        col.events.backoff.on(move |e| recorder.lock().push(e.retry_after_ms));

        eng.sync(&SyncOptions::default()).await.unwrap_err();
        assert_eq!(seen.lock().len(), 1);
        assert!(seen.lock()[0] > 0);
    }

    #[tokio::test]
    async fn successful_sync_emits_sync_success_not_sync_error() {
        let col = collection();
        let remote = MockRemote::new();
        let eng = engine(col.clone(), remote);

        let successes = Arc::new(Mutex::new(0));
        let errors = Arc::new(Mutex::new(0));
        let (s, e) = (successes.clone(), errors.clone());
        col.events.sync_success.on(move |_| *s.lock() += 1);
        col.events.sync_error.on(move |_| *e.lock() += 1);

        eng.sync(&SyncOptions::default()).await.unwrap();
        assert_eq!(*successes.lock(), 1);
        assert_eq!(*errors.lock(), 0);
    }

    #[tokio::test]
    async fn flush_with_nothing_pending_to_push_still_detected() {
        let col = collection();
        let remote = MockRemote::new();
        let mut seeded = Record::new();
        seeded.set_id("11111111-1111-4111-8111-111111111111");
        seeded.set("title", json!("from server"));
        remote.seed(seeded, 10);

        let eng = engine(col.clone(), remote.clone_handle());
        eng.sync(&SyncOptions::default()).await.unwrap();

        remote.flush(1);
        let err = eng.sync(&SyncOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::ServerFlushed(_)));
    }
}

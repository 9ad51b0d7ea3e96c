//! The `KintoBase` façade: holds per-process configuration and vends
//! [`crate::collection::LocalCollection`] instances, enforcing that no two
//! live instances exist for the same (bucket, name) key at once.
//!
//! `KintoConfig` holds an adapter *factory* in the design this follows; this
//! port passes the adapter (and id schema) directly to
//! [`KintoBase::collection`] instead, since an `Adapter` is a type parameter
//! of `LocalCollection` here rather than a value the façade could hold
//! behind a trait object (see DESIGN.md's "adapter generics vs `dyn
//! Adapter`" decision). Everything else — bucket, headers, `local_fields`,
//! the migration flag — is config state.

use crate::adapter::Adapter;
use crate::collection::LocalCollection;
use crate::error::DuplicateCollectionError;
use crate::id_schema::{IdSchema, UuidIdSchema};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::HashSet;

/// Uniquely identifies a collection's on-disk storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    pub bucket: String,
    pub name: String,
}

impl CollectionKey {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        CollectionKey {
            bucket: bucket.into(),
            name: name.into(),
        }
    }
}

/// Long-lived façade configuration.
#[derive(Debug, Clone)]
pub struct KintoConfig {
    pub bucket: String,
    pub headers: HashMap<String, String>,
    pub db_name: Option<String>,
    pub migrate_old_data: bool,
    pub local_fields: Vec<String>,
}

impl Default for KintoConfig {
    fn default() -> Self {
        KintoConfig {
            bucket: "default".to_string(),
            headers: HashMap::new(),
            db_name: None,
            migrate_old_data: false,
            local_fields: Vec::new(),
        }
    }
}

/// Binds an [`IdSchema`], event bus wiring, and collection-key bookkeeping
/// over one bucket. One `KintoBase` per bucket is
/// the intended lifetime; `collection()` is the only entry point for
/// obtaining a [`LocalCollection`].
pub struct KintoBase {
    config: KintoConfig,
    live: Mutex<HashSet<CollectionKey>>,
}

impl KintoBase {
    pub fn new(config: KintoConfig) -> Self {
        KintoBase {
            config,
            live: Mutex::new(HashSet::new()),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn config(&self) -> &KintoConfig {
        &self.config
    }

    /// Vends a [`LocalCollection`] named `name` under this façade's bucket.
    /// `id_schema` defaults to [`UuidIdSchema`] when `None`. Errors with
    /// [`DuplicateCollectionError`] if a collection with this key is already
    /// live — call [`KintoBase::release`] once the prior instance is
    /// dropped to reuse the key.
    pub fn collection<A: Adapter>(
        &self,
        name: impl Into<String>,
        adapter: A,
        id_schema: Option<Box<dyn IdSchema>>,
    ) -> crate::error::Result<LocalCollection<A>> {
        let name = name.into();
        let key = CollectionKey::new(self.config.bucket.clone(), name.clone());
        {
            let mut live = self.live.lock();
            if !live.insert(key) {
                return Err(DuplicateCollectionError {
                    bucket: self.config.bucket.clone(),
                    name,
                }
                .into());
            }
        }
        let id_schema = id_schema.unwrap_or_else(|| Box::new(UuidIdSchema));
        Ok(LocalCollection::new(
            adapter,
            id_schema,
            self.config.local_fields.clone(),
            self.config.bucket.clone(),
            name,
        ))
    }

    /// Releases `name`'s collection key so a future `collection()` call for
    /// it can succeed again. Callers invoke this once they drop the
    /// `LocalCollection` (and any `SyncEngine` built over it).
    pub fn release(&self, name: &str) {
        let key = CollectionKey::new(self.config.bucket.clone(), name);
        self.live.lock().remove(&key);
    }
}

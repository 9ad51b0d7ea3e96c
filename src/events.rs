use crate::record::Record;
use std::sync::Arc;

/// A single target affected by a collection mutation.
#[derive(Debug, Clone)]
pub struct EventTarget {
    pub action: &'static str,
    pub data: Record,
    pub old_record: Option<Record>,
}

/// Payload carried by `create`/`update`/`delete`/`deleteAll`/`change` events.
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    Create(EventTarget),
    Update(EventTarget),
    Delete(EventTarget),
    DeleteAll(Vec<EventTarget>),
    Change(Vec<EventTarget>),
}

/// Payload carried by collection-level sync lifecycle events.
#[derive(Debug, Clone)]
pub struct SyncOutcomeEvent {
    pub bucket: String,
    pub collection: String,
}

/// Emitted on the collection's event bus when a sync is refused due to an
/// active back-off window.
#[derive(Debug, Clone)]
pub struct BackoffEvent {
    pub retry_after_ms: i64,
}

type Listener<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A minimal synchronous pub/sub bus. The engine runs single-threaded and
/// cooperative, so listeners are invoked inline, in registration order, at
/// the point the event is emitted.
pub struct EventEmitter<T> {
    listeners: parking_lot::Mutex<Vec<Listener<T>>>,
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        EventEmitter {
            listeners: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    pub fn emit(&self, event: &T) {
        for listener in self.listeners.lock().iter() {
            listener(event);
        }
    }
}

/// The set of event emitters a [`crate::collection::LocalCollection`] owns.
#[derive(Default)]
pub struct CollectionEvents {
    pub collection: EventEmitter<CollectionEvent>,
    pub sync_success: EventEmitter<SyncOutcomeEvent>,
    pub sync_error: EventEmitter<SyncOutcomeEvent>,
    pub backoff: EventEmitter<BackoffEvent>,
}

impl CollectionEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

use serde_json::{Map, Value};
use std::fmt;

/// Reserved key for the stable record identifier.
pub const ID: &str = "id";
/// Reserved key for the server-assigned watermark.
pub const LAST_MODIFIED: &str = "last_modified";
/// Reserved key for the engine-managed lifecycle marker. Never transmitted.
pub const STATUS: &str = "_status";

/// A record's local lifecycle marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    Created,
    Updated,
    Deleted,
    Synced,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Created => "created",
            RecordStatus::Updated => "updated",
            RecordStatus::Deleted => "deleted",
            RecordStatus::Synced => "synced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(RecordStatus::Created),
            "updated" => Some(RecordStatus::Updated),
            "deleted" => Some(RecordStatus::Deleted),
            "synced" => Some(RecordStatus::Synced),
            _ => None,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open, string-keyed record. Values are arbitrary JSON; the engine only
/// ever inspects the reserved keys (`id`, `last_modified`, `_status`) and
/// whatever `localFields` the collection was configured with.
///
/// Records are treated as immutable values: every mutation in this crate
/// produces a new `Record` rather than mutating one in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Record(map)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get(ID).and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID.to_string(), Value::String(id.into()));
    }

    pub fn last_modified(&self) -> Option<i64> {
        self.0.get(LAST_MODIFIED).and_then(Value::as_i64)
    }

    pub fn set_last_modified(&mut self, value: Option<i64>) {
        match value {
            Some(v) => {
                self.0.insert(LAST_MODIFIED.to_string(), Value::from(v));
            }
            None => {
                self.0.remove(LAST_MODIFIED);
            }
        }
    }

    pub fn status(&self) -> Option<RecordStatus> {
        self.0.get(STATUS).and_then(Value::as_str).and_then(RecordStatus::parse)
    }

    pub fn set_status(&mut self, status: RecordStatus) {
        self.0
            .insert(STATUS.to_string(), Value::String(status.as_str().to_string()));
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.status(), Some(RecordStatus::Deleted))
    }

    /// A view of this record with `_status`, `last_modified`, and any
    /// `localFields` stripped, for outgoing encoding and for conflict-field
    /// comparisons. `last_modified` is reserved and server-assigned, so two
    /// records that otherwise carry identical content still differ there —
    /// stripping it is what lets a locally `created`/`updated` record ever
    /// collapse into a non-conflict against an incoming remote version.
    pub fn without_local(&self, local_fields: &[String]) -> Record {
        let mut out = self.0.clone();
        out.remove(STATUS);
        out.remove(LAST_MODIFIED);
        for field in local_fields {
            out.remove(field.as_str());
        }
        Record(out)
    }

    /// Equality over every field except `_status`, `last_modified`, and
    /// `localFields`, used to detect "local changes only differ by local
    /// fields" and the non-conflict collapse case.
    pub fn equal_ignoring_local(&self, other: &Record, local_fields: &[String]) -> bool {
        self.without_local(local_fields) == other.without_local(local_fields)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = crate::error::ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Record(map)),
            _ => Err(crate::error::ValidationError::NotAnObject),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        Record::from_map(v.as_object().unwrap().clone())
    }

    #[test]
    fn reserved_key_accessors_round_trip() {
        let mut r = rec(json!({"id": "a", "title": "x"}));
        assert_eq!(r.id(), Some("a"));
        assert_eq!(r.last_modified(), None);
        r.set_last_modified(Some(42));
        assert_eq!(r.last_modified(), Some(42));
        r.set_status(RecordStatus::Created);
        assert_eq!(r.status(), Some(RecordStatus::Created));
    }

    #[test]
    fn without_local_strips_status_last_modified_and_local_fields() {
        let mut r = rec(json!({"id": "a", "title": "x", "read": true}));
        r.set_status(RecordStatus::Updated);
        r.set_last_modified(Some(7));
        let local_fields = vec!["read".to_string()];
        let stripped = r.without_local(&local_fields);
        assert_eq!(stripped.get("_status"), None);
        assert_eq!(stripped.get("last_modified"), None);
        assert_eq!(stripped.get("read"), None);
        assert_eq!(stripped.get("title"), Some(&json!("x")));
    }

    #[test]
    fn equal_ignoring_local_true_when_only_last_modified_differs() {
        let mut a = rec(json!({"id": "a", "title": "x"}));
        a.set_status(RecordStatus::Updated);
        a.set_last_modified(Some(5));
        let mut b = rec(json!({"id": "a", "title": "x"}));
        b.set_last_modified(Some(99));
        assert!(a.equal_ignoring_local(&b, &[]));
    }

    #[test]
    fn equal_ignoring_local_true_when_only_local_fields_differ() {
        let mut a = rec(json!({"id": "a", "title": "x", "read": true}));
        a.set_status(RecordStatus::Created);
        let mut b = rec(json!({"id": "a", "title": "x", "read": false}));
        b.set_status(RecordStatus::Synced);
        let local_fields = vec!["read".to_string()];
        assert!(a.equal_ignoring_local(&b, &local_fields));
    }
}

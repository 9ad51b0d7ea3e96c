use crate::record::Record;

/// Which side detected the conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// The server's version differs from a locally pending, non-deleted
    /// record.
    Incoming,
    /// A locally pending deletion that the server concurrently updated, or
    /// vice versa.
    Outgoing,
}

impl ConflictType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictType::Incoming => "incoming",
            ConflictType::Outgoing => "outgoing",
        }
    }
}

/// `{type, local, remote}` — not an error per se, placed in
/// `SyncResult::conflicts`.
#[derive(Debug, Clone)]
pub struct ConflictEntry {
    pub kind: ConflictType,
    pub local: Option<Record>,
    pub remote: Option<Record>,
}

impl ConflictEntry {
    pub fn id(&self) -> Option<&str> {
        self.local
            .as_ref()
            .and_then(Record::id)
            .or_else(|| self.remote.as_ref().and_then(Record::id))
    }
}

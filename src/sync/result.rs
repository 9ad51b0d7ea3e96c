use crate::conflict::ConflictEntry;
use crate::record::Record;

/// One slot's worth of failure detail — a record (when known) and the
/// message from whatever threw (`TransformError`, `HookContractError`, a
/// remote batch error, …).
#[derive(Debug, Clone)]
pub struct SyncErrorEntry {
    pub id: Option<String>,
    pub message: String,
}

/// The record-bearing slots of [`SyncResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Created,
    Updated,
    Deleted,
    Published,
    Resolved,
    Skipped,
}

fn merge_by_id(existing: &mut Vec<Record>, incoming: Vec<Record>) {
    for record in incoming {
        let id = record.id().map(str::to_string);
        if let Some(id) = id {
            if let Some(slot) = existing.iter_mut().find(|r| r.id() == Some(id.as_str())) {
                *slot = record;
                continue;
            }
        }
        existing.push(record);
    }
}

/// Accumulator for per-phase sync outcomes. `add` deduplicates
/// by record id (later wins); `ok` is derived, false iff `errors` or
/// `conflicts` is nonempty.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub errors: Vec<SyncErrorEntry>,
    pub created: Vec<Record>,
    pub updated: Vec<Record>,
    pub deleted: Vec<Record>,
    pub published: Vec<Record>,
    pub resolved: Vec<Record>,
    pub conflicts: Vec<ConflictEntry>,
    pub skipped: Vec<Record>,
    pub last_modified: Option<i64>,
}

impl SyncResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty() && self.conflicts.is_empty()
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Vec<Record> {
        match slot {
            Slot::Created => &mut self.created,
            Slot::Updated => &mut self.updated,
            Slot::Deleted => &mut self.deleted,
            Slot::Published => &mut self.published,
            Slot::Resolved => &mut self.resolved,
            Slot::Skipped => &mut self.skipped,
        }
    }

    pub fn add(&mut self, slot: Slot, entries: Vec<Record>) {
        let mut current = std::mem::take(self.slot_mut(slot));
        merge_by_id(&mut current, entries);
        *self.slot_mut(slot) = current;
    }

    pub fn add_conflicts(&mut self, entries: Vec<ConflictEntry>) {
        self.conflicts.extend(entries);
    }

    pub fn add_errors(&mut self, entries: Vec<SyncErrorEntry>) {
        self.errors.extend(entries);
    }

    pub fn reset(&mut self, slot: Slot) {
        self.slot_mut(slot).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str, title: &str) -> Record {
        let mut r = Record::from_map(json!({"title": title}).as_object().unwrap().clone());
        r.set_id(id);
        r
    }

    #[test]
    fn add_dedupes_by_id_later_wins() {
        let mut result = SyncResult::new();
        result.add(Slot::Created, vec![rec("a", "first")]);
        result.add(Slot::Created, vec![rec("a", "second"), rec("b", "third")]);
        assert_eq!(result.created.len(), 2);
        let a = result.created.iter().find(|r| r.id() == Some("a")).unwrap();
        assert_eq!(a.get("title"), Some(&json!("second")));
    }

    #[test]
    fn ok_is_false_when_conflicts_present() {
        let mut result = SyncResult::new();
        assert!(result.ok());
        result.add_conflicts(vec![ConflictEntry {
            kind: crate::conflict::ConflictType::Incoming,
            local: None,
            remote: None,
        }]);
        assert!(!result.ok());
    }

    #[test]
    fn reset_clears_only_the_named_slot() {
        let mut result = SyncResult::new();
        result.add(Slot::Created, vec![rec("a", "x")]);
        result.add(Slot::Updated, vec![rec("b", "y")]);
        result.reset(Slot::Created);
        assert!(result.created.is_empty());
        assert_eq!(result.updated.len(), 1);
    }
}

use crate::record::Record;
use uuid::Uuid;

/// Generates and validates record identifiers (`idSchema`).
///
/// The default schema accepts RFC-4122 UUIDs, matching the source system's
/// default. Hosts may supply their own (e.g. server-assigned slugs) through
/// `KintoConfig::id_schema`.
pub trait IdSchema: Send + Sync {
    /// Generate a new id, optionally informed by the record it will be
    /// attached to (some schemas derive ids from record content).
    fn generate(&self, record: Option<&Record>) -> String;

    /// Returns whether `id` is well-formed under this schema.
    fn validate(&self, id: &str) -> bool;
}

/// Default [`IdSchema`]: random UUIDv4, validated as any RFC-4122 UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdSchema;

impl IdSchema for UuidIdSchema {
    fn generate(&self, _record: Option<&Record>) -> String {
        Uuid::new_v4().to_string()
    }

    fn validate(&self, id: &str) -> bool {
        Uuid::parse_str(id).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_validate() {
        let schema = UuidIdSchema;
        let id = schema.generate(None);
        assert!(schema.validate(&id));
    }

    #[test]
    fn garbage_does_not_validate() {
        let schema = UuidIdSchema;
        assert!(!schema.validate("not-a-uuid"));
        assert!(!schema.validate(""));
    }
}

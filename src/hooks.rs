use crate::error::HookContractError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Payload passed through an `incoming-changes` hook chain. Only this hook
/// name is recognized by the core.
#[derive(Debug, Clone)]
pub struct IncomingChangesPayload {
    pub last_modified: Option<i64>,
    pub changes: Vec<Value>,
}

/// A single named hook function. Named (not just positional) so a future
/// hook point can be added without changing the trait.
#[async_trait(?Send)]
pub trait Hook {
    async fn call(
        &self,
        payload: IncomingChangesPayload,
    ) -> Result<IncomingChangesPayload, HookContractError>;
}

/// Named, chained hook lists. Each hook in a named chain receives the
/// previous hook's output; the core currently only drives the
/// `incoming-changes` chain.
#[derive(Default)]
pub struct HookPipeline {
    chains: HashMap<String, Vec<Box<dyn Hook>>>,
}

pub const INCOMING_CHANGES: &str = "incoming-changes";

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, hook: Box<dyn Hook>) {
        self.chains.entry(name.into()).or_default().push(hook);
    }

    pub async fn run_incoming_changes(
        &self,
        mut payload: IncomingChangesPayload,
    ) -> Result<IncomingChangesPayload, HookContractError> {
        if let Some(chain) = self.chains.get(INCOMING_CHANGES) {
            for hook in chain {
                payload = hook.call(payload).await?;
            }
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DropDeleted;

    #[async_trait(?Send)]
    impl Hook for DropDeleted {
        async fn call(
            &self,
            mut payload: IncomingChangesPayload,
        ) -> Result<IncomingChangesPayload, HookContractError> {
            payload.changes.retain(|c| !c.get("deleted").is_some());
            Ok(payload)
        }
    }

    #[tokio::test]
    async fn chain_runs_in_registration_order() {
        let mut pipeline = HookPipeline::new();
        pipeline.register(INCOMING_CHANGES, Box::new(DropDeleted));
        let payload = IncomingChangesPayload {
            last_modified: Some(1),
            changes: vec![
                serde_json::json!({"id": "a"}),
                serde_json::json!({"id": "b", "deleted": true}),
            ],
        };
        let out = pipeline.run_incoming_changes(payload).await.unwrap();
        assert_eq!(out.changes.len(), 1);
    }

    #[tokio::test]
    async fn unregistered_hook_is_a_passthrough() {
        let pipeline = HookPipeline::new();
        let payload = IncomingChangesPayload {
            last_modified: None,
            changes: vec![serde_json::json!({"id": "a"})],
        };
        let out = pipeline.run_incoming_changes(payload).await.unwrap();
        assert_eq!(out.changes.len(), 1);
    }
}

use crate::auth::Actor;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// Audit record for a mutating operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub user_id: String,
    pub user_name: String,
    pub user_role: String,
    pub action: &'static str,
    pub resource: &'static str,
    pub resource_id: Uuid,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ActivityEntry {
    pub fn new(
        actor: &Actor,
        action: &'static str,
        resource: &'static str,
        resource_id: Uuid,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id: actor.user_id.clone(),
            user_name: actor.user_name.clone(),
            user_role: actor.user_role.clone(),
            action,
            resource,
            resource_id,
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Append-only audit sink. Best-effort: callers never fail on it.
#[async_trait]
pub trait ActivityLogger: Send + Sync {
    async fn log_activity(&self, entry: ActivityEntry);
}

/// Writes activity entries to the `activity` tracing target.
#[derive(Clone, Debug, Default)]
pub struct TracingActivityLogger;

#[async_trait]
impl ActivityLogger for TracingActivityLogger {
    async fn log_activity(&self, entry: ActivityEntry) {
        info!(
            target: "activity",
            user_id = %entry.user_id,
            user_role = %entry.user_role,
            action = entry.action,
            resource = entry.resource,
            resource_id = %entry.resource_id,
            details = ?entry.details,
            "{}",
            entry.description
        );
    }
}

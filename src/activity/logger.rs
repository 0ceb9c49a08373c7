// Write path: helpers that turn application events into audit log entries.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ActivityError, ActivityFeed};
use crate::audit_repo::AuditLogStore;
use crate::models::{Actor, AuditDetails, NewAuditEntry, Resource};

/// Everything `log_activity` records. Build with `new` and the `with_*` setters.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub actor: Actor,
    pub action: String,
    pub resource: Resource,
    pub metadata: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
}

impl ActivityEntry {
    pub fn new(
        actor: Actor,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            action: action.into(),
            resource: Resource {
                id: resource_id.into(),
                resource_type: resource_type.into(),
                name: resource_name.into(),
            },
            metadata: None,
            ip_address: None,
            user_agent: None,
            success: true,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }

    fn into_audit_entry(self) -> NewAuditEntry {
        let actor_id = Some(self.actor.id.clone());
        NewAuditEntry {
            action: self.action,
            details: AuditDetails {
                resource_type: self.resource.resource_type,
                resource_id: self.resource.id,
                resource_name: self.resource.name,
                actor: Some(self.actor),
                metadata: self.metadata,
                ip_address: self.ip_address,
                user_agent: self.user_agent,
            },
            success: self.success,
            actor_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Started,
    Stopped,
    Restarted,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Started => "started",
            ServiceAction::Stopped => "stopped",
            ServiceAction::Restarted => "restarted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupAction {
    Created,
    Restored,
    Deleted,
}

impl BackupAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BackupAction::Created => "backup_created",
            BackupAction::Restored => "backup_restored",
            BackupAction::Deleted => "backup_deleted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretAction {
    Viewed,
    Created,
    Updated,
    Deleted,
}

impl SecretAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SecretAction::Viewed => "secret_viewed",
            SecretAction::Created => "secret_created",
            SecretAction::Updated => "secret_updated",
            SecretAction::Deleted => "secret_deleted",
        }
    }
}

/// One field of a configuration change, stored under `metadata.changes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChange {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

impl<S: AuditLogStore> ActivityFeed<S> {
    pub async fn log_activity(&self, entry: ActivityEntry) -> Result<(), ActivityError> {
        tracing::debug!(
            operation = "log_activity",
            action = %entry.action,
            resource_type = %entry.resource.resource_type,
            actor = %entry.actor.id,
            "activity logged"
        );
        self.store().append(entry.into_audit_entry()).await?;
        Ok(())
    }

    pub async fn log_service_action(
        &self,
        actor: Actor,
        service: &str,
        action: ServiceAction,
    ) -> Result<(), ActivityError> {
        self.log_activity(ActivityEntry::new(
            actor,
            action.as_str(),
            "service",
            service,
            service,
        ))
        .await
    }

    pub async fn log_deployment(
        &self,
        actor: Actor,
        environment: &str,
        version: Option<&str>,
    ) -> Result<(), ActivityError> {
        let entry = ActivityEntry::new(actor, "deployed", "deployment", environment, environment)
            .with_metadata(json!({ "environment": environment, "version": version }));
        self.log_activity(entry).await
    }

    pub async fn log_config_change(
        &self,
        actor: Actor,
        config_name: &str,
        changes: &[ConfigChange],
    ) -> Result<(), ActivityError> {
        let changes = serde_json::to_value(changes).map_err(anyhow::Error::from)?;
        let entry = ActivityEntry::new(actor, "config_changed", "config", config_name, config_name)
            .with_metadata(json!({ "changes": changes }));
        self.log_activity(entry).await
    }

    pub async fn log_backup(
        &self,
        actor: Actor,
        backup_id: &str,
        backup_name: &str,
        action: BackupAction,
    ) -> Result<(), ActivityError> {
        self.log_activity(ActivityEntry::new(
            actor,
            action.as_str(),
            "backup",
            backup_id,
            backup_name,
        ))
        .await
    }

    /// Records who touched which secret. The value itself is never logged.
    pub async fn log_secret_access(
        &self,
        actor: Actor,
        secret_name: &str,
        action: SecretAction,
    ) -> Result<(), ActivityError> {
        self.log_activity(ActivityEntry::new(
            actor,
            action.as_str(),
            "secret",
            secret_name,
            secret_name,
        ))
        .await
    }

    pub async fn log_user_action(
        &self,
        actor: Actor,
        action: &str,
        user_id: &str,
        user_name: &str,
    ) -> Result<(), ActivityError> {
        self.log_activity(ActivityEntry::new(actor, action, "user", user_id, user_name))
            .await
    }
}

// Audit log rows and the normalized activity view over them

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    User,
    System,
    Service,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub name: String,
}

impl Actor {
    pub fn user(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            actor_type: ActorType::User,
            name: name.into(),
        }
    }

    pub fn system() -> Self {
        Self {
            id: "system".into(),
            actor_type: ActorType::System,
            name: "System".into(),
        }
    }

    pub fn service(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            actor_type: ActorType::Service,
            name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
}

/// Normalized view of one audit log row. Has no lifecycle of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub actor: Actor,
    pub action: String,
    pub resource: Resource,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub success: bool,
}

impl Activity {
    /// "{action} {actor name} {resource name}", the text search runs against.
    pub fn searchable_text(&self) -> String {
        format!("{} {} {}", self.action, self.actor.name, self.resource.name)
    }
}

/// Details block stored with every audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDetails {
    pub resource_type: String,
    pub resource_id: String,
    pub resource_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Entry handed to `AuditLogStore::append`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditEntry {
    pub action: String,
    pub details: AuditDetails,
    pub success: bool,
    #[serde(default)]
    pub actor_id: Option<String>,
}

/// Row as returned by `AuditLogStore::query`, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogItem {
    pub id: String,
    pub action: String,
    pub details: AuditDetails,
    pub success: bool,
    #[serde(default)]
    pub actor_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorCount {
    pub actor_id: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBucket {
    /// UTC calendar date, YYYY-MM-DD.
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total_today: u64,
    pub total_week: u64,
    pub total_month: u64,
    pub by_action: BTreeMap<String, u64>,
    pub by_resource: BTreeMap<String, u64>,
    pub top_actors: Vec<ActorCount>,
    pub timeline: Vec<TimelineBucket>,
}

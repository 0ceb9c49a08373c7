// Shared test helpers

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use opsdash::models::{Actor, AuditDetails, NewAuditEntry};
use serde_json::{Value, json};

/// Container entry in the ingestion wire shape.
pub fn container_json(name: &str, status: &str, health: &str) -> Value {
    json!({
        "id": format!("id-{name}"),
        "name": name,
        "image": "example:latest",
        "status": status,
        "health": health,
    })
}

/// Payload carrying only a container list, stamped with `last_update`.
pub fn containers_payload(containers: Vec<Value>, last_update: DateTime<Utc>) -> Value {
    json!({
        "docker": { "containers": containers },
        "lastUpdate": last_update.to_rfc3339(),
    })
}

pub fn audit_entry(action: &str, resource_type: &str, resource_name: &str, actor: Actor) -> NewAuditEntry {
    NewAuditEntry {
        action: action.to_string(),
        actor_id: Some(actor.id.clone()),
        details: AuditDetails {
            resource_type: resource_type.to_string(),
            resource_id: format!("{resource_type}-{resource_name}"),
            resource_name: resource_name.to_string(),
            actor: Some(actor),
            metadata: None,
            ip_address: None,
            user_agent: None,
        },
        success: true,
    }
}

pub fn alice() -> Actor {
    Actor::user("u-alice", "Alice")
}

pub fn bob() -> Actor {
    Actor::user("u-bob", "Bob")
}

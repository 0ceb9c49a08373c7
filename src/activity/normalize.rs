// AuditLogItem -> Activity. The only mapping used by feed, search, lookup and stats.

use crate::models::{Activity, Actor, ActorType, AuditLogItem, Resource};

/// Deterministic: the same item always yields the same activity.
pub fn to_activity(item: &AuditLogItem) -> Activity {
    Activity {
        id: item.id.clone(),
        actor: resolve_actor(item),
        action: item.action.clone(),
        resource: Resource {
            id: item.details.resource_id.clone(),
            resource_type: item.details.resource_type.clone(),
            name: item.details.resource_name.clone(),
        },
        timestamp: item.timestamp,
        metadata: item.details.metadata.clone(),
        ip_address: item.details.ip_address.clone(),
        user_agent: item.details.user_agent.clone(),
        success: item.success,
    }
}

/// Explicit actor in the details, else the bare actor id as a user, else the system.
fn resolve_actor(item: &AuditLogItem) -> Actor {
    if let Some(actor) = &item.details.actor {
        return actor.clone();
    }
    match &item.actor_id {
        Some(id) if !id.is_empty() => Actor {
            id: id.clone(),
            actor_type: ActorType::User,
            name: id.clone(),
        },
        _ => Actor::system(),
    }
}

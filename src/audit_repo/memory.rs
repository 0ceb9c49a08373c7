// In-process audit log. Same contract as the SQLite store; used by tests and embedders
// that do not need durability.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::AuditLogStore;
use crate::models::{AuditLogItem, NewAuditEntry};

#[derive(Default)]
pub struct MemoryAuditLog {
    /// Oldest first; query walks it backwards.
    entries: Mutex<Vec<AuditLogItem>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends with an explicit timestamp (backfills, tests).
    pub fn append_at(&self, entry: NewAuditEntry, timestamp: DateTime<Utc>) -> AuditLogItem {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let item = AuditLogItem {
            id: (entries.len() + 1).to_string(),
            action: entry.action,
            details: entry.details,
            success: entry.success,
            actor_id: entry.actor_id,
            timestamp,
        };
        entries.push(item.clone());
        item
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLogStore for MemoryAuditLog {
    fn append(&self, entry: NewAuditEntry) -> impl Future<Output = anyhow::Result<()>> + Send {
        self.append_at(entry, Utc::now());
        std::future::ready(Ok(()))
    }

    fn query(
        &self,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<AuditLogItem>>> + Send {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let out: Vec<AuditLogItem> = entries.iter().rev().take(limit).cloned().collect();
        std::future::ready(Ok(out))
    }

    fn find(
        &self,
        id: &str,
    ) -> impl Future<Output = anyhow::Result<Option<AuditLogItem>>> + Send {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let found = entries.iter().find(|item| item.id == id).cloned();
        std::future::ready(Ok(found))
    }
}

// Activity feed: read-side view over the audit log store. Owns no state; every call reads
// the newest `scan_limit` entries and derives from them.
//
// Pages are offset based over a log that may grow between calls, so a page boundary can
// repeat or skip an entry when appends land in between. The log has no transactional cursor.

mod logger;
pub mod normalize;
pub mod stats;

pub use logger::{ActivityEntry, BackupAction, ConfigChange, SecretAction, ServiceAction};

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::audit_repo::AuditLogStore;
use crate::models::{Activity, ActivityStats};

pub const DEFAULT_SCAN_LIMIT: usize = 10_000;

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("audit log store: {0}")]
    Store(#[from] anyhow::Error),
}

/// Opaque continuation token for `get_activity_feed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    fn from_offset(offset: usize) -> Self {
        Cursor(format!("c{offset:x}"))
    }

    fn offset(&self) -> Result<usize, ActivityError> {
        self.0
            .strip_prefix('c')
            .and_then(|hex| usize::from_str_radix(hex, 16).ok())
            .ok_or_else(|| ActivityError::InvalidCursor(self.0.clone()))
    }
}

impl From<String> for Cursor {
    fn from(s: String) -> Self {
        Cursor(s)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// AND-combined; `None` fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFilter {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub actor_id: Option<String>,
}

impl ActivityFilter {
    pub fn matches(&self, a: &Activity) -> bool {
        self.action.as_deref().is_none_or(|v| a.action == v)
            && self
                .resource_type
                .as_deref()
                .is_none_or(|v| a.resource.resource_type == v)
            && self.actor_id.as_deref().is_none_or(|v| a.actor.id == v)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedOptions {
    pub limit: usize,
    pub offset: Option<usize>,
    /// Takes precedence over `offset`.
    pub cursor: Option<Cursor>,
    pub filter: ActivityFilter,
}

impl FeedOptions {
    pub fn first(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: ActivityFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn after(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFeedPage {
    pub activities: Vec<Activity>,
    /// Matches after filtering, not raw log size.
    pub total: usize,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

pub struct ActivityFeed<S> {
    store: Arc<S>,
    scan_limit: usize,
}

impl<S: AuditLogStore> ActivityFeed<S> {
    pub fn new(store: Arc<S>, scan_limit: usize) -> Self {
        Self { store, scan_limit }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn load(&self) -> Result<Vec<Activity>, ActivityError> {
        let items = self.store.query(self.scan_limit).await?;
        Ok(items.iter().map(normalize::to_activity).collect())
    }

    /// Newest first. `limit == 0` returns no rows but still counts `total`.
    #[instrument(skip(self, options), fields(operation = "get_activity_feed", limit = options.limit))]
    pub async fn get_activity_feed(
        &self,
        options: &FeedOptions,
    ) -> Result<ActivityFeedPage, ActivityError> {
        let offset = match &options.cursor {
            Some(cursor) => cursor.offset()?,
            None => options.offset.unwrap_or(0),
        };
        let matching: Vec<Activity> = self
            .load()
            .await?
            .into_iter()
            .filter(|a| options.filter.matches(a))
            .collect();
        let total = matching.len();
        let activities: Vec<Activity> = matching
            .into_iter()
            .skip(offset)
            .take(options.limit)
            .collect();
        let end = offset.saturating_add(activities.len());
        let has_more = end < total;
        Ok(ActivityFeedPage {
            activities,
            total,
            has_more,
            next_cursor: has_more.then(|| Cursor::from_offset(end)),
        })
    }

    /// Case-insensitive substring match on "{action} {actor name} {resource name}".
    #[instrument(skip(self), fields(operation = "search_activity"))]
    pub async fn search_activity(&self, term: &str) -> Result<Vec<Activity>, ActivityError> {
        let needle = term.to_lowercase();
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|a| a.searchable_text().to_lowercase().contains(&needle))
            .collect())
    }

    /// Looks the entry up directly, so it is found even when older than the `scan_limit`
    /// newest entries the feed reads.
    pub async fn get_activity_by_id(&self, id: &str) -> Result<Option<Activity>, ActivityError> {
        let item = self.store.find(id).await?;
        Ok(item.as_ref().map(normalize::to_activity))
    }

    pub async fn get_activity_stats(&self) -> Result<ActivityStats, ActivityError> {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<ActivityStats, ActivityError> {
        let activities = self.load().await?;
        Ok(stats::compute_stats(&activities, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrip_and_rejects_garbage() {
        let c = Cursor::from_offset(250);
        assert_eq!(c.offset().unwrap(), 250);
        assert!(Cursor::from("250".to_string()).offset().is_err());
        assert!(Cursor::from("czz".to_string()).offset().is_err());
    }
}

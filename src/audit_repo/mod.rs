// Audit log store: append-only event history the activity feed reads from.
// SQLite via sqlx (WAL, pooled). Resource columns are kept next to the JSON details so rows
// stay readable if the details blob cannot be decoded.

mod memory;

pub use memory::MemoryAuditLog;

use std::future::Future;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::instrument;

use crate::models::{AuditDetails, AuditLogItem, NewAuditEntry};

/// Contract the activity feed relies on. `query` returns the newest `limit` entries,
/// newest first. Appends from several callers at once must be safe.
pub trait AuditLogStore: Send + Sync {
    fn append(&self, entry: NewAuditEntry) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn query(&self, limit: usize)
    -> impl Future<Output = anyhow::Result<Vec<AuditLogItem>>> + Send;

    /// Direct lookup, independent of how far back the entry sits.
    fn find(&self, id: &str)
    -> impl Future<Output = anyhow::Result<Option<AuditLogItem>>> + Send;
}

pub struct SqliteAuditLog {
    pool: SqlitePool,
    retention_ms: i64,
}

impl SqliteAuditLog {
    pub async fn connect(
        path: &str,
        max_pool_size: u32,
        retention_days: u32,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        let retention_ms = (retention_days as i64) * 24 * 60 * 60 * 1000;
        Ok(Self { pool, retention_ms })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                action TEXT NOT NULL,
                resource_type TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                resource_name TEXT NOT NULL,
                actor_id TEXT,
                success INTEGER NOT NULL,
                details TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self, entry), fields(repo = "audit", operation = "insert", action = %entry.action))]
    pub async fn insert(&self, entry: NewAuditEntry) -> anyhow::Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        self.insert_at(entry, now_ms).await
    }

    /// Insert with an explicit `created_at` (epoch ms).
    pub async fn insert_at(&self, entry: NewAuditEntry, created_at_ms: i64) -> anyhow::Result<()> {
        let details = serde_json::to_string(&entry.details)?;
        sqlx::query(
            "INSERT INTO audit_log (created_at, action, resource_type, resource_id, resource_name, actor_id, success, details) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(created_at_ms)
        .bind(&entry.action)
        .bind(&entry.details.resource_type)
        .bind(&entry.details.resource_id)
        .bind(&entry.details.resource_name)
        .bind(entry.actor_id.as_deref())
        .bind(entry.success)
        .bind(&details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "audit", operation = "recent"))]
    pub async fn recent(&self, limit: usize) -> anyhow::Result<Vec<AuditLogItem>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT id, created_at, action, resource_type, resource_id, resource_name, actor_id, success, details
             FROM audit_log ORDER BY id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_row(&row)?);
        }
        Ok(out)
    }

    /// Ids are row ids; anything that is not one matches nothing.
    #[instrument(skip(self), fields(repo = "audit", operation = "by_id"))]
    pub async fn by_id(&self, id: &str) -> anyhow::Result<Option<AuditLogItem>> {
        let Ok(id) = id.parse::<i64>() else {
            return Ok(None);
        };
        let row = sqlx::query(
            "SELECT id, created_at, action, resource_type, resource_id, resource_name, actor_id, success, details
             FROM audit_log WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    pub async fn count(&self) -> anyhow::Result<u64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    /// Delete entries older than the retention window. Returns rows removed.
    #[instrument(skip(self), fields(repo = "audit", operation = "prune_old_entries"))]
    pub async fn prune_old_entries(&self) -> anyhow::Result<u64> {
        let cutoff = Utc::now().timestamp_millis() - self.retention_ms;
        let r = sqlx::query("DELETE FROM audit_log WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    /// Reclaim space after deletes (run periodically after pruning).
    #[instrument(skip(self), fields(repo = "audit", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<AuditLogItem> {
        let id: i64 = row.try_get("id")?;
        let created_at: i64 = row.try_get("created_at")?;
        let action: String = row.try_get("action")?;
        let resource_type: String = row.try_get("resource_type")?;
        let resource_id: String = row.try_get("resource_id")?;
        let resource_name: String = row.try_get("resource_name")?;
        let actor_id: Option<String> = row.try_get("actor_id")?;
        let success: bool = row.try_get("success")?;
        let details: String = row.try_get("details")?;

        let details = serde_json::from_str::<AuditDetails>(&details).unwrap_or_else(|e| {
            tracing::debug!(error = %e, id, "audit details undecodable, using columns only");
            AuditDetails {
                resource_type,
                resource_id,
                resource_name,
                actor: None,
                metadata: None,
                ip_address: None,
                user_agent: None,
            }
        });

        Ok(AuditLogItem {
            id: id.to_string(),
            action,
            details,
            success,
            actor_id,
            timestamp: timestamp_from_ms(created_at),
        })
    }
}

fn timestamp_from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl AuditLogStore for SqliteAuditLog {
    fn append(&self, entry: NewAuditEntry) -> impl Future<Output = anyhow::Result<()>> + Send {
        self.insert(entry)
    }

    fn query(
        &self,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<AuditLogItem>>> + Send {
        self.recent(limit)
    }

    fn find(
        &self,
        id: &str,
    ) -> impl Future<Output = anyhow::Result<Option<AuditLogItem>>> + Send {
        self.by_id(id)
    }
}

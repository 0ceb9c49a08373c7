// SqliteAuditLog tests against a temporary database file

mod common;

use chrono::{Duration, Utc};
use common::{alice, audit_entry, bob};
use opsdash::activity::{ActivityFeed, FeedOptions, ServiceAction};
use opsdash::audit_repo::{AuditLogStore, SqliteAuditLog};
use serde_json::json;
use std::sync::Arc;

async fn temp_log(retention_days: u32) -> (tempfile::TempDir, SqliteAuditLog) {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("audit.db");
    let log = SqliteAuditLog::connect(db_path.to_str().unwrap(), 2, retention_days)
        .await
        .unwrap();
    log.init().await.unwrap();
    (dir, log)
}

#[tokio::test]
async fn init_is_idempotent() {
    let (_dir, log) = temp_log(90).await;
    log.init().await.unwrap();
    assert_eq!(log.count().await.unwrap(), 0);
}

#[tokio::test]
async fn query_returns_newest_first_up_to_limit() {
    let (_dir, log) = temp_log(90).await;
    for i in 0..5 {
        log.append(audit_entry("started", "service", &format!("svc{i}"), alice()))
            .await
            .unwrap();
    }
    let items = log.query(3).await.unwrap();
    let names: Vec<&str> = items
        .iter()
        .map(|i| i.details.resource_name.as_str())
        .collect();
    assert_eq!(names, vec!["svc4", "svc3", "svc2"]);
    assert_eq!(log.count().await.unwrap(), 5);
}

#[tokio::test]
async fn details_roundtrip_including_metadata() {
    let (_dir, log) = temp_log(90).await;
    let mut entry = audit_entry("config_changed", "config", "app.toml", bob());
    entry.details.metadata = Some(json!({
        "changes": [{ "field": "port", "oldValue": 80, "newValue": 8080 }]
    }));
    entry.details.ip_address = Some("192.168.1.5".to_string());
    entry.success = false;
    log.append(entry.clone()).await.unwrap();

    let items = log.query(10).await.unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.action, "config_changed");
    assert_eq!(item.details, entry.details);
    assert!(!item.success);
    assert_eq!(item.actor_id.as_deref(), Some("u-bob"));
    assert!((Utc::now() - item.timestamp) < Duration::minutes(1));
}

#[tokio::test]
async fn prune_removes_entries_past_retention() {
    let (_dir, log) = temp_log(7).await;
    let now_ms = Utc::now().timestamp_millis();
    let day_ms = 24 * 60 * 60 * 1000;
    log.insert_at(audit_entry("old", "service", "a", alice()), now_ms - 10 * day_ms)
        .await
        .unwrap();
    log.insert_at(audit_entry("recent", "service", "b", alice()), now_ms - day_ms)
        .await
        .unwrap();

    assert_eq!(log.prune_old_entries().await.unwrap(), 1);
    let items = log.query(10).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].action, "recent");
    log.vacuum().await.unwrap();
}

#[tokio::test]
async fn feed_over_sqlite_matches_lookup_by_id() {
    let (_dir, log) = temp_log(90).await;
    let feed = ActivityFeed::new(Arc::new(log), 1000);
    for i in 0..3 {
        feed.log_activity(opsdash::activity::ActivityEntry::new(
            alice(),
            "started",
            "service",
            format!("svc{i}"),
            format!("svc{i}"),
        ))
        .await
        .unwrap();
    }
    let page = feed.get_activity_feed(&FeedOptions::first(10)).await.unwrap();
    assert_eq!(page.total, 3);
    for activity in &page.activities {
        let by_id = feed
            .get_activity_by_id(&activity.id)
            .await
            .unwrap()
            .expect("present");
        assert_eq!(&by_id, activity);
    }
}

#[tokio::test]
async fn lookup_by_id_reaches_past_scan_limit() {
    let (_dir, log) = temp_log(90).await;
    let feed = ActivityFeed::new(Arc::new(log), 2);
    for i in 0..5 {
        feed.log_service_action(alice(), &format!("svc{i}"), ServiceAction::Started)
            .await
            .unwrap();
    }
    let page = feed.get_activity_feed(&FeedOptions::first(10)).await.unwrap();
    assert_eq!(page.total, 2);

    let oldest = feed.get_activity_by_id("1").await.unwrap().expect("row 1");
    assert_eq!(oldest.resource.name, "svc0");
    assert_eq!(oldest.actor, alice());
    assert!(feed.get_activity_by_id("not-a-row").await.unwrap().is_none());
    assert!(feed.get_activity_by_id("42").await.unwrap().is_none());
}

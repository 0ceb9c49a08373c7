// Rolling-window counts and the 7-day calendar timeline.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};

use crate::models::{Activity, ActivityStats, ActorCount, TimelineBucket};

pub const TOP_ACTORS_LIMIT: usize = 10;
pub const TIMELINE_DAYS: i64 = 7;

/// Windows are rolling and inclusive: [now - d, now]. The timeline is bucketed by UTC date.
pub fn compute_stats(activities: &[Activity], now: DateTime<Utc>) -> ActivityStats {
    let day_ago = now - Duration::days(1);
    let week_ago = now - Duration::days(7);
    let month_ago = now - Duration::days(30);

    let today = now.date_naive();
    let first_day = today - Duration::days(TIMELINE_DAYS - 1);
    let mut timeline: BTreeMap<chrono::NaiveDate, u64> = (0..TIMELINE_DAYS)
        .map(|i| (first_day + Duration::days(i), 0))
        .collect();

    let mut total_today = 0;
    let mut total_week = 0;
    let mut total_month = 0;
    let mut by_action: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_resource: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_actor: HashMap<&str, u64> = HashMap::new();

    for a in activities {
        let ts = a.timestamp;
        if ts <= now {
            if ts >= day_ago {
                total_today += 1;
            }
            if ts >= week_ago {
                total_week += 1;
            }
            if ts >= month_ago {
                total_month += 1;
            }
            if let Some(count) = timeline.get_mut(&ts.date_naive()) {
                *count += 1;
            }
        }
        *by_action.entry(a.action.clone()).or_default() += 1;
        *by_resource
            .entry(a.resource.resource_type.clone())
            .or_default() += 1;
        *by_actor.entry(a.actor.id.as_str()).or_default() += 1;
    }

    let mut top_actors: Vec<ActorCount> = by_actor
        .into_iter()
        .map(|(actor_id, count)| ActorCount {
            actor_id: actor_id.to_string(),
            count,
        })
        .collect();
    top_actors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.actor_id.cmp(&b.actor_id)));
    top_actors.truncate(TOP_ACTORS_LIMIT);

    ActivityStats {
        total_today,
        total_week,
        total_month,
        by_action,
        by_resource,
        top_actors,
        timeline: timeline
            .into_iter()
            .map(|(date, count)| TimelineBucket {
                date: date.format("%Y-%m-%d").to_string(),
                count,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, Resource};
    use chrono::TimeZone;

    fn activity(actor: &str, action: &str, ts: DateTime<Utc>) -> Activity {
        Activity {
            id: format!("{actor}-{action}-{}", ts.timestamp()),
            actor: Actor::user(actor, actor),
            action: action.into(),
            resource: Resource {
                id: "r".into(),
                resource_type: "service".into(),
                name: "postgres".into(),
            },
            timestamp: ts,
            metadata: None,
            ip_address: None,
            user_agent: None,
            success: true,
        }
    }

    #[test]
    fn empty_input_still_has_seven_days() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let stats = compute_stats(&[], now);
        assert_eq!(stats.total_month, 0);
        assert!(stats.top_actors.is_empty());
        let dates: Vec<&str> = stats.timeline.iter().map(|b| b.date.as_str()).collect();
        assert_eq!(
            dates,
            [
                "2026-02-23",
                "2026-02-24",
                "2026-02-25",
                "2026-02-26",
                "2026-02-27",
                "2026-02-28",
                "2026-03-01"
            ]
        );
    }

    #[test]
    fn windows_are_rolling_not_calendar() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let items = vec![
            activity("a", "started", now - Duration::hours(2)),
            activity("a", "started", now - Duration::hours(23)),
            activity("b", "stopped", now - Duration::days(3)),
            activity("b", "stopped", now - Duration::days(20)),
            activity("c", "deployed", now - Duration::days(45)),
            activity("c", "deployed", now + Duration::hours(1)),
        ];
        let stats = compute_stats(&items, now);
        assert_eq!(stats.total_today, 2);
        assert_eq!(stats.total_week, 3);
        assert_eq!(stats.total_month, 4);
        assert_eq!(stats.by_action["started"], 2);
        assert_eq!(stats.by_action["deployed"], 2);
        assert_eq!(stats.by_resource["service"], 6);
        // 23h ago is the previous calendar day, 2h ago is today.
        assert_eq!(stats.timeline[6].count, 1);
        assert_eq!(stats.timeline[5].count, 1);
        assert_eq!(stats.timeline[3].count, 1);
    }

    #[test]
    fn top_actors_sorted_with_stable_ties() {
        let now = Utc::now();
        let items = vec![
            activity("zed", "x", now),
            activity("amy", "x", now),
            activity("bob", "x", now),
            activity("bob", "y", now),
        ];
        let stats = compute_stats(&items, now);
        let ids: Vec<&str> = stats.top_actors.iter().map(|a| a.actor_id.as_str()).collect();
        assert_eq!(ids, ["bob", "amy", "zed"]);
        assert_eq!(stats.top_actors[0].count, 2);
    }
}

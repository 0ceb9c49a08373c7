// Ingestion payload parsing. Each top-level slice is decoded on its own so one malformed
// slice never takes the others down with it.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::{ContainerInfo, ServiceMetrics, SystemMetrics};

/// Top-level state slice touched by an ingestion payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Slice {
    System,
    Containers,
    Services,
    Aggregate,
    LastUpdate,
    Connection,
}

/// What `TelemetryStore::ingest` did with a payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub applied: Vec<Slice>,
    /// Slices present but malformed; their previous values were kept.
    pub rejected: Vec<(Slice, String)>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    pub fn was_applied(&self, slice: Slice) -> bool {
        self.applied.contains(&slice)
    }

    fn reject(&mut self, slice: Slice, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(slice = ?slice, reason = %reason, "ingest: malformed slice ignored");
        self.rejected.push((slice, reason));
    }
}

/// Decoded payload; `None` means "no change for this slice".
#[derive(Debug, Default)]
pub(crate) struct ParsedPayload {
    pub system: Option<SystemMetrics>,
    pub containers: Option<Vec<ContainerInfo>>,
    pub services: Option<BTreeMap<String, ServiceMetrics>>,
    pub aggregate: Option<serde_json::Map<String, Value>>,
    pub last_update: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// `None` when the payload is not a JSON object at all.
pub(crate) fn parse_payload(raw: &Value, report: &mut IngestReport) -> Option<ParsedPayload> {
    let Some(obj) = raw.as_object() else {
        tracing::warn!("ingest: payload is not a JSON object, nothing applied");
        return None;
    };
    let mut parsed = ParsedPayload::default();

    if let Some(docker) = obj.get("docker") {
        match docker.as_object() {
            Some(docker) => {
                if let Some(v) = docker.get("containers") {
                    match serde_json::from_value::<Vec<ContainerInfo>>(v.clone()) {
                        Ok(containers) => parsed.containers = Some(containers),
                        Err(e) => report.reject(Slice::Containers, e.to_string()),
                    }
                }
                if let Some(v) = docker.get("system") {
                    match serde_json::from_value::<SystemMetrics>(v.clone()) {
                        Ok(system) => parsed.system = Some(system),
                        Err(e) => report.reject(Slice::System, e.to_string()),
                    }
                }
            }
            None => report.reject(Slice::Containers, "docker is not an object"),
        }
    }

    if let Some(v) = obj.get("services") {
        match serde_json::from_value::<BTreeMap<String, ServiceMetrics>>(v.clone()) {
            Ok(services) => parsed.services = Some(services),
            Err(e) => report.reject(Slice::Services, e.to_string()),
        }
    }

    if let Some(v) = obj.get("metrics") {
        match v.as_object() {
            Some(map) => parsed.aggregate = Some(map.clone()),
            None => report.reject(Slice::Aggregate, "metrics is not an object"),
        }
    }

    if let Some(v) = obj.get("lastUpdate") {
        match parse_timestamp(v) {
            Some(ts) => parsed.last_update = Some(ts),
            None => report.reject(Slice::LastUpdate, format!("unrecognized timestamp {v}")),
        }
    }

    match obj.get("error") {
        Some(Value::String(e)) if !e.is_empty() => parsed.error = Some(e.clone()),
        Some(Value::Null) | Some(Value::String(_)) | None => {}
        Some(other) => report.reject(Slice::Connection, format!("error is not a string: {other}")),
    }

    Some(parsed)
}

/// ISO-8601/RFC 3339 string or epoch milliseconds.
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

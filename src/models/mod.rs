// Domain models: telemetry slices, alerts, audit log rows and activities

mod activity;
mod alert;
mod container;
mod service;
mod system;

pub use activity::{
    Activity, ActivityStats, Actor, ActorCount, ActorType, AuditDetails, AuditLogItem,
    NewAuditEntry, Resource, TimelineBucket,
};
pub use alert::{Alert, AlertSeverity, NewAlert};
pub use container::{
    ContainerHealth, ContainerInfo, ContainerMemory, PortMapping, RunState, ServiceCategory,
};
pub use service::{HealthStatus, ServiceHealth, ServiceMetrics, ServiceStatus};
pub use system::{NetworkThroughput, SystemMetrics, UsageStats};

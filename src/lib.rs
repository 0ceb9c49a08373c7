// Library for tests to access modules

pub mod activity;
pub mod audit_repo;
pub mod config;
pub mod docker_repo;
pub mod error_reporting;
pub mod maintenance_worker;
pub mod models;
pub mod poller;
pub mod routes;
pub mod sysinfo_repo;
pub mod telemetry;
pub mod version;

pub mod config;
pub mod error;
pub mod ids;
pub mod platform;
pub mod telemetry;
pub mod tenancy;
pub mod workflows;

pub mod config;
pub mod division;
pub mod error;
pub mod telemetry;

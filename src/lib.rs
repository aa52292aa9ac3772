//! touchkeyd support library: configuration shared by the binary and tests

pub mod config;

pub use config::DriverConfig;

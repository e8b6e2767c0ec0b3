#![allow(clippy::result_large_err)]

pub mod app;
pub mod app_state;
pub mod config;
pub mod connectors;
pub mod error;
pub mod integration;
pub mod logging;
pub mod metrics;
pub mod probes;
pub mod readiness;
pub mod reporter;
pub mod retry;
pub mod runtime;
pub mod telemetry;

pub use error::{Error, Result};

//! Script Scheduler: stores user scripts, runs them on cron schedules or on
//! demand, and records every run.

#![allow(missing_docs)]

pub mod api;
pub mod app;
pub mod app_info;
pub mod boot;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod console;
pub mod database;
pub mod environment;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod recorder;
pub mod router;
pub mod sandbox;
pub mod schedule;
pub mod scheduling;
pub mod setup_tracing;
pub mod store;
pub mod templates;

#[cfg(any(test, feature = "test-utils"))]
pub mod tests;

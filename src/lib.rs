//! # hoursync
//!
//! Worklog ingestion and reconciliation engine.
//!
//! Pulls tracked time from heterogeneous external services (hour reports,
//! activity intervals, ticket worklog feeds), normalizes each record, links
//! it to an issue and an internal profile, and reconciles the batch against
//! the store so a date window converges to exactly what the sources report.

pub mod config;
pub mod dates;
pub mod engine;
pub mod error;
pub mod issue;
pub mod jira;
pub mod model;
pub mod source;
pub mod storage;

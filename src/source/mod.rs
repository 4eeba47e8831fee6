//! Worklog sources.
//!
//! A source fetches one report per date window and lowers it into
//! normalized [`RawEntry`](crate::model::RawEntry) tuples. Fetching is the
//! only remote step; `entries` is pure so normalization stays unit-testable.
//! Capability flags tell the reconciler which reconciliation policy and
//! account handling the source needs.

pub mod jira;
pub mod smon;
pub mod upwork;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::model::{RawEntry, ServiceType, WorklogSystem};

pub use jira::JiraSource;
pub use smon::SmonSource;
pub use upwork::UpworkSource;

/// One external time-tracking service.
#[async_trait]
pub trait WorklogSource {
    /// Raw report shape as fetched, before normalization.
    type Report: Send + Sync;

    fn system(&self) -> WorklogSystem;
    fn service_type(&self) -> ServiceType;

    /// Rebuild policy when true: the reconciler wipes the window before
    /// staging because the source has no stable row identity. False means
    /// diff policy (upsert by external id, then prune untouched rows).
    fn drop_old(&self) -> bool {
        false
    }

    /// Derive missing accounts from the report's author fields before
    /// staging (roster-derive behavior during a normal sync).
    fn autocreate_accounts(&self) -> bool {
        false
    }

    /// Fetch the report for an inclusive date window. `Ok(None)` means
    /// nothing to sync — the reconciler returns with zero effect.
    async fn fetch(&self, from: NaiveDate, to: NaiveDate) -> Result<Option<Self::Report>>;

    /// Lower the report into normalized entries. Restartable only by
    /// re-fetching.
    fn entries(&self, report: &Self::Report) -> Result<Vec<RawEntry>>;
}

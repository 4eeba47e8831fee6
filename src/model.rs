//! Core data model.
//!
//! A worklog is one unit of tracked time attributable to a user and a date.
//! It carries an optional stable identity from its source, an optional link
//! to an issue, and an optional link to an internal profile.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Which external time-tracking service a worklog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorklogSystem {
    Upwork,
    Smon,
    Jira,
}

impl WorklogSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            WorklogSystem::Upwork => "upwork",
            WorklogSystem::Smon => "smon",
            WorklogSystem::Jira => "jira",
        }
    }
}

impl std::fmt::Display for WorklogSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which external service an account uid belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Upwork,
    Smon,
    Jira,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::Upwork => "upwork",
            ServiceType::Smon => "smon",
            ServiceType::Jira => "jira",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which issue tracker an issue lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSystem {
    Jira,
}

impl IssueSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueSystem::Jira => "jira",
        }
    }
}

impl std::fmt::Display for IssueSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Row identifiers
// ---------------------------------------------------------------------------

/// Newtype for profile row ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub i64);

/// Newtype for issue row ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueId(pub i64);

/// Newtype for worklog row ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorklogId(pub i64);

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Internal user identity. Reference target for accounts and worklogs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub active: bool,
}

/// Binds an external service uid to a profile. Many accounts may map onto
/// one profile; `(service_type, uid)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub service_type: ServiceType,
    pub uid: String,
    pub profile_id: ProfileId,
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.service_type, self.uid)
    }
}

/// An issue-tracker ticket referenced by one or more worklogs.
/// `(system, key)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub system: IssueSystem,
    pub key: String,
    pub title: String,
    pub description: String,
    pub url: String,
    /// Original estimate in hours, when the tracker provides one.
    pub original_estimate: Option<f64>,
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.key, self.title)
    }
}

/// Remote issue metadata as returned by an issue tracker, before it is
/// persisted or merged into an [`Issue`].
#[derive(Debug, Clone)]
pub struct IssueData {
    pub title: String,
    pub description: String,
    pub url: String,
    pub original_estimate: Option<f64>,
}

/// Precise start/end instants of a tracked activity, when the source
/// records them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// One stored unit of tracked time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worklog {
    pub id: WorklogId,

    /// Stable identity from the source, when it provides one. Unique within
    /// its system; used for idempotent upsert.
    pub external_id: Option<String>,

    pub system: WorklogSystem,
    pub work_date: NaiveDate,
    pub user_id: String,
    pub user_name: String,
    pub hours: f64,
    pub memo: String,
    pub span: Option<TimeSpan>,

    /// Linked profile, null when no account matches the user id.
    pub profile: Option<ProfileId>,
    /// Linked issue, null when the memo carries no recognizable ticket.
    pub issue: Option<IssueId>,
}

impl std::fmt::Display for Worklog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}]{}: {}, {}/{}",
            self.id.0,
            self.external_id.as_deref().unwrap_or("-"),
            self.user_name,
            self.memo,
            self.work_date,
            self.hours
        )
    }
}

/// A worklog staged by the reconciler, before it has a row id.
#[derive(Debug, Clone)]
pub struct NewWorklog {
    pub external_id: Option<String>,
    pub system: WorklogSystem,
    pub work_date: NaiveDate,
    pub user_id: String,
    pub user_name: String,
    pub hours: f64,
    pub memo: String,
    pub span: Option<TimeSpan>,
    pub profile: Option<ProfileId>,
    pub issue: Option<IssueId>,
}

// ---------------------------------------------------------------------------
// Source entries
// ---------------------------------------------------------------------------

/// One normalized tuple from a source report, before account and issue
/// linkage. Every source variant lowers its rows into this shape.
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// Stable identity from the source. None for sources without row
    /// identity (they sync under the rebuild policy).
    pub external_id: Option<String>,
    pub user_id: String,
    pub user_name: String,
    pub work_date: NaiveDate,
    pub hours: f64,
    pub memo: String,
    pub span: Option<TimeSpan>,
}

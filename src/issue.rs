//! Ticket reference extraction and issue resolution.
//!
//! Worklog memos carry free text that may embed a ticket reference
//! (`[IOS-193] polish onboarding`). The resolver parses the reference,
//! looks the issue up in the store, and falls back to the remote tracker
//! to create or refresh it. Results are memoized for the lifetime of one
//! sync run so repeated references cost at most one remote round trip.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::model::{Issue, IssueData, IssueSystem};
use crate::storage::Storage;

/// Remote issue-tracker lookup. `Ok(None)` means the tracker answered but
/// the issue cannot be materialized (deleted, no access) — a genuine "not
/// creatable" outcome, distinct from a transport error.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn fetch_issue(&self, key: &str) -> Result<Option<IssueData>>;
}

/// Resolves ticket references to stored issues. One instance per sync run;
/// the cache is scoped to that run and never shared across runs.
pub struct IssueResolver<'a, T: IssueTracker> {
    tracker: &'a T,
    pattern: Option<Regex>,
    autoupdate: bool,
    cache: HashMap<(IssueSystem, String), Option<Issue>>,
}

impl<'a, T: IssueTracker> IssueResolver<'a, T> {
    /// Build a resolver for the given project-key prefixes. An empty key
    /// list parses nothing.
    pub fn new(tracker: &'a T, project_keys: &[String], autoupdate: bool) -> Result<Self> {
        let pattern = if project_keys.is_empty() {
            None
        } else {
            let alternation = project_keys
                .iter()
                .map(|k| format!("({}-\\d+)", regex::escape(k)))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                Regex::new(&format!("(?i){alternation}"))
                    .map_err(|e| Error::Config(format!("bad project key pattern: {e}")))?,
            )
        };

        Ok(Self {
            tracker,
            pattern,
            autoupdate,
            cache: HashMap::new(),
        })
    }

    /// Scan text for a ticket reference. Case-insensitive; the first match
    /// wins and is normalized to upper case. Prefixes outside the
    /// configured list never match.
    pub fn parse(&self, text: &str) -> Option<(IssueSystem, String)> {
        let pattern = self.pattern.as_ref()?;
        pattern
            .find(text)
            .map(|m| (IssueSystem::Jira, m.as_str().to_uppercase()))
    }

    /// Resolve the ticket referenced by `text`, if any.
    ///
    /// No recognizable reference is `Ok(None)`, not an error. On a cache
    /// miss the store is consulted first; a stored issue is refreshed from
    /// the tracker when `autoupdate` is set, an unknown one is fetched and
    /// persisted. The outcome — including "not creatable" — is cached for
    /// the remainder of the run.
    pub async fn resolve(&mut self, storage: &mut Storage, text: &str) -> Result<Option<Issue>> {
        let Some((system, key)) = self.parse(text) else {
            return Ok(None);
        };

        if let Some(cached) = self.cache.get(&(system, key.clone())) {
            debug!(issue = %key, "issue cache hit");
            return Ok(cached.clone());
        }

        let resolved = match storage.find_issue(system, &key)? {
            Some(existing) => {
                if self.autoupdate {
                    match self.tracker.fetch_issue(&key).await? {
                        Some(data) => {
                            storage.update_issue(existing.id, &data)?;
                            info!(issue = %key, "updated issue");
                            Some(Issue {
                                title: data.title,
                                description: data.description,
                                url: data.url,
                                original_estimate: data.original_estimate,
                                ..existing
                            })
                        }
                        // Remote no longer knows the issue; keep what we have.
                        None => Some(existing),
                    }
                } else {
                    Some(existing)
                }
            }
            None => match self.tracker.fetch_issue(&key).await? {
                Some(data) => {
                    let issue = storage.insert_issue(system, &key, &data)?;
                    info!(issue = %key, "created issue");
                    Some(issue)
                }
                None => None,
            },
        };

        self.cache.insert((system, key), resolved.clone());
        Ok(resolved)
    }

    /// Same contract as [`resolve`](Self::resolve), but any error is logged
    /// and converted to "no issue". Ticket-linking failure must never abort
    /// a sync.
    pub async fn resolve_failsafe(&mut self, storage: &mut Storage, text: &str) -> Option<Issue> {
        match self.resolve(storage, text).await {
            Ok(issue) => issue,
            Err(e) => {
                error!(error = %e, memo = text, "issue resolution failed");
                None
            }
        }
    }
}

//! Reconciliation engine. The public API for sync runs.
//!
//! One sync pulls a report from a source, normalizes every row, links it
//! to an account and an issue, and reconciles the batch into the store
//! under the source's policy:
//!
//! - **Rebuild** (no stable row identity): wipe the window up front, then
//!   insert everything staged. The window ends up equal to the fetch.
//! - **Diff** (stable identity): upsert by external id, then prune stored
//!   rows in the window that this run did not touch.
//!
//! Either way the store converges to exactly what the source reports for
//! the window, including deletions at the source. Runs are sequential;
//! callers must serialize concurrent syncs for the same (system, window).

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::Result;
use crate::issue::{IssueResolver, IssueTracker};
use crate::model::{Issue, NewWorklog, ServiceType, WorklogId};
use crate::source::WorklogSource;
use crate::storage::Storage;

/// The reconciliation engine. Owns the store and the issue tracker; the
/// sole writer of worklog rows.
pub struct Reconciler<T: IssueTracker> {
    storage: Storage,
    tracker: T,
    project_keys: Vec<String>,
    issue_autoupdate: bool,
}

impl<T: IssueTracker> Reconciler<T> {
    pub fn new(
        storage: Storage,
        tracker: T,
        project_keys: Vec<String>,
        issue_autoupdate: bool,
    ) -> Self {
        Self {
            storage,
            tracker,
            project_keys,
            issue_autoupdate,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut Storage {
        &mut self.storage
    }

    /// Sync one source for an inclusive date window. Returns the number of
    /// records staged.
    ///
    /// Only fetch failures propagate; account and issue linkage problems
    /// are absorbed per record. A fetch of zero rows still reconciles —
    /// that is how deletions at the source reach the store.
    pub async fn sync<S: WorklogSource>(
        &mut self,
        source: &S,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u64> {
        let system = source.system();

        let Some(report) = source.fetch(from, to).await? else {
            info!(%system, "nothing to sync");
            return Ok(0);
        };

        info!(%system, %from, %to, "syncing report");

        // Rebuild policy: clear the window before staging begins.
        if source.drop_old() {
            let removed = self.storage.delete_worklogs_in_window(system, from, to)?;
            info!(%system, removed, "cleared window for rebuild");
        }

        let entries = source.entries(&report)?;

        if source.autocreate_accounts() {
            create_accounts(
                &mut self.storage,
                source.service_type(),
                entries
                    .iter()
                    .map(|e| (e.user_id.as_str(), e.user_name.as_str())),
            )?;
        }

        // Per-run issue cache, never shared across runs.
        let mut resolver =
            IssueResolver::new(&self.tracker, &self.project_keys, self.issue_autoupdate)?;

        let mut staged: u64 = 0;
        let mut touched: HashSet<WorklogId> = HashSet::new();

        for entry in &entries {
            let account = self
                .storage
                .find_account(source.service_type(), &entry.user_id)?;
            if account.is_none() {
                warn!(%system, user_id = %entry.user_id, "no account for user, leaving profile unlinked");
            }

            let issue = resolver.resolve_failsafe(&mut self.storage, &entry.memo).await;

            // Sources occasionally return rows outside the asked-for
            // window; those are never persisted.
            if entry.work_date < from || entry.work_date > to {
                warn!(
                    %system,
                    user = %entry.user_name,
                    work_date = %entry.work_date,
                    "skipping record outside window"
                );
                continue;
            }

            // Negative hours mean a corrupt interval at the source.
            if entry.hours < 0.0 {
                warn!(
                    %system,
                    user = %entry.user_name,
                    hours = entry.hours,
                    "skipping record with negative hours"
                );
                continue;
            }

            let new = NewWorklog {
                external_id: entry.external_id.clone(),
                system,
                work_date: entry.work_date,
                user_id: entry.user_id.clone(),
                user_name: entry.user_name.clone(),
                hours: entry.hours,
                memo: entry.memo.clone(),
                span: entry.span,
                profile: account.map(|a| a.profile_id),
                issue: issue.map(|i| i.id),
            };

            // Duplicate external ids within one fetch: last write wins.
            let id = if new.external_id.is_some() {
                self.storage.upsert_worklog(&new)?
            } else {
                self.storage.insert_worklog(&new)?
            };

            info!(
                %system,
                worklog = id.0,
                user = %new.user_name,
                date = %new.work_date,
                hours = new.hours,
                "staged worklog"
            );

            touched.insert(id);
            staged += 1;
        }

        // Diff policy: prune stored rows in the window this run did not
        // reaffirm. Out-of-window fetched rows were skipped above and so
        // count as untouched here.
        if !source.drop_old() {
            let mut pruned = 0;
            for id in self.storage.worklog_ids_in_window(system, from, to)? {
                if !touched.contains(&id) {
                    self.storage.delete_worklog(id)?;
                    pruned += 1;
                }
            }
            if pruned > 0 {
                info!(%system, pruned, "pruned stale worklogs");
            }
        }

        info!(%system, staged, "synced worklogs");
        Ok(staged)
    }

    /// Roster-derive mode on this reconciler's store. See
    /// [`create_accounts_from_roster`].
    pub async fn create_accounts_from_roster<S: WorklogSource>(
        &mut self,
        source: &S,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u64> {
        create_accounts_from_roster(&mut self.storage, source, from, to).await
    }

    /// Resolve an issue from arbitrary text, outside a sync run. Uses a
    /// fresh cache; errors propagate to the caller.
    pub async fn resolve_issue(&mut self, text: &str) -> Result<Option<Issue>> {
        let mut resolver =
            IssueResolver::new(&self.tracker, &self.project_keys, self.issue_autoupdate)?;
        resolver.resolve(&mut self.storage, text).await
    }
}

/// Roster-derive mode: create missing profiles and accounts from a source's
/// user listing instead of recording worklogs. Idempotent. Needs no issue
/// tracker. Returns the number of accounts created.
pub async fn create_accounts_from_roster<S: WorklogSource>(
    storage: &mut Storage,
    source: &S,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<u64> {
    let Some(report) = source.fetch(from, to).await? else {
        return Ok(0);
    };

    let entries = source.entries(&report)?;
    create_accounts(
        storage,
        source.service_type(),
        entries
            .iter()
            .map(|e| (e.user_id.as_str(), e.user_name.as_str())),
    )
}

fn create_accounts<'e>(
    storage: &mut Storage,
    service_type: ServiceType,
    users: impl Iterator<Item = (&'e str, &'e str)>,
) -> Result<u64> {
    let mut created = 0;

    for (uid, name) in users {
        let (profile, profile_created) = storage.get_or_create_profile(name)?;
        if profile_created {
            info!(profile = %profile.name, "created profile");
        }

        let (account, account_created) =
            storage.get_or_create_account(service_type, uid, profile.id)?;
        if account_created {
            info!(account = %account, "created account");
            created += 1;
        }
    }

    Ok(created)
}

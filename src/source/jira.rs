//! Jira ticket-worklog-feed source.
//!
//! Walks the cursor-paginated "worklogs updated since" feed, resolves full
//! detail per page by id lookup, and pre-resolves each worklog's issue key
//! so the memo carries a parseable ticket reference. Rows keep the remote
//! worklog id as stable identity, so this source syncs under the diff
//! policy. The feed is assumed strictly chronological by `updated`; the
//! fetch stops at the first entry past the window's end boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::jira::{JiraClient, JiraWorklog, UpdatedWorklogRef};
use crate::model::{RawEntry, ServiceType, WorklogSystem};
use crate::source::WorklogSource;

/// Detail batch size accepted by the worklog list endpoint.
const DETAIL_CHUNK: usize = 1000;

pub struct JiraSource {
    client: JiraClient,
    autocreate_accounts: bool,
}

/// One feed row with its issue key already resolved.
#[derive(Debug, Clone)]
pub struct JiraReportRow {
    pub detail: JiraWorklog,
    pub issue_key: String,
}

impl JiraSource {
    pub fn new(client: JiraClient, autocreate_accounts: bool) -> Self {
        Self {
            client,
            autocreate_accounts,
        }
    }

    /// Walk the feed and collect worklog ids updated within the window.
    async fn collect_feed_ids(&self, since_ms: i64, end_ms: i64) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        let mut cursor = since_ms;

        loop {
            let page = self.client.updated_worklogs(cursor).await?;
            let stop = scan_page(&page.values, end_ms, &mut ids);
            debug!(cursor, collected = ids.len(), "scanned worklog feed page");

            if stop || page.last_page {
                break;
            }
            cursor = page
                .until
                .ok_or_else(|| Error::Fetch("jira feed page is missing its cursor".into()))?;
        }

        Ok(ids)
    }
}

/// Collect in-window ids from one feed page. Returns true once an entry's
/// updated timestamp passes the end boundary; the feed is strictly
/// chronological, so everything after it is out of window too.
fn scan_page(values: &[UpdatedWorklogRef], end_ms: i64, ids: &mut Vec<i64>) -> bool {
    for entry in values {
        if entry.updated_time >= end_ms {
            return true;
        }
        ids.push(entry.worklog_id);
    }
    false
}

#[async_trait]
impl WorklogSource for JiraSource {
    type Report = Vec<JiraReportRow>;

    fn system(&self) -> WorklogSystem {
        WorklogSystem::Jira
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Jira
    }

    fn autocreate_accounts(&self) -> bool {
        self.autocreate_accounts
    }

    async fn fetch(&self, from: NaiveDate, to: NaiveDate) -> Result<Option<Self::Report>> {
        let since_ms = start_of_day(from)?.timestamp_millis();
        let end_ms = start_of_day(
            to.checked_add_days(Days::new(1))
                .ok_or_else(|| Error::Other("date overflow".into()))?,
        )?
        .timestamp_millis();

        let ids = self.collect_feed_ids(since_ms, end_ms).await?;

        let mut rows = Vec::with_capacity(ids.len());
        let mut key_cache: HashMap<String, String> = HashMap::new();

        for chunk in ids.chunks(DETAIL_CHUNK) {
            for detail in self.client.worklog_details(chunk).await? {
                let issue_key = match key_cache.get(&detail.issue_id) {
                    Some(key) => key.clone(),
                    None => {
                        let issue = self.client.fetch_issue_raw(&detail.issue_id).await?;
                        let key = issue.key.ok_or_else(|| {
                            Error::Fetch(format!(
                                "jira issue {} has no key in detail lookup",
                                detail.issue_id
                            ))
                        })?;
                        key_cache.insert(detail.issue_id.clone(), key.clone());
                        key
                    }
                };

                rows.push(JiraReportRow { detail, issue_key });
            }
        }

        Ok(Some(rows))
    }

    fn entries(&self, report: &Self::Report) -> Result<Vec<RawEntry>> {
        report.iter().map(row_to_entry).collect()
    }
}

fn start_of_day(date: NaiveDate) -> Result<DateTime<Utc>> {
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

fn row_to_entry(row: &JiraReportRow) -> Result<RawEntry> {
    let updated = DateTime::parse_from_str(&row.detail.updated, "%Y-%m-%dT%H:%M:%S%.f%z")
        .map_err(|e| Error::Fetch(format!("bad jira timestamp {}: {e}", row.detail.updated)))?
        .with_timezone(&Utc);

    let mut memo = row.issue_key.clone();
    if let Some(comment) = &row.detail.comment {
        memo.push_str(": ");
        memo.push_str(comment);
    }

    Ok(RawEntry {
        external_id: Some(row.detail.id.clone()),
        user_id: row.detail.update_author.account_id.clone(),
        user_name: row.detail.update_author.display_name.clone(),
        work_date: updated.date_naive(),
        hours: row.detail.time_spent_seconds as f64 / 3600.0,
        memo,
        span: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jira::JiraAuthor;

    fn feed_ref(id: i64, updated_ms: i64) -> UpdatedWorklogRef {
        UpdatedWorklogRef {
            worklog_id: id,
            updated_time: updated_ms,
        }
    }

    #[test]
    fn scan_collects_until_window_end() {
        let mut ids = Vec::new();
        let stop = scan_page(
            &[feed_ref(1, 100), feed_ref(2, 200), feed_ref(3, 900)],
            500,
            &mut ids,
        );
        assert!(stop);
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn scan_continues_when_page_is_in_window() {
        let mut ids = Vec::new();
        let stop = scan_page(&[feed_ref(1, 100), feed_ref(2, 200)], 500, &mut ids);
        assert!(!stop);
        assert_eq!(ids, vec![1, 2]);
    }

    fn report_row(id: &str, comment: Option<&str>) -> JiraReportRow {
        JiraReportRow {
            detail: JiraWorklog {
                id: id.to_string(),
                issue_id: "10002".to_string(),
                update_author: JiraAuthor {
                    account_id: "acc-9".to_string(),
                    display_name: "Dana Dev".to_string(),
                },
                updated: "2024-03-04T12:30:00.000+0000".to_string(),
                time_spent_seconds: 5400,
                comment: comment.map(String::from),
            },
            issue_key: "IOS-193".to_string(),
        }
    }

    #[test]
    fn row_carries_stable_id_and_key_prefixed_memo() {
        let entry = row_to_entry(&report_row("100028", Some("wired up login"))).unwrap();

        assert_eq!(entry.external_id.as_deref(), Some("100028"));
        assert_eq!(entry.user_id, "acc-9");
        assert_eq!(entry.user_name, "Dana Dev");
        assert_eq!(entry.work_date, "2024-03-04".parse().unwrap());
        assert!((entry.hours - 1.5).abs() < 1e-9);
        assert_eq!(entry.memo, "IOS-193: wired up login");
    }

    #[test]
    fn memo_without_comment_is_just_the_key() {
        let entry = row_to_entry(&report_row("100028", None)).unwrap();
        assert_eq!(entry.memo, "IOS-193");
    }

    #[test]
    fn offset_timestamps_normalize_to_utc_date() {
        let mut row = report_row("1", None);
        // 01:30 at +03:00 is 22:30 the previous day in UTC
        row.detail.updated = "2024-03-05T01:30:00.000+0300".to_string();
        let entry = row_to_entry(&row).unwrap();
        assert_eq!(entry.work_date, "2024-03-04".parse().unwrap());
    }
}

//! Jira REST client.
//!
//! Two concerns share this client: issue metadata lookup for ticket
//! linking, and the paginated "worklogs updated since" feed consumed by
//! the Jira worklog source. Auth is HTTP basic per request.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::required_var;
use crate::error::{Error, Result};
use crate::issue::IssueTracker;
use crate::model::IssueData;

/// Jira connection settings.
#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    pub user: String,
    pub password: SecretString,
}

impl JiraConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: required_var("JIRA_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            user: required_var("JIRA_USER")?,
            password: SecretString::from(required_var("JIRA_PASSWORD")?),
        })
    }
}

#[derive(Clone)]
pub struct JiraClient {
    http: Client,
    config: JiraConfig,
}

impl std::fmt::Debug for JiraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraClient")
            .field("base_url", &self.config.base_url)
            .field("user", &self.config.user)
            .finish()
    }
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Browse URL for an issue key.
    pub fn issue_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.config.base_url, key)
    }

    /// Fetch raw issue metadata by key or numeric id.
    pub async fn fetch_issue_raw(&self, key: &str) -> Result<JiraIssue> {
        let url = format!("{}/rest/api/latest/issue/{}", self.config.base_url, key);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.user, Some(self.config.password.expose_secret()))
            .send()
            .await?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(Error::Fetch(format!(
                "jira issue lookup for {key} returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// One page of the "worklogs updated since" feed. `since` is an epoch
    /// timestamp in milliseconds; the page's `until` field is the cursor
    /// for the next request.
    pub async fn updated_worklogs(&self, since: i64) -> Result<UpdatedWorklogsPage> {
        let url = format!(
            "{}/rest/api/latest/worklog/updated",
            self.config.base_url
        );
        let response = self
            .http
            .get(&url)
            .query(&[("since", since)])
            .basic_auth(&self.config.user, Some(self.config.password.expose_secret()))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "jira worklog feed returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Resolve full worklog details for a batch of feed ids.
    pub async fn worklog_details(&self, ids: &[i64]) -> Result<Vec<JiraWorklog>> {
        let url = format!("{}/rest/api/latest/worklog/list", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .json(&WorklogListRequest { ids })
            .basic_auth(&self.config.user, Some(self.config.password.expose_secret()))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "jira worklog detail lookup returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    /// `Ok(None)` when the response carries no `fields` (unknown issue, no
    /// access) — the resolver caches that as "not creatable".
    async fn fetch_issue(&self, key: &str) -> Result<Option<IssueData>> {
        let issue = self.fetch_issue_raw(key).await?;

        let Some(fields) = issue.fields else {
            return Ok(None);
        };

        Ok(Some(IssueData {
            title: fields.summary,
            description: fields.description.unwrap_or_default(),
            url: self.issue_url(key),
            original_estimate: fields
                .timetracking
                .and_then(|tt| tt.original_estimate_seconds)
                .map(|secs| secs as f64 / 3600.0),
        }))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssue {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub fields: Option<JiraIssueFields>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssueFields {
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timetracking: Option<JiraTimeTracking>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraTimeTracking {
    #[serde(default)]
    pub original_estimate_seconds: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedWorklogsPage {
    pub values: Vec<UpdatedWorklogRef>,
    pub last_page: bool,
    /// Cursor for the next page (epoch milliseconds).
    #[serde(default)]
    pub until: Option<i64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedWorklogRef {
    pub worklog_id: i64,
    pub updated_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraWorklog {
    pub id: String,
    pub issue_id: String,
    pub update_author: JiraAuthor,
    /// RFC 3339-ish timestamp with milliseconds and numeric offset.
    pub updated: String,
    pub time_spent_seconds: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraAuthor {
    pub account_id: String,
    pub display_name: String,
}

#[derive(Serialize)]
struct WorklogListRequest<'a> {
    ids: &'a [i64],
}

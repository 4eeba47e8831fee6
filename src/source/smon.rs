//! Screenshot-monitor activity-interval source.
//!
//! One batched query covers every known account uid; each activity is a
//! precise `[from, to)` instant range. Hours are derived from the range.
//! No stable row identity, so this source syncs under the rebuild policy.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::required_var;
use crate::error::{Error, Result};
use crate::model::{RawEntry, ServiceType, TimeSpan, WorklogSystem};
use crate::source::WorklogSource;

#[derive(Debug, Clone)]
pub struct SmonConfig {
    pub base_url: String,
    pub token: SecretString,
}

impl SmonConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: std::env::var("SMON_BASE_URL")
                .unwrap_or_else(|_| "https://screenshotmonitor.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            token: SecretString::from(required_var("SMON_TOKEN")?),
        })
    }
}

pub struct SmonSource {
    http: Client,
    config: SmonConfig,
    /// Known account uids for this service; one query covers all of them.
    uids: Vec<String>,
}

impl SmonSource {
    pub fn new(config: SmonConfig, uids: Vec<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { http, config, uids })
    }
}

#[async_trait]
impl WorklogSource for SmonSource {
    type Report = Vec<SmonActivity>;

    fn system(&self) -> WorklogSystem {
        WorklogSystem::Smon
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Smon
    }

    fn drop_old(&self) -> bool {
        true
    }

    async fn fetch(&self, from: NaiveDate, to: NaiveDate) -> Result<Option<Self::Report>> {
        if self.uids.is_empty() {
            warn!("no smon accounts configured, nothing to sync");
            return Ok(None);
        }

        let from_ts = start_of_day(from)?.timestamp();
        // Exclusive upper bound: start of the day after the window.
        let to_ts = start_of_day(
            to.checked_add_days(Days::new(1))
                .ok_or_else(|| Error::Other("date overflow".into()))?,
        )?
        .timestamp();

        let body: Vec<ActivityQuery> = self
            .uids
            .iter()
            .map(|uid| ActivityQuery {
                employment_id: uid.clone(),
                from: from_ts,
                to: to_ts,
            })
            .collect();

        let url = format!("{}/api/v2/GetActivities", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .header("X-SSM-Token", self.config.token.expose_secret())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "smon activity query returned {}",
                response.status()
            )));
        }

        Ok(Some(response.json().await?))
    }

    fn entries(&self, report: &Self::Report) -> Result<Vec<RawEntry>> {
        report.iter().map(activity_to_entry).collect()
    }
}

fn start_of_day(date: NaiveDate) -> Result<DateTime<Utc>> {
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

fn activity_to_entry(activity: &SmonActivity) -> Result<RawEntry> {
    let from = DateTime::<Utc>::from_timestamp(activity.from, 0)
        .ok_or_else(|| Error::Fetch(format!("bad smon timestamp: {}", activity.from)))?;
    let to = DateTime::<Utc>::from_timestamp(activity.to, 0)
        .ok_or_else(|| Error::Fetch(format!("bad smon timestamp: {}", activity.to)))?;

    Ok(RawEntry {
        external_id: None,
        user_id: activity.employment_id.clone(),
        // The activity feed carries no display name.
        user_name: String::new(),
        work_date: from.date_naive(),
        hours: (activity.to - activity.from) as f64 / 3600.0,
        memo: activity.note.clone().unwrap_or_default(),
        span: Some(TimeSpan { from, to }),
    })
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivityQuery {
    employment_id: String,
    from: i64,
    to: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmonActivity {
    pub employment_id: String,
    /// Epoch seconds.
    pub from: i64,
    /// Epoch seconds, exclusive.
    pub to: i64,
    #[serde(default)]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_maps_to_span_and_hours() {
        // 2024-03-04 09:00:00 UTC .. 10:30:00 UTC
        let entry = activity_to_entry(&SmonActivity {
            employment_id: "emp-7".into(),
            from: 1_709_542_800,
            to: 1_709_548_200,
            note: Some("WEB-42 review".into()),
        })
        .unwrap();

        assert_eq!(entry.user_id, "emp-7");
        assert_eq!(entry.user_name, "");
        assert_eq!(entry.work_date, "2024-03-04".parse().unwrap());
        assert!((entry.hours - 1.5).abs() < 1e-9);
        assert_eq!(entry.memo, "WEB-42 review");

        let span = entry.span.unwrap();
        assert_eq!(span.to - span.from, chrono::Duration::minutes(90));
    }

    #[test]
    fn missing_note_becomes_empty_memo() {
        let entry = activity_to_entry(&SmonActivity {
            employment_id: "emp-7".into(),
            from: 1_709_542_800,
            to: 1_709_546_400,
            note: None,
        })
        .unwrap();
        assert_eq!(entry.memo, "");
    }
}

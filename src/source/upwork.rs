//! Upwork hour-report source.
//!
//! One remote query returns a column table for the whole window, hours
//! already aggregated per user and day. Rows have no stable identity, so
//! this source syncs under the rebuild policy.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::config::required_var;
use crate::error::{Error, Result};
use crate::model::{RawEntry, ServiceType, WorklogSystem};
use crate::source::WorklogSource;

#[derive(Debug, Clone)]
pub struct UpworkConfig {
    pub base_url: String,
    pub company_id: String,
    pub team_id: String,
    pub access_token: SecretString,
}

impl UpworkConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: std::env::var("UPWORK_BASE_URL")
                .unwrap_or_else(|_| "https://www.upwork.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            company_id: required_var("UPWORK_COMPANY_ID")?,
            team_id: required_var("UPWORK_TEAM_ID")?,
            access_token: SecretString::from(required_var("UPWORK_ACCESS_TOKEN")?),
        })
    }
}

pub struct UpworkSource {
    http: Client,
    config: UpworkConfig,
}

impl UpworkSource {
    pub fn new(config: UpworkConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl WorklogSource for UpworkSource {
    type Report = UpworkReport;

    fn system(&self) -> WorklogSystem {
        WorklogSystem::Upwork
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Upwork
    }

    fn drop_old(&self) -> bool {
        true
    }

    async fn fetch(&self, from: NaiveDate, to: NaiveDate) -> Result<Option<Self::Report>> {
        let query = format!(
            "SELECT worked_on, provider_id, provider_name, sum(hours), memo \
             WHERE worked_on >= '{}' AND worked_on <= '{}'",
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
        );

        let url = format!(
            "{}/gds/timereports/v1/companies/{}/teams/{}/hours",
            self.config.base_url, self.config.company_id, self.config.team_id,
        );

        let response = self
            .http
            .get(&url)
            .query(&[("tq", query.as_str()), ("tqx", "out:json")])
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "upwork report query returned {}",
                response.status()
            )));
        }

        let report: UpworkReport = response.json().await?;

        // Absent status means success.
        if let Some(status) = &report.status {
            if status != "success" {
                return Err(Error::Fetch(format!("upwork report status: {status}")));
            }
        }

        Ok(Some(report))
    }

    fn entries(&self, report: &Self::Report) -> Result<Vec<RawEntry>> {
        report.table.rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &UpworkRow) -> Result<RawEntry> {
    let work_date = NaiveDate::parse_from_str(row.col(0)?, "%Y%m%d")
        .map_err(|e| Error::Fetch(format!("bad upwork date: {e}")))?;
    let hours: f64 = row
        .col(3)?
        .parse()
        .map_err(|e| Error::Fetch(format!("bad upwork hours: {e}")))?;

    let mut memo = row.col(4)?.to_string();
    if memo == "No memo" {
        memo = String::new();
    }

    Ok(RawEntry {
        external_id: None,
        user_id: row.col(1)?.to_string(),
        user_name: row.col(2)?.to_string(),
        work_date,
        hours,
        memo,
        span: None,
    })
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Report payload. Rows arrive as positional cells:
///
/// ```json
/// {"c": [{"v": "20170307"}, {"v": "uid"}, {"v": "Full Name"},
///        {"v": "8.833333"}, {"v": "memo text"}]}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct UpworkReport {
    #[serde(default)]
    pub status: Option<String>,
    pub table: UpworkTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpworkTable {
    #[serde(default)]
    pub rows: Vec<UpworkRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpworkRow {
    pub c: Vec<UpworkCell>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpworkCell {
    pub v: String,
}

impl UpworkRow {
    fn col(&self, index: usize) -> Result<&str> {
        self.c
            .get(index)
            .map(|cell| cell.v.as_str())
            .ok_or_else(|| Error::Fetch(format!("upwork row is missing column {index}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> UpworkRow {
        UpworkRow {
            c: cells
                .iter()
                .map(|v| UpworkCell { v: v.to_string() })
                .collect(),
        }
    }

    #[test]
    fn row_normalizes_date_and_hours() {
        let entry = row_to_entry(&row(&[
            "20240304",
            "dana42",
            "Dana Dev",
            "8.833333",
            "IOS-193 polish",
        ]))
        .unwrap();

        assert_eq!(entry.external_id, None);
        assert_eq!(entry.work_date, "2024-03-04".parse().unwrap());
        assert_eq!(entry.user_id, "dana42");
        assert_eq!(entry.user_name, "Dana Dev");
        assert!((entry.hours - 8.833333).abs() < 1e-9);
        assert_eq!(entry.memo, "IOS-193 polish");
        assert!(entry.span.is_none());
    }

    #[test]
    fn no_memo_placeholder_becomes_empty() {
        let entry =
            row_to_entry(&row(&["20240304", "dana42", "Dana Dev", "1.0", "No memo"])).unwrap();
        assert_eq!(entry.memo, "");
    }

    #[test]
    fn short_row_is_a_fetch_error() {
        let err = row_to_entry(&row(&["20240304", "dana42"])).unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }
}

//! SQLite storage layer.
//!
//! Single source of truth for profiles, accounts, issues, and worklogs.
//! Enums are stored as TEXT names, timestamps as RFC 3339, dates as
//! `YYYY-MM-DD` (lexicographic order matches date order for range scans).
//! The reconciler is the only writer of worklog rows.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{Error, Result};
use crate::model::*;

/// Storage backend. Owns the SQLite connection.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    fn init(&self) -> Result<()> {
        // WAL mode for concurrent readers
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS profiles (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                active      INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_profile_name ON profiles(name);

            CREATE TABLE IF NOT EXISTS accounts (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                service_type    TEXT NOT NULL,
                uid             TEXT NOT NULL,
                profile_id      INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                UNIQUE (service_type, uid)
            );

            CREATE TABLE IF NOT EXISTS issues (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                issue_system        TEXT NOT NULL,
                issue_key           TEXT NOT NULL,
                title               TEXT NOT NULL,
                description         TEXT NOT NULL DEFAULT '',
                url                 TEXT NOT NULL DEFAULT '',
                original_estimate   REAL,
                UNIQUE (issue_system, issue_key)
            );

            CREATE TABLE IF NOT EXISTS worklogs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id     TEXT,
                system          TEXT NOT NULL,
                work_date       TEXT NOT NULL,
                user_id         TEXT NOT NULL,
                user_name       TEXT NOT NULL,
                hours           REAL NOT NULL DEFAULT 0,
                memo            TEXT NOT NULL DEFAULT '',
                from_ts         TEXT,
                to_ts           TEXT,
                profile_id      INTEGER REFERENCES profiles(id) ON DELETE SET NULL,
                issue_id        INTEGER REFERENCES issues(id) ON DELETE SET NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_worklog_external
                ON worklogs(system, external_id) WHERE external_id IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_worklog_window ON worklogs(system, work_date);
            ",
        )?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    /// Get a profile by name, creating it if absent. Returns the profile
    /// and whether it was created.
    pub fn get_or_create_profile(&mut self, name: &str) -> Result<(Profile, bool)> {
        let existing: Option<Profile> = self
            .conn
            .query_row(
                "SELECT id, name, active FROM profiles WHERE name = ?1 LIMIT 1",
                params![name],
                row_to_profile,
            )
            .optional()?;

        if let Some(profile) = existing {
            return Ok((profile, false));
        }

        self.conn.execute(
            "INSERT INTO profiles (name, active) VALUES (?1, 1)",
            params![name],
        )?;
        let id = self.conn.last_insert_rowid();

        Ok((
            Profile {
                id: ProfileId(id),
                name: name.to_string(),
                active: true,
            },
            true,
        ))
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Look up the account bound to `(service_type, uid)`. Absence is not
    /// an error, only a missing linkage.
    pub fn find_account(&self, service_type: ServiceType, uid: &str) -> Result<Option<Account>> {
        self.conn
            .query_row(
                "SELECT service_type, uid, profile_id FROM accounts
                 WHERE service_type = ?1 AND uid = ?2",
                params![service_type.as_str(), uid],
                row_to_account,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Bind `(service_type, uid)` to a profile, unless already bound.
    /// Returns the account and whether it was created.
    pub fn get_or_create_account(
        &mut self,
        service_type: ServiceType,
        uid: &str,
        profile_id: ProfileId,
    ) -> Result<(Account, bool)> {
        if let Some(account) = self.find_account(service_type, uid)? {
            return Ok((account, false));
        }

        self.conn.execute(
            "INSERT INTO accounts (service_type, uid, profile_id) VALUES (?1, ?2, ?3)",
            params![service_type.as_str(), uid, profile_id.0],
        )?;

        Ok((
            Account {
                service_type,
                uid: uid.to_string(),
                profile_id,
            },
            true,
        ))
    }

    /// All known uids for a service, for sources that query per account.
    pub fn account_uids(&self, service_type: ServiceType) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uid FROM accounts WHERE service_type = ?1 ORDER BY uid")?;

        let uids = stmt
            .query_map(params![service_type.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(uids)
    }

    // -----------------------------------------------------------------------
    // Issues
    // -----------------------------------------------------------------------

    pub fn find_issue(&self, system: IssueSystem, key: &str) -> Result<Option<Issue>> {
        self.conn
            .query_row(
                "SELECT id, issue_system, issue_key, title, description, url, original_estimate
                 FROM issues WHERE issue_system = ?1 AND issue_key = ?2",
                params![system.as_str(), key],
                row_to_issue,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn insert_issue(
        &mut self,
        system: IssueSystem,
        key: &str,
        data: &IssueData,
    ) -> Result<Issue> {
        self.conn.execute(
            "INSERT INTO issues (issue_system, issue_key, title, description, url, original_estimate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                system.as_str(),
                key,
                data.title,
                data.description,
                data.url,
                data.original_estimate,
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        Ok(Issue {
            id: IssueId(id),
            system,
            key: key.to_string(),
            title: data.title.clone(),
            description: data.description.clone(),
            url: data.url.clone(),
            original_estimate: data.original_estimate,
        })
    }

    /// Refresh a stored issue's title, description, url, and estimate.
    pub fn update_issue(&mut self, id: IssueId, data: &IssueData) -> Result<()> {
        self.conn.execute(
            "UPDATE issues SET title = ?1, description = ?2, url = ?3, original_estimate = ?4
             WHERE id = ?5",
            params![
                data.title,
                data.description,
                data.url,
                data.original_estimate,
                id.0
            ],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Worklogs
    // -----------------------------------------------------------------------

    /// Insert a worklog with no stable identity. Always creates a new row.
    pub fn insert_worklog(&mut self, new: &NewWorklog) -> Result<WorklogId> {
        self.conn.execute(
            "INSERT INTO worklogs (
                external_id, system, work_date, user_id, user_name,
                hours, memo, from_ts, to_ts, profile_id, issue_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                new.external_id,
                new.system.as_str(),
                new.work_date.to_string(),
                new.user_id,
                new.user_name,
                new.hours,
                new.memo,
                new.span.map(|s| s.from.to_rfc3339()),
                new.span.map(|s| s.to.to_rfc3339()),
                new.profile.map(|p| p.0),
                new.issue.map(|i| i.0),
            ],
        )?;
        Ok(WorklogId(self.conn.last_insert_rowid()))
    }

    /// Insert or update a worklog keyed by `(system, external_id)`.
    /// Returns the row id whether inserted or updated.
    pub fn upsert_worklog(&mut self, new: &NewWorklog) -> Result<WorklogId> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO worklogs (
                external_id, system, work_date, user_id, user_name,
                hours, memo, from_ts, to_ts, profile_id, issue_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (system, external_id) WHERE external_id IS NOT NULL DO UPDATE SET
                work_date = excluded.work_date,
                user_id = excluded.user_id,
                user_name = excluded.user_name,
                hours = excluded.hours,
                memo = excluded.memo,
                from_ts = excluded.from_ts,
                to_ts = excluded.to_ts,
                profile_id = excluded.profile_id,
                issue_id = excluded.issue_id
            RETURNING id",
            params![
                new.external_id,
                new.system.as_str(),
                new.work_date.to_string(),
                new.user_id,
                new.user_name,
                new.hours,
                new.memo,
                new.span.map(|s| s.from.to_rfc3339()),
                new.span.map(|s| s.to.to_rfc3339()),
                new.profile.map(|p| p.0),
                new.issue.map(|i| i.0),
            ],
            |row| row.get(0),
        )?;
        Ok(WorklogId(id))
    }

    /// Row ids of every stored worklog for `(system, [from, to])`.
    pub fn worklog_ids_in_window(
        &self,
        system: WorklogSystem,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WorklogId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM worklogs
             WHERE system = ?1 AND work_date >= ?2 AND work_date <= ?3",
        )?;

        let ids = stmt
            .query_map(
                params![system.as_str(), from.to_string(), to.to_string()],
                |row| row.get(0).map(WorklogId),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ids)
    }

    /// Delete every stored worklog for `(system, [from, to])`. Returns the
    /// number of rows removed. First step of the rebuild policy.
    pub fn delete_worklogs_in_window(
        &mut self,
        system: WorklogSystem,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM worklogs
             WHERE system = ?1 AND work_date >= ?2 AND work_date <= ?3",
            params![system.as_str(), from.to_string(), to.to_string()],
        )?;
        Ok(n)
    }

    pub fn delete_worklog(&mut self, id: WorklogId) -> Result<()> {
        self.conn
            .execute("DELETE FROM worklogs WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    /// Stored worklogs for `(system, [from, to])`, ordered by date then id.
    pub fn worklogs_in_window(
        &self,
        system: WorklogSystem,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Worklog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, external_id, system, work_date, user_id, user_name,
                    hours, memo, from_ts, to_ts, profile_id, issue_id
             FROM worklogs
             WHERE system = ?1 AND work_date >= ?2 AND work_date <= ?3
             ORDER BY work_date ASC, id ASC",
        )?;

        let logs = stmt
            .query_map(
                params![system.as_str(), from.to_string(), to.to_string()],
                row_to_worklog,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(logs)
    }
}

// ---------------------------------------------------------------------------
// Row parsing helpers
// ---------------------------------------------------------------------------

fn row_to_profile(row: &Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: ProfileId(row.get(0)?),
        name: row.get(1)?,
        active: row.get::<_, i64>(2)? != 0,
    })
}

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        service_type: parse_service_type(&row.get::<_, String>(0)?)
            .map_err(|e| bad_column(0, e))?,
        uid: row.get(1)?,
        profile_id: ProfileId(row.get(2)?),
    })
}

fn row_to_issue(row: &Row) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: IssueId(row.get(0)?),
        system: parse_issue_system(&row.get::<_, String>(1)?).map_err(|e| bad_column(1, e))?,
        key: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        url: row.get(5)?,
        original_estimate: row.get(6)?,
    })
}

fn row_to_worklog(row: &Row) -> rusqlite::Result<Worklog> {
    let work_date: String = row.get(3)?;
    let from_ts: Option<String> = row.get(8)?;
    let to_ts: Option<String> = row.get(9)?;

    let span = match (parse_ts(from_ts.as_deref()), parse_ts(to_ts.as_deref())) {
        (Some(from), Some(to)) => Some(TimeSpan { from, to }),
        _ => None,
    };

    Ok(Worklog {
        id: WorklogId(row.get(0)?),
        external_id: row.get(1)?,
        system: parse_worklog_system(&row.get::<_, String>(2)?).map_err(|e| bad_column(2, e))?,
        work_date: work_date
            .parse()
            .map_err(|e: chrono::ParseError| bad_column(3, e.to_string()))?,
        user_id: row.get(4)?,
        user_name: row.get(5)?,
        hours: row.get(6)?,
        memo: row.get(7)?,
        span,
        profile: row.get::<_, Option<i64>>(10)?.map(ProfileId),
        issue: row.get::<_, Option<i64>>(11)?.map(IssueId),
    })
}

fn parse_ts(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_service_type(s: &str) -> std::result::Result<ServiceType, String> {
    match s {
        "upwork" => Ok(ServiceType::Upwork),
        "smon" => Ok(ServiceType::Smon),
        "jira" => Ok(ServiceType::Jira),
        _ => Err(format!("unknown service type: {s}")),
    }
}

fn parse_worklog_system(s: &str) -> std::result::Result<WorklogSystem, String> {
    match s {
        "upwork" => Ok(WorklogSystem::Upwork),
        "smon" => Ok(WorklogSystem::Smon),
        "jira" => Ok(WorklogSystem::Jira),
        _ => Err(format!("unknown worklog system: {s}")),
    }
}

fn parse_issue_system(s: &str) -> std::result::Result<IssueSystem, String> {
    match s {
        "jira" => Ok(IssueSystem::Jira),
        _ => Err(format!("unknown issue system: {s}")),
    }
}

fn bad_column(index: usize, message: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        message.to_string().into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn new_worklog(system: WorklogSystem, external_id: Option<&str>, day: &str) -> NewWorklog {
        NewWorklog {
            external_id: external_id.map(String::from),
            system,
            work_date: date(day),
            user_id: "u1".into(),
            user_name: "User One".into(),
            hours: 4.0,
            memo: "stuff".into(),
            span: None,
            profile: None,
            issue: None,
        }
    }

    #[test]
    fn upsert_by_external_id_updates_in_place() {
        let mut storage = Storage::in_memory().unwrap();

        let mut new = new_worklog(WorklogSystem::Jira, Some("w-1"), "2024-03-04");
        let first = storage.upsert_worklog(&new).unwrap();

        new.hours = 6.5;
        let second = storage.upsert_worklog(&new).unwrap();
        assert_eq!(first, second);

        let stored = storage
            .worklogs_in_window(WorklogSystem::Jira, date("2024-03-04"), date("2024-03-04"))
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].hours, 6.5);
    }

    #[test]
    fn same_external_id_in_different_systems_does_not_collide() {
        let mut storage = Storage::in_memory().unwrap();

        storage
            .upsert_worklog(&new_worklog(WorklogSystem::Jira, Some("w-1"), "2024-03-04"))
            .unwrap();
        storage
            .upsert_worklog(&new_worklog(
                WorklogSystem::Upwork,
                Some("w-1"),
                "2024-03-04",
            ))
            .unwrap();

        let jira = storage
            .worklogs_in_window(WorklogSystem::Jira, date("2024-03-04"), date("2024-03-04"))
            .unwrap();
        let upwork = storage
            .worklogs_in_window(WorklogSystem::Upwork, date("2024-03-04"), date("2024-03-04"))
            .unwrap();
        assert_eq!(jira.len(), 1);
        assert_eq!(upwork.len(), 1);
    }

    #[test]
    fn window_delete_is_scoped_to_system_and_range() {
        let mut storage = Storage::in_memory().unwrap();

        storage
            .insert_worklog(&new_worklog(WorklogSystem::Upwork, None, "2024-03-04"))
            .unwrap();
        storage
            .insert_worklog(&new_worklog(WorklogSystem::Upwork, None, "2024-03-11"))
            .unwrap();
        storage
            .insert_worklog(&new_worklog(WorklogSystem::Smon, None, "2024-03-04"))
            .unwrap();

        let removed = storage
            .delete_worklogs_in_window(WorklogSystem::Upwork, date("2024-03-04"), date("2024-03-08"))
            .unwrap();
        assert_eq!(removed, 1);

        let upwork = storage
            .worklogs_in_window(WorklogSystem::Upwork, date("2024-03-01"), date("2024-03-31"))
            .unwrap();
        assert_eq!(upwork.len(), 1);
        assert_eq!(upwork[0].work_date, date("2024-03-11"));

        let smon = storage
            .worklogs_in_window(WorklogSystem::Smon, date("2024-03-01"), date("2024-03-31"))
            .unwrap();
        assert_eq!(smon.len(), 1);
    }

    #[test]
    fn get_or_create_account_is_idempotent() {
        let mut storage = Storage::in_memory().unwrap();

        let (profile, created) = storage.get_or_create_profile("Dana").unwrap();
        assert!(created);
        let (_, created) = storage.get_or_create_profile("Dana").unwrap();
        assert!(!created);

        let (_, created) = storage
            .get_or_create_account(ServiceType::Upwork, "dana42", profile.id)
            .unwrap();
        assert!(created);
        let (account, created) = storage
            .get_or_create_account(ServiceType::Upwork, "dana42", profile.id)
            .unwrap();
        assert!(!created);
        assert_eq!(account.profile_id, profile.id);
    }

    #[test]
    fn span_round_trips_through_storage() {
        let mut storage = Storage::in_memory().unwrap();

        let span = TimeSpan {
            from: "2024-03-04T09:00:00Z".parse().unwrap(),
            to: "2024-03-04T11:30:00Z".parse().unwrap(),
        };
        let mut new = new_worklog(WorklogSystem::Smon, None, "2024-03-04");
        new.span = Some(span);
        storage.insert_worklog(&new).unwrap();

        let stored = storage
            .worklogs_in_window(WorklogSystem::Smon, date("2024-03-04"), date("2024-03-04"))
            .unwrap();
        assert_eq!(stored[0].span, Some(span));
    }
}

//! Date-window resolution for sync runs.
//!
//! Syncs always operate on an inclusive `[from, to]` date window. The CLI
//! exposes the same shorthand the scheduler uses: today, yesterday, this
//! week so far, the previous full week, or the last N days.

use chrono::{Datelike, Duration, NaiveDate};

/// Inclusive date window a sync operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// How the caller described the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    Today,
    Yesterday,
    /// Monday of the current week through today.
    ThisWeek,
    /// Monday through Sunday of the previous week.
    PrevWeek,
    /// The last N days ending today (N >= 1).
    LastDays(u32),
    /// Explicit bounds; either side defaults to today.
    Range {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

impl WindowSpec {
    /// Resolve the spec against a reference date (normally today).
    pub fn resolve(self, today: NaiveDate) -> DateWindow {
        let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);

        match self {
            WindowSpec::Today => DateWindow {
                from: today,
                to: today,
            },
            WindowSpec::Yesterday => {
                let yesterday = today - Duration::days(1);
                DateWindow {
                    from: yesterday,
                    to: yesterday,
                }
            }
            WindowSpec::ThisWeek => DateWindow {
                from: monday,
                to: today,
            },
            WindowSpec::PrevWeek => DateWindow {
                from: monday - Duration::days(7),
                to: monday - Duration::days(1),
            },
            WindowSpec::LastDays(n) => DateWindow {
                from: today - Duration::days(n.max(1) as i64 - 1),
                to: today,
            },
            WindowSpec::Range { from, to } => DateWindow {
                from: from.unwrap_or(today),
                to: to.unwrap_or(today),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-06 is a Wednesday
    fn today() -> NaiveDate {
        "2024-03-06".parse().unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn today_and_yesterday() {
        let w = WindowSpec::Today.resolve(today());
        assert_eq!(w.from, today());
        assert_eq!(w.to, today());

        let w = WindowSpec::Yesterday.resolve(today());
        assert_eq!(w.from, date("2024-03-05"));
        assert_eq!(w.to, date("2024-03-05"));
    }

    #[test]
    fn this_week_starts_monday() {
        let w = WindowSpec::ThisWeek.resolve(today());
        assert_eq!(w.from, date("2024-03-04"));
        assert_eq!(w.to, today());
    }

    #[test]
    fn prev_week_is_monday_through_sunday() {
        let w = WindowSpec::PrevWeek.resolve(today());
        assert_eq!(w.from, date("2024-02-26"));
        assert_eq!(w.to, date("2024-03-03"));
    }

    #[test]
    fn last_days_includes_today() {
        let w = WindowSpec::LastDays(7).resolve(today());
        assert_eq!(w.from, date("2024-02-29"));
        assert_eq!(w.to, today());

        // N = 1 degenerates to today
        let w = WindowSpec::LastDays(1).resolve(today());
        assert_eq!(w.from, today());
    }

    #[test]
    fn range_defaults_open_sides_to_today() {
        let w = WindowSpec::Range {
            from: Some(date("2024-03-01")),
            to: None,
        }
        .resolve(today());
        assert_eq!(w.from, date("2024-03-01"));
        assert_eq!(w.to, today());
    }
}

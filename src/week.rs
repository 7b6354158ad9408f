use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc, Weekday};
use regex::Regex;

use crate::error::{Error, Result};

static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-[Ww](\d{1,2})$").unwrap());

/// A Monday-based calendar week, evaluated in UTC.
///
/// The week covers `[start, end)`: Monday 00:00 inclusive through the
/// following Monday 00:00 exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Week {
    monday: NaiveDate,
}

impl Week {
    /// The week that contains `instant`.
    pub fn containing(instant: DateTime<Utc>) -> Self {
        let day = instant.date_naive();
        let offset = day.weekday().num_days_from_monday() as u64;
        // Only the first days of the calendar lack a Monday to step back to.
        let monday = day.checked_sub_days(Days::new(offset)).unwrap_or(NaiveDate::MIN);
        Self { monday }
    }

    /// ISO week `week` of ISO year `year`, if it exists.
    pub fn from_iso(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|monday| Self { monday })
    }

    /// Parse a week string.
    ///
    /// Supported formats:
    /// - `2025-W05` / `2025-W5` — ISO week
    /// - `this` — the week containing `now`
    /// - `last` — the week before that
    pub fn parse(s: &str, now: DateTime<Utc>) -> Result<Self> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "this" | "current" => return Ok(Self::containing(now)),
            "last" | "previous" => {
                return Self::containing(now)
                    .previous()
                    .ok_or_else(|| Error::WeekParse(format!("no week before {s}")))
            }
            _ => {}
        }

        if let Some(caps) = RE_WEEK.captures(s) {
            let year: i32 = caps[1]
                .parse()
                .map_err(|_| Error::WeekParse(format!("invalid year: {s}")))?;
            let week: u32 = caps[2]
                .parse()
                .map_err(|_| Error::WeekParse(format!("invalid week: {s}")))?;
            return Self::from_iso(year, week)
                .ok_or_else(|| Error::WeekParse(format!("no such ISO week: {s}")));
        }

        Err(Error::WeekParse(format!("unrecognized week: {s}")))
    }

    /// The Monday this week starts on.
    pub fn monday(&self) -> NaiveDate {
        self.monday
    }

    /// Inclusive start instant (Monday 00:00 UTC).
    pub fn start(&self) -> DateTime<Utc> {
        self.monday.and_time(NaiveTime::MIN).and_utc()
    }

    /// Exclusive end instant (next Monday 00:00 UTC). The last representable
    /// week ends at `DateTime::<Utc>::MAX_UTC`.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().map_or(DateTime::<Utc>::MAX_UTC, |w| w.start())
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start() && instant < self.end()
    }

    /// The week before, or `None` at the start of the calendar.
    pub fn previous(&self) -> Option<Self> {
        self.monday
            .checked_sub_days(Days::new(7))
            .map(|monday| Self { monday })
    }

    /// The week after, or `None` at the end of the calendar.
    pub fn next(&self) -> Option<Self> {
        self.monday
            .checked_add_days(Days::new(7))
            .map(|monday| Self { monday })
    }

    /// ISO week key, e.g. `2025-W05`.
    pub fn to_key(&self) -> String {
        let iw = self.monday.iso_week();
        format!("{}-W{:02}", iw.year(), iw.week())
    }
}

impl std::fmt::Display for Week {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    Week::containing(now).start()
}

/// Monday 00:00 UTC of the week after the one containing `now` (exclusive bound).
pub fn end_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    Week::containing(now).end()
}

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeUnit {
    Year,
    Month,
    Day,
    Hour,
}

impl TimeUnit {
    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'Y' => Some(TimeUnit::Year),
            'M' => Some(TimeUnit::Month),
            'D' => Some(TimeUnit::Day),
            'H' => Some(TimeUnit::Hour),
            _ => None,
        }
    }

    fn letter(&self) -> char {
        match self {
            TimeUnit::Year => 'Y',
            TimeUnit::Month => 'M',
            TimeUnit::Day => 'D',
            TimeUnit::Hour => 'H',
        }
    }

    fn suffix(&self, ts: NaiveDateTime) -> String {
        let pattern = match self {
            TimeUnit::Year => "%Y",
            TimeUnit::Month => "%Y%m",
            TimeUnit::Day => "%Y%m%d",
            TimeUnit::Hour => "%Y%m%d%H",
        };
        ts.format(pattern).to_string()
    }

    fn truncate(&self, ts: NaiveDateTime) -> NaiveDateTime {
        let date = ts.date();
        let start = match self {
            TimeUnit::Year => date.with_ordinal(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            TimeUnit::Month => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            TimeUnit::Day => date.and_hms_opt(0, 0, 0),
            TimeUnit::Hour => date.and_hms_opt(ts.hour(), 0, 0),
        };
        start.unwrap_or(ts)
    }

    /// Start of the next period; `ts` must already be truncated to this unit.
    fn advance(&self, ts: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            TimeUnit::Year => NaiveDate::from_ymd_opt(ts.year() + 1, 1, 1)?.and_hms_opt(0, 0, 0),
            TimeUnit::Month => {
                let (year, month) = if ts.month() == 12 {
                    (ts.year() + 1, 1)
                } else {
                    (ts.year(), ts.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
            }
            TimeUnit::Day => ts.checked_add_signed(Duration::days(1)),
            TimeUnit::Hour => ts.checked_add_signed(Duration::hours(1)),
        }
    }
}

/// Granularities at which a time field materializes extra views, e.g. "YMD".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeQuantum {
    units: Vec<TimeUnit>,
}

impl TimeQuantum {
    /// Accepts a contiguous run of "YMDH": Y, YM, YMD, YMDH, M, MD, MDH, D, DH, H.
    pub fn parse(text: &str) -> Result<Self> {
        let upper = text.to_ascii_uppercase();
        if upper.is_empty() || !"YMDH".contains(upper.as_str()) {
            return Err(Error::schema(format!("invalid time quantum '{}'", text)));
        }
        let units = upper.chars().filter_map(TimeUnit::from_letter).collect();
        Ok(TimeQuantum { units })
    }

    pub fn units(&self) -> &[TimeUnit] {
        &self.units
    }

    /// Views written for a value set at `ts`, one per unit.
    pub fn views_for(&self, base: &str, ts: NaiveDateTime) -> Vec<String> {
        self.units
            .iter()
            .map(|unit| format!("{}_{}", base, unit.suffix(ts)))
            .collect()
    }

    /// Smallest set of views that covers `[from, to)`, preferring coarse
    /// units wherever a whole period fits.
    pub fn views_for_range(&self, base: &str, from: NaiveDateTime, to: NaiveDateTime) -> Vec<String> {
        let Some(&finest) = self.units.last() else {
            return Vec::new();
        };
        let mut views = Vec::new();
        let mut cursor = finest.truncate(from);

        'outer: while cursor < to {
            for unit in &self.units {
                if unit.truncate(cursor) != cursor {
                    continue;
                }
                if let Some(next) = unit.advance(cursor) {
                    if next <= to {
                        views.push(format!("{}_{}", base, unit.suffix(cursor)));
                        cursor = next;
                        continue 'outer;
                    }
                }
            }
            // Partial trailing period: fall back to the finest unit.
            views.push(format!("{}_{}", base, finest.suffix(cursor)));
            match finest.advance(cursor) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        views
    }
}

impl std::fmt::Display for TimeQuantum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for unit in &self.units {
            write!(f, "{}", unit.letter())?;
        }
        Ok(())
    }
}

impl TryFrom<String> for TimeQuantum {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        TimeQuantum::parse(&value)
    }
}

impl From<TimeQuantum> for String {
    fn from(value: TimeQuantum) -> Self {
        value.to_string()
    }
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]` and bare dates.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, pattern) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Error::invalid(format!("invalid timestamp '{}'", text)))
}

/// Default lower bound for time-range reads with no `from`.
pub fn range_floor() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Default upper bound for time-range reads with no `to`.
pub fn range_ceiling() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2100, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MAX)
}

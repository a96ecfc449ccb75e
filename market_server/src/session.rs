//! Competition session window.
//!
//! The window bounds are written by hand in the config file, so several common
//! layouts are accepted. Layouts without an offset are read in the configured
//! local offset (default +05:30).

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use market_common::command::SessionStatus;
use market_common::{MarketError, Result};

/// Default local offset for naive session times, in minutes east of UTC.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;

const NAIVE_LAYOUTS: [&str; 5] = [
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse one session bound.
pub fn parse_session_time(value: &str, offset: FixedOffset) -> Result<DateTime<Utc>> {
    let v = value.trim();
    if v.is_empty() {
        return Err(MarketError::Config("empty time value".to_string()));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(v) {
        return Ok(t.with_timezone(&Utc));
    }
    NAIVE_LAYOUTS
        .iter()
        .filter_map(|layout| NaiveDateTime::parse_from_str(v, layout).ok())
        .find_map(|naive| offset.from_local_datetime(&naive).single())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| MarketError::Config(format!("unsupported time format: {}", value)))
}

/// Optional `[start, end]` window; an absent bound is open-ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionClock {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl SessionClock {
    /// A clock that is always open.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if e <= s {
                return Err(MarketError::Config(format!(
                    "session end {} is not after start {}",
                    e, s
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Build from raw config strings read in `utc_offset_minutes`.
    pub fn parse(start: Option<&str>, end: Option<&str>, utc_offset_minutes: i32) -> Result<Self> {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                MarketError::Config(format!("utc offset out of range: {} minutes", utc_offset_minutes))
            })?;
        let start = start.map(|s| parse_session_time(s, offset)).transpose()?;
        let end = end.map(|e| parse_session_time(e, offset)).transpose()?;
        Self::new(start, end)
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Strictly after start and strictly before end.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| now > s) && self.end.is_none_or(|e| now < e)
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> SessionStatus {
        let fmt = |t: DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);
        SessionStatus {
            start: self.start.map(fmt),
            end: self.end.map(fmt),
            now: fmt(now),
            open: self.is_open_at(now),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status_at(Utc::now())
    }
}

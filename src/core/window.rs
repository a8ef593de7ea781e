use crate::types::{DateRange, Feature, RsrError, RsrResult};
use chrono::{DateTime, Duration, Months, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Length of the pre-fire compositing window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeWindowRepr", into = "String")]
pub enum TimeWindow {
    Days(u32),
    /// Legacy month-based windows, normalised to days against the alarm date
    Months(u32),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeWindowRepr {
    Days(u32),
    Text(String),
}

impl TryFrom<TimeWindowRepr> for TimeWindow {
    type Error = RsrError;

    fn try_from(repr: TimeWindowRepr) -> RsrResult<Self> {
        match repr {
            TimeWindowRepr::Days(n) => Ok(TimeWindow::Days(n)),
            TimeWindowRepr::Text(s) => s.parse(),
        }
    }
}

impl From<TimeWindow> for String {
    fn from(window: TimeWindow) -> String {
        window.to_string()
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::Days(48)
    }
}

fn window_pattern() -> RsrResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*(\d+)\s*(d|days?|m|months?)?\s*$"))
        .as_ref()
        .map_err(|e| RsrError::Configuration(format!("Invalid time window pattern: {}", e)))
}

impl FromStr for TimeWindow {
    type Err = RsrError;

    /// Accepts "48", "48 days", "3 months"
    fn from_str(s: &str) -> RsrResult<Self> {
        let lower = s.to_ascii_lowercase();
        let caps = window_pattern()?
            .captures(&lower)
            .ok_or_else(|| RsrError::Configuration(format!("Invalid time window '{}'", s)))?;
        let n: u32 = caps[1]
            .parse()
            .map_err(|e| RsrError::Configuration(format!("Invalid time window '{}': {}", s, e)))?;
        match caps.get(2).map(|m| m.as_str()) {
            Some(unit) if unit.starts_with('m') => Ok(TimeWindow::Months(n)),
            _ => Ok(TimeWindow::Days(n)),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeWindow::Days(n) => write!(f, "{} days", n),
            TimeWindow::Months(n) => write!(f, "{} months", n),
        }
    }
}

impl TimeWindow {
    pub fn validate(&self) -> RsrResult<()> {
        match self {
            TimeWindow::Days(0) | TimeWindow::Months(0) => Err(RsrError::Configuration(
                "Time window must be at least one day".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Window length in days ending at `alarm_date`
    pub fn to_days(&self, alarm_date: DateTime<Utc>) -> RsrResult<i64> {
        match *self {
            TimeWindow::Days(n) => Ok(n as i64),
            TimeWindow::Months(n) => {
                let start = alarm_date.checked_sub_months(Months::new(n)).ok_or_else(|| {
                    RsrError::Processing(format!(
                        "Cannot step {} months back from {}",
                        n, alarm_date
                    ))
                })?;
                Ok((alarm_date - start).num_days())
            }
        }
    }
}

/// Pre-fire and post-fire compositing periods for one feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireWindows {
    pub pre: DateRange,
    pub post: DateRange,
}

/// `[alarm - days, alarm - 1 day)`
pub fn pre_fire_window(alarm_date: DateTime<Utc>, days: i64) -> DateRange {
    DateRange::new(
        alarm_date - Duration::days(days),
        alarm_date - Duration::days(1),
    )
}

/// The pre-fire window shifted forward by one calendar year
pub fn post_fire_window(pre: &DateRange) -> RsrResult<DateRange> {
    let shift = |t: DateTime<Utc>| {
        t.checked_add_months(Months::new(12))
            .ok_or_else(|| RsrError::Processing(format!("Cannot shift {} by one year", t)))
    };
    Ok(DateRange::new(shift(pre.start)?, shift(pre.end)?))
}

/// `[alarm, alarm + days)` for post-ignition weather
pub fn early_fire_window(alarm_date: DateTime<Utc>, days: i64) -> DateRange {
    DateRange::new(alarm_date, alarm_date + Duration::days(days))
}

/// Resolve the compositing windows for a feature
pub fn resolve_windows(feature: &Feature, window: TimeWindow) -> RsrResult<FireWindows> {
    window.validate()?;
    let days = window.to_days(feature.alarm_date)?;
    let pre = pre_fire_window(feature.alarm_date, days);
    let post = post_fire_window(&pre)?;
    log::debug!("Windows for alarm {}: pre {} post {}", feature.alarm_date, pre, post);
    Ok(FireWindows { pre, post })
}

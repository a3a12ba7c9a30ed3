//! Periodic scheduler: fires named jobs on fixed cadences
//!
//! The schedule is an explicit list of [`ScheduleEntry`] values built once at
//! startup and owned by a single [`PeriodicScheduler`]. Each occurrence is
//! enqueued with an expiry window so a backlog built up during downtime is
//! dropped instead of run late.

use crate::config::ScheduleConfigEntry;
use crate::tasks::broker::{enqueue, Broker};
use crate::tasks::job::{Job, JobKind, QueueName};
use crate::{ConfigError, ConfigResult};
use chrono::{DateTime, Datelike, Duration, DurationRound, FixedOffset, Offset, TimeZone, Timelike, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Default expiry for fast cadences (seconds)
const SHORT_EXPIRY_SECS: i64 = 300;

/// Default expiry for maintenance (seconds)
const LONG_EXPIRY_SECS: i64 = 3600;

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Error, PartialEq)]
pub enum CadenceError {
    #[error("empty cadence")]
    Empty,

    #[error("invalid interval '{0}', expected e.g. '30m' or '1h'")]
    Interval(String),

    #[error("invalid time of day '{0}', expected HH:MM")]
    TimeOfDay(String),

    #[error("invalid cron field '{field}' for {name}")]
    CronField { name: &'static str, field: String },

    #[error("cron expression needs 5 fields, got {0}")]
    CronArity(usize),

    #[error("invalid UTC offset '{0}', expected e.g. '+08:00'")]
    UtcOffset(String),
}

/// One field of a cron expression, expanded to its allowed values
#[derive(Debug, Clone, PartialEq, Eq)]
struct CronField {
    allowed: Vec<u32>,
}

impl CronField {
    fn parse(text: &str, name: &'static str, min: u32, max: u32) -> Result<Self, CadenceError> {
        let invalid = || CadenceError::CronField {
            name,
            field: text.to_string(),
        };

        let mut allowed = Vec::new();
        for part in text.split(',') {
            if part == "*" {
                allowed.extend(min..=max);
            } else if let Some(step) = part.strip_prefix("*/") {
                let step: u32 = step.parse().map_err(|_| invalid())?;
                if step == 0 {
                    return Err(invalid());
                }
                allowed.extend((min..=max).step_by(step as usize));
            } else {
                let value: u32 = part.parse().map_err(|_| invalid())?;
                if value < min || value > max {
                    return Err(invalid());
                }
                allowed.push(value);
            }
        }

        allowed.sort_unstable();
        allowed.dedup();
        Ok(Self { allowed })
    }

    fn contains(&self, value: u32) -> bool {
        self.allowed.binary_search(&value).is_ok()
    }
}

/// A parsed `minute hour day-of-month month day-of-week` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronExpr {
    pub fn parse(text: &str) -> Result<Self, CadenceError> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CadenceError::CronArity(fields.len()));
        }

        let mut day_of_week = CronField::parse(fields[4], "day-of-week", 0, 7)?;
        // 7 is an alias for Sunday
        if day_of_week.contains(7) {
            day_of_week.allowed.retain(|d| *d != 7);
            if !day_of_week.contains(0) {
                day_of_week.allowed.insert(0, 0);
            }
        }

        Ok(Self {
            source: fields.join(" "),
            minute: CronField::parse(fields[0], "minute", 0, 59)?,
            hour: CronField::parse(fields[1], "hour", 0, 23)?,
            day_of_month: CronField::parse(fields[2], "day-of-month", 1, 31)?,
            month: CronField::parse(fields[3], "month", 1, 12)?,
            day_of_week,
        })
    }

    pub fn matches<Tz: TimeZone>(&self, at: DateTime<Tz>) -> bool {
        self.minute.contains(at.minute())
            && self.hour.contains(at.hour())
            && self.day_of_month.contains(at.day())
            && self.month.contains(at.month())
            && self
                .day_of_week
                .contains(at.weekday().num_days_from_sunday())
    }
}

/// When a schedule entry fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cadence {
    /// Aligned to midnight UTC: fires when minutes-since-midnight is a
    /// multiple of `minutes`
    Every { minutes: u32 },
    Daily { hour: u32, minute: u32 },
    Cron(CronExpr),
}

impl Cadence {
    /// Parses `every 30m`, `every 1h`, `daily 02:00`, or a 5-field cron line
    pub fn parse(text: &str) -> Result<Self, CadenceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CadenceError::Empty);
        }

        if let Some(interval) = text.strip_prefix("every ") {
            return parse_interval(interval.trim()).map(|minutes| Cadence::Every { minutes });
        }

        if let Some(time) = text.strip_prefix("daily ") {
            let (hour, minute) = parse_time_of_day(time.trim())?;
            return Ok(Cadence::Daily { hour, minute });
        }

        CronExpr::parse(text).map(Cadence::Cron)
    }

    /// Whether the minute containing `at` is a firing minute, read in `at`'s
    /// own time zone
    pub fn matches<Tz: TimeZone>(&self, at: DateTime<Tz>) -> bool {
        match self {
            Cadence::Every { minutes } => (at.hour() * 60 + at.minute()) % minutes == 0,
            Cadence::Daily { hour, minute } => at.hour() == *hour && at.minute() == *minute,
            Cadence::Cron(expr) => expr.matches(at),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Every { minutes } if minutes % 60 == 0 => write!(f, "every {}h", minutes / 60),
            Cadence::Every { minutes } => write!(f, "every {}m", minutes),
            Cadence::Daily { hour, minute } => write!(f, "daily {:02}:{:02}", hour, minute),
            Cadence::Cron(expr) => write!(f, "{}", expr.source),
        }
    }
}

fn parse_interval(text: &str) -> Result<u32, CadenceError> {
    let invalid = || CadenceError::Interval(text.to_string());

    let (number, multiplier) = if let Some(n) = text.strip_suffix('m') {
        (n, 1)
    } else if let Some(n) = text.strip_suffix('h') {
        (n, 60)
    } else {
        return Err(invalid());
    };

    let minutes = number
        .trim()
        .parse::<u32>()
        .map_err(|_| invalid())?
        .checked_mul(multiplier)
        .ok_or_else(invalid)?;

    if minutes == 0 || minutes > MINUTES_PER_DAY {
        return Err(invalid());
    }
    Ok(minutes)
}

fn parse_time_of_day(text: &str) -> Result<(u32, u32), CadenceError> {
    let invalid = || CadenceError::TimeOfDay(text.to_string());

    let (hour, minute) = text.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// Parses a fixed offset such as `+08:00` or `-05:30`
pub fn parse_utc_offset(text: &str) -> Result<FixedOffset, CadenceError> {
    let text = text.trim();
    let invalid = || CadenceError::UtcOffset(text.to_string());

    let (sign, rest) = if let Some(rest) = text.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = text.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };
    let (hours, minutes) = parse_time_of_day(rest).map_err(|_| invalid())?;
    if hours > 14 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60) as i32).ok_or_else(invalid)
}

/// One named periodic job
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub name: String,
    pub kind: JobKind,
    pub cadence: Cadence,
    pub queue: QueueName,
    /// Occurrences not started within this window are dropped
    pub expires: Duration,
}

impl ScheduleEntry {
    pub fn new(name: &str, kind: JobKind, cadence: Cadence, expires: Duration) -> Self {
        Self {
            name: name.to_string(),
            kind,
            cadence,
            queue: kind.queue(),
            expires,
        }
    }
}

fn default_expiry(kind: JobKind) -> Duration {
    match kind {
        JobKind::SystemMaintenance => Duration::seconds(LONG_EXPIRY_SECS),
        _ => Duration::seconds(SHORT_EXPIRY_SECS),
    }
}

/// The built-in schedule used when the config names no entries
pub fn default_schedule() -> Vec<ScheduleEntry> {
    let short = Duration::seconds(SHORT_EXPIRY_SECS);
    vec![
        ScheduleEntry::new(
            "crawl-gov-sites",
            JobKind::ScheduledCrawl,
            Cadence::Every { minutes: 60 },
            short,
        ),
        ScheduleEntry::new(
            "clean-raw-data",
            JobKind::ScheduledClean,
            Cadence::Every { minutes: 30 },
            short,
        ),
        ScheduleEntry::new(
            "analyze-policies",
            JobKind::ScheduledAnalyze,
            Cadence::Every { minutes: 15 },
            short,
        ),
        ScheduleEntry::new(
            "send-notifications",
            JobKind::ScheduledNotification,
            Cadence::Every { minutes: 5 },
            short,
        ),
        ScheduleEntry::new(
            "system-maintenance",
            JobKind::SystemMaintenance,
            Cadence::Daily { hour: 2, minute: 0 },
            Duration::seconds(LONG_EXPIRY_SECS),
        ),
    ]
}

/// Builds schedule entries from `[[schedule]]` config
///
/// An empty list yields [`default_schedule`].
pub fn schedule_from_config(entries: &[ScheduleConfigEntry]) -> ConfigResult<Vec<ScheduleEntry>> {
    if entries.is_empty() {
        return Ok(default_schedule());
    }

    entries
        .iter()
        .map(|entry| {
            let kind = JobKind::from_name(&entry.job).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "schedule entry '{}' names unknown job '{}'",
                    entry.name, entry.job
                ))
            })?;
            let cadence = Cadence::parse(&entry.cadence).map_err(|e| {
                ConfigError::Validation(format!("schedule entry '{}': {}", entry.name, e))
            })?;
            let expires = match entry.expires_secs {
                Some(secs) => Duration::seconds(secs as i64),
                None => default_expiry(kind),
            };
            Ok(ScheduleEntry::new(&entry.name, kind, cadence, expires))
        })
        .collect()
}

/// Fires schedule entries into the broker
pub struct PeriodicScheduler {
    entries: Arc<Vec<ScheduleEntry>>,
    broker: Arc<dyn Broker>,
    /// Zone cadences are read in; UTC unless set
    offset: FixedOffset,
    /// Minute each entry last fired in, keyed by entry name
    last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl PeriodicScheduler {
    pub fn new(entries: Vec<ScheduleEntry>, broker: Arc<dyn Broker>) -> Self {
        Self {
            entries: Arc::new(entries),
            broker,
            offset: Utc.fix(),
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Reads cadences at a fixed offset from UTC, e.g. `+08:00` for
    /// China Standard Time
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Enqueues every entry whose cadence matches `now`
    ///
    /// Each entry fires at most once per matching minute. Minutes that passed
    /// without a tick are not back-filled.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let minute = now
            .duration_trunc(Duration::minutes(1))
            .unwrap_or(now);
        let mut last_fired = self.last_fired.lock().unwrap();
        let mut fired = Vec::new();

        for entry in self.entries.iter() {
            if !entry.cadence.matches(now.with_timezone(&self.offset)) {
                continue;
            }
            if last_fired.get(&entry.name) == Some(&minute) {
                continue;
            }

            let job = Job::new(entry.kind, json!({}), now).with_expiry(entry.expires);
            let job_id = enqueue(self.broker.as_ref(), job, now);
            last_fired.insert(entry.name.clone(), minute);

            info!(
                job_id = %job_id,
                entry = %entry.name,
                queue = %entry.queue,
                "fired scheduled job"
            );
            fired.push(job_id);
        }

        fired
    }

    /// Ticks once a second until `shutdown` is set
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        info!(entries = self.entries.len(), "scheduler started");

        while !shutdown.load(Ordering::SeqCst) {
            self.tick(Utc::now());
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }

        debug!("scheduler stopped");
    }
}

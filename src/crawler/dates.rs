//! Publish-date parsing for loosely formatted government pages

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Accepted formats in priority order; `true` marks formats with a time part
const FORMATS: &[(&str, bool)] = &[
    ("%Y-%m-%d", false),
    ("%Y-%m-%d %H:%M:%S", true),
    ("%Y-%m-%dT%H:%M:%S", true),
    ("%Y/%m/%d", false),
    ("%Y/%m/%d %H:%M:%S", true),
    ("%d-%m-%Y", false),
    ("%d/%m/%Y", false),
    ("%Y年%m月%d日", false),
    ("%Y年%m月%d日 %H时%M分", true),
];

/// Parses date text against the known formats, in order
///
/// Naive dates are taken as UTC midnight. RFC 3339 timestamps, as found in
/// `article:published_time`, are accepted last. Returns `None` for anything
/// else; callers fall back to the fetch time.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for (format, has_time) in FORMATS {
        let parsed = if *has_time {
            NaiveDateTime::parse_from_str(text, format).ok()
        } else {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        };

        if let Some(naive) = parsed {
            return Some(naive.and_utc());
        }
    }

    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

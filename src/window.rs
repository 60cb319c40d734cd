/// Query/Window layer: turns caller-supplied bounds into a `TimeRange` and
/// resolves it into history rows.
///
/// Bounds accept RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.f]` timestamp (UTC,
/// `T` or space separated) or a bare `YYYY-MM-DD`. A bare `from` date starts
/// at midnight; a bare `to` date ends at 23:59:59 of that day.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tracing::debug;

use crate::error::MonitorError;
use crate::model::Reading;
use crate::store::PlantStore;

/// Inclusive time range. `None` on either side means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

impl TimeRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// `[now - span, now]`. A span reaching before the representable
    /// calendar is a validation error.
    pub fn last(span: Duration, now: DateTime<Utc>) -> Result<Self, MonitorError> {
        let from = now
            .checked_sub_signed(span)
            .ok_or_else(|| MonitorError::validation(format!("window of {} is too large", span)))?;
        Ok(Self {
            from: Some(from),
            to: Some(now),
        })
    }

    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, MonitorError> {
        Ok(Self {
            from: from.map(|s| parse_bound(s, Bound::Start)).transpose()?,
            to: to.map(|s| parse_bound(s, Bound::End)).transpose()?,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

fn parse_bound(raw: &str, bound: Bound) -> Result<DateTime<Utc>, MonitorError> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let time = match bound {
            Bound::Start => NaiveTime::MIN,
            Bound::End => NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        };
        return Ok(date.and_time(time).and_utc());
    }

    Err(MonitorError::validation(format!(
        "invalid date or timestamp '{}': expected YYYY-MM-DD or an ISO 8601 timestamp",
        raw
    )))
}

/// Parse a relative window such as `24h`, `7d`, `30m` or `last 2w`.
pub fn parse_relative(raw: &str) -> Result<Duration, MonitorError> {
    let s = raw.trim().to_lowercase();
    let s = s.strip_prefix("last").map(str::trim_start).unwrap_or(&s);

    let invalid = || {
        MonitorError::validation(format!(
            "invalid window '{}': expected a number followed by m, h, d or w",
            raw
        ))
    };

    let split = s.len().checked_sub(1).ok_or_else(invalid)?;
    if !s.is_char_boundary(split) {
        return Err(invalid());
    }
    let (amount, unit) = s.split_at(split);
    let amount: i64 = amount.trim().parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    let duration = match unit {
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

/// Readings of one plant inside `range`, oldest first. `limit` keeps the
/// earliest rows; pass a narrower `from` to get the latest ones.
pub fn history<S: PlantStore>(
    store: &mut S,
    plant_id: &str,
    range: &TimeRange,
    limit: Option<usize>,
) -> Result<Vec<Reading>, MonitorError> {
    if limit == Some(0) {
        return Err(MonitorError::validation("limit must be greater than zero"));
    }
    if store.get_plant(plant_id)?.is_none() {
        return Err(MonitorError::not_found(format!("plant '{}'", plant_id)));
    }

    let rows = store.history(plant_id, range, limit)?;
    debug!(plant_id, rows = rows.len(), "history loaded");
    Ok(rows)
}

/// History of every listed plant, grouped by plant in display-name order.
pub fn history_all<S: PlantStore>(store: &mut S, range: &TimeRange) -> Result<Vec<Reading>, MonitorError> {
    let mut rows = Vec::new();
    for plant in store.list_plants(false)? {
        rows.extend(store.history(&plant.id, range, None)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Telemetry;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_bare_dates_cover_the_whole_day() {
        let range = TimeRange::parse(Some("2024-01-01"), Some("2024-01-01")).unwrap();
        assert_eq!(range.from, Some(utc(2024, 1, 1, 0, 0, 0)));
        assert_eq!(range.to, Some(utc(2024, 1, 1, 23, 59, 59)));

        assert!(range.contains(utc(2024, 1, 1, 23, 59, 59)));
        assert!(!range.contains(utc(2024, 1, 2, 0, 0, 1)));
    }

    #[test]
    fn test_full_timestamps_are_kept_as_given() {
        let range = TimeRange::parse(Some("2024-03-05T10:15:00Z"), Some("2024-03-05 12:00:00")).unwrap();
        assert_eq!(range.from, Some(utc(2024, 3, 5, 10, 15, 0)));
        assert_eq!(range.to, Some(utc(2024, 3, 5, 12, 0, 0)));

        let offset = TimeRange::parse(Some("2024-03-05T10:15:00-05:00"), None).unwrap();
        assert_eq!(offset.from, Some(utc(2024, 3, 5, 15, 15, 0)));
        assert_eq!(offset.to, None);
    }

    #[test]
    fn test_malformed_bound_is_validation_error() {
        let err = TimeRange::parse(Some("yesterday"), None).unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
    }

    #[test]
    fn test_parse_relative_windows() {
        assert_eq!(parse_relative("1h").unwrap(), Duration::hours(1));
        assert_eq!(parse_relative("6h").unwrap(), Duration::hours(6));
        assert_eq!(parse_relative("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_relative("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_relative("last 30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_relative("2W").unwrap(), Duration::weeks(2));

        for bad in ["", "h", "24", "0h", "-1d", "3y", "abc"] {
            assert!(parse_relative(bad).is_err(), "'{}' should be rejected", bad);
        }
    }

    #[test]
    fn test_last_window_ends_now() {
        let now = utc(2024, 1, 2, 12, 0, 0);
        let range = TimeRange::last(Duration::hours(24), now).unwrap();
        assert_eq!(range.from, Some(utc(2024, 1, 1, 12, 0, 0)));
        assert!(range.contains(now));
        assert!(!range.contains(utc(2024, 1, 1, 11, 59, 59)));
    }

    #[test]
    fn test_oversized_window_is_validation_error() {
        let span = parse_relative("100000000w").expect("representable as a duration");
        let err = TimeRange::last(span, utc(2024, 1, 2, 12, 0, 0)).unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let range = TimeRange::parse(Some("2024-01-02"), Some("2024-01-01")).unwrap();
        assert!(!range.contains(utc(2024, 1, 1, 12, 0, 0)));
        assert!(!range.contains(utc(2024, 1, 2, 12, 0, 0)));
    }

    #[test]
    fn test_history_includes_end_of_day() {
        let mut store = MemoryStore::new();
        let t = Telemetry::default();
        store
            .upsert_plant(
                "norte",
                utc(2024, 1, 1, 0, 0, 0),
                &crate::model::TelemetryUpdate { name: None, telemetry: t.clone() },
            )
            .unwrap();
        store.append_reading("norte", utc(2024, 1, 1, 23, 59, 59), &t).unwrap();
        store.append_reading("norte", utc(2024, 1, 2, 0, 0, 1), &t).unwrap();
        store.append_reading("norte", utc(2023, 12, 31, 23, 59, 59), &t).unwrap();

        let range = TimeRange::parse(Some("2024-01-01"), Some("2024-01-01")).unwrap();
        let rows = history(&mut store, "norte", &range, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].recorded_at, utc(2024, 1, 1, 23, 59, 59));
    }

    #[test]
    fn test_history_unknown_plant_and_zero_limit() {
        let mut store = MemoryStore::new();
        let err = history(&mut store, "ghost", &TimeRange::unbounded(), None).unwrap_err();
        assert!(matches!(err, MonitorError::NotFound(_)));

        let err = history(&mut store, "ghost", &TimeRange::unbounded(), Some(0)).unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
    }
}

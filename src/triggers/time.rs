//! Wall-clock trigger checks.

use super::CheckWindow;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::TZ_VARIANTS;
use std::collections::BTreeSet;
use std::iter::successors;

/// Whether the wall-clock `time` in `zone` occurred within the window.
///
/// The window is half-open, `(since, now]`, so consecutive windows never
/// both match the same instant. When the clocks go back, a time in the
/// repeated hour occurs at its first instant only. When they go forward
/// over it, it occurs when the old offset would have shown it.
pub fn is_time_in_window<Z: TimeZone>(time: NaiveTime, zone: &Z, window: &CheckWindow) -> bool {
    let first = window.since.with_timezone(zone).date_naive();
    let first = first.pred_opt().unwrap_or(first);
    let last = window.now.with_timezone(zone).date_naive();

    successors(Some(first), NaiveDate::succ_opt)
        .take_while(|date| *date <= last)
        .filter_map(|date| occurrence(zone, date.and_time(time)))
        .any(|instant| window.since < instant && instant <= window.now)
}

fn occurrence<Z: TimeZone>(zone: &Z, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(instant) | LocalResult::Ambiguous(instant, _) => {
            Some(instant.with_timezone(&Utc))
        }
        LocalResult::None => {
            let before = local.checked_sub_signed(Duration::days(1))?;
            let offset = zone.offset_from_local_datetime(&before).earliest()?.fix();
            let utc = local.checked_sub_signed(Duration::seconds(offset.local_minus_utc().into()))?;
            Some(utc.and_utc())
        }
    }
}

/// Names of every IANA timezone where `time` occurred within the window.
pub fn where_is_this_the_time(time: NaiveTime, window: &CheckWindow) -> BTreeSet<&'static str> {
    TZ_VARIANTS
        .iter()
        .filter(|zone| is_time_in_window(time, *zone, window))
        .map(|zone| zone.name())
        .collect()
}

//! Cycle timing: the wait before a day-end cycle and day-boundary detection.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// `minutes` before the coming UTC midnight.
pub fn minutes_before_midnight(now: DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
    let midnight = now
        .date_naive()
        .succ_opt()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(now);
    midnight - Duration::minutes(i64::from(minutes))
}

/// Time left until `target`; zero once it has passed.
pub fn wait_until(now: DateTime<Utc>, target: DateTime<Utc>) -> std::time::Duration {
    (target - now).to_std().unwrap_or_default()
}

/// True when the next cycle of a repeating stream would land on another UTC day,
/// which makes this cycle the one that finalizes the day.
pub fn is_day_end_cycle(now: DateTime<Utc>, interval: Duration) -> bool {
    (now + interval).date_naive() != now.date_naive()
}

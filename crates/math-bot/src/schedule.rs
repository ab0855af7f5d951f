use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Weekday};
use chrono_tz::Tz;

const REGULAR_OPEN_MINUTES: u32 = 9 * 60 + 30;
const REGULAR_CLOSE_MINUTES: u32 = 16 * 60;

/// Regular session check: weekdays, 09:30 to 16:00 exchange time.
/// Holidays are not modelled.
pub fn is_market_open(now: &DateTime<Tz>) -> bool {
    if now.weekday() == Weekday::Sat || now.weekday() == Weekday::Sun {
        return false;
    }
    let time_minutes = now.hour() * 60 + now.minute();
    (REGULAR_OPEN_MINUTES..REGULAR_CLOSE_MINUTES).contains(&time_minutes)
}

/// A cycle is due when none has run yet or the last one is at least
/// `interval` old. Both times are market-local.
pub fn cycle_due(last_run: Option<NaiveDateTime>, now: NaiveDateTime, interval: Duration) -> bool {
    match last_run {
        None => true,
        Some(last) => now - last >= interval,
    }
}

//! Slot planner — picks the next free daily send slot for a channel.
//!
//! A channel publishes at its `daily_time` (channel-local). Posts planned
//! the same day stack one second apart so the per-day order stays stable.
//! Channel-local time is a fixed UTC offset; no DST handling.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};

use telepost_core::error::Result;
use telepost_core::types::Channel;

use crate::ledger::Ledger;

fn parse_hhmm(value: &str) -> NaiveTime {
    NaiveTime::parse_from_str(value, "%H:%M")
        .unwrap_or_else(|_| NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default())
}

fn to_local(utc: DateTime<Utc>, offset_minutes: i32) -> NaiveDateTime {
    (utc + Duration::minutes(offset_minutes as i64)).naive_utc()
}

fn to_utc(local: NaiveDateTime, offset_minutes: i32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&(local - Duration::minutes(offset_minutes as i64)))
}

/// Next free slot for the channel: today's `daily_time` if still ahead,
/// otherwise the next day, offset by one second per publication already
/// planned on that (UTC) day.
pub fn next_slot(channel: &Channel, now: DateTime<Utc>, ledger: &Ledger) -> Result<DateTime<Utc>> {
    let now_local = to_local(now, channel.utc_offset_minutes);
    let daily = parse_hhmm(&channel.daily_time);
    let mut base_local = now_local.date().and_time(daily);
    if base_local <= now_local {
        base_local += Duration::days(1);
    }

    let mut planned = to_utc(base_local, channel.utc_offset_minutes);
    for _ in 0..365 {
        let day_start = Utc.from_utc_datetime(&planned.naive_utc().date().and_time(NaiveTime::MIN));
        let day_end = day_start + Duration::days(1);
        let slot_index = ledger.count_planned_between(channel.id, day_start, day_end)?;
        let candidate = planned + Duration::seconds(slot_index);
        if candidate > now {
            return Ok(candidate);
        }
        planned += Duration::days(1);
    }

    // a year of full days means something is badly misconfigured
    Ok(now + Duration::minutes(1))
}

/// Clamp a planned time into the channel's allowed posting window. Times
/// before the window move to today's opening; times after it move to the
/// next day's opening.
pub fn adjust_to_window(channel: &Channel, planned: DateTime<Utc>) -> DateTime<Utc> {
    let start = parse_hhmm(&channel.window_start);
    let end = parse_hhmm(&channel.window_end);
    let planned_local = to_local(planned, channel.utc_offset_minutes);
    let current = planned_local.time();

    if start <= current && current <= end {
        return planned;
    }

    let adjusted_local = if current < start {
        planned_local.date().and_time(start)
    } else {
        (planned_local.date() + Duration::days(1)).and_time(start)
    };
    to_utc(adjusted_local, channel.utc_offset_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use telepost_core::types::Post;

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, d, h, m, 0).unwrap()
    }

    fn seed_channel(ledger: &Ledger) -> Channel {
        // UTC+3, daily at 10:00 local (= 07:00 UTC)
        let mut channel = Channel::new("News", "@news", "token");
        channel.id = ledger.create_channel(&channel).unwrap();
        channel
    }

    #[test]
    fn test_next_slot_same_day_when_daily_time_ahead() {
        let ledger = Ledger::open_in_memory().unwrap();
        let channel = seed_channel(&ledger);
        // 05:00 UTC = 08:00 local, before the 10:00 daily time
        let slot = next_slot(&channel, utc(10, 5, 0), &ledger).unwrap();
        assert_eq!(slot, utc(10, 7, 0));
    }

    #[test]
    fn test_next_slot_rolls_to_next_day() {
        let ledger = Ledger::open_in_memory().unwrap();
        let channel = seed_channel(&ledger);
        // 08:00 UTC = 11:00 local, past the daily time
        let slot = next_slot(&channel, utc(10, 8, 0), &ledger).unwrap();
        assert_eq!(slot, utc(11, 7, 0));
    }

    #[test]
    fn test_next_slot_stacks_behind_planned_posts() {
        let ledger = Ledger::open_in_memory().unwrap();
        let channel = seed_channel(&ledger);
        let post_id = ledger.create_post(&Post::new(channel.id, "taken", "x")).unwrap();
        ledger.schedule(post_id, utc(10, 7, 0)).unwrap();

        let slot = next_slot(&channel, utc(10, 5, 0), &ledger).unwrap();
        assert_eq!(slot, utc(10, 7, 0) + Duration::seconds(1));
    }

    #[test]
    fn test_adjust_inside_window_is_untouched() {
        let ledger = Ledger::open_in_memory().unwrap();
        let channel = seed_channel(&ledger);
        // 09:00 UTC = 12:00 local, inside 08:00..22:00
        let planned = utc(10, 9, 0);
        assert_eq!(adjust_to_window(&channel, planned), planned);
    }

    #[test]
    fn test_adjust_before_window_moves_to_opening() {
        let ledger = Ledger::open_in_memory().unwrap();
        let channel = seed_channel(&ledger);
        // 02:00 UTC = 05:00 local, before the window → 08:00 local = 05:00 UTC
        assert_eq!(adjust_to_window(&channel, utc(10, 2, 0)), utc(10, 5, 0));
    }

    #[test]
    fn test_daily_time_outside_window_is_clamped() {
        let ledger = Ledger::open_in_memory().unwrap();
        let mut channel = Channel::new("News", "@news", "token");
        channel.daily_time = "23:00".into();
        channel.id = ledger.create_channel(&channel).unwrap();

        // 23:00 local = 20:00 UTC, past the 22:00 window end
        let slot = next_slot(&channel, utc(10, 5, 0), &ledger).unwrap();
        assert_eq!(slot, utc(10, 20, 0));
        // clamped to the next day's window opening, 08:00 local
        assert_eq!(adjust_to_window(&channel, slot), utc(11, 5, 0));
    }

    #[test]
    fn test_adjust_after_window_moves_to_next_day() {
        let ledger = Ledger::open_in_memory().unwrap();
        let channel = seed_channel(&ledger);
        // 20:30 UTC = 23:30 local, after the window → next day 08:00 local
        assert_eq!(adjust_to_window(&channel, utc(10, 20, 30)), utc(11, 5, 0));
    }
}

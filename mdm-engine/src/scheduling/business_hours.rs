//! Work-window deadline arithmetic
//!
//! Deadlines advance only inside the 09:00-18:00 work window, jump the lunch
//! hour, and skip weekends and calendar holidays. An estimate that does not
//! fit in what is left of the current day rolls whole to the next working
//! day: full days consume their working seconds, the final partial day adds
//! the remainder and crosses lunch if needed.

use super::calendar::{is_working_day, HolidayCalendar};
use crate::config::WorkdayConfig;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

/// Deadline for `seconds` of work starting at `start`
pub fn add_working_seconds(
    start: DateTime<Utc>,
    seconds: i64,
    config: &WorkdayConfig,
    calendar: &dyn HolidayCalendar,
) -> DateTime<Utc> {
    if seconds <= 0 {
        return start;
    }
    let cursor = align_to_work_moment(start.naive_utc(), config, calendar);
    let finished = if seconds <= available_today(cursor, config) {
        add_within_day(cursor, seconds, config)
    } else {
        let mut day = next_working_day_start(cursor.date(), config, calendar);
        let mut remaining = seconds;
        while remaining > day_capacity(config) {
            remaining -= day_capacity(config);
            day = next_working_day_start(day.date(), config, calendar);
        }
        add_within_day(day, remaining, config)
    };
    DateTime::from_naive_utc_and_offset(finished, Utc)
}

/// Working days fully elapsed between two instants
pub fn business_days_elapsed(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    calendar: &dyn HolidayCalendar,
) -> i64 {
    if to <= from {
        return 0;
    }
    let mut count = 0;
    let mut date = from.date_naive() + Duration::days(1);
    let last = to.date_naive();
    while date <= last {
        if is_working_day(date, calendar) {
            count += 1;
        }
        date += Duration::days(1);
    }
    count
}

/// Working seconds in one full business day
fn day_capacity(config: &WorkdayConfig) -> i64 {
    let window = (config.end_hour - config.start_hour) as i64;
    let lunch = (config.lunch_end_hour - config.lunch_start_hour) as i64;
    (window - lunch) * 3600
}

/// Seconds of work available from `cursor` (an aligned work moment) to the
/// end of its day.
fn available_today(cursor: NaiveDateTime, config: &WorkdayConfig) -> i64 {
    let end = at_hour(cursor.date(), config.end_hour);
    let lunch_start = at_hour(cursor.date(), config.lunch_start_hour);
    let lunch_end = at_hour(cursor.date(), config.lunch_end_hour);
    if cursor < lunch_start {
        (lunch_start - cursor).num_seconds() + (end - lunch_end).num_seconds()
    } else {
        (end - cursor).num_seconds()
    }
}

/// Add seconds known to fit in the cursor's day, jumping lunch if crossed
fn add_within_day(cursor: NaiveDateTime, seconds: i64, config: &WorkdayConfig) -> NaiveDateTime {
    let lunch_start = at_hour(cursor.date(), config.lunch_start_hour);
    let lunch_end = at_hour(cursor.date(), config.lunch_end_hour);
    if cursor < lunch_start {
        let before_lunch = (lunch_start - cursor).num_seconds();
        if seconds <= before_lunch {
            cursor + Duration::seconds(seconds)
        } else {
            lunch_end + Duration::seconds(seconds - before_lunch)
        }
    } else {
        cursor + Duration::seconds(seconds)
    }
}

/// Move an arbitrary instant to the next moment work can happen
fn align_to_work_moment(
    moment: NaiveDateTime,
    config: &WorkdayConfig,
    calendar: &dyn HolidayCalendar,
) -> NaiveDateTime {
    let mut cursor = moment;
    if !is_working_day(cursor.date(), calendar) {
        return next_working_day_start(cursor.date(), config, calendar);
    }
    if cursor.hour() < config.start_hour {
        cursor = at_hour(cursor.date(), config.start_hour);
    }
    if cursor >= at_hour(cursor.date(), config.end_hour) {
        return next_working_day_start(cursor.date(), config, calendar);
    }
    if cursor >= at_hour(cursor.date(), config.lunch_start_hour)
        && cursor < at_hour(cursor.date(), config.lunch_end_hour)
    {
        cursor = at_hour(cursor.date(), config.lunch_end_hour);
    }
    cursor
}

/// Work-window opening of the first working day after `date`
fn next_working_day_start(
    date: NaiveDate,
    config: &WorkdayConfig,
    calendar: &dyn HolidayCalendar,
) -> NaiveDateTime {
    let mut next = date + Duration::days(1);
    while !is_working_day(next, calendar) {
        next += Duration::days(1);
    }
    at_hour(next, config.start_hour)
}

fn at_hour(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default())
}

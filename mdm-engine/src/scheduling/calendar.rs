//! Holiday calendar
//!
//! Business-day arithmetic consults an injected calendar rather than a
//! hard-wired holiday list.

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::HashSet;

/// Source of non-working dates beyond weekends
pub trait HolidayCalendar: Send + Sync {
    /// Whether the date is a holiday
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// Calendar backed by a fixed set of dates
#[derive(Debug, Clone, Default)]
pub struct FixedHolidayCalendar {
    holidays: HashSet<NaiveDate>,
}

impl FixedHolidayCalendar {
    /// Calendar with no holidays
    pub fn empty() -> Self {
        Self::default()
    }

    /// Calendar over the given dates
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }
}

impl HolidayCalendar for FixedHolidayCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }
}

/// Whether the date is a working day on the given calendar
pub fn is_working_day(date: NaiveDate, calendar: &dyn HolidayCalendar) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !calendar.is_holiday(date)
}

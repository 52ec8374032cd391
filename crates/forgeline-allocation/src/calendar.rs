//! Business-day calendar: weekday eligibility plus an explicit holiday set.

use std::collections::BTreeSet;

use thiserror::Error;
use time::{Date, Weekday};

/// Calendar construction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    /// Every weekday was excluded; date arithmetic could never land.
    #[error("calendar must have at least one eligible weekday")]
    NoEligibleWeekday,
}

/// A weekday-eligibility mask and holiday set for business-day math.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessDayCalendar {
    // Indexed by Weekday::number_days_from_monday().
    workdays: [bool; 7],
    holidays: BTreeSet<Date>,
}

impl Default for BusinessDayCalendar {
    /// Monday through Friday, no holidays.
    fn default() -> Self {
        Self {
            workdays: [true, true, true, true, true, false, false],
            holidays: BTreeSet::new(),
        }
    }
}

impl BusinessDayCalendar {
    /// Build a calendar from an explicit weekday mask.
    ///
    /// # Errors
    /// Rejects an empty mask; `add_business_days` could never terminate.
    pub fn with_workdays<I>(workdays: I) -> Result<Self, CalendarError>
    where
        I: IntoIterator<Item = Weekday>,
    {
        let mut mask = [false; 7];
        for weekday in workdays {
            mask[usize::from(weekday.number_days_from_monday())] = true;
        }
        if !mask.contains(&true) {
            return Err(CalendarError::NoEligibleWeekday);
        }
        Ok(Self {
            workdays: mask,
            holidays: BTreeSet::new(),
        })
    }

    pub fn with_holiday(mut self, date: Date) -> Self {
        self.holidays.insert(date);
        self
    }

    pub fn with_holidays<I>(mut self, dates: I) -> Self
    where
        I: IntoIterator<Item = Date>,
    {
        self.holidays.extend(dates);
        self
    }

    /// Whether the date counts: eligible weekday and not a holiday.
    pub fn is_business_day(&self, date: Date) -> bool {
        self.workdays[usize::from(date.weekday().number_days_from_monday())]
            && !self.holidays.contains(&date)
    }

    /// Advance `n` business days past `start`.
    ///
    /// Walks one calendar day at a time, counting a day only when
    /// [`is_business_day`](Self::is_business_day) holds. `n` counts
    /// eligible days strictly after `start`: adding 0 returns `start`
    /// unchanged, and the start date itself is never one of the added
    /// days even when it is a holiday or weekend. The result always lands
    /// on an eligible day.
    pub fn add_business_days(&self, start: Date, n: u32) -> Date {
        let mut current = start;
        let mut counted = 0;
        while counted < n {
            let Some(next) = current.next_day() else {
                // End of the representable range; clamp.
                return current;
            };
            current = next;
            if self.is_business_day(current) {
                counted += 1;
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn weekends_are_not_business_days_by_default() {
        let calendar = BusinessDayCalendar::default();
        assert!(calendar.is_business_day(date!(2026 - 03 - 06))); // Friday
        assert!(!calendar.is_business_day(date!(2026 - 03 - 07))); // Saturday
        assert!(!calendar.is_business_day(date!(2026 - 03 - 08))); // Sunday
    }

    #[test]
    fn holidays_are_excluded() {
        let calendar = BusinessDayCalendar::default().with_holiday(date!(2026 - 07 - 03));
        assert!(!calendar.is_business_day(date!(2026 - 07 - 03)));
    }

    #[test]
    fn adding_zero_days_returns_start_unchanged() {
        let calendar = BusinessDayCalendar::default();
        let start = date!(2026 - 03 - 07); // Saturday, not even eligible
        assert_eq!(calendar.add_business_days(start, 0), start);
    }

    #[test]
    fn adding_days_skips_weekends() {
        let calendar = BusinessDayCalendar::default();
        // Thursday + 4 business days: Fri, Mon, Tue, Wed.
        assert_eq!(
            calendar.add_business_days(date!(2026 - 03 - 05), 4),
            date!(2026 - 03 - 11)
        );
    }

    #[test]
    fn adding_days_skips_holidays() {
        let calendar = BusinessDayCalendar::default().with_holiday(date!(2026 - 03 - 09));
        // Thursday + 4 business days with Monday 03-09 a holiday:
        // Fri, Tue, Wed, Thu.
        assert_eq!(
            calendar.add_business_days(date!(2026 - 03 - 05), 4),
            date!(2026 - 03 - 12)
        );
    }

    #[test]
    fn holiday_start_date_is_never_counted() {
        let calendar = BusinessDayCalendar::default().with_holiday(date!(2026 - 03 - 09));
        // Starting on the Monday holiday: Tue, Wed are the two added days.
        assert_eq!(
            calendar.add_business_days(date!(2026 - 03 - 09), 2),
            date!(2026 - 03 - 11)
        );
    }

    #[test]
    fn add_is_idempotent_under_zero_followup() {
        let calendar = BusinessDayCalendar::default();
        let projected = calendar.add_business_days(date!(2026 - 03 - 05), 4);
        assert_eq!(calendar.add_business_days(projected, 0), projected);
        assert!(calendar.is_business_day(projected));
    }

    #[test]
    fn custom_workday_mask_is_honored() {
        let calendar =
            BusinessDayCalendar::with_workdays([Weekday::Tuesday, Weekday::Thursday])
                .expect("calendar");
        // Monday + 3 eligible days: Tue, Thu, next Tue.
        assert_eq!(
            calendar.add_business_days(date!(2026 - 03 - 02), 3),
            date!(2026 - 03 - 10)
        );
    }

    #[test]
    fn empty_workday_mask_is_rejected() {
        let error = BusinessDayCalendar::with_workdays([]).expect_err("should reject");
        assert_eq!(error, CalendarError::NoEligibleWeekday);
    }
}

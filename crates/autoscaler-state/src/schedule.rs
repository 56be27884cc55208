//! Schedule window resolution.
//!
//! Windows are evaluated in the schedule's local time (a fixed UTC
//! offset). Specific-date windows take precedence over recurring ones;
//! among windows of the same kind the first in policy order wins.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

use crate::types::{ActiveWindow, Recurrence, ScheduledOverride, Schedules};

impl Schedules {
    /// The override in force at `now`, if any.
    ///
    /// An unparseable timezone yields `None`; policies are validated on
    /// bind so this only happens for records written by hand.
    pub fn active_override(&self, now: DateTime<Utc>) -> Option<&ScheduledOverride> {
        let offset = self.utc_offset()?;
        let local = now.with_timezone(&offset).naive_local();

        let specific = self
            .overrides
            .iter()
            .filter(|o| matches!(o.window, ActiveWindow::SpecificDate { .. }))
            .find(|o| o.window.is_active(local));
        specific.or_else(|| {
            self.overrides
                .iter()
                .filter(|o| matches!(o.window, ActiveWindow::Recurring { .. }))
                .find(|o| o.window.is_active(local))
        })
    }
}

impl ActiveWindow {
    /// Whether this window covers the given local date-time.
    pub fn is_active(&self, local: NaiveDateTime) -> bool {
        match self {
            ActiveWindow::SpecificDate { start, end } => *start <= local && local < *end,
            ActiveWindow::Recurring {
                start_time,
                end_time,
                recurrence,
                start_date,
                end_date,
            } => {
                let date = local.date();
                if start_date.is_some_and(|d| date < d) || end_date.is_some_and(|d| date > d) {
                    return false;
                }
                let time = local.time();
                recurrence.matches(local) && *start_time <= time && time < *end_time
            }
        }
    }
}

impl Recurrence {
    fn matches(&self, local: NaiveDateTime) -> bool {
        match self {
            Recurrence::DaysOfWeek(days) => {
                let weekday = local.weekday().number_from_monday() as u8;
                days.contains(&weekday)
            }
            Recurrence::DaysOfMonth(days) => days.contains(&(local.day() as u8)),
        }
    }
}

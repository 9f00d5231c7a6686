//! Wall-clock scheduled start

use autopilot_core_types::CommonSettings;
use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use crate::error::SchedulerError;

static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2}))?$").expect("valid regex"));
static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid regex"));

/// Moment a flow should start at.
///
/// Without a date the target is the next occurrence of `time`: today when it is
/// still ahead of now, tomorrow otherwise.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScheduleTarget {
    pub date: Option<NaiveDate>,
    pub time: NaiveTime,
}

impl ScheduleTarget {
    /// Parse `H:MM[:SS]` and an optional `YYYY-MM-DD`.
    ///
    /// A blank time means no schedule. Anything else that does not describe a
    /// real moment is an error, which callers treat as no schedule as well.
    pub fn parse(date: &str, time: &str) -> Result<Option<Self>, SchedulerError> {
        let time = time.trim();
        if time.is_empty() {
            return Ok(None);
        }
        let caps = TIME
            .captures(time)
            .ok_or_else(|| SchedulerError::InvalidSchedule(format!("unparseable time '{}'", time)))?;
        let field = |idx: usize| {
            caps.get(idx)
                .map(|m| m.as_str().parse::<u32>().unwrap_or(u32::MAX))
                .unwrap_or(0)
        };
        let (hour, minute, second) = (field(1), field(2), field(3));
        let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| {
            SchedulerError::InvalidSchedule(format!("time out of range '{}'", time))
        })?;

        let date = date.trim();
        if date.is_empty() {
            return Ok(Some(Self { date: None, time }));
        }
        let caps = DATE
            .captures(date)
            .ok_or_else(|| SchedulerError::InvalidSchedule(format!("unparseable date '{}'", date)))?;
        let part = |idx: usize| caps[idx].parse::<u32>().unwrap_or(0);
        let date = NaiveDate::from_ymd_opt(part(1) as i32, part(2), part(3)).ok_or_else(|| {
            SchedulerError::InvalidSchedule(format!("no such calendar date '{}'", date))
        })?;

        Ok(Some(Self {
            date: Some(date),
            time,
        }))
    }

    pub fn from_settings(common: &CommonSettings) -> Result<Option<Self>, SchedulerError> {
        Self::parse(&common.start_date, &common.start_time)
    }

    /// The concrete instant this target denotes relative to `now`, if it exists
    /// in `now`'s time zone.
    pub fn resolve<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = now.timezone();
        match self.date {
            Some(date) => earliest(&tz, date.and_time(self.time)),
            None => {
                let today = earliest(&tz, now.date_naive().and_time(self.time))?;
                if today > *now {
                    return Some(today);
                }
                let tomorrow = now.date_naive() + Duration::days(1);
                earliest(&tz, tomorrow.and_time(self.time))
            }
        }
    }
}

fn earliest<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(first, _) => Some(first),
        LocalResult::None => None,
    }
}

/// Milliseconds from `now` until the target; zero when there is no target, it
/// does not exist locally, or it already passed.
pub fn delay_until<Tz: TimeZone>(target: Option<&ScheduleTarget>, now: &DateTime<Tz>) -> u64 {
    let Some(at) = target.and_then(|target| target.resolve(now)) else {
        return 0;
    };
    (at - now.clone()).num_milliseconds().max(0) as u64
}

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, h, m, s).unwrap()
    }

    fn target(date: &str, time: &str) -> ScheduleTarget {
        ScheduleTarget::parse(date, time).unwrap().unwrap()
    }

    #[test]
    fn blank_time_means_no_schedule() {
        assert_eq!(ScheduleTarget::parse("2025-03-14", "  ").unwrap(), None);
        assert_eq!(delay_until::<Utc>(None, &at(12, 0, 0)), 0);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        for (date, time) in [
            ("", "24:00"),
            ("", "10:60"),
            ("", "10:00:60"),
            ("", "10"),
            ("", "1000:00"),
            ("2025/03/14", "10:00"),
            ("2025-02-30", "10:00"),
        ] {
            assert!(
                ScheduleTarget::parse(date, time).is_err(),
                "{date:?} {time:?} should be rejected"
            );
        }
    }

    #[test]
    fn undated_target_later_today() {
        let now = at(10, 0, 0);
        assert_eq!(delay_until(Some(&target("", "10:30")), &now), 30 * 60 * 1000);
    }

    #[test]
    fn undated_target_already_passed_rolls_to_tomorrow() {
        let now = at(0, 0, 1);
        assert_eq!(delay_until(Some(&target("", "23:59:00")), &now), 86_339_000);

        let now = at(23, 59, 30);
        assert_eq!(delay_until(Some(&target("", "23:59")), &now), 86_370_000);
    }

    #[test]
    fn exact_match_rolls_to_tomorrow() {
        let now = at(9, 0, 0);
        assert_eq!(delay_until(Some(&target("", "9:00:00")), &now), 86_400_000);
    }

    #[test]
    fn dated_target_in_the_past_is_zero() {
        let now = at(12, 0, 0);
        assert_eq!(delay_until(Some(&target("2025-03-13", "12:00")), &now), 0);
        assert_eq!(delay_until(Some(&target("2025-03-14", "11:59:59")), &now), 0);
        assert_eq!(delay_until(Some(&target("2025-03-14", "12:00:01")), &now), 1_000);
    }

    #[test]
    fn delay_is_stable_for_a_fixed_now() {
        let now = at(8, 15, 0);
        let target = target("2025-03-20", "20:00");
        let first = delay_until(Some(&target), &now);
        assert_eq!(first, delay_until(Some(&target), &now));
        assert!(first > 0);
    }

    #[test]
    fn computation_uses_the_time_zone_of_now() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tokyo.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
        assert_eq!(delay_until(Some(&target("", "10:00")), &now), 3_600_000);
    }

    #[test]
    fn fixed_clock_advances() {
        let start = Local.with_ymd_and_hms(2025, 1, 10, 0, 0, 1).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::seconds(59));
        assert_eq!(clock.now(), start + Duration::seconds(59));
    }
}

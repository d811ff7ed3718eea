//! Execution window of a routine period for a given frequency and reference instant.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use db::models::routine::Frequency;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodWindow<Tz: TimeZone> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> PeriodWindow<Tz> {
    pub fn contains<Other: TimeZone>(&self, instant: &DateTime<Other>) -> bool {
        self.start <= *instant && *instant <= self.end
    }

    pub fn to_utc(&self) -> PeriodWindow<Utc> {
        PeriodWindow {
            start: self.start.with_timezone(&Utc),
            end: self.end.with_timezone(&Utc),
        }
    }
}

/// Window containing `reference`, with day boundaries taken in `reference`'s time zone.
///
/// - `Diaria`: the reference day
/// - `Semanal`: Monday through Sunday of the reference week
/// - `Quinzenal`: Monday of the reference week through Sunday of the following week
/// - `Mensal`: the calendar month
///
/// Frequencies without a rule of their own (`Anual`, `Customizada`) use the daily window.
pub fn period_window<Tz: TimeZone>(frequency: Frequency, reference: &DateTime<Tz>) -> PeriodWindow<Tz> {
    let tz = reference.timezone();
    let today = reference.date_naive();

    let (first_day, last_day) = match frequency {
        Frequency::Diaria => (today, today),
        Frequency::Semanal => {
            let monday = week_start(today);
            (monday, monday + Days::new(6))
        }
        Frequency::Quinzenal => {
            let monday = week_start(today);
            (monday, monday + Days::new(13))
        }
        Frequency::Mensal => (first_of_month(today), last_of_month(today)),
        Frequency::Anual | Frequency::Customizada => (today, today),
    };

    PeriodWindow {
        start: start_of_day(&tz, first_day),
        end: end_of_day(&tz, last_day),
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let local = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&local)
        .earliest()
        .unwrap_or_else(|| skip_gap(tz, local))
}

/// Last millisecond of the day (23:59:59.999).
fn end_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let local = date.and_time(NaiveTime::MIN) + TimeDelta::days(1) - TimeDelta::milliseconds(1);
    tz.from_local_datetime(&local)
        .latest()
        .unwrap_or_else(|| skip_gap(tz, local))
}

/// Local times inside a DST gap do not exist; move past the gap.
fn skip_gap<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    let shifted = local + TimeDelta::hours(1);
    tz.from_local_datetime(&shifted)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&local))
}

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone};

/// This is the standard way of converting a date to a record file name in tabtally.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    let next = date + Duration::days(1);
    next.clone().with_time(NaiveTime::MIN).earliest().unwrap_or(next)
}

/// Timestamp layout shared by uploaded rows and the tsv output, e.g. `2018-07-04 00:00:00+00:00`.
pub fn format_timestamp<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.format("%Y-%m-%d %H:%M:%S%:z").to_string()
}

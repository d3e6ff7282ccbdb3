//! Reads records exported from the spreadsheet as tab separated values.

use std::io::BufRead;

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::warn;

use crate::tracker::record::SessionRecord;

use super::query::RecordColumn;

/// Parses rows in the given column layout. Rows with a wrong number of cells or unreadable
/// dates are skipped. Rows without an active column count the whole span as active.
pub fn read_records(
    reader: impl BufRead,
    columns: &[RecordColumn],
    has_header: bool,
) -> Result<Vec<SessionRecord>> {
    let position = |column| columns.iter().position(|v| *v == column);
    let (Some(url_at), Some(start_at), Some(end_at)) = (
        position(RecordColumn::Url),
        position(RecordColumn::Start),
        position(RecordColumn::End),
    ) else {
        anyhow::bail!("Input columns must include url, start and end");
    };
    let active_at = position(RecordColumn::Active);

    let mut records = vec![];
    for line in reader.lines().skip(usize::from(has_header)) {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let cells = line.split('\t').map(str::trim).collect::<Vec<_>>();
        if cells.len() != columns.len() {
            warn!("Expected {} columns in {line:?}", columns.len());
            continue;
        }
        let (Some(start), Some(end)) = (
            parse_timestamp(cells[start_at]),
            parse_timestamp(cells[end_at]),
        ) else {
            warn!("Could not parse dates in {line:?}");
            continue;
        };
        let (start, end) = (start.with_timezone(&Utc), end.with_timezone(&Utc));
        let active = match active_at.map(|i| parse_seconds(cells[i])) {
            Some(None) => {
                warn!("Could not parse active time in {line:?}");
                continue;
            }
            Some(Some(active)) => active,
            None => end - start,
        };
        records.push(SessionRecord {
            url: cells[url_at].into(),
            start,
            end,
            active,
        });
    }
    Ok(records)
}

/// Accepts the format used for uploads (`2001-01-01 00:00:00-07:00`) and the one browsers
/// produce for `Date.toString()` (`Mon Jan 01 2001 00:00:00 GMT-0700 (PDT)`).
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(v) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(v);
    }
    if let Ok(v) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%z") {
        return Some(v);
    }
    // The zone name in parentheses is informational only.
    let value = match value.find(" (") {
        Some(i) => &value[..i],
        None => value,
    };
    DateTime::parse_from_str(value, "%a %b %d %Y %H:%M:%S GMT%z").ok()
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let seconds = value.parse::<f64>().ok()?;
    let millis = (seconds * 1000.).round();
    if !millis.is_finite() || millis < 0. || millis >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

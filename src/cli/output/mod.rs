pub mod analysis;

use std::{future, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use futures::{stream, Stream, StreamExt};
use tracing::error;

use crate::{daemon::storage::record_storage::RecordStorage, tracker::record::SessionRecord};

pub struct ExtractConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExtractConfig {
    /// Records belong to the range their session started in.
    fn filter(&self, record: SessionRecord) -> Option<SessionRecord> {
        (self.start <= record.start && record.start < self.end).then_some(record)
    }
}

/// Extracts [SessionRecord] that started between 2 dates. To do it in an efficient manner streams
/// are used.
pub fn extract_between(
    storage: impl RecordStorage,
    config: ExtractConfig,
) -> impl Stream<Item = Result<SessionRecord>> {
    let storage = Arc::new(storage);
    let start = config.start;
    let end = config.end;

    let date_iteration = date_range(start.date_naive(), end.date_naive());

    let files = date_iteration
        .map(move |day| {
            let storage = storage.clone();
            async move { (day, storage.get_data_for(day).await) }
        })
        .buffered(4);

    files
        .flat_map(|(day, data)| match data {
            Ok(data) => stream::iter(data).map(Ok).boxed(),
            Err(e) => {
                error!("Failed to process file {day} {e}");
                stream::once(future::ready(Err(e))).boxed()
            }
        })
        .filter_map(move |v| future::ready(v.map(|v| config.filter(v)).transpose()))
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold(Some(start), move |current| {
        future::ready(match current {
            Some(current) if current <= end => Some((current, current.succ_opt())),
            _ => None,
        })
    })
}

use anyhow::Result;
use chrono::NaiveDate;

use crate::{
    daemon::storage::record_storage::{RecordFileHandle, RecordStorage},
    tracker::record::SessionRecord,
};

use super::module::RecordProcessor;

/// Represents saving module. Saving module main goal is to bridge
/// [ProcessingModule](super::ProcessingModule) and [RecordStorage], keeping every record on disk
/// whether or not it could be uploaded.
pub struct LocalSaver<R: RecordStorage> {
    records_storage: R,
    current_handle: Option<R::RecordFile>,
}

impl<R: RecordStorage> LocalSaver<R> {
    pub fn new(records_storage: R) -> Self {
        Self {
            records_storage,
            current_handle: None,
        }
    }

    /// Returns the handle for `date`, reusing the current one while the day doesn't change.
    async fn move_file_handle(&mut self, date: NaiveDate) -> Result<R::RecordFile> {
        match self.current_handle.take() {
            Some(mut file) if file.get_date() != date => {
                file.flush().await?;
            }
            Some(v) => return Ok(v),
            None => {}
        };
        self.records_storage.create_or_append_record(date).await
    }
}

impl<R: RecordStorage> RecordProcessor for LocalSaver<R> {
    async fn process_next(&mut self, record: SessionRecord) -> Result<()> {
        let mut active_file = self.move_file_handle(record.start.date_naive()).await?;
        let result = active_file.append(vec![record]).await;
        self.current_handle = Some(active_file);
        result
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(v) = self.current_handle.as_mut() {
            v.flush().await?;
        }
        Ok(())
    }
}

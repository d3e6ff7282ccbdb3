use anyhow::Result;

use crate::tracker::record::SessionRecord;

/// Represents a record processor. This abstracts over the places a finished session can go:
/// local storage, a remote spreadsheet.
pub trait RecordProcessor {
    fn process_next(
        &mut self,
        record: SessionRecord,
    ) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}

/// Feeds every record to both processors. A failure of one doesn't prevent the other from
/// seeing the record.
impl<A: RecordProcessor, B: RecordProcessor> RecordProcessor for (A, B) {
    async fn process_next(&mut self, record: SessionRecord) -> Result<()> {
        let first = self.0.process_next(record.clone()).await;
        let second = self.1.process_next(record).await;
        first.and(second)
    }

    async fn finalize(&mut self) -> Result<()> {
        let first = self.0.finalize().await;
        let second = self.1.finalize().await;
        first.and(second)
    }
}

use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::{tracker::record::SessionRecord, utils::time::date_to_record_name};

/// Interface for abstracting storage of records.
pub trait RecordStorage {
    type RecordFile: RecordFileHandle;

    /// Opens or creates a new record file that will be used for storing data.
    /// Data is supposed to be written into a file for a specific day to increase efficiency.
    fn create_or_append_record(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Self::RecordFile>>;

    /// Retrieves data from a record file for a certain day.
    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<SessionRecord>>> + Send;
}

impl<T: Deref> RecordStorage for T
where
    T::Target: RecordStorage,
{
    type RecordFile = <T::Target as RecordStorage>::RecordFile;

    fn create_or_append_record(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Self::RecordFile>> {
        self.deref().create_or_append_record(date)
    }

    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<SessionRecord>>> + Send {
        self.deref().get_data_for(date)
    }
}

pub trait RecordFileHandle {
    fn append(&mut self, records: Vec<SessionRecord>) -> impl Future<Output = Result<()>>;
    fn get_date(&self) -> NaiveDate;
    fn flush(&mut self) -> impl Future<Output = Result<()>>;
}

/// The main realization of [RecordStorage].
pub struct RecordStorageImpl {
    record_dir: PathBuf,
}

impl RecordStorageImpl {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    async fn get_all_inner(&self, path: &Path) -> Result<Vec<SessionRecord>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<SessionRecord>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let mut buffer = BufReader::new(file);
            let mut records = vec![];
            loop {
                let mut line = Vec::new();
                if buffer.read_until(b'\n', &mut line).await? == 0 {
                    break;
                }
                let v = match String::from_utf8(line) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("During parsing in path {:?} found a non utf-8 line: {e}", path);
                        continue;
                    }
                };
                if v.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<SessionRecord>(&v) {
                    Ok(v) => records.push(v),
                    Err(e) => {
                        // ignore illegal values. Might happen after shutdowns
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &v
                        )
                    }
                }
            }

            buffer.into_inner().unlock_async().await?;

            Ok(records)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }
}

impl RecordStorage for RecordStorageImpl {
    type RecordFile = SessionRecordFile<File>;

    async fn create_or_append_record(&self, date: NaiveDate) -> Result<Self::RecordFile> {
        let file_name = date_to_record_name(date);
        let path = self.record_dir.join(file_name);

        let v = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(path)
            .await?;

        Ok(SessionRecordFile::new(v, date))
    }

    async fn get_data_for(&self, date: NaiveDate) -> Result<Vec<SessionRecord>> {
        let file_name = date_to_record_name(date);
        let path = self.record_dir.join(file_name);
        let data = self.get_all_inner(&path).await?;
        Ok(data)
    }
}

pub struct SessionRecordFile<F> {
    file: F,
    date: NaiveDate,
}

impl<F: AsyncSeek + AsyncWrite + AsyncFileExt + Unpin> RecordFileHandle for SessionRecordFile<F> {
    async fn append(&mut self, records: Vec<SessionRecord>) -> Result<()> {
        self.append_inner(records).await
    }

    fn get_date(&self) -> NaiveDate {
        self.date
    }

    async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}

impl<F: AsyncSeek + AsyncWrite + AsyncFileExt + Unpin> SessionRecordFile<F> {
    fn new(file: F, date: NaiveDate) -> Self {
        Self { file, date }
    }

    async fn append_inner(&mut self, records: Vec<SessionRecord>) -> Result<()> {
        // Semi-safe acquire-release for a file
        self.file.lock_exclusive()?;
        let result = Self::append_with_file(&mut self.file, records).await;
        self.file.unlock_async().await?;
        result
    }

    async fn append_with_file(file: &mut F, records: Vec<SessionRecord>) -> Result<()> {
        let mut buffer = Vec::<u8>::new();
        for record in records {
            serde_json::to_writer(&mut buffer, &record)?;
            buffer.push(b'\n');
        }

        // Another process might have written since the last append.
        file.seek(std::io::SeekFrom::End(0)).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}

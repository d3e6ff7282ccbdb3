use std::time::Duration;

use anyhow::Result;
use reqwest::{header::CONTENT_TYPE, RequestBuilder, StatusCode};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::{
    daemon::settings::UploadTarget,
    tracker::record::SessionRecord,
    utils::time::format_timestamp,
};

use super::module::RecordProcessor;

pub const DEFAULT_FEED_URL: &str = "https://spreadsheets.google.com/feeds";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("spreadsheet rejected the row with {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Appends records as rows of a spreadsheet worksheet.
///
/// Uploads are fire-and-forget: each one runs in its own task, failures are logged and never
/// retried. Records are silently kept back while the destination or the token is unknown.
pub struct SheetUploader {
    client: reqwest::Client,
    base_url: String,
    target: watch::Receiver<UploadTarget>,
    in_flight: TaskTracker,
}

impl SheetUploader {
    pub fn new(base_url: impl Into<String>, target: watch::Receiver<UploadTarget>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            target,
            in_flight: TaskTracker::new(),
        })
    }
}

impl RecordProcessor for SheetUploader {
    async fn process_next(&mut self, record: SessionRecord) -> Result<()> {
        if let Err(e) = record.validate() {
            warn!("Not uploading {:?}: {e}", record);
            return Ok(());
        }

        let request = {
            let target = self.target.borrow();
            let Some((endpoint, token)) = target.endpoint(&self.base_url) else {
                debug!("Upload target is incomplete, keeping {} local", record.url);
                return Ok(());
            };
            self.client
                .post(endpoint)
                .bearer_auth(token)
                .header(CONTENT_TYPE, "application/atom+xml")
                .body(atom_entry(&record))
        };

        info!("Uploading {} from {} to {}", record.url, record.start, record.end);
        self.in_flight.spawn(async move {
            match send(request).await {
                Ok(()) => info!("Uploaded {}", record.url),
                Err(e) => error!("Failed to upload {}: {e}", record.url),
            }
        });
        Ok(())
    }

    /// Waits for uploads that are still running.
    async fn finalize(&mut self) -> Result<()> {
        self.in_flight.close();
        self.in_flight.wait().await;
        Ok(())
    }
}

async fn send(request: RequestBuilder) -> Result<(), UploadError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UploadError::Rejected { status, body });
    }
    Ok(())
}

/// Builds a list feed row. Column names are the lowercase worksheet headers.
fn atom_entry(record: &SessionRecord) -> String {
    let columns = [
        ("url", escape_xml(&record.url)),
        ("start", format_timestamp(&record.start)),
        ("end", format_timestamp(&record.end)),
        ("active", record.active_seconds().to_string()),
    ];
    let mut entry = String::from(
        "<entry xmlns=\"http://www.w3.org/2005/Atom\" \
         xmlns:gsx=\"http://schemas.google.com/spreadsheets/2006/extended\">",
    );
    for (name, value) in columns {
        entry.push_str(&format!("<gsx:{name}>{value}</gsx:{name}>"));
    }
    entry.push_str("</entry>");
    entry
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        sync::watch,
    };

    use crate::{
        daemon::{processing::module::RecordProcessor, settings::UploadTarget},
        tracker::record::SessionRecord,
        utils::logging::TEST_LOGGING,
    };

    use super::{atom_entry, SheetUploader};

    fn record() -> SessionRecord {
        let start = Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap();
        SessionRecord {
            url: "https://example.com/?a=1&b=<2>".into(),
            start,
            end: start + Duration::seconds(25),
            active: Duration::milliseconds(20_500),
        }
    }

    fn complete_target() -> UploadTarget {
        UploadTarget {
            token: Some("token".into()),
            spreadsheet_id: Some("sheet".into()),
            worksheet_id: Some("od6".into()),
        }
    }

    #[test]
    fn test_atom_entry_contains_escaped_columns() {
        let entry = atom_entry(&record());
        assert!(entry.starts_with("<entry xmlns=\"http://www.w3.org/2005/Atom\""));
        assert!(entry.contains("<gsx:url>https://example.com/?a=1&amp;b=&lt;2&gt;</gsx:url>"));
        assert!(entry.contains("<gsx:start>2018-07-04 10:00:00+00:00</gsx:start>"));
        assert!(entry.contains("<gsx:end>2018-07-04 10:00:25+00:00</gsx:end>"));
        assert!(entry.contains("<gsx:active>20.5</gsx:active>"));
        assert!(entry.ends_with("</entry>"));
    }

    #[tokio::test]
    async fn test_incomplete_target_is_silent_noop() -> Result<()> {
        let (_sender, target) = watch::channel(UploadTarget {
            token: Some("token".into()),
            ..Default::default()
        });
        let mut uploader = SheetUploader::new("http://127.0.0.1:9", target)?;
        uploader.process_next(record()).await?;
        assert!(uploader.in_flight.is_empty());
        uploader.finalize().await
    }

    #[tokio::test]
    async fn test_invalid_record_is_not_uploaded() -> Result<()> {
        let (_sender, target) = watch::channel(complete_target());
        let mut uploader = SheetUploader::new("http://127.0.0.1:9", target)?;
        let mut record = record();
        record.end = record.start;
        uploader.process_next(record).await?;
        assert!(uploader.in_flight.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_upload_is_only_logged() -> Result<()> {
        *TEST_LOGGING;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        drop(listener);

        let (_sender, target) = watch::channel(complete_target());
        let mut uploader = SheetUploader::new(format!("http://{address}"), target)?;
        uploader.process_next(record()).await?;
        uploader.finalize().await
    }

    #[tokio::test]
    async fn test_upload_posts_entry_with_token() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await?;
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            loop {
                let read = socket.read(&mut buffer).await?;
                request.extend_from_slice(&buffer[..read]);
                if read == 0 || request.ends_with(b"</entry>") {
                    break;
                }
            }
            let response = b"HTTP/1.1 201 Created\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
            socket.write_all(response).await?;
            anyhow::Ok(String::from_utf8_lossy(&request).to_string())
        });

        let (sender, target) = watch::channel(UploadTarget::default());
        let mut uploader = SheetUploader::new(format!("http://{address}/feeds"), target)?;
        sender.send(complete_target())?;
        uploader.process_next(record()).await?;
        uploader.finalize().await?;

        let request = server.await??;
        assert!(request.starts_with("POST /feeds/list/sheet/od6/private/full HTTP/1.1"));
        assert!(request.contains("authorization: Bearer token"));
        assert!(request.contains("content-type: application/atom+xml"));
        assert!(request.contains("<gsx:active>20.5</gsx:active>"));
        Ok(())
    }
}

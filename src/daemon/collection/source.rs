use std::io::ErrorKind;

use async_trait::async_trait;
use clap::ValueEnum;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, Lines};

use super::message::HostMessage;

/// Browsers refuse to send larger messages to native hosts anyway.
const MAX_NATIVE_MESSAGE_SIZE: u32 = 1024 * 1024;

/// How messages are delimited on the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Framing {
    /// One JSON object per line.
    #[default]
    Lines,
    /// Native messaging: 32-bit native-endian length followed by JSON.
    Native,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// A single message was unreadable. The stream itself is still usable.
    #[error("illegal message {message}: {reason}")]
    Decode { message: String, reason: String },
    #[error("message of {0} bytes exceeds the limit")]
    Oversized(u32),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether further reads would return garbage or fail again.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SourceError::Decode { .. })
    }
}

fn decode(message: &[u8]) -> Result<HostMessage, SourceError> {
    serde_json::from_slice(message).map_err(|e| SourceError::Decode {
        message: String::from_utf8_lossy(message).into_owned(),
        reason: e.to_string(),
    })
}

/// Source of host messages. `Ok(None)` means the host went away.
#[async_trait]
pub trait EventSource: Send {
    async fn next_message(&mut self) -> Result<Option<HostMessage>, SourceError>;
}

pub struct LineEventSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> LineEventSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for LineEventSource<R> {
    async fn next_message(&mut self) -> Result<Option<HostMessage>, SourceError> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                // The offending line has been consumed, so reading can go on.
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    return Err(SourceError::Decode {
                        message: "<not utf-8>".to_owned(),
                        reason: e.to_string(),
                    })
                }
                Err(e) => return Err(e.into()),
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return decode(line.as_bytes()).map(Some);
        }
    }
}

pub struct NativeEventSource<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> NativeEventSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> EventSource for NativeEventSource<R> {
    async fn next_message(&mut self) -> Result<Option<HostMessage>, SourceError> {
        let mut length = [0; 4];
        match self.reader.read_exact(&mut length).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let length = u32::from_ne_bytes(length);
        if length > MAX_NATIVE_MESSAGE_SIZE {
            // The stream can't be resynchronized after this.
            return Err(SourceError::Oversized(length));
        }

        self.buffer.resize(length as usize, 0);
        self.reader.read_exact(&mut self.buffer).await?;
        decode(&self.buffer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tokio::io::BufReader;

    use crate::{
        daemon::collection::message::{HostMessage, IdleState},
        tracker::record::ContextId,
    };

    use super::{EventSource, LineEventSource, NativeEventSource, SourceError};

    fn frame(json: &str) -> Vec<u8> {
        let mut framed = (json.len() as u32).to_ne_bytes().to_vec();
        framed.extend_from_slice(json.as_bytes());
        framed
    }

    #[tokio::test]
    async fn test_line_source_skips_blank_lines() -> Result<()> {
        let input = b"{\"action\": \"blur\", \"contextId\": 1}\n\n  \n{\"action\": \"system-idle-changed\", \"state\": \"idle\"}\n";
        let mut source = LineEventSource::new(BufReader::new(&input[..]));

        assert_eq!(
            source.next_message().await?,
            Some(HostMessage::Blur {
                context_id: ContextId(1)
            })
        );
        assert_eq!(
            source.next_message().await?,
            Some(HostMessage::SystemIdleChanged {
                state: IdleState::Idle
            })
        );
        assert_eq!(source.next_message().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_line_source_continues_after_illegal_line() -> Result<()> {
        let input = b"not json\n{\"action\": \"blur\", \"contextId\": 2}\n";
        let mut source = LineEventSource::new(BufReader::new(&input[..]));

        let error = source.next_message().await.unwrap_err();
        assert!(!error.is_fatal());
        assert_eq!(
            source.next_message().await?,
            Some(HostMessage::Blur {
                context_id: ContextId(2)
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_line_source_continues_after_invalid_utf8() -> Result<()> {
        let input = b"\xff\xfe\n{\"action\": \"blur\", \"contextId\": 3}\n";
        let mut source = LineEventSource::new(BufReader::new(&input[..]));

        let error = source.next_message().await.unwrap_err();
        assert!(!error.is_fatal());
        assert_eq!(
            source.next_message().await?,
            Some(HostMessage::Blur {
                context_id: ContextId(3)
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_native_source_skips_undecodable_frame() -> Result<()> {
        let mut input = frame("{not json}");
        input.extend(frame(r#"{"action": "blur", "contextId": 4}"#));
        let mut source = NativeEventSource::new(&input[..]);

        let error = source.next_message().await.unwrap_err();
        assert!(!error.is_fatal());
        assert_eq!(
            source.next_message().await?,
            Some(HostMessage::Blur {
                context_id: ContextId(4)
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_native_source_truncated_frame_is_fatal() {
        let mut input = frame(r#"{"action": "blur", "contextId": 4}"#);
        input.truncate(10);
        let mut source = NativeEventSource::new(&input[..]);

        let error = source.next_message().await.unwrap_err();
        assert!(matches!(error, SourceError::Io(_)));
        assert!(error.is_fatal());
    }

    #[tokio::test]
    async fn test_native_source_reads_frames() -> Result<()> {
        let mut input = frame(r#"{"action": "context-removed", "tabId": 9}"#);
        input.extend(frame(r#"{"action": "blur", "contextId": 9}"#));
        let mut source = NativeEventSource::new(&input[..]);

        assert_eq!(
            source.next_message().await?,
            Some(HostMessage::ContextRemoved {
                context_id: ContextId(9)
            })
        );
        assert_eq!(
            source.next_message().await?,
            Some(HostMessage::Blur {
                context_id: ContextId(9)
            })
        );
        assert_eq!(source.next_message().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_native_source_rejects_oversized_frames() {
        let input = u32::MAX.to_ne_bytes();
        let mut source = NativeEventSource::new(&input[..]);
        let error = source.next_message().await.unwrap_err();
        assert!(matches!(error, SourceError::Oversized(u32::MAX)));
        assert!(error.is_fatal());
    }
}

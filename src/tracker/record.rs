use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Identifier of a monitored context. For browsers this is the tab id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub i64);

impl Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A finished viewing session. Records are only produced when a session that has a url is
/// stopped, and are handed to sinks by value.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct SessionRecord {
    pub url: Arc<str>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Time the session spent in the started state. Never exceeds `end - start`.
    #[serde(rename = "active_seconds", with = "seconds_ser")]
    pub active: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record has an empty url")]
    EmptyUrl,
    #[error("record ends at {end} which is not after its start {start}")]
    NonPositiveSpan {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("active time {active} is outside of [0, {span}]")]
    ActiveOutOfRange { active: Duration, span: Duration },
}

impl SessionRecord {
    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    pub fn active_seconds(&self) -> f64 {
        self.active.num_milliseconds() as f64 / 1000.
    }

    /// Checks the contract remote stores rely on.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.url.is_empty() {
            return Err(RecordError::EmptyUrl);
        }
        if self.end <= self.start {
            return Err(RecordError::NonPositiveSpan {
                start: self.start,
                end: self.end,
            });
        }
        let span = self.span();
        if self.active < Duration::zero() || self.active > span {
            return Err(RecordError::ActiveOutOfRange {
                active: self.active,
                span,
            });
        }
        Ok(())
    }
}

mod seconds_ser {
    use chrono::Duration;
    use serde::{self, de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.num_milliseconds() as f64 / 1000.)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = f64::deserialize(deserializer)?;
        let millis = (s * 1000.).round();
        // i64::MAX is not representable as f64, so the upper bound is exclusive.
        if !millis.is_finite() || millis < i64::MIN as f64 || millis >= i64::MAX as f64 {
            return Err(D::Error::custom(format!("{s} seconds is out of range")));
        }
        Duration::try_milliseconds(millis as i64)
            .ok_or_else(|| D::Error::custom(format!("{s} seconds is out of range")))
    }
}

/// Destination of finished records. Implementations must return immediately: delivery is
/// best-effort and its outcome is never reported back to the caller.
#[cfg_attr(test, mockall::automock)]
pub trait RecordSink: Send {
    fn upload(&self, record: SessionRecord);
}

/// Forwards records into the processing pipeline without waiting for capacity.
pub struct ChannelSink {
    next: mpsc::Sender<SessionRecord>,
}

impl ChannelSink {
    pub fn new(next: mpsc::Sender<SessionRecord>) -> Self {
        Self { next }
    }
}

impl RecordSink for ChannelSink {
    fn upload(&self, record: SessionRecord) {
        debug!("Queueing record {:?}", record);
        match self.next.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                warn!("Record queue is full, dropping {:?}", record)
            }
            Err(TrySendError::Closed(record)) => {
                warn!("Record queue is closed, dropping {:?}", record)
            }
        }
    }
}

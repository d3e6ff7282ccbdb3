use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::record::{ContextId, SessionRecord};

/// Lifecycle of a viewing session. Timestamps only exist while a session is running, so a
/// stopped session can't carry stale ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Started {
        session_start: DateTime<Utc>,
        last_resume: DateTime<Utc>,
    },
    Paused {
        session_start: DateTime<Utc>,
    },
}

/// Time tracking state of a single context.
///
/// Every transition accepts the current time explicitly. Transitions that are not valid for the
/// current state are logged and ignored: hosts deliver events out of order often enough that
/// failing on them would only lose data.
#[derive(Debug)]
pub struct Session {
    context_id: ContextId,
    url: Option<Arc<str>>,
    state: SessionState,
    active: Duration,
}

impl Session {
    pub fn new(context_id: ContextId) -> Self {
        Self {
            context_id,
            url: None,
            state: SessionState::Stopped,
            active: Duration::zero(),
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn url(&self) -> Option<&Arc<str>> {
        self.url.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        matches!(self.state, SessionState::Started { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, SessionState::Paused { .. })
    }

    /// Active time accumulated so far, including the currently running stretch.
    pub fn active_duration(&self, now: DateTime<Utc>) -> Duration {
        match self.state {
            SessionState::Started { last_resume, .. } => self.active + elapsed(last_resume, now),
            SessionState::Paused { .. } | SessionState::Stopped => self.active,
        }
    }

    pub fn set_url(&mut self, url: impl Into<Arc<str>>) {
        let url = url.into();
        if self.url.as_ref() != Some(&url) {
            debug!(context = %self.context_id, "url {:?} -> {url}", self.url);
            self.url = Some(url);
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        match self.state {
            SessionState::Stopped => {
                debug!(context = %self.context_id, "start at {now}");
                self.active = Duration::zero();
                self.state = SessionState::Started {
                    session_start: now,
                    last_resume: now,
                };
            }
            state => warn!(context = %self.context_id, "start ignored in state {state:?}"),
        }
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        match self.state {
            SessionState::Started {
                session_start,
                last_resume,
            } => {
                self.active += elapsed(last_resume, now);
                debug!(context = %self.context_id, "pause at {now}, active {}", self.active);
                self.state = SessionState::Paused { session_start };
            }
            state => warn!(context = %self.context_id, "pause ignored in state {state:?}"),
        }
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        match self.state {
            SessionState::Paused { session_start } => {
                debug!(context = %self.context_id, "resume at {now}");
                self.state = SessionState::Started {
                    session_start,
                    last_resume: now,
                };
            }
            state => warn!(context = %self.context_id, "resume ignored in state {state:?}"),
        }
    }

    /// Ends the session. A record is returned only when the session knew its url.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<SessionRecord> {
        let session_start = match self.state {
            SessionState::Stopped => {
                warn!(context = %self.context_id, "stop ignored, session is not running");
                return None;
            }
            SessionState::Started {
                session_start,
                last_resume,
            } => {
                self.active += elapsed(last_resume, now);
                session_start
            }
            SessionState::Paused { session_start } => session_start,
        };

        let active = std::mem::replace(&mut self.active, Duration::zero());
        let url = self.url.take();
        self.state = SessionState::Stopped;

        debug!(context = %self.context_id, "stop at {now}, active {active}");
        match url {
            Some(url) => Some(SessionRecord {
                url,
                start: session_start,
                end: now.max(session_start),
                active,
            }),
            None => {
                warn!(context = %self.context_id, "stop without url, nothing to record");
                None
            }
        }
    }

    /// Discards a running session without producing a record.
    pub fn cancel(&mut self) {
        if self.state == SessionState::Stopped {
            debug!(context = %self.context_id, "cancel ignored, session is not running");
            return;
        }
        debug!(context = %self.context_id, "cancel, url {:?}", self.url);
        self.state = SessionState::Stopped;
        self.active = Duration::zero();
        self.url = None;
    }
}

/// Clocks may step backwards, active time must not.
fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).max(Duration::zero())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use crate::tracker::record::ContextId;

    use super::{Session, SessionState};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE) + Duration::seconds(seconds)
    }

    fn session() -> Session {
        Session::new(ContextId(1))
    }

    #[test]
    fn test_pause_resume_scenario() {
        let mut session = session();
        session.set_url("https://example.com");
        session.start(at(0));
        session.pause(at(10));
        session.resume(at(15));
        let record = session.stop(at(25)).expect("session had a url");

        assert_eq!(&*record.url, "https://example.com");
        assert_eq!(record.start, at(0));
        assert_eq!(record.end, at(25));
        assert_eq!(record.active, Duration::seconds(20));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.url().is_none());
    }

    #[test]
    fn test_active_time_is_sum_of_started_intervals() {
        let mut session = session();
        session.set_url("https://example.com/a");
        session.start(at(0));
        let mut expected = Duration::zero();
        let mut now = 0;
        for (active, idle) in [(3, 7), (11, 2), (5, 0), (0, 4)] {
            now += active;
            expected += Duration::seconds(active);
            session.pause(at(now));
            assert_eq!(session.active_duration(at(now)), expected);
            now += idle;
            session.resume(at(now));
        }
        now += 6;
        expected += Duration::seconds(6);

        let record = session.stop(at(now)).unwrap();
        assert_eq!(record.active, expected);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_stop_while_paused_keeps_only_active_time() {
        let mut session = session();
        session.set_url("https://example.com");
        session.start(at(0));
        session.pause(at(4));
        let record = session.stop(at(100)).unwrap();
        assert_eq!(record.active, Duration::seconds(4));
        assert_eq!(record.end, at(100));
    }

    #[test]
    fn test_double_start_keeps_first_timestamps() {
        let mut session = session();
        session.set_url("https://example.com");
        session.start(at(0));
        session.start(at(5));
        assert_eq!(
            session.state(),
            SessionState::Started {
                session_start: at(0),
                last_resume: at(0)
            }
        );
        assert_eq!(session.stop(at(8)).unwrap().active, Duration::seconds(8));
    }

    #[test]
    fn test_double_stop_is_harmless() {
        let mut session = session();
        session.set_url("https://example.com");
        session.start(at(0));
        assert!(session.stop(at(1)).is_some());
        assert!(session.stop(at(2)).is_none());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_stop_without_url_emits_nothing() {
        let mut session = session();
        session.start(at(0));
        assert!(session.stop(at(3)).is_none());
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.active_duration(at(3)), Duration::zero());
    }

    #[test]
    fn test_invalid_transitions_are_ignored() {
        let mut session = session();
        session.pause(at(1));
        session.resume(at(2));
        assert_eq!(session.state(), SessionState::Stopped);

        session.start(at(3));
        session.resume(at(4));
        assert!(session.is_started());

        session.pause(at(5));
        session.pause(at(6));
        session.start(at(7));
        assert_eq!(
            session.state(),
            SessionState::Paused {
                session_start: at(3)
            }
        );
        assert_eq!(session.active_duration(at(20)), Duration::seconds(2));
    }

    #[test]
    fn test_cancel_discards_session() {
        let mut session = session();
        session.set_url("https://example.com");
        session.start(at(0));
        session.cancel();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.stop(at(5)).is_none());

        session.cancel();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_clock_going_backwards_adds_nothing() {
        let mut session = session();
        session.set_url("https://example.com");
        session.start(at(10));
        session.pause(at(5));
        assert_eq!(session.active_duration(at(5)), Duration::zero());
        let record = session.stop(at(5)).unwrap();
        assert_eq!(record.active, Duration::zero());
        assert_eq!(record.end, at(10));
    }

    #[test]
    fn test_immediate_resume_and_pause_adds_nothing() {
        let mut session = session();
        session.set_url("https://example.com");
        session.start(at(0));
        session.pause(at(2));
        session.resume(at(9));
        session.pause(at(9));
        assert_eq!(session.active_duration(at(9)), Duration::seconds(2));
    }

    #[test]
    fn test_set_url_does_not_change_state() {
        let mut session = session();
        session.set_url("https://a.example");
        session.set_url("https://a.example");
        assert_eq!(session.state(), SessionState::Stopped);
        session.start(at(0));
        session.set_url("https://b.example");
        assert!(session.is_started());
        assert_eq!(session.url().map(|v| &**v), Some("https://b.example"));
    }
}

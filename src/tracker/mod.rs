//! Core of the application. Turns host events into session transitions and hands finished
//! sessions to a [RecordSink].
//!
//! The policy is:
//!  - Only one context is active at a time. Activating another context stops the previous one.
//!  - Navigation of the active context always closes a record and opens a new session.
//!  - Removing a context that isn't active discards its session without a record.
//!  - Idleness pauses the active session instead of ending it.

pub mod record;
pub mod registry;
pub mod session;

use std::sync::Arc;

use record::{ContextId, RecordSink};
use registry::SessionRegistry;
use tracing::{debug, info};

use crate::utils::clock::Clock;

/// Events delivered by the host environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    ContextCreated {
        context_id: ContextId,
        url: Option<Arc<str>>,
    },
    ContextRemoved {
        context_id: ContextId,
    },
    /// `url` may be missing when the host has to look it up separately. The lookup result
    /// arrives later as [TrackerEvent::ContextUrlResolved].
    ContextActivated {
        context_id: ContextId,
        url: Option<Arc<str>>,
    },
    ContextUrlChanged {
        context_id: ContextId,
        url: Arc<str>,
    },
    ContextUrlResolved {
        context_id: ContextId,
        url: Arc<str>,
    },
    ContextReplaced {
        added: ContextId,
        removed: ContextId,
        url: Option<Arc<str>>,
    },
    ContextFocused {
        context_id: ContextId,
        url: Option<Arc<str>>,
    },
    ContextBlurred {
        context_id: ContextId,
    },
    SystemIdleChanged {
        idle: bool,
    },
}

pub struct TabTracker {
    registry: SessionRegistry,
    active: Option<ContextId>,
    idle: bool,
    clock: Box<dyn Clock>,
    sink: Box<dyn RecordSink>,
}

impl TabTracker {
    pub fn new(clock: Box<dyn Clock>, sink: Box<dyn RecordSink>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            active: None,
            idle: false,
            clock,
            sink,
        }
    }

    pub fn active_context(&self) -> Option<ContextId> {
        self.active
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn handle(&mut self, event: TrackerEvent) {
        debug!("Handling {:?}", event);
        match event {
            TrackerEvent::ContextCreated { context_id, url } => {
                let session = self.registry.get_or_create(context_id);
                if let Some(url) = url {
                    session.set_url(url);
                }
            }
            TrackerEvent::ContextRemoved { context_id } => self.remove(context_id),
            TrackerEvent::ContextActivated { context_id, url }
            | TrackerEvent::ContextFocused { context_id, url } => self.activate(context_id, url),
            TrackerEvent::ContextUrlChanged { context_id, url } => self.navigate(context_id, url),
            TrackerEvent::ContextUrlResolved { context_id, url } => {
                self.registry.get_or_create(context_id).set_url(url);
            }
            TrackerEvent::ContextReplaced {
                added,
                removed,
                url,
            } => {
                let was_active = self.active == Some(removed);
                self.remove(removed);
                let session = self.registry.get_or_create(added);
                if let Some(url) = url.clone() {
                    session.set_url(url);
                }
                if was_active {
                    self.activate(added, url);
                }
            }
            TrackerEvent::ContextBlurred { context_id } => {
                self.stop_context(context_id);
                if self.active == Some(context_id) {
                    self.active = None;
                }
            }
            TrackerEvent::SystemIdleChanged { idle } => self.set_idle(idle),
        }
    }

    /// Closes the active session. Used before the process exits so the last record isn't lost.
    pub fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            info!("Stopping active context {active} on shutdown");
            self.stop_context(active);
        }
    }

    fn activate(&mut self, context_id: ContextId, url: Option<Arc<str>>) {
        if self.active == Some(context_id) {
            debug!("Context {context_id} is already active");
            return;
        }
        debug!("Active context {:?} -> {context_id}", self.active);
        if let Some(previous) = self.active.take() {
            self.stop_context(previous);
        }

        let now = self.clock.time();
        let session = self.registry.get_or_create(context_id);
        session.start(now);
        if self.idle {
            session.pause(now);
        }
        if let Some(url) = url {
            session.set_url(url);
        }
        self.active = Some(context_id);
    }

    fn navigate(&mut self, context_id: ContextId, url: Arc<str>) {
        let now = self.clock.time();
        let is_active = self.active == Some(context_id);
        let session = self.registry.get_or_create(context_id);
        if session.url() == Some(&url) {
            return;
        }

        if is_active && session.is_started() {
            let record = session.stop(now);
            session.start(now);
            session.set_url(url);
            if let Some(record) = record {
                self.emit(record);
            }
        } else {
            // Idle navigation keeps the running session, background tabs only learn their url.
            session.set_url(url);
        }
    }

    fn remove(&mut self, context_id: ContextId) {
        let Some(mut session) = self.registry.remove(context_id) else {
            debug!("Removed unknown context {context_id}");
            if self.active == Some(context_id) {
                self.active = None;
            }
            return;
        };

        if self.active == Some(context_id) {
            self.active = None;
            if let Some(record) = session.stop(self.clock.time()) {
                self.emit(record);
            }
        } else {
            session.cancel();
        }
    }

    fn set_idle(&mut self, idle: bool) {
        if self.idle == idle {
            debug!("Idle state is already {idle}");
            return;
        }
        self.idle = idle;

        let now = self.clock.time();
        let Some(session) = self.active.and_then(|id| self.registry.get_mut(id)) else {
            debug!("No active context to {}", if idle { "pause" } else { "resume" });
            return;
        };
        if idle {
            session.pause(now);
        } else {
            session.resume(now);
        }
    }

    fn stop_context(&mut self, context_id: ContextId) {
        let now = self.clock.time();
        let record = self
            .registry
            .get_mut(context_id)
            .and_then(|session| session.stop(now));
        if let Some(record) = record {
            self.emit(record);
        }
    }

    fn emit(&self, record: record::SessionRecord) {
        info!(
            "Finished {} from {} to {}, active {}s",
            record.url,
            record.start,
            record.end,
            record.active_seconds()
        );
        self.sink.upload(record);
    }
}

use std::collections::HashMap;

use super::{record::ContextId, session::Session};

/// Owns the sessions of every known context. Sessions are created on first use.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ContextId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, context_id: ContextId) -> &mut Session {
        self.sessions
            .entry(context_id)
            .or_insert_with(|| Session::new(context_id))
    }

    pub fn get(&self, context_id: ContextId) -> Option<&Session> {
        self.sessions.get(&context_id)
    }

    pub fn get_mut(&mut self, context_id: ContextId) -> Option<&mut Session> {
        self.sessions.get_mut(&context_id)
    }

    pub fn remove(&mut self, context_id: ContextId) -> Option<Session> {
        self.sessions.remove(&context_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::tracker::record::ContextId;

    use super::SessionRegistry;

    #[test]
    fn test_sessions_are_created_lazily() {
        let mut registry = SessionRegistry::new();
        assert!(registry.get(ContextId(3)).is_none());
        assert!(registry.get_mut(ContextId(3)).is_none());
        assert!(registry.is_empty());

        registry.get_or_create(ContextId(3)).set_url("https://example.com");
        assert_eq!(registry.len(), 1);

        let session = registry.get_or_create(ContextId(3));
        assert_eq!(session.context_id(), ContextId(3));
        assert_eq!(session.url().map(|v| &**v), Some("https://example.com"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_hands_back_session() {
        let mut registry = SessionRegistry::new();
        registry.get_or_create(ContextId(1)).start(Utc::now());
        let removed = registry.remove(ContextId(1)).expect("session was registered");
        assert!(removed.is_started());
        assert!(registry.remove(ContextId(1)).is_none());
        assert!(registry.is_empty());
    }
}

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    daemon::settings::SettingUpdate,
    tracker::{record::ContextId, TrackerEvent},
    utils::logging::VerboseLevel,
};

/// Idle states reported by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

/// A single message sent by the extension. Messages are JSON objects tagged by `action`, for
/// example `{"action": "context-activated", "contextId": 12, "url": "https://example.com"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum HostMessage {
    ContextCreated {
        #[serde(alias = "tabId")]
        context_id: ContextId,
        url: Option<Arc<str>>,
    },
    ContextRemoved {
        #[serde(alias = "tabId")]
        context_id: ContextId,
    },
    ContextActivated {
        #[serde(alias = "tabId")]
        context_id: ContextId,
        url: Option<Arc<str>>,
    },
    ContextUrlChanged {
        #[serde(alias = "tabId")]
        context_id: ContextId,
        url: Arc<str>,
    },
    ContextUrlResolved {
        #[serde(alias = "tabId")]
        context_id: ContextId,
        url: Arc<str>,
    },
    ContextReplaced {
        #[serde(alias = "addedTabId")]
        added_context_id: ContextId,
        #[serde(alias = "removedTabId")]
        removed_context_id: ContextId,
        url: Option<Arc<str>>,
    },
    Focus {
        #[serde(alias = "tabId")]
        context_id: ContextId,
        url: Option<Arc<str>>,
    },
    Blur {
        #[serde(alias = "tabId")]
        context_id: ContextId,
    },
    SystemIdleChanged {
        state: IdleState,
    },
    SetSpreadsheetId {
        id: String,
    },
    SetWorksheetId {
        id: String,
    },
    SetOauthToken {
        token: String,
    },
    SetVerboseLevel {
        level: VerboseLevel,
    },
    Log {
        #[serde(alias = "tabId")]
        context_id: Option<ContextId>,
        message: String,
    },
}

/// What the tracking module should do with a [HostMessage].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    Track(TrackerEvent),
    Configure(SettingUpdate),
    Log {
        context_id: Option<ContextId>,
        message: String,
    },
}

impl From<HostMessage> for HostAction {
    fn from(value: HostMessage) -> Self {
        match value {
            HostMessage::ContextCreated { context_id, url } => {
                Self::Track(TrackerEvent::ContextCreated { context_id, url })
            }
            HostMessage::ContextRemoved { context_id } => {
                Self::Track(TrackerEvent::ContextRemoved { context_id })
            }
            HostMessage::ContextActivated { context_id, url } => {
                Self::Track(TrackerEvent::ContextActivated { context_id, url })
            }
            HostMessage::ContextUrlChanged { context_id, url } => {
                Self::Track(TrackerEvent::ContextUrlChanged { context_id, url })
            }
            HostMessage::ContextUrlResolved { context_id, url } => {
                Self::Track(TrackerEvent::ContextUrlResolved { context_id, url })
            }
            HostMessage::ContextReplaced {
                added_context_id,
                removed_context_id,
                url,
            } => Self::Track(TrackerEvent::ContextReplaced {
                added: added_context_id,
                removed: removed_context_id,
                url,
            }),
            HostMessage::Focus { context_id, url } => {
                Self::Track(TrackerEvent::ContextFocused { context_id, url })
            }
            HostMessage::Blur { context_id } => {
                Self::Track(TrackerEvent::ContextBlurred { context_id })
            }
            HostMessage::SystemIdleChanged { state } => {
                Self::Track(TrackerEvent::SystemIdleChanged {
                    idle: state != IdleState::Active,
                })
            }
            HostMessage::SetSpreadsheetId { id } => {
                Self::Configure(SettingUpdate::SpreadsheetId(id))
            }
            HostMessage::SetWorksheetId { id } => Self::Configure(SettingUpdate::WorksheetId(id)),
            HostMessage::SetOauthToken { token } => {
                Self::Configure(SettingUpdate::OauthToken(token))
            }
            HostMessage::SetVerboseLevel { level } => {
                Self::Configure(SettingUpdate::VerboseLevel(level))
            }
            HostMessage::Log {
                context_id,
                message,
            } => Self::Log {
                context_id,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::{
        daemon::settings::SettingUpdate,
        tracker::{record::ContextId, TrackerEvent},
        utils::logging::VerboseLevel,
    };

    use super::{HostAction, HostMessage};

    fn action(json: &str) -> Result<HostAction> {
        Ok(serde_json::from_str::<HostMessage>(json)?.into())
    }

    #[test]
    fn test_tab_events_are_parsed() -> Result<()> {
        assert_eq!(
            action(r#"{"action": "context-activated", "contextId": 12, "url": "https://a.example"}"#)?,
            HostAction::Track(TrackerEvent::ContextActivated {
                context_id: ContextId(12),
                url: Some("https://a.example".into()),
            })
        );
        assert_eq!(
            action(r#"{"action": "context-activated", "tabId": 3}"#)?,
            HostAction::Track(TrackerEvent::ContextActivated {
                context_id: ContextId(3),
                url: None,
            })
        );
        assert_eq!(
            action(r#"{"action": "context-replaced", "addedTabId": 4, "removedTabId": 2}"#)?,
            HostAction::Track(TrackerEvent::ContextReplaced {
                added: ContextId(4),
                removed: ContextId(2),
                url: None,
            })
        );
        assert_eq!(
            action(r#"{"action": "blur", "contextId": 1}"#)?,
            HostAction::Track(TrackerEvent::ContextBlurred {
                context_id: ContextId(1)
            })
        );
        Ok(())
    }

    #[test]
    fn test_idle_states_map_to_idleness() -> Result<()> {
        for (state, idle) in [("active", false), ("idle", true), ("locked", true)] {
            assert_eq!(
                action(&format!(
                    r#"{{"action": "system-idle-changed", "state": "{state}"}}"#
                ))?,
                HostAction::Track(TrackerEvent::SystemIdleChanged { idle })
            );
        }
        Ok(())
    }

    #[test]
    fn test_configuration_messages_are_parsed() -> Result<()> {
        assert_eq!(
            action(r#"{"action": "set-spreadsheet-id", "id": "sheet"}"#)?,
            HostAction::Configure(SettingUpdate::SpreadsheetId("sheet".into()))
        );
        assert_eq!(
            action(r#"{"action": "set-oauth-token", "token": "abc"}"#)?,
            HostAction::Configure(SettingUpdate::OauthToken("abc".into()))
        );
        assert_eq!(
            action(r#"{"action": "set-verbose-level", "level": 4}"#)?,
            HostAction::Configure(SettingUpdate::VerboseLevel(VerboseLevel::Debug))
        );
        assert!(action(r#"{"action": "set-verbose-level", "level": 7}"#).is_err());
        Ok(())
    }

    #[test]
    fn test_unknown_or_incomplete_messages_fail() {
        assert!(action(r#"{"action": "reload"}"#).is_err());
        assert!(action(r#"{"action": "context-url-changed", "contextId": 1}"#).is_err());
        assert!(action(r#"{"contextId": 1}"#).is_err());
    }
}

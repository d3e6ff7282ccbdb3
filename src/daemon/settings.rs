//! Persisted options and the upload destination derived from them.

use std::{
    fmt,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::utils::logging::VerboseLevel;

const SETTINGS_FILE: &str = "settings.json";

/// Options that survive restarts. The OAuth token is deliberately absent, it is provided by the
/// browser on every start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    pub spreadsheet_id: Option<String>,
    pub worksheet_id: Option<String>,
    pub verbose_level: VerboseLevel,
}

/// A change requested by the options page.
#[derive(Clone, PartialEq, Eq)]
pub enum SettingUpdate {
    SpreadsheetId(String),
    WorksheetId(String),
    OauthToken(String),
    VerboseLevel(VerboseLevel),
}

impl fmt::Debug for SettingUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpreadsheetId(id) => f.debug_tuple("SpreadsheetId").field(id).finish(),
            Self::WorksheetId(id) => f.debug_tuple("WorksheetId").field(id).finish(),
            Self::OauthToken(_) => f.debug_tuple("OauthToken").field(&"[REDACTED]").finish(),
            Self::VerboseLevel(level) => f.debug_tuple("VerboseLevel").field(level).finish(),
        }
    }
}

/// Everything an upload needs. Uploads are skipped until all parts are known.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UploadTarget {
    pub token: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub worksheet_id: Option<String>,
}

impl fmt::Debug for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTarget")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("worksheet_id", &self.worksheet_id)
            .finish()
    }
}

impl UploadTarget {
    pub fn new(settings: &Settings, token: Option<String>) -> Self {
        Self {
            token,
            spreadsheet_id: settings.spreadsheet_id.clone(),
            worksheet_id: settings.worksheet_id.clone(),
        }
    }

    /// Returns the list feed url and the token, or None while configuration is incomplete.
    pub fn endpoint(&self, base_url: &str) -> Option<(String, &str)> {
        let token = self.token.as_deref().filter(|v| !v.is_empty())?;
        let spreadsheet = self.spreadsheet_id.as_deref().filter(|v| !v.is_empty())?;
        let worksheet = self.worksheet_id.as_deref().filter(|v| !v.is_empty())?;
        Some((
            format!(
                "{}/list/{spreadsheet}/{worksheet}/private/full",
                base_url.trim_end_matches('/')
            ),
            token,
        ))
    }
}

/// Reads and writes [Settings] inside the application directory.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(SETTINGS_FILE),
        }
    }

    /// Missing or unreadable settings fall back to defaults, tracking must start regardless.
    pub async fn load(&self) -> Settings {
        match tokio::fs::read(&self.path).await {
            Ok(content) => match serde_json::from_slice(&content) {
                Ok(settings) => {
                    debug!("Loaded settings {:?}", settings);
                    settings
                }
                Err(e) => {
                    warn!("Settings in {:?} are corrupted, using defaults: {e}", self.path);
                    Settings::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No settings found in {:?}", self.path);
                Settings::default()
            }
            Err(e) => {
                warn!("Failed to read settings {:?}: {e}", self.path);
                Settings::default()
            }
        }
    }

    pub async fn save(&self, settings: &Settings) -> Result<()> {
        let content = serde_json::to_vec_pretty(settings)?;
        tokio::fs::write(&self.path, content).await?;
        debug!("Saved settings to {:?}", self.path);
        Ok(())
    }
}

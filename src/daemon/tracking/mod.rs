//! Drives the [TabTracker] with host messages and applies configuration changes.

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, level_filters::LevelFilter};

use crate::{tracker::TabTracker, utils::logging::LogLevelHandle};

use super::{
    collection::message::{HostAction, HostMessage},
    settings::{SettingUpdate, Settings, SettingsStore, UploadTarget},
};

pub struct TrackingModule {
    receiver: mpsc::Receiver<HostMessage>,
    tracker: TabTracker,
    settings: Settings,
    store: SettingsStore,
    target: watch::Sender<UploadTarget>,
    log_level: Option<LogLevelHandle>,
}

impl TrackingModule {
    pub fn new(
        receiver: mpsc::Receiver<HostMessage>,
        tracker: TabTracker,
        settings: Settings,
        store: SettingsStore,
        target: watch::Sender<UploadTarget>,
        log_level: Option<LogLevelHandle>,
    ) -> Self {
        Self {
            receiver,
            tracker,
            settings,
            store,
            target,
            log_level,
        }
    }

    /// Handles messages one at a time until the collector goes away. The active session is
    /// closed before returning so that its record still reaches the processing module.
    pub async fn run(mut self) -> Result<()> {
        while let Some(message) = self.receiver.recv().await {
            match HostAction::from(message) {
                HostAction::Track(event) => self.tracker.handle(event),
                HostAction::Configure(update) => self.configure(update).await,
                HostAction::Log {
                    context_id: Some(context_id),
                    message,
                } => info!("tab({context_id}): {message}"),
                HostAction::Log {
                    context_id: None,
                    message,
                } => info!("extension: {message}"),
            }
        }

        self.tracker.shutdown();
        Ok(())
    }

    async fn configure(&mut self, update: SettingUpdate) {
        info!("Applying {:?}", update);
        let mut settings = self.settings.clone();
        match update {
            SettingUpdate::OauthToken(token) => {
                self.target.send_modify(|target| target.token = Some(token));
                return;
            }
            SettingUpdate::SpreadsheetId(id) => settings.spreadsheet_id = Some(id),
            SettingUpdate::WorksheetId(id) => settings.worksheet_id = Some(id),
            SettingUpdate::VerboseLevel(level) => {
                settings.verbose_level = level;
                if let Some(handle) = &self.log_level {
                    if let Err(e) = handle.set_level(LevelFilter::from(level)) {
                        error!("Failed to change log level {e:?}");
                    }
                }
            }
        }

        if settings == self.settings {
            return;
        }
        self.target.send_modify(|target| {
            target.spreadsheet_id = settings.spreadsheet_id.clone();
            target.worksheet_id = settings.worksheet_id.clone();
        });
        if let Err(e) = self.store.save(&settings).await {
            error!("Failed to persist settings {e:?}");
        }
        self.settings = settings;
    }
}

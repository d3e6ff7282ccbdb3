use std::path::{Path, PathBuf};

use anyhow::Result;
use args::HostOptions;
use collection::{
    collector::EventCollectionModule,
    message::HostMessage,
    source::{EventSource, Framing, LineEventSource, NativeEventSource},
};
use processing::{local_save::LocalSaver, upload::SheetUploader, ProcessingModule};
use settings::{SettingsStore, UploadTarget};
use storage::record_storage::RecordStorageImpl;
use tokio::{
    io::BufReader,
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracking::TrackingModule;

use crate::{
    tracker::{
        record::{ChannelSink, SessionRecord},
        TabTracker,
    },
    utils::{
        clock::{Clock, DefaultClock},
        logging::LogLevelHandle,
    },
};

pub mod args;
pub mod collection;
pub mod processing;
pub mod settings;
pub mod shutdown;
pub mod storage;
pub mod tracking;

const MESSAGE_QUEUE_SIZE: usize = 32;
const RECORD_QUEUE_SIZE: usize = 64;

/// Represents the starting point for the host. Messages are read from stdin until the browser
/// closes it or the process is interrupted.
///
/// When `log_level` is given the saved verbose level is applied and later changes from the
/// options page are honored.
pub async fn start_daemon(
    dir: PathBuf,
    options: HostOptions,
    log_level: Option<LogLevelHandle>,
) -> Result<()> {
    let source: Box<dyn EventSource> = match options.framing {
        Framing::Lines => Box::new(LineEventSource::new(BufReader::new(tokio::io::stdin()))),
        Framing::Native => Box::new(NativeEventSource::new(tokio::io::stdin())),
    };
    run_pipeline(
        &dir,
        source,
        options.token,
        &options.base_url,
        log_level,
        DefaultClock,
    )
    .await
}

async fn run_pipeline(
    dir: &Path,
    source: Box<dyn EventSource>,
    token: Option<String>,
    base_url: &str,
    log_level: Option<LogLevelHandle>,
    clock: impl Clock,
) -> Result<()> {
    let store = SettingsStore::new(dir);
    let settings = store.load().await;
    if let Some(handle) = &log_level {
        handle
            .set_level(LevelFilter::from(settings.verbose_level))
            .inspect_err(|e| error!("Failed to apply saved log level {e:?}"))
            .ok();
    }
    info!("Starting host in {:?}", dir);

    let (message_sender, message_receiver) = mpsc::channel::<HostMessage>(MESSAGE_QUEUE_SIZE);
    let (record_sender, record_receiver) = mpsc::channel::<SessionRecord>(RECORD_QUEUE_SIZE);
    let (target_sender, target_receiver) = watch::channel(UploadTarget::new(&settings, token));

    let shutdown_token = CancellationToken::new();

    let collector = EventCollectionModule::new(message_sender, source, shutdown_token.clone());

    let tracker = TabTracker::new(Box::new(clock), Box::new(ChannelSink::new(record_sender)));
    let tracking = TrackingModule::new(
        message_receiver,
        tracker,
        settings,
        store,
        target_sender,
        log_level,
    );

    let processor = create_processor(
        dir.join("records"),
        record_receiver,
        base_url,
        target_receiver,
    )?;

    let (_, collection_result, tracking_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        collector.run(),
        tracking.run(),
        processor.run(),
    );

    if let Err(collection_result) = collection_result {
        error!("Collection module got an error {:?}", collection_result);
    }

    if let Err(tracking_result) = tracking_result {
        error!("Tracking module got an error {:?}", tracking_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

fn create_processor(
    record_dir: PathBuf,
    receiver: mpsc::Receiver<SessionRecord>,
    base_url: &str,
    target: watch::Receiver<UploadTarget>,
) -> Result<ProcessingModule<(LocalSaver<RecordStorageImpl>, SheetUploader)>> {
    let storage = RecordStorageImpl::new(record_dir)?;
    let saver = LocalSaver::new(storage);
    let uploader = SheetUploader::new(base_url, target)?;
    Ok(ProcessingModule::new(receiver, (saver, uploader)))
}

#[cfg(test)]
mod daemon_tests {
    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;
    use tokio::io::BufReader;

    use crate::{
        daemon::{
            run_pipeline,
            storage::record_storage::{RecordStorage, RecordStorageImpl},
        },
        utils::{clock::test_clock::ManualClock, logging::TEST_LOGGING},
    };

    use super::collection::source::LineEventSource;

    const INPUT: &str = r#"
{"action": "set-verbose-level", "level": 4}
{"action": "context-created", "contextId": 1, "url": "https://a.example"}
{"action": "context-activated", "contextId": 1}
this line is garbage
{"action": "context-url-changed", "contextId": 1, "url": "https://a.example/next"}
{"action": "context-activated", "contextId": 2, "url": "https://b.example"}
{"action": "context-activated", "contextId": 2, "url": "https://b.example"}
{"action": "context-removed", "contextId": 1}
{"action": "system-idle-changed", "state": "idle"}
"#;

    /// Runs the whole host against scripted input. Uploads stay disabled because no token is
    /// known, so every record has to end up in local storage.
    #[tokio::test]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let source = LineEventSource::new(BufReader::new(INPUT.as_bytes()));
        let clock = ManualClock::default();

        run_pipeline(
            dir.path(),
            Box::new(source),
            None,
            "http://127.0.0.1:9",
            None,
            clock.clone(),
        )
        .await?;

        let storage = RecordStorageImpl::new(dir.path().join("records"))?;
        let records = storage
            .get_data_for(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap())
            .await?;
        let urls = records.iter().map(|v| &*v.url).collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec!["https://a.example", "https://a.example/next", "https://b.example"]
        );
        assert!(records.iter().all(|v| v.start == clock.now()));

        let settings = std::fs::read_to_string(dir.path().join("settings.json"))?;
        assert!(settings.contains("\"verbose-level\": 4"));
        Ok(())
    }
}

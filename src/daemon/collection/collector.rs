use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{message::HostMessage, source::EventSource};

pub struct EventCollectionModule {
    next: mpsc::Sender<HostMessage>,
    source: Box<dyn EventSource>,
    shutdown: CancellationToken,
}

impl EventCollectionModule {
    pub fn new(
        next: mpsc::Sender<HostMessage>,
        source: Box<dyn EventSource>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            next,
            source,
            shutdown,
        }
    }

    /// Executes the collector event loop. Ends when the host closes its side, on shutdown or
    /// when the input can no longer be read. Only the last case is an error.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let message = tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop the following modules.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                message = self.source.next_message() => message
            };

            match message {
                Ok(Some(message)) => {
                    debug!("Sending message {:?}", message);
                    self.next
                        .send(message)
                        .await
                        .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                }
                Ok(None) => {
                    info!("Host closed the input, shutting down");
                    self.shutdown.cancel();
                    return Ok(());
                }
                Err(e) if e.is_fatal() => {
                    error!("Input is unusable, shutting down");
                    self.shutdown.cancel();
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("Skipping message {e}")
                }
            }
        }
    }
}

use anyhow::Result;
use module::RecordProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use crate::tracker::record::SessionRecord;

pub mod local_save;
pub mod module;
pub mod upload;

/// Represents consumer of finished records. This module is responsible for receiving records
/// and delivering them using various means.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<SessionRecord>,
    processor: Processor,
}

impl<P: RecordProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<SessionRecord>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(record) = self.receiver.recv().await {
            debug!("Processing record {:?}", record);
            match self.processor.process_next(record.clone()).await {
                Ok(_) => {
                    info!("Processed record {:?}", record)
                }
                Err(e) => {
                    error!("Error processing record {:?}: {e:?}", record)
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}

use crate::results::ExtractedRecord;
use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("record sink closed")]
    Closed,

    #[error("failed to write record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives one record per successfully rendered page.
///
/// An error stops the crawl; records already emitted stay valid.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn emit(&self, record: ExtractedRecord) -> Result<(), SinkError>;
}

#[async_trait]
impl RecordSink for mpsc::Sender<ExtractedRecord> {
    async fn emit(&self, record: ExtractedRecord) -> Result<(), SinkError> {
        self.send(record).await.map_err(|_| SinkError::Closed)
    }
}

#[async_trait]
impl RecordSink for mpsc::UnboundedSender<ExtractedRecord> {
    async fn emit(&self, record: ExtractedRecord) -> Result<(), SinkError> {
        self.send(record).map_err(|_| SinkError::Closed)
    }
}

/// Writes each record as one line of JSON
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    async fn emit(&self, record: ExtractedRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(&record)?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

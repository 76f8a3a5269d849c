use super::types::RecordedEvent;
use anyhow::Result;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Cheap, cloneable handle that queues events for a background writer.
#[derive(Clone)]
pub struct RecordingLogger {
    sender: mpsc::UnboundedSender<RecordedEvent>,
}

impl RecordingLogger {
    /// Append events to `log_file_path`, one JSON object per line.
    ///
    /// Must be called inside a tokio runtime; the writer task lives until
    /// every clone of the logger is dropped.
    pub fn new(log_file_path: PathBuf) -> Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Err(e) = Self::writer_task(log_file_path, &mut receiver).await {
                error!("Recording logger failed: {}", e);
            }
        });

        Ok(Self { sender })
    }

    /// A logger whose events are delivered to the returned receiver instead
    /// of a file.
    pub fn in_memory() -> (Self, mpsc::UnboundedReceiver<RecordedEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn record(&self, event: RecordedEvent) {
        if self.sender.send(event).is_err() {
            error!("Failed to send event to recording logger: receiver dropped");
        }
    }

    async fn writer_task(
        log_file_path: PathBuf,
        receiver: &mut mpsc::UnboundedReceiver<RecordedEvent>,
    ) -> Result<()> {
        if let Some(parent) = log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file_path)
            .await?;

        info!("Recording events to: {:?}", log_file_path);

        while let Some(event) = receiver.recv().await {
            let mut line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            line.push('\n');

            if let Err(e) = file.write_all(line.as_bytes()).await {
                error!("Failed to write event to log: {}", e);
                continue;
            }
            if let Err(e) = file.flush().await {
                error!("Failed to flush log file: {}", e);
            }
        }

        info!("Recording writer task shutting down");

        Ok(())
    }
}

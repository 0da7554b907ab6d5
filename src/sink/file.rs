//! File output sink.
//!
//! Appends each record as one JSON line, creating the parent directory at
//! activation.

use std::path::PathBuf;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::record::TelemetryRecord;
use crate::sink::{Sink, SinkError};

/// Settings for the file sink, from `[outputs.file]`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    /// Path of the JSON-lines file to append to.
    pub path: PathBuf,
}

/// JSON-lines file [`Sink`].
pub struct FileSink {
    config: FileConfig,
    file: Mutex<Option<tokio::fs::File>>,
}

impl FileSink {
    /// Build an unactivated sink from its `[outputs.file]` settings table.
    pub fn from_settings(settings: &toml::Table) -> Result<Self, SinkError> {
        let config: FileConfig = settings
            .clone()
            .try_into()
            .map_err(|e| SinkError::Settings(e.to_string()))?;
        Ok(Self::new(config))
    }

    /// Build an unactivated sink from a config struct.
    pub fn new(config: FileConfig) -> Self {
        Self {
            config,
            file: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("path", &self.config.path)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Sink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn activate(&mut self) -> Result<(), SinkError> {
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .await?;

        *self.file.lock().await = Some(file);
        tracing::info!(path = %self.config.path.display(), "File sink opened");
        Ok(())
    }

    async fn publish(&self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| SinkError::Backend("sink not activated".to_string()))?;

        let mut line = record.to_json()?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&self) {
        if let Some(file) = self.file.lock().await.as_mut() {
            let _ = file.flush().await;
        }
    }
}

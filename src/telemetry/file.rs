use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::record::TelemetryRecord;
use super::store::{DataFormat, StoreDocument, StoreResult, StoreSnapshot, TelemetryDataSourceConfig, TelemetryStore};
use crate::error::StorageError;
use crate::goals::{Assessment, AssessmentFilter};

/// Flat-file backend. The whole snapshot lives in one document at the endpoint uri.
#[derive(Debug, Clone)]
pub struct FileTelemetryStore {
    path: PathBuf,
    format: DataFormat,
}

impl FileTelemetryStore {
    /// Only JSON documents are understood; CSV and XML are rejected here rather than
    /// read back as empty on every call.
    pub fn new(config: &TelemetryDataSourceConfig) -> StoreResult<Self> {
        match config.data_format {
            DataFormat::Json => Ok(Self {
                path: PathBuf::from(config.uri()),
                format: config.data_format,
            }),
            other => Err(StorageError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    /// The raw document. A missing file is an empty one; content that is not JSON fails.
    async fn load(&self) -> StoreResult<StoreDocument> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.location(), "file does not exist, nothing to read");
                return Ok(StoreDocument::default());
            }
            Err(e) => return Err(StorageError::io(self.location(), e)),
        };

        StoreDocument::parse(&content, &self.location()).map_err(|e| {
            error!(path = %self.location(), error = %e, "failed to read file");
            e
        })
    }

    async fn write(&self, document: &StoreDocument) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && fs::metadata(parent).await.is_err() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::io(parent.display().to_string(), e))?;
            }
        }

        let body = serde_json::to_string_pretty(document)?;
        match fs::write(&self.path, body).await {
            Ok(()) => {
                info!(path = %self.location(), format = %self.format, "data written");
                Ok(())
            }
            Err(e) => {
                error!(path = %self.location(), error = %e, "failed to write data");
                Err(StorageError::io(self.location(), e))
            }
        }
    }
}

#[async_trait]
impl TelemetryStore for FileTelemetryStore {
    async fn read(&self) -> StoreResult<StoreSnapshot> {
        let snapshot = self.load().await?.decode(&self.location());
        debug!(
            path = %self.location(),
            records = snapshot.telemetry_data.len(),
            assessments = snapshot.assessments.len(),
            skipped = snapshot.skipped_entries,
            "read snapshot"
        );
        Ok(snapshot)
    }

    async fn store_all(&self, records: Vec<TelemetryRecord>) -> StoreResult<()> {
        let mut document = self.load().await?;
        document.push_records(&records)?;
        self.write(&document).await
    }

    async fn store_assessments(&self, assessments: &[Assessment], filter: Option<&AssessmentFilter>) -> StoreResult<()> {
        let mut document = self.load().await?;
        let added = document.push_assessments(assessments, filter)?;
        debug!(path = %self.location(), added, "storing assessments");
        self.write(&document).await
    }

    fn describe(&self) -> String {
        format!("file:{}", self.location())
    }
}

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::record::TelemetryRecord;
use super::store::{DataFormat, StoreDocument, StoreResult, StoreSnapshot, TelemetryDataSourceConfig, TelemetryStore};
use crate::error::StorageError;
use crate::goals::{Assessment, AssessmentFilter, AssessmentRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote backend speaking JSON over HTTP.
///
/// `GET {uri}` returns the snapshot document, `POST {uri}/telemetry` appends records
/// and `POST {uri}/assessments` appends assessment records. The server does the merge.
pub struct HttpTelemetryStore {
    client: Client,
    base_url: String,
    connected: AtomicBool,
}

impl HttpTelemetryStore {
    pub fn new(config: &TelemetryDataSourceConfig) -> StoreResult<Self> {
        if config.data_format != DataFormat::Json {
            return Err(StorageError::UnsupportedFormat(config.data_format.to_string()));
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config.uri().trim_end_matches('/').to_string(),
            connected: AtomicBool::new(false),
        })
    }

    fn ensure_connected(&self) -> StoreResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::NotConnected)
        }
    }

    async fn post<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> StoreResult<()> {
        self.ensure_connected()?;
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(StorageError::RemoteStatus {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for HttpTelemetryStore {
    async fn connect(&self) -> StoreResult<()> {
        let response = self.client.get(&self.base_url).send().await?;
        let status = response.status();
        // 404 means an empty store, not an unreachable one.
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(StorageError::RemoteStatus {
                url: self.base_url.clone(),
                status: status.as_u16(),
            });
        }
        self.connected.store(true, Ordering::Release);
        info!(url = %self.base_url, "connected to remote telemetry store");
        Ok(())
    }

    async fn disconnect(&self) -> StoreResult<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    async fn read(&self) -> StoreResult<StoreSnapshot> {
        self.ensure_connected()?;
        let response = self.client.get(&self.base_url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            warn!(url = %self.base_url, "remote store has no data yet");
            return Ok(StoreSnapshot::default());
        }
        if !status.is_success() {
            return Err(StorageError::RemoteStatus {
                url: self.base_url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(StoreDocument::parse(&body, &self.base_url)?.decode(&self.base_url))
    }

    async fn store_all(&self, records: Vec<TelemetryRecord>) -> StoreResult<()> {
        debug!(url = %self.base_url, count = records.len(), "posting telemetry");
        self.post("telemetry", &records).await
    }

    async fn store_assessments(&self, assessments: &[Assessment], filter: Option<&AssessmentFilter>) -> StoreResult<()> {
        let records: Vec<AssessmentRecord> = assessments
            .iter()
            .filter(|a| filter.map_or(true, |f| f.matches(a)))
            .map(AssessmentRecord::from)
            .collect();
        self.post("assessments", &records).await
    }

    fn describe(&self) -> String {
        format!("http:{}", self.base_url)
    }
}

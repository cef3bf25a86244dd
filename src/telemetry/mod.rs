//! Telemetry records and the storage boundary they flow through.
//!
//! Records are produced by an external collector and are never mutated here,
//! only read and optionally re-persisted. Encoding is a backend concern.

pub mod file;
pub mod memory;
pub mod record;
pub mod remote;
pub mod store;

pub use file::FileTelemetryStore;
pub use memory::InMemoryTelemetryStore;
pub use record::{TelemetryRecord, TelemetryType, EVENT_TYPE_ATTRIBUTE};
pub use remote::HttpTelemetryStore;
pub use store::{
    read_kinds_or_empty, DataFormat, StorageEndpoint, StoreDocument, StoreResult, StoreSnapshot, TelemetryDataSourceConfig,
    TelemetryStore,
};

use std::sync::Arc;

/// Builds the backend matching the endpoint: `http(s)://` goes remote, anything else is a file path.
pub fn open_store(config: &TelemetryDataSourceConfig) -> StoreResult<Arc<dyn TelemetryStore>> {
    let uri = config.uri();
    if uri.starts_with("http://") || uri.starts_with("https://") {
        Ok(Arc::new(HttpTelemetryStore::new(config)?))
    } else {
        Ok(Arc::new(FileTelemetryStore::new(config)?))
    }
}

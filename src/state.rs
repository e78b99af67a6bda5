//! Application state management

use std::sync::Arc;

use crate::capability::Capabilities;
use crate::config::Config;
use crate::error::Result;
use crate::grid::{GridCoordinator, UploadMode};
use crate::ocr::{Recognizer, RemoteOcrClient};
use crate::store::{ObjectStore, ParseClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: Arc<dyn ObjectStore>,
    recognizer: Arc<dyn Recognizer>,
    capabilities: Capabilities,
}

impl AppState {
    /// Build state against the configured Parse server and OCR service
    pub fn connect(config: Config, capabilities: Capabilities) -> Result<Self> {
        let store = ParseClient::new(&config.store)?;
        let recognizer = RemoteOcrClient::new(&config.ocr)?;
        Ok(Self::new(config, Arc::new(store), Arc::new(recognizer), capabilities))
    }

    pub fn new(
        config: Config,
        store: Arc<dyn ObjectStore>,
        recognizer: Arc<dyn Recognizer>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                recognizer,
                capabilities,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the object store
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.inner.store.clone()
    }

    /// Get the text recognizer
    pub fn recognizer(&self) -> Arc<dyn Recognizer> {
        self.inner.recognizer.clone()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    /// Load a list into a grid coordinator
    pub async fn open_grid(&self, list_id: &str, mode: UploadMode) -> Result<GridCoordinator> {
        let grid = GridCoordinator::open(
            list_id,
            self.store(),
            self.recognizer(),
            &self.config().grid,
            mode,
        )
        .await?;
        Ok(grid)
    }
}

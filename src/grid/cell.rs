//! Grid cell orchestrator
//!
//! One per grid slot. Takes a capture through upload, recognition and saving
//! the recognized text, publishing every step on a watch channel.
//!
//! Each submitted capture starts a new generation. Recognition results are
//! only written while their generation is still current, so a slow result for
//! an image that has since been replaced is dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::disclosure::TextDisclosure;
use super::notice::{Notice, NoticeKind};
use crate::capture::CapturePayload;
use crate::codec::{self, CodecError};
use crate::ocr::Recognizer;
use crate::store::{ImageItem, ImageItemUpdate, NewImageItem, ObjectStore, StoreError};

/// What a cell needs from the grid that owns it
pub trait GridCallbacks: Send + Sync {
    fn item_at(&self, order: u32) -> Option<ImageItem>;
    fn image_uploaded(&self, item: ImageItem);
    fn image_deleted(&self, order: u32, item_id: &str);
    fn text_updated(&self, order: u32, item_id: &str, text: &str);
    fn take_pending(&self, order: u32) -> Option<CapturePayload>;
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Idle,
    /// Payload held locally, nothing persisted yet
    Captured,
    Uploading,
    Analyzing,
    Saving,
    Complete,
}

impl CellState {
    /// No work in flight
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Idle | Self::Captured)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Submitting a capture uploads it right away
    #[default]
    Immediate,
    /// Submitting holds the capture until `confirm`
    Deferred,
}

#[derive(Debug, Clone)]
pub struct CellSettings {
    pub mode: UploadMode,
    /// How long `Complete` stays visible before returning to `Idle`
    pub complete_linger: Duration,
}

impl Default for CellSettings {
    fn default() -> Self {
        Self {
            mode: UploadMode::Immediate,
            complete_linger: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CellError {
    #[error("No captured image to upload")]
    NothingCaptured,

    #[error("No image at this position")]
    NoImage,

    #[error("A newer capture replaced this one")]
    Superseded,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Default)]
struct Slot {
    generation: u64,
    payload: Option<CapturePayload>,
}

/// Upload and recognition state machine for one grid slot
#[derive(Clone)]
pub struct CellOrchestrator {
    inner: Arc<CellInner>,
}

struct CellInner {
    order: u32,
    list_id: String,
    store: Arc<dyn ObjectStore>,
    recognizer: Arc<dyn Recognizer>,
    grid: Arc<dyn GridCallbacks>,
    settings: CellSettings,
    slot: Mutex<Slot>,
    disclosure: Mutex<TextDisclosure>,
    state: watch::Sender<CellState>,
    /// Serializes find-then-create/update for this order
    upload_lock: tokio::sync::Mutex<()>,
    /// Serializes writes of recognized text
    ocr_lock: tokio::sync::Mutex<()>,
}

impl CellOrchestrator {
    pub fn new(
        order: u32,
        list_id: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        recognizer: Arc<dyn Recognizer>,
        grid: Arc<dyn GridCallbacks>,
        settings: CellSettings,
    ) -> Self {
        let (state, _) = watch::channel(CellState::Idle);
        Self {
            inner: Arc::new(CellInner {
                order,
                list_id: list_id.into(),
                store,
                recognizer,
                grid,
                settings,
                slot: Mutex::new(Slot::default()),
                disclosure: Mutex::new(TextDisclosure::default()),
                state,
                upload_lock: tokio::sync::Mutex::new(()),
                ocr_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn order(&self) -> u32 {
        self.inner.order
    }

    pub fn state(&self) -> CellState {
        *self.inner.state.borrow()
    }

    /// Follow state changes
    pub fn watch(&self) -> watch::Receiver<CellState> {
        self.inner.state.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.inner.slot.lock().generation
    }

    /// The grid's item at this slot
    pub fn item(&self) -> Option<ImageItem> {
        self.inner.grid.item_at(self.inner.order)
    }

    /// Capture held locally, if any
    pub fn captured(&self) -> Option<CapturePayload> {
        self.inner.slot.lock().payload.clone()
    }

    pub fn toggle_text(&self) {
        self.inner.disclosure.lock().toggle();
    }

    /// Recognized text as it should be displayed
    pub fn display_text(&self) -> Option<String> {
        let text = self.item()?.ocr_text.filter(|t| !t.is_empty())?;
        let disclosure = *self.inner.disclosure.lock();
        Some(disclosure.render(&text).into_owned())
    }

    /// Wait until no work is in flight
    pub async fn settled(&self) -> CellState {
        let mut rx = self.watch();
        let settled = rx.wait_for(|state| state.is_settled()).await.map(|state| *state);
        settled.unwrap_or_else(|_| self.state())
    }

    /// Start a new capture for this slot
    ///
    /// In [`UploadMode::Immediate`] this uploads and returns the stored item;
    /// in [`UploadMode::Deferred`] the capture is held and `None` is returned.
    pub async fn submit(&self, payload: CapturePayload) -> Result<Option<ImageItem>, CellError> {
        let generation = {
            let mut slot = self.inner.slot.lock();
            slot.generation += 1;
            slot.payload = Some(payload);
            slot.generation
        };
        debug!(order = self.inner.order, generation, "Capture submitted");

        match self.inner.settings.mode {
            UploadMode::Deferred => {
                self.set_state(CellState::Captured);
                Ok(None)
            }
            UploadMode::Immediate => self.upload(generation).await.map(Some),
        }
    }

    /// Upload the held capture
    pub async fn confirm(&self) -> Result<ImageItem, CellError> {
        if self.state() != CellState::Captured {
            return Err(CellError::NothingCaptured);
        }
        let generation = {
            let slot = self.inner.slot.lock();
            if slot.payload.is_none() {
                return Err(CellError::NothingCaptured);
            }
            slot.generation
        };
        self.upload(generation).await
    }

    /// Upload the capture retained after a failed replacement
    pub async fn retry(&self) -> Result<ImageItem, CellError> {
        self.confirm().await
    }

    /// Drop the held capture; returns false when nothing was held
    pub fn discard(&self) -> bool {
        if self.state() != CellState::Captured {
            return false;
        }
        self.inner.slot.lock().payload = None;
        self.set_state(CellState::Idle);
        true
    }

    /// Submit the grid's pending capture for this slot, if there is one
    pub async fn consume_pending(&self) -> Result<Option<ImageItem>, CellError> {
        match self.inner.grid.take_pending(self.inner.order) {
            Some(payload) => self.submit(payload).await,
            None => Ok(None),
        }
    }

    /// Delete the stored item at this slot
    pub async fn delete(&self) -> Result<(), CellError> {
        let inner = &self.inner;
        let order = inner.order;
        let item = inner.grid.item_at(order).ok_or(CellError::NoImage)?;

        let _guard = inner.upload_lock.lock().await;
        if let Err(e) = inner.store.delete_image_item(&item.id).await {
            error!(order, item_id = %item.id, "Failed to delete image: {}", e);
            self.notify(NoticeKind::DeleteFailed, format!("Delete failed: {}", e));
            return Err(e.into());
        }

        {
            let mut slot = inner.slot.lock();
            slot.generation += 1;
            slot.payload = None;
        }
        inner.grid.image_deleted(order, &item.id);
        self.notify(NoticeKind::Deleted, "Image deleted");
        self.set_state(CellState::Idle);

        info!(order, item_id = %item.id, "Image deleted");
        Ok(())
    }

    async fn upload(&self, generation: u64) -> Result<ImageItem, CellError> {
        let inner = &self.inner;
        let order = inner.order;
        let payload = inner.slot.lock().payload.clone().ok_or(CellError::NothingCaptured)?;
        let file_name = payload.file_name().to_string();
        self.set_state(CellState::Uploading);

        let encoded = match codec::prepare_payload(payload).await {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(order, file = %file_name, "Failed to prepare image: {}", e);
                if self.is_current(generation) {
                    self.notify(NoticeKind::DecodeFailed, format!("Could not read image: {}", e));
                    self.clear_payload(generation);
                    self.set_state(CellState::Idle);
                }
                return Err(e.into());
            }
        };

        let _guard = inner.upload_lock.lock().await;
        if !self.is_current(generation) {
            debug!(order, generation, file = %file_name, "Dropping superseded capture");
            return Err(CellError::Superseded);
        }
        let existing = match inner.store.find_image_item_by_order(&inner.list_id, order).await {
            Ok(existing) => existing,
            Err(e) => {
                let replacing = inner.grid.item_at(order).is_some();
                return Err(self.upload_failed(generation, replacing, e));
            }
        };

        let stored = match &existing {
            Some(item) => self.replace_image(item, &file_name, &encoded.base64).await,
            None => {
                inner
                    .store
                    .create_image_item(NewImageItem {
                        file_name: file_name.clone(),
                        base64_data: encoded.base64.clone(),
                        order,
                        image_list_id: inner.list_id.clone(),
                    })
                    .await
            }
        };
        let item = match stored {
            Ok(item) => item,
            Err(e) => return Err(self.upload_failed(generation, existing.is_some(), e)),
        };

        info!(
            order,
            item_id = %item.id,
            width = encoded.width,
            height = encoded.height,
            replaced = existing.is_some(),
            "Image uploaded"
        );
        // Still under the upload lock; a newer capture writes after this
        inner.grid.image_uploaded(item.clone());

        if self.is_current(generation) {
            self.notify(NoticeKind::Uploaded, "Image uploaded");
            self.clear_payload(generation);
            self.set_state(CellState::Analyzing);
            tokio::spawn(self.clone().recognize(generation, item.id.clone(), encoded.base64));
        }

        Ok(item)
    }

    /// Replace the stored image and clear its stale text
    async fn replace_image(
        &self,
        item: &ImageItem,
        file_name: &str,
        base64: &str,
    ) -> Result<ImageItem, StoreError> {
        let store = &self.inner.store;
        store
            .update_image_item(
                &item.id,
                ImageItemUpdate {
                    file_name: Some(file_name.to_string()),
                    base64_data: Some(base64.to_string()),
                },
            )
            .await?;

        let _guard = self.inner.ocr_lock.lock().await;
        store.update_image_item_ocr_text(&item.id, "").await
    }

    fn upload_failed(&self, generation: u64, replacing: bool, e: StoreError) -> CellError {
        error!(order = self.inner.order, replacing, "Upload failed: {}", e);

        if self.is_current(generation) {
            self.notify(NoticeKind::UploadFailed, format!("Upload failed: {}", e));
            if replacing {
                // The capture stays available for retry
                self.set_state(CellState::Captured);
            } else {
                self.clear_payload(generation);
                self.set_state(CellState::Idle);
            }
        }
        e.into()
    }

    async fn recognize(self, generation: u64, item_id: String, base64: String) {
        let inner = &self.inner;
        let order = inner.order;

        let recognition = match inner.recognizer.recognize(&base64).await {
            Ok(recognition) => recognition,
            Err(e) => {
                if self.is_current(generation) {
                    warn!(order, item_id = %item_id, recognizer = inner.recognizer.name(), "Recognition failed: {}", e);
                    self.notify(
                        NoticeKind::RecognitionFailed,
                        format!("Image saved, text recognition failed: {}", e),
                    );
                    self.set_state(CellState::Idle);
                } else {
                    debug!(order, generation, "Ignoring failure of a replaced capture");
                }
                return;
            }
        };
        let text = recognition.text();

        {
            let _guard = inner.ocr_lock.lock().await;
            if !self.is_current(generation) {
                debug!(order, generation, "Discarding stale recognition result");
                return;
            }

            self.set_state(CellState::Saving);
            if let Err(e) = inner.store.update_image_item_ocr_text(&item_id, &text).await {
                warn!(order, item_id = %item_id, "Failed to save recognized text: {}", e);
                if self.is_current(generation) {
                    self.notify(
                        NoticeKind::RecognitionFailed,
                        format!("Image saved, recognized text could not be stored: {}", e),
                    );
                    self.set_state(CellState::Idle);
                }
                return;
            }
        }

        if !self.is_current(generation) {
            return;
        }
        inner.grid.text_updated(order, &item_id, &text);
        self.notify(NoticeKind::Recognized, "Text recognized");
        self.set_state(CellState::Complete);
        info!(order, item_id = %item_id, chars = text.chars().count(), "Recognized text saved");

        tokio::time::sleep(inner.settings.complete_linger).await;
        inner.state.send_if_modified(|state| {
            if *state == CellState::Complete && self.is_current(generation) {
                *state = CellState::Idle;
                true
            } else {
                false
            }
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.slot.lock().generation == generation
    }

    fn clear_payload(&self, generation: u64) {
        let mut slot = self.inner.slot.lock();
        if slot.generation == generation {
            slot.payload = None;
        }
    }

    fn set_state(&self, state: CellState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!(order = self.inner.order, ?previous, ?state, "Cell state changed");
        }
    }

    fn notify(&self, kind: NoticeKind, message: impl Into<String>) {
        self.inner.grid.notify(Notice::new(self.inner.order, kind, message));
    }
}

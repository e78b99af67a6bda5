//! Grid coordinator
//!
//! Owns the loaded list, its items, the pending capture pool and one
//! orchestrator per touched slot. Cells report back through a weak handle,
//! so work finishing after the grid is gone is dropped quietly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::cell::{CellError, CellOrchestrator, CellSettings, GridCallbacks, UploadMode};
use super::layout::{GridLayout, GridPosition};
use super::notice::Notice;
use crate::capture::{CapturePayload, CaptureSink};
use crate::config::GridConfig;
use crate::ocr::Recognizer;
use crate::store::{ImageItem, ImageList, ObjectStore, StoreError};

const NOTICE_CAPACITY: usize = 64;

/// One grid slot as displayed
#[derive(Debug, Clone, Serialize)]
pub struct GridSlot {
    pub order: u32,
    pub position: GridPosition,
    pub item: Option<ImageItem>,
    /// A capture is waiting to be processed here
    pub pending: bool,
}

#[derive(Clone)]
pub struct GridCoordinator {
    inner: Arc<GridInner>,
}

struct GridInner {
    store: Arc<dyn ObjectStore>,
    recognizer: Arc<dyn Recognizer>,
    settings: CellSettings,
    state: Mutex<GridState>,
    notices: broadcast::Sender<Notice>,
    /// Error notices raised so far, counted even when no receiver keeps up
    failures: AtomicUsize,
}

struct GridState {
    list: ImageList,
    /// Sorted by order
    items: Vec<ImageItem>,
    pending: HashMap<u32, CapturePayload>,
    additional_rows: u32,
    cells: HashMap<u32, CellOrchestrator>,
}

impl GridCoordinator {
    /// Load a list and its items
    pub async fn open(
        list_id: &str,
        store: Arc<dyn ObjectStore>,
        recognizer: Arc<dyn Recognizer>,
        config: &GridConfig,
        mode: UploadMode,
    ) -> Result<Self, StoreError> {
        let list = store.get_image_list(list_id).await?;
        let items = store.list_image_items(list_id).await?;
        info!(list_id, name = %list.name, columns = list.columns, items = items.len(), "Grid opened");

        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Ok(Self {
            inner: Arc::new(GridInner {
                store,
                recognizer,
                settings: CellSettings {
                    mode,
                    complete_linger: config.complete_linger(),
                },
                state: Mutex::new(GridState {
                    list,
                    items: sorted(items),
                    pending: HashMap::new(),
                    additional_rows: config.additional_rows,
                    cells: HashMap::new(),
                }),
                notices,
                failures: AtomicUsize::new(0),
            }),
        })
    }

    pub fn list(&self) -> ImageList {
        self.inner.state.lock().list.clone()
    }

    /// Items sorted by order
    pub fn items(&self) -> Vec<ImageItem> {
        self.inner.state.lock().items.clone()
    }

    pub fn item_at(&self, order: u32) -> Option<ImageItem> {
        self.inner.item_at(order)
    }

    pub fn layout(&self) -> GridLayout {
        let state = self.inner.state.lock();
        let max_order = state.items.iter().map(|item| item.order).max();
        GridLayout::compute(state.list.columns, max_order, state.additional_rows)
    }

    /// Every slot of the current layout, row-major
    pub fn slots(&self) -> Vec<GridSlot> {
        let layout = self.layout();
        let state = self.inner.state.lock();
        layout
            .orders()
            .map(|order| GridSlot {
                order,
                position: layout.position(order),
                item: state.items.iter().find(|item| item.order == order).cloned(),
                pending: state.pending.contains_key(&order),
            })
            .collect()
    }

    /// Show one more empty row
    pub fn add_row(&self) -> GridLayout {
        self.inner.state.lock().additional_rows += 1;
        self.layout()
    }

    /// The orchestrator for a slot, created on first use
    pub fn cell(&self, order: u32) -> CellOrchestrator {
        let mut state = self.inner.state.lock();
        let list_id = state.list.id.clone();
        state
            .cells
            .entry(order)
            .or_insert_with(|| {
                CellOrchestrator::new(
                    order,
                    list_id,
                    self.inner.store.clone(),
                    self.inner.recognizer.clone(),
                    Arc::new(GridHandle(Arc::downgrade(&self.inner))),
                    self.inner.settings.clone(),
                )
            })
            .clone()
    }

    /// Put a capture in the pending pool and hand it to its cell
    pub fn stage_capture(&self, order: u32, payload: CapturePayload) {
        let replaced = self.inner.state.lock().pending.insert(order, payload).is_some();
        if replaced {
            debug!(order, "Replaced pending capture");
        }

        let cell = self.cell(order);
        tokio::spawn(async move {
            match cell.consume_pending().await {
                Ok(_) => {}
                Err(CellError::Superseded) => debug!(order, "Staged capture replaced before upload"),
                Err(e) => warn!(order, "Staged capture failed: {}", e),
            }
        });
    }

    pub fn pending_orders(&self) -> Vec<u32> {
        let mut orders: Vec<u32> = self.inner.state.lock().pending.keys().copied().collect();
        orders.sort_unstable();
        orders
    }

    /// Reload the list and its items from the store
    pub async fn refresh(&self) -> Result<(), StoreError> {
        let list_id = self.inner.state.lock().list.id.clone();
        let list = self.inner.store.get_image_list(&list_id).await?;
        let items = self.inner.store.list_image_items(&list_id).await?;

        let mut state = self.inner.state.lock();
        state.list = list;
        state.items = sorted(items);
        debug!(list_id = %list_id, items = state.items.len(), "Grid refreshed");
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// Number of failed operations reported since the grid was opened
    pub fn failure_count(&self) -> usize {
        self.inner.failures.load(Ordering::SeqCst)
    }

    /// Wait until nothing is pending and every cell is settled
    pub async fn settled(&self) {
        loop {
            let (cells, pending) = {
                let state = self.inner.state.lock();
                let cells: Vec<CellOrchestrator> = state.cells.values().cloned().collect();
                (cells, !state.pending.is_empty())
            };

            if pending {
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }

            join_all(cells.iter().map(|cell| cell.settled())).await;

            let state = self.inner.state.lock();
            let quiet = state.pending.is_empty()
                && state.cells.values().all(|cell| cell.state().is_settled());
            if quiet {
                return;
            }
        }
    }
}

impl CaptureSink for GridCoordinator {
    fn stage_capture(&self, order: u32, payload: CapturePayload) {
        GridCoordinator::stage_capture(self, order, payload);
    }
}

impl GridInner {
    fn item_at(&self, order: u32) -> Option<ImageItem> {
        self.state.lock().items.iter().find(|item| item.order == order).cloned()
    }

    fn image_uploaded(&self, item: ImageItem) {
        let mut state = self.state.lock();
        state.items.retain(|existing| existing.order != item.order);
        state.items.push(item);
        state.items.sort_by_key(|item| item.order);
    }

    fn image_deleted(&self, order: u32, item_id: &str) {
        self.state
            .lock()
            .items
            .retain(|item| !(item.order == order && item.id == item_id));
    }

    fn text_updated(&self, order: u32, item_id: &str, text: &str) {
        let mut state = self.state.lock();
        match state
            .items
            .iter_mut()
            .find(|item| item.order == order && item.id == item_id)
        {
            Some(item) => {
                item.ocr_text = (!text.is_empty()).then(|| text.to_string());
            }
            None => debug!(order, item_id, "Text for an item no longer shown"),
        }
    }

    fn take_pending(&self, order: u32) -> Option<CapturePayload> {
        self.state.lock().pending.remove(&order)
    }

    fn notify(&self, notice: Notice) {
        if notice.is_error() {
            self.failures.fetch_add(1, Ordering::SeqCst);
            warn!(order = notice.order, kind = ?notice.kind, "{}", notice.message);
        } else {
            debug!(order = notice.order, kind = ?notice.kind, "{}", notice.message);
        }
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }
}

/// Cell-side view of the grid
struct GridHandle(Weak<GridInner>);

impl GridCallbacks for GridHandle {
    fn item_at(&self, order: u32) -> Option<ImageItem> {
        self.0.upgrade()?.item_at(order)
    }

    fn image_uploaded(&self, item: ImageItem) {
        if let Some(grid) = self.0.upgrade() {
            grid.image_uploaded(item);
        }
    }

    fn image_deleted(&self, order: u32, item_id: &str) {
        if let Some(grid) = self.0.upgrade() {
            grid.image_deleted(order, item_id);
        }
    }

    fn text_updated(&self, order: u32, item_id: &str, text: &str) {
        if let Some(grid) = self.0.upgrade() {
            grid.text_updated(order, item_id, text);
        }
    }

    fn take_pending(&self, order: u32) -> Option<CapturePayload> {
        self.0.upgrade()?.take_pending(order)
    }

    fn notify(&self, notice: Notice) {
        if let Some(grid) = self.0.upgrade() {
            grid.notify(notice);
        }
    }
}

fn sorted(mut items: Vec<ImageItem>) -> Vec<ImageItem> {
    items.sort_by_key(|item| item.order);
    items
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, Rgb, RgbImage};

    use super::*;
    use crate::capability::Capabilities;
    use crate::capture::{CaptureSession, FakeCamera, PlaybackPolicy};
    use crate::grid::{CellState, NoticeKind};
    use crate::ocr::MockRecognizer;
    use crate::store::{MemoryStore, NewImageItem, NewImageList};

    const SEED_FILE_BASE64: &str = "AAAA";

    fn frame(name: &str) -> CapturePayload {
        CapturePayload::Frame {
            file_name: name.to_string(),
            image: DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([10, 120, 10]))),
        }
    }

    fn big_frame(name: &str) -> CapturePayload {
        CapturePayload::Frame {
            file_name: name.to_string(),
            image: DynamicImage::ImageRgb8(RgbImage::from_pixel(2400, 1800, Rgb([10, 10, 120]))),
        }
    }

    fn config() -> GridConfig {
        GridConfig {
            additional_rows: 0,
            complete_linger_ms: 5,
        }
    }

    async fn open_grid(
        recognizer: MockRecognizer,
        mode: UploadMode,
        orders: &[u32],
    ) -> (GridCoordinator, Arc<MemoryStore>, Arc<MockRecognizer>) {
        let store = Arc::new(MemoryStore::new());
        let list = store
            .create_image_list(NewImageList {
                name: "Pantry".to_string(),
                columns: 3,
            })
            .await
            .unwrap();
        for order in orders {
            store
                .create_image_item(NewImageItem {
                    file_name: format!("seed-{}.jpg", order),
                    base64_data: SEED_FILE_BASE64.to_string(),
                    order: *order,
                    image_list_id: list.id.clone(),
                })
                .await
                .unwrap();
        }

        let recognizer = Arc::new(recognizer);
        let grid = GridCoordinator::open(&list.id, store.clone(), recognizer.clone(), &config(), mode)
            .await
            .unwrap();
        (grid, store, recognizer)
    }

    fn drain(rx: &mut broadcast::Receiver<Notice>) -> Vec<NoticeKind> {
        let mut kinds = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            kinds.push(notice.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn test_layout_from_items() {
        let (grid, _, _) = open_grid(MockRecognizer::answering(&[]), UploadMode::Immediate, &[4]).await;

        let layout = grid.layout();
        assert_eq!(layout.total_rows, 2);
        assert_eq!(layout.total_slots, 6);

        let slots = grid.slots();
        assert_eq!(slots.len(), 6);
        let occupied: Vec<u32> = slots.iter().filter(|s| s.item.is_some()).map(|s| s.order).collect();
        assert_eq!(occupied, vec![4]);
        assert_eq!(slots[4].position, GridPosition { row: 2, column: 2 });

        assert_eq!(grid.add_row().total_slots, 9);
    }

    #[tokio::test]
    async fn test_open_missing_list() {
        let store = Arc::new(MemoryStore::new());
        let result = GridCoordinator::open(
            "missing",
            store,
            Arc::new(MockRecognizer::answering(&[])),
            &config(),
            UploadMode::Immediate,
        )
        .await;
        assert!(matches!(result, Err(ref e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_cells_are_reused() {
        let (grid, _, _) = open_grid(MockRecognizer::answering(&[]), UploadMode::Immediate, &[]).await;
        let first = grid.cell(2);
        first.toggle_text();
        assert_eq!(grid.cell(2).order(), 2);
        assert_eq!(grid.cell(2).generation(), first.generation());
    }

    #[tokio::test]
    async fn test_replacing_keeps_id_and_clears_text() {
        let recognizer = MockRecognizer::answering(&[])
            .then(0, Ok(&["first"][..]))
            .then(0, Err("timeout"));
        let (grid, store, _) = open_grid(recognizer, UploadMode::Immediate, &[]).await;
        let mut notices = grid.subscribe();
        let cell = grid.cell(0);

        let first = cell.submit(frame("one.jpg")).await.unwrap().unwrap();
        cell.settled().await;
        assert_eq!(grid.item_at(0).unwrap().ocr_text.as_deref(), Some("first"));

        let second = cell.submit(frame("two.jpg")).await.unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert!(grid.item_at(0).unwrap().ocr_text.is_none());
        cell.settled().await;

        let stored = store.get_image_item(&first.id).await.unwrap();
        assert_eq!(stored.file_name, "two.jpg");
        assert!(stored.ocr_text.is_none());
        assert_eq!(grid.items().len(), 1);
        assert_eq!(
            drain(&mut notices),
            vec![
                NoticeKind::Uploaded,
                NoticeKind::Recognized,
                NoticeKind::Uploaded,
                NoticeKind::RecognitionFailed
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_recognition_is_discarded() {
        let recognizer = MockRecognizer::answering(&["new"]).then(150, Ok(&["old"][..]));
        let (grid, store, recognizer) = open_grid(recognizer, UploadMode::Immediate, &[]).await;
        let cell = grid.cell(1);

        let item = cell.submit(frame("one.jpg")).await.unwrap().unwrap();
        while recognizer.calls() == 0 {
            tokio::task::yield_now().await;
        }

        cell.submit(frame("two.jpg")).await.unwrap();
        cell.settled().await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(recognizer.calls(), 2);
        assert_eq!(cell.state(), CellState::Idle);
        assert_eq!(grid.item_at(1).unwrap().ocr_text.as_deref(), Some("new"));
        let stored = store.get_image_item(&item.id).await.unwrap();
        assert_eq!(stored.ocr_text.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_failed_replacement_keeps_capture_for_retry() {
        let (grid, store, _) = open_grid(MockRecognizer::answering(&["ok"]), UploadMode::Immediate, &[]).await;
        let cell = grid.cell(0);
        let first = cell.submit(frame("one.jpg")).await.unwrap().unwrap();
        cell.settled().await;

        store.fail_item_writes(true);
        let result = cell.submit(frame("two.jpg")).await;
        assert!(matches!(result, Err(CellError::Store(_))));
        assert_eq!(cell.state(), CellState::Captured);
        assert_eq!(cell.captured().unwrap().file_name(), "two.jpg");
        assert_eq!(grid.item_at(0).unwrap().file_name, "one.jpg");

        store.fail_item_writes(false);
        let retried = cell.retry().await.unwrap();
        assert_eq!(retried.id, first.id);
        assert_eq!(retried.file_name, "two.jpg");
        cell.settled().await;
        assert!(cell.captured().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let (grid, store, _) = open_grid(MockRecognizer::answering(&["ok"]), UploadMode::Immediate, &[]).await;
        let mut notices = grid.subscribe();
        let cell = grid.cell(2);
        let item = cell.submit(frame("one.jpg")).await.unwrap().unwrap();
        cell.settled().await;
        let generation = cell.generation();

        cell.delete().await.unwrap();
        assert!(grid.item_at(2).is_none());
        assert!(store.get_image_item(&item.id).await.unwrap_err().is_not_found());
        assert!(cell.generation() > generation);
        assert_eq!(drain(&mut notices).last(), Some(&NoticeKind::Deleted));
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_item() {
        let (grid, store, _) = open_grid(MockRecognizer::answering(&["ok"]), UploadMode::Immediate, &[]).await;
        let cell = grid.cell(0);
        let item = cell.submit(frame("one.jpg")).await.unwrap().unwrap();
        cell.settled().await;
        let mut notices = grid.subscribe();

        store.fail_item_writes(true);
        assert!(cell.delete().await.is_err());
        assert_eq!(grid.item_at(0).unwrap().id, item.id);
        assert!(store.get_image_item(&item.id).await.is_ok());
        assert_eq!(drain(&mut notices), vec![NoticeKind::DeleteFailed]);
    }

    #[tokio::test]
    async fn test_concurrent_submits_keep_one_item_per_order() {
        let (grid, store, _) = open_grid(MockRecognizer::answering(&["kept"]), UploadMode::Immediate, &[]).await;
        let list_id = grid.list().id;
        let cell = grid.cell(3);

        let (first, second) = tokio::join!(cell.submit(big_frame("first.jpg")), cell.submit(frame("second.jpg")));
        assert!(matches!(first, Err(CellError::Superseded)));
        second.unwrap();
        grid.settled().await;

        let stored = store.list_image_items(&list_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].file_name, "second.jpg");
        assert_eq!(grid.items().len(), 1);
        assert_eq!(grid.item_at(3).unwrap().ocr_text.as_deref(), Some("kept"));
        assert_eq!(grid.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_counted_without_subscriber() {
        let (grid, store, _) = open_grid(MockRecognizer::answering(&["ok"]), UploadMode::Immediate, &[]).await;
        store.fail_item_writes(true);

        for order in 0..(NOTICE_CAPACITY as u32 + 6) {
            grid.stage_capture(order, frame("fails.jpg"));
        }
        grid.settled().await;

        assert_eq!(grid.failure_count(), NOTICE_CAPACITY + 6);
        assert!(grid.items().is_empty());
    }

    #[tokio::test]
    async fn test_staged_capture_is_processed() {
        let (grid, store, _) = open_grid(MockRecognizer::answering(&["LOT", "7"]), UploadMode::Immediate, &[]).await;

        grid.stage_capture(5, frame("staged.jpg"));
        assert_eq!(grid.pending_orders(), vec![5]);
        grid.settled().await;

        assert!(grid.pending_orders().is_empty());
        let item = grid.item_at(5).unwrap();
        assert_eq!(item.ocr_text.as_deref(), Some("LOT 7"));
        assert_eq!(grid.layout().total_rows, 2);

        grid.refresh().await.unwrap();
        assert_eq!(grid.items(), store.list_image_items(&item.image_list_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_camera_bulk_capture_into_grid() {
        let (grid, _, _) = open_grid(MockRecognizer::answering(&["label"]), UploadMode::Immediate, &[]).await;
        let caps = Capabilities::detect().with_camera(Arc::new(FakeCamera::new()));
        let policy = PlaybackPolicy {
            max_attempts: 2,
            retry_delay: Duration::from_millis(1),
            readiness_checks: vec![Duration::from_millis(1)],
        };
        let mut session = CaptureSession::new(&caps, Arc::new(grid.clone()), policy, 3, 2);

        session.open().await.unwrap();
        for _ in 0..2 {
            assert!(session.await_ready().await.unwrap());
            session.capture().unwrap();
            session.confirm().unwrap();
        }
        session.close();
        grid.settled().await;

        let orders: Vec<u32> = grid.items().iter().map(|item| item.order).collect();
        assert_eq!(orders, vec![2, 3]);
        assert!(grid.items().iter().all(|item| item.has_text()));
    }

    #[tokio::test]
    async fn test_cell_outliving_grid() {
        let (grid, store, _) = open_grid(MockRecognizer::answering(&["ok"]), UploadMode::Immediate, &[]).await;
        let cell = grid.cell(0);
        drop(grid);

        let item = cell.submit(frame("late.jpg")).await.unwrap().unwrap();
        assert_eq!(cell.settled().await, CellState::Idle);
        assert!(cell.item().is_none());
        let stored = store.get_image_item(&item.id).await.unwrap();
        assert_eq!(stored.ocr_text.as_deref(), Some("ok"));
    }
}

//! In-process object store
//!
//! Same semantics as the Parse backend, kept in memory. Used for offline
//! runs and as the store double in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use uuid::Uuid;

use super::repository::ObjectStore;
use super::types::{
    validate_columns, ImageItem, ImageItemUpdate, ImageList, ImageListUpdate, NewImageItem,
    NewImageList, Page, StoreError, StoredFile,
};

#[derive(Default)]
struct MemoryState {
    lists: Vec<ImageList>,
    items: HashMap<String, ImageItem>,
    files: HashMap<String, Vec<u8>>,
    fail_item_writes: bool,
    fail_file_deletes: bool,
}

/// Object store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files, including ones no record references
    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }

    /// Make item create/update/delete calls fail as if the backend were unreachable
    #[cfg(test)]
    pub(crate) fn fail_item_writes(&self, fail: bool) {
        self.state.lock().fail_item_writes = fail;
    }

    #[cfg(test)]
    pub(crate) fn fail_file_deletes(&self, fail: bool) {
        self.state.lock().fail_file_deletes = fail;
    }

    fn store_file(state: &mut MemoryState, file_name: &str, base64_data: &str) -> Result<StoredFile, StoreError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(base64_data)
            .map_err(|e| StoreError::InvalidInput(format!("Invalid base64 data: {}", e)))?;

        let name = format!("{}_{}", Uuid::new_v4().simple(), file_name);
        state.files.insert(name.clone(), bytes);

        Ok(StoredFile {
            url: Some(format!("memory://files/{}", name)),
            name,
        })
    }

    fn check_writable(state: &MemoryState) -> Result<(), StoreError> {
        if state.fail_item_writes {
            return Err(StoreError::Remote("Simulated backend outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_image_lists(&self, page: u32, page_size: u32) -> Result<Page<ImageList>, StoreError> {
        let state = self.state.lock();
        let skip = page.saturating_sub(1) as usize * page_size as usize;

        // newest first, like the Parse query
        let items = state
            .lists
            .iter()
            .rev()
            .skip(skip)
            .take(page_size as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            total: state.lists.len() as u64,
        })
    }

    async fn get_image_list(&self, id: &str) -> Result<ImageList, StoreError> {
        self.state
            .lock()
            .lists
            .iter()
            .find(|list| list.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ImageList {}", id)))
    }

    async fn create_image_list(&self, list: NewImageList) -> Result<ImageList, StoreError> {
        validate_columns(list.columns)?;

        let created = ImageList {
            id: Uuid::new_v4().simple().to_string(),
            name: list.name,
            columns: list.columns,
        };
        self.state.lock().lists.push(created.clone());
        Ok(created)
    }

    async fn update_image_list(&self, id: &str, update: ImageListUpdate) -> Result<ImageList, StoreError> {
        if let Some(columns) = update.columns {
            validate_columns(columns)?;
        }

        let mut state = self.state.lock();
        let list = state
            .lists
            .iter_mut()
            .find(|list| list.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("ImageList {}", id)))?;

        if let Some(name) = update.name {
            list.name = name;
        }
        if let Some(columns) = update.columns {
            list.columns = columns;
        }
        Ok(list.clone())
    }

    async fn delete_image_list_record(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let before = state.lists.len();
        state.lists.retain(|list| list.id != id);
        if state.lists.len() == before {
            return Err(StoreError::NotFound(format!("ImageList {}", id)));
        }
        Ok(())
    }

    async fn list_image_items(&self, image_list_id: &str) -> Result<Vec<ImageItem>, StoreError> {
        let state = self.state.lock();
        let mut items: Vec<ImageItem> = state
            .items
            .values()
            .filter(|item| item.image_list_id == image_list_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.order);
        Ok(items)
    }

    async fn find_image_item_by_order(
        &self,
        image_list_id: &str,
        order: u32,
    ) -> Result<Option<ImageItem>, StoreError> {
        Ok(self
            .state
            .lock()
            .items
            .values()
            .find(|item| item.image_list_id == image_list_id && item.order == order)
            .cloned())
    }

    async fn get_image_item(&self, id: &str) -> Result<ImageItem, StoreError> {
        self.state
            .lock()
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ImageItem {}", id)))
    }

    async fn create_image_item(&self, item: NewImageItem) -> Result<ImageItem, StoreError> {
        let mut state = self.state.lock();
        Self::check_writable(&state)?;

        let file = Self::store_file(&mut state, &item.file_name, &item.base64_data)?;
        let created = ImageItem {
            id: Uuid::new_v4().simple().to_string(),
            file_name: item.file_name,
            file_url: file.url.clone(),
            file: Some(file),
            order: item.order,
            image_list_id: item.image_list_id,
            ocr_text: None,
        };
        state.items.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_image_item(&self, id: &str, update: ImageItemUpdate) -> Result<ImageItem, StoreError> {
        let mut state = self.state.lock();
        Self::check_writable(&state)?;

        let current = state
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ImageItem {}", id)))?;

        let mut updated = current;
        if let Some(data) = update.base64_data.as_deref() {
            let name = update.file_name.as_deref().unwrap_or(&updated.file_name).to_string();
            let file = Self::store_file(&mut state, &name, data)?;
            updated.file_url = file.url.clone();
            updated.file = Some(file);
        }
        if let Some(file_name) = update.file_name {
            updated.file_name = file_name;
        }

        state.items.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn update_image_item_ocr_text(&self, id: &str, text: &str) -> Result<ImageItem, StoreError> {
        let mut state = self.state.lock();
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("ImageItem {}", id)))?;

        item.ocr_text = if text.is_empty() { None } else { Some(text.to_string()) };
        Ok(item.clone())
    }

    async fn delete_image_item(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        Self::check_writable(&state)?;
        state
            .items
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("ImageItem {}", id)))
    }

    async fn delete_stored_file(&self, file: &StoredFile) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.fail_file_deletes {
            return Err(StoreError::Remote(format!("Cannot delete file {}", file.name)));
        }
        state.files.remove(&file.name);
        Ok(())
    }
}

//! Object store trait
//!
//! One operation per backend record action. `delete_image_list` is provided
//! on top of the primitives so every backend cascades the same way.

use async_trait::async_trait;
use futures::future::join_all;

use super::types::{
    ImageItem, ImageItemUpdate, ImageList, ImageListUpdate, NewImageItem, NewImageList, Page,
    StoreError, StoredFile,
};

/// Remote object store for image lists and their items
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Paginated image lists, `page` is 1-based
    async fn list_image_lists(&self, page: u32, page_size: u32)
        -> Result<Page<ImageList>, StoreError>;

    async fn get_image_list(&self, id: &str) -> Result<ImageList, StoreError>;

    async fn create_image_list(&self, list: NewImageList) -> Result<ImageList, StoreError>;

    async fn update_image_list(
        &self,
        id: &str,
        update: ImageListUpdate,
    ) -> Result<ImageList, StoreError>;

    /// Delete only the list record, see [`ObjectStore::delete_image_list`]
    async fn delete_image_list_record(&self, id: &str) -> Result<(), StoreError>;

    /// Items of a list, ascending by order
    async fn list_image_items(&self, image_list_id: &str) -> Result<Vec<ImageItem>, StoreError>;

    async fn find_image_item_by_order(
        &self,
        image_list_id: &str,
        order: u32,
    ) -> Result<Option<ImageItem>, StoreError>;

    async fn get_image_item(&self, id: &str) -> Result<ImageItem, StoreError>;

    /// Store the file, then the record referencing it
    async fn create_image_item(&self, item: NewImageItem) -> Result<ImageItem, StoreError>;

    async fn update_image_item(
        &self,
        id: &str,
        update: ImageItemUpdate,
    ) -> Result<ImageItem, StoreError>;

    async fn update_image_item_ocr_text(
        &self,
        id: &str,
        text: &str,
    ) -> Result<ImageItem, StoreError>;

    async fn delete_image_item(&self, id: &str) -> Result<(), StoreError>;

    async fn delete_stored_file(&self, file: &StoredFile) -> Result<(), StoreError>;

    /// Delete a list with all of its items
    ///
    /// Stored files are removed best-effort. Items that are already gone count
    /// as deleted. Any other failure aborts before the list record is removed,
    /// leaving a partially deleted list the caller has to retry.
    async fn delete_image_list(&self, id: &str) -> Result<(), StoreError> {
        let items = self.list_image_items(id).await?;

        let files: Vec<&StoredFile> = items.iter().filter_map(|item| item.file.as_ref()).collect();
        let results = join_all(files.iter().map(|file| self.delete_stored_file(file))).await;
        for (file, result) in files.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(list_id = %id, file = %file.name, "Failed to delete stored file: {}", e);
            }
        }

        for item in &items {
            match self.delete_image_item(&item.id).await {
                Ok(()) => {}
                Err(StoreError::NotFound(_)) => {
                    tracing::debug!(item_id = %item.id, "Item already deleted");
                }
                Err(e) => {
                    tracing::error!(list_id = %id, item_id = %item.id, "Cascade delete aborted: {}", e);
                    return Err(e);
                }
            }
        }

        self.delete_image_list_record(id).await?;

        tracing::info!(list_id = %id, items = items.len(), "Deleted image list");
        Ok(())
    }
}

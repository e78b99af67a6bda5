//! Store types
//!
//! Typed records for the `ImageList` and `ImageItem` collections. Backend
//! representations are mapped into these at the client boundary.

use serde::{Deserialize, Serialize};

/// A named, column-configured collection of grid-positioned images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageList {
    pub id: String,
    pub name: String,
    pub columns: u32,
}

/// Fields for a new image list
#[derive(Debug, Clone)]
pub struct NewImageList {
    pub name: String,
    pub columns: u32,
}

/// Partial update of an image list
#[derive(Debug, Clone, Default)]
pub struct ImageListUpdate {
    pub name: Option<String>,
    pub columns: Option<u32>,
}

/// Reference to a stored file attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    pub url: Option<String>,
}

/// One occupied grid cell: persisted image plus recognized text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageItem {
    pub id: String,
    pub file_name: String,
    pub file: Option<StoredFile>,
    pub file_url: Option<String>,
    /// Zero-based grid index, unique within the list
    pub order: u32,
    pub image_list_id: String,
    pub ocr_text: Option<String>,
}

impl ImageItem {
    pub fn has_text(&self) -> bool {
        self.ocr_text.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Fields for a new image item; `base64_data` is the encoded JPEG
#[derive(Debug, Clone)]
pub struct NewImageItem {
    pub file_name: String,
    pub base64_data: String,
    pub order: u32,
    pub image_list_id: String,
}

/// Partial update of an image item; new data replaces the stored file
#[derive(Debug, Clone, Default)]
pub struct ImageItemUpdate {
    pub file_name: Option<String>,
    pub base64_data: Option<String>,
}

/// A page of results with the unpaginated total
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Reject column counts the grid cannot lay out
pub fn validate_columns(columns: u32) -> Result<(), StoreError> {
    if columns == 0 {
        return Err(StoreError::InvalidInput(
            "columns must be at least 1".to_string(),
        ));
    }
    Ok(())
}

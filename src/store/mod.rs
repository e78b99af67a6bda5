//! Remote Object Store
//!
//! Typed access to the `ImageList` and `ImageItem` collections.
//!
//! Backends:
//! - Parse Server over its REST API
//! - In-process memory (offline runs and tests)

mod memory;
mod parse;
mod repository;
mod types;

pub use memory::MemoryStore;
pub use parse::ParseClient;
pub use repository::ObjectStore;
pub use types::{
    ImageItem, ImageItemUpdate, ImageList, ImageListUpdate, NewImageItem, NewImageList, Page,
    StoreError, StoredFile,
};

//! Gridscan
//!
//! Grid-positioned image capture with background text recognition. Images are
//! stored as `ImageItem` records on a Parse Server, one per grid slot of an
//! `ImageList`, and the recognized text is written back to each record.
//!
//! # Modules
//!
//! - `capture`: Camera sessions and the file picker fallback
//! - `codec`: Resize and JPEG-encode captures before upload
//! - `grid`: Slot layout, per-cell state machines and the grid coordinator
//! - `ocr`: Remote OCR service client
//! - `store`: Parse Server REST client and an in-memory store

pub mod capability;
pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod grid;
pub mod ocr;
pub mod state;
pub mod store;

pub use error::{AppError, Result};

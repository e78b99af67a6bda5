//! Grid Module
//!
//! The image grid of one list: slot layout, the per-slot upload and
//! recognition state machines, and the coordinator that owns them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gridscan::grid::{GridCoordinator, UploadMode};
//!
//! let grid = GridCoordinator::open(&list_id, store, recognizer, &config.grid, UploadMode::Immediate).await?;
//! let item = grid.cell(4).submit(payload).await?;
//! grid.settled().await;
//! ```

mod cell;
mod coordinator;
mod disclosure;
mod layout;
mod notice;

pub use cell::{CellError, CellOrchestrator, CellSettings, CellState, GridCallbacks, UploadMode};
pub use coordinator::{GridCoordinator, GridSlot};
pub use disclosure::{TextDisclosure, PREVIEW_CHARS};
pub use layout::{GridLayout, GridPosition};
pub use notice::{Notice, NoticeKind};

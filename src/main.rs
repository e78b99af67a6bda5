//! Gridscan importer
//!
//! Opens (or creates) an image list on the configured Parse server, stages
//! every image of a directory into consecutive grid positions and waits for
//! upload and text recognition to finish.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridscan::capability::Capabilities;
use gridscan::capture::{list_image_files, CaptureSession};
use gridscan::config::{parse_var, Config};
use gridscan::grid::UploadMode;
use gridscan::state::AppState;
use gridscan::store::{NewImageList, ObjectStore};

const LIST_SEARCH_PAGE_SIZE: u32 = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "gridscan=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting Gridscan importer v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Parse server: {}", config.store.server_url);
    tracing::info!("OCR service: {}", config.ocr.base_url);

    let import_dir = PathBuf::from(
        std::env::var("GRIDSCAN_IMPORT_DIR").context("GRIDSCAN_IMPORT_DIR is not set")?,
    );
    let start_order: u32 = parse_var("GRIDSCAN_START_POSITION", 0)?;
    let policy = config.capture.playback_policy();

    let capabilities = Capabilities::detect();
    tracing::info!(platform = ?capabilities.platform, camera = capabilities.has_camera(), "Capabilities detected");

    let state = AppState::connect(config, capabilities)?;
    let list_id = resolve_list(&state).await?;
    let grid = state.open_grid(&list_id, UploadMode::Immediate).await?;
    let list = grid.list();

    let files = list_image_files(&import_dir)
        .await
        .with_context(|| format!("Failed to read {}", import_dir.display()))?;
    tracing::info!(list_id = %list.id, files = files.len(), start_order, "Importing images");

    let mut session = CaptureSession::new(
        state.capabilities(),
        Arc::new(grid.clone()),
        policy,
        list.columns,
        start_order,
    );
    for path in &files {
        let position = session.position();
        match session.upload_file(path).await {
            Ok(order) => tracing::debug!(order, row = position.row, column = position.column, "Staged"),
            Err(e) => tracing::warn!(file = %path.display(), "Skipping file: {}", e),
        }
    }
    drop(session);

    grid.settled().await;

    for slot in grid.slots() {
        if let Some(item) = slot.item {
            tracing::info!(
                order = slot.order,
                row = slot.position.row,
                column = slot.position.column,
                item_id = %item.id,
                text = item.ocr_text.as_deref().unwrap_or(""),
                "Cell"
            );
        }
    }

    let failed = grid.failure_count();
    if failed > 0 {
        anyhow::bail!("{} operation(s) failed", failed);
    }

    tracing::info!("Import complete");
    Ok(())
}

/// Use `GRIDSCAN_LIST_ID`, or find or create the list named `GRIDSCAN_LIST_NAME`
async fn resolve_list(state: &AppState) -> anyhow::Result<String> {
    if let Ok(id) = std::env::var("GRIDSCAN_LIST_ID") {
        return Ok(id);
    }

    let name = std::env::var("GRIDSCAN_LIST_NAME")
        .context("Set GRIDSCAN_LIST_ID or GRIDSCAN_LIST_NAME")?;
    let store = state.store();

    let mut page = 1;
    loop {
        let lists = store.list_image_lists(page, LIST_SEARCH_PAGE_SIZE).await?;
        if let Some(list) = lists.items.iter().find(|list| list.name == name) {
            tracing::info!(list_id = %list.id, name = %list.name, "Using existing image list");
            return Ok(list.id.clone());
        }
        if lists.items.is_empty() || u64::from(page * LIST_SEARCH_PAGE_SIZE) >= lists.total {
            break;
        }
        page += 1;
    }

    let columns: u32 = parse_var("GRIDSCAN_COLUMNS", 3)?;
    let list = store.create_image_list(NewImageList { name, columns }).await?;
    tracing::info!(list_id = %list.id, name = %list.name, columns, "Created image list");
    Ok(list.id)
}

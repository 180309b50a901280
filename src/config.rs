//! Runtime tuning knobs for the grid engine.
//!
//! Lives in its own `thread_local!` like the rest of the worker state. The
//! page can replace it wholesale with `POST /api/config`; missing keys fall
//! back to the defaults below.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use tracing::info;

/// Highest number of promotion circles a character can show. Fixed by the
/// mastery tier table, so it is not part of [`GridConfig`].
pub const MAX_CIRCLES: u8 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Pointer travel (px) that turns a pending touch into a drag.
    pub drag_threshold_px: f64,
    /// Hold time (ms) after which a pending touch opens the context menu.
    pub long_press_ms: f64,
    /// localStorage key for anonymous grid documents.
    pub grid_storage_key: String,
    /// localStorage key for filter preferences.
    pub filter_storage_key: String,
    /// How long a notice stays on screen.
    pub notice_duration_ms: u32,
    /// Longest accepted character id in imported documents.
    pub max_id_len: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            drag_threshold_px: 10.0,
            long_press_ms: 500.0,
            grid_storage_key: "gridState".to_string(),
            filter_storage_key: "gridFilters".to_string(),
            notice_duration_ms: 5000,
            max_id_len: 64,
        }
    }
}

thread_local! {
    static CONFIG: RefCell<GridConfig> = RefCell::new(GridConfig::default());
}

/// Execute a closure with read access to the active config.
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&GridConfig) -> R,
{
    CONFIG.with(|c| f(&c.borrow()))
}

/// Replace the active config.
pub fn replace_config(config: GridConfig) {
    info!(
        drag_threshold_px = config.drag_threshold_px,
        long_press_ms = config.long_press_ms,
        "Grid config replaced"
    );
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Parse a JSON config document and install it.
pub fn import_config_json(json: &str) -> Result<(), String> {
    let config: GridConfig =
        serde_json::from_str(json).map_err(|e| format!("Invalid config JSON: {}", e))?;
    replace_config(config);
    Ok(())
}

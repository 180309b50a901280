//! Sharing: which share actions a session may offer, link building, and
//! loading a shared grid into the worker.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::GridError;
use crate::grid::reorder::with_controller_mut;
use crate::grid::session::{replace_session, Session, SessionKind, ShareMode};
use crate::grid::state::{replace_state, GridState};
use crate::grid::view::with_projector_mut;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShareOption {
    pub action: &'static str,
    pub label: &'static str,
    pub mode: ShareMode,
    /// Persistent shares point at the live grid instead of a copy.
    pub persistent: bool,
}

const SNAPSHOT_OPTIONS: [ShareOption; 2] = [
    ShareOption {
        action: "snapshot-readonly",
        label: "Create readonly snapshot",
        mode: ShareMode::ReadOnly,
        persistent: false,
    },
    ShareOption {
        action: "snapshot-editable",
        label: "Create editable snapshot",
        mode: ShareMode::ReadWrite,
        persistent: false,
    },
];

const PERSISTENT_OPTIONS: [ShareOption; 2] = [
    ShareOption {
        action: "persistent-readonly",
        label: "Share the grid in readonly mode",
        mode: ShareMode::ReadOnly,
        persistent: true,
    },
    ShareOption {
        action: "persistent-editable",
        label: "Share the grid in editable mode",
        mode: ShareMode::ReadWrite,
        persistent: true,
    },
];

/// Persistent shares need a grid that lives on the server: a logged-in
/// user's profile or an editable shared grid.
pub fn share_options(session: &Session) -> Vec<ShareOption> {
    let mut options = SNAPSHOT_OPTIONS.to_vec();
    if session.is_logged_in() || (session.is_shared() && session.can_edit()) {
        options.extend_from_slice(&PERSISTENT_OPTIONS);
    }
    options
}

pub fn find_option(action: &str) -> Option<ShareOption> {
    SNAPSHOT_OPTIONS
        .iter()
        .chain(PERSISTENT_OPTIONS.iter())
        .find(|o| o.action == action)
        .copied()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareLinks {
    pub read_write: String,
    pub read_only: String,
}

pub fn share_links(origin: &str, share_id: &str) -> ShareLinks {
    let base = format!("{}/share/{}", origin.trim_end_matches('/'), share_id);
    ShareLinks {
        read_write: format!("{}?edit=true", base),
        read_only: format!("{}?edit=false", base),
    }
}

/// Body for `POST /api/share`: the current document plus its access mode.
pub fn snapshot_request(grid: &GridState, mode: ShareMode) -> String {
    #[derive(Serialize)]
    struct Body<'a> {
        state: &'a GridState,
        mode: ShareMode,
    }
    serde_json::to_string(&Body { state: grid, mode }).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: GridState,
    pub mode: ShareMode,
}

/// Parse a shared-grid fetch. Accepts both the flat `{layout, marks,
/// skins, mode}` shape and the nested `{state: {...}, mode}` request shape.
/// A missing mode means read-only.
pub fn parse_snapshot(json: &str, max_id_len: usize) -> Result<Snapshot, GridError> {
    let root: Value = serde_json::from_str(json)
        .map_err(|e| GridError::InvalidImportDocument(e.to_string()))?;
    let mode = match root.get("mode") {
        None | Some(Value::Null) => ShareMode::ReadOnly,
        Some(Value::String(m)) => ShareMode::parse(m).ok_or_else(|| {
            GridError::InvalidImportDocument(format!("unknown share mode `{}`", m))
        })?,
        Some(_) => {
            return Err(GridError::InvalidImportDocument(
                "`mode` must be a string".into(),
            ))
        }
    };
    let document = match root.get("state") {
        Some(inner @ Value::Object(_)) => inner.to_string(),
        _ => json.to_string(),
    };
    let state = GridState::from_document(&document, max_id_len)?;
    Ok(Snapshot { state, mode })
}

/// Install a shared grid as the working state and switch the session.
/// `link_mode` comes from the link's `edit` flag and can only narrow the
/// stored mode. Read-only grids switch the reorder controller off.
pub fn load_snapshot(
    share_id: &str,
    json: &str,
    persistent: bool,
    link_mode: Option<ShareMode>,
    max_id_len: usize,
) -> Result<ShareMode, GridError> {
    let Snapshot { state, mode } = parse_snapshot(json, max_id_len)?;
    let mode = match link_mode {
        Some(ShareMode::ReadOnly) => ShareMode::ReadOnly,
        _ => mode,
    };
    info!(share_id, ?mode, persistent, characters = state.layout.len(), "Shared grid loaded");
    replace_state(state);
    replace_session(Session {
        kind: SessionKind::Shared {
            share_id: share_id.to_string(),
            mode,
            persistent,
        },
        ..Session::default()
    });
    with_controller_mut(|c| c.set_enabled(mode == ShareMode::ReadWrite));
    with_projector_mut(|p| p.clear());
    Ok(mode)
}

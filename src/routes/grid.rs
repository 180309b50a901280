//! Grid routes: rendering the visible grid and every mutation on it.
//!
//! Mutations follow one shape: check the session may edit, apply the change
//! to the in-memory state, re-render the grid, then append the save script
//! for the session's persistence scope. A change that turns out to be a
//! no-op renders without saving.

use serde_json::json;
use tracing::info;

use crate::config::{with_config, MAX_CIRCLES};
use crate::error::GridError;
use crate::grid::catalog::{with_catalog, CharacterCatalog};
use crate::grid::filter::with_filters;
use crate::grid::notice::{self, escape_html, NoticeKind};
use crate::grid::persist::{
    with_queue_mut, AckOutcome, PersistScope, PersistenceGateway, ScriptBridge,
};
use crate::grid::session::{with_session, with_session_mut, ClickAction, InteractionMode};
use crate::grid::state::{self, with_state, with_state_mut, GridState, Mark};
use crate::grid::view::{self, with_projector_mut, CellView, ProjectionChange};
use crate::routes::util::{
    error_span, get_list, get_nonempty, get_param, get_u64, missing, oob_notices,
    parse_form_body, parse_query,
};

// ── Shared helpers ─────────────────────────────────────────────────

/// Ids currently passing the filters, in layout order.
pub(crate) fn visible_ids() -> Vec<String> {
    with_catalog(|catalog| {
        with_state(|grid| {
            with_filters(|filters| {
                view::project(&grid.layout, catalog, |c| filters.matches(c, grid))
            })
        })
    })
}

/// Run a mutation against the grid. The closure returns whether anything
/// changed.
pub(crate) fn mutate<F>(f: F) -> Result<bool, GridError>
where
    F: FnOnce(&mut GridState, &CharacterCatalog) -> Result<bool, GridError>,
{
    with_session(|s| s.ensure_editable())?;
    with_catalog(|catalog| with_state_mut(|grid| f(grid, catalog)))
}

/// Issue a save for the current document and render it as a script.
/// Read-only sessions have nowhere to save and get an empty string.
pub(crate) fn save_script() -> String {
    let scope = with_session(|s| with_config(|c| PersistScope::for_session(s, c)));
    let Some(scope) = scope else {
        return String::new();
    };
    let document = state::export_state_json();
    let request = with_queue_mut(|q| q.issue(scope, document));
    let mut bridge = ScriptBridge::new();
    bridge.save(&request);
    bridge.take()
}

/// Standard response for a grid mutation.
pub(crate) fn mutation_response(result: Result<bool, GridError>) -> String {
    let save = match result {
        Ok(true) => save_script(),
        Ok(false) => String::new(),
        Err(e) => {
            notice::push_error(&e);
            String::new()
        }
    };
    format!("{}{}{}", render_grid(false), save, oob_notices())
}

fn render_cell(cell: &CellView, editable: bool) -> String {
    let id = escape_html(&cell.id);
    let mark = Mark {
        checks: cell.checked,
        circles: cell.circles,
    };
    let circles: String = (0..MAX_CIRCLES)
        .map(|slot| {
            let lit = if mark.is_lit(slot) { " show" } else { "" };
            format!(r#"<span class="circle{}"></span>"#, lit)
        })
        .collect();
    let action = if editable {
        format!(
            r##" hx-post="/api/grid/click" hx-vals='{{"id":"{id}"}}' hx-target="#grid" hx-swap="outerHTML""##,
            id = id
        )
    } else {
        String::new()
    };
    format!(
        r#"<div class="character-cell relative select-none" data-id="{id}" data-class="{class}" data-rarity="{rarity}"{action}>
  <img src="/characters/{skin}" alt="{name}" draggable="false" class="w-full rounded">
  <span class="check-mark absolute top-0 right-0" style="display: {check}">&#10003;</span>
  <div class="circles absolute bottom-0 left-0 flex gap-0.5">{circles}</div>
</div>"#,
        id = id,
        class = escape_html(&cell.class),
        rarity = cell.rarity,
        action = action,
        skin = escape_html(&cell.skin),
        name = escape_html(&cell.name),
        check = if mark.checks { "block" } else { "none" },
        circles = circles,
    )
}

/// Render the visible grid. `oob` renders it as an out-of-band swap so
/// filter and catalog responses can refresh it alongside their own markup.
pub(crate) fn render_grid(oob: bool) -> String {
    let visible = visible_ids();
    with_projector_mut(|p| p.refresh(visible.clone()));
    let cells = with_catalog(|catalog| with_state(|grid| view::cells(&visible, grid, catalog)));
    let (editable, mode) = with_session(|s| (s.can_edit(), s.mode));
    let placed = with_state(|g| g.layout.len());

    let body: String = if cells.is_empty() && placed == 0 {
        r#"<p class="text-slate-500 col-span-full">No characters yet. Add one to get started.</p>"#
            .to_string()
    } else if cells.is_empty() {
        r#"<p class="text-slate-500 col-span-full">No characters match the current filters.</p>"#
            .to_string()
    } else {
        cells
            .iter()
            .map(|c| render_cell(c, editable))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"<div id="grid" class="grid grid-cols-4 sm:grid-cols-6 lg:grid-cols-8 gap-2" data-mode="{mode}" data-editable="{editable}" data-hidden="{hidden}"{oob}>
{body}
</div>"#,
        mode = mode_name(mode),
        editable = editable,
        hidden = placed.saturating_sub(cells.len()),
        oob = if oob { r#" hx-swap-oob="outerHTML""# } else { "" },
        body = body,
    )
}

fn mode_name(mode: InteractionMode) -> &'static str {
    match mode {
        InteractionMode::Normal => "normal",
        InteractionMode::Delete => "delete",
    }
}

fn render_mode_button(mode: InteractionMode) -> String {
    let (label, css) = match mode {
        InteractionMode::Normal => ("Delete mode", "bg-slate-200"),
        InteractionMode::Delete => ("Done deleting", "bg-kip-red text-white"),
    };
    format!(
        r##"<button id="delete-mode" class="px-3 py-1 rounded {css}" hx-post="/api/grid/mode" hx-target="#grid" hx-swap="outerHTML" hx-swap-oob="outerHTML">{label}</button>"##,
        css = css,
        label = label
    )
}

fn id_param(params: &[(String, String)]) -> Option<String> {
    get_nonempty(params, "id").map(str::to_string)
}

// ── GET /api/grid ──────────────────────────────────────────────────

/// Handle GET /api/grid
/// Returns the full grid HTML for the current filters.
pub fn handle_get(_query: &str) -> String {
    format!("{}{}", render_grid(false), oob_notices())
}

// ── GET /api/grid/visible ──────────────────────────────────────────

/// Handle GET /api/grid/visible
/// JSON `{changed, ids, positions, cells}`. `changed` is false when the
/// visible sequence is the same as last time, so the page only re-applies
/// marks and skins, finding each cell through `positions` (id → index).
pub fn handle_visible_get(_query: &str) -> String {
    let visible = visible_ids();
    let (change, positions) = with_projector_mut(|p| {
        let change = p.refresh(visible.clone());
        let positions: serde_json::Map<String, serde_json::Value> = visible
            .iter()
            .filter_map(|id| p.position_of(id).map(|i| (id.clone(), json!(i))))
            .collect();
        (change, positions)
    });
    let cells = with_catalog(|catalog| with_state(|grid| view::cells(&visible, grid, catalog)));
    json!({
        "changed": change == ProjectionChange::Changed,
        "ids": visible,
        "positions": positions,
        "cells": cells,
    })
    .to_string()
}

// ── GET /api/grid/state ────────────────────────────────────────────

/// Handle GET /api/grid/state
/// Returns the `{layout, marks, skins}` document.
pub fn handle_state_get(_query: &str) -> String {
    state::export_state_json()
}

// ── POST /api/grid/add ─────────────────────────────────────────────

/// Handle POST /api/grid/add
/// Body params:
///   - id={id}     → add that character
///   - seed={n}    → add an available character picked by `n`
pub fn handle_add_post(body: &str) -> String {
    let params = parse_form_body(body);
    let explicit = id_param(&params);
    let seed = get_u64(&params, "seed");
    if explicit.is_none() && seed.is_none() {
        return missing("Missing id or seed parameter");
    }

    let result = mutate(|grid, catalog| {
        let id = match (explicit, seed) {
            (Some(id), _) => {
                if !catalog.contains(&id) {
                    return Err(GridError::UnknownCharacter { id });
                }
                id
            }
            (None, Some(seed)) => match catalog.pick_available(&grid.layout, seed) {
                Some(c) => c.id.clone(),
                None => {
                    notice::push(NoticeKind::Info, "Every character is already on the grid");
                    return Ok(false);
                }
            },
            (None, None) => return Ok(false),
        };
        let added = grid.add_character(&id, catalog);
        if added {
            info!(id = %id, "Character added");
        }
        Ok(added)
    });
    mutation_response(result)
}

// ── POST /api/grid/remove ──────────────────────────────────────────

/// Handle POST /api/grid/remove
/// Body params: id={id}
pub fn handle_remove_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(id) = id_param(&params) else {
        return missing("Missing id parameter");
    };
    mutation_response(mutate(|grid, _| Ok(grid.remove_character(&id))))
}

// ── POST /api/grid/click ───────────────────────────────────────────

/// Handle POST /api/grid/click
/// The single cell click handler. Normal mode toggles the check mark,
/// delete mode removes the character.
/// Body params: id={id}
pub fn handle_click_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(id) = id_param(&params) else {
        return missing("Missing id parameter");
    };
    let action = with_session(|s| s.click_action());
    let result = mutate(|grid, _| match action {
        ClickAction::ToggleCheck => grid.toggle_check(&id).map(|_| true),
        ClickAction::Remove if grid.contains(&id) => Ok(grid.remove_character(&id)),
        ClickAction::Remove => Err(GridError::unknown(&id)),
    });
    mutation_response(result)
}

// ── POST /api/grid/check ───────────────────────────────────────────

/// Handle POST /api/grid/check
/// Body params: id={id}&value=true|false
pub fn handle_check_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(id) = id_param(&params) else {
        return missing("Missing id parameter");
    };
    let value = get_param(&params, "value") == Some("true");
    let result = mutate(|grid, _| {
        let before = grid.mark(&id).checks;
        grid.set_check(&id, value)?;
        Ok(before != value)
    });
    mutation_response(result)
}

// ── POST /api/grid/mode ────────────────────────────────────────────

/// Handle POST /api/grid/mode
/// Flips between normal and delete mode.
pub fn handle_mode_post(_body: &str) -> String {
    if let Err(e) = with_session(|s| s.ensure_editable()) {
        return error_span(&e);
    }
    let mode = with_session_mut(|s| s.toggle_delete_mode());
    info!(mode = mode_name(mode), "Interaction mode switched");
    format!("{}{}", render_grid(false), render_mode_button(mode))
}

// ── POST /api/grid/circle ──────────────────────────────────────────

/// Handle POST /api/grid/circle
/// Body params: id={id}&action=add|remove
pub fn handle_circle_post(body: &str) -> String {
    let params = parse_form_body(body);
    let delta = match get_param(&params, "action") {
        Some("add") => 1,
        Some("remove") => -1,
        _ => return missing("Missing or unknown circle action"),
    };
    let Some(id) = id_param(&params) else {
        return missing("Missing id parameter");
    };
    let result = mutate(|grid, _| {
        let before = grid.mark(&id).circles;
        let after = grid.set_circles(&id, delta)?;
        Ok(before != after)
    });
    mutation_response(result)
}

// ── POST /api/grid/skin ────────────────────────────────────────────

/// Handle POST /api/grid/skin
/// Body params: id={id}&skin={asset}
pub fn handle_skin_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(asset) = get_nonempty(&params, "skin").map(str::to_string) else {
        return missing("Missing skin parameter");
    };
    let Some(id) = id_param(&params) else {
        return missing("Missing id parameter");
    };
    let result = mutate(|grid, catalog| {
        let before = grid.skins.get(&id).cloned();
        grid.set_skin(&id, &asset, catalog)?;
        Ok(grid.skins.get(&id) != before.as_ref())
    });
    mutation_response(result)
}

// ── POST /api/grid/reorder ─────────────────────────────────────────

/// Handle POST /api/grid/reorder
/// Body params: order={id},{id},... (the visible cells in their new order)
pub fn handle_reorder_post(body: &str) -> String {
    let params = parse_form_body(body);
    let order = get_list(&params, "order");
    let result = mutate(|grid, _| {
        let before = grid.layout.clone();
        grid.reorder(&order)?;
        Ok(grid.layout != before)
    });
    mutation_response(result)
}

// ── POST /api/grid/import ──────────────────────────────────────────

/// Handle POST /api/grid/import
/// Body is a raw `{layout, marks, skins}` JSON document (a previously
/// exported file). Rejected documents leave the grid untouched.
pub fn handle_import_post(body: &str) -> String {
    let max_id_len = with_config(|c| c.max_id_len);
    let result = with_session(|s| s.ensure_editable())
        .and_then(|_| state::import_state_json(body.trim(), max_id_len));
    match result {
        Ok(()) => {
            with_projector_mut(|p| p.clear());
            notice::push(NoticeKind::Success, "Grid imported successfully");
            format!("{}{}{}", render_grid(false), save_script(), oob_notices())
        }
        Err(e) => {
            notice::push_error(&e);
            format!("{}{}", render_grid(false), oob_notices())
        }
    }
}

// ── POST /api/grid/restore ─────────────────────────────────────────

/// Handle POST /api/grid/restore
/// Restores the grid from the document the page kept (localStorage or the
/// profile fetch). Does not trigger a save.
pub fn handle_restore_post(body: &str) -> String {
    let max_id_len = with_config(|c| c.max_id_len);
    match state::import_state_json(body.trim(), max_id_len) {
        Ok(()) => {
            with_projector_mut(|p| p.clear());
            "ok".to_string()
        }
        Err(e) => format!("error: {}", e),
    }
}

// ── POST /api/grid/profile ─────────────────────────────────────────

/// Handle POST /api/grid/profile?force=true|false
/// Body is the default profile template. Page load seeds an empty grid with
/// it; the "Load Default" button sends `force=true` to overwrite the grid.
pub fn handle_profile_post(query: &str, body: &str) -> String {
    let force = get_param(&parse_query(query), "force") == Some("true");
    let max_id_len = with_config(|c| c.max_id_len);
    let result = with_session(|s| s.ensure_editable())
        .and_then(|_| state::apply_profile(body.trim(), max_id_len, force));
    match &result {
        Ok(true) => notice::push(NoticeKind::Success, "Default profile loaded"),
        Ok(false) => notice::push(
            NoticeKind::Info,
            "Grid already has characters, default profile not loaded",
        ),
        Err(_) => {}
    }
    mutation_response(result)
}

// ── GET /api/grid/export ───────────────────────────────────────────

/// Handle GET /api/grid/export
/// Returns a <script> tag that downloads the grid document as JSON.
pub fn handle_export_get(_query: &str) -> String {
    let document = crate::grid::persist::js_string(&state::export_state_json());
    format!(
        r#"<script>
(function() {{
  var b = new Blob([{document}], {{type: 'application/json'}});
  var a = document.createElement('a');
  a.href = URL.createObjectURL(b);
  a.download = 'grid-profile-' + Date.now() + '.json';
  document.body.appendChild(a);
  a.click();
  document.body.removeChild(a);
  URL.revokeObjectURL(a.href);
}})();
</script>"#,
        document = document
    )
}

// ── POST /api/grid/save ────────────────────────────────────────────

/// Handle POST /api/grid/save
/// Forces a save of the current document (page teardown, drag cancel).
pub fn handle_save_post(_body: &str) -> String {
    save_script()
}

// ── POST /api/grid/ack ─────────────────────────────────────────────

/// Handle POST /api/grid/ack
/// Body params: seq={n}&error={message, empty on success}
/// Reports a save result. Acks for superseded saves are dropped; a failed
/// latest save becomes an error notice and the grid is left as it is.
pub fn handle_ack_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(seq) = get_u64(&params, "seq") else {
        return missing("Missing seq parameter");
    };
    let result = match get_nonempty(&params, "error") {
        Some(reason) => Err(reason.to_string()),
        None => Ok(()),
    };
    if let AckOutcome::Failed(e) = with_queue_mut(|q| q.acknowledge(seq, result)) {
        notice::push_error(&e);
    }
    notice::render_drain()
}

//! Drag routes: pointer events forwarded from the page to the reorder
//! controller.
//!
//! The page's pointer listeners post every event here and act on the JSON
//! outcome: mirror `moved` orders in the DOM, follow a `tap` with a click
//! request, open the context menu, and run the `save` script a drop
//! returns.

use serde::Serialize;
use tracing::debug;

use crate::config::with_config;
use crate::grid::notice::escape_html;
use crate::grid::reorder::{
    parse_cell_rects, with_controller_mut, GestureOutcome, Point, PointerKind,
};
use crate::grid::session::with_session;
use crate::grid::state::with_state;
use crate::grid::view::with_projector_mut;
use crate::routes::grid::{mutate, render_grid, save_script};
use crate::routes::util::{get_f64, get_nonempty, get_param, missing, oob_notices, parse_form_body};

#[derive(Serialize)]
struct DragResponse {
    #[serde(flatten)]
    outcome: GestureOutcome,
    #[serde(skip_serializing_if = "String::is_empty")]
    save: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn respond(outcome: GestureOutcome) -> String {
    let mut response = DragResponse {
        outcome,
        save: String::new(),
        error: None,
    };
    if let GestureOutcome::Dropped { order } = &response.outcome {
        match mutate(|grid, _| {
            grid.reorder(order)?;
            Ok(true)
        }) {
            // A drop saves even when the order came back unchanged.
            Ok(_) => response.save = save_script(),
            Err(e) => response.error = Some(e.to_string()),
        }
    }
    serde_json::to_string(&response).unwrap_or_else(|_| r#"{"outcome":"ignored"}"#.to_string())
}

fn point(params: &[(String, String)]) -> Option<Point> {
    Some(Point::new(get_f64(params, "x")?, get_f64(params, "y")?))
}

fn now(params: &[(String, String)]) -> f64 {
    get_f64(params, "t").unwrap_or(0.0)
}

/// Keep the controller's thresholds in step with the active config.
fn sync_timing() {
    let (threshold, long_press) = with_config(|c| (c.drag_threshold_px, c.long_press_ms));
    with_controller_mut(|c| c.set_timing(threshold, long_press));
}

// ── POST /api/drag/down ────────────────────────────────────────────

/// Handle POST /api/drag/down
/// Body params: id={id}&pointer=mouse|touch&x={px}&y={px}&t={ms}
pub fn handle_down_post(body: &str) -> String {
    let params = parse_form_body(body);
    let (Some(id), Some(at)) = (get_nonempty(&params, "id"), point(&params)) else {
        return respond(GestureOutcome::Ignored);
    };
    sync_timing();
    let kind = PointerKind::parse(get_param(&params, "pointer").unwrap_or("mouse"));
    let editable = with_session(|s| s.can_edit());
    with_controller_mut(|c| c.set_enabled(editable));

    let mut visible = with_projector_mut(|p| p.visible().to_vec());
    if visible.is_empty() {
        visible = crate::routes::grid::visible_ids();
    }
    let outcome = with_controller_mut(|c| c.pointer_down(id, kind, at, now(&params), &visible));
    debug!(id, outcome = ?outcome, "Pointer down");
    respond(outcome)
}

// ── POST /api/drag/move ────────────────────────────────────────────

/// Handle POST /api/drag/move
/// Body params: x={px}&y={px}&t={ms}&cells={x,y,w,h;...}
/// `cells` are the other visible cells' rects in their live order.
pub fn handle_move_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(at) = point(&params) else {
        return respond(GestureOutcome::Ignored);
    };
    let cells = get_param(&params, "cells")
        .and_then(parse_cell_rects)
        .unwrap_or_default();
    respond(with_controller_mut(|c| c.pointer_move(at, now(&params), &cells)))
}

// ── POST /api/drag/timer ───────────────────────────────────────────

/// Handle POST /api/drag/timer
/// Long-press timer fired. Body params: t={ms}
pub fn handle_timer_post(body: &str) -> String {
    let params = parse_form_body(body);
    respond(with_controller_mut(|c| c.long_press_elapsed(now(&params))))
}

// ── POST /api/drag/up ──────────────────────────────────────────────

/// Handle POST /api/drag/up
pub fn handle_up_post(_body: &str) -> String {
    respond(with_controller_mut(|c| c.pointer_up()))
}

// ── POST /api/drag/cancel ──────────────────────────────────────────

/// Handle POST /api/drag/cancel
/// A cancelled drag still saves the live order.
pub fn handle_cancel_post(_body: &str) -> String {
    respond(with_controller_mut(|c| c.cancel()))
}

// ── POST /api/drag/dismiss ─────────────────────────────────────────

/// Handle POST /api/drag/dismiss
/// Closes the context menu.
pub fn handle_dismiss_post(_body: &str) -> String {
    with_controller_mut(|c| c.dismiss_menu());
    String::new()
}

// ── GET /api/drag/menu ─────────────────────────────────────────────

/// Handle GET /api/drag/menu?id={id}&x={px}&y={px}
/// Context menu for a cell: add or remove a promotion circle.
pub fn handle_menu_get(query: &str) -> String {
    let params = crate::routes::util::parse_query(query);
    let Some(id) = get_nonempty(&params, "id") else {
        return missing("Missing id parameter");
    };
    if !with_state(|g| g.contains(id)) {
        return format!("{}{}", render_grid(false), oob_notices());
    }
    let at = point(&params).unwrap_or(Point::new(0.0, 0.0));
    let id = escape_html(id);
    format!(
        r##"<div id="context-menu" class="absolute z-50 bg-white shadow rounded flex flex-col text-sm" style="left: {x}px; top: {y}px">
  <button class="px-3 py-1 text-left" hx-post="/api/grid/circle" hx-vals='{{"id":"{id}","action":"add"}}' hx-target="#grid" hx-swap="outerHTML">Add circle</button>
  <button class="px-3 py-1 text-left" hx-post="/api/grid/circle" hx-vals='{{"id":"{id}","action":"remove"}}' hx-target="#grid" hx-swap="outerHTML">Remove circle</button>
</div>"##,
        x = at.x,
        y = at.y,
        id = id,
    )
}

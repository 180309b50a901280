//! In-browser grid engine.
//!
//! Exports `handle_request(method, path, query, body)` for the Web Worker
//! bridge to call. Uses `matchit` for URL routing, the same router engine
//! that powers Axum.
//!
//! The worker owns the canonical grid (layout, marks, skins), the filter
//! preferences, and the drag state machine. The page only paints what the
//! routes return: HTML fragments for HTMX swaps, JSON for the pointer
//! listeners, and `<script>` tags for side effects it has to perform itself
//! (localStorage writes, server saves, downloads).

use wasm_bindgen::prelude::*;

pub mod config;
pub mod error;
pub mod grid;
pub mod routes;

/// Process an HTTP-like request and return a response fragment.
///
/// Called from JavaScript (Web Worker) via wasm-bindgen.
///
/// # Arguments
/// * `method`: HTTP method ("GET" or "POST")
/// * `path`: URL path (e.g., "/api/grid/add")
/// * `query`: Query string (e.g., "?page=0&per=24")
/// * `body`: Request body. Form data for most POSTs, raw JSON for document
///   uploads. Empty string for GET requests.
#[wasm_bindgen]
pub fn handle_request(method: &str, path: &str, query: &str, body: &str) -> String {
    let mut router = matchit::Router::new();

    // Grid
    router.insert("/api/grid", "grid").ok();
    router.insert("/api/grid/visible", "grid_visible").ok();
    router.insert("/api/grid/state", "grid_state").ok();
    router.insert("/api/grid/add", "grid_add").ok();
    router.insert("/api/grid/remove", "grid_remove").ok();
    router.insert("/api/grid/click", "grid_click").ok();
    router.insert("/api/grid/check", "grid_check").ok();
    router.insert("/api/grid/mode", "grid_mode").ok();
    router.insert("/api/grid/circle", "grid_circle").ok();
    router.insert("/api/grid/skin", "grid_skin").ok();
    router.insert("/api/grid/reorder", "grid_reorder").ok();
    router.insert("/api/grid/import", "grid_import").ok();
    router.insert("/api/grid/restore", "grid_restore").ok();
    router.insert("/api/grid/profile", "grid_profile").ok();
    router.insert("/api/grid/export", "grid_export").ok();
    router.insert("/api/grid/save", "grid_save").ok();
    router.insert("/api/grid/ack", "grid_ack").ok();

    // Catalog
    router.insert("/api/catalog", "catalog").ok();

    // Filters
    router.insert("/api/filters", "filters").ok();
    router.insert("/api/filters/state", "filters_state").ok();
    router.insert("/api/filters/chips", "filters_chips").ok();
    router.insert("/api/filters/toggle", "filters_toggle").ok();
    router.insert("/api/filters/reset", "filters_reset").ok();
    router.insert("/api/filters/restore", "filters_restore").ok();

    // Pointer gestures
    router.insert("/api/drag/down", "drag_down").ok();
    router.insert("/api/drag/move", "drag_move").ok();
    router.insert("/api/drag/timer", "drag_timer").ok();
    router.insert("/api/drag/up", "drag_up").ok();
    router.insert("/api/drag/cancel", "drag_cancel").ok();
    router.insert("/api/drag/dismiss", "drag_dismiss").ok();
    router.insert("/api/drag/menu", "drag_menu").ok();

    // Sharing
    router.insert("/api/share/options", "share_options").ok();
    router.insert("/api/share/request", "share_request").ok();
    router.insert("/api/share/links", "share_links").ok();
    router.insert("/api/share/snapshot", "share_snapshot").ok();

    // Session and settings
    router.insert("/api/session", "session").ok();
    router.insert("/api/config", "config").ok();
    router.insert("/api/notices", "notices").ok();

    match router.at(path) {
        Ok(matched) => match (*matched.value, method) {
            ("grid", "GET") => routes::grid::handle_get(query),
            ("grid_visible", "GET") => routes::grid::handle_visible_get(query),
            ("grid_state", "GET") => routes::grid::handle_state_get(query),
            ("grid_export", "GET") => routes::grid::handle_export_get(query),
            ("grid_add", "POST") => routes::grid::handle_add_post(body),
            ("grid_remove", "POST") => routes::grid::handle_remove_post(body),
            ("grid_click", "POST") => routes::grid::handle_click_post(body),
            ("grid_check", "POST") => routes::grid::handle_check_post(body),
            ("grid_mode", "POST") => routes::grid::handle_mode_post(body),
            ("grid_circle", "POST") => routes::grid::handle_circle_post(body),
            ("grid_skin", "POST") => routes::grid::handle_skin_post(body),
            ("grid_reorder", "POST") => routes::grid::handle_reorder_post(body),
            ("grid_import", "POST") => routes::grid::handle_import_post(body),
            ("grid_restore", "POST") => routes::grid::handle_restore_post(body),
            ("grid_profile", "POST") => routes::grid::handle_profile_post(query, body),
            ("grid_save", "POST") => routes::grid::handle_save_post(body),
            ("grid_ack", "POST") => routes::grid::handle_ack_post(body),

            ("catalog", "GET") => routes::catalog::handle_get(query),
            ("catalog", "POST") => routes::catalog::handle_load_post(body),

            ("filters", "GET") => routes::filters::handle_get(query),
            ("filters_state", "GET") => routes::filters::handle_state_get(query),
            ("filters_chips", "GET") => routes::filters::handle_chips_get(query),
            ("filters_toggle", "POST") => routes::filters::handle_toggle_post(body),
            ("filters_reset", "POST") => routes::filters::handle_reset_post(body),
            ("filters_restore", "POST") => routes::filters::handle_restore_post(body),

            ("drag_down", "POST") => routes::drag::handle_down_post(body),
            ("drag_move", "POST") => routes::drag::handle_move_post(body),
            ("drag_timer", "POST") => routes::drag::handle_timer_post(body),
            ("drag_up", "POST") => routes::drag::handle_up_post(body),
            ("drag_cancel", "POST") => routes::drag::handle_cancel_post(body),
            ("drag_dismiss", "POST") => routes::drag::handle_dismiss_post(body),
            ("drag_menu", "GET") => routes::drag::handle_menu_get(query),

            ("share_options", "GET") => routes::share::handle_options_get(query),
            ("share_request", "POST") => routes::share::handle_request_post(body),
            ("share_links", "GET") => routes::share::handle_links_get(query),
            ("share_snapshot", "POST") => routes::share::handle_snapshot_post(query, body),

            ("session", "GET") => routes::session::handle_session_get(query),
            ("session", "POST") => routes::session::handle_session_post(body),
            ("config", "POST") => routes::session::handle_config_post(body),
            ("notices", "GET") => routes::session::handle_notices_get(query),

            _ => method_not_allowed(),
        },
        Err(_) => not_found(),
    }
}

fn not_found() -> String {
    r#"<span class="text-kip-red">404: route not found</span>"#.to_string()
}

fn method_not_allowed() -> String {
    r#"<span class="text-kip-red">405: method not allowed</span>"#.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::catalog::{fixtures, replace_catalog, CharacterCatalog};
    use crate::grid::filter::reset_filters;
    use crate::grid::notice;
    use crate::grid::persist::reset_queue;
    use crate::grid::reorder::reset_controller;
    use crate::grid::session::reset_session;
    use crate::grid::state::{replace_state, with_state, GridState};
    use crate::grid::view::with_projector_mut;

    fn reset() {
        replace_catalog(CharacterCatalog::default());
        replace_state(GridState::default());
        reset_filters();
        reset_session();
        reset_queue();
        reset_controller();
        notice::clear();
        with_projector_mut(|p| p.clear());
    }

    #[test]
    fn returns_404_for_unknown_route() {
        let html = handle_request("GET", "/api/nonexistent", "", "");
        assert!(html.contains("404"));
    }

    #[test]
    fn returns_405_for_wrong_method() {
        let html = handle_request("POST", "/api/grid/state", "", "");
        assert!(html.contains("405"));
        let html = handle_request("GET", "/api/grid/add", "", "");
        assert!(html.contains("405"));
    }

    #[test]
    fn routes_catalog_load_then_add() {
        reset();
        let html = handle_request("POST", "/api/catalog", "", fixtures::CATALOG_JSON);
        assert!(html.contains("Loaded 4 characters"));
        let html = handle_request("POST", "/api/grid/add", "", "id=c");
        assert!(html.contains(r#"data-id="c""#));
        let doc = handle_request("GET", "/api/grid/state", "", "");
        assert!(doc.contains(r#""layout":["c"]"#));
        reset();
    }

    #[test]
    fn routes_hidden_character_keeps_slot_through_drag() {
        reset();
        replace_catalog(fixtures::catalog());
        for id in ["a", "b", "c", "d"] {
            handle_request("POST", "/api/grid/add", "", &format!("id={}", id));
        }
        // Hide `b`, the only guard.
        handle_request("POST", "/api/filters/toggle", "", "name=class&value=caster");
        handle_request("POST", "/api/filters/toggle", "", "name=class&value=medic");
        let visible = handle_request("GET", "/api/grid/visible", "", "");
        assert!(visible.contains(r#""ids":["a","c","d"]"#));

        handle_request("POST", "/api/drag/down", "", "id=d&pointer=mouse&x=250&y=10&t=0");
        handle_request("POST", "/api/drag/move", "", "x=5&y=10&t=20&cells=0,0,80,80;100,0,80,80");
        let up = handle_request("POST", "/api/drag/up", "", "");
        assert!(up.contains(r#""outcome":"dropped""#));
        with_state(|g| assert_eq!(g.layout, vec!["d", "a", "b", "c"]));
        reset();
    }

    #[test]
    fn routes_filters_and_chips() {
        reset();
        replace_catalog(fixtures::catalog());
        let panel = handle_request("GET", "/api/filters", "", "");
        assert!(panel.contains(r#"id="filter-panel""#));
        handle_request("POST", "/api/filters/toggle", "", "name=mastery&value=1");
        let chips = handle_request("GET", "/api/filters/chips", "", "");
        assert!(chips.contains("mastery: 1"));
        let state = handle_request("GET", "/api/filters/state", "", "");
        assert!(state.contains(r#""mastery":{"mode":"twostate","state":"forced","values":["1"]}"#));
        handle_request("POST", "/api/filters/reset", "", "");
        assert!(handle_request("GET", "/api/filters/chips", "", "").contains("></div>"));
        reset();
    }

    #[test]
    fn routes_share_snapshot_read_only() {
        reset();
        replace_catalog(fixtures::catalog());
        handle_request(
            "POST",
            "/api/share/snapshot",
            "?id=abc&edit=false",
            r#"{"layout":["a"],"marks":{},"mode":"readonly"}"#,
        );
        let html = handle_request("POST", "/api/grid/remove", "", "id=a");
        assert!(html.contains("read-only"));
        with_state(|g| assert_eq!(g.layout, vec!["a"]));
        let session = handle_request("GET", "/api/session", "", "");
        assert!(session.contains(r#""kind":"shared""#));
        reset();
    }

    #[test]
    fn routes_save_ack_cycle() {
        reset();
        replace_catalog(fixtures::catalog());
        let html = handle_request("POST", "/api/grid/add", "", "id=a");
        assert!(html.contains("seq:1"));
        let html = handle_request("POST", "/api/grid/ack", "", "seq=1&error=");
        assert!(html.is_empty());
        let html = handle_request("POST", "/api/grid/save", "", "");
        assert!(html.contains("seq:2"));
        reset();
    }

    #[test]
    fn routes_config_and_notices() {
        assert_eq!(handle_request("POST", "/api/config", "", r#"{"notice_duration_ms": 900}"#), "ok");
        notice::push(notice::NoticeKind::Info, "x");
        let html = handle_request("GET", "/api/notices", "", "");
        assert!(html.contains(r#"data-duration="900""#));
        handle_request("POST", "/api/config", "", "{}");
    }
}

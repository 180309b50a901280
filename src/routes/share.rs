//! Share routes: the share dialog, link preview and opening shared grids.

use serde_json::json;

use crate::config::with_config;
use crate::grid::notice::{self, escape_html};
use crate::grid::persist::js_string;
use crate::grid::session::{with_session, SessionKind, ShareMode};
use crate::grid::share::{self, find_option, share_links, share_options};
use crate::grid::state::with_state;
use crate::routes::grid::render_grid;
use crate::routes::util::{get_nonempty, get_param, missing, oob_notices, parse_form_body, parse_query};

// ── GET /api/share/options ─────────────────────────────────────────

/// Handle GET /api/share/options
/// Four options for logged-in users and editable shared grids, the two
/// snapshot options for everyone else.
pub fn handle_options_get(_query: &str) -> String {
    let options = with_session(share_options);
    let items: String = options
        .iter()
        .map(|o| {
            format!(
                r##"<button class="share-option flex gap-2 items-center px-3 py-2 rounded hover:bg-slate-100" hx-post="/api/share/request" hx-vals='{{"action":"{action}"}}' hx-target="#share-link-preview" hx-swap="innerHTML"><span class="option-icon">{icon}</span><span>{label}</span></button>"##,
                action = o.action,
                icon = if o.mode == ShareMode::ReadWrite { "&#9999;&#65039;" } else { "&#128279;" },
                label = o.label,
            )
        })
        .collect();
    format!(
        r#"<div class="share-options flex flex-col gap-1">{}</div><div id="share-link-preview"></div>"#,
        items
    )
}

// ── POST /api/share/request ────────────────────────────────────────

/// Handle POST /api/share/request
/// Body params: action=snapshot-readonly|snapshot-editable|persistent-readonly|persistent-editable
/// Returns a script that posts the share to the server and loads the link
/// preview with the returned share id.
pub fn handle_request_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(action) = get_nonempty(&params, "action") else {
        return missing("Missing action parameter");
    };
    let (allowed, token, source) = with_session(|s| {
        let allowed = share_options(s).iter().any(|o| o.action == action);
        let source = match &s.kind {
            SessionKind::Shared { share_id, .. } => Some(share_id.clone()),
            _ => None,
        };
        (allowed, s.token.clone(), source)
    });
    let Some(option) = find_option(action).filter(|_| allowed) else {
        return missing("That share option is not available here");
    };

    let payload = if option.persistent {
        json!({
            "mode": option.mode,
            "persistent": true,
            "source": source,
        })
        .to_string()
    } else {
        with_state(|grid| share::snapshot_request(grid, option.mode))
    };
    let auth = match token {
        Some(t) => format!(", 'Authorization': 'Bearer ' + {}", js_string(&t)),
        None => String::new(),
    };
    format!(
        r#"<script>
(function() {{
  fetch('/api/share', {{method: 'POST', headers: {{'Content-Type': 'application/json'{auth}}}, body: {payload}}})
    .then(function(r) {{ if (!r.ok) throw new Error('HTTP ' + r.status); return r.json(); }})
    .then(function(data) {{
      htmx.ajax('GET', '/api/share/links?id=' + encodeURIComponent(data.shareId) + '&origin=' + encodeURIComponent(window.location.origin), {{target: '#share-link-preview', swap: 'innerHTML'}});
    }})
    .catch(function(e) {{ console.error('[grid] sharing failed', e); }});
}})();
</script>"#,
        auth = auth,
        payload = js_string(&payload),
    )
}

// ── GET /api/share/links ───────────────────────────────────────────

/// Handle GET /api/share/links?id={shareId}&origin={origin}
pub fn handle_links_get(query: &str) -> String {
    let params = parse_query(query);
    let Some(id) = get_nonempty(&params, "id") else {
        return missing("Missing id parameter");
    };
    let origin = get_param(&params, "origin").unwrap_or("");
    let links = share_links(origin, id);
    let row = |label: &str, url: &str| {
        let url = escape_html(url);
        format!(
            r#"<div class="flex gap-2 items-center"><label class="w-24">{label}:</label><input type="text" value="{url}" readonly class="flex-1 border rounded px-1"><button onclick="navigator.clipboard.writeText(this.previousElementSibling.value)">Copy</button></div>"#,
            label = label,
            url = url,
        )
    };
    format!(
        r#"<h3 class="font-semibold">Share Link</h3>{}{}"#,
        row("Read-Write", &links.read_write),
        row("Read-Only", &links.read_only)
    )
}

// ── POST /api/share/snapshot ───────────────────────────────────────

/// Handle POST /api/share/snapshot?id={shareId}&edit=true|false&persistent=true|false
/// Body is the shared document fetched by the page. Replaces the working
/// grid and switches the session to the shared grid.
pub fn handle_snapshot_post(query: &str, body: &str) -> String {
    let params = parse_query(query);
    let Some(id) = get_nonempty(&params, "id") else {
        return missing("Missing id parameter");
    };
    let link_mode = get_param(&params, "edit").map(ShareMode::from_edit_flag);
    let persistent = get_param(&params, "persistent") == Some("true");
    let max_id_len = with_config(|c| c.max_id_len);
    if let Err(e) = share::load_snapshot(id, body.trim(), persistent, link_mode, max_id_len) {
        notice::push_error(&e);
    }
    format!("{}{}", render_grid(false), oob_notices())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::catalog::{fixtures, replace_catalog};
    use crate::grid::reorder::reset_controller;
    use crate::grid::session::{replace_session, reset_session, Session};
    use crate::grid::state::{replace_state, GridState};

    fn teardown() {
        reset_session();
        reset_controller();
        replace_state(GridState::default());
        notice::clear();
    }

    #[test]
    fn anonymous_options() {
        reset_session();
        let html = handle_options_get("");
        assert_eq!(html.matches("share-option ").count(), 2);
        assert!(!html.contains("persistent-editable"));
    }

    #[test]
    fn account_options_and_bearer() {
        replace_session(Session {
            kind: SessionKind::Account {
                user_id: "u1".into(),
            },
            token: Some("h.p.s".into()),
            ..Session::default()
        });
        assert_eq!(handle_options_get("").matches("share-option ").count(), 4);
        let script = handle_request_post("action=persistent-editable");
        assert!(script.contains("Bearer"));
        assert!(script.contains(r#"\"persistent\":true"#));
        teardown();
    }

    #[test]
    fn persistent_share_refused_for_anonymous() {
        reset_session();
        let html = handle_request_post("action=persistent-readonly");
        assert!(html.contains("not available"));
        let html = handle_request_post("action=snapshot-readonly");
        assert!(html.contains("fetch('/api/share'"));
        assert!(html.contains(r#"\"mode\":\"readonly\""#));
    }

    #[test]
    fn links_preview() {
        let html = handle_links_get("?id=abc&origin=https%3A%2F%2Fgrid.example");
        assert!(html.contains("https://grid.example/share/abc?edit=true"));
        assert!(html.contains("https://grid.example/share/abc?edit=false"));
    }

    #[test]
    fn opening_read_only_link_renders_locked_grid() {
        replace_catalog(fixtures::catalog());
        let html = handle_snapshot_post(
            "?id=s9&edit=false",
            r#"{"layout":["a","b"],"marks":{"a":{"checks":true,"circles":1}},"mode":"readwrite"}"#,
        );
        assert!(html.contains(r#"data-editable="false""#));
        assert!(html.contains(r#"data-id="a""#));
        with_session(|s| assert!(!s.can_edit()));
        teardown();
    }

    #[test]
    fn bad_snapshot_keeps_grid() {
        replace_catalog(fixtures::catalog());
        let mut grid = GridState::default();
        grid.add_character("c", &fixtures::catalog());
        replace_state(grid);
        let html = handle_snapshot_post("?id=s9", r#"{"layout":[1]}"#);
        assert!(html.contains("invalid profile document"));
        assert!(html.contains(r#"data-id="c""#));
        teardown();
    }
}

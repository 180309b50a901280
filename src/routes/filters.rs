//! Filter routes: the toggle panel, selected-filter chips, and the
//! preference round-trip with localStorage.
//!
//! Every change re-renders the panel, refreshes the grid out-of-band and
//! writes the whole preference document back under the filter storage key.

use tracing::{debug, info};

use crate::config::with_config;
use crate::grid::filter::{with_filters, with_filters_mut, FilterMode, FilterState};
use crate::grid::notice::{self, escape_html};
use crate::grid::persist::js_string;
use crate::routes::grid::render_grid;
use crate::routes::util::{get_nonempty, missing, oob_notices, parse_form_body};

fn state_css(state: FilterState) -> &'static str {
    match state {
        FilterState::Neutral => "bg-slate-100 text-slate-700",
        FilterState::Forced => "bg-emerald-600 text-white",
        FilterState::Discarded => "bg-kip-red text-white line-through",
    }
}

fn toggle_button(name: &str, value: Option<&str>, label: &str, state: FilterState) -> String {
    let vals = match value {
        Some(v) => format!(
            r#"{{"name":"{}","value":"{}"}}"#,
            escape_html(name),
            escape_html(v)
        ),
        None => format!(r#"{{"name":"{}"}}"#, escape_html(name)),
    };
    format!(
        r##"<button class="filter-toggle px-2 py-0.5 rounded text-sm {css}" data-state="{state}" hx-post="/api/filters/toggle" hx-vals='{vals}' hx-target="#filter-panel" hx-swap="outerHTML">{label}</button>"##,
        css = state_css(state),
        state = state.as_str(),
        vals = vals,
        label = escape_html(label),
    )
}

/// Render the whole filter panel.
pub(crate) fn render_panel() -> String {
    let groups: String = with_filters(|engine| {
        engine
            .dimensions()
            .map(|(name, dim)| {
                let toggles = match dim.spec.mode {
                    FilterMode::Tristate => toggle_button(name, None, name, dim.spec.state),
                    FilterMode::Twostate => dim
                        .options
                        .iter()
                        .map(|opt| {
                            let opt = opt.as_str();
                            toggle_button(name, Some(opt), opt, engine.toggle_state(name, Some(opt)))
                        })
                        .collect::<Vec<_>>()
                        .join(""),
                };
                format!(
                    r#"<div class="filter-group flex flex-wrap items-center gap-1" data-dimension="{name}"><span class="font-semibold text-sm mr-1">{name}</span>{toggles}</div>"#,
                    name = escape_html(name),
                    toggles = toggles,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    });
    let active = with_filters(|e| e.is_active());
    format!(
        r##"<div id="filter-panel" class="flex flex-col gap-2" data-active="{active}">
{groups}
<button class="text-sm underline self-start" hx-post="/api/filters/reset" hx-target="#filter-panel" hx-swap="outerHTML">Reset filters</button>
</div>"##,
        active = active,
        groups = groups,
    )
}

/// Selected-filter chips. Built-in groups have their own widgets and are
/// left out.
pub(crate) fn render_chips(oob: bool) -> String {
    let chips: String = with_filters(|e| e.active_chips())
        .iter()
        .map(|(name, value)| {
            format!(
                r##"<button class="chip px-2 rounded-full bg-slate-200 text-sm" hx-post="/api/filters/toggle" hx-vals='{{"name":"{name}","value":"{value}"}}' hx-target="#filter-panel" hx-swap="outerHTML">{name}: {value} &times;</button>"##,
                name = escape_html(name),
                value = escape_html(value),
            )
        })
        .collect();
    format!(
        r#"<div id="selected-filters" class="flex flex-wrap gap-1"{oob}>{chips}</div>"#,
        oob = if oob { r#" hx-swap-oob="outerHTML""# } else { "" },
        chips = chips,
    )
}

/// Script writing the preference document to localStorage.
fn persist_script() -> String {
    let key = with_config(|c| c.filter_storage_key.clone());
    let json = with_filters(|e| e.to_json());
    format!(
        "<script>try {{ localStorage.setItem({}, {}); }} catch (e) {{ console.warn('[grid] filter preferences not saved', e); }}</script>",
        js_string(&key),
        js_string(&json)
    )
}

fn changed_response() -> String {
    format!(
        "{}{}{}{}{}",
        render_panel(),
        render_chips(true),
        render_grid(true),
        persist_script(),
        oob_notices()
    )
}

// ── GET /api/filters ───────────────────────────────────────────────

/// Handle GET /api/filters
/// Returns the filter panel.
pub fn handle_get(_query: &str) -> String {
    render_panel()
}

// ── GET /api/filters/state ─────────────────────────────────────────

/// Handle GET /api/filters/state
/// Returns the preference document (page teardown writes it out).
pub fn handle_state_get(_query: &str) -> String {
    with_filters(|e| e.to_json())
}

// ── GET /api/filters/chips ─────────────────────────────────────────

/// Handle GET /api/filters/chips
pub fn handle_chips_get(_query: &str) -> String {
    render_chips(false)
}

// ── POST /api/filters/toggle ───────────────────────────────────────

/// Handle POST /api/filters/toggle
/// Body params:
///   - name={dimension}               → cycle a tristate filter
///   - name={dimension}&value={value} → flip one value of a group filter
pub fn handle_toggle_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(name) = get_nonempty(&params, "name") else {
        return missing("Missing name parameter");
    };
    let value = get_nonempty(&params, "value");
    if let Err(e) = with_filters_mut(|f| f.toggle(name, value)) {
        notice::push_error(&e);
        return format!("{}{}", render_panel(), oob_notices());
    }
    changed_response()
}

// ── POST /api/filters/reset ────────────────────────────────────────

/// Handle POST /api/filters/reset
/// Puts every dimension back to neutral.
pub fn handle_reset_post(_body: &str) -> String {
    with_filters_mut(|f| f.reset());
    info!("Filters reset");
    changed_response()
}

// ── POST /api/filters/restore ──────────────────────────────────────

/// Handle POST /api/filters/restore
/// Deep-merges the stored preference document over the defaults. Stored
/// dimensions that no longer exist are dropped and logged, not reported.
pub fn handle_restore_post(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "ok".to_string();
    }
    match with_filters_mut(|f| f.merge_json(body)) {
        Ok(stale) => {
            debug!(stale = stale.len(), "Filter preferences restored");
            "ok".to_string()
        }
        Err(e) => format!("error: {}", e),
    }
}

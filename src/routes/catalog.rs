//! `/api/catalog`: the character picker and catalog loading.
//!
//! Query parameters (GET):
//! - `page`: 0-indexed page number (default: 0)
//! - `per`: characters per page (default: 24, at most 100)
//! - `search`: case-insensitive substring matched against id and name
//!
//! The picker runs the same filter engine as the grid, so the `indexed`
//! filter switches between "on the grid" and "not yet added".

use tracing::warn;

use crate::grid::catalog::{self, with_catalog, Character};
use crate::grid::filter::with_filters;
use crate::grid::notice::{self, escape_html, NoticeKind};
use crate::grid::state::with_state;
use crate::routes::grid::render_grid;
use crate::routes::util::{get_param, oob_notices, parse_query};

const DEFAULT_PER: usize = 24;
const MAX_PER: usize = 100;

fn matches_search(character: &Character, search: &str) -> bool {
    if search.is_empty() {
        return true;
    }
    let needle = search.to_lowercase();
    character.id.to_lowercase().contains(&needle) || character.name.to_lowercase().contains(&needle)
}

fn render_pick(character: &Character, placed: bool) -> String {
    let id = escape_html(&character.id);
    let action = if placed {
        r#" disabled title="Already on the grid""#.to_string()
    } else {
        format!(
            r##" hx-post="/api/grid/add" hx-vals='{{"id":"{}"}}' hx-target="#grid" hx-swap="outerHTML""##,
            id
        )
    };
    format!(
        r#"<button class="catalog-pick relative w-20 disabled:opacity-40" data-id="{id}" data-rarity="{rarity}"{action}>
  <img src="/characters/{skin}" alt="{name}" loading="lazy" class="w-full rounded">
  <span class="block text-xs truncate">{name}</span>
</button>"#,
        id = id,
        rarity = character.rarity,
        action = action,
        skin = escape_html(&character.skins.default),
        name = escape_html(&character.name),
    )
}

/// Sentinel that loads the next page when scrolled into view.
fn render_sentinel(page: usize, per: usize, search: &str) -> String {
    let mut query = format!("page={}&per={}", page, per);
    if !search.is_empty() {
        query.push_str(&format!("&search={}", escape_html(search)));
    }
    format!(
        r#"<div hx-get="/api/catalog?{query}" hx-trigger="intersect once threshold:0.3" hx-swap="outerHTML" class="w-20 h-20"></div>"#,
        query = query,
    )
}

// ── GET /api/catalog ───────────────────────────────────────────────

/// Handle GET /api/catalog
pub fn handle_get(query: &str) -> String {
    let params = parse_query(query);
    let page: usize = get_param(&params, "page")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let per = match get_param(&params, "per").and_then(|v| v.parse::<usize>().ok()) {
        Some(0) | None => DEFAULT_PER,
        Some(n) => n.min(MAX_PER),
    };
    let search = get_param(&params, "search").unwrap_or("").trim().to_string();

    let (items, total) = with_catalog(|catalog| {
        with_state(|grid| {
            with_filters(|filters| {
                let matching: Vec<&Character> = filters
                    .filter_out(catalog.iter(), grid)
                    .into_iter()
                    .filter(|c| matches_search(c, &search))
                    .collect();
                let total = matching.len();
                let items: Vec<String> = matching
                    .into_iter()
                    .skip(page * per)
                    .take(per)
                    .map(|c| render_pick(c, grid.contains(&c.id)))
                    .collect();
                (items, total)
            })
        })
    });

    if total == 0 {
        return r#"<p class="text-slate-500">No characters match.</p>"#.to_string();
    }
    let mut html = items.join("\n");
    if (page + 1) * per < total {
        html.push('\n');
        html.push_str(&render_sentinel(page + 1, per, &search));
    }
    html
}

// ── POST /api/catalog ──────────────────────────────────────────────

/// Handle POST /api/catalog
/// Body is the raw `{characters: [...]}` document from `/api/characters`.
/// Reloading after an admin edit uses the same route.
pub fn handle_load_post(body: &str) -> String {
    match catalog::load_catalog_json(body.trim()) {
        Ok(count) => {
            let dangling = with_catalog(|c| {
                with_state(|g| g.layout.iter().filter(|id| !c.contains(id)).count())
            });
            if dangling > 0 {
                warn!(dangling, "Grid references characters missing from the catalog");
            }
            notice::push(NoticeKind::Info, format!("Loaded {} characters", count));
            format!("{}{}", render_grid(true), oob_notices())
        }
        Err(e) => {
            notice::push_error(&e);
            format!(
                r#"<span class="text-kip-red">{}</span>{}"#,
                escape_html(&e.to_string()),
                oob_notices()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::catalog::{fixtures, replace_catalog, CharacterCatalog};
    use crate::grid::filter::{reset_filters, with_filters_mut};
    use crate::grid::state::{replace_state, GridState};

    fn setup(layout: &[&str]) {
        replace_catalog(fixtures::catalog());
        let catalog = fixtures::catalog();
        let mut grid = GridState::default();
        for id in layout {
            grid.add_character(id, &catalog);
        }
        replace_state(grid);
        reset_filters();
        notice::clear();
    }

    fn teardown() {
        replace_catalog(CharacterCatalog::default());
        replace_state(GridState::default());
        reset_filters();
        notice::clear();
    }

    #[test]
    fn placed_characters_are_disabled() {
        setup(&["a"]);
        let html = handle_get("");
        assert_eq!(html.matches("catalog-pick").count(), 4);
        assert!(html.contains(r#"data-id="a" data-rarity="6" disabled"#));
        assert!(html.contains(r#"{"id":"b"}"#));
        teardown();
    }

    #[test]
    fn indexed_filter_discarded_shows_only_available() {
        setup(&["a", "c"]);
        with_filters_mut(|f| {
            f.toggle("indexed", None).unwrap();
            f.toggle("indexed", None).unwrap();
        });
        let html = handle_get("");
        assert!(html.contains(r#"data-id="b""#));
        assert!(html.contains(r#"data-id="d""#));
        assert!(!html.contains(r#"data-id="a""#));
        teardown();
    }

    #[test]
    fn pagination_and_search() {
        setup(&[]);
        let first = handle_get("?per=3");
        assert_eq!(first.matches("catalog-pick").count(), 3);
        assert!(first.contains("page=1&per=3"));
        let second = handle_get("?page=1&per=3");
        assert_eq!(second.matches("catalog-pick").count(), 1);
        assert!(!second.contains("intersect once"));

        let html = handle_get("?search=D");
        assert_eq!(html.matches("catalog-pick").count(), 1);
        assert!(handle_get("?search=nobody").contains("No characters match"));
        teardown();
    }

    #[test]
    fn load_installs_catalog_and_rejects_garbage() {
        teardown();
        let html = handle_load_post(fixtures::CATALOG_JSON);
        assert!(html.contains("Loaded 4 characters"));
        with_catalog(|c| assert_eq!(c.len(), 4));
        let html = handle_load_post(r#"{"nope":1}"#);
        assert!(html.contains("malformed character catalog"));
        with_catalog(|c| assert_eq!(c.len(), 4));
        teardown();
    }
}

//! View projection: the ordered subset of the layout the page should show.
//!
//! Projection never reorders: the visible list is always a sub-order of the
//! layout. The [`ViewProjector`] remembers the last projection so the page
//! can skip a full re-render and only re-apply marks and skins when nothing
//! moved.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::grid::catalog::{Character, CharacterCatalog};
use crate::grid::state::GridState;

/// Visible ids of `layout`, in layout order. Dangling ids (unknown to the
/// catalog) are never shown.
pub fn project<P>(layout: &[String], catalog: &CharacterCatalog, predicate: P) -> Vec<String>
where
    P: Fn(&Character) -> bool,
{
    layout
        .iter()
        .filter_map(|id| catalog.get(id))
        .filter(|c| predicate(c))
        .map(|c| c.id.clone())
        .collect()
}

/// Everything the renderer needs for one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellView {
    pub id: String,
    pub name: String,
    pub class: String,
    pub rarity: u8,
    pub skin: String,
    pub checked: bool,
    pub circles: u8,
}

/// Per-cell visual flags for `visible`, in the same order.
pub fn cells(visible: &[String], grid: &GridState, catalog: &CharacterCatalog) -> Vec<CellView> {
    visible
        .iter()
        .filter_map(|id| {
            let character = catalog.get(id)?;
            let mark = grid.mark(id);
            Some(CellView {
                id: id.clone(),
                name: character.name.clone(),
                class: character.class.clone(),
                rarity: character.rarity,
                skin: grid
                    .effective_skin(id, catalog)
                    .unwrap_or(character.skins.default.as_str())
                    .to_string(),
                checked: mark.checks,
                circles: mark.circles,
            })
        })
        .collect()
}

/// Result of feeding a new projection to the [`ViewProjector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionChange {
    /// Same ids in the same order; only marks/skins need re-applying.
    Unchanged,
    /// Membership or order changed; the grid must be re-rendered.
    Changed,
}

/// Remembers the last displayed sequence and where each id sits in it.
#[derive(Debug, Default)]
pub struct ViewProjector {
    visible: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ViewProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh projection.
    pub fn refresh(&mut self, visible: Vec<String>) -> ProjectionChange {
        if visible == self.visible {
            return ProjectionChange::Unchanged;
        }
        self.positions = visible
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        self.visible = visible;
        ProjectionChange::Changed
    }

    pub fn visible(&self) -> &[String] {
        &self.visible
    }

    /// Rendered position of `id`, if it is currently displayed.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn clear(&mut self) {
        self.visible.clear();
        self.positions.clear();
    }
}

thread_local! {
    static PROJECTOR: RefCell<ViewProjector> = RefCell::new(ViewProjector::new());
}

/// Execute a closure with mutable access to the session's projector.
pub fn with_projector_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut ViewProjector) -> R,
{
    PROJECTOR.with(|p| f(&mut p.borrow_mut()))
}

//! Grid state: the aggregate root of the engine.
//!
//! Owns the ordered layout, per-character marks and the sparse skin override
//! map. Everything the page shows is derived from this, and this is the only
//! thing written to the persistence gateway (always as a whole document).
//!
//! Uses `thread_local!` + `RefCell` for mutable access in single-threaded
//! WASM; the worker keeps the module alive for the whole browser session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::config::MAX_CIRCLES;
use crate::error::GridError;
use crate::grid::catalog::{AssetRef, CharacterCatalog};

/// Per-character annotation: the check mark and the promotion circles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    pub checks: bool,
    /// Number of lit circles. Lit circles are always a prefix of the row.
    pub circles: u8,
}

impl Mark {
    /// Whether circle `slot` (0-based) is lit.
    pub fn is_lit(&self, slot: u8) -> bool {
        slot < self.circles
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridState {
    /// Membership and display order. No duplicates.
    pub layout: Vec<String>,
    #[serde(default)]
    pub marks: BTreeMap<String, Mark>,
    /// Only skins that differ from the character's default.
    #[serde(default)]
    pub skins: BTreeMap<String, AssetRef>,
}

impl GridState {
    pub fn contains(&self, id: &str) -> bool {
        self.layout.iter().any(|l| l == id)
    }

    fn require(&self, id: &str) -> Result<(), GridError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(GridError::unknown(id))
        }
    }

    /// Mark for `id`; characters without an entry read as blank.
    pub fn mark(&self, id: &str) -> Mark {
        self.marks.get(id).copied().unwrap_or_default()
    }

    /// Append a character. Returns `false` (and changes nothing) when the id
    /// is already placed or unknown to the catalog.
    pub fn add_character(&mut self, id: &str, catalog: &CharacterCatalog) -> bool {
        if self.contains(id) || !catalog.contains(id) {
            debug!(id, "add_character ignored");
            return false;
        }
        self.layout.push(id.to_string());
        self.marks.insert(id.to_string(), Mark::default());
        true
    }

    /// Remove a character and every annotation it carries.
    pub fn remove_character(&mut self, id: &str) -> bool {
        let before = self.layout.len();
        self.layout.retain(|l| l != id);
        self.marks.remove(id);
        self.skins.remove(id);
        self.layout.len() != before
    }

    pub fn set_check(&mut self, id: &str, value: bool) -> Result<(), GridError> {
        self.require(id)?;
        self.marks.entry(id.to_string()).or_default().checks = value;
        Ok(())
    }

    /// Flip the check mark. Returns the new value.
    pub fn toggle_check(&mut self, id: &str) -> Result<bool, GridError> {
        let next = !self.mark(id).checks;
        self.set_check(id, next)?;
        Ok(next)
    }

    /// Move the circle counter by `delta`, saturating at `0` and [`MAX_CIRCLES`].
    /// Returns the new count.
    pub fn set_circles(&mut self, id: &str, delta: i32) -> Result<u8, GridError> {
        self.require(id)?;
        let mark = self.marks.entry(id.to_string()).or_default();
        let next = (mark.circles as i32 + delta).clamp(0, MAX_CIRCLES as i32);
        mark.circles = next as u8;
        Ok(mark.circles)
    }

    /// Light the first unlit circle.
    pub fn add_circle(&mut self, id: &str) -> Result<u8, GridError> {
        self.set_circles(id, 1)
    }

    /// Turn off the last lit circle.
    pub fn remove_circle(&mut self, id: &str) -> Result<u8, GridError> {
        self.set_circles(id, -1)
    }

    /// Choose the skin shown for `id`. Picking the default clears the override;
    /// assets outside the character's skin set are rejected.
    pub fn set_skin(
        &mut self,
        id: &str,
        asset: &str,
        catalog: &CharacterCatalog,
    ) -> Result<(), GridError> {
        self.require(id)?;
        let character = catalog.get(id).ok_or_else(|| GridError::unknown(id))?;
        if !character.skins.contains(asset) {
            return Err(GridError::UnknownSkin {
                id: id.to_string(),
                asset: asset.to_string(),
            });
        }
        if character.skins.default == asset {
            self.skins.remove(id);
        } else {
            self.skins.insert(id.to_string(), asset.to_string());
        }
        Ok(())
    }

    /// Skin to draw for `id`: the override if any, else the catalog default.
    pub fn effective_skin<'a>(&'a self, id: &str, catalog: &'a CharacterCatalog) -> Option<&'a str> {
        self.skins
            .get(id)
            .map(String::as_str)
            .or_else(|| catalog.get(id).map(|c| c.skins.default.as_str()))
    }

    /// Apply a new relative order to a subset of the layout.
    ///
    /// The slots currently held by the ids in `visible` are refilled, left to
    /// right, with `visible` in its new order. Every other id keeps its
    /// absolute position, so hidden characters can never be jumped over.
    pub fn reorder(&mut self, visible: &[String]) -> Result<(), GridError> {
        let mut moved: HashSet<&str> = HashSet::with_capacity(visible.len());
        for id in visible {
            self.require(id)?;
            if !moved.insert(id.as_str()) {
                return Err(GridError::InvalidReorder(format!("`{}` appears twice", id)));
            }
        }

        let mut next = visible.iter();
        for slot in self.layout.iter_mut() {
            if moved.contains(slot.as_str()) {
                if let Some(id) = next.next() {
                    *slot = id.clone();
                }
            }
        }
        debug!(moved = visible.len(), total = self.layout.len(), "Layout reordered");
        Ok(())
    }

    /// Mastery tier used by the `mastery` filter.
    ///
    /// Checked with no circles is tier 0, circles 1..=3 are tiers 1..=3.
    /// Unchecked with no circles, or no mark at all, has no tier.
    pub fn mastery_tier(&self, id: &str) -> Option<u8> {
        let mark = self.marks.get(id)?;
        match mark.circles {
            0 if mark.checks => Some(0),
            n @ 1..=MAX_CIRCLES => Some(n),
            _ => None,
        }
    }

    /// Restore the structural invariants after loading foreign data:
    /// first occurrence wins in the layout, annotations for ids that are not
    /// placed are dropped, circles are clamped.
    pub fn normalize(&mut self) {
        let mut seen = HashSet::with_capacity(self.layout.len());
        self.layout.retain(|id| seen.insert(id.clone()));
        self.marks.retain(|id, _| seen.contains(id));
        self.skins.retain(|id, _| seen.contains(id));
        for mark in self.marks.values_mut() {
            mark.circles = mark.circles.min(MAX_CIRCLES);
        }
    }

    /// Validate and parse a profile document (import, restore, default
    /// template). On error nothing is built, so callers keep their state.
    pub fn from_document(json: &str, max_id_len: usize) -> Result<GridState, GridError> {
        let invalid = |msg: String| GridError::InvalidImportDocument(msg);
        let root: Value = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        let obj = root
            .as_object()
            .ok_or_else(|| invalid("document must be an object".into()))?;

        let layout_raw = obj
            .get("layout")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("`layout` must be an array".into()))?;
        let mut layout = Vec::with_capacity(layout_raw.len());
        for entry in layout_raw {
            let id = entry
                .as_str()
                .ok_or_else(|| invalid("`layout` entries must be strings".into()))?;
            if !is_valid_id(id, max_id_len) {
                return Err(invalid(format!("`{}` is not a valid character id", id)));
            }
            layout.push(id.to_string());
        }

        let marks_raw = obj
            .get("marks")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid("`marks` must be an object".into()))?;
        let mut marks = BTreeMap::new();
        for (id, raw) in marks_raw {
            let checks = raw
                .get("checks")
                .and_then(Value::as_bool)
                .ok_or_else(|| invalid(format!("mark `{}` needs a boolean `checks`", id)))?;
            let circles = raw
                .get("circles")
                .and_then(Value::as_u64)
                .filter(|&n| n <= MAX_CIRCLES as u64)
                .ok_or_else(|| {
                    invalid(format!("mark `{}` needs integer `circles` in 0..={}", id, MAX_CIRCLES))
                })?;
            marks.insert(
                id.clone(),
                Mark {
                    checks,
                    circles: circles as u8,
                },
            );
        }

        let mut skins = BTreeMap::new();
        match obj.get("skins") {
            None | Some(Value::Null) => {}
            Some(Value::Object(raw)) => {
                for (id, asset) in raw {
                    let asset = asset
                        .as_str()
                        .ok_or_else(|| invalid(format!("skin for `{}` must be a string", id)))?;
                    skins.insert(id.clone(), asset.to_string());
                }
            }
            Some(_) => return Err(invalid("`skins` must be an object".into())),
        }

        let mut state = GridState {
            layout,
            marks,
            skins,
        };
        state.normalize();
        Ok(state)
    }

    pub fn to_document(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Character ids are short slugs: ASCII letters, digits, `_` and `-`.
pub fn is_valid_id(id: &str, max_len: usize) -> bool {
    !id.is_empty()
        && id.len() <= max_len
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

thread_local! {
    static STATE: RefCell<GridState> = RefCell::new(GridState::default());
}

/// Execute a closure with read access to the grid state.
pub fn with_state<F, R>(f: F) -> R
where
    F: FnOnce(&GridState) -> R,
{
    STATE.with(|s| f(&s.borrow()))
}

/// Execute a closure with mutable access to the grid state.
pub fn with_state_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut GridState) -> R,
{
    STATE.with(|s| f(&mut s.borrow_mut()))
}

/// Replace the entire grid state (restore, import, snapshot load).
pub fn replace_state(new_state: GridState) {
    STATE.with(|s| {
        *s.borrow_mut() = new_state;
    });
}

/// Export the grid state as a JSON document.
pub fn export_state_json() -> String {
    with_state(GridState::to_document)
}

/// Validate and install a JSON document. The current state is untouched on error.
pub fn import_state_json(json: &str, max_id_len: usize) -> Result<(), GridError> {
    let new_state = GridState::from_document(json, max_id_len)?;
    info!(characters = new_state.layout.len(), "Grid document imported");
    replace_state(new_state);
    Ok(())
}

/// Install a default-profile template. Without `force` only an empty grid
/// is seeded; `force` replaces whatever is there (the "Load Default" button).
/// Returns whether the template was applied.
pub fn apply_profile(json: &str, max_id_len: usize, force: bool) -> Result<bool, GridError> {
    let template = GridState::from_document(json, max_id_len)?;
    if !force && with_state(|s| !s.layout.is_empty()) {
        debug!("Default profile skipped, grid already populated");
        return Ok(false);
    }
    info!(characters = template.layout.len(), "Default profile applied");
    replace_state(template);
    Ok(true)
}

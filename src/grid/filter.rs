//! Filter engine: per-dimension tri-state filters combined with AND.
//!
//! Each dimension owns a [`FilterSpec`] and a resolver that extracts the
//! dimension's value for a character. Resolvers see both the immutable
//! catalog entry and the session's [`GridState`], which is how `mastery`
//! filters on marks rather than on catalog metadata.
//!
//! ## Per-dimension predicate
//!
//! ```text
//! neutral                 → always passes
//! forced,    no values    → value is present and truthy
//! forced,    values       → value ∈ values
//! discarded, no values    → value is missing or falsy
//! discarded, values       → value ∉ values
//! ```
//!
//! Filter preferences are a per-device setting, stored in their own
//! localStorage key and reloaded with a deep merge over the defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::error::GridError;
use crate::grid::catalog::Character;
use crate::grid::state::GridState;

pub const CLASSES: [&str; 8] = [
    "caster",
    "defender",
    "guard",
    "medic",
    "sniper",
    "specialist",
    "supporter",
    "vanguard",
];
pub const RARITIES: [&str; 5] = ["2", "3", "4", "5", "6"];
pub const MASTERY_TIERS: [&str; 4] = ["0", "1", "2", "3"];

/// Groups that have their own toggle widgets and never show up as chips.
const BUILT_IN_GROUPS: [&str; 3] = ["class", "indexed", "rarity"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Tristate,
    Twostate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterState {
    #[default]
    Neutral,
    Forced,
    Discarded,
}

impl FilterState {
    /// Cycle used by tristate toggles.
    pub fn next_tristate(self) -> Self {
        match self {
            FilterState::Neutral => FilterState::Forced,
            FilterState::Forced => FilterState::Discarded,
            FilterState::Discarded => FilterState::Neutral,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterState::Neutral => "neutral",
            FilterState::Forced => "forced",
            FilterState::Discarded => "discarded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub mode: FilterMode,
    pub state: FilterState,
    #[serde(default)]
    pub values: Vec<String>,
}

impl FilterSpec {
    pub fn new(mode: FilterMode) -> Self {
        Self {
            mode,
            state: FilterState::Neutral,
            values: Vec::new(),
        }
    }

    /// Whether a character with dimension value `value` passes this filter.
    pub fn admits(&self, value: &FileValue) -> bool {
        match self.state {
            FilterState::Neutral => true,
            FilterState::Forced => {
                if self.values.is_empty() {
                    value.is_truthy()
                } else {
                    self.contains(value)
                }
            }
            FilterState::Discarded => {
                if self.values.is_empty() {
                    !value.is_truthy()
                } else {
                    !self.contains(value)
                }
            }
        }
    }

    fn contains(&self, value: &FileValue) -> bool {
        match value.text() {
            Some(text) => self.values.iter().any(|v| v == text),
            None => false,
        }
    }

    /// Group filters have no independent state: forced iff any value is set.
    fn sync_group_state(&mut self) {
        if self.mode == FilterMode::Twostate {
            self.state = if self.values.is_empty() {
                FilterState::Neutral
            } else {
                FilterState::Forced
            };
        }
    }
}

/// A dimension's value for one character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileValue {
    Missing,
    Flag(bool),
    Text(String),
}

impl FileValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            FileValue::Missing => false,
            FileValue::Flag(b) => *b,
            FileValue::Text(s) => !s.is_empty(),
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            FileValue::Missing => None,
            FileValue::Flag(true) => Some("true"),
            FileValue::Flag(false) => Some("false"),
            FileValue::Text(s) => Some(s),
        }
    }
}

/// Extracts a dimension value for a character in the context of a grid.
pub type Resolver = Rc<dyn Fn(&Character, &GridState) -> FileValue>;

#[derive(Clone)]
pub struct Dimension {
    pub spec: FilterSpec,
    /// Selectable values. Empty for tristate dimensions.
    pub options: Vec<String>,
    resolve: Resolver,
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimension")
            .field("spec", &self.spec)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Dimension {
    pub fn value_for(&self, character: &Character, grid: &GridState) -> FileValue {
        (self.resolve)(character, grid)
    }
}

/// Shape of one stored dimension. Every field is optional so entries written
/// by an older schema still merge.
#[derive(Deserialize)]
struct StoredSpec {
    #[serde(default)]
    state: Option<FilterState>,
    #[serde(default)]
    values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    dimensions: BTreeMap<String, Dimension>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dimensions the grid page ships with.
    pub fn with_default_dimensions() -> Self {
        let mut engine = Self::new();
        // `indexed` means "already on the grid", not "has catalog metadata".
        engine.add_dimension("indexed", &[], Rc::new(|c: &Character, grid: &GridState| {
            FileValue::Flag(grid.contains(&c.id))
        }));
        engine.add_dimension(
            "rarity",
            &RARITIES,
            Rc::new(|c: &Character, _: &GridState| FileValue::Text(c.rarity.to_string())),
        );
        engine.add_dimension(
            "class",
            &CLASSES,
            Rc::new(|c: &Character, _: &GridState| {
                if c.class.is_empty() {
                    FileValue::Missing
                } else {
                    FileValue::Text(c.class.clone())
                }
            }),
        );
        engine.add_dimension(
            "mastery",
            &MASTERY_TIERS,
            Rc::new(|c: &Character, grid: &GridState| match grid.mastery_tier(&c.id) {
                Some(tier) => FileValue::Text(tier.to_string()),
                None => FileValue::Missing,
            }),
        );
        engine
    }

    /// Register a dimension. No options makes it tristate, otherwise it is a
    /// twostate group over `options`.
    pub fn add_dimension(&mut self, name: &str, options: &[&str], resolve: Resolver) {
        let mode = if options.is_empty() {
            FilterMode::Tristate
        } else {
            FilterMode::Twostate
        };
        self.dimensions.insert(
            name.to_string(),
            Dimension {
                spec: FilterSpec::new(mode),
                options: options.iter().map(|s| s.to_string()).collect(),
                resolve,
            },
        );
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }

    pub fn spec(&self, name: &str) -> Option<&FilterSpec> {
        self.dimensions.get(name).map(|d| &d.spec)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = (&String, &Dimension)> {
        self.dimensions.iter()
    }

    /// Displayed state of one toggle: the dimension state for tristate
    /// filters, the per-value state for group filters.
    pub fn toggle_state(&self, name: &str, value: Option<&str>) -> FilterState {
        match (self.spec(name), value) {
            (Some(spec), Some(v)) if spec.mode == FilterMode::Twostate => {
                if spec.values.iter().any(|x| x == v) {
                    FilterState::Forced
                } else {
                    FilterState::Neutral
                }
            }
            (Some(spec), _) => spec.state,
            (None, _) => FilterState::Neutral,
        }
    }

    /// Handle a click on a filter toggle. Returns the toggle's new state.
    pub fn toggle(&mut self, name: &str, value: Option<&str>) -> Result<FilterState, GridError> {
        let dim = self
            .dimensions
            .get_mut(name)
            .ok_or_else(|| GridError::UnknownFilter {
                dimension: name.to_string(),
            })?;
        let spec = &mut dim.spec;

        let new_state = match spec.mode {
            FilterMode::Tristate => {
                spec.state = spec.state.next_tristate();
                spec.state
            }
            FilterMode::Twostate => {
                let value = value
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| GridError::FilterValueRequired {
                        dimension: name.to_string(),
                    })?;
                if !dim.options.iter().any(|o| o == value) {
                    return Err(GridError::UnknownFilterValue {
                        dimension: name.to_string(),
                        value: value.to_string(),
                    });
                }
                if let Some(pos) = spec.values.iter().position(|v| v == value) {
                    spec.values.remove(pos);
                    FilterState::Neutral
                } else {
                    spec.values.push(value.to_string());
                    FilterState::Forced
                }
            }
        };
        spec.sync_group_state();
        debug!(dimension = name, state = new_state.as_str(), "Filter toggled");
        Ok(new_state)
    }

    /// Whether `character` passes every dimension.
    pub fn matches(&self, character: &Character, grid: &GridState) -> bool {
        self.dimensions.values().all(|dim| {
            dim.spec.state == FilterState::Neutral || dim.spec.admits(&dim.value_for(character, grid))
        })
    }

    /// The candidates that pass every dimension, in input order.
    pub fn filter_out<'a, I>(&self, candidates: I, grid: &GridState) -> Vec<&'a Character>
    where
        I: IntoIterator<Item = &'a Character>,
    {
        candidates
            .into_iter()
            .filter(|c| self.matches(c, grid))
            .collect()
    }

    pub fn is_active(&self) -> bool {
        self.dimensions
            .values()
            .any(|d| d.spec.state != FilterState::Neutral)
    }

    /// Put every dimension back to neutral with no values.
    pub fn reset(&mut self) {
        for dim in self.dimensions.values_mut() {
            dim.spec.state = FilterState::Neutral;
            dim.spec.values.clear();
        }
    }

    /// Active `(dimension, value)` pairs for the selected-filters strip.
    pub fn active_chips(&self) -> Vec<(String, String)> {
        self.dimensions
            .iter()
            .filter(|(name, _)| !BUILT_IN_GROUPS.contains(&name.as_str()))
            .flat_map(|(name, dim)| {
                dim.spec
                    .values
                    .iter()
                    .map(move |v| (name.clone(), v.clone()))
            })
            .collect()
    }

    /// Serialize every dimension, as written to the preference store.
    pub fn to_json(&self) -> String {
        let specs: BTreeMap<&str, &FilterSpec> = self
            .dimensions
            .iter()
            .map(|(name, dim)| (name.as_str(), &dim.spec))
            .collect();
        serde_json::to_string(&specs).unwrap_or_else(|_| "{}".to_string())
    }

    /// Merge stored preferences over the current dimensions.
    ///
    /// Dimensions missing from the store keep their defaults; stored
    /// dimensions that no longer exist are skipped and returned so the caller
    /// can log them. The mode always comes from the registered dimension, and
    /// group values that are no longer offered are dropped.
    pub fn merge_json(&mut self, json: &str) -> Result<Vec<String>, GridError> {
        let stored: BTreeMap<String, Value> = serde_json::from_str(json)
            .map_err(|e| GridError::MalformedFilterPreferences(e.to_string()))?;

        let mut stale = Vec::new();
        for (name, raw) in stored {
            let Some(dim) = self.dimensions.get_mut(&name) else {
                stale.push(name);
                continue;
            };
            let entry: StoredSpec = match serde_json::from_value(raw) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dimension = %name, error = %e, "Unreadable stored filter, keeping default");
                    continue;
                }
            };

            if let Some(values) = entry.values {
                let mut merged: Vec<String> = Vec::with_capacity(values.len());
                for v in values {
                    let offered = dim.options.is_empty() || dim.options.contains(&v);
                    if offered && !merged.contains(&v) {
                        merged.push(v);
                    }
                }
                dim.spec.values = merged;
            }
            if let Some(state) = entry.state {
                if dim.spec.mode == FilterMode::Tristate {
                    dim.spec.state = state;
                }
            }
            dim.spec.sync_group_state();
        }

        if !stale.is_empty() {
            let err = GridError::StaleFilterSchema {
                dimensions: stale.clone(),
            };
            warn!("{}", err);
        }
        Ok(stale)
    }
}

thread_local! {
    static FILTERS: RefCell<FilterEngine> = RefCell::new(FilterEngine::with_default_dimensions());
}

/// Execute a closure with read access to the filter engine.
pub fn with_filters<F, R>(f: F) -> R
where
    F: FnOnce(&FilterEngine) -> R,
{
    FILTERS.with(|e| f(&e.borrow()))
}

/// Execute a closure with mutable access to the filter engine.
pub fn with_filters_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut FilterEngine) -> R,
{
    FILTERS.with(|e| f(&mut e.borrow_mut()))
}

/// Reinstall the default dimensions (all neutral).
pub fn reset_filters() {
    FILTERS.with(|e| *e.borrow_mut() = FilterEngine::with_default_dimensions());
}

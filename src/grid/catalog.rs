//! Character catalog: the read-only lookup table every other module keys into.
//!
//! Fetched once per session from `/api/characters` and handed to the worker
//! through `POST /api/catalog`. After an admin edit the page simply posts the
//! re-fetched document again.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::error::GridError;

/// Reference to an image asset (a file name under `/characters/`).
pub type AssetRef = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinSet {
    pub default: AssetRef,
    #[serde(default)]
    pub alternates: Vec<AssetRef>,
}

impl SkinSet {
    pub fn contains(&self, asset: &str) -> bool {
        self.default == asset || self.alternates.iter().any(|a| a == asset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub subclass: String,
    #[serde(default)]
    pub rarity: u8,
    pub skins: SkinSet,
}

#[derive(Deserialize)]
struct CatalogDocument {
    characters: Vec<Character>,
}

/// Immutable snapshot of all known characters, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct CharacterCatalog {
    characters: Vec<Character>,
    by_id: HashMap<String, usize>,
}

impl CharacterCatalog {
    /// Build a catalog. Duplicate ids keep their first entry.
    pub fn new(characters: Vec<Character>) -> Self {
        let mut kept = Vec::with_capacity(characters.len());
        let mut by_id = HashMap::with_capacity(characters.len());
        for character in characters {
            if by_id.contains_key(&character.id) {
                warn!(id = %character.id, "Duplicate character id in catalog, keeping first");
                continue;
            }
            by_id.insert(character.id.clone(), kept.len());
            kept.push(character);
        }
        Self {
            characters: kept,
            by_id,
        }
    }

    /// Parse the `{characters: [...]}` document served by the catalog store.
    pub fn from_json(json: &str) -> Result<Self, GridError> {
        let doc: CatalogDocument =
            serde_json::from_str(json).map_err(|e| GridError::MalformedCatalog(e.to_string()))?;
        Ok(Self::new(doc.characters))
    }

    pub fn get(&self, id: &str) -> Option<&Character> {
        self.by_id.get(id).map(|&i| &self.characters[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter()
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Characters not yet placed in `layout`, in catalog order.
    pub fn available<'a>(&'a self, layout: &[String]) -> Vec<&'a Character> {
        self.characters
            .iter()
            .filter(|c| !layout.iter().any(|id| id == &c.id))
            .collect()
    }

    /// Pick an available character using a caller-supplied seed.
    pub fn pick_available(&self, layout: &[String], seed: u64) -> Option<&Character> {
        let available = self.available(layout);
        if available.is_empty() {
            return None;
        }
        let idx = (seed % available.len() as u64) as usize;
        Some(available[idx])
    }
}

thread_local! {
    static CATALOG: RefCell<CharacterCatalog> = RefCell::new(CharacterCatalog::default());
}

/// Execute a closure with read access to the loaded catalog.
pub fn with_catalog<F, R>(f: F) -> R
where
    F: FnOnce(&CharacterCatalog) -> R,
{
    CATALOG.with(|c| f(&c.borrow()))
}

/// Replace the loaded catalog (initial load or re-fetch after an admin edit).
pub fn replace_catalog(catalog: CharacterCatalog) {
    info!(characters = catalog.len(), "Character catalog loaded");
    CATALOG.with(|c| *c.borrow_mut() = catalog);
}

/// Parse and install a catalog document.
pub fn load_catalog_json(json: &str) -> Result<usize, GridError> {
    let catalog = CharacterCatalog::from_json(json)?;
    let count = catalog.len();
    replace_catalog(catalog);
    Ok(count)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn character(id: &str, class: &str, rarity: u8) -> Character {
        Character {
            id: id.to_string(),
            name: id.to_uppercase(),
            class: class.to_string(),
            subclass: String::new(),
            rarity,
            skins: SkinSet {
                default: format!("{}.png", id),
                alternates: vec![format!("{}_skin1.png", id)],
            },
        }
    }

    /// Four characters across three classes; used throughout the test suite.
    pub fn catalog() -> CharacterCatalog {
        CharacterCatalog::new(vec![
            character("a", "caster", 6),
            character("b", "guard", 5),
            character("c", "caster", 4),
            character("d", "medic", 6),
        ])
    }

    pub const CATALOG_JSON: &str = r#"{"characters":[
        {"id":"a","name":"A","class":"caster","subclass":"core","rarity":6,"skins":{"default":"a.png","alternates":["a_skin1.png"]}},
        {"id":"b","name":"B","class":"guard","subclass":"lord","rarity":5,"skins":{"default":"b.png","alternates":["b_skin1.png"]}},
        {"id":"c","name":"C","class":"caster","subclass":"splash","rarity":4,"skins":{"default":"c.png","alternates":[]}},
        {"id":"d","name":"D","class":"medic","subclass":"single","rarity":6,"skins":{"default":"d.png"}}
    ]}"#;
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn parses_catalog_document() {
        let catalog = CharacterCatalog::from_json(CATALOG_JSON).unwrap();
        assert_eq!(catalog.len(), 4);
        let d = catalog.get("d").unwrap();
        assert_eq!(d.class, "medic");
        assert!(d.skins.alternates.is_empty());
    }

    #[test]
    fn malformed_catalog_is_rejected() {
        let err = CharacterCatalog::from_json(r#"{"chars":[]}"#).unwrap_err();
        assert!(matches!(err, GridError::MalformedCatalog(_)));
    }

    #[test]
    fn duplicate_ids_keep_first_entry() {
        let catalog = CharacterCatalog::new(vec![
            character("a", "caster", 6),
            character("a", "guard", 3),
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("a").unwrap().class, "caster");
    }

    #[test]
    fn available_excludes_layout() {
        let catalog = catalog();
        let layout = vec!["a".to_string(), "c".to_string()];
        let ids: Vec<&str> = catalog.available(&layout).iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[test]
    fn pick_available_wraps_seed() {
        let catalog = catalog();
        let layout = vec!["a".to_string()];
        assert_eq!(catalog.pick_available(&layout, 0).unwrap().id, "b");
        assert_eq!(catalog.pick_available(&layout, 4).unwrap().id, "c");
        let full: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert!(catalog.pick_available(&full, 7).is_none());
    }

    #[test]
    fn skin_set_contains_default_and_alternates() {
        let a = character("a", "caster", 6);
        assert!(a.skins.contains("a.png"));
        assert!(a.skins.contains("a_skin1.png"));
        assert!(!a.skins.contains("b.png"));
    }
}

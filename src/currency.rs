use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::capture::Region;
use crate::library::PixelPos;

/// A currency counter somewhere on screen, mirrored on demand via a global
/// hotkey rather than detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    pub capture: Region,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrencyData {
    #[serde(default)]
    pub currencies: Vec<CurrencyEntry>,
    /// Saved overlay positions keyed by currency id.
    #[serde(default)]
    pub positions: HashMap<String, PixelPos>,
}

/// JSON-file-backed currency store, same shape as the library collaborator.
pub struct CurrencyBook {
    path: PathBuf,
}

impl CurrencyBook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> CurrencyData {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return CurrencyData::default(),
        };
        match serde_json::from_str(&content) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("malformed currency file {}: {e}", self.path.display());
                CurrencyData::default()
            }
        }
    }

    pub fn update_position(&self, id: &str, left: i32, top: i32) -> bool {
        let mut data = self.load();
        if !data.currencies.iter().any(|c| c.id == id) {
            return false;
        }
        data.positions.insert(id.to_string(), PixelPos { left, top });
        match serde_json::to_string_pretty(&data) {
            Ok(json) => std::fs::write(&self.path, json).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_position_rejects_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("currencies.json");
        std::fs::write(
            &path,
            r#"{"currencies": [{"id": "gold", "capture": {"left": 0, "top": 0, "width": 10, "height": 10}}]}"#,
        )
        .unwrap();
        let book = CurrencyBook::new(&path);
        assert!(book.update_position("gold", 5, 6));
        assert!(!book.update_position("silver", 5, 6));
        let data = book.load();
        assert_eq!(data.positions["gold"], PixelPos { left: 5, top: 6 });
    }
}

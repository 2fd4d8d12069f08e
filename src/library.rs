use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::capture::Region;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPos {
    pub left: i32,
    pub top: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl Default for PixelSize {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
        }
    }
}

/// Which bucket an entry persists into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Buff,
    Debuff,
    CopyArea,
}

/// A buff or debuff icon authored in the library editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub image_path: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub position: PixelPos,
    #[serde(default)]
    pub size: PixelSize,
    #[serde(default = "default_opacity")]
    pub transparency: f32,
    /// Extra rows of source pixels mirrored below the matched icon, for
    /// stack counters rendered under the icon in-game.
    #[serde(default)]
    pub extend_bottom: u32,
}

/// An overlay entry with its own capture rectangle, independent of detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyAreaEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    pub capture: Region,
    /// Buff/debuff ids this area stands in for; the area is hidden on ticks
    /// where any referenced id is currently detected.
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub position: PixelPos,
    #[serde(default)]
    pub size: PixelSize,
    #[serde(default = "default_opacity")]
    pub transparency: f32,
    #[serde(default = "default_topmost")]
    pub topmost: bool,
}

fn default_opacity() -> f32 {
    1.0
}

fn default_topmost() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryData {
    #[serde(default)]
    pub buffs: Vec<IconEntry>,
    #[serde(default)]
    pub debuffs: Vec<IconEntry>,
    #[serde(default)]
    pub copy_areas: Vec<CopyAreaEntry>,
}

impl LibraryData {
    /// Buffs and debuffs in one pass.
    pub fn icons(&self) -> impl Iterator<Item = (&IconEntry, EntryKind)> {
        self.buffs
            .iter()
            .map(|e| (e, EntryKind::Buff))
            .chain(self.debuffs.iter().map(|e| (e, EntryKind::Debuff)))
    }

    pub fn icon_by_id(&self, id: &str) -> Option<&IconEntry> {
        self.buffs
            .iter()
            .chain(self.debuffs.iter())
            .find(|e| e.id == id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GeometryPatch {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// Persistence collaborator for authored entries. The detection pipeline only
/// ever reloads in full and writes geometry back after positioning.
pub trait Library {
    fn load(&self) -> LibraryData;
    fn update_geometry(&self, id: &str, kind: EntryKind, geometry: GeometryPatch) -> bool;
}

/// JSON-file-backed library.
pub struct JsonLibrary {
    path: PathBuf,
}

impl JsonLibrary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn save(&self, data: &LibraryData) -> bool {
        match serde_json::to_string_pretty(data) {
            Ok(json) => match std::fs::write(&self.path, json) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("failed to write library {}: {e}", self.path.display());
                    false
                }
            },
            Err(e) => {
                tracing::warn!("failed to serialise library: {e}");
                false
            }
        }
    }
}

impl Library for JsonLibrary {
    fn load(&self) -> LibraryData {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return LibraryData::default(),
        };
        match serde_json::from_str(&content) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("malformed library {}: {e}", self.path.display());
                LibraryData::default()
            }
        }
    }

    fn update_geometry(&self, id: &str, kind: EntryKind, geometry: GeometryPatch) -> bool {
        let mut data = self.load();
        let patched = match kind {
            EntryKind::Buff => patch_icon(&mut data.buffs, id, geometry),
            EntryKind::Debuff => patch_icon(&mut data.debuffs, id, geometry),
            EntryKind::CopyArea => {
                if let Some(entry) = data.copy_areas.iter_mut().find(|e| e.id == id) {
                    entry.position = PixelPos {
                        left: geometry.left,
                        top: geometry.top,
                    };
                    entry.size = PixelSize {
                        width: geometry.width,
                        height: geometry.height,
                    };
                    true
                } else {
                    false
                }
            }
        };
        patched && self.save(&data)
    }
}

fn patch_icon(bucket: &mut [IconEntry], id: &str, geometry: GeometryPatch) -> bool {
    if let Some(entry) = bucket.iter_mut().find(|e| e.id == id) {
        entry.position = PixelPos {
            left: geometry.left,
            top: geometry.top,
        };
        entry.size = PixelSize {
            width: geometry.width,
            height: geometry.height,
        };
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let lib = JsonLibrary::new("definitely_missing_library.json");
        let data = lib.load();
        assert!(data.buffs.is_empty());
        assert!(data.copy_areas.is_empty());
    }

    #[test]
    fn icons_iterates_both_buckets() {
        let data: LibraryData = serde_json::from_str(
            r#"{
                "buffs": [{"id": "a", "image_path": "a.png"}],
                "debuffs": [{"id": "b", "image_path": "b.png"}]
            }"#,
        )
        .unwrap();
        let kinds: Vec<EntryKind> = data.icons().map(|(_, k)| k).collect();
        assert_eq!(kinds, vec![EntryKind::Buff, EntryKind::Debuff]);
        assert!(data.icon_by_id("b").is_some());
        assert!(data.icon_by_id("c").is_none());
    }
}

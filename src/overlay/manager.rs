use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use image::RgbaImage;

use crate::capture::{Capture, Region};
use crate::library::{CopyAreaEntry, EntryKind, GeometryPatch, IconEntry, Library, LibraryData};
use crate::matcher::MatchResult;
use crate::overlay::snap::Snapper;
use crate::overlay::window::{MirrorFactory, MirrorHandle, SnapFn};

struct ManagedWindow {
    handle: Box<dyn MirrorHandle>,
    kind: EntryKind,
}

/// Owns one mirror window per library entry and reconciles them against the
/// current tick's detections.
pub struct OverlayManager {
    library: Arc<dyn Library>,
    factory: MirrorFactory,
    capture: Box<dyn Capture>,
    snapper: Snapper,
    windows: HashMap<String, ManagedWindow>,
    data: LibraryData,
    positioning: bool,
    copy_enabled: bool,
    prev_visible: BTreeSet<String>,
}

impl OverlayManager {
    pub fn new(
        library: Arc<dyn Library>,
        factory: MirrorFactory,
        capture: Box<dyn Capture>,
        snapper: Snapper,
    ) -> Self {
        let data = library.load();
        Self {
            library,
            factory,
            capture,
            snapper,
            windows: HashMap::new(),
            data,
            positioning: false,
            copy_enabled: true,
            prev_visible: BTreeSet::new(),
        }
    }

    pub fn is_positioning(&self) -> bool {
        self.positioning
    }

    /// Re-read the library; windows for removed entries are destroyed.
    pub fn reload(&mut self) {
        self.data = self.library.load();
        let known: BTreeSet<&str> = self
            .data
            .icons()
            .map(|(e, _)| e.id.as_str())
            .chain(self.data.copy_areas.iter().map(|e| e.id.as_str()))
            .collect();
        let stale: Vec<String> = self
            .windows
            .keys()
            .filter(|id| !known.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            if let Some(mut w) = self.windows.remove(&id) {
                w.handle.close();
            }
        }
    }

    /// Enable or disable copy-area rendering. Disabling hides the windows
    /// immediately; detection mirrors are unaffected.
    pub fn set_copy_enabled(&mut self, on: bool) {
        if self.copy_enabled == on {
            return;
        }
        self.copy_enabled = on;
        if !on && !self.positioning {
            for w in self.windows.values_mut() {
                if w.kind == EntryKind::CopyArea && !w.handle.is_hovered() {
                    w.handle.hide();
                }
            }
        }
    }

    fn window_for(&mut self, id: &str, kind: EntryKind) -> &mut ManagedWindow {
        self.windows.entry(id.to_string()).or_insert_with(|| {
            ManagedWindow {
                handle: (self.factory)(),
                kind,
            }
        })
    }

    /// Reconcile overlay windows against this tick's detections.
    ///
    /// `frame` is the ROI capture the matches were found in; `roi` its screen
    /// rectangle. Copy areas sample their own regions independently.
    pub fn update(&mut self, results: &[MatchResult], frame: Option<&RgbaImage>, _roi: Region) {
        if self.positioning {
            return;
        }

        let detected: BTreeSet<&str> = results.iter().map(|r| r.id.as_str()).collect();
        let mut visible = BTreeSet::new();

        let copy_areas = self.data.copy_areas.clone();
        let icons: Vec<(IconEntry, EntryKind)> = self
            .data
            .icons()
            .map(|(e, k)| (e.clone(), k))
            .collect();

        // Non-topmost copy areas paint below the detection mirrors.
        for entry in copy_areas.iter().filter(|e| !e.topmost) {
            if self.reconcile_copy_area(entry, &detected) {
                visible.insert(entry.id.clone());
            }
        }

        for (entry, kind) in &icons {
            if !entry.active {
                continue;
            }
            let hit = detected
                .contains(entry.id.as_str())
                .then(|| results.iter().find(|r| r.id == entry.id))
                .flatten();
            let w = self.window_for(&entry.id, *kind);
            if w.handle.is_hovered() {
                if w.handle.is_visible() {
                    visible.insert(entry.id.clone());
                }
                continue;
            }
            match (hit, frame) {
                (Some(m), Some(frame)) => {
                    let (img, rect) = render_icon(frame, m, entry);
                    w.handle.show(rect, entry.transparency, true);
                    w.handle.update_image(&img);
                    visible.insert(entry.id.clone());
                }
                _ => w.handle.hide(),
            }
        }

        for entry in copy_areas.iter().filter(|e| e.topmost) {
            if self.reconcile_copy_area(entry, &detected) {
                visible.insert(entry.id.clone());
            }
        }

        // Re-assert z-order only when the set of shown windows changed;
        // raising every tick makes the desktop flicker. Detection mirrors go
        // first so topmost copy areas end up above them.
        if visible != self.prev_visible {
            for id in &visible {
                if let Some(w) = self.windows.get_mut(id) {
                    if w.kind != EntryKind::CopyArea {
                        w.handle.raise();
                    }
                }
            }
            for id in &visible {
                let topmost = self
                    .data
                    .copy_areas
                    .iter()
                    .any(|e| &e.id == id && e.topmost);
                if !topmost {
                    continue;
                }
                if let Some(w) = self.windows.get_mut(id) {
                    if w.kind == EntryKind::CopyArea {
                        w.handle.raise();
                    }
                }
            }
        }
        self.prev_visible = visible;
    }

    fn reconcile_copy_area(&mut self, entry: &CopyAreaEntry, detected: &BTreeSet<&str>) -> bool {
        let suppressed = entry
            .references
            .iter()
            .any(|id| detected.contains(id.as_str()));
        let wanted = self.copy_enabled && entry.active && !suppressed;

        let grabbed = if wanted {
            self.capture.grab(entry.capture)
        } else {
            None
        };

        let w = self.window_for(&entry.id, EntryKind::CopyArea);
        if w.handle.is_hovered() {
            return w.handle.is_visible();
        }
        if !wanted {
            w.handle.hide();
            return false;
        }
        let Some(img) = grabbed else {
            // Missing frame: keep whatever was shown last rather than blink.
            return w.handle.is_visible();
        };
        let rect = Region::new(
            entry.position.left,
            entry.position.top,
            entry.size.width,
            entry.size.height,
        );
        w.handle.show(rect, entry.transparency, entry.topmost);
        let scaled = image::imageops::resize(
            &img,
            entry.size.width.max(1),
            entry.size.height.max(1),
            image::imageops::FilterType::Triangle,
        );
        w.handle.update_image(&scaled);
        true
    }

    /// Hide every non-positioning window. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.positioning {
            return;
        }
        for w in self.windows.values_mut() {
            if !w.handle.is_hovered() {
                w.handle.hide();
            }
        }
        self.prev_visible.clear();
    }

    pub fn poll_hover(&mut self, cursor: (i32, i32)) {
        for w in self.windows.values_mut() {
            w.handle.poll_hover(cursor);
        }
    }

    fn snap_fn_excluding(&self, id: &str) -> SnapFn {
        let probes: Vec<_> = self
            .windows
            .iter()
            .filter(|(other, _)| other.as_str() != id)
            .map(|(_, w)| w.handle.rect_probe())
            .collect();
        let snapper = self.snapper;
        Box::new(move |x, y, w, h| {
            let siblings: Vec<Region> = probes.iter().filter_map(|p| p()).collect();
            snapper.snap(x, y, w, h, &siblings)
        })
    }

    /// Show every active entry as a draggable, resizable window seeded with
    /// its saved geometry.
    pub fn enable_positioning_mode(&mut self) {
        if self.positioning {
            return;
        }
        self.reload();
        self.positioning = true;

        let icons: Vec<(IconEntry, EntryKind)> = self
            .data
            .icons()
            .filter(|(e, _)| e.active)
            .map(|(e, k)| (e.clone(), k))
            .collect();
        let copy_areas: Vec<CopyAreaEntry> = self
            .data
            .copy_areas
            .iter()
            .filter(|e| e.active)
            .cloned()
            .collect();

        // Create the windows first so every snap closure can probe the rest.
        for (entry, kind) in &icons {
            self.window_for(&entry.id, *kind);
        }
        for entry in &copy_areas {
            self.window_for(&entry.id, EntryKind::CopyArea);
        }

        for (entry, _) in &icons {
            let base = icon_base_image(entry);
            let rect = Region::new(
                entry.position.left,
                entry.position.top,
                entry.size.width,
                entry.size.height,
            );
            let snap = self.snap_fn_excluding(&entry.id);
            if let Some(w) = self.windows.get_mut(&entry.id) {
                w.handle.enable_positioning(base, rect, snap);
            }
        }
        for entry in &copy_areas {
            let base = self
                .capture
                .grab(entry.capture)
                .unwrap_or_else(|| placeholder(entry.size.width, entry.size.height));
            let rect = Region::new(
                entry.position.left,
                entry.position.top,
                entry.size.width,
                entry.size.height,
            );
            let snap = self.snap_fn_excluding(&entry.id);
            if let Some(w) = self.windows.get_mut(&entry.id) {
                w.handle.enable_positioning(base, rect, snap);
            }
        }
    }

    /// Leave positioning mode, optionally persisting the dragged geometry
    /// back through the library.
    pub fn disable_positioning_mode(&mut self, save: bool) {
        if !self.positioning {
            return;
        }
        for (id, w) in self.windows.iter_mut() {
            if !w.handle.is_positioning() {
                continue;
            }
            if save {
                let rect = w.handle.geometry();
                let ok = self.library.update_geometry(
                    id,
                    w.kind,
                    GeometryPatch {
                        left: rect.left,
                        top: rect.top,
                        width: rect.width,
                        height: rect.height,
                    },
                );
                if !ok {
                    tracing::warn!("failed to persist geometry for {id}");
                }
            }
            w.handle.disable_positioning();
            w.handle.hide();
        }
        self.positioning = false;
        self.prev_visible.clear();
        if save {
            self.reload();
        }
    }

    pub fn close(&mut self) {
        for (_, mut w) in self.windows.drain() {
            w.handle.close();
        }
        self.capture.close();
    }
}

fn placeholder(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_pixel(w.max(1), h.max(1), image::Rgba([80, 80, 80, 255]))
}

fn icon_base_image(entry: &IconEntry) -> RgbaImage {
    let base = match image::open(&entry.image_path) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            tracing::debug!("no base image for {}: {e}", entry.id);
            return placeholder(entry.size.width, entry.size.height);
        }
    };
    image::imageops::resize(
        &base,
        entry.size.width.max(1),
        entry.size.height.max(1),
        image::imageops::FilterType::Triangle,
    )
}

/// Crop the matched rectangle (plus the entry's extra bottom rows) out of the
/// ROI frame and scale it to the entry's configured size.
fn render_icon(frame: &RgbaImage, m: &MatchResult, entry: &IconEntry) -> (RgbaImage, Region) {
    let crop_h = (m.h + entry.extend_bottom).min(frame.height().saturating_sub(m.y));
    let crop_w = m.w.min(frame.width().saturating_sub(m.x));
    let crop = image::imageops::crop_imm(frame, m.x, m.y, crop_w.max(1), crop_h.max(1)).to_image();

    let out_w = entry.size.width.max(1);
    // Extension rows are added to the configured height, not scaled into it.
    let out_h = (entry.size.height + entry.extend_bottom).max(1);
    let img = image::imageops::resize(&crop, out_w, out_h, image::imageops::FilterType::Triangle);
    let rect = Region::new(entry.position.left, entry.position.top, out_w, out_h);
    (img, rect)
}

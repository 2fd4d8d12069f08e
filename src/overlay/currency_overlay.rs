use std::collections::HashMap;

use crate::capture::{Capture, Region};
use crate::currency::{CurrencyBook, CurrencyData};
use crate::overlay::snap::Snapper;
use crate::overlay::window::{MirrorFactory, MirrorHandle, SnapFn};

/// Hotkey-toggled mirrors of the configured currency counters. Unlike the
/// detection mirrors these re-capture their regions every tick while shown.
pub struct CurrencyOverlay {
    book: CurrencyBook,
    factory: MirrorFactory,
    capture: Box<dyn Capture>,
    snapper: Snapper,
    windows: HashMap<String, Box<dyn MirrorHandle>>,
    data: CurrencyData,
    shown: bool,
    positioning: bool,
}

impl CurrencyOverlay {
    pub fn new(
        book: CurrencyBook,
        factory: MirrorFactory,
        capture: Box<dyn Capture>,
        snapper: Snapper,
    ) -> Self {
        let data = book.load();
        Self {
            book,
            factory,
            capture,
            snapper,
            windows: HashMap::new(),
            data,
            shown: false,
            positioning: false,
        }
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn is_positioning(&self) -> bool {
        self.positioning
    }

    pub fn reload(&mut self) {
        self.data = self.book.load();
        let stale: Vec<String> = self
            .windows
            .keys()
            .filter(|id| !self.data.currencies.iter().any(|c| &c.id == *id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(mut w) = self.windows.remove(&id) {
                w.close();
            }
        }
    }

    pub fn toggle(&mut self) {
        if self.positioning {
            return;
        }
        self.shown = !self.shown;
        tracing::info!("currency overlay {}", if self.shown { "on" } else { "off" });
        if !self.shown {
            for w in self.windows.values_mut() {
                w.hide();
            }
        }
    }

    fn rect_for(&self, id: &str, capture: Region) -> Region {
        let pos = self.data.positions.get(id);
        Region::new(
            pos.map_or(capture.left, |p| p.left),
            pos.map_or(capture.top, |p| p.top),
            capture.width,
            capture.height,
        )
    }

    /// Refresh the shown windows from the screen. No-op while hidden or
    /// positioning.
    pub fn tick(&mut self) {
        if !self.shown || self.positioning {
            return;
        }
        let entries: Vec<_> = self
            .data
            .currencies
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect();
        for entry in entries {
            let grabbed = self.capture.grab(entry.capture);
            let rect = self.rect_for(&entry.id, entry.capture);
            let w = self
                .windows
                .entry(entry.id.clone())
                .or_insert_with(|| (self.factory)());
            if w.is_hovered() {
                continue;
            }
            let Some(img) = grabbed else {
                continue;
            };
            w.show(rect, 1.0, true);
            w.update_image(&img);
        }
    }

    pub fn poll_hover(&mut self, cursor: (i32, i32)) {
        for w in self.windows.values_mut() {
            w.poll_hover(cursor);
        }
    }

    fn snap_fn_excluding(&self, id: &str) -> SnapFn {
        let probes: Vec<_> = self
            .windows
            .iter()
            .filter(|(other, _)| other.as_str() != id)
            .map(|(_, w)| w.rect_probe())
            .collect();
        let snapper = self.snapper;
        Box::new(move |x, y, w, h| {
            let siblings: Vec<Region> = probes.iter().filter_map(|p| p()).collect();
            snapper.snap(x, y, w, h, &siblings)
        })
    }

    pub fn enable_positioning_mode(&mut self) {
        if self.positioning {
            return;
        }
        self.reload();
        self.positioning = true;
        let entries: Vec<_> = self
            .data
            .currencies
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect();
        for entry in &entries {
            self.windows
                .entry(entry.id.clone())
                .or_insert_with(|| (self.factory)());
        }
        for entry in &entries {
            let base = self.capture.grab(entry.capture).unwrap_or_else(|| {
                image::RgbaImage::from_pixel(
                    entry.capture.width.max(1),
                    entry.capture.height.max(1),
                    image::Rgba([80, 80, 80, 255]),
                )
            });
            let rect = self.rect_for(&entry.id, entry.capture);
            let snap = self.snap_fn_excluding(&entry.id);
            if let Some(w) = self.windows.get_mut(&entry.id) {
                w.enable_positioning(base, rect, snap);
            }
        }
    }

    pub fn disable_positioning_mode(&mut self, save: bool) {
        if !self.positioning {
            return;
        }
        for (id, w) in self.windows.iter_mut() {
            if !w.is_positioning() {
                continue;
            }
            if save {
                let rect = w.geometry();
                if !self.book.update_position(id, rect.left, rect.top) {
                    tracing::warn!("failed to persist currency position for {id}");
                }
            }
            w.disable_positioning();
            w.hide();
        }
        self.positioning = false;
        if save {
            self.reload();
        }
    }

    pub fn hide_all(&mut self) {
        if self.positioning {
            return;
        }
        for w in self.windows.values_mut() {
            if !w.is_hovered() {
                w.hide();
            }
        }
    }

    pub fn close(&mut self) {
        for (_, mut w) in self.windows.drain() {
            w.close();
        }
        self.capture.close();
    }
}

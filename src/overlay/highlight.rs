use image::{Rgba, RgbaImage};

use crate::capture::Region;
use crate::overlay::window::{MirrorFactory, MirrorHandle};

const BORDER_PX: u32 = 3;
const HIGHLIGHT_OPACITY: f32 = 0.35;

/// Translucent topmost frame outlining the capture ROI. The user toggles it;
/// the focus policy can force it off without forgetting the user's choice.
pub struct RoiHighlight {
    window: Box<dyn MirrorHandle>,
    roi: Region,
    wanted: bool,
    suppressed: bool,
}

impl RoiHighlight {
    pub fn new(factory: &MirrorFactory, roi: Region) -> Self {
        Self {
            window: factory(),
            roi,
            wanted: false,
            suppressed: false,
        }
    }

    pub fn is_shown(&self) -> bool {
        self.wanted && !self.suppressed
    }

    pub fn set_region(&mut self, roi: Region) {
        self.roi = roi;
        self.apply();
    }

    pub fn toggle(&mut self) {
        self.wanted = !self.wanted;
        self.apply();
    }

    /// Force-hide while the focus policy is inactive; the wanted flag is
    /// untouched so the highlight returns when focus does.
    pub fn suppress(&mut self, on: bool) {
        if self.suppressed != on {
            self.suppressed = on;
            self.apply();
        }
    }

    fn apply(&mut self) {
        if self.is_shown() && self.roi.width > 0 && self.roi.height > 0 {
            self.window.show(self.roi, HIGHLIGHT_OPACITY, true);
            self.window
                .update_image(&border_image(self.roi.width, self.roi.height));
        } else {
            self.window.hide();
        }
    }

    pub fn close(&mut self) {
        self.window.close();
    }
}

fn border_image(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        let edge = x < BORDER_PX || y < BORDER_PX || x >= w - BORDER_PX || y >= h - BORDER_PX;
        if edge {
            Rgba([255, 64, 64, 255])
        } else {
            Rgba([20, 20, 20, 255])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::window::HeadlessMirror;

    fn factory() -> MirrorFactory {
        std::sync::Arc::new(|| Box::new(HeadlessMirror::new()) as Box<dyn MirrorHandle>)
    }

    #[test]
    fn suppression_keeps_user_intent() {
        let f = factory();
        let mut hl = RoiHighlight::new(&f, Region::new(100, 0, 200, 80));
        hl.toggle();
        assert!(hl.is_shown());
        hl.suppress(true);
        assert!(!hl.is_shown());
        hl.suppress(false);
        assert!(hl.is_shown());
    }

    #[test]
    fn border_image_marks_edges_only() {
        let img = border_image(20, 10);
        assert_eq!(img.get_pixel(0, 0).0, [255, 64, 64, 255]);
        assert_eq!(img.get_pixel(10, 5).0, [20, 20, 20, 255]);
        assert_eq!(img.get_pixel(19, 9).0, [255, 64, 64, 255]);
    }
}

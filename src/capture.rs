use image::RgbaImage;
use screenshots::Screen;

/// Rectangle in absolute screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height as i32
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }
}

/// Screen capture backend. Any failure yields `None`; callers treat a missing
/// frame as "nothing this tick" and carry on.
pub trait Capture {
    fn grab(&mut self, region: Region) -> Option<RgbaImage>;

    fn close(&mut self) {}
}

/// Capture provider backed by the `screenshots` crate.
pub struct ScreenGrabber;

impl ScreenGrabber {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ScreenGrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl Capture for ScreenGrabber {
    fn grab(&mut self, region: Region) -> Option<RgbaImage> {
        if region.width == 0 || region.height == 0 {
            return None;
        }
        let screen = match Screen::from_point(region.left, region.top) {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!("no screen at ({}, {}): {e}", region.left, region.top);
                return None;
            }
        };
        match screen.capture_area(
            region.left - screen.display_info.x,
            region.top - screen.display_info.y,
            region.width,
            region.height,
        ) {
            Ok(img) => Some(img),
            Err(e) => {
                tracing::debug!("capture failed for {region:?}: {e}");
                None
            }
        }
    }
}

/// Size of the primary display in pixels. Falls back to 1920x1080 when no
/// display can be queried (headless CI).
pub fn primary_screen_size() -> (u32, u32) {
    match Screen::from_point(0, 0) {
        Ok(screen) => (screen.display_info.width, screen.display_info.height),
        Err(_) => (1920, 1080),
    }
}

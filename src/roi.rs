use crate::capture::Region;
use crate::settings::{RoiConfig, RoiMode};

/// Resolve the configured ROI against the current screen size.
///
/// `top_right` pins the rectangle to the top-right corner; `absolute` uses the
/// stored coordinates. Either way the rectangle is clamped to the screen.
pub fn compute_roi(cfg: &RoiConfig, screen_w: u32, screen_h: u32) -> Region {
    let width = cfg.width.min(screen_w);
    let height = cfg.height.min(screen_h);

    let (left, top) = match cfg.mode {
        RoiMode::TopRight => ((screen_w - width) as i32, cfg.top.max(0)),
        RoiMode::Absolute => (cfg.left.max(0), cfg.top.max(0)),
    };

    Region::new(left, top, width, height)
}

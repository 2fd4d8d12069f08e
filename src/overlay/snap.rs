use crate::capture::Region;

/// Grid-and-edge snapping for draggable overlay windows.
///
/// Coordinates are rounded to the grid first, then magnetised against every
/// sibling edge within the threshold. When several siblings are in range the
/// last one wins.
#[derive(Debug, Clone, Copy)]
pub struct Snapper {
    grid: i32,
    threshold: i32,
}

impl Snapper {
    pub fn new(grid: i32, threshold: i32) -> Self {
        Self {
            grid: grid.max(1),
            threshold: threshold.max(0),
        }
    }

    fn round_to_grid(&self, v: i32) -> i32 {
        let grid = self.grid;
        let rem = v.rem_euclid(grid);
        if rem * 2 >= grid {
            v + (grid - rem)
        } else {
            v - rem
        }
    }

    /// Snap a proposed window position against the given sibling rectangles.
    pub fn snap(&self, x: i32, y: i32, w: i32, h: i32, siblings: &[Region]) -> (i32, i32) {
        let mut sx = self.round_to_grid(x);
        let mut sy = self.round_to_grid(y);

        for r in siblings {
            // Left and right edges against the sibling's vertical edges.
            for target in [r.left, r.right()] {
                if (sx - target).abs() <= self.threshold {
                    sx = target;
                }
                if ((sx + w) - target).abs() <= self.threshold {
                    sx = target - w;
                }
            }
            // Top and bottom edges against the sibling's horizontal edges.
            for target in [r.top, r.bottom()] {
                if (sy - target).abs() <= self.threshold {
                    sy = target;
                }
                if ((sy + h) - target).abs() <= self.threshold {
                    sy = target - h;
                }
            }
        }

        (sx, sy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_grid_when_no_siblings() {
        let s = Snapper::new(16, 8);
        assert_eq!(s.snap(30, 33, 64, 64, &[]), (32, 32));
        assert_eq!(s.snap(7, 25, 64, 64, &[]), (0, 32));
    }

    #[test]
    fn magnetises_to_sibling_edge_within_threshold() {
        let s = Snapper::new(16, 8);
        let sibling = Region::new(100, 0, 50, 50);
        // grid-rounded x = 96; sibling left edge 100 is within 8
        let (x, _) = s.snap(97, 0, 64, 64, &[sibling]);
        assert_eq!(x, 100);
    }

    #[test]
    fn right_edge_snaps_to_sibling_left() {
        let s = Snapper::new(16, 8);
        let sibling = Region::new(160, 0, 50, 50);
        // grid-rounded x = 96, right edge 96+64=160 hits sibling's left
        let (x, _) = s.snap(100, 0, 64, 64, &[sibling]);
        assert_eq!(x, 96);
    }

    #[test]
    fn last_sibling_wins() {
        let s = Snapper::new(1, 8);
        let a = Region::new(100, 0, 10, 10);
        let b = Region::new(104, 0, 10, 10);
        let (x, _) = s.snap(101, 50, 20, 20, &[a, b]);
        assert_eq!(x, 104);
    }

    #[test]
    fn idempotent_once_snapped() {
        let s = Snapper::new(16, 8);
        let sibling = Region::new(100, 40, 50, 50);
        let first = s.snap(97, 38, 64, 64, &[sibling]);
        let again = s.snap(first.0, first.1, 64, 64, &[sibling]);
        assert_eq!(first, again);
    }
}

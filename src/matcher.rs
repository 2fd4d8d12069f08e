use std::path::PathBuf;
use std::sync::Arc;

use image::GrayImage;
use thiserror::Error;

use crate::library::Library;
use crate::template::{load_template_dir, Template, MIN_TEMPLATE_VARIANCE};

/// Frame-patch variance below this counts as flat; correlating against a flat
/// patch would divide by ~zero.
const MIN_FRAME_VARIANCE: f32 = 1e-8;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("template {id} ({tpl_w}x{tpl_h}) larger than frame ({frame_w}x{frame_h})")]
    TemplateLargerThanFrame {
        id: String,
        tpl_w: u32,
        tpl_h: u32,
        frame_w: u32,
        frame_h: u32,
    },
    #[error("template {id} has no intensity variance")]
    FlatTemplate { id: String },
}

/// Best-scoring alignment of one template inside the ROI frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub id: String,
    pub score: f32,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Normalized cross-correlation of `tpl` over the full frame, returning the
/// global peak `(x, y, score)`. Running sums over each candidate window keep
/// the inner loop to one pass per alignment.
pub fn zncc_peak(frame: &GrayImage, tpl: &Template) -> Result<(u32, u32, f32), MatchError> {
    let (frame_w, frame_h) = frame.dimensions();
    if tpl.width > frame_w || tpl.height > frame_h {
        return Err(MatchError::TemplateLargerThanFrame {
            id: tpl.id.clone(),
            tpl_w: tpl.width,
            tpl_h: tpl.height,
            frame_w,
            frame_h,
        });
    }
    let var_t = tpl.var_t();
    if var_t <= MIN_TEMPLATE_VARIANCE {
        return Err(MatchError::FlatTemplate {
            id: tpl.id.clone(),
        });
    }

    let data = frame.as_raw();
    let stride = frame_w as usize;
    let tpl_w = tpl.width as usize;
    let tpl_h = tpl.height as usize;
    let t_prime = tpl.t_prime();
    let n = (tpl_w * tpl_h) as f32;

    let mut best = (0u32, 0u32, f32::NEG_INFINITY);
    for y in 0..=(frame_h as usize - tpl_h) {
        for x in 0..=(frame_w as usize - tpl_w) {
            let mut dot = 0.0f32;
            let mut sum_i = 0.0f32;
            let mut sum_i2 = 0.0f32;

            for ty in 0..tpl_h {
                let row = &data[(y + ty) * stride + x..(y + ty) * stride + x + tpl_w];
                let base = ty * tpl_w;
                for (tx, &px) in row.iter().enumerate() {
                    let value = px as f32;
                    dot += t_prime[base + tx] * value;
                    sum_i += value;
                    sum_i2 += value * value;
                }
            }

            let var_i = sum_i2 - (sum_i * sum_i) / n;
            if var_i <= MIN_FRAME_VARIANCE {
                continue;
            }
            let score = dot / (var_t * var_i).sqrt();
            if score.is_finite() && score > best.2 {
                best = (x as u32, y as u32, score);
            }
        }
    }

    Ok(best)
}

/// Where a matcher's template set comes from on (re)load.
pub trait TemplateSource {
    fn load(&self) -> Vec<Template>;
}

/// Built-in templates: every image in a directory, named by file stem.
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TemplateSource for DirSource {
    fn load(&self) -> Vec<Template> {
        let templates = load_template_dir(&self.dir);
        tracing::info!(
            "loaded {} template(s) from {}",
            templates.len(),
            self.dir.display()
        );
        templates
    }
}

/// Active library buffs/debuffs, keyed by entry id.
pub struct LibrarySource {
    library: Arc<dyn Library>,
}

impl LibrarySource {
    pub fn new(library: Arc<dyn Library>) -> Self {
        Self { library }
    }
}

impl TemplateSource for LibrarySource {
    fn load(&self) -> Vec<Template> {
        let data = self.library.load();
        data.icons()
            .filter(|(entry, _)| entry.active && !entry.image_path.is_empty())
            .filter_map(|(entry, _)| {
                Template::from_path(&entry.id, std::path::Path::new(&entry.image_path))
            })
            .collect()
    }
}

/// Peak-only template matcher with a single shared threshold.
///
/// The template set is swapped wholesale on `refresh`, never mutated in
/// place, so a set observed at the start of a scan stays coherent for the
/// whole scan.
pub struct Matcher<S> {
    source: S,
    threshold: f32,
    templates: Arc<Vec<Template>>,
}

pub type TemplateMatcher = Matcher<DirSource>;
pub type LibraryMatcher = Matcher<LibrarySource>;

impl<S: TemplateSource> Matcher<S> {
    pub fn new(source: S, threshold: f32) -> Self {
        let templates = Arc::new(source.load());
        Self {
            source,
            threshold,
            templates,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Discard the current set and reload from the source.
    pub fn refresh(&mut self) {
        self.templates = Arc::new(self.source.load());
        tracing::debug!("matcher refreshed: {} template(s)", self.templates.len());
    }

    /// Correlate every template against the frame and report those whose
    /// peak clears the threshold. A template that cannot be correlated is
    /// skipped; it must never abort the rest of the scan.
    pub fn find_matches(&mut self, frame: &GrayImage) -> Vec<MatchResult> {
        if self.templates.is_empty() {
            // The library may have finished loading after this matcher was
            // constructed; give it one chance before reporting nothing.
            self.refresh();
        }
        let templates = Arc::clone(&self.templates);
        let mut results = Vec::new();
        for tpl in templates.iter() {
            match zncc_peak(frame, tpl) {
                Ok((x, y, score)) => {
                    if score >= self.threshold {
                        results.push(MatchResult {
                            id: tpl.id.clone(),
                            score,
                            x,
                            y,
                            w: tpl.width,
                            h: tpl.height,
                        });
                    }
                }
                Err(e) => {
                    tracing::debug!("skipping template: {e}");
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn textured(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 7 + y * 13) % 251) as u8]))
    }

    struct FixedSource(Vec<Template>);

    impl TemplateSource for FixedSource {
        fn load(&self) -> Vec<Template> {
            self.0.clone()
        }
    }

    #[test]
    fn exact_copy_peaks_at_its_offset() {
        // Textured patch on a flat background so the template occurs exactly
        // once in the frame.
        let mut frame = GrayImage::from_pixel(64, 48, Luma([90]));
        image::imageops::replace(&mut frame, &textured(16, 16), 20, 10);
        let tpl_img = image::imageops::crop_imm(&frame, 20, 10, 16, 16).to_image();
        let tpl = Template::from_gray("icon", &tpl_img);
        let (x, y, score) = zncc_peak(&frame, &tpl).unwrap();
        assert_eq!((x, y), (20, 10));
        assert!(score > 0.99);
    }

    #[test]
    fn oversized_template_errors() {
        let frame = textured(8, 8);
        let tpl = Template::from_gray("big", &textured(16, 16));
        assert!(matches!(
            zncc_peak(&frame, &tpl),
            Err(MatchError::TemplateLargerThanFrame { .. })
        ));
    }

    #[test]
    fn flat_template_errors() {
        let frame = textured(32, 32);
        let tpl = Template::from_gray("flat", &GrayImage::from_pixel(8, 8, Luma([9])));
        assert!(matches!(
            zncc_peak(&frame, &tpl),
            Err(MatchError::FlatTemplate { .. })
        ));
    }

    #[test]
    fn malformed_template_does_not_poison_the_scan() {
        let mut frame = GrayImage::from_pixel(64, 48, Luma([90]));
        image::imageops::replace(&mut frame, &textured(12, 12), 5, 5);
        let good_img = image::imageops::crop_imm(&frame, 5, 5, 12, 12).to_image();
        let matcher_templates = vec![
            Template::from_gray("flat", &GrayImage::from_pixel(8, 8, Luma([0]))),
            Template::from_gray("good", &good_img),
        ];
        let mut matcher = Matcher::new(FixedSource(matcher_templates), 0.9);
        let results = matcher.find_matches(&frame);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "good");
        assert_eq!((results[0].x, results[0].y), (5, 5));
    }

    #[test]
    fn at_most_one_result_per_template() {
        // Two identical copies of the template; only the global peak reports.
        let tpl_img = textured(8, 8);
        let mut frame = GrayImage::from_pixel(64, 24, Luma([128]));
        image::imageops::replace(&mut frame, &tpl_img, 4, 4);
        image::imageops::replace(&mut frame, &tpl_img, 40, 4);
        let tpl = Template::from_gray("twin", &tpl_img);
        let mut matcher = Matcher::new(FixedSource(vec![tpl]), 0.9);
        let results = matcher.find_matches(&frame);
        assert_eq!(results.len(), 1);
    }
}

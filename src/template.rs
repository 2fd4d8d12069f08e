use std::path::{Path, PathBuf};

use image::GrayImage;

/// Variance below this is considered flat; a flat template has no usable
/// correlation signal and is skipped at match time.
pub const MIN_TEMPLATE_VARIANCE: f32 = 1e-8;

/// A reference icon in single-channel intensity form, with the zero-mean
/// pixel values and variance precomputed once at load so the per-tick scan
/// only accumulates running sums over the frame.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub width: u32,
    pub height: u32,
    gray: Vec<u8>,
    t_prime: Vec<f32>,
    var_t: f32,
}

impl Template {
    pub fn from_gray(id: impl Into<String>, img: &GrayImage) -> Self {
        let (width, height) = img.dimensions();
        let gray: Vec<u8> = img.as_raw().clone();
        let n = gray.len() as f32;
        let mean = gray.iter().map(|&v| v as f32).sum::<f32>() / n;
        let t_prime: Vec<f32> = gray.iter().map(|&v| v as f32 - mean).collect();
        let var_t = t_prime.iter().map(|v| v * v).sum::<f32>();
        Self {
            id: id.into(),
            width,
            height,
            gray,
            t_prime,
            var_t,
        }
    }

    /// Load a template image from disk, converting to intensity.
    pub fn from_path(id: impl Into<String>, path: &Path) -> Option<Self> {
        let img = match image::open(path) {
            Ok(img) => img.to_luma8(),
            Err(e) => {
                tracing::warn!("failed to decode template {}: {e}", path.display());
                return None;
            }
        };
        if img.width() == 0 || img.height() == 0 {
            tracing::warn!("empty template image {}", path.display());
            return None;
        }
        Some(Self::from_gray(id, &img))
    }

    pub fn gray(&self) -> &[u8] {
        &self.gray
    }

    pub fn t_prime(&self) -> &[f32] {
        &self.t_prime
    }

    pub fn var_t(&self) -> f32 {
        self.var_t
    }
}

/// Load every `.png`/`.jpg`/`.jpeg` in a directory as a template named after
/// its file stem. Undecodable files are skipped with a warning.
pub fn load_template_dir(dir: &Path) -> Vec<Template> {
    let mut templates = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return templates,
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase),
                Some(ref ext) if ext == "png" || ext == "jpg" || ext == "jpeg"
            )
        })
        .collect();
    paths.sort();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(tpl) = Template::from_path(stem, &path) {
            templates.push(tpl);
        }
    }
    templates
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn precompute_is_zero_mean() {
        let img = GrayImage::from_fn(4, 4, |x, y| Luma([(x * 16 + y) as u8]));
        let tpl = Template::from_gray("t", &img);
        let sum: f32 = tpl.t_prime().iter().sum();
        assert!(sum.abs() < 1e-3);
        assert!(tpl.var_t() > 0.0);
    }

    #[test]
    fn flat_template_has_no_variance() {
        let img = GrayImage::from_pixel(8, 8, Luma([127]));
        let tpl = Template::from_gray("flat", &img);
        assert!(tpl.var_t() <= MIN_TEMPLATE_VARIANCE);
    }
}

use buff_mirror::matcher::{DirSource, Matcher};
use image::{GrayImage, Luma, RgbaImage};

fn textured_rgba(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        let v = ((x * 31 + y * 17) % 239) as u8;
        image::Rgba([v, v, v, 255])
    })
}

fn to_gray(img: &RgbaImage) -> GrayImage {
    image::imageops::grayscale(img)
}

/// 32x32 icon at (50, 60) inside a 400x180 capture, threshold 0.9.
#[test]
fn detects_icon_at_known_offset_in_roi_frame() {
    let dir = tempfile::tempdir().unwrap();
    let icon = textured_rgba(32, 32);
    icon.save(dir.path().join("regen.png")).unwrap();

    let mut frame = RgbaImage::from_pixel(400, 180, image::Rgba([40, 40, 40, 255]));
    image::imageops::replace(&mut frame, &icon, 50, 60);

    let mut matcher = Matcher::new(DirSource::new(dir.path()), 0.9);
    let results = matcher.find_matches(&to_gray(&frame));

    assert_eq!(results.len(), 1);
    let m = &results[0];
    assert_eq!(m.id, "regen");
    assert_eq!((m.x, m.y), (50, 60));
    assert_eq!((m.w, m.h), (32, 32));
    assert!(m.score > 0.99);
}

#[test]
fn absent_icon_scores_below_threshold() {
    let dir = tempfile::tempdir().unwrap();
    textured_rgba(32, 32).save(dir.path().join("regen.png")).unwrap();

    // A frame with unrelated texture; the peak exists but is weak.
    let frame = RgbaImage::from_fn(400, 180, |x, y| {
        let v = if (x / 4 + y / 4) % 2 == 0 { 230 } else { 10 };
        image::Rgba([v, v, v, 255])
    });

    let mut matcher = Matcher::new(DirSource::new(dir.path()), 0.9);
    assert!(matcher.find_matches(&to_gray(&frame)).is_empty());
}

#[test]
fn refresh_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    textured_rgba(16, 16).save(dir.path().join("a.png")).unwrap();
    textured_rgba(16, 16).save(dir.path().join("b.png")).unwrap();

    let mut matcher = Matcher::new(DirSource::new(dir.path()), 0.9);
    assert_eq!(matcher.templates().len(), 2);
    matcher.refresh();
    matcher.refresh();
    assert_eq!(matcher.templates().len(), 2);
}

#[test]
fn refresh_picks_up_new_templates() {
    let dir = tempfile::tempdir().unwrap();
    let mut matcher = Matcher::new(DirSource::new(dir.path()), 0.9);
    assert!(matcher.templates().is_empty());

    let icon = textured_rgba(24, 24);
    icon.save(dir.path().join("swift.png")).unwrap();

    // Empty set triggers an implicit refresh on the next match call.
    let mut frame = RgbaImage::from_pixel(200, 100, image::Rgba([40, 40, 40, 255]));
    image::imageops::replace(&mut frame, &icon, 10, 20);
    let results = matcher.find_matches(&to_gray(&frame));
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "swift");
}

#[test]
fn undecodable_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
    textured_rgba(16, 16).save(dir.path().join("ok.png")).unwrap();

    let matcher = Matcher::new(DirSource::new(dir.path()), 0.9);
    assert_eq!(matcher.templates().len(), 1);
    assert_eq!(matcher.templates()[0].id, "ok");
}

#[test]
fn flat_gray_frame_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    textured_rgba(16, 16).save(dir.path().join("a.png")).unwrap();

    let mut matcher = Matcher::new(DirSource::new(dir.path()), 0.9);
    let frame = GrayImage::from_pixel(100, 100, Luma([128]));
    assert!(matcher.find_matches(&frame).is_empty());
}

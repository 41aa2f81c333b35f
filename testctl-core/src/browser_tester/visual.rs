use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, GenericImageView};

use super::error::BrowserResult;

const NORMALIZED_SIZE: u32 = 224;

/// Outcome of comparing a fresh screenshot against a stored baseline for a
/// given `page_url`. `diff_ratio` is `None` on the first run, when the
/// screenshot itself becomes the new baseline.
pub struct VisualComparison {
    pub diff_ratio: Option<f64>,
    pub baseline_created: bool,
}

/// Compares `current_png` against the baseline stored for `key` under
/// `baseline_dir`, writing a fresh baseline if none exists yet. On mismatch
/// (`diff_ratio > threshold`) the current screenshot is also persisted
/// alongside the baseline as `{key}.diff.png` for evidence.
pub fn compare_against_baseline(
    baseline_dir: &Path,
    key: &str,
    current_png: &[u8],
    threshold: f64,
) -> BrowserResult<VisualComparison> {
    std::fs::create_dir_all(baseline_dir)?;
    let baseline_path = baseline_dir.join(format!("{key}.png"));

    if !baseline_path.exists() {
        std::fs::write(&baseline_path, current_png)?;
        return Ok(VisualComparison {
            diff_ratio: None,
            baseline_created: true,
        });
    }

    let baseline_bytes = std::fs::read(&baseline_path)?;
    let ratio = luma_diff_ratio(&baseline_bytes, current_png)?;
    if ratio > threshold {
        let diff_path = diff_path_for(baseline_dir, key);
        std::fs::write(diff_path, current_png)?;
    }
    Ok(VisualComparison {
        diff_ratio: Some(ratio),
        baseline_created: false,
    })
}

fn diff_path_for(baseline_dir: &Path, key: &str) -> PathBuf {
    baseline_dir.join(format!("{key}.diff.png"))
}

/// Per-pixel luma-difference ratio, computed over both images down-scaled
/// to a common `NORMALIZED_SIZE x NORMALIZED_SIZE` grid so screenshots of
/// differing viewport sizes remain comparable. Alpha is ignored.
pub fn luma_diff_ratio(a_bytes: &[u8], b_bytes: &[u8]) -> BrowserResult<f64> {
    let a = image::load(Cursor::new(a_bytes), image::ImageFormat::Png)?
        .resize_exact(NORMALIZED_SIZE, NORMALIZED_SIZE, FilterType::Triangle)
        .to_luma8();
    let b = image::load(Cursor::new(b_bytes), image::ImageFormat::Png)?
        .resize_exact(NORMALIZED_SIZE, NORMALIZED_SIZE, FilterType::Triangle)
        .to_luma8();

    let mut total_diff: u64 = 0;
    let pixel_count = (NORMALIZED_SIZE * NORMALIZED_SIZE) as u64;
    for (pixel_a, pixel_b) in a.pixels().zip(b.pixels()) {
        total_diff += (pixel_a[0] as i32 - pixel_b[0] as i32).unsigned_abs() as u64;
    }
    let max_possible_diff = pixel_count * 255;
    Ok(total_diff as f64 / max_possible_diff as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn solid_png(value: u8) -> Vec<u8> {
        let image: ImageBuffer<Rgba<u8>, _> =
            ImageBuffer::from_fn(32, 32, |_, _| Rgba([value, value, value, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn identical_images_have_zero_diff() {
        let png = solid_png(128);
        let ratio = luma_diff_ratio(&png, &png).unwrap();
        assert!(ratio < 1e-9);
    }

    #[test]
    fn black_vs_white_is_maximal_diff() {
        let ratio = luma_diff_ratio(&solid_png(0), &solid_png(255)).unwrap();
        assert!((ratio - 1.0).abs() < 1e-6);
    }

    #[test]
    fn first_run_creates_baseline_without_a_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let comparison =
            compare_against_baseline(dir.path(), "home", &solid_png(50), 0.1).unwrap();
        assert!(comparison.baseline_created);
        assert!(comparison.diff_ratio.is_none());
    }

    #[test]
    fn second_run_compares_against_stored_baseline() {
        let dir = tempfile::tempdir().unwrap();
        compare_against_baseline(dir.path(), "home", &solid_png(50), 0.1).unwrap();
        let comparison =
            compare_against_baseline(dir.path(), "home", &solid_png(50), 0.1).unwrap();
        assert!(!comparison.baseline_created);
        assert!(comparison.diff_ratio.unwrap() < 1e-9);
    }
}

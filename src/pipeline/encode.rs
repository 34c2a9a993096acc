//! Image preparation for OCR: grayscale, bounded size, optional clean-up,
//! PNG bytes.
//!
//! PNG is lossless, so glyph edges reach the OCR engine intact. Grayscale
//! drops colour noise from yellowed scans and shrinks the payload to roughly
//! a third. Renders larger than `max_edge` on their longest side are
//! downscaled; OCR services reject or silently resample huge images anyway.
//!
//! The [`ImageCleanup`] steps run on the downscaled grayscale image, so their
//! cost is bounded by `max_edge`.

use crate::config::{Binarization, ImageCleanup};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::contrast::{adaptive_threshold, equalize_histogram, otsu_level};
use imageproc::filter::median_filter;
use std::io::Cursor;
use tracing::debug;

/// Mean row/column intensity below which an edge strip counts as scanner
/// border.
const DARK_BORDER_LEVEL: u64 = 80;

/// Convert to 8-bit grayscale, downscale so the longest edge is at most
/// `max_edge` pixels, then apply `cleanup`.
pub fn prepare_for_ocr(img: DynamicImage, max_edge: u32, cleanup: &ImageCleanup) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let longest = w.max(h);
    let img = if longest > max_edge {
        let scale = max_edge as f64 / longest as f64;
        let nw = ((w as f64 * scale).round() as u32).max(1);
        let nh = ((h as f64 * scale).round() as u32).max(1);
        debug!("Downscaling {}x{} → {}x{}", w, h, nw, nh);
        img.resize_exact(nw, nh, FilterType::Lanczos3)
    } else {
        img
    };
    DynamicImage::ImageLuma8(clean_for_ocr(img.to_luma8(), cleanup))
}

/// Run the enabled clean-up steps over a grayscale page.
pub fn clean_for_ocr(mut gray: GrayImage, cleanup: &ImageCleanup) -> GrayImage {
    if cleanup.trim_border {
        gray = trim_dark_border(gray);
    }
    if cleanup.denoise {
        gray = median_filter(&gray, 1, 1);
    }
    if cleanup.equalize {
        gray = equalize_histogram(&gray);
    }
    match cleanup.binarize {
        Binarization::Off => gray,
        Binarization::Otsu => {
            let level = otsu_level(&gray);
            debug!("Otsu threshold {}", level);
            for p in gray.pixels_mut() {
                p.0[0] = if p.0[0] > level { 255 } else { 0 };
            }
            gray
        }
        Binarization::Adaptive { block_radius } => adaptive_threshold(&gray, block_radius),
    }
}

fn row_mean(gray: &GrayImage, y: u32) -> u64 {
    let w = gray.width() as u64;
    (0..gray.width()).map(|x| gray.get_pixel(x, y).0[0] as u64).sum::<u64>() / w
}

fn column_mean(gray: &GrayImage, x: u32) -> u64 {
    let h = gray.height() as u64;
    (0..gray.height()).map(|y| gray.get_pixel(x, y).0[0] as u64).sum::<u64>() / h
}

/// Crop dark strips along the edges, up to a tenth of each dimension per side.
fn trim_dark_border(gray: GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    let (max_x, max_y) = (w / 10, h / 10);

    let mut top = 0;
    while top < max_y && row_mean(&gray, top) < DARK_BORDER_LEVEL {
        top += 1;
    }
    let mut bottom = 0;
    while bottom < max_y && row_mean(&gray, h - 1 - bottom) < DARK_BORDER_LEVEL {
        bottom += 1;
    }
    let mut left = 0;
    while left < max_x && column_mean(&gray, left) < DARK_BORDER_LEVEL {
        left += 1;
    }
    let mut right = 0;
    while right < max_x && column_mean(&gray, w - 1 - right) < DARK_BORDER_LEVEL {
        right += 1;
    }

    if top + bottom + left + right == 0 {
        return gray;
    }
    debug!(top, bottom, left, right, "Trimming scanner border");
    image::imageops::crop_imm(&gray, left, top, w - left - right, h - top - bottom).to_image()
}

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded image → {} bytes PNG", buf.len());
    Ok(buf)
}

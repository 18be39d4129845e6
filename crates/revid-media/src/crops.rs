//! Crop extraction from frame images.

use std::path::Path;

use image::GenericImageView;
use revid_models::BoundingBox;

use crate::error::{MediaError, MediaResult};

/// Crop `bbox` (plus `padding_frac` of its size on each side) out of a frame
/// image and save it as JPEG at `out_path`.
///
/// The crop is clamped to the frame. Returns the bbox actually cropped.
pub fn save_crop(
    frame_path: impl AsRef<Path>,
    bbox: &BoundingBox,
    padding_frac: f64,
    out_path: impl AsRef<Path>,
) -> MediaResult<BoundingBox> {
    let frame_path = frame_path.as_ref();
    let img = image::open(frame_path)?;
    let (img_w, img_h) = img.dimensions();

    let pad_x = bbox.w * padding_frac;
    let pad_y = bbox.h * padding_frac;

    let x1 = (bbox.x - pad_x).max(0.0);
    let y1 = (bbox.y - pad_y).max(0.0);
    let x2 = (bbox.x + bbox.w + pad_x).min(img_w as f64);
    let y2 = (bbox.y + bbox.h + pad_y).min(img_h as f64);

    let w = x2 - x1;
    let h = y2 - y1;
    if w < 1.0 || h < 1.0 {
        return Err(MediaError::internal(format!(
            "crop region degenerate for {}",
            frame_path.display()
        )));
    }

    let crop = img.crop_imm(x1 as u32, y1 as u32, w as u32, h as u32);
    crop.save(out_path.as_ref())?;

    Ok(BoundingBox::new(x1, y1, w, h))
}

/// Read a saved crop back as JPEG bytes, for embedding requests.
pub fn read_image_bytes(path: impl AsRef<Path>) -> MediaResult<Vec<u8>> {
    Ok(std::fs::read(path.as_ref())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_save_crop_clamps_to_frame() {
        let dir = tempfile::tempdir().unwrap();
        let frame_path = dir.path().join("frame.jpg");
        let out_path = dir.path().join("crop.jpg");

        let img = RgbImage::from_pixel(100, 80, Rgb([40, 90, 200]));
        img.save(&frame_path).unwrap();

        // Box hangs off the right edge; with padding it must clamp
        let bbox = BoundingBox::new(80.0, 10.0, 30.0, 30.0);
        let cropped = save_crop(&frame_path, &bbox, 0.1, &out_path).unwrap();

        assert!(cropped.x + cropped.w <= 100.0 + 1e-9);
        assert!(cropped.y + cropped.h <= 80.0 + 1e-9);

        let saved = image::open(&out_path).unwrap();
        assert!(saved.width() >= 1);
    }

    #[test]
    fn test_save_crop_with_padding() {
        let dir = tempfile::tempdir().unwrap();
        let frame_path = dir.path().join("frame.jpg");
        let out_path = dir.path().join("crop.jpg");

        let img = RgbImage::from_pixel(200, 200, Rgb([10, 10, 10]));
        img.save(&frame_path).unwrap();

        let bbox = BoundingBox::new(50.0, 50.0, 40.0, 40.0);
        let cropped = save_crop(&frame_path, &bbox, 0.1, &out_path).unwrap();

        // 10% padding on each side of a 40px box adds 4px each way
        assert!((cropped.x - 46.0).abs() < 1e-9);
        assert!((cropped.w - 48.0).abs() < 1e-9);
    }
}

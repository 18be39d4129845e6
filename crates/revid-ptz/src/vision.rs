//! Image primitives for visual calibration: luminance, corner features, and
//! normalized cross-correlation template matching.
//!
//! These operate on `image` grayscale buffers directly; the calibration
//! loop needs only a handful of frames, so plain per-pixel loops are fine.

use image::GrayImage;

/// Mean luminance of a frame, 0-255.
pub fn mean_luminance(img: &GrayImage) -> f64 {
    if img.is_empty() {
        return 0.0;
    }
    let sum: u64 = img.pixels().map(|p| p.0[0] as u64).sum();
    sum as f64 / (img.width() as u64 * img.height() as u64) as f64
}

/// A detected corner feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: f32,
    pub y: f32,
    /// Shi-Tomasi minimum-eigenvalue response
    pub score: f32,
}

/// Shi-Tomasi corner detection.
///
/// Computes the minimum eigenvalue of the 3x3 structure tensor at every
/// interior pixel, keeps responses above `quality_level` times the maximum,
/// and greedily enforces `min_distance` between accepted corners, strongest
/// first. Returns at most `max_corners`.
pub fn good_features(
    img: &GrayImage,
    max_corners: usize,
    quality_level: f32,
    min_distance: f32,
) -> Vec<Corner> {
    let w = img.width() as i32;
    let h = img.height() as i32;
    if w < 3 || h < 3 {
        return Vec::new();
    }

    let px = |x: i32, y: i32| -> f32 { img.get_pixel(x as u32, y as u32).0[0] as f32 };

    // Sobel gradients
    let mut ix = vec![0.0f32; (w * h) as usize];
    let mut iy = vec![0.0f32; (w * h) as usize];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let gy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            ix[(y * w + x) as usize] = gx;
            iy[(y * w + x) as usize] = gy;
        }
    }

    // Minimum eigenvalue of the structure tensor over a 3x3 window
    let mut responses: Vec<Corner> = Vec::new();
    let mut max_response = 0.0f32;
    for y in 2..h - 2 {
        for x in 2..w - 2 {
            let mut sxx = 0.0f32;
            let mut syy = 0.0f32;
            let mut sxy = 0.0f32;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let idx = ((y + dy) * w + (x + dx)) as usize;
                    sxx += ix[idx] * ix[idx];
                    syy += iy[idx] * iy[idx];
                    sxy += ix[idx] * iy[idx];
                }
            }
            let trace = sxx + syy;
            let det_term = ((sxx - syy).powi(2) + 4.0 * sxy * sxy).sqrt();
            let min_eig = (trace - det_term) / 2.0;
            if min_eig > 0.0 {
                responses.push(Corner {
                    x: x as f32,
                    y: y as f32,
                    score: min_eig,
                });
                max_response = max_response.max(min_eig);
            }
        }
    }

    if max_response <= 0.0 {
        return Vec::new();
    }

    let threshold = quality_level * max_response;
    responses.retain(|c| c.score >= threshold);
    responses.sort_by(|a, b| b.score.total_cmp(&a.score));

    // Greedy spacing, strongest first
    let min_dist_sq = min_distance * min_distance;
    let mut accepted: Vec<Corner> = Vec::new();
    for corner in responses {
        if accepted.len() >= max_corners {
            break;
        }
        let too_close = accepted.iter().any(|a| {
            let dx = a.x - corner.x;
            let dy = a.y - corner.y;
            dx * dx + dy * dy < min_dist_sq
        });
        if !too_close {
            accepted.push(corner);
        }
    }
    accepted
}

/// Extract a square template of `half * 2` pixels around a point, clamped to
/// the image. Returns `None` for degenerate regions.
pub fn extract_template(img: &GrayImage, cx: f32, cy: f32, half: u32) -> Option<GrayImage> {
    let w = img.width();
    let h = img.height();
    let x1 = (cx as i64 - half as i64).max(0) as u32;
    let y1 = (cy as i64 - half as i64).max(0) as u32;
    let x2 = ((cx as i64 + half as i64) as u32).min(w);
    let y2 = ((cy as i64 + half as i64) as u32).min(h);
    if x2 <= x1 + 1 || y2 <= y1 + 1 {
        return None;
    }
    Some(image::imageops::crop_imm(img, x1, y1, x2 - x1, y2 - y1).to_image())
}

/// Best template match location and confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    /// Center of the best match in search-image coordinates
    pub x: f32,
    pub y: f32,
    /// Zero-mean normalized cross-correlation, -1 to 1
    pub confidence: f32,
}

/// Zero-mean normalized cross-correlation template search.
///
/// Slides the template over the search image and returns the best-scoring
/// center. Calibration frames are small and few, so the exhaustive search
/// is acceptable.
pub fn match_template(search: &GrayImage, template: &GrayImage) -> Option<TemplateMatch> {
    let (sw, sh) = (search.width() as i64, search.height() as i64);
    let (tw, th) = (template.width() as i64, template.height() as i64);
    if tw > sw || th > sh || tw == 0 || th == 0 {
        return None;
    }

    let n = (tw * th) as f32;
    let t_mean: f32 = template.pixels().map(|p| p.0[0] as f32).sum::<f32>() / n;
    let t_dev: Vec<f32> = template.pixels().map(|p| p.0[0] as f32 - t_mean).collect();
    let t_norm: f32 = t_dev.iter().map(|v| v * v).sum::<f32>().sqrt();
    if t_norm < 1e-6 {
        return None;
    }

    let mut best: Option<TemplateMatch> = None;
    for oy in 0..=(sh - th) {
        for ox in 0..=(sw - tw) {
            let mut s_sum = 0.0f32;
            for ty in 0..th {
                for tx in 0..tw {
                    s_sum += search.get_pixel((ox + tx) as u32, (oy + ty) as u32).0[0] as f32;
                }
            }
            let s_mean = s_sum / n;

            let mut cross = 0.0f32;
            let mut s_sq = 0.0f32;
            for ty in 0..th {
                for tx in 0..tw {
                    let sv = search.get_pixel((ox + tx) as u32, (oy + ty) as u32).0[0] as f32 - s_mean;
                    cross += sv * t_dev[(ty * tw + tx) as usize];
                    s_sq += sv * sv;
                }
            }
            let s_norm = s_sq.sqrt();
            if s_norm < 1e-6 {
                continue;
            }

            let score = cross / (t_norm * s_norm);
            if best.is_none_or(|b| score > b.confidence) {
                best = Some(TemplateMatch {
                    x: ox as f32 + tw as f32 / 2.0,
                    y: oy as f32 + th as f32 / 2.0,
                    confidence: score,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// A dark frame with one bright square.
    fn frame_with_square(w: u32, h: u32, sq_x: u32, sq_y: u32, sq: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([20]));
        for y in sq_y..(sq_y + sq).min(h) {
            for x in sq_x..(sq_x + sq).min(w) {
                img.put_pixel(x, y, Luma([220]));
            }
        }
        img
    }

    #[test]
    fn test_mean_luminance() {
        let dark = GrayImage::from_pixel(10, 10, Luma([5]));
        assert!(mean_luminance(&dark) < 10.0);
        let bright = GrayImage::from_pixel(10, 10, Luma([200]));
        assert!((mean_luminance(&bright) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_corners_found_on_square() {
        let img = frame_with_square(64, 64, 20, 20, 16);
        let corners = good_features(&img, 20, 0.1, 4.0);
        assert!(corners.len() >= 2);
        // Corners cluster near the square's corners
        let near_square = corners.iter().any(|c| {
            (c.x - 20.0).abs() < 4.0 && (c.y - 20.0).abs() < 4.0
                || (c.x - 36.0).abs() < 4.0 && (c.y - 36.0).abs() < 4.0
        });
        assert!(near_square);
    }

    #[test]
    fn test_no_corners_on_flat_image() {
        let img = GrayImage::from_pixel(32, 32, Luma([128]));
        assert!(good_features(&img, 20, 0.01, 4.0).is_empty());
    }

    #[test]
    fn test_template_relocation() {
        let img = frame_with_square(80, 60, 30, 20, 10);
        let template = extract_template(&img, 35.0, 25.0, 8).unwrap();

        // The square moved 12 px right, 5 px down
        let moved = frame_with_square(80, 60, 42, 25, 10);
        let found = match_template(&moved, &template).unwrap();
        assert!(found.confidence > 0.8);
        assert!((found.x - 47.0).abs() <= 2.0);
        assert!((found.y - 30.0).abs() <= 2.0);
    }

    #[test]
    fn test_template_lost_reports_low_confidence() {
        let img = frame_with_square(80, 60, 30, 20, 10);
        let template = extract_template(&img, 35.0, 25.0, 8).unwrap();

        // Uniform noiseless frame: nothing to match (flat windows skipped)
        let empty = GrayImage::from_pixel(80, 60, Luma([20]));
        let found = match_template(&empty, &template);
        assert!(found.is_none() || found.unwrap().confidence < 0.3);
    }
}

//! Appearance descriptors: HSV color histograms and cached embeddings.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use image::RgbImage;
use revid_models::TrackId;
use tracing::debug;

use crate::error::MatchResult;

/// Hue bins (hue is halved to the 0-180 convention before binning).
const H_BINS: usize = 16;
/// Saturation bins.
const S_BINS: usize = 8;
/// Value bins.
const V_BINS: usize = 4;

/// Convert an RGB pixel to HSV with h in [0, 360), s and v in [0, 1].
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta < 1e-9 {
        0.0
    } else if (max - r).abs() < 1e-9 {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if (max - g).abs() < 1e-9 {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max < 1e-9 { 0.0 } else { delta / max };
    (h, s, max)
}

/// Compute a flattened, L2-normalized HSV histogram (16x8x4 bins) of a crop.
pub fn hsv_histogram(img: &RgbImage) -> Vec<f32> {
    let mut hist = vec![0.0f32; H_BINS * S_BINS * V_BINS];

    for pixel in img.pixels() {
        let (h, s, v) = rgb_to_hsv(pixel.0[0], pixel.0[1], pixel.0[2]);
        // Hue halved to 0-180 to match the usual CV convention
        let h_bin = (((h / 2.0) / 180.0 * H_BINS as f32) as usize).min(H_BINS - 1);
        let s_bin = ((s * S_BINS as f32) as usize).min(S_BINS - 1);
        let v_bin = ((v * V_BINS as f32) as usize).min(V_BINS - 1);
        hist[h_bin * S_BINS * V_BINS + s_bin * V_BINS + v_bin] += 1.0;
    }

    let norm: f32 = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for v in &mut hist {
            *v /= norm;
        }
    }
    hist
}

/// Load a crop from disk and compute its histogram.
pub fn histogram_from_file(path: &Path) -> MatchResult<Vec<f32>> {
    let img = image::open(path)?.to_rgb8();
    Ok(hsv_histogram(&img))
}

/// Pearson correlation between two histograms, in [-1, 1].
pub fn histogram_correlation(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let n = a.len() as f32;
    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let denom = (var_a * var_b).sqrt();
    if denom < 1e-12 {
        return 0.0;
    }
    cov / denom
}

/// Bounded LRU cache of per-track descriptors, held per matcher so repeated
/// pair evaluations do not recompute histograms or re-read crops.
pub struct DescriptorCache {
    capacity: usize,
    histograms: HashMap<TrackId, Option<Vec<f32>>>,
    order: VecDeque<TrackId>,
}

impl DescriptorCache {
    /// Create a cache bounded at `capacity` tracks.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            histograms: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Histogram for a track's crop, computed on first access.
    /// `None` is cached too: a missing crop stays missing for this pass.
    pub fn histogram(&mut self, track_id: TrackId, crop_path: Option<&str>) -> Option<Vec<f32>> {
        if let Some(hist) = self.histograms.get(&track_id).cloned() {
            self.touch(track_id);
            return hist;
        }

        let computed = crop_path.and_then(|p| {
            let path = Path::new(p);
            if !path.is_file() {
                return None;
            }
            match histogram_from_file(path) {
                Ok(h) => Some(h),
                Err(e) => {
                    debug!(track_id, "Histogram computation failed: {e}");
                    None
                }
            }
        });

        self.insert(track_id, computed.clone());
        computed
    }

    fn touch(&mut self, track_id: TrackId) {
        if let Some(pos) = self.order.iter().position(|&id| id == track_id) {
            self.order.remove(pos);
            self.order.push_back(track_id);
        }
    }

    fn insert(&mut self, track_id: TrackId, value: Option<Vec<f32>>) {
        if self.histograms.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.histograms.remove(&evicted);
            }
        }
        self.histograms.insert(track_id, value);
        self.order.push_back(track_id);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    /// True when the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_histogram_is_normalized() {
        let img = RgbImage::from_pixel(32, 32, Rgb([200, 40, 40]));
        let hist = hsv_histogram(&img);
        assert_eq!(hist.len(), H_BINS * S_BINS * V_BINS);
        let norm: f32 = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_same_color_correlates_higher_than_different() {
        let red = hsv_histogram(&RgbImage::from_pixel(32, 32, Rgb([200, 30, 30])));
        let red2 = hsv_histogram(&RgbImage::from_pixel(32, 32, Rgb([190, 35, 35])));
        let blue = hsv_histogram(&RgbImage::from_pixel(32, 32, Rgb([30, 30, 200])));

        let same = histogram_correlation(&red, &red2);
        let diff = histogram_correlation(&red, &blue);
        assert!(same > diff);
        assert!(same > 0.9);
    }

    #[test]
    fn test_cache_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..3 {
            let p = dir.path().join(format!("crop{i}.jpg"));
            RgbImage::from_pixel(8, 8, Rgb([i as u8 * 80, 10, 10])).save(&p).unwrap();
            paths.push(p);
        }

        let mut cache = DescriptorCache::new(2);
        for (i, p) in paths.iter().enumerate() {
            cache.histogram(i as TrackId, Some(p.to_str().unwrap()));
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_missing_crop_cached_as_none() {
        let mut cache = DescriptorCache::new(4);
        assert!(cache.histogram(1, Some("/nonexistent/crop.jpg")).is_none());
        assert!(cache.histogram(1, Some("/nonexistent/crop.jpg")).is_none());
        assert_eq!(cache.len(), 1);
    }
}

use image::GrayImage;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{Desc, DESC_DIM};

/// One comparison bit per point pair.
const BRIEF_BITS: usize = DESC_DIM * 8;

/// Half-size of the square patch sampled around each keypoint.
const PATCH_RADIUS: i32 = 15;

/// Keypoints closer than this to an image edge are dropped; the sampling
/// pattern plus its smoothing window must stay inside the image.
const BORDER: u32 = PATCH_RADIUS as u32;

/// Seed for the point-pair pattern. A detector constant: changing it
/// invalidates every vocabulary and classifier trained with the old pattern.
const PATTERN_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Bresenham circle of radius 3 used by the corner test, clockwise from 12 o'clock.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Minimum contiguous arc length for the segment test.
const FAST_ARC: usize = 9;

/// Detector configuration, frozen between training and inference. The same
/// values must be used on both sides; a vocabulary built from descriptors of
/// one configuration does not transfer to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorParams {
    /// Upper bound on descriptors extracted per image.
    pub max_features: usize,
    /// Minimum absolute intensity difference for a circle pixel to count.
    pub fast_threshold: u8,
}

impl Default for DetectorParams {
    fn default() -> Self {
        DetectorParams {
            max_features: 500,
            fast_threshold: 20,
        }
    }
}

struct Corner {
    x: u32,
    y: u32,
    score: u32,
}

/// Extracts binary keypoint descriptors from encoded image bytes.
///
/// Decode failure is absorbed here: unparseable bytes yield an empty
/// descriptor set, so every downstream stage sees a single "no features"
/// case instead of a separate failure path.
pub struct FeatureExtractor {
    params: DetectorParams,
    pattern: Vec<[i32; 4]>,
}

impl FeatureExtractor {
    pub fn new(params: DetectorParams) -> Self {
        // Point pairs are drawn once from a fixed seed so the pattern is
        // identical in every process that ever touches the same artifacts.
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let spread = PATCH_RADIUS - 2;
        let pattern = (0..BRIEF_BITS)
            .map(|_| {
                [
                    rng.gen_range(-spread..=spread),
                    rng.gen_range(-spread..=spread),
                    rng.gen_range(-spread..=spread),
                    rng.gen_range(-spread..=spread),
                ]
            })
            .collect();
        FeatureExtractor { params, pattern }
    }

    pub fn params(&self) -> DetectorParams {
        self.params
    }

    /// Extract descriptors from encoded image bytes (PNG, JPEG, ...).
    ///
    /// Returns an empty set when the bytes do not decode. Pure function of
    /// the image content; extraction never fails.
    pub fn extract(&self, image_bytes: &[u8]) -> Vec<Desc> {
        let gray = match image::load_from_memory(image_bytes) {
            Ok(img) => img.to_luma8(),
            Err(e) => {
                log::debug!("image decode failed: {}", e);
                return Vec::new();
            }
        };
        self.extract_gray(&gray)
    }

    /// Extract descriptors from an already-decoded grayscale image.
    pub fn extract_gray(&self, gray: &GrayImage) -> Vec<Desc> {
        let (width, height) = gray.dimensions();
        if width <= 2 * BORDER || height <= 2 * BORDER {
            return Vec::new();
        }

        let mut corners = fast_corners(gray, self.params.fast_threshold);
        corners.retain(|c| {
            c.x >= BORDER && c.x < width - BORDER && c.y >= BORDER && c.y < height - BORDER
        });

        // Strongest first; (y, x) makes the order total so equal scores
        // never reorder between runs.
        corners.sort_unstable_by(|a, b| {
            b.score.cmp(&a.score).then(a.y.cmp(&b.y)).then(a.x.cmp(&b.x))
        });
        corners.truncate(self.params.max_features);

        let data = gray.as_raw();
        corners
            .iter()
            .map(|c| self.describe(data, width as usize, c.x as i32, c.y as i32))
            .collect()
    }

    fn describe(&self, data: &[u8], width: usize, x: i32, y: i32) -> Desc {
        let mut desc: Desc = [0; DESC_DIM];
        for (i, p) in self.pattern.iter().enumerate() {
            let a = smoothed(data, width, x + p[0], y + p[1]);
            let b = smoothed(data, width, x + p[2], y + p[3]);
            if a < b {
                desc[i / 8] |= 1 << (i % 8);
            }
        }
        desc
    }
}

/// Sum over the 3x3 neighbourhood. Only ever compared against another such
/// sum, so the division by 9 is skipped. Callers keep (x, y) at least
/// `BORDER` away from every edge.
#[inline]
fn smoothed(data: &[u8], width: usize, x: i32, y: i32) -> u16 {
    let mut sum = 0u16;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += data[(y + dy) as usize * width + (x + dx) as usize] as u16;
        }
    }
    sum
}

/// FAST-9 segment test over the whole image.
fn fast_corners(gray: &GrayImage, threshold: u8) -> Vec<Corner> {
    let (width, height) = gray.dimensions();
    if width < 7 || height < 7 {
        return Vec::new();
    }
    let data = gray.as_raw();
    let w = width as usize;
    let t = threshold as i16;

    let mut corners = Vec::new();
    for y in 3..height - 3 {
        for x in 3..width - 3 {
            let center = data[y as usize * w + x as usize] as i16;

            // Compass pre-test: a 9-long arc always covers at least two of
            // the four extreme circle pixels.
            let compass = [
                data[(y - 3) as usize * w + x as usize] as i16,
                data[y as usize * w + (x + 3) as usize] as i16,
                data[(y + 3) as usize * w + x as usize] as i16,
                data[y as usize * w + (x - 3) as usize] as i16,
            ];
            let brighter = compass.iter().filter(|&&p| p - center > t).count();
            let darker = compass.iter().filter(|&&p| center - p > t).count();
            if brighter < 2 && darker < 2 {
                continue;
            }

            let mut diffs = [0i16; 16];
            for (i, &(dx, dy)) in CIRCLE.iter().enumerate() {
                let px = (x as i32 + dx) as usize;
                let py = (y as i32 + dy) as usize;
                diffs[i] = data[py * w + px] as i16 - center;
            }

            if let Some(score) = segment_score(&diffs, t) {
                corners.push(Corner { x, y, score });
            }
        }
    }
    corners
}

/// Returns a ranking score when the circle holds a contiguous arc of at
/// least `FAST_ARC` pixels all brighter or all darker than the center by
/// more than `t`, otherwise `None`.
fn segment_score(diffs: &[i16; 16], t: i16) -> Option<u32> {
    let bright: Vec<bool> = diffs.iter().map(|&d| d > t).collect();
    let dark: Vec<bool> = diffs.iter().map(|&d| -d > t).collect();

    let mut score = None;
    if longest_arc(&bright) >= FAST_ARC {
        let s: u32 = diffs.iter().filter(|&&d| d > t).map(|&d| (d - t) as u32).sum();
        score = Some(s);
    }
    if longest_arc(&dark) >= FAST_ARC {
        let s: u32 = diffs.iter().filter(|&&d| -d > t).map(|&d| (-d - t) as u32).sum();
        score = Some(score.map_or(s, |prev: u32| prev.max(s)));
    }
    score
}

/// Longest contiguous run of `true`, treating the slice as circular.
fn longest_arc(mask: &[bool]) -> usize {
    if mask.iter().all(|&m| m) {
        return mask.len();
    }
    let mut best = 0;
    let mut run = 0;
    for i in 0..mask.len() * 2 {
        if mask[i % mask.len()] {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::io::Cursor;

    /// Dark scene with a few bright rectangles; their corners pass the
    /// segment test.
    fn rect_scene(width: u32, height: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(width, height, image::Luma([30u8]));
        let rects = [(40u32, 30u32, 12u32, 12u32), (80, 40, 16, 10), (50, 80, 10, 18)];
        for &(rx, ry, rw, rh) in &rects {
            for y in ry..(ry + rh).min(height) {
                for x in rx..(rx + rw).min(width) {
                    img.put_pixel(x, y, image::Luma([220u8]));
                }
            }
        }
        img
    }

    fn png_bytes(img: &GrayImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn corrupt_bytes_yield_empty_set() {
        let ex = FeatureExtractor::new(DetectorParams::default());
        assert!(ex.extract(b"not-an-image").is_empty());
        assert!(ex.extract(&[]).is_empty());
    }

    #[test]
    fn textured_scene_yields_descriptors() {
        let ex = FeatureExtractor::new(DetectorParams::default());
        let descs = ex.extract(&png_bytes(&rect_scene(160, 120)));
        assert!(!descs.is_empty());
        assert!(descs.len() <= 500);
    }

    #[test]
    fn uniform_image_yields_no_descriptors() {
        let ex = FeatureExtractor::new(DetectorParams::default());
        let flat = GrayImage::from_pixel(96, 96, image::Luma([128u8]));
        assert!(ex.extract(&png_bytes(&flat)).is_empty());
    }

    #[test]
    fn image_smaller_than_patch_yields_no_descriptors() {
        let ex = FeatureExtractor::new(DetectorParams::default());
        let tiny = rect_scene(20, 20);
        assert!(ex.extract_gray(&tiny).is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let ex = FeatureExtractor::new(DetectorParams::default());
        let bytes = png_bytes(&rect_scene(160, 120));
        assert_eq!(ex.extract(&bytes), ex.extract(&bytes));

        // Two extractor instances share the fixed pattern seed.
        let other = FeatureExtractor::new(DetectorParams::default());
        assert_eq!(ex.extract(&bytes), other.extract(&bytes));
    }

    #[test]
    fn max_features_bounds_output() {
        let params = DetectorParams {
            max_features: 5,
            ..DetectorParams::default()
        };
        let ex = FeatureExtractor::new(params);
        let descs = ex.extract_gray(&rect_scene(160, 120));
        assert!(descs.len() <= 5);
    }

    #[test]
    fn arc_wraps_around_the_circle() {
        let mut mask = [false; 16];
        for i in 12..16 {
            mask[i] = true;
        }
        for i in 0..5 {
            mask[i] = true;
        }
        assert_eq!(longest_arc(&mask), 9);
        assert_eq!(longest_arc(&[true; 16]), 16);
        assert_eq!(longest_arc(&[false; 16]), 0);
    }
}

use crate::{DisparityMap, Error, Result, StereoMatcher, INVALID_DISPARITY};
use image::GrayImage;
use rayon::prelude::*;

/// Block matching stereo matcher
///
/// Winner-take-all search over integer disparities. A pixel only keeps its
/// disparity when the winning cost is clearly below the runner-up and, if
/// enabled, when matching back from the right image lands on the same pixel.
#[derive(Debug, Clone)]
pub struct BlockMatcher {
    pub block_size: usize,
    pub min_disparity: i32,
    pub max_disparity: i32,
    pub metric: MatchingMetric,
    /// Best cost must be below `uniqueness_ratio` times the second best
    pub uniqueness_ratio: f32,
    /// Largest allowed difference between left-to-right and right-to-left
    /// disparities, `None` disables the check
    pub left_right_tolerance: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingMetric {
    SAD, // Sum of Absolute Differences
    SSD, // Sum of Squared Differences
    NCC, // Normalized Cross-Correlation
}

impl Default for BlockMatcher {
    fn default() -> Self {
        Self {
            block_size: 11,
            min_disparity: 0,
            max_disparity: 64,
            metric: MatchingMetric::SAD,
            uniqueness_ratio: 0.95,
            left_right_tolerance: Some(1),
        }
    }
}

/// Row-major view of a rectified pair.
struct Pair<'a> {
    left: &'a [u8],
    right: &'a [u8],
    width: i32,
    half: i32,
}

impl StereoMatcher for BlockMatcher {
    fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap> {
        self.validate(left, right)?;

        let mut disparity = DisparityMap::new(
            left.width(),
            left.height(),
            self.min_disparity,
            self.max_disparity,
        );
        let width = left.width() as usize;
        let height = left.height() as i32;
        if width == 0 {
            return Ok(disparity);
        }

        let pair = Pair {
            left: left.as_raw(),
            right: right.as_raw(),
            width: width as i32,
            half: (self.block_size / 2) as i32,
        };

        disparity
            .data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i32;
                if y < pair.half || y >= height - pair.half {
                    return;
                }
                let right_to_left: Option<Vec<Option<i32>>> = self
                    .left_right_tolerance
                    .map(|_| (0..pair.width).map(|xr| self.match_right(&pair, xr, y)).collect());

                for x in pair.half..pair.width - pair.half {
                    row[x as usize] = self
                        .match_left(&pair, x, y)
                        .filter(|&d| self.consistent(right_to_left.as_deref(), x, d))
                        .map(|d| d as f32)
                        .unwrap_or(INVALID_DISPARITY);
                }
            });

        Ok(disparity)
    }
}

impl BlockMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn with_disparity_range(mut self, min: i32, max: i32) -> Self {
        self.min_disparity = min;
        self.max_disparity = max;
        self
    }

    pub fn with_metric(mut self, metric: MatchingMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_uniqueness_ratio(mut self, ratio: f32) -> Self {
        self.uniqueness_ratio = ratio;
        self
    }

    pub fn with_left_right_tolerance(mut self, tolerance: Option<i32>) -> Self {
        self.left_right_tolerance = tolerance;
        self
    }

    fn validate(&self, left: &GrayImage, right: &GrayImage) -> Result<()> {
        if left.dimensions() != right.dimensions() {
            return Err(Error::DimensionMismatch(
                "Left and right images must have the same dimensions".to_string(),
            ));
        }
        if self.block_size % 2 == 0 {
            return Err(Error::InvalidInput(format!(
                "block size must be odd, got {}",
                self.block_size
            )));
        }
        if self.min_disparity > self.max_disparity {
            return Err(Error::InvalidInput(format!(
                "empty disparity range [{}, {}]",
                self.min_disparity, self.max_disparity
            )));
        }
        Ok(())
    }

    fn consistent(&self, right_to_left: Option<&[Option<i32>]>, x: i32, d: i32) -> bool {
        match (right_to_left, self.left_right_tolerance) {
            (Some(back), Some(tol)) => back[(x - d) as usize].is_some_and(|b| (b - d).abs() <= tol),
            _ => true,
        }
    }

    /// Disparity of left pixel `x`, searching right blocks at `x - d`.
    fn match_left(&self, pair: &Pair<'_>, x: i32, y: i32) -> Option<i32> {
        // Clamp so every right block stays inside the image
        let lo = (x + pair.half - (pair.width - 1)).max(self.min_disparity);
        let hi = (x - pair.half).min(self.max_disparity);
        self.winner(lo, hi, |d| self.cost(pair, x, y, d))
    }

    /// Disparity of right pixel `xr`, searching left blocks at `xr + d`.
    fn match_right(&self, pair: &Pair<'_>, xr: i32, y: i32) -> Option<i32> {
        if xr < pair.half || xr >= pair.width - pair.half {
            return None;
        }
        let lo = (pair.half - xr).max(self.min_disparity);
        let hi = (pair.width - 1 - pair.half - xr).min(self.max_disparity);
        self.winner(lo, hi, |d| self.cost(pair, xr + d, y, d))
    }

    fn winner<F: Fn(i32) -> f32>(&self, lo: i32, hi: i32, cost: F) -> Option<i32> {
        if lo > hi {
            return None;
        }

        let mut best_disparity = lo;
        let mut best_cost = f32::INFINITY;
        let mut second_best_cost = f32::INFINITY;
        for d in lo..=hi {
            let c = cost(d);
            if c < best_cost {
                second_best_cost = best_cost;
                best_cost = c;
                best_disparity = d;
            } else if c < second_best_cost {
                second_best_cost = c;
            }
        }

        // Flat regions tie and are rejected
        if second_best_cost.is_finite() && best_cost >= second_best_cost * self.uniqueness_ratio {
            None
        } else {
            Some(best_disparity)
        }
    }

    /// Matching cost of the left block at `x` against the right block at
    /// `x - disparity`. Lower is better for every metric.
    fn cost(&self, pair: &Pair<'_>, x: i32, y: i32, disparity: i32) -> f32 {
        let mut sum_a = 0.0f32;
        let mut sum_l2 = 0.0f32;
        let mut sum_r2 = 0.0f32;
        let mut count = 0usize;

        for dy in -pair.half..=pair.half {
            let row = ((y + dy) * pair.width) as usize;
            for dx in -pair.half..=pair.half {
                let l = pair.left[row + (x + dx) as usize] as f32;
                let r = pair.right[row + (x + dx - disparity) as usize] as f32;
                match self.metric {
                    MatchingMetric::SAD => sum_a += (l - r).abs(),
                    MatchingMetric::SSD => sum_a += (l - r) * (l - r),
                    MatchingMetric::NCC => {
                        sum_a += l * r;
                        sum_l2 += l * l;
                        sum_r2 += r * r;
                    }
                }
                count += 1;
            }
        }

        match self.metric {
            MatchingMetric::SAD | MatchingMetric::SSD => sum_a / count as f32,
            MatchingMetric::NCC => {
                let denom = (sum_l2 * sum_r2).sqrt();
                if denom <= f32::EPSILON {
                    1.0
                } else {
                    1.0 - sum_a / denom
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Pseudo random texture, `right` is `left` moved `shift` pixels to the left.
    fn shifted_pair(width: u32, height: u32, shift: u32) -> (GrayImage, GrayImage) {
        let texture = |x: u32, y: u32| -> u8 {
            ((x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)) % 241) as u8
        };
        let mut left = GrayImage::new(width, height);
        let mut right = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                left.put_pixel(x, y, Luma([texture(x, y)]));
                right.put_pixel(x, y, Luma([texture(x + shift, y)]));
            }
        }
        (left, right)
    }

    #[test]
    fn test_recovers_constant_shift() {
        let (left, right) = shifted_pair(60, 30, 6);
        let matcher = BlockMatcher::new()
            .with_block_size(5)
            .with_disparity_range(0, 12);

        let disparity = matcher.compute(&left, &right).unwrap();

        assert_eq!(disparity.width, left.width());
        assert_eq!(disparity.height, left.height());
        for y in 2..28 {
            for x in 20..58 {
                assert_eq!(disparity.get(x, y), 6.0, "pixel ({x}, {y})");
            }
        }
        // Border pixels never receive a disparity
        assert!(!disparity.is_valid(0, 15));
        assert!(!disparity.is_valid(30, 0));
    }

    #[test]
    fn test_left_right_check_rejects_unsearchable_border() {
        let (left, right) = shifted_pair(60, 30, 6);
        let matcher = BlockMatcher::new()
            .with_block_size(5)
            .with_disparity_range(0, 12);
        let checked = matcher.compute(&left, &right).unwrap();
        let unchecked = matcher
            .with_left_right_tolerance(None)
            .compute(&left, &right)
            .unwrap();

        // Left of x = 8 the true match lies outside the right image
        for y in 2..28 {
            for x in 2..7 {
                assert!(!checked.is_valid(x, y), "pixel ({x}, {y})");
            }
            // A single candidate disparity always wins without the check
            assert!(unchecked.is_valid(2, y));
        }
    }

    #[test]
    fn test_flat_image_has_no_disparity() {
        let img = GrayImage::from_pixel(20, 20, Luma([90]));
        let disparity = BlockMatcher::new()
            .with_block_size(3)
            .with_disparity_range(0, 4)
            .compute(&img, &img)
            .unwrap();
        assert_eq!(disparity.valid_count(), 0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let left = GrayImage::new(10, 10);
        let right = GrayImage::new(12, 10);
        let result = BlockMatcher::new().compute(&left, &right);
        assert!(matches!(result, Err(Error::DimensionMismatch(_))));
    }

    #[test]
    fn test_even_block_size_rejected() {
        let img = GrayImage::new(10, 10);
        let result = BlockMatcher::new().with_block_size(4).compute(&img, &img);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}

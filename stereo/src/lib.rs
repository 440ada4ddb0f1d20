//! Stereo vision and disparity
//!
//! Disparity maps, the parameters that tie a disparity map to 3D, stereo
//! matching strategies and calibrated rectification of image pairs.

use image::GrayImage;
use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

pub mod block_matching;
pub mod rectification;

pub use block_matching::*;
pub use rectification::*;

pub use cv_core::{CameraIntrinsics, Error, Result};

/// Value stored in a [`DisparityMap`] for pixels without a disparity estimate.
pub const INVALID_DISPARITY: f32 = -1.0;

/// Stereo matching algorithm trait
///
/// Implementations receive a rectified pair where a point seen at column `x`
/// in `left` appears at column `x - d` in `right`.
pub trait StereoMatcher {
    fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap>;
}

impl<S: StereoMatcher + ?Sized> StereoMatcher for Box<S> {
    fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap> {
        (**self).compute(left, right)
    }
}

/// Disparity map representation
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityMap {
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub min_disparity: i32,
    pub max_disparity: i32,
}

impl DisparityMap {
    /// Creates a map with every pixel marked invalid.
    pub fn new(width: u32, height: u32, min_d: i32, max_d: i32) -> Self {
        let size = (width * height) as usize;
        Self {
            data: vec![INVALID_DISPARITY; size],
            width,
            height,
            min_disparity: min_d,
            max_disparity: max_d,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        let idx = (y * self.width + x) as usize;
        self.data.get(idx).copied().unwrap_or(INVALID_DISPARITY)
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let idx = (y * self.width + x) as usize;
        if let Some(cell) = self.data.get_mut(idx) {
            *cell = value;
        }
    }

    pub fn invalidate(&mut self, x: u32, y: u32) {
        self.set(x, y, INVALID_DISPARITY);
    }

    pub fn is_inside(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// True if `value` lies inside the disparity search range.
    pub fn is_valid_value(&self, value: f32) -> bool {
        value.is_finite()
            && value >= self.min_disparity as f32
            && value <= self.max_disparity as f32
            && value != INVALID_DISPARITY
    }

    pub fn is_valid(&self, x: u32, y: u32) -> bool {
        self.is_inside(x, y) && self.is_valid_value(self.get(x, y))
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&d| self.is_valid_value(d)).count()
    }

    /// Convert to a grayscale image for visualization
    pub fn to_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width, self.height);
        let range = (self.max_disparity - self.min_disparity).max(1) as f32;

        for y in 0..self.height {
            for x in 0..self.width {
                let d = self.get(x, y);
                let normalized = if self.is_valid_value(d) {
                    ((d - self.min_disparity as f32) / range * 255.0) as u8
                } else {
                    0
                };
                img.put_pixel(x, y, image::Luma([normalized]));
            }
        }

        img
    }
}

/// Describes how disparity values of a map relate to 3D geometry.
///
/// Disparities are measured in a rectified frame with focal length
/// `pinhole.fx` and the given baseline. `rotate_to_rectified` maps directions
/// from the view's frame into that rectified frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisparityParameters {
    pub disparity_min: i32,
    pub disparity_range: i32,
    pub baseline: f64,
    pub pinhole: CameraIntrinsics,
    pub rotate_to_rectified: Matrix3<f64>,
}

impl DisparityParameters {
    pub fn new(
        disparity_min: i32,
        disparity_range: i32,
        baseline: f64,
        pinhole: CameraIntrinsics,
    ) -> Self {
        Self {
            disparity_min,
            disparity_range,
            baseline,
            pinhole,
            rotate_to_rectified: Matrix3::identity(),
        }
    }

    /// Depth along the rectified optical axis for a disparity value.
    pub fn depth(&self, disparity: f64) -> Option<f64> {
        if disparity <= 1e-6 || !disparity.is_finite() {
            None
        } else {
            Some(self.baseline * self.pinhole.fx / disparity)
        }
    }

    /// Disparity a point at rectified depth `z` would have.
    pub fn disparity(&self, depth: f64) -> Option<f64> {
        if depth <= 1e-12 {
            None
        } else {
            Some(self.baseline * self.pinhole.fx / depth)
        }
    }

    /// Triangulates a point in the view's frame from a viewing ray in that
    /// frame and its measured disparity.
    pub fn ray_to_3d(&self, ray: &Vector3<f64>, disparity: f64) -> Option<Point3<f64>> {
        let depth = self.depth(disparity)?;
        let rect = self.rotate_to_rectified * ray;
        if rect.z <= 1e-12 {
            return None;
        }
        let rect_point = rect * (depth / rect.z);
        Some(Point3::from(self.rotate_to_rectified.transpose() * rect_point))
    }

    /// Triangulates a rectified pixel into a point in the rectified frame.
    pub fn pixel_to_3d(&self, x: f64, y: f64, disparity: f64) -> Option<Point3<f64>> {
        let depth = self.depth(disparity)?;
        Some(self.pinhole.unproject(nalgebra::Point2::new(x, y), depth))
    }
}

/// Mask with every pixel usable, sized to match the disparity map.
///
/// Non-zero mask pixels are excluded from 3D conversion.
pub fn empty_mask(disparity: &DisparityMap) -> GrayImage {
    GrayImage::new(disparity.width, disparity.height)
}

use super::config::MvsConfig;
use cv_core::{CameraExtrinsics, Error, Point2Transform, PointCloudf64, Result};
use cv_stereo::{DisparityMap, DisparityParameters};
use image::GrayImage;
use nalgebra::{Point2, Vector3};
use std::ops::Range;

/// Merges disparity images of successive centers into one world frame cloud.
pub trait CloudAccumulator {
    /// Applies run settings. Called once before [`reset`](CloudAccumulator::reset).
    fn configure(&mut self, _config: &MvsConfig) {}

    fn reset(&mut self);

    /// Converts every valid, unmasked pixel of `disparity` and appends the
    /// points that are not redundant with the cloud. Returns the number of
    /// points appended.
    ///
    /// `pixel_to_norm` and `norm_to_pixel` map between the view's pixels and
    /// normalized image coordinates.
    fn add_disparity(
        &mut self,
        disparity: &DisparityMap,
        mask: &GrayImage,
        world_to_view: &CameraExtrinsics,
        parameters: &DisparityParameters,
        pixel_to_norm: &dyn Point2Transform,
        norm_to_pixel: &dyn Point2Transform,
    ) -> Result<usize>;

    fn cloud(&self) -> &PointCloudf64;
}

/// Cloud that drops pixels already explained by earlier points.
///
/// Before a disparity image is converted, the existing cloud is projected into
/// the view. A pixel whose measured disparity is within
/// `disparity_similar_tol` of the closest projected point's disparity is a
/// duplicate and is skipped.
#[derive(Debug, Clone)]
pub struct DisparityCloud {
    cloud: PointCloudf64,
    view_ranges: Vec<Range<usize>>,
    disparity_similar_tol: f64,
}

impl Default for DisparityCloud {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl DisparityCloud {
    pub fn new(disparity_similar_tol: f64) -> Self {
        Self {
            cloud: PointCloudf64::default(),
            view_ranges: Vec::new(),
            disparity_similar_tol,
        }
    }

    /// Range of points contributed by each call to `add_disparity`, in call order.
    pub fn view_ranges(&self) -> &[Range<usize>] {
        &self.view_ranges
    }

    pub fn disparity_similar_tol(&self) -> f64 {
        self.disparity_similar_tol
    }

    /// Disparity of the closest existing point projecting into each pixel.
    fn predicted_disparity(
        &self,
        disparity: &DisparityMap,
        world_to_view: &CameraExtrinsics,
        parameters: &DisparityParameters,
        norm_to_pixel: &dyn Point2Transform,
    ) -> Vec<f64> {
        let width = disparity.width;
        let mut predicted = vec![f64::NEG_INFINITY; disparity.data.len()];
        for point in self.cloud.iter() {
            let p = world_to_view.transform_point(point);
            if p.z <= 0.0 {
                continue;
            }
            let rect_depth = (parameters.rotate_to_rectified * p.coords).z;
            let Some(d) = parameters.disparity(rect_depth) else {
                continue;
            };
            let pixel = norm_to_pixel.transform(&Point2::new(p.x / p.z, p.y / p.z));
            let (x, y) = (pixel.x.round(), pixel.y.round());
            if x < 0.0 || y < 0.0 || !disparity.is_inside(x as u32, y as u32) {
                continue;
            }
            let idx = y as usize * width as usize + x as usize;
            if d > predicted[idx] {
                predicted[idx] = d;
            }
        }
        predicted
    }
}

impl CloudAccumulator for DisparityCloud {
    fn configure(&mut self, config: &MvsConfig) {
        self.disparity_similar_tol = config.disparity_similar_tol;
    }

    fn reset(&mut self) {
        self.cloud.clear();
        self.view_ranges.clear();
    }

    fn add_disparity(
        &mut self,
        disparity: &DisparityMap,
        mask: &GrayImage,
        world_to_view: &CameraExtrinsics,
        parameters: &DisparityParameters,
        pixel_to_norm: &dyn Point2Transform,
        norm_to_pixel: &dyn Point2Transform,
    ) -> Result<usize> {
        if mask.dimensions() != (disparity.width, disparity.height) {
            return Err(Error::DimensionMismatch(format!(
                "mask is {}x{} but disparity is {}x{}",
                mask.width(),
                mask.height(),
                disparity.width,
                disparity.height
            )));
        }

        let predicted = self.predicted_disparity(disparity, world_to_view, parameters, norm_to_pixel);
        let view_to_world = world_to_view.inverse();
        let start = self.cloud.len();

        for y in 0..disparity.height {
            for x in 0..disparity.width {
                if mask.get_pixel(x, y)[0] != 0 || !disparity.is_valid(x, y) {
                    continue;
                }
                let d = disparity.get(x, y) as f64;
                let expected = predicted[(y * disparity.width + x) as usize];
                if (d - expected).abs() <= self.disparity_similar_tol {
                    continue;
                }

                let n = pixel_to_norm.transform(&Point2::new(x as f64, y as f64));
                if let Some(p) = parameters.ray_to_3d(&Vector3::new(n.x, n.y, 1.0), d) {
                    self.cloud.push(view_to_world.transform_point(&p));
                }
            }
        }

        let end = self.cloud.len();
        self.view_ranges.push(start..end);
        Ok(end - start)
    }

    fn cloud(&self) -> &PointCloudf64 {
        &self.cloud
    }
}

//! Stereo rectification
//!
//! Rectify calibrated image pairs so that epipolar lines are horizontal and
//! aligned, making stereo matching a 1D search along image rows.

use crate::{DisparityMap, DisparityParameters, Error, Result};
use cv_core::{bilinear_interpolate, CameraExtrinsics, CameraIntrinsics, ImageDimension, PinholeModel};
use image::GrayImage;
use nalgebra::{Matrix3, Point2, Vector3};
use rayon::prelude::*;

const MIN_RAY_Z: f64 = 1e-9;

/// Rectification of a calibrated pair given the transform from the first
/// ("left") view to the second ("right") view.
///
/// The rectified x axis points along the baseline from view 1 to view 2, so
/// a disparity `d` satisfies `x_right = x_left - d`.
#[derive(Debug, Clone)]
pub struct StereoRectification {
    pub camera1: PinholeModel,
    pub camera2: PinholeModel,
    /// Size of both rectified images
    pub dimension: ImageDimension,
    /// View 1 frame to rectified frame
    pub rotation: Matrix3<f64>,
    pub view1_to_view2: CameraExtrinsics,
    /// Intrinsics shared by both rectified images
    pub intrinsics: CameraIntrinsics,
    pub baseline: f64,
}

/// Rectified images plus the pixels in each that had no source pixel.
#[derive(Debug, Clone)]
pub struct RectifiedPair {
    pub left: GrayImage,
    pub right: GrayImage,
    /// Non-zero where the rectified left pixel falls outside view 1
    pub left_mask: GrayImage,
    /// Non-zero where the rectified right pixel falls outside view 2
    pub right_mask: GrayImage,
}

impl StereoRectification {
    pub fn new(
        camera1: &PinholeModel,
        dimension1: ImageDimension,
        camera2: &PinholeModel,
        view1_to_view2: &CameraExtrinsics,
    ) -> Result<Self> {
        if dimension1.is_empty() {
            return Err(Error::InvalidInput(
                "rectified image must have a non-zero size".to_string(),
            ));
        }

        // Camera 2 center in view 1 coordinates
        let baseline_vec = view1_to_view2.camera_center().coords;
        let baseline = baseline_vec.norm();
        if baseline < 1e-12 {
            return Err(Error::InvalidInput(
                "views share a camera center, baseline is zero".to_string(),
            ));
        }

        let rotation = compute_rectification_rotation(&baseline_vec).ok_or_else(|| {
            Error::InvalidInput("baseline is parallel to the optical axis".to_string())
        })?;

        let k1 = &camera1.intrinsics;
        let k2 = &camera2.intrinsics;
        let intrinsics = CameraIntrinsics::new(
            (k1.fx + k2.fx) / 2.0,
            (k1.fy + k2.fy) / 2.0,
            k1.cx,
            k1.cy,
            dimension1.width,
            dimension1.height,
        );

        Ok(Self {
            camera1: *camera1,
            camera2: *camera2,
            dimension: dimension1,
            rotation,
            view1_to_view2: *view1_to_view2,
            intrinsics,
            baseline,
        })
    }

    /// Homography from undistorted view 1 pixels to rectified pixels.
    pub fn rect1(&self) -> Matrix3<f64> {
        self.intrinsics.matrix() * self.rotation * self.camera1.intrinsics.inverse_matrix()
    }

    /// Homography from undistorted view 2 pixels to rectified pixels.
    pub fn rect2(&self) -> Matrix3<f64> {
        self.intrinsics.matrix()
            * self.rotation
            * self.view1_to_view2.rotation.transpose()
            * self.camera2.intrinsics.inverse_matrix()
    }

    pub fn view1_pixel_to_rect(&self, pixel: &Point2<f64>) -> Option<Point2<f64>> {
        let n = self.camera1.pixel_to_normalized(pixel);
        self.project_rect(&(self.rotation * Vector3::new(n.x, n.y, 1.0)))
    }

    pub fn view2_pixel_to_rect(&self, pixel: &Point2<f64>) -> Option<Point2<f64>> {
        let n = self.camera2.pixel_to_normalized(pixel);
        let in_view1 = self.view1_to_view2.rotation.transpose() * Vector3::new(n.x, n.y, 1.0);
        self.project_rect(&(self.rotation * in_view1))
    }

    pub fn rect_to_view1_pixel(&self, rect: &Point2<f64>) -> Option<Point2<f64>> {
        let ray = self.rotation.transpose() * self.rect_ray(rect);
        project_camera(&self.camera1, &ray)
    }

    pub fn rect_to_view2_pixel(&self, rect: &Point2<f64>) -> Option<Point2<f64>> {
        let ray = self.view1_to_view2.rotation * (self.rotation.transpose() * self.rect_ray(rect));
        project_camera(&self.camera2, &ray)
    }

    /// Disparity parameters for disparity maps computed on the rectified pair
    /// and referenced to view 1.
    pub fn disparity_parameters(&self, disparity_min: i32, disparity_range: i32) -> DisparityParameters {
        DisparityParameters {
            disparity_min,
            disparity_range,
            baseline: self.baseline,
            pinhole: self.intrinsics,
            rotate_to_rectified: self.rotation,
        }
    }

    /// Resamples view 1 into the rectified frame.
    pub fn rectify_left(&self, image: &GrayImage) -> (GrayImage, GrayImage) {
        self.remap(image, |q| self.rect_to_view1_pixel(q))
    }

    /// Resamples view 2 into the rectified frame.
    pub fn rectify_right(&self, image: &GrayImage) -> (GrayImage, GrayImage) {
        self.remap(image, |q| self.rect_to_view2_pixel(q))
    }

    /// Marks disparities whose left or matched right pixel has no source data.
    pub fn invalidate_outside(&self, disparity: &mut DisparityMap, pair: &RectifiedPair) {
        for y in 0..disparity.height {
            for x in 0..disparity.width {
                if !disparity.is_valid(x, y) {
                    continue;
                }
                let xr = (x as f32 - disparity.get(x, y)).round();
                let right_outside = xr < 0.0
                    || xr as u32 >= pair.right_mask.width()
                    || pair.right_mask.get_pixel(xr as u32, y)[0] != 0;
                if pair.left_mask.get_pixel(x, y)[0] != 0 || right_outside {
                    disparity.invalidate(x, y);
                }
            }
        }
    }

    fn rect_ray(&self, rect: &Point2<f64>) -> Vector3<f64> {
        let n = self.intrinsics.pixel_to_normalized(rect);
        Vector3::new(n.x, n.y, 1.0)
    }

    fn project_rect(&self, ray: &Vector3<f64>) -> Option<Point2<f64>> {
        if ray.z <= MIN_RAY_Z {
            return None;
        }
        Some(
            self.intrinsics
                .normalized_to_pixel(&Point2::new(ray.x / ray.z, ray.y / ray.z)),
        )
    }

    fn remap<F>(&self, src: &GrayImage, rect_to_src: F) -> (GrayImage, GrayImage)
    where
        F: Fn(&Point2<f64>) -> Option<Point2<f64>> + Sync,
    {
        let width = self.dimension.width;
        let height = self.dimension.height;
        let mut dst = GrayImage::new(width, height);
        let mut mask = GrayImage::new(width, height);

        dst.par_chunks_mut(width as usize)
            .zip(mask.par_chunks_mut(width as usize))
            .enumerate()
            .for_each(|(y, (row, mask_row))| {
                for x in 0..width as usize {
                    let sample = rect_to_src(&Point2::new(x as f64, y as f64))
                        .and_then(|p| bilinear_interpolate(src, p.x, p.y));
                    match sample {
                        Some(v) => row[x] = v.round().clamp(0.0, 255.0) as u8,
                        None => mask_row[x] = 1,
                    }
                }
            });

        (dst, mask)
    }
}

/// Rectify a calibrated stereo pair.
pub fn rectify_stereo_pair(
    rectification: &StereoRectification,
    left: &GrayImage,
    right: &GrayImage,
) -> RectifiedPair {
    let (left, left_mask) = rectification.rectify_left(left);
    let (right, right_mask) = rectification.rectify_right(right);
    RectifiedPair {
        left,
        right,
        left_mask,
        right_mask,
    }
}

/// Rotation taking view 1 coordinates into the rectified frame. `None` if the
/// baseline is parallel to the optical axis.
fn compute_rectification_rotation(baseline: &Vector3<f64>) -> Option<Matrix3<f64>> {
    // New x-axis: baseline direction
    let e1 = baseline.normalize();

    // New y-axis: orthogonal to x and the old optical axis
    let e2 = Vector3::new(0.0, 0.0, 1.0).cross(&e1);
    if e2.norm() < 1e-9 {
        return None;
    }
    let e2 = e2.normalize();

    // New z-axis: orthogonal to x and y
    let e3 = e1.cross(&e2);

    Some(Matrix3::from_rows(&[
        e1.transpose(),
        e2.transpose(),
        e3.transpose(),
    ]))
}

fn project_camera(camera: &PinholeModel, ray: &Vector3<f64>) -> Option<Point2<f64>> {
    if ray.z <= MIN_RAY_Z {
        return None;
    }
    Some(camera.normalized_to_pixel(&Point2::new(ray.x / ray.z, ray.y / ray.z)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use nalgebra::Rotation3;

    fn camera() -> PinholeModel {
        PinholeModel::undistorted(CameraIntrinsics::new(100.0, 100.0, 50.0, 40.0, 100, 80))
    }

    fn sideways(baseline: f64) -> CameraExtrinsics {
        // View 2 sits `baseline` along +x of view 1
        CameraExtrinsics::new(Matrix3::identity(), Vector3::new(-baseline, 0.0, 0.0))
    }

    #[test]
    fn test_sideways_pair_is_identity() {
        let rect = StereoRectification::new(&camera(), ImageDimension::new(100, 80), &camera(), &sideways(0.5))
            .unwrap();

        assert!((rect.rotation - Matrix3::identity()).norm() < 1e-12);
        assert!((rect.baseline - 0.5).abs() < 1e-12);

        let p = Point2::new(12.0, 33.0);
        let q = rect.view1_pixel_to_rect(&p).unwrap();
        assert!((q - p).norm() < 1e-9);
    }

    #[test]
    fn test_rectified_rows_are_aligned() {
        let view1_to_view2 = CameraExtrinsics::new(
            Rotation3::from_euler_angles(0.02, -0.05, 0.01).into_inner(),
            Vector3::new(-0.4, 0.05, 0.02),
        );
        let rect = StereoRectification::new(&camera(), ImageDimension::new(100, 80), &camera(), &view1_to_view2)
            .unwrap();

        // A 3D point seen by both views lands on the same rectified row
        let point = nalgebra::Point3::new(0.1, -0.2, 3.0);
        let p1 = camera().project(&point);
        let p2 = camera().project(&view1_to_view2.transform_point(&point));

        let q1 = rect.view1_pixel_to_rect(&p1).unwrap();
        let q2 = rect.view2_pixel_to_rect(&p2).unwrap();
        assert!((q1.y - q2.y).abs() < 1e-6);

        // Without distortion the mappings reduce to the rectifying homographies
        let h1 = rect.rect1() * p1.to_homogeneous();
        let h2 = rect.rect2() * p2.to_homogeneous();
        assert!((Point2::from_homogeneous(h1).unwrap() - q1).norm() < 1e-6);
        assert!((Point2::from_homogeneous(h2).unwrap() - q2).norm() < 1e-6);

        // and its disparity encodes the rectified depth
        let params = rect.disparity_parameters(0, 64);
        let rect_point = rect.rotation * point.coords;
        let d = q1.x - q2.x;
        assert!((params.depth(d).unwrap() - rect_point.z).abs() < 1e-6);
    }

    #[test]
    fn test_rect_mapping_roundtrip() {
        let view1_to_view2 = CameraExtrinsics::new(
            Rotation3::from_euler_angles(0.0, 0.1, 0.0).into_inner(),
            Vector3::new(-1.0, 0.0, 0.1),
        );
        let cam = PinholeModel::new(
            CameraIntrinsics::new(100.0, 100.0, 50.0, 40.0, 100, 80),
            cv_core::Distortion::new(-0.02, 0.0, 0.0, 0.0, 0.0),
        );
        let rect = StereoRectification::new(&cam, ImageDimension::new(100, 80), &cam, &view1_to_view2).unwrap();

        let p = Point2::new(30.0, 60.0);
        let back = rect.rect_to_view1_pixel(&rect.view1_pixel_to_rect(&p).unwrap()).unwrap();
        assert!((back - p).norm() < 1e-3);

        let back = rect.rect_to_view2_pixel(&rect.view2_pixel_to_rect(&p).unwrap()).unwrap();
        assert!((back - p).norm() < 1e-3);
    }

    #[test]
    fn test_zero_baseline_rejected() {
        let result = StereoRectification::new(
            &camera(),
            ImageDimension::new(100, 80),
            &camera(),
            &CameraExtrinsics::default(),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_forward_motion_rejected() {
        let forward = CameraExtrinsics::new(Matrix3::identity(), Vector3::new(0.0, 0.0, -1.0));
        let result = StereoRectification::new(&camera(), ImageDimension::new(100, 80), &camera(), &forward);
        assert!(result.is_err());
    }

    #[test]
    fn test_rectify_marks_missing_pixels() {
        let mut img = GrayImage::new(100, 80);
        for (x, _, p) in img.enumerate_pixels_mut() {
            *p = Luma([(x * 2) as u8]);
        }
        let view1_to_view2 = CameraExtrinsics::new(
            Rotation3::from_euler_angles(0.0, 0.3, 0.0).into_inner(),
            Vector3::new(-1.0, 0.0, 0.0),
        );
        let rect = StereoRectification::new(&camera(), ImageDimension::new(100, 80), &camera(), &view1_to_view2)
            .unwrap();
        let pair = rectify_stereo_pair(&rect, &img, &img);

        assert_eq!(pair.left.dimensions(), (100, 80));
        assert_eq!(pair.right.dimensions(), (100, 80));
        // The rotated right view cannot fill the whole rectified frame
        assert!(pair.right_mask.pixels().any(|p| p[0] != 0));
    }
}

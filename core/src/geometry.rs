use nalgebra::{Matrix3, Matrix4, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    pub fn new_ideal(width: u32, height: u32) -> Self {
        let fx = width as f64;
        let fy = width as f64;
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn inverse_matrix(&self) -> Matrix3<f64> {
        self.matrix().try_inverse().unwrap_or(Matrix3::identity())
    }

    pub fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        let x = point.x / point.z;
        let y = point.y / point.z;
        Point2::new(x * self.fx + self.cx, y * self.fy + self.cy)
    }

    pub fn unproject(&self, pixel: Point2<f64>, depth: f64) -> Point3<f64> {
        let x = (pixel.x - self.cx) / self.fx;
        let y = (pixel.y - self.cy) / self.fy;
        Point3::new(x * depth, y * depth, depth)
    }

    /// Pixel to normalized image coordinates, ignoring lens distortion.
    pub fn pixel_to_normalized(&self, pixel: &Point2<f64>) -> Point2<f64> {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    pub fn normalized_to_pixel(&self, norm: &Point2<f64>) -> Point2<f64> {
        Point2::new(norm.x * self.fx + self.cx, norm.y * self.fy + self.cy)
    }
}

/// Rigid transform `x' = R * x + t`.
///
/// Scene poses are stored as `world_to_view`, mapping world coordinates into a
/// camera's reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraExtrinsics {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl CameraExtrinsics {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Builds a `world_to_view` transform from the camera orientation and its
    /// center expressed in world coordinates.
    pub fn from_camera_center(rotation: Matrix3<f64>, center: &Point3<f64>) -> Self {
        let translation = -(rotation * center.coords);
        Self {
            rotation,
            translation,
        }
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * point.coords + self.translation)
    }

    pub fn inverse(&self) -> Self {
        let r_inv = self.rotation.transpose();
        let t_inv = -r_inv * self.translation;
        Self {
            rotation: r_inv,
            translation: t_inv,
        }
    }

    /// Applies `self` first and then `next`.
    pub fn concat(&self, next: &CameraExtrinsics) -> Self {
        Self {
            rotation: next.rotation * self.rotation,
            translation: next.rotation * self.translation + next.translation,
        }
    }

    /// Origin of this frame expressed in the source frame.
    pub fn camera_center(&self) -> Point3<f64> {
        Point3::from(-(self.rotation.transpose() * self.translation))
    }
}

impl Default for CameraExtrinsics {
    fn default() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn new(k1: f64, k2: f64, p1: f64, p2: f64, k3: f64) -> Self {
        Self { k1, k2, p1, p2, k3 }
    }

    pub fn none() -> Self {
        Self {
            k1: 0.0,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
            k3: 0.0,
        }
    }

    pub fn is_none(&self) -> bool {
        *self == Self::none()
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (x * radial + dx, y * radial + dy)
    }

    /// Fixed-point inversion of [`Distortion::apply`].
    pub fn remove(&self, x: f64, y: f64) -> (f64, f64) {
        if self.is_none() {
            return (x, y);
        }
        let mut xd = x;
        let mut yd = y;
        for _ in 0..10 {
            let (xu, yu) = self.apply(xd, yd);
            xd += x - xu;
            yd += y - yu;
        }
        (xd, yd)
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::none()
    }
}

/// Pinhole camera with Brown radial/tangential distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeModel {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
}

impl PinholeModel {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    pub fn undistorted(intrinsics: CameraIntrinsics) -> Self {
        Self::new(intrinsics, Distortion::none())
    }

    pub fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        self.normalized_to_pixel(&Point2::new(point.x / point.z, point.y / point.z))
    }

    pub fn unproject(&self, pixel: &Point2<f64>, depth: f64) -> Point3<f64> {
        let n = self.pixel_to_normalized(pixel);
        Point3::new(n.x * depth, n.y * depth, depth)
    }

    /// Distorted pixel to undistorted normalized image coordinates.
    pub fn pixel_to_normalized(&self, pixel: &Point2<f64>) -> Point2<f64> {
        let n = self.intrinsics.pixel_to_normalized(pixel);
        let (x, y) = self.distortion.remove(n.x, n.y);
        Point2::new(x, y)
    }

    /// Undistorted normalized image coordinates to distorted pixel.
    pub fn normalized_to_pixel(&self, norm: &Point2<f64>) -> Point2<f64> {
        let (x, y) = self.distortion.apply(norm.x, norm.y);
        self.intrinsics.normalized_to_pixel(&Point2::new(x, y))
    }

    pub fn pixel_to_norm(&self) -> PixelToNormalized {
        PixelToNormalized { model: *self }
    }

    pub fn norm_to_pixel(&self) -> NormalizedToPixel {
        NormalizedToPixel { model: *self }
    }
}

/// Maps one 2D coordinate system onto another.
pub trait Point2Transform {
    fn transform(&self, point: &Point2<f64>) -> Point2<f64>;
}

#[derive(Debug, Clone, Copy)]
pub struct PixelToNormalized {
    model: PinholeModel,
}

impl Point2Transform for PixelToNormalized {
    fn transform(&self, point: &Point2<f64>) -> Point2<f64> {
        self.model.pixel_to_normalized(point)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizedToPixel {
    model: PinholeModel,
}

impl Point2Transform for NormalizedToPixel {
    fn transform(&self, point: &Point2<f64>) -> Point2<f64> {
        self.model.normalized_to_pixel(point)
    }
}

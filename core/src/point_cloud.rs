use nalgebra::{Point3, Scalar};

/// Ordered collection of 3D points. Points are only ever appended.
#[derive(Debug, Clone, Default)]
pub struct PointCloud<T: Scalar = f32> {
    pub points: Vec<Point3<T>>,
}

impl<T: Scalar> PointCloud<T> {
    pub fn new(points: Vec<Point3<T>>) -> Self {
        Self { points }
    }

    pub fn push(&mut self, point: Point3<T>) {
        self.points.push(point);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point3<T>> {
        self.points.iter()
    }
}

pub type PointCloudf32 = PointCloud<f32>;
pub type PointCloudf64 = PointCloud<f64>;

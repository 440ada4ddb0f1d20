//! Fusion of the pairwise disparities of a cluster into one disparity image
//! of the center view.

use super::graph::StereoPairGraph;
use super::listener::{Listener, PairDisparity};
use super::loader::ClusterImageLoader;
use super::scene::SceneStructure;
use super::{MvsError, Result};
use cv_core::{ImageDimension, PinholeModel};
use cv_stereo::{
    rectify_stereo_pair, DisparityMap, DisparityParameters, StereoMatcher, StereoRectification,
    INVALID_DISPARITY,
};
use nalgebra::{Point2, Vector3};
use rayon::prelude::*;

/// Disparity image of a center view and the parameters describing it.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedDisparity {
    pub disparity: DisparityMap,
    pub parameters: DisparityParameters,
}

/// Computes the fused disparity of a cluster.
///
/// `images` holds the center image and every neighbor image of the cluster.
/// Any error aborts the run, including a neighbor that cannot be rectified
/// against the center.
pub trait FusedDisparityEngine {
    fn process(
        &mut self,
        scene: &SceneStructure,
        graph: &StereoPairGraph,
        center: usize,
        images: &ClusterImageLoader,
        listener: Option<&mut dyn Listener>,
    ) -> Result<FusedDisparity>;
}

/// Runs a stereo matcher between the center and each neighbor, then keeps the
/// per pixel median of the resulting inverse depths.
///
/// The fused map lives in the center's original pixel grid. It uses the
/// center's intrinsics with a unit baseline and no rectifying rotation, so a
/// disparity `d` at a pixel means depth `fx / d` along that pixel's ray.
pub struct MultiViewToFusedDisparity {
    matcher: Box<dyn StereoMatcher>,
}

impl MultiViewToFusedDisparity {
    pub fn new(matcher: Box<dyn StereoMatcher>) -> Self {
        Self { matcher }
    }
}

impl FusedDisparityEngine for MultiViewToFusedDisparity {
    fn process(
        &mut self,
        scene: &SceneStructure,
        graph: &StereoPairGraph,
        center: usize,
        images: &ClusterImageLoader,
        mut listener: Option<&mut dyn Listener>,
    ) -> Result<FusedDisparity> {
        let center_vertex = graph.vertex(center);
        let center_image = images.image(center).ok_or_else(|| MvsError::Computation {
            center: center_vertex.id.clone(),
            reason: "center image is not loaded".to_string(),
        })?;
        let camera = *scene.camera_of(center_vertex.scene_index)?;
        let dimension = ImageDimension::of(center_image);
        let width = dimension.width as usize;

        let mut samples: Vec<Vec<f32>> = vec![Vec::new(); dimension.area()];

        for (neighbor, neighbor_image) in images.neighbors() {
            let neighbor_vertex = graph.vertex(neighbor);
            let view1_to_view2 =
                scene.view1_to_view2(center_vertex.scene_index, neighbor_vertex.scene_index)?;
            let neighbor_camera = scene.camera_of(neighbor_vertex.scene_index)?;

            let rectification =
                StereoRectification::new(&camera, dimension, neighbor_camera, &view1_to_view2)
                    .map_err(|e| MvsError::Computation {
                        center: center_vertex.id.clone(),
                        reason: format!("cannot rectify pair with {}: {}", neighbor_vertex.id, e),
                    })?;

            let pair = rectify_stereo_pair(&rectification, center_image, neighbor_image);
            let mut disparity = self.matcher.compute(&pair.left, &pair.right)?;
            rectification.invalidate_outside(&mut disparity, &pair);
            let parameters = rectification.disparity_parameters(
                disparity.min_disparity,
                disparity.max_disparity - disparity.min_disparity,
            );

            if let Some(l) = listener.as_deref_mut() {
                l.handle_pair_disparity(&PairDisparity {
                    left_id: &center_vertex.id,
                    right_id: &neighbor_vertex.id,
                    rectified: &pair,
                    disparity: &disparity,
                    parameters: &parameters,
                });
            }

            if width == 0 {
                continue;
            }
            samples.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    let pixel = Point2::new(x as f64, y as f64);
                    if let Some(d) =
                        sample_inverse_depth(&camera, &rectification, &disparity, &parameters, &pixel)
                    {
                        cell.push(d);
                    }
                }
            });
        }

        Ok(fuse_samples(samples, dimension, &camera))
    }
}

/// Disparity in the fused convention (`fx / z`) that a pair measured for a
/// center pixel.
fn sample_inverse_depth(
    camera: &PinholeModel,
    rectification: &StereoRectification,
    disparity: &DisparityMap,
    parameters: &DisparityParameters,
    pixel: &Point2<f64>,
) -> Option<f32> {
    let rect = rectification.view1_pixel_to_rect(pixel)?;
    let (rx, ry) = (rect.x.round(), rect.y.round());
    if rx < 0.0 || ry < 0.0 {
        return None;
    }
    let (rx, ry) = (rx as u32, ry as u32);
    if !disparity.is_valid(rx, ry) {
        return None;
    }

    let n = camera.pixel_to_normalized(pixel);
    let point = parameters.ray_to_3d(&Vector3::new(n.x, n.y, 1.0), disparity.get(rx, ry) as f64)?;
    if point.z <= 0.0 {
        return None;
    }
    Some((camera.intrinsics.fx / point.z) as f32)
}

fn fuse_samples(
    mut samples: Vec<Vec<f32>>,
    dimension: ImageDimension,
    camera: &PinholeModel,
) -> FusedDisparity {
    let fused: Vec<f32> = samples
        .par_iter_mut()
        .map(|s| median(s).unwrap_or(INVALID_DISPARITY))
        .collect();

    let max = fused
        .iter()
        .copied()
        .filter(|d| *d > 0.0)
        .fold(0.0f32, f32::max)
        .ceil()
        .max(1.0) as i32;

    let mut disparity = DisparityMap::new(dimension.width, dimension.height, 0, max);
    disparity.data = fused;

    FusedDisparity {
        disparity,
        parameters: DisparityParameters::new(0, max, 1.0, camera.intrinsics),
    }
}

fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

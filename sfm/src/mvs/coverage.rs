//! How well a candidate center view is covered by its stereo neighbors.

use cv_core::{ImageDimension, PinholeModel};
use cv_stereo::StereoRectification;
use nalgebra::Point2;

/// Scores a center view from the neighbors it could be paired with.
///
/// Call [`initialize`](CoverageScorer::initialize) once per center, then
/// [`add_view`](CoverageScorer::add_view) for each qualifying neighbor, then
/// [`process`](CoverageScorer::process). Initializing again discards all
/// previous state.
pub trait CoverageScorer {
    fn initialize(&mut self, camera: &PinholeModel, dimension: ImageDimension);

    /// `rectification` has the center as view 1 and the neighbor as view 2.
    fn add_view(
        &mut self,
        rectification: &StereoRectification,
        dimension: ImageDimension,
        quality_3d: f64,
    );

    /// Larger is better.
    fn process(&mut self) -> f64;
}

/// Samples the center image on a coarse grid and measures the fraction of
/// it that the neighbors can see, weighted by pair quality.
///
/// A cell covered by neighbors of quality `q_1..q_k` counts as
/// `1 - (1 - q_1)...(1 - q_k)`. The score is the mean over all cells, so it
/// is always in `[0, 1]` and a center without neighbors scores zero.
#[derive(Debug, Clone)]
pub struct RectifiedCoverageScorer {
    max_side: usize,
    cols: usize,
    rows: usize,
    cell_width: f64,
    cell_height: f64,
    /// Product of `1 - q` over the neighbors seeing each cell
    uncovered: Vec<f64>,
}

impl Default for RectifiedCoverageScorer {
    fn default() -> Self {
        Self::new(40)
    }
}

impl RectifiedCoverageScorer {
    pub fn new(max_side: usize) -> Self {
        Self {
            max_side: max_side.max(1),
            cols: 0,
            rows: 0,
            cell_width: 0.0,
            cell_height: 0.0,
            uncovered: Vec::new(),
        }
    }

    pub fn grid_shape(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    fn cell_center(&self, col: usize, row: usize) -> Point2<f64> {
        Point2::new(
            (col as f64 + 0.5) * self.cell_width - 0.5,
            (row as f64 + 0.5) * self.cell_height - 0.5,
        )
    }
}

impl CoverageScorer for RectifiedCoverageScorer {
    fn initialize(&mut self, _camera: &PinholeModel, dimension: ImageDimension) {
        self.uncovered.clear();
        if dimension.is_empty() {
            self.cols = 0;
            self.rows = 0;
            return;
        }

        let (w, h) = (dimension.width as usize, dimension.height as usize);
        let longest = w.max(h);
        let cells = self.max_side.min(longest);
        self.cols = ((w * cells + longest - 1) / longest).max(1);
        self.rows = ((h * cells + longest - 1) / longest).max(1);
        self.cell_width = w as f64 / self.cols as f64;
        self.cell_height = h as f64 / self.rows as f64;
        self.uncovered.resize(self.cols * self.rows, 1.0);
    }

    fn add_view(
        &mut self,
        rectification: &StereoRectification,
        dimension: ImageDimension,
        quality_3d: f64,
    ) {
        let keep = 1.0 - quality_3d.clamp(0.0, 1.0);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let pixel = self.cell_center(col, row);
                let seen = rectification
                    .view1_pixel_to_rect(&pixel)
                    .and_then(|rect| rectification.rect_to_view2_pixel(&rect))
                    .is_some_and(|p| dimension.contains(p.x, p.y));
                if seen {
                    self.uncovered[row * self.cols + col] *= keep;
                }
            }
        }
    }

    fn process(&mut self) -> f64 {
        if self.uncovered.is_empty() {
            return 0.0;
        }
        let covered: f64 = self.uncovered.iter().map(|u| 1.0 - u).sum();
        covered / self.uncovered.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::{CameraExtrinsics, CameraIntrinsics};
    use nalgebra::{Matrix3, Rotation3, Vector3};

    fn camera() -> PinholeModel {
        PinholeModel::undistorted(CameraIntrinsics::new(80.0, 80.0, 40.0, 30.0, 80, 60))
    }

    fn dim() -> ImageDimension {
        ImageDimension::new(80, 60)
    }

    fn rectification(view1_to_view2: CameraExtrinsics) -> StereoRectification {
        StereoRectification::new(&camera(), dim(), &camera(), &view1_to_view2).unwrap()
    }

    #[test]
    fn test_grid_shape_follows_aspect() {
        let mut scorer = RectifiedCoverageScorer::new(40);
        scorer.initialize(&camera(), dim());
        assert_eq!(scorer.grid_shape(), (40, 30));

        let mut scorer = RectifiedCoverageScorer::new(40);
        scorer.initialize(&camera(), ImageDimension::new(10, 4));
        assert_eq!(scorer.grid_shape(), (10, 4));
    }

    #[test]
    fn test_no_neighbors_scores_zero() {
        let mut scorer = RectifiedCoverageScorer::default();
        scorer.initialize(&camera(), dim());
        assert_eq!(scorer.process(), 0.0);

        let mut untouched = RectifiedCoverageScorer::default();
        assert_eq!(untouched.process(), 0.0);
    }

    #[test]
    fn test_parallel_neighbor_covers_everything() {
        let sideways = CameraExtrinsics::new(Matrix3::identity(), Vector3::new(-0.5, 0.0, 0.0));
        let mut scorer = RectifiedCoverageScorer::default();
        scorer.initialize(&camera(), dim());
        scorer.add_view(&rectification(sideways), dim(), 0.8);
        assert!((scorer.process() - 0.8).abs() < 1e-12);

        // A second identical neighbor fills in the remainder multiplicatively
        scorer.add_view(&rectification(sideways), dim(), 0.5);
        assert!((scorer.process() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_rotated_neighbor_covers_part() {
        let turned = CameraExtrinsics::new(
            Rotation3::from_euler_angles(0.0, 0.35, 0.0).into_inner(),
            Vector3::new(-0.5, 0.0, 0.0),
        );
        let mut scorer = RectifiedCoverageScorer::default();
        scorer.initialize(&camera(), dim());
        scorer.add_view(&rectification(turned), dim(), 1.0);
        let score = scorer.process();
        assert!(score > 0.1 && score < 0.9, "score {score}");
    }

    #[test]
    fn test_initialize_resets() {
        let sideways = CameraExtrinsics::new(Matrix3::identity(), Vector3::new(-0.5, 0.0, 0.0));
        let mut scorer = RectifiedCoverageScorer::default();
        scorer.initialize(&camera(), dim());
        scorer.add_view(&rectification(sideways), dim(), 0.6);
        let first = scorer.process();

        scorer.initialize(&camera(), dim());
        scorer.add_view(&rectification(sideways), dim(), 0.6);
        assert_eq!(scorer.process(), first);
    }
}

use super::fused::FusedDisparity;
use cv_stereo::{DisparityMap, DisparityParameters, RectifiedPair};
use image::GrayImage;

/// Disparity computed between a center and one of its neighbors.
#[derive(Debug, Clone, Copy)]
pub struct PairDisparity<'a> {
    pub left_id: &'a str,
    pub right_id: &'a str,
    pub rectified: &'a RectifiedPair,
    pub disparity: &'a DisparityMap,
    pub parameters: &'a DisparityParameters,
}

/// Observer for intermediate results. Nothing it does affects the run.
pub trait Listener {
    fn handle_pair_disparity(&mut self, _pair: &PairDisparity<'_>) {}

    /// `mask` marks, with non-zero values, pixels left out of the cloud.
    fn handle_fused_disparity(&mut self, _center_id: &str, _fused: &FusedDisparity, _mask: &GrayImage) {}
}

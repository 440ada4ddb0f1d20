//! Multi-view stereo: dense point clouds from views with known poses.
//!
//! The entry point is [`MultiViewStereo`]. It picks center views greedily by
//! coverage score, fuses each center's cluster of stereo neighbors into one
//! disparity image and merges those images into a single cloud.

pub mod cloud;
pub mod config;
pub mod coverage;
pub mod error;
pub mod fused;
pub mod graph;
pub mod listener;
pub mod loader;
pub mod lookup;
pub mod pipeline;
pub mod scene;
pub mod selector;

pub use cloud::{CloudAccumulator, DisparityCloud};
pub use config::{MvsConfig, NeighborPolicy};
pub use coverage::{CoverageScorer, RectifiedCoverageScorer};
pub use error::{MvsError, Result};
pub use fused::{FusedDisparity, FusedDisparityEngine, MultiViewToFusedDisparity};
pub use graph::{StereoEdge, StereoPairGraph, Vertex};
pub use listener::{Listener, PairDisparity};
pub use loader::ClusterImageLoader;
pub use lookup::{LookUpImageFiles, LookUpImages, LookUpImagesMemory};
pub use pipeline::{MultiViewStereo, SelectedCenter};
pub use scene::{SceneStructure, SceneView};
pub use selector::{ClaimedViews, ViewInfo};

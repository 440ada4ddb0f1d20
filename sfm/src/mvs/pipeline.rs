//! Greedy multi-view stereo over a graph of stereo pairs.
//!
//! Every view is scored by how well its neighbors cover it. Views are then
//! visited best first; each unclaimed view becomes the center of a cluster
//! made of its qualifying neighbors, their disparities are fused into one
//! disparity image of the center, and that image is merged into the cloud.
//! Views used by a cluster are claimed and never become centers later.

use super::cloud::{CloudAccumulator, DisparityCloud};
use super::config::MvsConfig;
use super::coverage::{CoverageScorer, RectifiedCoverageScorer};
use super::fused::{FusedDisparityEngine, MultiViewToFusedDisparity};
use super::graph::StereoPairGraph;
use super::listener::Listener;
use super::loader::ClusterImageLoader;
use super::lookup::LookUpImages;
use super::scene::SceneStructure;
use super::selector::{order_by_score, score_views, select_neighbors, ClaimedViews};
use super::{MvsError, Result};
use cv_core::{ImageDimension, PointCloudf64};
use cv_stereo::{empty_mask, StereoMatcher};

/// A view that was used as a center, in selection order.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedCenter {
    pub vertex: usize,
    pub id: String,
    pub score: f64,
    /// Ids of the neighbors fused into this center
    pub neighbors: Vec<String>,
    /// Images held while fusing this center
    pub images_loaded: usize,
    pub points_added: usize,
}

/// Builds one point cloud from a scene by greedily fusing clusters of stereo
/// pairs around the best-scoring center views.
pub struct MultiViewStereo<L: LookUpImages, S: CoverageScorer = RectifiedCoverageScorer> {
    lookup: L,
    config: MvsConfig,
    scorer: S,
    engine: Option<Box<dyn FusedDisparityEngine>>,
    cloud: Box<dyn CloudAccumulator>,
    listener: Option<Box<dyn Listener>>,
    loader: ClusterImageLoader,
    centers: Vec<SelectedCenter>,
}

impl<L: LookUpImages> MultiViewStereo<L> {
    pub fn new(lookup: L) -> Self {
        let config = MvsConfig::default();
        Self {
            lookup,
            scorer: RectifiedCoverageScorer::new(config.coverage_max_side),
            config,
            engine: None,
            cloud: Box::new(DisparityCloud::default()),
            listener: None,
            loader: ClusterImageLoader::new(),
            centers: Vec::new(),
        }
    }

    /// Also resizes the default coverage grid.
    pub fn with_config(mut self, config: MvsConfig) -> Self {
        self.scorer = RectifiedCoverageScorer::new(config.coverage_max_side);
        self.config = config;
        self
    }
}

impl<L: LookUpImages, S: CoverageScorer + Clone + Send + Sync> MultiViewStereo<L, S> {
    /// Replaces the coverage scorer. When scoring in parallel each worker
    /// scores with its own clone.
    pub fn with_scorer<S2>(self, scorer: S2) -> MultiViewStereo<L, S2>
    where
        S2: CoverageScorer + Clone + Send + Sync,
    {
        MultiViewStereo {
            lookup: self.lookup,
            config: self.config,
            scorer,
            engine: self.engine,
            cloud: self.cloud,
            listener: self.listener,
            loader: self.loader,
            centers: self.centers,
        }
    }

    /// Sets the run settings without touching the scorer.
    pub fn set_config(&mut self, config: MvsConfig) {
        self.config = config;
    }

    /// Fuses clusters with [`MultiViewToFusedDisparity`] around `matcher`.
    pub fn with_stereo_matcher<M: StereoMatcher + 'static>(mut self, matcher: M) -> Self {
        self.engine = Some(Box::new(MultiViewToFusedDisparity::new(Box::new(matcher))));
        self
    }

    pub fn with_fused_engine(mut self, engine: Box<dyn FusedDisparityEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_cloud_accumulator(mut self, cloud: Box<dyn CloudAccumulator>) -> Self {
        self.cloud = cloud;
        self
    }

    pub fn with_listener(mut self, listener: Box<dyn Listener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn config(&self) -> &MvsConfig {
        &self.config
    }

    pub fn cloud(&self) -> &PointCloudf64 {
        self.cloud.cloud()
    }

    pub fn centers(&self) -> &[SelectedCenter] {
        &self.centers
    }

    /// Largest number of images held at once during the last run.
    pub fn peak_loaded_images(&self) -> usize {
        self.loader.peak_loaded()
    }

    /// Runs the whole selection and fusion loop.
    ///
    /// Results of a previous run are discarded. On error the cloud keeps the
    /// points of every center completed before the failure.
    pub fn process(&mut self, scene: &SceneStructure, graph: &StereoPairGraph) -> Result<()> {
        self.config.validate()?;
        if self.engine.is_none() {
            return Err(MvsError::configuration(
                "no fused disparity engine or stereo matcher configured",
            ));
        }
        for vertex in graph.vertices() {
            scene.camera_of(vertex.scene_index)?;
        }

        self.centers.clear();
        self.loader = ClusterImageLoader::new();
        self.cloud.configure(&self.config);
        self.cloud.reset();

        let dimensions = graph
            .vertices()
            .iter()
            .map(|v| {
                self.lookup.load_shape(&v.id).map_err(|source| MvsError::Resource {
                    id: v.id.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<ImageDimension>>>()?;

        let views = score_views(
            &self.scorer,
            scene,
            graph,
            &dimensions,
            self.config.minimum_quality_3d,
            self.config.parallel_scoring,
        )?;
        let order = order_by_score(&views, graph);

        let mut claimed = ClaimedViews::new(graph.len());
        for vertex in order {
            if claimed.is_claimed(vertex) {
                continue;
            }
            match self.fuse_center(scene, graph, vertex, views[vertex].score, &mut claimed) {
                Ok(()) => {}
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Skipping candidate {}: {}", graph.vertex(vertex).id, e);
                }
                Err(e) => {
                    self.loader.reset();
                    return Err(e);
                }
            }
        }

        tracing::info!(
            "Selected {} centers from {} views, {} claimed, cloud has {} points",
            self.centers.len(),
            graph.len(),
            claimed.count(),
            self.cloud.cloud().len()
        );
        Ok(())
    }

    fn fuse_center(
        &mut self,
        scene: &SceneStructure,
        graph: &StereoPairGraph,
        vertex: usize,
        score: f64,
        claimed: &mut ClaimedViews,
    ) -> Result<()> {
        let center = graph.vertex(vertex);
        self.loader.reset();

        let neighbors = select_neighbors(
            graph,
            vertex,
            self.config.minimum_quality_3d,
            self.config.neighbor_policy,
            claimed,
        );
        if neighbors.is_empty() {
            return Err(MvsError::InsufficientData(format!(
                "view '{}' has no usable stereo neighbors",
                center.id
            )));
        }
        for &n in &neighbors {
            tracing::debug!("Center {} uses neighbor {}", center.id, graph.vertex(n).id);
        }
        self.loader.load_neighbors(&self.lookup, graph, &neighbors)?;

        self.loader.load_center(&self.lookup, graph, vertex)?;
        let images_loaded = self.loader.len();

        let Some(engine) = self.engine.as_mut() else {
            return Err(MvsError::configuration("no fused disparity engine configured"));
        };
        let listener = self.listener.as_mut().map(|l| &mut **l as &mut dyn Listener);
        let fused = engine
            .process(scene, graph, vertex, &self.loader, listener)
            .map_err(|e| match e {
                e @ MvsError::Computation { .. } => e,
                other => MvsError::Computation {
                    center: center.id.clone(),
                    reason: other.to_string(),
                },
            })?;

        let mask = empty_mask(&fused.disparity);
        if let Some(l) = self.listener.as_mut() {
            l.handle_fused_disparity(&center.id, &fused, &mask);
        }

        let camera = scene.camera_of(center.scene_index)?;
        let points_added = self.cloud.add_disparity(
            &fused.disparity,
            &mask,
            &scene.world_to_view(center.scene_index)?,
            &fused.parameters,
            &camera.pixel_to_norm(),
            &camera.norm_to_pixel(),
        )?;

        for &n in &neighbors {
            claimed.claim(n);
        }
        claimed.claim(vertex);
        self.loader.reset();

        tracing::info!(
            "Center {} (score {:.4}): {} neighbors, {} points added",
            center.id,
            score,
            neighbors.len(),
            points_added
        );
        self.centers.push(SelectedCenter {
            vertex,
            id: center.id.clone(),
            score,
            neighbors: neighbors.iter().map(|&n| graph.vertex(n).id.clone()).collect(),
            images_loaded,
            points_added,
        });
        Ok(())
    }
}

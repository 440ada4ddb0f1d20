//! Scoring of candidate center views and the order they are visited in.

use super::config::NeighborPolicy;
use super::coverage::CoverageScorer;
use super::graph::StereoPairGraph;
use super::scene::SceneStructure;
use super::Result;
use cv_core::ImageDimension;
use cv_stereo::StereoRectification;
use rayon::prelude::*;

/// Per vertex state derived during a run, addressed by the vertex's dense index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewInfo {
    pub vertex: usize,
    pub dimension: ImageDimension,
    /// Coverage score, negative until scored
    pub score: f64,
}

impl ViewInfo {
    pub fn new(vertex: usize, dimension: ImageDimension) -> Self {
        Self {
            vertex,
            dimension,
            score: -1.0,
        }
    }
}

/// Views already consumed as a center or as part of a center's cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimedViews {
    claimed: Vec<bool>,
    count: usize,
}

impl ClaimedViews {
    pub fn new(len: usize) -> Self {
        Self {
            claimed: vec![false; len],
            count: 0,
        }
    }

    /// Returns true if the view was not claimed before.
    pub fn claim(&mut self, vertex: usize) -> bool {
        let newly = !self.claimed[vertex];
        if newly {
            self.claimed[vertex] = true;
            self.count += 1;
        }
        newly
    }

    pub fn is_claimed(&self, vertex: usize) -> bool {
        self.claimed[vertex]
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

/// Coverage score of one vertex as a center.
///
/// Neighbors whose pair cannot be rectified (shared camera center, pure
/// forward motion) are left out of the score.
pub fn score_view<S: CoverageScorer>(
    scorer: &mut S,
    scene: &SceneStructure,
    graph: &StereoPairGraph,
    dimensions: &[ImageDimension],
    vertex: usize,
    minimum_quality_3d: f64,
) -> Result<f64> {
    let center = graph.vertex(vertex);
    let camera = scene.camera_of(center.scene_index)?;
    scorer.initialize(camera, dimensions[vertex]);

    let mut qualified = 0usize;
    let mut quality_sum = 0.0;
    for edge in graph.qualifying_edges(vertex, minimum_quality_3d) {
        let neighbor = graph.vertex(edge.other(vertex));
        let view1_to_view2 = scene.view1_to_view2(center.scene_index, neighbor.scene_index)?;
        let neighbor_camera = scene.camera_of(neighbor.scene_index)?;

        let rectification = match StereoRectification::new(
            camera,
            dimensions[vertex],
            neighbor_camera,
            &view1_to_view2,
        ) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Skipping pair {} -> {}: {}", center.id, neighbor.id, e);
                continue;
            }
        };

        scorer.add_view(&rectification, dimensions[neighbor.index], edge.quality_3d());
        qualified += 1;
        quality_sum += edge.quality_3d();
    }

    let score = scorer.process();
    tracing::debug!(
        "View {}: {} of {} connections qualified, avg quality {:.3}, score {:.4}",
        center.id,
        qualified,
        center.edges().len(),
        if qualified > 0 { quality_sum / qualified as f64 } else { 0.0 },
        score
    );
    Ok(score)
}

/// Scores every vertex of the graph. Each vertex is scored independently, so
/// the parallel and sequential paths produce the same values.
pub fn score_views<S>(
    scorer: &S,
    scene: &SceneStructure,
    graph: &StereoPairGraph,
    dimensions: &[ImageDimension],
    minimum_quality_3d: f64,
    parallel: bool,
) -> Result<Vec<ViewInfo>>
where
    S: CoverageScorer + Clone + Send + Sync,
{
    let score_one = |scorer: &mut S, vertex: usize| -> Result<ViewInfo> {
        let score = score_view(scorer, scene, graph, dimensions, vertex, minimum_quality_3d)?;
        Ok(ViewInfo {
            score,
            ..ViewInfo::new(vertex, dimensions[vertex])
        })
    };

    if parallel {
        (0..graph.len())
            .into_par_iter()
            .map_init(|| scorer.clone(), |s, vertex| score_one(s, vertex))
            .collect()
    } else {
        let mut s = scorer.clone();
        (0..graph.len()).map(|vertex| score_one(&mut s, vertex)).collect()
    }
}

/// Visiting order: descending score, ties broken by ascending view id.
pub fn order_by_score(views: &[ViewInfo], graph: &StereoPairGraph) -> Vec<usize> {
    let mut order: Vec<usize> = views.iter().map(|v| v.vertex).collect();
    order.sort_by(|&a, &b| {
        views[b]
            .score
            .total_cmp(&views[a].score)
            .then_with(|| graph.vertex(a).id.cmp(&graph.vertex(b).id))
    });
    order
}

/// Neighbors of `center` eligible to join its cluster.
pub fn select_neighbors(
    graph: &StereoPairGraph,
    center: usize,
    minimum_quality_3d: f64,
    policy: NeighborPolicy,
    claimed: &ClaimedViews,
) -> Vec<usize> {
    let mut neighbors = graph.qualifying_neighbors(center, minimum_quality_3d);
    if policy == NeighborPolicy::ExcludeClaimed {
        neighbors.retain(|&n| !claimed.is_claimed(n));
    }
    // Parallel edges between the same two views load the image once
    let mut seen = vec![false; graph.len()];
    neighbors.retain(|&n| !std::mem::replace(&mut seen[n], true));
    neighbors
}

use super::{MvsError, Result};
use serde::{Deserialize, Serialize};

/// How neighbors already consumed by an earlier cluster are treated when
/// gathering the cluster of a new center.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborPolicy {
    /// Any neighbor passing the quality threshold joins the cluster, even if an
    /// earlier cluster already used it. Claimed views still never become centers.
    #[default]
    ReuseClaimed,
    /// Claimed views are left out of later clusters.
    ExcludeClaimed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MvsConfig {
    /// Minimum `quality_3d` of a pair for it to be used as a stereo pair
    pub minimum_quality_3d: f64,
    pub neighbor_policy: NeighborPolicy,
    /// Score candidate centers on the global rayon pool
    pub parallel_scoring: bool,
    /// Disparity difference under which a new pixel duplicates an existing point
    pub disparity_similar_tol: f64,
    /// Cells along the longest side of the coverage grid
    pub coverage_max_side: usize,
}

impl Default for MvsConfig {
    fn default() -> Self {
        Self {
            minimum_quality_3d: 0.25,
            neighbor_policy: NeighborPolicy::ReuseClaimed,
            parallel_scoring: false,
            disparity_similar_tol: 1.0,
            coverage_max_side: 40,
        }
    }
}

impl MvsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_minimum_quality_3d(mut self, quality: f64) -> Self {
        self.minimum_quality_3d = quality;
        self
    }

    pub fn with_neighbor_policy(mut self, policy: NeighborPolicy) -> Self {
        self.neighbor_policy = policy;
        self
    }

    pub fn with_parallel_scoring(mut self, parallel: bool) -> Self {
        self.parallel_scoring = parallel;
        self
    }

    pub fn with_disparity_similar_tol(mut self, tol: f64) -> Self {
        self.disparity_similar_tol = tol;
        self
    }

    pub fn with_coverage_max_side(mut self, cells: usize) -> Self {
        self.coverage_max_side = cells;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.minimum_quality_3d) {
            return Err(MvsError::configuration(format!(
                "minimum_quality_3d must be in [0, 1], got {}",
                self.minimum_quality_3d
            )));
        }
        if self.disparity_similar_tol.is_nan() || self.disparity_similar_tol < 0.0 {
            return Err(MvsError::configuration(format!(
                "disparity_similar_tol must be >= 0, got {}",
                self.disparity_similar_tol
            )));
        }
        if self.coverage_max_side == 0 {
            return Err(MvsError::configuration("coverage_max_side must be >= 1"));
        }
        Ok(())
    }

    /// Parses a JSON document. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MvsError::configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MvsError::configuration(format!("failed to serialize config: {e}")))
    }
}

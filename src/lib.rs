//! Dense multi-view stereo point clouds from scenes with known camera poses.

pub use cv_core as core;
pub use cv_sfm as sfm;
pub use cv_stereo as stereo;

pub use cv_sfm::mvs::{MultiViewStereo, MvsConfig, MvsError};

/// Initialize the global Rayon pool used while scoring views and matching
/// pairs.
///
/// Call once at startup before running a reconstruction. Repeated calls
/// return the outcome of the first one.
pub fn init_thread_pool(num_threads: Option<usize>) -> cv_core::Result<cv_core::PoolSize> {
    cv_core::init_global_thread_pool(num_threads)
}

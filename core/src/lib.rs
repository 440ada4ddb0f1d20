pub mod error;
pub mod geometry;
pub mod image;
pub mod point_cloud;
pub mod runtime;

pub use error::*;
pub use geometry::*;
pub use self::image::*;
pub use point_cloud::*;
pub use runtime::{current_cpu_threads, init_global_thread_pool, PoolSize};

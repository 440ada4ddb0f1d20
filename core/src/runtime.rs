use crate::{Error, Result};
use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

const CPU_THREADS_ENV: &str = "RUSTCV_CPU_THREADS";

/// Where the size of the global pool was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSize {
    Requested(usize),
    Environment(usize),
    RayonDefault,
}

impl PoolSize {
    fn threads(self) -> Option<usize> {
        match self {
            PoolSize::Requested(n) | PoolSize::Environment(n) => Some(n),
            PoolSize::RayonDefault => None,
        }
    }
}

#[derive(Debug, Clone)]
enum PoolFailure {
    Invalid(String),
    Build(String),
}

impl From<&PoolFailure> for Error {
    fn from(failure: &PoolFailure) -> Self {
        match failure {
            PoolFailure::Invalid(msg) => Error::invalid_input(msg.clone()),
            PoolFailure::Build(msg) => Error::runtime(msg.clone()),
        }
    }
}

static THREAD_POOL: OnceLock<std::result::Result<PoolSize, PoolFailure>> = OnceLock::new();

/// Initialize the global Rayon pool shared by view scoring, block matching
/// and rectification.
///
/// An explicit `num_threads` wins over `RUSTCV_CPU_THREADS`, which wins over
/// the Rayon default. Only the first call configures the pool; later calls
/// return its outcome unchanged.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<PoolSize> {
    THREAD_POOL
        .get_or_init(|| {
            let size = match num_threads {
                Some(n) => PoolSize::Requested(n),
                None => pool_size_from_env()?,
            };
            if size.threads() == Some(0) {
                return Err(PoolFailure::Invalid("thread count must be >= 1".to_string()));
            }

            let mut builder = ThreadPoolBuilder::new();
            if let Some(n) = size.threads() {
                builder = builder.num_threads(n);
            }
            builder
                .build_global()
                .map(|()| size)
                .map_err(|e| PoolFailure::Build(e.to_string()))
        })
        .as_ref()
        .map(|size| *size)
        .map_err(Error::from)
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

fn pool_size_from_env() -> std::result::Result<PoolSize, PoolFailure> {
    match env::var(CPU_THREADS_ENV) {
        Ok(raw) => parse_thread_count(&raw).map(PoolSize::Environment),
        Err(env::VarError::NotPresent) => Ok(PoolSize::RayonDefault),
        Err(e) => Err(PoolFailure::Invalid(format!("{CPU_THREADS_ENV}: {e}"))),
    }
}

fn parse_thread_count(raw: &str) -> std::result::Result<usize, PoolFailure> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(PoolFailure::Invalid(format!("{CPU_THREADS_ENV} must be >= 1"))),
        Ok(n) => Ok(n),
        Err(_) => Err(PoolFailure::Invalid(format!(
            "{CPU_THREADS_ENV} must be a positive integer, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_thread_count() {
        assert_eq!(parse_thread_count("4").ok(), Some(4));
        assert_eq!(parse_thread_count(" 2 ").ok(), Some(2));
        assert!(matches!(parse_thread_count("0"), Err(PoolFailure::Invalid(_))));
        match parse_thread_count("many") {
            Err(PoolFailure::Invalid(msg)) => assert!(msg.contains("positive integer")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_failures_map_to_core_errors() {
        let invalid = Error::from(&PoolFailure::Invalid("bad".to_string()));
        assert!(matches!(invalid, Error::InvalidInput(_)));
        let build = Error::from(&PoolFailure::Build("taken".to_string()));
        assert!(matches!(build, Error::RuntimeError(_)));
    }

    #[test]
    fn test_pool_size_threads() {
        assert_eq!(PoolSize::Requested(3).threads(), Some(3));
        assert_eq!(PoolSize::Environment(5).threads(), Some(5));
        assert_eq!(PoolSize::RayonDefault.threads(), None);
    }
}

//! Configuration of threaded assembly passes.
use crate::error::AssemblyError;
use serde::{Deserialize, Serialize};

/// Number of elements whose cached contributions are batched before they are flushed into the
/// global matrix.
pub const DEFAULT_CACHE_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Number of workers, each owning one contiguous part of the active element range.
    ///
    /// With `None`, the pass runs on the current rayon pool with one worker per pool thread.
    /// With `Some(n)`, a dedicated pool with `n` threads is built for the pass.
    pub num_threads: Option<usize>,
    /// Number of processed elements after which a worker flushes its cache.
    pub cache_batch_size: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            cache_batch_size: DEFAULT_CACHE_BATCH_SIZE,
        }
    }
}

impl AssemblyConfig {
    pub fn with_num_threads(self, num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..self
        }
    }

    pub fn with_cache_batch_size(self, cache_batch_size: usize) -> Self {
        Self {
            cache_batch_size,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), AssemblyError> {
        if self.num_threads == Some(0) {
            return Err(AssemblyError::InvalidConfig(
                "the number of threads must be positive".to_string(),
            ));
        }
        if self.cache_batch_size == 0 {
            return Err(AssemblyError::InvalidConfig(
                "the cache batch size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The number of workers used for a pass.
    pub fn num_workers(&self) -> usize {
        self.num_threads
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }
}

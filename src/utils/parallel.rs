use log::debug;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::DEFAULT_CHUNK_SIZE;

#[derive(Error, Debug)]
pub enum ParallelError {
    #[error("Thread error: {0}")]
    ThreadError(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),
}

/// Configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Number of threads to use
    pub threads: usize,

    /// Number of items handled by one task
    pub chunk_size: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        ParallelConfig {
            threads: num_cpus::get(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Runs data-parallel maps on a dedicated thread pool.
///
/// Results are always placed by index, never by completion order, so the
/// output is identical to a serial evaluation.
pub struct ParallelExecutor {
    /// Thread pool
    pool: rayon::ThreadPool,

    /// Configuration
    config: ParallelConfig,
}

impl ParallelExecutor {
    /// Create a new parallel executor
    pub fn new(config: Option<ParallelConfig>) -> Result<Self, ParallelError> {
        let config = config.unwrap_or_default();

        if config.chunk_size == 0 {
            return Err(ParallelError::InvalidChunkSize(0));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| {
                ParallelError::ThreadError(format!("Failed to build thread pool: {}", e))
            })?;

        debug!(
            "Parallel executor: {} threads, chunk size {}",
            pool.current_num_threads(),
            config.chunk_size
        );
        Ok(ParallelExecutor { pool, config })
    }

    /// Number of worker threads in the pool
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Sets `slots[i] = f(i)` for every slot.
    ///
    /// The slots are split into disjoint chunks of `chunk_size`; each task
    /// owns exactly one chunk, so no synchronization is needed between tasks.
    pub fn fill_slots<U, F>(&self, slots: &mut [U], f: F)
    where
        U: Send,
        F: Fn(usize) -> U + Send + Sync,
    {
        let chunk_size = self.config.chunk_size;
        self.pool.install(|| {
            slots
                .par_chunks_mut(chunk_size)
                .enumerate()
                .for_each(|(chunk_idx, chunk)| {
                    let base = chunk_idx * chunk_size;
                    for (offset, slot) in chunk.iter_mut().enumerate() {
                        *slot = f(base + offset);
                    }
                });
        });
    }

    /// Maps `f` over `items` in parallel, keeping input order.
    pub fn map_ordered<T, U, F>(&self, items: &[T], f: F) -> Vec<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Send + Sync,
    {
        self.pool.install(|| items.par_iter().map(|item| f(item)).collect())
    }
}

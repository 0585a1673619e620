//! Trial executors
//!
//! A batch is split into contiguous chunks of trial indices. An executor only
//! decides *where* chunks run; every trial derives its own RNG from its index,
//! so the aggregated result does not depend on the executor or the chunking.

use std::ops::Range;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use super::monte_carlo::ChunkReport;
use crate::error::{Result, SimError};

/// Contiguous range of trial indices handled as one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialChunk {
    pub index: usize,
    pub trials: Range<u32>,
}

impl TrialChunk {
    pub fn len(&self) -> u32 {
        self.trials.end - self.trials.start
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

/// Split `trials` into `workers` chunks whose sizes differ by at most one.
pub fn partition(trials: u32, workers: usize) -> Vec<TrialChunk> {
    let workers = workers.max(1) as u32;
    let base = trials / workers;
    let extra = trials % workers;

    let mut chunks = Vec::with_capacity(workers as usize);
    let mut start = 0;
    for index in 0..workers {
        let size = base + u32::from(index < extra);
        if size == 0 {
            continue;
        }
        chunks.push(TrialChunk { index: index as usize, trials: start..start + size });
        start += size;
    }
    chunks
}

/// Work run for one chunk.
pub type ChunkFn<'a> = dyn Fn(&TrialChunk) -> ChunkReport + Sync + 'a;

/// Strategy for running trial chunks.
pub trait TrialExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run every chunk and return one report per chunk, in any order.
    fn execute(&self, chunks: &[TrialChunk], run: &ChunkFn<'_>) -> Result<Vec<ChunkReport>>;
}

/// Runs chunks on a dedicated rayon pool sized to the chunk count.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonExecutor;

impl TrialExecutor for RayonExecutor {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn execute(&self, chunks: &[TrialChunk], run: &ChunkFn<'_>) -> Result<Vec<ChunkReport>> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(chunks.len().max(1))
            .thread_name(|i| format!("bv-trial-{i}"))
            .build()
            .map_err(|e| SimError::Config(format!("failed to build worker pool: {e}")))?;

        Ok(pool.install(|| chunks.par_iter().map(run).collect()))
    }
}

/// Runs chunks one after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

impl TrialExecutor for SequentialExecutor {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn execute(&self, chunks: &[TrialChunk], run: &ChunkFn<'_>) -> Result<Vec<ChunkReport>> {
        Ok(chunks.iter().map(run).collect())
    }
}

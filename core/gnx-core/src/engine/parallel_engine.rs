//! Parallel Execution Engine — Rayon-based parallel scan/aggregate execution
//!
//! Row batches are always split at the same fixed chunk boundaries, whether
//! the chunks run on the pool or sequentially, and results are concatenated in
//! chunk order. Output therefore never depends on the thread count.

use crate::error::{GnxError, GnxResult};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Rows per work unit for scans and aggregations
pub const SCAN_CHUNK_ROWS: usize = 1024;

/// Parallelization policy for the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelizationPolicy {
    /// Automatically determine the number of threads based on system resources
    #[default]
    Auto,
    /// Use a fixed number of threads
    Fixed(usize),
    /// Start with half of the CPUs and scale tasks with workload size
    Adaptive,
}

/// Parallel execution engine using Rayon thread pool
pub struct ParallelExecutionEngine {
    thread_pool: Arc<rayon::ThreadPool>,
    policy: ParallelizationPolicy,
    /// Minimum rows per task before a batch is split across threads
    threshold: usize,
}

impl ParallelExecutionEngine {
    /// Create a new parallel execution engine with the specified policy
    pub fn new(policy: ParallelizationPolicy, threshold: usize) -> GnxResult<Self> {
        if let ParallelizationPolicy::Fixed(0) = policy {
            return Err(GnxError::InvalidArguments(
                "Thread count must be greater than 0".to_string(),
            ));
        }
        let num_threads = Self::determine_thread_count(policy);

        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("gnx-scan-{}", i))
            .build()
            .map_err(|e| GnxError::InvalidArguments(format!("Failed to create thread pool: {}", e)))?;

        Ok(Self {
            thread_pool: Arc::new(thread_pool),
            policy,
            threshold: threshold.max(1),
        })
    }

    /// Create a new parallel execution engine with automatic thread count
    pub fn new_auto() -> GnxResult<Self> {
        Self::new(
            ParallelizationPolicy::Auto,
            crate::config::DEFAULT_PARALLEL_THRESHOLD,
        )
    }

    /// Create a new parallel execution engine with a fixed number of threads
    pub fn new_fixed(num_threads: usize) -> GnxResult<Self> {
        Self::new(
            ParallelizationPolicy::Fixed(num_threads),
            crate::config::DEFAULT_PARALLEL_THRESHOLD,
        )
    }

    /// Get the current parallelization policy
    pub fn policy(&self) -> ParallelizationPolicy {
        self.policy
    }

    /// Get the number of threads in the thread pool
    pub fn thread_count(&self) -> usize {
        self.thread_pool.current_num_threads()
    }

    /// Execute a closure in the thread pool
    pub fn execute<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.thread_pool.install(f)
    }

    /// Determine the optimal thread count based on the policy
    fn determine_thread_count(policy: ParallelizationPolicy) -> usize {
        match policy {
            ParallelizationPolicy::Auto => {
                // Use number of logical CPUs, but cap at 16 to avoid overhead
                num_cpus::get().min(16)
            }
            ParallelizationPolicy::Fixed(n) => n,
            ParallelizationPolicy::Adaptive => (num_cpus::get() / 2).max(1),
        }
    }

    /// Returns the recommended number of parallel tasks for the given workload size
    pub fn auto_tune(&self, workload_size: usize) -> usize {
        let thread_count = self.thread_count();
        match self.policy {
            ParallelizationPolicy::Auto | ParallelizationPolicy::Adaptive => {
                if workload_size < self.threshold {
                    1
                } else {
                    (workload_size / self.threshold).clamp(1, thread_count)
                }
            }
            ParallelizationPolicy::Fixed(_) => thread_count,
        }
    }

    /// Check if parallelization is beneficial for the given workload size
    pub fn should_parallelize(&self, workload_size: usize) -> bool {
        workload_size > SCAN_CHUNK_ROWS && self.auto_tune(workload_size) > 1
    }

    /// Apply `f` to every fixed-size chunk of `items`, returning one result per
    /// chunk in chunk order.
    pub fn map_chunks<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&[T]) -> R + Sync + Send,
    {
        if self.should_parallelize(items.len()) {
            self.thread_pool
                .install(|| items.par_chunks(SCAN_CHUNK_ROWS).map(&f).collect())
        } else {
            items.chunks(SCAN_CHUNK_ROWS).map(&f).collect()
        }
    }

    /// Keep the items for which `predicate` holds, preserving input order.
    pub fn filter_ordered<T, F>(&self, items: Vec<T>, predicate: F) -> GnxResult<Vec<T>>
    where
        T: Sync + Send,
        F: Fn(&T) -> GnxResult<bool> + Sync + Send,
    {
        let masks = self.map_chunks(&items, |chunk| {
            chunk.iter().map(&predicate).collect::<GnxResult<Vec<bool>>>()
        });

        let mut keep = Vec::with_capacity(items.len());
        for mask in masks {
            keep.extend(mask?);
        }
        Ok(items
            .into_iter()
            .zip(keep)
            .filter_map(|(item, keep)| keep.then_some(item))
            .collect())
    }
}

impl std::fmt::Debug for ParallelExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExecutionEngine")
            .field("policy", &self.policy)
            .field("threads", &self.thread_count())
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_auto() {
        let engine = ParallelExecutionEngine::new_auto().unwrap();
        assert_eq!(engine.policy(), ParallelizationPolicy::Auto);
        assert!(engine.thread_count() > 0);
    }

    #[test]
    fn test_new_fixed() {
        let engine = ParallelExecutionEngine::new_fixed(4).unwrap();
        assert_eq!(engine.policy(), ParallelizationPolicy::Fixed(4));
        assert_eq!(engine.thread_count(), 4);
    }

    #[test]
    fn test_new_fixed_zero_threads() {
        let result = ParallelExecutionEngine::new_fixed(0);
        assert!(result.is_err());
    }

    #[test]
    fn test_execute() {
        let engine = ParallelExecutionEngine::new_auto().unwrap();
        let result = engine.execute(|| 42);
        assert_eq!(result, 42);
    }

    #[test]
    fn test_auto_tune_small_workload() {
        let engine = ParallelExecutionEngine::new_auto().unwrap();
        assert_eq!(engine.auto_tune(500), 1);
        assert!(!engine.should_parallelize(500));
    }

    #[test]
    fn test_fixed_policy_always_uses_all_threads() {
        let engine = ParallelExecutionEngine::new_fixed(8).unwrap();
        assert_eq!(engine.auto_tune(100), 8);
    }

    #[test]
    fn test_filter_ordered_is_thread_count_independent() {
        let items: Vec<u64> = (0..50_000).collect();
        let single = ParallelExecutionEngine::new(ParallelizationPolicy::Fixed(1), 1).unwrap();
        let many = ParallelExecutionEngine::new(ParallelizationPolicy::Fixed(4), 1).unwrap();

        let a = single.filter_ordered(items.clone(), |v| Ok(v % 7 == 3)).unwrap();
        let b = many.filter_ordered(items, |v| Ok(v % 7 == 3)).unwrap();
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_filter_ordered_propagates_error() {
        let engine = ParallelExecutionEngine::new_fixed(2).unwrap();
        let result = engine.filter_ordered(vec![1, 2, 3], |v| {
            if *v == 2 {
                Err(GnxError::Validation("boom".into()))
            } else {
                Ok(true)
            }
        });
        assert!(result.is_err());
    }
}

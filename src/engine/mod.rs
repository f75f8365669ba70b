//! Execution engine for userctl
//!
//! The engine orchestrates:
//! 1. Planning - Refresh recorded users and compare with the declared ones
//! 2. Diffing - Show what would change
//! 3. Executing - Apply changes in parallel on one shared session

pub mod differ;
pub mod executor;
pub mod planner;

use anyhow::{Context, Result};

pub use executor::{ExecuteOptions, execute};
pub use planner::Plan;

/// Worker pool shared by refresh and apply
pub fn thread_pool(jobs: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to create worker thread pool")
}

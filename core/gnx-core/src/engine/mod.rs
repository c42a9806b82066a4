//! Database Engine Module

pub mod crud;
pub mod database;
pub mod model_store;
pub mod parallel_engine;

pub use database::Database;
pub use model_store::ModelStore;
pub use parallel_engine::{ParallelExecutionEngine, ParallelizationPolicy};

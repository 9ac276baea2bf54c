//! Query execution module
//!
//! This module contains the statement executor, the SELECT pipeline and
//! the heuristic optimizer.

pub mod eval;
pub mod executor;
pub mod optimizer;
pub mod select;
pub mod shared;

pub use executor::{ExecutionEngine, QueryResult};
pub use optimizer::{HeuristicOptimizer, IndexProbe, JoinStrategy};
pub use shared::SharedEngine;

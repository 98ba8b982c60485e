//! Problem builders and decoders on top of the solver adapter.

pub mod cooperation;
pub mod flow_model;
pub mod iterative;
pub mod single_agent;
pub mod surplus;

use crate::core::error::ModelError;
use crate::solver::SolverError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizationError {
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Capability interfaces for the two external algorithms the pipeline
//! delegates to, with reference implementations.
//!
//! * [`PopulationBalancer`] apportions an aggregate population total onto
//!   residential buildings by floor-area weight, conserving the total
//!   exactly ([`FloorAreaBalancer`]).
//! * [`ProvisionSolver`] assigns building demand to service capacity under
//!   a distance threshold ([`GreedyCapacitySolver`]).
//!
//! Any substitute implementation must preserve the conservation and
//! threshold contracts stated on the traits.

pub mod balance;
pub mod clip;
pub mod solver;

pub use balance::{FloorAreaBalancer, PopulationBalancer};
pub use clip::clip_provision;
pub use solver::{DistanceMatrix, GreedyCapacitySolver, ProvisionSolver, SolverOutcome};

use thiserror::Error;

/// Errors raised by provision capabilities.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A positive population target was requested with nothing to carry it.
    #[error("Cannot apportion population {target} across zero buildings")]
    NoCarriers {
        /// The population total that could not be placed.
        target: f64,
    },

    /// Matrix dimensions do not match the demand/supply collections.
    #[error(
        "Distance matrix is {matrix_rows}x{matrix_cols} but got {demand} demand and {supply} supply rows"
    )]
    MatrixShape {
        matrix_rows: usize,
        matrix_cols: usize,
        demand: usize,
        supply: usize,
    },
}

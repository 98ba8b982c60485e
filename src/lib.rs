//! # coalition-flow
//!
//! Cooperative multi-agent network-flow games.
//!
//! Several agents each own directed edges (capacity, fixed activation cost)
//! on a shared vertex set and each wants to ship private commodities
//! (units, revenue per unit). This crate measures how much surplus the
//! agents gain, and how it is split, when they optimize alone, when a
//! central planner pools their data, and when two of them negotiate through
//! a shared information platform until neither wants to change its routing.
//!
//! ## Architecture
//!
//! - **solver** - Declarative binary programs and the `MipSolver` capability (good_lp backend)
//! - **core** - Vertices, edges, commodities, agents, the information platform, snapshots, ledger
//! - **graph** - Subtour subsets and route ordering
//! - **optimization** - Single-agent, iterative and central-planner problem builders
//! - **negotiation** - The best-response negotiation driver and order comparison
//! - **simulation** - Random instance generation

pub mod core;
pub mod graph;
pub mod negotiation;
pub mod optimization;
pub mod simulation;
pub mod solver;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::core::agent::{Agent, AgentId};
    pub use crate::core::commodity::{Commodity, CommodityKey};
    pub use crate::core::edge::{Edge, EdgeKey, Vertex};
    pub use crate::core::instance::{AgentData, Instance};
    pub use crate::core::platform::{EdgeUsageCondition, InformationPlatform};
    pub use crate::core::solution::Solution;
    pub use crate::negotiation::driver::{
        run_negotiation, Equilibrium, NegotiationConfig, NegotiationFailure, NegotiationSession,
    };
    pub use crate::optimization::cooperation::{CooperationRegime, CooperationResult};
    pub use crate::optimization::surplus::{compare_regimes, RegimeComparison};
    pub use crate::solver::good_lp_backend::GoodLpSolver;
    pub use crate::solver::{MipSolver, SolverError};
}

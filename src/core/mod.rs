//! Domain model of the flow game: vertices, edges, commodities, agents,
//! the information platform shared during a negotiation, round snapshots and
//! the side-payment ledger used by the cooperation regimes.

pub mod agent;
pub mod commodity;
pub mod edge;
pub mod error;
pub mod instance;
pub mod ledger;
pub mod platform;
pub mod solution;

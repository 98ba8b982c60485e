//! Two-agent iterative best-response negotiation.

pub mod driver;
pub mod order;

//! Random instance generation for experiments and benchmarks.
//!
//! Every agent gets one commodity and one edge for each ordered pair of
//! distinct vertices, with integer values drawn uniformly from the
//! configured half-open ranges.

use crate::core::instance::{AgentData, Instance};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Configuration for generating a random instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Number of agents.
    pub agents: u32,
    /// Number of vertices of the shared network.
    pub vertices: u32,
    pub capacity: Range<u32>,
    pub cost: Range<u32>,
    /// Revenue per unit.
    pub revenue: Range<u32>,
    pub units: Range<u32>,
    /// Fixed seed for reproducible instances.
    pub seed: Option<u64>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            agents: 2,
            vertices: 4,
            capacity: 1..10,
            cost: 3..6,
            revenue: 2..4,
            units: 1..5,
            seed: None,
        }
    }
}

fn draw(rng: &mut StdRng, range: &Range<u32>) -> u32 {
    if range.is_empty() {
        range.start
    } else {
        rng.gen_range(range.clone())
    }
}

/// Generate a random instance.
pub fn generate_random_instance(config: &InstanceConfig) -> Instance {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let capacity = config.capacity.start.max(1)..config.capacity.end.max(2);

    let mut instance = Instance::new(0..config.vertices);
    for id in 0..config.agents {
        let mut agent = AgentData::new(id);
        for v in 0..config.vertices {
            for w in (0..config.vertices).filter(|&w| w != v) {
                let units = draw(&mut rng, &config.units);
                let revenue = Decimal::from(draw(&mut rng, &config.revenue));
                agent = agent.with_commodity(v, w, units, revenue);

                let cost = Decimal::from(draw(&mut rng, &config.cost));
                agent = agent.with_edge(v, w, cost, draw(&mut rng, &capacity));
            }
        }
        instance = instance.with_agent(agent);
    }
    log::debug!(
        "generated instance: {} agents, {} vertices, seed {:?}",
        config.agents,
        config.vertices,
        config.seed
    );
    instance
}

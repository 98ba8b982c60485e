//! Compare every cooperation regime on a random instance.
//!
//! Usage: `cargo run --example regime_comparison -- [SEED]`

use coalition_flow::negotiation::order::compare_orders;
use coalition_flow::optimization::cooperation::solve_cooperation;
use coalition_flow::prelude::*;
use coalition_flow::simulation::instance_generator::{generate_random_instance, InstanceConfig};

fn main() {
    env_logger::init();

    let seed = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(7);
    let config = InstanceConfig {
        agents: 2,
        vertices: 3,
        seed: Some(seed),
        ..Default::default()
    };
    let instance = generate_random_instance(&config);
    let solver = GoodLpSolver::new();
    let negotiation = NegotiationConfig {
        max_rounds: 30,
        ..Default::default()
    };

    println!("Instance seed {}: {} agents, {} vertices\n", seed, config.agents, config.vertices);

    match compare_regimes(&instance, &solver, &negotiation) {
        Ok(comparison) => println!("{}", comparison),
        Err(e) => {
            eprintln!("regime comparison failed: {}", e);
            return;
        }
    }

    // --- How each regime splits the pie ---
    for regime in CooperationRegime::ALL {
        let mut agents = match instance.build_agents() {
            Ok(agents) => agents,
            Err(e) => {
                eprintln!("invalid instance: {}", e);
                return;
            }
        };
        match solve_cooperation(&solver, instance.vertex_set(), &mut agents, regime, None) {
            Ok(result) => {
                println!("━━━ {} cooperation ━━━", regime);
                for allocation in result.allocations().values() {
                    println!(
                        "  Agent {}: {} (alone {}, gain {})",
                        allocation.agent,
                        allocation.total_payoff,
                        allocation.payoff_no_cooperation,
                        allocation.gain()
                    );
                }
                println!(
                    "  Side payments: {} over {} transfers\n",
                    result.ledger().total_transferred(),
                    result.ledger().payments().len()
                );
            }
            Err(e) => eprintln!("{} cooperation failed: {}", regime, e),
        }
    }

    let order = [AgentId::new(0), AgentId::new(1)];
    println!("{}", compare_orders(&instance, order, &negotiation, &solver));
}

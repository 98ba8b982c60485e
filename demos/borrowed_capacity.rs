//! Two agents negotiating over a borrowed edge.
//!
//! Agent 0 sells shipments from vertex 0 to vertex 1 but only owns an edge
//! elsewhere in the network. Agent 1 owns the 0→1 edge and has capacity to
//! spare. Through the information platform agent 0 learns about the spare
//! capacity, borrows it, and compensates agent 1 for the activation cost.

use coalition_flow::prelude::*;
use rust_decimal_macros::dec;

fn main() {
    env_logger::init();

    println!("╔════════════════════════════════════════════╗");
    println!("║  coalition-flow: Borrowed Capacity Example ║");
    println!("╚════════════════════════════════════════════╝\n");

    let instance = Instance::new(0..4)
        .with_agent(
            AgentData::new(0)
                .with_edge(2, 3, dec!(3), 5)
                .with_commodity(0, 1, 4, dec!(2)),
        )
        .with_agent(
            AgentData::new(1)
                .with_edge(0, 1, dec!(3), 5)
                .with_commodity(0, 1, 1, dec!(5)),
        );

    let order = [AgentId::new(0), AgentId::new(1)];
    let mut session = match NegotiationSession::new(
        &instance,
        order,
        GoodLpSolver::new(),
        NegotiationConfig::default(),
    ) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("cannot start negotiation: {}", e);
            return;
        }
    };

    // --- Round by round ---
    while !session.is_converged() && session.round() < session.config().max_rounds {
        match session.play_round() {
            Ok(report) => {
                println!("━━━ Round {} ━━━", report.round);
                for outcome in &report.outcomes {
                    println!(
                        "  Agent {}: payoff {}  (pays {}, receives {})",
                        outcome.agent, outcome.payoff, outcome.out_payments, outcome.in_payments
                    );
                }
                println!("  Total:   {}\n", report.total_payoff());
            }
            Err(e) => {
                eprintln!("negotiation failed: {}", e);
                return;
            }
        }
    }

    // --- What the platform shows at the end ---
    println!("━━━ Platform ━━━\n");
    for id in order {
        let shared: Vec<String> = session
            .platform()
            .shared_edges(id)
            .map(|e| format!("{} ({} free)", e.key(), e.free_capacity()))
            .collect();
        println!("  Agent {} shares: {}", id, shared.join(", "));
    }
}

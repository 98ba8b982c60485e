use crate::core::agent::AgentId;
use crate::core::instance::Instance;
use crate::negotiation::driver::{NegotiationConfig, NegotiationSession};
use crate::optimization::cooperation::{cooperate, CooperationRegime, CooperationResult};
use crate::optimization::single_agent::solve_single_agent;
use crate::optimization::OptimizationError;
use crate::solver::MipSolver;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the iterative negotiation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationSummary {
    pub order: [AgentId; 2],
    /// Present only when an equilibrium was found.
    pub total_payoff: Option<Decimal>,
    pub rounds: usize,
    pub failure: Option<String>,
}

/// Coalition payoff of every regime on one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeComparison {
    pub no_cooperation: Decimal,
    pub regimes: BTreeMap<CooperationRegime, Decimal>,
    /// Only run when the instance has exactly two agents.
    pub iterative: Option<NegotiationSummary>,
    pub agent_count: usize,
}

impl RegimeComparison {
    pub fn payoff(&self, regime: CooperationRegime) -> Option<Decimal> {
        self.regimes.get(&regime).copied()
    }

    /// Gain of `payoff` over no cooperation, in percent.
    pub fn gain_percent(&self, payoff: Decimal) -> f64 {
        if self.no_cooperation == Decimal::ZERO {
            return 0.0;
        }
        let pct = (payoff - self.no_cooperation) * Decimal::from(100) / self.no_cooperation;
        pct.to_f64().unwrap_or(0.0)
    }
}

impl std::fmt::Display for RegimeComparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Regime Comparison ({} agents) ===", self.agent_count)?;
        writeln!(f, "No cooperation:       {}", self.no_cooperation)?;
        for (regime, payoff) in &self.regimes {
            let label = format!("{} cooperation:", regime);
            writeln!(
                f,
                "{:<22}{} ({:+.1}%)",
                label,
                payoff,
                self.gain_percent(*payoff)
            )?;
        }
        if let Some(summary) = &self.iterative {
            match summary.total_payoff {
                Some(payoff) => writeln!(
                    f,
                    "Iterative [{}, {}]:     {} ({:+.1}%, {} rounds)",
                    summary.order[0],
                    summary.order[1],
                    payoff,
                    self.gain_percent(payoff),
                    summary.rounds
                )?,
                None => writeln!(
                    f,
                    "Iterative [{}, {}]:     no equilibrium ({})",
                    summary.order[0],
                    summary.order[1],
                    summary.failure.as_deref().unwrap_or("unknown")
                )?,
            }
        }
        Ok(())
    }
}

/// Solve every agent alone, pool them under each regime and, for two-agent
/// instances, negotiate in the instance's agent order.
pub fn compare_regimes<S: MipSolver>(
    instance: &Instance,
    solver: &S,
    config: &NegotiationConfig,
) -> Result<RegimeComparison, OptimizationError> {
    let mut agents = instance.build_agents()?;
    let vertices = instance.vertex_set();
    let limit = Some(config.time_limit);
    for agent in agents.values_mut() {
        solve_single_agent(solver, vertices, agent, limit)?;
    }
    let no_cooperation = agents.values().map(|a| a.payoff_no_cooperation()).sum();

    let mut regimes = BTreeMap::new();
    for regime in CooperationRegime::ALL {
        let mut pooled = agents.clone();
        let result: CooperationResult = cooperate(solver, vertices, &mut pooled, regime, limit)?;
        regimes.insert(regime, result.coalition_payoff());
    }

    let iterative = match instance.agent_ids().as_slice() {
        &[a, b] => Some(negotiate(instance, [a, b], solver, config)),
        _ => None,
    };

    Ok(RegimeComparison {
        no_cooperation,
        regimes,
        iterative,
        agent_count: agents.len(),
    })
}

fn negotiate<S: MipSolver>(
    instance: &Instance,
    order: [AgentId; 2],
    solver: &S,
    config: &NegotiationConfig,
) -> NegotiationSummary {
    let result = NegotiationSession::new(instance, order, solver, config.clone())
        .and_then(|session| session.run());
    match result {
        Ok(eq) => NegotiationSummary {
            order,
            total_payoff: Some(eq.total_payoff),
            rounds: eq.rounds,
            failure: None,
        },
        Err(failure) => {
            log::warn!("iterative negotiation failed: {}", failure);
            NegotiationSummary {
                order,
                total_payoff: None,
                rounds: failure.rounds_used(),
                failure: Some(failure.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::AgentData;
    use crate::solver::good_lp_backend::GoodLpSolver;
    use rust_decimal_macros::dec;

    fn borrowing_instance() -> Instance {
        Instance::new(0..4)
            .with_agent(
                AgentData::new(0)
                    .with_edge(2, 3, dec!(3), 5)
                    .with_commodity(0, 1, 4, dec!(2)),
            )
            .with_agent(
                AgentData::new(1)
                    .with_edge(0, 1, dec!(3), 5)
                    .with_commodity(0, 1, 1, dec!(5)),
            )
    }

    #[test]
    fn test_compare_borrowing_instance() {
        let comparison = compare_regimes(
            &borrowing_instance(),
            &GoodLpSolver::new(),
            &NegotiationConfig::default(),
        )
        .unwrap();

        assert_eq!(comparison.no_cooperation, dec!(2));
        assert_eq!(comparison.payoff(CooperationRegime::Full), Some(dec!(10)));
        assert_eq!(comparison.payoff(CooperationRegime::Residual), Some(dec!(10)));
        let iterative = comparison.iterative.as_ref().unwrap();
        assert_eq!(iterative.total_payoff, Some(dec!(10)));
        assert_eq!(iterative.rounds, 3);
        assert!((comparison.gain_percent(dec!(10)) - 400.0).abs() < 1e-9);

        let text = comparison.to_string();
        assert!(text.contains("full cooperation:"));
        assert!(text.contains("3 rounds"));
    }

    #[test]
    fn test_zero_baseline_gain() {
        let comparison = RegimeComparison {
            no_cooperation: Decimal::ZERO,
            regimes: BTreeMap::new(),
            iterative: None,
            agent_count: 1,
        };
        assert_eq!(comparison.gain_percent(dec!(5)), 0.0);
    }

    #[test]
    fn test_single_agent_skips_negotiation() {
        let instance = Instance::new(0..2).with_agent(
            AgentData::new(0)
                .with_edge(0, 1, dec!(1), 3)
                .with_commodity(0, 1, 2, dec!(2)),
        );
        let comparison =
            compare_regimes(&instance, &GoodLpSolver::new(), &NegotiationConfig::default())
                .unwrap();
        assert!(comparison.iterative.is_none());
        assert_eq!(comparison.no_cooperation, dec!(3));
        assert_eq!(comparison.payoff(CooperationRegime::Full), Some(dec!(3)));
    }
}

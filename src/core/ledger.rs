use crate::core::agent::AgentId;
use crate::core::edge::EdgeKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A payment from a commodity owner to the owner of an edge its route used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidePayment {
    pub payer: AgentId,
    pub payee: AgentId,
    pub edge: EdgeKey,
    pub amount: Decimal,
}

/// Tracks the net side-payment position of each agent.
///
/// A positive balance means the agent received more than it paid (net
/// payee). A negative balance means it paid more (net payer). Every transfer
/// moves money between two agents, so the positions always sum to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidePaymentLedger {
    positions: BTreeMap<AgentId, Decimal>,
    payments: Vec<SidePayment>,
}

impl SidePaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `payer` compensates `payee` for using `edge`.
    pub fn record(&mut self, payment: SidePayment) {
        *self.positions.entry(payment.payer).or_insert(Decimal::ZERO) -= payment.amount;
        *self.positions.entry(payment.payee).or_insert(Decimal::ZERO) += payment.amount;
        self.payments.push(payment);
    }

    pub fn transfer(&mut self, payer: AgentId, payee: AgentId, edge: EdgeKey, amount: Decimal) {
        self.record(SidePayment {
            payer,
            payee,
            edge,
            amount,
        });
    }

    /// Net position of an agent; zero when it never took part in a transfer.
    pub fn position(&self, agent: AgentId) -> Decimal {
        self.positions.get(&agent).copied().unwrap_or(Decimal::ZERO)
    }

    /// Total paid by `agent`.
    pub fn paid_by(&self, agent: AgentId) -> Decimal {
        self.payments
            .iter()
            .filter(|p| p.payer == agent)
            .map(|p| p.amount)
            .sum()
    }

    /// Total received by `agent`.
    pub fn received_by(&self, agent: AgentId) -> Decimal {
        self.payments
            .iter()
            .filter(|p| p.payee == agent)
            .map(|p| p.amount)
            .sum()
    }

    pub fn all_positions(&self) -> &BTreeMap<AgentId, Decimal> {
        &self.positions
    }

    pub fn payments(&self) -> &[SidePayment] {
        &self.payments
    }

    /// Verify that the ledger is balanced: sum of all positions = 0.
    pub fn is_balanced(&self) -> bool {
        self.positions.values().sum::<Decimal>() == Decimal::ZERO
    }

    /// Total volume moved between agents.
    pub fn total_transferred(&self) -> Decimal {
        self.payments.iter().map(|p| p.amount).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ledger_basic() {
        let mut ledger = SidePaymentLedger::new();
        let a = AgentId::new(0);
        let b = AgentId::new(1);
        ledger.transfer(a, b, EdgeKey::new(0, 1, 1), dec!(2.4));

        assert_eq!(ledger.position(a), dec!(-2.4));
        assert_eq!(ledger.position(b), dec!(2.4));
        assert_eq!(ledger.paid_by(a), dec!(2.4));
        assert_eq!(ledger.received_by(b), dec!(2.4));
        assert_eq!(ledger.position(AgentId::new(9)), Decimal::ZERO);
    }

    #[test]
    fn test_ledger_balanced() {
        let mut ledger = SidePaymentLedger::new();
        let a = AgentId::new(0);
        let b = AgentId::new(1);
        ledger.transfer(a, b, EdgeKey::new(0, 1, 1), dec!(1.2));
        ledger.transfer(b, a, EdgeKey::new(1, 2, 0), dec!(0.75));
        assert!(ledger.is_balanced());
        assert_eq!(ledger.total_transferred(), dec!(1.95));
    }

    #[test]
    fn test_ledger_circular_cancels() {
        let mut ledger = SidePaymentLedger::new();
        let (a, b, c) = (AgentId::new(0), AgentId::new(1), AgentId::new(2));
        ledger.transfer(a, b, EdgeKey::new(0, 1, 1), dec!(3));
        ledger.transfer(b, c, EdgeKey::new(1, 2, 2), dec!(3));
        ledger.transfer(c, a, EdgeKey::new(2, 0, 0), dec!(3));

        // Perfect cycle: everyone's net position is zero
        assert_eq!(ledger.position(a), Decimal::ZERO);
        assert!(ledger.is_balanced());
    }
}

use crate::core::balance::{Debt, UserBalance};
use crate::core::currency::{round_money, TOLERANCE};
use crate::core::member::MemberId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A list of settlement edges with summary helpers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementPlan {
    debts: Vec<Debt>,
}

impl SettlementPlan {
    pub fn new(debts: Vec<Debt>) -> Self {
        Self { debts }
    }

    pub fn debts(&self) -> &[Debt] {
        &self.debts
    }

    /// Number of transfers needed to settle up.
    pub fn edge_count(&self) -> usize {
        self.debts.len()
    }

    /// Total money moved by the plan.
    pub fn total_transferred(&self) -> Decimal {
        self.debts.iter().map(|d| d.amount).sum()
    }

    pub fn is_settled(&self) -> bool {
        self.debts.is_empty()
    }
}

impl fmt::Display for SettlementPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Settlement Plan ===")?;
        writeln!(f, "Transfers:   {}", self.edge_count())?;
        writeln!(f, "Total Moved: {}", self.total_transferred())?;
        for debt in &self.debts {
            writeln!(f, "  {}", debt)?;
        }
        Ok(())
    }
}

/// Turns net balances into a short list of transfers.
pub struct DebtSimplifier;

impl DebtSimplifier {
    /// Greedy creditor/debtor matching.
    ///
    /// # Algorithm
    ///
    /// 1. Members with `net > 0.01` are creditors, `net < -0.01` debtors;
    ///    everyone else is settled.
    /// 2. Both sides are sorted by magnitude, largest first. The sort is
    ///    stable, so equal amounts keep their input order.
    /// 3. Two pointers walk the lists. Each step moves
    ///    `min(remaining debt, remaining credit)` and emits an edge when that
    ///    exceeds 0.01. A side whose remainder falls below 0.01 is advanced.
    ///
    /// Every step exhausts at least one side, so the result has at most
    /// `creditors + debtors - 1` edges. If credits and debts do not reconcile
    /// the leftover stays unmatched.
    pub fn simplify(balances: &[UserBalance]) -> Vec<Debt> {
        let mut creditors: Vec<(&MemberId, Decimal)> = balances
            .iter()
            .filter(|b| b.net_balance > TOLERANCE)
            .map(|b| (&b.member_id, b.net_balance))
            .collect();
        let mut debtors: Vec<(&MemberId, Decimal)> = balances
            .iter()
            .filter(|b| b.net_balance < -TOLERANCE)
            .map(|b| (&b.member_id, -b.net_balance))
            .collect();

        creditors.sort_by(|a, b| b.1.cmp(&a.1));
        debtors.sort_by(|a, b| b.1.cmp(&a.1));

        let mut debts = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < creditors.len() && j < debtors.len() {
            let transfer = creditors[i].1.min(debtors[j].1);
            if transfer > TOLERANCE {
                debts.push(Debt::new(
                    debtors[j].0.clone(),
                    creditors[i].0.clone(),
                    round_money(transfer),
                ));
            }

            creditors[i].1 -= transfer;
            debtors[j].1 -= transfer;
            if creditors[i].1 < TOLERANCE {
                i += 1;
            }
            if debtors[j].1 < TOLERANCE {
                j += 1;
            }
        }
        debts
    }

    pub fn plan(balances: &[UserBalance]) -> SettlementPlan {
        SettlementPlan::new(Self::simplify(balances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn nets(entries: &[(&str, Decimal)]) -> Vec<UserBalance> {
        entries
            .iter()
            .map(|(m, net)| UserBalance::from_net(MemberId::new(*m), *net))
            .collect()
    }

    #[test]
    fn test_two_member_group() {
        let debts = DebtSimplifier::simplify(&nets(&[("alice", dec!(50)), ("bob", dec!(-50))]));
        assert_eq!(
            debts,
            vec![Debt::new(MemberId::new("bob"), MemberId::new("alice"), dec!(50))]
        );
    }

    #[test]
    fn test_one_creditor_two_debtors() {
        let debts = DebtSimplifier::simplify(&nets(&[
            ("a", dec!(60)),
            ("b", dec!(-30)),
            ("c", dec!(-30)),
        ]));
        assert_eq!(debts.len(), 2);
        assert_eq!(debts[0], Debt::new(MemberId::new("b"), MemberId::new("a"), dec!(30)));
        assert_eq!(debts[1], Debt::new(MemberId::new("c"), MemberId::new("a"), dec!(30)));
    }

    #[test]
    fn test_largest_matched_first() {
        let debts = DebtSimplifier::simplify(&nets(&[
            ("a", dec!(10)),
            ("b", dec!(70)),
            ("c", dec!(-45)),
            ("d", dec!(-35)),
        ]));
        // b(70) <- c(45), b(25) <- d(35), a(10) <- d(10)
        assert_eq!(
            debts,
            vec![
                Debt::new(MemberId::new("c"), MemberId::new("b"), dec!(45)),
                Debt::new(MemberId::new("d"), MemberId::new("b"), dec!(25)),
                Debt::new(MemberId::new("d"), MemberId::new("a"), dec!(10)),
            ]
        );
    }

    #[test]
    fn test_tolerance_band_is_settled() {
        let debts = DebtSimplifier::simplify(&nets(&[
            ("a", dec!(0.01)),
            ("b", dec!(-0.01)),
            ("c", dec!(0)),
        ]));
        assert!(debts.is_empty());
    }

    #[test]
    fn test_residual_left_unmatched() {
        let debts = DebtSimplifier::simplify(&nets(&[("a", dec!(100)), ("b", dec!(-60))]));
        assert_eq!(
            debts,
            vec![Debt::new(MemberId::new("b"), MemberId::new("a"), dec!(60))]
        );
    }

    #[test]
    fn test_empty_and_plan_helpers() {
        assert!(DebtSimplifier::plan(&[]).is_settled());

        let plan = DebtSimplifier::plan(&nets(&[
            ("a", dec!(25.50)),
            ("b", dec!(-10.25)),
            ("c", dec!(-15.25)),
        ]));
        assert_eq!(plan.edge_count(), 2);
        assert_eq!(plan.total_transferred(), dec!(25.50));
    }
}

use crate::core::balance::UserBalance;
use crate::core::currency::{round_money, TOLERANCE};
use crate::core::expense::{Contribution, Split};
use crate::core::member::MemberId;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default)]
struct Position {
    paid: Decimal,
    owed: Decimal,
}

/// Running paid/owed accumulators for every member of a group.
///
/// Members keep the order in which they were first seen, so the balances
/// produced by [`BalanceLedger::into_balances`] are stable for a given
/// input order.
#[derive(Debug, Clone, Default)]
pub struct BalanceLedger {
    order: Vec<MemberId>,
    positions: HashMap<MemberId, Position>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a ledger with every member at zero.
    pub fn with_members<'a>(members: impl IntoIterator<Item = &'a MemberId>) -> Self {
        let mut ledger = Self::new();
        for member in members {
            ledger.ensure_member(member);
        }
        ledger
    }

    /// Add a member at zero if unknown. Returns true when the member was added.
    pub fn ensure_member(&mut self, member: &MemberId) -> bool {
        if self.positions.contains_key(member) {
            return false;
        }
        self.order.push(member.clone());
        self.positions.insert(member.clone(), Position::default());
        true
    }

    /// Credit a payment to the member's paid side.
    pub fn record_payment(&mut self, member: &MemberId, amount: Decimal) {
        self.ensure_member(member);
        if let Some(p) = self.positions.get_mut(member) {
            p.paid += amount;
        }
    }

    /// Debit an obligation to the member's owed side.
    pub fn record_obligation(&mut self, member: &MemberId, amount: Decimal) {
        self.ensure_member(member);
        if let Some(p) = self.positions.get_mut(member) {
            p.owed += amount;
        }
    }

    /// Unrounded paid − owed for a member; zero when unknown.
    pub fn net(&self, member: &MemberId) -> Decimal {
        self.positions
            .get(member)
            .map(|p| p.paid - p.owed)
            .unwrap_or(Decimal::ZERO)
    }

    /// Sum of all net positions. Zero for a conserving set of records.
    pub fn net_sum(&self) -> Decimal {
        self.positions.values().map(|p| p.paid - p.owed).sum()
    }

    /// Whether credits and debits cancel out within [`TOLERANCE`].
    pub fn is_balanced(&self) -> bool {
        self.net_sum().abs() <= TOLERANCE
    }

    pub fn member_count(&self) -> usize {
        self.order.len()
    }

    /// Rounded balances in member order.
    ///
    /// Paid and owed sides are rounded to cents once, here. Nets are rounded
    /// per member and any cent of drift this introduces is moved onto the
    /// member with the largest position, so the rounded nets sum to the
    /// rounded total of the unrounded nets.
    pub fn into_balances(self) -> Vec<UserBalance> {
        let BalanceLedger { order, positions } = self;
        let mut balances: Vec<UserBalance> = order
            .into_iter()
            .map(|member| {
                let p = positions.get(&member).copied().unwrap_or_default();
                UserBalance {
                    member_id: member,
                    total_paid: round_money(p.paid),
                    total_owes: round_money(p.owed),
                    net_balance: round_money(p.paid - p.owed),
                }
            })
            .collect();

        let exact: Decimal = positions.values().map(|p| p.paid - p.owed).sum();
        let rounded: Decimal = balances.iter().map(|b| b.net_balance).sum();
        let drift = rounded - round_money(exact);
        if drift != Decimal::ZERO {
            let largest = balances
                .iter()
                .enumerate()
                .fold(None, |best: Option<(usize, Decimal)>, (i, b)| {
                    let size = b.net_balance.abs();
                    match best {
                        Some((_, top)) if top >= size => best,
                        _ => Some((i, size)),
                    }
                });
            if let Some((i, _)) = largest {
                balances[i].net_balance -= drift;
            }
        }
        balances
    }

    /// Fold raw records (single currency, no conversion) into a ledger.
    /// Settled splits are skipped.
    pub fn from_records(contributions: &[Contribution], splits: &[Split]) -> Self {
        let mut ledger = Self::new();
        for c in contributions {
            ledger.record_payment(&c.member_id, c.amount);
        }
        for s in splits.iter().filter(|s| !s.is_settled) {
            ledger.record_obligation(&s.member_id, s.amount);
        }
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expense::SplitMethod;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_ledger_basic() {
        let mut ledger = BalanceLedger::new();
        let a = MemberId::new("A");
        let b = MemberId::new("B");
        ledger.record_payment(&a, dec!(100));
        ledger.record_obligation(&a, dec!(50));
        ledger.record_obligation(&b, dec!(50));

        assert_eq!(ledger.net(&a), dec!(50));
        assert_eq!(ledger.net(&b), dec!(-50));
        assert!(ledger.is_balanced());
    }

    #[test]
    fn test_members_keep_first_seen_order() {
        let members = [MemberId::new("z"), MemberId::new("a")];
        let mut ledger = BalanceLedger::with_members(&members);
        ledger.record_payment(&MemberId::new("m"), dec!(1));

        let order: Vec<String> = ledger
            .into_balances()
            .into_iter()
            .map(|b| b.member_id.to_string())
            .collect();
        assert_eq!(order, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_untouched_members_are_zero() {
        let members = [MemberId::new("idle")];
        let balances = BalanceLedger::with_members(&members).into_balances();
        assert_eq!(balances[0].total_paid, Decimal::ZERO);
        assert_eq!(balances[0].total_owes, Decimal::ZERO);
        assert_eq!(balances[0].net_balance, Decimal::ZERO);
    }

    #[test]
    fn test_from_records_skips_settled() {
        let expense = Uuid::new_v4();
        let a = MemberId::new("A");
        let b = MemberId::new("B");
        let contributions = vec![Contribution::new(expense, a.clone(), dec!(100))];
        let splits = vec![
            Split::new(expense, a.clone(), dec!(50), SplitMethod::Equal),
            Split::new(expense, b.clone(), dec!(50), SplitMethod::Equal).settled(),
        ];

        let ledger = BalanceLedger::from_records(&contributions, &splits);
        assert_eq!(ledger.net(&a), dec!(50));
        assert_eq!(ledger.net(&b), Decimal::ZERO);
        assert!(!ledger.is_balanced());
    }

    #[test]
    fn test_into_balances_rounds() {
        let mut ledger = BalanceLedger::new();
        let a = MemberId::new("A");
        ledger.record_payment(&a, dec!(10.005));
        let balances = ledger.into_balances();
        assert_eq!(balances[0].total_paid, dec!(10.01));
    }

    #[test]
    fn test_into_balances_absorbs_rounding_drift() {
        // 100 EUR split seven ways, converted at 1.0837 without rounding.
        let rate = dec!(1.0837);
        let members: Vec<MemberId> = (0..7).map(|i| MemberId::new(format!("m{}", i))).collect();
        let mut ledger = BalanceLedger::with_members(&members);
        ledger.record_payment(&members[0], dec!(100) * rate);
        ledger.record_obligation(&members[0], dec!(14.32) * rate);
        for m in &members[1..] {
            ledger.record_obligation(m, dec!(14.28) * rate);
        }
        assert_eq!(ledger.member_count(), 7);

        let balances = ledger.into_balances();
        let sum: Decimal = balances.iter().map(|b| b.net_balance).sum();
        assert_eq!(sum, Decimal::ZERO);
        assert_eq!(balances[0].total_paid, dec!(108.37));
    }

    #[test]
    fn test_drift_lands_on_largest_position() {
        let members: Vec<MemberId> = ["a", "b", "c"].iter().map(|m| MemberId::new(*m)).collect();
        let mut ledger = BalanceLedger::with_members(&members);
        ledger.record_payment(&members[0], dec!(0.01));
        ledger.record_obligation(&members[1], dec!(0.005));
        ledger.record_obligation(&members[2], dec!(0.005));

        let nets: Vec<Decimal> = ledger.into_balances().iter().map(|b| b.net_balance).collect();
        // each debtor rounds to -0.01; the creditor absorbs the extra cent
        assert_eq!(nets, vec![dec!(0.02), dec!(-0.01), dec!(-0.01)]);
    }
}

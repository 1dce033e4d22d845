use crate::core::currency::{ConversionMode, CurrencyCode};
use crate::core::member::{GroupId, MemberId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A member's position in a group, computed fresh per request.
///
/// A positive `net_balance` means the group owes the member money;
/// a negative one means the member owes the group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBalance {
    pub member_id: MemberId,
    pub total_paid: Decimal,
    pub total_owes: Decimal,
    pub net_balance: Decimal,
}

impl UserBalance {
    pub fn new(member_id: MemberId, total_paid: Decimal, total_owes: Decimal) -> Self {
        Self {
            member_id,
            total_paid,
            total_owes,
            net_balance: total_paid - total_owes,
        }
    }

    /// Build a balance from a net amount only (paid/owes unknown).
    pub fn from_net(member_id: MemberId, net_balance: Decimal) -> Self {
        let (total_paid, total_owes) = if net_balance >= Decimal::ZERO {
            (net_balance, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -net_balance)
        };
        Self {
            member_id,
            total_paid,
            total_owes,
            net_balance,
        }
    }
}

/// A single settlement edge: `from` should pay `to` the given amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debt {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Decimal,
}

impl Debt {
    pub fn new(from: MemberId, to: MemberId, amount: Decimal) -> Self {
        Self { from, to, amount }
    }
}

impl fmt::Display for Debt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}: {}", self.from, self.to, self.amount)
    }
}

/// Everything a caller needs to render a group's balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBalanceSummary {
    pub group_id: GroupId,
    /// Sum of every split amount (settled or not), in display currency
    /// when conversion is active.
    pub total_expenses: Decimal,
    pub user_balances: Vec<UserBalance>,
    pub simplified_debts: Vec<Debt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_currency: Option<CurrencyCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_mode: Option<ConversionMode>,
}

impl GroupBalanceSummary {
    pub fn empty(group_id: GroupId) -> Self {
        Self {
            group_id,
            total_expenses: Decimal::ZERO,
            user_balances: Vec::new(),
            simplified_debts: Vec::new(),
            display_currency: None,
            conversion_mode: None,
        }
    }

    pub fn balance_of(&self, member: &MemberId) -> Option<&UserBalance> {
        self.user_balances.iter().find(|b| &b.member_id == member)
    }

    /// Signed amount between two members, from `a`'s point of view:
    /// positive when `b` owes `a`, negative when `a` owes `b`, zero when no
    /// edge connects them.
    pub fn balance_between(&self, a: &MemberId, b: &MemberId) -> Decimal {
        self.simplified_debts
            .iter()
            .find_map(|d| {
                if &d.from == b && &d.to == a {
                    Some(d.amount)
                } else if &d.from == a && &d.to == b {
                    Some(-d.amount)
                } else {
                    None
                }
            })
            .unwrap_or(Decimal::ZERO)
    }
}

impl fmt::Display for GroupBalanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self
            .display_currency
            .as_ref()
            .map(|c| format!(" {}", c))
            .unwrap_or_default();

        writeln!(f, "=== Group {} ===", self.group_id)?;
        writeln!(f, "Total Expenses: {}{}", self.total_expenses, unit)?;
        if let Some(mode) = self.conversion_mode {
            writeln!(f, "Conversion:     {}", mode)?;
        }

        writeln!(f, "\n--- Balances ---")?;
        for b in &self.user_balances {
            writeln!(
                f,
                "  {:<15} paid {:>12}  owes {:>12}  net {:>12}",
                b.member_id, b.total_paid, b.total_owes, b.net_balance
            )?;
        }

        writeln!(f, "\n--- Settlement ---")?;
        if self.simplified_debts.is_empty() {
            writeln!(f, "  All settled up.")?;
        }
        for d in &self.simplified_debts {
            writeln!(f, "  {}{}", d, unit)?;
        }
        Ok(())
    }
}

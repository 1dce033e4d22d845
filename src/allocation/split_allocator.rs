//! Split allocation: turning a split-method selection into amounts.
//!
//! The allocator is a pure function. It always produces *a* derivation;
//! whether that derivation adds up to the expense total is checked by the
//! caller through [`validate_allocation`] before anything is persisted.

use crate::core::currency::{round_money, TOLERANCE};
use crate::core::expense::SplitMethod;
use crate::core::member::MemberId;
use crate::error::{AllocationKind, EngineError};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// One selected member and the method-specific input for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub member_id: MemberId,
    #[serde(default)]
    pub percentage: Option<Decimal>,
    #[serde(default)]
    pub shares: Option<Decimal>,
    /// The member's current amount: the literal input for `Exact`,
    /// the previous derivation otherwise.
    #[serde(default)]
    pub amount: Decimal,
}

impl Selection {
    pub fn member(member_id: MemberId) -> Self {
        Self {
            member_id,
            percentage: None,
            shares: None,
            amount: Decimal::ZERO,
        }
    }

    pub fn with_percentage(mut self, percentage: Decimal) -> Self {
        self.percentage = Some(percentage);
        self
    }

    pub fn with_shares(mut self, shares: Decimal) -> Self {
        self.shares = Some(shares);
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }
}

/// The allocator's output for one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub member_id: MemberId,
    pub amount: Decimal,
    pub percentage: Option<Decimal>,
    pub shares: Option<Decimal>,
}

impl Allocation {
    fn carry(selection: &Selection, amount: Decimal) -> Self {
        Self {
            member_id: selection.member_id.clone(),
            amount,
            percentage: selection.percentage,
            shares: selection.shares,
        }
    }
}

/// Derive per-member amounts for `total` under `method`.
///
/// - `Equal`: `total / n` truncated to cents; the leftover cents go to the
///   first selected member, so the output always sums to `total`.
/// - `Percentage`: `total * pct / 100`, rounded to cents. When the
///   percentages sum to 100, rounding leftovers go to the first member
///   with a nonzero percentage.
/// - `Shares`: `total * shares / sum(shares)`, rounded to cents, leftovers
///   to the first member with nonzero shares.
/// - `Exact`: the selection's amount as entered.
///
/// When the percentages or shares of the selection sum to zero, each
/// member keeps its current amount.
///
/// # Examples
///
/// ```
/// use balance_engine::allocation::split_allocator::{allocate, Selection};
/// use balance_engine::core::expense::SplitMethod;
/// use balance_engine::core::member::MemberId;
/// use rust_decimal_macros::dec;
///
/// let selections = vec![
///     Selection::member(MemberId::new("a")),
///     Selection::member(MemberId::new("b")),
///     Selection::member(MemberId::new("c")),
/// ];
/// let out = allocate(dec!(100), SplitMethod::Equal, &selections);
/// let amounts: Vec<_> = out.iter().map(|a| a.amount).collect();
/// assert_eq!(amounts, vec![dec!(33.34), dec!(33.33), dec!(33.33)]);
/// ```
pub fn allocate(total: Decimal, method: SplitMethod, selections: &[Selection]) -> Vec<Allocation> {
    if selections.is_empty() {
        return Vec::new();
    }

    match method {
        SplitMethod::Equal => allocate_equal(total, selections),
        SplitMethod::Percentage => {
            let sum: Decimal = selections.iter().filter_map(|s| s.percentage).sum();
            if sum == Decimal::ZERO {
                return keep_current(selections);
            }
            let mut out: Vec<Allocation> = selections
                .iter()
                .map(|s| {
                    let pct = s.percentage.unwrap_or(Decimal::ZERO);
                    Allocation::carry(s, round_money(total * pct / Decimal::ONE_HUNDRED))
                })
                .collect();
            // Percentages off 100 are left for validation to reject.
            if sum == Decimal::ONE_HUNDRED {
                absorb_remainder(total, &mut out, |a| a.percentage);
            }
            out
        }
        SplitMethod::Shares => {
            let sum: Decimal = selections.iter().filter_map(|s| s.shares).sum();
            if sum == Decimal::ZERO {
                return keep_current(selections);
            }
            let mut out: Vec<Allocation> = selections
                .iter()
                .map(|s| {
                    let shares = s.shares.unwrap_or(Decimal::ZERO);
                    Allocation::carry(s, round_money(total * shares / sum))
                })
                .collect();
            absorb_remainder(total, &mut out, |a| a.shares);
            out
        }
        SplitMethod::Exact => keep_current(selections),
    }
}

fn allocate_equal(total: Decimal, selections: &[Selection]) -> Vec<Allocation> {
    let count = Decimal::from(selections.len());
    let base = (total / count).round_dp_with_strategy(2, RoundingStrategy::ToZero);
    let remainder = total - base * count;

    selections
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let amount = if i == 0 { base + remainder } else { base };
            Allocation::carry(s, amount)
        })
        .collect()
}

/// Give `total - sum(amounts)` to the first allocation with a nonzero weight.
fn absorb_remainder(
    total: Decimal,
    out: &mut [Allocation],
    weight: impl Fn(&Allocation) -> Option<Decimal>,
) {
    let remainder = total - out.iter().map(|a| a.amount).sum::<Decimal>();
    if remainder == Decimal::ZERO {
        return;
    }
    if let Some(first) = out
        .iter_mut()
        .find(|a| weight(a).map_or(false, |w| w != Decimal::ZERO))
    {
        first.amount += remainder;
    }
}

fn keep_current(selections: &[Selection]) -> Vec<Allocation> {
    selections
        .iter()
        .map(|s| Allocation::carry(s, s.amount))
        .collect()
}

/// Check that `amounts` add up to `total` within [`TOLERANCE`].
pub fn validate_allocation(
    total: Decimal,
    amounts: impl IntoIterator<Item = Decimal>,
    kind: AllocationKind,
) -> Result<(), EngineError> {
    let actual: Decimal = amounts.into_iter().sum();
    if (actual - total).abs() > TOLERANCE {
        return Err(EngineError::AllocationMismatch {
            kind,
            expected: total,
            actual,
        });
    }
    Ok(())
}

use crate::allocation::split_allocator::{allocate, validate_allocation, Selection};
use crate::core::expense::{Contribution, Expense, Split, SplitMethod};
use crate::core::member::MemberId;
use crate::error::{AllocationKind, EngineError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An expense together with the contributions and splits derived for it.
///
/// This is the unit the persistence layer writes atomically: on edit the
/// previous contributions and splits of the expense are deleted and these
/// are written in their place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedExpense {
    pub expense: Expense,
    pub contributions: Vec<Contribution>,
    pub splits: Vec<Split>,
}

/// Caller-side builder that wraps the split allocator and refuses to
/// produce an expense whose payments or splits do not add up.
///
/// # Examples
///
/// ```
/// use balance_engine::allocation::entry::ExpenseEntry;
/// use balance_engine::allocation::split_allocator::Selection;
/// use balance_engine::core::currency::CurrencyCode;
/// use balance_engine::core::expense::{Expense, SplitMethod};
/// use balance_engine::core::member::MemberId;
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let expense = Expense::new(
///     dec!(90),
///     CurrencyCode::new("USD"),
///     NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
/// );
/// let recorded = ExpenseEntry::new(expense)
///     .paid_by(MemberId::new("a"), dec!(90))
///     .split(
///         SplitMethod::Equal,
///         ["a", "b", "c"].iter().map(|m| Selection::member(MemberId::new(*m))).collect(),
///     )
///     .record()
///     .unwrap();
///
/// assert_eq!(recorded.splits.len(), 3);
/// assert_eq!(recorded.splits[1].amount, dec!(30));
/// ```
#[derive(Debug, Clone)]
pub struct ExpenseEntry {
    expense: Expense,
    payers: Vec<(MemberId, Decimal)>,
    method: SplitMethod,
    selections: Vec<Selection>,
}

impl ExpenseEntry {
    pub fn new(expense: Expense) -> Self {
        Self {
            expense,
            payers: Vec::new(),
            method: SplitMethod::Equal,
            selections: Vec::new(),
        }
    }

    /// Add a payer. Several payers may share one expense.
    pub fn paid_by(mut self, member: MemberId, amount: Decimal) -> Self {
        self.payers.push((member, amount));
        self
    }

    pub fn split(mut self, method: SplitMethod, selections: Vec<Selection>) -> Self {
        self.method = method;
        self.selections = selections;
        self
    }

    /// Allocate the splits and validate both sides against the expense total.
    pub fn record(self) -> Result<RecordedExpense, EngineError> {
        let total = self.expense.amount();
        let expense_id = self.expense.id();

        validate_allocation(
            total,
            self.payers.iter().map(|(_, amount)| *amount),
            AllocationKind::Payments,
        )?;

        let allocations = allocate(total, self.method, &self.selections);
        validate_allocation(
            total,
            allocations.iter().map(|a| a.amount),
            AllocationKind::Splits,
        )?;

        let contributions = self
            .payers
            .into_iter()
            .map(|(member, amount)| Contribution::new(expense_id, member, amount))
            .collect();

        let method = self.method;
        let splits = allocations
            .into_iter()
            .map(|a| Split {
                expense_id,
                member_id: a.member_id,
                amount: a.amount,
                method,
                percentage: if method == SplitMethod::Percentage {
                    a.percentage
                } else {
                    None
                },
                shares: if method == SplitMethod::Shares {
                    a.shares
                } else {
                    None
                },
                is_settled: false,
            })
            .collect();

        Ok(RecordedExpense {
            expense: self.expense,
            contributions,
            splits,
        })
    }
}

use crate::core::currency::CurrencyCode;
use crate::core::member::{GroupId, MemberId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A shared (or personal) expense.
///
/// The expense itself only records how much was spent, in which currency
/// and when. Who paid is held by [`Contribution`]s and who owes by
/// [`Split`]s, both keyed by the expense id.
///
/// # Examples
///
/// ```
/// use balance_engine::core::expense::Expense;
/// use balance_engine::core::currency::CurrencyCode;
/// use balance_engine::core::member::GroupId;
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let dinner = Expense::new(
///     dec!(100),
///     CurrencyCode::new("USD"),
///     NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
/// )
/// .in_group(GroupId::new("trip"));
///
/// assert_eq!(dinner.amount(), dec!(100));
/// assert!(!dinner.is_personal());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    id: Uuid,
    /// `None` for a personal expense.
    group_id: Option<GroupId>,
    /// Total amount in minor-unit precision. Always positive.
    amount: Decimal,
    currency: CurrencyCode,
    /// Calendar date the expense occurred on; selects the historical rate.
    date: NaiveDate,
    description: Option<String>,
}

impl Expense {
    /// Create a new personal expense with a fresh id.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is not positive.
    pub fn new(amount: Decimal, currency: CurrencyCode, date: NaiveDate) -> Self {
        Self::with_id(Uuid::new_v4(), amount, currency, date)
    }

    /// Create an expense with a specific ID (useful for testing / determinism).
    pub fn with_id(id: Uuid, amount: Decimal, currency: CurrencyCode, date: NaiveDate) -> Self {
        assert!(
            amount > Decimal::ZERO,
            "Expense amount must be positive, got {}",
            amount
        );
        Self {
            id,
            group_id: None,
            amount,
            currency,
            date,
            description: None,
        }
    }

    pub fn in_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn group_id(&self) -> Option<&GroupId> {
        self.group_id.as_ref()
    }

    pub fn is_personal(&self) -> bool {
        self.group_id.is_none()
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// One member paying part or all of one expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub expense_id: Uuid,
    pub member_id: MemberId,
    pub amount: Decimal,
}

impl Contribution {
    pub fn new(expense_id: Uuid, member_id: MemberId, amount: Decimal) -> Self {
        Self {
            expense_id,
            member_id,
            amount,
        }
    }
}

/// How a split amount was derived from the member's selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMethod {
    /// `total / selected_count` for every selected member.
    Equal,
    /// `total * percentage / 100`.
    Percentage,
    /// `total * shares / sum_of_shares`.
    Shares,
    /// Entered directly.
    Exact,
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SplitMethod::Equal => "equal",
            SplitMethod::Percentage => "percentage",
            SplitMethod::Shares => "shares",
            SplitMethod::Exact => "exact",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for SplitMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "equal" => Ok(SplitMethod::Equal),
            "percentage" => Ok(SplitMethod::Percentage),
            "shares" => Ok(SplitMethod::Shares),
            "exact" => Ok(SplitMethod::Exact),
            other => Err(format!("unknown split method '{}'", other)),
        }
    }
}

/// One member's obligated share of one expense.
///
/// A settled split still counts towards the group's total expenses but no
/// longer contributes to outstanding balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub expense_id: Uuid,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub method: SplitMethod,
    #[serde(default)]
    pub percentage: Option<Decimal>,
    #[serde(default)]
    pub shares: Option<Decimal>,
    #[serde(default)]
    pub is_settled: bool,
}

impl Split {
    pub fn new(expense_id: Uuid, member_id: MemberId, amount: Decimal, method: SplitMethod) -> Self {
        Self {
            expense_id,
            member_id,
            amount,
            method,
            percentage: None,
            shares: None,
            is_settled: false,
        }
    }

    pub fn settled(mut self) -> Self {
        self.is_settled = true;
        self
    }
}

//! # balance-engine
//!
//! Shared-expense balance and settlement engine.
//!
//! Given a group's expenses, who paid for them and how each one is split,
//! this engine computes every member's net position, optionally normalized
//! into a single display currency, and a short list of transfers that
//! settles the group.
//!
//! ## Architecture
//!
//! - **core** — Foundational types: members, expenses, splits, currencies, balances, ledger
//! - **allocation** — Split allocation and expense validation
//! - **fx** — Exchange-rate sources, caches and the currency converter
//! - **store** — Group repository seam and an in-memory implementation
//! - **optimization** — Balance aggregation and debt simplification
//! - **simulation** — Random group generation for load tests

pub mod allocation;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod fx;
pub mod optimization;
pub mod store;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::allocation::entry::{ExpenseEntry, RecordedExpense};
    pub use crate::allocation::split_allocator::{allocate, Selection};
    pub use crate::core::balance::{Debt, GroupBalanceSummary, UserBalance};
    pub use crate::core::currency::{ConversionMode, CurrencyCode};
    pub use crate::core::expense::{Contribution, Expense, Split, SplitMethod};
    pub use crate::core::member::{GroupId, MemberId};
    pub use crate::error::EngineError;
    pub use crate::fx::converter::CurrencyConverter;
    pub use crate::optimization::balances::{BalanceAggregator, BalanceOptions};
    pub use crate::optimization::settlement::DebtSimplifier;
}

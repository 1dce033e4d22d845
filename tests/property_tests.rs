use balance_engine::allocation::entry::ExpenseEntry;
use balance_engine::allocation::split_allocator::{allocate, Selection};
use balance_engine::core::balance::{GroupBalanceSummary, UserBalance};
use balance_engine::core::currency::{ConversionMode, CurrencyCode};
use balance_engine::core::expense::{Expense, SplitMethod};
use balance_engine::core::member::{GroupId, MemberId};
use balance_engine::fx::converter::CurrencyConverter;
use balance_engine::fx::rate_cache::CurrentRateCache;
use balance_engine::fx::rate_source::StaticRateSource;
use balance_engine::fx::rate_store::InMemoryRateStore;
use balance_engine::optimization::balances::{BalanceAggregator, BalanceOptions};
use balance_engine::optimization::settlement::DebtSimplifier;
use balance_engine::store::in_memory::InMemoryLedgerStore;
use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

const MEMBERS: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

/// A random expense: payer index, amount in cents, bitmask of who shares it.
fn arb_expense() -> impl Strategy<Value = (usize, i64, u8)> {
    (0..MEMBERS.len(), 1i64..1_000_000i64, 1u8..64u8)
}

/// Net balances in cents that sum to zero; the last member absorbs the rest.
/// Nets are even, so nobody sits inside the one-cent settled band.
fn arb_nets() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-250_000i64..250_000i64, 1..12).prop_map(|halves| {
        let mut nets: Vec<i64> = halves.into_iter().map(|h| h * 2).collect();
        let rest: i64 = nets.iter().sum();
        nets.push(-rest);
        nets
    })
}

/// Positive weights for a shares or percentage split.
fn arb_weights() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(1u32..50u32, 1..12)
}

fn to_balances(nets: &[i64]) -> Vec<UserBalance> {
    nets.iter()
        .enumerate()
        .map(|(i, cents)| UserBalance::from_net(MemberId::new(format!("M{}", i)), Decimal::new(*cents, 2)))
        .collect()
}

fn group_summary(expenses: &[(usize, i64, u8)]) -> GroupBalanceSummary {
    group_summary_in("USD", expenses, &BalanceOptions::new(), StaticRateSource::new())
}

fn group_summary_in(
    currency: &str,
    expenses: &[(usize, i64, u8)],
    options: &BalanceOptions,
    source: StaticRateSource,
) -> GroupBalanceSummary {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let group = GroupId::new("prop");
        let store = InMemoryLedgerStore::new();
        for m in MEMBERS {
            store.add_member(&group, MemberId::new(m)).await;
        }

        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        for (payer, cents, mask) in expenses {
            let amount = Decimal::new(*cents, 2);
            let among: Vec<Selection> = MEMBERS
                .iter()
                .enumerate()
                .filter(|(i, _)| *mask & (1u8 << *i) != 0)
                .map(|(_, m)| Selection::member(MemberId::new(*m)))
                .collect();
            let recorded = ExpenseEntry::new(
                Expense::new(amount, CurrencyCode::new(currency), date).in_group(group.clone()),
            )
            .paid_by(MemberId::new(MEMBERS[*payer]), amount)
            .split(SplitMethod::Equal, among)
            .record()
            .unwrap();
            store.save_expense(recorded).await;
        }

        let converter = CurrencyConverter::new(InMemoryRateStore::new(), source, CurrentRateCache::default());
        BalanceAggregator::new(store, converter)
            .calculate_group_balances(&group, options)
            .await
            .unwrap()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Net balances of a single-currency group sum to zero.
    #[test]
    fn balances_conserve(expenses in prop::collection::vec(arb_expense(), 0..20)) {
        let summary = group_summary(&expenses);
        let sum: Decimal = summary.user_balances.iter().map(|b| b.net_balance).sum();
        prop_assert_eq!(sum, Decimal::ZERO);
        prop_assert_eq!(summary.user_balances.len(), MEMBERS.len());
    }

    // Same records, same answer.
    #[test]
    fn balances_deterministic(expenses in prop::collection::vec(arb_expense(), 0..10)) {
        let first = group_summary(&expenses);
        let second = group_summary(&expenses);
        prop_assert_eq!(first.user_balances, second.user_balances);
        prop_assert_eq!(first.simplified_debts, second.simplified_debts);
    }

    // Equal splits always add back up to the total, and no member is more
    // than a cent-per-member away from an even share.
    #[test]
    fn equal_split_round_trip(cents in 1i64..10_000_000i64, n in 1usize..20) {
        let total = Decimal::new(cents, 2);
        let selections: Vec<Selection> = (0..n)
            .map(|i| Selection::member(MemberId::new(format!("M{}", i))))
            .collect();
        let out = allocate(total, SplitMethod::Equal, &selections);

        let sum: Decimal = out.iter().map(|a| a.amount).sum();
        prop_assert_eq!(sum, total);
        let even = total / Decimal::from(n);
        for a in &out[1..] {
            prop_assert!((a.amount - even).abs() < Decimal::new(1, 2));
        }
    }

    // Converting every amount before netting still conserves.
    #[test]
    fn converted_balances_conserve(
        expenses in prop::collection::vec(arb_expense(), 1..12),
        rate_bp in 5_000i64..20_000i64,
    ) {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let rate = Decimal::new(rate_bp, 4);
        let source = StaticRateSource::new().with_latest(
            CurrencyCode::new("EUR"),
            CurrencyCode::new("USD"),
            rate,
            date,
        );
        let options = BalanceOptions::converted_to(CurrencyCode::new("USD"), ConversionMode::Simple);
        let summary = group_summary_in("EUR", &expenses, &options, source);

        let sum: Decimal = summary.user_balances.iter().map(|b| b.net_balance).sum();
        prop_assert!(sum.abs() <= Decimal::new(1, 2));
        let paid: Decimal = summary.user_balances.iter().map(|b| b.total_paid).sum();
        prop_assert!((paid - summary.total_expenses).abs() <= Decimal::new(1, 2) * Decimal::from(MEMBERS.len()));
    }

    // Share splits add back up to the total exactly.
    #[test]
    fn shares_split_round_trip(cents in 1i64..10_000_000i64, weights in arb_weights()) {
        let total = Decimal::new(cents, 2);
        let selections: Vec<Selection> = weights
            .iter()
            .enumerate()
            .map(|(i, w)| Selection::member(MemberId::new(format!("M{}", i))).with_shares(Decimal::from(*w)))
            .collect();
        let out = allocate(total, SplitMethod::Shares, &selections);
        prop_assert_eq!(out.iter().map(|a| a.amount).sum::<Decimal>(), total);
    }

    // Percentages summing to 100 add back up to the total exactly.
    #[test]
    fn percentage_split_round_trip(cents in 1i64..10_000_000i64, weights in arb_weights()) {
        let total = Decimal::new(cents, 2);
        let weight_sum: u32 = weights.iter().sum();
        let mut percentages: Vec<Decimal> = weights
            .iter()
            .map(|w| (Decimal::from(*w) * Decimal::ONE_HUNDRED / Decimal::from(weight_sum)).round_dp(2))
            .collect();
        let assigned: Decimal = percentages.iter().sum();
        if let Some(last) = percentages.last_mut() {
            *last += Decimal::ONE_HUNDRED - assigned;
        }

        let selections: Vec<Selection> = percentages
            .iter()
            .enumerate()
            .map(|(i, p)| Selection::member(MemberId::new(format!("M{}", i))).with_percentage(*p))
            .collect();
        let out = allocate(total, SplitMethod::Percentage, &selections);
        prop_assert_eq!(out.iter().map(|a| a.amount).sum::<Decimal>(), total);
    }

    // Every edge is above the noise threshold.
    #[test]
    fn debts_exceed_tolerance(nets in arb_nets()) {
        let debts = DebtSimplifier::simplify(&to_balances(&nets));
        for d in &debts {
            prop_assert!(d.amount > Decimal::new(1, 2));
        }
    }

    // Greedy matching needs at most (creditors + debtors - 1) transfers.
    #[test]
    fn debts_bounded_edge_count(nets in arb_nets()) {
        let active = nets.iter().filter(|c| c.abs() > 1).count();
        let debts = DebtSimplifier::simplify(&to_balances(&nets));
        prop_assert!(debts.len() <= active.saturating_sub(1));
    }

    // Nobody both pays and receives, and paying the plan settles every
    // member to within a cent.
    #[test]
    fn debts_settle_group(nets in arb_nets()) {
        let balances = to_balances(&nets);
        let debts = DebtSimplifier::simplify(&balances);

        let payers: HashSet<_> = debts.iter().map(|d| d.from.clone()).collect();
        let payees: HashSet<_> = debts.iter().map(|d| d.to.clone()).collect();
        prop_assert!(payers.is_disjoint(&payees));

        let mut left: HashMap<MemberId, Decimal> = balances
            .iter()
            .map(|b| (b.member_id.clone(), b.net_balance))
            .collect();
        for d in &debts {
            *left.get_mut(&d.from).unwrap() += d.amount;
            *left.get_mut(&d.to).unwrap() -= d.amount;
        }
        prop_assert!(left.values().all(|v| v.abs() <= Decimal::new(1, 2)));
    }
}

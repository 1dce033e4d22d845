use balance_engine::core::member::MemberId;
use balance_engine::core::balance::UserBalance;
use balance_engine::core::ledger::BalanceLedger;
use balance_engine::fx::converter::CurrencyConverter;
use balance_engine::fx::rate_cache::CurrentRateCache;
use balance_engine::fx::rate_source::StaticRateSource;
use balance_engine::fx::rate_store::InMemoryRateStore;
use balance_engine::optimization::balances::{BalanceAggregator, BalanceOptions};
use balance_engine::optimization::settlement::DebtSimplifier;
use balance_engine::simulation::stress_test::{generate_random_group, GroupConfig};
use balance_engine::store::in_memory::InMemoryLedgerStore;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;

fn balances_for(members: usize, expenses: usize) -> Vec<UserBalance> {
    let group = generate_random_group(&GroupConfig {
        member_count: members,
        expense_count: expenses,
        seed: Some(11),
        ..Default::default()
    });
    let contributions: Vec<_> = group.expenses.iter().flat_map(|e| e.contributions.clone()).collect();
    let splits: Vec<_> = group.expenses.iter().flat_map(|e| e.splits.clone()).collect();
    BalanceLedger::from_records(&contributions, &splits).into_balances()
}

fn bench_simplify_10_members(c: &mut Criterion) {
    let balances = balances_for(10, 50);
    c.bench_function("simplify_10_members", |b| {
        b.iter(|| DebtSimplifier::simplify(black_box(&balances)))
    });
}

fn bench_simplify_1000_members(c: &mut Criterion) {
    let balances: Vec<UserBalance> = (0..1000)
        .map(|i| {
            let cents = if i % 2 == 0 { 1_000 + i } else { -(1_000 + i - 1) };
            UserBalance::from_net(MemberId::new(format!("M{}", i)), Decimal::new(cents, 2))
        })
        .collect();
    c.bench_function("simplify_1000_members", |b| {
        b.iter(|| DebtSimplifier::simplify(black_box(&balances)))
    });
}

fn bench_group_balances_100_expenses(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let generated = generate_random_group(&GroupConfig {
        member_count: 20,
        expense_count: 100,
        seed: Some(5),
        ..Default::default()
    });
    let store = InMemoryLedgerStore::new();
    runtime.block_on(generated.load_into(&store));

    let aggregator = BalanceAggregator::new(
        store,
        CurrencyConverter::new(
            InMemoryRateStore::new(),
            StaticRateSource::new(),
            CurrentRateCache::default(),
        ),
    );
    let options = BalanceOptions::new();

    c.bench_function("group_balances_100_expenses", |b| {
        b.iter(|| {
            runtime
                .block_on(aggregator.calculate_group_balances(black_box(&generated.group_id), &options))
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_simplify_10_members,
    bench_simplify_1000_members,
    bench_group_balances_100_expenses
);
criterion_main!(benches);

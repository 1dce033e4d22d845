//! A weekend trip split four ways.
//!
//! Shows every split method and how settled splits drop out of the
//! settlement plan.

use balance_engine::allocation::entry::ExpenseEntry;
use balance_engine::allocation::split_allocator::Selection;
use balance_engine::core::currency::CurrencyCode;
use balance_engine::core::expense::{Expense, SplitMethod};
use balance_engine::core::member::{GroupId, MemberId};
use balance_engine::error::EngineError;
use balance_engine::fx::converter::CurrencyConverter;
use balance_engine::fx::rate_cache::CurrentRateCache;
use balance_engine::fx::rate_source::StaticRateSource;
use balance_engine::fx::rate_store::InMemoryRateStore;
use balance_engine::optimization::balances::{BalanceAggregator, BalanceOptions};
use balance_engine::store::in_memory::InMemoryLedgerStore;
use chrono::NaiveDate;
use rust_decimal_macros::dec;

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    println!("╔══════════════════════════════════════════╗");
    println!("║  balance-engine: Group Trip Example      ║");
    println!("╚══════════════════════════════════════════╝\n");

    let trip = GroupId::new("lisbon-weekend");
    let [ana, ben, cleo, dev] = ["ana", "ben", "cleo", "dev"].map(MemberId::new);
    let usd = CurrencyCode::new("USD");
    let day = |d| NaiveDate::from_ymd_opt(2024, 9, d).unwrap();

    let store = InMemoryLedgerStore::new();
    for m in [&ana, &ben, &cleo, &dev] {
        store.add_member(&trip, m.clone()).await;
    }

    // Apartment: Ana paid, split evenly.
    let apartment = ExpenseEntry::new(
        Expense::new(dec!(480), usd.clone(), day(6))
            .in_group(trip.clone())
            .with_description("apartment"),
    )
    .paid_by(ana.clone(), dec!(480))
    .split(
        SplitMethod::Equal,
        [&ana, &ben, &cleo, &dev]
            .iter()
            .map(|m| Selection::member((*m).clone()))
            .collect(),
    )
    .record()?;

    // Dinner: Ben and Cleo paid together, split by what people ordered.
    let dinner = ExpenseEntry::new(
        Expense::new(dec!(150), usd.clone(), day(6))
            .in_group(trip.clone())
            .with_description("dinner"),
    )
    .paid_by(ben.clone(), dec!(100))
    .paid_by(cleo.clone(), dec!(50))
    .split(
        SplitMethod::Exact,
        vec![
            Selection::member(ana.clone()).with_amount(dec!(30)),
            Selection::member(ben.clone()).with_amount(dec!(45)),
            Selection::member(cleo.clone()).with_amount(dec!(35)),
            Selection::member(dev.clone()).with_amount(dec!(40)),
        ],
    )
    .record()?;

    // Car: Dev paid; Dev drove most, so shares.
    let car = ExpenseEntry::new(
        Expense::new(dec!(200), usd.clone(), day(7))
            .in_group(trip.clone())
            .with_description("car"),
    )
    .paid_by(dev.clone(), dec!(200))
    .split(
        SplitMethod::Shares,
        vec![
            Selection::member(ana.clone()).with_shares(dec!(1)),
            Selection::member(ben.clone()).with_shares(dec!(1)),
            Selection::member(dev.clone()).with_shares(dec!(2)),
        ],
    )
    .record()?;
    let car_id = car.expense.id();

    for recorded in [apartment, dinner, car] {
        store.save_expense(recorded).await;
    }

    let aggregator = BalanceAggregator::new(
        store.clone(),
        CurrencyConverter::new(
            InMemoryRateStore::new(),
            StaticRateSource::new(),
            CurrentRateCache::default(),
        ),
    );

    let summary = aggregator
        .calculate_group_balances(&trip, &BalanceOptions::new())
        .await?;
    println!("{}", summary);

    // Ben pays Dev back for the car directly.
    store.settle_split(car_id, &ben).await?;
    println!("━━━ After Ben settles his car share ━━━\n");
    let summary = aggregator
        .calculate_group_balances(&trip, &BalanceOptions::new())
        .await?;
    println!("{}", summary);

    Ok(())
}

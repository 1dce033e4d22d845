//! Expenses in three currencies, shown in USD.
//!
//! Compares today's-rate conversion with own-date conversion, and shows
//! the fallback when the rate source goes offline.

use balance_engine::allocation::entry::ExpenseEntry;
use balance_engine::allocation::split_allocator::Selection;
use balance_engine::config::EngineConfig;
use balance_engine::core::currency::{ConversionMode, CurrencyCode};
use balance_engine::core::expense::{Expense, SplitMethod};
use balance_engine::core::member::{GroupId, MemberId};
use balance_engine::error::EngineError;
use balance_engine::fx::converter::CurrencyConverter;
use balance_engine::fx::rate_cache::CurrentRateCache;
use balance_engine::fx::rate_source::StaticRateSource;
use balance_engine::fx::rate_store::InMemoryRateStore;
use balance_engine::optimization::balances::{BalanceAggregator, BalanceOptions};
use balance_engine::store::in_memory::InMemoryLedgerStore;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    let _ = env_logger::try_init();

    println!("╔══════════════════════════════════════════╗");
    println!("║  balance-engine: Multi-Currency Example  ║");
    println!("╚══════════════════════════════════════════╝\n");

    let group = GroupId::new("euro-rail");
    let members = ["mia", "noah", "omar"].map(MemberId::new);
    let day = |d| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
    let today = Utc::now().date_naive();
    let (eur, chf, usd) = (
        CurrencyCode::new("EUR"),
        CurrencyCode::new("CHF"),
        CurrencyCode::new("USD"),
    );

    let store = InMemoryLedgerStore::new();
    for m in &members {
        store.add_member(&group, m.clone()).await;
    }

    let expenses: [(Decimal, &CurrencyCode, NaiveDate, usize); 3] = [
        (dec!(300), &eur, day(2), 0),
        (dec!(120), &chf, day(4), 1),
        (dec!(90), &usd, day(5), 2),
    ];
    for (amount, currency, date, payer) in expenses {
        let recorded = ExpenseEntry::new(Expense::new(amount, currency.clone(), date).in_group(group.clone()))
            .paid_by(members[payer].clone(), amount)
            .split(
                SplitMethod::Equal,
                members.iter().cloned().map(Selection::member).collect(),
            )
            .record()?;
        store.save_expense(recorded).await;
    }

    let source = Arc::new(
        StaticRateSource::new()
            .with_latest(eur.clone(), usd.clone(), dec!(1.08), today)
            .with_latest(chf.clone(), usd.clone(), dec!(1.11), today)
            .with_historical(eur.clone(), usd.clone(), day(2), dec!(1.0712))
            .with_historical(chf.clone(), usd.clone(), day(4), dec!(1.0954)),
    );
    let aggregator = BalanceAggregator::new(
        store,
        CurrencyConverter::new(InMemoryRateStore::new(), source.clone(), CurrentRateCache::default()),
    );

    for mode in [ConversionMode::Simple, ConversionMode::Smart] {
        println!("━━━ Mode: {} ━━━\n", mode);
        let summary = aggregator
            .calculate_group_balances(&group, &BalanceOptions::converted_to(usd.clone(), mode))
            .await?;
        println!("{}", summary);
    }
    println!("Remote fetches so far: {}\n", source.fetch_count());

    // Historical rates are now stored, so own-date conversion keeps working offline.
    source.set_offline(true);
    println!("━━━ Mode: smart (source offline) ━━━\n");
    let summary = aggregator
        .calculate_group_balances(&group, &BalanceOptions::converted_to(usd, ConversionMode::Smart))
        .await?;
    println!("{}", summary);

    // The store outlives the calculations above; drop rates past retention.
    let retention = EngineConfig::default().rate_retention_days;
    let pruned = aggregator.converter().prune_rates(retention).await?;
    println!("Pruned {} stored rates older than {} days", pruned, retention);

    Ok(())
}

use crate::core::balance::GroupBalanceSummary;
use crate::core::currency::{round_money, ConversionMode, CurrencyCode, RateKey, RateTable};
use crate::core::expense::Expense;
use crate::core::ledger::BalanceLedger;
use crate::core::member::{GroupId, MemberId};
use crate::error::EngineError;
use crate::fx::converter::CurrencyConverter;
use crate::fx::rate_source::RateSource;
use crate::fx::rate_store::RateStore;
use crate::optimization::settlement::DebtSimplifier;
use crate::store::GroupRepository;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// How a balance calculation should treat currencies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceOptions {
    pub display_currency: Option<CurrencyCode>,
    pub conversion_mode: ConversionMode,
    /// With conversion off, sum amounts of different currencies as-is
    /// instead of failing.
    #[serde(default)]
    pub allow_mixed_currencies: bool,
}

impl BalanceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize every amount into `currency` using `mode`.
    pub fn converted_to(currency: CurrencyCode, mode: ConversionMode) -> Self {
        Self {
            display_currency: Some(currency),
            conversion_mode: mode,
            allow_mixed_currencies: false,
        }
    }

    pub fn allow_mixed_currencies(mut self, allow: bool) -> Self {
        self.allow_mixed_currencies = allow;
        self
    }

    /// The currency to convert into, or `None` when conversion is off.
    pub fn conversion_target(&self) -> Result<Option<&CurrencyCode>, EngineError> {
        match (self.conversion_mode, &self.display_currency) {
            (ConversionMode::Off, _) => Ok(None),
            (_, Some(currency)) => Ok(Some(currency)),
            (mode, None) => Err(EngineError::InvalidOptions(format!(
                "conversion mode '{}' requires a display currency",
                mode
            ))),
        }
    }
}

/// Computes per-member balances and the settlement plan for a group.
pub struct BalanceAggregator<G, S, R> {
    repository: G,
    converter: CurrencyConverter<S, R>,
}

impl<G, S, R> BalanceAggregator<G, S, R>
where
    G: GroupRepository,
    S: RateStore,
    R: RateSource,
{
    pub fn new(repository: G, converter: CurrencyConverter<S, R>) -> Self {
        Self {
            repository,
            converter,
        }
    }

    pub fn repository(&self) -> &G {
        &self.repository
    }

    pub fn converter(&self) -> &CurrencyConverter<S, R> {
        &self.converter
    }

    /// Balances for every member of `group`, plus simplified debts.
    ///
    /// # Algorithm
    ///
    /// 1. Load members, contributions, splits and expenses.
    /// 2. With conversion active, resolve one rate per distinct
    ///    `(currency, rate key)` up front.
    /// 3. Contributions add to `total_paid`; unsettled splits add to
    ///    `total_owes`. Every split, settled or not, counts towards
    ///    `total_expenses`.
    /// 4. Converted amounts are accumulated unrounded; totals and net
    ///    balances are rounded to cents once at the end and handed to
    ///    [`DebtSimplifier`].
    pub async fn calculate_group_balances(
        &self,
        group: &GroupId,
        options: &BalanceOptions,
    ) -> Result<GroupBalanceSummary, EngineError> {
        let target = options.conversion_target()?;

        let members = self.repository.list_group_members(group).await?;
        if members.is_empty() {
            debug!("group {} has no members", group);
            return Ok(GroupBalanceSummary::empty(group.clone()));
        }

        let contributions = self.repository.list_contributions_for_group(group).await?;
        let splits = self.repository.list_splits_for_group(group).await?;
        let expenses = self.repository.list_expenses_for_group(group).await?;
        let by_id: HashMap<Uuid, &Expense> = expenses.iter().map(|e| (e.id(), e)).collect();

        let mut pricing = match target {
            Some(target) => {
                let requests: Vec<(CurrencyCode, RateKey)> = expenses
                    .iter()
                    .filter_map(|e| {
                        options
                            .conversion_mode
                            .rate_key(e.date())
                            .map(|key| (e.currency().clone(), key))
                    })
                    .collect();
                let table = self.converter.resolve_rates(target, &requests).await;
                if table.is_empty() && !requests.is_empty() {
                    warn!("no rates into {} resolved up front; converting on demand", target);
                } else {
                    debug!("pre-resolved {} rates into {}", table.len(), target);
                }
                Some(table)
            }
            None => {
                check_single_currency(group, &expenses, options.allow_mixed_currencies)?;
                None
            }
        };

        let mut ledger = BalanceLedger::with_members(&members);
        let mut total_expenses = Decimal::ZERO;

        for c in &contributions {
            let amount = self
                .display_amount(c.amount, c.expense_id, &by_id, options, pricing.as_mut())
                .await?;
            note_former_member(&mut ledger, &c.member_id, group);
            ledger.record_payment(&c.member_id, amount);
        }

        for s in &splits {
            let amount = self
                .display_amount(s.amount, s.expense_id, &by_id, options, pricing.as_mut())
                .await?;
            total_expenses += amount;
            if s.is_settled {
                continue;
            }
            note_former_member(&mut ledger, &s.member_id, group);
            ledger.record_obligation(&s.member_id, amount);
        }

        if !ledger.is_balanced() {
            debug!(
                "group {} nets to {} rather than zero",
                group,
                ledger.net_sum()
            );
        }

        let member_count = ledger.member_count();
        let user_balances = ledger.into_balances();
        let simplified_debts = DebtSimplifier::simplify(&user_balances);
        info!(
            "group {}: {} members, {} debts",
            group,
            member_count,
            simplified_debts.len()
        );

        Ok(GroupBalanceSummary {
            group_id: group.clone(),
            total_expenses: round_money(total_expenses),
            user_balances,
            simplified_debts,
            display_currency: target.cloned(),
            conversion_mode: target.map(|_| options.conversion_mode),
        })
    }

    /// Signed settlement amount between `a` and `b`: positive when `b`
    /// owes `a`, negative when `a` owes `b`, zero when they are square.
    pub async fn get_balance_between_users(
        &self,
        group: &GroupId,
        a: &MemberId,
        b: &MemberId,
        options: &BalanceOptions,
    ) -> Result<Decimal, EngineError> {
        let summary = self.calculate_group_balances(group, options).await?;
        Ok(summary.balance_between(a, b))
    }

    /// A record amount in display currency, not yet rounded. Without a rate
    /// table the amount is returned untouched.
    async fn display_amount(
        &self,
        amount: Decimal,
        expense_id: Uuid,
        expenses: &HashMap<Uuid, &Expense>,
        options: &BalanceOptions,
        pricing: Option<&mut RateTable>,
    ) -> Result<Decimal, EngineError> {
        let table = match pricing {
            Some(table) => table,
            None => return Ok(amount),
        };
        let expense = expenses
            .get(&expense_id)
            .ok_or(EngineError::ExpenseNotFound(expense_id))?;
        if expense.currency() == &table.target {
            return Ok(amount);
        }

        let key = match options.conversion_mode.rate_key(expense.date()) {
            Some(key) => key,
            None => return Ok(amount),
        };

        let quote = match table.get(expense.currency(), &key).cloned() {
            Some(quote) => quote,
            None => {
                let quote = self
                    .converter
                    .rate_for(expense.currency(), &table.target, key)
                    .await?;
                table.insert(expense.currency().clone(), key, quote.clone());
                quote
            }
        };
        Ok(amount * quote.rate)
    }
}

fn check_single_currency(
    group: &GroupId,
    expenses: &[Expense],
    allow_mixed: bool,
) -> Result<(), EngineError> {
    let currencies: BTreeSet<&CurrencyCode> = expenses.iter().map(|e| e.currency()).collect();
    if currencies.len() <= 1 {
        return Ok(());
    }
    if allow_mixed {
        warn!(
            "group {} sums {} currencies without conversion",
            group,
            currencies.len()
        );
        return Ok(());
    }
    Err(EngineError::MixedCurrencies {
        group: group.to_string(),
        currencies: currencies.into_iter().cloned().collect(),
    })
}

fn note_former_member(ledger: &mut BalanceLedger, member: &MemberId, group: &GroupId) {
    if ledger.ensure_member(member) {
        warn!("{} has records in group {} but is not a member", member, group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::entry::{ExpenseEntry, RecordedExpense};
    use crate::allocation::split_allocator::Selection;
    use crate::clock::ManualClock;
    use crate::core::expense::SplitMethod;
    use crate::fx::rate_cache::CurrentRateCache;
    use crate::fx::rate_source::StaticRateSource;
    use crate::fx::rate_store::InMemoryRateStore;
    use crate::store::in_memory::InMemoryLedgerStore;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    type Aggregator =
        BalanceAggregator<InMemoryLedgerStore, InMemoryRateStore, Arc<StaticRateSource>>;

    fn group() -> GroupId {
        GroupId::new("flat")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, d).unwrap()
    }

    fn aggregator(store: InMemoryLedgerStore, source: StaticRateSource) -> (Aggregator, Arc<StaticRateSource>) {
        let _ = env_logger::try_init();
        let source = Arc::new(source);
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 8, 20, 9, 0, 0).unwrap());
        let converter = CurrencyConverter::new(
            InMemoryRateStore::new(),
            source.clone(),
            CurrentRateCache::default(),
        )
        .with_clock(Arc::new(clock));
        (BalanceAggregator::new(store, converter), source)
    }

    fn equal(amount: Decimal, currency: &str, date: NaiveDate, payer: &str, among: &[&str]) -> RecordedExpense {
        let expense = Expense::new(amount, CurrencyCode::new(currency), date).in_group(group());
        ExpenseEntry::new(expense)
            .paid_by(MemberId::new(payer), amount)
            .split(
                SplitMethod::Equal,
                among.iter().map(|m| Selection::member(MemberId::new(*m))).collect(),
            )
            .record()
            .unwrap()
    }

    async fn store_with(members: &[&str]) -> InMemoryLedgerStore {
        let store = InMemoryLedgerStore::new();
        for m in members {
            store.add_member(&group(), MemberId::new(*m)).await;
        }
        store
    }

    #[tokio::test]
    async fn test_idle_member_reported_with_zeros() {
        let store = store_with(&["a", "b", "idle"]).await;
        store.save_expense(equal(dec!(40), "USD", day(1), "a", &["a", "b"])).await;
        let (agg, _) = aggregator(store, StaticRateSource::new());

        let summary = agg
            .calculate_group_balances(&group(), &BalanceOptions::new())
            .await
            .unwrap();
        let idle = summary.balance_of(&MemberId::new("idle")).unwrap();
        assert_eq!(idle.total_paid, Decimal::ZERO);
        assert_eq!(idle.net_balance, Decimal::ZERO);
        assert_eq!(summary.user_balances[2].member_id, MemberId::new("idle"));
        assert!(summary.display_currency.is_none());
    }

    #[tokio::test]
    async fn test_no_members_is_empty() {
        let (agg, _) = aggregator(InMemoryLedgerStore::new(), StaticRateSource::new());
        let summary = agg
            .calculate_group_balances(&group(), &BalanceOptions::new())
            .await
            .unwrap();
        assert!(summary.user_balances.is_empty());
        assert!(summary.simplified_debts.is_empty());
    }

    #[tokio::test]
    async fn test_mode_without_display_currency_rejected() {
        let (agg, _) = aggregator(store_with(&["a"]).await, StaticRateSource::new());
        let options = BalanceOptions {
            conversion_mode: ConversionMode::Simple,
            ..BalanceOptions::default()
        };
        let result = agg.calculate_group_balances(&group(), &options).await;
        assert!(matches!(result, Err(EngineError::InvalidOptions(_))));
    }

    #[tokio::test]
    async fn test_mixed_currencies_without_conversion() {
        let store = store_with(&["a", "b"]).await;
        store.save_expense(equal(dec!(10), "USD", day(1), "a", &["a", "b"])).await;
        store.save_expense(equal(dec!(10), "EUR", day(2), "b", &["a", "b"])).await;
        let (agg, _) = aggregator(store, StaticRateSource::new());

        let strict = agg
            .calculate_group_balances(&group(), &BalanceOptions::new())
            .await;
        assert!(matches!(strict, Err(EngineError::MixedCurrencies { .. })));

        let lenient = agg
            .calculate_group_balances(&group(), &BalanceOptions::new().allow_mixed_currencies(true))
            .await
            .unwrap();
        assert_eq!(lenient.total_expenses, dec!(20));
        assert!(lenient.simplified_debts.is_empty());
    }

    #[tokio::test]
    async fn test_smart_mode_uses_each_expense_date() {
        let store = store_with(&["a", "b"]).await;
        store.save_expense(equal(dec!(100), "EUR", day(1), "a", &["a", "b"])).await;
        store.save_expense(equal(dec!(100), "EUR", day(2), "a", &["a", "b"])).await;
        let source = StaticRateSource::new()
            .with_historical("EUR".into(), "USD".into(), day(1), dec!(1.1))
            .with_historical("EUR".into(), "USD".into(), day(2), dec!(1.2));
        let (agg, source) = aggregator(store, source);

        let options = BalanceOptions::converted_to("USD".into(), ConversionMode::Smart);
        let summary = agg.calculate_group_balances(&group(), &options).await.unwrap();

        // 110 + 120 paid by a, half of each owed by b
        assert_eq!(summary.total_expenses, dec!(230));
        assert_eq!(summary.balance_of(&MemberId::new("b")).unwrap().net_balance, dec!(-115));
        assert_eq!(summary.conversion_mode, Some(ConversionMode::Smart));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_rate_fails_call() {
        let store = store_with(&["a", "b"]).await;
        store.save_expense(equal(dec!(100), "JPY", day(1), "a", &["a", "b"])).await;
        let (agg, _) = aggregator(store, StaticRateSource::new());

        let options = BalanceOptions::converted_to("USD".into(), ConversionMode::Simple);
        let result = agg.calculate_group_balances(&group(), &options).await;
        assert!(matches!(result, Err(EngineError::RateUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_former_member_records_still_count() {
        let store = store_with(&["a", "b"]).await;
        store.save_expense(equal(dec!(30), "USD", day(1), "a", &["a", "b", "gone"])).await;
        store.remove_member(&group(), &MemberId::new("gone")).await;
        let (agg, _) = aggregator(store, StaticRateSource::new());

        let summary = agg
            .calculate_group_balances(&group(), &BalanceOptions::new())
            .await
            .unwrap();
        assert_eq!(summary.user_balances.len(), 3);
        assert_eq!(summary.user_balances[2].member_id, MemberId::new("gone"));
        assert_eq!(summary.user_balances[2].net_balance, dec!(-10));
    }

    #[tokio::test]
    async fn test_converted_split_conserves() {
        let members = ["a", "b", "c", "d", "e", "f", "g"];
        let store = store_with(&members).await;
        store.save_expense(equal(dec!(100), "EUR", day(3), "a", &members)).await;
        let source = StaticRateSource::new().with_latest("EUR".into(), "USD".into(), dec!(1.0837), day(20));
        let (agg, _) = aggregator(store, source);

        let options = BalanceOptions::converted_to("USD".into(), ConversionMode::Simple);
        let summary = agg.calculate_group_balances(&group(), &options).await.unwrap();

        let net: Decimal = summary.user_balances.iter().map(|b| b.net_balance).sum();
        assert!(net.abs() <= dec!(0.01));
        assert_eq!(summary.total_expenses, dec!(108.37));
        assert_eq!(summary.balance_of(&MemberId::new("a")).unwrap().total_paid, dec!(108.37));

        let transferred: Decimal = summary.simplified_debts.iter().map(|d| d.amount).sum();
        assert_eq!(transferred, dec!(92.88));
    }
}

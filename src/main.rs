//! balance-engine CLI
//!
//! Compute group balances and settlement plans from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Balances for a group file
//! balance-engine balances --input trip.json
//!
//! # Normalize into USD with each expense's own-date rate
//! balance-engine balances --input trip.json --display-currency USD --mode smart
//!
//! # Settle a list of net balances
//! balance-engine simplify --input nets.json --format json
//!
//! # Preview a split
//! balance-engine allocate --total 100 --method percentage --members a,b --values 60,40
//!
//! # Generate a random group for testing
//! balance-engine generate --members 8 --expenses 40
//! ```

use balance_engine::allocation::entry::{ExpenseEntry, RecordedExpense};
use balance_engine::allocation::split_allocator::{allocate, validate_allocation, Selection};
use balance_engine::config::EngineConfig;
use balance_engine::core::balance::UserBalance;
use balance_engine::core::currency::{ConversionMode, CurrencyCode};
use balance_engine::core::expense::{Expense, SplitMethod};
use balance_engine::core::member::{GroupId, MemberId};
use balance_engine::error::AllocationKind;
use balance_engine::fx::converter::CurrencyConverter;
use balance_engine::fx::http_source::HttpRateSource;
use balance_engine::fx::rate_cache::CurrentRateCache;
use balance_engine::fx::rate_source::{RateSource, StaticRateSource};
use balance_engine::fx::rate_store::InMemoryRateStore;
use balance_engine::optimization::balances::{BalanceAggregator, BalanceOptions};
use balance_engine::optimization::settlement::DebtSimplifier;
use balance_engine::simulation::stress_test::{generate_random_group, GroupConfig};
use balance_engine::store::in_memory::InMemoryLedgerStore;
use chrono::{NaiveDate, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use std::fs;
use std::process;
use uuid::Uuid;

fn print_usage() {
    eprintln!(
        r#"balance-engine — shared-expense balances and settlement

USAGE:
    balance-engine <COMMAND> [OPTIONS]

COMMANDS:
    balances    Compute member balances and debts for a group file
    simplify    Turn a list of net balances into a settlement plan
    allocate    Preview how an amount splits between members
    generate    Generate a random group file (for testing)
    help        Show this message

OPTIONS (balances):
    --input <FILE>              Path to JSON group file
    --display-currency <CODE>   Currency to normalize amounts into
    --mode <MODE>               off (default), simple or smart
    --allow-mixed               Sum mixed currencies when conversion is off
    --format <FORMAT>           Output format: text (default) or json

OPTIONS (simplify):
    --input <FILE>      Path to JSON balances file
    --format <FORMAT>   Output format: text (default) or json

OPTIONS (allocate):
    --total <AMOUNT>    Amount to split
    --method <METHOD>   equal, percentage, shares or exact
    --members <LIST>    Comma-separated member ids
    --values <LIST>     Comma-separated percentages, shares or amounts

OPTIONS (generate):
    --members <N>       Number of members (default: 5)
    --expenses <N>      Number of expenses (default: 20)
    --currencies <LIST> Comma-separated currency codes (default: USD)
    --seed <N>          Fixed random seed
    --output <FILE>     Write to file instead of stdout

ENVIRONMENT:
    BALANCE_ENGINE_RATES_URL, BALANCE_ENGINE_HTTP_TIMEOUT_SECS,
    BALANCE_ENGINE_RATE_TTL_SECS, BALANCE_ENGINE_RATE_RETENTION_DAYS, LOG_LEVEL

EXAMPLES:
    balance-engine balances --input trip.json
    balance-engine balances --input trip.json --display-currency USD --mode simple
    balance-engine simplify --input nets.json
    balance-engine allocate --total 100 --method equal --members a,b,c
    balance-engine generate --members 4 --currencies USD,EUR --output group.json"#
    );
}

/// JSON schema for a group file.
#[derive(serde::Deserialize, serde::Serialize)]
struct GroupFile {
    group: String,
    members: Vec<String>,
    expenses: Vec<ExpenseInput>,
    /// Offline rate table. Entries without a date are served as current rates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rates: Vec<RateInput>,
}

#[derive(serde::Deserialize, serde::Serialize)]
struct ExpenseInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    amount: String,
    #[serde(default = "default_currency")]
    currency: String,
    date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    paid_by: Vec<PayerInput>,
    split: SplitInput,
    /// Members whose split of this expense is already settled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    settled: Vec<String>,
}

#[derive(serde::Deserialize, serde::Serialize)]
struct PayerInput {
    member: String,
    amount: String,
}

#[derive(serde::Deserialize, serde::Serialize)]
struct SplitInput {
    method: String,
    members: Vec<ShareInput>,
}

#[derive(serde::Deserialize, serde::Serialize)]
struct ShareInput {
    member: String,
    /// Percentage, share count or exact amount, depending on the method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

#[derive(serde::Deserialize, serde::Serialize)]
struct RateInput {
    base: String,
    target: String,
    #[serde(default)]
    date: Option<String>,
    rate: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(serde::Deserialize)]
struct BalanceInput {
    member: String,
    net: String,
}

#[derive(serde::Deserialize)]
struct BalancesFile {
    balances: Vec<BalanceInput>,
}

#[derive(serde::Serialize)]
struct AllocationOutput {
    member: String,
    amount: String,
}

fn parse_decimal(raw: &str, what: &str) -> Decimal {
    raw.trim().parse().unwrap_or_else(|e| {
        eprintln!("Invalid {} '{}': {}", what, raw, e);
        process::exit(1);
    })
}

fn parse_date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").unwrap_or_else(|e| {
        eprintln!("Invalid date '{}': {}", raw, e);
        process::exit(1);
    })
}

fn parse_method(raw: &str) -> SplitMethod {
    raw.parse().unwrap_or_else(|e| {
        eprintln!("{}", e);
        process::exit(1);
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str, expected: &str) -> T {
    let content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading file '{}': {}", path, e);
        process::exit(1);
    });
    serde_json::from_str(&content).unwrap_or_else(|e| {
        eprintln!("Error parsing JSON: {}", e);
        eprintln!("Expected format:");
        eprintln!("{}", expected);
        process::exit(1);
    })
}

fn selection_for(method: SplitMethod, share: &ShareInput) -> Selection {
    let selection = Selection::member(MemberId::new(share.member.as_str()));
    let value = match &share.value {
        Some(raw) => parse_decimal(raw, "split value"),
        None => return selection,
    };
    match method {
        SplitMethod::Equal => selection,
        SplitMethod::Percentage => selection.with_percentage(value),
        SplitMethod::Shares => selection.with_shares(value),
        SplitMethod::Exact => selection.with_amount(value),
    }
}

fn record_expense(group: &GroupId, input: &ExpenseInput) -> RecordedExpense {
    let amount = parse_decimal(&input.amount, "amount");
    if amount <= Decimal::ZERO {
        eprintln!("Expense amount must be positive, got {}", amount);
        process::exit(1);
    }
    let currency = CurrencyCode::new(input.currency.as_str());
    let date = parse_date(&input.date);

    let mut expense = match input.id {
        Some(id) => Expense::with_id(id, amount, currency, date),
        None => Expense::new(amount, currency, date),
    }
    .in_group(group.clone());
    if let Some(description) = &input.description {
        expense = expense.with_description(description.as_str());
    }

    let method = parse_method(&input.split.method);
    let selections = input
        .split
        .members
        .iter()
        .map(|share| selection_for(method, share))
        .collect();

    let mut entry = ExpenseEntry::new(expense);
    for payer in &input.paid_by {
        entry = entry.paid_by(
            MemberId::new(payer.member.as_str()),
            parse_decimal(&payer.amount, "payment"),
        );
    }

    entry.split(method, selections).record().unwrap_or_else(|e| {
        eprintln!("Rejected expense dated {}: {}", input.date, e);
        process::exit(1);
    })
}

fn offline_source(rates: &[RateInput]) -> StaticRateSource {
    let today = Utc::now().date_naive();
    rates.iter().fold(StaticRateSource::new(), |source, r| {
        let base = CurrencyCode::new(r.base.as_str());
        let target = CurrencyCode::new(r.target.as_str());
        let rate = parse_decimal(&r.rate, "rate");
        match &r.date {
            Some(date) => source.with_historical(base, target, parse_date(date), rate),
            None => source.with_latest(base, target, rate, today),
        }
    })
}

async fn run_balances<R: RateSource>(
    source: R,
    config: &EngineConfig,
    file: &GroupFile,
    options: &BalanceOptions,
    format: &str,
) {
    let group = GroupId::new(file.group.as_str());
    let store = InMemoryLedgerStore::new();
    for member in &file.members {
        store.add_member(&group, MemberId::new(member.as_str())).await;
    }
    for input in &file.expenses {
        let recorded = record_expense(&group, input);
        let expense_id = recorded.expense.id();
        store.save_expense(recorded).await;
        for member in &input.settled {
            if let Err(e) = store
                .settle_split(expense_id, &MemberId::new(member.as_str()))
                .await
            {
                warn!("cannot settle {} on {}: {}", member, input.date, e);
            }
        }
    }
    info!("loaded {} expenses for group {}", file.expenses.len(), group);

    let converter = CurrencyConverter::new(
        InMemoryRateStore::new(),
        source,
        CurrentRateCache::new(config.rate_ttl()),
    );
    let aggregator = BalanceAggregator::new(store, converter);

    let summary = aggregator
        .calculate_group_balances(&group, options)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        });

    if format == "json" {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error encoding JSON: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!("{}", summary);
    }
}

async fn cmd_balances(args: &[String], config: &EngineConfig) {
    let mut input_path = None;
    let mut format = "text".to_string();
    let mut options = BalanceOptions::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--input requires a file path");
                    process::exit(1);
                }));
            }
            "--display-currency" => {
                i += 1;
                let code = args.get(i).unwrap_or_else(|| {
                    eprintln!("--display-currency requires a currency code");
                    process::exit(1);
                });
                options.display_currency = Some(CurrencyCode::new(code.as_str()));
            }
            "--mode" => {
                i += 1;
                options.conversion_mode = args
                    .get(i)
                    .and_then(|s| s.parse::<ConversionMode>().ok())
                    .unwrap_or_else(|| {
                        eprintln!("--mode requires 'off', 'simple' or 'smart'");
                        process::exit(1);
                    });
            }
            "--allow-mixed" => options.allow_mixed_currencies = true,
            "--format" => {
                i += 1;
                format = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--format requires 'text' or 'json'");
                    process::exit(1);
                });
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });

    let file: GroupFile = read_json(
        &path,
        r#"{
  "group": "trip",
  "members": ["alice", "bob"],
  "expenses": [
    { "amount": "100", "currency": "EUR", "date": "2024-05-01",
      "paid_by": [{ "member": "alice", "amount": "100" }],
      "split": { "method": "equal", "members": [{ "member": "alice" }, { "member": "bob" }] } }
  ],
  "rates": [{ "base": "EUR", "target": "USD", "rate": "1.1" }]
}"#,
    );

    if file.rates.is_empty() {
        let source = HttpRateSource::new(config.rates_url.as_str(), config.http_timeout())
            .unwrap_or_else(|e| {
                eprintln!("Error creating rate client: {}", e);
                process::exit(1);
            });
        run_balances(source, config, &file, &options, &format).await;
    } else {
        run_balances(offline_source(&file.rates), config, &file, &options, &format).await;
    }
}

fn cmd_simplify(args: &[String]) {
    let mut input_path = None;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--input requires a file path");
                    process::exit(1);
                }));
            }
            "--format" => {
                i += 1;
                format = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--format requires 'text' or 'json'");
                    process::exit(1);
                });
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });

    let file: BalancesFile = read_json(
        &path,
        r#"{
  "balances": [
    { "member": "alice", "net": "50" },
    { "member": "bob", "net": "-50" }
  ]
}"#,
    );

    let balances: Vec<UserBalance> = file
        .balances
        .iter()
        .map(|b| UserBalance::from_net(MemberId::new(b.member.as_str()), parse_decimal(&b.net, "net balance")))
        .collect();
    let plan = DebtSimplifier::plan(&balances);

    if format == "json" {
        match serde_json::to_string_pretty(plan.debts()) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error encoding JSON: {}", e);
                process::exit(1);
            }
        }
    } else {
        print!("{}", plan);
    }
}

fn cmd_allocate(args: &[String]) {
    let mut total = None;
    let mut method = SplitMethod::Equal;
    let mut members: Vec<String> = Vec::new();
    let mut values: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--total" => {
                i += 1;
                let raw = args.get(i).unwrap_or_else(|| {
                    eprintln!("--total requires an amount");
                    process::exit(1);
                });
                total = Some(parse_decimal(raw, "total"));
            }
            "--method" => {
                i += 1;
                let raw = args.get(i).unwrap_or_else(|| {
                    eprintln!("--method requires equal, percentage, shares or exact");
                    process::exit(1);
                });
                method = parse_method(raw);
            }
            "--members" => {
                i += 1;
                members = args
                    .get(i)
                    .map(|s| s.split(',').map(|m| m.trim().to_string()).collect())
                    .unwrap_or_else(|| {
                        eprintln!("--members requires a comma-separated list");
                        process::exit(1);
                    });
            }
            "--values" => {
                i += 1;
                values = args
                    .get(i)
                    .map(|s| s.split(',').map(|v| v.trim().to_string()).collect())
                    .unwrap_or_else(|| {
                        eprintln!("--values requires a comma-separated list");
                        process::exit(1);
                    });
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let total = total.unwrap_or_else(|| {
        eprintln!("Error: --total <AMOUNT> is required");
        process::exit(1);
    });
    if !values.is_empty() && values.len() != members.len() {
        eprintln!("Error: --values must have one entry per member");
        process::exit(1);
    }

    let selections: Vec<Selection> = members
        .iter()
        .enumerate()
        .map(|(idx, member)| {
            let share = ShareInput {
                member: member.clone(),
                value: values.get(idx).cloned(),
            };
            selection_for(method, &share)
        })
        .collect();

    let allocations = allocate(total, method, &selections);
    let output: Vec<AllocationOutput> = allocations
        .iter()
        .map(|a| AllocationOutput {
            member: a.member_id.to_string(),
            amount: a.amount.to_string(),
        })
        .collect();

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error encoding JSON: {}", e);
            process::exit(1);
        }
    }

    if let Err(e) = validate_allocation(
        total,
        allocations.iter().map(|a| a.amount),
        AllocationKind::Splits,
    ) {
        eprintln!("Warning: {}", e);
        process::exit(2);
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = GroupConfig::default();
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--members" => {
                i += 1;
                config.member_count = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        eprintln!("--members requires a number");
                        process::exit(1);
                    });
            }
            "--expenses" => {
                i += 1;
                config.expense_count = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        eprintln!("--expenses requires a number");
                        process::exit(1);
                    });
            }
            "--currencies" => {
                i += 1;
                let raw = args.get(i).unwrap_or_else(|| {
                    eprintln!("--currencies requires a comma-separated list");
                    process::exit(1);
                });
                config.currencies = raw.split(',').map(|s| CurrencyCode::new(s.trim())).collect();
            }
            "--seed" => {
                i += 1;
                config.seed = Some(args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--seed requires a number");
                    process::exit(1);
                }));
            }
            "--output" => {
                i += 1;
                output_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--output requires a file path");
                    process::exit(1);
                }));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let generated = generate_random_group(&config);

    let output = GroupFile {
        group: generated.group_id.to_string(),
        members: generated.members.iter().map(|m| m.to_string()).collect(),
        expenses: generated
            .expenses
            .iter()
            .map(|recorded| {
                let method = recorded
                    .splits
                    .first()
                    .map(|s| s.method)
                    .unwrap_or(SplitMethod::Equal);
                ExpenseInput {
                    id: Some(recorded.expense.id()),
                    amount: recorded.expense.amount().to_string(),
                    currency: recorded.expense.currency().to_string(),
                    date: recorded.expense.date().format("%Y-%m-%d").to_string(),
                    description: None,
                    paid_by: recorded
                        .contributions
                        .iter()
                        .map(|c| PayerInput {
                            member: c.member_id.to_string(),
                            amount: c.amount.to_string(),
                        })
                        .collect(),
                    split: SplitInput {
                        method: method.to_string(),
                        members: recorded
                            .splits
                            .iter()
                            .map(|s| ShareInput {
                                member: s.member_id.to_string(),
                                value: match method {
                                    SplitMethod::Equal => None,
                                    SplitMethod::Percentage => s.percentage.map(|p| p.to_string()),
                                    SplitMethod::Shares => s.shares.map(|n| n.to_string()),
                                    SplitMethod::Exact => Some(s.amount.to_string()),
                                },
                            })
                            .collect(),
                    },
                    settled: Vec::new(),
                }
            })
            .collect(),
        rates: Vec::new(),
    };

    let json = serde_json::to_string_pretty(&output).unwrap_or_else(|e| {
        eprintln!("Error encoding JSON: {}", e);
        process::exit(1);
    });

    if let Some(path) = output_path {
        fs::write(&path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        eprintln!(
            "Generated {} expenses across {} members → {}",
            generated.expenses.len(),
            generated.members.len(),
            path
        );
    } else {
        println!("{}", json);
    }
}

#[tokio::main]
async fn main() {
    let config = EngineConfig::from_env();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "balances" => cmd_balances(rest, &config).await,
        "simplify" => cmd_simplify(rest),
        "allocate" => cmd_allocate(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}

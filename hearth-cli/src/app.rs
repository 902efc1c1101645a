use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use hearth_config::{HearthConfig, StoreBackend};
use hearth_core::{
    parse_amount, parse_positive_amount, AggregateField, Category, ContributionDraft, Expense,
    ExpenseDraft, ExpenseId, MemberId,
};
use hearth_events::EventBus;
use hearth_ledger::{
    ContributionQuery, ExpenseQuery, LedgerEngine, LedgerStore, MemoryLedgerStore,
    SqliteLedgerStore,
};
use hearth_reports::{write_expense_csv, GymSummary, Report, ReportRange};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::insight::{build_prompt, HttpInsightClient, InsightClient, InsightError};
use crate::output;
use crate::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "hearth", version, about = "Shared-household expense ledger")]
pub struct Cli {
    /// Path to a TOML configuration file layered over the built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Override the SQLite database path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Override the collection namespace.
    #[arg(long, global = true)]
    namespace: Option<String>,
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create member records for every roster entry.
    Init(InitArgs),
    /// Record, edit, delete or list expenses.
    #[command(subcommand)]
    Expense(ExpenseCommand),
    /// Top up a member's general or gym balance.
    Contribute(ContributeArgs),
    /// Overwrite a single stored total (administrative correction).
    SetBalance(SetBalanceArgs),
    /// Show member balances.
    Balances(BalancesArgs),
    /// Show a member's contribution history.
    History(HistoryArgs),
    /// Generate a household report for a date range.
    Report(ReportArgs),
    /// Ask the configured text-generation service for spending insights.
    Insight(InsightArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Also write the effective configuration to this path.
    #[arg(long)]
    write_config: Option<PathBuf>,
    /// Overwrite an existing file at --write-config.
    #[arg(long)]
    force: bool,
}

#[derive(Subcommand)]
enum ExpenseCommand {
    /// Record a new expense.
    Add(ExpenseAddArgs),
    /// Replace fields of an existing expense.
    Edit(ExpenseEditArgs),
    /// Delete an expense and refund its participants.
    Delete {
        id: ExpenseId,
    },
    /// List expenses, newest first.
    List(ExpenseListArgs),
}

#[derive(Args)]
struct ExpenseAddArgs {
    #[arg(long)]
    item: String,
    #[arg(long, default_value_t = Category::Food)]
    category: Category,
    #[arg(long, value_parser = positive_amount)]
    cost: Decimal,
    /// Purchase date (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    buyer: MemberId,
    /// Comma separated member ids sharing the cost.
    #[arg(long, value_delimiter = ',', required = true)]
    shared: Vec<MemberId>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ExpenseEditArgs {
    id: ExpenseId,
    #[arg(long)]
    item: Option<String>,
    #[arg(long)]
    category: Option<Category>,
    #[arg(long, value_parser = positive_amount)]
    cost: Option<Decimal>,
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    buyer: Option<MemberId>,
    #[arg(long, value_delimiter = ',')]
    shared: Option<Vec<MemberId>>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ExpenseListArgs {
    /// Only gym expenses.
    #[arg(long)]
    gym: bool,
    /// Only expenses this member bought or shares.
    #[arg(long)]
    member: Option<MemberId>,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    limit: Option<usize>,
    /// Write the listed expenses to a CSV file instead of printing them.
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ContributeArgs {
    member: MemberId,
    #[arg(value_parser = positive_amount)]
    amount: Decimal,
    /// Credit the gym pool instead of the general balance.
    #[arg(long)]
    gym: bool,
    /// Custom description; defaults to "Manual contribution by <name>".
    #[arg(long)]
    description: Option<String>,
    /// Extra tags attached to the contribution.
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Args)]
struct SetBalanceArgs {
    member: MemberId,
    /// One of total_deposited, total_paid, total_gym_deposited, total_gym_paid.
    field: AggregateField,
    #[arg(value_parser = any_amount)]
    value: Decimal,
}

#[derive(Args)]
struct BalancesArgs {
    /// Show the gym pool summary instead of general balances.
    #[arg(long)]
    gym: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct HistoryArgs {
    member: MemberId,
    /// Only gym contributions.
    #[arg(long)]
    gym: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Also export the report's expense log as CSV.
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct InsightArgs {
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Question to ask instead of the default review prompt.
    #[arg(long)]
    question: Option<String>,
    /// Print the prompt without calling the service.
    #[arg(long)]
    dry_run: bool,
}

fn positive_amount(raw: &str) -> Result<Decimal, String> {
    parse_positive_amount(raw).map_err(|err| err.to_string())
}

fn any_amount(raw: &str) -> Result<Decimal, String> {
    parse_amount(raw).map_err(|err| err.to_string())
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _guard = init_tracing(&config.logging, cli.verbose)?;
    debug!(namespace = %config.namespace, backend = ?config.store.backend, "configuration loaded");
    let engine = build_engine(&config)?;
    dispatch(cli.command, &config, &engine).await
}

fn load_config(cli: &Cli) -> Result<HearthConfig> {
    let mut config = hearth_config::load_config(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.store.backend = StoreBackend::Sqlite;
        config.store.path = db.clone();
    }
    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }
    Ok(config)
}

fn build_engine(config: &HearthConfig) -> Result<LedgerEngine> {
    let store: Arc<dyn LedgerStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(
            SqliteLedgerStore::new(&config.store.path, config.namespace.clone())
                .with_context(|| {
                    format!("failed to open ledger at {}", config.store.path.display())
                })?
                .with_busy_timeout(config.store.busy_timeout()),
        ),
        StoreBackend::Memory => Arc::new(MemoryLedgerStore::new()),
    };
    let roster = config.roster()?;
    let events = Arc::new(EventBus::new(config.events.capacity));
    Ok(LedgerEngine::new(store, roster).with_event_bus(events))
}

async fn dispatch(command: Command, config: &HearthConfig, engine: &LedgerEngine) -> Result<()> {
    match command {
        Command::Init(args) => init(args, config, engine),
        Command::Expense(command) => expense(command, engine),
        Command::Contribute(args) => contribute(args, engine),
        Command::SetBalance(args) => set_balance(args, engine),
        Command::Balances(args) => balances(args, config, engine),
        Command::History(args) => history(args, engine),
        Command::Report(args) => report(args, engine),
        Command::Insight(args) => insight(args, config, engine).await,
    }
}

fn init(args: InitArgs, config: &HearthConfig, engine: &LedgerEngine) -> Result<()> {
    let members = engine
        .ensure_roster()
        .context("failed to initialize member records")?;
    info!(members = members.len(), namespace = %config.namespace, "roster initialized");
    if let Some(path) = args.write_config {
        if path.exists() && !args.force {
            bail!(
                "{} already exists; pass --force to overwrite",
                path.display()
            );
        }
        fs::write(&path, config.to_toml()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote configuration to {}", path.display());
    }
    println!(
        "initialized {} members in namespace '{}'",
        members.len(),
        config.namespace
    );
    Ok(())
}

fn expense(command: ExpenseCommand, engine: &LedgerEngine) -> Result<()> {
    match command {
        ExpenseCommand::Add(args) => {
            let draft = ExpenseDraft::new(
                args.item,
                args.category,
                args.cost,
                args.date.unwrap_or_else(|| Utc::now().date_naive()),
                args.buyer,
                args.shared,
            );
            let expense = engine.add_expense(draft).context("failed to add expense")?;
            if args.json {
                output::print_json(&expense)
            } else {
                println!("recorded expense {}", expense.id);
                Ok(())
            }
        }
        ExpenseCommand::Edit(args) => {
            let current = engine
                .reader()
                .expense(&args.id)?
                .ok_or_else(|| anyhow!("expense {} not found", args.id))?;
            let draft = ExpenseDraft::new(
                args.item.unwrap_or(current.item_name),
                args.category.unwrap_or(current.category),
                args.cost.unwrap_or(current.cost),
                args.date.unwrap_or(current.date),
                args.buyer.unwrap_or(current.buyer),
                args.shared.unwrap_or(current.shared_with),
            );
            let edit = engine
                .edit_expense(args.id, draft)
                .context("failed to edit expense")?;
            output::warn_clamped(&edit.clamped, engine.roster());
            if args.json {
                output::print_json(&edit.current)
            } else {
                println!("updated expense {}", edit.current.id);
                Ok(())
            }
        }
        ExpenseCommand::Delete { id } => {
            let removal = engine
                .delete_expense(id)
                .context("failed to delete expense")?;
            output::warn_clamped(&removal.clamped, engine.roster());
            println!(
                "deleted expense {} ({})",
                removal.expense.id, removal.expense.item_name
            );
            Ok(())
        }
        ExpenseCommand::List(args) => {
            let mut query = if args.gym {
                ExpenseQuery::gym()
            } else {
                ExpenseQuery::default()
            }
            .with_date_range(args.from, args.to);
            if let Some(member) = args.member {
                query = query.with_member(member);
            }
            if let Some(limit) = args.limit {
                query = query.with_limit(limit);
            }
            let expenses = engine.reader().expenses(&query)?;
            if let Some(path) = args.csv {
                let written = export_csv(&path, engine, &expenses)?;
                println!("wrote {written} expenses to {}", path.display());
                Ok(())
            } else if args.json {
                output::print_json(&expenses)
            } else {
                output::print_expenses(&expenses, engine.roster());
                Ok(())
            }
        }
    }
}

fn contribute(args: ContributeArgs, engine: &LedgerEngine) -> Result<()> {
    let roster = engine.roster();
    let mut draft = if args.gym {
        ContributionDraft::gym(args.member, args.amount, roster)
    } else {
        ContributionDraft::manual(args.member, args.amount, roster)
    };
    if let Some(description) = args.description {
        draft.description = description;
    }
    draft.tags.extend(args.tags);
    let contribution = engine
        .record_contribution(draft)
        .context("failed to record contribution")?;
    println!(
        "recorded {} of {:.2} for {}",
        if contribution.is_gym() {
            "gym contribution"
        } else {
            "contribution"
        },
        contribution.amount,
        roster.display_name(&contribution.member)
    );
    Ok(())
}

fn set_balance(args: SetBalanceArgs, engine: &LedgerEngine) -> Result<()> {
    let member = engine
        .set_aggregate_field(&args.member, args.field, args.value)
        .context("failed to set balance")?;
    println!(
        "{} {} set to {:.2}",
        member.name,
        args.field,
        member.get(args.field)
    );
    Ok(())
}

fn balances(args: BalancesArgs, config: &HearthConfig, engine: &LedgerEngine) -> Result<()> {
    let reader = engine.reader();
    if args.gym {
        let expenses = reader.expenses(&ExpenseQuery::gym())?;
        let summary = GymSummary::build(
            &expenses,
            reader.gym_balances()?,
            config.reports.gym_recent,
        );
        if args.json {
            return output::print_json(&summary);
        }
        output::print_gym_summary(&summary, engine.roster());
        return Ok(());
    }
    let rows = reader.balances()?;
    if args.json {
        return output::print_json(&rows);
    }
    output::print_balances(&rows);
    Ok(())
}

fn history(args: HistoryArgs, engine: &LedgerEngine) -> Result<()> {
    if !engine.roster().contains(&args.member) {
        bail!("unknown member '{}'", args.member);
    }
    let reader = engine.reader();
    let entries = if args.gym {
        reader.gym_contribution_history(&args.member)?
    } else {
        reader.contribution_history(&args.member)?
    };
    if args.json {
        return output::print_json(&entries);
    }
    output::print_contributions(&entries);
    Ok(())
}

fn build_report(engine: &LedgerEngine, range: ReportRange) -> Result<Report> {
    let reader = engine.reader();
    let expenses = reader.expenses(&ExpenseQuery::default().with_date_range(range.start, range.end))?;
    let contributions = reader.contributions(&ContributionQuery::default())?;
    Ok(Report::generate(
        engine.roster(),
        range,
        &expenses,
        &contributions,
        reader.balances()?,
    ))
}

fn report(args: ReportArgs, engine: &LedgerEngine) -> Result<()> {
    let range = ReportRange::new(args.from, args.to)?;
    let report = build_report(engine, range)?;
    if let Some(path) = &args.csv {
        let written = export_csv(path, engine, &report.expenses)?;
        info!(rows = written, path = %path.display(), "expense log exported");
    }
    if args.json {
        return output::print_json(&report);
    }
    output::print_report(&report, engine.roster());
    Ok(())
}

async fn insight(args: InsightArgs, config: &HearthConfig, engine: &LedgerEngine) -> Result<()> {
    let range = ReportRange::new(args.from, args.to)?;
    let report = build_report(engine, range)?;
    let prompt = build_prompt(&report, engine.roster(), args.question.as_deref());
    if args.dry_run {
        println!("{prompt}");
        return Ok(());
    }
    let endpoint = config
        .insight
        .endpoint
        .as_deref()
        .ok_or(InsightError::NotConfigured)?;
    let api_key = std::env::var(&config.insight.api_key_env)
        .map_err(|_| InsightError::MissingApiKey(config.insight.api_key_env.clone()))?;
    let client = HttpInsightClient::new(
        endpoint,
        config.insight.model.clone(),
        api_key,
        config.insight.timeout(),
    )?;
    let text = client
        .generate(&prompt)
        .await
        .context("insight generation failed")?;
    println!("{text}");
    Ok(())
}

fn export_csv(path: &Path, engine: &LedgerEngine, expenses: &[Expense]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let written = write_expense_csv(BufWriter::new(file), engine.roster(), expenses)?;
    Ok(written)
}

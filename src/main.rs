use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use revenue_planner::config::{Config, ConfigOverrides};
use revenue_planner::inputs::PlanningInputs;
use revenue_planner::ledger::{ExpenseItem, ExpenseLedger};
use revenue_planner::output::csv::{to_csv, write_csv, DEFAULT_EXPORT_FILE};
use revenue_planner::output::json::{render_json, render_report};
use revenue_planner::output::table::render_table;
use revenue_planner::output::{
    constraint_table, exhaustive_table, format_currency, ledger_table, sampling_table, ResultTable,
};
use revenue_planner::recognition::RecognitionPolicy;
use revenue_planner::solver::BranchAndBound;
use revenue_planner::strategy::{
    run_constraint, run_exhaustive, run_sampling, ConstraintOutcome, ExhaustiveOutcome,
    SamplingOutcome, SolveMode,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "revenue-planner",
    about = "Find deal and coaching plans that meet a net profit target"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    /// Also write the result table as CSV (e.g. forecast_plan.csv).
    #[arg(long)]
    export: Option<PathBuf>,
    #[command(flatten)]
    forecast: ForecastArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args, Clone, Default)]
struct ForecastArgs {
    #[arg(short, long)]
    months: Option<i64>,
    #[arg(short, long)]
    target: Option<f64>,
    #[arg(long = "coaching-price")]
    coaching_price: Option<f64>,
    #[arg(long = "add-expense", value_name = "LABEL=AMOUNT")]
    add_expense: Vec<String>,
    #[arg(long = "remove-expense", value_name = "INDEX")]
    remove_expense: Vec<usize>,
    #[arg(long = "set-expense", value_name = "INDEX=LABEL=AMOUNT")]
    set_expense: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Best combination per month, all combinations enumerated.
    Exhaustive {
        #[arg(long, value_enum)]
        policy: Option<RecognitionPolicy>,
    },
    /// Random whole-horizon plans in batches, ranked by net profit.
    Sample {
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        batches: Option<usize>,
        #[arg(long = "batch-size")]
        batch_size: Option<usize>,
        #[arg(long = "near-target")]
        near_target: Option<f64>,
        #[arg(long)]
        top: Option<usize>,
        #[arg(long)]
        sequential: bool,
        #[arg(long, value_enum)]
        policy: Option<RecognitionPolicy>,
    },
    /// Integer model over the whole horizon.
    Solve {
        /// Minimize coaching clients plus deals instead of stopping at the first plan.
        #[arg(long)]
        optimize: bool,
        #[arg(long = "max-nodes")]
        max_nodes: Option<u64>,
        #[arg(long = "max-deals")]
        max_deals: Option<i64>,
        #[arg(long = "max-coaching")]
        max_coaching: Option<i64>,
        #[arg(long, value_enum)]
        policy: Option<RecognitionPolicy>,
    },
    /// Show the expense ledger after any edits.
    Expenses,
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    match &cli.command {
        Commands::Config { init, show } => handle_config_command(*init, *show, &config_path),
        Commands::Expenses => {
            let (_, ledger) = load_planner(&cli, &config_path)?;
            print_ledger(&ledger, cli.output)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Exhaustive { policy } => {
            let (config, inputs) = load_inputs(&cli, &config_path)?;
            let mut settings = config.exhaustive_settings();
            if let Some(policy) = policy {
                settings.policy = *policy;
            }
            let outcome = run_exhaustive(&inputs, &settings);
            report_exhaustive(&cli, &inputs, &outcome)
        }
        Commands::Sample {
            seed,
            batches,
            batch_size,
            near_target,
            top,
            sequential,
            policy,
        } => {
            let (mut config, inputs) = load_inputs(&cli, &config_path)?;
            if let Some(v) = batches {
                config.sampling.batches = *v;
            }
            if let Some(v) = batch_size {
                config.sampling.batch_size = *v;
            }
            if let Some(v) = near_target {
                config.sampling.near_target = *v;
            }
            if let Some(v) = top {
                config.sampling.top = *v;
            }
            if *sequential {
                config.sampling.parallel = false;
            }
            if let Some(policy) = policy {
                config.recognition.sampling = *policy;
            }
            let settings = config.sampling_settings()?;
            let mut rng = match seed.or(config.sampling.seed) {
                Some(seed) => SmallRng::seed_from_u64(seed),
                None => SmallRng::from_entropy(),
            };
            let outcome = run_sampling(&inputs, &settings, &mut rng)?;
            report_sampling(&cli, &inputs, &outcome)
        }
        Commands::Solve {
            optimize,
            max_nodes,
            max_deals,
            max_coaching,
            policy,
        } => {
            let (mut config, inputs) = load_inputs(&cli, &config_path)?;
            if let Some(v) = max_nodes {
                config.solver.max_nodes = *v;
            }
            if max_deals.is_some() {
                config.solver.max_deals_per_month = *max_deals;
            }
            if max_coaching.is_some() {
                config.solver.max_coaching_per_month = *max_coaching;
            }
            if let Some(policy) = policy {
                config.recognition.constraint = *policy;
            }
            let mode = if *optimize {
                SolveMode::MinimizeWorkload
            } else {
                SolveMode::Feasibility
            };
            let settings = config.constraint_settings(mode)?;
            let solver = BranchAndBound::new(config.solver.max_nodes);
            let outcome = run_constraint(&inputs, &settings, &solver)?;
            report_constraint(&cli, &inputs, &outcome)
        }
    }
}

/// Config file plus flag overrides, and the ledger after any edits.
fn load_planner(cli: &Cli, config_path: &Path) -> Result<(Config, ExpenseLedger)> {
    let mut config = Config::load(Some(config_path))?;
    config.apply_overrides(ConfigOverrides {
        months: cli.forecast.months,
        net_target: cli.forecast.target,
        coaching_price: cli.forecast.coaching_price,
    });
    let mut ledger = config.ledger()?;
    apply_ledger_edits(&mut ledger, &cli.forecast)?;
    Ok((config, ledger))
}

fn load_inputs(cli: &Cli, config_path: &Path) -> Result<(Config, PlanningInputs)> {
    let (config, ledger) = load_planner(cli, config_path)?;
    let inputs = config.to_inputs(&ledger)?;
    info!(
        months = inputs.horizon,
        net_target = inputs.net_target,
        monthly_expense = inputs.monthly_expense,
        deal_types = inputs.catalog.len(),
        "inputs validated"
    );
    Ok((config, inputs))
}

fn handle_config_command(init: bool, show: bool, config_path: &Path) -> Result<ExitCode> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        let config = Config::load(Some(config_path))?;
        println!("{}", render_json(&config)?);
    }
    Ok(ExitCode::SUCCESS)
}

fn apply_ledger_edits(ledger: &mut ExpenseLedger, args: &ForecastArgs) -> Result<()> {
    for raw in &args.set_expense {
        let (index, item) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("--set-expense expects INDEX=LABEL=AMOUNT, got '{raw}'"))?;
        let index: usize = index
            .trim()
            .parse()
            .with_context(|| format!("invalid expense index in '{raw}'"))?;
        ledger.update(index, parse_expense(item)?)?;
    }

    let mut removals = args.remove_expense.clone();
    removals.sort_unstable_by(|a, b| b.cmp(a));
    removals.dedup();
    for index in removals {
        let removed = ledger.remove_at(index)?;
        info!(label = %removed.label, "removed expense");
    }

    for raw in &args.add_expense {
        ledger.add(parse_expense(raw)?)?;
    }
    Ok(())
}

fn parse_expense(raw: &str) -> Result<ExpenseItem> {
    let (label, amount) = raw
        .rsplit_once('=')
        .ok_or_else(|| anyhow!("expense must look like LABEL=AMOUNT, got '{raw}'"))?;
    let amount: f64 = amount
        .trim()
        .parse()
        .with_context(|| format!("invalid expense amount in '{raw}'"))?;
    Ok(ExpenseItem::new(label.trim(), amount))
}

fn print_ledger(ledger: &ExpenseLedger, format: OutputFormat) -> Result<()> {
    let table = ledger_table(ledger.items());
    match format {
        OutputFormat::Table => {
            println!("{}", render_table(&table));
            println!(
                "Total Monthly Expense: {}",
                format_currency(ledger.monthly_total(), 2)
            );
        }
        OutputFormat::Json => println!("{}", render_json(ledger)?),
        OutputFormat::Csv => print!("{}", to_csv(&table)?),
    }
    Ok(())
}

fn emit(cli: &Cli, table: &ResultTable, headline: &str, json: String) -> Result<()> {
    match cli.output {
        OutputFormat::Table => {
            println!("{headline}");
            println!("{}", render_table(table));
        }
        OutputFormat::Json => println!("{json}"),
        OutputFormat::Csv => print!("{}", to_csv(table)?),
    }
    if let Some(path) = &cli.export {
        let path = if path.is_dir() {
            path.join(DEFAULT_EXPORT_FILE)
        } else {
            path.clone()
        };
        write_csv(&path, table)?;
        info!(path = %path.display(), rows = table.rows.len(), "exported CSV");
    }
    Ok(())
}

fn emit_failure(cli: &Cli, message: &str, json: String) -> Result<ExitCode> {
    match cli.output {
        OutputFormat::Json => println!("{json}"),
        OutputFormat::Table | OutputFormat::Csv => eprintln!("{message}"),
    }
    if cli.export.is_some() {
        warn!("nothing to export");
    }
    Ok(ExitCode::from(2))
}

fn report_exhaustive(
    cli: &Cli,
    inputs: &PlanningInputs,
    outcome: &ExhaustiveOutcome,
) -> Result<ExitCode> {
    let json = render_report("exhaustive", inputs, outcome)?;
    match outcome {
        ExhaustiveOutcome::Feasible { months, summary } => {
            let headline = format!(
                "Found viable combinations for all months. Revenue {}, expenses {}, net {}.",
                format_currency(summary.total_revenue, 2),
                format_currency(summary.total_expense, 2),
                format_currency(summary.net_profit, 2),
            );
            emit(cli, &exhaustive_table(months), &headline, json)?;
            Ok(ExitCode::SUCCESS)
        }
        ExhaustiveOutcome::Infeasible {
            month,
            monthly_target,
        } => emit_failure(
            cli,
            &format!(
                "No combination reaches the monthly target of {} in month {}. Try adjusting ranges.",
                format_currency(*monthly_target, 2),
                month + 1
            ),
            json,
        ),
    }
}

fn report_sampling(
    cli: &Cli,
    inputs: &PlanningInputs,
    outcome: &SamplingOutcome,
) -> Result<ExitCode> {
    let json = render_report("sampling", inputs, outcome)?;
    match outcome {
        SamplingOutcome::Found {
            scenarios,
            accepted,
            sampled,
        } => {
            let headline = format!(
                "{accepted} of {sampled} sampled plans cleared the threshold; showing the top {}.",
                scenarios.len()
            );
            emit(cli, &sampling_table(scenarios), &headline, json)?;
            Ok(ExitCode::SUCCESS)
        }
        SamplingOutcome::Empty {
            sampled,
            near_target,
        } => emit_failure(
            cli,
            &format!(
                "No results: none of {sampled} sampled plans reached {}. More batches or a lower threshold may find some.",
                format_currency(*near_target, 2)
            ),
            json,
        ),
    }
}

fn report_constraint(
    cli: &Cli,
    inputs: &PlanningInputs,
    outcome: &ConstraintOutcome,
) -> Result<ExitCode> {
    let json = render_report("constraint", inputs, outcome)?;
    match outcome {
        ConstraintOutcome::Solved(solved) => {
            let headline = format!(
                "Found a viable forecast plan ({}). Net {} against target {}, workload {}.",
                solved.status,
                format_currency(solved.net_profit as f64, 0),
                format_currency(solved.net_target as f64, 0),
                solved.workload_score
            );
            emit(cli, &constraint_table(solved), &headline, json)?;
            Ok(ExitCode::SUCCESS)
        }
        ConstraintOutcome::Infeasible { .. } => emit_failure(
            cli,
            "No feasible plan exists under these constraints. Try loosening them.",
            json,
        ),
        ConstraintOutcome::Undecided { nodes } => emit_failure(
            cli,
            &format!(
                "Search stopped after {nodes} nodes without a plan or a proof of infeasibility. Raise --max-nodes."
            ),
            json,
        ),
    }
}

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use expense_recon::{
    CleaningReport, DatasetSummary, FileRosterSource, Findings, HttpRosterClient, Pipeline,
    PipelineConfig, PipelineError, ReconciliationReport, RosterConfig, RosterSource,
    RosterSummary, RunWriter,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Reconcile parliamentary expense records with the legislator roster
#[derive(Parser, Debug)]
#[command(name = "expense-recon", version, about)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true, env = "EXPENSE_RECON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full pipeline: load, clean, fetch roster, reconcile, aggregate, write results
    Run {
        /// Expense file (delimited text)
        csv: PathBuf,

        /// Root directory for run folders
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rows in the top payees table
        #[arg(long)]
        top_n: Option<usize>,

        /// Also export all tables to SQLite
        #[arg(long)]
        sqlite: bool,

        #[command(flatten)]
        roster: RosterArgs,
    },

    /// Load and clean an expense file, then print a dataset summary
    Summary {
        csv: PathBuf,
    },

    /// Fetch the legislator roster and print a summary
    Roster {
        #[command(flatten)]
        roster: RosterArgs,
    },
}

#[derive(Args, Debug)]
struct RosterArgs {
    /// Read the roster from a saved JSON file instead of the API
    #[arg(long, conflicts_with = "api_url")]
    roster_file: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, env = "EXPENSE_RECON_API_URL")]
    api_url: Option<String>,

    /// Only fetch the first page
    #[arg(long)]
    no_pagination: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("\n❌ {}", err);
            let code = match err.downcast_ref::<PipelineError>() {
                Some(pipeline_err) => {
                    print_hint(pipeline_err);
                    pipeline_err.exit_code()
                }
                None => 1,
            };
            ExitCode::from(code as u8)
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            csv,
            output,
            top_n,
            sqlite,
            roster,
        } => {
            if let Some(dir) = output {
                config.output.dir = dir;
            }
            if let Some(n) = top_n {
                config.analysis.top_n = n;
            }
            config.output.sqlite |= sqlite;
            config.validate()?;
            run_pipeline(config, &csv, &roster)
        }
        Command::Summary { csv } => run_summary(config, &csv),
        Command::Roster { roster } => run_roster(&config.roster, &roster),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => Ok(PipelineConfig::from_file(p)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn roster_source(config: &RosterConfig, args: &RosterArgs) -> Result<Box<dyn RosterSource>> {
    if let Some(path) = &args.roster_file {
        return Ok(Box::new(FileRosterSource::new(path)));
    }

    let mut config = config.clone();
    if let Some(url) = &args.api_url {
        config.base_url = url.clone();
    }
    if args.no_pagination {
        config.follow_pagination = false;
    }
    Ok(Box::new(HttpRosterClient::new(config)?))
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_pipeline(config: PipelineConfig, csv: &Path, roster_args: &RosterArgs) -> Result<()> {
    print_header();

    let source = roster_source(&config.roster, roster_args)?;
    let output = config.output.clone();
    let pipeline = Pipeline::new(config, source);

    let outcome = pipeline.run(csv)?;

    print_cleaning(&outcome.cleaning.report);
    print_dataset(&outcome.dataset);
    print_reconciliation(&outcome.reconciliation.report);

    let run_dir = RunWriter::new(&output.dir)
        .with_sqlite(output.sqlite)
        .write(&outcome)?;

    print_findings(&outcome.findings);

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Analysis complete");
    println!("📁 Results: {}", run_dir.display());
    Ok(())
}

fn run_summary(config: PipelineConfig, csv: &Path) -> Result<()> {
    // The roster is never fetched in this mode
    let pipeline = Pipeline::new(config, Box::new(expense_recon::InMemoryRoster::default()));
    let (_, cleaned) = pipeline.load_and_clean(csv)?;

    print_cleaning(&cleaned.report);
    print_dataset(&DatasetSummary::from_records(&cleaned.records));
    Ok(())
}

fn run_roster(config: &RosterConfig, args: &RosterArgs) -> Result<()> {
    let source = roster_source(config, args)?;
    let records = source.fetch_roster()?;
    let summary = RosterSummary::from_records(&records);

    println!("\n🏛️  Roster: {}", source.describe());
    println!("   Legislators: {}", summary.legislators);
    println!("   Parties:     {}", summary.parties);
    println!("   Regions:     {}", summary.regions);
    println!("\n   Legislators per party (top 10):");
    for (party, count) in summary.per_party.iter().take(10) {
        println!("   {:<12} {}", party, count);
    }

    println!("\n   Sample:");
    for r in records.iter().take(10) {
        println!("   {} ({}-{})", r.full_name, r.party_code, r.region_code);
    }
    Ok(())
}

// ============================================================================
// CONSOLE OUTPUT (consumers of the structured reports)
// ============================================================================

fn print_header() {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📊 Parliamentary Expense Reconciliation v{}", expense_recon::VERSION);
    println!("   {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

fn print_cleaning(report: &CleaningReport) {
    println!("\n🧹 Cleaning");
    println!("   Raw rows:                 {}", report.raw_rows);
    println!("   ✓ Removed (null fields):  {}", report.nulls_removed);
    println!("   ✓ Removed (amount ≤ 0):   {}", report.invalid_removed);
    println!("   ✓ Removed (duplicates):   {}", report.duplicates_removed);
    println!("   Final rows:               {}", report.final_rows);
    println!("   Reduction:                {:.1}%", report.reduction_pct());
}

fn print_dataset(summary: &DatasetSummary) {
    println!("\n📈 Dataset");
    println!("   Records:             {}", summary.records);
    println!("   Distinct payees:     {}", summary.distinct_payees);
    println!("   Distinct categories: {}", summary.distinct_categories);
    println!("   Total:               {:.2}", summary.total);
    println!("   Mean / median:       {:.2} / {:.2}", summary.mean, summary.median);
    println!("   Min / max:           {:.2} / {:.2}", summary.min, summary.max);

    println!("\n   Most frequent categories:");
    for (i, (category, count)) in summary.top_categories.iter().enumerate() {
        println!("   {}. {}: {} records", i + 1, category, count);
    }
    println!("\n   Most frequent payees:");
    for (i, (payee, count)) in summary.top_payees.iter().enumerate() {
        println!("   {}. {}: {} records", i + 1, payee, count);
    }
}

fn print_reconciliation(report: &ReconciliationReport) {
    println!("\n🔗 Reconciliation");
    println!("   Records:   {}", report.total_records);
    println!("   Matched:   {} ({:.1}%)", report.matched, report.match_rate);
    println!("   Unmatched: {}", report.unmatched);

    if !report.unmatched_payees.is_empty() {
        println!("\n   ⚠️  Payees without a roster entry:");
        for name in report.unmatched_payees.iter().take(10) {
            println!("      - {}", name);
        }
        if report.unmatched_payees.len() > 10 {
            println!("      ... and {} more", report.unmatched_payees.len() - 10);
        }
    }
    if !report.ambiguities.is_empty() {
        println!("\n   ⚠️  {} ambiguous roster names (first entry kept)", report.ambiguities.len());
    }
}

fn print_findings(findings: &Findings) {
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🏆 Key findings (matched records)");
    println!("   Total spent:     {:.2}", findings.matched_total);
    println!("   Payees:          {}", findings.matched_payees);
    println!("   Records:         {}", findings.matched_records);
    println!("   Spend per payee: {:.2}", findings.spend_per_payee);

    println!("\n   Top parties:");
    for (i, g) in findings.top_parties.iter().enumerate() {
        println!(
            "   {}. {}: {:.2} ({} payees, {:.2} per payee)",
            i + 1,
            g.group_key,
            g.total,
            g.distinct_payees,
            g.mean_per_payee
        );
    }
    println!("\n   Top regions:");
    for (i, g) in findings.top_regions.iter().enumerate() {
        println!(
            "   {}. {}: {:.2} ({} payees, {:.2} per payee)",
            i + 1,
            g.group_key,
            g.total,
            g.distinct_payees,
            g.mean_per_payee
        );
    }
    println!("\n   Top categories:");
    for (i, c) in findings.top_categories.iter().enumerate() {
        println!(
            "   {}. {}: {:.2} ({:.1}%)",
            i + 1,
            c.category,
            c.total,
            c.percentage_of_grand_total
        );
    }
    println!("\n   Top payees:");
    for (i, p) in findings.top_payees.iter().enumerate() {
        println!(
            "   {}. {} ({}-{}): {:.2}",
            i + 1,
            p.payee_name,
            p.party_code,
            p.region_code,
            p.total
        );
    }
}

fn print_hint(err: &PipelineError) {
    match err.root() {
        PipelineError::SourceNotFound { .. } => {
            eprintln!("   Download the expense file from https://www.camara.leg.br/cota-parlamentar/");
        }
        PipelineError::Schema { .. } => {
            eprintln!("   Check [csv] delimiter and [csv.columns] in the config file.");
        }
        PipelineError::Network { .. } => {
            eprintln!("   Check connectivity, or pass --roster-file with a saved roster.");
        }
        _ => {}
    }
}

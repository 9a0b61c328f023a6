use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shipcast::config::{Config, DEFAULT_CONFIG_FILE};
use shipcast::ingest::import_dir;
use shipcast::report::{write_summary, write_velocity_stats};
use shipcast::telemetry::init_tracing;
use shipcast::{Database, ForecastEngine, TableFormat, VelocityModel};
use std::io::Write;
use std::path::PathBuf;

/// Forecast when in-progress cards will ship, from each owner's
/// historical velocity.
#[derive(Parser, Debug)]
#[command(name = "shipcast", version, about)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the database path from the config file
    #[arg(long)]
    database: Option<PathBuf>,

    /// Write JSON logs to a daily-rolling file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import card snapshots (in-progress, then completed) into the database
    Import,
    /// Report per-owner card counts and work totals
    Stats,
    /// Report per-owner velocity quantiles
    Velocities,
    /// Simulate ship dates and print the cumulative table
    Forecast {
        /// Number of trials per owner
        #[arg(long)]
        trials: Option<usize>,
        /// Print trial counts instead of percentages
        #[arg(long)]
        count: bool,
        /// Seed the random source for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_dir.as_deref()).context("failed to initialise logging")?;

    let config = Config::load(&cli.config)?;
    let database_path = cli.database.clone().unwrap_or_else(|| config.storage.database.clone());
    let db = Database::new(&database_path)
        .with_context(|| format!("failed to open database {}", database_path.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Import => {
            let lists = config.lists.as_ref();
            let in_progress = import_dir(&db, &config.storage.in_progress_cards, false, lists)?;
            let completed = import_dir(&db, &config.storage.completed_cards, true, lists)?;
            let total = in_progress.merge(completed);
            tracing::info!(
                imported = total.imported,
                rejected = total.rejected,
                stored = db.card_count()?,
                "import finished"
            );
        }
        Commands::Stats => {
            write_summary(&mut out, &db.summary_report()?)?;
        }
        Commands::Velocities => {
            let cutoff = chrono::TimeDelta::try_days(config.forecast.lookback_days)
                .and_then(|window| chrono::Local::now().naive_local().checked_sub_signed(window))
                .context("lookback window is out of range")?;
            let models = db
                .distinct_owners()?
                .iter()
                .map(|owner| VelocityModel::build(&db, &config.task_weights, owner, cutoff))
                .collect::<shipcast::AppResult<Vec<_>>>()?;
            write_velocity_stats(&mut out, &models)?;
        }
        Commands::Forecast { trials, count, seed } => {
            let format = if count { TableFormat::Count } else { config.forecast.output };
            let engine = ForecastEngine::new(&db, &config.task_weights, trials.unwrap_or(config.forecast.trials))
                .lookback_days(config.forecast.lookback_days);
            let table = match seed {
                Some(seed) => engine.simulate(&mut StdRng::seed_from_u64(seed))?,
                None => engine.simulate(&mut rand::rng())?,
            };

            let cut_line = format!("{}CUT HERE{}", "- ".repeat(18), " -".repeat(18));
            eprintln!("{}", cut_line);
            table.write(&mut out, format)?;
            eprintln!("{}", cut_line);
        }
    }

    out.flush()?;
    Ok(())
}

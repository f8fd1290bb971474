use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use tracing::info;

use usage_report::adapters::SimApi;
use usage_report::analyzer::{PeriodSelection, ReportCommand, ReportOptions, UsageAnalyzer};
use usage_report::config::get_config;
use usage_report::display::DisplayManager;
use usage_report::logging::init_logging;
use usage_report::{GroupBy, Metric, PartitionSet};

#[derive(Parser)]
#[command(name = "usage-report")]
#[command(about = "CPU, GPU and RAM usage reports for Slurm clusters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build usage reports
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },
    /// Inspect the monthly cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print the raw user directory record of a user
    User {
        user_id: String,
        /// Custom path to the .netrc file used for authentication
        #[arg(long = "netrc-file")]
        netrc_file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ReportKind {
    /// Report for a single user
    User {
        user_id: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// One row per active user
    Active {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Usage per accounting group
    Group {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Cluster-wide total
    Total {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// One total per partition set; each --partition value is one set
    Partitions {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Per-user or per-group totals over a span of months
    Range {
        /// First month (YYYY-MM)
        #[arg(long)]
        from: String,
        /// Last month (YYYY-MM)
        #[arg(long)]
        to: String,
        /// Group rows by accounting group instead of by user
        #[arg(long)]
        by_group: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached months
    List {
        /// Cache database (defaults to the configured path)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Month to report (YYYY-MM); defaults to the current month
    #[arg(long, conflicts_with_all = ["start", "end"])]
    month: Option<String>,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,
    /// End date (YYYY-MM-DD); requires --start
    #[arg(long, requires = "start")]
    end: Option<String>,
    /// Partition pattern, may be repeated
    #[arg(long = "partition")]
    partitions: Vec<String>,
    /// Append rows to this CSV file; relative paths go under the output directory
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Output in JSON format
    #[arg(long)]
    json: bool,
    /// Always recompute instead of using the monthly cache
    #[arg(long)]
    no_cache: bool,
    /// Cache database (defaults to the configured path)
    #[arg(long)]
    db: Option<PathBuf>,
    /// Metric used to sort the output
    #[arg(long, value_enum, default_value_t = SortBy::Cpu)]
    sort: SortBy,
}

#[derive(ValueEnum, Clone, Copy)]
enum SortBy {
    Cpu,
    Gpu,
    Ram,
}

impl From<SortBy> for Metric {
    fn from(sort: SortBy) -> Self {
        match sort {
            SortBy::Cpu => Metric::Cpu,
            SortBy::Gpu => Metric::Gpu,
            SortBy::Ram => Metric::Ram,
        }
    }
}

impl CommonArgs {
    fn options(&self) -> ReportOptions {
        let period = match (&self.month, &self.start) {
            (Some(month), _) => PeriodSelection::Month(month.clone()),
            (None, Some(start)) => PeriodSelection::Dates {
                start: start.clone(),
                end: self.end.clone(),
            },
            (None, None) => PeriodSelection::default(),
        };

        ReportOptions {
            period,
            partitions: PartitionSet::new(self.partitions.iter().flat_map(|p| p.split(','))),
            csv: self.csv.clone(),
            json_output: self.json,
            metric: self.sort.into(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _guard = init_logging();

    let json = match &cli.command {
        Commands::Report { kind } => kind.common().json,
        Commands::Cache {
            action: CacheAction::List { json, .. },
        } => *json,
        Commands::User { .. } => false,
    };

    if let Err(e) = run(cli) {
        handle_error(e, json);
    }
}

impl ReportKind {
    fn common(&self) -> &CommonArgs {
        match self {
            ReportKind::User { common, .. }
            | ReportKind::Active { common }
            | ReportKind::Group { common }
            | ReportKind::Total { common }
            | ReportKind::Partitions { common }
            | ReportKind::Range { common, .. } => common,
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = get_config();
    let _span = usage_report::span_with_context!(tracing::Level::INFO, "usage-report").entered();

    match cli.command {
        Commands::Report { kind } => {
            let common = kind.common().clone();
            let command = match kind {
                ReportKind::User { user_id, .. } => ReportCommand::User { user_id },
                ReportKind::Active { .. } => ReportCommand::Active,
                ReportKind::Group { .. } => ReportCommand::Group,
                ReportKind::Total { .. } => ReportCommand::Total,
                ReportKind::Partitions { .. } => {
                    let mut sets = vec![PartitionSet::default()];
                    sets.extend(common.partitions.iter().map(|p| PartitionSet::from_key(p)));
                    ReportCommand::Partitions { sets }
                }
                ReportKind::Range { from, to, by_group, .. } => ReportCommand::Range {
                    from,
                    to,
                    group_by: if by_group { GroupBy::Group } else { GroupBy::User },
                },
            };

            let mut options = common.options();
            if matches!(command, ReportCommand::Partitions { .. }) {
                // the sets carry the patterns
                options.partitions = PartitionSet::default();
            }
            // validate the period before touching the cache
            options.period.period()?;

            let analyzer = UsageAnalyzer::from_config(config, common.db.as_deref(), common.no_cache)?;
            info!(command = ?command, "Running report");
            analyzer.run_command(&command, &options)
        }
        Commands::Cache { action } => match action {
            CacheAction::List { db, json } => {
                let analyzer = UsageAnalyzer::from_config(config, db.as_deref(), false)?;
                let entries = analyzer.list_cache()?;
                analyzer.display().display_cache_entries(&entries, json);
                Ok(())
            }
        },
        Commands::User { user_id, netrc_file } => {
            let api = SimApi::new(
                &config.identity.api_base_url,
                &config.identity.api_host,
                netrc_file.unwrap_or_else(|| config.paths.netrc_file.clone()),
            );
            let value = api
                .fetch_raw(&user_id)
                .with_context(|| format!("Failed to fetch user {user_id}"))?;
            DisplayManager::new(true).display_value(&value);
            Ok(())
        }
    }
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
    } else {
        eprintln!("Error: {e:#}");
    }
    process::exit(1);
}

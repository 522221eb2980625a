//! ksc-metrics CLI - Command-line interface for the KSC metrics engine
//!
//! Every command reads a table in split JSON layout
//! (`{"columns": [...], "data": [[...]]}`) and writes one back.
//!
//! Commands:
//! - stats: accuracy, span, speed and velocity
//! - zscore / rank: per-group z-scores and percentile ranks
//! - difficulty: question difficulty levels per content group
//! - relative: score and rank user or content metrics
//! - categorize: bin score and rank columns into levels
//! - smooth: smooth metric trends over time
//! - fill-gaps: dense daily metrics history per user
//! - config: print the default configuration

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use ksc_metrics::{ComputeError, MetricsConfig, MetricsEngine, MetricsTable, ENGINE_NAME, ENGINE_VERSION};

/// ksc-metrics - statistical metrics engine for exam-question analytics
#[derive(Parser)]
#[command(name = "ksc-metrics")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Score, rank and categorize question and learner metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct IoArgs {
    /// Input table file path (use - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Output table file path (use - for stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Engine configuration JSON; defaults apply to anything it omits
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretty-print the output table
    #[arg(long)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute accuracy, span, speed and velocity
    Stats {
        #[command(flatten)]
        io: IoArgs,
    },

    /// Compute z-scores of a column within groups
    Zscore {
        #[command(flatten)]
        io: IoArgs,

        /// Group columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        group: Vec<String>,

        /// Column to score
        #[arg(long)]
        score: String,

        /// Output column name
        #[arg(long)]
        output_column: Option<String>,
    },

    /// Compute percentile ranks of a column within groups
    Rank {
        #[command(flatten)]
        io: IoArgs,

        /// Group columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        group: Vec<String>,

        /// Column to rank
        #[arg(long)]
        score: String,

        /// Output column name
        #[arg(long)]
        output_column: Option<String>,
    },

    /// Categorize questions on difficulty
    Difficulty {
        #[command(flatten)]
        io: IoArgs,

        /// Compute activity metrics first
        #[arg(long)]
        with_stats: bool,
    },

    /// Score and rank user or content metrics within groups
    Relative {
        #[command(flatten)]
        io: IoArgs,

        /// Whose metrics are being compared
        #[arg(value_enum)]
        kind: RelativeKind,

        /// Group columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        group: Vec<String>,

        /// Metric columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
    },

    /// Bin score and rank columns using the configured metric cuts
    Categorize {
        #[command(flatten)]
        io: IoArgs,
    },

    /// Smooth metric trends over time
    Smooth {
        #[command(flatten)]
        io: IoArgs,

        /// Date column
        #[arg(long)]
        date_column: String,

        /// Metric columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
    },

    /// Fill gaps in a per-user metrics history
    FillGaps {
        #[command(flatten)]
        io: IoArgs,

        /// Category columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,

        /// Metric columns (comma separated); defaults to all non-key columns
        #[arg(long, value_delimiter = ',')]
        metrics: Option<Vec<String>>,
    },

    /// Print the default configuration as JSON
    Config,
}

#[derive(Clone, ValueEnum)]
enum RelativeKind {
    /// Learners compared within their cohort
    User,
    /// Content units compared within their parent (velocity becomes difficulty)
    Content,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), MetricsCliError> {
    match cli.command {
        Commands::Stats { io } => transform(&io, |engine, table| engine.statistical_metrics(table)),

        Commands::Zscore {
            io,
            group,
            score,
            output_column,
        } => transform(&io, |engine, table| {
            engine.z_scores(table, &as_strs(&group), &score, output_column.as_deref())
        }),

        Commands::Rank {
            io,
            group,
            score,
            output_column,
        } => transform(&io, |engine, table| {
            engine.percentiles(table, &as_strs(&group), &score, output_column.as_deref())
        }),

        Commands::Difficulty { io, with_stats } => transform(&io, |engine, table| {
            if with_stats {
                engine.question_metrics(table)
            } else {
                engine.difficulty(table)
            }
        }),

        Commands::Relative {
            io,
            kind,
            group,
            metrics,
        } => transform(&io, |engine, table| match kind {
            RelativeKind::User => {
                engine.relative_user_metrics(table, &as_strs(&group), &as_strs(&metrics))
            }
            RelativeKind::Content => {
                engine.relative_content_metrics(table, &as_strs(&group), &as_strs(&metrics))
            }
        }),

        Commands::Categorize { io } => transform(&io, |engine, table| engine.categorize(table)),

        Commands::Smooth {
            io,
            date_column,
            metrics,
        } => transform(&io, |engine, table| {
            engine.smooth_trend(table, &as_strs(&metrics), &date_column)
        }),

        Commands::FillGaps {
            io,
            categories,
            metrics,
        } => transform(&io, |engine, table| {
            let metrics = metrics.as_deref().map(as_strs);
            engine.fill_history_gaps(table, &as_strs(&categories), metrics.as_deref())
        }),

        Commands::Config => {
            println!("{}", MetricsConfig::default().to_json()?);
            Ok(())
        }
    }
}

/// Read the input table, apply `f` and write the result
fn transform<F>(io_args: &IoArgs, f: F) -> Result<(), MetricsCliError>
where
    F: FnOnce(&MetricsEngine, &MetricsTable) -> Result<MetricsTable, ComputeError>,
{
    let engine = match &io_args.config {
        Some(path) => MetricsEngine::from_json_config(&fs::read_to_string(path)?)?,
        None => MetricsEngine::new(),
    };

    let table = MetricsTable::from_json(&read_input(&io_args.input)?)?;
    let output = f(&engine, &table)?;

    let output_data = if io_args.pretty {
        output.to_json_pretty()?
    } else {
        output.to_json()?
    };
    write_output(&io_args.output, &output_data)
}

fn read_input(input: &Path) -> Result<String, MetricsCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(MetricsCliError::InteractiveStdin);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), MetricsCliError> {
    if output.to_string_lossy() == "-" {
        println!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

// Error types

#[derive(Debug)]
enum MetricsCliError {
    Io(io::Error),
    Compute(ComputeError),
    InteractiveStdin,
}

impl From<io::Error> for MetricsCliError {
    fn from(e: io::Error) -> Self {
        MetricsCliError::Io(e)
    }
}

impl From<ComputeError> for MetricsCliError {
    fn from(e: ComputeError) -> Self {
        MetricsCliError::Compute(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<MetricsCliError> for CliError {
    fn from(e: MetricsCliError) -> Self {
        match e {
            MetricsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            MetricsCliError::Compute(ComputeError::JsonError(e)) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(
                    "Tables use the split layout: {\"columns\": [...], \"data\": [[...]]}".to_string(),
                ),
            },
            MetricsCliError::Compute(e @ ComputeError::ColumnNotFound(_)) => CliError {
                code: "COLUMN_NOT_FOUND".to_string(),
                message: e.to_string(),
                hint: Some("Check column names in the input table and configuration".to_string()),
            },
            MetricsCliError::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            MetricsCliError::InteractiveStdin => CliError {
                code: "NO_INPUT".to_string(),
                message: "stdin is a terminal, expected a piped table".to_string(),
                hint: Some(format!("Pipe a table into {} or pass --input <file>", ENGINE_NAME)),
            },
        }
    }
}

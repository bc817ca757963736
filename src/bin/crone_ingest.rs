use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use crone_ingest::app::{App, ProgressSink};
use crone_ingest::config::ConfigLoader;
use crone_ingest::error::IngestError;
use crone_ingest::output::{
    JsonOutput, OutputMode, StderrProgress, print_info_summary, print_ingest_summary,
    print_list_summary,
};
use crone_ingest::store::FileRepository;

#[derive(Parser)]
#[command(name = "crone-ingest")]
#[command(about = "Parse Crone STP/PEM survey files and reconcile them into a local catalog")]
#[command(version)]
struct Cli {
    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    /// Catalog file (defaults to the per-user data directory)
    #[arg(long, global = true)]
    store: Option<Utf8PathBuf>,

    /// Configuration file (defaults to ./crone-ingest.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Ingest a file, a folder of files, or an archive of survey folders")]
    Ingest(IngestArgs),
    #[command(about = "List stored surveys")]
    List,
    #[command(about = "Show one stored survey")]
    Info(SurveyArgs),
    #[command(about = "Remove a survey and everything recorded for it")]
    Remove(SurveyArgs),
    #[command(about = "Empty the catalog")]
    Reset,
}

#[derive(Args)]
struct IngestArgs {
    path: PathBuf,

    /// Line/profile name for a single file, overriding the file-name pattern
    #[arg(long)]
    line: Option<String>,
}

#[derive(Args)]
struct SurveyArgs {
    survey: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::File { source, .. } => map_exit_code(source),
        IngestError::SurveyNotFound(_)
        | IngestError::NotADirectory(_)
        | IngestError::NoInstrumentFiles(_)
        | IngestError::NoSurveyFolders(_)
        | IngestError::SourceRead { .. } => 2,
        IngestError::StoreRead(_) | IngestError::StoreWrite(_) | IngestError::Constraint(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store_path = match cli.store {
        Some(path) => path,
        None => FileRepository::default_path()?,
    };
    let repo = FileRepository::open(store_path)?;
    let mut app = App::new(repo, config);

    match cli.command {
        Commands::Ingest(args) => {
            let sink: &dyn ProgressSink = match output_mode {
                OutputMode::Json => &JsonOutput,
                OutputMode::Human => &StderrProgress,
            };
            let outcome = app.ingest_path(&args.path, args.line.as_deref(), sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_ingest(&outcome).into_diagnostic()?,
                OutputMode::Human => print_ingest_summary(&outcome),
            }
        }
        Commands::List => {
            let result = app.list();
            match output_mode {
                OutputMode::Json => JsonOutput::print_list(&result).into_diagnostic()?,
                OutputMode::Human => print_list_summary(&result),
            }
        }
        Commands::Info(args) => {
            let result = app.info(&args.survey)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_info(&result).into_diagnostic()?,
                OutputMode::Human => print_info_summary(&result),
            }
        }
        Commands::Remove(args) => {
            let result = app.remove(&args.survey)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_remove(&result).into_diagnostic()?,
                OutputMode::Human => println!(
                    "removed {}: {} stations, {} measurements, {} channels",
                    result.survey_id,
                    result.removed.stations,
                    result.removed.measurements,
                    result.removed.channels
                ),
            }
        }
        Commands::Reset => {
            let result = app.reset()?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_reset(&result).into_diagnostic()?,
                OutputMode::Human => println!("catalog cleared"),
            }
        }
    }
    Ok(())
}

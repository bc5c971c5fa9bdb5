use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sodb_client::app::{Catalog, FetchResult, ProgressSink};
use sodb_client::config::ConfigLoader;
use sodb_client::download::HttpFetcher;
use sodb_client::error::SodbError;
use sodb_client::output::{JsonOutput, NoProgress, OutputMode, TerminalProgress};
use sodb_client::reader::{H5adFile, H5adReader};
use sodb_client::store::CacheAction;

type HttpCatalog = Catalog<HttpFetcher, H5adReader>;

#[derive(Parser)]
#[command(name = "sodb")]
#[command(about = "Browse and download Spatial Omics DataBase (SODB) experiments")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    server: Option<String>,

    #[arg(long, global = true)]
    storage_root: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List datasets, optionally within one biotech category")]
    Datasets(DatasetsArgs),
    #[command(about = "List experiments of a dataset in server order")]
    Experiments(DatasetArgs),
    #[command(about = "Download an experiment, or every experiment of a dataset, into the cache")]
    Fetch(TargetArgs),
    #[command(about = "Download and open experiments, evicting unreadable cache files")]
    Load(TargetArgs),
    #[command(about = "Print the cache path of an experiment")]
    Path(ExperimentArgs),
}

#[derive(Args)]
struct DatasetsArgs {
    #[arg(long)]
    category: Option<String>,
}

#[derive(Args)]
struct DatasetArgs {
    dataset: String,
}

#[derive(Args)]
struct TargetArgs {
    dataset: String,
    experiment: Option<String>,
}

#[derive(Args)]
struct ExperimentArgs {
    dataset: String,
    experiment: String,
}

#[derive(Serialize)]
struct LoadEntry {
    experiment: String,
    loaded: Option<H5adFile>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SodbError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SodbError) -> u8 {
    match error {
        SodbError::UnknownDataset(_)
        | SodbError::UnknownExperiment { .. }
        | SodbError::UnknownCategory(_)
        | SodbError::InvalidName(_) => 2,
        SodbError::ManifestUnavailable(_)
        | SodbError::ManifestStatus { .. }
        | SodbError::ManifestMalformed(_)
        | SodbError::ManifestEmpty
        | SodbError::Download(_)
        | SodbError::DownloadStatus { .. }
        | SodbError::Integrity { .. } => 3,
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

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(server) = &cli.server {
        config.server_address = server.trim_end_matches('/').to_string();
    }
    if let Some(root) = cli.storage_root {
        config.storage_root = Utf8PathBuf::from(root);
    }
    let show_progress = config.progress && matches!(output_mode, OutputMode::Human);

    let catalog = Catalog::connect_http(config)?;
    let terminal = TerminalProgress::new();
    let sink: &dyn ProgressSink = if show_progress { &terminal } else { &NoProgress };

    match cli.command {
        Commands::Datasets(args) => {
            let datasets = match args.category {
                Some(category) => catalog.list_dataset_by_category(&category)?,
                None => catalog.list_dataset(),
            };
            print_lines(datasets, output_mode)
        }
        Commands::Experiments(args) => {
            let experiments = catalog.list_experiment_by_dataset(&args.dataset)?;
            print_lines(experiments, output_mode)
        }
        Commands::Fetch(args) => {
            let result = catalog.fetch(&args.dataset, args.experiment.as_deref(), sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_fetch(&result).into_diagnostic(),
                OutputMode::Human => {
                    print_fetch_summary(&result);
                    Ok(())
                }
            }
        }
        Commands::Load(args) => run_load(&catalog, args, sink, output_mode),
        Commands::Path(args) => {
            let path = catalog.experiment_path(&args.dataset, &args.experiment)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&path).into_diagnostic(),
                OutputMode::Human => {
                    println!("{path}");
                    Ok(())
                }
            }
        }
    }
}

fn run_load(
    catalog: &HttpCatalog,
    args: TargetArgs,
    sink: &dyn ProgressSink,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let entries = match args.experiment {
        Some(experiment) => {
            let loaded = catalog.load_experiment(&args.dataset, &experiment, sink)?;
            vec![LoadEntry { experiment, loaded }]
        }
        None => catalog
            .load_dataset(&args.dataset, sink)?
            .into_iter()
            .map(|(experiment, loaded)| LoadEntry { experiment, loaded })
            .collect(),
    };

    if matches!(output_mode, OutputMode::Json) {
        return JsonOutput::print(&entries).into_diagnostic();
    }
    for entry in &entries {
        match &entry.loaded {
            Some(file) => println!(
                "{}: {} ({} bytes, superblock v{})",
                entry.experiment, file.path, file.len, file.superblock_version
            ),
            None => println!(
                "{}: failed to load, please try again later",
                entry.experiment
            ),
        }
    }
    Ok(())
}

fn print_lines<I>(values: I, output_mode: OutputMode) -> miette::Result<()>
where
    I: IntoIterator<Item = String>,
{
    let values = values.into_iter().collect::<Vec<_>>();
    match output_mode {
        OutputMode::Json => JsonOutput::print(&values).into_diagnostic(),
        OutputMode::Human => {
            for value in values {
                println!("{value}");
            }
            Ok(())
        }
    }
}

fn print_fetch_summary(result: &FetchResult) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    let downloaded = result
        .items
        .iter()
        .filter(|item| item.action == CacheAction::Download)
        .count();
    println!(
        "{cyan}SODB summary: {} experiments, {downloaded} downloaded{reset}",
        result.items.len()
    );
    for item in &result.items {
        let (label, color) = match item.action {
            CacheAction::Cache => ("cache", green),
            CacheAction::Download => ("download", cyan),
        };
        println!(
            "{color}{} / {} ({label}){reset}",
            item.dataset, item.experiment
        );
        println!("{color}   {}{reset}", item.path);
    }
}

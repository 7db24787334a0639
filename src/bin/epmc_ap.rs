use std::fs::File;
use std::io::{BufWriter, Write};
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use epmc_accession_pipeline::batcher::Batcher;
use epmc_accession_pipeline::config::{DbCredentials, DbTarget};
use epmc_accession_pipeline::epmc::EpmcClient;
use epmc_accession_pipeline::error::PipelineError;
use epmc_accession_pipeline::fs_util;
use epmc_accession_pipeline::harvest::{self, CursorFetcher, DEFAULT_PAGE_SIZE};
use epmc_accession_pipeline::input;
use epmc_accession_pipeline::loader::{Loader, PREDICTION_NAME, ResourceCatalog};
use epmc_accession_pipeline::output::JsonOutput;
use epmc_accession_pipeline::reconcile::{DEFAULT_QUERY_BATCH_SIZE, MetadataRecords, Reconciler};
use epmc_accession_pipeline::store::{PgStore, Prediction};

#[derive(Parser)]
#[command(name = "epmc-ap")]
#[command(about = "EuropePMC text-mined accession pipeline (group, query, harvest, load)")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Group accession links into bounded batch files")]
    Group(GroupArgs),
    #[command(about = "Query EuropePMC metadata for a batch of identifiers")]
    Query(QueryArgs),
    #[command(about = "Harvest the text-mined corpus page by page")]
    Harvest(HarvestArgs),
    #[command(about = "Load reconciled metadata into the publication database")]
    Load(LoadArgs),
}

#[derive(Args)]
struct GroupArgs {
    #[arg(long, conflicts_with = "json_file")]
    csv_file: Option<String>,

    #[arg(long)]
    json_file: Option<String>,

    #[arg(long)]
    outdir: String,

    #[arg(long, default_value = "split")]
    prefix: String,

    #[arg(long, default_value_t = 250)]
    batch_size: usize,
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long)]
    infile: String,

    #[arg(long)]
    outfile: String,

    #[arg(long, default_value_t = DEFAULT_QUERY_BATCH_SIZE)]
    query_batch_size: usize,

    #[arg(long)]
    sources: Option<String>,
}

#[derive(Args)]
struct HarvestArgs {
    #[arg(long)]
    accession_types: String,

    #[arg(long)]
    outdir: String,

    #[arg(long, default_value = "epmc")]
    prefix: String,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    #[arg(long)]
    limit: Option<u64>,

    #[arg(long)]
    cursor: Option<String>,

    #[arg(long, default_value_t = 1)]
    start_index: usize,
}

#[derive(Args)]
struct LoadArgs {
    #[arg(long)]
    json: String,

    #[arg(long)]
    accession_types: String,

    #[arg(long)]
    resource: String,

    #[arg(long)]
    summary: String,

    #[arg(long)]
    db: String,

    #[arg(long)]
    dbcreds: Option<String>,

    #[arg(long)]
    dbuser: Option<String>,

    #[arg(long)]
    dbpass: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::RetriesExhausted { graceful: true, .. } => 0,
        PipelineError::MissingCredentials
        | PipelineError::CredentialsRead(_)
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_)
        | PipelineError::InvalidDbTarget(_)
        | PipelineError::UnknownResource(_) => 2,
        PipelineError::EpmcRequest(_)
        | PipelineError::EpmcStatus { .. }
        | PipelineError::Database(_) => 3,
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
    match cli.command {
        Commands::Group(args) => run_group(args),
        Commands::Query(args) => run_query(args),
        Commands::Harvest(args) => run_harvest(args),
        Commands::Load(args) => run_load(args),
    }
}

fn run_group(args: GroupArgs) -> miette::Result<()> {
    let groups = match (&args.csv_file, &args.json_file) {
        (Some(path), None) => input::read_links_csv(Utf8Path::new(path))?,
        (None, Some(path)) => input::read_grouped_json(Utf8Path::new(path))?,
        _ => {
            return Err(miette::Report::msg(
                "exactly one of --csv-file or --json-file is required",
            ));
        }
    };

    let batcher = Batcher::new(Utf8PathBuf::from(args.outdir), args.prefix, args.batch_size);
    let report = batcher.write_batches(&groups)?;
    JsonOutput::print_group(&report).into_diagnostic()?;
    Ok(())
}

fn run_query(args: QueryArgs) -> miette::Result<()> {
    let groups = input::read_grouped_json(Utf8Path::new(&args.infile))?;
    let client = EpmcClient::new()?;
    let mut reconciler = Reconciler::new(&client, args.query_batch_size);
    if let Some(sources) = &args.sources {
        reconciler = reconciler.with_sources(parse_sources(sources));
    }

    let (records, report) = reconciler.reconcile(&groups)?;
    fs_util::write_json_atomic(Utf8Path::new(&args.outfile), &records)?;
    JsonOutput::print_query(&report).into_diagnostic()?;
    Ok(())
}

fn parse_sources(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn run_harvest(args: HarvestArgs) -> miette::Result<()> {
    let catalog = ResourceCatalog::load(Utf8Path::new(&args.accession_types))?;
    let keys = catalog.type_keys();
    if keys.is_empty() {
        return Err(miette::Report::msg("accession types file has no entries"));
    }

    let client = EpmcClient::new()?;
    let fetcher = CursorFetcher::new(
        &client,
        Utf8PathBuf::from(args.outdir),
        args.prefix,
        args.page_size,
    )
    .with_limit(args.limit);
    let report = fetcher.run(&harvest::type_query(&keys), args.cursor, args.start_index)?;
    JsonOutput::print_harvest(&report).into_diagnostic()?;
    Ok(())
}

fn run_load(args: LoadArgs) -> miette::Result<()> {
    let credentials = DbCredentials::resolve(
        args.dbcreds.as_deref().map(Utf8Path::new),
        args.dbuser.clone(),
        args.dbpass.clone(),
    )?;
    let target: DbTarget = args.db.parse()?;
    let catalog = ResourceCatalog::load(Utf8Path::new(&args.accession_types))?;
    catalog.key_for(&args.resource)?;

    let records: MetadataRecords = fs_util::read_json(Utf8Path::new(&args.json))?;

    let store = PgStore::connect(&target, &credentials)?;
    let prediction = Prediction {
        name: PREDICTION_NAME.to_string(),
        date: chrono::Utc::now().date_naive(),
        user: credentials.user.clone(),
    };

    let summary_file =
        File::create(&args.summary).map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    let mut summary = BufWriter::new(summary_file);

    let mut loader = Loader::new(store, catalog);
    let report = loader.run(&records, &args.resource, &prediction, &mut summary)?;
    summary
        .flush()
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    JsonOutput::print_load(&report).into_diagnostic()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exhausted(graceful: bool) -> PipelineError {
        PipelineError::RetriesExhausted {
            url: "https://www.ebi.ac.uk/europepmc/webservices/rest/search?query=x".to_string(),
            retries: 5,
            graceful,
        }
    }

    #[test]
    fn graceful_retry_exhaustion_exits_zero() {
        assert_eq!(map_exit_code(&exhausted(true)), 0);
    }

    #[test]
    fn nongraceful_retry_exhaustion_exits_one() {
        assert_eq!(map_exit_code(&exhausted(false)), 1);
    }

    #[test]
    fn configuration_errors_exit_two() {
        assert_eq!(map_exit_code(&PipelineError::MissingCredentials), 2);
        assert_eq!(
            map_exit_code(&PipelineError::InvalidDbTarget("localhost".to_string())),
            2
        );
        assert_eq!(
            map_exit_code(&PipelineError::UnknownResource("BioModels".to_string())),
            2
        );
    }

    #[test]
    fn transport_and_database_errors_exit_three() {
        assert_eq!(
            map_exit_code(&PipelineError::EpmcStatus {
                status: 502,
                message: "bad gateway".to_string(),
            }),
            3
        );
        assert_eq!(
            map_exit_code(&PipelineError::Database("connection refused".to_string())),
            3
        );
    }

    #[test]
    fn query_accepts_query_batch_size_flag() {
        let cli = Cli::try_parse_from([
            "epmc-ap",
            "query",
            "--infile",
            "groups.json",
            "--outfile",
            "records.json",
            "--query-batch-size",
            "40",
        ])
        .unwrap();
        match cli.command {
            Commands::Query(args) => assert_eq!(args.query_batch_size, 40),
            _ => panic!("expected the query subcommand"),
        }
    }

    #[test]
    fn query_batch_size_defaults_when_omitted() {
        let cli = Cli::try_parse_from([
            "epmc-ap",
            "query",
            "--infile",
            "groups.json",
            "--outfile",
            "records.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Query(args) => assert_eq!(args.query_batch_size, DEFAULT_QUERY_BATCH_SIZE),
            _ => panic!("expected the query subcommand"),
        }
    }
}

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, error::ErrorKind};
use tracing_subscriber::EnvFilter;

use crate::config::ScoringConfig;
use crate::constants::logging::DEFAULT_LOG_FILTER;
use crate::methods::ScoringMethod;
use crate::pipeline::{MethodSummary, ScoringPipeline};
use crate::source::{
    DocumentSource, JsonlDocumentSource, JsonlSourceConfig, directory_sources,
};
use crate::store::GroupedStore;

type DynSource = Box<dyn DocumentSource + 'static>;

#[derive(Debug, Parser)]
#[command(
    name = "score_documents",
    disable_help_subcommand = true,
    about = "Score documents against a word embedding",
    long_about = "Turn every document into a fixed-length vector with each configured method and write the results to the grouped score store.",
    after_help = "Methods given on the command line replace the methods listed in the config file. Inputs are read in the order given, explicit files first."
)]
struct ScoreDocumentsCli {
    #[arg(long, value_name = "PATH", help = "JSON scoring config")]
    config: Option<PathBuf>,
    #[arg(
        long = "method",
        value_name = "METHOD",
        value_parser = parse_method_arg,
        help = "Scoring method to run, repeat as needed in run order"
    )]
    methods: Vec<ScoringMethod>,
    #[arg(
        long = "input",
        value_name = "PATH",
        help = "JSON-lines document file, repeat as needed in source order"
    )]
    inputs: Vec<PathBuf>,
    #[arg(
        long = "input-dir",
        value_name = "DIR",
        help = "Directory scanned recursively for *.jsonl document files"
    )]
    input_dir: Option<PathBuf>,
    #[arg(
        long = "text-field",
        value_name = "FIELD",
        help = "Row field holding document text, repeat for several fields per row"
    )]
    text_fields: Vec<String>,
    #[arg(
        long = "meta-field",
        value_name = "FIELD",
        help = "Row field holding POS metadata, once shared or once per --text-field"
    )]
    meta_fields: Vec<String>,
    #[arg(long, value_name = "PATH", help = "Output store path override")]
    store: Option<PathBuf>,
    #[arg(long, help = "Score documents on the rayon thread pool")]
    parallel: bool,
}

/// Run the `score_documents` command line over `args_iter` (program name excluded).
pub fn run_score_documents<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .try_init();

    let Some(cli) = parse_cli::<ScoreDocumentsCli, _>(
        std::iter::once("score_documents".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let mut config = match &cli.config {
        Some(path) => ScoringConfig::from_json_file(path)?,
        None => ScoringConfig::default(),
    };
    if !cli.methods.is_empty() {
        config = config.with_methods(cli.methods.clone()).validated()?;
    }
    if cli.parallel {
        config = config.with_parallel(true);
    }

    let sources = build_sources(&cli)?;
    if sources.is_empty() {
        return Err("no input documents: pass --input or --input-dir".into());
    }

    let store_path = cli
        .store
        .clone()
        .unwrap_or_else(|| config.document_scores.path());
    println!("Writing document scores to {}", store_path.display());
    let store = GroupedStore::open(&store_path)?;
    let pipeline = ScoringPipeline::from_config(&config)?;
    let summaries = pipeline.run(&sources, &store)?;
    print_summaries(&summaries);
    Ok(())
}

fn build_sources(cli: &ScoreDocumentsCli) -> Result<Vec<DynSource>, Box<dyn Error>> {
    let mut template = JsonlSourceConfig::new("");
    if !cli.text_fields.is_empty() {
        template = template.with_text_fields(cli.text_fields.iter().cloned());
    }
    if !cli.meta_fields.is_empty() {
        template = template.with_meta_fields(cli.meta_fields.iter().cloned());
    }
    let mut sources: Vec<DynSource> = Vec::new();
    for path in &cli.inputs {
        let mut config = template.clone();
        config.path = path.clone();
        sources.push(Box::new(JsonlDocumentSource::new(config)));
    }
    if let Some(dir) = &cli.input_dir {
        for source in directory_sources(dir, &template)? {
            sources.push(Box::new(source));
        }
    }
    Ok(sources)
}

/// Filter from `RUST_LOG` directives, falling back to `info` when unset or invalid.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn parse_method_arg(raw: &str) -> Result<ScoringMethod, String> {
    raw.parse::<ScoringMethod>().map_err(|err| err.to_string())
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

fn print_summaries(summaries: &[MethodSummary]) {
    for summary in summaries {
        println!(
            "=== {} === documents: {} | merged rows: {}",
            summary.method, summary.documents, summary.merged
        );
        if summary.datasets.is_empty() {
            println!("  (no datasets written)");
        }
        for dataset in &summary.datasets {
            println!(
                "  /{}/{}  {} x {}",
                dataset.method, dataset.name, dataset.rows, dataset.cols
            );
        }
    }
}

//! CLI entry point for region-annotator.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use region_annotator::config::{reference_dataset_name, IngestKind, RunConfig};
use region_annotator::format::{self, Format, DIRECTORY_INGEST_ORDER};
use region_annotator::output;
use region_annotator::pipeline;
use region_annotator::schema::{Catalog, Schema, GENE_MASTER, USER_INPUT_RAW};
use region_annotator::store::{DataStore, TableSource};

/// Genomic region annotation tool.
///
/// Annotates user regions against fixed reference datasets and exports the
/// results, by default as one composite workbook.
#[derive(Parser, Debug)]
#[command(name = "region-annotator")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input from the specified file or folder
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Output to the specified file or folder
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Documentation template for spreadsheet output
    #[arg(long = "template", default_value = "documentation.xlsx")]
    template: PathBuf,

    /// Enter reference data
    #[arg(long = "reference")]
    reference: bool,

    /// Enter gene (reference) data
    #[arg(long = "gene")]
    gene: bool,

    /// The first row of data in the input files contains NO column names
    #[arg(long = "nonames")]
    nonames: bool,

    /// Get specific database content (table/view) as exported output
    #[arg(long = "get", value_name = "dataset name")]
    get: Option<String>,

    /// Output all database content
    #[arg(long = "getall")]
    getall: bool,

    /// Force input format: excel, csv, tsv or native
    #[arg(long = "iformat", value_name = "format")]
    iformat: Option<String>,

    /// Force output format: excel, csv, tsv or native
    #[arg(long = "oformat", value_name = "format")]
    oformat: Option<String>,

    /// Overwrite existing tables with the same names
    #[arg(
        long = "overwrite",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_name = "true/false"
    )]
    overwrite: bool,

    /// Perform operation specifics or not
    #[arg(
        long = "operate",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_name = "true/false"
    )]
    operate: bool,

    /// Database connection timeout in milliseconds
    #[arg(long = "timeout", default_value_t = 30_000)]
    timeout: u64,

    /// Database location
    #[arg(long = "db", default_value = ".", value_name = "folder path")]
    db: PathBuf,

    /// Database cache size in KB
    #[arg(long = "cache-size-kb", default_value_t = 2_000_000)]
    cache_size_kb: i64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();

    let config = build_config(&args)?;
    run(&config)
}

/// Resolve command-line options into the immutable run configuration.
fn build_config(args: &Args) -> Result<RunConfig> {
    if args.gene && args.reference {
        bail!("--gene and --reference are mutually exclusive");
    }

    let mut config = RunConfig {
        template: args.template.clone(),
        db_location: args.db.clone(),
        timeout_ms: args.timeout,
        cache_size_kb: args.cache_size_kb,
        overwrite: args.overwrite,
        operate: args.operate,
        first_row_names: !args.nonames,
        get: args.get.clone(),
        get_all: args.getall,
        ingest: if args.gene {
            IngestKind::Gene
        } else if args.reference {
            IngestKind::Reference
        } else {
            IngestKind::UserInput
        },
        ..RunConfig::default()
    };

    if let Some(value) = &args.iformat {
        config.input_format = Some(
            value
                .parse()
                .with_context(|| format!("input format error, provided [{}]", value))?,
        );
    }
    if let Some(value) = &args.oformat {
        config.output_format = value
            .parse()
            .with_context(|| format!("output format error, provided [{}]", value))?;
    }

    if let Some(input) = &args.input {
        if !input.exists() {
            bail!("input not found: {}", input.display());
        }
        config.input = Some(input.clone());
        // Output lands next to the input unless set explicitly.
        config.output = if input.is_dir() {
            input.clone()
        } else {
            input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        };
    }
    if let Some(output) = &args.output {
        config.output = output.clone();
    }

    Ok(config)
}

fn run(config: &RunConfig) -> Result<()> {
    let catalog = Catalog::builtin()?;
    let mut store = DataStore::new(&config.db_location, config.cache_size_kb, config.timeout_ms);
    info!("waiting for database connection");
    store.connect()?;
    info!("database connected");
    store.commit()?;

    if config.input.is_some() {
        ingest(config, &catalog, &store)?;
    }

    if config.is_annotation_run() && config.operate && config.input.is_some() {
        pipeline::run(&store, config.overwrite)?;
    }

    if config.get_all {
        output::export_all(&store, &catalog, config)?;
    } else if let Some(name) = &config.get {
        output::export_one(&store, &catalog, config, name)?;
    } else if config.is_annotation_run() && config.input.is_some() {
        output::export_bundle(&store, &catalog, config)?;
    }

    store.shutdown()?;
    info!("done");
    Ok(())
}

/// Ingest the configured input: a single file fail-fast, a folder
/// best-effort per file.
fn ingest(config: &RunConfig, catalog: &Catalog, store: &DataStore) -> Result<()> {
    let Some(input) = &config.input else {
        return Ok(());
    };
    // Datasets created in this run: later files with the same target append
    // instead of replacing, so multi-file inputs merge deterministically.
    let mut seeded: HashSet<String> = HashSet::new();

    if input.is_file() {
        let format = resolve_format(config, input)?;
        ingest_file(input, format, config, catalog, store, &mut seeded)?;
    } else if input.is_dir() {
        if let Some(format) = config.input_format {
            for path in files_in(input)? {
                if let Err(e) = ingest_file(&path, format, config, catalog, store, &mut seeded) {
                    warn!(file = %path.display(), error = %e, "skipping input file");
                }
            }
        } else {
            // Fixed extension-group order keeps multi-format folders
            // deterministic.
            for format in DIRECTORY_INGEST_ORDER {
                for path in files_in(input)? {
                    if Format::from_extension(&path) != Some(format) {
                        continue;
                    }
                    if let Err(e) = ingest_file(&path, format, config, catalog, store, &mut seeded)
                    {
                        warn!(file = %path.display(), error = %e, "skipping input file");
                    }
                }
            }
        }
    } else {
        bail!(
            "wrong type of input; it is not a file nor a directory: {}",
            input.display()
        );
    }

    store.commit()?;
    Ok(())
}

/// Folder entries that are files, name-sorted for reproducible order.
fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

fn resolve_format(config: &RunConfig, path: &Path) -> Result<Format> {
    if let Some(format) = config.input_format {
        return Ok(format);
    }
    Format::from_extension(path)
        .with_context(|| format!("cannot infer input format for {}", path.display()))
}

/// Read one file into the dataset its ingestion mode targets.
fn ingest_file(
    path: &Path,
    format: Format,
    config: &RunConfig,
    catalog: &Catalog,
    store: &DataStore,
    seeded: &mut HashSet<String>,
) -> Result<()> {
    let (dataset, schema): (String, Schema) = match config.ingest {
        IngestKind::Gene => (GENE_MASTER.to_string(), catalog.lookup(GENE_MASTER)?.clone()),
        IngestKind::UserInput => (
            USER_INPUT_RAW.to_string(),
            catalog.lookup(USER_INPUT_RAW)?.clone(),
        ),
        IngestKind::Reference => {
            let dataset = reference_dataset_name(path);
            let schema = catalog
                .lookup(&dataset)
                .map(|s| s.clone())
                .unwrap_or_else(|_| catalog.reference_template().renamed(&dataset));
            (dataset, schema)
        }
    };

    let record = format::read_file(path, format, &schema, config.first_row_names)?;
    if seeded.contains(&dataset) {
        store.insert_rows(&dataset, &record)?;
    } else {
        store.create_table(&dataset, TableSource::Rows(&record), config.overwrite)?;
        seeded.insert(dataset.clone());
    }
    for column in schema.column_order() {
        if let Err(e) = store.create_index(&dataset, column) {
            warn!(dataset = %dataset, column, error = %e, "index creation failed");
        }
    }
    info!(file = %path.display(), dataset = %dataset, rows = record.len(), "ingested");
    Ok(())
}

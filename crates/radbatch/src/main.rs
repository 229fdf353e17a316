use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use radbatch::{
    ArrayPolicy, BatchConfig, BatchExecutor, DocumentStore, ItemOutcome, ParameterSet,
    ProgressEvent, PyradiomicsEngine, StoreOutcome, Worklist,
};

#[derive(Parser)]
#[command(name = "radbatch", about = "Batch radiomics feature extraction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch over a worklist CSV (id,volume,mask per line, no header)
    Run {
        /// Worklist CSV file
        #[arg(short, long)]
        worklist: PathBuf,
        /// Output directory for per-item JSON documents (must exist)
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Engine parameter JSON file (built-in defaults when omitted)
        #[arg(short, long)]
        params: Option<PathBuf>,
        /// MongoDB connection string; enables the database sink
        #[arg(long)]
        db_uri: Option<String>,
        /// Database name (required with --db-uri)
        #[arg(long, default_value = "")]
        db_name: String,
        /// Collection name (required with --db-uri)
        #[arg(long, default_value = "")]
        collection: String,
        /// Reduction applied when an engine value is a numeric array
        #[arg(long, value_enum, default_value = "singleton")]
        array_policy: ArrayPolicyArg,
        /// Path to the pyradiomics executable
        #[arg(long, default_value = "pyradiomics")]
        engine: String,
    },
    /// Test the document store connection and existence pre-flight
    CheckDb {
        #[arg(long)]
        db_uri: String,
        #[arg(long)]
        db_name: String,
        #[arg(long)]
        collection: String,
    },
    /// Print the effective parameter set as JSON
    ShowParams {
        /// Parameter JSON file (built-in defaults when omitted)
        #[arg(short, long)]
        params: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ArrayPolicyArg {
    /// Fail the item unless the array has exactly one element
    Singleton,
    /// Take the first element
    First,
}

impl From<ArrayPolicyArg> for ArrayPolicy {
    fn from(arg: ArrayPolicyArg) -> Self {
        match arg {
            ArrayPolicyArg::Singleton => ArrayPolicy::Singleton,
            ArrayPolicyArg::First => ArrayPolicy::First,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_log::LogTracer::init().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            worklist,
            output_dir,
            params,
            db_uri,
            db_name,
            collection,
            array_policy,
            engine,
        } => {
            let list = Worklist::import_csv(&worklist)?;
            let params = load_params(params.as_deref())?;

            let mut config = match db_uri {
                Some(uri) => BatchConfig::with_database(&output_dir, uri, db_name, collection),
                None => BatchConfig::file_only(&output_dir),
            };
            config.array_policy = array_policy.into();

            run_batch(list, params, config, engine)
        }
        Commands::CheckDb {
            db_uri,
            db_name,
            collection,
        } => {
            DocumentStore::verify(&db_uri, &db_name, &collection)?;
            println!("Database connection test successful: {db_name}/{collection}");
            Ok(())
        }
        Commands::ShowParams { params } => {
            let params = load_params(params.as_deref())?;
            println!("{}", serde_json::to_string_pretty(params.as_value())?);
            Ok(())
        }
    }
}

fn load_params(path: Option<&std::path::Path>) -> anyhow::Result<ParameterSet> {
    Ok(match path {
        Some(path) => ParameterSet::from_file(path)?,
        None => ParameterSet::default(),
    })
}

fn run_batch(
    list: Worklist,
    params: ParameterSet,
    config: BatchConfig,
    engine_binary: String,
) -> anyhow::Result<()> {
    let engine = PyradiomicsEngine::with_binary(engine_binary);
    if !engine.is_available() {
        // Advisory only; the run proceeds and each item reports its own failure.
        eprintln!("warning: extraction engine probe failed; items may all skip");
    }

    let total = list.len() as u64;
    println!("Processing {} items...", total);

    let executor = BatchExecutor::new();
    let handle = executor.submit(list.into_items(), params, &config, Box::new(engine))?;

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    while let Some(event) = handle.recv() {
        match event {
            ProgressEvent::Item(report) => {
                match &report.outcome {
                    ItemOutcome::Completed {
                        file_error, stored, ..
                    } => {
                        pb.set_message(report.id.clone());
                        if let Some(error) = file_error {
                            pb.println(format!("{}: file write failed: {error}", report.id));
                        }
                        if let StoreOutcome::Failed(error) = stored {
                            pb.println(format!("{}: database insert failed: {error}", report.id));
                        }
                    }
                    ItemOutcome::Skipped { reason } => {
                        pb.println(format!("{}: skipped ({reason})", report.id));
                    }
                }
                pb.inc(1);
            }
            ProgressEvent::BatchCompleted => break,
        }
    }

    let summary = handle.wait();
    pb.finish_and_clear();

    println!("Completed: {}", summary.completed);
    println!("Skipped:   {}", summary.skipped);
    if summary.file_failures > 0 {
        println!("File write failures:      {}", summary.file_failures);
    }
    if summary.store_failures > 0 {
        println!("Database insert failures: {}", summary.store_failures);
    }

    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use house_price_pipeline::etl::fetch::download_csv_file;
use house_price_pipeline::logging::init_tracing;
use house_price_pipeline::pipeline::{training_pipeline, Pipeline, ProcessExecutor};
use house_price_pipeline::registry::mlflow::MlflowClient;
use house_price_pipeline::registry::{ModelUri, Registry};
use house_price_pipeline::serve::{http, PredictionAdapter};
use house_price_pipeline::{run_etl, run_training, ModelArtifact, Settings};

#[derive(Parser, Debug)]
#[command(name = "house-price", version, about = "House-price model: ETL, training, serving, orchestration")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Registry base address (overrides MLFLOW_TRACKING_URI)
    #[arg(long, global = true)]
    tracking_uri: Option<String>,

    /// Data root holding raw/ and processed/ (overrides HOUSE_PRICE_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a raw CSV to disk
    Fetch {
        /// Location of the raw house-sales extract
        #[arg(long)]
        url: String,
        /// Destination, defaults to <data-dir>/raw/train.csv
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Clean, engineer features, split and record metadata
    Etl,
    /// Train the baseline and boosted models and log them to the registry
    Train,
    /// Serve predictions over HTTP
    Serve {
        #[arg(long)]
        bind: Option<String>,
        /// Registry model alias, e.g. "models:/housing model@production"
        #[arg(long, conflicts_with = "model_path")]
        model_uri: Option<String>,
        /// Load a local artifact instead of resolving an alias
        #[arg(long)]
        model_path: Option<PathBuf>,
    },
    /// Run or inspect the training pipeline
    Pipeline {
        #[command(subcommand)]
        action: PipelineCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PipelineCommand {
    /// Run every task once, now
    Run,
    /// Wait for each weekly slot and run the pipeline, forever
    Schedule,
    /// Print the tasks, edges and next scheduled run
    Show,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = Settings::from_env();
    if let Some(uri) = cli.tracking_uri {
        settings.tracking_uri = uri;
    }
    if let Some(dir) = cli.data_dir {
        settings = settings.with_data_dir(dir);
    }
    info!(?settings, "settings resolved");

    match cli.command {
        Command::Fetch { url, output } => {
            let dest = output.unwrap_or_else(|| settings.raw_csv());
            let bytes = download_csv_file(&url, &dest)?;
            println!("Downloaded {bytes} bytes to {}", dest.display());
        }
        Command::Etl => {
            run_etl(&settings)?;
        }
        Command::Train => {
            let client = MlflowClient::new(&settings.tracking_uri)?;
            run_training(&settings, &client)?;
        }
        Command::Serve {
            bind,
            model_uri,
            model_path,
        } => {
            // resolve the artifact before the runtime exists; the registry client blocks
            let artifact = match model_path {
                Some(path) => ModelArtifact::load(&path)
                    .with_context(|| format!("failed to load model from {}", path.display()))?,
                None => {
                    let uri = ModelUri::parse(model_uri.as_deref().unwrap_or(&settings.model_uri))?;
                    let client = MlflowClient::new(&settings.tracking_uri)?;
                    let bytes = client
                        .download_model(&uri)
                        .with_context(|| format!("failed to load model {uri}"))?;
                    ModelArtifact::from_json_slice(&bytes).with_context(|| format!("invalid model artifact for {uri}"))?
                }
            };
            println!("✓ Model loaded: {} ({} features)", artifact.model_type, artifact.feature_names.len());

            let adapter = Arc::new(PredictionAdapter::new(artifact));
            let addr = bind.unwrap_or_else(|| settings.bind_addr.clone());
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            runtime.block_on(http::serve(adapter, &addr))?;
        }
        Command::Pipeline { action } => {
            let exe = std::env::current_exe().context("cannot locate the house-price binary")?;
            let workdir = std::env::current_dir()?;
            let pipeline = training_pipeline(&settings, &exe, &workdir)?;
            match action {
                PipelineCommand::Run => run_pipeline(&pipeline)?,
                PipelineCommand::Schedule => loop {
                    let next = pipeline.schedule.next_run(Utc::now());
                    println!("Next run of {} at {next}", pipeline.name);
                    let wait = (next - Utc::now()).to_std().unwrap_or_default();
                    std::thread::sleep(wait);
                    // a failed run waits for the next slot
                    if let Err(err) = run_pipeline(&pipeline) {
                        tracing::error!(error = %err, "scheduled pipeline run failed");
                    }
                },
                PipelineCommand::Show => show_pipeline(&pipeline),
            }
        }
    }

    Ok(())
}

fn run_pipeline(pipeline: &Pipeline) -> anyhow::Result<()> {
    let records = pipeline.run(&ProcessExecutor)?;
    for record in records {
        println!("✓ {} ({} attempt(s))", record.task, record.attempts);
    }
    Ok(())
}

fn show_pipeline(pipeline: &Pipeline) {
    println!("Pipeline: {}", pipeline.name);
    println!("Schedule: {}", pipeline.schedule);
    println!("Retries:  {} (delay {:?})", pipeline.retry.retries, pipeline.retry.delay);
    println!("\nTasks:");
    for task in pipeline.tasks() {
        println!("  {:<18} {}", task.id, task.action);
    }
    println!("\nEdges:");
    for (from, to) in pipeline.edges() {
        println!("  {from} >> {to}");
    }
    println!("\nNext run: {}", pipeline.schedule.next_run(Utc::now()));
}

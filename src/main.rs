use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use lpr_pipeline::recognizer::{Detector, Recognizer};
use lpr_pipeline::{server, LprResult, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "LPR pipeline", version, author = "kingrong")]
#[command(about = "Crop, rectify and read license plates from a directory of frames")]
struct Cli {
    /// TOML config, built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect plates in every frame and write one file per crop
    Crop {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Recognize a directory of crops and write the report
    Recognize {
        #[arg(long)]
        crops: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Crop and recognize in one pass
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Expose both stages over HTTP
    Serve {
        #[arg(long)]
        listen: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let (detector, recognizer) = load_models(&config).context("loading models")?;
    let pipeline = Pipeline::new(detector, recognizer, config);

    match cli.command {
        Command::Crop { input, output } => print_summary(&pipeline.crop_frames(&input, &output)?),
        Command::Recognize { crops, output } => print_summary(&pipeline.recognize_crops(&crops, &output)?),
        Command::Run { input, output } => print_summary(&pipeline.process_frames(&input, &output)?),
        Command::Serve { listen } => {
            let listen = listen.unwrap_or_else(|| pipeline.config().server.listen.clone());
            let addr: SocketAddr = listen.parse().with_context(|| format!("invalid listen address {}", listen))?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(Arc::new(pipeline), addr))?;
            Ok(())
        }
    }
}

fn print_summary(summary: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

#[cfg(feature = "tensorflow")]
fn load_models(config: &PipelineConfig) -> LprResult<(Arc<dyn Detector>, Arc<dyn Recognizer>)> {
    use lpr_pipeline::tf::{TfDetector, TfLogitModel};
    use lpr_pipeline::{CharDictionary, CtcRecognizer};

    let dict = match &config.models.dictionary {
        Some(path) => CharDictionary::from_file(path)?,
        None => CharDictionary::chinese_plates(),
    };
    let detector = TfDetector::new(&config.models, &config.detector)?;
    let model = TfLogitModel::new(&config.models)?;
    let recognizer = CtcRecognizer::new(model, Arc::new(dict), &config.recognition);
    Ok((Arc::new(detector), Arc::new(recognizer)))
}

#[cfg(not(feature = "tensorflow"))]
fn load_models(_config: &PipelineConfig) -> LprResult<(Arc<dyn Detector>, Arc<dyn Recognizer>)> {
    Err(lpr_pipeline::LprError::BackendUnavailable("tensorflow"))
}

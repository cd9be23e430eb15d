use crate::config::{PipelineConfig, RecordFormat};
use crate::pipeline::input::motion_sequence;
use crate::pipeline::processing::StaticClassifier;
use crate::pipeline::recorder::{JsonLinesRecorder, LogRecorder, Recorder};
use crate::pipeline::{PipelineCoordinator, PipelineError};
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::process::{self, ExitCode};

pub mod cli;
pub mod config;
pub mod pipeline;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so JSON records on stdout stay machine-readable
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let matches = cli::command().get_matches();
    let config = match cli::config_from(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid arguments: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // The pipeline has no cancellation primitive; an interrupt ends the process
    if let Err(e) = ctrlc::set_handler(move || {
        process::exit(130);
    }) {
        error!("Error setting Ctrl-C handler: {}", e);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Pipeline failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: PipelineConfig) -> Result<(), PipelineError> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let events = motion_sequence(config.event_count, &mut rng);

    let recorder: Box<dyn Recorder> = match config.record_format {
        RecordFormat::Log => Box::new(LogRecorder),
        RecordFormat::Json => Box::new(JsonLinesRecorder::new(std::io::stdout())),
    };

    info!(
        "{} {}: {} motion events, {:?} apart",
        config::app_name(),
        config::version(),
        config.event_count,
        config.emit_interval
    );

    let mut coordinator = PipelineCoordinator::new(config);
    let report = coordinator
        .run(events, Box::new(StaticClassifier::default()), recorder)
        .await?;

    for outcome in &report.outcomes {
        info!("{}", outcome);
    }
    Ok(())
}

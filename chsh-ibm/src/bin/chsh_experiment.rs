//! CHSH Bell-inequality sweep on the least busy IBM Quantum device
//!
//! Run with: cargo run --bin chsh-experiment
//!
//! Credentials come from `IBM_QUANTUM_TOKEN`, a `.env` file or
//! `~/.qiskit/qiskit-ibm.json`. Optional settings are read from
//! `chsh.json` in the working directory.

use chsh_ibm::config::CONFIG_FILE;
use chsh_ibm::telemetry::init_tracing;
use chsh_ibm::{
    BasisTranslator, ChshExperiment, ChshResult, CredentialsManager, ExperimentConfig,
    PollSettings, Result, RuntimeEstimator, RuntimeService,
};
use std::path::Path;
use tracing::{error, info};

async fn run() -> Result<ChshResult> {
    let config = ExperimentConfig::load_or_default(Path::new(CONFIG_FILE))?;
    let credentials = CredentialsManager::load()?;
    let service = RuntimeService::with_base_url(credentials, config.api_url.clone())?;

    let backend = match &config.backend.name {
        Some(name) => service.backend(name).await?,
        None => service.least_busy(&config.backend.filter).await?,
    };
    info!(backend = %backend.name, pending_jobs = backend.pending_jobs, "using backend");

    let target = service.target(&backend.name).await?;

    let mut estimator = RuntimeEstimator::new(&service, backend.name.clone())
        .with_resilience(config.resilience_level)
        .with_poll(PollSettings {
            interval: config.poll_interval(),
            max_wait: config.max_wait(),
        });
    if let Some(shots) = config.shots {
        estimator = estimator.with_shots(shots);
    }

    let transpiler = BasisTranslator::new(config.optimization_level);
    let experiment = ChshExperiment::new(config)?;
    experiment.run(&estimator, &transpiler, &target).await
}

#[tokio::main]
async fn main() {
    init_tracing("info");

    match run().await {
        Ok(result) => println!("{}", result.summary()),
        Err(err) => {
            error!(category = ?err.category(), "{}", err);
            std::process::exit(err.exit_code());
        }
    }
}

//! # CHSH-IBM: Bell Inequality on IBM Quantum Hardware
//!
//! Runs a CHSH witness sweep on IBM Quantum devices through the Qiskit
//! Runtime REST API.
//!
//! ## Features
//!
//! - **Circuit Building**: the `H · CX · Ry(θ)` Bell circuit with a symbolic angle
//! - **ISA Transpilation**: basis translation onto `cz`, `ecr` or `cx` devices
//! - **Estimator V2**: one PUB, two observables, one job for the whole sweep
//! - **Backend Selection**: least-busy operational device
//! - **Plotting**: witness curves against the classical and Tsirelson bounds
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chsh_ibm::{BasisTranslator, ChshExperiment, CredentialsManager, ExperimentConfig,
//!     RuntimeEstimator, RuntimeService};
//!
//! let config = ExperimentConfig::load_or_default("chsh.json".as_ref())?;
//! let service = RuntimeService::new(CredentialsManager::load()?)?;
//! let backend = service.least_busy(&config.backend.filter).await?;
//! let target = service.target(&backend.name).await?;
//!
//! let estimator = RuntimeEstimator::new(&service, &backend.name);
//! let result = ChshExperiment::new(config)?
//!     .run(&estimator, &BasisTranslator::new(3), &target)
//!     .await?;
//! println!("{}", result.summary());
//! ```

pub mod backend;
pub mod circuit;
pub mod config;
pub mod credentials;
pub mod diagram;
pub mod error;
pub mod estimator;
pub mod experiment;
pub mod jobs;
pub mod observable;
pub mod plot;
pub mod sweep;
pub mod telemetry;
pub mod transpiler;

// Re-exports
pub use backend::{BackendFilter, BackendInfo, BackendStatus, RuntimeService};
pub use circuit::{chsh_circuit, Angle, Circuit, Gate, GateType};
pub use config::ExperimentConfig;
pub use credentials::{Credentials, CredentialsManager};
pub use diagram::CircuitDiagram;
pub use error::{ChshError, ErrorCategory, Result};
pub use estimator::{EstimationService, EstimatorPub, EstimatorResult, RuntimeEstimator};
pub use experiment::{ChshExperiment, ChshResult};
pub use jobs::{Job, JobManager, JobStatus, PollSettings};
pub use observable::SparsePauliOp;
pub use plot::{ResultsPlot, CLASSICAL_BOUND, TSIRELSON_BOUND};
pub use sweep::PhaseSweep;
pub use transpiler::{BasisTranslator, IsaCircuit, Layout, Target, Transpiler};

/// IBM Quantum Runtime API base URL
pub const IBM_QUANTUM_API_URL: &str = "https://api.quantum.ibm.com/runtime";

/// Default number of sweep points over [0, 2π]
pub const DEFAULT_NUM_PHASES: usize = 21;

/// Maximum wait time for job completion (seconds)
pub const MAX_WAIT_TIME: u64 = 3600;

/// Poll interval for job status (seconds)
pub const POLL_INTERVAL: u64 = 5;

/// Smallest device considered by least-busy selection
pub const MIN_NUM_QUBITS: usize = 127;

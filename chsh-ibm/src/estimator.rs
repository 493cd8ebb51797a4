//! IBM Quantum Runtime Estimator primitive
//!
//! One PUB (primitive unified block) carries a parametrized ISA circuit,
//! one observable per output channel and one binding per sweep point.
//! The service broadcasts observables of shape `(channels, 1)` against
//! bindings of shape `(points,)`, so `evs` comes back as
//! `channels × points`.
//!
//! ## Usage
//!
//! ```ignore
//! use chsh_ibm::estimator::{EstimationService, EstimatorPub, RuntimeEstimator};
//!
//! let pub_block = EstimatorPub::new(isa.circuit, observables, sweep.bindings());
//! let estimator = RuntimeEstimator::new(&service, "ibm_torino");
//! let result = estimator.run(&pub_block).await?;
//! ```

use crate::backend::RuntimeService;
use crate::circuit::Circuit;
use crate::error::{ChshError, Result};
use crate::jobs::{JobManager, PollSettings};
use crate::observable::SparsePauliOp;
use crate::{MAX_WAIT_TIME, POLL_INTERVAL};
use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

// =============================================================================
// Primitive Unified Block
// =============================================================================

/// Circuit, observables and parameter bindings for one Estimator call
#[derive(Debug, Clone)]
pub struct EstimatorPub {
    /// Circuit in the backend's instruction set
    pub circuit: Circuit,

    /// One single-observable list per output channel
    pub observables: Vec<Vec<SparsePauliOp>>,

    /// One binding per sweep point
    pub parameter_values: Vec<Vec<f64>>,
}

impl EstimatorPub {
    pub fn new(
        circuit: Circuit,
        observables: Vec<Vec<SparsePauliOp>>,
        parameter_values: Vec<Vec<f64>>,
    ) -> Self {
        Self {
            circuit,
            observables,
            parameter_values,
        }
    }

    /// Number of output channels
    pub fn num_channels(&self) -> usize {
        self.observables.len()
    }

    /// Number of sweep points
    pub fn num_points(&self) -> usize {
        self.parameter_values.len()
    }

    /// Check shapes before anything is sent
    pub fn validate(&self) -> Result<()> {
        self.circuit.validate()?;

        if self.observables.is_empty() {
            return Err(ChshError::InvalidObservable("No observables given".into()));
        }
        for (channel, list) in self.observables.iter().enumerate() {
            if list.len() != 1 {
                return Err(ChshError::InvalidObservable(format!(
                    "Channel {} has {} observables, expected 1",
                    channel,
                    list.len()
                )));
            }
            if list[0].num_qubits() != self.circuit.n_qubits {
                return Err(ChshError::InvalidObservable(format!(
                    "Channel {} spans {} qubits, circuit has {}",
                    channel,
                    list[0].num_qubits(),
                    self.circuit.n_qubits
                )));
            }
        }

        if self.parameter_values.is_empty() {
            return Err(ChshError::InvalidParameter("No parameter bindings".into()));
        }
        for binding in &self.parameter_values {
            self.circuit.validate_binding(binding)?;
        }

        Ok(())
    }

    /// Serialize as `[qasm, observables, parameter_values]`
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let qasm = self.circuit.to_qasm()?;
        let observables: Vec<Vec<serde_json::Value>> = self
            .observables
            .iter()
            .map(|list| list.iter().map(SparsePauliOp::to_ibm_format).collect())
            .collect();

        Ok(serde_json::json!([qasm, observables, self.parameter_values]))
    }
}

// =============================================================================
// Estimator Result
// =============================================================================

/// Result from Estimator execution
#[derive(Debug, Clone)]
pub struct EstimatorResult {
    /// Expectation values, `[channel][point]`
    pub evs: Vec<Vec<f64>>,

    /// Standard errors, same shape as `evs` (if available)
    pub stds: Option<Vec<Vec<f64>>>,

    /// Job ID
    pub job_id: String,

    /// Backend used
    pub backend: String,

    /// Shots per point, if fixed
    pub shots: Option<u32>,

    /// Wall-clock time in ms
    pub execution_time_ms: u64,
}

impl EstimatorResult {
    /// Expectation values of one channel
    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.evs.get(index).map(Vec::as_slice)
    }
}

// =============================================================================
// Estimation Service
// =============================================================================

/// Anything that evaluates a PUB into expectation values
///
/// Implementations return exactly `channels × points` values or an error;
/// they never truncate or pad.
#[async_trait]
pub trait EstimationService: Send + Sync {
    /// Backend the estimates come from
    fn backend_name(&self) -> &str;

    /// Evaluate one PUB
    async fn run(&self, pub_block: &EstimatorPub) -> Result<EstimatorResult>;
}

/// Runtime options for Estimator V2
#[derive(Debug, Clone, Serialize)]
pub struct EstimatorOptions {
    /// Shots per point
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_shots: Option<u32>,

    /// Resilience level (0-2)
    pub resilience_level: u8,
}

#[derive(Debug, Serialize)]
struct EstimatorParams {
    pubs: Vec<serde_json::Value>,
    version: u32,
    options: EstimatorOptions,
}

/// Estimator backed by the Runtime `/jobs` API
pub struct RuntimeEstimator<'a> {
    /// Service handle
    service: &'a RuntimeService,

    /// Target backend name
    backend: String,

    /// Shots per point
    shots: Option<u32>,

    /// Resilience level (0=none, 1=readout mitigation, 2=ZNE)
    resilience_level: u8,

    /// Poll interval and maximum wait
    poll: PollSettings,
}

impl<'a> RuntimeEstimator<'a> {
    /// Create new estimator
    pub fn new(service: &'a RuntimeService, backend: impl Into<String>) -> Self {
        Self {
            service,
            backend: backend.into(),
            shots: None,
            resilience_level: 1,
            poll: PollSettings {
                interval: Duration::from_secs(POLL_INTERVAL),
                max_wait: Duration::from_secs(MAX_WAIT_TIME),
            },
        }
    }

    /// Fix shots per point
    pub fn with_shots(mut self, shots: u32) -> Self {
        self.shots = Some(shots);
        self
    }

    /// Set resilience level
    pub fn with_resilience(mut self, level: u8) -> Self {
        self.resilience_level = level.min(2);
        self
    }

    /// Set polling limits
    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    fn params(&self, pub_block: &EstimatorPub) -> Result<EstimatorParams> {
        Ok(EstimatorParams {
            pubs: vec![pub_block.to_json()?],
            version: 2,
            options: EstimatorOptions {
                default_shots: self.shots,
                resilience_level: self.resilience_level,
            },
        })
    }
}

#[async_trait]
impl<'a> EstimationService for RuntimeEstimator<'a> {
    fn backend_name(&self) -> &str {
        &self.backend
    }

    async fn run(&self, pub_block: &EstimatorPub) -> Result<EstimatorResult> {
        pub_block.validate()?;
        let start = Instant::now();

        let params = self.params(pub_block)?;
        let mut job = JobManager::submit(self.service, &self.backend, "estimator", &params).await?;
        JobManager::wait_for_completion(self.service, &mut job, self.poll).await?;

        let body = JobManager::results(self.service, &job).await?;
        let (evs, stds) =
            parse_estimator_response(&body, pub_block.num_channels(), pub_block.num_points())?;

        let elapsed = start.elapsed().as_millis() as u64;
        info!(job_id = %job.id, elapsed_ms = elapsed, "estimator results received");

        Ok(EstimatorResult {
            evs,
            stds,
            job_id: job.id,
            backend: self.backend.clone(),
            shots: self.shots,
            execution_time_ms: elapsed,
        })
    }
}

/// Parse an Estimator V2 result body
///
/// ```text
/// {"results": [{"data": {"evs": [[...], [...]], "stds": [[...], [...]]}}]}
/// ```
///
/// `evs` must be exactly `channels × points`; `stds`, when present, too.
pub fn parse_estimator_response(
    body: &str,
    channels: usize,
    points: usize,
) -> Result<(Vec<Vec<f64>>, Option<Vec<Vec<f64>>>)> {
    let resp: serde_json::Value = serde_json::from_str(body)?;

    let data = resp
        .get("results")
        .and_then(|r| r.as_array())
        .and_then(|r| r.first())
        .and_then(|r| r.get("data"))
        .ok_or_else(|| ChshError::InvalidResponse("No results[0].data in response".into()))?;

    let evs = data
        .get("evs")
        .ok_or_else(|| ChshError::InvalidResponse("No expectation values in result".into()))
        .and_then(|v| matrix(v, "evs", channels, points))?;

    let stds = match data.get("stds") {
        Some(v) if !v.is_null() => Some(matrix(v, "stds", channels, points)?),
        _ => None,
    };

    Ok((evs, stds))
}

fn matrix(value: &serde_json::Value, field: &str, rows: usize, cols: usize) -> Result<Vec<Vec<f64>>> {
    let shape_error = || {
        ChshError::InvalidResponse(format!(
            "'{}' does not have shape ({}, {})",
            field, rows, cols
        ))
    };

    let outer = value.as_array().ok_or_else(shape_error)?;
    if outer.len() != rows {
        return Err(shape_error());
    }

    outer
        .iter()
        .map(|row| {
            let row = row.as_array().filter(|r| r.len() == cols).ok_or_else(shape_error)?;
            row.iter()
                .map(|v| {
                    v.as_f64().ok_or_else(|| {
                        ChshError::InvalidResponse(format!("Non-numeric entry in '{}'", field))
                    })
                })
                .collect()
        })
        .collect()
}

// ============================================================================
// Mock implementations for testing
// ============================================================================

#[cfg(feature = "mock")]
pub mod mock {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Outcome returned by a [`ScriptedEstimator`]
    #[derive(Debug, Clone)]
    pub enum Script {
        /// Return these values as-is
        Values(Vec<Vec<f64>>),

        /// Report a remote job failure
        Fail(String),

        /// Report a cancelled job
        Cancel,
    }

    /// Estimator that replays a fixed outcome and counts submissions
    pub struct ScriptedEstimator {
        backend: String,
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedEstimator {
        pub fn new(backend: impl Into<String>, script: Script) -> Self {
            Self {
                backend: backend.into(),
                script,
                calls: AtomicUsize::new(0),
            }
        }

        /// Number of PUBs submitted so far
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EstimationService for ScriptedEstimator {
        fn backend_name(&self) -> &str {
            &self.backend
        }

        async fn run(&self, pub_block: &EstimatorPub) -> Result<EstimatorResult> {
            pub_block.validate()?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            let job_id = uuid::Uuid::new_v4().to_string();

            match &self.script {
                Script::Values(evs) => Ok(EstimatorResult {
                    evs: evs.clone(),
                    stds: None,
                    job_id,
                    backend: self.backend.clone(),
                    shots: None,
                    execution_time_ms: 0,
                }),
                Script::Fail(reason) => Err(ChshError::JobFailed(job_id, reason.clone())),
                Script::Cancel => Err(ChshError::JobCancelled(job_id)),
            }
        }
    }

    /// Analytic estimator for `Ry(θ)` applied to one half of `|Φ+⟩`
    ///
    /// The qubit carrying the parametrized rotation is logical qubit 0;
    /// the other active qubit is logical qubit 1. With `shots` set,
    /// uniform noise of width `1/√shots` is added per term.
    pub struct IdealChshEstimator {
        backend: String,
        shots: Option<u32>,
        rng: Mutex<StdRng>,
    }

    impl IdealChshEstimator {
        pub fn new(backend: impl Into<String>) -> Self {
            Self {
                backend: backend.into(),
                shots: None,
                rng: Mutex::new(StdRng::seed_from_u64(0)),
            }
        }

        /// Add seeded shot noise
        pub fn with_shots(mut self, shots: u32, seed: u64) -> Self {
            self.shots = Some(shots.max(1));
            self.rng = Mutex::new(StdRng::seed_from_u64(seed));
            self
        }

        /// Pauli weights after conjugating by `Ry(θ)`
        fn heisenberg(pauli: char, theta: f64) -> Vec<(char, f64)> {
            match pauli {
                'X' => vec![('X', theta.cos()), ('Z', theta.sin())],
                'Z' => vec![('Z', theta.cos()), ('X', -theta.sin())],
                other => vec![(other, 1.0)],
            }
        }

        /// `⟨Φ+| P ⊗ Q |Φ+⟩`
        fn bell_correlation(p: char, q: char) -> f64 {
            match (p, q) {
                ('I', 'I') | ('X', 'X') | ('Z', 'Z') => 1.0,
                ('Y', 'Y') => -1.0,
                _ => 0.0,
            }
        }

        /// Expectation of a term given the Paulis on logical qubits 0 and 1
        pub fn term_expectation(q0: char, q1: char, theta: f64) -> f64 {
            Self::heisenberg(q0, theta)
                .into_iter()
                .map(|(p, w)| w * Self::bell_correlation(p, q1))
                .sum()
        }

        fn locate_qubits(circuit: &Circuit) -> Result<(usize, usize)> {
            let rotated = circuit
                .gates
                .iter()
                .find(|g| g.gate_type.angle().and_then(|a| a.param_index()).is_some())
                .map(|g| g.qubits[0])
                .ok_or_else(|| ChshError::InvalidCircuit("No parametrized rotation".into()))?;

            let active = circuit.active_qubits();
            match active.as_slice() {
                &[a, b] if a == rotated => Ok((a, b)),
                &[a, b] if b == rotated => Ok((b, a)),
                _ => Err(ChshError::InvalidCircuit(format!(
                    "Expected two active qubits, found {:?}",
                    active
                ))),
            }
        }
    }

    #[async_trait]
    impl EstimationService for IdealChshEstimator {
        fn backend_name(&self) -> &str {
            &self.backend
        }

        async fn run(&self, pub_block: &EstimatorPub) -> Result<EstimatorResult> {
            pub_block.validate()?;
            let (l0, l1) = Self::locate_qubits(&pub_block.circuit)?;

            let mut rng = self
                .rng
                .lock()
                .map_err(|_| ChshError::InvalidResponse("Noise source poisoned".into()))?;

            let mut evs = Vec::with_capacity(pub_block.num_channels());
            let mut stds = Vec::with_capacity(pub_block.num_channels());

            for list in &pub_block.observables {
                let op = &list[0];
                let mut row = Vec::with_capacity(pub_block.num_points());
                let mut row_std = Vec::with_capacity(pub_block.num_points());

                for binding in &pub_block.parameter_values {
                    let theta = binding[0];
                    let mut value = 0.0;
                    let mut variance = 0.0;

                    for (label, coeff) in op.terms() {
                        let p0 = SparsePauliOp::pauli_on(label, l0).unwrap_or('I');
                        let p1 = SparsePauliOp::pauli_on(label, l1).unwrap_or('I');
                        let mut ev = Self::term_expectation(p0, p1, theta);

                        if let Some(shots) = self.shots {
                            let width = 1.0 / (shots as f64).sqrt();
                            ev = (ev + rng.gen_range(-width..=width)).clamp(-1.0, 1.0);
                            variance += coeff * coeff * (1.0 - ev * ev).max(0.0) / shots as f64;
                        }
                        value += coeff * ev;
                    }

                    row.push(value);
                    row_std.push(variance.sqrt());
                }

                evs.push(row);
                stds.push(row_std);
            }

            Ok(EstimatorResult {
                evs,
                stds: self.shots.map(|_| stds),
                job_id: uuid::Uuid::new_v4().to_string(),
                backend: self.backend.clone(),
                shots: self.shots,
                execution_time_ms: 0,
            })
        }
    }
}

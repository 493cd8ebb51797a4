//! CHSH experiment pipeline
//!
//! Builds the Bell circuit, compiles it for a target, submits one sweep to
//! an [`EstimationService`] and writes the results graph. Every failure is
//! fatal; nothing is plotted or exported unless the estimator returned a
//! complete `2 × N` result.
//!
//! ```ignore
//! let experiment = ChshExperiment::new(config)?;
//! let result = experiment.run(&estimator, &BasisTranslator::new(3), &target).await?;
//! println!("{}", result.summary());
//! ```

use crate::circuit::{chsh_circuit, Circuit};
use crate::config::ExperimentConfig;
use crate::diagram::CircuitDiagram;
use crate::error::{ChshError, Result};
use crate::estimator::{EstimationService, EstimatorPub, EstimatorResult};
use crate::observable::SparsePauliOp;
use crate::plot::{ensure_parent_dir, ResultsPlot, CLASSICAL_BOUND, TSIRELSON_BOUND};
use crate::sweep::PhaseSweep;
use crate::transpiler::{IsaCircuit, Target, Transpiler};
use std::path::Path;
use tracing::{debug, info};

// =============================================================================
// Experiment Result
// =============================================================================

/// Witness values for one sweep, index-aligned with the phases
#[derive(Debug, Clone)]
pub struct ChshResult {
    /// Sweep angles (radians)
    pub phases: Vec<f64>,

    /// ⟨CHSH1⟩ per phase
    pub chsh1: Vec<f64>,

    /// ⟨CHSH2⟩ per phase
    pub chsh2: Vec<f64>,

    /// Standard errors of `chsh1` and `chsh2`, when reported
    pub stds: Option<(Vec<f64>, Vec<f64>)>,

    /// Runtime job ID
    pub job_id: String,

    /// Backend the job ran on
    pub backend: String,

    /// Estimator wall-clock time (ms)
    pub execution_time_ms: u64,
}

impl ChshResult {
    /// Split a two-channel estimate into witness sequences
    ///
    /// Anything other than exactly two channels of `phases.len()` values
    /// is a malformed response.
    pub fn from_estimates(phases: &[f64], result: EstimatorResult) -> Result<Self> {
        let n = phases.len();
        let check = |rows: &[Vec<f64>], what: &str| -> Result<()> {
            if rows.len() != 2 || rows.iter().any(|r| r.len() != n) {
                let shape: Vec<usize> = rows.iter().map(Vec::len).collect();
                return Err(ChshError::InvalidResponse(format!(
                    "{} shape {:?} does not match 2 channels × {} points",
                    what, shape, n
                )));
            }
            Ok(())
        };

        check(&result.evs, "evs")?;
        if let Some(stds) = &result.stds {
            check(stds, "stds")?;
        }

        let mut evs = result.evs.into_iter();
        let (chsh1, chsh2) = match (evs.next(), evs.next()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(ChshError::InvalidResponse("Missing witness channel".into())),
        };
        let stds = result.stds.and_then(|s| {
            let mut s = s.into_iter();
            Some((s.next()?, s.next()?))
        });

        Ok(Self {
            phases: phases.to_vec(),
            chsh1,
            chsh2,
            stds,
            job_id: result.job_id,
            backend: result.backend,
            execution_time_ms: result.execution_time_ms,
        })
    }

    /// Number of sweep points
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Largest |witness| over both sequences, with its phase
    pub fn max_violation(&self) -> (f64, f64) {
        self.phases
            .iter()
            .zip(self.chsh1.iter().zip(&self.chsh2))
            .map(|(&phase, (&a, &b))| (phase, a.abs().max(b.abs())))
            .fold((0.0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best })
    }

    /// Whether any point exceeds the local-hidden-variable bound of 2
    pub fn violates_classical_bound(&self) -> bool {
        self.max_violation().1 > CLASSICAL_BOUND
    }

    /// Phases at which either witness leaves [-2, 2]
    pub fn violating_phases(&self) -> Vec<f64> {
        self.phases
            .iter()
            .zip(self.chsh1.iter().zip(&self.chsh2))
            .filter(|(_, (a, b))| a.abs() > CLASSICAL_BOUND || b.abs() > CLASSICAL_BOUND)
            .map(|(&phase, _)| phase)
            .collect()
    }

    /// Human-readable report
    pub fn summary(&self) -> String {
        let (phase, value) = self.max_violation();
        format!(
            r#"
=== CHSH Bell Inequality ===

Backend: {}
Job ID:  {}

Sweep points: {}
Max |witness| = {:.4} at θ = {:.3}π
Classical bound = {:.4}
Tsirelson bound = {:.4}
Violating points: {}
Verdict: {}
"#,
            self.backend,
            self.job_id,
            self.len(),
            value,
            phase / std::f64::consts::PI,
            CLASSICAL_BOUND,
            TSIRELSON_BOUND,
            self.violating_phases().len(),
            if self.violates_classical_bound() {
                "Bell inequality violated"
            } else {
                "no violation observed"
            }
        )
    }

    /// Export as CSV, one row per phase
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("theta,chsh1,chsh2,chsh1_std,chsh2_std\n");
        for i in 0..self.len() {
            let (s1, s2) = match &self.stds {
                Some((s1, s2)) => (format!("{:.8}", s1[i]), format!("{:.8}", s2[i])),
                None => (String::new(), String::new()),
            };
            csv.push_str(&format!(
                "{:.8},{:.8},{:.8},{},{}\n",
                self.phases[i], self.chsh1[i], self.chsh2[i], s1, s2
            ));
        }
        csv
    }

    /// Write [`to_csv`](Self::to_csv) to `path`
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        std::fs::write(path, self.to_csv())?;
        info!(path = %path.display(), rows = self.len(), "results csv written");
        Ok(())
    }
}

// =============================================================================
// Compiled Experiment
// =============================================================================

/// ISA circuit plus observables expanded onto its physical register
#[derive(Debug, Clone)]
pub struct PreparedExperiment {
    pub isa: IsaCircuit,
    pub observables: [SparsePauliOp; 2],
}

// =============================================================================
// Experiment
// =============================================================================

/// CHSH sweep driven by an [`ExperimentConfig`]
pub struct ChshExperiment {
    config: ExperimentConfig,
    circuit: Circuit,
    observables: [SparsePauliOp; 2],
    sweep: PhaseSweep,
}

impl ChshExperiment {
    /// Validate the configuration and build circuit, observables and sweep
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let sweep = PhaseSweep::full_turn(config.num_phases)?;

        Ok(Self {
            config,
            circuit: chsh_circuit(),
            observables: [SparsePauliOp::chsh1(), SparsePauliOp::chsh2()],
            sweep,
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Logical circuit
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Logical CHSH1 and CHSH2
    pub fn observables(&self) -> &[SparsePauliOp; 2] {
        &self.observables
    }

    pub fn sweep(&self) -> &PhaseSweep {
        &self.sweep
    }

    /// Compile for `target` and move the observables onto the chosen qubits
    pub fn prepare(&self, transpiler: &dyn Transpiler, target: &Target) -> Result<PreparedExperiment> {
        let isa = transpiler.run(&self.circuit, target)?;
        let [chsh1, chsh2] = &self.observables;
        let observables = [
            chsh1.apply_layout(&isa.layout)?,
            chsh2.apply_layout(&isa.layout)?,
        ];

        info!(
            backend = %isa.backend,
            qubits = ?isa.layout.physical_qubits(),
            depth = isa.circuit.depth(),
            ops = ?isa.circuit.count_ops(),
            "circuit compiled"
        );

        Ok(PreparedExperiment { isa, observables })
    }

    /// PUB with one channel per witness and one binding per phase
    pub fn estimator_pub(&self, prepared: &PreparedExperiment) -> EstimatorPub {
        let [chsh1, chsh2] = &prepared.observables;
        EstimatorPub::new(
            prepared.isa.circuit.clone(),
            vec![vec![chsh1.clone()], vec![chsh2.clone()]],
            self.sweep.bindings(),
        )
    }

    /// Write the logical diagram and, if given, the ISA diagram
    pub fn draw_circuits(&self, isa: Option<&Circuit>) -> Result<()> {
        let output = &self.config.output;
        CircuitDiagram::new(&self.circuit).render(&output.circuit_image_path())?;
        if let Some(isa) = isa {
            CircuitDiagram::new(isa).render(&output.isa_circuit_image_path())?;
        }
        Ok(())
    }

    /// Compile, estimate and write outputs
    pub async fn run(
        &self,
        estimator: &dyn EstimationService,
        transpiler: &dyn Transpiler,
        target: &Target,
    ) -> Result<ChshResult> {
        let prepared = self.prepare(transpiler, target)?;
        let output = &self.config.output;

        if output.render_images {
            self.draw_circuits(Some(&prepared.isa.circuit))?;
        }

        let pub_block = self.estimator_pub(&prepared);
        info!(
            backend = estimator.backend_name(),
            points = pub_block.num_points(),
            "submitting sweep"
        );
        let estimates = estimator.run(&pub_block).await?;
        debug!(job_id = %estimates.job_id, "estimates received");

        let result = ChshResult::from_estimates(self.sweep.values(), estimates)?;

        if output.render_images {
            ResultsPlot::new(&self.sweep, &result.chsh1, &result.chsh2)?
                .render(&output.results_image_path())?;
        }
        if let Some(path) = output.results_csv_path() {
            result.write_csv(&path)?;
        }

        info!(
            max_violation = result.max_violation().1,
            violated = result.violates_classical_bound(),
            "experiment finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use crate::transpiler::BasisTranslator;
    use std::f64::consts::PI;

    fn estimate(evs: Vec<Vec<f64>>, stds: Option<Vec<Vec<f64>>>) -> EstimatorResult {
        EstimatorResult {
            evs,
            stds,
            job_id: "job-1".into(),
            backend: "ibm_test".into(),
            shots: None,
            execution_time_ms: 5,
        }
    }

    fn headless(dir: &Path) -> ExperimentConfig {
        ExperimentConfig {
            output: OutputConfig {
                directory: dir.to_path_buf(),
                render_images: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_from_estimates_splits_channels() {
        let phases = [0.0, PI, 2.0 * PI];
        let result = ChshResult::from_estimates(
            &phases,
            estimate(
                vec![vec![2.0, -2.0, 2.0], vec![2.0, -2.0, 2.0]],
                Some(vec![vec![0.1; 3], vec![0.2; 3]]),
            ),
        )
        .unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result.chsh1, vec![2.0, -2.0, 2.0]);
        assert_eq!(result.stds.as_ref().unwrap().1, vec![0.2; 3]);
        assert_eq!(result.job_id, "job-1");
    }

    #[test]
    fn test_from_estimates_rejects_shape() {
        let phases = [0.0, PI, 2.0 * PI];

        let short = estimate(vec![vec![1.0, 1.0], vec![1.0, 1.0]], None);
        assert!(matches!(
            ChshResult::from_estimates(&phases, short),
            Err(ChshError::InvalidResponse(_))
        ));

        let one_channel = estimate(vec![vec![1.0; 3]], None);
        assert!(ChshResult::from_estimates(&phases, one_channel).is_err());

        let bad_stds = estimate(vec![vec![1.0; 3]; 2], Some(vec![vec![0.1; 2]; 2]));
        assert!(ChshResult::from_estimates(&phases, bad_stds).is_err());
    }

    #[test]
    fn test_violation_and_csv() {
        let result = ChshResult::from_estimates(
            &[0.0, PI / 2.0, PI],
            estimate(vec![vec![2.0, 0.0, -2.8], vec![1.9, -2.1, 0.0]], None),
        )
        .unwrap();

        let (phase, value) = result.max_violation();
        assert!((phase - PI).abs() < 1e-12);
        assert!((value - 2.8).abs() < 1e-12);
        assert!(result.violates_classical_bound());
        assert_eq!(result.violating_phases().len(), 2);

        let csv = result.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "theta,chsh1,chsh2,chsh1_std,chsh2_std");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].ends_with(",,"));
        assert!(result.summary().contains("Bell inequality violated"));
    }

    #[test]
    fn test_no_violation() {
        let result = ChshResult::from_estimates(
            &[0.0, PI],
            estimate(vec![vec![1.0, -2.0], vec![0.5, 2.0]], None),
        )
        .unwrap();
        assert!(!result.violates_classical_bound());
        assert!(result.violating_phases().is_empty());
    }

    #[test]
    fn test_new_rejects_small_sweep() {
        let config = ExperimentConfig {
            num_phases: 1,
            ..Default::default()
        };
        assert!(matches!(
            ChshExperiment::new(config),
            Err(ChshError::InvalidSweepSize(1))
        ));
    }

    #[test]
    fn test_prepare_moves_observables() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = ChshExperiment::new(headless(dir.path())).unwrap();
        let target = Target {
            name: "line".into(),
            num_qubits: 5,
            basis_gates: ["rz", "sx", "x", "cz"].iter().map(|s| s.to_string()).collect(),
            coupling_map: vec![(2, 3), (3, 2)],
        };

        let prepared = experiment
            .prepare(&BasisTranslator::new(3), &target)
            .unwrap();
        assert_eq!(prepared.isa.layout.physical_qubits(), &[2, 3]);

        let op = &prepared.observables[0];
        assert_eq!(op.num_qubits(), 5);
        assert_eq!(op.coefficient("IZZII"), Some(1.0));
        assert_eq!(op.coefficient("IZXII"), Some(-1.0));

        let pub_block = experiment.estimator_pub(&prepared);
        assert_eq!(pub_block.num_channels(), 2);
        assert_eq!(pub_block.num_points(), 21);
        pub_block.validate().unwrap();
    }
}

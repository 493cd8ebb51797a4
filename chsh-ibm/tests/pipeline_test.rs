use chsh_ibm::backend::mock::{eagle_target, heron_target};
use chsh_ibm::config::OutputConfig;
use chsh_ibm::estimator::mock::{IdealChshEstimator, Script, ScriptedEstimator};
use chsh_ibm::{
    BasisTranslator, ChshError, ChshExperiment, ExperimentConfig, Target, TSIRELSON_BOUND,
};
use std::f64::consts::{FRAC_PI_4, PI, SQRT_2};
use std::path::Path;

fn config(dir: &Path, render_images: bool) -> ExperimentConfig {
    ExperimentConfig {
        output: OutputConfig {
            directory: dir.to_path_buf(),
            results_csv: Some("results.csv".into()),
            render_images,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn assert_analytic(phases: &[f64], chsh1: &[f64], chsh2: &[f64]) {
    for ((&theta, &c1), &c2) in phases.iter().zip(chsh1).zip(chsh2) {
        let expected1 = 2.0 * SQRT_2 * (theta + FRAC_PI_4).cos();
        let expected2 = 2.0 * SQRT_2 * (theta - FRAC_PI_4).cos();
        assert!((c1 - expected1).abs() < 1e-9, "CHSH1 at {}: {} vs {}", theta, c1, expected1);
        assert!((c2 - expected2).abs() < 1e-9, "CHSH2 at {}: {} vs {}", theta, c2, expected2);
    }
}

async fn run_ideal(target: &Target) {
    let dir = tempfile::tempdir().unwrap();
    let experiment = ChshExperiment::new(config(dir.path(), false)).unwrap();
    let estimator = IdealChshEstimator::new(target.name.clone());

    let result = experiment
        .run(&estimator, &BasisTranslator::new(3), target)
        .await
        .unwrap();

    assert_eq!(result.len(), 21);
    assert_eq!(result.chsh1.len(), 21);
    assert_eq!(result.chsh2.len(), 21);
    assert_eq!(result.phases, experiment.sweep().values());
    assert_eq!(result.backend, target.name);
    assert_analytic(&result.phases, &result.chsh1, &result.chsh2);

    assert!(result.violates_classical_bound());
    assert!(result.max_violation().1 <= TSIRELSON_BOUND + 1e-9);

    let csv = std::fs::read_to_string(dir.path().join("results.csv")).unwrap();
    assert_eq!(csv.lines().count(), 22);
    assert!(!dir.path().join("results_graph.png").exists());
}

#[tokio::test]
async fn test_ideal_sweep_on_cz_device() {
    run_ideal(&heron_target(133)).await;
}

#[tokio::test]
async fn test_ideal_sweep_on_ecr_device() {
    run_ideal(&eagle_target(127)).await;
}

#[tokio::test]
async fn test_pinned_layout_reversed_pair() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = ChshExperiment::new(config(dir.path(), false)).unwrap();
    let target = eagle_target(10);
    let transpiler = BasisTranslator::new(1).with_initial_layout(vec![6, 5]);

    let prepared = experiment.prepare(&transpiler, &target).unwrap();
    assert_eq!(prepared.isa.layout.physical_qubits(), &[6, 5]);
    assert_eq!(prepared.isa.circuit.active_qubits(), vec![5, 6]);

    let estimator = IdealChshEstimator::new("fake_eagle");
    let result = experiment.run(&estimator, &transpiler, &target).await.unwrap();
    assert_analytic(&result.phases, &result.chsh1, &result.chsh2);
}

#[tokio::test]
async fn test_noisy_sweep_reports_stds() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = ChshExperiment::new(config(dir.path(), false)).unwrap();
    let estimator = IdealChshEstimator::new("fake_heron").with_shots(4096, 7);

    let result = experiment
        .run(&estimator, &BasisTranslator::new(3), &heron_target(5))
        .await
        .unwrap();

    let (s1, s2) = result.stds.as_ref().unwrap();
    assert_eq!(s1.len(), 21);
    assert_eq!(s2.len(), 21);
    assert!(s1.iter().chain(s2).all(|s| *s >= 0.0 && *s < 0.1));
    for (&c1, &c2) in result.chsh1.iter().zip(&result.chsh2) {
        assert!(c1.abs() <= 4.0 && c2.abs() <= 4.0);
    }
}

#[tokio::test]
async fn test_failed_job_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = ChshExperiment::new(config(dir.path(), false)).unwrap();
    let estimator = ScriptedEstimator::new("fake_heron", Script::Fail("Error 1517".into()));

    let err = experiment
        .run(&estimator, &BasisTranslator::new(3), &heron_target(5))
        .await
        .unwrap_err();

    assert!(matches!(err, ChshError::JobFailed(_, _)));
    assert_eq!(estimator.calls(), 1);
    assert!(!dir.path().join("results.csv").exists());
    assert!(!dir.path().join("results_graph.png").exists());
}

#[tokio::test]
async fn test_failed_job_with_images_never_plots() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = ChshExperiment::new(config(dir.path(), true)).unwrap();
    let estimator = ScriptedEstimator::new("fake_heron", Script::Cancel);

    let result = experiment
        .run(&estimator, &BasisTranslator::new(3), &heron_target(5))
        .await;

    // Without system fonts the diagrams fail first; either way nothing is plotted
    assert!(result.is_err());
    assert!(!dir.path().join("results_graph.png").exists());
    assert!(!dir.path().join("results.csv").exists());
}

#[tokio::test]
async fn test_short_response_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = ChshExperiment::new(config(dir.path(), false)).unwrap();
    let estimator = ScriptedEstimator::new(
        "fake_heron",
        Script::Values(vec![vec![1.0; 20], vec![1.0; 20]]),
    );

    let err = experiment
        .run(&estimator, &BasisTranslator::new(3), &heron_target(5))
        .await
        .unwrap_err();

    assert!(matches!(err, ChshError::InvalidResponse(_)));
    assert!(!dir.path().join("results.csv").exists());
}

#[tokio::test]
async fn test_scripted_values_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = ChshExperiment::new(config(dir.path(), false)).unwrap();
    let ramp: Vec<f64> = (0..21).map(|i| i as f64 / 10.0 - 1.0).collect();
    let estimator = ScriptedEstimator::new(
        "fake_heron",
        Script::Values(vec![ramp.clone(), ramp.iter().map(|v| -v).collect()]),
    );

    let result = experiment
        .run(&estimator, &BasisTranslator::new(0), &heron_target(5))
        .await
        .unwrap();

    assert_eq!(result.chsh1, ramp);
    assert_eq!(result.chsh2[0], 1.0);
    assert!(!result.violates_classical_bound());
    assert!((result.phases[10] - PI).abs() < 1e-12);
}

#[tokio::test]
async fn test_uncoupled_device_fails_before_submission() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = ChshExperiment::new(config(dir.path(), false)).unwrap();
    let target = Target {
        name: "islands".into(),
        num_qubits: 4,
        basis_gates: ["cz", "rz", "sx", "x"].map(String::from).to_vec(),
        coupling_map: vec![],
    };
    let estimator = ScriptedEstimator::new("islands", Script::Values(vec![]));

    let err = experiment
        .run(&estimator, &BasisTranslator::new(3), &target)
        .await
        .unwrap_err();

    assert!(matches!(err, ChshError::NoCoupledPair(_)));
    assert_eq!(estimator.calls(), 0);
}

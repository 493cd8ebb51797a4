use chsh_ibm::backend::mock::{eagle_target, heron_target};
use chsh_ibm::{chsh_circuit, BasisTranslator, Layout, SparsePauliOp, Transpiler};
use proptest::prelude::*;

fn distinct_pair(n: usize) -> impl Strategy<Value = (usize, usize)> {
    (0..n, 1..n).prop_map(move |(a, shift)| (a, (a + shift) % n))
}

proptest! {
    #[test]
    fn observables_follow_layout((n, (a, b)) in (2usize..64).prop_flat_map(|n| (Just(n), distinct_pair(n)))) {
        let layout = Layout::new(vec![a, b], n).unwrap();

        for op in [SparsePauliOp::chsh1(), SparsePauliOp::chsh2()] {
            let mapped = op.apply_layout(&layout).unwrap();
            prop_assert_eq!(mapped.num_qubits(), n);
            prop_assert_eq!(mapped.coefficients(), op.coefficients());

            for ((label, _), (orig, _)) in mapped.terms().iter().zip(op.terms()) {
                prop_assert_eq!(label.len(), n);
                prop_assert_eq!(SparsePauliOp::pauli_on(label, a), SparsePauliOp::pauli_on(orig, 0));
                prop_assert_eq!(SparsePauliOp::pauli_on(label, b), SparsePauliOp::pauli_on(orig, 1));
                prop_assert_eq!(label.chars().filter(|&c| c != 'I').count(), 2);
            }
        }
    }

    #[test]
    fn isa_circuit_stays_on_pinned_pair(
        n in 2usize..40,
        k in 0usize..39,
        reversed in any::<bool>(),
        ecr in any::<bool>(),
        level in 0u8..=3,
    ) {
        prop_assume!(k + 1 < n);
        let target = if ecr { eagle_target(n) } else { heron_target(n) };
        let pinned = if reversed { vec![k + 1, k] } else { vec![k, k + 1] };

        let isa = BasisTranslator::new(level)
            .with_initial_layout(pinned.clone())
            .run(&chsh_circuit(), &target)
            .unwrap();

        prop_assert_eq!(isa.layout.physical_qubits(), pinned.as_slice());
        prop_assert_eq!(isa.circuit.active_qubits(), vec![k, k + 1]);
        prop_assert_eq!(isa.circuit.num_parameters(), 1);
        for name in isa.circuit.count_ops().keys() {
            prop_assert!(target.supports(name), "{} not native on {}", name, target.name);
        }
        isa.circuit.validate_binding(&[1.0]).unwrap();
    }
}

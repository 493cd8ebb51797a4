//! ISA transpilation: logical circuit → backend-native circuit
//!
//! IBM Runtime only accepts circuits expressed in a backend's native
//! instruction set and addressed to physical qubits. The [`Transpiler`]
//! trait is the seam for that conversion. [`BasisTranslator`] is a small
//! implementation sufficient for two-qubit experiments: it places the
//! logical qubits on one coupled pair and rewrites gates into
//! `rz`/`sx`/`x` plus the target's two-qubit gate (`cx`, `cz` or `ecr`).
//!
//! ## Supported Targets
//! - Heron: `cz` native, symmetric coupling
//! - Eagle: `ecr` native, directed coupling
//! - Legacy Falcon: `cx` native, directed coupling

use crate::circuit::{Angle, Circuit, Gate, GateType, Register};
use crate::error::{ChshError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use tracing::debug;

/// Hardware target description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Backend name
    pub name: String,

    /// Number of physical qubits
    pub num_qubits: usize,

    /// Native instruction names
    pub basis_gates: Vec<String>,

    /// Directed coupling edges (first, second)
    pub coupling_map: Vec<(usize, usize)>,
}

impl Target {
    /// Check if an instruction is native
    pub fn supports(&self, gate: &str) -> bool {
        self.basis_gates.iter().any(|g| g == gate)
    }

    /// Check if a directed edge exists
    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.coupling_map.contains(&(a, b))
    }

    /// Check if two qubits are coupled in either direction
    pub fn is_coupled(&self, a: usize, b: usize) -> bool {
        self.has_edge(a, b) || self.has_edge(b, a)
    }

    /// Native two-qubit entangler, preferring `cz`, then `ecr`, then `cx`
    pub fn two_qubit_basis(&self) -> Result<TwoQubitBasis> {
        if self.supports("cz") {
            Ok(TwoQubitBasis::Cz)
        } else if self.supports("ecr") {
            Ok(TwoQubitBasis::Ecr)
        } else if self.supports("cx") {
            Ok(TwoQubitBasis::Cx)
        } else {
            Err(ChshError::UnsupportedGate {
                gate: "two-qubit entangler".into(),
                basis: self.basis_gates.join(", "),
            })
        }
    }

    fn require(&self, gate: &str) -> Result<()> {
        if self.supports(gate) {
            Ok(())
        } else {
            Err(ChshError::UnsupportedGate {
                gate: gate.to_string(),
                basis: self.basis_gates.join(", "),
            })
        }
    }
}

/// Native two-qubit gate family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoQubitBasis {
    /// Controlled-NOT (directed)
    Cx,

    /// Controlled-Z (symmetric)
    Cz,

    /// Echoed cross-resonance (directed)
    Ecr,
}

/// Virtual → physical qubit assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    virtual_to_physical: Vec<usize>,
    num_physical: usize,
}

impl Layout {
    /// Create a layout, rejecting duplicates and out-of-range qubits
    pub fn new(virtual_to_physical: Vec<usize>, num_physical: usize) -> Result<Self> {
        for (v, &p) in virtual_to_physical.iter().enumerate() {
            if p >= num_physical {
                return Err(ChshError::QubitCountMismatch {
                    circuit: p + 1,
                    backend: num_physical,
                });
            }
            if virtual_to_physical[..v].contains(&p) {
                return Err(ChshError::InvalidCircuit(format!(
                    "Physical qubit {} assigned twice",
                    p
                )));
            }
        }

        Ok(Self {
            virtual_to_physical,
            num_physical,
        })
    }

    /// Identity layout
    pub fn trivial(n_qubits: usize) -> Self {
        Self {
            virtual_to_physical: (0..n_qubits).collect(),
            num_physical: n_qubits,
        }
    }

    /// Physical qubit for a virtual qubit
    pub fn physical(&self, virtual_qubit: usize) -> Option<usize> {
        self.virtual_to_physical.get(virtual_qubit).copied()
    }

    /// Number of virtual qubits
    pub fn num_virtual(&self) -> usize {
        self.virtual_to_physical.len()
    }

    /// Width of the physical register
    pub fn num_physical(&self) -> usize {
        self.num_physical
    }

    /// Physical qubits in virtual order
    pub fn physical_qubits(&self) -> &[usize] {
        &self.virtual_to_physical
    }
}

/// A circuit in a backend's native instruction set, with its layout
#[derive(Debug, Clone)]
pub struct IsaCircuit {
    /// Physical-register circuit
    pub circuit: Circuit,

    /// Layout chosen for the logical qubits
    pub layout: Layout,

    /// Backend the circuit was compiled for
    pub backend: String,
}

/// Converts logical circuits into ISA circuits
pub trait Transpiler {
    /// Compile `circuit` for `target`
    fn run(&self, circuit: &Circuit, target: &Target) -> Result<IsaCircuit>;
}

/// Basis translation onto a single coupled pair
#[derive(Debug, Clone, Default)]
pub struct BasisTranslator {
    /// 0 disables rz merging; 1 and above merge and drop trivial rotations
    optimization_level: u8,

    /// Fixed physical placement, in virtual order
    initial_layout: Option<Vec<usize>>,
}

impl BasisTranslator {
    /// Create translator
    pub fn new(optimization_level: u8) -> Self {
        Self {
            optimization_level: optimization_level.min(3),
            initial_layout: None,
        }
    }

    /// Pin virtual qubits to physical qubits
    pub fn with_initial_layout(mut self, layout: Vec<usize>) -> Self {
        self.initial_layout = Some(layout);
        self
    }

    fn choose_layout(&self, circuit: &Circuit, target: &Target) -> Result<Layout> {
        if circuit.n_qubits > target.num_qubits {
            return Err(ChshError::QubitCountMismatch {
                circuit: circuit.n_qubits,
                backend: target.num_qubits,
            });
        }

        let pairs: Vec<(usize, usize)> = circuit
            .gates
            .iter()
            .filter(|g| g.gate_type.arity() == 2)
            .map(|g| (g.qubits[0], g.qubits[1]))
            .collect();

        if let Some(initial) = &self.initial_layout {
            if initial.len() != circuit.n_qubits {
                return Err(ChshError::InvalidConfig(format!(
                    "Initial layout has {} entries for a {}-qubit circuit",
                    initial.len(),
                    circuit.n_qubits
                )));
            }
            let layout = Layout::new(initial.clone(), target.num_qubits)?;
            for &(a, b) in &pairs {
                let (pa, pb) = (initial[a], initial[b]);
                if !target.is_coupled(pa, pb) {
                    return Err(ChshError::InvalidConfig(format!(
                        "Physical qubits {} and {} are not coupled on '{}'",
                        pa, pb, target.name
                    )));
                }
            }
            return Ok(layout);
        }

        match circuit.n_qubits {
            1 => Layout::new(vec![0], target.num_qubits),
            2 if pairs.is_empty() => Layout::new(vec![0, 1], target.num_qubits),
            2 => {
                let (c, _) = pairs[0];
                let &(a, b) = target
                    .coupling_map
                    .first()
                    .ok_or_else(|| ChshError::NoCoupledPair(target.name.clone()))?;
                // Orient the first two-qubit gate along the edge
                if c == 0 {
                    Layout::new(vec![a, b], target.num_qubits)
                } else {
                    Layout::new(vec![b, a], target.num_qubits)
                }
            }
            n => Err(ChshError::InvalidCircuit(format!(
                "Automatic layout supports at most 2 qubits, circuit has {}",
                n
            ))),
        }
    }

    fn translate_gate(
        &self,
        gate: &Gate,
        layout: &Layout,
        target: &Target,
        out: &mut Circuit,
    ) -> Result<()> {
        let phys = |v: usize| {
            layout.physical(v).ok_or_else(|| {
                ChshError::InvalidCircuit(format!("Qubit {} missing from layout", v))
            })
        };

        match &gate.gate_type {
            GateType::X => {
                target.require("x")?;
                out.x(phys(gate.qubits[0])?);
            }
            GateType::SX => {
                target.require("sx")?;
                out.sx(phys(gate.qubits[0])?);
            }
            GateType::Rz(a) => {
                target.require("rz")?;
                out.rz(*a, phys(gate.qubits[0])?);
            }
            GateType::H => {
                target.require("rz")?;
                target.require("sx")?;
                emit_h(out, phys(gate.qubits[0])?);
            }
            GateType::Ry(a) => {
                target.require("rz")?;
                target.require("sx")?;
                let q = phys(gate.qubits[0])?;
                out.sx(q).rz(a.shifted(-PI), q).sx(q).rz(Angle::Fixed(PI), q);
            }
            GateType::CX => {
                let (c, t) = (phys(gate.qubits[0])?, phys(gate.qubits[1])?);
                emit_cx(out, target, c, t)?;
            }
            GateType::CZ => {
                let (c, t) = (phys(gate.qubits[0])?, phys(gate.qubits[1])?);
                if target.supports("cz") {
                    require_coupled(target, c, t)?;
                    out.cz(c, t);
                } else {
                    emit_h(out, t);
                    emit_cx(out, target, c, t)?;
                    emit_h(out, t);
                }
            }
            GateType::ECR => {
                let (a, b) = (phys(gate.qubits[0])?, phys(gate.qubits[1])?);
                target.require("ecr")?;
                if !target.has_edge(a, b) {
                    return Err(ChshError::NoCoupledPair(target.name.clone()));
                }
                out.ecr(a, b);
            }
        }

        Ok(())
    }
}

impl Transpiler for BasisTranslator {
    fn run(&self, circuit: &Circuit, target: &Target) -> Result<IsaCircuit> {
        circuit.validate()?;
        if circuit.register != Register::Logical {
            return Err(ChshError::InvalidCircuit(
                "Circuit is already mapped to physical qubits".into(),
            ));
        }

        let layout = self.choose_layout(circuit, target)?;
        let mut isa = Circuit::physical(target.num_qubits, circuit.param_names.clone());

        for gate in &circuit.gates {
            self.translate_gate(gate, &layout, target, &mut isa)?;
        }

        if self.optimization_level > 0 {
            isa = merge_rotations(&isa);
        }

        debug!(
            backend = %target.name,
            layout = ?layout.physical_qubits(),
            depth = isa.depth(),
            gates = isa.gates.len(),
            "transpiled circuit"
        );

        Ok(IsaCircuit {
            circuit: isa,
            layout,
            backend: target.name.clone(),
        })
    }
}

fn require_coupled(target: &Target, a: usize, b: usize) -> Result<()> {
    if target.is_coupled(a, b) {
        Ok(())
    } else {
        Err(ChshError::NoCoupledPair(target.name.clone()))
    }
}

/// H = rz(π/2) · sx · rz(π/2), up to global phase
fn emit_h(out: &mut Circuit, q: usize) {
    out.rz(Angle::Fixed(FRAC_PI_2), q)
        .sx(q)
        .rz(Angle::Fixed(FRAC_PI_2), q);
}

fn emit_cx(out: &mut Circuit, target: &Target, c: usize, t: usize) -> Result<()> {
    require_coupled(target, c, t)?;

    match target.two_qubit_basis()? {
        TwoQubitBasis::Cz => {
            emit_h(out, t);
            out.cz(c, t);
            emit_h(out, t);
        }
        TwoQubitBasis::Cx if target.has_edge(c, t) => {
            out.cx(c, t);
        }
        TwoQubitBasis::Ecr if target.has_edge(c, t) => {
            // CX(c,t) = [rz(π/2)_c ⊗ sx_t] · ECR(c,t) · x_c
            out.x(c).ecr(c, t).rz(Angle::Fixed(FRAC_PI_2), c).sx(t);
        }
        TwoQubitBasis::Cx | TwoQubitBasis::Ecr => {
            // Only the reverse edge exists: conjugate by H on both qubits
            emit_h(out, c);
            emit_h(out, t);
            emit_cx(out, target, t, c)?;
            emit_h(out, c);
            emit_h(out, t);
        }
    }

    Ok(())
}

/// Merge rz gates on the same qubit and drop multiples of 2π
fn merge_rotations(circuit: &Circuit) -> Circuit {
    let mut out = Circuit::physical(circuit.n_qubits, circuit.param_names.clone());
    let mut last_on: Vec<Option<usize>> = vec![None; circuit.n_qubits];

    for gate in &circuit.gates {
        if let (GateType::Rz(angle), &[q]) = (&gate.gate_type, gate.qubits.as_slice()) {
            if let Some(prev) = last_on[q] {
                if let GateType::Rz(prev_angle) = out.gates[prev].gate_type {
                    if let Some(sum) = add_angles(prev_angle, *angle) {
                        out.gates[prev].gate_type = GateType::Rz(sum);
                        continue;
                    }
                }
            }
        }

        out.gates.push(gate.clone());
        // Diagonal gates commute with rz and do not block merging
        if gate.gate_type == GateType::CZ {
            continue;
        }
        let idx = out.gates.len() - 1;
        for &q in &gate.qubits {
            last_on[q] = Some(idx);
        }
    }

    out.gates
        .retain(|g| !matches!(g.gate_type, GateType::Rz(Angle::Fixed(v)) if is_full_turn(v)));
    out
}

fn add_angles(a: Angle, b: Angle) -> Option<Angle> {
    match (a, b) {
        (Angle::Fixed(x), Angle::Fixed(y)) => Some(Angle::Fixed(normalize(x + y))),
        (Angle::Param { index, offset }, Angle::Fixed(y))
        | (Angle::Fixed(y), Angle::Param { index, offset }) => Some(Angle::Param {
            index,
            offset: normalize(offset + y),
        }),
        (Angle::Param { .. }, Angle::Param { .. }) => None,
    }
}

/// Wrap into (-π, π]; rz differs only by global phase across 2π
fn normalize(v: f64) -> f64 {
    let mut r = v.rem_euclid(TAU);
    if r > PI + 1e-12 {
        r -= TAU;
    }
    if r.abs() < 1e-12 {
        0.0
    } else {
        r
    }
}

fn is_full_turn(v: f64) -> bool {
    normalize(v) == 0.0
}

//! Parametrized circuits and OpenQASM 3.0 output
//!
//! Circuits address either logical qubits (`q[i]`) or, once transpiled,
//! physical hardware qubits (`$i`). Rotation angles may reference a
//! symbolic input parameter plus a fixed offset, which is what basis
//! translation produces for `ry(theta)`.

use crate::error::{ChshError, Result};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;

/// Name of the CHSH measurement-angle parameter
pub const THETA: &str = "theta";

/// Rotation angle: a fixed value or `parameter + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Angle {
    /// Fixed angle in radians
    Fixed(f64),

    /// Symbolic parameter (by index) shifted by a fixed offset
    Param { index: usize, offset: f64 },
}

impl Angle {
    /// Angle bound to parameter `index` with no offset
    pub fn param(index: usize) -> Self {
        Angle::Param { index, offset: 0.0 }
    }

    /// Shift the angle by `delta` radians
    pub fn shifted(self, delta: f64) -> Self {
        match self {
            Angle::Fixed(v) => Angle::Fixed(v + delta),
            Angle::Param { index, offset } => Angle::Param {
                index,
                offset: offset + delta,
            },
        }
    }

    /// Evaluate against bound parameter values
    pub fn value(&self, params: &[f64]) -> Result<f64> {
        match *self {
            Angle::Fixed(v) => Ok(v),
            Angle::Param { index, offset } => params
                .get(index)
                .map(|p| p + offset)
                .ok_or_else(|| {
                    ChshError::InvalidParameter(format!("No value bound for parameter {}", index))
                }),
        }
    }

    /// Parameter index, if symbolic
    pub fn param_index(&self) -> Option<usize> {
        match self {
            Angle::Fixed(_) => None,
            Angle::Param { index, .. } => Some(*index),
        }
    }

    fn to_qasm(self, names: &[String]) -> String {
        match self {
            Angle::Fixed(v) => format!("{}", v),
            Angle::Param { index, offset } => {
                let name = &names[index];
                if offset == 0.0 {
                    name.clone()
                } else if offset < 0.0 {
                    format!("{} - {}", name, -offset)
                } else {
                    format!("{} + {}", name, offset)
                }
            }
        }
    }

    fn label(self, names: &[String]) -> String {
        match self {
            Angle::Fixed(v) => format_radians(v),
            Angle::Param { .. } => self.to_qasm(names),
        }
    }
}

/// Format radians as a multiple of pi when it is a simple fraction
fn format_radians(v: f64) -> String {
    for denom in [1.0, 2.0, 4.0] {
        let k = v / PI * denom;
        if (k - k.round()).abs() < 1e-9 && k.round() != 0.0 {
            let k = k.round() as i64;
            let num = match k {
                1 => "π".to_string(),
                -1 => "-π".to_string(),
                _ => format!("{}π", k),
            };
            return if denom == 1.0 {
                num
            } else {
                format!("{}/{}", num, denom as i64)
            };
        }
    }
    format!("{:.3}", v)
}

/// Gate types used by the CHSH circuit and its native translation
#[derive(Debug, Clone, PartialEq)]
pub enum GateType {
    /// Pauli X
    X,

    /// Hadamard
    H,

    /// IBM native sqrt(X)
    SX,

    /// Y rotation
    Ry(Angle),

    /// Z rotation (virtual on IBM hardware)
    Rz(Angle),

    /// Controlled-NOT, qubits are (control, target)
    CX,

    /// Controlled-Z
    CZ,

    /// Echoed cross-resonance, IBM Eagle native
    ECR,
}

impl GateType {
    /// Lower-case instruction name as used by backend basis sets
    pub fn name(&self) -> &'static str {
        match self {
            GateType::X => "x",
            GateType::H => "h",
            GateType::SX => "sx",
            GateType::Ry(_) => "ry",
            GateType::Rz(_) => "rz",
            GateType::CX => "cx",
            GateType::CZ => "cz",
            GateType::ECR => "ecr",
        }
    }

    /// Rotation angle, if any
    pub fn angle(&self) -> Option<Angle> {
        match self {
            GateType::Ry(a) | GateType::Rz(a) => Some(*a),
            _ => None,
        }
    }

    /// Number of qubits the gate acts on
    pub fn arity(&self) -> usize {
        match self {
            GateType::CX | GateType::CZ | GateType::ECR => 2,
            _ => 1,
        }
    }
}

/// A gate in the circuit
#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    /// Gate type
    pub gate_type: GateType,

    /// Target qubit(s)
    pub qubits: Vec<usize>,
}

impl Gate {
    /// Create a single-qubit gate
    pub fn single(gate_type: GateType, qubit: usize) -> Self {
        Self {
            gate_type,
            qubits: vec![qubit],
        }
    }

    /// Create a two-qubit gate
    pub fn two(gate_type: GateType, control: usize, target: usize) -> Self {
        Self {
            gate_type,
            qubits: vec![control, target],
        }
    }

    /// Display label used by the circuit drawers
    pub fn label(&self, param_names: &[String]) -> String {
        match &self.gate_type {
            GateType::X => "X".into(),
            GateType::H => "H".into(),
            GateType::SX => "√X".into(),
            GateType::Ry(a) => format!("Ry({})", a.label(param_names)),
            GateType::Rz(a) => format!("Rz({})", a.label(param_names)),
            GateType::CX => "CX".into(),
            GateType::CZ => "CZ".into(),
            GateType::ECR => "ECR".into(),
        }
    }
}

/// Qubit addressing mode of a circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Virtual qubits `q[i]`
    Logical,

    /// Hardware qubits `$i`
    Physical,
}

/// Circuit representation
#[derive(Debug, Clone, PartialEq)]
pub struct Circuit {
    /// Number of qubits
    pub n_qubits: usize,

    /// Gates in the circuit
    pub gates: Vec<Gate>,

    /// Parameter names, indexed by parameter
    pub param_names: Vec<String>,

    /// Addressing mode
    pub register: Register,
}

impl Circuit {
    /// Create a new logical circuit
    pub fn new(n_qubits: usize) -> Self {
        Self {
            n_qubits,
            gates: Vec::new(),
            param_names: Vec::new(),
            register: Register::Logical,
        }
    }

    /// Create an empty circuit over a physical register
    pub fn physical(n_qubits: usize, param_names: Vec<String>) -> Self {
        Self {
            n_qubits,
            gates: Vec::new(),
            param_names,
            register: Register::Physical,
        }
    }

    /// Declare a symbolic parameter and return its angle
    pub fn parameter(&mut self, name: impl Into<String>) -> Angle {
        self.param_names.push(name.into());
        Angle::param(self.param_names.len() - 1)
    }

    /// Number of free parameters
    pub fn num_parameters(&self) -> usize {
        self.param_names.len()
    }

    /// Add a gate
    pub fn add(&mut self, gate: Gate) -> &mut Self {
        self.gates.push(gate);
        self
    }

    pub fn h(&mut self, qubit: usize) -> &mut Self {
        self.add(Gate::single(GateType::H, qubit))
    }

    pub fn x(&mut self, qubit: usize) -> &mut Self {
        self.add(Gate::single(GateType::X, qubit))
    }

    pub fn sx(&mut self, qubit: usize) -> &mut Self {
        self.add(Gate::single(GateType::SX, qubit))
    }

    pub fn ry(&mut self, angle: Angle, qubit: usize) -> &mut Self {
        self.add(Gate::single(GateType::Ry(angle), qubit))
    }

    pub fn rz(&mut self, angle: Angle, qubit: usize) -> &mut Self {
        self.add(Gate::single(GateType::Rz(angle), qubit))
    }

    pub fn cx(&mut self, control: usize, target: usize) -> &mut Self {
        self.add(Gate::two(GateType::CX, control, target))
    }

    pub fn cz(&mut self, control: usize, target: usize) -> &mut Self {
        self.add(Gate::two(GateType::CZ, control, target))
    }

    pub fn ecr(&mut self, first: usize, second: usize) -> &mut Self {
        self.add(Gate::two(GateType::ECR, first, second))
    }

    /// Qubits touched by at least one gate, ascending
    pub fn active_qubits(&self) -> Vec<usize> {
        let mut used = vec![false; self.n_qubits];
        for gate in &self.gates {
            for &q in &gate.qubits {
                if q < self.n_qubits {
                    used[q] = true;
                }
            }
        }
        (0..self.n_qubits).filter(|&q| used[q]).collect()
    }

    /// Group gate indices into ASAP layers
    pub fn layers(&self) -> Vec<Vec<usize>> {
        let mut qubit_depth = vec![0usize; self.n_qubits];
        let mut layers: Vec<Vec<usize>> = Vec::new();

        for (idx, gate) in self.gates.iter().enumerate() {
            if gate.qubits.iter().any(|&q| q >= self.n_qubits) {
                continue;
            }

            let layer = gate
                .qubits
                .iter()
                .map(|&q| qubit_depth[q])
                .max()
                .unwrap_or(0);

            for &q in &gate.qubits {
                qubit_depth[q] = layer + 1;
            }

            if layers.len() <= layer {
                layers.resize_with(layer + 1, Vec::new);
            }
            layers[layer].push(idx);
        }

        layers
    }

    /// Circuit depth (number of layers)
    pub fn depth(&self) -> usize {
        self.layers().len()
    }

    /// Count of each instruction name
    pub fn count_ops(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for gate in &self.gates {
            *counts.entry(gate.gate_type.name()).or_insert(0) += 1;
        }
        counts
    }

    /// Check qubit indices and parameter references
    pub fn validate(&self) -> Result<()> {
        if self.n_qubits == 0 {
            return Err(ChshError::InvalidCircuit("Circuit has no qubits".into()));
        }

        for gate in &self.gates {
            let arity = gate.gate_type.arity();
            if arity > 0 && gate.qubits.len() != arity {
                return Err(ChshError::InvalidCircuit(format!(
                    "Gate '{}' expects {} qubits, got {}",
                    gate.gate_type.name(),
                    arity,
                    gate.qubits.len()
                )));
            }

            for &qubit in &gate.qubits {
                if qubit >= self.n_qubits {
                    return Err(ChshError::InvalidCircuit(format!(
                        "Qubit index {} out of range (circuit has {} qubits)",
                        qubit, self.n_qubits
                    )));
                }
            }

            if arity == 2 && gate.qubits[0] == gate.qubits[1] {
                return Err(ChshError::InvalidCircuit(format!(
                    "Gate '{}' uses qubit {} as both control and target",
                    gate.gate_type.name(),
                    gate.qubits[0]
                )));
            }

            if let Some(index) = gate.gate_type.angle().and_then(|a| a.param_index()) {
                if index >= self.num_parameters() {
                    return Err(ChshError::InvalidCircuit(format!(
                        "Gate references undeclared parameter {}",
                        index
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check one parameter binding against the circuit
    pub fn validate_binding(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.num_parameters() {
            return Err(ChshError::InvalidParameter(format!(
                "Parameter count mismatch: circuit has {} parameters, got {}",
                self.num_parameters(),
                params.len()
            )));
        }

        for (i, &p) in params.iter().enumerate() {
            if !p.is_finite() {
                return Err(ChshError::InvalidParameter(format!(
                    "Parameter {} is not finite: {}",
                    i, p
                )));
            }
        }

        Ok(())
    }

    /// Substitute parameter values, producing a parameter-free circuit
    pub fn bind(&self, params: &[f64]) -> Result<Circuit> {
        self.validate_binding(params)?;

        let mut bound = Circuit {
            n_qubits: self.n_qubits,
            gates: Vec::with_capacity(self.gates.len()),
            param_names: Vec::new(),
            register: self.register,
        };

        for gate in &self.gates {
            let gate_type = match &gate.gate_type {
                GateType::Ry(a) => GateType::Ry(Angle::Fixed(a.value(params)?)),
                GateType::Rz(a) => GateType::Rz(Angle::Fixed(a.value(params)?)),
                other => other.clone(),
            };
            bound.gates.push(Gate {
                gate_type,
                qubits: gate.qubits.clone(),
            });
        }

        Ok(bound)
    }

    /// Serialize to OpenQASM 3.0 with symbolic parameters as inputs
    pub fn to_qasm(&self) -> Result<String> {
        self.validate()?;

        let mut builder = QASMBuilder::new(self.n_qubits, self.register);
        for name in &self.param_names {
            builder.add_input(name);
        }
        if self.gates.iter().any(|g| g.gate_type == GateType::ECR) {
            builder.add_definition(ECR_DEFINITION);
        }

        for gate in &self.gates {
            builder.add_instruction(GateMapper::to_qasm(gate, self.register, &self.param_names));
        }

        Ok(builder.build())
    }

    /// Wire label: `q0` for logical qubits, `$13` for hardware qubits
    pub fn wire_name(&self, qubit: usize) -> String {
        match self.register {
            Register::Logical => format!("q{}", qubit),
            Register::Physical => format!("${}", qubit),
        }
    }

    /// Plain-text drawing, one row per active qubit
    pub fn draw_text(&self) -> String {
        let wires = self.active_qubits();
        let width = wires
            .iter()
            .map(|&q| self.wire_name(q).len())
            .max()
            .unwrap_or(0);

        let mut rows: Vec<String> = wires
            .iter()
            .map(|&q| format!("{:>w$}: ─", self.wire_name(q), w = width))
            .collect();

        for layer in self.layers() {
            let mut cells = vec![String::new(); wires.len()];
            for &idx in &layer {
                let gate = &self.gates[idx];
                let row_of = |q: usize| wires.iter().position(|&w| w == q);
                match (&gate.gate_type, gate.qubits.as_slice()) {
                    (GateType::CX, &[c, t]) => {
                        if let (Some(rc), Some(rt)) = (row_of(c), row_of(t)) {
                            cells[rc] = "■".into();
                            cells[rt] = "⊕".into();
                        }
                    }
                    (GateType::CZ, &[c, t]) => {
                        if let (Some(rc), Some(rt)) = (row_of(c), row_of(t)) {
                            cells[rc] = "■".into();
                            cells[rt] = "■".into();
                        }
                    }
                    (GateType::ECR, &[a, b]) => {
                        if let (Some(ra), Some(rb)) = (row_of(a), row_of(b)) {
                            cells[ra] = "[ECR0]".into();
                            cells[rb] = "[ECR1]".into();
                        }
                    }
                    (_, &[q]) => {
                        if let Some(r) = row_of(q) {
                            cells[r] = format!("[{}]", gate.label(&self.param_names));
                        }
                    }
                    _ => {}
                }
            }

            let col = cells.iter().map(|c| c.chars().count()).max().unwrap_or(0);
            for (row, cell) in rows.iter_mut().zip(cells) {
                let pad = col - cell.chars().count();
                row.push_str(&cell);
                row.push_str(&"─".repeat(pad + 1));
            }
        }

        rows.join("\n")
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.draw_text())
    }
}

/// Gate mapper for QASM output
pub struct GateMapper;

impl GateMapper {
    /// Map a gate to a QASM instruction
    pub fn to_qasm(gate: &Gate, register: Register, param_names: &[String]) -> String {
        let q = |i: usize| match register {
            Register::Logical => format!("q[{}]", gate.qubits[i]),
            Register::Physical => format!("${}", gate.qubits[i]),
        };

        match &gate.gate_type {
            GateType::X => format!("x {};", q(0)),
            GateType::H => format!("h {};", q(0)),
            GateType::SX => format!("sx {};", q(0)),
            GateType::Ry(a) => format!("ry({}) {};", a.to_qasm(param_names), q(0)),
            GateType::Rz(a) => format!("rz({}) {};", a.to_qasm(param_names), q(0)),
            GateType::CX => format!("cx {}, {};", q(0), q(1)),
            GateType::CZ => format!("cz {}, {};", q(0), q(1)),
            GateType::ECR => format!("ecr {}, {};", q(0), q(1)),
        }
    }
}

/// `ecr` is not part of `stdgates.inc`; Qiskit's definition via `rzx`
pub const ECR_DEFINITION: &str = "gate rzx(theta) a, b { h b; cx a, b; rz(theta) b; cx a, b; h b; }
gate ecr a, b { rzx(pi/4) a, b; x a; rzx(-pi/4) a, b; }";

/// QASM Builder for constructing QASM output
pub struct QASMBuilder {
    /// Number of qubits
    n_qubits: usize,

    /// Addressing mode
    register: Register,

    /// Gate definitions beyond the standard library
    definitions: Vec<String>,

    /// Input parameter declarations
    inputs: Vec<String>,

    /// Gate instructions
    instructions: Vec<String>,
}

impl QASMBuilder {
    /// Create new QASM builder
    pub fn new(n_qubits: usize, register: Register) -> Self {
        Self {
            n_qubits,
            register,
            definitions: Vec::new(),
            inputs: Vec::new(),
            instructions: Vec::new(),
        }
    }

    /// Add a `gate` definition emitted after the includes
    pub fn add_definition(&mut self, definition: &str) {
        self.definitions.push(definition.to_string());
    }

    /// Declare a floating-point input parameter
    pub fn add_input(&mut self, name: &str) {
        self.inputs.push(format!("input float[64] {};", name));
    }

    /// Add an instruction
    pub fn add_instruction(&mut self, instruction: String) {
        self.instructions.push(instruction);
    }

    /// Build QASM string
    pub fn build(self) -> String {
        let mut lines = vec![
            "OPENQASM 3.0;".to_string(),
            "include \"stdgates.inc\";".to_string(),
        ];

        lines.extend(self.definitions);
        lines.extend(self.inputs);

        // Hardware qubits are implicitly declared
        if self.register == Register::Logical {
            lines.push(format!("qubit[{}] q;", self.n_qubits));
        }

        lines.extend(self.instructions);
        lines.push(String::new());
        lines.join("\n")
    }
}

/// Build the CHSH circuit: H(0), CX(0→1), Ry(theta) on qubit 0
pub fn chsh_circuit() -> Circuit {
    let mut circuit = Circuit::new(2);
    let theta = circuit.parameter(THETA);
    circuit.h(0).cx(0, 1).ry(theta, 0);
    circuit
}

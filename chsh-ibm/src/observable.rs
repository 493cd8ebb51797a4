//! Pauli-sum observables
//!
//! Labels follow the IBM convention: the rightmost character acts on
//! qubit 0, so `"ZX"` is X on qubit 0 and Z on qubit 1.
//!
//! ## CHSH witnesses
//!
//! | term | CHSH1 | CHSH2 |
//! |------|-------|-------|
//! | ZZ   | +1    | +1    |
//! | ZX   | −1    | +1    |
//! | XZ   | +1    | −1    |
//! | XX   | +1    | +1    |

use crate::error::{ChshError, Result};
use crate::transpiler::Layout;

/// A weighted sum of Pauli strings
#[derive(Debug, Clone, PartialEq)]
pub struct SparsePauliOp {
    /// (label, coefficient) in insertion order
    terms: Vec<(String, f64)>,

    /// Label length
    num_qubits: usize,
}

impl SparsePauliOp {
    /// Build from `(label, coefficient)` pairs
    ///
    /// Labels must be non-empty, of equal length, and use only `I`, `X`,
    /// `Y`, `Z`. Lower-case input is accepted.
    pub fn from_list<S: AsRef<str>>(terms: &[(S, f64)]) -> Result<Self> {
        let first = terms
            .first()
            .ok_or_else(|| ChshError::InvalidObservable("Observable has no terms".into()))?;
        let num_qubits = first.0.as_ref().len();
        if num_qubits == 0 {
            return Err(ChshError::InvalidObservable("Empty Pauli label".into()));
        }

        let mut parsed = Vec::with_capacity(terms.len());
        for (label, coeff) in terms {
            let label = label.as_ref().to_uppercase();
            if label.len() != num_qubits {
                return Err(ChshError::InvalidObservable(format!(
                    "Label '{}' has {} qubits, expected {}",
                    label,
                    label.len(),
                    num_qubits
                )));
            }
            if let Some(c) = label.chars().find(|c| !matches!(c, 'I' | 'X' | 'Y' | 'Z')) {
                return Err(ChshError::InvalidObservable(format!(
                    "Invalid Pauli character '{}' in '{}'",
                    c, label
                )));
            }
            if !coeff.is_finite() {
                return Err(ChshError::InvalidObservable(format!(
                    "Coefficient of '{}' is not finite",
                    label
                )));
            }
            parsed.push((label, *coeff));
        }

        Ok(Self {
            terms: parsed,
            num_qubits,
        })
    }

    /// CHSH witness with the ZX term negated
    pub fn chsh1() -> Self {
        Self::fixed(&[("ZZ", 1.0), ("ZX", -1.0), ("XZ", 1.0), ("XX", 1.0)])
    }

    /// CHSH witness with the XZ term negated
    pub fn chsh2() -> Self {
        Self::fixed(&[("ZZ", 1.0), ("ZX", 1.0), ("XZ", -1.0), ("XX", 1.0)])
    }

    fn fixed(terms: &[(&str, f64)]) -> Self {
        Self {
            terms: terms.iter().map(|(l, c)| (l.to_string(), *c)).collect(),
            num_qubits: 2,
        }
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Terms in insertion order
    pub fn terms(&self) -> &[(String, f64)] {
        &self.terms
    }

    /// Pauli labels in insertion order
    pub fn labels(&self) -> Vec<&str> {
        self.terms.iter().map(|(l, _)| l.as_str()).collect()
    }

    /// Coefficients in insertion order
    pub fn coefficients(&self) -> Vec<f64> {
        self.terms.iter().map(|(_, c)| *c).collect()
    }

    /// Summed coefficient of a label, if present
    pub fn coefficient(&self, label: &str) -> Option<f64> {
        let label = label.to_uppercase();
        let mut found = None;
        for (l, c) in &self.terms {
            if *l == label {
                *found.get_or_insert(0.0) += c;
            }
        }
        found
    }

    /// Pauli character acting on `qubit`
    pub fn pauli_on(label: &str, qubit: usize) -> Option<char> {
        let n = label.len();
        if qubit >= n {
            return None;
        }
        label.chars().nth(n - 1 - qubit)
    }

    /// Expand onto the physical register of a layout
    ///
    /// Virtual qubit `v` moves to physical qubit `layout.physical(v)`;
    /// every other position becomes `I`.
    pub fn apply_layout(&self, layout: &Layout) -> Result<Self> {
        if layout.num_virtual() != self.num_qubits {
            return Err(ChshError::InvalidObservable(format!(
                "Layout maps {} qubits, observable has {}",
                layout.num_virtual(),
                self.num_qubits
            )));
        }

        let width = layout.num_physical();
        let terms = self
            .terms
            .iter()
            .map(|(label, coeff)| {
                let mut expanded = vec!['I'; width];
                for (v, pauli) in label.chars().rev().enumerate() {
                    // Layout construction guarantees p < width
                    if let Some(p) = layout.physical(v) {
                        expanded[width - 1 - p] = pauli;
                    }
                }
                (expanded.into_iter().collect(), *coeff)
            })
            .collect();

        Ok(Self {
            terms,
            num_qubits: width,
        })
    }

    /// Convert to IBM Estimator format: `{"label": coefficient, ...}`
    pub fn to_ibm_format(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (label, coeff) in &self.terms {
            let entry = map.entry(label.clone()).or_insert(serde_json::json!(0.0));
            let sum = entry.as_f64().unwrap_or(0.0) + coeff;
            *entry = serde_json::json!(sum);
        }
        serde_json::Value::Object(map)
    }
}

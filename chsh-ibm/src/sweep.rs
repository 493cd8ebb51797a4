//! Phase sweep over the measurement angle

use crate::error::{ChshError, Result};
use std::f64::consts::{PI, TAU};

/// Ordered, evenly spaced angle values over a closed interval
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSweep {
    values: Vec<f64>,
}

impl PhaseSweep {
    /// `n` evenly spaced values from `start` to `end` inclusive
    ///
    /// The last value is exactly `end`.
    pub fn linspace(start: f64, end: f64, n: usize) -> Result<Self> {
        if n < 2 {
            return Err(ChshError::InvalidSweepSize(n));
        }
        if !start.is_finite() || !end.is_finite() || end <= start {
            return Err(ChshError::InvalidParameter(format!(
                "Sweep interval [{}, {}] is empty or not finite",
                start, end
            )));
        }

        let step = (end - start) / (n - 1) as f64;
        let mut values: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
        values[n - 1] = end;

        Ok(Self { values })
    }

    /// `n` values over [0, 2π]
    pub fn full_turn(n: usize) -> Result<Self> {
        Self::linspace(0.0, TAU, n)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// One single-parameter binding per point
    pub fn bindings(&self) -> Vec<Vec<f64>> {
        self.values.iter().map(|&v| vec![v]).collect()
    }

    /// Values divided by π, for axis labelling
    pub fn in_units_of_pi(&self) -> Vec<f64> {
        self.values.iter().map(|v| v / PI).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_sweep() {
        let sweep = PhaseSweep::full_turn(21).unwrap();

        assert_eq!(sweep.len(), 21);
        assert_eq!(sweep.values()[0], 0.0);
        assert_eq!(sweep.values()[20], TAU);
        assert!((sweep.values()[10] - PI).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_degenerate_sizes() {
        assert!(matches!(
            PhaseSweep::full_turn(0),
            Err(ChshError::InvalidSweepSize(0))
        ));
        assert!(matches!(
            PhaseSweep::full_turn(1),
            Err(ChshError::InvalidSweepSize(1))
        ));
    }

    #[test]
    fn test_rejects_empty_interval() {
        assert!(PhaseSweep::linspace(1.0, 1.0, 5).is_err());
        assert!(PhaseSweep::linspace(0.0, f64::NAN, 5).is_err());
    }

    #[test]
    fn test_bindings_shape() {
        let sweep = PhaseSweep::full_turn(5).unwrap();
        let bindings = sweep.bindings();

        assert_eq!(bindings.len(), 5);
        assert!(bindings.iter().all(|b| b.len() == 1));
        assert_eq!(bindings[4][0], TAU);
    }

    #[test]
    fn test_units_of_pi() {
        let sweep = PhaseSweep::full_turn(5).unwrap();
        let units = sweep.in_units_of_pi();
        let expected = [0.0, 0.5, 1.0, 1.5, 2.0];
        for (u, e) in units.iter().zip(expected) {
            assert!((u - e).abs() < 1e-12);
        }
    }

    proptest! {
        #[test]
        fn full_turn_endpoints_and_order(n in 2usize..500) {
            let sweep = PhaseSweep::full_turn(n).unwrap();
            let values = sweep.values();

            prop_assert_eq!(values.len(), n);
            prop_assert_eq!(values[0], 0.0);
            prop_assert_eq!(values[n - 1], TAU);
            prop_assert!(values.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn full_turn_even_spacing(n in 2usize..200) {
            let sweep = PhaseSweep::full_turn(n).unwrap();
            let step = TAU / (n - 1) as f64;

            for (i, v) in sweep.values().iter().enumerate() {
                prop_assert!((v - i as f64 * step).abs() < 1e-9);
            }
        }
    }
}

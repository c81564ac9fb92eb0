//! The factor abstraction and the generic prior factor.

use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::key::Key;

/// Relative step used for central-difference Jacobians.
const DIFF_STEP: f64 = 1e-6;

/// One equation block of a factor graph.
///
/// `residual` receives the current values of `keys()` in the same order and
/// returns the unwhitened error vector of length `dim()`. A zero residual
/// means the equation holds exactly.
pub trait Factor: fmt::Debug + Send + Sync {
    fn keys(&self) -> &[Key];

    fn dim(&self) -> usize;

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64>;

    /// Isotropic noise scale; the whitened residual is `residual / sigma`.
    fn sigma(&self) -> f64 {
        1.0
    }

    /// The pinned key and value when this factor is a prior.
    fn prior(&self) -> Option<(Key, &DVector<f64>)> {
        None
    }

    /// Jacobian blocks of the residual, one per key.
    fn jacobians(&self, x: &[&DVector<f64>]) -> Vec<DMatrix<f64>> {
        numerical_jacobians(self, x)
    }
}

/// Central-difference Jacobians of `factor` evaluated at `x`.
pub fn numerical_jacobians<F: Factor + ?Sized>(factor: &F, x: &[&DVector<f64>]) -> Vec<DMatrix<f64>> {
    let mut owned: Vec<DVector<f64>> = x.iter().map(|v| (*v).clone()).collect();
    let rows = factor.dim();
    let mut blocks = Vec::with_capacity(owned.len());
    for block in 0..owned.len() {
        let cols = owned[block].len();
        let mut jacobian = DMatrix::zeros(rows, cols);
        for col in 0..cols {
            let original = owned[block][col];
            let h = DIFF_STEP * (1.0 + original.abs());
            owned[block][col] = original + h;
            let plus = factor.residual(&owned.iter().collect::<Vec<_>>());
            owned[block][col] = original - h;
            let minus = factor.residual(&owned.iter().collect::<Vec<_>>());
            owned[block][col] = original;
            jacobian.set_column(col, &((plus - minus) / (2.0 * h)));
        }
        blocks.push(jacobian);
    }
    blocks
}

/// Pins one variable to a known value.
#[derive(Debug, Clone)]
pub struct PriorFactor {
    keys: [Key; 1],
    value: DVector<f64>,
    sigma: f64,
}

impl PriorFactor {
    pub fn new(key: Key, value: DVector<f64>, sigma: f64) -> Self {
        assert_eq!(value.len(), key.dim(), "prior value for {key} has wrong dimension");
        Self {
            keys: [key],
            value,
            sigma,
        }
    }

    pub fn scalar(key: Key, value: f64, sigma: f64) -> Self {
        Self::new(key, DVector::from_element(1, value), sigma)
    }

    pub fn key(&self) -> Key {
        self.keys[0]
    }

    pub fn value(&self) -> &DVector<f64> {
        &self.value
    }
}

impl Factor for PriorFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        self.value.len()
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        x[0] - &self.value
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }

    fn prior(&self) -> Option<(Key, &DVector<f64>)> {
        Some((self.keys[0], &self.value))
    }

    fn jacobians(&self, _x: &[&DVector<f64>]) -> Vec<DMatrix<f64>> {
        vec![DMatrix::identity(self.value.len(), self.value.len())]
    }
}

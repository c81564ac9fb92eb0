//! Factor graphs: collections of shared factors with evaluation and linearization.

use std::collections::BTreeSet;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::factor::{Factor, PriorFactor};
use crate::key::Key;
use crate::structure::{self, ConfigurationError, StructureReport};
use crate::values::{Ordering, Values, ValuesError};

/// Whitened Jacobian and residual stacked over every factor of a graph.
#[derive(Debug, Clone)]
pub struct Linearization {
    pub jacobian: DMatrix<f64>,
    pub residual: DVector<f64>,
}

/// An immutable-by-sharing collection of factors.
#[derive(Debug, Clone, Default)]
pub struct FactorGraph {
    factors: Vec<Arc<dyn Factor>>,
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F: Factor + 'static>(&mut self, factor: F) {
        self.factors.push(Arc::new(factor));
    }

    pub fn add_shared(&mut self, factor: Arc<dyn Factor>) {
        self.factors.push(factor);
    }

    /// Append every factor of `other`.
    pub fn append(&mut self, other: FactorGraph) {
        self.factors.extend(other.factors);
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Factor>> {
        self.factors.iter()
    }

    /// Every key referenced by at least one factor.
    pub fn keys(&self) -> BTreeSet<Key> {
        self.factors
            .iter()
            .flat_map(|factor| factor.keys().iter().copied())
            .collect()
    }

    /// Total number of scalar residual rows.
    pub fn residual_dim(&self) -> usize {
        self.factors.iter().map(|factor| factor.dim()).sum()
    }

    /// Sum of `0.5 · |r / σ|²` over all factors.
    pub fn error(&self, values: &Values) -> Result<f64, ValuesError> {
        let mut total = 0.0;
        for factor in &self.factors {
            let x = gather(factor.as_ref(), values)?;
            let r = factor.residual(&x) / factor.sigma();
            total += 0.5 * r.norm_squared();
        }
        Ok(total)
    }

    /// Largest absolute unwhitened residual component.
    pub fn max_residual(&self, values: &Values) -> Result<f64, ValuesError> {
        let mut max = 0.0_f64;
        for factor in &self.factors {
            let x = gather(factor.as_ref(), values)?;
            max = max.max(factor.residual(&x).amax());
        }
        Ok(max)
    }

    /// Stack the whitened residuals and Jacobians in the column layout of `ordering`.
    ///
    /// Keys missing from `ordering` are treated as constants.
    pub fn linearize(&self, values: &Values, ordering: &Ordering) -> Result<Linearization, ValuesError> {
        let rows = self.residual_dim();
        let mut jacobian = DMatrix::zeros(rows, ordering.dim());
        let mut residual = DVector::zeros(rows);
        let mut row = 0;
        for factor in &self.factors {
            let x = gather(factor.as_ref(), values)?;
            let inv_sigma = 1.0 / factor.sigma();
            let dim = factor.dim();
            residual
                .rows_mut(row, dim)
                .copy_from(&(factor.residual(&x) * inv_sigma));
            let blocks = factor.jacobians(&x);
            for (key, block) in factor.keys().iter().zip(blocks) {
                if let Some(col) = ordering.offset(key) {
                    let mut target = jacobian.view_mut((row, col), (dim, key.dim()));
                    target += block * inv_sigma;
                }
            }
            row += dim;
        }
        Ok(Linearization { jacobian, residual })
    }

    /// Check that the graph determines its unknowns and that priors agree.
    pub fn check_structure(&self) -> Result<StructureReport, ConfigurationError> {
        structure::check(self)
    }

    /// Prior factors pinning `keys` to their entries in `values`.
    pub fn priors_from<'a>(
        values: &Values,
        keys: impl IntoIterator<Item = &'a Key>,
        sigma: f64,
    ) -> Result<FactorGraph, ValuesError> {
        let mut graph = FactorGraph::new();
        for key in keys {
            graph.add(PriorFactor::new(*key, values.try_get(key)?.clone(), sigma));
        }
        Ok(graph)
    }
}

impl FromIterator<Arc<dyn Factor>> for FactorGraph {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Factor>>>(iter: I) -> Self {
        Self {
            factors: iter.into_iter().collect(),
        }
    }
}

fn gather<'a>(factor: &dyn Factor, values: &'a Values) -> Result<Vec<&'a DVector<f64>>, ValuesError> {
    factor.keys().iter().map(|key| values.try_get(key)).collect()
}

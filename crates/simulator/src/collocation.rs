//! Collocation factors relating a state at step k+1 to its value and derivative at step k.

use jrsim_graph::{Factor, Key};
use nalgebra::DVector;

/// Discretization of `ẋ = f` across one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollocationScheme {
    /// `x₁ = x₀ + dt·ẋ₀`
    #[default]
    Euler,
    /// `x₁ = x₀ + dt·(ẋ₀ + ẋ₁)/2`
    Trapezoidal,
}

impl CollocationScheme {
    pub fn label(self) -> &'static str {
        match self {
            CollocationScheme::Euler => "euler",
            CollocationScheme::Trapezoidal => "trapezoidal",
        }
    }
}

/// Length of one collocation interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepDuration {
    Fixed(f64),
    /// Solved for; shared by every interval of a phase.
    Variable(Key),
}

/// One term `weight · ẋ` of the derivative, with its keys at both interval ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivativeTerm {
    pub start: Key,
    pub end: Key,
    pub weight: f64,
}

impl DerivativeTerm {
    pub fn new(start: Key, end: Key) -> Self {
        Self {
            start,
            end,
            weight: 1.0,
        }
    }

    pub fn weighted(start: Key, end: Key, weight: f64) -> Self {
        Self { start, end, weight }
    }
}

/// `x₁ − x₀ − dt·Σ wᵢ·ẋᵢ = 0` under the chosen scheme.
///
/// Key layout: `x₀`, `x₁`, the start key of every term, then (trapezoidal only)
/// the end key of every term, then the duration key when it is solved for.
#[derive(Debug, Clone)]
pub struct CollocationFactor {
    keys: Vec<Key>,
    weights: Vec<f64>,
    scheme: CollocationScheme,
    fixed_dt: Option<f64>,
    dim: usize,
    sigma: f64,
}

impl CollocationFactor {
    pub fn new(
        start: Key,
        end: Key,
        terms: &[DerivativeTerm],
        scheme: CollocationScheme,
        duration: StepDuration,
        sigma: f64,
    ) -> Self {
        debug_assert!(terms.iter().all(|term| term.start.dim() == start.dim()));
        let mut keys = vec![start, end];
        keys.extend(terms.iter().map(|term| term.start));
        if scheme == CollocationScheme::Trapezoidal {
            keys.extend(terms.iter().map(|term| term.end));
        }
        let fixed_dt = match duration {
            StepDuration::Fixed(dt) => Some(dt),
            StepDuration::Variable(key) => {
                keys.push(key);
                None
            }
        };
        Self {
            keys,
            weights: terms.iter().map(|term| term.weight).collect(),
            scheme,
            fixed_dt,
            dim: start.dim(),
            sigma,
        }
    }

    /// `x₁ = x₀ + dt`, the collocation of the time variable.
    pub fn time(k: usize, scheme: CollocationScheme, duration: StepDuration, sigma: f64) -> Self {
        Self::new(Key::time(k), Key::time(k + 1), &[], scheme, duration, sigma)
    }
}

impl Factor for CollocationFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        let n = self.weights.len();
        let dt = self.fixed_dt.unwrap_or_else(|| x[x.len() - 1][0]);

        let mut rate = DVector::zeros(self.dim);
        if self.weights.is_empty() {
            // A bare clock advances at unit rate.
            rate.fill(1.0);
        }
        for (i, weight) in self.weights.iter().enumerate() {
            match self.scheme {
                CollocationScheme::Euler => rate += x[2 + i] * *weight,
                CollocationScheme::Trapezoidal => rate += (x[2 + i] + x[2 + n + i]) * (0.5 * weight),
            }
        }
        x[1] - x[0] - rate * dt
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

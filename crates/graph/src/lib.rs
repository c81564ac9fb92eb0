//! Factor-graph primitives: keys, value stores, factors, and structural checks.

pub mod factor;
pub mod graph;
pub mod key;
pub mod structure;
pub mod values;

pub use factor::{Factor, PriorFactor, numerical_jacobians};
pub use graph::{FactorGraph, Linearization};
pub use key::{Key, VarKind};
pub use structure::{ConfigurationError, StructureReport};
pub use values::{Ordering, Values, ValuesError};

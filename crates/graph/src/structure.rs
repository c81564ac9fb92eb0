//! Structural well-posedness checks run before a graph is handed to a solver.
//!
//! A graph determines its unknowns only if every scalar unknown can be matched
//! to a distinct scalar residual row that depends on it. The check computes a
//! maximum bipartite matching between rows and unknown columns; unmatched
//! columns mark the variables left free. Prior factors on the same key must
//! also agree with each other.

use std::collections::BTreeMap;

use nalgebra::DVector;
use thiserror::Error;

use crate::graph::FactorGraph;
use crate::key::Key;
use crate::values::Ordering;

/// Tolerance under which two priors on the same key count as identical.
const PRIOR_AGREEMENT_TOL: f64 = 1e-9;

/// Structural defects of a factor graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error(
        "graph is under-constrained: {matched} of {unknowns} unknown scalars are determined; free variables include {}",
        format_keys(.free)
    )]
    UnderConstrained {
        unknowns: usize,
        matched: usize,
        free: Vec<Key>,
    },
    #[error("conflicting priors on {key}: {first:?} vs {second:?}")]
    ConflictingPriors {
        key: Key,
        first: Vec<f64>,
        second: Vec<f64>,
    },
}

/// Summary of a successful structural check.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureReport {
    /// Scalar unknowns.
    pub unknowns: usize,
    /// Scalar residual rows.
    pub equations: usize,
}

impl StructureReport {
    /// Rows beyond what is needed to fix the unknowns.
    pub fn redundancy(&self) -> usize {
        self.equations - self.unknowns
    }
}

pub(crate) fn check(graph: &FactorGraph) -> Result<StructureReport, ConfigurationError> {
    check_priors(graph)?;

    let ordering = Ordering::new(graph.keys());
    let unknowns = ordering.dim();
    let mut rows: Vec<Vec<usize>> = Vec::with_capacity(graph.residual_dim());
    for factor in graph.iter() {
        let mut columns = Vec::new();
        for key in factor.keys() {
            if let Some(offset) = ordering.offset(key) {
                columns.extend(offset..offset + key.dim());
            }
        }
        for _ in 0..factor.dim() {
            rows.push(columns.clone());
        }
    }

    let mut column_rows: Vec<Vec<usize>> = vec![Vec::new(); unknowns];
    for (row, columns) in rows.iter().enumerate() {
        for &column in columns {
            column_rows[column].push(row);
        }
    }

    let matching = maximum_matching(&column_rows, rows.len());
    let matched = matching.iter().filter(|row| row.is_some()).count();
    if matched < unknowns {
        let mut free: Vec<Key> = matching
            .iter()
            .enumerate()
            .filter(|(_, row)| row.is_none())
            .filter_map(|(column, _)| ordering.key_of_column(column))
            .collect();
        free.dedup();
        return Err(ConfigurationError::UnderConstrained {
            unknowns,
            matched,
            free,
        });
    }

    Ok(StructureReport {
        unknowns,
        equations: rows.len(),
    })
}

fn check_priors(graph: &FactorGraph) -> Result<(), ConfigurationError> {
    let mut seen: BTreeMap<Key, &DVector<f64>> = BTreeMap::new();
    for factor in graph.iter() {
        let Some((key, value)) = factor.prior() else {
            continue;
        };
        if let Some(first) = seen.get(&key) {
            let scale = 1.0 + first.amax().max(value.amax());
            if (*first - value).amax() > PRIOR_AGREEMENT_TOL * scale {
                return Err(ConfigurationError::ConflictingPriors {
                    key,
                    first: first.iter().copied().collect(),
                    second: value.iter().copied().collect(),
                });
            }
        } else {
            seen.insert(key, value);
        }
    }
    Ok(())
}

/// Kuhn's augmenting-path matching of columns onto rows.
///
/// Returns, for every column, the row it is matched to.
fn maximum_matching(column_rows: &[Vec<usize>], num_rows: usize) -> Vec<Option<usize>> {
    let mut row_owner: Vec<Option<usize>> = vec![None; num_rows];
    let mut column_match: Vec<Option<usize>> = vec![None; column_rows.len()];

    // Greedy pass first; most columns match without search.
    for (column, candidates) in column_rows.iter().enumerate() {
        if let Some(&row) = candidates.iter().find(|&&row| row_owner[row].is_none()) {
            row_owner[row] = Some(column);
            column_match[column] = Some(row);
        }
    }

    let mut visited = vec![usize::MAX; num_rows];
    for column in 0..column_rows.len() {
        if column_match[column].is_none() {
            augment(
                column,
                column,
                column_rows,
                &mut row_owner,
                &mut column_match,
                &mut visited,
            );
        }
    }
    column_match
}

fn augment(
    column: usize,
    stamp: usize,
    column_rows: &[Vec<usize>],
    row_owner: &mut [Option<usize>],
    column_match: &mut [Option<usize>],
    visited: &mut [usize],
) -> bool {
    for &row in &column_rows[column] {
        if visited[row] == stamp {
            continue;
        }
        visited[row] = stamp;
        let free = match row_owner[row] {
            None => true,
            Some(owner) => augment(owner, stamp, column_rows, row_owner, column_match, visited),
        };
        if free {
            row_owner[row] = Some(column);
            column_match[column] = Some(row);
            return true;
        }
    }
    false
}

fn format_keys(keys: &[Key]) -> String {
    keys.iter()
        .take(8)
        .map(|key| key.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::{Factor, PriorFactor};
    use nalgebra::DVector;

    #[derive(Debug)]
    struct Difference {
        keys: [Key; 2],
    }

    impl Factor for Difference {
        fn keys(&self) -> &[Key] {
            &self.keys
        }

        fn dim(&self) -> usize {
            1
        }

        fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
            DVector::from_element(1, x[1][0] - x[0][0])
        }
    }

    fn chain() -> FactorGraph {
        let mut graph = FactorGraph::new();
        graph.add(Difference {
            keys: [Key::joint_angle(0, 0), Key::joint_angle(0, 1)],
        });
        graph.add(Difference {
            keys: [Key::joint_angle(0, 1), Key::joint_angle(0, 2)],
        });
        graph
    }

    #[test]
    fn chain_without_anchor_is_under_constrained() {
        let err = chain().check_structure().expect_err("missing anchor");
        match err {
            ConfigurationError::UnderConstrained {
                unknowns, matched, ..
            } => {
                assert_eq!(unknowns, 3);
                assert_eq!(matched, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn anchored_chain_is_square() {
        let mut graph = chain();
        graph.add(PriorFactor::scalar(Key::joint_angle(0, 0), 0.2, 1.0));
        let report = graph.check_structure().expect("well posed");
        assert_eq!(report.unknowns, 3);
        assert_eq!(report.redundancy(), 0);
    }

    #[test]
    fn duplicate_agreeing_priors_are_accepted() {
        let mut graph = chain();
        graph.add(PriorFactor::scalar(Key::joint_angle(0, 1), 0.2, 1.0));
        graph.add(PriorFactor::scalar(Key::joint_angle(0, 1), 0.2, 1.0));
        assert!(graph.check_structure().is_ok());
    }

    #[test]
    fn disagreeing_priors_conflict() {
        let mut graph = chain();
        graph.add(PriorFactor::scalar(Key::joint_angle(0, 0), 0.2, 1.0));
        graph.add(PriorFactor::scalar(Key::joint_angle(0, 0), 0.3, 1.0));
        assert!(matches!(
            graph.check_structure(),
            Err(ConfigurationError::ConflictingPriors { .. })
        ));
    }
}

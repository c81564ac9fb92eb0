//! Keyed value store shared by graphs, solvers, and the simulator.

use std::collections::BTreeMap;

use jrsim_core::planar::{Pose2, Vector2, Vector3};
use nalgebra::DVector;
use thiserror::Error;

use crate::key::Key;

/// Errors raised when reading from a [`Values`] store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValuesError {
    #[error("no value stored for {0}")]
    Missing(Key),
}

/// Ordered assignment of numeric values to keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    entries: BTreeMap<Key, DVector<f64>>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value. The vector length must match the key dimension.
    pub fn insert(&mut self, key: Key, value: DVector<f64>) {
        assert_eq!(
            value.len(),
            key.dim(),
            "value for {key} has {} components, expected {}",
            value.len(),
            key.dim()
        );
        self.entries.insert(key, value);
    }

    pub fn insert_scalar(&mut self, key: Key, value: f64) {
        self.insert(key, DVector::from_element(1, value));
    }

    pub fn insert_vector2(&mut self, key: Key, value: Vector2<f64>) {
        self.insert(key, DVector::from_column_slice(value.as_slice()));
    }

    pub fn insert_vector3(&mut self, key: Key, value: Vector3<f64>) {
        self.insert(key, DVector::from_column_slice(value.as_slice()));
    }

    pub fn insert_pose(&mut self, key: Key, pose: Pose2) {
        self.insert_vector3(key, pose.to_vector());
    }

    pub fn get(&self, key: &Key) -> Option<&DVector<f64>> {
        self.entries.get(key)
    }

    pub fn try_get(&self, key: &Key) -> Result<&DVector<f64>, ValuesError> {
        self.entries.get(key).ok_or(ValuesError::Missing(*key))
    }

    pub fn scalar(&self, key: &Key) -> Result<f64, ValuesError> {
        Ok(self.try_get(key)?[0])
    }

    pub fn vector2(&self, key: &Key) -> Result<Vector2<f64>, ValuesError> {
        let v = self.try_get(key)?;
        Ok(Vector2::new(v[0], v[1]))
    }

    pub fn vector3(&self, key: &Key) -> Result<Vector3<f64>, ValuesError> {
        let v = self.try_get(key)?;
        Ok(Vector3::new(v[0], v[1], v[2]))
    }

    pub fn pose(&self, key: &Key) -> Result<Pose2, ValuesError> {
        Ok(Pose2::from_slice(self.try_get(key)?.as_slice()))
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &Key) -> Option<DVector<f64>> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &DVector<f64>)> {
        self.entries.iter()
    }

    /// Copy every entry of `other` into `self`, overwriting existing keys.
    pub fn merge(&mut self, other: &Values) {
        for (key, value) in other.iter() {
            self.entries.insert(*key, value.clone());
        }
    }

    /// Copy the time-indexed entries of `other` that belong to `step`.
    pub fn merge_step(&mut self, other: &Values, step: usize) {
        for (key, value) in other.iter() {
            if key.step == step && !key.kind.is_static() {
                self.entries.insert(*key, value.clone());
            }
        }
    }

    /// Keep only entries whose key satisfies the predicate.
    pub fn retain(&mut self, mut keep: impl FnMut(&Key) -> bool) {
        self.entries.retain(|key, _| keep(key));
    }

    /// Subset of this store restricted to `keys`.
    pub fn extract<'a>(&self, keys: impl IntoIterator<Item = &'a Key>) -> Result<Values, ValuesError> {
        let mut out = Values::new();
        for key in keys {
            out.insert(*key, self.try_get(key)?.clone());
        }
        Ok(out)
    }

    /// Largest time-step index present in the store.
    pub fn last_step(&self) -> Option<usize> {
        self.entries
            .keys()
            .filter(|key| !key.kind.is_static())
            .map(|key| key.step)
            .max()
    }

    /// Apply an additive update laid out as `ordering` describes.
    pub fn retract(&self, ordering: &Ordering, delta: &DVector<f64>) -> Values {
        let mut out = self.clone();
        for (key, offset) in ordering.iter() {
            if let Some(value) = out.entries.get_mut(key) {
                for i in 0..key.dim() {
                    value[i] += delta[offset + i];
                }
            }
        }
        out
    }
}

/// Column layout of a set of keys in a stacked vector.
#[derive(Debug, Clone, Default)]
pub struct Ordering {
    keys: Vec<Key>,
    offsets: Vec<usize>,
    dim: usize,
}

impl Ordering {
    /// Sorted, de-duplicated layout of `keys`.
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        let mut sorted: Vec<Key> = keys.into_iter().collect();
        sorted.sort();
        sorted.dedup();
        let mut ordering = Ordering::default();
        for key in sorted {
            ordering.keys.push(key);
            ordering.offsets.push(ordering.dim);
            ordering.dim += key.dim();
        }
        ordering
    }

    /// Total number of scalar columns.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn offset(&self, key: &Key) -> Option<usize> {
        self.keys
            .binary_search(key)
            .ok()
            .map(|index| self.offsets[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, usize)> {
        self.keys.iter().zip(self.offsets.iter().copied())
    }

    /// Key owning scalar column `column`.
    pub fn key_of_column(&self, column: usize) -> Option<Key> {
        let index = self.offsets.partition_point(|offset| *offset <= column);
        index.checked_sub(1).map(|i| self.keys[i])
    }
}

//! Append-only interning indices.
//!
//! An [`InterningIndex`] is a monotonic, insertion-ordered mapping between
//! values and small unsigned ids. Ids start at 1, are contiguous, and are
//! never reused or reassigned; id 0 universally means "absent". The
//! envelope's parallel lists (strings, GUIDs, array metadata) are flushed
//! directly from these indices.

use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hash};

use twox_hash::XxHash64;

use crate::error::{GraphpackError, Result};

pub(crate) type XxBuildHasher = BuildHasherDefault<XxHash64>;

/// A 1-based, insertion-ordered value interner.
#[derive(Debug, Clone)]
pub struct InterningIndex<T> {
    values: Vec<T>,
    ids: HashMap<T, u32, XxBuildHasher>,
}

impl<T: Clone + Eq + Hash> InterningIndex<T> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            ids: HashMap::default(),
        }
    }

    /// Rebuilds an index from a decoded sequence. Ids correspond to 1-based
    /// positions in `values`.
    pub fn from_values(values: Vec<T>) -> Self {
        let mut ids = HashMap::default();
        for (pos, v) in values.iter().enumerate() {
            // First occurrence wins so lookups stay stable even if a decoded
            // table carries duplicates.
            ids.entry(v.clone()).or_insert(pos as u32 + 1);
        }
        Self { values, ids }
    }

    /// Returns the existing id for `value`, or appends it and returns a
    /// fresh id.
    pub fn index_of(&mut self, value: &T) -> u32 {
        if let Some(&id) = self.ids.get(value) {
            return id;
        }
        self.values.push(value.clone());
        let id = self.values.len() as u32;
        self.ids.insert(value.clone(), id);
        id
    }

    /// Total over `[1, len]`; errors for 0 or out-of-range ids.
    pub fn value_of(&self, id: u32) -> Result<&T> {
        self.try_value_of(id)
            .ok_or_else(|| GraphpackError::Decode(format!("Interning id {id} out of range")))
    }

    /// Returns the value for `id`, or `None` when absent or out of range.
    pub fn try_value_of(&self, id: u32) -> Option<&T> {
        if id == 0 {
            return None;
        }
        self.values.get(id as usize - 1)
    }

    /// All interned values in insertion order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Number of interned values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: Clone + Eq + Hash> Default for InterningIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_are_stable() {
        let mut idx = InterningIndex::new();
        assert_eq!(idx.index_of(&"a".to_string()), 1);
        assert_eq!(idx.index_of(&"b".to_string()), 2);
        assert_eq!(idx.index_of(&"a".to_string()), 1);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn zero_is_always_absent() {
        let idx: InterningIndex<String> = InterningIndex::new();
        assert!(idx.try_value_of(0).is_none());
        assert!(idx.value_of(0).is_err());
    }

    #[test]
    fn rebuild_preserves_positions() {
        let idx = InterningIndex::from_values(vec!["x".to_string(), "y".to_string()]);
        assert_eq!(idx.value_of(2).unwrap(), "y");
        let mut idx = idx;
        assert_eq!(idx.index_of(&"x".to_string()), 1);
        assert_eq!(idx.index_of(&"z".to_string()), 3);
    }
}

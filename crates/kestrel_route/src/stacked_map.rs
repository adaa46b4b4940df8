//! A map with nested checkpoints.
//!
//! Writes made after a checkpoint go into an overlay layer on top of the
//! older layers, so rolling back is dropping that layer: the cost is the
//! number of writes since the checkpoint, not the size of the map.

use kestrel_common::{InternalError, KestrelResult};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// A hash map supporting LIFO checkpoint and rollback.
///
/// Removals past a checkpoint are recorded as tombstones in the top layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackedMap<K, V>
where
    K: Eq + Hash,
{
    base: HashMap<K, V>,
    layers: Vec<HashMap<K, Option<V>>>,
}

impl<K, V> Default for StackedMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            base: HashMap::new(),
            layers: Vec::new(),
        }
    }
}

impl<K, V> StackedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty map with no checkpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open checkpoints.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Opens a new layer.
    pub fn checkpoint(&mut self) {
        self.layers.push(HashMap::new());
    }

    /// Drops every write made since the last checkpoint.
    pub fn rollback(&mut self) -> KestrelResult<()> {
        self.layers
            .pop()
            .map(|_| ())
            .ok_or_else(|| InternalError::new("stacked map rolled back without a checkpoint"))
    }

    /// Keeps the writes made since the last checkpoint and closes it,
    /// merging its layer into the one below.
    pub fn commit(&mut self) -> KestrelResult<()> {
        let top = self
            .layers
            .pop()
            .ok_or_else(|| InternalError::new("stacked map committed without a checkpoint"))?;
        match self.layers.last_mut() {
            Some(below) => below.extend(top),
            None => {
                for (key, value) in top {
                    match value {
                        Some(v) => {
                            self.base.insert(key, v);
                        }
                        None => {
                            self.base.remove(&key);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// The visible value of `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        for layer in self.layers.iter().rev() {
            if let Some(slot) = layer.get(key) {
                return slot.as_ref();
            }
        }
        self.base.get(key)
    }

    /// Returns `true` if `key` has a visible value.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns `true` if the visible value of `key` was written since the
    /// last checkpoint and may be changed in place.
    pub fn is_current(&self, key: &K) -> bool {
        match self.layers.last() {
            Some(top) => matches!(top.get(key), Some(Some(_))),
            None => self.base.contains_key(key),
        }
    }

    /// Sets `key` in the top layer, returning the previously visible value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        let old = self.get(&key).cloned();
        match self.layers.last_mut() {
            Some(top) => {
                top.insert(key, Some(value));
            }
            None => {
                self.base.insert(key, value);
            }
        }
        old
    }

    /// Hides `key`, returning the previously visible value.
    pub fn remove(&mut self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let old = self.get(key).cloned()?;
        match self.layers.last_mut() {
            Some(top) => {
                top.insert(key.clone(), None);
            }
            None => {
                self.base.remove(key);
            }
        }
        Some(old)
    }

    /// Mutable access to the visible value of `key`, first copying it into
    /// the top layer if it was written before the last checkpoint.
    pub fn make_mut(&mut self, key: &K) -> Option<&mut V>
    where
        V: Clone,
    {
        if !self.is_current(key) {
            let value = self.get(key).cloned()?;
            if let Some(top) = self.layers.last_mut() {
                top.insert(key.clone(), Some(value));
            }
        }
        match self.layers.last_mut() {
            Some(top) => top.get_mut(key).and_then(Option::as_mut),
            None => self.base.get_mut(key),
        }
    }

    /// Every visible entry, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        let mut keys: HashSet<&K> = self.base.keys().collect();
        for layer in &self.layers {
            keys.extend(layer.keys());
        }
        keys.into_iter()
            .filter_map(move |k| self.get(k).map(|v| (k, v)))
    }

    /// Every visible value, in no particular order.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Number of visible entries.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if no entry is visible.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_restores_previous_values() {
        let mut m = StackedMap::new();
        m.insert("a", 1);
        m.insert("b", 2);
        let before = m.clone();

        m.checkpoint();
        m.insert("a", 10);
        m.remove(&"b");
        m.insert("c", 3);
        assert_eq!(m.get(&"a"), Some(&10));
        assert!(!m.contains_key(&"b"));
        assert_eq!(m.len(), 2);

        m.rollback().unwrap();
        assert_eq!(m, before);
        assert_eq!(m.get(&"b"), Some(&2));
        assert!(m.get(&"c").is_none());
    }

    #[test]
    fn checkpoints_nest() {
        let mut m = StackedMap::new();
        m.insert(1u32, "x");
        m.checkpoint();
        m.insert(1, "y");
        m.checkpoint();
        m.insert(1, "z");
        assert_eq!(m.depth(), 2);
        m.rollback().unwrap();
        assert_eq!(m.get(&1), Some(&"y"));
        m.rollback().unwrap();
        assert_eq!(m.get(&1), Some(&"x"));
    }

    #[test]
    fn rollback_without_checkpoint_is_internal_error() {
        let mut m: StackedMap<u32, u32> = StackedMap::new();
        assert!(m.rollback().is_err());
        assert!(m.commit().is_err());
    }

    #[test]
    fn is_current_tracks_the_top_layer() {
        let mut m = StackedMap::new();
        m.insert(7u32, 0u32);
        assert!(m.is_current(&7));
        m.checkpoint();
        assert!(!m.is_current(&7));
        m.insert(7, 1);
        assert!(m.is_current(&7));
        m.remove(&7);
        assert!(!m.is_current(&7));
    }

    #[test]
    fn make_mut_copies_on_write() {
        let mut m = StackedMap::new();
        m.insert("net", vec![1]);
        m.checkpoint();
        m.make_mut(&"net").unwrap().push(2);
        assert_eq!(m.get(&"net"), Some(&vec![1, 2]));
        m.rollback().unwrap();
        assert_eq!(m.get(&"net"), Some(&vec![1]));
        assert!(m.make_mut(&"missing").is_none());
    }

    #[test]
    fn commit_merges_down() {
        let mut m = StackedMap::new();
        m.insert(1u8, 'a');
        m.insert(2u8, 'b');
        m.checkpoint();
        m.insert(1, 'c');
        m.remove(&2);
        m.commit().unwrap();
        assert_eq!(m.depth(), 0);
        assert_eq!(m.get(&1), Some(&'c'));
        assert!(!m.contains_key(&2));
        assert!(m.rollback().is_err());
    }
}

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::hash::Hash;

/// The pairs that were removed from a [BiMap] by an insertion
pub type Evicted<L, R> = SmallVec<[(L, R); 2]>;

/// A one-to-one map between left and right values
///
/// Both directions are updated together by every operation. Inserting a pair whose left or right
/// value is already bound removes the stale pair(s) first, so a left value is never associated
/// with more than one right value, and vice versa.
#[derive(Clone, Debug)]
pub struct BiMap<L, R> {
    left_to_right: FxHashMap<L, R>,
    right_to_left: FxHashMap<R, L>,
}

impl<L, R> Default for BiMap<L, R> {
    fn default() -> Self {
        Self {
            left_to_right: FxHashMap::default(),
            right_to_left: FxHashMap::default(),
        }
    }
}

impl<L, R> BiMap<L, R>
where
    L: Clone + Eq + Hash,
    R: Clone + Eq + Hash,
{
    /// Makes an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `left` to `right`, returning any pairs that were evicted to keep the map one-to-one
    ///
    /// Inserting a pair that's already present is a no-op.
    pub fn insert(&mut self, left: L, right: R) -> Evicted<L, R> {
        let mut evicted = Evicted::new();

        if self.left_to_right.get(&left) == Some(&right) {
            return evicted;
        }

        if let Some(old_right) = self.left_to_right.remove(&left) {
            self.right_to_left.remove(&old_right);
            evicted.push((left.clone(), old_right));
        }

        if let Some(old_left) = self.right_to_left.remove(&right) {
            self.left_to_right.remove(&old_left);
            evicted.push((old_left, right.clone()));
        }

        self.left_to_right.insert(left.clone(), right.clone());
        self.right_to_left.insert(right, left);

        evicted
    }

    /// Returns the right value bound to `left`
    pub fn get_by_left(&self, left: &L) -> Option<&R> {
        self.left_to_right.get(left)
    }

    /// Returns the left value bound to `right`
    pub fn get_by_right(&self, right: &R) -> Option<&L> {
        self.right_to_left.get(right)
    }

    /// Returns true if `left` is bound
    pub fn contains_left(&self, left: &L) -> bool {
        self.left_to_right.contains_key(left)
    }

    /// Returns true if `right` is bound
    pub fn contains_right(&self, right: &R) -> bool {
        self.right_to_left.contains_key(right)
    }

    /// Removes the pair containing `left`
    pub fn remove_by_left(&mut self, left: &L) -> Option<R> {
        let right = self.left_to_right.remove(left)?;
        self.right_to_left.remove(&right);
        Some(right)
    }

    /// The number of pairs in the map
    pub fn len(&self) -> usize {
        self.left_to_right.len()
    }

    /// Returns true if the map is empty
    pub fn is_empty(&self) -> bool {
        self.left_to_right.is_empty()
    }

    /// Removes all pairs
    pub fn clear(&mut self) {
        self.left_to_right.clear();
        self.right_to_left.clear();
    }

    /// Iterates over the pairs in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&L, &R)> {
        self.left_to_right.iter()
    }

    /// Returns true if both directions describe the same set of pairs
    pub fn is_consistent(&self) -> bool {
        self.left_to_right.len() == self.right_to_left.len()
            && self
                .left_to_right
                .iter()
                .all(|(left, right)| self.right_to_left.get(right) == Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup_both_ways() {
        let mut map = BiMap::new();
        assert!(map.insert("io", "net/http").is_empty());

        assert_eq!(map.get_by_left(&"io"), Some(&"net/http"));
        assert_eq!(map.get_by_right(&"net/http"), Some(&"io"));
        assert!(map.is_consistent());
    }

    #[test]
    fn rebinding_left_evicts_old_right() {
        let mut map = BiMap::new();
        map.insert("io", "net/http");

        let evicted = map.insert("io", "net/https");
        assert_eq!(evicted.as_slice(), &[("io", "net/http")]);
        assert_eq!(map.get_by_right(&"net/http"), None);
        assert_eq!(map.get_by_right(&"net/https"), Some(&"io"));
        assert_eq!(map.len(), 1);
        assert!(map.is_consistent());
    }

    #[test]
    fn rebinding_right_evicts_old_left() {
        let mut map = BiMap::new();
        map.insert("a", "sprig/io");

        let evicted = map.insert("b", "sprig/io");
        assert_eq!(evicted.as_slice(), &[("a", "sprig/io")]);
        assert!(!map.contains_left(&"a"));
        assert_eq!(map.get_by_left(&"b"), Some(&"sprig/io"));
        assert!(map.is_consistent());
    }

    #[test]
    fn rebinding_both_sides_evicts_two_pairs() {
        let mut map = BiMap::new();
        map.insert("a", 1);
        map.insert("b", 2);

        let evicted = map.insert("a", 2);
        assert_eq!(evicted.len(), 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_by_left(&"a"), Some(&2));
        assert!(!map.contains_left(&"b"));
        assert!(!map.contains_right(&1));
        assert!(map.is_consistent());
    }

    #[test]
    fn identical_insert_is_a_no_op() {
        let mut map = BiMap::new();
        map.insert("io", "sprig/io");
        assert!(map.insert("io", "sprig/io").is_empty());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let mut map = BiMap::new();
        map.insert("a", 1);
        map.insert("b", 2);

        assert_eq!(map.remove_by_left(&"a"), Some(1));
        assert!(!map.contains_right(&1));
        assert!(map.is_consistent());

        map.clear();
        assert!(map.is_empty());
    }
}

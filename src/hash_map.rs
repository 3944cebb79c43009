use core::fmt::Debug;
use core::fmt::Display;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;

/// Errors reported by the fallible map operations.
///
/// Every failure is detected at the offending call and surfaced immediately;
/// the map is never left partially mutated. Both variants are ordinary
/// precondition violations the caller can recover from (for example by
/// calling [`HashMap::update`] where `insert` reported a duplicate).
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// `insert` was called with a key the map already holds. The existing
    /// value is left unchanged; duplicates are never silently overwritten.
    #[error("key is already present in the map")]
    DuplicateKey,

    /// `update`, `get`, or `remove` was called with a key the map does not
    /// hold.
    #[error("key is not present in the map")]
    KeyNotFound,
}

/// A hash map implemented over the linear-probing [`HashTable`].
///
/// `HashMap<K, V, S>` stores key-value pairs where keys implement
/// `Hash + Eq`, using a configurable hasher builder `S` (by default
/// [`DefaultHashBuilder`](crate::DefaultHashBuilder)). The underlying storage
/// is the metadata-tagged open-addressing table provided by [`HashTable`].
///
/// The map's surface is deliberately fallible: [`insert`](Self::insert)
/// rejects duplicate keys instead of overwriting, and
/// [`update`](Self::update) is the only sanctioned path to change a stored
/// value. There is no `get_mut`.
///
/// # Examples
///
/// ```rust
/// use probe_hash::HashMap;
///
/// let mut map: HashMap<&str, i32> = HashMap::new();
/// map.insert("a", 1).unwrap();
///
/// assert_eq!(map.get(&"a"), Ok(&1));
/// assert!(map.contains_key(&"a"));
/// assert_eq!(map.len(), 1);
/// ```
#[derive(Clone)]
pub struct HashMap<K, V, S = crate::DefaultHashBuilder> {
    table: HashTable<(K, V)>,
    hash_builder: S,
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: Debug + Hash + Eq,
    V: Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

/// The diagnostic dump: one `key: value` line per live entry.
///
/// Lines appear in physical slot order, the same order as
/// [`keys`](HashMap::keys); no ordering is guaranteed.
impl<K, V, S> Display for HashMap<K, V, S>
where
    K: Display + Hash + Eq,
    V: Display,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (k, v) in self.iter() {
            writeln!(f, "{k}: {v}")?;
        }
        Ok(())
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::collections::hash_map::RandomState;
    ///
    /// use probe_hash::HashMap;
    ///
    /// let map: HashMap<i32, String, _> = HashMap::with_hasher(RandomState::new());
    /// assert!(map.is_empty());
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates a map that can hold at least `capacity` entries without
    /// resizing, with the given hasher builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns the number of live entries in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the slot count of the backing table, always a power of two.
    ///
    /// The map resizes before the live count reaches 70% of this value.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all entries, preserving the allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Reserves capacity for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Inserts a new key-value pair.
    ///
    /// Fails with [`Error::DuplicateKey`] if the key is already present; the
    /// duplicate check runs before anything is written, so a failed insert
    /// leaves the map untouched. Use [`update`](Self::update) to overwrite
    /// an existing value.
    ///
    /// If the insert would push the live count over the load budget, the
    /// table grows (doubling capacity) before the entry is placed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::Error;
    /// use probe_hash::HashMap;
    ///
    /// let mut map: HashMap<i32, &str> = HashMap::new();
    /// assert_eq!(map.insert(1, "a"), Ok(()));
    /// assert_eq!(map.insert(1, "b"), Err(Error::DuplicateKey));
    /// assert_eq!(map.get(&1), Ok(&"a"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Result<(), Error> {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(hash, |(k, _)| k == &key) {
            TableEntry::Occupied(_) => Err(Error::DuplicateKey),
            TableEntry::Vacant(entry) => {
                entry.insert((key, value));
                Ok(())
            }
        }
    }

    /// Replaces the value stored for an existing key, returning the previous
    /// value.
    ///
    /// Fails with [`Error::KeyNotFound`] if the key is absent. The entry's
    /// key and metadata are untouched; only the value is swapped in place.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::Error;
    /// use probe_hash::HashMap;
    ///
    /// let mut map: HashMap<i32, &str> = HashMap::new();
    /// map.insert(1, "a").unwrap();
    ///
    /// assert_eq!(map.update(&1, "b"), Ok("a"));
    /// assert_eq!(map.get(&1), Ok(&"b"));
    /// assert_eq!(map.update(&2, "c"), Err(Error::KeyNotFound));
    /// ```
    pub fn update(&mut self, key: &K, value: V) -> Result<V, Error> {
        let hash = self.hash_builder.hash_one(key);
        match self.table.find_mut(hash, |(k, _)| k == key) {
            Some(entry) => Ok(core::mem::replace(&mut entry.1, value)),
            None => Err(Error::KeyNotFound),
        }
    }

    /// Returns a reference to the value stored for `key`.
    ///
    /// Fails with [`Error::KeyNotFound`] if the key is absent.
    pub fn get(&self, key: &K) -> Result<&V, Error> {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find(hash, |(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or(Error::KeyNotFound)
    }

    /// Removes the entry stored for `key`, returning its value.
    ///
    /// Fails with [`Error::KeyNotFound`] if the key is absent. The vacated
    /// slot becomes a tombstone: invisible to lookups, reusable by future
    /// inserts, and reclaimed wholesale when the table next rebuilds.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::Error;
    /// use probe_hash::HashMap;
    ///
    /// let mut map: HashMap<i32, &str> = HashMap::new();
    /// map.insert(1, "a").unwrap();
    ///
    /// assert_eq!(map.remove(&1), Ok("a"));
    /// assert_eq!(map.remove(&1), Err(Error::KeyNotFound));
    /// ```
    pub fn remove(&mut self, key: &K) -> Result<V, Error> {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .remove(hash, |(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or(Error::KeyNotFound)
    }

    /// Returns `true` if the map holds an entry for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_ok()
    }

    /// Returns an iterator over the key-value pairs of the map.
    ///
    /// Pairs appear in physical slot order; the order is unspecified and
    /// unstable across growths. Each call starts a fresh snapshot walk.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the keys of the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashMap;
    ///
    /// let mut map: HashMap<i32, &str> = HashMap::new();
    /// map.insert(1, "a").unwrap();
    /// map.insert(2, "b").unwrap();
    ///
    /// let mut keys: Vec<i32> = map.keys().copied().collect();
    /// keys.sort_unstable();
    /// assert_eq!(keys, vec![1, 2]);
    /// ```
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values of the map.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty map using the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashMap;
    ///
    /// let map: HashMap<i32, String> = HashMap::new();
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), 16);
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a map that can hold at least `capacity` entries without
    /// resizing, using the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashMap;
    ///
    /// let map: HashMap<i32, String> = HashMap::with_capacity(100);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// An iterator over the key-value pairs of a [`HashMap`].
pub struct Iter<'a, K, V> {
    inner: crate::hash_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }
}

/// An iterator over the keys of a [`HashMap`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// An iterator over the values of a [`HashMap`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use core::hash::BuildHasher;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0),
                k2: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    /// Hashes every key to the same bucket so probe chains and tombstone
    /// reuse are exercised deterministically.
    #[derive(Clone, Default)]
    struct OneBucket;

    impl BuildHasher for OneBucket {
        type Hasher = ConstHasher;

        fn build_hasher(&self) -> Self::Hasher {
            ConstHasher
        }
    }

    struct ConstHasher;

    impl Hasher for ConstHasher {
        fn finish(&self) -> u64 {
            0
        }

        fn write(&mut self, _bytes: &[u8]) {}
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        for i in 0..100 {
            map.insert(i, format!("value_{i}")).unwrap();
        }
        assert_eq!(map.len(), 100);

        for i in 0..100 {
            assert_eq!(map.get(&i), Ok(&format!("value_{i}")));
        }
        assert_eq!(map.get(&100), Err(Error::KeyNotFound));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello").unwrap();

        assert_eq!(map.insert(1, "world"), Err(Error::DuplicateKey));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Ok(&"hello"));
    }

    #[test]
    fn update_replaces_value_in_place() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello").unwrap();

        assert_eq!(map.update(&1, "world"), Ok("hello"));
        assert_eq!(map.get(&1), Ok(&"world"));
        assert_eq!(map.len(), 1);

        assert_eq!(map.update(&2, "nope"), Err(Error::KeyNotFound));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_returns_value() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello").unwrap();
        map.insert(2, "world").unwrap();

        assert_eq!(map.remove(&1), Ok("hello"));
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&1));
        assert!(map.contains_key(&2));

        assert_eq!(map.remove(&1), Err(Error::KeyNotFound));
        assert_eq!(map.remove(&3), Err(Error::KeyNotFound));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn removed_key_is_gone_capacity_unchanged() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert("a", 1).unwrap();
        let capacity = map.capacity();

        assert_eq!(map.remove(&"a"), Ok(1));
        assert!(!map.contains_key(&"a"));
        assert_eq!(map.get(&"a"), Err(Error::KeyNotFound));
        assert_eq!(map.capacity(), capacity);
    }

    #[test]
    fn growth_scenario_at_budget() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        assert_eq!(map.capacity(), 16);

        // Budget at 16 slots and maxLoad 0.70 is 11 entries.
        for k in 1..=11 {
            map.insert(k, k * 10).unwrap();
        }
        assert_eq!(map.capacity(), 16);
        assert_eq!(map.len(), 11);

        // The 12th insert resizes before placing.
        map.insert(12, 120).unwrap();
        assert_eq!(map.capacity(), 32);
        assert_eq!(map.len(), 12);

        for k in 1..=12 {
            assert_eq!(map.get(&k), Ok(&(k * 10)));
        }
    }

    #[test]
    fn tombstone_reuse_with_colliding_hasher() {
        let mut map: HashMap<&str, i32, OneBucket> = HashMap::with_hasher(OneBucket);

        map.insert("a", 1).unwrap();
        map.remove(&"a").unwrap();

        // "b" probes to the same initial slot as "a": the tombstone must be
        // reusable and must not report "a" as present.
        map.insert("b", 2).unwrap();
        assert_eq!(map.get(&"b"), Ok(&2));
        assert!(!map.contains_key(&"a"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn colliding_chain_survives_middle_removal() {
        let mut map: HashMap<&str, i32, OneBucket> = HashMap::with_hasher(OneBucket);

        map.insert("a", 1).unwrap();
        map.insert("b", 2).unwrap();
        map.insert("c", 3).unwrap();

        assert_eq!(map.remove(&"b"), Ok(2));
        assert_eq!(map.get(&"a"), Ok(&1));
        assert_eq!(map.get(&"c"), Ok(&3));
        assert_eq!(map.get(&"b"), Err(Error::KeyNotFound));
    }

    #[test]
    fn reinsert_after_remove_returns_latest_value() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        for round in 0..5 {
            for k in 0..20 {
                map.insert(k, k * 100 + round).unwrap();
            }
            for k in 0..20 {
                assert_eq!(map.get(&k), Ok(&(k * 100 + round)));
                map.remove(&k).unwrap();
            }
        }
        assert!(map.is_empty());
    }

    #[test]
    fn keys_enumerates_live_set() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for k in 0..10 {
            map.insert(k, k).unwrap();
        }
        for k in [1, 4, 7] {
            map.remove(&k).unwrap();
        }

        let keys: std::collections::HashSet<i32> = map.keys().copied().collect();
        let expected: std::collections::HashSet<i32> =
            [0, 2, 3, 5, 6, 8, 9].into_iter().collect();
        assert_eq!(keys, expected);

        // No duplicates: the set and the iterator agree on length.
        assert_eq!(map.keys().count(), keys.len());
    }

    #[test]
    fn iterators_cover_pairs_and_values() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "one").unwrap();
        map.insert(2, "two").unwrap();
        map.insert(3, "three").unwrap();

        let pairs: std::collections::HashMap<i32, &str> =
            map.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs.get(&2), Some(&"two"));

        let values: std::collections::HashSet<&str> = map.values().copied().collect();
        assert!(values.contains("one"));
        assert!(values.contains("three"));
    }

    #[test]
    fn display_dumps_one_line_per_entry() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert("k1", 10).unwrap();
        assert_eq!(map.to_string(), "k1: 10\n");

        map.insert("k2", 20).unwrap();
        let dump = map.to_string();
        let mut lines: Vec<&str> = dump.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["k1: 10", "k2: 20"]);
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            Error::DuplicateKey.to_string(),
            "key is already present in the map"
        );
        assert_eq!(Error::KeyNotFound.to_string(), "key is not present in the map");
    }

    #[test]
    fn clear_preserves_capacity() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for k in 0..50 {
            map.insert(k, k).unwrap();
        }
        let capacity = map.capacity();

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.capacity(), capacity);
        map.insert(1, 1).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn debug_renders_as_map() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(7, "seven").unwrap();

        let rendered = format!("{:?}", map);
        assert_eq!(rendered, "{7: \"seven\"}");
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn many_collisions_stay_correct() {
        let mut map: HashMap<u32, u32, OneBucket> = HashMap::with_hasher(OneBucket);

        for k in 0..500 {
            map.insert(k, k * 2).unwrap();
        }
        assert_eq!(map.len(), 500);

        for k in (0..500).step_by(2) {
            assert_eq!(map.remove(&k), Ok(k * 2));
        }
        assert_eq!(map.len(), 250);

        for k in (1..500).step_by(2) {
            assert_eq!(map.get(&k), Ok(&(k * 2)));
        }
    }
}

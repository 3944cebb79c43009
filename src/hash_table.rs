use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::fmt::Debug;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

/// Metadata byte marking a slot that has never held an entry (or was reset by
/// a rebuild).
///
/// Chosen as 0x80 (sign bit set): the fingerprint mask only ever produces
/// values in `0x00..=0x7F`, so the sentinel can never collide with a stored
/// fingerprint. An `Empty` tag terminates a lookup's probe chain.
const EMPTY: u8 = 0x80;

/// Metadata byte marking a slot whose entry was removed.
///
/// A tombstone is reusable by inserts but does NOT terminate a lookup's probe
/// chain: entries placed past this slot while it was occupied must stay
/// reachable.
const TOMBSTONE: u8 = 0xFE;

/// Smallest slot count a table ever has. Power of two, so the probe mask is
/// valid from the start.
const MIN_SLOTS: usize = 16;

/// Live-entry budget as a percentage of the slot count.
const LOAD_FACTOR_PERCENT: usize = 70;

#[inline(always)]
fn load_budget(slots: usize) -> usize {
    ((slots as u128 * LOAD_FACTOR_PERCENT as u128) / 100) as usize
}

/// Derives the 7-bit fingerprint stored in a slot's metadata byte.
///
/// Lookups compare this single byte before touching the slot payload, which
/// rejects almost every non-matching slot without a full key comparison.
#[inline(always)]
fn fingerprint(hash: u64) -> u8 {
    (hash & 0x7F) as u8
}

/// Decoded view of a slot's metadata byte.
///
/// The byte encoding keeps the metadata array a flat `u8` scan; the enum is
/// what the probing code matches on, so the sentinel regions and the
/// fingerprint region can never be confused.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tag {
    Empty,
    Tombstone,
    Fingerprint(u8),
}

impl Tag {
    #[inline(always)]
    fn decode(byte: u8) -> Self {
        match byte {
            EMPTY => Tag::Empty,
            TOMBSTONE => Tag::Tombstone,
            fp => Tag::Fingerprint(fp),
        }
    }

    #[inline(always)]
    fn encode(self) -> u8 {
        match self {
            Tag::Empty => EMPTY,
            Tag::Tombstone => TOMBSTONE,
            Tag::Fingerprint(fp) => fp,
        }
    }

    #[inline(always)]
    fn is_live(self) -> bool {
        matches!(self, Tag::Fingerprint(_))
    }
}

#[derive(Clone, Copy)]
struct Capacity {
    slots: usize,
}

impl Capacity {
    /// Smallest power-of-two slot count (at least `MIN_SLOTS`) whose load
    /// budget covers `entries`.
    fn for_entries(entries: usize) -> Self {
        let mut slots = MIN_SLOTS;
        while load_budget(slots) < entries {
            slots = slots.checked_mul(2).expect("capacity overflow");
        }
        Capacity { slots }
    }

    #[inline(always)]
    fn mask(self) -> usize {
        self.slots - 1
    }

    fn doubled(self) -> Self {
        Capacity {
            slots: self.slots.checked_mul(2).expect("capacity overflow"),
        }
    }
}

#[derive(Debug)]
struct DataLayout {
    layout: Layout,
    tags_offset: usize,
    slots_offset: usize,
    hashes_offset: usize,
}

impl DataLayout {
    fn new<V>(capacity: Capacity) -> Self {
        let tags_layout = Layout::array::<u8>(capacity.slots).expect("allocation size overflow");
        let slots_layout =
            Layout::array::<MaybeUninit<V>>(capacity.slots).expect("allocation size overflow");
        let hashes_layout =
            Layout::array::<MaybeUninit<u64>>(capacity.slots).expect("allocation size overflow");

        let (layout, tags_offset) = Layout::new::<()>().extend(tags_layout).unwrap();
        let (layout, slots_offset) = layout.extend(slots_layout).unwrap();
        let (layout, hashes_offset) = layout.extend(hashes_layout).unwrap();

        DataLayout {
            layout,
            tags_offset,
            slots_offset,
            hashes_offset,
        }
    }
}

/// A hash table using open addressing with linear probing.
///
/// `HashTable<V>` stores values of type `V` and provides insertion, lookup,
/// and removal keyed by a caller-supplied hash value and equality predicate.
/// Each slot carries a one-byte metadata tag holding either a sentinel
/// (empty, tombstone) or the low 7 bits of the entry's hash; probe loops
/// compare that byte before touching the slot payload.
///
/// The table also stores each entry's full 64-bit hash so that growth and
/// rebuilds can re-place entries without re-hashing them.
///
/// ## Performance Characteristics
///
/// - **Memory**: 1 tag byte per slot, plus the size of `V` plus a u64 for
///   the stored hash.
/// - **Operations**: amortized O(1) under the maintained load factor (70%);
///   worst case O(capacity) under pathological clustering.
///
/// ## Example
///
/// ```rust
/// use probe_hash::hash_table::Entry;
/// use probe_hash::hash_table::HashTable;
///
/// let mut table: HashTable<(u64, &str)> = HashTable::new();
///
/// match table.entry(42, |&(id, _)| id == 42) {
///     Entry::Vacant(entry) => {
///         entry.insert((42, "alice"));
///     }
///     Entry::Occupied(_) => unreachable!("table was empty"),
/// }
///
/// assert_eq!(table.find(42, |&(id, _)| id == 42), Some(&(42, "alice")));
/// ```
pub struct HashTable<V> {
    layout: DataLayout,
    alloc: NonNull<u8>,

    populated: usize,
    tombstones: usize,
    max_pop: usize,
    mask: usize,

    _phantom: core::marker::PhantomData<V>,
}

impl<V> Debug for HashTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;
        use alloc::vec::Vec;

        // SAFETY: The allocation is valid and the tags array is always
        // initialized.
        let tags = unsafe { self.tags_ptr().as_ref() };
        f.debug_struct("HashTable")
            .field(
                "tags",
                &tags
                    .chunks(16)
                    .map(|row| {
                        row.iter()
                            .map(|b| match Tag::decode(*b) {
                                Tag::Empty => String::from(".."),
                                Tag::Tombstone => String::from("xx"),
                                Tag::Fingerprint(fp) => format!("{fp:02x}"),
                            })
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .collect::<Vec<_>>(),
            )
            .field("populated", &self.populated)
            .field("tombstones", &self.tombstones)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl<V> Clone for HashTable<V>
where
    V: Clone,
{
    fn clone(&self) -> Self {
        let mut new_table = Self::with_slots(Capacity {
            slots: self.capacity(),
        });

        // SAFETY: Both tables have identical capacity. Tags and stored hashes
        // are copied verbatim; slot payloads are cloned only where the tag
        // says a live entry exists, which is exactly where they are
        // initialized.
        unsafe {
            for index in 0..=self.mask {
                let tag = *self.tags_ptr().as_ref().get_unchecked(index);
                *new_table.tags_ptr().as_mut().get_unchecked_mut(index) = tag;

                if Tag::decode(tag).is_live() {
                    let hash = self.hashes_ptr().as_ref().get_unchecked(index).assume_init_read();
                    new_table
                        .hashes_ptr()
                        .as_mut()
                        .get_unchecked_mut(index)
                        .write(hash);

                    let value = self
                        .slots_ptr()
                        .as_ref()
                        .get_unchecked(index)
                        .assume_init_ref()
                        .clone();
                    new_table
                        .slots_ptr()
                        .as_mut()
                        .get_unchecked_mut(index)
                        .write(value);
                    new_table.populated += 1;
                }
            }
        }

        new_table.tombstones = self.tombstones;
        debug_assert!(new_table.populated == self.populated);
        new_table
    }
}

impl<V> Drop for HashTable<V> {
    fn drop(&mut self) {
        // SAFETY: A live tag implies an initialized slot, so only initialized
        // values are dropped. The allocation was created in `with_slots` with
        // this layout.
        unsafe {
            if core::mem::needs_drop::<V>() && self.populated > 0 {
                for index in 0..=self.mask {
                    if Tag::decode(*self.tags_ptr().as_ref().get_unchecked(index)).is_live() {
                        self.slots_ptr()
                            .as_mut()
                            .get_unchecked_mut(index)
                            .assume_init_drop();
                    }
                }
            }

            alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout);
        }
    }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HashTable<V> {
    /// Creates an empty table with the minimum capacity (16 slots).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::new();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 16);
    /// ```
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a table that can hold at least `capacity` entries without
    /// resizing.
    ///
    /// The slot count is the smallest power of two whose 70% load budget
    /// covers the request, so the actual slot count is larger than
    /// `capacity`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    /// assert!(table.capacity().is_power_of_two());
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_slots(Capacity::for_entries(capacity))
    }

    fn with_slots(capacity: Capacity) -> Self {
        let layout = DataLayout::new::<V>(capacity);

        // SAFETY: The layout size is non-zero (the tags array alone is at
        // least `MIN_SLOTS` bytes). Allocation failure is routed through
        // `handle_alloc_error`; on success every tag byte is initialized to
        // `EMPTY` before the pointer is stored.
        let alloc = unsafe {
            let raw_alloc = alloc::alloc::alloc(layout.layout);
            if raw_alloc.is_null() {
                handle_alloc_error(layout.layout);
            }

            core::ptr::write_bytes(raw_alloc.add(layout.tags_offset), EMPTY, capacity.slots);

            NonNull::new_unchecked(raw_alloc)
        };

        Self {
            layout,
            alloc,
            populated: 0,
            tombstones: 0,
            max_pop: load_budget(capacity.slots),
            mask: capacity.mask(),
            _phantom: core::marker::PhantomData,
        }
    }

    fn tags_ptr(&self) -> NonNull<[u8]> {
        // SAFETY: Allocation is valid and properly sized for the tags slice.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.tags_offset).cast(),
                self.mask + 1,
            )
        }
    }

    fn slots_ptr(&self) -> NonNull<[MaybeUninit<V>]> {
        // SAFETY: Allocation is valid and properly sized for the slots slice.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.slots_offset).cast(),
                self.mask + 1,
            )
        }
    }

    fn hashes_ptr(&self) -> NonNull<[MaybeUninit<u64>]> {
        // SAFETY: Allocation is valid and properly sized for the hashes
        // slice.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.hashes_offset).cast(),
                self.mask + 1,
            )
        }
    }

    /// Returns the number of live entries in the table.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table contains no live entries.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the total slot count, always a power of two.
    ///
    /// The table resizes before the live count reaches 70% of this value.
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Searches the probe chain for a live entry matching `eq`.
    ///
    /// The scan starts at `hash & (capacity - 1)` and walks forward, wrapping
    /// at the capacity boundary. The fingerprint byte is compared before the
    /// payload is touched; `eq` only runs on fingerprint matches. An `Empty`
    /// tag ends the chain; tombstones and mismatches keep it going.
    #[inline]
    fn find_index(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<usize> {
        let fp = fingerprint(hash);
        let mut pos = hash as usize & self.mask;

        // SAFETY: `pos` is masked to the table bounds on every step, and a
        // live tag implies the slot payload is initialized. The loop
        // terminates because the load budget keeps at least one `Empty` slot
        // in the table at all times.
        unsafe {
            loop {
                match Tag::decode(*self.tags_ptr().as_ref().get_unchecked(pos)) {
                    Tag::Fingerprint(tag) if tag == fp => {
                        if eq(self.slots_ptr().as_ref().get_unchecked(pos).assume_init_ref()) {
                            return Some(pos);
                        }
                    }
                    Tag::Empty => return None,
                    _ => {}
                }

                pos = (pos + 1) & self.mask;
            }
        }
    }

    /// Returns a reference to the value matching the given hash and equality
    /// predicate, if present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(7, |&v| v == 7).or_insert(7);
    ///
    /// assert_eq!(table.find(7, |&v| v == 7), Some(&7));
    /// assert_eq!(table.find(8, |&v| v == 8), None);
    /// ```
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns indices whose tag is a
        // fingerprint, which implies an initialized slot.
        Some(unsafe { self.slots_ptr().as_ref().get_unchecked(index).assume_init_ref() })
    }

    /// Returns a mutable reference to the value matching the given hash and
    /// equality predicate, if present.
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns indices whose tag is a
        // fingerprint, which implies an initialized slot. The mutable borrow
        // of `self` makes the returned reference exclusive.
        Some(unsafe {
            self.slots_ptr()
                .as_mut()
                .get_unchecked_mut(index)
                .assume_init_mut()
        })
    }

    /// Removes and returns the value matching the given hash and equality
    /// predicate.
    ///
    /// The slot's metadata becomes a tombstone: reusable by future inserts,
    /// but transparent to probe chains so entries placed past it stay
    /// reachable.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(42, |&v| v == 42).or_insert(42);
    ///
    /// assert_eq!(table.remove(42, |&v| v == 42), Some(42));
    /// assert_eq!(table.remove(42, |&v| v == 42), None);
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns indices whose tag is a
        // fingerprint, so the slot holds an initialized value which is moved
        // out exactly once; the tag is rewritten to `TOMBSTONE` in the same
        // step.
        unsafe {
            *self.tags_ptr().as_mut().get_unchecked_mut(index) = Tag::Tombstone.encode();
            self.populated -= 1;
            self.tombstones += 1;
            Some(self.slots_ptr().as_ref().get_unchecked(index).assume_init_read())
        }
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// The occupied search runs first and never mutates the table, so a
    /// caller that rejects duplicates on `Occupied` leaves the table
    /// untouched. Only a miss reserves headroom (growing or rebuilding if
    /// the load budget is exhausted) and locates the insertion slot: the
    /// first `Empty` or `Tombstone` slot on the probe chain.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::hash_table::Entry;
    /// use probe_hash::hash_table::HashTable;
    ///
    /// let mut table: HashTable<(u64, i32)> = HashTable::new();
    ///
    /// match table.entry(9, |&(k, _)| k == 9) {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert((9, 1));
    ///     }
    ///     Entry::Occupied(_) => unreachable!(),
    /// }
    ///
    /// match table.entry(9, |&(k, _)| k == 9) {
    ///     Entry::Occupied(mut entry) => {
    ///         entry.get_mut().1 += 1;
    ///     }
    ///     Entry::Vacant(_) => unreachable!(),
    /// }
    ///
    /// assert_eq!(table.find(9, |&(k, _)| k == 9), Some(&(9, 2)));
    /// ```
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Entry<'_, V> {
        if let Some(index) = self.find_index(hash, &eq) {
            return Entry::Occupied(OccupiedEntry { table: self, index });
        }

        self.ensure_slack();
        let index = self.insertion_slot(hash);
        Entry::Vacant(VacantEntry {
            table: self,
            hash,
            index,
        })
    }

    /// Restores insertion headroom before a new entry is placed.
    ///
    /// Live entries at the budget double the table. A budget exhausted by
    /// tombstones alone rebuilds at the same capacity; this is the only
    /// mechanism besides growth that reclaims tombstones, and it is what
    /// keeps an `Empty` slot present so every probe loop terminates.
    fn ensure_slack(&mut self) {
        let capacity = Capacity {
            slots: self.capacity(),
        };
        if self.populated >= self.max_pop {
            self.resize_rehash(capacity.doubled());
        } else if self.populated + self.tombstones >= self.max_pop {
            self.resize_rehash(capacity);
        }
    }

    /// First reusable slot (`Empty` or `Tombstone`) on the probe chain.
    ///
    /// Callers must have restored headroom first so the scan terminates.
    #[inline]
    fn insertion_slot(&self, hash: u64) -> usize {
        let mut pos = hash as usize & self.mask;
        // SAFETY: `pos` is masked to the table bounds on every step; only
        // the tag byte is read.
        unsafe {
            loop {
                match Tag::decode(*self.tags_ptr().as_ref().get_unchecked(pos)) {
                    Tag::Empty | Tag::Tombstone => return pos,
                    Tag::Fingerprint(_) => pos = (pos + 1) & self.mask,
                }
            }
        }
    }

    /// Insert placement used while rebuilding into a fresh arena: no
    /// duplicate or load checks, the target has headroom for every re-placed
    /// entry by construction.
    fn place(&mut self, hash: u64, value: V) {
        let index = self.insertion_slot(hash);
        // SAFETY: `insertion_slot` returns an in-bounds index whose tag is
        // not live, so writing the payload cannot leak an existing value.
        unsafe {
            *self.tags_ptr().as_mut().get_unchecked_mut(index) =
                Tag::Fingerprint(fingerprint(hash)).encode();
            self.hashes_ptr().as_mut().get_unchecked_mut(index).write(hash);
            self.slots_ptr().as_mut().get_unchecked_mut(index).write(value);
        }
        self.populated += 1;
    }

    /// Rebuilds the table into a fresh arena of `new_capacity` slots,
    /// re-placing every live entry by its stored hash. Tombstones are
    /// dropped entirely; growth is also the mechanism that heals
    /// tombstone-polluted probe chains.
    fn resize_rehash(&mut self, new_capacity: Capacity) {
        let mut new_table = Self::with_slots(new_capacity);
        debug_assert!(load_budget(new_capacity.slots) >= self.populated);

        // SAFETY: Live tags mark exactly the initialized slots. Values and
        // hashes are moved (not copied) into the new arena; afterwards the
        // old tags are reset to `EMPTY` and the counters zeroed so the old
        // arena is dropped as empty, never double-dropping a moved value.
        unsafe {
            for index in 0..=self.mask {
                if Tag::decode(*self.tags_ptr().as_ref().get_unchecked(index)).is_live() {
                    let hash = self.hashes_ptr().as_ref().get_unchecked(index).assume_init_read();
                    let value = self.slots_ptr().as_ref().get_unchecked(index).assume_init_read();
                    new_table.place(hash, value);
                }
            }

            core::ptr::write_bytes(
                self.alloc.as_ptr().add(self.layout.tags_offset),
                EMPTY,
                self.mask + 1,
            );
        }
        self.populated = 0;
        self.tombstones = 0;

        *self = new_table;
    }

    /// Reserves capacity for at least `additional` more entries.
    ///
    /// Rebuilding here drops accumulated tombstones as a side effect.
    pub fn reserve(&mut self, additional: usize) {
        let required = self.populated.saturating_add(additional);
        if required > self.max_pop {
            self.resize_rehash(Capacity::for_entries(required));
        }
    }

    /// Removes all entries from the table, preserving its capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(1, |&v| v == 1).or_insert(1);
    /// table.entry(2, |&v| v == 2).or_insert(2);
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 16);
    /// ```
    pub fn clear(&mut self) {
        // SAFETY: A live tag implies an initialized slot; only those values
        // are dropped before every tag is reset to `EMPTY`.
        unsafe {
            if core::mem::needs_drop::<V>() && self.populated > 0 {
                for index in 0..=self.mask {
                    if Tag::decode(*self.tags_ptr().as_ref().get_unchecked(index)).is_live() {
                        self.slots_ptr()
                            .as_mut()
                            .get_unchecked_mut(index)
                            .assume_init_drop();
                    }
                }
            }

            core::ptr::write_bytes(
                self.alloc.as_ptr().add(self.layout.tags_offset),
                EMPTY,
                self.mask + 1,
            );
        }

        self.populated = 0;
        self.tombstones = 0;
    }

    /// Returns an iterator over all live values, in physical slot order.
    ///
    /// The order is unspecified and unstable across growths.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            table: self,
            index: 0,
        }
    }

    /// Returns an iterator that removes and yields all values.
    ///
    /// After the iterator is dropped the table is empty (tombstones
    /// included), with its capacity preserved.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(1, |&v| v == 1).or_insert(1);
    /// table.entry(2, |&v| v == 2).or_insert(2);
    ///
    /// let mut values: Vec<u64> = table.drain().collect();
    /// values.sort_unstable();
    /// assert_eq!(values, vec![1, 2]);
    /// assert!(table.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, V> {
        Drain {
            table: self,
            index: 0,
        }
    }
}

/// A view into a single slot of the table, which is either vacant or
/// occupied.
///
/// Constructed by the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
pub enum Entry<'a, V> {
    /// The probe chain holds no matching entry.
    Vacant(VacantEntry<'a, V>),
    /// A matching live entry was found.
    Occupied(OccupiedEntry<'a, V>),
}

impl<'a, V> Entry<'a, V> {
    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the value computed by `default` if the entry is vacant and
    /// returns a mutable reference to the value.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to the value if the entry is occupied and returns a
    /// mutable reference to it; returns `None` without inserting otherwise.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }
}

/// A view into a vacant slot in the table.
///
/// Created by [`HashTable::entry`] when no matching entry exists. The slot
/// index was located after headroom was reserved, so `insert` is a plain
/// write.
pub struct VacantEntry<'a, V> {
    table: &'a mut HashTable<V>,
    hash: u64,
    index: usize,
}

impl<'a, V> VacantEntry<'a, V> {
    /// Inserts a value into the slot and returns a mutable reference to it.
    ///
    /// Reusing a tombstone slot converts it back to a live slot; the
    /// tombstone count shrinks accordingly.
    pub fn insert(self, value: V) -> &'a mut V {
        let VacantEntry { table, hash, index } = self;

        // SAFETY: `index` came from `insertion_slot`, so it is in bounds and
        // its tag is `Empty` or `Tombstone`, meaning the payload holds no
        // live value to leak. The tag, hash, and payload are written
        // together, after which the slot is live.
        unsafe {
            if Tag::decode(*table.tags_ptr().as_ref().get_unchecked(index)) == Tag::Tombstone {
                table.tombstones -= 1;
            }
            *table.tags_ptr().as_mut().get_unchecked_mut(index) =
                Tag::Fingerprint(fingerprint(hash)).encode();
            table.hashes_ptr().as_mut().get_unchecked_mut(index).write(hash);

            let slot = table.slots_ptr().as_mut().get_unchecked_mut(index);
            slot.write(value);
            table.populated += 1;
            slot.assume_init_mut()
        }
    }
}

/// A view into an occupied slot in the table.
///
/// Created by [`HashTable::entry`] when a matching live entry exists.
pub struct OccupiedEntry<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> OccupiedEntry<'a, V> {
    /// Returns a reference to the value.
    pub fn get(&self) -> &V {
        // SAFETY: The entry's tag is live, so the slot is initialized.
        unsafe {
            self.table
                .slots_ptr()
                .as_ref()
                .get_unchecked(self.index)
                .assume_init_ref()
        }
    }

    /// Returns a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: The entry's tag is live, so the slot is initialized; the
        // entry holds the table's unique borrow.
        unsafe {
            self.table
                .slots_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .assume_init_mut()
        }
    }

    /// Converts the entry into a mutable reference tied to the table borrow.
    pub fn into_mut(self) -> &'a mut V {
        // SAFETY: The entry's tag is live, so the slot is initialized; the
        // entry holds the table's unique borrow for 'a.
        unsafe {
            self.table
                .slots_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .assume_init_mut()
        }
    }

    /// Removes the entry from the table and returns its value, leaving a
    /// tombstone.
    pub fn remove(self) -> V {
        let OccupiedEntry { table, index } = self;
        // SAFETY: The entry's tag is live, so the slot holds an initialized
        // value which is moved out exactly once; the tag is rewritten to
        // `TOMBSTONE` in the same step.
        unsafe {
            *table.tags_ptr().as_mut().get_unchecked_mut(index) = Tag::Tombstone.encode();
            table.populated -= 1;
            table.tombstones += 1;
            table.slots_ptr().as_ref().get_unchecked(index).assume_init_read()
        }
    }
}

/// An iterator over the live values of a [`HashTable`], in slot order.
pub struct Iter<'a, V> {
    table: &'a HashTable<V>,
    index: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index <= self.table.mask {
            let index = self.index;
            self.index += 1;

            // SAFETY: `index` is bounded by the mask, and a live tag implies
            // an initialized slot.
            unsafe {
                if Tag::decode(*self.table.tags_ptr().as_ref().get_unchecked(index)).is_live() {
                    return Some(
                        self.table
                            .slots_ptr()
                            .as_ref()
                            .get_unchecked(index)
                            .assume_init_ref(),
                    );
                }
            }
        }

        None
    }
}

/// A draining iterator over the values of a [`HashTable`].
///
/// Yields owned values in slot order; dropping the iterator finishes the
/// drain, leaving the table empty.
pub struct Drain<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> Iterator for Drain<'a, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index <= self.table.mask {
            let index = self.index;
            self.index += 1;

            // SAFETY: `index` is bounded by the mask. Live slots are moved
            // out exactly once, with their tag reset to `EMPTY` in the same
            // step; tombstones are reset as the scan passes them.
            unsafe {
                match Tag::decode(*self.table.tags_ptr().as_ref().get_unchecked(index)) {
                    Tag::Fingerprint(_) => {
                        *self.table.tags_ptr().as_mut().get_unchecked_mut(index) = EMPTY;
                        self.table.populated -= 1;
                        return Some(
                            self.table
                                .slots_ptr()
                                .as_ref()
                                .get_unchecked(index)
                                .assume_init_read(),
                        );
                    }
                    Tag::Tombstone => {
                        *self.table.tags_ptr().as_mut().get_unchecked_mut(index) = EMPTY;
                        self.table.tombstones -= 1;
                    }
                    Tag::Empty => {}
                }
            }
        }

        None
    }
}

impl<'a, V> Drop for Drain<'a, V> {
    fn drop(&mut self) {
        for _ in self {}
    }
}

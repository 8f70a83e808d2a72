//! Index-based storage for IR entities.
//!
//! Instructions, SSA values, blocks and variables all live in append-only
//! arenas and refer to each other through typed `Id`s:
//! - **Stable identity**: an id is never reused, even after its item is removed
//! - **No reference cycles**: def/use back-references are plain ids
//! - **Cheap side tables**: analyses hang data off ids with `SecondaryMap`

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

// =============================================================================
// Typed ID
// =============================================================================

/// A type-safe index into an `Arena<T>`.
///
/// `Id<T>` is `Copy + Eq + Hash` whatever `T` is, so the impls below compare
/// the raw index only.
pub struct Id<T>(u32, PhantomData<fn() -> T>);

impl<T> Id<T> {
    /// Sentinel for "no entity".
    pub const INVALID: Self = Id(u32::MAX, PhantomData);

    #[inline]
    pub const fn new(index: u32) -> Self {
        Id(index, PhantomData)
    }

    /// Raw index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.0);
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.is_valid() {
            true => write!(f, "#{}", self.0),
            false => f.write_str("#INVALID"),
        }
    }
}

// =============================================================================
// Arena
// =============================================================================

/// Append-only storage for homogeneous IR entities.
///
/// Nothing is ever freed individually; the owner marks removed entities with
/// a flag instead so that stale ids still index something.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<T>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Arena { slots: Vec::new() }
    }

    /// Store `item` and return its id.
    pub fn alloc(&mut self, item: T) -> Id<T> {
        let id = Id::new(self.slots.len() as u32);
        self.slots.push(item);
        id
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.slots.get(id.as_usize())
    }

    /// Items ever allocated, removed ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `(id, item)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.ids().zip(&self.slots)
    }

    pub fn ids(&self) -> impl Iterator<Item = Id<T>> {
        (0..self.slots.len() as u32).map(Id::new)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &T {
        &self.slots[id.as_usize()]
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, id: Id<T>) -> &mut T {
        &mut self.slots[id.as_usize()]
    }
}

// =============================================================================
// Secondary Map
// =============================================================================

/// Dense side table keyed by the ids of another arena.
///
/// Analyses (dominators, block ordering) store their results here instead of
/// widening the IR structs.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K, V> {
    entries: Vec<V>,
    _key: PhantomData<fn() -> K>,
}

impl<K, V: Default + Clone> SecondaryMap<K, V> {
    pub fn new() -> Self {
        Self::with_len(0)
    }

    /// `len` keys, each holding `V::default()`.
    pub fn with_len(len: usize) -> Self {
        SecondaryMap {
            entries: vec![V::default(); len],
            _key: PhantomData,
        }
    }

    pub fn get(&self, key: Id<K>) -> Option<&V> {
        self.entries.get(key.as_usize())
    }

    /// Store `value` under `key`, padding with defaults up to it.
    pub fn set(&mut self, key: Id<K>, value: V) {
        let slot = key.as_usize();
        if slot >= self.entries.len() {
            self.entries.resize(slot + 1, V::default());
        }
        self.entries[slot] = value;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V: Default + Clone> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Index<Id<K>> for SecondaryMap<K, V> {
    type Output = V;

    fn index(&self, key: Id<K>) -> &V {
        &self.entries[key.as_usize()]
    }
}

impl<K, V> IndexMut<Id<K>> for SecondaryMap<K, V> {
    fn index_mut(&mut self, key: Id<K>) -> &mut V {
        &mut self.entries[key.as_usize()]
    }
}

// =============================================================================
// Bit Set
// =============================================================================

/// Membership over dense indices (visited blocks, live derefs).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bits: usize) -> Self {
        BitSet {
            words: vec![0; bits.div_ceil(64)],
        }
    }

    /// Returns `true` if `bit` was not already set.
    pub fn insert(&mut self, bit: usize) -> bool {
        let word = bit / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << (bit % 64);
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    pub fn remove(&mut self, bit: usize) {
        if let Some(word) = self.words.get_mut(bit / 64) {
            *word &= !(1u64 << (bit % 64));
        }
    }

    pub fn contains(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .is_some_and(|word| word & (1u64 << (bit % 64)) != 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

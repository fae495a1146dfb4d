//! Generation-checked entity storage.
//!
//! Bodies, fixtures, contacts and joints reference each other through
//! [`Handle`]s instead of pointers. Slots are recycled by the underlying
//! [`Slab`], and every removal bumps the slot's generation so a handle kept
//! past destruction resolves to `None` instead of aliasing a new entity.

use slab::Slab;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize, generation: u32) -> Self {
        Handle {
            index: index as u32,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index. Stable for the lifetime of the entity.
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

pub struct Arena<T> {
    slots: Slab<T>,
    generations: Vec<u32>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Arena {
            slots: Slab::new(),
            generations: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> Handle<T> {
        let key = self.slots.vacant_key();
        if key >= self.generations.len() {
            self.generations.resize(key + 1, 0);
        }
        let inserted = self.slots.insert(value);
        debug_assert_eq!(inserted, key);
        Handle::new(key, self.generations[key])
    }

    /// Inserts a value built from its own future handle.
    pub fn insert_with(&mut self, build: impl FnOnce(Handle<T>) -> T) -> Handle<T> {
        let key = self.slots.vacant_key();
        if key >= self.generations.len() {
            self.generations.resize(key + 1, 0);
        }
        let handle = Handle::new(key, self.generations[key]);
        self.slots.insert(build(handle));
        handle
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }
        let value = self.slots.try_remove(handle.index())?;
        let generation = &mut self.generations[handle.index()];
        *generation = generation.wrapping_add(1);
        Some(value)
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.slots.contains(handle.index())
            && self.generations.get(handle.index()) == Some(&handle.generation)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        if self.generations.get(handle.index()) != Some(&handle.generation) {
            return None;
        }
        self.slots.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        if self.generations.get(handle.index()) != Some(&handle.generation) {
            return None;
        }
        self.slots.get_mut(handle.index())
    }

    /// Mutable access to two distinct entries at once.
    pub fn get2_mut(&mut self, a: Handle<T>, b: Handle<T>) -> Option<(&mut T, &mut T)> {
        if a.index == b.index || !self.contains(a) || !self.contains(b) {
            return None;
        }
        self.slots.get2_mut(a.index(), b.index())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        let generations = &self.generations;
        self.slots
            .iter()
            .map(move |(key, value)| (Handle::new(key, generations[key]), value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> + '_ {
        let generations = &self.generations;
        self.slots
            .iter_mut()
            .map(move |(key, value)| (Handle::new(key, generations[key]), value))
    }

    /// Snapshot of the live handles, in slot order.
    pub fn handles(&self) -> Vec<Handle<T>> {
        self.iter().map(|(handle, _)| handle).collect()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::ops::Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        match self.get(handle) {
            Some(value) => value,
            None => panic!("stale arena handle {:?}", handle),
        }
    }
}

impl<T> std::ops::IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        match self.get_mut(handle) {
            Some(value) => value,
            None => panic!("stale arena handle {:?}", handle),
        }
    }
}

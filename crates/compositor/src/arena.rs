//! Generational slot storage
//!
//! Every long-lived object in the compositor (scene nodes, views,
//! toplevels, outputs) lives in an [`Arena`] and is referred to by a small
//! copyable id. A freed slot bumps its generation, so an id kept past the
//! object's lifetime fails the liveness check instead of aliasing whatever
//! reuses the slot.

use std::marker::PhantomData;

/// Raw slot index plus generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawId {
    index: u32,
    generation: u32,
}

impl RawId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Implemented by the typed ids stored in arenas
pub trait ArenaId: Copy {
    fn from_raw(raw: RawId) -> Self;
    fn raw(self) -> RawId;
}

/// Declare a typed arena id
#[macro_export]
macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name($crate::arena::RawId);

        impl $crate::arena::ArenaId for $name {
            fn from_raw(raw: $crate::arena::RawId) -> Self {
                Self(raw)
            }

            fn raw(self) -> $crate::arena::RawId {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}.{}", $prefix, self.0.index(), self.0.generation())
            }
        }
    };
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot map keyed by a typed generational id
pub struct Arena<K: ArenaId, T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
    _key: PhantomData<K>,
}

impl<K: ArenaId, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }
}

impl<K: ArenaId, T> Arena<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> K {
        self.insert_with(|_| value)
    }

    /// Insert a value that needs to know its own id
    pub fn insert_with(&mut self, make: impl FnOnce(K) -> T) -> K {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            let id = K::from_raw(RawId {
                index,
                generation: slot.generation,
            });
            slot.value = Some(make(id));
            return id;
        }

        let index = self.slots.len() as u32;
        let id = K::from_raw(RawId { index, generation: 0 });
        self.slots.push(Slot {
            generation: 0,
            value: Some(make(id)),
        });
        id
    }

    pub fn contains(&self, id: K) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: K) -> Option<&T> {
        let raw = id.raw();
        self.slots
            .get(raw.index as usize)
            .filter(|slot| slot.generation == raw.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: K) -> Option<&mut T> {
        let raw = id.raw();
        self.slots
            .get_mut(raw.index as usize)
            .filter(|slot| slot.generation == raw.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, id: K) -> Option<T> {
        let raw = id.raw();
        let slot = self.slots.get_mut(raw.index as usize)?;
        if slot.generation != raw.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(raw.index);
        self.len -= 1;
        Some(value)
    }

    /// Iterate live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|v| {
                (
                    K::from_raw(RawId {
                        index: index as u32,
                        generation: slot.generation,
                    }),
                    v,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|v| {
                (
                    K::from_raw(RawId {
                        index: index as u32,
                        generation,
                    }),
                    v,
                )
            })
        })
    }

    pub fn ids(&self) -> Vec<K> {
        self.iter().map(|(id, _)| id).collect()
    }
}

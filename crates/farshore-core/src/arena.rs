use farshore_protocol::EntityId;

#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational arena: the authoritative store for one entity kind.
///
/// Handles stay valid until `remove`; a recycled slot bumps its
/// generation so stale ids miss instead of aliasing. Iteration order
/// is ascending slot index, which keeps every per-turn sweep
/// deterministic.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn insert(&mut self, value: T) -> EntityId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            EntityId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            EntityId::new(index, 0)
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        (slot.generation == id.generation)
            .then_some(slot.value.as_ref())
            .flatten()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation == id.generation {
            slot.value.as_mut()
        } else {
            None
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Mutable access to two distinct entities, for combat exchanges.
    pub fn get2_mut(&mut self, a: EntityId, b: EntityId) -> Option<(&mut T, &mut T)> {
        if a.index == b.index {
            return None;
        }
        let (low, high, a_is_low) = if a.index < b.index {
            (a, b, true)
        } else {
            (b, a, false)
        };

        let high_index = high.index as usize;
        if high_index >= self.slots.len() {
            return None;
        }
        let (left, right) = self.slots.split_at_mut(high_index);
        let low_slot = left.get_mut(low.index as usize)?;
        let high_slot = right.first_mut()?;
        if low_slot.generation != low.generation || high_slot.generation != high.generation {
            return None;
        }

        let low_val = low_slot.value.as_mut()?;
        let high_val = high_slot.value.as_mut()?;
        if a_is_low {
            Some((low_val, high_val))
        } else {
            Some((high_val, low_val))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let value = slot.value.as_ref()?;
            Some((EntityId::new(index as u32, slot.generation), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let value = slot.value.as_mut()?;
                Some((EntityId::new(index as u32, slot.generation), value))
            })
    }

    /// All live ids in iteration order. Handy when a sweep needs to
    /// mutate the arena while walking it.
    pub fn ids(&self) -> Vec<EntityId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Rebuild an arena from exported (id, value) pairs, preserving
    /// slot indices and generations so every imported handle stays
    /// valid. `None` when two entries claim the same slot.
    pub fn from_entries(entries: Vec<(EntityId, T)>) -> Option<Self> {
        let mut arena = Arena::default();
        for (id, value) in entries {
            let index = id.index as usize;
            while arena.slots.len() <= index {
                arena.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
            }
            let slot = &mut arena.slots[index];
            if slot.value.is_some() {
                return None;
            }
            slot.generation = id.generation;
            slot.value = Some(value);
            arena.live += 1;
        }
        for (index, slot) in arena.slots.iter().enumerate() {
            if slot.value.is_none() {
                arena.free.push(index as u32);
            }
        }
        Some(arena)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_misses_after_removal() {
        let mut arena = Arena::default();
        let id = arena.insert("a");
        assert_eq!(arena.remove(id), Some("a"));

        let recycled = arena.insert("b");
        assert_eq!(recycled.index, id.index);
        assert_ne!(recycled.generation, id.generation);
        assert!(arena.get(id).is_none());
        assert_eq!(arena.get(recycled), Some(&"b"));
    }

    #[test]
    fn iteration_is_ascending_by_slot() {
        let mut arena = Arena::default();
        let a = arena.insert(1);
        let b = arena.insert(2);
        let c = arena.insert(3);
        arena.remove(b);

        let ids: Vec<_> = arena.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn get2_mut_rejects_same_slot() {
        let mut arena = Arena::default();
        let a = arena.insert(1);
        assert!(arena.get2_mut(a, a).is_none());

        let b = arena.insert(2);
        let (x, y) = arena.get2_mut(b, a).unwrap();
        assert_eq!((*x, *y), (2, 1));
    }
}

//! Generational Arena
//!
//! Slot map owning the tilings of a set. Indices carry the generation of
//! their slot, so an index kept past a removal resolves to `None` instead of
//! aliasing whatever reuses the slot.

/// Generational index for safe references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenIndex {
    pub index: u32,
    pub generation: u32,
}

/// Generational arena (slot map)
#[derive(Debug)]
pub struct GenArena<T> {
    items: Vec<Option<(T, u32)>>,
    free_list: Vec<u32>,
    generations: Vec<u32>,
    len: usize,
}

impl<T> GenArena<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            free_list: Vec::new(),
            generations: Vec::new(),
            len: 0,
        }
    }

    /// Insert item
    pub fn insert(&mut self, value: T) -> GenIndex {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let generation = self.generations[index as usize];
            self.items[index as usize] = Some((value, generation));
            GenIndex { index, generation }
        } else {
            let index = self.items.len() as u32;
            self.items.push(Some((value, 0)));
            self.generations.push(0);
            GenIndex { index, generation: 0 }
        }
    }

    /// Get item
    pub fn get(&self, idx: GenIndex) -> Option<&T> {
        self.items
            .get(idx.index as usize)
            .and_then(|slot| slot.as_ref())
            .filter(|(_, g)| *g == idx.generation)
            .map(|(val, _)| val)
    }

    pub fn get_mut(&mut self, idx: GenIndex) -> Option<&mut T> {
        self.items
            .get_mut(idx.index as usize)
            .and_then(|slot| slot.as_mut())
            .filter(|(_, g)| *g == idx.generation)
            .map(|(val, _)| val)
    }

    pub fn contains(&self, idx: GenIndex) -> bool {
        self.get(idx).is_some()
    }

    /// Remove item
    pub fn remove(&mut self, idx: GenIndex) -> Option<T> {
        let slot = self.items.get_mut(idx.index as usize)?;
        if !matches!(slot, Some((_, g)) if *g == idx.generation) {
            return None;
        }
        let (val, _) = slot.take()?;
        self.generations[idx.index as usize] = self.generations[idx.index as usize].wrapping_add(1);
        self.free_list.push(idx.index);
        self.len -= 1;
        Some(val)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live items with their indices, in slot order
    pub fn iter(&self) -> impl Iterator<Item = (GenIndex, &T)> {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref().map(|(val, generation)| {
                (GenIndex { index: index as u32, generation: *generation }, val)
            })
        })
    }
}

impl<T> Default for GenArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_arena() {
        let mut arena = GenArena::new();
        let idx = arena.insert(42);

        assert_eq!(arena.get(idx), Some(&42));
        arena.remove(idx);
        assert_eq!(arena.get(idx), None);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_stale_index_after_reuse() {
        let mut arena = GenArena::new();
        let first = arena.insert("a");
        arena.remove(first);
        let second = arena.insert("b");

        assert_eq!(first.index, second.index);
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.remove(first), None);
        assert_eq!(arena.get(second), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_iter_and_get_mut() {
        let mut arena = GenArena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        *arena.get_mut(b).unwrap() = 20;
        arena.remove(a);

        let items: Vec<_> = arena.iter().map(|(idx, val)| (idx, *val)).collect();
        assert_eq!(items, vec![(b, 20)]);
    }
}

//! Slot Pool - resizable set of occupancy slots
//!
//! Owned value without internal locking: the scheduler strategy owning the
//! pool is only ever driven from the orchestrator task queue.

/// Pool of slots, each empty or held by one occupant
#[derive(Debug, Clone)]
pub struct SlotPool<T> {
    slots: Vec<Option<T>>,
}

impl<T: Clone + Eq> SlotPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Declared capacity
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn available_slots(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    pub fn occupied(&self) -> usize {
        self.size() - self.available_slots()
    }

    pub fn has_slot(&self, occupant: &T) -> bool {
        self.slots.iter().flatten().any(|held| held == occupant)
    }

    pub fn occupants(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().flatten()
    }

    pub fn first_occupant(&self) -> Option<&T> {
        self.occupants().next()
    }

    /// Assign `occupant` to a free slot. Fails if the pool is full or the
    /// occupant already holds a slot.
    pub fn try_assign(&mut self, occupant: T) -> bool {
        if self.has_slot(&occupant) {
            return false;
        }
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(occupant);
                true
            }
            None => false,
        }
    }

    /// Hand the slot held by `old` over to `new` in one step
    pub fn try_replace(&mut self, old: &T, new: T) -> bool {
        if self.has_slot(&new) {
            return false;
        }
        match self.slots.iter_mut().find(|slot| slot.as_ref() == Some(old)) {
            Some(slot) => {
                *slot = Some(new);
                true
            }
            None => false,
        }
    }

    pub fn try_release(&mut self, occupant: &T) -> bool {
        match self
            .slots
            .iter_mut()
            .find(|slot| slot.as_ref() == Some(occupant))
        {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    /// Change the capacity. Shrinking below the number of occupied slots fails.
    pub fn try_resize(&mut self, capacity: usize) -> bool {
        if capacity >= self.slots.len() {
            self.slots.resize(capacity, None);
            return true;
        }
        if self.occupied() > capacity {
            return false;
        }

        // Compact occupants to the front before cutting off the tail
        let mut occupants: Vec<Option<T>> = self.slots.drain(..).filter(Option::is_some).collect();
        occupants.resize(capacity, None);
        self.slots = occupants;
        true
    }
}

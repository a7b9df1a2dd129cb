//! Fixed-capacity storage for sounding notes
//!
//! The synthesis loop runs on the audio thread, so note storage must not
//! allocate after construction. [`NotePool`] is a slot arena: a fixed vector
//! of optional notes, a free list of empty slots and a dense index of active
//! slots for iteration. Insert and remove are O(1) and the dense index keeps
//! per-frame traversal cache friendly.

use crate::synth::note::Note;

/// Slot arena holding every sounding note of one part.
#[derive(Debug)]
pub struct NotePool {
    slots: Vec<Option<Note>>,
    free: Vec<usize>,
    active: Vec<usize>,
}

impl NotePool {
    /// Allocate a pool with room for `capacity` simultaneous notes.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        // Free slots pop from the back, so low indices are handed out first
        let free = (0..capacity).rev().collect();

        NotePool {
            slots,
            free,
            active: Vec::with_capacity(capacity),
        }
    }

    /// Maximum number of simultaneous notes.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of sounding notes.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no notes are sounding.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Sum of live partial voices across all sounding notes.
    pub fn total_partials(&self) -> usize {
        self.iter().map(Note::num_partials).sum()
    }

    /// Store a note. Returns its slot index, or `None` when the pool is full.
    pub fn insert(&mut self, note: Note) -> Option<usize> {
        let slot = self.free.pop()?;
        self.slots[slot] = Some(note);
        self.active.push(slot);
        Some(slot)
    }

    /// Iterate over sounding notes.
    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterate mutably over sounding notes.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Note> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Visit every sounding note; the closure returns `false` to drop the
    /// note. Finished notes are recycled without allocation.
    pub fn retain(&mut self, mut keep: impl FnMut(&mut Note) -> bool) {
        let mut i = 0;
        while i < self.active.len() {
            let slot = self.active[i];
            let keep_note = match self.slots[slot].as_mut() {
                Some(note) => keep(note),
                None => false,
            };
            if keep_note {
                i += 1;
            } else {
                self.slots[slot] = None;
                self.free.push(slot);
                self.active.swap_remove(i);
            }
        }
    }

    /// Drop every note immediately.
    pub fn clear(&mut self) {
        for &slot in &self.active {
            self.slots[slot] = None;
            self.free.push(slot);
        }
        self.active.clear();
    }
}

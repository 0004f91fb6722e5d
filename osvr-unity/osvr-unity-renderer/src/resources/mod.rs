//! Per-eye slots for owned native buffers. A slot is emptied before its buffer is released so a
//! second teardown finds nothing to free.

use stereo_api::{Eye, EYE_COUNT};

pub struct EyeSlots<T> {
    slots: [Option<T>; EYE_COUNT],
}

impl<T> Default for EyeSlots<T> {
    fn default() -> Self {
        Self { slots: std::array::from_fn(|_| None) }
    }
}

impl<T> EyeSlots<T> {
    pub fn get(&self, eye: Eye) -> Option<&T> {
        self.slots[eye.index()].as_ref()
    }

    pub fn contains(&self, eye: Eye) -> bool {
        self.slots[eye.index()].is_some()
    }

    /// Store `value`, handing back the previous occupant for the caller to release.
    pub fn replace(&mut self, eye: Eye, value: T) -> Option<T> {
        self.slots[eye.index()].replace(value)
    }

    pub fn take(&mut self, eye: Eye) -> Option<T> {
        self.slots[eye.index()].take()
    }

    /// Empty every slot, yielding occupants in eye order.
    pub fn drain(&mut self) -> impl Iterator<Item = (Eye, T)> + '_ {
        Eye::ALL
            .into_iter()
            .filter_map(move |eye| self.slots[eye.index()].take().map(|v| (eye, v)))
    }

    /// Occupants of eyes `0..count` in order, or None while any is missing.
    pub fn ordered(&self, count: usize) -> Option<Vec<&T>> {
        if count > EYE_COUNT {
            return None;
        }
        Eye::ALL[..count].iter().map(|&eye| self.get(eye)).collect()
    }

    /// First eye in `0..count` with an empty slot.
    pub fn first_missing(&self, count: usize) -> Option<Eye> {
        Eye::ALL.into_iter().take(count).find(|&eye| !self.contains(eye))
    }
}

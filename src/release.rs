//! Delayed release of buffers the hardware may still be reading.

/// Scanline interrupts a retired buffer is held for before being freed.
///
/// A buffer armed at one interrupt is read during the following line and
/// finished with before the interrupt after that.
pub const RELEASE_DELAY: usize = 2;

/// A fixed delay line of pending releases.
///
/// Each call to [`advance`](Self::advance) moves every held item one step
/// along, and returns the item which was held `DEPTH` calls ago.
#[derive(Debug)]
pub struct ReleaseQueue<T, const DEPTH: usize> {
    slots: [Option<T>; DEPTH],
}

impl<T, const DEPTH: usize> ReleaseQueue<T, DEPTH> {
    pub fn new() -> Self {
        Self { slots: core::array::from_fn(|_| None) }
    }

    /// Shift the delay line, returning the item now due for release.
    pub fn advance(&mut self) -> Option<T> {
        if DEPTH == 0 {
            return None;
        }
        self.slots.rotate_right(1);
        self.slots[0].take()
    }

    /// Start holding `item`, returning anything already in the first stage.
    pub fn hold(&mut self, item: T) -> Option<T> {
        match self.slots.first_mut() {
            Some(slot) => slot.replace(item),
            None => Some(item),
        }
    }

    /// Number of items currently held.
    pub fn pending(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().flatten()
    }
}

impl<T, const DEPTH: usize> Default for ReleaseQueue<T, DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

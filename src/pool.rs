//! Fixed pools of line buffers passed between contexts by index.
//!
//! Buffers never move. What moves is a [`Slot`], a unique token for one
//! buffer, through a free queue and a ready queue. Whoever holds a slot has
//! sole access to its buffer, and records what it is doing with it in the
//! slot's [`SlotState`] so the pool's contents can be checked and counted
//! from any context.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

use heapless::mpmc::MpMcQueue;

/// Buffers in each pool.
pub const POOL_SIZE: usize = 3;

/// Queue capacity, the smallest power of two holding a whole pool.
const QUEUE_CAPACITY: usize = 4;

/// Where a buffer currently is.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// The pool has not been handed out yet.
    Unallocated = 0,
    /// In the free queue.
    Free = 1,
    /// In the ready queue.
    Ready = 2,
    /// Checked out and being filled.
    Producing = 3,
    /// Checked out and being read.
    Consuming = 4,
    /// Finished with, waiting for the hardware to stop reading it.
    Retiring = 5,
}

impl SlotState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Free,
            2 => Self::Ready,
            3 => Self::Producing,
            4 => Self::Consuming,
            5 => Self::Retiring,
            _ => Self::Unallocated,
        }
    }
}

/// Unique access token for one buffer in a pool.
#[derive(Debug, PartialEq, Eq)]
pub struct Slot(pub(crate) u8);

impl Slot {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

pub struct BufferPool<T, const N: usize> {
    buffers: UnsafeCell<[T; N]>,
    states: [AtomicU8; N],
    free: MpMcQueue<u8, QUEUE_CAPACITY>,
    ready: MpMcQueue<u8, QUEUE_CAPACITY>,
}

// NOTE(unsafe): a buffer is only accessed through the single Slot for it,
// which is only ever held by one context at a time.
unsafe impl<T: Send, const N: usize> Sync for BufferPool<T, N> {}

impl<T: Copy, const N: usize> BufferPool<T, N> {
    pub const fn new(init: T) -> Self {
        assert!(N <= QUEUE_CAPACITY);
        #[allow(clippy::declare_interior_mutable_const)]
        const UNALLOCATED: AtomicU8 = AtomicU8::new(SlotState::Unallocated as u8);
        BufferPool {
            buffers: UnsafeCell::new([init; N]),
            states: [UNALLOCATED; N],
            free: MpMcQueue::new(),
            ready: MpMcQueue::new(),
        }
    }
}

impl<T, const N: usize> BufferPool<T, N> {
    /// Put every buffer in the free queue. Must only be called once.
    pub(crate) fn allocate(&self) {
        for i in 0..N {
            self.put_free(Slot(i as u8));
        }
    }

    pub(crate) fn take_free(&self, holder: SlotState) -> Option<Slot> {
        let slot = Slot(self.free.dequeue()?);
        self.mark(&slot, holder);
        Some(slot)
    }

    pub(crate) fn take_ready(&self, holder: SlotState) -> Option<Slot> {
        let slot = Slot(self.ready.dequeue()?);
        self.mark(&slot, holder);
        Some(slot)
    }

    pub(crate) fn take_free_blocking(&self, holder: SlotState) -> Slot {
        loop {
            if let Some(slot) = self.take_free(holder) {
                return slot;
            }
            core::hint::spin_loop();
        }
    }

    pub(crate) fn take_ready_blocking(&self, holder: SlotState) -> Slot {
        loop {
            if let Some(slot) = self.take_ready(holder) {
                return slot;
            }
            core::hint::spin_loop();
        }
    }

    pub(crate) fn put_free(&self, slot: Slot) {
        // The state must be written before another context can dequeue the slot.
        self.mark(&slot, SlotState::Free);
        let queued = self.free.enqueue(slot.0);
        debug_assert!(queued.is_ok());
    }

    pub(crate) fn put_ready(&self, slot: Slot) {
        self.mark(&slot, SlotState::Ready);
        let queued = self.ready.enqueue(slot.0);
        debug_assert!(queued.is_ok());
    }

    pub(crate) fn mark(&self, slot: &Slot, state: SlotState) {
        self.states[slot.index()].store(state as u8, Ordering::Release);
    }

    /// The buffer for `slot`, which must have come from this pool.
    pub(crate) fn get(&self, slot: &Slot) -> &T {
        // NOTE(unsafe): the slot is unique, so no &mut to this buffer exists.
        unsafe { &*(self.buffers.get() as *const T).add(slot.index()) }
    }

    /// The buffer for `slot`, which must have come from this pool.
    #[allow(clippy::mut_from_ref)]
    pub(crate) fn get_mut(&self, slot: &mut Slot) -> &mut T {
        // NOTE(unsafe): the slot is unique and mutably borrowed, so this is
        // the only reference to this buffer.
        unsafe { &mut *(self.buffers.get() as *mut T).add(slot.index()) }
    }

    /// Address of buffer `index`.
    pub fn address(&self, index: usize) -> *const T {
        (self.buffers.get() as *const T).wrapping_add(index)
    }

    pub fn state(&self, index: usize) -> SlotState {
        SlotState::from_u8(self.states[index].load(Ordering::Acquire))
    }

    pub fn states(&self) -> [SlotState; N] {
        core::array::from_fn(|i| self.state(i))
    }

    /// Number of buffers currently in `state`.
    pub fn count(&self, state: SlotState) -> usize {
        (0..N).filter(|&i| self.state(i) == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_is_unallocated() {
        let pool = BufferPool::<u32, POOL_SIZE>::new(0);
        assert_eq!(pool.count(SlotState::Unallocated), POOL_SIZE);
        assert!(pool.take_free(SlotState::Producing).is_none());
    }

    #[test]
    fn slots_cycle_through_queues_in_order() {
        let pool = BufferPool::<u32, POOL_SIZE>::new(0);
        pool.allocate();
        assert_eq!(pool.count(SlotState::Free), POOL_SIZE);

        let mut a = pool.take_free(SlotState::Producing).unwrap();
        let mut b = pool.take_free(SlotState::Producing).unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));
        *pool.get_mut(&mut a) = 10;
        *pool.get_mut(&mut b) = 20;
        pool.put_ready(a);
        pool.put_ready(b);
        assert_eq!(pool.states(), [SlotState::Ready, SlotState::Ready, SlotState::Free]);

        let a = pool.take_ready(SlotState::Consuming).unwrap();
        assert_eq!(*pool.get(&a), 10);
        let b = pool.take_ready(SlotState::Consuming).unwrap();
        assert_eq!(*pool.get(&b), 20);
        assert!(pool.take_ready(SlotState::Consuming).is_none());
        assert_eq!(pool.count(SlotState::Consuming), 2);

        pool.put_free(a);
        pool.put_free(b);
        assert_eq!(pool.count(SlotState::Free), POOL_SIZE);
        // The untouched buffer comes out first.
        assert_eq!(pool.take_free(SlotState::Producing).map(|s| s.index()), Some(2));
    }

    #[test]
    fn buffers_do_not_alias() {
        let pool = BufferPool::<[u16; 4], POOL_SIZE>::new([0; 4]);
        pool.allocate();
        let mut slots: std::vec::Vec<Slot> =
            core::iter::from_fn(|| pool.take_free(SlotState::Producing)).collect();
        assert_eq!(slots.len(), POOL_SIZE);
        for slot in slots.iter_mut() {
            let v = slot.index() as u16;
            pool.get_mut(slot).fill(v);
        }
        for slot in &slots {
            assert_eq!(*pool.get(slot), [slot.index() as u16; 4]);
            assert_eq!(pool.get(slot) as *const _, pool.address(slot.index()));
        }
    }
}

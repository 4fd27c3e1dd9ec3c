//! Line buffers shared between the application, the encoder and the
//! scanline interrupt.
//!
//! A [`Pipeline`] lives in a `static` so every context can reach it. The
//! application fills raw RGB565 lines and submits them in display order. The
//! encoder turns each into a lane-major encoded line. The scanline interrupt
//! takes encoded lines in the same order, shows each one, and hands it back
//! once the hardware has finished reading it.

use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::pool::{BufferPool, Slot, SlotState, POOL_SIZE};
use crate::{Error, Result};

/// Buffer counts sampled from both pools.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Occupancy {
    pub free_lines: usize,
    pub ready_lines: usize,
    pub free_encoded: usize,
    pub ready_encoded: usize,
    /// The interrupt has shown filler since the encoder's previous step.
    pub starving: bool,
}

impl Occupancy {
    /// True when the display went without an encoded line while submitted
    /// lines were queued for the encoder, so the encoder is falling behind.
    ///
    /// A full encoded queue is not saturation: it is the normal state
    /// through vertical blanking, when the interrupt takes nothing.
    pub fn saturated(&self) -> bool {
        self.starving && self.ready_lines > 0
    }
}

pub struct Pipeline<const PIXELS: usize, const WORDS: usize> {
    lines: BufferPool<[u16; PIXELS], POOL_SIZE>,
    encoded: BufferPool<[u32; WORDS], POOL_SIZE>,
    allocated: AtomicBool,
    frames: AtomicU32,
    starved: AtomicU32,
    starved_seen: AtomicU32,
}

impl<const PIXELS: usize, const WORDS: usize> Pipeline<PIXELS, WORDS> {
    pub const fn new() -> Self {
        Pipeline {
            lines: BufferPool::new([0; PIXELS]),
            encoded: BufferPool::new([0; WORDS]),
            allocated: AtomicBool::new(false),
            frames: AtomicU32::new(0),
            starved: AtomicU32::new(0),
            starved_seen: AtomicU32::new(0),
        }
    }

    /// Release every buffer into its free queue.
    ///
    /// Only the first call succeeds, so a pipeline can only back one output.
    pub(crate) fn allocate(&self) -> Result<()> {
        // Construction happens once from a single context, so no
        // compare-and-swap is needed here.
        if self.allocated.load(Ordering::Acquire) {
            return Err(Error::PipelineInUse);
        }
        self.allocated.store(true, Ordering::Release);
        self.lines.allocate();
        self.encoded.allocate();
        Ok(())
    }

    /// Wait for a free line buffer.
    pub fn get_line_buffer(&self) -> LineBuffer<'_, PIXELS> {
        let slot = self.lines.take_free_blocking(SlotState::Producing);
        LineBuffer { pool: &self.lines, slot }
    }

    pub fn try_get_line_buffer(&self) -> Option<LineBuffer<'_, PIXELS>> {
        let slot = self.lines.take_free(SlotState::Producing)?;
        Some(LineBuffer { pool: &self.lines, slot })
    }

    /// Submit a filled line for encoding.
    ///
    /// Lines are shown in the order they are submitted.
    pub fn set_line_buffer(&self, buf: LineBuffer<'_, PIXELS>) {
        let slot = buf.into_slot();
        self.lines.put_ready(slot);
    }

    /// Wait until at least one submitted line is waiting to be encoded.
    pub fn wait_for_valid_line(&self) {
        while self.lines.count(SlotState::Ready) == 0 {
            core::hint::spin_loop();
        }
    }

    /// Encode the next submitted line.
    ///
    /// Waits for a free encoded buffer and a submitted line, calls `encode`
    /// to fill one from the other, then passes the encoded line on and frees
    /// the raw one. Returns the buffer counts seen just before the handoff,
    /// while this step still holds one buffer from each pool.
    ///
    /// Only one context may run the encoder.
    pub fn encode_next<F>(&self, encode: &mut F) -> Occupancy
        where F: FnMut(&[u16; PIXELS], &mut [u32; WORDS])
    {
        let mut dst = self.encoded.take_free_blocking(SlotState::Producing);
        let src = self.lines.take_ready_blocking(SlotState::Consuming);
        encode(self.lines.get(&src), self.encoded.get_mut(&mut dst));

        let occupancy = self.occupancy();
        self.starved_seen.store(self.starved_lines(), Ordering::Relaxed);

        self.encoded.put_ready(dst);
        self.lines.put_free(src);
        occupancy
    }

    /// Encode lines forever, calling `observe` whenever the pipeline is saturated.
    pub fn run_encoder<F, O>(&self, mut encode: F, mut observe: O) -> !
        where F: FnMut(&[u16; PIXELS], &mut [u32; WORDS]),
              O: FnMut(Occupancy)
    {
        loop {
            let occupancy = self.encode_next(&mut encode);
            if occupancy.saturated() {
                observe(occupancy);
            }
        }
    }

    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            free_lines: self.lines.count(SlotState::Free),
            ready_lines: self.lines.count(SlotState::Ready),
            free_encoded: self.encoded.count(SlotState::Free),
            ready_encoded: self.encoded.count(SlotState::Ready),
            starving: self.starved_lines() != self.starved_seen.load(Ordering::Relaxed),
        }
    }

    /// Frames started, counted at each vertical sync.
    pub fn frame_counter(&self) -> u32 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Active lines shown as filler because no encoded line was ready.
    pub fn starved_lines(&self) -> u32 {
        self.starved.load(Ordering::Relaxed)
    }

    pub fn line_states(&self) -> [SlotState; POOL_SIZE] {
        self.lines.states()
    }

    pub fn encoded_states(&self) -> [SlotState; POOL_SIZE] {
        self.encoded.states()
    }

    /// Address of encoded buffer `index`.
    pub fn encoded_address(&self, index: usize) -> u32 {
        self.encoded.address(index) as u32
    }

    pub(crate) fn take_encoded(&self) -> Option<Slot> {
        self.encoded.take_ready(SlotState::Consuming)
    }

    pub(crate) fn encoded(&self, slot: &Slot) -> &[u32; WORDS] {
        self.encoded.get(slot)
    }

    /// Mark a shown buffer as waiting for the hardware to finish with it.
    pub(crate) fn retire(&self, slot: &Slot) {
        self.encoded.mark(slot, SlotState::Retiring);
    }

    pub(crate) fn release_encoded(&self, slot: Slot) {
        self.encoded.put_free(slot);
    }

    // The interrupt is the only writer of both counters.

    pub(crate) fn publish_frame(&self, frame: u32) {
        self.frames.store(frame, Ordering::Relaxed);
    }

    pub(crate) fn count_starved(&self) {
        let n = self.starved.load(Ordering::Relaxed);
        self.starved.store(n.wrapping_add(1), Ordering::Relaxed);
    }
}

impl<const PIXELS: usize, const WORDS: usize> Default for Pipeline<PIXELS, WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

/// A raw line buffer checked out by the application.
///
/// Submit it with [`Pipeline::set_line_buffer`]; dropping it instead returns
/// it unused to the free queue.
pub struct LineBuffer<'p, const PIXELS: usize> {
    pool: &'p BufferPool<[u16; PIXELS], POOL_SIZE>,
    slot: Slot,
}

impl<'p, const PIXELS: usize> LineBuffer<'p, PIXELS> {
    fn into_slot(self) -> Slot {
        let this = core::mem::ManuallyDrop::new(self);
        Slot(this.slot.0)
    }
}

impl<'p, const PIXELS: usize> Deref for LineBuffer<'p, PIXELS> {
    type Target = [u16; PIXELS];
    fn deref(&self) -> &Self::Target {
        self.pool.get(&self.slot)
    }
}

impl<'p, const PIXELS: usize> DerefMut for LineBuffer<'p, PIXELS> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.pool.get_mut(&mut self.slot)
    }
}

impl<'p, const PIXELS: usize> Drop for LineBuffer<'p, PIXELS> {
    fn drop(&mut self) {
        self.pool.put_free(Slot(self.slot.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    type TestPipeline = Pipeline<4, 6>;

    fn copy_encode(src: &[u16; 4], dst: &mut [u32; 6]) {
        dst.fill(0);
        for (d, s) in dst.iter_mut().zip(src) {
            *d = *s as u32;
        }
    }

    #[test]
    fn allocate_only_once() {
        let pipeline = TestPipeline::new();
        assert!(pipeline.try_get_line_buffer().is_none());
        assert_eq!(pipeline.allocate(), Ok(()));
        assert_eq!(pipeline.allocate(), Err(Error::PipelineInUse));
        assert_eq!(pipeline.occupancy().free_lines, POOL_SIZE);
    }

    #[test]
    fn dropped_line_buffer_returns_to_free() {
        let pipeline = TestPipeline::new();
        pipeline.allocate().unwrap();
        let buf = pipeline.get_line_buffer();
        assert_eq!(pipeline.occupancy().free_lines, POOL_SIZE - 1);
        drop(buf);
        assert_eq!(pipeline.occupancy().free_lines, POOL_SIZE);
        assert_eq!(pipeline.line_states(), [SlotState::Free; POOL_SIZE]);
    }

    #[test]
    fn encode_moves_line_through_both_pools() {
        let pipeline = TestPipeline::new();
        pipeline.allocate().unwrap();

        let mut buf = pipeline.get_line_buffer();
        *buf = [1, 2, 3, 4];
        pipeline.set_line_buffer(buf);
        pipeline.wait_for_valid_line();
        assert_eq!(pipeline.occupancy().ready_lines, 1);

        let occupancy = pipeline.encode_next(&mut copy_encode);
        assert_eq!(occupancy, Occupancy {
            free_lines: 2, ready_lines: 0, free_encoded: 2, ready_encoded: 0, starving: false,
        });
        assert!(!occupancy.saturated());
        assert_eq!(pipeline.occupancy(), Occupancy {
            free_lines: 3, ready_lines: 0, free_encoded: 2, ready_encoded: 1, starving: false,
        });

        let slot = pipeline.take_encoded().unwrap();
        assert_eq!(pipeline.encoded(&slot), &[1, 2, 3, 4, 0, 0]);
        pipeline.retire(&slot);
        assert_eq!(pipeline.encoded_states()[slot.index()], SlotState::Retiring);
        pipeline.release_encoded(slot);
        assert_eq!(pipeline.occupancy().free_encoded, POOL_SIZE);
    }

    #[test]
    fn starved_counter_counts() {
        let pipeline = TestPipeline::new();
        for _ in 0..3 {
            pipeline.count_starved();
        }
        pipeline.publish_frame(7);
        assert_eq!(pipeline.starved_lines(), 3);
        assert_eq!(pipeline.frame_counter(), 7);
    }

    #[test]
    fn full_encoded_queue_is_not_saturation() {
        let pipeline = TestPipeline::new();
        pipeline.allocate().unwrap();
        for _ in 0..POOL_SIZE {
            let buf = pipeline.get_line_buffer();
            pipeline.set_line_buffer(buf);
        }
        for _ in 0..POOL_SIZE {
            assert!(!pipeline.encode_next(&mut copy_encode).saturated());
        }
        assert_eq!(pipeline.occupancy().ready_encoded, POOL_SIZE);
        assert!(!pipeline.occupancy().saturated());
    }

    #[test]
    fn starving_with_lines_queued_is_saturation() {
        let pipeline = TestPipeline::new();
        pipeline.allocate().unwrap();
        for _ in 0..2 {
            let buf = pipeline.get_line_buffer();
            pipeline.set_line_buffer(buf);
        }
        pipeline.count_starved();
        assert!(pipeline.occupancy().starving);

        let occupancy = pipeline.encode_next(&mut copy_encode);
        assert!(occupancy.starving);
        assert_eq!(occupancy.ready_lines, 1);
        assert!(occupancy.saturated());

        // Reported once per starved line, not again on the next step.
        let occupancy = pipeline.encode_next(&mut copy_encode);
        assert!(!occupancy.starving);
        assert!(!occupancy.saturated());
    }

    #[test]
    fn starving_with_nothing_submitted_is_not_saturation() {
        let pipeline = TestPipeline::new();
        pipeline.allocate().unwrap();
        let buf = pipeline.get_line_buffer();
        pipeline.set_line_buffer(buf);
        pipeline.count_starved();
        let occupancy = pipeline.encode_next(&mut copy_encode);
        assert!(occupancy.starving);
        assert!(!occupancy.saturated());
    }

    #[test]
    fn lines_cross_threads_in_order() {
        const LINES: u16 = 500;
        let pipeline = Arc::new(TestPipeline::new());
        pipeline.allocate().unwrap();

        let producer = {
            let pipeline = pipeline.clone();
            thread::spawn(move || {
                for i in 0..LINES {
                    let mut buf = pipeline.get_line_buffer();
                    *buf = [i; 4];
                    pipeline.set_line_buffer(buf);
                }
            })
        };
        let encoder = {
            let pipeline = pipeline.clone();
            thread::spawn(move || {
                for _ in 0..LINES {
                    pipeline.encode_next(&mut copy_encode);
                }
            })
        };

        for i in 0..LINES {
            let slot = loop {
                match pipeline.take_encoded() {
                    Some(slot) => break slot,
                    None => thread::yield_now(),
                }
            };
            assert_eq!(pipeline.encoded(&slot)[..4], [i as u32; 4]);
            pipeline.release_encoded(slot);
        }

        producer.join().unwrap();
        encoder.join().unwrap();
        assert_eq!(pipeline.occupancy(), Occupancy {
            free_lines: 3, ready_lines: 0, free_encoded: 3, ready_encoded: 0, starving: false,
        });
    }
}

//! DVI output driver.
//!
//! # Concept of operation
//!
//! Each of the three TMDS lanes is fed by its own serialiser, which shifts out
//! two 10-bit characters per 32-bit word taken from its TX FIFO. A pair of DMA
//! channels per lane keeps the FIFOs topped up: the data channel moves words,
//! and each time it finishes a segment it chains to the control channel, which
//! loads the next segment's descriptor from the lane's armed slot into the data
//! channel and restarts it. A whole scanline is therefore a short list of
//! descriptors per lane which the hardware runs through without the CPU.
//!
//! Four lists are built at startup (see [`ListKind`]). The sync lane's back porch
//! segment is the only one which raises an interrupt, and it fires as the
//! active segment of the current line begins. By then the hardware has loaded
//! every descriptor of the current line, so [`Dvi::dma_isr()`] can copy the
//! next line's list into the armed slots while the active segment is sent,
//! and the control channels pick it up when the active segment completes.
//!
//! # Line pipeline
//!
//! Lines flow through a [`Pipeline`] shared with the application:
//!
//! 1. The application takes a free raw line with [`Pipeline::get_line_buffer()`],
//!    draws into it, and submits it with [`Pipeline::set_line_buffer()`].
//! 2. The encoder loop ([`Pipeline::run_encoder()`]) encodes submitted lines into
//!    free encoded buffers, in order, and frees the raw lines.
//! 3. On each active line the interrupt takes the next encoded buffer if it is
//!    not already holding one, and arms the active list pointing at it. Each
//!    encoded buffer is shown for `lines_per_buffer` consecutive lines.
//!    If nothing is ready the error list is armed instead and the line is
//!    counted in [`Pipeline::starved_lines()`].
//! 4. A buffer which has been shown for the last time is held for
//!    [`RELEASE_DELAY`] more interrupts, until the hardware has certainly
//!    finished reading it, and is then freed for the encoder.
//!
//! # Driver operations sequence
//!
//! 1. [`Dvi::new()`] checks the timing and buffer geometry, claims channels,
//!    builds the lists and frees every pipeline buffer.
//! 2. The application starts submitting lines, and [`Pipeline::wait_for_valid_line()`]
//!    blocks until the first one arrives.
//! 3. [`Dvi::start()`] arms a blank line, starts all lanes together, waits for
//!    every serialiser FIFO to fill, then enables the serialisers and pixel clock.
//! 4. The DMA interrupt fires once per line, call [`Dvi::dma_isr()`].

use crate::chain::{ArmSlots, Lane};
use crate::dma::Dma;
use crate::hw::{DmaHardware, Serialiser};
use crate::list::ListKind;
use crate::pipeline::Pipeline;
use crate::pool::Slot;
use crate::release::{ReleaseQueue, RELEASE_DELAY};
use crate::timing::{LineCounter, LineState, Timing};
use crate::{Error, Result};

/// Driver settings.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Consecutive scanlines each encoded buffer is shown for.
    pub lines_per_buffer: u32,
}

impl Config {
    /// Each line shown twice, so 240 application lines fill a 480 line mode.
    pub const DEFAULT: Config = Config { lines_per_buffer: 2 };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

pub struct Dvi<'a, H, S, const PIXELS: usize, const WORDS: usize> {
    timing: Timing,
    config: Config,
    dma: Dma<'a, H>,
    serialiser: S,
    pipeline: &'a Pipeline<PIXELS, WORDS>,
    counter: LineCounter,
    current: Option<Slot>,
    release: ReleaseQueue<Slot, RELEASE_DELAY>,
}

impl<'a, H, S, const PIXELS: usize, const WORDS: usize> Dvi<'a, H, S, PIXELS, WORDS>
    where H: DmaHardware, S: Serialiser
{
    /// Set up the DMA for `timing` and take ownership of `pipeline`'s buffers.
    ///
    /// `PIXELS` must equal the active width and `WORDS` hold three lanes of
    /// two pixels per word.
    pub fn new(timing: Timing, config: Config, hw: H, mut serialiser: S,
               slots: &'a mut ArmSlots, pipeline: &'a Pipeline<PIXELS, WORDS>) -> Result<Self>
    {
        timing.validate()?;
        if config.lines_per_buffer == 0 {
            return Err(Error::ZeroLinesPerBuffer);
        }
        if PIXELS != timing.h_active_pixels as usize || WORDS != PIXELS / 2 * Lane::ALL.len() {
            return Err(Error::GeometryMismatch {
                pixels: PIXELS, words: WORDS, h_active_pixels: timing.h_active_pixels,
            });
        }

        serialiser.enable(false);
        let dma = Dma::new(&timing, hw, &serialiser, slots)?;
        pipeline.allocate()?;

        Ok(Dvi {
            timing,
            config,
            dma,
            serialiser,
            pipeline,
            counter: LineCounter::new(),
            current: None,
            release: ReleaseQueue::new(),
        })
    }

    /// Start output.
    ///
    /// Lines should already be queued, see [`Pipeline::wait_for_valid_line()`].
    pub fn start(&mut self) {
        self.dma.start();
        for lane in Lane::ALL {
            while !self.serialiser.tx_fifo_full(lane) {
                core::hint::spin_loop();
            }
        }
        self.serialiser.enable(true);
    }

    /// Handle the scanline interrupt, arming the list for the next line.
    pub fn dma_isr(&mut self) {
        self.dma.clear_interrupt_req();

        let state = self.counter.advance(&self.timing);
        self.pipeline.publish_frame(self.counter.frame());

        if let Some(slot) = self.release.advance() {
            self.pipeline.release_encoded(slot);
        }

        self.dma.wait_for_last_block_transfer_to_start(&self.timing);

        if state == LineState::Active && self.current.is_none() {
            self.current = self.pipeline.take_encoded();
            if self.current.is_none() {
                self.pipeline.count_starved();
            }
        }

        let encoded = match (&self.current, state) {
            (Some(slot), LineState::Active) => Some(&self.pipeline.encoded(slot)[..]),
            _ => None,
        };
        self.dma.update(state, encoded, &self.timing);

        if state == LineState::Active {
            let line = self.counter.line();
            let lpb = self.config.lines_per_buffer;
            if line % lpb == lpb - 1 || line + 1 == self.timing.v_active_lines {
                if let Some(slot) = self.current.take() {
                    self.pipeline.retire(&slot);
                    if let Some(displaced) = self.release.hold(slot) {
                        self.pipeline.release_encoded(displaced);
                    }
                }
            }
        }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn counter(&self) -> &LineCounter {
        &self.counter
    }

    pub fn pipeline(&self) -> &'a Pipeline<PIXELS, WORDS> {
        self.pipeline
    }

    /// The list armed by the last interrupt.
    pub fn armed(&self) -> Option<ListKind> {
        self.dma.armed()
    }

    pub fn dma(&self) -> &Dma<'a, H> {
        &self.dma
    }

    pub fn hardware(&self) -> &H {
        self.dma.hardware()
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        self.dma.hardware_mut()
    }

    pub fn serialiser(&self) -> &S {
        &self.serialiser
    }

    /// Encoded buffers held waiting for the hardware to finish with them.
    pub fn pending_release(&self) -> usize {
        self.release.pending()
    }

    /// True while an encoded buffer is being shown.
    pub fn holding_buffer(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{SlotState, POOL_SIZE};
    use crate::sim::{SimDma, SimSerialiser};
    use crate::timing::VGA_640X480P60;
    use crate::tmds::ERROR_SYMBOLS;

    const PIXELS: usize = 640;
    const WORDS: usize = 960;
    const LINE_BYTES: u32 = (WORDS * 4) as u32;

    type TestPipeline = Pipeline<PIXELS, WORDS>;
    type TestDvi<'a> = Dvi<'a, SimDma, SimSerialiser, PIXELS, WORDS>;

    /// VGA lines with a short frame.
    const TIMING: Timing = Timing {
        v_front_porch: 2, v_sync_width: 1, v_back_porch: 2, v_active_lines: 6,
        ..VGA_640X480P60
    };

    fn make<'a>(slots: &'a mut ArmSlots, pipeline: &'a TestPipeline) -> TestDvi<'a> {
        Dvi::new(TIMING, Config::DEFAULT, SimDma::new(), SimSerialiser::new(), slots, pipeline).unwrap()
    }

    /// Copy each pixel pair's first pixel into all three lanes.
    fn encode(src: &[u16; PIXELS], dst: &mut [u32; WORDS]) {
        for (i, word) in dst.iter_mut().enumerate() {
            *word = src[(i % (PIXELS / 2)) * 2] as u32;
        }
    }

    /// Submit and encode as many lines as the pools allow, returning how many
    /// encoder steps reported saturation.
    fn feed(pipeline: &TestPipeline, next: &mut u16) -> usize {
        let mut saturated = 0;
        while let Some(mut buf) = pipeline.try_get_line_buffer() {
            buf.fill(*next);
            pipeline.set_line_buffer(buf);
            *next += 1;
        }
        loop {
            let o = pipeline.occupancy();
            if o.free_encoded == 0 || o.ready_lines == 0 {
                break;
            }
            if pipeline.encode_next(&mut encode).saturated() {
                saturated += 1;
            }
        }
        saturated
    }

    fn next_line(dvi: &mut TestDvi) {
        assert!(dvi.hardware_mut().run_until_irq());
        dvi.dma_isr();
    }

    /// Index of the encoded buffer containing `addr`, if any.
    fn buffer_at(pipeline: &TestPipeline, addr: u32) -> Option<usize> {
        (0..POOL_SIZE).find(|&i| {
            addr.wrapping_sub(pipeline.encoded_address(i)) < LINE_BYTES
        })
    }

    fn check_invariant(dvi: &TestDvi, pipeline: &TestPipeline) {
        let states = pipeline.encoded_states();
        let count = |s: SlotState| states.iter().filter(|&&x| x == s).count();
        assert_eq!(count(SlotState::Unallocated), 0);
        assert_eq!(count(SlotState::Producing), 0);
        assert_eq!(count(SlotState::Consuming), dvi.holding_buffer() as usize);
        assert_eq!(count(SlotState::Retiring), dvi.pending_release());
        assert_eq!(count(SlotState::Free) + count(SlotState::Ready)
                   + count(SlotState::Consuming) + count(SlotState::Retiring), POOL_SIZE);

        // Nothing the hardware is reading or about to read has been freed.
        let hw = dvi.hardware();
        for lane in Lane::ALL {
            let cfg = dvi.dma().lanes()[lane];
            let reads = hw.current(cfg.data).into_iter().chain(hw.armed(cfg.control).iter().copied());
            for desc in reads {
                if let Some(i) = buffer_at(pipeline, desc.read_addr()) {
                    assert!(matches!(states[i], SlotState::Consuming | SlotState::Retiring),
                            "buffer {} is {:?} while still in use", i, states[i]);
                }
            }
        }
    }

    #[test]
    fn geometry_and_config_are_checked() {
        let pipeline = TestPipeline::new();
        let mut slots = ArmSlots::new();
        let narrow = Timing { h_active_pixels: 320, ..TIMING };
        let err = Dvi::new(narrow, Config::DEFAULT, SimDma::new(), SimSerialiser::new(),
                           &mut slots, &pipeline).err();
        assert_eq!(err, Some(Error::GeometryMismatch { pixels: 640, words: 960, h_active_pixels: 320 }));

        let err = Dvi::new(TIMING, Config { lines_per_buffer: 0 }, SimDma::new(), SimSerialiser::new(),
                           &mut slots, &pipeline).err();
        assert_eq!(err, Some(Error::ZeroLinesPerBuffer));

        let odd = Timing { h_front_porch: 15, ..TIMING };
        let err = Dvi::new(odd, Config::DEFAULT, SimDma::new(), SimSerialiser::new(),
                           &mut slots, &pipeline).err();
        assert_eq!(err, Some(Error::Unaligned("h_front_porch")));

        let square = Timing { h_front_porch: 160, h_sync_width: 320, h_back_porch: 160, ..TIMING };
        let err = Dvi::new(square, Config::DEFAULT, SimDma::new(), SimSerialiser::new(),
                           &mut slots, &pipeline).err();
        assert_eq!(err, Some(Error::AmbiguousFence("h_blank")));
    }

    #[test]
    fn pipeline_backs_only_one_output() {
        let pipeline = TestPipeline::new();
        let mut slots = ArmSlots::new();
        let mut slots2 = ArmSlots::new();
        let _dvi = make(&mut slots, &pipeline);
        let err = Dvi::new(TIMING, Config::DEFAULT, SimDma::new(), SimSerialiser::new(),
                           &mut slots2, &pipeline).err();
        assert_eq!(err, Some(Error::PipelineInUse));
    }

    #[test]
    fn start_enables_serialisers_after_dma() {
        let pipeline = TestPipeline::new();
        let mut slots = ArmSlots::new();
        let mut dvi = make(&mut slots, &pipeline);
        assert!(!dvi.serialiser().enabled());
        dvi.start();
        assert!(dvi.serialiser().enabled());
        assert_eq!(dvi.armed(), Some(ListKind::VBlankNoSync));
        assert_eq!(dvi.hardware().started(), 0b010101);
    }

    #[test]
    fn starved_lines_show_the_error_list() {
        let pipeline = TestPipeline::new();
        let mut slots = ArmSlots::new();
        let mut dvi = make(&mut slots, &pipeline);
        dvi.start();

        for _ in 0..TIMING.v_total_lines() {
            next_line(&mut dvi);
            let expected = match dvi.counter().state() {
                LineState::Active => ListKind::ActiveError,
                LineState::Sync => ListKind::VBlankSync,
                _ => ListKind::VBlankNoSync,
            };
            assert_eq!(dvi.armed(), Some(expected));
            if expected == ListKind::ActiveError {
                for lane in Lane::ALL {
                    let control = dvi.dma().lanes()[lane].control;
                    let active = dvi.hardware().armed(control).last().copied().unwrap();
                    assert_eq!(active.read_addr(), &ERROR_SYMBOLS[lane.index()] as *const u32 as u32);
                }
            }
        }
        assert_eq!(pipeline.starved_lines(), TIMING.v_active_lines);
        assert_eq!(pipeline.frame_counter(), 1);
        assert_eq!(dvi.hardware().faults(), 0);
    }

    #[test]
    fn encoded_lines_are_shown_in_order_and_released() {
        let pipeline = TestPipeline::new();
        let mut slots = ArmSlots::new();
        let mut dvi = make(&mut slots, &pipeline);
        let mut next = 0;
        feed(&pipeline, &mut next);
        dvi.start();

        let mut shown = std::vec::Vec::new();
        for _ in 0..TIMING.v_total_lines() * 3 {
            feed(&pipeline, &mut next);
            next_line(&mut dvi);
            check_invariant(&dvi, &pipeline);

            if dvi.counter().state() == LineState::Active {
                assert_eq!(dvi.armed(), Some(ListKind::Active));
                let blue = dvi.dma().list(ListKind::Active).active(Lane::Blue).copied().unwrap();
                let index = buffer_at(&pipeline, blue.read_addr()).unwrap();
                assert_eq!(blue.read_addr(), pipeline.encoded_address(index));
                let red = dvi.dma().list(ListKind::Active).active(Lane::Red).copied().unwrap();
                assert_eq!(red.read_addr(), blue.read_addr().wrapping_add(2 * 320 * 4));
                shown.push(index);
            }
        }

        assert_eq!(pipeline.starved_lines(), 0);
        assert_eq!(pipeline.frame_counter(), 3);
        assert_eq!(dvi.hardware().faults(), 0);
        assert_eq!(shown.len(), 18);
        // Each buffer is shown on two consecutive lines, cycling through the pool.
        for (i, pair) in shown.chunks(2).enumerate() {
            assert_eq!(pair[0], pair[1]);
            assert_eq!(pair[0], i % POOL_SIZE);
        }
    }

    #[test]
    fn encoded_line_content_follows_submission_order() {
        let pipeline = TestPipeline::new();
        let mut slots = ArmSlots::new();
        let mut dvi = make(&mut slots, &pipeline);
        let mut next = 0;
        feed(&pipeline, &mut next);
        dvi.start();

        let mut seen = std::vec::Vec::new();
        for _ in 0..TIMING.v_total_lines() * 2 {
            feed(&pipeline, &mut next);
            next_line(&mut dvi);
            if let Some(slot) = &dvi.current {
                let value = pipeline.encoded(slot)[0];
                if seen.last() != Some(&value) {
                    seen.push(value);
                }
            }
        }
        assert_eq!(seen, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn odd_active_height_does_not_carry_a_buffer_into_blanking() {
        let pipeline = TestPipeline::new();
        let mut slots = ArmSlots::new();
        let timing = Timing { v_active_lines: 5, ..TIMING };
        let mut dvi = Dvi::new(timing, Config::DEFAULT, SimDma::new(), SimSerialiser::new(),
                               &mut slots, &pipeline).unwrap();
        let mut next = 0;
        feed(&pipeline, &mut next);
        dvi.start();
        for _ in 0..timing.v_total_lines() * 2 {
            feed(&pipeline, &mut next);
            next_line(&mut dvi);
            if dvi.counter().state() != LineState::Active {
                assert!(!dvi.holding_buffer());
            }
            check_invariant(&dvi, &pipeline);
        }
        assert_eq!(pipeline.starved_lines(), 0);
    }

    #[test]
    fn steady_frames_report_no_saturation() {
        let pipeline = TestPipeline::new();
        let mut slots = ArmSlots::new();
        let timing = VGA_640X480P60;
        let mut dvi = Dvi::new(timing, Config::DEFAULT, SimDma::new(), SimSerialiser::new(),
                               &mut slots, &pipeline).unwrap();
        let mut next = 0;
        let mut saturated = feed(&pipeline, &mut next);
        dvi.start();

        // Blanking leaves the encoded queue full for many lines at a time.
        for _ in 0..timing.v_total_lines() * 3 {
            saturated += feed(&pipeline, &mut next);
            next_line(&mut dvi);
        }
        assert_eq!(pipeline.frame_counter(), 3);
        assert_eq!(pipeline.starved_lines(), 0);
        assert_eq!(saturated, 0);
    }

    #[test]
    fn encoder_stall_is_reported_as_saturation() {
        let pipeline = TestPipeline::new();
        let mut slots = ArmSlots::new();
        let mut dvi = make(&mut slots, &pipeline);
        let mut next = 0;
        feed(&pipeline, &mut next);
        dvi.start();

        // Lines keep arriving but nothing encodes them.
        for _ in 0..POOL_SIZE {
            let buf = pipeline.get_line_buffer();
            pipeline.set_line_buffer(buf);
        }
        while pipeline.starved_lines() == 0 {
            next_line(&mut dvi);
        }

        assert!(pipeline.encode_next(&mut encode).saturated());
        assert!(!pipeline.encode_next(&mut encode).saturated());
        assert_eq!(dvi.hardware().faults(), 0);
    }
}

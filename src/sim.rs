//! Software model of the DMA controller and serialisers.
//!
//! Time is measured in words sent per lane. Every lane's serialiser takes one
//! word per tick, so all running data channels advance together; [`SimDma::step`]
//! jumps straight to the next point where some transfer completes, performs the
//! chaining the hardware would, and raises the interrupt where a completed
//! descriptor asks for one.

use heapless::Vec;

use crate::chain::{ChainDescriptor, Lane, LaneConfig, MAX_SEGMENTS, N_TMDS_LANES};
use crate::hw::{DmaHardware, Serialiser};

/// Channels on the modelled controller.
pub const N_CHANNELS: u8 = 12;

#[derive(Clone, Debug, Default)]
struct SimLane {
    control: u8,
    data: u8,
    armed: Vec<ChainDescriptor, MAX_SEGMENTS>,
    next: usize,
    current: Option<ChainDescriptor>,
    remaining: u32,
}

impl SimLane {
    /// The control channel copies the next armed descriptor into the data channel.
    fn trigger(&mut self) -> bool {
        match self.armed.get(self.next) {
            Some(desc) => {
                self.current = Some(*desc);
                self.remaining = desc.transfer_count();
                self.next += 1;
                true
            }
            None => {
                self.current = None;
                false
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SimDma {
    channels: u8,
    claimed: u8,
    lanes: Vec<SimLane, N_TMDS_LANES>,
    irq_enabled: u32,
    irq_pending: u32,
    started: u32,
    elapsed: u64,
    faults: u32,
}

impl SimDma {
    pub fn new() -> Self {
        Self::with_channels(N_CHANNELS)
    }

    /// A controller with only `channels` channels free.
    pub fn with_channels(channels: u8) -> Self {
        SimDma {
            channels,
            claimed: 0,
            lanes: Vec::new(),
            irq_enabled: 0,
            irq_pending: 0,
            started: 0,
            elapsed: 0,
            faults: 0,
        }
    }

    fn lane_by_data(&self, channel: u8) -> Option<&SimLane> {
        self.lanes.iter().find(|l| l.data == channel)
    }

    /// Run until the next transfer completes.
    ///
    /// Returns false if no data channel is running.
    pub fn step(&mut self) -> bool {
        let dt = match self.lanes.iter().filter(|l| l.current.is_some()).map(|l| l.remaining).min() {
            Some(dt) => dt,
            None => return false,
        };
        self.elapsed += dt as u64;

        for lane in self.lanes.iter_mut() {
            let desc = match lane.current {
                Some(desc) => desc,
                None => continue,
            };
            lane.remaining -= dt;
            if lane.remaining != 0 {
                continue;
            }
            let bit = 1 << lane.data;
            if desc.raises_irq() {
                self.irq_pending |= bit;
            }
            if desc.ctrl().chained_to() == lane.control && lane.control != lane.data {
                if !lane.trigger() {
                    self.faults += 1;
                }
            } else {
                lane.current = None;
            }
        }
        true
    }

    /// Run until an enabled interrupt is pending.
    ///
    /// Returns false if the channels stopped first.
    pub fn run_until_irq(&mut self) -> bool {
        while !self.irq_pending() {
            if !self.step() {
                return false;
            }
        }
        true
    }

    pub fn irq_pending(&self) -> bool {
        self.irq_pending & self.irq_enabled != 0
    }

    pub fn irq_enabled(&self) -> u32 {
        self.irq_enabled
    }

    /// Mask of channels started together by [`DmaHardware::start_channels`].
    pub fn started(&self) -> u32 {
        self.started
    }

    /// Descriptors the control channel `control` was last pointed at.
    pub fn armed(&self, control: u8) -> &[ChainDescriptor] {
        match self.lanes.iter().find(|l| l.control == control) {
            Some(lane) => &lane.armed,
            None => &[],
        }
    }

    /// Descriptor the data channel `channel` is currently running.
    pub fn current(&self, channel: u8) -> Option<ChainDescriptor> {
        self.lane_by_data(channel).and_then(|l| l.current)
    }

    /// Words sent per lane since starting.
    pub fn elapsed_words(&self) -> u64 {
        self.elapsed
    }

    /// Times a control channel was triggered with nothing armed.
    pub fn faults(&self) -> u32 {
        self.faults
    }
}

impl Default for SimDma {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaHardware for SimDma {
    fn claim_channel(&mut self) -> Option<u8> {
        if self.claimed >= self.channels {
            return None;
        }
        self.claimed += 1;
        Some(self.claimed - 1)
    }

    fn arm_control(&mut self, lane: &LaneConfig, blocks: &[ChainDescriptor]) {
        let idx = match self.lanes.iter().position(|l| l.control == lane.control) {
            Some(idx) => idx,
            None => {
                let new = SimLane { control: lane.control, data: lane.data, ..Default::default() };
                if self.lanes.push(new).is_err() {
                    return;
                }
                self.lanes.len() - 1
            }
        };
        let sim = &mut self.lanes[idx];
        sim.armed.clear();
        let _ = sim.armed.extend_from_slice(blocks);
        sim.next = 0;
    }

    fn start_channels(&mut self, mask: u32) {
        self.started |= mask;
        for lane in self.lanes.iter_mut() {
            if mask & (1 << lane.control) != 0 && !lane.trigger() {
                self.faults += 1;
            }
        }
    }

    fn transfer_count(&self, channel: u8) -> u32 {
        self.current(channel).map_or(0, |d| d.transfer_count())
    }

    fn set_irq_mask(&mut self, enable: u32, affected: u32) {
        self.irq_enabled = (self.irq_enabled & !affected) | (enable & affected);
    }

    fn clear_irq(&mut self, mask: u32) {
        self.irq_pending &= !mask;
    }
}

/// Serialisers whose FIFOs are always full.
#[derive(Clone, Debug, Default)]
pub struct SimSerialiser {
    enabled: bool,
}

impl SimSerialiser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Serialiser for SimSerialiser {
    fn tx_fifo(&self, lane: Lane) -> u32 {
        0x5020_0010 + 4 * lane.index() as u32
    }

    fn dreq(&self, lane: Lane) -> u8 {
        lane.index() as u8
    }

    fn tx_fifo_full(&self, _lane: Lane) -> bool {
        true
    }

    fn enable(&mut self, enable: bool) {
        self.enabled = enable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ArmSlots, PerLane};
    use crate::list::{ActiveSource, DescriptorList};
    use crate::timing::VGA_640X480P60;

    fn setup() -> (SimDma, PerLane<LaneConfig>) {
        let mut hw = SimDma::new();
        let ser = SimSerialiser::new();
        let lanes = PerLane::from_fn(|lane| LaneConfig {
            control: hw.claim_channel().unwrap(),
            data: hw.claim_channel().unwrap(),
            dreq: ser.dreq(lane),
            tx_fifo: ser.tx_fifo(lane),
        });
        hw.set_irq_mask(1 << lanes[Lane::SYNC].data, 0xfff);
        (hw, lanes)
    }

    #[test]
    fn line_runs_and_interrupts_at_back_porch() {
        let timing = VGA_640X480P60;
        let (mut hw, lanes) = setup();
        let mut slots = ArmSlots::new();
        let mut list = DescriptorList::new();
        list.setup_for_vblank(&timing, &lanes, false);
        list.load(&lanes, &mut slots, &mut hw);
        hw.start_channels(0b010101);

        assert!(hw.run_until_irq());
        assert_eq!(hw.elapsed_words(), 80);
        for lane in lanes.0.iter() {
            assert_eq!(hw.transfer_count(lane.data), 320);
        }
        hw.clear_irq(1 << lanes[Lane::SYNC].data);

        // Nothing re-armed, so every lane runs off the end of its list.
        assert!(hw.step());
        assert_eq!(hw.faults(), 3);
        assert!(!hw.step());
        assert!(!hw.irq_pending());
    }

    #[test]
    fn rearming_continues_into_the_next_line() {
        let timing = VGA_640X480P60;
        let (mut hw, lanes) = setup();
        let mut slots = ArmSlots::new();
        let mut blank = DescriptorList::new();
        blank.setup_for_vblank(&timing, &lanes, false);
        let mut error = DescriptorList::new();
        error.setup_for_active(&timing, &lanes, ActiveSource::Filler);

        blank.load(&lanes, &mut slots, &mut hw);
        hw.start_channels(0b010101);
        for _ in 0..3 {
            assert!(hw.run_until_irq());
            hw.clear_irq(0xfff);
            error.load(&lanes, &mut slots, &mut hw);
        }
        assert_eq!(hw.elapsed_words(), 80 + 2 * 400);
        assert_eq!(hw.faults(), 0);
        assert_eq!(hw.current(lanes[Lane::Green].data), error.active(Lane::Green).copied());
    }
}

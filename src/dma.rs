//! Scanline DMA scheduler.
//!
//! Owns a control/data channel pair per lane and the four prebuilt lists.
//! Once per scanline the interrupt handler tells it which kind of line comes
//! next and it arms the matching list. The hardware picks the armed list up
//! by itself when the current line's last segment completes.

use crate::chain::{ArmSlots, ChannelConfig, Lane, LaneConfig, PerLane};
use crate::hw::{DmaHardware, Serialiser};
use crate::list::{ActiveSource, DescriptorList, ListKind};
use crate::timing::{LineState, Timing};
use crate::{Error, Result};

/// Control channel setup: copy four words into the data channel's
/// READ_ADDR..CTRL_TRIG, wrapping the write address every 16 bytes.
pub fn control_channel_config(lane: &LaneConfig) -> ChannelConfig {
    ChannelConfig::new(lane.control)
        .ring(true, 4)
        .read_increment(true)
        .write_increment(true)
}

pub struct Dma<'a, H> {
    hw: H,
    lanes: PerLane<LaneConfig>,
    lists: [DescriptorList; 4],
    slots: &'a mut ArmSlots,
    armed: Option<ListKind>,
}

impl<'a, H: DmaHardware> Dma<'a, H> {
    /// Claim channels for every lane and build all four lists.
    ///
    /// Only the sync lane's data channel is left able to raise the DMA
    /// interrupt, and any stale request from it is cleared.
    pub fn new<S: Serialiser>(timing: &Timing, mut hw: H, serialiser: &S, slots: &'a mut ArmSlots)
        -> Result<Self>
    {
        let mut lanes = PerLane::<LaneConfig>::default();
        for lane in Lane::ALL {
            let control = hw.claim_channel().ok_or(Error::NoFreeChannel)?;
            let data = hw.claim_channel().ok_or(Error::NoFreeChannel)?;
            lanes[lane] = LaneConfig {
                control,
                data,
                dreq: serialiser.dreq(lane),
                tx_fifo: serialiser.tx_fifo(lane),
            };
        }

        let mut lists: [DescriptorList; 4] = Default::default();
        lists[ListKind::VBlankSync.index()].setup_for_vblank(timing, &lanes, true);
        lists[ListKind::VBlankNoSync.index()].setup_for_vblank(timing, &lanes, false);
        // The active source is rewritten before this list is ever armed.
        lists[ListKind::Active.index()].setup_for_active(timing, &lanes, ActiveSource::Encoded(0));
        lists[ListKind::ActiveError.index()].setup_for_active(timing, &lanes, ActiveSource::Filler);

        let sync_mask = 1 << lanes[Lane::SYNC].data;
        let all_mask = lanes.0.iter().fold(0, |m, l| m | 1 << l.control | 1 << l.data);
        hw.clear_irq(sync_mask);
        hw.set_irq_mask(sync_mask, all_mask);

        Ok(Dma { hw, lanes, lists, slots, armed: None })
    }

    /// Arm the blanking list and trigger every lane's control channel together.
    pub fn start(&mut self) {
        self.arm(ListKind::VBlankNoSync);
        let mask = self.lanes.0.iter().fold(0, |m, l| m | 1 << l.control);
        self.hw.start_channels(mask);
    }

    /// Arm the list for the next scanline.
    ///
    /// For active lines with no encoded data the error list is armed instead.
    pub fn update(&mut self, state: LineState, encoded: Option<&[u32]>, timing: &Timing) {
        let kind = match (state, encoded) {
            (LineState::Active, Some(encoded)) => {
                self.lists[ListKind::Active.index()].update_scanline_data(timing, encoded);
                ListKind::Active
            }
            (LineState::Active, None) => ListKind::ActiveError,
            (LineState::Sync, _) => ListKind::VBlankSync,
            (LineState::FrontPorch | LineState::BackPorch, _) => ListKind::VBlankNoSync,
        };
        self.arm(kind);
    }

    fn arm(&mut self, kind: ListKind) {
        self.lists[kind.index()].load(&self.lanes, self.slots, &mut self.hw);
        self.armed = Some(kind);
    }

    /// Acknowledge the scanline interrupt.
    pub fn clear_interrupt_req(&mut self) {
        self.hw.clear_irq(1 << self.lanes[Lane::SYNC].data);
    }

    /// Spin until every lane's data channel has loaded its active segment.
    ///
    /// After this the armed slots are no longer read by the hardware until
    /// the next line starts, so a new list may be armed.
    pub fn wait_for_last_block_transfer_to_start(&self, timing: &Timing) {
        let words = timing.h_active_words();
        for lane in self.lanes.0.iter() {
            while self.hw.transfer_count(lane.data) != words {
                core::hint::spin_loop();
            }
        }
    }

    /// The list most recently armed, if any.
    pub fn armed(&self) -> Option<ListKind> {
        self.armed
    }

    pub fn list(&self, kind: ListKind) -> &DescriptorList {
        &self.lists[kind.index()]
    }

    pub fn lanes(&self) -> &PerLane<LaneConfig> {
        &self.lanes
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}

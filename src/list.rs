//! Per-lane descriptor lists covering one scanline.
//!
//! A list holds, for each lane, the segments sent in one horizontal period.
//! The sync lane splits blanking into front porch, sync and back porch so it
//! can toggle hsync, and raises the scanline interrupt when its back porch
//! completes. The other lanes send blanking as one segment. Every lane ends
//! with one segment covering the active width.

use heapless::Vec;

use crate::chain::{ArmSlots, ChainDescriptor, Lane, LaneConfig, LaneRole, PerLane, MAX_SEGMENTS};
use crate::hw::DmaHardware;
use crate::timing::{Timing, N_CHAR_PER_WORD};
use crate::tmds::{control_symbol, ERROR_SYMBOLS};

/// Ring size for repeating a single symbol word, in log2 bytes.
const SYMBOL_RING_LOG2: u8 = 2;

/// The four lists built at startup, one per kind of scanline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ListKind {
    /// Vertical blanking during vsync.
    VBlankSync = 0,
    /// Vertical blanking outside vsync, the front and back porches.
    VBlankNoSync = 1,
    /// Active video from an encoded line buffer.
    Active = 2,
    /// Active video when no encoded line was ready, filled with [`ERROR_SYMBOLS`].
    ActiveError = 3,
}

impl ListKind {
    pub const ALL: [ListKind; 4] =
        [ListKind::VBlankSync, ListKind::VBlankNoSync, ListKind::Active, ListKind::ActiveError];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Where a list's active segments read from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActiveSource {
    /// Repeat each lane's error filler symbol.
    Filler,
    /// Read lane-major data starting at this address.
    Encoded(u32),
}

impl ActiveSource {
    pub fn from_line(encoded: &[u32]) -> Self {
        Self::Encoded(encoded.as_ptr() as u32)
    }
}

/// Segments for one scanline on every lane.
#[derive(Clone, Debug, Default)]
pub struct DescriptorList {
    lanes: PerLane<Vec<ChainDescriptor, MAX_SEGMENTS>>,
}

fn push(list: &mut Vec<ChainDescriptor, MAX_SEGMENTS>, lane: &LaneConfig,
        source: u32, count: u32, ring_log2: u8, irq: bool)
{
    let mut desc = ChainDescriptor::EMPTY;
    desc.set(lane, source, count, ring_log2, irq);
    let pushed = list.push(desc);
    debug_assert!(pushed.is_ok());
}

fn symbol_addr(symbol: &'static u32) -> u32 {
    symbol as *const u32 as u32
}

/// Address of `lane`'s run within a lane-major encoded line at `base`.
fn lane_source(timing: &Timing, base: u32, lane: Lane) -> u32 {
    base.wrapping_add(lane.index() as u32 * timing.h_active_words() * 4)
}

impl DescriptorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vertical blanking line, with vsync asserted if `vsync_asserted`.
    pub fn setup_for_vblank(&mut self, timing: &Timing, lanes: &PerLane<LaneConfig>, vsync_asserted: bool) {
        let vsync = timing.v_sync_polarity == vsync_asserted;
        self.setup_blanking(timing, lanes, vsync);
        let hsync_off = symbol_addr(control_symbol(vsync, !timing.h_sync_polarity));
        let no_sync = symbol_addr(control_symbol(false, false));
        for lane in Lane::ALL {
            let source = match lane.role() {
                LaneRole::Sync => hsync_off,
                LaneRole::Data => no_sync,
            };
            push(&mut self.lanes[lane], &lanes[lane], source, timing.h_active_words(),
                 SYMBOL_RING_LOG2, false);
        }
    }

    /// Build an active video line reading from `source`.
    pub fn setup_for_active(&mut self, timing: &Timing, lanes: &PerLane<LaneConfig>, source: ActiveSource) {
        self.setup_blanking(timing, lanes, !timing.v_sync_polarity);
        for lane in Lane::ALL {
            let (addr, ring) = match source {
                ActiveSource::Encoded(base) => (lane_source(timing, base, lane), 0),
                ActiveSource::Filler => (symbol_addr(&ERROR_SYMBOLS[lane.index()]), SYMBOL_RING_LOG2),
            };
            push(&mut self.lanes[lane], &lanes[lane], addr, timing.h_active_words(), ring, false);
        }
    }

    /// Horizontal blanking for every lane, with the vsync line at `vsync`.
    fn setup_blanking(&mut self, timing: &Timing, lanes: &PerLane<LaneConfig>, vsync: bool) {
        let hsync_off = symbol_addr(control_symbol(vsync, !timing.h_sync_polarity));
        let hsync_on = symbol_addr(control_symbol(vsync, timing.h_sync_polarity));
        let no_sync = symbol_addr(control_symbol(false, false));

        for lane in Lane::ALL {
            let list = &mut self.lanes[lane];
            let cfg = &lanes[lane];
            list.clear();
            match lane.role() {
                LaneRole::Sync => {
                    push(list, cfg, hsync_off, timing.h_front_porch / N_CHAR_PER_WORD,
                         SYMBOL_RING_LOG2, false);
                    push(list, cfg, hsync_on, timing.h_sync_width / N_CHAR_PER_WORD,
                         SYMBOL_RING_LOG2, false);
                    // Fires as the active segment starts, leaving a whole
                    // line of active video to arm the next list.
                    push(list, cfg, hsync_off, timing.h_back_porch / N_CHAR_PER_WORD,
                         SYMBOL_RING_LOG2, true);
                }
                LaneRole::Data => {
                    push(list, cfg, no_sync, timing.h_blank_pixels() / N_CHAR_PER_WORD,
                         SYMBOL_RING_LOG2, false);
                }
            }
        }
    }

    /// Point every lane's active segment at its run within `encoded`.
    ///
    /// Only the source addresses change.
    pub fn update_scanline_data(&mut self, timing: &Timing, encoded: &[u32]) {
        let base = encoded.as_ptr() as u32;
        for lane in Lane::ALL {
            if let Some(active) = self.lanes[lane].last_mut() {
                active.set_read_addr(lane_source(timing, base, lane));
            }
        }
    }

    /// Copy every lane's segments into its armed slot and point the lane's
    /// control channel at it.
    ///
    /// Nothing is triggered; the data channel picks the new list up when its
    /// current transfer chains to the control channel.
    pub fn load<H: DmaHardware>(&self, lanes: &PerLane<LaneConfig>, slots: &mut ArmSlots, hw: &mut H) {
        for lane in Lane::ALL {
            let list = &self.lanes[lane];
            let slot = &mut slots.0[lane].blocks[..list.len()];
            slot.copy_from_slice(list);
            hw.arm_control(&lanes[lane], slot);
        }
    }

    pub fn lane(&self, lane: Lane) -> &[ChainDescriptor] {
        &self.lanes[lane]
    }

    /// The segment covering the active width on `lane`.
    pub fn active(&self, lane: Lane) -> Option<&ChainDescriptor> {
        self.lanes[lane].last()
    }

    /// Words sent on `lane` over the whole list.
    pub fn total_words(&self, lane: Lane) -> u32 {
        self.lanes[lane].iter().map(|d| d.transfer_count()).sum()
    }
}

//! Lanes, channel configuration words and chain descriptors.
//!
//! Each lane is driven by a pair of DMA channels. The data channel feeds the
//! lane's serialiser FIFO. The control channel writes one four-word
//! [`ChainDescriptor`] straight into the data channel's registers each time the
//! data channel finishes and chains to it, so a whole scanline runs without
//! any CPU involvement.

use core::ops::{Index, IndexMut};

/// Number of TMDS data lanes.
pub const N_TMDS_LANES: usize = 3;

/// Most segments any lane's list needs for one scanline.
pub const MAX_SEGMENTS: usize = 4;

/// One serial output lane.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lane {
    Blue = 0,
    Green = 1,
    Red = 2,
}

/// What a lane carries during blanking.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LaneRole {
    /// Carries hsync and vsync in its control characters.
    Sync,
    /// Only ever sends the no-sync control character during blanking.
    Data,
}

impl Lane {
    pub const ALL: [Lane; N_TMDS_LANES] = [Lane::Blue, Lane::Green, Lane::Red];

    /// The lane carrying sync, and the only one that raises the scanline interrupt.
    pub const SYNC: Lane = Lane::Blue;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn role(self) -> LaneRole {
        if self == Self::SYNC { LaneRole::Sync } else { LaneRole::Data }
    }
}

/// One value per lane, indexed by [`Lane`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PerLane<T>(pub [T; N_TMDS_LANES]);

impl<T> PerLane<T> {
    pub fn from_fn<F: FnMut(Lane) -> T>(mut f: F) -> Self {
        Self([f(Lane::Blue), f(Lane::Green), f(Lane::Red)])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Lane, &T)> {
        Lane::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<Lane> for PerLane<T> {
    type Output = T;
    fn index(&self, lane: Lane) -> &T {
        &self.0[lane.index()]
    }
}

impl<T> IndexMut<Lane> for PerLane<T> {
    fn index_mut(&mut self, lane: Lane) -> &mut T {
        &mut self.0[lane.index()]
    }
}

/// DMA resources for one lane, fixed once the channels are claimed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneConfig {
    /// Channel which reloads the data channel from the armed descriptors.
    pub control: u8,
    /// Channel which moves symbols into the serialiser FIFO.
    pub data: u8,
    /// Transfer request number of the serialiser's TX FIFO.
    pub dreq: u8,
    /// Address of the serialiser's TX FIFO.
    pub tx_fifo: u32,
}

/// Transfer request value meaning "unpaced".
pub const TREQ_PERMANENT: u8 = 0x3f;

/// A DMA channel CTRL register value.
///
/// Built up with the same field layout the hardware uses so it can be copied
/// straight into CTRL_TRIG by a control channel.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelConfig(pub u32);

impl ChannelConfig {
    /// Enabled, word sized, read incrementing, unpaced and chained to itself,
    /// which disables chaining.
    pub fn new(channel: u8) -> Self {
        let mut bits = 0;
        bits |= 1 << 0; // enable
        bits |= 2 << 2; // data size = 32 bits
        Self(bits)
            .read_increment(true)
            .data_request(TREQ_PERMANENT)
            .chain_to(channel)
    }

    pub fn read_increment(self, incr: bool) -> Self {
        Self((self.0 & !(1 << 4)) | (incr as u32) << 4)
    }

    pub fn write_increment(self, incr: bool) -> Self {
        Self((self.0 & !(1 << 5)) | (incr as u32) << 5)
    }

    /// Wrap the read (`write == false`) or write address at `1 << size_log2` bytes.
    /// A size of zero disables the ring.
    pub fn ring(self, write: bool, size_log2: u8) -> Self {
        let mut bits = self.0 & !0x7c0;
        bits |= (write as u32) << 10;
        bits |= ((size_log2 & 0xf) as u32) << 6;
        Self(bits)
    }

    pub fn chain_to(self, channel: u8) -> Self {
        Self((self.0 & !0x7800) | ((channel & 0xf) as u32) << 11)
    }

    pub fn data_request(self, dreq: u8) -> Self {
        Self((self.0 & !0x1f8000) | ((dreq & 0x3f) as u32) << 15)
    }

    pub fn irq_quiet(self, quiet: bool) -> Self {
        Self((self.0 & !(1 << 21)) | (quiet as u32) << 21)
    }

    pub fn enabled(&self) -> bool {
        self.0 & 1 != 0
    }

    pub fn reads_increment(&self) -> bool {
        self.0 & (1 << 4) != 0
    }

    pub fn writes_increment(&self) -> bool {
        self.0 & (1 << 5) != 0
    }

    /// Ring size in log2 bytes, zero when not wrapping.
    pub fn ring_size_log2(&self) -> u8 {
        ((self.0 >> 6) & 0xf) as u8
    }

    pub fn ring_on_write(&self) -> bool {
        self.0 & (1 << 10) != 0
    }

    pub fn chained_to(&self) -> u8 {
        ((self.0 >> 11) & 0xf) as u8
    }

    pub fn dreq(&self) -> u8 {
        ((self.0 >> 15) & 0x3f) as u8
    }

    pub fn is_irq_quiet(&self) -> bool {
        self.0 & (1 << 21) != 0
    }
}

/// One hardware transfer, laid out as the data channel's first four registers:
/// READ_ADDR, WRITE_ADDR, TRANS_COUNT and CTRL_TRIG.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainDescriptor {
    read_addr: u32,
    write_addr: u32,
    transfer_count: u32,
    ctrl: ChannelConfig,
}

impl ChainDescriptor {
    pub const EMPTY: Self = Self {
        read_addr: 0,
        write_addr: 0,
        transfer_count: 0,
        ctrl: ChannelConfig(0),
    };

    /// Configure this descriptor to send `count` words from `source` to `lane`'s FIFO.
    ///
    /// `ring_log2` wraps the source at that many log2 bytes; 2 repeats one word.
    /// Completion chains to the lane's control channel, and raises the DMA
    /// interrupt only when `irq` is set.
    pub fn set(&mut self, lane: &LaneConfig, source: u32, count: u32, ring_log2: u8, irq: bool) {
        self.read_addr = source;
        self.write_addr = lane.tx_fifo;
        self.transfer_count = count;
        self.ctrl = ChannelConfig::new(lane.data)
            .ring(false, ring_log2)
            .data_request(lane.dreq)
            .chain_to(lane.control)
            .irq_quiet(!irq);
    }

    pub fn set_read_addr(&mut self, addr: u32) {
        self.read_addr = addr;
    }

    pub fn read_addr(&self) -> u32 {
        self.read_addr
    }

    pub fn write_addr(&self) -> u32 {
        self.write_addr
    }

    pub fn transfer_count(&self) -> u32 {
        self.transfer_count
    }

    pub fn ctrl(&self) -> ChannelConfig {
        self.ctrl
    }

    /// True if completing this transfer raises the DMA interrupt.
    pub fn raises_irq(&self) -> bool {
        !self.ctrl.is_irq_quiet()
    }
}

/// Descriptor memory one lane's control channel reads from.
#[repr(C, align(16))]
#[derive(Copy, Clone, Debug)]
pub struct ArmSlot {
    pub blocks: [ChainDescriptor; MAX_SEGMENTS],
}

/// The only descriptor memory the hardware ever reads, one slot per lane.
///
/// Lists are copied in here when armed. A slot is only rewritten once the
/// hardware has loaded the last block of what was previously armed.
#[derive(Copy, Clone, Debug)]
pub struct ArmSlots(pub(crate) PerLane<ArmSlot>);

impl ArmSlots {
    pub const fn new() -> Self {
        const SLOT: ArmSlot = ArmSlot { blocks: [ChainDescriptor::EMPTY; MAX_SEGMENTS] };
        Self(PerLane([SLOT; N_TMDS_LANES]))
    }

    pub fn lane(&self, lane: Lane) -> &[ChainDescriptor; MAX_SEGMENTS] {
        &self.0[lane].blocks
    }
}

impl Default for ArmSlots {
    fn default() -> Self {
        Self::new()
    }
}

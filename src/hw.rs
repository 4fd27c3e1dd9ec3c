//! Hardware capabilities the scanout needs.
//!
//! The firmware implements these on the RP2040 DMA and PIO blocks; the `sim`
//! module implements them in software for tests and the host simulator.

use crate::chain::{ChainDescriptor, Lane, LaneConfig};

/// DMA controller operations used by the scheduler.
pub trait DmaHardware {
    /// Claim an unused channel, returning its number.
    fn claim_channel(&mut self) -> Option<u8>;

    /// Point `lane`'s control channel at `blocks` without triggering it.
    ///
    /// The control channel copies one descriptor (four words) into the data
    /// channel's READ_ADDR..CTRL_TRIG registers each time it is triggered,
    /// wrapping its write address every 16 bytes. `blocks` must stay in place
    /// until the control channel has loaded the last of them.
    fn arm_control(&mut self, lane: &LaneConfig, blocks: &[ChainDescriptor]);

    /// Trigger every channel in `mask` at once.
    fn start_channels(&mut self, mask: u32);

    /// Transfer count the data channel `channel` was last loaded with.
    fn transfer_count(&self, channel: u8) -> u32;

    /// Set the interrupt enable bits in `affected` to those in `enable`.
    fn set_irq_mask(&mut self, enable: u32, affected: u32);

    /// Acknowledge the interrupts in `mask`.
    fn clear_irq(&mut self, mask: u32);
}

/// The three serialisers turning symbol words into bits on the pins.
pub trait Serialiser {
    /// Address of `lane`'s TX FIFO.
    fn tx_fifo(&self, lane: Lane) -> u32;

    /// Transfer request number paced by `lane`'s TX FIFO.
    fn dreq(&self, lane: Lane) -> u8;

    fn tx_fifo_full(&self, lane: Lane) -> bool;

    /// Start or stop all lanes and the pixel clock together.
    fn enable(&mut self, enable: bool);
}

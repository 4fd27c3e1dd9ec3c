//! DMA controller access for the scanout.
//!
//! The HAL hands out DMA channels as typed singletons, but the scanout needs
//! to claim them by number and chain them together, so this drives the DMA
//! registers directly.

use rp2040_hal::pac;
use picodvi::{DmaHardware, LaneConfig, chain::ChainDescriptor, dma::control_channel_config};

const N_CHANNELS: u8 = 12;

/// CHx_DBG_TCR, the transfer count last loaded into channel x.
/// Not exposed by the PAC.
const DBG_TCR_BASE: u32 = 0x5000_0804;
const DBG_TCR_STRIDE: u32 = 0x40;

pub struct RpDma {
    dma: pac::DMA,
    claimed: u16,
}

impl RpDma {
    /// Take the DMA block out of reset with every channel unclaimed.
    pub fn new(dma: pac::DMA, resets: &mut pac::RESETS) -> Self {
        resets.reset.modify(|_, w| w.dma().clear_bit());
        while resets.reset_done.read().dma().bit_is_clear() {}
        RpDma { dma, claimed: 0 }
    }
}

impl DmaHardware for RpDma {
    fn claim_channel(&mut self) -> Option<u8> {
        let ch = (0..N_CHANNELS).find(|ch| self.claimed & (1 << ch) == 0)?;
        self.claimed |= 1 << ch;
        Some(ch)
    }

    fn arm_control(&mut self, lane: &LaneConfig, blocks: &[ChainDescriptor]) {
        let control = &self.dma.ch[lane.control as usize];
        let data = &self.dma.ch[lane.data as usize];
        let cfg = control_channel_config(lane);
        // NOTE(unsafe): The control channel is idle here: its last descriptor has
        // NOTE(unsafe): already been loaded, and nothing retriggers it until the
        // NOTE(unsafe): data channel completes. Writes via AL1_CTRL do not trigger.
        unsafe {
            control.ch_read_addr.write(|w| w.bits(blocks.as_ptr() as u32));
            control.ch_write_addr.write(|w| w.bits(data.ch_read_addr.as_ptr() as u32));
            control.ch_trans_count.write(|w| w.bits(4));
            control.ch_al1_ctrl.write(|w| w.bits(cfg.0));
        }
    }

    fn start_channels(&mut self, mask: u32) {
        // NOTE(unsafe): Only channels armed by this driver are in `mask`.
        self.dma.multi_chan_trigger.write(|w| unsafe { w.bits(mask) });
    }

    fn transfer_count(&self, channel: u8) -> u32 {
        let tcr = (DBG_TCR_BASE + DBG_TCR_STRIDE * channel as u32) as *const u32;
        // NOTE(unsafe): Read-only debug register, reading has no side effects.
        unsafe { core::ptr::read_volatile(tcr) }
    }

    fn set_irq_mask(&mut self, enable: u32, affected: u32) {
        // NOTE(unsafe): INTE0 is only written here, from one context.
        self.dma.inte0.modify(|r, w| unsafe {
            w.bits((r.bits() & !affected) | (enable & affected))
        });
    }

    fn clear_irq(&mut self, mask: u32) {
        // NOTE(unsafe): Write-one-to-clear.
        self.dma.ints0.write(|w| unsafe { w.bits(mask) });
    }
}

use rp2040_hal::{
    clocks::{ClockSource, ClocksManager},
    fugit::{HertzU32, RateExtU32},
    pac,
    pll::{common_configs::PLL_USB_48MHZ, setup_pll_blocking, PLLConfig},
    xosc::setup_xosc_blocking,
    Watchdog,
};

use crate::config::XOSC_HZ;

/// Frequencies for each clock in the system, in Hz.
#[derive(Copy, Clone, Debug)]
pub struct Clocks {
    pub sys_ck: u32,
    pub peri_ck: u32,
}

/// 12MHz / 1 * 126 = 1512MHz VCO, / 6 / 1 = 252MHz, ten times the 25.2MHz pixel clock.
const PLL_SYS_252MHZ: PLLConfig = PLLConfig {
    vco_freq: HertzU32::MHz(1512),
    refdiv: 1,
    post_div1: 6,
    post_div2: 1,
};

/// VREG VSEL value for a 1.20V core supply.
const VSEL_1V20: u8 = 0b1101;

/// Configure device clocks.
///
/// Raises the core supply to 1.2V first, since the system clock ends up at
/// 252MHz, well above the rated 133MHz.
pub fn setup(
    xosc: pac::XOSC, clocks: pac::CLOCKS, pll_sys: pac::PLL_SYS, pll_usb: pac::PLL_USB,
    watchdog: pac::WATCHDOG, vreg: &pac::VREG_AND_CHIP_RESET, resets: &mut pac::RESETS,
) -> Clocks {
    vreg.vreg.modify(|_, w| unsafe { w.vsel().bits(VSEL_1V20) });
    // Give the regulator about 10ms to settle, still running from the ring oscillator.
    cortex_m::asm::delay(100_000);

    let mut watchdog = Watchdog::new(watchdog);
    watchdog.enable_tick_generation((XOSC_HZ / 1_000_000) as u8);

    let xosc = match setup_xosc_blocking(xosc, XOSC_HZ.Hz()) {
        Ok(xosc) => xosc,
        Err(_) => panic!("XOSC failed to start"),
    };
    let mut clocks = ClocksManager::new(clocks);
    let pll_sys = match setup_pll_blocking(
        pll_sys, xosc.operating_frequency(), PLL_SYS_252MHZ, &mut clocks, resets)
    {
        Ok(pll) => pll,
        Err(_) => panic!("PLL_SYS failed to lock"),
    };
    let pll_usb = match setup_pll_blocking(
        pll_usb, xosc.operating_frequency(), PLL_USB_48MHZ, &mut clocks, resets)
    {
        Ok(pll) => pll,
        Err(_) => panic!("PLL_USB failed to lock"),
    };
    if clocks.init_default(&xosc, &pll_sys, &pll_usb).is_err() {
        panic!("Clock tree setup failed");
    }

    Clocks {
        sys_ck: clocks.system_clock.freq().to_Hz(),
        peri_ck: clocks.peripheral_clock.freq().to_Hz(),
    }
}

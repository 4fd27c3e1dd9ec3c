use rp2040_hal::pac;

use crate::config::{INVERT, PIN_CLOCK, PIN_TMDS};

/// IO_BANK0 GPIO_CTRL.FUNCSEL values.
const FUNCSEL_PWM: u32 = 4;
const FUNCSEL_PIO0: u32 = 6;

/// IO_BANK0 GPIO_CTRL.OUTOVER: invert the peripheral's output.
const OUTOVER_INVERT: u32 = 1 << 8;

/// PADS_BANK0 GPIOx bits.
const PADS_SLEWFAST: u32 = 1 << 0;
const PADS_DRIVE: u32 = 0b11 << 4;
const PADS_IE: u32 = 1 << 6;

/// Take IO, pads and PWM out of reset and route the DVI pins.
///
/// Each TMDS pair goes to PIO0 and the clock pair to its PWM slice.
pub fn setup(io: &pac::IO_BANK0, pads: &pac::PADS_BANK0, resets: &mut pac::RESETS) {
    resets.reset.modify(|_, w| w.io_bank0().clear_bit().pads_bank0().clear_bit().pwm().clear_bit());
    loop {
        let done = resets.reset_done.read();
        if done.io_bank0().bit_is_set() && done.pads_bank0().bit_is_set() && done.pwm().bit_is_set() {
            break;
        }
    }

    for pin in PIN_TMDS {
        configure_pad(io, pads, pin, FUNCSEL_PIO0);
        configure_pad(io, pads, pin + 1, FUNCSEL_PIO0);
    }
    configure_pad(io, pads, PIN_CLOCK, FUNCSEL_PWM);
    configure_pad(io, pads, PIN_CLOCK + 1, FUNCSEL_PWM);
}

/// 2mA drive, slow slew and input disabled, with the output optionally inverted.
fn configure_pad(io: &pac::IO_BANK0, pads: &pac::PADS_BANK0, pin: u8, funcsel: u32) {
    let pin = pin as usize;
    // NOTE(unsafe): Only the drive, slew and input enable bits are changed.
    pads.gpio[pin].modify(|r, w| unsafe {
        w.bits(r.bits() & !(PADS_DRIVE | PADS_SLEWFAST | PADS_IE))
    });
    let outover = if INVERT { OUTOVER_INVERT } else { 0 };
    // NOTE(unsafe): FUNCSEL and OUTOVER values are valid for every bank 0 pin.
    io.gpio[pin].gpio_ctrl.write(|w| unsafe { w.bits(funcsel | outover) });
}

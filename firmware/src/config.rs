//! Board wiring.

/// GPIO of each TMDS lane's positive pin, blue, green then red.
/// The negative pin is the next GPIO up.
pub const PIN_TMDS: [u8; 3] = [10, 12, 14];

/// GPIO of the pixel clock's positive pin.
/// Must be even so that both pins of the pair share a PWM slice.
pub const PIN_CLOCK: u8 = 8;

/// Swap the polarity of every differential pair.
pub const INVERT: bool = true;

/// Crystal frequency in Hz.
pub const XOSC_HZ: u32 = 12_000_000;

//! TMDS serialisers on PIO0 and the pixel clock on PWM.
//!
//! Each lane runs the same two-instruction program on its own state machine,
//! shifting one bit per system clock out of the TX FIFO and driving it onto
//! a differential pair through side-set. Ten bits make a character, so the
//! pixel clock is a PWM slice counting to ten.

use rp2040_hal::{
    pac,
    pio::{
        Buffers, InstalledProgram, PIOBuilder, PIOExt, PinDir, ShiftDirection,
        StateMachineIndex, UninitStateMachine, PIO,
    },
};
use picodvi::{Lane, Serialiser, timing::N_CHAR_PER_WORD};

use crate::config::{PIN_CLOCK, PIN_TMDS};

/// PIO CTRL bits for state machines 0 to 2.
const SM_MASK: u32 = 0b111;
const CTRL_CLKDIV_RESTART_SHIFT: u32 = 8;

/// PWM CSR bits.
const CSR_EN: u32 = 1 << 0;
const CSR_A_INV: u32 = 1 << 2;

pub struct PioSerialiser {
    _pio: PIO<pac::PIO0>,
    pwm: pac::PWM,
    tx_fifo: [u32; 3],
    dreq: [u8; 3],
}

impl PioSerialiser {
    /// Load the serialiser program into state machines 0 to 2 and set up the
    /// clock slice, leaving everything stopped.
    pub fn new(pio0: pac::PIO0, pwm: pac::PWM, resets: &mut pac::RESETS) -> Self {
        let (mut pio, sm0, sm1, sm2, _) = pio0.split(resets);

        // Single-ended bit to differential pair, jumping on each bit.
        let program = pio_proc::pio_asm!(
            ".side_set 2"
            ".origin 0"
            "out pc, 1    side 0b10"
            "out pc, 1    side 0b01"
        );
        let installed = match pio.install(&program.program) {
            Ok(installed) => installed,
            Err(_) => panic!("PIO0 has no room for the serialiser"),
        };

        // NOTE(unsafe): The state machines share one read-only program, which is
        // NOTE(unsafe): never uninstalled.
        let (share1, share2) = unsafe { (installed.share(), installed.share()) };
        let (fifo0, dreq0) = build(installed, sm0, PIN_TMDS[0]);
        let (fifo1, dreq1) = build(share1, sm1, PIN_TMDS[1]);
        let (fifo2, dreq2) = build(share2, sm2, PIN_TMDS[2]);

        // Pin A inverted and pin B not, each high for five of ten counts.
        let slice = &pwm.ch[(PIN_CLOCK as usize >> 1) & 7];
        // NOTE(unsafe): Plain values for this slice's own registers.
        unsafe {
            slice.csr.write(|w| w.bits(CSR_A_INV));
            slice.div.write(|w| w.bits(1 << 4));
            slice.top.write(|w| w.bits(9));
            slice.cc.write(|w| w.bits(5 | 5 << 16));
        }

        PioSerialiser {
            _pio: pio,
            pwm,
            tx_fifo: [fifo0, fifo1, fifo2],
            dreq: [dreq0, dreq1, dreq2],
        }
    }

    fn pio(&self) -> &pac::pio0::RegisterBlock {
        // NOTE(unsafe): Only the CTRL and FSTAT registers are accessed through
        // NOTE(unsafe): this reference, and only from the driver's context.
        unsafe { &*pac::PIO0::ptr() }
    }
}

/// Configure one lane's state machine, returning its TX FIFO address and DREQ.
fn build<SM: StateMachineIndex>(
    program: InstalledProgram<pac::PIO0>, sm: UninitStateMachine<(pac::PIO0, SM)>, pin: u8,
) -> (u32, u8) {
    let (mut sm, _, tx) = PIOBuilder::from_program(program)
        .side_set_pin_base(pin)
        .out_shift_direction(ShiftDirection::Right)
        .autopull(true)
        .pull_threshold(10 * N_CHAR_PER_WORD as u8)
        .buffers(Buffers::OnlyTx)
        .build(sm);
    sm.set_pindirs([(pin, PinDir::Output), (pin + 1, PinDir::Output)]);
    (tx.fifo_address() as u32, tx.dreq_value())
}

impl Serialiser for PioSerialiser {
    fn tx_fifo(&self, lane: Lane) -> u32 {
        self.tx_fifo[lane.index()]
    }

    fn dreq(&self, lane: Lane) -> u8 {
        self.dreq[lane.index()]
    }

    fn tx_fifo_full(&self, lane: Lane) -> bool {
        // FSTAT.TXFULL is bits 16 to 19.
        self.pio().fstat.read().bits() & (1 << (16 + lane.index())) != 0
    }

    fn enable(&mut self, enable: bool) {
        let slice = &self.pwm.ch[(PIN_CLOCK as usize >> 1) & 7];
        // NOTE(unsafe): Setting enable and clock divider restart together starts
        // NOTE(unsafe): all three state machines on the same cycle.
        unsafe {
            if enable {
                self.pio().ctrl.modify(|r, w| {
                    w.bits(r.bits() | SM_MASK | SM_MASK << CTRL_CLKDIV_RESTART_SHIFT)
                });
                slice.csr.modify(|r, w| w.bits(r.bits() | CSR_EN));
            } else {
                self.pio().ctrl.modify(|r, w| w.bits(r.bits() & !SM_MASK));
                slice.csr.modify(|r, w| w.bits(r.bits() & !CSR_EN));
            }
        }
    }
}

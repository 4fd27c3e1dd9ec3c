#![no_std]
#![no_main]

use panic_rtt_target as _;
mod clocks;
mod config;
mod gpio;
mod rp_dma;
mod serialiser;

/// Second stage bootloader for the W25Q080 flash on the Pico.
#[link_section = ".boot2"]
#[no_mangle]
#[used]
pub static BOOT2_FIRMWARE: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

/// Raw pixels per line, the active width of 640x480.
pub const PIXELS: usize = 640;

/// Encoded words per line, two characters per word on each of three lanes.
pub const WORDS: usize = PIXELS / 2 * 3;

#[rtic::app(device=rp2040_hal::pac)]
mod app {
    use crate::{clocks, gpio, rp_dma::RpDma, serialiser::PioSerialiser, PIXELS, WORDS};
    use picodvi::{
        ArmSlots, Config, Dvi, FrameBuf, Pipeline, VGA_640X480P60,
        demo::{TestCard, WIDTH, HEIGHT}, tmds::encode_line_rgb565,
    };
    use rp2040_hal::{multicore::{Multicore, Stack}, Sio};
    use rtt_target::{rtt_init_print, rprintln, rprint};

    /// Line buffers shared by the application on core 1, the encoder in idle,
    /// and the DMA interrupt.
    static PIPELINE: Pipeline<PIXELS, WORDS> = Pipeline::new();

    /// Stack for core 1.
    static mut CORE1_STACK: Stack<4096> = Stack::new();

    /// Test card frame buffer, only accessed from core 1.
    static mut FBUF: FrameBuf<WIDTH, HEIGHT> = FrameBuf::new();

    /// Driver settings. With `full-height` every scanline gets its own
    /// encoded line, and the application sends each row twice instead.
    #[cfg(not(feature = "full-height"))]
    const DVI_CONFIG: Config = Config { lines_per_buffer: 2 };
    #[cfg(not(feature = "full-height"))]
    const ROW_REPEAT: usize = 1;
    #[cfg(feature = "full-height")]
    const DVI_CONFIG: Config = Config { lines_per_buffer: 1 };
    #[cfg(feature = "full-height")]
    const ROW_REPEAT: usize = 2;

    #[shared]
    struct Shared {
        dvi: Dvi<'static, RpDma, PioSerialiser, PIXELS, WORDS>,
    }

    #[local]
    struct Local {}

    #[init(local=[slots: ArmSlots = ArmSlots::new()])]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        rtt_init_print!();
        rprintln!("picodvi initialising...");

        let mut device = cx.device;

        // Set up clocks, including the core voltage, for a 252MHz system clock.
        rprint!("  Clocks...   ");
        let clocks = clocks::setup(device.XOSC, device.CLOCKS, device.PLL_SYS, device.PLL_USB,
                                   device.WATCHDOG, &device.VREG_AND_CHIP_RESET,
                                   &mut device.RESETS);
        rprintln!("OK ({}Hz)", clocks.sys_ck);

        rprint!("  GPIO...     ");
        gpio::setup(&device.IO_BANK0, &device.PADS_BANK0, &mut device.RESETS);
        rprintln!("OK");

        rprint!("  PIO...      ");
        let serialiser = PioSerialiser::new(device.PIO0, device.PWM, &mut device.RESETS);
        rprintln!("OK");

        rprint!("  DMA...      ");
        let dma = RpDma::new(device.DMA, &mut device.RESETS);
        rprintln!("OK");

        rprint!("  DVI...      ");
        let dvi = match Dvi::new(VGA_640X480P60, DVI_CONFIG, dma, serialiser,
                                 cx.local.slots, &PIPELINE)
        {
            Ok(dvi) => dvi,
            Err(e) => panic!("DVI setup failed: {}", e),
        };
        rprintln!("OK");

        rprint!("  Core 1...   ");
        let mut sio = Sio::new(device.SIO);
        let mut mc = Multicore::new(&mut device.PSM, &mut device.PPB, &mut sio.fifo);
        let cores = mc.cores();
        // NOTE(unsafe): The stack is handed to core 1 once and never touched again here.
        let stack = unsafe { &mut CORE1_STACK.mem };
        if cores[1].spawn(stack, core1_main).is_err() {
            panic!("Core 1 failed to start");
        }
        rprintln!("OK");

        rprintln!("Initialisation complete.");

        (Shared { dvi }, Local {}, init::Monotonics {})
    }

    /// Application on core 1: draw the test card, then stream it a row at a time.
    fn core1_main() -> ! {
        // NOTE(unsafe): Core 1 is the only user of the frame buffer.
        let fbuf = unsafe { &mut FBUF };
        let mut card = TestCard::new();
        loop {
            card.render(PIPELINE.frame_counter(), fbuf);
            fbuf.submit_to(&PIPELINE, ROW_REPEAT);
        }
    }

    /// Start output, then encode lines for as long as the display runs.
    ///
    /// The first scanline interrupt must be serviced within a line of start,
    /// so output cannot start in init where interrupts are masked.
    /// Keeps core 0 busy between scanline interrupts, so it never sleeps.
    #[idle(shared=[dvi])]
    fn idle(mut cx: idle::Context) -> ! {
        // The first lines must be queued before output starts.
        PIPELINE.wait_for_valid_line();
        cx.shared.dvi.lock(|dvi| dvi.start());
        rprintln!("DVI output started.");

        let mut reports = 0u32;
        PIPELINE.run_encoder(
            |line: &[u16; PIXELS], out: &mut [u32; WORDS]| encode_line_rgb565(line, out),
            |occupancy| {
                // Rate-limit printing just to avoid spamming rtt console.
                if reports % 1024 == 0 {
                    rprintln!("Pipeline saturated: {:?} (starved lines: {})",
                              occupancy, PIPELINE.starved_lines());
                }
                reports = reports.wrapping_add(1);
            },
        )
    }

    /// Scanline interrupt, raised as each line's active segment starts.
    #[task(binds=DMA_IRQ_0, priority=2, shared=[dvi])]
    fn dma_dvi(mut cx: dma_dvi::Context) {
        cx.shared.dvi.lock(|dvi| dvi.dma_isr());
    }
}

use std::thread;
use std::time::{Duration, Instant};
use picodvi::{
    ArmSlots, Config, Dvi, FrameBuf, Pipeline, VGA_640X480P60,
    demo::{TestCard, WIDTH, HEIGHT},
    sim::{SimDma, SimSerialiser},
    timing::N_CHAR_PER_WORD,
    tmds::encode_line_rgb565,
};

const PIXELS: usize = 640;
const WORDS: usize = PIXELS / 2 * 3;

static PIPELINE: Pipeline<PIXELS, WORDS> = Pipeline::new();

/// Run the test card through the whole scanout path against the software DMA
/// model, in real time, and report how it kept up.
///
/// Usage: `picodvi_simulator [frames]`, 60 frames by default.
pub fn main() {
    let frames: u32 = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(60);
    let timing = VGA_640X480P60;
    let words_per_sec = timing.pixel_clk_khz() as u64 * 1000 / N_CHAR_PER_WORD as u64;

    let mut slots = ArmSlots::new();
    let mut dvi = Dvi::new(timing, Config::DEFAULT, SimDma::new(), SimSerialiser::new(),
                           &mut slots, &PIPELINE)
        .expect("Error setting up DVI");

    thread::spawn(|| {
        let mut fbuf: Box<FrameBuf<WIDTH, HEIGHT>> = Box::default();
        let mut card = TestCard::new();
        loop {
            card.render(PIPELINE.frame_counter(), &mut *fbuf);
            fbuf.submit_to(&PIPELINE, 1);
        }
    });

    thread::spawn(|| {
        let mut last_report: Option<Instant> = None;
        PIPELINE.run_encoder(
            |line: &[u16; PIXELS], out: &mut [u32; WORDS]| encode_line_rgb565(line, out),
            |occupancy| {
                // Rate-limit printing to once a second.
                if last_report.map_or(true, |t| t.elapsed() >= Duration::from_secs(1)) {
                    println!("Pipeline saturated: {:?}", occupancy);
                    last_report = Some(Instant::now());
                }
            },
        )
    });

    PIPELINE.wait_for_valid_line();
    dvi.start();
    println!("Running {} frames of {}x{}...", frames, timing.h_active_pixels, timing.v_active_lines);

    let t0 = Instant::now();
    let mut late = 0u32;
    while PIPELINE.frame_counter() < frames {
        if !dvi.hardware_mut().run_until_irq() {
            println!("DMA stopped at frame {}", PIPELINE.frame_counter());
            break;
        }

        // Hold each interrupt back until the modelled time has really passed.
        let words = dvi.hardware().elapsed_words();
        let due = Duration::from_nanos(words * 1_000_000_000 / words_per_sec);
        if t0.elapsed() > due {
            late += 1;
        }
        while t0.elapsed() < due {
            std::hint::spin_loop();
        }

        dvi.dma_isr();
    }

    let hw = dvi.hardware();
    println!("Frames:            {}", PIPELINE.frame_counter());
    println!("Starved lines:     {}", PIPELINE.starved_lines());
    println!("Late interrupts:   {}", late);
    println!("DMA faults:        {}", hw.faults());
    println!("Words per lane:    {}", hw.elapsed_words());
    println!("Wall time:         {:.3}s", t0.elapsed().as_secs_f64());
}

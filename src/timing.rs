//! Video mode timing and the vertical line-state machine.
//!
//! A [`Timing`] describes one video mode: the horizontal intervals in pixels
//! and the vertical intervals in lines. The horizontal intervals are turned
//! into DMA transfer counts, two TMDS characters per 32-bit word, so every
//! horizontal width must be a whole number of words.
//!
//! [`LineCounter`] tracks where the raster is vertically. It is advanced once
//! per scanline from the DMA interrupt and cycles through
//! front porch, sync, back porch and active video.

use crate::{Error, Result};

/// TMDS characters packed into each 32-bit word sent to a serialiser.
pub const N_CHAR_PER_WORD: u32 = 2;

/// Timing parameters for one video mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Horizontal sync is active-high when true.
    pub h_sync_polarity: bool,
    pub h_front_porch: u32,
    pub h_sync_width: u32,
    pub h_back_porch: u32,
    pub h_active_pixels: u32,

    /// Vertical sync is active-high when true.
    pub v_sync_polarity: bool,
    pub v_front_porch: u32,
    pub v_sync_width: u32,
    pub v_back_porch: u32,
    pub v_active_lines: u32,

    /// TMDS bit clock, ten times the pixel clock.
    pub bit_clk_khz: u32,
}

/// 640x480 at 60Hz, run from a 252MHz system clock.
///
/// (16 + 96 + 48 + 640) * (10 + 2 + 33 + 480) * 60 * 10 = 252MHz.
pub const VGA_640X480P60: Timing = Timing {
    h_sync_polarity: false,
    h_front_porch: 16,
    h_sync_width: 96,
    h_back_porch: 48,
    h_active_pixels: 640,

    v_sync_polarity: false,
    v_front_porch: 10,
    v_sync_width: 2,
    v_back_porch: 33,
    v_active_lines: 480,

    bit_clk_khz: 252_000,
};

impl Timing {
    /// Check the invariants the DMA lists rely on.
    ///
    /// Every interval must be non-zero, since a zero-length transfer would
    /// stall the chain, and every horizontal interval must be a multiple
    /// of [`N_CHAR_PER_WORD`]. No blanking segment on any lane may be as
    /// long as the active segment, since the scanline fence recognises the
    /// active segment by its transfer count.
    pub fn validate(&self) -> Result<()> {
        let horizontal = [
            ("h_front_porch", self.h_front_porch),
            ("h_sync_width", self.h_sync_width),
            ("h_back_porch", self.h_back_porch),
            ("h_active_pixels", self.h_active_pixels),
        ];
        for (name, width) in horizontal {
            if width == 0 {
                return Err(Error::ZeroInterval(name));
            }
            if width % N_CHAR_PER_WORD != 0 {
                return Err(Error::Unaligned(name));
            }
        }

        let blanking = [
            ("h_front_porch", self.h_front_porch),
            ("h_sync_width", self.h_sync_width),
            ("h_back_porch", self.h_back_porch),
            ("h_blank", self.h_blank_pixels()),
        ];
        for (name, width) in blanking {
            if width == self.h_active_pixels {
                return Err(Error::AmbiguousFence(name));
            }
        }

        let vertical = [
            ("v_front_porch", self.v_front_porch),
            ("v_sync_width", self.v_sync_width),
            ("v_back_porch", self.v_back_porch),
            ("v_active_lines", self.v_active_lines),
        ];
        for (name, lines) in vertical {
            if lines == 0 {
                return Err(Error::ZeroInterval(name));
            }
        }

        if self.bit_clk_khz == 0 {
            return Err(Error::ZeroInterval("bit_clk_khz"));
        }

        Ok(())
    }

    /// Blanking width in pixels: front porch, sync and back porch.
    pub fn h_blank_pixels(&self) -> u32 {
        self.h_front_porch + self.h_sync_width + self.h_back_porch
    }

    /// Total line length in pixels.
    pub fn h_total_pixels(&self) -> u32 {
        self.h_blank_pixels() + self.h_active_pixels
    }

    /// Total line length in transfer words.
    pub fn h_total_words(&self) -> u32 {
        self.h_total_pixels() / N_CHAR_PER_WORD
    }

    /// Active video length in transfer words, per lane.
    pub fn h_active_words(&self) -> u32 {
        self.h_active_pixels / N_CHAR_PER_WORD
    }

    /// Total frame length in lines.
    pub fn v_total_lines(&self) -> u32 {
        self.v_front_porch + self.v_sync_width + self.v_back_porch + self.v_active_lines
    }

    /// Pixel clock, a tenth of the TMDS bit clock.
    pub fn pixel_clk_khz(&self) -> u32 {
        self.bit_clk_khz / 10
    }

    /// Number of lines the raster spends in `state`.
    pub fn lines_in(&self, state: LineState) -> u32 {
        match state {
            LineState::FrontPorch => self.v_front_porch,
            LineState::Sync => self.v_sync_width,
            LineState::BackPorch => self.v_back_porch,
            LineState::Active => self.v_active_lines,
        }
    }
}

/// Vertical phase of the raster.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum LineState {
    #[default]
    FrontPorch,
    Sync,
    BackPorch,
    Active,
}

impl LineState {
    /// The state following this one; the order is fixed and cyclic.
    pub fn next(self) -> Self {
        match self {
            Self::FrontPorch => Self::Sync,
            Self::Sync => Self::BackPorch,
            Self::BackPorch => Self::Active,
            Self::Active => Self::FrontPorch,
        }
    }
}

/// Vertical position of the raster, advanced once per scanline.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LineCounter {
    state: LineState,
    line: u32,
    frame: u32,
}

impl LineCounter {
    pub const fn new() -> Self {
        Self { state: LineState::FrontPorch, line: 0, frame: 0 }
    }

    /// Advance by one scanline, returning the new state.
    ///
    /// When the line count reaches the length of the current state the
    /// counter resets and the next state begins. Entering `Sync` counts
    /// a new frame.
    pub fn advance(&mut self, timing: &Timing) -> LineState {
        self.line += 1;
        if self.line == timing.lines_in(self.state) {
            self.state = self.state.next();
            self.line = 0;
            if self.state == LineState::Sync {
                self.frame = self.frame.wrapping_add(1);
            }
        }
        self.state
    }

    pub fn state(&self) -> LineState {
        self.state
    }

    /// Line number within the current state.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Number of frames started, counted at each entry into vertical sync.
    pub fn frame(&self) -> u32 {
        self.frame
    }
}

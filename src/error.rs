use core::fmt;

/// Errors detected while setting up the output pipeline.
///
/// All of these are configuration problems found at construction time.
/// Nothing on the per-scanline path can fail; a missing encoded line is
/// handled by scanning out the error filler instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A timing interval was zero. Contains the name of the field.
    ZeroInterval(&'static str),
    /// A horizontal width was not a whole number of transfer words.
    Unaligned(&'static str),
    /// Buffer sizes do not match the active width of the timing.
    GeometryMismatch { pixels: usize, words: usize, h_active_pixels: u32 },
    /// A horizontal blanking segment is as long as the active segment, so the
    /// scanline fence could not tell them apart. Contains the name of the field.
    AmbiguousFence(&'static str),
    /// `lines_per_buffer` must be at least one.
    ZeroLinesPerBuffer,
    /// The DMA hardware had no unclaimed channel left.
    NoFreeChannel,
    /// The shared pipeline has already been handed its buffers.
    PipelineInUse,
}

pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroInterval(field) => write!(f, "timing field {} is zero", field),
            Self::Unaligned(field) =>
                write!(f, "timing field {} is not a multiple of the word size", field),
            Self::GeometryMismatch { pixels, words, h_active_pixels } => write!(
                f, "buffers of {} pixels / {} words do not fit {} active pixels",
                pixels, words, h_active_pixels),
            Self::AmbiguousFence(field) =>
                write!(f, "timing field {} is as long as the active width", field),
            Self::ZeroLinesPerBuffer => write!(f, "lines_per_buffer is zero"),
            Self::NoFreeChannel => write!(f, "no free DMA channel"),
            Self::PipelineInUse => write!(f, "pipeline buffers already allocated"),
        }
    }
}

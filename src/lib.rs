#![no_std]

#[cfg(test)]
extern crate std;

mod error;

pub mod chain;
pub mod demo;
pub mod dma;
pub mod dvi;
pub mod framebuf;
pub mod hw;
pub mod list;
pub mod pipeline;
pub mod pool;
pub mod release;
pub mod timing;
pub mod tmds;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use error::{Error, Result};
pub use chain::{ArmSlots, Lane, LaneConfig};
pub use dvi::{Config, Dvi};
pub use framebuf::FrameBuf;
pub use hw::{DmaHardware, Serialiser};
pub use pipeline::{LineBuffer, Occupancy, Pipeline};
pub use timing::{Timing, VGA_640X480P60};

//! Framebuffer that implements embedded_graphic's DrawTarget.
//!
//! Pixels are stored as raw RGB565, ready to be copied into line buffers.

use embedded_graphics::{
    Pixel,
    pixelcolor::{IntoStorage, Rgb565},
    draw_target::DrawTarget,
    geometry::{Dimensions, OriginDimensions, Size},
    primitives::Rectangle,
};

use crate::pipeline::Pipeline;

#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct FrameBuf<const X: usize, const Y: usize>(pub [[u16; X]; Y]);

impl <const X: usize, const Y: usize> FrameBuf<X, Y> {
    pub const fn new() -> Self {
        Self([[0; X]; Y])
    }

    /// Set all pixels to black.
    pub fn clear_black(&mut self) {
        for row in self.0.iter_mut() {
            row.fill(0);
        }
    }

    /// Copy row `y` into `out`, repeating each pixel to fill it.
    ///
    /// `out` should be a whole multiple of the row width; rows outside the
    /// framebuffer come out black.
    pub fn write_line(&self, y: usize, out: &mut [u16]) {
        let row = match self.0.get(y) {
            Some(row) => row,
            None => {
                out.fill(0);
                return;
            }
        };
        let scale = (out.len() / X).max(1);
        for (chunk, px) in out.chunks_mut(scale).zip(row.iter()) {
            chunk.fill(*px);
        }
    }

    /// Submit every row to `pipeline` in order, each one `repeat` times.
    ///
    /// Blocks whenever the pipeline has no free line buffer.
    pub fn submit_to<const PIXELS: usize, const WORDS: usize>(
        &self, pipeline: &Pipeline<PIXELS, WORDS>, repeat: usize)
    {
        for y in 0..Y {
            for _ in 0..repeat {
                let mut line = pipeline.get_line_buffer();
                self.write_line(y, &mut line[..]);
                pipeline.set_line_buffer(line);
            }
        }
    }
}

impl <const X: usize, const Y: usize> Default for FrameBuf<X, Y> {
    fn default() -> Self {
        Self::new()
    }
}

impl <const X: usize, const Y: usize> OriginDimensions for FrameBuf<X, Y> {
    fn size(&self) -> Size {
        Size::new(X as u32, Y as u32)
    }
}

impl <const X: usize, const Y: usize> DrawTarget for FrameBuf<X, Y> {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where I: IntoIterator<Item = Pixel<Self::Color>>
    {
        for Pixel(coord, color) in pixels.into_iter() {
            if let Ok(pos) = coord.try_into() {
                let (x, y): (u32, u32) = pos;
                if let Some(px) = self.0.get_mut(y as usize).and_then(|r| r.get_mut(x as usize)) {
                    *px = color.into_storage();
                }
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        if let Some(bottom_right) = area.bottom_right() {
            let color = color.into_storage();
            let (x0, x1) = (area.top_left.x as usize, bottom_right.x as usize);
            let (y0, y1) = (area.top_left.y as usize, bottom_right.y as usize);
            for row in self.0[y0..=y1].iter_mut() {
                row[x0..=x1].fill(color);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let color = color.into_storage();
        for row in self.0.iter_mut() {
            row.fill(color);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::{
        prelude::*,
        primitives::{PrimitiveStyle, Rectangle},
    };

    #[test]
    fn draws_clipped_rgb565() {
        let mut fb = FrameBuf::<4, 3>::new();
        Rectangle::new(Point::new(2, 1), Size::new(4, 4))
            .into_styled(PrimitiveStyle::with_fill(Rgb565::RED))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.0[0], [0, 0, 0, 0]);
        assert_eq!(fb.0[1], [0, 0, 0xf800, 0xf800]);
        assert_eq!(fb.0[2], [0, 0, 0xf800, 0xf800]);

        fb.clear(Rgb565::BLUE).unwrap();
        assert_eq!(fb.0[2], [0x001f; 4]);
        fb.clear_black();
        assert_eq!(fb.0[2], [0; 4]);
    }

    #[test]
    fn lines_are_widened_to_fit() {
        let mut fb = FrameBuf::<3, 2>::new();
        fb.0[1] = [1, 2, 3];
        let mut out = [0xffff; 6];
        fb.write_line(1, &mut out);
        assert_eq!(out, [1, 1, 2, 2, 3, 3]);
        fb.write_line(2, &mut out);
        assert_eq!(out, [0; 6]);
    }

    #[test]
    fn submitted_rows_keep_their_order() {
        let pipeline = Pipeline::<4, 6>::new();
        pipeline.allocate().unwrap();
        let mut fb = FrameBuf::<2, 1>::new();
        fb.0[0] = [7, 9];
        fb.submit_to(&pipeline, 2);
        assert_eq!(pipeline.occupancy().ready_lines, 2);

        let mut copy = |src: &[u16; 4], dst: &mut [u32; 6]| {
            dst.fill(0);
            for (d, s) in dst.iter_mut().zip(src) {
                *d = *s as u32;
            }
        };
        for _ in 0..2 {
            pipeline.encode_next(&mut copy);
            let slot = pipeline.take_encoded().unwrap();
            assert_eq!(pipeline.encoded(&slot), &[7, 7, 9, 9, 0, 0]);
            pipeline.release_encoded(slot);
        }
    }
}

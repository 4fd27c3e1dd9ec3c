//! Test card drawn by the firmware and the simulator.
//!
//! Colour bars and a grey ramp over a black field, with a frame counter and
//! a box bouncing around the lower part of the screen. After the first call
//! only the counter and the box are redrawn, so a frame costs little more
//! than the box's area.

use core::fmt::Write;
use heapless::String;
use embedded_graphics::{
    mono_font::{ascii::FONT_9X18, MonoTextStyle},
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};

/// Test card width, half the active width of 640x480 since pixels are doubled.
pub const WIDTH: usize = 320;

/// Test card height, shown on two scanlines per row.
pub const HEIGHT: usize = 240;

const BARS: [Rgb565; 8] = [
    Rgb565::WHITE, Rgb565::YELLOW, Rgb565::CYAN, Rgb565::GREEN,
    Rgb565::MAGENTA, Rgb565::RED, Rgb565::BLUE, Rgb565::BLACK,
];
const BARS_HEIGHT: u32 = 96;
const RAMP_HEIGHT: u32 = 16;
const TITLE_POS: Point = Point::new(8, 114);
const COUNTER_POS: Point = Point::new(120, 114);
const COUNTER_SIZE: Size = Size::new(16 * 9, 18);
const ARENA_TOP: i32 = 144;
const BOX_SIZE: u32 = 16;

pub struct TestCard {
    pos: Point,
    vel: Point,
    drawn: bool,
}

impl TestCard {
    pub const fn new() -> Self {
        TestCard { pos: Point::new(0, ARENA_TOP), vel: Point::new(3, 2), drawn: false }
    }

    /// Draw the card for `frame`, moving the box one step.
    pub fn render<D>(&mut self, frame: u32, display: &mut D)
        where D: DrawTarget<Color = Rgb565>
    {
        if !self.drawn {
            self.render_background(display);
            self.drawn = true;
        }

        self.box_area().into_styled(PrimitiveStyle::with_fill(Rgb565::BLACK)).draw(display).ok();
        self.advance();
        self.box_area().into_styled(PrimitiveStyle::with_fill(Rgb565::YELLOW)).draw(display).ok();

        let mut s: String<16> = String::new();
        write!(&mut s, "frame {}", frame).ok();
        Rectangle::new(COUNTER_POS, COUNTER_SIZE)
            .into_styled(PrimitiveStyle::with_fill(Rgb565::BLACK))
            .draw(display).ok();
        let font = MonoTextStyle::new(&FONT_9X18, Rgb565::WHITE);
        Text::with_baseline(&s, COUNTER_POS, font, Baseline::Top).draw(display).ok();
    }

    /// Top-left corner of the box.
    pub fn position(&self) -> Point {
        self.pos
    }

    fn render_background<D>(&self, display: &mut D)
        where D: DrawTarget<Color = Rgb565>
    {
        display.clear(Rgb565::BLACK).ok();

        let bar_width = (WIDTH / BARS.len()) as u32;
        for (i, color) in BARS.iter().enumerate() {
            let top_left = Point::new((i as u32 * bar_width) as i32, 0);
            Rectangle::new(top_left, Size::new(bar_width, BARS_HEIGHT))
                .into_styled(PrimitiveStyle::with_fill(*color))
                .draw(display).ok();
        }

        // 32 steps from black to white, 10 pixels each.
        for i in 0..32u8 {
            let top_left = Point::new(i as i32 * 10, BARS_HEIGHT as i32);
            Rectangle::new(top_left, Size::new(10, RAMP_HEIGHT))
                .into_styled(PrimitiveStyle::with_fill(Rgb565::new(i, i * 2 + i / 16, i)))
                .draw(display).ok();
        }

        let font = MonoTextStyle::new(&FONT_9X18, Rgb565::CYAN);
        Text::with_baseline("picodvi", TITLE_POS, font, Baseline::Top).draw(display).ok();
    }

    fn box_area(&self) -> Rectangle {
        Rectangle::new(self.pos, Size::new(BOX_SIZE, BOX_SIZE))
    }

    fn advance(&mut self) {
        let max_x = (WIDTH as u32 - BOX_SIZE) as i32;
        let max_y = (HEIGHT as u32 - BOX_SIZE) as i32;
        let mut next = self.pos + self.vel;
        if next.x < 0 || next.x > max_x {
            self.vel.x = -self.vel.x;
            next.x = self.pos.x + self.vel.x;
        }
        if next.y < ARENA_TOP || next.y > max_y {
            self.vel.y = -self.vel.y;
            next.y = self.pos.y + self.vel.y;
        }
        self.pos = next;
    }
}

impl Default for TestCard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuf::FrameBuf;
    use std::boxed::Box;

    #[test]
    fn first_frame_draws_background_and_box() {
        let mut fb: Box<FrameBuf<WIDTH, HEIGHT>> = Box::default();
        let mut card = TestCard::new();
        card.render(0, &mut *fb);
        assert_eq!(fb.0[0][0], 0xffff);
        assert_eq!(fb.0[0][WIDTH - 1], 0);
        assert_eq!(fb.0[BARS_HEIGHT as usize][0], 0);
        assert_eq!(fb.0[BARS_HEIGHT as usize][WIDTH - 1], 0xffff);
        assert_eq!(card.position(), Point::new(3, ARENA_TOP + 2));
        assert_eq!(fb.0[146][3], 0xffe0);
        assert_eq!(fb.0[146][2], 0);
    }

    #[test]
    fn box_moves_and_old_position_is_erased() {
        let mut fb: Box<FrameBuf<WIDTH, HEIGHT>> = Box::default();
        let mut card = TestCard::new();
        card.render(0, &mut *fb);
        card.render(1, &mut *fb);
        assert_eq!(card.position(), Point::new(6, ARENA_TOP + 4));
        assert_eq!(fb.0[146][3], 0);
        assert_eq!(fb.0[148][6], 0xffe0);
    }

    #[test]
    fn box_stays_inside_the_arena() {
        let mut card = TestCard::new();
        for _ in 0..1000 {
            card.advance();
            let pos = card.position();
            assert!(pos.x >= 0 && pos.x + BOX_SIZE as i32 <= WIDTH as i32);
            assert!(pos.y >= ARENA_TOP && pos.y + BOX_SIZE as i32 <= HEIGHT as i32);
        }
    }
}

//! TMDS symbol tables and a reference line encoder.
//!
//! Each 32-bit word sent to a serialiser carries two 10-bit TMDS characters,
//! the first in bits 0..10 and the second in bits 10..20, and the serialiser
//! shifts each character out least significant bit first.
//!
//! Blanking is sent as repeated control characters, and the DMA reads them
//! with a 4-byte ring so one word in memory covers any interval length.

/// Control characters, each doubled up into one word.
///
/// Indexed by `(vsync << 1) | hsync`. Only lane 0 ever sends anything but
/// the first entry.
pub static CONTROL_SYMBOLS: [u32; 4] = [
    0xd5354, // 1101010100
    0x2acab, // 0010101011
    0x55154, // 0101010100
    0xaaeab, // 1010101011
];

/// Per-lane filler sent in place of a scanline when no encoded data was ready.
///
/// Lane order is blue, green, red, giving a solid green line.
pub static ERROR_SYMBOLS: [u32; 3] = [
    0x7fd00, // 0x00, 0x00
    0xbfa01, // 0xfc, 0xfc
    0x7fd00, // 0x00, 0x00
];

/// Returns the control character word for the given sync levels.
pub fn control_symbol(vsync: bool, hsync: bool) -> &'static u32 {
    &CONTROL_SYMBOLS[((vsync as usize) << 1) | hsync as usize]
}

/// DC-balanced character pairs for every 8-bit value.
///
/// The first character is the exact encoding of the value starting from zero
/// disparity. The second is the encoding of the nearest value whose character
/// cancels the first one's disparity, so each word is balanced on its own and
/// lines can be encoded independently and repeated freely.
pub static TMDS_PAIRS: [u32; 256] = build_pairs();

/// Encode one RGB565 line into lane-major TMDS words.
///
/// `out` holds three runs of `line.len() / 2` words, for the blue, green and
/// red lanes in turn. Each word carries one pixel pair encoded from its first
/// pixel, so horizontal resolution is half the line width; applications
/// should supply horizontally doubled lines.
pub fn encode_line_rgb565(line: &[u16], out: &mut [u32]) {
    let words = line.len() / 2;
    debug_assert!(out.len() >= words * 3);
    let (blue, rest) = out.split_at_mut(words);
    let (green, red) = rest.split_at_mut(words);
    let lanes = blue.iter_mut().zip(green.iter_mut()).zip(red.iter_mut());
    for (pair, ((b, g), r)) in line.chunks_exact(2).zip(lanes) {
        let px = pair[0];
        let r5 = ((px >> 11) & 0x1f) as u8;
        let g6 = ((px >> 5) & 0x3f) as u8;
        let b5 = (px & 0x1f) as u8;
        *b = TMDS_PAIRS[((b5 << 3) | (b5 >> 2)) as usize];
        *g = TMDS_PAIRS[((g6 << 2) | (g6 >> 4)) as usize];
        *r = TMDS_PAIRS[((r5 << 3) | (r5 >> 2)) as usize];
    }
}

/// Transition-minimise `d` into the 9-bit intermediate `q_m`.
const fn transition_minimise(d: u8) -> u32 {
    let n1 = d.count_ones();
    let xnor = n1 > 4 || (n1 == 4 && d & 1 == 0);
    let mut q = (d & 1) as u32;
    let mut i = 1;
    while i < 8 {
        let prev = (q >> (i - 1)) & 1;
        let bit = ((d >> i) & 1) as u32;
        let b = if xnor { !(prev ^ bit) & 1 } else { prev ^ bit };
        q |= b << i;
        i += 1;
    }
    if !xnor {
        q |= 1 << 8;
    }
    q
}

/// Disparity of a 10-bit character: ones minus zeros.
const fn disparity(sym: u32) -> i32 {
    2 * (sym & 0x3ff).count_ones() as i32 - 10
}

/// Encode `d` with running disparity `cnt`, returning the character and the
/// new running disparity.
const fn encode_char(d: u8, cnt: i32) -> (u32, i32) {
    let qm = transition_minimise(d);
    let data = qm & 0xff;
    let bit8 = qm & (1 << 8);
    let n1 = data.count_ones() as i32;
    let n0 = 8 - n1;
    let sym = if cnt == 0 || n1 == n0 {
        if bit8 != 0 { data | bit8 } else { (!data & 0xff) | (1 << 9) }
    } else if (cnt > 0 && n1 > n0) || (cnt < 0 && n0 > n1) {
        (!data & 0xff) | bit8 | (1 << 9)
    } else {
        data | bit8
    };
    (sym, cnt + disparity(sym))
}

/// Find the character nearest in value to `d` with disparity `target`.
const fn nearest_with_disparity(d: u8, target: i32) -> Option<u32> {
    let mut dist = 0i32;
    while dist < 256 {
        let mut side = 0;
        while side < 2 {
            let c = if side == 0 { d as i32 + dist } else { d as i32 - dist };
            if c >= 0 && c <= 255 {
                let qm = transition_minimise(c as u8);
                let plain = qm & 0x1ff;
                let inverted = (qm & 0x100) | (!qm & 0xff) | (1 << 9);
                if disparity(plain) == target {
                    return Some(plain);
                }
                if disparity(inverted) == target {
                    return Some(inverted);
                }
            }
            side += 1;
        }
        dist += 1;
    }
    None
}

const fn build_pairs() -> [u32; 256] {
    let mut pairs = [0u32; 256];
    let mut v = 0;
    while v < 256 {
        let (first, cnt) = encode_char(v as u8, 0);
        let second = if cnt == 0 {
            first
        } else {
            match nearest_with_disparity(v as u8, -cnt) {
                Some(sym) => sym,
                None => first,
            }
        };
        pairs[v] = first | (second << 10);
        v += 1;
    }
    pairs
}

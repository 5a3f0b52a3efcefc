//! Random byte corruption
//!
//! Every byte of a buffer is independently overwritten with a random value
//! with probability `percent`/100. A byte is hit when a uniform draw from
//! `[0, 99]` lands at or above `100 - percent`, so 0 never touches the buffer
//! and 100 rewrites every byte.

use rand::Rng;

/// Highest accepted corruption percentage
pub const MAX_PERCENT: u8 = 100;

/// Overwrite roughly `percent`% of `buf` with random bytes.
///
/// Returns the number of bytes that were replaced (a replacement may happen
/// to write back the original value; it is still counted).
pub fn corrupt_bytes<R: Rng + ?Sized>(rng: &mut R, buf: &mut [u8], percent: u8) -> usize {
    if percent == 0 {
        return 0;
    }

    let threshold = 100u32.saturating_sub(percent.min(MAX_PERCENT) as u32);
    let mut replaced = 0;
    for byte in buf.iter_mut() {
        if rng.gen_range(0..=99u32) >= threshold {
            *byte = rng.gen_range(0..=255u32) as u8;
            replaced += 1;
        }
    }
    replaced
}

//! Token estimation without a tokenizer dependency.
//!
//! The summarizer only needs a coarse budget signal, so this uses a
//! per-character weight: ASCII letters count as a quarter token, other
//! ASCII as half, and everything else (CJK, emoji) as one and a half.

/// Estimate the token footprint of a string, rounded up.
pub fn estimate_tokens(input: &str) -> usize {
    let mut total = 0.0f64;
    for ch in input.chars() {
        let code = ch as u32;
        if code < 128 {
            if (65..=122).contains(&code) {
                total += 0.25;
            } else {
                total += 0.5;
            }
        } else {
            total += 1.5;
        }
    }
    total.ceil() as usize
}

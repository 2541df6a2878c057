//! Bit and alignment helpers.
//!
//! The hardware count-zero instructions are undefined for a zero input on
//! common targets, so every scan here treats zero as "no bit" explicitly.

/// Bits per bitfield word.
pub const WORD_BITS: usize = 64;

/// Leading zero count; 64 for zero.
#[inline]
pub const fn clz(x: u64) -> usize {
    if x == 0 { 64 } else { x.leading_zeros() as usize }
}

/// Trailing zero count; 64 for zero.
#[inline]
pub const fn ctz(x: u64) -> usize {
    if x == 0 { 64 } else { x.trailing_zeros() as usize }
}

#[inline]
pub const fn pop(x: u64) -> usize {
    x.count_ones() as usize
}

/// Highest set bit of `x` as a mask; 0 for zero.
#[inline]
pub const fn leading_bit(x: u64) -> u64 {
    if x == 0 {
        return 0;
    }
    1u64 << (63 - clz(x))
}

#[inline]
pub const fn is_pow2(x: u64) -> bool {
    pop(x) == 1
}

/// Smallest power of two `>= x`. `ceil_pow2(0) == ceil_pow2(1) == 1`.
///
/// Inputs above `1 << 63` have no representable answer and wrap to 0.
#[inline]
pub const fn ceil_pow2(x: u64) -> u64 {
    if x > 1 { leading_bit(x - 1) << 1 } else { 1 }
}

/// `ceil(n / d)`; 0 when `n == 0`. `d` must be non-zero.
#[inline]
pub const fn ceil_div(n: usize, d: usize) -> usize {
    if n == 0 { 0 } else { (n - 1) / d + 1 }
}

/// Round `n` up to a multiple of `a`.
#[inline]
pub const fn align(n: usize, a: usize) -> usize {
    ceil_div(n, a) * a
}

/// Index of the next set bit of `word` at or after `from`, or 64.
///
/// ```ignore
/// let mut i = bitfield_next(w, 0);
/// while i < 64 { /* .. */ i = bitfield_next(w, i + 1); }
/// ```
#[inline]
pub const fn bitfield_next(word: u64, from: usize) -> usize {
    if from >= WORD_BITS {
        return WORD_BITS;
    }
    ctz(word & (u64::MAX << from))
}

/// Index of the next set bit at or after `from` in a flat index space of
/// `n` bits spread over `words`, or `n` if there is none.
///
/// `words` must hold at least `ceil_div(n, 64)` entries.
pub fn bitfields_next(words: &[u64], from: usize, n: usize) -> usize {
    let mut bit = from;
    while bit < n {
        let word = words[bit / WORD_BITS];
        if word != 0 {
            let i = bitfield_next(word, bit % WORD_BITS);
            if i < WORD_BITS {
                let found = (bit / WORD_BITS) * WORD_BITS + i;
                return if found < n { found } else { n };
            }
        }
        bit = (bit / WORD_BITS + 1) * WORD_BITS;
    }
    n
}

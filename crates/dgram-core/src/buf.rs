//! Binary payload containers.
//!
//! Two policies for "capacity exceeded", kept as separate types:
//!
//! - [`Bin`]: capacity fixed at allocation; writes past it are silently
//!   truncated.
//! - [`Buf`]: capacity grows to the next power of two on demand; writes
//!   never truncate.
//!
//! Both zero their storage on allocation. Running out of memory aborts
//! through the global allocator's error hook.

use crate::bits::ceil_pow2;
use crate::cursor::Cursor;
use dgram_diag::code::*;
use dgram_diag::{defect, fail, report};

/// Zeroed storage of `cap` bytes. Sizes no allocation can satisfy abort
/// through the reporting sink rather than panicking.
fn zeroed(cap: usize) -> Box<[u8]> {
    if cap > isize::MAX as usize {
        report::abort_with(&fail!(SYS_BUF, ERR_INVALID, OP_ALLOC,
            "buffer size overflow: {} bytes", cap))
    }
    vec![0u8; cap].into_boxed_slice()
}

// ============================================================================
// Bin
// ============================================================================

/// Fixed-capacity, length-tracked byte container.
pub struct Bin {
    len: usize,
    data: Box<[u8]>,
}

impl Bin {
    /// Allocate a zeroed blob of exactly `cap` bytes.
    pub fn alloc(cap: usize) -> Self {
        Self { len: 0, data: zeroed(cap) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn cap(&self) -> usize {
        self.data.len()
    }

    /// The written bytes, `[0, len)`.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Overwrite from offset 0, truncating to capacity.
    ///
    /// Returns the number of bytes stored, which is also the new length.
    pub fn write(&mut self, src: &[u8]) -> usize {
        self.len = src.len().min(self.cap());
        self.data[..self.len].copy_from_slice(&src[..self.len]);
        self.len
    }

    /// Append at the current length, truncating to the remaining room.
    ///
    /// Returns the number of bytes appended.
    pub fn append(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.cap() - self.len);
        self.data[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }

    /// Copy out up to `dst.len()` bytes from the start.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        dst[..n].copy_from_slice(&self.data[..n]);
        n
    }

    #[inline]
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self.as_slice())
    }
}

impl std::fmt::Debug for Bin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bin").field("len", &self.len).field("cap", &self.cap()).finish()
    }
}

// ============================================================================
// Buf
// ============================================================================

/// Growable byte buffer. Capacity is 0 or a power of two.
#[derive(Default)]
pub struct Buf {
    len: usize,
    data: Box<[u8]>,
}

impl Buf {
    /// Empty buffer; nothing is allocated until the first write.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn cap(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Release the storage and return to the empty, zero-capacity state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Ensure capacity for at least `cap` bytes.
    ///
    /// Grows to `ceil_pow2(cap)`. Written bytes are preserved and all new
    /// capacity is zeroed.
    pub fn reserve(&mut self, cap: usize) {
        if self.cap() >= cap {
            return;
        }
        let cap = ceil_pow2(cap as u64) as usize;
        defect!(cap > 0, "buffer capacity overflow");

        let mut data = zeroed(cap);
        data[..self.len].copy_from_slice(&self.data[..self.len]);
        self.data = data;
    }

    /// Overwrite from offset 0, growing as needed.
    pub fn write(&mut self, src: &[u8]) {
        if src.len() > self.cap() {
            self.reserve(src.len());
        }
        self.data[..src.len()].copy_from_slice(src);
        self.len = src.len();
    }

    /// Append at the tail, growing as needed.
    pub fn append(&mut self, src: &[u8]) {
        let new_len = self.len + src.len();
        if new_len > self.cap() {
            self.reserve(new_len);
        }
        self.data[self.len..new_len].copy_from_slice(src);
        self.len = new_len;
    }

    /// Copy out up to `dst.len()` bytes from the start.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        dst[..n].copy_from_slice(&self.data[..n]);
        n
    }

    #[inline]
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self.as_slice())
    }
}

impl std::fmt::Debug for Buf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buf").field("len", &self.len).field("cap", &self.cap()).finish()
    }
}

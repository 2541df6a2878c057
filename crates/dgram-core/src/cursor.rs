//! Non-owning sequential reader.

use dgram_diag::defect;

/// Read-only window `[it, end)` over bytes owned by someone else.
///
/// Produced by `Bin::cursor`, `Buf::cursor` and the per-entry accessors of
/// an `IoVector`. The lifetime ties it to the storage it views.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    it: usize,
}

impl<'a> Cursor<'a> {
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, it: 0 }
    }

    /// Bytes left between the read position and the end.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.check();
        self.data.len() - self.it
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Copy up to `dst.len()` bytes and advance past them.
    ///
    /// Returns the number of bytes copied; 0 once the end is reached.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.remaining());
        dst[..n].copy_from_slice(&self.data[self.it..self.it + n]);
        self.it += n;
        n
    }

    /// Advance without copying. Returns the number of bytes skipped.
    pub fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.remaining());
        self.it += n;
        n
    }

    /// The unread bytes.
    #[inline]
    pub fn as_slice(&self) -> &'a [u8] {
        self.check();
        &self.data[self.it..]
    }

    #[inline]
    fn check(&self) {
        defect!(self.it <= self.data.len(), "inverted cursor: {} > {}", self.it, self.data.len());
    }
}

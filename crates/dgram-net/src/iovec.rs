//! Scatter-gather segments.
//!
//! An [`IoVector`] is one block of memory laid out as
//!
//! ```text
//! 0x00: len                 (usize)   - entries handed to the kernel
//! 0x08: cap                 (usize)   - entry count, fixed
//! 0x10: descriptors         ([IoVec; cap])
//!       entry capacities    ([usize; cap])
//!       payload             (sum of entry capacities)
//! ```
//!
//! The descriptor array is bit-compatible with `[libc::iovec]` and is
//! handed to `recvmmsg`/`sendmmsg` as is. An entry with capacity 0 has a
//! null payload pointer.

use std::alloc::{self, Layout};
use std::mem::{align_of, offset_of, size_of};
use std::ptr;

use dgram_core::Cursor;
use dgram_diag::code::*;
use dgram_diag::{defect, fail, report};

/// One scatter-gather segment: payload pointer and bytes in use.
///
/// Same size, alignment and field offsets as `libc::iovec`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IoVec {
    bin: *mut u8,
    len: usize,
}

const _: () = {
    assert!(size_of::<IoVec>() == size_of::<libc::iovec>());
    assert!(align_of::<IoVec>() == align_of::<libc::iovec>());
    assert!(offset_of!(IoVec, bin) == offset_of!(libc::iovec, iov_base));
    assert!(size_of::<*mut u8>() == size_of::<*mut libc::c_void>());
    assert!(offset_of!(IoVec, len) == offset_of!(libc::iovec, iov_len));
    assert!(size_of::<usize>() == size_of::<libc::size_t>());
};

impl IoVec {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True for zero-capacity entries.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.bin.is_null()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.bin
    }

    /// The same bytes seen as the native descriptor.
    #[inline]
    pub fn as_sys(&self) -> &libc::iovec {
        // SAFETY: layouts are asserted identical above.
        unsafe { &*(self as *const IoVec as *const libc::iovec) }
    }
}

/// Alignment of every block holding vectors.
pub(crate) const BLOCK_ALIGN: usize = align_of::<usize>();

/// Bytes before the descriptor array (`len`, `cap`).
pub(crate) const HEADER: usize = 2 * size_of::<usize>();

const ENTRY_META: usize = size_of::<IoVec>() + size_of::<usize>();

/// Ordered group of segments for one datagram, with its payload storage.
///
/// Dynamically sized: only ever handled as `Box<IoVector>` (standalone)
/// or `&mut IoVector` (borrowed from a `MsgBatch`). Entries are addressed
/// by index; their capacities are fixed at allocation.
#[repr(C)]
pub struct IoVector {
    len: usize,
    cap: usize,
    tail: [u8],
}

impl IoVector {
    /// Allocate one zeroed block with an entry per element of `sizes`,
    /// entry `i` owning `sizes[i]` payload bytes.
    pub fn alloc(sizes: &[usize]) -> Box<IoVector> {
        let tail = tail_len(sizes);
        let layout = block_layout(HEADER + tail);

        // SAFETY: the layout is never zero-sized (HEADER > 0).
        let base = unsafe { alloc::alloc_zeroed(layout) };
        if base.is_null() {
            alloc::handle_alloc_error(layout);
        }

        // SAFETY: `base` is a fresh zeroed block sized by `block_layout`,
        // which matches `Layout::for_value` of the resulting value.
        unsafe { Box::from_raw(init_at(base, sizes)) }
    }

    /// Bytes of bookkeeping (counts, descriptors, capacities) for a vector
    /// of `cap` entries.
    #[inline]
    pub const fn header_size(cap: usize) -> usize {
        HEADER + cap * ENTRY_META
    }

    /// Header plus payload bytes owned by this vector.
    #[inline]
    pub fn footprint(&self) -> usize {
        HEADER + self.tail.len()
    }

    /// Number of entries.
    #[inline]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Number of entries handed to the kernel by the next transfer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set_len(&mut self, n: usize) {
        defect!(n <= self.cap, "iovec len out of range: {} > {}", n, self.cap);
        self.len = n;
    }

    /// All `cap` descriptors.
    #[inline]
    pub fn iovs(&self) -> &[IoVec] {
        // SAFETY: the tail starts with `cap` initialized descriptors at
        // BLOCK_ALIGN alignment.
        unsafe { std::slice::from_raw_parts(self.tail.as_ptr() as *const IoVec, self.cap) }
    }

    #[inline]
    fn iovs_mut(&mut self) -> &mut [IoVec] {
        // SAFETY: see `iovs`.
        unsafe { std::slice::from_raw_parts_mut(self.tail.as_mut_ptr() as *mut IoVec, self.cap) }
    }

    #[inline]
    fn caps(&self) -> &[usize] {
        // SAFETY: capacities follow the descriptor array.
        unsafe {
            let p = self.tail.as_ptr().add(self.cap * size_of::<IoVec>()) as *const usize;
            std::slice::from_raw_parts(p, self.cap)
        }
    }

    /// The in-use descriptors as native `iovec`s.
    #[inline]
    pub fn as_sys(&self) -> &[libc::iovec] {
        // SAFETY: IoVec and libc::iovec share a layout.
        unsafe {
            std::slice::from_raw_parts(self.tail.as_ptr() as *const libc::iovec, self.len)
        }
    }

    #[inline]
    fn check(&self, i: usize) {
        defect!(i < self.cap, "iovec index out of range: {} >= {}", i, self.cap);
    }

    #[inline]
    pub fn entry_cap(&self, i: usize) -> usize {
        self.check(i);
        self.caps()[i]
    }

    #[inline]
    pub fn entry_len(&self, i: usize) -> usize {
        self.check(i);
        self.iovs()[i].len
    }

    /// Offset of entry `i`'s payload inside the tail.
    #[inline]
    fn payload_range(&self, i: usize) -> std::ops::Range<usize> {
        self.check(i);
        let cap = self.caps()[i];
        if cap == 0 {
            return 0..0;
        }
        let off = self.iovs()[i].bin as usize - self.tail.as_ptr() as usize;
        off..off + cap
    }

    /// Written bytes of entry `i`.
    pub fn entry(&self, i: usize) -> &[u8] {
        let range = self.payload_range(i);
        let len = self.iovs()[i].len;
        &self.tail[range][..len]
    }

    /// Overwrite entry `i` from offset 0, truncating to its capacity.
    pub fn write(&mut self, i: usize, src: &[u8]) -> usize {
        let range = self.payload_range(i);
        let n = src.len().min(range.len());
        self.tail[range][..n].copy_from_slice(&src[..n]);
        self.iovs_mut()[i].len = n;
        n
    }

    /// Append to entry `i`, truncating to the remaining room.
    pub fn append(&mut self, i: usize, src: &[u8]) -> usize {
        let range = self.payload_range(i);
        let len = self.iovs()[i].len;
        let n = src.len().min(range.len() - len);
        self.tail[range][len..len + n].copy_from_slice(&src[..n]);
        self.iovs_mut()[i].len = len + n;
        n
    }

    /// Copy out up to `dst.len()` written bytes of entry `i`.
    pub fn read(&self, i: usize, dst: &mut [u8]) -> usize {
        let src = self.entry(i);
        let n = dst.len().min(src.len());
        dst[..n].copy_from_slice(&src[..n]);
        n
    }

    #[inline]
    pub fn cursor(&self, i: usize) -> Cursor<'_> {
        Cursor::new(self.entry(i))
    }

    /// Sum of the written lengths of the in-use entries.
    pub fn total_len(&self) -> usize {
        self.iovs()[..self.len].iter().map(IoVec::len).sum()
    }

    /// Zero every entry's length.
    pub fn clear(&mut self) {
        for iov in self.iovs_mut() {
            iov.len = 0;
        }
    }

    /// Offer full capacity of every in-use entry to the kernel.
    pub(crate) fn prepare_recv(&mut self) {
        for i in 0..self.len {
            let cap = self.caps()[i];
            self.iovs_mut()[i].len = cap;
        }
    }

    /// Spread a received datagram of `n` bytes over the in-use entries in
    /// order; entries past the end get length 0.
    pub(crate) fn distribute(&mut self, mut n: usize) {
        for i in 0..self.cap {
            let room = if i < self.len { self.caps()[i] } else { 0 };
            let take = n.min(room);
            self.iovs_mut()[i].len = take;
            n -= take;
        }
    }

    #[inline]
    pub(crate) fn sys_ptr(&mut self) -> *mut libc::iovec {
        self.tail.as_mut_ptr() as *mut libc::iovec
    }
}

impl std::fmt::Debug for IoVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoVector")
            .field("len", &self.len)
            .field("cap", &self.cap)
            .field("entry_caps", &self.caps())
            .field("entry_lens", &self.iovs().iter().map(IoVec::len).collect::<Vec<_>>())
            .finish()
    }
}

/// Tail bytes (descriptors, capacities, payload) for the given shape.
pub(crate) fn tail_len(sizes: &[usize]) -> usize {
    let payload = sizes.iter().try_fold(0usize, |acc, &s| acc.checked_add(s));
    let tail = payload.and_then(|p| sizes.len().checked_mul(ENTRY_META)?.checked_add(p));
    match tail {
        Some(tail) => tail,
        None => report::abort_with(&fail!(SYS_BUF, ERR_INVALID, OP_ALLOC,
            "iovec size overflow: {} entries", sizes.len())),
    }
}

/// Layout of a block of `size` bytes, padded to BLOCK_ALIGN.
pub(crate) fn block_layout(size: usize) -> Layout {
    match Layout::from_size_align(size, BLOCK_ALIGN) {
        Ok(layout) => layout.pad_to_align(),
        Err(_) => report::abort_with(&fail!(SYS_BUF, ERR_INVALID, OP_ALLOC,
            "block too large: {} bytes", size)),
    }
}

/// Lay out a vector in place.
///
/// # Safety
///
/// `base` must be BLOCK_ALIGN-aligned, zeroed, writable for
/// `HEADER + tail_len(sizes)` bytes and must outlive every use of the
/// returned pointer.
pub(crate) unsafe fn init_at(base: *mut u8, sizes: &[usize]) -> *mut IoVector {
    let cap = sizes.len();
    let vec = ptr::slice_from_raw_parts_mut(base, tail_len(sizes)) as *mut IoVector;
    ptr::addr_of_mut!((*vec).len).write(cap);
    ptr::addr_of_mut!((*vec).cap).write(cap);

    let iovs = base.add(HEADER) as *mut IoVec;
    let caps = iovs.add(cap) as *mut usize;
    let mut payload = caps.add(cap) as *mut u8;

    for (i, &size) in sizes.iter().enumerate() {
        let bin = if size == 0 { ptr::null_mut() } else { payload };
        iovs.add(i).write(IoVec { bin, len: 0 });
        caps.add(i).write(size);
        payload = payload.add(size);
    }

    vec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_precedes_descriptors() {
        let v = IoVector::alloc(&[1, 2]);
        let base = &*v as *const IoVector as *const u8 as usize;
        assert_eq!(v.iovs().as_ptr() as usize - base, HEADER);
    }

    #[test]
    fn layout_matches_native() {
        let v = IoVector::alloc(&[3]);
        let iov = &v.iovs()[0];
        let sys = iov.as_sys();
        assert_eq!(sys.iov_base as *const u8, iov.as_ptr());
        assert_eq!(sys.iov_len, iov.len());
    }

    #[test]
    fn null_entry_for_zero_size() {
        let v = IoVector::alloc(&[4, 0, 8]);
        assert_eq!(v.cap(), 3);
        assert_eq!(v.len(), 3);

        assert!(!v.iovs()[0].is_null());
        assert!(v.iovs()[1].is_null());
        assert!(!v.iovs()[2].is_null());

        assert_eq!(v.entry_cap(0), 4);
        assert_eq!(v.entry_cap(1), 0);
        assert_eq!(v.entry_cap(2), 8);

        assert_eq!(v.footprint(), IoVector::header_size(3) + 12);
    }

    #[test]
    fn entries_are_contiguous() {
        let v = IoVector::alloc(&[4, 0, 8]);
        let a = v.iovs()[0].as_ptr() as usize;
        let c = v.iovs()[2].as_ptr() as usize;
        assert_eq!(c - a, 4);
    }

    #[test]
    fn write_truncates_per_entry() {
        let mut v = IoVector::alloc(&[4, 0, 8]);
        assert_eq!(v.write(0, b"abcdefgh"), 4);
        assert_eq!(v.write(1, b"xyz"), 0);
        assert_eq!(v.write(2, b"12345"), 5);

        assert_eq!(v.entry(0), b"abcd");
        assert_eq!(v.entry(1), b"");
        assert_eq!(v.entry(2), b"12345");
        assert_eq!(v.total_len(), 9);
    }

    #[test]
    fn append_and_read() {
        let mut v = IoVector::alloc(&[6]);
        assert_eq!(v.append(0, b"abc"), 3);
        assert_eq!(v.append(0, b"defg"), 3);
        assert_eq!(v.entry(0), b"abcdef");

        let mut out = [0u8; 4];
        assert_eq!(v.read(0, &mut out), 4);
        assert_eq!(&out, b"abcd");

        let mut c = v.cursor(0);
        c.skip(4);
        assert_eq!(c.as_slice(), b"ef");
    }

    #[test]
    fn set_len_limits_sys_view() {
        let mut v = IoVector::alloc(&[2, 2, 2]);
        v.write(0, b"ab");
        v.write(1, b"cd");
        v.set_len(1);
        assert_eq!(v.as_sys().len(), 1);
        assert_eq!(v.total_len(), 2);
    }

    #[test]
    fn distribute_fills_in_order() {
        let mut v = IoVector::alloc(&[4, 0, 8, 2]);
        v.prepare_recv();
        assert_eq!(v.entry_len(0), 4);
        assert_eq!(v.entry_len(2), 8);

        v.distribute(7);
        assert_eq!(v.entry_len(0), 4);
        assert_eq!(v.entry_len(1), 0);
        assert_eq!(v.entry_len(2), 3);
        assert_eq!(v.entry_len(3), 0);

        v.set_len(1);
        v.distribute(100);
        assert_eq!(v.entry_len(0), 4);
        assert_eq!(v.entry_len(2), 0);
    }

    #[test]
    fn clear_resets_lengths() {
        let mut v = IoVector::alloc(&[4, 4]);
        v.write(0, b"ab");
        v.write(1, b"cd");
        v.clear();
        assert_eq!(v.total_len(), 0);
        assert_eq!(v.entry_cap(1), 4);
    }

    #[test]
    fn empty_shape() {
        let v = IoVector::alloc(&[]);
        assert_eq!(v.cap(), 0);
        assert!(v.as_sys().is_empty());
        assert_eq!(v.footprint(), IoVector::header_size(0));
    }
}

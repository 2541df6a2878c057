//! Datagram batches for `recvmmsg`/`sendmmsg`.
//!
//! A [`MsgBatch`] is a single allocation:
//!
//! ```text
//! [libc::mmsghdr; cap]            native per-message headers
//! [libc::sockaddr_storage; cap]   per-message peer address
//! [IoVector; cap]                 same shape for every message, fixed stride
//! ```
//!
//! Each header's `msg_iov` is wired to its vector's descriptor array when
//! the batch is built and never rewired; transfers only change lengths,
//! addresses and payload bytes.

use std::alloc::{self, Layout};
use std::mem::{align_of, size_of};
use std::net::SocketAddr;
use std::ptr::{self, NonNull};

use dgram_core::bits::align;
use dgram_diag::code::*;
use dgram_diag::{defect, fail, report};

use crate::iovec::{block_layout, init_at, tail_len, IoVector, BLOCK_ALIGN, HEADER};
use crate::sockaddr;

const ADDR_LEN: libc::socklen_t = size_of::<libc::sockaddr_storage>() as libc::socklen_t;

/// Fixed-capacity batch of datagrams, reused across transfer calls.
pub struct MsgBatch {
    base: NonNull<u8>,
    layout: Layout,

    /// Messages moved by the last transfer.
    len: usize,
    cap: usize,

    addrs_off: usize,
    vecs_off: usize,
    vec_stride: usize,
    vec_tail: usize,
}

// SAFETY: the batch exclusively owns its block; all interior pointers
// point into it.
unsafe impl Send for MsgBatch {}

impl MsgBatch {
    /// Allocate `msg_cap` message slots, each with an `IoVector` of
    /// `iov_sizes.len()` entries sized by `iov_sizes`.
    pub fn alloc(msg_cap: usize, iov_sizes: &[usize]) -> MsgBatch {
        defect!(msg_cap > 0, "batch needs at least one message slot");

        let vec_tail = tail_len(iov_sizes);
        let vec_stride = block_layout(HEADER + vec_tail).size();

        let offsets = (|| {
            let hdrs_size = msg_cap.checked_mul(size_of::<libc::mmsghdr>())?;
            let addrs_off = align(hdrs_size, align_of::<libc::sockaddr_storage>());
            let addrs_size = msg_cap.checked_mul(size_of::<libc::sockaddr_storage>())?;
            let vecs_off = align(addrs_off.checked_add(addrs_size)?, BLOCK_ALIGN);
            let total = msg_cap.checked_mul(vec_stride)?.checked_add(vecs_off)?;
            let layout = Layout::from_size_align(total, Self::align()).ok()?;
            Some((addrs_off, vecs_off, layout))
        })();
        let Some((addrs_off, vecs_off, layout)) = offsets else {
            report::abort_with(&fail!(SYS_BUF, ERR_INVALID, OP_ALLOC,
                "batch size overflow: {} x {} bytes", msg_cap, vec_stride))
        };

        // SAFETY: the layout is non-zero (msg_cap > 0).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout)
        };

        let mut batch = MsgBatch {
            base,
            layout,
            len: 0,
            cap: msg_cap,
            addrs_off,
            vecs_off,
            vec_stride,
            vec_tail,
        };

        for i in 0..msg_cap {
            // SAFETY: each vector region is inside the zeroed block,
            // BLOCK_ALIGN-aligned, and `vec_stride` bytes long.
            let vec = unsafe { &mut *init_at(batch.vec_ptr(i), iov_sizes) };
            let iov = vec.sys_ptr();
            let iovlen = vec.len();

            let hdr = batch.mmsg_mut(i);
            hdr.msg_hdr.msg_iov = iov;
            hdr.msg_hdr.msg_iovlen = iovlen as _;
        }

        batch
    }

    const fn align() -> usize {
        let mut a = BLOCK_ALIGN;
        if align_of::<libc::mmsghdr>() > a {
            a = align_of::<libc::mmsghdr>();
        }
        if align_of::<libc::sockaddr_storage>() > a {
            a = align_of::<libc::sockaddr_storage>();
        }
        a
    }

    /// Messages moved by the most recent transfer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Message slots.
    #[inline]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Total bytes of the backing block.
    #[inline]
    pub fn footprint(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    fn check(&self, i: usize) {
        defect!(i < self.cap, "batch index out of range: {} >= {}", i, self.cap);
    }

    #[inline]
    fn hdrs_ptr(&self) -> *mut libc::mmsghdr {
        self.base.as_ptr() as *mut libc::mmsghdr
    }

    #[inline]
    fn vec_ptr(&self, i: usize) -> *mut u8 {
        // SAFETY: in bounds for i < cap.
        unsafe { self.base.as_ptr().add(self.vecs_off + i * self.vec_stride) }
    }

    #[inline]
    fn addr_ptr(&self, i: usize) -> *mut libc::sockaddr_storage {
        // SAFETY: in bounds for i < cap.
        unsafe {
            (self.base.as_ptr().add(self.addrs_off) as *mut libc::sockaddr_storage).add(i)
        }
    }

    #[inline]
    fn mmsg(&self, i: usize) -> &libc::mmsghdr {
        self.check(i);
        // SAFETY: headers are initialized (zeroed then wired) and `i < cap`.
        unsafe { &*self.hdrs_ptr().add(i) }
    }

    #[inline]
    fn mmsg_mut(&mut self, i: usize) -> &mut libc::mmsghdr {
        self.check(i);
        // SAFETY: as above; `&mut self` makes the access exclusive.
        unsafe { &mut *self.hdrs_ptr().add(i) }
    }

    /// Native header of message `i`.
    #[inline]
    pub fn header(&self, i: usize) -> &libc::msghdr {
        &self.mmsg(i).msg_hdr
    }

    /// Scatter-gather vector of message `i`.
    pub fn vector(&self, i: usize) -> &IoVector {
        self.check(i);
        let vec = ptr::slice_from_raw_parts(self.vec_ptr(i) as *const u8, self.vec_tail)
            as *const IoVector;
        // SAFETY: the region was initialized by `init_at` with this tail length.
        unsafe { &*vec }
    }

    pub fn vector_mut(&mut self, i: usize) -> &mut IoVector {
        self.check(i);
        let vec = ptr::slice_from_raw_parts_mut(self.vec_ptr(i), self.vec_tail) as *mut IoVector;
        // SAFETY: as above; `&mut self` makes the access exclusive.
        unsafe { &mut *vec }
    }

    /// Byte count of datagram `i` in the last transfer.
    #[inline]
    pub fn msg_len(&self, i: usize) -> usize {
        self.mmsg(i).msg_len as usize
    }

    /// True if datagram `i` was larger than its vector and got cut.
    #[inline]
    pub fn truncated(&self, i: usize) -> bool {
        self.mmsg(i).msg_hdr.msg_flags & libc::MSG_TRUNC != 0
    }

    /// Peer of message `i`: the sender after a receive, the destination
    /// set for a send.
    pub fn addr(&self, i: usize) -> Option<SocketAddr> {
        let namelen = self.mmsg(i).msg_hdr.msg_namelen;
        if namelen == 0 {
            return None;
        }
        // SAFETY: in bounds and initialized (zeroed or written by the kernel).
        sockaddr::to_std(unsafe { &*self.addr_ptr(i) }, namelen)
    }

    /// Destination of message `i` for the next send. `None` sends to the
    /// connected peer.
    pub fn set_addr(&mut self, i: usize, addr: Option<SocketAddr>) {
        self.check(i);
        let storage = self.addr_ptr(i);
        let (name, namelen) = match addr {
            Some(addr) => {
                // SAFETY: in bounds; `&mut self` makes the access exclusive.
                let len = sockaddr::from_std(&addr, unsafe { &mut *storage });
                (storage as *mut libc::c_void, len)
            }
            None => (ptr::null_mut(), 0),
        };
        let hdr = &mut self.mmsg_mut(i).msg_hdr;
        hdr.msg_name = name;
        hdr.msg_namelen = namelen;
    }

    /// Ready the first `n` slots for `recvmmsg`.
    pub(crate) fn prepare_recv(&mut self, n: usize) {
        for i in 0..n {
            let vec = self.vector_mut(i);
            vec.prepare_recv();
            let iovlen = vec.len();

            let storage = self.addr_ptr(i) as *mut libc::c_void;
            let m = self.mmsg_mut(i);
            m.msg_len = 0;
            m.msg_hdr.msg_name = storage;
            m.msg_hdr.msg_namelen = ADDR_LEN;
            m.msg_hdr.msg_iovlen = iovlen as _;
            m.msg_hdr.msg_flags = 0;
        }
    }

    /// Record the outcome of a receive of `got` datagrams into the first
    /// `prepared` slots. Prepared slots the kernel did not fill are left
    /// empty: no payload, no peer.
    pub(crate) fn finish_recv(&mut self, prepared: usize, got: usize) {
        for i in 0..got {
            let len = self.msg_len(i);
            self.vector_mut(i).distribute(len);
        }
        for i in got..prepared {
            self.vector_mut(i).clear();
            let m = self.mmsg_mut(i);
            m.msg_len = 0;
            m.msg_hdr.msg_name = ptr::null_mut();
            m.msg_hdr.msg_namelen = 0;
            m.msg_hdr.msg_flags = 0;
        }
        self.len = got;
    }

    /// Ready the first `n` slots for `sendmmsg`.
    pub(crate) fn prepare_send(&mut self, n: usize) {
        for i in 0..n {
            let iovlen = self.vector(i).len();
            let m = self.mmsg_mut(i);
            m.msg_len = 0;
            m.msg_hdr.msg_iovlen = iovlen as _;
            m.msg_hdr.msg_flags = 0;
        }
    }

    pub(crate) fn finish_send(&mut self, n: usize) {
        self.len = n;
    }

    #[inline]
    pub(crate) fn sys_ptr(&mut self) -> *mut libc::mmsghdr {
        self.hdrs_ptr()
    }
}

impl Drop for MsgBatch {
    fn drop(&mut self) {
        // SAFETY: allocated in `alloc` with exactly this layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}

impl std::fmt::Debug for MsgBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsgBatch")
            .field("len", &self.len)
            .field("cap", &self.cap)
            .field("footprint", &self.footprint())
            .finish()
    }
}

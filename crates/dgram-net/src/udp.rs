//! Bound datagram sockets with batched transfer.
//!
//! ```ignore
//! let host = Host::parse("0.0.0.0:7000")?;
//! let udp = Udp::server(&host, &UdpOpts::new().reuse_port(true))?;
//! let mut batch = MsgBatch::alloc(64, &[1500]);
//! loop {
//!     let n = udp.recv_batch(&mut batch, 64)?;
//!     udp.send_batch(&mut batch, n)?;
//! }
//! ```
//!
//! Scaling is one `Udp` per thread, all bound with `reuse_port`, so the
//! kernel spreads traffic without any shared lock.

use std::ffi::{CStr, CString};
use std::mem::size_of;
use std::net::SocketAddr;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::ptr::{self, NonNull};

use nix::errno::Errno;
use tracing::{debug, info, trace};

use dgram_diag::code::*;
use dgram_diag::{fail, fail_os, process, report_warn, DgError, DgResult, ResultExt};

use crate::config::UdpOpts;
use crate::host::Host;
use crate::mmsg::MsgBatch;
use crate::sockaddr;

/// A bound UDP socket. Closed on drop or by [`Udp::close`].
#[derive(Debug)]
pub struct Udp {
    fd: OwnedFd,
    opts: UdpOpts,
}

impl Udp {
    /// Resolve `host` and bind the first candidate address that accepts
    /// the socket options and the bind.
    ///
    /// Fails with the last candidate's error once all are exhausted.
    pub fn server(host: &Host, opts: &UdpOpts) -> DgResult<Udp> {
        opts.validate()?;
        let list = AddrInfoList::resolve(host)?;

        let mut last: Option<DgError> = None;
        for ai in list.iter() {
            match bind_candidate(ai, opts) {
                Ok(fd) => {
                    let udp = Udp { fd, opts: opts.clone() };
                    info!(
                        fd = udp.fd(),
                        host = %host,
                        local = ?udp.local_addr().ok(),
                        reuse_port = opts.reuse_port,
                        cpu_affinity = opts.cpu_affinity,
                        "udp socket bound"
                    );
                    return Ok(udp);
                }
                Err(err) => {
                    debug!(host = %host, family = ai.ai_family, error = %err, "bind candidate failed");
                    last = Some(err);
                }
            }
        }

        let errno = last.as_ref().and_then(DgError::os_error);
        Err(fail_os!(errno, SYS_NET, ERR_BIND, OP_BIND,
            "unable to bind dgram socket for host '{}'", host))
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    #[inline]
    pub fn opts(&self) -> &UdpOpts {
        &self.opts
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> DgResult<SocketAddr> {
        // SAFETY: all-zero is a valid sockaddr_storage.
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut len = size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        // SAFETY: storage and len describe a writable buffer.
        let ret = unsafe {
            libc::getsockname(self.fd(), &mut storage as *mut _ as *mut libc::sockaddr, &mut len)
        };
        Errno::result(ret).ctx(SYS_NET, ERR_SOCKET, OP_QUERY)?;

        sockaddr::to_std(&storage, len).ok_or_else(|| {
            fail!(SYS_NET, ERR_SOCKET, OP_QUERY, "unsupported address family: {}", storage.ss_family)
        })
    }

    /// Receive up to `min(max, batch.cap())` datagrams in one call.
    ///
    /// Blocks for the first datagram unless the socket is non-blocking,
    /// then takes whatever else is queued. Returns the count received,
    /// also stored as `batch.len()`; 0 when nothing was pending or the
    /// receive timeout expired. Interrupted calls are retried.
    pub fn recv_batch(&self, batch: &mut MsgBatch, max: usize) -> DgResult<usize> {
        let n = max.min(batch.cap());
        if n == 0 {
            batch.finish_recv(0, 0);
            return Ok(0);
        }
        batch.prepare_recv(n);

        loop {
            // SAFETY: the first `n` headers are wired to live vectors and
            // address storage inside `batch`, borrowed mutably for the call.
            let ret = unsafe {
                libc::recvmmsg(
                    self.fd(),
                    batch.sys_ptr(),
                    n as _,
                    libc::MSG_WAITFORONE as _,
                    ptr::null_mut(),
                )
            };

            match Errno::result(ret) {
                Ok(got) => {
                    let got = got as usize;
                    batch.finish_recv(n, got);
                    trace!(fd = self.fd(), got, "recv_batch");
                    return Ok(got);
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => {
                    batch.finish_recv(n, 0);
                    return Ok(0);
                }
                Err(errno) => {
                    batch.finish_recv(n, 0);
                    return Err(DgError::simple_os(SYS_NET, ERR_TRANSFER, OP_RECV, errno as i32));
                }
            }
        }
    }

    /// Send the first `min(count, batch.cap())` messages in one call.
    ///
    /// Each message goes to its `batch.addr(i)`, or to the connected peer
    /// when unset. Returns how many the kernel accepted, which may be
    /// fewer than requested; 0 when a non-blocking socket is full.
    pub fn send_batch(&self, batch: &mut MsgBatch, count: usize) -> DgResult<usize> {
        let n = count.min(batch.cap());
        if n == 0 {
            batch.finish_send(0);
            return Ok(0);
        }
        batch.prepare_send(n);

        loop {
            // SAFETY: as in `recv_batch`; the kernel only reads the payload.
            let ret = unsafe { libc::sendmmsg(self.fd(), batch.sys_ptr(), n as _, 0) };

            match Errno::result(ret) {
                Ok(sent) => {
                    let sent = sent as usize;
                    batch.finish_send(sent);
                    trace!(fd = self.fd(), sent, "send_batch");
                    return Ok(sent);
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => {
                    batch.finish_send(0);
                    return Ok(0);
                }
                Err(errno) => {
                    batch.finish_send(0);
                    return Err(DgError::simple_os(SYS_NET, ERR_TRANSFER, OP_SEND, errno as i32));
                }
            }
        }
    }

    /// Release the descriptor, reporting a failed `close`.
    pub fn close(self) -> DgResult<()> {
        let fd = self.fd.into_raw_fd();
        // SAFETY: `fd` was owned by this handle and is closed exactly once.
        Errno::result(unsafe { libc::close(fd) })
            .map(drop)
            .ctx(SYS_NET, ERR_SOCKET, OP_CLOSE)
    }
}

impl AsFd for Udp {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Udp {
    fn as_raw_fd(&self) -> RawFd {
        self.fd()
    }
}

// ============================================================================
// Socket setup
// ============================================================================

fn bind_candidate(ai: &libc::addrinfo, opts: &UdpOpts) -> DgResult<OwnedFd> {
    let mut ty = ai.ai_socktype | libc::SOCK_CLOEXEC;
    if opts.nonblocking {
        ty |= libc::SOCK_NONBLOCK;
    }

    // SAFETY: plain syscall on values from the resolver.
    let raw = Errno::result(unsafe { libc::socket(ai.ai_family, ty, ai.ai_protocol) })
        .ctx(SYS_NET, ERR_SOCKET, OP_BIND)?;
    // SAFETY: `raw` is a fresh descriptor owned by nobody else; it is
    // closed on every early return below.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    if opts.reuse_port {
        set_opt(&fd, libc::SO_REUSEPORT, &(1 as libc::c_int))?;
    }

    if opts.cpu_affinity {
        let cpu = process::current_cpu()? as libc::c_int;
        set_opt(&fd, libc::SO_INCOMING_CPU, &cpu)?;
    }

    if let Some(timeout) = opts.recv_timeout {
        let tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        set_opt(&fd, libc::SO_RCVTIMEO, &tv)?;
    }

    // Buffer sizes are hints; the kernel clamps them and a refusal is
    // not worth losing the candidate over.
    for (name, what, size) in [
        (libc::SO_RCVBUF, "SO_RCVBUF", opts.recv_buffer),
        (libc::SO_SNDBUF, "SO_SNDBUF", opts.send_buffer),
    ] {
        if let Some(size) = size {
            if let Err(err) = set_opt(&fd, name, &(size as libc::c_int)) {
                report_warn!(SYS_NET, ERR_SOCKOPT, OP_CONFIGURE,
                    "unable to set {} to {}: {}", what, size, err);
            }
        }
    }

    // SAFETY: ai_addr/ai_addrlen come from the resolver as a pair.
    let ret = unsafe { libc::bind(fd.as_raw_fd(), ai.ai_addr, ai.ai_addrlen) };
    Errno::result(ret).ctx(SYS_NET, ERR_BIND, OP_BIND)?;

    Ok(fd)
}

fn set_opt<T>(fd: &OwnedFd, name: libc::c_int, value: &T) -> DgResult<()> {
    // SAFETY: `value` is a live `T` of the size passed.
    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            name,
            value as *const T as *const libc::c_void,
            size_of::<T>() as libc::socklen_t,
        )
    };
    Errno::result(ret).map(drop).ctx(SYS_NET, ERR_SOCKOPT, OP_CONFIGURE)
}

/// Owned `getaddrinfo` result list.
struct AddrInfoList {
    head: Option<NonNull<libc::addrinfo>>,
}

impl AddrInfoList {
    /// Passive datagram candidates for `host`, any address family.
    fn resolve(host: &Host) -> DgResult<Self> {
        let (node, service): (Option<CString>, CString) = host.to_c()?;

        // SAFETY: all-zero is a valid addrinfo hint.
        let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
        hints.ai_flags = libc::AI_PASSIVE;
        hints.ai_family = libc::AF_UNSPEC;
        hints.ai_socktype = libc::SOCK_DGRAM;

        let mut head: *mut libc::addrinfo = ptr::null_mut();
        // SAFETY: strings are NUL-terminated and outlive the call; `head`
        // receives a list freed in Drop.
        let rc = unsafe {
            libc::getaddrinfo(
                node.as_ref().map_or(ptr::null(), |n| n.as_ptr()),
                service.as_ptr(),
                &hints,
                &mut head,
            )
        };

        if rc != 0 {
            let errno = (rc == libc::EAI_SYSTEM).then(process::last_errno);
            // SAFETY: gai_strerror returns a static NUL-terminated string.
            let reason = unsafe { CStr::from_ptr(libc::gai_strerror(rc)) }.to_string_lossy();
            return Err(fail_os!(errno, SYS_NET, ERR_RESOLVE, OP_RESOLVE,
                "unable to resolve host '{}': {}", host, reason));
        }

        Ok(Self { head: NonNull::new(head) })
    }

    fn iter(&self) -> impl Iterator<Item = &libc::addrinfo> {
        // SAFETY: nodes stay valid until Drop frees the list.
        let first = self.head.map(|p| unsafe { &*p.as_ptr() });
        std::iter::successors(first, |ai| unsafe { ai.ai_next.as_ref() })
    }
}

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        if let Some(head) = self.head {
            // SAFETY: allocated by getaddrinfo, freed once.
            unsafe { libc::freeaddrinfo(head.as_ptr()) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn loopback(opts: &UdpOpts) -> Udp {
        Udp::server(&Host::from_host_port("127.0.0.1", 0).unwrap(), opts).unwrap()
    }

    fn host_of(udp: &Udp) -> Host {
        let addr = udp.local_addr().unwrap();
        Host::from_host_port(&addr.ip().to_string(), addr.port()).unwrap()
    }

    #[test]
    fn binds_loopback() {
        let udp = loopback(&UdpOpts::default());
        let addr = udp.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert!(udp.fd() >= 0);
        udp.close().unwrap();
    }

    #[test]
    fn reuse_port_shares_address() {
        let opts = UdpOpts::new().reuse_port(true);
        let a = loopback(&opts);
        let b = Udp::server(&host_of(&a), &opts).unwrap();
        assert_eq!(a.local_addr().unwrap(), b.local_addr().unwrap());
    }

    #[test]
    fn without_reuse_port_second_bind_fails() {
        let a = loopback(&UdpOpts::default());
        let err = Udp::server(&host_of(&a), &UdpOpts::default()).unwrap_err();
        assert_eq!(err.error_code(), &ERR_BIND);
        assert_eq!(err.os_error(), Some(libc::EADDRINUSE));
    }

    #[test]
    fn cpu_affinity_binds() {
        let udp = loopback(&UdpOpts::new().cpu_affinity(true).reuse_port(true));
        assert!(udp.opts().cpu_affinity);
    }

    #[test]
    fn unknown_service_fails_resolution() {
        let host = Host::from_host_service("127.0.0.1", "no-such-service-dgram").unwrap();
        let err = Udp::server(&host, &UdpOpts::default()).unwrap_err();
        assert_eq!(err.error_code(), &ERR_RESOLVE);
    }

    #[test]
    fn invalid_opts_rejected_before_socket() {
        let host = Host::from_host_port("127.0.0.1", 0).unwrap();
        let opts = UdpOpts::new().recv_timeout(Duration::ZERO);
        assert_eq!(Udp::server(&host, &opts).unwrap_err().error_code(), &ERR_INVALID);
    }

    #[test]
    fn nonblocking_empty_recv_is_zero() {
        let udp = loopback(&UdpOpts::new().nonblocking(true));
        let mut batch = MsgBatch::alloc(8, &[256]);
        assert_eq!(udp.recv_batch(&mut batch, 8).unwrap(), 0);
        assert_eq!(batch.len(), 0);
        for i in 0..8 {
            assert_eq!(batch.vector(i).entry_len(0), 0);
            assert_eq!(batch.addr(i), None);
        }
        assert_eq!(batch.vector_mut(0).append(0, b"hello"), 5);
        assert_eq!(batch.vector(0).entry(0), b"hello");
    }

    #[test]
    fn sub_microsecond_timeout_rejected() {
        let host = Host::from_host_port("127.0.0.1", 0).unwrap();
        let opts = UdpOpts::new().recv_timeout(Duration::from_nanos(500));
        let e = Udp::server(&host, &opts).unwrap_err();
        assert_eq!(e.error_code(), &ERR_INVALID);
    }

    #[test]
    fn recv_timeout_is_zero_progress() {
        let udp = loopback(&UdpOpts::new().recv_timeout(Duration::from_millis(20)));
        let mut batch = MsgBatch::alloc(2, &[64]);
        assert_eq!(udp.recv_batch(&mut batch, 2).unwrap(), 0);
    }

    fn recv_all(udp: &Udp, batch: &mut MsgBatch, want: usize) -> Vec<(Vec<u8>, SocketAddr)> {
        let mut out = Vec::new();
        for _ in 0..100 {
            let got = udp.recv_batch(batch, want - out.len()).unwrap();
            for i in 0..got {
                let v = batch.vector(i);
                let mut bytes = Vec::new();
                for e in 0..v.cap() {
                    bytes.extend_from_slice(v.entry(e));
                }
                out.push((bytes, batch.addr(i).unwrap()));
            }
            if out.len() == want {
                break;
            }
        }
        out
    }

    #[test]
    fn send_and_receive_batch() {
        let opts = UdpOpts::new().recv_timeout(Duration::from_millis(200));
        let server = loopback(&opts);
        let client = loopback(&opts);
        let server_addr = server.local_addr().unwrap();
        let client_addr = client.local_addr().unwrap();

        let mut out = MsgBatch::alloc(3, &[16]);
        for i in 0..3 {
            out.set_addr(i, Some(server_addr));
            out.vector_mut(i).write(0, format!("msg-{}", i).as_bytes());
        }
        assert_eq!(client.send_batch(&mut out, 3).unwrap(), 3);
        assert_eq!(out.len(), 3);

        let mut inb = MsgBatch::alloc(8, &[4, 64]);
        let got = recv_all(&server, &mut inb, 3);
        assert_eq!(got.len(), 3);
        for (i, (bytes, from)) in got.iter().enumerate() {
            assert_eq!(bytes, format!("msg-{}", i).as_bytes());
            assert_eq!(*from, client_addr);
        }
    }

    #[test]
    fn received_lengths_and_truncation() {
        let opts = UdpOpts::new().recv_timeout(Duration::from_millis(200));
        let server = loopback(&opts);
        let client = loopback(&opts);

        let mut out = MsgBatch::alloc(1, &[32]);
        out.set_addr(0, Some(server.local_addr().unwrap()));
        out.vector_mut(0).write(0, &[7u8; 32]);
        assert_eq!(client.send_batch(&mut out, 1).unwrap(), 1);

        let mut inb = MsgBatch::alloc(1, &[8, 8]);
        assert_eq!(server.recv_batch(&mut inb, 1).unwrap(), 1);
        assert!(inb.truncated(0));
        assert_eq!(inb.msg_len(0), 16);
        assert_eq!(inb.vector(0).total_len(), 16);
    }

    #[test]
    fn echo_back_to_sender() {
        let opts = UdpOpts::new().recv_timeout(Duration::from_millis(200));
        let server = loopback(&opts);
        let client = loopback(&opts);

        let mut out = MsgBatch::alloc(1, &[8]);
        out.set_addr(0, Some(server.local_addr().unwrap()));
        out.vector_mut(0).write(0, b"ping");
        client.send_batch(&mut out, 1).unwrap();

        let mut batch = MsgBatch::alloc(4, &[8]);
        let n = server.recv_batch(&mut batch, 4).unwrap();
        assert_eq!(n, 1);
        assert_eq!(server.send_batch(&mut batch, n).unwrap(), 1);

        let mut back = MsgBatch::alloc(1, &[8]);
        assert_eq!(client.recv_batch(&mut back, 1).unwrap(), 1);
        assert_eq!(back.vector(0).entry(0), b"ping");
        assert_eq!(back.addr(0), Some(server.local_addr().unwrap()));
    }

    #[test]
    fn zero_max_is_noop() {
        let udp = loopback(&UdpOpts::new().nonblocking(true));
        let mut batch = MsgBatch::alloc(1, &[8]);
        assert_eq!(udp.recv_batch(&mut batch, 0).unwrap(), 0);
        assert_eq!(udp.send_batch(&mut batch, 0).unwrap(), 0);
    }
}

//! # dgram - batched UDP datagram I/O
//!
//! Build, own and move large batches of datagrams with `recvmmsg` and
//! `sendmmsg`, over buffers whose descriptors are the kernel's own
//! `iovec`/`mmsghdr` layout: no copy or translation between the two.
//!
//! ## Quick Start
//!
//! ```ignore
//! use dgram::{Host, MsgBatch, Udp, UdpOpts};
//!
//! fn main() -> dgram::DgResult<()> {
//!     let host: Host = "0.0.0.0:7000".parse()?;
//!     let udp = Udp::server(&host, &UdpOpts::new().reuse_port(true))?;
//!
//!     // 64 datagrams per call, one 1500-byte segment each.
//!     let mut batch = MsgBatch::alloc(64, &[1500]);
//!     loop {
//!         let n = udp.recv_batch(&mut batch, 64)?;
//!         for i in 0..n {
//!             let payload = batch.vector(i).entry(0);
//!             // ...
//!         }
//!         udp.send_batch(&mut batch, n)?;  // echo to each sender
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        dgram-net                            │
//! │     Host → Udp::server → recv_batch / send_batch            │
//! │     MsgBatch = [mmsghdr][sockaddr_storage][IoVector] × N    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        dgram-core                           │
//! │         Bin (truncating), Buf (growing), Cursor, bits       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        dgram-diag                           │
//! │   DgError, fail!/report_warn!/defect!, stderr/syslog sink   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//!
//! Every type is owned by one thread at a time and does no locking.
//! Scale out with one `Udp` and one `MsgBatch` per thread, all bound with
//! `reuse_port`.

pub use dgram_core::{bits, env, Bin, Buf, Cursor};
pub use dgram_diag::{
    code, process, report, Code, DgError, DgResult, ErrorRecord, ResultExt, Severity,
};
pub use dgram_diag::{defect, ensure, fail, fail_errno, fail_os, report_warn, report_warn_errno};
pub use dgram_net::{Host, IoVec, IoVector, MsgBatch, Udp, UdpOpts, HOST_CAP};

pub mod net {
    pub use dgram_net::{config, host, iovec, mmsg, sockaddr, udp};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facade_round_trip() {
        let mut buf = Buf::new();
        buf.write(b"abc");
        let mut bin = Bin::alloc(2);
        bin.write(buf.as_slice());
        assert_eq!(bin.as_slice(), b"ab");

        let host: Host = "localhost:7000".parse().unwrap();
        assert_eq!(host.service(), "7000");
        assert_eq!(bits::ceil_pow2(5), 8);
    }
}

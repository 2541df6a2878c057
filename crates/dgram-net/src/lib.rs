//! # dgram-net
//!
//! Batched UDP I/O over memory shared with the kernel's native
//! descriptors.
//!
//! ## Modules
//!
//! - `iovec` - `IoVec` segments and `IoVector` groups (one block each)
//! - `mmsg` - `MsgBatch`: headers, peer addresses and vectors in one block
//! - `host` - `host:service` endpoint names
//! - `config` - `UdpOpts` socket options
//! - `udp` - `Udp` sockets: resolve, bind, `recv_batch`, `send_batch`
//! - `sockaddr` - `SocketAddr` to/from native addresses

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod config;
        pub mod host;
        pub mod iovec;
        pub mod mmsg;
        pub mod sockaddr;
        pub mod udp;

        pub use config::UdpOpts;
        pub use host::{Host, HOST_CAP};
        pub use iovec::{IoVec, IoVector};
        pub use mmsg::MsgBatch;
        pub use udp::Udp;
    } else {
        compile_error!("dgram-net needs recvmmsg/sendmmsg (Linux only)");
    }
}

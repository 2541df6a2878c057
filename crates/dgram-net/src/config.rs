//! UDP socket options

use std::time::Duration;

use dgram_core::env::{env_get_bool, env_get_duration_ms, env_get_opt};
use dgram_diag::code::*;
use dgram_diag::{ensure, DgResult};

/// Options applied to a socket between `socket()` and `bind()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UdpOpts {
    /// Pin incoming traffic to the binding thread's current CPU
    /// (`SO_INCOMING_CPU`).
    pub cpu_affinity: bool,

    /// Share the address with other sockets (`SO_REUSEPORT`).
    pub reuse_port: bool,

    /// Open with `SOCK_NONBLOCK`; an empty transfer returns 0 at once.
    pub nonblocking: bool,

    /// Bound on a blocking receive (`SO_RCVTIMEO`). Expiry is a
    /// zero-progress receive, not an error.
    pub recv_timeout: Option<Duration>,

    /// Kernel receive buffer hint (`SO_RCVBUF`).
    pub recv_buffer: Option<usize>,

    /// Kernel send buffer hint (`SO_SNDBUF`).
    pub send_buffer: Option<usize>,
}

impl UdpOpts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from the environment:
    ///
    /// - `DGRAM_CPU_AFFINITY` (bool)
    /// - `DGRAM_REUSE_PORT` (bool)
    /// - `DGRAM_NONBLOCKING` (bool)
    /// - `DGRAM_RECV_TIMEOUT_MS` (0 = none)
    /// - `DGRAM_RCVBUF`, `DGRAM_SNDBUF` (bytes)
    pub fn from_env() -> Self {
        Self {
            cpu_affinity: env_get_bool("DGRAM_CPU_AFFINITY", false),
            reuse_port: env_get_bool("DGRAM_REUSE_PORT", false),
            nonblocking: env_get_bool("DGRAM_NONBLOCKING", false),
            recv_timeout: env_get_duration_ms("DGRAM_RECV_TIMEOUT_MS"),
            recv_buffer: env_get_opt("DGRAM_RCVBUF"),
            send_buffer: env_get_opt("DGRAM_SNDBUF"),
        }
    }

    pub fn cpu_affinity(mut self, enable: bool) -> Self {
        self.cpu_affinity = enable;
        self
    }

    pub fn reuse_port(mut self, enable: bool) -> Self {
        self.reuse_port = enable;
        self
    }

    pub fn nonblocking(mut self, enable: bool) -> Self {
        self.nonblocking = enable;
        self
    }

    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    pub fn recv_buffer(mut self, bytes: usize) -> Self {
        self.recv_buffer = Some(bytes);
        self
    }

    pub fn send_buffer(mut self, bytes: usize) -> Self {
        self.send_buffer = Some(bytes);
        self
    }

    /// Reject values the kernel would misread: a timeout that rounds to
    /// a zero `timeval` means "forever" to `SO_RCVTIMEO`, and zero or
    /// oversized buffers are meaningless.
    pub fn validate(&self) -> DgResult<()> {
        if let Some(t) = self.recv_timeout {
            ensure!(t >= Duration::from_micros(1), SYS_CONFIG, ERR_INVALID, OP_CONFIGURE,
                "recv_timeout must be at least 1us: {:?}", t);
        }
        for (what, size) in [("recv_buffer", self.recv_buffer), ("send_buffer", self.send_buffer)] {
            if let Some(size) = size {
                ensure!(size > 0 && size <= i32::MAX as usize, SYS_CONFIG, ERR_INVALID,
                    OP_CONFIGURE, "{} out of range: {}", what, size);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_plain() {
        let opts = UdpOpts::default();
        assert!(!opts.cpu_affinity);
        assert!(!opts.reuse_port);
        assert!(!opts.nonblocking);
        assert!(opts.recv_timeout.is_none());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn builder() {
        let opts = UdpOpts::new()
            .cpu_affinity(true)
            .reuse_port(true)
            .nonblocking(true)
            .recv_timeout(Duration::from_millis(50))
            .recv_buffer(1 << 20);
        assert!(opts.cpu_affinity && opts.reuse_port && opts.nonblocking);
        assert_eq!(opts.recv_timeout, Some(Duration::from_millis(50)));
        assert_eq!(opts.recv_buffer, Some(1 << 20));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero() {
        let e = UdpOpts::new().recv_timeout(Duration::ZERO).validate().unwrap_err();
        assert_eq!(e.error_code(), &ERR_INVALID);
        assert!(UdpOpts::new().send_buffer(0).validate().is_err());
    }

    #[test]
    fn validate_rejects_sub_microsecond_timeout() {
        let e = UdpOpts::new().recv_timeout(Duration::from_nanos(500)).validate().unwrap_err();
        assert_eq!(e.error_code(), &ERR_INVALID);
        assert!(UdpOpts::new().recv_timeout(Duration::from_micros(1)).validate().is_ok());
    }

    #[test]
    fn from_env_reads_keys() {
        std::env::set_var("DGRAM_REUSE_PORT", "1");
        std::env::set_var("DGRAM_RECV_TIMEOUT_MS", "20");
        std::env::set_var("DGRAM_RCVBUF", "65536");
        let opts = UdpOpts::from_env();
        std::env::remove_var("DGRAM_REUSE_PORT");
        std::env::remove_var("DGRAM_RECV_TIMEOUT_MS");
        std::env::remove_var("DGRAM_RCVBUF");

        assert!(opts.reuse_port);
        assert_eq!(opts.recv_timeout, Some(Duration::from_millis(20)));
        assert_eq!(opts.recv_buffer, Some(65536));
        assert_eq!(opts.send_buffer, None);
    }
}

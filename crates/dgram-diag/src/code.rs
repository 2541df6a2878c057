//! Numeric error classification codes.
//!
//! A `Code` pairs a human-readable name with a `u64` value. Matching is
//! done on the value only, so two codes with the same value are equal
//! regardless of name.
//!
//! # Naming conventions
//!
//! | Prefix | Purpose              | Example                        |
//! |--------|----------------------|--------------------------------|
//! | `SYS_` | Originating system   | `SYS_NET`, `SYS_BUF`           |
//! | `ERR_` | Error code           | `ERR_HOST_FORMAT`, `ERR_BIND`  |
//! | `OP_`  | Operation in flight  | `OP_RECV`, `OP_RESOLVE`        |
//!
//! # Code ranges
//!
//! | Range          | Purpose                          |
//! |----------------|----------------------------------|
//! | `0`            | `UNSET`                          |
//! | `1000 — 1999`  | systems                          |
//! | `2000 — 2999`  | POSIX errno (`2000 + errno`)     |
//! | `3000 — 3999`  | dgram error codes                |
//! | `4000 — 4999`  | operations                       |

#[derive(Clone, Copy)]
pub struct Code {
    pub name: &'static str,
    pub value: u64,
}

impl Code {
    /// ```
    /// use dgram_diag::Code;
    /// const SYS_APP: Code = Code::new("app", 100_001);
    /// assert_eq!(SYS_APP.value, 100_001);
    /// ```
    pub const fn new(name: &'static str, value: u64) -> Self {
        Self { name, value }
    }

    /// Sentinel for unset / don't-care fields.
    pub const UNSET: Code = Code::new("unset", 0);

    #[inline]
    pub const fn is_unset(&self) -> bool {
        self.value == 0
    }
}

impl PartialEq for Code {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Code {}

impl core::hash::Hash for Code {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl core::fmt::Debug for Code {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({})", self.name, self.value)
    }
}

impl core::fmt::Display for Code {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name)
    }
}

// ── Systems ───────────────────────────────────────────────────────

pub const SYS_IO: Code = Code::new("io", 1000);
pub const SYS_BUF: Code = Code::new("buf", 1001);
pub const SYS_NET: Code = Code::new("net", 1002);
pub const SYS_PROC: Code = Code::new("proc", 1003);
pub const SYS_CONFIG: Code = Code::new("config", 1004);

// ── dgram error codes ─────────────────────────────────────────────

pub const ERR_HOST_FORMAT: Code = Code::new("host_format", 3001);
pub const ERR_HOST_LEN: Code = Code::new("host_len", 3002);
pub const ERR_SERVICE_LEN: Code = Code::new("service_len", 3003);
pub const ERR_RESOLVE: Code = Code::new("resolve", 3004);
pub const ERR_SOCKET: Code = Code::new("socket", 3005);
pub const ERR_SOCKOPT: Code = Code::new("sockopt", 3006);
pub const ERR_BIND: Code = Code::new("bind", 3007);
pub const ERR_TRANSFER: Code = Code::new("transfer", 3008);
pub const ERR_INVALID: Code = Code::new("invalid", 3009);
pub const ERR_DEFECT: Code = Code::new("defect", 3010);
pub const ERR_SYSCONF: Code = Code::new("sysconf", 3011);

// ── Operations ────────────────────────────────────────────────────

pub const OP_PARSE: Code = Code::new("parse", 4001);
pub const OP_RESOLVE: Code = Code::new("resolve", 4002);
pub const OP_BIND: Code = Code::new("bind", 4003);
pub const OP_RECV: Code = Code::new("recv", 4004);
pub const OP_SEND: Code = Code::new("send", 4005);
pub const OP_CLOSE: Code = Code::new("close", 4006);
pub const OP_ALLOC: Code = Code::new("alloc", 4007);
pub const OP_READ: Code = Code::new("read", 4008);
pub const OP_INDEX: Code = Code::new("index", 4009);
pub const OP_CONFIGURE: Code = Code::new("configure", 4010);
pub const OP_QUERY: Code = Code::new("query", 4011);

// ── errno ─────────────────────────────────────────────────────────

/// Convert a raw errno into a `Code` (`2000 + errno`).
///
/// The name comes from the platform's errno table via `nix`.
///
/// ```
/// use dgram_diag::code::errno_code;
/// assert_eq!(errno_code(11).value, 2011);
/// ```
pub fn errno_code(errno: i32) -> Code {
    let name = match nix::errno::Errno::from_raw(errno) {
        nix::errno::Errno::UnknownErrno => "errno",
        e => e.desc(),
    };
    Code::new(name, 2000 + errno.max(0) as u64)
}

use std::error::Error;
use std::fmt;

use crate::record::{ErrorRecord, Severity};
use crate::Code;

/// Structured error for every fallible dgram operation.
///
/// Two internal representations, same external API:
///
/// - **Simple**: three `Code`s plus an optional errno, on the stack.
///   Used on the transfer hot path, where a failed `recvmmsg` should not
///   allocate.
///
/// - **Full**: boxed `ErrorRecord` with message, origin, errno, source
///   chain and optional backtrace. Used for setup failures (host parsing,
///   resolution, bind) where the diagnostic text matters.
pub struct DgError {
    repr: Repr,
}

enum Repr {
    Simple {
        system:     Code,
        error_code: Code,
        op:         Code,
        os_error:   Option<i32>,
    },
    Full(Box<ErrorRecord>),
}

// ── Constructors ──────────────────────────────────────────────────

impl DgError {
    /// Zero-allocation error with just the three identifying codes.
    #[inline]
    pub fn simple(system: Code, error_code: Code, op: Code) -> Self {
        Self {
            repr: Repr::Simple { system, error_code, op, os_error: None },
        }
    }

    /// Zero-allocation error carrying the errno of a failed syscall.
    #[inline]
    pub fn simple_os(system: Code, error_code: Code, op: Code, os_error: i32) -> Self {
        Self {
            repr: Repr::Simple { system, error_code, op, os_error: Some(os_error) },
        }
    }

    /// Full diagnostic error from a pre-built record.
    ///
    /// Prefer the `fail!` family of macros over calling this directly;
    /// they fill in the origin and honor the abort-on-fail switch.
    pub fn full(record: ErrorRecord) -> Self {
        Self {
            repr: Repr::Full(Box::new(record)),
        }
    }
}

// ── Accessors ─────────────────────────────────────────────────────

impl DgError {
    #[inline]
    pub fn system(&self) -> &Code {
        match &self.repr {
            Repr::Simple { system, .. } => system,
            Repr::Full(rec) => &rec.system,
        }
    }

    #[inline]
    pub fn error_code(&self) -> &Code {
        match &self.repr {
            Repr::Simple { error_code, .. } => error_code,
            Repr::Full(rec) => &rec.error_code,
        }
    }

    /// The operation that was in flight.
    #[inline]
    pub fn op(&self) -> &Code {
        match &self.repr {
            Repr::Simple { op, .. } => op,
            Repr::Full(rec) => &rec.op,
        }
    }

    /// The triple `(system, error_code, op)` for matching.
    #[inline]
    pub fn kind(&self) -> (&Code, &Code, &Code) {
        (self.system(), self.error_code(), self.op())
    }

    /// Raw errno, if the error came from a system call.
    #[inline]
    pub fn os_error(&self) -> Option<i32> {
        match &self.repr {
            Repr::Simple { os_error, .. } => *os_error,
            Repr::Full(rec) => rec.os_error,
        }
    }

    #[inline]
    pub fn severity(&self) -> Severity {
        match &self.repr {
            Repr::Simple { .. } => Severity::Fail,
            Repr::Full(rec) => rec.severity,
        }
    }

    /// Human-readable message. Empty for Simple errors.
    pub fn message(&self) -> &str {
        match &self.repr {
            Repr::Simple { .. } => "",
            Repr::Full(rec) => &rec.message,
        }
    }

    /// Source location where the record was built.
    pub fn location(&self) -> Option<(&'static str, u32)> {
        match &self.repr {
            Repr::Full(rec) if !rec.file.is_empty() => Some((rec.file, rec.line)),
            _ => None,
        }
    }

    #[inline]
    pub fn is_simple(&self) -> bool {
        matches!(&self.repr, Repr::Simple { .. })
    }

    pub fn record(&self) -> Option<&ErrorRecord> {
        match &self.repr {
            Repr::Simple { .. } => None,
            Repr::Full(rec) => Some(&**rec),
        }
    }

    /// Consume the error and return its record. Simple errors are
    /// expanded into a minimal record.
    pub fn into_record(self) -> ErrorRecord {
        match self.repr {
            Repr::Simple { system, error_code, op, os_error } => ErrorRecord {
                system,
                error_code,
                op,
                os_error,
                ..Default::default()
            },
            Repr::Full(rec) => *rec,
        }
    }
}

// ── std::error::Error ─────────────────────────────────────────────

impl Error for DgError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.repr {
            Repr::Simple { .. } => None,
            Repr::Full(rec) => rec.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static)),
        }
    }
}

// ── Display ───────────────────────────────────────────────────────

fn write_errno(f: &mut fmt::Formatter<'_>, errno: i32) -> fmt::Result {
    write!(f, " - {}({})", nix::errno::Errno::from_raw(errno).desc(), errno)
}

impl fmt::Display for DgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Simple { system, error_code, op, os_error } => {
                write!(f, "[{}/{}] {}", system, error_code, op)?;
                if let Some(errno) = os_error {
                    write_errno(f, *errno)?;
                }
                Ok(())
            }
            Repr::Full(rec) => {
                write!(f, "[{}/{}] {}", rec.system, rec.error_code, rec.op)?;

                if !rec.message.is_empty() {
                    write!(f, ": {}", rec.message)?;
                }
                if let Some(errno) = rec.os_error {
                    write_errno(f, errno)?;
                }
                if let Some(src) = &rec.source {
                    write!(f, " (caused by: {})", src)?;
                }
                if !rec.file.is_empty() {
                    write!(f, " at {}:{}", rec.file, rec.line)?;
                }

                Ok(())
            }
        }
    }
}

impl fmt::Debug for DgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Simple { system, error_code, op, os_error } => f
                .debug_struct("DgError::Simple")
                .field("system", system)
                .field("error_code", error_code)
                .field("op", op)
                .field("os_error", os_error)
                .finish(),
            Repr::Full(rec) => f.debug_struct("DgError::Full").field("record", rec).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::*;

    #[test]
    fn simple_zero_alloc() {
        let err = DgError::simple(SYS_NET, ERR_TRANSFER, OP_RECV);
        assert!(err.is_simple());
        assert_eq!(err.kind(), (&SYS_NET, &ERR_TRANSFER, &OP_RECV));
        assert_eq!(err.os_error(), None);
        assert_eq!(err.severity(), Severity::Fail);
        assert!(err.record().is_none());
        assert!(err.location().is_none());
    }

    #[test]
    fn simple_os_keeps_errno() {
        let err = DgError::simple_os(SYS_NET, ERR_TRANSFER, OP_SEND, libc::ECONNREFUSED);
        assert_eq!(err.os_error(), Some(libc::ECONNREFUSED));
        let s = err.to_string();
        assert!(s.starts_with("[net/transfer] send"), "got: {}", s);
        assert!(s.contains(&format!("({})", libc::ECONNREFUSED)), "got: {}", s);
    }

    #[test]
    fn full_display() {
        let rec = ErrorRecord {
            system: SYS_NET,
            error_code: ERR_BIND,
            op: OP_BIND,
            message: "unable to bind 'db:5432'".to_string(),
            file: "udp.rs",
            line: 42,
            os_error: Some(libc::EADDRINUSE),
            ..Default::default()
        };
        let err = DgError::full(rec);
        assert!(!err.is_simple());
        assert_eq!(err.location(), Some(("udp.rs", 42)));
        assert_eq!(err.message(), "unable to bind 'db:5432'");

        let s = err.to_string();
        assert!(s.contains("unable to bind 'db:5432'"), "got: {}", s);
        assert!(s.ends_with("at udp.rs:42"), "got: {}", s);
    }

    #[test]
    fn into_record_from_simple() {
        let err = DgError::simple_os(SYS_NET, ERR_TRANSFER, OP_RECV, libc::EBADF);
        let rec = err.into_record();
        assert_eq!(rec.system, SYS_NET);
        assert_eq!(rec.os_error, Some(libc::EBADF));
        assert!(rec.message.is_empty());
    }

    #[test]
    fn source_chain() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let rec = ErrorRecord { system: SYS_NET, ..Default::default() }.with_source(io_err);
        let err = DgError::full(rec);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("caused by: port taken"));
    }

    #[test]
    fn send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DgError>();
    }
}

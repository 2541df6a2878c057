/// Build a fail-severity `DgError` with origin tracking.
///
/// ```ignore
/// return Err(fail!(SYS_NET, ERR_HOST_FORMAT, OP_PARSE, "invalid host string: {}", s));
/// ```
///
/// When abort-on-fail is switched on, the record is reported and the
/// process aborts here instead.
#[macro_export]
macro_rules! fail {
    ($system:expr, $error_code:expr, $op:expr, $($fmt:tt)+) => {
        $crate::report::__on_fail($crate::DgError::full($crate::__record(
            $system,
            $error_code,
            $op,
            $crate::Severity::Fail,
            file!(),
            line!(),
            format!($($fmt)+),
            None,
        )))
    };
}

/// Like `fail!`, but also captures the calling thread's errno.
///
/// Must be evaluated right after the failing call, before anything else
/// can clobber errno.
#[macro_export]
macro_rules! fail_errno {
    ($system:expr, $error_code:expr, $op:expr, $($fmt:tt)+) => {{
        let __errno = $crate::process::last_errno();
        $crate::report::__on_fail($crate::DgError::full($crate::__record(
            $system,
            $error_code,
            $op,
            $crate::Severity::Fail,
            file!(),
            line!(),
            format!($($fmt)+),
            Some(__errno),
        )))
    }};
}

/// Like `fail!`, with an errno captured earlier by the caller.
///
/// For failures detected after cleanup calls that may clobber errno.
#[macro_export]
macro_rules! fail_os {
    ($errno:expr, $system:expr, $error_code:expr, $op:expr, $($fmt:tt)+) => {
        $crate::report::__on_fail($crate::DgError::full($crate::__record(
            $system,
            $error_code,
            $op,
            $crate::Severity::Fail,
            file!(),
            line!(),
            format!($($fmt)+),
            $errno,
        )))
    };
}

/// Early-return `Err(fail!(..))` if a condition is false.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $system:expr, $error_code:expr, $op:expr, $($fmt:tt)+) => {
        if !$cond {
            return Err($crate::fail!($system, $error_code, $op, $($fmt)+));
        }
    };
}

/// Report a warning immediately; execution continues.
#[macro_export]
macro_rules! report_warn {
    ($system:expr, $error_code:expr, $op:expr, $($fmt:tt)+) => {
        $crate::report::__on_warn($crate::__record(
            $system,
            $error_code,
            $op,
            $crate::Severity::Warn,
            file!(),
            line!(),
            format!($($fmt)+),
            None,
        ))
    };
}

/// Like `report_warn!`, but also captures the calling thread's errno.
#[macro_export]
macro_rules! report_warn_errno {
    ($system:expr, $error_code:expr, $op:expr, $($fmt:tt)+) => {{
        let __errno = $crate::process::last_errno();
        $crate::report::__on_warn($crate::__record(
            $system,
            $error_code,
            $op,
            $crate::Severity::Warn,
            file!(),
            line!(),
            format!($($fmt)+),
            Some(__errno),
        ))
    }};
}

/// Programming-error check. On violation the record is reported and the
/// process aborts; there is no recoverable path.
///
/// ```ignore
/// defect!(i < self.cap, "index out of range: {} >= {}", i, self.cap);
/// ```
#[macro_export]
macro_rules! defect {
    ($cond:expr, $($fmt:tt)+) => {
        if !$cond {
            $crate::__defect(file!(), line!(), format!($($fmt)+));
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::code::*;
    use crate::{DgResult, Severity};

    #[test]
    fn fail_records_origin() {
        let e = fail!(SYS_NET, ERR_HOST_FORMAT, OP_PARSE, "invalid host string: {}", "db");
        assert_eq!(e.kind(), (&SYS_NET, &ERR_HOST_FORMAT, &OP_PARSE));
        assert_eq!(e.message(), "invalid host string: db");
        assert_eq!(e.severity(), Severity::Fail);
        let (file, line) = e.location().unwrap();
        assert!(file.ends_with("macros.rs"));
        assert!(line > 0);
        assert_eq!(e.os_error(), None);
    }

    #[test]
    fn fail_errno_captures_errno() {
        // SAFETY: closing an invalid fd only sets errno.
        let ret = unsafe { libc::close(-1) };
        assert_eq!(ret, -1);
        let e = fail_errno!(SYS_NET, ERR_SOCKET, OP_CLOSE, "close failed");
        assert_eq!(e.os_error(), Some(libc::EBADF));
    }

    #[test]
    fn fail_os_takes_saved_errno() {
        let e = fail_os!(Some(libc::EADDRINUSE), SYS_NET, ERR_BIND, OP_BIND, "bind failed");
        assert_eq!(e.os_error(), Some(libc::EADDRINUSE));
        let e = fail_os!(None, SYS_NET, ERR_BIND, OP_BIND, "bind failed");
        assert_eq!(e.os_error(), None);
    }

    #[test]
    fn ensure_passes_and_fails() {
        fn check(v: usize) -> DgResult<usize> {
            ensure!(v > 0, SYS_CONFIG, ERR_INVALID, OP_CONFIGURE, "value must be positive");
            Ok(v)
        }
        assert_eq!(check(3).unwrap(), 3);
        let e = check(0).unwrap_err();
        assert_eq!(e.error_code(), &ERR_INVALID);
        assert_eq!(e.message(), "value must be positive");
    }

    #[test]
    fn defect_passes_when_true() {
        defect!(1 + 1 == 2, "arithmetic is broken");
    }
}

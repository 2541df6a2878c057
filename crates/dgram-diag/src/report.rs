//! Reporting sink for diagnostic records.
//!
//! Records are formatted synchronously and written either to standard
//! error (default) or to the system log after [`use_syslog`].
//!
//! # Environment Variables
//!
//! - `DGRAM_FLUSH_EPRINT=1` - flush stderr after each record
//! - `DGRAM_SYSLOG=1` - route records to syslog from the first report on
//! - `DGRAM_ABORT_ON_FAIL=1` - abort the process when a fail record is built
//! - `DGRAM_ABORT_ON_WARN=1` - abort the process when a warning is reported

use std::ffi::CString;
use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::record::{ErrorRecord, Severity};
use crate::DgError;

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static SYSLOG_ENABLED: AtomicBool = AtomicBool::new(false);
static ABORT_ON_FAIL: AtomicBool = AtomicBool::new(false);
static ABORT_ON_WARN: AtomicBool = AtomicBool::new(false);

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// Load switches from the environment.
///
/// Called lazily on first use; call explicitly for deterministic
/// initialization. Programmatic setters called afterwards win.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Some(flush) = env_flag("DGRAM_FLUSH_EPRINT") {
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }
    if let Some(abort) = env_flag("DGRAM_ABORT_ON_FAIL") {
        ABORT_ON_FAIL.store(abort, Ordering::Relaxed);
    }
    if let Some(abort) = env_flag("DGRAM_ABORT_ON_WARN") {
        ABORT_ON_WARN.store(abort, Ordering::Relaxed);
    }
    if env_flag("DGRAM_SYSLOG") == Some(true) {
        use_syslog();
    }
}

#[inline]
fn ensure_init() {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
}

/// Route all further records to the system log.
pub fn use_syslog() {
    if SYSLOG_ENABLED.swap(true, Ordering::SeqCst) {
        return;
    }
    // SAFETY: a null ident makes openlog use the program name.
    unsafe {
        libc::openlog(
            std::ptr::null(),
            libc::LOG_CONS | libc::LOG_NDELAY | libc::LOG_PID,
            libc::LOG_USER,
        );
    }
}

#[inline]
pub fn syslog_enabled() -> bool {
    SYSLOG_ENABLED.load(Ordering::Relaxed)
}

pub fn set_flush_enabled(enabled: bool) {
    ensure_init();
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Abort the process whenever a fail record is built.
pub fn set_abort_on_fail(enabled: bool) {
    ensure_init();
    ABORT_ON_FAIL.store(enabled, Ordering::Relaxed);
}

/// Abort the process whenever a warning is reported.
pub fn set_abort_on_warn(enabled: bool) {
    ensure_init();
    ABORT_ON_WARN.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn abort_on_fail() -> bool {
    ensure_init();
    ABORT_ON_FAIL.load(Ordering::Relaxed)
}

#[inline]
pub fn abort_on_warn() -> bool {
    ensure_init();
    ABORT_ON_WARN.load(Ordering::Relaxed)
}

/// Format a record the way the sink prints it.
///
/// ```text
/// <pid:tid> file:line: message - strerror(errno)
///   {0} frame
///   {1} frame
/// ```
pub fn format_error(err: &DgError) -> String {
    let mut out = String::with_capacity(128);
    let _ = write!(out, "<{}:{}> ", std::process::id(), crate::process::tid());

    if let Some((file, line)) = err.location() {
        let _ = write!(out, "{}:{}: ", file, line);
    }

    if err.message().is_empty() {
        let (system, code, op) = err.kind();
        let _ = write!(out, "[{}/{}] {}", system, code, op);
    } else {
        out.push_str(err.message());
    }

    if let Some(errno) = err.os_error() {
        let _ = write!(out, " - {}({})", nix::errno::Errno::from_raw(errno).desc(), errno);
    }
    out.push('\n');

    if let Some(bt) = err.record().and_then(|r| r.backtrace.as_deref()) {
        for (i, frame) in bt.lines().enumerate() {
            let _ = writeln!(out, "  {{{}}} {}", i, frame.trim());
        }
    }

    out
}

/// Emit a record to the configured sink.
pub fn report(err: &DgError) {
    ensure_init();
    let text = format_error(err);

    if syslog_enabled() {
        let priority = match err.severity() {
            Severity::Warn => libc::LOG_WARNING,
            Severity::Fail => libc::LOG_ERR,
        };
        let Ok(msg) = CString::new(text.replace('\0', "\\0")) else { return };
        // SAFETY: both pointers are valid NUL-terminated strings and the
        // format consumes exactly one string argument.
        unsafe {
            libc::syslog(priority, b"%s\0".as_ptr() as *const libc::c_char, msg.as_ptr());
        }
        return;
    }

    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_all(text.as_bytes());
    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = handle.flush();
    }
}

/// Report and abort. Used for defects and environment failures this
/// layer does not recover from.
pub fn abort_with(err: &DgError) -> ! {
    report(err);
    std::process::abort()
}

/// Report and exit with status 1.
pub fn exit_with(err: &DgError) -> ! {
    report(err);
    std::process::exit(1)
}

/// Hook run by the `fail!` macros on every freshly built fail record.
#[doc(hidden)]
pub fn __on_fail(err: DgError) -> DgError {
    if abort_on_fail() {
        abort_with(&err);
    }
    err
}

/// Hook run by `report_warn!`: emit, then honor abort-on-warn.
#[doc(hidden)]
pub fn __on_warn(record: ErrorRecord) {
    let err = DgError::full(record);
    report(&err);
    if abort_on_warn() {
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::*;

    #[test]
    fn format_full_record() {
        let rec = ErrorRecord {
            system: SYS_NET,
            error_code: ERR_BIND,
            op: OP_BIND,
            message: "unable to bind".to_string(),
            file: "udp.rs",
            line: 7,
            os_error: Some(libc::EADDRINUSE),
            ..Default::default()
        };
        let text = format_error(&DgError::full(rec));

        let prefix = format!("<{}:{}> ", std::process::id(), crate::process::tid());
        assert!(text.starts_with(&prefix), "got: {}", text);
        assert!(text.contains("udp.rs:7: unable to bind - "), "got: {}", text);
        assert!(text.ends_with(&format!("({})\n", libc::EADDRINUSE)), "got: {}", text);
    }

    #[test]
    fn format_simple_uses_codes() {
        let text = format_error(&DgError::simple(SYS_NET, ERR_TRANSFER, OP_SEND));
        assert!(text.contains("[net/transfer] send"), "got: {}", text);
        assert!(!text.contains(" - "), "got: {}", text);
    }

    #[test]
    fn format_numbers_backtrace_frames() {
        let rec = ErrorRecord {
            message: "boom".to_string(),
            backtrace: Some("frame_a\nframe_b".to_string()),
            ..Default::default()
        };
        let text = format_error(&DgError::full(rec));
        assert!(text.contains("  {0} frame_a\n"), "got: {}", text);
        assert!(text.contains("  {1} frame_b\n"), "got: {}", text);
    }

    #[test]
    fn report_to_stderr_does_not_panic() {
        report(&DgError::simple(SYS_NET, ERR_TRANSFER, OP_RECV));
    }
}

//! Structured diagnostics for the dgram crates.
//!
//! Errors carry a (system, error code, operation) triple. Hot paths use
//! the allocation-free `Simple` form; the `fail!` family builds a full
//! [`ErrorRecord`] with message, origin and errno.
//!
//! Three kinds of conditions are distinguished:
//!
//! - **fail**: the operation cannot proceed; returned as `Err(DgError)`.
//! - **warn**: an anomaly that does not stop execution; reported at once.
//! - **defect**: a broken precondition or invariant; reported, then abort.
//!
//! # Example
//!
//! ```ignore
//! use dgram_diag::code::*;
//! use dgram_diag::{fail, DgResult};
//!
//! fn parse_port(s: &str) -> DgResult<u16> {
//!     s.parse().map_err(|_| fail!(SYS_NET, ERR_HOST_FORMAT, OP_PARSE, "bad port: {}", s))
//! }
//! ```

#[macro_use]
mod macros;

pub mod code;
pub mod process;
pub mod report;

mod convert;
mod error;
mod record;

pub use code::Code;
pub use convert::ResultExt;
pub use error::DgError;
pub use record::{ErrorRecord, Severity};

pub type DgResult<T> = Result<T, DgError>;

#[doc(hidden)]
#[allow(clippy::too_many_arguments)]
pub fn __record(
    system: Code,
    error_code: Code,
    op: Code,
    severity: Severity,
    file: &'static str,
    line: u32,
    message: String,
    os_error: Option<i32>,
) -> ErrorRecord {
    let mut record = ErrorRecord {
        system,
        error_code,
        op,
        severity,
        message,
        file,
        line,
        os_error,
        ..ErrorRecord::default()
    };
    record.capture_backtrace();
    record
}

#[doc(hidden)]
#[cold]
pub fn __defect(file: &'static str, line: u32, message: String) -> ! {
    let record = __record(
        code::SYS_PROC,
        code::ERR_DEFECT,
        Code::UNSET,
        Severity::Fail,
        file,
        line,
        message,
        None,
    );
    report::abort_with(&DgError::full(record))
}

//! Conversions between `DgError` and the std / nix error types.

use std::io;

use crate::code::*;
use crate::record::ErrorRecord;
use crate::{Code, DgError};

impl From<io::Error> for DgError {
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => DgError::simple_os(SYS_IO, errno_code(errno), Code::UNSET, errno),
            None => DgError::full(ErrorRecord {
                system: SYS_IO,
                error_code: ERR_INVALID,
                message: err.to_string(),
                ..ErrorRecord::default()
            }
            .with_source(err)),
        }
    }
}

impl From<nix::errno::Errno> for DgError {
    fn from(errno: nix::errno::Errno) -> Self {
        let raw = errno as i32;
        DgError::simple_os(SYS_IO, errno_code(raw), Code::UNSET, raw)
    }
}

impl From<DgError> for io::Error {
    fn from(err: DgError) -> Self {
        match err.os_error() {
            Some(errno) if err.is_simple() => io::Error::from_raw_os_error(errno),
            _ => io::Error::new(io::ErrorKind::Other, err),
        }
    }
}

/// Attach origin context to a foreign error on the way up.
///
/// ```ignore
/// let fd = nix_call().ctx(SYS_NET, ERR_SOCKET, OP_BIND)?;
/// ```
pub trait ResultExt<T> {
    fn ctx(self, system: Code, error_code: Code, op: Code) -> Result<T, DgError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<DgError>,
{
    fn ctx(self, system: Code, error_code: Code, op: Code) -> Result<T, DgError> {
        self.map_err(|e| {
            let inner: DgError = e.into();
            match inner.os_error() {
                Some(errno) if inner.is_simple() => {
                    DgError::simple_os(system, error_code, op, errno)
                }
                _ => {
                    let mut record = inner.into_record();
                    record.system = system;
                    record.error_code = error_code;
                    record.op = op;
                    DgError::full(record)
                }
            }
        })
    }
}

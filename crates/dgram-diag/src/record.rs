use std::error::Error;

use crate::Code;

/// How bad a reported condition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation could not proceed.
    Fail,
    /// An anomaly was noted; execution continues.
    Warn,
}

/// Full diagnostic record, heap-allocated behind a `DgError`.
///
/// Carries what the reporting sink needs to print a line: origin,
/// message, the errno observed at the failure site, and optionally a
/// captured call stack.
pub struct ErrorRecord {
    // ── Identity ──────────────────────────────────────────────
    pub system:     Code,
    pub error_code: Code,
    pub op:         Code,
    pub severity:   Severity,

    // ── Origin ────────────────────────────────────────────────
    pub message:    String,
    pub file:       &'static str,
    pub line:       u32,

    /// Raw errno captured at the failure site, if the failure came from
    /// a system call.
    pub os_error:   Option<i32>,

    // ── Error chain ───────────────────────────────────────────
    pub source:     Option<Box<dyn Error + Send + Sync>>,

    // ── Backtrace ─────────────────────────────────────────────
    pub backtrace:  Option<String>,
}

impl ErrorRecord {
    pub fn with_source<E>(mut self, error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(error));
        self
    }

    pub fn with_os_error(mut self, errno: i32) -> Self {
        self.os_error = Some(errno);
        self
    }

    /// Capture the current call stack. No-op without the `backtrace`
    /// feature or when a stack was already captured.
    pub fn capture_backtrace(&mut self) {
        #[cfg(feature = "backtrace")]
        if self.backtrace.is_none() {
            self.backtrace = Some(std::backtrace::Backtrace::force_capture().to_string());
        }
    }
}

impl Default for ErrorRecord {
    fn default() -> Self {
        Self {
            system:     Code::UNSET,
            error_code: Code::UNSET,
            op:         Code::UNSET,
            severity:   Severity::Fail,
            message:    String::new(),
            file:       "",
            line:       0,
            os_error:   None,
            source:     None,
            backtrace:  None,
        }
    }
}

impl core::fmt::Debug for ErrorRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut d = f.debug_struct("ErrorRecord");
        d.field("system", &self.system);
        d.field("error_code", &self.error_code);
        d.field("op", &self.op);
        d.field("severity", &self.severity);

        if !self.message.is_empty() {
            d.field("message", &self.message);
        }
        d.field("location", &format_args!("{}:{}", self.file, self.line));

        if let Some(errno) = self.os_error {
            d.field("os_error", &errno);
        }
        if self.source.is_some() {
            d.field("source", &self.source.as_ref().map(|e| e.to_string()));
        }
        if self.backtrace.is_some() {
            d.field("backtrace", &"<captured>");
        }

        d.finish()
    }
}

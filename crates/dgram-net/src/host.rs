//! Host/service endpoint names.

use std::ffi::CString;
use std::fmt;
use std::str::FromStr;

use arrayvec::ArrayString;
use dgram_diag::code::*;
use dgram_diag::{fail, Code, DgError, DgResult};

/// Storage per field, terminator included; names are at most
/// `HOST_CAP - 1` bytes.
pub const HOST_CAP: usize = 250;

type Name = ArrayString<HOST_CAP>;

/// Parsed `host` and `service` pair, as handed to `getaddrinfo`.
///
/// An empty host resolves to the wildcard address when binding.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Host {
    host: Name,
    service: Name,
}

impl Host {
    /// Split `host:service` on the first `:`.
    ///
    /// The separator must appear within the first `HOST_CAP + 1` bytes
    /// and the host part must be non-empty.
    pub fn parse(s: &str) -> DgResult<Host> {
        let sep = s.bytes().take(HOST_CAP + 1).position(|b| b == b':');
        let sep = match sep {
            Some(sep) if sep > 0 => sep,
            _ => return Err(fail!(SYS_NET, ERR_HOST_FORMAT, OP_PARSE, "invalid host string: {}", s)),
        };

        Ok(Host {
            host: name(&s[..sep], ERR_HOST_LEN, "host")?,
            service: name(&s[sep + 1..], ERR_SERVICE_LEN, "service")?,
        })
    }

    /// `host` with a numeric port as service.
    pub fn from_host_port(host: &str, port: u16) -> DgResult<Host> {
        let host = name(host, ERR_HOST_LEN, "host")?;
        let mut service = Name::new();
        // A u16 never exceeds five digits.
        let _ = fmt::write(&mut service, format_args!("{}", port));
        Ok(Host { host, service })
    }

    /// `host` with a named (or numeric) service.
    pub fn from_host_service(host: &str, service: &str) -> DgResult<Host> {
        Ok(Host {
            host: name(host, ERR_HOST_LEN, "host")?,
            service: name(service, ERR_SERVICE_LEN, "service")?,
        })
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// NUL-terminated forms for the resolver. `None` host means wildcard.
    pub(crate) fn to_c(&self) -> DgResult<(Option<CString>, CString)> {
        let to_c = |s: &str| {
            CString::new(s).map_err(|_| {
                fail!(SYS_NET, ERR_HOST_FORMAT, OP_RESOLVE, "NUL byte in name: {:?}", s)
            })
        };
        let host = if self.host.is_empty() { None } else { Some(to_c(&self.host)?) };
        Ok((host, to_c(&self.service)?))
    }
}

fn name(s: &str, code: Code, what: &str) -> Result<Name, DgError> {
    if s.contains('\0') {
        return Err(fail!(SYS_NET, ERR_HOST_FORMAT, OP_PARSE, "NUL byte in {}: {:?}", what, s));
    }
    if s.len() >= HOST_CAP {
        return Err(fail!(SYS_NET, code, OP_PARSE, "invalid {} length: {}", what, s.len()));
    }
    Name::from(s).map_err(|_| fail!(SYS_NET, code, OP_PARSE, "invalid {} length: {}", what, s.len()))
}

impl FromStr for Host {
    type Err = DgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Host::parse(s)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.service)
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("host", &self.host.as_str())
            .field("service", &self.service.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_colon() {
        let h = Host::parse("db:5432").unwrap();
        assert_eq!(h.host(), "db");
        assert_eq!(h.service(), "5432");

        let h = Host::parse("localhost:http:alt").unwrap();
        assert_eq!(h.host(), "localhost");
        assert_eq!(h.service(), "http:alt");
    }

    #[test]
    fn parse_matches_host_port() {
        assert_eq!(Host::parse("db:5432").unwrap(), Host::from_host_port("db", 5432).unwrap());
        assert_eq!(
            Host::parse("db:postgres").unwrap(),
            Host::from_host_service("db", "postgres").unwrap()
        );
    }

    #[test]
    fn parse_rejects_missing_separator() {
        let e = Host::parse("noseparator").unwrap_err();
        assert_eq!(e.error_code(), &ERR_HOST_FORMAT);
        assert_eq!(e.message(), "invalid host string: noseparator");

        assert!(Host::parse(":5432").is_err());
        assert!(Host::parse("").is_err());
    }

    #[test]
    fn parse_separator_must_be_within_bound() {
        let late = format!("{}:53", "a".repeat(HOST_CAP + 1));
        assert_eq!(Host::parse(&late).unwrap_err().error_code(), &ERR_HOST_FORMAT);

        let at_bound = format!("{}:53", "a".repeat(HOST_CAP));
        assert_eq!(Host::parse(&at_bound).unwrap_err().error_code(), &ERR_HOST_LEN);

        let fits = format!("{}:53", "a".repeat(HOST_CAP - 1));
        assert_eq!(Host::parse(&fits).unwrap().host().len(), HOST_CAP - 1);
    }

    #[test]
    fn long_service_rejected() {
        let s = format!("db:{}", "9".repeat(HOST_CAP));
        assert_eq!(Host::parse(&s).unwrap_err().error_code(), &ERR_SERVICE_LEN);
        let e = Host::from_host_service("db", &"x".repeat(HOST_CAP)).unwrap_err();
        assert_eq!(e.error_code(), &ERR_SERVICE_LEN);
    }

    #[test]
    fn long_host_rejected() {
        let e = Host::from_host_port(&"h".repeat(HOST_CAP), 1).unwrap_err();
        assert_eq!(e.error_code(), &ERR_HOST_LEN);
    }

    #[test]
    fn nul_rejected() {
        assert!(Host::parse("d\0b:53").is_err());
        assert!(Host::from_host_service("db", "5\0").is_err());
    }

    #[test]
    fn display_and_from_str() {
        let h: Host = "127.0.0.1:65535".parse().unwrap();
        assert_eq!(h.to_string(), "127.0.0.1:65535");
        assert_eq!(Host::from_host_port("::", 0).unwrap().service(), "0");
    }

    #[test]
    fn empty_host_is_wildcard() {
        let h = Host::from_host_port("", 7000).unwrap();
        let (host, service) = h.to_c().unwrap();
        assert!(host.is_none());
        assert_eq!(service.to_str().unwrap(), "7000");
    }
}

//! Conversion between `std::net::SocketAddr` and native socket addresses.

use std::mem::size_of;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Decode a native address of `len` bytes. `None` for an empty or
/// unsupported address.
pub fn to_std(storage: &libc::sockaddr_storage, len: libc::socklen_t) -> Option<SocketAddr> {
    let len = len as usize;
    match storage.ss_family as libc::c_int {
        libc::AF_INET if len >= size_of::<libc::sockaddr_in>() => {
            // SAFETY: family and length say this is a sockaddr_in; storage
            // is large and aligned enough for every address type.
            let sin = unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            Some(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
        }
        libc::AF_INET6 if len >= size_of::<libc::sockaddr_in6>() => {
            // SAFETY: as above, for sockaddr_in6.
            let sin6 = unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            Some(SocketAddr::V6(SocketAddrV6::new(
                ip,
                u16::from_be(sin6.sin6_port),
                u32::from_be(sin6.sin6_flowinfo),
                sin6.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

/// Encode `addr` into `storage`, returning the length to pass alongside.
pub fn from_std(addr: &SocketAddr, storage: &mut libc::sockaddr_storage) -> libc::socklen_t {
    // SAFETY: all-zero is a valid sockaddr_storage.
    *storage = unsafe { std::mem::zeroed() };
    match addr {
        SocketAddr::V4(a) => {
            // SAFETY: storage is large and aligned enough for sockaddr_in.
            let sin = unsafe { &mut *(storage as *mut _ as *mut libc::sockaddr_in) };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = a.port().to_be();
            sin.sin_addr.s_addr = u32::from(*a.ip()).to_be();
            size_of::<libc::sockaddr_in>() as libc::socklen_t
        }
        SocketAddr::V6(a) => {
            // SAFETY: storage is large and aligned enough for sockaddr_in6.
            let sin6 = unsafe { &mut *(storage as *mut _ as *mut libc::sockaddr_in6) };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = a.port().to_be();
            sin6.sin6_flowinfo = a.flowinfo().to_be();
            sin6.sin6_addr.s6_addr = a.ip().octets();
            sin6.sin6_scope_id = a.scope_id();
            size_of::<libc::sockaddr_in6>() as libc::socklen_t
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed() -> libc::sockaddr_storage {
        unsafe { std::mem::zeroed() }
    }

    #[test]
    fn v4_both_ways() {
        let addr: SocketAddr = "192.168.1.20:5432".parse().unwrap();
        let mut ss = zeroed();
        let len = from_std(&addr, &mut ss);
        assert_eq!(len as usize, size_of::<libc::sockaddr_in>());
        assert_eq!(to_std(&ss, len), Some(addr));
    }

    #[test]
    fn v6_both_ways() {
        let addr: SocketAddr = "[fe80::1%3]:53".parse().unwrap();
        let mut ss = zeroed();
        let len = from_std(&addr, &mut ss);
        assert_eq!(to_std(&ss, len), Some(addr));
    }

    #[test]
    fn network_byte_order() {
        let addr: SocketAddr = "127.0.0.1:258".parse().unwrap();
        let mut ss = zeroed();
        from_std(&addr, &mut ss);
        let sin = unsafe { &*(&ss as *const _ as *const libc::sockaddr_in) };
        assert_eq!(sin.sin_port.to_ne_bytes(), [1, 2]);
        assert_eq!(sin.sin_addr.s_addr.to_ne_bytes(), [127, 0, 0, 1]);
    }

    #[test]
    fn short_or_unknown_is_none() {
        let addr: SocketAddr = "10.0.0.1:1".parse().unwrap();
        let mut ss = zeroed();
        from_std(&addr, &mut ss);
        assert_eq!(to_std(&ss, 0), None);
        assert_eq!(to_std(&zeroed(), 128), None);
    }
}

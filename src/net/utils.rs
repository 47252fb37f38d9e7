//! Socket address conversion for raw libc calls.

use libc::{AF_INET, AF_INET6, sa_family_t, sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t};
use std::mem;
use std::net::SocketAddr;

/// Converts `address` into a `sockaddr_storage` plus the length of the used prefix.
pub(crate) fn to_sockaddr(address: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    let length = match address {
        SocketAddr::V4(v4) => {
            let raw = unsafe { &mut *(&mut storage as *mut sockaddr_storage as *mut sockaddr_in) };
            raw.sin_family = AF_INET as sa_family_t;
            raw.sin_port = v4.port().to_be();
            raw.sin_addr.s_addr = u32::from(*v4.ip()).to_be();
            mem::size_of::<sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let raw = unsafe { &mut *(&mut storage as *mut sockaddr_storage as *mut sockaddr_in6) };
            raw.sin6_family = AF_INET6 as sa_family_t;
            raw.sin6_port = v6.port().to_be();
            raw.sin6_addr.s6_addr = v6.ip().octets();
            raw.sin6_flowinfo = v6.flowinfo();
            raw.sin6_scope_id = v6.scope_id();
            mem::size_of::<sockaddr_in6>()
        }
    };

    (storage, length as socklen_t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_address_is_network_order() {
        let address: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let (storage, length) = to_sockaddr(&address);
        let raw = unsafe { &*(&storage as *const sockaddr_storage as *const sockaddr_in) };

        assert_eq!(length as usize, mem::size_of::<sockaddr_in>());
        assert_eq!(raw.sin_family, AF_INET as sa_family_t);
        assert_eq!(u16::from_be(raw.sin_port), 8080);
        assert_eq!(u32::from_be(raw.sin_addr.s_addr), 0x7f00_0001);
    }
}

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::server::SharedProxyState;

/// Network address of the caller, if one could be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerAddress(pub Option<String>);

/// Work out the caller address for a request.
///
/// With `trust_proxy` the proxy sits behind exactly one trusted hop, so the
/// rightmost `X-Forwarded-For` entry is the address that hop saw. Otherwise
/// (or without the header) the socket peer is used.
pub fn caller_address(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        let forwarded = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .last();
        if let Some(addr) = forwarded {
            return Some(addr.to_string());
        }
    }

    peer.map(|addr| addr.ip().to_string())
}

impl FromRequestParts<SharedProxyState> for CallerAddress {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &SharedProxyState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(CallerAddress(caller_address(&parts.headers, peer, state.trust_proxy)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.5:54321".parse().unwrap())
    }

    #[test]
    fn uses_peer_ip_without_port() {
        let headers = HeaderMap::new();
        assert_eq!(caller_address(&headers, peer(), true).as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn trusts_last_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.1, 203.0.113.7"),
        );
        assert_eq!(caller_address(&headers, peer(), true).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn ignores_forwarded_header_when_untrusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        assert_eq!(caller_address(&headers, peer(), false).as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn no_source_means_no_address() {
        assert_eq!(caller_address(&HeaderMap::new(), None, true), None);
    }
}

// SSRF-safe DNS resolution
//
// The base URL a detection targets is user-supplied. Without filtering at
// the moment a hostname is actually resolved for connection, an attacker
// can rebind a public-looking hostname (via DNS) to a loopback address or a
// cloud metadata endpoint and have this service fetch it on their behalf.
//
// reqwest exposes a `dns::Resolve` hook that runs at connect time rather
// than at URL-parse time, which is what closes that TOCTOU gap: the name
// passed to TLS for SNI/certificate validation is still the original
// hostname (reqwest derives that from the URL, not from whatever this
// resolver returns), only the raw socket address is filtered here.

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::lookup_host;

/// Cloud metadata service address blocked on all clouds that mimic AWS's
/// link-local convention (AWS, GCP, Azure, DigitalOcean, Oracle Cloud).
const METADATA_IP: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

/// `true` iff `ip` is loopback, private (RFC 1918 / ULA), link-local
/// (unicast or multicast), unspecified, or the cloud metadata address.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_multicast()
                || v4 == METADATA_IP
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || is_unique_local(v6)
                || is_unicast_link_local(v6)
        }
    }
}

/// `fd00::/8`, IPv6 unique local addresses (the RFC 1918 analogue).
fn is_unique_local(v6: std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

/// `fe80::/10`, IPv6 link-local unicast.
fn is_unicast_link_local(v6: std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xffc0) == 0xfe80
}

/// Pre-flight check performed once per detection, ahead of actually
/// building a client and issuing probes. `SafeResolver` still runs on every
/// connect for defense against DNS rebinding between this check and the
/// first request, but resolving here upfront gives the caller a precise,
/// single reason instead of reqwest's generic connect-error wrapping.
pub async fn check_host_safety(host: &str) -> Result<(), String> {
    let addrs: Vec<SocketAddr> = lookup_host((host, 0))
        .await
        .map_err(|e| format!("DNS resolution failed: {e}"))?
        .collect();

    for addr in &addrs {
        if addr.ip() == IpAddr::V4(METADATA_IP) {
            return Err("connection to cloud metadata endpoint blocked".to_string());
        }
        if is_blocked_ip(addr.ip()) {
            return Err("connection to private IP blocked".to_string());
        }
    }

    Ok(())
}

/// DNS resolver that rejects any resolved address blocked by
/// [`is_blocked_ip`]. Installed via `reqwest::ClientBuilder::dns_resolver`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SafeResolver;

impl Resolve for SafeResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.as_str().to_string();
            let addrs: Vec<SocketAddr> = lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| -> reqwest::dns::BoxError { Box::new(e) })?
                .collect();

            if addrs.is_empty() {
                return Err("no addresses resolved".into());
            }

            if let Some(blocked) = addrs.iter().find(|a| is_blocked_ip(a.ip())) {
                tracing::warn!(host = %host, ip = %blocked.ip(), "blocked SSRF attempt");
                return Err("connection to private IP blocked".into());
            }

            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

/// Resolver used for admin-originated detections: performs the same DNS
/// lookup but never rejects the result. Non-admin callers must never be
/// given a client built with this resolver.
#[derive(Clone, Copy, Debug, Default)]
pub struct UncheckedResolver;

impl Resolve for UncheckedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.as_str().to_string();
            let addrs: Vec<SocketAddr> = lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| -> reqwest::dns::BoxError { Box::new(e) })?
                .collect();
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

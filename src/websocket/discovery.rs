//! Backend discovery on the local /24.
//!
//! The backend is assumed to share the node's subnet. A handful of
//! well-known host suffixes are probed with a plain HTTP health check; the
//! first host that answers like a backend wins.

use core::net::Ipv4Addr;

use log::{debug, info, warn};

use crate::app::ports::BackendHttp;

/// Host suffixes probed, in order.
pub const CANDIDATE_SUFFIXES: [u8; 5] = [1, 2, 10, 22, 100];

pub const PROBE_PATH: &str = "/api/health/heartbeat";
pub const PROBE_TIMEOUT_MS: u32 = 2_000;

/// Candidate backend addresses on `local`'s /24.
pub fn candidates(local: Ipv4Addr) -> impl Iterator<Item = Ipv4Addr> {
    let [a, b, c, _] = local.octets();
    CANDIDATE_SUFFIXES
        .into_iter()
        .map(move |d| Ipv4Addr::new(a, b, c, d))
        .filter(move |ip| *ip != local)
}

/// `true` if a raw HTTP response came from a backend.
pub fn looks_like_backend(response: &str) -> bool {
    response.contains("200 OK") || response.contains("\"status\":\"OK\"")
}

/// Probe each candidate and return the first responder.
pub fn discover<B: BackendHttp + ?Sized>(
    http: &mut B,
    local: Ipv4Addr,
    port: u16,
) -> Option<Ipv4Addr> {
    let [a, b, c, _] = local.octets();
    info!("WS: scanning for backend on {}.{}.{}.*:{}", a, b, c, port);
    for ip in candidates(local) {
        if http.probe(ip, port, PROBE_TIMEOUT_MS) {
            info!("WS: backend found at {}:{}", ip, port);
            return Some(ip);
        }
        debug!("WS: no response from {}:{}", ip, port);
    }
    warn!("WS: no backend detected, WebSocket unavailable");
    None
}

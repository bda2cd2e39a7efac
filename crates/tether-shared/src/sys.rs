//! Host lookups used at startup: directories, hostname, LAN address, ports.

use std::net::{Ipv4Addr, TcpListener, UdpSocket};
use std::path::Path;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    Available,
    InUse,
    InvalidRange,
}

/// Create `path` (and parents) unless it already exists.
///
/// Returns `false` when the path exists but is not a directory, or when it
/// cannot be created.
pub fn ensure_directory(path: &Path) -> bool {
    if path.exists() {
        return path.is_dir();
    }
    match std::fs::create_dir_all(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to create directory");
            false
        }
    }
}

/// Best-effort host name: `$HOSTNAME`, then `/etc/hostname`, then
/// `$COMPUTERNAME` on Windows.
pub fn local_hostname() -> Option<String> {
    let candidates = [
        std::env::var("HOSTNAME").ok(),
        std::fs::read_to_string("/etc/hostname").ok(),
        std::env::var("COMPUTERNAME").ok(),
    ];

    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// The IPv4 address this host would use to reach the wider network.
///
/// A UDP socket is "connected" to a public address (no packet is sent) so the
/// OS picks the outbound interface. Falls back to loopback.
pub fn local_ipv4() -> String {
    let detected = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .ok()
        .map(|addr| addr.ip())
        .filter(|ip| ip.is_ipv4() && !ip.is_loopback() && !ip.is_unspecified());

    match detected {
        Some(ip) => ip.to_string(),
        None => {
            debug!("No routable IPv4 interface found, using loopback");
            Ipv4Addr::LOCALHOST.to_string()
        }
    }
}

/// Check whether `port` could be listened on right now.
pub fn probe_port(port: u32) -> PortStatus {
    if !(1..=65535).contains(&port) {
        return PortStatus::InvalidRange;
    }
    match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port as u16)) {
        Ok(_) => PortStatus::Available,
        Err(_) => PortStatus::InUse,
    }
}

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

/// Well-known IPv6 destination used only to probe egress, never contacted
/// for DNS. Mirrors the Python implementation's `ipv6.google.com` probe.
const IPV6_PROBE_TARGET: (Ipv6Addr, u16) = (Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888), 53);

/// Flags and knobs that must be fixed before a trace begins and are then
/// inherited by every [`crate::model::Zone`] created during that trace.
#[derive(Debug, Clone)]
pub struct TracerConfig {
    pub trace_missing_glue: bool,
    pub even_trace_m_gtld_servers_net: bool,
    pub query_timeout: Duration,
    pub ipv6_available: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        TracerConfig {
            trace_missing_glue: false,
            even_trace_m_gtld_servers_net: false,
            query_timeout: Duration::from_secs(2),
            ipv6_available: false,
        }
    }
}

impl TracerConfig {
    /// Probes for a working IPv6 egress once, the way the original
    /// implementation does at import time. Failure to connect leaves the
    /// tracer in IPv4-only mode for glue-IP selection.
    pub async fn detect_ipv6(mut self) -> Self {
        self.ipv6_available = probe_ipv6().await;
        if !self.ipv6_available {
            debug!("no working IPv6 egress detected, tracing in IPv4-only mode");
        }
        self
    }
}

async fn probe_ipv6() -> bool {
    let socket = match UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0)).await {
        Ok(s) => s,
        Err(_) => return false,
    };
    let target = SocketAddr::new(IpAddr::V6(IPV6_PROBE_TARGET.0), IPV6_PROBE_TARGET.1);
    socket.connect(target).await.is_ok()
}

use crate::discovery::DiscoveredDevice;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// WLED mDNS service type (trailing dot required by mdns-sd).
const WLED_SERVICE_TYPE: &str = "_wled._tcp.local.";

/// Configuration for the multicast listener.
#[derive(Debug, Clone)]
pub struct MdnsConfig {
    /// How long to collect announcements before giving up.
    pub browse_window: Duration,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            browse_window: Duration::from_secs(3),
        }
    }
}

/// Passively collect WLED announcements for the configured window.
///
/// Never contacts any address. A missing mDNS stack or a port conflict
/// with another responder is a soft failure: the listener logs it and
/// returns an empty list so discovery can continue with probing.
pub async fn listen(config: &MdnsConfig) -> Vec<DiscoveredDevice> {
    let daemon = match ServiceDaemon::new() {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::warn!("mDNS unavailable: {}", e);
            return Vec::new();
        }
    };

    let receiver = match daemon.browse(WLED_SERVICE_TYPE) {
        Ok(receiver) => receiver,
        Err(e) => {
            tracing::warn!("mDNS browse failed: {}", e);
            let _ = daemon.shutdown();
            return Vec::new();
        }
    };

    tracing::info!(
        "listening for WLED announcements for {:?}",
        config.browse_window
    );

    let mut discovered: HashMap<String, DiscoveredDevice> = HashMap::new();
    let deadline = Instant::now() + config.browse_window;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, receiver.recv_async()).await {
            Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                let Some(addr) = info
                    .get_addresses()
                    .iter()
                    .find_map(|a| match a {
                        IpAddr::V4(v4) => Some(v4.to_string()),
                        IpAddr::V6(_) => None,
                    })
                else {
                    continue;
                };

                let port = match info.get_port() {
                    0 => 80,
                    p => p,
                };
                let name = display_name(info.get_fullname());
                let mac = info
                    .get_property_val_str("mac")
                    .filter(|m| !m.is_empty())
                    .map(str::to_string);

                tracing::info!("mDNS announcement: {} at {}:{}", name, addr, port);
                discovered.insert(
                    addr.clone(),
                    DiscoveredDevice {
                        host: addr,
                        port,
                        name,
                        mac,
                    },
                );
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::debug!("mDNS receiver closed: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    if let Err(e) = daemon.stop_browse(WLED_SERVICE_TYPE) {
        tracing::debug!("failed to stop mDNS browse: {}", e);
    }
    let _ = daemon.shutdown();

    let devices: Vec<_> = discovered.into_values().collect();
    tracing::info!("mDNS window closed: {} device(s)", devices.len());
    devices
}

/// Strip the service-type suffix and domain from an instance name.
fn display_name(fullname: &str) -> String {
    let name = fullname
        .strip_suffix(WLED_SERVICE_TYPE)
        .map(|n| n.trim_end_matches('.'))
        .unwrap_or(fullname);
    let name = name.strip_suffix(".local").unwrap_or(name);
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_service_suffix() {
        assert_eq!(display_name("porch._wled._tcp.local."), "porch");
        assert_eq!(display_name("wled-AABBCC._wled._tcp.local."), "wled-AABBCC");
    }

    #[test]
    fn display_name_strips_bare_domain() {
        assert_eq!(display_name("porch.local"), "porch");
    }

    #[test]
    fn display_name_passes_through_unknown_shapes() {
        assert_eq!(display_name("porch"), "porch");
    }
}

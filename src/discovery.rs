use crate::client::WledClient;
use crate::error::Result;
use crate::mdns::{self, MdnsConfig};
use crate::probe::{ProbeConfig, SubnetProber};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Floor for the probe phase when the mDNS window ate most of the budget.
const MIN_PROBE_BUDGET: Duration = Duration::from_secs(1);

/// One device found on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// IPv4 address of the device.
    pub host: String,
    /// HTTP port, 80 unless the announcement said otherwise.
    pub port: u16,
    /// Display name from the announcement or the device's own info.
    pub name: String,
    /// Hardware address when the device reported one.
    pub mac: Option<String>,
}

impl DiscoveredDevice {
    /// Construct a client for this device.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use wled_control::Discovery;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let devices = Discovery::new().run().await;
    ///     if let Some(device) = devices.first() {
    ///         let client = device.connect()?;
    ///         client.fetch_all().await?;
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn connect(&self) -> Result<WledClient> {
        WledClient::with_endpoint(&self.host, self.port, Duration::from_secs(5))
    }
}

/// Configuration for a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Overall wall-clock budget; the mDNS window comes out of this and
    /// the probe phase gets what is left (floored at one second).
    pub timeout: Duration,
    pub mdns: MdnsConfig,
    pub probe: ProbeConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            mdns: MdnsConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

/// Two-phase device discovery
///
/// Phase one listens for multicast announcements — fast and precise, but
/// only hears devices that announce. Phase two brute-force probes the
/// local /24 with the remaining budget, skipping addresses the first
/// phase already found. Results are deduplicated by address and returned
/// in discovery order. Discovery never fails outright: a network with no
/// devices, or no usable mDNS stack, yields a shorter (possibly empty)
/// list, not an error.
///
/// # Example
///
/// ```no_run
/// use wled_control::{Discovery, DiscoveryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let devices = Discovery::with_config(DiscoveryConfig::default()).run().await;
///     for device in devices {
///         println!("{} at {}:{}", device.name, device.host, device.port);
///     }
/// }
/// ```
pub struct Discovery {
    config: DiscoveryConfig,
}

impl Discovery {
    /// Discovery with the default budgets.
    pub fn new() -> Self {
        Self::with_config(DiscoveryConfig::default())
    }

    pub fn with_config(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Run both phases and return the merged device list.
    pub async fn run(&self) -> Vec<DiscoveredDevice> {
        let started = Instant::now();
        let mut devices: Vec<DiscoveredDevice> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        // Phase one: passive multicast listening.
        let announced = mdns::listen(&self.config.mdns).await;
        let new = merge(&mut devices, &mut seen, announced);
        tracing::info!("mDNS phase: {} new device(s)", new);

        // Phase two: probe whatever is left of the budget, skipping
        // addresses phase one already confirmed.
        let remaining = self
            .config
            .timeout
            .saturating_sub(started.elapsed())
            .max(MIN_PROBE_BUDGET);
        let probe_config = ProbeConfig {
            timeout: remaining,
            ..self.config.probe.clone()
        };

        let exclude: HashSet<Ipv4Addr> = seen
            .iter()
            .filter_map(|host| host.parse().ok())
            .collect();

        match SubnetProber::new(probe_config) {
            Ok(prober) => match prober.probe_local_subnet(&exclude).await {
                Ok(probed) => {
                    let new = merge(&mut devices, &mut seen, probed);
                    tracing::info!("probe phase: {} new device(s)", new);
                }
                Err(e) => {
                    tracing::warn!("probe phase skipped: {}", e);
                }
            },
            Err(e) => {
                tracing::warn!("probe phase unavailable: {}", e);
            }
        }

        tracing::info!(
            "discovery finished in {:?}: {} device(s)",
            started.elapsed(),
            devices.len()
        );
        devices
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Append devices not seen before, keyed by address. Returns how many
/// were genuinely new.
fn merge(
    devices: &mut Vec<DiscoveredDevice>,
    seen: &mut HashSet<String>,
    incoming: Vec<DiscoveredDevice>,
) -> usize {
    let mut added = 0;
    for device in incoming {
        if seen.insert(device.host.clone()) {
            devices.push(device);
            added += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(host: &str, name: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            host: host.to_string(),
            port: 80,
            name: name.to_string(),
            mac: None,
        }
    }

    #[test]
    fn merge_deduplicates_by_address() {
        let mut devices = Vec::new();
        let mut seen = HashSet::new();

        let added = merge(
            &mut devices,
            &mut seen,
            vec![device("192.168.1.5", "porch")],
        );
        assert_eq!(added, 1);

        // Same address found again by the probe phase, plus one new one.
        let added = merge(
            &mut devices,
            &mut seen,
            vec![
                device("192.168.1.5", "porch"),
                device("192.168.1.9", "bench"),
            ],
        );
        assert_eq!(added, 1);
        assert_eq!(devices.len(), 2);
    }

    #[test]
    fn merge_preserves_discovery_order() {
        let mut devices = Vec::new();
        let mut seen = HashSet::new();
        merge(&mut devices, &mut seen, vec![device("10.0.0.2", "a")]);
        merge(&mut devices, &mut seen, vec![device("10.0.0.1", "b")]);
        let hosts: Vec<_> = devices.iter().map(|d| d.host.as_str()).collect();
        assert_eq!(hosts, vec!["10.0.0.2", "10.0.0.1"]);
    }
}

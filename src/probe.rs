use crate::discovery::DiscoveredDevice;
use crate::error::{Result, WledError};
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Minimum budget left over after the first pass for a retry pass to be
/// worth starting.
const RETRY_MIN_BUDGET: Duration = Duration::from_secs(1);

/// Share of the probe budget spent on the first pass; the rest is kept
/// for retrying transient failures.
const PRIMARY_PASS_SHARE: f32 = 0.7;

/// Configuration for subnet probing.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Overall wall-clock budget for both passes.
    pub timeout: Duration,
    /// Worker pool width for the first pass.
    pub concurrency: usize,
    /// Smaller pool width for the retry pass.
    pub retry_concurrency: usize,
    /// Port the identification probe targets.
    pub port: u16,
    /// Per-request timeout of a single probe.
    pub probe_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            concurrency: 32,
            retry_concurrency: 8,
            port: 80,
            probe_timeout: Duration::from_secs(1),
        }
    }
}

/// Brute-force identifier of WLED devices on the local /24 subnet
///
/// Issues short-timeout GETs against `/json/info` on every candidate
/// host with a bounded worker pool. An address counts as a device only
/// when the decoded body carries both `ver` and `name`; everything else
/// is a silent negative. Negatives from the first pass get one retry
/// with a smaller pool if enough budget remains, which catches hosts
/// that were momentarily too busy to accept a connection. The retry
/// deadline is a hard ceiling, not advisory.
pub struct SubnetProber {
    config: ProbeConfig,
    http: reqwest::Client,
}

impl SubnetProber {
    pub fn new(config: ProbeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .map_err(|e| WledError::Unknown(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Probe the local /24, skipping addresses in `exclude`.
    ///
    /// Fails only when the local IPv4 address cannot be determined;
    /// unresponsive subnets simply produce an empty list.
    pub async fn probe_local_subnet(
        &self,
        exclude: &HashSet<Ipv4Addr>,
    ) -> Result<Vec<DiscoveredDevice>> {
        let local = match local_ip_address::local_ip() {
            Ok(std::net::IpAddr::V4(v4)) => v4,
            Ok(other) => return Err(WledError::NoLocalAddress(other.to_string())),
            Err(e) => return Err(WledError::NoLocalAddress(e.to_string())),
        };

        let candidates = subnet_candidates(local, exclude);
        tracing::info!(
            "probing {}.0/24 ({} candidate(s))",
            subnet_prefix(local),
            candidates.len()
        );
        Ok(self.probe_addresses(candidates).await)
    }

    /// Run the two-pass probe over an explicit candidate list.
    pub async fn probe_addresses(&self, addresses: Vec<Ipv4Addr>) -> Vec<DiscoveredDevice> {
        let started = Instant::now();

        let primary_budget = self.config.timeout.mul_f32(PRIMARY_PASS_SHARE);
        let (mut found, missed) = self
            .run_pass(addresses, self.config.concurrency, primary_budget)
            .await;

        let remaining = self.config.timeout.saturating_sub(started.elapsed());
        if !missed.is_empty() && remaining > RETRY_MIN_BUDGET {
            tracing::debug!(
                "retrying {} address(es) with {:?} budget left",
                missed.len(),
                remaining
            );
            let (retried, _) = self
                .run_pass(missed, self.config.retry_concurrency, remaining)
                .await;
            for device in retried {
                if !found.iter().any(|d| d.host == device.host) {
                    found.push(device);
                }
            }
        }

        tracing::info!("probe finished: {} device(s)", found.len());
        found
    }

    /// One bounded-parallelism pass over `addresses` within `budget`.
    ///
    /// Returns the confirmed devices and the addresses that did not
    /// confirm — negatives plus anything still in flight when the budget
    /// ran out (those results are discarded, not awaited).
    async fn run_pass(
        &self,
        addresses: Vec<Ipv4Addr>,
        concurrency: usize,
        budget: Duration,
    ) -> (Vec<DiscoveredDevice>, Vec<Ipv4Addr>) {
        let deadline = Instant::now() + budget;
        let mut confirmed: Vec<DiscoveredDevice> = Vec::new();
        let mut confirmed_hosts: HashSet<Ipv4Addr> = HashSet::new();

        let mut results = stream::iter(addresses.clone())
            .map(|addr| async move { (addr, self.probe_one(addr).await) })
            .buffer_unordered(concurrency.max(1));

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, results.next()).await {
                Ok(Some((addr, result))) => {
                    if let Some(device) = result {
                        if confirmed_hosts.insert(addr) {
                            confirmed.push(device);
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
        drop(results);

        // Negatives and anything still in flight at the deadline; a
        // confirmed address is never re-probed.
        let missed = addresses
            .into_iter()
            .filter(|addr| !confirmed_hosts.contains(addr))
            .collect();

        (confirmed, missed)
    }

    /// Identification probe for one address; any failure is a negative.
    async fn probe_one(&self, addr: Ipv4Addr) -> Option<DiscoveredDevice> {
        let url = format!("http://{}:{}/json/info", addr, self.config.port);
        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.json::<Value>().await.ok()?;
        identify(addr, self.config.port, &body)
    }
}

/// Positive-match predicate: the body must carry both a version and a name.
fn identify(addr: Ipv4Addr, port: u16, body: &Value) -> Option<DiscoveredDevice> {
    let version = body.get("ver").and_then(Value::as_str)?;
    let name = body.get("name").and_then(Value::as_str)?;
    tracing::info!("discovered WLED {} ({}) at {}", name, version, addr);

    Some(DiscoveredDevice {
        host: addr.to_string(),
        port,
        name: name.to_string(),
        mac: body
            .get("mac")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string),
    })
}

/// All 254 host addresses of `local`'s /24, minus the exclusion set.
pub fn subnet_candidates(local: Ipv4Addr, exclude: &HashSet<Ipv4Addr>) -> Vec<Ipv4Addr> {
    let [a, b, c, _] = local.octets();
    (1..=254u8)
        .map(|d| Ipv4Addr::new(a, b, c, d))
        .filter(|addr| !exclude.contains(addr))
        .collect()
}

fn subnet_prefix(local: Ipv4Addr) -> String {
    let [a, b, c, _] = local.octets();
    format!("{}.{}.{}", a, b, c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidates_cover_the_host_range() {
        let local = Ipv4Addr::new(192, 168, 1, 42);
        let candidates = subnet_candidates(local, &HashSet::new());
        assert_eq!(candidates.len(), 254);
        assert_eq!(candidates[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(candidates[253], Ipv4Addr::new(192, 168, 1, 254));
        assert!(!candidates.contains(&Ipv4Addr::new(192, 168, 1, 0)));
        assert!(!candidates.contains(&Ipv4Addr::new(192, 168, 1, 255)));
    }

    #[test]
    fn candidates_respect_exclusions() {
        let local = Ipv4Addr::new(10, 0, 0, 5);
        let mut exclude = HashSet::new();
        exclude.insert(Ipv4Addr::new(10, 0, 0, 7));
        exclude.insert(Ipv4Addr::new(10, 0, 0, 200));
        let candidates = subnet_candidates(local, &exclude);
        assert_eq!(candidates.len(), 252);
        assert!(!candidates.contains(&Ipv4Addr::new(10, 0, 0, 7)));
        assert!(!candidates.contains(&Ipv4Addr::new(10, 0, 0, 200)));
    }

    #[test]
    fn identify_requires_version_and_name() {
        let addr = Ipv4Addr::new(192, 168, 1, 9);
        assert!(identify(addr, 80, &json!({"ver": "0.14.0", "name": "Porch"})).is_some());
        assert!(identify(addr, 80, &json!({"ver": "0.14.0"})).is_none());
        assert!(identify(addr, 80, &json!({"name": "Porch"})).is_none());
        assert!(identify(addr, 80, &json!("not an object")).is_none());
    }

    #[test]
    fn identify_keeps_mac_when_present() {
        let addr = Ipv4Addr::new(192, 168, 1, 9);
        let device = identify(
            addr,
            80,
            &json!({"ver": "0.14.0", "name": "Porch", "mac": "aabbccddeeff"}),
        )
        .unwrap();
        assert_eq!(device.mac.as_deref(), Some("aabbccddeeff"));

        let device = identify(addr, 80, &json!({"ver": "1", "name": "x", "mac": ""})).unwrap();
        assert!(device.mac.is_none());
    }
}

mod common;

use common::{serve_at, serve_on};
use serde_json::json;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;
use wled_control::{subnet_candidates, ProbeConfig, SubnetProber};

fn info_body(name: &str) -> String {
    json!({"ver": "0.14.0", "name": name, "mac": "aabbccddeeff"}).to_string()
}

fn prober(port: u16) -> SubnetProber {
    SubnetProber::new(ProbeConfig {
        timeout: Duration::from_secs(8),
        concurrency: 32,
        retry_concurrency: 8,
        port,
        probe_timeout: Duration::from_millis(500),
    })
    .unwrap()
}

#[tokio::test]
async fn one_responsive_address_yields_one_device() {
    let stub = serve_on("127.0.0.1", vec![(200, info_body("porch"))]).await;

    // A handful of loopback neighbors that refuse the stub's port.
    let candidates: Vec<Ipv4Addr> = (1..=6).map(|d| Ipv4Addr::new(127, 0, 0, d)).collect();
    let devices = prober(stub.addr.port()).probe_addresses(candidates).await;

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].host, "127.0.0.1");
    assert_eq!(devices[0].name, "porch");
    assert_eq!(devices[0].mac.as_deref(), Some("aabbccddeeff"));
}

#[tokio::test]
async fn excluded_addresses_are_never_contacted() {
    let target = serve_on("127.0.0.1", vec![(200, info_body("kept"))]).await;
    // Same port as the target, on the address the exclusion set covers.
    let excluded = serve_at(
        "127.0.0.2",
        target.addr.port(),
        vec![(200, info_body("excluded")), (200, info_body("excluded"))],
    )
    .await;

    let mut exclude = HashSet::new();
    exclude.insert(Ipv4Addr::new(127, 0, 0, 2));
    let candidates: Vec<Ipv4Addr> = subnet_candidates(Ipv4Addr::new(127, 0, 0, 1), &exclude)
        .into_iter()
        // Keep the scan small; the full-range shape is covered by unit tests.
        .filter(|a| a.octets()[3] <= 8)
        .collect();
    assert!(!candidates.contains(&Ipv4Addr::new(127, 0, 0, 2)));

    let devices = prober(target.addr.port()).probe_addresses(candidates).await;

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "kept");
    assert_eq!(excluded.hits(), 0);
}

#[tokio::test]
async fn non_wled_responder_is_a_silent_negative() {
    // Responds fine but lacks the identifying fields.
    let stub = serve_on(
        "127.0.0.1",
        vec![
            (200, json!({"model": "toaster"}).to_string()),
            (200, json!({"model": "toaster"}).to_string()),
        ],
    )
    .await;

    let devices = prober(stub.addr.port())
        .probe_addresses(vec![Ipv4Addr::new(127, 0, 0, 1)])
        .await;
    assert!(devices.is_empty());
}

#[tokio::test]
async fn retry_pass_catches_an_initially_refusing_address() {
    // The listener backlog serves only the second connection attempt:
    // the first response slot returns a 503, the second identifies.
    let stub = serve_on(
        "127.0.0.1",
        vec![
            (503, "busy".to_string()),
            (200, info_body("slow-starter")),
        ],
    )
    .await;

    let devices = prober(stub.addr.port())
        .probe_addresses(vec![Ipv4Addr::new(127, 0, 0, 1)])
        .await;

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "slow-starter");
    assert_eq!(stub.hits(), 2);
}

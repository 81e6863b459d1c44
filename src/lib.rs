//! Rust library for discovering and controlling WLED addressable-LED controllers
//!
//! This library talks to WLED devices over their JSON HTTP API. It supports:
//!
//! - Two-phase network discovery (mDNS announcements, then a concurrent
//!   subnet probe with retry)
//! - Per-device state and info polling with cached snapshots
//! - Power, brightness, effect, palette, color, and preset control,
//!   globally and per segment
//! - Nightlight, UDP sync, playlist, and live-override commands
//! - Preset name maps and effect capability metadata
//! - Online/offline tracking with classified failure causes
//!
//! # Quick Start
//!
//! ```no_run
//! use wled_control::Discovery;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Find devices on the local subnet.
//!     let devices = Discovery::new().run().await;
//!
//!     if let Some(device) = devices.first() {
//!         println!("Found device: {} at {}", device.name, device.host);
//!
//!         let client = device.connect()?;
//!         client.fetch_all().await?;
//!
//!         client.set_power(true).await?;
//!         client.set_brightness(128).await?;
//!         client.set_color(255, 80, 0, 0).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Direct Connection
//!
//! If you know the IP address of a device, you can skip discovery:
//!
//! ```no_run
//! use wled_control::WledClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WledClient::new("192.168.1.100")?;
//!     let state = client.fetch_state().await?;
//!     println!("power={} brightness={}", state.on, state.brightness);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Discovery**: mDNS listener plus subnet prober, merged and deduplicated
//! - **Client**: per-device request/response handling and cached snapshots
//! - **Command**: enum-keyed command table behind the `DeviceController` trait
//! - **Protocol**: JSON wire structures and tolerant decoding
//!
//! Every client operation returns a classified error instead of panicking;
//! cache reads (`online()`, `last_state()`, ...) never touch the network.

mod client;
mod command;
mod discovery;
mod error;
mod mdns;
mod probe;
mod protocol;

// Public exports
pub use client::{WledClient, DEFAULT_PORT};
pub use command::{Command, DeviceController};
pub use discovery::{DiscoveredDevice, Discovery, DiscoveryConfig};
pub use error::{Result, WledError};
pub use mdns::MdnsConfig;
pub use probe::{subnet_candidates, ProbeConfig, SubnetProber};
pub use protocol::{
    DeviceInfo, DeviceState, EffectMetadata, Nightlight, NightlightUpdate, Segment,
    SegmentUpdate, StateUpdate, SyncUpdate, UdpSync,
};

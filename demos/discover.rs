//! Discover WLED devices on the local network and print what they report.
//!
//! Run with: `cargo run --example discover`

use wled_control::Discovery;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Discovering WLED devices...");
    let devices = Discovery::new().run().await;

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    for device in &devices {
        println!("\n{} at {}:{}", device.name, device.host, device.port);
        if let Some(mac) = &device.mac {
            println!("  mac: {}", mac);
        }

        let client = device.connect()?;
        if client.fetch_all().await.is_ok() {
            if let Some(info) = client.last_info() {
                println!("  firmware: {} ({} LEDs)", info.version, info.led_count);
            }
            if let Some(state) = client.last_state() {
                println!(
                    "  power: {}  brightness: {}  color: {:?}",
                    state.on,
                    state.brightness,
                    state.primary_color()
                );
            }
            let presets = client.fetch_presets().await;
            if !presets.is_empty() {
                println!("  presets:");
                for (id, name) in presets {
                    println!("    {:3}  {}", id, name);
                }
            }
        } else if let Some(err) = client.last_error() {
            println!("  unreachable: {}", err);
        }
    }

    Ok(())
}

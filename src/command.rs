use crate::client::{WledClient, BRIGHTNESS_STEP};
use crate::error::Result;
use async_trait::async_trait;

/// A control command addressed to one device.
///
/// This is the host-facing command table: every variant maps onto one
/// partial state update, so a host runtime can drive devices from a
/// single dispatch point without knowing the wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Turn the device on.
    On,
    /// Turn the device off.
    Off,
    /// Turn on instantly, skipping the transition.
    FastOn,
    /// Turn off instantly, skipping the transition.
    FastOff,
    /// Raise brightness by one step.
    Brighten,
    /// Lower brightness by one step.
    Dim,
    /// Set global brightness (clamped to 0-255).
    SetBrightness(i32),
    /// Select an effect on the main segment.
    SetEffect {
        effect: u32,
        speed: Option<i32>,
        intensity: Option<i32>,
    },
    /// Set the effect speed on the main segment (clamped to 0-255).
    SetSpeed(i32),
    /// Set the effect intensity on the main segment (clamped to 0-255).
    SetIntensity(i32),
    /// Select a palette on the main segment.
    SetPalette(u32),
    /// Load a preset.
    LoadPreset(i32),
    /// Save the current state into a preset slot.
    SavePreset(u32),
    /// Set the primary color on the main segment.
    SetColor { r: i32, g: i32, b: i32, w: i32 },
    /// Set the crossfade duration in 100 ms units.
    SetTransition(u32),
    /// Enable or disable the live override.
    SetLiveOverride(bool),
    /// Start the nightlight timer for the given number of minutes;
    /// zero cancels it.
    NightlightStart(u32),
    /// Cancel the nightlight timer.
    NightlightStop,
    /// Enable or disable UDP sync sending.
    SyncSend(bool),
    /// Enable or disable UDP sync receiving.
    SyncReceive(bool),
    /// Start a playlist.
    PlaylistStart(i32),
    /// Stop the running playlist.
    PlaylistStop,
}

/// Capability interface for anything that can execute device commands.
///
/// Decoupled from any host lifecycle: the host constructs clients from
/// discovered endpoints and feeds commands through this seam.
#[async_trait]
pub trait DeviceController {
    /// Execute one command against the device.
    async fn execute(&self, command: Command) -> Result<()>;
}

#[async_trait]
impl DeviceController for WledClient {
    async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::On => self.set_power(true).await?,
            Command::Off => self.set_power(false).await?,
            Command::FastOn => self.set_power_instant(true).await?,
            Command::FastOff => self.set_power_instant(false).await?,
            Command::Brighten => {
                let current = self.last_state().map(|s| s.brightness).unwrap_or(0);
                self.set_brightness(i32::from(current) + i32::from(BRIGHTNESS_STEP))
                    .await?
            }
            Command::Dim => {
                let current = self.last_state().map(|s| s.brightness).unwrap_or(0);
                self.set_brightness(i32::from(current) - i32::from(BRIGHTNESS_STEP))
                    .await?
            }
            Command::SetBrightness(brightness) => self.set_brightness(brightness).await?,
            Command::SetEffect {
                effect,
                speed,
                intensity,
            } => self.set_effect(effect, speed, intensity).await?,
            Command::SetSpeed(speed) => self.set_speed(speed).await?,
            Command::SetIntensity(intensity) => self.set_intensity(intensity).await?,
            Command::SetPalette(palette) => self.set_palette(palette).await?,
            Command::LoadPreset(preset) => self.set_preset(preset).await?,
            Command::SavePreset(slot) => self.save_preset(slot).await?,
            Command::SetColor { r, g, b, w } => self.set_color(r, g, b, w).await?,
            Command::SetTransition(transition) => self.set_transition(transition).await?,
            Command::SetLiveOverride(live) => self.set_live_override(live).await?,
            Command::NightlightStart(0) | Command::NightlightStop => {
                self.nightlight_stop().await?
            }
            Command::NightlightStart(duration) => self.nightlight_start(duration).await?,
            Command::SyncSend(send) => self.set_sync_send(send).await?,
            Command::SyncReceive(receive) => self.set_sync_receive(receive).await?,
            Command::PlaylistStart(playlist) => self.start_playlist(playlist).await?,
            Command::PlaylistStop => self.stop_playlist().await?,
        };
        Ok(())
    }
}

use crate::error::{Result, WledError};
use crate::protocol::{
    DeviceInfo, DeviceState, EffectMetadata, NightlightUpdate, SegmentUpdate, StateUpdate,
    SyncUpdate,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default HTTP port of a WLED device.
pub const DEFAULT_PORT: u16 = 80;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Step used by the relative brighten/dim commands, roughly 10% of full scale.
pub(crate) const BRIGHTNESS_STEP: u8 = 25;

/// Cached device data, replaced wholesale on successful fetches.
#[derive(Default)]
struct Cache {
    state: Option<DeviceState>,
    info: Option<DeviceInfo>,
    effects: Vec<String>,
    palettes: Vec<String>,
    presets: BTreeMap<u32, String>,
    online: bool,
    last_error: Option<String>,
}

/// Client for one WLED device's JSON API
///
/// The client owns the device endpoint and a snapshot of the last data the
/// device reported. Every fetch replaces the affected cache entries in
/// full; a failed request never touches them, it only flips the device to
/// offline and records the classified cause. The client never retries on
/// its own — polling and retry policy belong to the caller.
///
/// # Example
///
/// ```no_run
/// use wled_control::WledClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = WledClient::new("192.168.1.100")?;
///     client.fetch_all().await?;
///     println!("power: {:?}", client.last_state().map(|s| s.on));
///     client.set_brightness(128).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct WledClient {
    host: String,
    port: u16,
    http: reqwest::Client,
    cache: Arc<Mutex<Cache>>,
}

impl WledClient {
    /// Create a client for a device on the default port 80.
    pub fn new(host: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(host, DEFAULT_PORT, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit port and request timeout.
    pub fn with_endpoint(
        host: impl Into<String>,
        port: u16,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WledError::Unknown(e.to_string()))?;

        Ok(Self {
            host: host.into(),
            port,
            http,
            cache: Arc::new(Mutex::new(Cache::default())),
        })
    }

    /// Host address of the device.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// HTTP port of the device.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }

    fn mark_online(&self) {
        let mut cache = self.cache.lock().unwrap();
        cache.online = true;
        cache.last_error = None;
    }

    fn mark_offline(&self, err: &WledError) {
        let mut cache = self.cache.lock().unwrap();
        cache.online = false;
        cache.last_error = Some(err.to_string());
    }

    /// GET a JSON document, updating connectivity on the way.
    async fn get_json(&self, path: &str) -> Result<Value> {
        let result = self.get_json_inner(path).await;
        match &result {
            Ok(_) => self.mark_online(),
            Err(e) => {
                tracing::warn!("WLED {}: GET {} failed: {}", self.host, path, e);
                self.mark_offline(e);
            }
        }
        result
    }

    async fn get_json_inner(&self, path: &str) -> Result<Value> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WledError::UnexpectedStatus(status.as_u16()));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| WledError::Protocol(e.to_string()))
    }

    /// POST a JSON document and decode the JSON reply.
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let result = self.post_json_inner(path, body).await;
        match &result {
            Ok(_) => self.mark_online(),
            Err(e) => {
                tracing::warn!("WLED {}: POST {} failed: {}", self.host, path, e);
                self.mark_offline(e);
            }
        }
        result
    }

    async fn post_json_inner(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WledError::UnexpectedStatus(status.as_u16()));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| WledError::Protocol(e.to_string()))
    }

    // ========== Fetch operations ==========

    /// Fetch the consolidated `/json` document and replace the cached
    /// state, info, effect names, and palette names.
    pub async fn fetch_all(&self) -> Result<()> {
        let data = self.get_json("/json").await?;

        let state = data.get("state").map(DeviceState::from_json);
        let info = data.get("info").map(DeviceInfo::from_json);
        let effects = filter_names(data.get("effects"));
        let palettes = filter_names(data.get("palettes"));

        let mut cache = self.cache.lock().unwrap();
        if let Some(state) = state {
            cache.state = Some(state);
        }
        if let Some(info) = info {
            cache.info = Some(info);
        }
        cache.effects = effects;
        cache.palettes = palettes;
        Ok(())
    }

    /// Fetch `/json/state` and replace the cached state.
    pub async fn fetch_state(&self) -> Result<DeviceState> {
        let data = self.get_json("/json/state").await?;
        let state = DeviceState::from_json(&data);
        self.cache.lock().unwrap().state = Some(state.clone());
        Ok(state)
    }

    /// Fetch `/json/info` and replace the cached info.
    pub async fn fetch_info(&self) -> Result<DeviceInfo> {
        let data = self.get_json("/json/info").await?;
        let info = DeviceInfo::from_json(&data);
        self.cache.lock().unwrap().info = Some(info.clone());
        Ok(info)
    }

    /// Fetch `/presets.json` and return the id-to-name map.
    ///
    /// Entries without a parseable integer id or without a name are
    /// skipped. An unreachable device yields an empty map, not an error.
    pub async fn fetch_presets(&self) -> BTreeMap<u32, String> {
        let data = match self.get_json("/presets.json").await {
            Ok(data) => data,
            Err(_) => return BTreeMap::new(),
        };

        let mut presets = BTreeMap::new();
        if let Some(map) = data.as_object() {
            for (key, value) in map {
                let Ok(id) = key.parse::<u32>() else { continue };
                if let Some(name) = value.get("n").and_then(Value::as_str) {
                    presets.insert(id, name.to_string());
                }
            }
        }

        tracing::debug!("WLED {}: {} preset(s)", self.host, presets.len());
        self.cache.lock().unwrap().presets = presets.clone();
        presets
    }

    /// Fetch `/json/effects` and `/json/fxdata` and zip them into a
    /// per-id metadata map.
    ///
    /// Both requests must succeed, otherwise the map is empty. Entries
    /// whose name is empty or the `-` placeholder are skipped; ids stay
    /// aligned with the device's effect indices.
    pub async fn fetch_effect_metadata(&self) -> BTreeMap<u32, EffectMetadata> {
        let names = match self.get_json("/json/effects").await {
            Ok(data) => data,
            Err(_) => return BTreeMap::new(),
        };
        let fxdata = match self.get_json("/json/fxdata").await {
            Ok(data) => data,
            Err(_) => return BTreeMap::new(),
        };

        let names = names.as_array().cloned().unwrap_or_default();
        let fxdata = fxdata.as_array().cloned().unwrap_or_default();

        let mut metadata = BTreeMap::new();
        for (id, name) in names.iter().enumerate() {
            let name = name.as_str().unwrap_or("");
            if name.is_empty() || name == "-" {
                continue;
            }
            let data = fxdata
                .get(id)
                .and_then(Value::as_str)
                .unwrap_or_default();
            metadata.insert(id as u32, EffectMetadata::parse(name, data));
        }

        metadata
    }

    // ========== State updates ==========

    /// POST a partial state document to the device.
    ///
    /// The echoed response body is decoded and replaces the cached state;
    /// the device, not the request, is authoritative for what was applied.
    pub async fn set_state(&self, update: StateUpdate) -> Result<DeviceState> {
        let mut body = serde_json::to_value(&update)?;
        if let Some(obj) = body.as_object_mut() {
            // Ask for a verbose reply so the device echoes the full state.
            obj.insert("v".to_string(), Value::Bool(true));
        }

        let data = self.post_json("/json/state", &body).await?;
        let state = DeviceState::from_json(&data);
        self.cache.lock().unwrap().state = Some(state.clone());
        Ok(state)
    }

    /// Apply a mutation to a single segment.
    pub async fn set_segment(&self, segment: SegmentUpdate) -> Result<DeviceState> {
        self.set_state(StateUpdate::new().segment(segment)).await
    }

    // ========== Convenience commands ==========
    // All of these go through set_state; none performs its own request.

    /// Turn the device on or off.
    pub async fn set_power(&self, on: bool) -> Result<DeviceState> {
        tracing::info!("WLED {}: power {}", self.host, on);
        self.set_state(StateUpdate::new().on(on)).await
    }

    /// Turn the device on or off with no transition.
    pub async fn set_power_instant(&self, on: bool) -> Result<DeviceState> {
        self.set_state(StateUpdate::new().on(on).transition(0)).await
    }

    /// Set the global brightness, clamped to 0-255.
    pub async fn set_brightness(&self, brightness: i32) -> Result<DeviceState> {
        let brightness = clamp_channel(brightness);
        tracing::info!("WLED {}: brightness {}", self.host, brightness);
        self.set_state(StateUpdate::new().brightness(brightness)).await
    }

    /// Set the effect on the main segment, optionally with speed and
    /// intensity (both clamped to 0-255).
    pub async fn set_effect(
        &self,
        effect: u32,
        speed: Option<i32>,
        intensity: Option<i32>,
    ) -> Result<DeviceState> {
        let mut seg = SegmentUpdate::new().effect(effect);
        if let Some(speed) = speed {
            seg = seg.speed(clamp_channel(speed));
        }
        if let Some(intensity) = intensity {
            seg = seg.intensity(clamp_channel(intensity));
        }
        tracing::info!("WLED {}: effect {}", self.host, effect);
        self.set_segment(seg).await
    }

    /// Set the effect speed on the main segment without changing the
    /// effect, clamped to 0-255.
    pub async fn set_speed(&self, speed: i32) -> Result<DeviceState> {
        let speed = clamp_channel(speed);
        tracing::info!("WLED {}: effect speed {}", self.host, speed);
        self.set_segment(SegmentUpdate::new().speed(speed)).await
    }

    /// Set the effect intensity on the main segment without changing
    /// the effect, clamped to 0-255.
    pub async fn set_intensity(&self, intensity: i32) -> Result<DeviceState> {
        let intensity = clamp_channel(intensity);
        tracing::info!("WLED {}: effect intensity {}", self.host, intensity);
        self.set_segment(SegmentUpdate::new().intensity(intensity)).await
    }

    /// Set the palette on the main segment.
    pub async fn set_palette(&self, palette: u32) -> Result<DeviceState> {
        tracing::info!("WLED {}: palette {}", self.host, palette);
        self.set_segment(SegmentUpdate::new().palette(palette)).await
    }

    /// Set the primary color on the main segment; channels clamped to 0-255.
    pub async fn set_color(&self, r: i32, g: i32, b: i32, w: i32) -> Result<DeviceState> {
        let color = vec![
            clamp_channel(r),
            clamp_channel(g),
            clamp_channel(b),
            clamp_channel(w),
        ];
        tracing::info!(
            "WLED {}: color rgb({},{},{})",
            self.host,
            color[0],
            color[1],
            color[2]
        );
        self.set_segment(SegmentUpdate::new().color(color)).await
    }

    /// Load a preset.
    pub async fn set_preset(&self, preset: i32) -> Result<DeviceState> {
        tracing::info!("WLED {}: loading preset {}", self.host, preset);
        self.set_state(StateUpdate::new().preset(preset)).await
    }

    /// Save the current state into a preset slot.
    pub async fn save_preset(&self, slot: u32) -> Result<DeviceState> {
        tracing::info!("WLED {}: saving preset {}", self.host, slot);
        self.set_state(StateUpdate::new().save_preset(slot)).await
    }

    /// Set the crossfade duration in 100 ms units.
    pub async fn set_transition(&self, transition: u32) -> Result<DeviceState> {
        self.set_state(StateUpdate::new().transition(transition)).await
    }

    /// Enable or disable the live override.
    pub async fn set_live_override(&self, live: bool) -> Result<DeviceState> {
        self.set_state(StateUpdate::new().live_override(live)).await
    }

    /// Start the nightlight timer: turn on and fade to black over
    /// `duration` minutes.
    pub async fn nightlight_start(&self, duration: u32) -> Result<DeviceState> {
        tracing::info!("WLED {}: nightlight for {} min", self.host, duration);
        let nl = NightlightUpdate {
            on: Some(true),
            duration: Some(duration),
            mode: Some(1),
            target_brightness: Some(0),
        };
        self.set_state(StateUpdate::new().on(true).nightlight(nl)).await
    }

    /// Cancel the nightlight timer.
    pub async fn nightlight_stop(&self) -> Result<DeviceState> {
        let nl = NightlightUpdate {
            on: Some(false),
            ..NightlightUpdate::default()
        };
        self.set_state(StateUpdate::new().nightlight(nl)).await
    }

    /// Enable or disable UDP sync sending.
    pub async fn set_sync_send(&self, send: bool) -> Result<DeviceState> {
        let sync = SyncUpdate {
            send: Some(send),
            receive: None,
        };
        self.set_state(StateUpdate::new().sync(sync)).await
    }

    /// Enable or disable UDP sync receiving.
    pub async fn set_sync_receive(&self, receive: bool) -> Result<DeviceState> {
        let sync = SyncUpdate {
            send: None,
            receive: Some(receive),
        };
        self.set_state(StateUpdate::new().sync(sync)).await
    }

    /// Start a playlist.
    pub async fn start_playlist(&self, playlist: i32) -> Result<DeviceState> {
        self.set_state(StateUpdate::new().playlist(playlist)).await
    }

    /// Stop the running playlist.
    pub async fn stop_playlist(&self) -> Result<DeviceState> {
        self.set_state(StateUpdate::new().playlist(-1)).await
    }

    // ========== Segment-scoped commands ==========

    /// Turn a single segment on or off.
    pub async fn set_segment_power(&self, segment: u32, on: bool) -> Result<DeviceState> {
        self.set_segment(SegmentUpdate::new().id(segment).on(on)).await
    }

    /// Set a single segment's brightness, clamped to 0-255.
    pub async fn set_segment_brightness(
        &self,
        segment: u32,
        brightness: i32,
    ) -> Result<DeviceState> {
        self.set_segment(
            SegmentUpdate::new()
                .id(segment)
                .brightness(clamp_channel(brightness)),
        )
        .await
    }

    /// Set a single segment's effect.
    pub async fn set_segment_effect(&self, segment: u32, effect: u32) -> Result<DeviceState> {
        self.set_segment(SegmentUpdate::new().id(segment).effect(effect)).await
    }

    /// Set a single segment's palette.
    pub async fn set_segment_palette(&self, segment: u32, palette: u32) -> Result<DeviceState> {
        self.set_segment(SegmentUpdate::new().id(segment).palette(palette)).await
    }

    /// Set a single segment's primary color; channels clamped to 0-255.
    pub async fn set_segment_color(
        &self,
        segment: u32,
        r: i32,
        g: i32,
        b: i32,
        w: i32,
    ) -> Result<DeviceState> {
        let color = vec![
            clamp_channel(r),
            clamp_channel(g),
            clamp_channel(b),
            clamp_channel(w),
        ];
        self.set_segment(SegmentUpdate::new().id(segment).color(color)).await
    }

    // ========== Cache reads (never block on the network) ==========

    /// Whether the most recent request succeeded.
    pub fn online(&self) -> bool {
        self.cache.lock().unwrap().online
    }

    /// Description of the most recent failure, cleared on success.
    pub fn last_error(&self) -> Option<String> {
        self.cache.lock().unwrap().last_error.clone()
    }

    /// The most recently fetched state, if any fetch has succeeded.
    pub fn last_state(&self) -> Option<DeviceState> {
        self.cache.lock().unwrap().state.clone()
    }

    /// The most recently fetched device info, if any fetch has succeeded.
    pub fn last_info(&self) -> Option<DeviceInfo> {
        self.cache.lock().unwrap().info.clone()
    }

    /// Cached effect names from the last `fetch_all`.
    pub fn effects(&self) -> Vec<String> {
        self.cache.lock().unwrap().effects.clone()
    }

    /// Cached palette names from the last `fetch_all`.
    pub fn palettes(&self) -> Vec<String> {
        self.cache.lock().unwrap().palettes.clone()
    }

    /// Cached preset map from the last `fetch_presets`.
    pub fn presets(&self) -> BTreeMap<u32, String> {
        self.cache.lock().unwrap().presets.clone()
    }
}

/// Clamp an arbitrary integer into the 0-255 channel range.
pub(crate) fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Drop empty entries and the `-` placeholder from a name list.
fn filter_names(data: Option<&Value>) -> Vec<String> {
    data.and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty() && *s != "-")
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clamp_channel_bounds() {
        assert_eq!(clamp_channel(-5), 0);
        assert_eq!(clamp_channel(0), 0);
        assert_eq!(clamp_channel(128), 128);
        assert_eq!(clamp_channel(255), 255);
        assert_eq!(clamp_channel(999), 255);
    }

    #[test]
    fn filter_names_drops_placeholders() {
        let data = json!(["Solid", "-", "", "Rainbow"]);
        assert_eq!(filter_names(Some(&data)), vec!["Solid", "Rainbow"]);
    }

    #[test]
    fn filter_names_tolerates_missing_list() {
        assert!(filter_names(None).is_empty());
        assert!(filter_names(Some(&json!({}))).is_empty());
    }
}

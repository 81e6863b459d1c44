use serde::Serialize;
use serde_json::Value;

/// Default color used when a segment carries no color list.
const DEFAULT_COLOR: [u8; 3] = [255, 255, 255];

/// One independently addressable sub-range of the LED strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: u32,
    pub start: u32,
    pub stop: u32,
    /// Length in LEDs; devices may omit it, in which case it is `stop - start`.
    pub len: u32,
    pub on: bool,
    pub brightness: u8,
    pub effect: u32,
    pub speed: u8,
    pub intensity: u8,
    pub palette: u32,
    /// Color slots, each an RGB or RGBW tuple.
    pub colors: Vec<Vec<u8>>,
}

impl Segment {
    /// Decode a segment object. Missing or malformed fields fall back to
    /// the device defaults; `seg_id` is used when the object has no `id`.
    pub fn from_json(data: &Value, seg_id: u32) -> Self {
        let start = get_u64(data, "start", 0) as u32;
        let stop = get_u64(data, "stop", 0) as u32;
        let len = data
            .get("len")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or_else(|| stop.saturating_sub(start));

        Self {
            id: get_u64(data, "id", u64::from(seg_id)) as u32,
            start,
            stop,
            len,
            on: get_bool(data, "on", true),
            brightness: get_u8(data, "bri", 255),
            effect: get_u64(data, "fx", 0) as u32,
            speed: get_u8(data, "sx", 128),
            intensity: get_u8(data, "ix", 128),
            palette: get_u64(data, "pal", 0) as u32,
            colors: parse_colors(data.get("col")),
        }
    }
}

/// Nightlight sub-state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nightlight {
    pub on: bool,
    /// Duration in minutes.
    pub duration: u32,
    pub mode: u32,
    /// Brightness the nightlight fades towards.
    pub target_brightness: u8,
}

/// UDP realtime sync flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpSync {
    pub send: bool,
    pub receive: bool,
}

/// Full device state as reported by `/json/state`.
///
/// Replaced wholesale on every successful fetch; the client never merges
/// a partial response into a previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub on: bool,
    pub brightness: u8,
    /// Crossfade duration in 100 ms units.
    pub transition: u32,
    /// Active preset, -1 when none.
    pub preset: i32,
    /// Active playlist, -1 when none.
    pub playlist: i32,
    pub nightlight: Nightlight,
    /// Live override active (`lor` > 0).
    pub live: bool,
    pub sync: UdpSync,
    pub main_segment: usize,
    pub segments: Vec<Segment>,
}

impl DeviceState {
    /// Decode a state object, defaulting every absent field.
    pub fn from_json(data: &Value) -> Self {
        let segments = data
            .get("seg")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .enumerate()
                    .map(|(i, seg)| Segment::from_json(seg, i as u32))
                    .collect()
            })
            .unwrap_or_default();

        let nl = data.get("nl").cloned().unwrap_or(Value::Null);
        let udpn = data.get("udpn").cloned().unwrap_or(Value::Null);

        Self {
            on: get_bool(data, "on", false),
            brightness: get_u8(data, "bri", 0),
            transition: get_u64(data, "transition", 7) as u32,
            preset: get_i64(data, "ps", -1) as i32,
            playlist: get_i64(data, "pl", -1) as i32,
            nightlight: Nightlight {
                on: get_bool(&nl, "on", false),
                duration: get_u64(&nl, "dur", 60) as u32,
                mode: get_u64(&nl, "mode", 0) as u32,
                target_brightness: get_u8(&nl, "tbri", 0),
            },
            live: get_i64(data, "lor", 0) > 0,
            sync: UdpSync {
                send: get_bool(&udpn, "send", false),
                receive: get_bool(&udpn, "recv", true),
            },
            main_segment: get_u64(data, "mainseg", 0) as usize,
            segments,
        }
    }

    fn main(&self) -> Option<&Segment> {
        self.segments.get(self.main_segment)
    }

    /// Primary color of the main segment, white when there is none.
    pub fn primary_color(&self) -> [u8; 3] {
        if let Some(seg) = self.main() {
            if let Some(col) = seg.colors.first() {
                let mut rgb = [0u8; 3];
                for (i, slot) in rgb.iter_mut().enumerate() {
                    *slot = col.get(i).copied().unwrap_or(0);
                }
                return rgb;
            }
        }
        DEFAULT_COLOR
    }

    /// Active effect id of the main segment, 0 when there is none.
    pub fn effect(&self) -> u32 {
        self.main().map(|s| s.effect).unwrap_or(0)
    }

    /// Active palette id of the main segment, 0 when there is none.
    pub fn palette(&self) -> u32 {
        self.main().map(|s| s.palette).unwrap_or(0)
    }
}

/// Device information as reported by `/json/info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub version: String,
    pub version_id: u64,
    pub led_count: u32,
    pub max_segments: u32,
    pub name: String,
    pub udp_port: u16,
    pub live_support: bool,
    pub live_source: String,
    pub product: String,
    pub brand: String,
    pub mac: String,
    pub ip: String,
}

impl DeviceInfo {
    /// Decode an info object with the stock WLED defaults.
    pub fn from_json(data: &Value) -> Self {
        let leds = data.get("leds").cloned().unwrap_or(Value::Null);

        // Older firmware reports `lm` as an integer instead of a bool.
        let live_support = match data.get("lm") {
            Some(Value::Bool(b)) => *b,
            Some(v) => v.as_i64().unwrap_or(0) != 0,
            None => false,
        };

        Self {
            version: get_str(data, "ver", ""),
            version_id: get_u64(data, "vid", 0),
            led_count: get_u64(&leds, "count", 0) as u32,
            max_segments: get_u64(&leds, "maxseg", 0) as u32,
            name: get_str(data, "name", ""),
            udp_port: get_u64(data, "udpport", 21324) as u16,
            live_support,
            live_source: get_str(data, "lip", ""),
            product: get_str(data, "product", "WLED"),
            brand: get_str(data, "brand", "wled"),
            mac: get_str(data, "mac", ""),
            ip: get_str(data, "ip", ""),
        }
    }
}

/// Capability flags for one effect, parsed from the device's `fxdata` list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectMetadata {
    pub name: String,
    pub is_2d: bool,
    pub uses_palette: bool,
    pub volume_reactive: bool,
    pub frequency_reactive: bool,
}

impl EffectMetadata {
    /// Parse one `fxdata` entry of the form `params;colors;palette;flags[,options]`.
    ///
    /// A palette section that is missing, empty, or the `!` disabled marker
    /// means the effect ignores palettes. The flags token marks 2-D support
    /// with `2`, volume reactivity with `v` and frequency reactivity with
    /// `f` (case-insensitive). Short or absent strings leave every flag
    /// false with only the name populated.
    pub fn parse(name: &str, data: &str) -> Self {
        let mut meta = Self {
            name: name.to_string(),
            ..Self::default()
        };

        let sections: Vec<&str> = data.split(';').collect();
        if sections.len() < 4 {
            return meta;
        }

        let palette = sections[2].split(',').next().unwrap_or("").trim();
        meta.uses_palette = !palette.is_empty() && palette != "!";

        let flags = sections[3].split(',').next().unwrap_or("");
        for c in flags.chars() {
            match c.to_ascii_lowercase() {
                '2' => meta.is_2d = true,
                'v' => meta.volume_reactive = true,
                'f' => meta.frequency_reactive = true,
                _ => {}
            }
        }

        meta
    }
}

/// Partial state document for `POST /json/state`.
///
/// Only the fields the caller sets are serialized, so the device applies
/// the minimal change and leaves everything else alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(rename = "bri", skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<u32>,
    #[serde(rename = "ps", skip_serializing_if = "Option::is_none")]
    pub preset: Option<i32>,
    #[serde(rename = "pl", skip_serializing_if = "Option::is_none")]
    pub playlist: Option<i32>,
    #[serde(rename = "psave", skip_serializing_if = "Option::is_none")]
    pub save_preset: Option<u32>,
    #[serde(rename = "lor", skip_serializing_if = "Option::is_none")]
    pub live_override: Option<u8>,
    #[serde(rename = "nl", skip_serializing_if = "Option::is_none")]
    pub nightlight: Option<NightlightUpdate>,
    #[serde(rename = "udpn", skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncUpdate>,
    #[serde(rename = "seg", skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentUpdate>>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, on: bool) -> Self {
        self.on = Some(on);
        self
    }

    pub fn brightness(mut self, brightness: u8) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn transition(mut self, transition: u32) -> Self {
        self.transition = Some(transition);
        self
    }

    pub fn preset(mut self, preset: i32) -> Self {
        self.preset = Some(preset);
        self
    }

    pub fn playlist(mut self, playlist: i32) -> Self {
        self.playlist = Some(playlist);
        self
    }

    pub fn save_preset(mut self, slot: u32) -> Self {
        self.save_preset = Some(slot);
        self
    }

    pub fn live_override(mut self, live: bool) -> Self {
        self.live_override = Some(u8::from(live));
        self
    }

    pub fn nightlight(mut self, nightlight: NightlightUpdate) -> Self {
        self.nightlight = Some(nightlight);
        self
    }

    pub fn sync(mut self, sync: SyncUpdate) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Append a segment-scoped mutation.
    pub fn segment(mut self, segment: SegmentUpdate) -> Self {
        self.segments.get_or_insert_with(Vec::new).push(segment);
        self
    }

    /// True when no field has been set; sending this would be a no-op.
    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .map(|v| v.as_object().is_some_and(|o| o.is_empty()))
            .unwrap_or(true)
    }
}

/// Partial nightlight document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NightlightUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(rename = "dur", skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(rename = "tbri", skip_serializing_if = "Option::is_none")]
    pub target_brightness: Option<u8>,
}

/// Partial UDP sync document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send: Option<bool>,
    #[serde(rename = "recv", skip_serializing_if = "Option::is_none")]
    pub receive: Option<bool>,
}

/// Partial segment document, scoped by segment id when one is given.
/// Without an id the device applies it to the main segment.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SegmentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(rename = "bri", skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(rename = "fx", skip_serializing_if = "Option::is_none")]
    pub effect: Option<u32>,
    #[serde(rename = "sx", skip_serializing_if = "Option::is_none")]
    pub speed: Option<u8>,
    #[serde(rename = "ix", skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
    #[serde(rename = "pal", skip_serializing_if = "Option::is_none")]
    pub palette: Option<u32>,
    #[serde(rename = "col", skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<Vec<u8>>>,
}

impl SegmentUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn on(mut self, on: bool) -> Self {
        self.on = Some(on);
        self
    }

    pub fn brightness(mut self, brightness: u8) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn effect(mut self, effect: u32) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn speed(mut self, speed: u8) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn intensity(mut self, intensity: u8) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn palette(mut self, palette: u32) -> Self {
        self.palette = Some(palette);
        self
    }

    /// Set the primary color slot.
    pub fn color(mut self, color: Vec<u8>) -> Self {
        self.colors = Some(vec![color]);
        self
    }
}

fn get_bool(data: &Value, key: &str, default: bool) -> bool {
    data.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn get_u64(data: &Value, key: &str, default: u64) -> u64 {
    data.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn get_i64(data: &Value, key: &str, default: i64) -> i64 {
    data.get(key).and_then(Value::as_i64).unwrap_or(default)
}

fn get_u8(data: &Value, key: &str, default: u8) -> u8 {
    data.get(key)
        .and_then(Value::as_u64)
        .map(|v| v.min(255) as u8)
        .unwrap_or(default)
}

fn get_str(data: &Value, key: &str, default: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn parse_colors(col: Option<&Value>) -> Vec<Vec<u8>> {
    let parsed: Vec<Vec<u8>> = col
        .and_then(Value::as_array)
        .map(|slots| {
            slots
                .iter()
                .filter_map(Value::as_array)
                .map(|channels| {
                    channels
                        .iter()
                        .map(|c| c.as_u64().unwrap_or(0).min(255) as u8)
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default();

    if parsed.is_empty() {
        vec![DEFAULT_COLOR.to_vec()]
    } else {
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_state_gets_defaults() {
        let state = DeviceState::from_json(&json!({"on": true}));
        assert!(state.on);
        assert_eq!(state.brightness, 0);
        assert_eq!(state.preset, -1);
        assert_eq!(state.playlist, -1);
        assert!(state.segments.is_empty());
        assert_eq!(state.primary_color(), [255, 255, 255]);
        assert_eq!(state.effect(), 0);
        assert_eq!(state.palette(), 0);
        assert_eq!(state.transition, 7);
        assert!(state.sync.receive);
        assert!(!state.sync.send);
    }

    #[test]
    fn segment_length_defaults_to_span() {
        let seg = Segment::from_json(&json!({"start": 0, "stop": 10}), 0);
        assert_eq!(seg.len, 10);
        assert_eq!(seg.brightness, 255);
        assert_eq!(seg.speed, 128);
        assert_eq!(seg.colors, vec![vec![255, 255, 255]]);
    }

    #[test]
    fn explicit_segment_length_wins() {
        let seg = Segment::from_json(&json!({"start": 5, "stop": 30, "len": 3}), 2);
        assert_eq!(seg.len, 3);
        assert_eq!(seg.id, 2);
    }

    #[test]
    fn malformed_numeric_fields_fall_back() {
        let state = DeviceState::from_json(&json!({"bri": "loud", "ps": {}, "transition": null}));
        assert_eq!(state.brightness, 0);
        assert_eq!(state.preset, -1);
        assert_eq!(state.transition, 7);
    }

    #[test]
    fn primary_color_tracks_main_segment() {
        let state = DeviceState::from_json(&json!({
            "mainseg": 1,
            "seg": [
                {"col": [[1, 2, 3]]},
                {"col": [[10, 20, 30, 0]], "fx": 5, "pal": 7}
            ]
        }));
        assert_eq!(state.primary_color(), [10, 20, 30]);
        assert_eq!(state.effect(), 5);
        assert_eq!(state.palette(), 7);
    }

    #[test]
    fn out_of_range_main_segment_uses_defaults() {
        let state = DeviceState::from_json(&json!({
            "mainseg": 9,
            "seg": [{"col": [[1, 2, 3]], "fx": 4}]
        }));
        assert_eq!(state.primary_color(), [255, 255, 255]);
        assert_eq!(state.effect(), 0);
    }

    #[test]
    fn live_flag_from_lor() {
        assert!(DeviceState::from_json(&json!({"lor": 1})).live);
        assert!(DeviceState::from_json(&json!({"lor": 2})).live);
        assert!(!DeviceState::from_json(&json!({"lor": 0})).live);
    }

    #[test]
    fn info_defaults_and_nesting() {
        let info = DeviceInfo::from_json(&json!({
            "ver": "0.14.0",
            "vid": 2310130,
            "name": "Porch",
            "leds": {"count": 120, "maxseg": 16},
            "mac": "aabbccddeeff"
        }));
        assert_eq!(info.version, "0.14.0");
        assert_eq!(info.led_count, 120);
        assert_eq!(info.max_segments, 16);
        assert_eq!(info.udp_port, 21324);
        assert_eq!(info.product, "WLED");
        assert_eq!(info.brand, "wled");
        assert!(!info.live_support);
    }

    #[test]
    fn info_live_support_accepts_int() {
        assert!(DeviceInfo::from_json(&json!({"lm": 1})).live_support);
        assert!(!DeviceInfo::from_json(&json!({"lm": 0})).live_support);
        assert!(DeviceInfo::from_json(&json!({"lm": true})).live_support);
    }

    #[test]
    fn effect_metadata_flags() {
        let meta = EffectMetadata::parse("Ripple", "12;!;,sx,ix;1v");
        assert_eq!(meta.name, "Ripple");
        assert!(!meta.uses_palette);
        assert!(!meta.is_2d);
        assert!(meta.volume_reactive);
        assert!(!meta.frequency_reactive);
    }

    #[test]
    fn effect_metadata_palette_and_2d() {
        let meta = EffectMetadata::parse("Matrix", ";!;pal;2F");
        assert!(meta.uses_palette);
        assert!(meta.is_2d);
        assert!(meta.frequency_reactive);
        assert!(!meta.volume_reactive);
    }

    #[test]
    fn effect_metadata_short_string_is_all_false() {
        let meta = EffectMetadata::parse("Solid", ";!");
        assert_eq!(meta.name, "Solid");
        assert!(!meta.uses_palette);
        assert!(!meta.is_2d);
        assert!(!meta.volume_reactive);
        assert!(!meta.frequency_reactive);
    }

    #[test]
    fn effect_metadata_disabled_palette_marker() {
        let meta = EffectMetadata::parse("Blink", "sx;!;!;1");
        assert!(!meta.uses_palette);
    }

    #[test]
    fn state_update_serializes_only_set_fields() {
        let update = StateUpdate::new().on(true).brightness(128);
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, json!({"on": true, "bri": 128}));
    }

    #[test]
    fn segment_update_scoped_by_id() {
        let update = StateUpdate::new()
            .segment(SegmentUpdate::new().id(2).color(vec![10, 20, 30, 0]));
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, json!({"seg": [{"id": 2, "col": [[10, 20, 30, 0]]}]}));
    }

    #[test]
    fn color_round_trip_through_echoed_state() {
        let update = StateUpdate::new()
            .segment(SegmentUpdate::new().id(2).color(vec![10, 20, 30, 0]));
        let body = serde_json::to_value(&update).unwrap();

        // A device echoes the applied state back; decode it as the client would.
        let echoed = json!({
            "on": true,
            "mainseg": 0,
            "seg": [
                {"id": 0, "col": [[0, 0, 0]]},
                {"id": 1, "col": [[0, 0, 0]]},
                {"id": 2, "col": body["seg"][0]["col"]}
            ]
        });
        let state = DeviceState::from_json(&echoed);
        assert_eq!(&state.segments[2].colors[0][..3], &[10, 20, 30]);
    }

    #[test]
    fn empty_update_detected() {
        assert!(StateUpdate::new().is_empty());
        assert!(!StateUpdate::new().on(true).is_empty());
    }
}

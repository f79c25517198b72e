use serde::{Deserialize, Serialize};

/// Bucketed physical screen size, used to drive layout scaling (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenSize {
    Small,
    Medium,
    Large,
    ExtraLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioChannels {
    Mono,
    Stereo,
    Surround,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Alexa,
    Google,
    Apple,
    Web,
    Mobile,
    Iot,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    SmartSpeaker,
    SmartDisplay,
    Phone,
    Tablet,
    Computer,
    Wearable,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkSpeed {
    Slow,
    Medium,
    Fast,
}

/// Normalized capability record a platform payload is parsed into (§4.6).
/// Every field here is independently meaningful to the adaptor — none of
/// them are derived from each other at construction time except where a
/// per-platform rule says so explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub has_screen: bool,
    pub has_audio: bool,
    pub has_touch: bool,
    pub has_keyboard: bool,
    pub has_camera: bool,
    pub screen_size: Option<ScreenSize>,
    pub screen_resolution: Option<String>,
    pub supports_video: bool,
    pub supports_animation: bool,
    pub audio_channels: AudioChannels,
    pub supports_ssml: bool,
    pub supports_sound_effects: bool,

    pub visually_impaired: bool,
    pub hearing_impaired: bool,
    pub motor_impaired: bool,
    pub cognitive_support: bool,
    pub screen_reader_active: bool,
    pub braille_display_connected: bool,
    pub switch_control_active: bool,
    pub voice_control_active: bool,

    pub has_haptics: bool,
    pub supports_ar: bool,
    pub supports_vr: bool,
    pub supports_3d: bool,

    pub platform: Platform,
    pub device_type: DeviceType,
    pub network_speed: NetworkSpeed,

    pub prefers_reduced_motion: bool,
    pub prefers_high_contrast: bool,
    pub prefers_large_text: bool,
    pub prefers_simplified_ui: bool,
}

impl DeviceCapabilities {
    /// Safe defaults for an unrecognized platform: screen on, keyboard on,
    /// medium everything, no accessibility overlays assumed (§4.6).
    pub fn unknown_default() -> Self {
        Self {
            has_screen: true,
            has_audio: true,
            has_touch: false,
            has_keyboard: true,
            has_camera: false,
            screen_size: Some(ScreenSize::Medium),
            screen_resolution: None,
            supports_video: false,
            supports_animation: false,
            audio_channels: AudioChannels::Stereo,
            supports_ssml: false,
            supports_sound_effects: false,
            visually_impaired: false,
            hearing_impaired: false,
            motor_impaired: false,
            cognitive_support: false,
            screen_reader_active: false,
            braille_display_connected: false,
            switch_control_active: false,
            voice_control_active: false,
            has_haptics: false,
            supports_ar: false,
            supports_vr: false,
            supports_3d: false,
            platform: Platform::Unknown,
            device_type: DeviceType::Unknown,
            network_speed: NetworkSpeed::Medium,
            prefers_reduced_motion: false,
            prefers_high_contrast: false,
            prefers_large_text: false,
            prefers_simplified_ui: false,
        }
    }
}

/// Accessibility overrides pulled from the user profile (§4.6). These win
/// over whatever the detector inferred from the raw platform payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserAccessibilityPreferences {
    pub visually_impaired: Option<bool>,
    pub hearing_impaired: Option<bool>,
    pub motor_impaired: Option<bool>,
    pub cognitive_support: Option<bool>,
    pub prefers_reduced_motion: Option<bool>,
    pub prefers_high_contrast: Option<bool>,
    pub prefers_large_text: Option<bool>,
    pub prefers_simplified_ui: Option<bool>,
}

/// Raw platform payload handed to the detector. Field presence (not just
/// value) matters for the Alexa/Google precedence rules, so every field
/// stays `Option` rather than defaulting at the JSON boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformContext {
    /// Explicit platform override — highest precedence if present.
    pub platform: Option<String>,
    /// Alexa-shaped `context.System.device.supportedInterfaces` keys.
    pub supported_interfaces: Option<Vec<String>>,
    /// Presence alone (regardless of content) signals an Alexa request.
    pub has_system_device: bool,
    /// Google Assistant surface capabilities (e.g. `SCREEN_OUTPUT`, `AUDIO_OUTPUT`).
    pub google_capabilities: Option<Vec<String>>,
    pub user_agent: Option<String>,
    pub viewport_width: Option<u32>,
    pub network_speed: Option<NetworkSpeed>,
}

/// A logical response before platform adaptation — what the dispatched
/// agent actually produced for the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseResponse {
    pub text: String,
    pub ssml: Option<String>,
    pub choices: Vec<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
}

/// Avatar rendering mode chosen by the adaptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarMode {
    Live,
    Static,
    None,
}

/// Output of `adaptResponse` — a response shaped for the caller's actual
/// device (§4.6). The adaptor is pure: constructing this never performs I/O.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptedResponse {
    pub text: String,
    pub ssml: Option<String>,
    pub choices: Vec<String>,
    pub voice_navigation_cues: Vec<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub avatar_mode: AvatarMode,
    pub audio_descriptions: Option<String>,
    pub alt_text: Option<String>,
    pub haptic_cues: Vec<String>,
    pub captions: Option<String>,
    pub captions_forced: bool,
    pub visual_audio_indicators: bool,
    pub large_target_mode: bool,
    pub sound_effects: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_default_has_screen_and_keyboard_on() {
        let caps = DeviceCapabilities::unknown_default();
        assert!(caps.has_screen);
        assert!(caps.has_keyboard);
        assert_eq!(caps.screen_size, Some(ScreenSize::Medium));
        assert_eq!(caps.platform, Platform::Unknown);
    }
}

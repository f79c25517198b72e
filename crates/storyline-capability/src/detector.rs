use crate::error::{CapabilityError, Result};
use crate::types::{
    AudioChannels, DeviceCapabilities, DeviceType, NetworkSpeed, Platform, PlatformContext,
    ScreenSize, UserAccessibilityPreferences,
};

/// Parses a platform payload into a normalized `DeviceCapabilities` record
/// and applies the user-profile accessibility override merge (§4.6).
pub struct CapabilityDetector;

impl CapabilityDetector {
    pub fn detect(ctx: &PlatformContext) -> Result<DeviceCapabilities> {
        let caps = match detect_platform(ctx) {
            Platform::Alexa => detect_alexa(ctx),
            Platform::Google => detect_google(ctx),
            Platform::Apple => detect_apple(ctx),
            Platform::Web => detect_web(ctx),
            Platform::Mobile => detect_mobile(ctx),
            Platform::Iot => DeviceCapabilities {
                platform: Platform::Iot,
                device_type: DeviceType::Unknown,
                ..DeviceCapabilities::unknown_default()
            },
            Platform::Unknown => DeviceCapabilities::unknown_default(),
        };
        validate(&caps)?;
        Ok(caps)
    }

    /// Accessibility preferences from the user profile override whatever
    /// the detector inferred (§4.6 user-preference merge).
    pub fn merge_user_preferences(
        mut caps: DeviceCapabilities,
        prefs: &UserAccessibilityPreferences,
    ) -> DeviceCapabilities {
        if let Some(v) = prefs.visually_impaired {
            caps.visually_impaired = v;
        }
        if let Some(v) = prefs.hearing_impaired {
            caps.hearing_impaired = v;
        }
        if let Some(v) = prefs.motor_impaired {
            caps.motor_impaired = v;
        }
        if let Some(v) = prefs.cognitive_support {
            caps.cognitive_support = v;
        }
        if let Some(v) = prefs.prefers_reduced_motion {
            caps.prefers_reduced_motion = v;
        }
        if let Some(v) = prefs.prefers_high_contrast {
            caps.prefers_high_contrast = v;
        }
        if let Some(v) = prefs.prefers_large_text {
            caps.prefers_large_text = v;
        }
        if let Some(v) = prefs.prefers_simplified_ui {
            caps.prefers_simplified_ui = v;
        }
        caps
    }
}

/// Precedence: explicit `platform` field > Alexa-shaped context > user-agent
/// substring. Unknown otherwise (§4.6).
fn detect_platform(ctx: &PlatformContext) -> Platform {
    if let Some(p) = ctx.platform.as_deref() {
        return match p {
            "alexa" => Platform::Alexa,
            "google" => Platform::Google,
            "apple" => Platform::Apple,
            "web" => Platform::Web,
            "mobile" => Platform::Mobile,
            "iot" => Platform::Iot,
            _ => Platform::Unknown,
        };
    }
    if ctx.has_system_device || ctx.supported_interfaces.is_some() {
        return Platform::Alexa;
    }
    if ctx.google_capabilities.is_some() {
        return Platform::Google;
    }
    if let Some(ua) = ctx.user_agent.as_deref() {
        let ua_lower = ua.to_lowercase();
        if ua_lower.contains("iphone") || ua_lower.contains("ipad") || ua_lower.contains("siri") {
            return Platform::Apple;
        }
        if ua_lower.contains("android") || ua_lower.contains("mobile") {
            return Platform::Mobile;
        }
        if ua_lower.contains("mozilla") || ua_lower.contains("chrome") || ua_lower.contains("safari") {
            return Platform::Web;
        }
    }
    Platform::Unknown
}

fn detect_alexa(ctx: &PlatformContext) -> DeviceCapabilities {
    let interfaces = ctx.supported_interfaces.clone().unwrap_or_default();
    let has_screen = interfaces.iter().any(|i| i == "Display" || i == "Alexa.Presentation.APL");
    DeviceCapabilities {
        has_screen,
        has_audio: true,
        has_touch: has_screen,
        has_keyboard: false,
        has_camera: false,
        screen_size: if has_screen { Some(ScreenSize::Medium) } else { None },
        screen_resolution: None,
        supports_video: has_screen,
        supports_animation: has_screen,
        audio_channels: AudioChannels::Stereo,
        supports_ssml: true,
        supports_sound_effects: true,
        visually_impaired: false,
        hearing_impaired: false,
        motor_impaired: false,
        cognitive_support: false,
        screen_reader_active: false,
        braille_display_connected: false,
        switch_control_active: false,
        voice_control_active: true,
        has_haptics: false,
        supports_ar: false,
        supports_vr: false,
        supports_3d: false,
        platform: Platform::Alexa,
        device_type: if has_screen { DeviceType::SmartDisplay } else { DeviceType::SmartSpeaker },
        network_speed: ctx.network_speed.unwrap_or(NetworkSpeed::Fast),
        prefers_reduced_motion: false,
        prefers_high_contrast: false,
        prefers_large_text: false,
        prefers_simplified_ui: false,
    }
}

fn detect_google(ctx: &PlatformContext) -> DeviceCapabilities {
    let capabilities = ctx.google_capabilities.clone().unwrap_or_default();
    let has_screen = capabilities.iter().any(|c| c == "SCREEN_OUTPUT");
    let mut caps = detect_alexa(ctx);
    caps.platform = Platform::Google;
    caps.has_screen = has_screen;
    caps.has_touch = has_screen;
    caps.screen_size = if has_screen { Some(ScreenSize::Medium) } else { None };
    caps.device_type = if has_screen { DeviceType::SmartDisplay } else { DeviceType::SmartSpeaker };
    caps
}

fn detect_apple(ctx: &PlatformContext) -> DeviceCapabilities {
    let has_screen = true;
    DeviceCapabilities {
        has_screen,
        has_audio: true,
        has_touch: true,
        has_keyboard: false,
        has_camera: true,
        screen_size: Some(ScreenSize::Medium),
        screen_resolution: None,
        supports_video: true,
        supports_animation: true,
        audio_channels: AudioChannels::Stereo,
        supports_ssml: false,
        supports_sound_effects: true,
        visually_impaired: false,
        hearing_impaired: false,
        motor_impaired: false,
        cognitive_support: false,
        screen_reader_active: false,
        braille_display_connected: false,
        switch_control_active: false,
        voice_control_active: true,
        has_haptics: has_screen,
        supports_ar: has_screen,
        supports_vr: false,
        supports_3d: false,
        platform: Platform::Apple,
        device_type: DeviceType::Phone,
        network_speed: ctx.network_speed.unwrap_or(NetworkSpeed::Fast),
        prefers_reduced_motion: false,
        prefers_high_contrast: false,
        prefers_large_text: false,
        prefers_simplified_ui: false,
    }
}

fn detect_web(ctx: &PlatformContext) -> DeviceCapabilities {
    let screen_size = match ctx.viewport_width {
        Some(w) if w < 768 => ScreenSize::Small,
        Some(w) if w < 1024 => ScreenSize::Medium,
        Some(w) if w < 1920 => ScreenSize::Large,
        Some(_) => ScreenSize::ExtraLarge,
        None => ScreenSize::Medium,
    };
    DeviceCapabilities {
        has_screen: true,
        has_audio: true,
        has_touch: matches!(screen_size, ScreenSize::Small),
        has_keyboard: true,
        has_camera: false,
        screen_size: Some(screen_size),
        screen_resolution: ctx.viewport_width.map(|w| format!("{w}x?")),
        supports_video: true,
        supports_animation: true,
        audio_channels: AudioChannels::Stereo,
        supports_ssml: false,
        supports_sound_effects: true,
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
        platform: Platform::Web,
        device_type: DeviceType::Computer,
        network_speed: ctx.network_speed.unwrap_or(NetworkSpeed::Fast),
        prefers_reduced_motion: false,
        prefers_high_contrast: false,
        prefers_large_text: false,
        prefers_simplified_ui: false,
    }
}

fn detect_mobile(ctx: &PlatformContext) -> DeviceCapabilities {
    DeviceCapabilities {
        has_haptics: true,
        has_touch: true,
        has_keyboard: false,
        has_camera: true,
        device_type: DeviceType::Phone,
        platform: Platform::Mobile,
        ..detect_web(ctx)
    }
}

/// Reject a capability record with (no screen AND no audio) OR no input
/// method of any kind (§4.6 validation rule).
fn validate(caps: &DeviceCapabilities) -> Result<()> {
    if !caps.has_screen && !caps.has_audio {
        return Err(CapabilityError::InvalidCapabilities(
            "device has neither a screen nor audio output".to_string(),
        ));
    }
    let has_input = caps.has_touch
        || caps.has_keyboard
        || caps.voice_control_active
        || caps.switch_control_active;
    if !has_input {
        return Err(CapabilityError::InvalidCapabilities(
            "device has no usable input method".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_platform_field_wins_over_everything_else() {
        let ctx = PlatformContext {
            platform: Some("alexa".to_string()),
            has_system_device: false,
            user_agent: Some("Mozilla/5.0".to_string()),
            ..Default::default()
        };
        let caps = CapabilityDetector::detect(&ctx).unwrap();
        assert_eq!(caps.platform, Platform::Alexa);
    }

    #[test]
    fn alexa_screen_presence_drives_device_type() {
        let ctx = PlatformContext {
            supported_interfaces: Some(vec!["Alexa.Presentation.APL".to_string()]),
            ..Default::default()
        };
        let caps = CapabilityDetector::detect(&ctx).unwrap();
        assert!(caps.has_screen);
        assert!(caps.has_touch);
        assert!(caps.supports_ssml);
        assert_eq!(caps.device_type, DeviceType::SmartDisplay);
    }

    #[test]
    fn alexa_without_display_interface_is_a_smart_speaker() {
        let ctx = PlatformContext {
            has_system_device: true,
            supported_interfaces: Some(vec!["AudioPlayer".to_string()]),
            ..Default::default()
        };
        let caps = CapabilityDetector::detect(&ctx).unwrap();
        assert!(!caps.has_screen);
        assert_eq!(caps.device_type, DeviceType::SmartSpeaker);
    }

    #[test]
    fn web_screen_size_buckets_by_viewport_width() {
        let small = PlatformContext { platform: Some("web".into()), viewport_width: Some(400), ..Default::default() };
        let large = PlatformContext { platform: Some("web".into()), viewport_width: Some(1500), ..Default::default() };
        assert_eq!(
            CapabilityDetector::detect(&small).unwrap().screen_size,
            Some(ScreenSize::Small)
        );
        assert_eq!(
            CapabilityDetector::detect(&large).unwrap().screen_size,
            Some(ScreenSize::Large)
        );
    }

    #[test]
    fn mobile_has_haptics_by_default() {
        let ctx = PlatformContext { platform: Some("mobile".into()), ..Default::default() };
        let caps = CapabilityDetector::detect(&ctx).unwrap();
        assert!(caps.has_haptics);
    }

    #[test]
    fn unknown_platform_gets_safe_defaults() {
        let ctx = PlatformContext::default();
        let caps = CapabilityDetector::detect(&ctx).unwrap();
        assert_eq!(caps.platform, Platform::Unknown);
        assert!(caps.has_screen);
        assert!(caps.has_keyboard);
    }

    #[test]
    fn validate_rejects_no_screen_and_no_audio() {
        let mut caps = DeviceCapabilities::unknown_default();
        caps.has_screen = false;
        caps.has_audio = false;
        assert!(validate(&caps).is_err());
    }

    #[test]
    fn validate_rejects_no_input_method() {
        let mut caps = DeviceCapabilities::unknown_default();
        caps.has_touch = false;
        caps.has_keyboard = false;
        caps.voice_control_active = false;
        caps.switch_control_active = false;
        assert!(validate(&caps).is_err());
    }

    #[test]
    fn user_preferences_override_detected_defaults() {
        let ctx = PlatformContext { platform: Some("web".into()), ..Default::default() };
        let caps = CapabilityDetector::detect(&ctx).unwrap();
        let prefs = UserAccessibilityPreferences {
            visually_impaired: Some(true),
            ..Default::default()
        };
        let merged = CapabilityDetector::merge_user_preferences(caps, &prefs);
        assert!(merged.visually_impaired);
    }
}

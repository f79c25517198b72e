use crate::types::{AdaptedResponse, AvatarMode, BaseResponse, DeviceCapabilities};

const COGNITIVE_SUPPORT_CHOICE_CAP: usize = 3;

/// `adaptResponse` (§4.6). Pure: never performs I/O, only transforms a
/// logical response into the shape a specific device can render. Dispatch
/// precedence:
/// 1. Screen-reader / visually-impaired ⇒ audio-first.
/// 2. No screen ⇒ voice-only.
/// 3. Screen+audio ⇒ full visual rendering.
/// Then overlay hearing/motor/cognitive accommodations on top of whichever
/// base shape was chosen.
pub fn adapt_response(base: &BaseResponse, caps: &DeviceCapabilities) -> AdaptedResponse {
    let mut adapted = if caps.screen_reader_active || caps.visually_impaired {
        audio_first(base, caps)
    } else if !caps.has_screen {
        voice_only(base, caps)
    } else {
        visual_and_audio(base, caps)
    };

    apply_hearing_overlay(&mut adapted, caps);
    apply_motor_overlay(&mut adapted, caps);
    apply_cognitive_overlay(&mut adapted, caps);

    adapted
}

fn audio_first(base: &BaseResponse, caps: &DeviceCapabilities) -> AdaptedResponse {
    AdaptedResponse {
        text: base.text.clone(),
        ssml: base.ssml.clone(),
        choices: base.choices.clone(),
        voice_navigation_cues: navigation_cues(&base.choices),
        image_url: None,
        video_url: None,
        avatar_mode: AvatarMode::Static,
        audio_descriptions: Some(generate_audio_description(base)),
        alt_text: base.image_url.as_ref().map(|_| base.text.clone()),
        haptic_cues: if caps.has_haptics { vec!["turn_complete".to_string()] } else { Vec::new() },
        captions: None,
        captions_forced: false,
        visual_audio_indicators: false,
        large_target_mode: false,
        sound_effects: Vec::new(),
    }
}

fn voice_only(base: &BaseResponse, caps: &DeviceCapabilities) -> AdaptedResponse {
    AdaptedResponse {
        text: base.text.clone(),
        ssml: if caps.supports_ssml { base.ssml.clone().or_else(|| Some(to_ssml(&base.text))) } else { None },
        choices: base.choices.clone(),
        voice_navigation_cues: navigation_cues(&base.choices),
        image_url: None,
        video_url: None,
        avatar_mode: AvatarMode::None,
        audio_descriptions: None,
        alt_text: None,
        haptic_cues: Vec::new(),
        captions: None,
        captions_forced: false,
        visual_audio_indicators: false,
        large_target_mode: false,
        sound_effects: if caps.supports_sound_effects { select_sound_effects(base) } else { Vec::new() },
    }
}

fn visual_and_audio(base: &BaseResponse, caps: &DeviceCapabilities) -> AdaptedResponse {
    let avatar_mode = if caps.supports_video && caps.supports_animation {
        AvatarMode::Live
    } else {
        AvatarMode::Static
    };
    AdaptedResponse {
        text: base.text.clone(),
        ssml: base.ssml.clone(),
        choices: base.choices.clone(),
        voice_navigation_cues: Vec::new(),
        image_url: base.image_url.clone(),
        video_url: base.video_url.clone(),
        avatar_mode,
        audio_descriptions: None,
        alt_text: base.image_url.as_ref().map(|_| base.text.clone()),
        haptic_cues: Vec::new(),
        captions: Some(base.text.clone()),
        captions_forced: false,
        visual_audio_indicators: false,
        large_target_mode: false,
        sound_effects: Vec::new(),
    }
}

fn apply_hearing_overlay(adapted: &mut AdaptedResponse, caps: &DeviceCapabilities) {
    if caps.hearing_impaired {
        adapted.captions = Some(adapted.captions.clone().unwrap_or_else(|| adapted.text.clone()));
        adapted.captions_forced = true;
        adapted.visual_audio_indicators = true;
    }
}

fn apply_motor_overlay(adapted: &mut AdaptedResponse, caps: &DeviceCapabilities) {
    if caps.motor_impaired || caps.switch_control_active {
        adapted.large_target_mode = true;
        if adapted.voice_navigation_cues.is_empty() {
            adapted.voice_navigation_cues = navigation_cues(&adapted.choices);
        }
    }
}

fn apply_cognitive_overlay(adapted: &mut AdaptedResponse, caps: &DeviceCapabilities) {
    if caps.cognitive_support {
        adapted.choices.truncate(COGNITIVE_SUPPORT_CHOICE_CAP);
        adapted.text = simplify_language(&adapted.text);
        adapted.video_url = None;
        adapted.avatar_mode = AvatarMode::Static;
    }
}

fn navigation_cues(choices: &[String]) -> Vec<String> {
    choices
        .iter()
        .enumerate()
        .map(|(i, choice)| format!("Say \"{}\" for {choice}", i + 1))
        .collect()
}

fn generate_audio_description(base: &BaseResponse) -> String {
    match &base.image_url {
        Some(_) => format!("Illustration accompanying: {}", base.text),
        None => base.text.clone(),
    }
}

fn to_ssml(text: &str) -> String {
    format!("<speak>{text}</speak>")
}

fn select_sound_effects(base: &BaseResponse) -> Vec<String> {
    let lower = base.text.to_lowercase();
    let mut effects = Vec::new();
    if lower.contains("knock") {
        effects.push("knock.mp3".to_string());
    }
    if lower.contains("thunder") || lower.contains("storm") {
        effects.push("thunder.mp3".to_string());
    }
    if lower.contains("laugh") {
        effects.push("giggle.mp3".to_string());
    }
    effects
}

fn simplify_language(text: &str) -> String {
    text.split('.')
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioChannels, DeviceType, NetworkSpeed, Platform, ScreenSize};

    fn base() -> BaseResponse {
        BaseResponse {
            text: "The knight found a hidden door. Choose what happens next.".to_string(),
            ssml: None,
            choices: vec!["Open the door".to_string(), "Walk away".to_string()],
            image_url: Some("https://example.test/scene.png".to_string()),
            video_url: None,
        }
    }

    fn screen_caps() -> DeviceCapabilities {
        DeviceCapabilities {
            has_screen: true,
            has_audio: true,
            has_touch: true,
            has_keyboard: true,
            has_camera: false,
            screen_size: Some(ScreenSize::Large),
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
            voice_control_active: false,
            has_haptics: false,
            supports_ar: false,
            supports_vr: false,
            supports_3d: false,
            platform: Platform::Web,
            device_type: DeviceType::Computer,
            network_speed: NetworkSpeed::Fast,
            prefers_reduced_motion: false,
            prefers_high_contrast: false,
            prefers_large_text: false,
            prefers_simplified_ui: false,
        }
    }

    #[test]
    fn visually_impaired_gets_audio_first_with_static_avatar() {
        let mut caps = screen_caps();
        caps.visually_impaired = true;
        let adapted = adapt_response(&base(), &caps);
        assert_eq!(adapted.avatar_mode, AvatarMode::Static);
        assert!(adapted.image_url.is_none());
        assert!(adapted.audio_descriptions.is_some());
        assert!(adapted.alt_text.is_some());
    }

    #[test]
    fn no_screen_strips_visuals_and_adds_navigation_cues() {
        let mut caps = screen_caps();
        caps.has_screen = false;
        caps.voice_control_active = true;
        let adapted = adapt_response(&base(), &caps);
        assert!(adapted.image_url.is_none());
        assert_eq!(adapted.voice_navigation_cues.len(), 2);
    }

    #[test]
    fn screen_and_audio_renders_live_avatar_when_video_and_animation_supported() {
        let adapted = adapt_response(&base(), &screen_caps());
        assert_eq!(adapted.avatar_mode, AvatarMode::Live);
        assert!(adapted.image_url.is_some());
        assert!(!adapted.captions_forced);
    }

    #[test]
    fn hearing_impaired_forces_captions_and_visual_indicators() {
        let mut caps = screen_caps();
        caps.hearing_impaired = true;
        let adapted = adapt_response(&base(), &caps);
        assert!(adapted.captions_forced);
        assert!(adapted.visual_audio_indicators);
    }

    #[test]
    fn cognitive_support_caps_choices_and_simplifies_text() {
        let mut caps = screen_caps();
        caps.cognitive_support = true;
        let mut base = base();
        base.choices = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        let adapted = adapt_response(&base, &caps);
        assert_eq!(adapted.choices.len(), COGNITIVE_SUPPORT_CHOICE_CAP);
        assert_eq!(adapted.text, "The knight found a hidden door");
    }

    #[test]
    fn motor_impaired_enables_large_target_mode() {
        let mut caps = screen_caps();
        caps.motor_impaired = true;
        let adapted = adapt_response(&base(), &caps);
        assert!(adapted.large_target_mode);
        assert_eq!(adapted.voice_navigation_cues.len(), 2);
    }
}

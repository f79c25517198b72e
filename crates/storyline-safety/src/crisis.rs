use tracing::warn;

use crate::types::CrisisResource;

/// Fixed hotline resources. Never LLM-generated — crisis response text must
/// be exactly this, every time (§4.4).
pub fn crisis_resources() -> Vec<CrisisResource> {
    vec![
        CrisisResource {
            name: "988 Suicide & Crisis Lifeline".to_string(),
            phone: "988".to_string(),
            sms: Some("988".to_string()),
            description: "Free, confidential support, 24/7.".to_string(),
        },
        CrisisResource {
            name: "Crisis Text Line".to_string(),
            phone: "741741".to_string(),
            sms: Some("HOME to 741741".to_string()),
            description: "Text with a trained crisis counselor.".to_string(),
        },
    ]
}

/// Compose the fixed response shown to the caregiver and trigger whatever
/// downstream alerting the deployment wires up (§4.4). Returns the message
/// text; the caller is responsible for short-circuiting the rest of the
/// turn pipeline once this fires.
pub fn trigger_crisis_intervention(user_id: &str, trigger_text: &str) -> String {
    warn!(user_id, trigger_text, "crisis intervention triggered");
    let resources = crisis_resources();
    let mut message = String::from(
        "I want to make sure you're safe. If you or someone you know is in crisis, please reach out:\n",
    );
    for r in &resources {
        message.push_str(&format!("- {}: call or text {}\n", r.name, r.phone));
    }
    message.push_str("You're not alone, and help is available right now.");
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_includes_every_resource() {
        let message = trigger_crisis_intervention("u1", "end my life");
        for r in crisis_resources() {
            assert!(message.contains(&r.phone));
        }
    }
}

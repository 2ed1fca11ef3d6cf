pub const NUDGE_TITLE: &str = "Time's up";

/// Cycled in order, one per notification.
pub const NUDGE_MESSAGES: &[&str] = &[
    "Your time is up. Come back and put the phone down.",
    "Still scrolling? You said you'd be done by now.",
    "The feed will still be there tomorrow. Come back.",
    "Every extra minute here is one you chose to lose.",
    "Tap to come back and stop these reminders.",
    "Your learning feed is waiting. Close the app.",
];

pub fn default_messages() -> Vec<String> {
    NUDGE_MESSAGES.iter().map(|message| message.to_string()).collect()
}

/// Message for the `index`-th notification of a campaign.
pub fn message_at(messages: &[String], index: u64) -> &str {
    if messages.is_empty() {
        return NUDGE_MESSAGES[0];
    }
    let slot = (index % messages.len() as u64) as usize;
    &messages[slot]
}

//! Text shown by the presentation layer for a snapshot

use crate::state::{Mode, Snapshot};

/// Mode label, with the remaining seconds while awake
pub fn status_line(snapshot: &Snapshot) -> String {
    if snapshot.mode == Mode::Awake && snapshot.countdown_seconds > 0 {
        format!("{} • {}s", snapshot.mode, snapshot.countdown_seconds)
    } else {
        snapshot.mode.to_string()
    }
}

/// Body of the recognized-text card
pub fn card_text(snapshot: &Snapshot) -> String {
    match snapshot.mode {
        Mode::Idle => "Waiting...".to_string(),
        Mode::Listening => "Listening... say the wake phrase".to_string(),
        Mode::Awake => "Wake phrase detected, say your command".to_string(),
        Mode::Processing => "Processing...".to_string(),
        Mode::Result if snapshot.result_text.is_empty() => "No text captured".to_string(),
        Mode::Result => snapshot.result_text.clone(),
        Mode::Error => snapshot
            .error
            .clone()
            .unwrap_or_else(|| "Error, see logs.".to_string()),
    }
}

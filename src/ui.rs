//! Presentation surface
//!
//! The `UiSnapshot` is the single source of truth for what the terminal
//! shows: the session phase, the elapsed-time label, control enablement, the
//! preview URLs, and whichever dialog is active. Snapshots are computed from
//! the session state and rendered by `render()`; input lines are mapped to
//! events by `parse_command()`.

use std::io::Write;
use std::time::Duration;

use serde::Serialize;

use crate::api;
use crate::state_machine::{Event, State};

/// Coarse session phase for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Recording,
    Uploading,
    UploadFailed,
    Uploaded,
    Submitting,
    Submitted,
}

/// The active dialog, if any. One dialog at a time; `Event::DismissDialog`
/// is the single dismiss entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Dialog {
    /// Submission was rejected; carries the server's message
    Alert { message: String },
    /// Submission confirmed
    Confirmation { message: String },
}

/// UI state derived from the session state.
/// Control enablement follows the state table strictly.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSnapshot {
    pub phase: Phase,
    pub elapsed: Option<String>,
    pub record_enabled: bool,
    pub stop_enabled: bool,
    pub submit_enabled: bool,
    pub playback_url: Option<String>,
    pub spectrogram_url: Option<String>,
    pub dialog: Option<Dialog>,
}

/// Format an elapsed duration as `M:SS:cc` (centisecond resolution).
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    let minutes = total_ms / 60_000;
    let seconds = (total_ms / 1_000) % 60;
    let centis = (total_ms % 1_000) / 10;
    format!("{}:{:02}:{:02}", minutes, seconds, centis)
}

/// Build the snapshot for the current state.
///
/// `device_available` gates the record control: when the capture device never
/// became available, recording must not be offered at all.
pub fn build_snapshot(state: &State, device_available: bool, server_url: &str) -> UiSnapshot {
    match state {
        State::Idle => UiSnapshot {
            phase: Phase::Idle,
            elapsed: None,
            record_enabled: device_available,
            stop_enabled: false,
            submit_enabled: false,
            playback_url: None,
            spectrogram_url: None,
            dialog: None,
        },
        State::Recording { started_at, .. } => UiSnapshot {
            phase: Phase::Recording,
            elapsed: Some(format_elapsed(started_at.elapsed())),
            record_enabled: false,
            stop_enabled: true,
            submit_enabled: false,
            playback_url: None,
            spectrogram_url: None,
            dialog: None,
        },
        State::Stopped {
            duration,
            upload_failed,
            ..
        } => UiSnapshot {
            phase: if *upload_failed {
                Phase::UploadFailed
            } else {
                Phase::Uploading
            },
            elapsed: Some(format_elapsed(*duration)),
            record_enabled: device_available,
            stop_enabled: false,
            submit_enabled: false,
            playback_url: None,
            spectrogram_url: None,
            dialog: None,
        },
        State::Uploaded {
            audio_filename,
            image_filename,
            duration,
            submitting,
            alert,
            ..
        } => UiSnapshot {
            phase: if *submitting {
                Phase::Submitting
            } else {
                Phase::Uploaded
            },
            elapsed: Some(format_elapsed(*duration)),
            record_enabled: device_available && !*submitting,
            stop_enabled: false,
            submit_enabled: !*submitting,
            playback_url: Some(api::playback_url(server_url, audio_filename)),
            spectrogram_url: Some(api::spectrogram_url(server_url, image_filename)),
            dialog: alert.clone().map(|message| Dialog::Alert { message }),
        },
        State::Submitted { notice } => UiSnapshot {
            phase: Phase::Submitted,
            elapsed: None,
            record_enabled: false,
            stop_enabled: false,
            submit_enabled: false,
            playback_url: None,
            spectrogram_url: None,
            dialog: notice
                .clone()
                .map(|message| Dialog::Confirmation { message }),
        },
    }
}

/// Map an input line to a session event.
pub fn parse_command(line: &str) -> Option<Event> {
    match line.trim().to_ascii_lowercase().as_str() {
        "r" | "record" => Some(Event::StartPressed),
        "s" | "stop" => Some(Event::StopPressed),
        "y" | "submit" => Some(Event::SubmitPressed),
        "d" | "dismiss" | "ok" => Some(Event::DismissDialog),
        "n" | "new" => Some(Event::Reset),
        "q" | "quit" | "exit" => Some(Event::Exit),
        _ => None,
    }
}

fn available_commands(snapshot: &UiSnapshot) -> String {
    let mut commands = Vec::new();
    if snapshot.record_enabled {
        commands.push("record (r)");
    }
    if snapshot.stop_enabled {
        commands.push("stop (s)");
    }
    if snapshot.submit_enabled {
        commands.push("submit (y)");
    }
    if snapshot.dialog.is_some() {
        commands.push("dismiss (d)");
    }
    if matches!(snapshot.phase, Phase::Submitted) {
        commands.push("new (n)");
    }
    commands.push("quit (q)");
    commands.join(", ")
}

/// Render a snapshot to the terminal.
///
/// While recording, consecutive snapshots only move the elapsed label, so the
/// line is rewritten in place; every phase change gets a fresh status block.
pub fn render(snapshot: &UiSnapshot, last_phase: &mut Option<Phase>) {
    let mut stdout = std::io::stdout();

    if *last_phase == Some(Phase::Recording) && snapshot.phase == Phase::Recording {
        if let Some(elapsed) = &snapshot.elapsed {
            let _ = write!(stdout, "\r  recording {}", elapsed);
            let _ = stdout.flush();
        }
        return;
    }

    // Terminate the in-place elapsed line before printing a new block
    if *last_phase == Some(Phase::Recording) {
        let _ = writeln!(stdout);
    }
    *last_phase = Some(snapshot.phase);

    match snapshot.phase {
        Phase::Idle => {
            let _ = writeln!(stdout, "ready");
            if !snapshot.record_enabled {
                let _ = writeln!(stdout, "  no capture device available; recording disabled");
            }
        }
        Phase::Recording => {
            if let Some(elapsed) = &snapshot.elapsed {
                let _ = write!(stdout, "\r  recording {}", elapsed);
                let _ = stdout.flush();
                return;
            }
        }
        Phase::Uploading => {
            let _ = writeln!(stdout, "uploading recording...");
        }
        Phase::UploadFailed => {
            let _ = writeln!(stdout, "upload failed; record again to retry");
        }
        Phase::Uploaded | Phase::Submitting => {
            let _ = writeln!(stdout, "recording uploaded");
            if let Some(url) = &snapshot.playback_url {
                let _ = writeln!(stdout, "  playback:    {}", url);
            }
            if let Some(url) = &snapshot.spectrogram_url {
                let _ = writeln!(stdout, "  spectrogram: {}", url);
            }
            if snapshot.phase == Phase::Submitting {
                let _ = writeln!(stdout, "  submitting...");
            }
        }
        Phase::Submitted => {
            let _ = writeln!(stdout, "recording submitted");
        }
    }

    if let Some(dialog) = &snapshot.dialog {
        match dialog {
            Dialog::Alert { message } => {
                let _ = writeln!(stdout, "  [!] {}", message);
            }
            Dialog::Confirmation { message } => {
                let _ = writeln!(stdout, "  [ok] {}", message);
            }
        }
    }

    let _ = writeln!(stdout, "  commands: {}", available_commands(snapshot));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use uuid::Uuid;

    fn uploaded(submitting: bool, alert: Option<String>) -> State {
        State::Uploaded {
            recording_id: Uuid::new_v4(),
            audio_filename: "a.mp3".to_string(),
            image_filename: "b.png".to_string(),
            duration: Duration::from_secs(42),
            submitting,
            alert,
        }
    }

    #[test]
    fn elapsed_formats_at_centisecond_resolution() {
        assert_eq!(format_elapsed(Duration::from_millis(50)), "0:00:05");
        assert_eq!(format_elapsed(Duration::from_millis(0)), "0:00:00");
        assert_eq!(format_elapsed(Duration::from_millis(1_230)), "0:01:23");
        assert_eq!(format_elapsed(Duration::from_millis(61_500)), "1:01:50");
        assert_eq!(format_elapsed(Duration::from_secs(600)), "10:00:00");
    }

    #[test]
    fn idle_only_offers_record_and_only_with_a_device() {
        let snap = build_snapshot(&State::Idle, true, "http://localhost:5000");
        assert!(snap.record_enabled);
        assert!(!snap.stop_enabled);
        assert!(!snap.submit_enabled);
        assert!(snap.playback_url.is_none());

        let snap = build_snapshot(&State::Idle, false, "http://localhost:5000");
        assert!(!snap.record_enabled);
    }

    #[test]
    fn recording_only_offers_stop() {
        let state = State::Recording {
            recording_id: Uuid::new_v4(),
            started_at: Instant::now(),
        };
        let snap = build_snapshot(&state, true, "http://localhost:5000");
        assert_eq!(snap.phase, Phase::Recording);
        assert!(!snap.record_enabled);
        assert!(snap.stop_enabled);
        assert!(!snap.submit_enabled);
        assert!(snap.elapsed.is_some());
    }

    #[test]
    fn stopped_hides_previews_and_submit() {
        let state = State::Stopped {
            recording_id: Uuid::new_v4(),
            duration: Duration::from_millis(50),
            upload_failed: true,
        };
        let snap = build_snapshot(&state, true, "http://localhost:5000");
        assert_eq!(snap.phase, Phase::UploadFailed);
        assert!(snap.playback_url.is_none());
        assert!(snap.spectrogram_url.is_none());
        assert!(!snap.submit_enabled);
        assert!(snap.record_enabled);
    }

    #[test]
    fn uploaded_reveals_previews_and_enables_submit() {
        let snap = build_snapshot(&uploaded(false, None), true, "http://localhost:5000");
        assert_eq!(snap.phase, Phase::Uploaded);
        assert_eq!(
            snap.playback_url.as_deref(),
            Some("http://localhost:5000/temp/a.mp3")
        );
        assert_eq!(
            snap.spectrogram_url.as_deref(),
            Some("http://localhost:5000/spectrogram/b.png")
        );
        assert!(snap.submit_enabled);
    }

    #[test]
    fn submitting_disables_the_submit_control() {
        let snap = build_snapshot(&uploaded(true, None), true, "http://localhost:5000");
        assert_eq!(snap.phase, Phase::Submitting);
        assert!(!snap.submit_enabled);
        assert!(!snap.record_enabled);
    }

    #[test]
    fn submit_failure_surfaces_the_alert_dialog() {
        let snap = build_snapshot(
            &uploaded(false, Some("Recording must be at least 30 seconds long".to_string())),
            true,
            "http://localhost:5000",
        );
        assert_eq!(
            snap.dialog,
            Some(Dialog::Alert {
                message: "Recording must be at least 30 seconds long".to_string()
            })
        );
        // The session stays interactive behind the dialog
        assert!(snap.submit_enabled);
    }

    #[test]
    fn submitted_disables_everything_but_reset() {
        let state = State::Submitted {
            notice: Some("File submitted successfully".to_string()),
        };
        let snap = build_snapshot(&state, true, "http://localhost:5000");
        assert_eq!(snap.phase, Phase::Submitted);
        assert!(!snap.record_enabled);
        assert!(!snap.stop_enabled);
        assert!(!snap.submit_enabled);
        assert_eq!(
            snap.dialog,
            Some(Dialog::Confirmation {
                message: "File submitted successfully".to_string()
            })
        );
    }

    #[test]
    fn commands_parse_case_insensitively_with_whitespace() {
        assert!(matches!(parse_command("r"), Some(Event::StartPressed)));
        assert!(matches!(parse_command("  Record "), Some(Event::StartPressed)));
        assert!(matches!(parse_command("STOP"), Some(Event::StopPressed)));
        assert!(matches!(parse_command("submit"), Some(Event::SubmitPressed)));
        assert!(matches!(parse_command("d"), Some(Event::DismissDialog)));
        assert!(matches!(parse_command("new"), Some(Event::Reset)));
        assert!(matches!(parse_command("q"), Some(Event::Exit)));
        assert!(parse_command("").is_none());
        assert!(parse_command("frobnicate").is_none());
    }
}

//! State machine for the recording session
//!
//! This module implements the session workflow using a single-writer pattern.
//! All state transitions go through the `reduce()` function, which returns
//! a new state and a list of effects to execute.

use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::audio::RecordingArtifact;

/// Internal state of the recording session.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    Recording {
        recording_id: Uuid,
        started_at: Instant,
    },
    /// Capture has ended; the artifact is being assembled and uploaded.
    /// A failed upload parks the session here until the user records again.
    Stopped {
        recording_id: Uuid,
        duration: Duration,
        upload_failed: bool,
    },
    /// Both artifact identifiers are always populated together.
    Uploaded {
        recording_id: Uuid,
        audio_filename: String,
        image_filename: String,
        duration: Duration,
        submitting: bool,
        alert: Option<String>,
    },
    /// Terminal for this recording; only an explicit reset re-arms the session.
    Submitted {
        notice: Option<String>,
    },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Events that can trigger state transitions.
/// These are sent from the presentation surface, the ticker, and the
/// capture/upload/submit effect tasks.
#[derive(Debug, Clone)]
pub enum Event {
    // Presentation surface
    StartPressed,
    StopPressed,
    SubmitPressed,
    /// Single dismiss entry point for whichever dialog is active
    DismissDialog,
    /// Re-arm the session after a submission (the page-reload analog)
    Reset,
    /// Application exit requested
    Exit,

    /// Tick event for updating the elapsed display (includes id to prevent
    /// stale ticks)
    Tick {
        id: Uuid,
    },

    // Capture events
    CaptureFailed {
        id: Uuid,
        err: String,
    },
    CaptureStopped {
        id: Uuid,
        artifact: RecordingArtifact,
    },

    // Upload events
    UploadOk {
        id: Uuid,
        audio_filename: String,
        image_filename: String,
    },
    UploadFailed {
        id: Uuid,
        err: String,
    },

    // Submit events
    SubmitOk {
        id: Uuid,
        message: String,
    },
    SubmitFailed {
        id: Uuid,
        err: String,
    },
}

/// Effects to be executed after a state transition.
/// The effect runner handles these asynchronously.
#[derive(Debug, Clone)]
pub enum Effect {
    StartCapture {
        id: Uuid,
    },
    /// Start sending Tick events at the display resolution while the
    /// recording is active
    StartTicker {
        id: Uuid,
    },
    StopCapture {
        id: Uuid,
    },
    Upload {
        id: Uuid,
        artifact: RecordingArtifact,
    },
    Submit {
        id: Uuid,
        audio_filename: String,
        image_filename: String,
        duration: Duration,
    },
    /// Ask the server to drop an un-submitted temp upload
    DiscardUpload {
        audio_filename: String,
    },
    /// Signal to emit a UI snapshot
    EmitUi,
}

fn start_recording() -> (State, Vec<Effect>) {
    let id = Uuid::new_v4();
    (
        State::Recording {
            recording_id: id,
            started_at: Instant::now(),
        },
        vec![
            Effect::StartCapture { id },
            Effect::StartTicker { id },
            Effect::EmitUi,
        ],
    )
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore events with stale recording IDs
/// - Always emit EmitUi after state changes
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    // Helper: extract current recording_id (if any)
    let current_id: Option<Uuid> = match state {
        Idle => None,
        Recording { recording_id, .. } => Some(*recording_id),
        Stopped { recording_id, .. } => Some(*recording_id),
        Uploaded { recording_id, .. } => Some(*recording_id),
        Submitted { .. } => None,
    };

    // Helper: check if event's ID is stale (doesn't match current workflow)
    let is_stale = |eid: Uuid| Some(eid) != current_id;

    match (state, event) {
        // -----------------
        // Start
        // -----------------
        (Idle, StartPressed) => start_recording(),
        // Re-record after a failed (or unwanted) upload
        (Stopped { .. }, StartPressed) => start_recording(),
        // Re-record over an un-submitted upload; the server drops the orphan
        (Uploaded { audio_filename, .. }, StartPressed) => {
            let (next, mut effects) = start_recording();
            effects.insert(
                0,
                DiscardUpload {
                    audio_filename: audio_filename.clone(),
                },
            );
            (next, effects)
        }
        // Submitted is terminal until reset
        (Submitted { .. }, StartPressed) => (state.clone(), vec![]),

        // -----------------
        // Recording
        // -----------------
        (
            Recording {
                recording_id,
                started_at,
            },
            StopPressed,
        ) => (
            Stopped {
                recording_id: *recording_id,
                duration: started_at.elapsed(),
                upload_failed: false,
            },
            vec![StopCapture { id: *recording_id }, EmitUi],
        ),
        // Elapsed display refresh
        (Recording { recording_id, .. }, Tick { id }) if *recording_id == id => {
            (state.clone(), vec![EmitUi])
        }
        // Capture never became available; silent per contract (runner logs)
        (Recording { recording_id, .. }, CaptureFailed { id, .. }) if *recording_id == id => {
            (Idle, vec![EmitUi])
        }

        // -----------------
        // Stopped: assembly and upload
        // -----------------
        (Stopped { recording_id, .. }, CaptureStopped { id, artifact }) if *recording_id == id => {
            (state.clone(), vec![Upload { id, artifact }])
        }
        // Assembly failed after stop; treated like a failed upload
        (
            Stopped {
                recording_id,
                duration,
                ..
            },
            CaptureFailed { id, .. },
        ) if *recording_id == id => (
            Stopped {
                recording_id: *recording_id,
                duration: *duration,
                upload_failed: true,
            },
            vec![EmitUi],
        ),
        (
            Stopped {
                recording_id,
                duration,
                ..
            },
            UploadOk {
                id,
                audio_filename,
                image_filename,
            },
        ) if *recording_id == id => (
            Uploaded {
                recording_id: *recording_id,
                audio_filename,
                image_filename,
                duration: *duration,
                submitting: false,
                alert: None,
            },
            vec![EmitUi],
        ),
        // No retry: the artifact only travels through the Upload effect, so
        // the session stays parked here and the user records again
        (
            Stopped {
                recording_id,
                duration,
                ..
            },
            UploadFailed { id, .. },
        ) if *recording_id == id => (
            Stopped {
                recording_id: *recording_id,
                duration: *duration,
                upload_failed: true,
            },
            vec![EmitUi],
        ),

        // -----------------
        // Uploaded: preview and submit
        // -----------------
        (
            Uploaded {
                recording_id,
                audio_filename,
                image_filename,
                duration,
                submitting: false,
                ..
            },
            SubmitPressed,
        ) => (
            Uploaded {
                recording_id: *recording_id,
                audio_filename: audio_filename.clone(),
                image_filename: image_filename.clone(),
                duration: *duration,
                submitting: true,
                alert: None,
            },
            vec![
                Submit {
                    id: *recording_id,
                    audio_filename: audio_filename.clone(),
                    image_filename: image_filename.clone(),
                    duration: *duration,
                },
                EmitUi,
            ],
        ),
        // A submission is already in flight
        (Uploaded { submitting: true, .. }, SubmitPressed) => (state.clone(), vec![]),
        (Uploaded { recording_id, .. }, SubmitOk { id, message }) if *recording_id == id => (
            Submitted {
                notice: Some(message),
            },
            vec![EmitUi],
        ),
        (
            Uploaded {
                recording_id,
                audio_filename,
                image_filename,
                duration,
                ..
            },
            SubmitFailed { id, err },
        ) if *recording_id == id => (
            Uploaded {
                recording_id: *recording_id,
                audio_filename: audio_filename.clone(),
                image_filename: image_filename.clone(),
                duration: *duration,
                submitting: false,
                alert: Some(err),
            },
            vec![EmitUi],
        ),

        // -----------------
        // Dialogs
        // -----------------
        (
            Uploaded {
                recording_id,
                audio_filename,
                image_filename,
                duration,
                submitting,
                alert: Some(_),
            },
            DismissDialog,
        ) => (
            Uploaded {
                recording_id: *recording_id,
                audio_filename: audio_filename.clone(),
                image_filename: image_filename.clone(),
                duration: *duration,
                submitting: *submitting,
                alert: None,
            },
            vec![EmitUi],
        ),
        (Submitted { notice: Some(_) }, DismissDialog) => {
            (Submitted { notice: None }, vec![EmitUi])
        }

        // -----------------
        // Reset
        // -----------------
        (Submitted { .. }, Reset) => (Idle, vec![EmitUi]),

        // -----------------
        // Stale events (drop silently)
        // -----------------
        (_, Tick { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureStopped { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, UploadOk { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, UploadFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, SubmitOk { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, SubmitFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> RecordingArtifact {
        RecordingArtifact {
            filename: "24-06-01_123456.mp3".to_string(),
            bytes: vec![0u8; 44],
        }
    }

    fn recording_state(id: Uuid) -> State {
        State::Recording {
            recording_id: id,
            started_at: Instant::now(),
        }
    }

    fn stopped_state(id: Uuid) -> State {
        State::Stopped {
            recording_id: id,
            duration: Duration::from_millis(50),
            upload_failed: false,
        }
    }

    fn uploaded_state(id: Uuid) -> State {
        State::Uploaded {
            recording_id: id,
            audio_filename: "a.mp3".to_string(),
            image_filename: "b.png".to_string(),
            duration: Duration::from_millis(50),
            submitting: false,
            alert: None,
        }
    }

    #[test]
    fn idle_start_transitions_to_recording_with_capture_and_ticker() {
        let (next, effects) = reduce(&State::Idle, Event::StartPressed);
        assert!(matches!(next, State::Recording { .. }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartCapture { .. })));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartTicker { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::EmitUi)));
    }

    #[test]
    fn stop_before_any_start_is_a_noop() {
        let (next, effects) = reduce(&State::Idle, Event::StopPressed);
        assert!(matches!(next, State::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn stop_during_recording_stops_capture_and_parks_in_stopped() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(&recording_state(id), Event::StopPressed);
        assert!(matches!(
            next,
            State::Stopped {
                recording_id,
                upload_failed: false,
                ..
            } if recording_id == id
        ));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StopCapture { id: eid } if *eid == id)));
    }

    #[test]
    fn tick_during_recording_refreshes_ui_only() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(&recording_state(id), Event::Tick { id });
        assert!(matches!(next, State::Recording { .. }));
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::EmitUi));
    }

    #[test]
    fn tick_outside_recording_is_dropped() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(&State::Idle, Event::Tick { id });
        assert!(matches!(next, State::Idle));
        assert!(effects.is_empty());

        let (next, effects) = reduce(&stopped_state(id), Event::Tick { id: Uuid::new_v4() });
        assert!(matches!(next, State::Stopped { .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn capture_failure_during_recording_returns_to_idle() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(
            &recording_state(id),
            Event::CaptureFailed {
                id,
                err: "no input device".to_string(),
            },
        );
        assert!(matches!(next, State::Idle));
        assert!(effects.iter().any(|e| matches!(e, Effect::EmitUi)));
    }

    #[test]
    fn capture_stopped_initiates_upload_with_the_artifact() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(
            &stopped_state(id),
            Event::CaptureStopped {
                id,
                artifact: artifact(),
            },
        );
        assert!(matches!(next, State::Stopped { .. }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Upload { id: eid, .. } if *eid == id)));
    }

    #[test]
    fn upload_success_sets_both_identifiers_together() {
        let id = Uuid::new_v4();
        let (next, _) = reduce(
            &stopped_state(id),
            Event::UploadOk {
                id,
                audio_filename: "a.mp3".to_string(),
                image_filename: "b.png".to_string(),
            },
        );
        match next {
            State::Uploaded {
                audio_filename,
                image_filename,
                submitting,
                ..
            } => {
                assert_eq!(audio_filename, "a.mp3");
                assert_eq!(image_filename, "b.png");
                assert!(!submitting);
            }
            other => panic!("expected Uploaded, got {:?}", other),
        }
    }

    #[test]
    fn upload_failure_stays_in_stopped_with_no_identifiers() {
        let id = Uuid::new_v4();
        let (next, _) = reduce(
            &stopped_state(id),
            Event::UploadFailed {
                id,
                err: "HTTP 500".to_string(),
            },
        );
        assert!(matches!(
            next,
            State::Stopped {
                upload_failed: true,
                ..
            }
        ));
    }

    #[test]
    fn start_from_stopped_begins_a_fresh_recording() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(&stopped_state(id), Event::StartPressed);
        assert!(matches!(
            next,
            State::Recording { recording_id, .. } if recording_id != id
        ));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartCapture { .. })));
    }

    #[test]
    fn start_from_uploaded_discards_the_orphaned_upload() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(&uploaded_state(id), Event::StartPressed);
        assert!(matches!(next, State::Recording { .. }));
        assert!(effects.iter().any(
            |e| matches!(e, Effect::DiscardUpload { audio_filename } if audio_filename == "a.mp3")
        ));
    }

    #[test]
    fn submit_outside_uploaded_is_a_noop() {
        for state in [State::Idle, stopped_state(Uuid::new_v4())] {
            let (next, effects) = reduce(&state, Event::SubmitPressed);
            assert_eq!(
                std::mem::discriminant(&next),
                std::mem::discriminant(&state)
            );
            assert!(effects.is_empty());
        }
    }

    #[test]
    fn submit_from_uploaded_sends_both_identifiers() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(&uploaded_state(id), Event::SubmitPressed);
        assert!(matches!(
            next,
            State::Uploaded {
                submitting: true,
                ..
            }
        ));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Submit {
                audio_filename,
                image_filename,
                ..
            } if audio_filename == "a.mp3" && image_filename == "b.png"
        )));
    }

    #[test]
    fn submit_while_in_flight_is_a_noop() {
        let id = Uuid::new_v4();
        let state = State::Uploaded {
            recording_id: id,
            audio_filename: "a.mp3".to_string(),
            image_filename: "b.png".to_string(),
            duration: Duration::from_millis(50),
            submitting: true,
            alert: None,
        };
        let (next, effects) = reduce(&state, Event::SubmitPressed);
        assert!(matches!(
            next,
            State::Uploaded {
                submitting: true,
                ..
            }
        ));
        assert!(effects.is_empty());
    }

    #[test]
    fn submit_success_is_terminal_and_repeat_submits_do_nothing() {
        let id = Uuid::new_v4();
        let (next, _) = reduce(
            &uploaded_state(id),
            Event::SubmitOk {
                id,
                message: "File submitted successfully".to_string(),
            },
        );
        assert!(matches!(next, State::Submitted { notice: Some(_) }));

        let (after, effects) = reduce(&next, Event::SubmitPressed);
        assert!(matches!(after, State::Submitted { .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn submit_failure_opens_the_alert_and_allows_retry() {
        let id = Uuid::new_v4();
        let (next, _) = reduce(
            &uploaded_state(id),
            Event::SubmitFailed {
                id,
                err: "Recording must be at least 30 seconds long".to_string(),
            },
        );
        match &next {
            State::Uploaded {
                submitting, alert, ..
            } => {
                assert!(!submitting);
                assert!(alert.is_some());
            }
            other => panic!("expected Uploaded, got {:?}", other),
        }

        // Retry is allowed after the failure
        let (_, effects) = reduce(&next, Event::SubmitPressed);
        assert!(effects.iter().any(|e| matches!(e, Effect::Submit { .. })));
    }

    #[test]
    fn dismiss_closes_the_active_dialog_only() {
        let id = Uuid::new_v4();
        let state = State::Uploaded {
            recording_id: id,
            audio_filename: "a.mp3".to_string(),
            image_filename: "b.png".to_string(),
            duration: Duration::from_millis(50),
            submitting: false,
            alert: Some("nope".to_string()),
        };
        let (next, _) = reduce(&state, Event::DismissDialog);
        assert!(matches!(next, State::Uploaded { alert: None, .. }));

        let (next, _) = reduce(
            &State::Submitted {
                notice: Some("done".to_string()),
            },
            Event::DismissDialog,
        );
        assert!(matches!(next, State::Submitted { notice: None }));

        let (next, effects) = reduce(&State::Idle, Event::DismissDialog);
        assert!(matches!(next, State::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn start_from_submitted_requires_reset_first() {
        let state = State::Submitted { notice: None };
        let (next, effects) = reduce(&state, Event::StartPressed);
        assert!(matches!(next, State::Submitted { .. }));
        assert!(effects.is_empty());

        let (next, _) = reduce(&state, Event::Reset);
        assert!(matches!(next, State::Idle));

        let (next, effects) = reduce(&next, Event::StartPressed);
        assert!(matches!(next, State::Recording { .. }));
        assert!(!effects.is_empty());
    }

    #[test]
    fn stale_completion_events_are_ignored() {
        let id = Uuid::new_v4();
        let stale = Uuid::new_v4();

        let (next, effects) = reduce(
            &stopped_state(id),
            Event::UploadOk {
                id: stale,
                audio_filename: "a.mp3".to_string(),
                image_filename: "b.png".to_string(),
            },
        );
        assert!(matches!(next, State::Stopped { .. }));
        assert!(effects.is_empty());

        let (next, effects) = reduce(
            &uploaded_state(id),
            Event::SubmitOk {
                id: stale,
                message: "done".to_string(),
            },
        );
        assert!(matches!(next, State::Uploaded { .. }));
        assert!(effects.is_empty());

        let (next, effects) = reduce(
            &recording_state(id),
            Event::CaptureStopped {
                id: stale,
                artifact: artifact(),
            },
        );
        assert!(matches!(next, State::Recording { .. }));
        assert!(effects.is_empty());
    }
}

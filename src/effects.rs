//! Effect runner for the recording session
//!
//! This module handles executing effects produced by the state machine:
//! capture start/stop, the elapsed-display ticker, and the upload/submit
//! round-trips. Completion events are sent back via the event channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api;
use crate::audio::{assemble_artifact, AudioRecorder, RecordingHandle};
use crate::settings::AppSettings;
use crate::state_machine::{Effect, Event};
use crate::ui::format_elapsed;

/// Display resolution of the elapsed ticker.
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

fn send_event(tx: mpsc::Sender<Event>, event: Event) {
    tokio::spawn(async move {
        let _ = tx.send(event).await;
    });
}

/// Real effect runner with CPAL audio capture and reqwest round-trips.
pub struct CaptureEffectRunner {
    recorder: Mutex<Option<AudioRecorder>>,
    // Guarded by a sync mutex so StartCapture can insert before the ticker's
    // first activity check; critical sections never hold it across an await.
    active: Arc<Mutex<HashMap<Uuid, RecordingHandle>>>,
    settings: Arc<AppSettings>,
}

impl CaptureEffectRunner {
    /// Create a new runner. Returns Ok even if the audio device isn't
    /// available - errors happen at record time (and the UI disables record).
    pub fn new(settings: Arc<AppSettings>) -> Arc<Self> {
        let recorder = match AudioRecorder::new() {
            Ok(r) => {
                tracing::info!("AudioRecorder initialized successfully");
                Some(r)
            }
            Err(e) => {
                tracing::warn!("AudioRecorder init failed (will retry on record): {}", e);
                None
            }
        };

        Arc::new(Self {
            recorder: Mutex::new(recorder),
            active: Arc::new(Mutex::new(HashMap::new())),
            settings,
        })
    }

    /// Whether a capture device was available at startup.
    pub fn device_available(&self) -> bool {
        self.recorder.lock().map(|r| r.is_some()).unwrap_or(false)
    }

    /// Start capture for `id` and register the handle. Runs synchronously so
    /// the handle is registered before any subsequent effect looks for it.
    fn start_capture(&self, id: Uuid) -> Result<(), String> {
        let mut recorder_guard = self
            .recorder
            .lock()
            .map_err(|_| "recorder lock poisoned".to_string())?;

        if recorder_guard.is_none() {
            // Retry creating the recorder
            match AudioRecorder::new() {
                Ok(r) => *recorder_guard = Some(r),
                Err(e) => return Err(e.to_string()),
            }
        }

        let handle = match recorder_guard.as_ref() {
            Some(recorder) => recorder.start().map_err(|e| e.to_string())?,
            None => return Err("audio recorder unavailable".to_string()),
        };

        match self.active.lock() {
            Ok(mut active) => {
                active.insert(id, handle);
                Ok(())
            }
            Err(_) => Err("active-recording map poisoned".to_string()),
        }
    }
}

impl EffectRunner for CaptureEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartCapture { id } => match self.start_capture(id) {
                Ok(()) => {
                    tracing::info!(recording_id = %id, "audio capture started");
                }
                Err(err) => {
                    // Silent failure per contract: log and let the session
                    // fall back to idle
                    tracing::error!("Failed to start audio capture: {}", err);
                    send_event(tx, Event::CaptureFailed { id, err });
                }
            },

            Effect::StartTicker { id } => {
                let active = self.active.clone();
                tokio::spawn(async move {
                    // Tick at display resolution while the recording is
                    // active; exiting on removal makes cancellation
                    // idempotent no matter how stop is reached
                    let mut interval = tokio::time::interval(TICK_INTERVAL);
                    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    loop {
                        interval.tick().await;
                        let is_active = match active.lock() {
                            Ok(guard) => guard.contains_key(&id),
                            Err(_) => false,
                        };
                        if !is_active {
                            tracing::debug!(recording_id = %id, "ticker stopping");
                            break;
                        }
                        if tx.send(Event::Tick { id }).await.is_err() {
                            tracing::debug!("ticker stopping - channel closed");
                            break;
                        }
                    }
                });
            }

            Effect::StopCapture { id } => {
                let handle = match self.active.lock() {
                    Ok(mut active) => active.remove(&id),
                    Err(_) => None,
                };

                let Some(handle) = handle else {
                    tracing::warn!(recording_id = %id, "StopCapture: no active handle");
                    send_event(
                        tx,
                        Event::CaptureFailed {
                            id,
                            err: "no active capture".to_string(),
                        },
                    );
                    return;
                };

                tokio::spawn(async move {
                    // Stopping joins the audio thread, so keep it off the
                    // async workers
                    let stopped = tokio::task::spawn_blocking(move || handle.stop()).await;

                    let captured = match stopped {
                        Ok(Ok(captured)) => captured,
                        Ok(Err(e)) => {
                            tracing::error!("Failed to stop audio capture: {}", e);
                            let _ = tx
                                .send(Event::CaptureFailed {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                            return;
                        }
                        Err(e) => {
                            tracing::error!("Capture stop task failed: {}", e);
                            let _ = tx
                                .send(Event::CaptureFailed {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                            return;
                        }
                    };

                    match assemble_artifact(&captured, Utc::now()) {
                        Ok(artifact) => {
                            tracing::info!(
                                filename = %artifact.filename,
                                bytes = artifact.bytes.len(),
                                "recording assembled"
                            );
                            let _ = tx.send(Event::CaptureStopped { id, artifact }).await;
                        }
                        Err(e) => {
                            tracing::error!("Failed to assemble recording: {}", e);
                            let _ = tx
                                .send(Event::CaptureFailed {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::Upload { id, artifact } => {
                let settings = self.settings.clone();
                tokio::spawn(async move {
                    let result = api::upload_recording(
                        &settings.server_url,
                        settings.request_timeout(),
                        artifact,
                    )
                    .await;

                    match result {
                        Ok(receipt) => {
                            let _ = tx
                                .send(Event::UploadOk {
                                    id,
                                    audio_filename: receipt.audio_filename,
                                    image_filename: receipt.image_filename,
                                })
                                .await;
                        }
                        Err(e) => {
                            // No retry; the user records again
                            tracing::error!("Upload failed: {}", e);
                            let _ = tx
                                .send(Event::UploadFailed {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::Submit {
                id,
                audio_filename,
                image_filename,
                duration,
            } => {
                let settings = self.settings.clone();
                tokio::spawn(async move {
                    // The recorded duration is carried to this point but not
                    // validated client-side; the server enforces its minimum
                    tracing::info!(
                        audio = %audio_filename,
                        image = %image_filename,
                        recorded = %format_elapsed(duration),
                        "submitting recording"
                    );

                    let result = api::submit_recording(
                        &settings.server_url,
                        settings.request_timeout(),
                        &audio_filename,
                        &image_filename,
                    )
                    .await;

                    match result {
                        Ok(message) => {
                            let _ = tx.send(Event::SubmitOk { id, message }).await;
                        }
                        Err(e) => {
                            tracing::error!("Submit failed: {}", e);
                            let _ = tx
                                .send(Event::SubmitFailed {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::DiscardUpload { audio_filename } => {
                let settings = self.settings.clone();
                tokio::spawn(async move {
                    // Best effort; the server also ages temp files out
                    match api::discard_upload(
                        &settings.server_url,
                        settings.request_timeout(),
                        &audio_filename,
                    )
                    .await
                    {
                        Ok(()) => {
                            tracing::debug!(filename = %audio_filename, "temp upload discarded");
                        }
                        Err(e) => {
                            tracing::warn!("Failed to discard temp upload {}: {}", audio_filename, e);
                        }
                    }
                });
            }

            Effect::EmitUi => {
                // Handled in the main loop, not here
                unreachable!("EmitUi should be handled in run_state_loop");
            }
        }
    }
}

/// Stub effect runner for tests: no device, no network. Failure injection
/// covers the upload and submit error paths.
pub struct StubEffectRunner {
    fail_upload: std::sync::atomic::AtomicBool,
    fail_submit: std::sync::atomic::AtomicBool,
}

impl StubEffectRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_upload: std::sync::atomic::AtomicBool::new(false),
            fail_submit: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn set_fail_upload(&self, fail: bool) {
        self.fail_upload
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_fail_submit(&self, fail: bool) {
        self.fail_submit
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

impl EffectRunner for StubEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        use std::sync::atomic::Ordering;

        match effect {
            Effect::StartCapture { id } => {
                tracing::info!("Stub: capture started for {}", id);
            }

            Effect::StartTicker { id } => {
                tokio::spawn(async move {
                    // A short burst is enough for tests; the reducer drops
                    // ticks once the recording ends
                    for _ in 0..100 {
                        tokio::time::sleep(TICK_INTERVAL).await;
                        if tx.send(Event::Tick { id }).await.is_err() {
                            break;
                        }
                    }
                });
            }

            Effect::StopCapture { id } => {
                tokio::spawn(async move {
                    let artifact = crate::audio::RecordingArtifact {
                        filename: "24-06-01_123456.mp3".to_string(),
                        bytes: vec![0u8; 44],
                    };
                    let _ = tx.send(Event::CaptureStopped { id, artifact }).await;
                });
            }

            Effect::Upload { id, .. } => {
                let fail = self.fail_upload.load(Ordering::SeqCst);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    if fail {
                        let _ = tx
                            .send(Event::UploadFailed {
                                id,
                                err: "Server error (500): Failed to save file properly"
                                    .to_string(),
                            })
                            .await;
                    } else {
                        let _ = tx
                            .send(Event::UploadOk {
                                id,
                                audio_filename: "a.mp3".to_string(),
                                image_filename: "b.png".to_string(),
                            })
                            .await;
                    }
                });
            }

            Effect::Submit { id, .. } => {
                let fail = self.fail_submit.load(Ordering::SeqCst);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    if fail {
                        let _ = tx
                            .send(Event::SubmitFailed {
                                id,
                                err: "Recording must be at least 30 seconds long".to_string(),
                            })
                            .await;
                    } else {
                        let _ = tx
                            .send(Event::SubmitOk {
                                id,
                                message: "File submitted successfully".to_string(),
                            })
                            .await;
                    }
                });
            }

            Effect::DiscardUpload { audio_filename } => {
                tracing::info!("Stub: would discard {}", audio_filename);
            }

            Effect::EmitUi => {
                unreachable!("EmitUi should be handled in run_state_loop");
            }
        }
    }
}

pub mod api;
pub mod audio;
pub mod effects;
pub mod settings;
pub mod state_machine;
pub mod ui;

use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use effects::{CaptureEffectRunner, EffectRunner};
use settings::AppSettings;
use state_machine::{reduce, Effect, Event, State};
use ui::UiSnapshot;

/// Run the main state loop: fold events through the reducer, execute the
/// resulting effects, and emit a UI snapshot whenever one is requested.
///
/// `device_available` reflects the startup capture probe; when false,
/// record requests fail silently at the edge (logged only) and the UI never
/// offers the control.
pub async fn run_state_loop(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
    ui_tx: mpsc::Sender<UiSnapshot>,
    device_available: bool,
    settings: Arc<AppSettings>,
) {
    let mut state = State::default();

    let emit = |state: &State| {
        ui::build_snapshot(state, device_available, &settings.server_url)
    };

    // Emit initial state
    if ui_tx.send(emit(&state)).await.is_err() {
        tracing::warn!("UI channel closed before the loop started");
    }
    tracing::info!("State loop started");

    while let Some(event) = rx.recv().await {
        tracing::debug!("Received event: {:?}", event);

        // Handle Exit at the edge
        if matches!(event, Event::Exit) {
            tracing::info!("Exit requested, shutting down state loop");
            break;
        }

        // No capture device: recording cannot start; log and move on
        if matches!(event, Event::StartPressed) && !device_available {
            tracing::warn!("record requested but no capture device is available");
            continue;
        }

        let old_discriminant = std::mem::discriminant(&state);
        let (next, effects) = reduce(&state, event);
        let new_discriminant = std::mem::discriminant(&next);

        // Log state transitions
        if old_discriminant != new_discriminant {
            tracing::info!("State transition: {:?} -> {:?}", state, next);
        }

        state = next;

        // Execute effects
        for eff in effects {
            match eff {
                Effect::EmitUi => {
                    if ui_tx.send(emit(&state)).await.is_err() {
                        tracing::warn!("Failed to emit snapshot: UI channel closed");
                    }
                }
                other => effect_runner.spawn(other, tx.clone()),
            }
        }
    }

    tracing::info!("State loop ended");
}

/// Read command lines from stdin and feed them to the state loop.
async fn run_input_loop(tx: mpsc::Sender<Event>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match ui::parse_command(&line) {
                Some(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                None => {
                    if !line.trim().is_empty() {
                        tracing::warn!("unknown command: {:?}", line.trim());
                    }
                }
            },
            // stdin closed: treat like quit
            Ok(None) => {
                let _ = tx.send(Event::Exit).await;
                break;
            }
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                let _ = tx.send(Event::Exit).await;
                break;
            }
        }
    }
}

/// Application entry point: wire the channels, probe the capture device,
/// and drive the session until exit.
pub async fn run() {
    let settings = Arc::new(settings::load_settings());
    tracing::info!(server_url = %settings.server_url, "voicebooth starting");

    let (tx, rx) = mpsc::channel::<Event>(32);
    let (ui_tx, mut ui_rx) = mpsc::channel::<UiSnapshot>(64);

    let effect_runner = CaptureEffectRunner::new(settings.clone());
    let device_available = effect_runner.device_available();
    if !device_available {
        tracing::warn!("no capture device; recording will be disabled");
    }

    // Renderer: one consumer owns the terminal
    tokio::spawn(async move {
        let mut last_phase = None;
        while let Some(snapshot) = ui_rx.recv().await {
            ui::render(&snapshot, &mut last_phase);
        }
    });

    tokio::spawn(run_input_loop(tx.clone()));

    run_state_loop(rx, tx, effect_runner, ui_tx, device_available, settings).await;
}

//! Audio capture module
//!
//! This module handles microphone input capture and artifact assembly.
//! Uses CPAL for audio capture and hound for WAV encoding.

pub mod artifact;
pub mod recorder;

pub use artifact::{artifact_filename, assemble_artifact, RecordingArtifact};
pub use recorder::{AudioError, AudioRecorder, CapturedAudio, RecordingHandle};

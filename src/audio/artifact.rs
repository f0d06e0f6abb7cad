//! Artifact assembly for finished recordings
//!
//! Turns a drained chunk buffer into the single upload payload: WAV-encoded
//! audio in memory plus a timestamp-derived filename.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use hound::{WavSpec, WavWriter};

use super::recorder::{AudioError, CapturedAudio};

/// A finished recording, ready for upload.
///
/// The name carries an `.mp3` suffix while the payload is PCM WAV. The server
/// contract names the field that way and sniffs the real container, so the
/// label is kept as-is rather than corrected.
#[derive(Clone)]
pub struct RecordingArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

// Hand-written so event logging prints the payload size, not the payload.
impl std::fmt::Debug for RecordingArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingArtifact")
            .field("filename", &self.filename)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Derive the artifact filename from a timestamp.
/// Two-digit year through seconds, colons stripped: `24-06-01_123456.mp3`.
pub fn artifact_filename(at: DateTime<Utc>) -> String {
    format!("{}.mp3", at.format("%y-%m-%d_%H%M%S"))
}

/// Encode the captured chunks into a single in-memory WAV artifact.
pub fn assemble_artifact(
    capture: &CapturedAudio,
    at: DateTime<Utc>,
) -> Result<RecordingArtifact, AudioError> {
    let spec = WavSpec {
        channels: capture.channels,
        sample_rate: capture.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| AudioError::WriteFailed(e.to_string()))?;
        for &sample in &capture.samples {
            writer
                .write_sample(sample)
                .map_err(|e| AudioError::WriteFailed(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| AudioError::WriteFailed(e.to_string()))?;
    }

    Ok(RecordingArtifact {
        filename: artifact_filename(at),
        bytes: cursor.into_inner(),
    })
}

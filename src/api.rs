//! HTTP client for the recording server
//!
//! Two round-trips: a multipart upload of the finished artifact
//! (`POST /upload-temp`) and a JSON confirmation of which artifacts to keep
//! (`POST /submit`). Re-recording over an un-submitted upload also fires a
//! best-effort `POST /delete-temp/<filename>`.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::audio::RecordingArtifact;

/// Global HTTP client for reuse across requests (avoids TLS handshake overhead)
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn http_client(timeout: Duration) -> &'static Client {
    HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new())
    })
}

/// Errors that can occur talking to the recording server
#[derive(Debug)]
pub enum ApiError {
    /// Network/transport error
    Network(String),
    /// Server returned a non-2xx status
    Server { status: u16, message: String },
    /// Failed to parse the server response
    Parse(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Network(e) => write!(f, "Network error: {}", e),
            ApiError::Server { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            ApiError::Parse(e) => write!(f, "Failed to parse server response: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

/// Successful `/upload-temp` response. The server also reports a
/// `wav_filename` for its own bookkeeping; only the two identifiers the
/// session tracks are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    pub audio_filename: String,
    pub image_filename: String,
}

/// Server error response
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct SubmitReply {
    message: String,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    audio_filename: &'a str,
    image_filename: &'a str,
}

fn endpoint(server_url: &str, path: &str) -> String {
    format!("{}{}", server_url.trim_end_matches('/'), path)
}

/// Playback URL for an uploaded audio artifact.
pub fn playback_url(server_url: &str, audio_filename: &str) -> String {
    endpoint(server_url, &format!("/temp/{}", audio_filename))
}

/// Spectrogram image URL for an uploaded artifact.
pub fn spectrogram_url(server_url: &str, image_filename: &str) -> String {
    endpoint(server_url, &format!("/spectrogram/{}", image_filename))
}

/// Extract the server's error message, falling back to the raw body.
fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        parsed.error
    } else {
        body.to_string()
    }
}

/// Upload a finished recording for temporary storage and spectrogram
/// generation.
pub async fn upload_recording(
    server_url: &str,
    timeout: Duration,
    artifact: RecordingArtifact,
) -> Result<UploadReceipt, ApiError> {
    tracing::info!(
        filename = %artifact.filename,
        bytes = artifact.bytes.len(),
        "uploading recording"
    );

    // The contract labels the field audio/mp3 even though the payload is PCM
    // WAV; the server sniffs the real container.
    let audio_part = Part::bytes(artifact.bytes)
        .file_name(artifact.filename)
        .mime_str("audio/mp3")
        .map_err(|e| ApiError::Parse(e.to_string()))?;

    let form = Form::new().part("audio", audio_part);

    let response = http_client(timeout)
        .post(endpoint(server_url, "/upload-temp"))
        .multipart(form)
        .send()
        .await
        .map_err(|e| ApiError::Network(e.to_string()))?;

    let status = response.status();

    if status.is_success() {
        let receipt: UploadReceipt = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        tracing::info!(
            audio = %receipt.audio_filename,
            image = %receipt.image_filename,
            "upload accepted"
        );

        Ok(receipt)
    } else {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);

        tracing::error!("upload rejected ({}): {}", status.as_u16(), message);

        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

/// Confirm which artifacts to keep. Returns the server's confirmation
/// message.
pub async fn submit_recording(
    server_url: &str,
    timeout: Duration,
    audio_filename: &str,
    image_filename: &str,
) -> Result<String, ApiError> {
    let response = http_client(timeout)
        .post(endpoint(server_url, "/submit"))
        .json(&SubmitRequest {
            audio_filename,
            image_filename,
        })
        .send()
        .await
        .map_err(|e| ApiError::Network(e.to_string()))?;

    let status = response.status();

    if status.is_success() {
        let reply: SubmitReply = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(reply.message)
    } else {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);

        tracing::error!("submit rejected ({}): {}", status.as_u16(), message);

        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

/// Ask the server to drop an orphaned temp upload.
pub async fn discard_upload(
    server_url: &str,
    timeout: Duration,
    audio_filename: &str,
) -> Result<(), ApiError> {
    let response = http_client(timeout)
        .post(endpoint(server_url, &format!("/delete-temp/{}", audio_filename)))
        .send()
        .await
        .map_err(|e| ApiError::Network(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Server {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }
}

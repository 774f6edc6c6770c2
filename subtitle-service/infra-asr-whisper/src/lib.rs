use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use subtitle_domain::{CallContext, DomainError, TranscriptionPort, TranscriptionRequest};

const TRANSCRIPTIONS_PATH: &str = "audio/transcriptions";

/// Speech-to-text over the Whisper transcription HTTP API.
pub struct WhisperTranscriptionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl WhisperTranscriptionClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        request_timeout: Duration,
    ) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| {
                DomainError::internal_error(&format!("failed to build transcription client: {err}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{TRANSCRIPTIONS_PATH}", self.base_url)
    }

    fn form(&self, request: TranscriptionRequest) -> Result<Form, DomainError> {
        let file = Part::bytes(request.audio)
            .file_name(request.file_name)
            .mime_str("application/octet-stream")
            .map_err(|err| DomainError::internal_error(&format!("invalid upload mime type: {err}")))?;

        Ok(Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", request.language.code())
            .text("response_format", request.format.code()))
    }
}

#[async_trait]
impl TranscriptionPort for WhisperTranscriptionClient {
    async fn transcribe(
        &self,
        ctx: &CallContext,
        request: TranscriptionRequest,
    ) -> Result<Vec<u8>, DomainError> {
        let file_name = request.file_name.clone();
        let audio_bytes = request.audio.len();
        let form = self.form(request)?;
        let call = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send();

        let subtitle = ctx
            .run("transcription request", async {
                let response = call.await.map_err(|err| {
                    DomainError::external_service_error(
                        "transcription",
                        &format!("request failed: {err}"),
                    )
                })?;
                let status = response.status();
                let body = response.bytes().await.map_err(|err| {
                    DomainError::external_service_error(
                        "transcription",
                        &format!("failed to read response body: {err}"),
                    )
                })?;
                if !status.is_success() {
                    return Err(map_api_error(status, &body));
                }
                Ok(body.to_vec())
            })
            .await?;

        tracing::debug!(
            file_name = %file_name,
            audio_bytes,
            subtitle_bytes = subtitle.len(),
            "transcription completed"
        );
        Ok(subtitle)
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn map_api_error(status: StatusCode, body: &[u8]) -> DomainError {
    let message = serde_json::from_slice::<ApiErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
    DomainError::external_service_error("transcription", &format!("HTTP {status}: {message}"))
}

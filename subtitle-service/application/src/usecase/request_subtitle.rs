use std::sync::Arc;

use subtitle_domain::{
    CallContext, ExtractedAudio, Language, SubtitleFormat, TranscriptionPort, TranscriptionRequest,
};

use crate::TranscriptionRequestError;

/// Language every transcription is requested in.
pub const TRANSCRIPTION_LANGUAGE: Language = Language::Portuguese;

/// Caption format every transcription is requested in.
pub const SUBTITLE_FORMAT: SubtitleFormat = SubtitleFormat::Srt;

pub struct TranscriptionRequester {
    transcriber: Arc<dyn TranscriptionPort>,
}

impl TranscriptionRequester {
    pub fn new(transcriber: Arc<dyn TranscriptionPort>) -> Self {
        Self { transcriber }
    }

    /// Sends the whole extracted audio in one request and returns the
    /// subtitle bytes.
    pub async fn transcribe(
        &self,
        ctx: &CallContext,
        audio: ExtractedAudio,
        file_name: &str,
    ) -> Result<Vec<u8>, TranscriptionRequestError> {
        tracing::debug!(
            file_name,
            audio_bytes = audio.len(),
            language = TRANSCRIPTION_LANGUAGE.code(),
            format = SUBTITLE_FORMAT.code(),
            "requesting transcription"
        );

        let request = TranscriptionRequest {
            file_name: file_name.to_string(),
            language: TRANSCRIPTION_LANGUAGE,
            format: SUBTITLE_FORMAT,
            audio: audio.into_bytes(),
        };
        self.transcriber
            .transcribe(ctx, request)
            .await
            .map_err(|source| TranscriptionRequestError {
                file_name: file_name.to_string(),
                source,
            })
    }
}

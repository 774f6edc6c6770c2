use async_trait::async_trait;

use subtitle_domain::{CallContext, SubtitleInput, MAX_INPUT_BYTES};

use crate::{PipelineError, StreamOrchestrator, TranscriptionRequester};

#[async_trait]
pub trait SubtitleUseCase: Send + Sync {
    async fn generate(
        &self,
        ctx: &CallContext,
        input: SubtitleInput,
    ) -> Result<Vec<u8>, PipelineError>;
}

/// Extraction followed by transcription. Holds no per-call state, so one
/// instance serves concurrent callers.
pub struct SubtitlePipeline {
    orchestrator: StreamOrchestrator,
    requester: TranscriptionRequester,
}

impl SubtitlePipeline {
    pub fn new(orchestrator: StreamOrchestrator, requester: TranscriptionRequester) -> Self {
        Self {
            orchestrator,
            requester,
        }
    }
}

#[async_trait]
impl SubtitleUseCase for SubtitlePipeline {
    async fn generate(
        &self,
        ctx: &CallContext,
        input: SubtitleInput,
    ) -> Result<Vec<u8>, PipelineError> {
        if input.data.len() > MAX_INPUT_BYTES {
            tracing::warn!(
                file_name = %input.file_name,
                input_bytes = input.data.len(),
                max_input_bytes = MAX_INPUT_BYTES,
                "input exceeds the transcription upload limit"
            );
        }

        tracing::debug!(
            file_name = %input.file_name,
            sample_rate = %input.sample_rate,
            language = input.language.code(),
            input_bytes = input.data.len(),
            "starting subtitle pipeline"
        );

        let audio = self
            .orchestrator
            .extract_audio(ctx, &input.data, &input.sample_rate)
            .await?;
        let subtitle = self
            .requester
            .transcribe(ctx, audio, &input.file_name)
            .await?;

        tracing::debug!(
            file_name = %input.file_name,
            subtitle_bytes = subtitle.len(),
            "subtitle pipeline completed"
        );

        Ok(subtitle)
    }
}

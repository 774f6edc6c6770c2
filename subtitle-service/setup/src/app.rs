use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Context, Error};
use subtitle_application::{
    StreamOrchestrator, SubtitlePipeline, SubtitleUseCase, TranscriptionRequester, SUBTITLE_FORMAT,
};
use subtitle_configuration::{AppConfig, GrpcEndpointConfig};
use subtitle_domain::{
    AudioExtractionPort, CallContext, CancelHandle, Language, SubtitleInput, TranscriptionPort,
};
use subtitle_infra_asr_whisper::WhisperTranscriptionClient;
use subtitle_infra_audio::{AudioChannelSettings, GrpcAudioExtraction};

/// One file to subtitle.
#[derive(Debug, Clone)]
pub struct SubtitleJob {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub sample_rate: String,
}

impl SubtitleJob {
    /// Explicit output path, or the input path with the subtitle extension.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input.with_extension(SUBTITLE_FORMAT.extension()))
    }
}

pub async fn build_and_run(config: AppConfig, job: SubtitleJob) -> Result<PathBuf, Error> {
    let app = Application::new(config).await?;
    app.run(job).await
}

pub struct Application {
    pub config: AppConfig,
    pub pipeline: Arc<dyn SubtitleUseCase>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self, Error> {
        let audio = &config.service.audio;
        tracing::info!(
            audio_endpoint = %audio.uri(),
            transcription_endpoint = %config.service.transcription.base_url,
            model = %config.service.transcription.model,
            "initializing subtitle application"
        );

        let extraction: Arc<dyn AudioExtractionPort> = Arc::new(
            GrpcAudioExtraction::connect(&audio.uri(), channel_settings(audio))
                .await
                .map_err(|err| anyhow!("failed to connect to audio service: {err}"))?,
        );

        let transcription_config = &config.service.transcription;
        if transcription_config.api_key.is_empty() {
            tracing::warn!("transcription api key is empty; requests will likely be rejected");
        }
        let transcription: Arc<dyn TranscriptionPort> = Arc::new(
            WhisperTranscriptionClient::new(
                &transcription_config.base_url,
                &transcription_config.api_key,
                &transcription_config.model,
                Duration::from_millis(transcription_config.request_timeout_ms.max(1)),
            )
            .map_err(|err| anyhow!("failed to build transcription client: {err}"))?,
        );

        Ok(Self::with_ports(config, extraction, transcription))
    }

    pub fn with_ports(
        config: AppConfig,
        extraction: Arc<dyn AudioExtractionPort>,
        transcription: Arc<dyn TranscriptionPort>,
    ) -> Self {
        let chunk_size = config.service.pipeline.chunk_size_bytes;
        let pipeline: Arc<dyn SubtitleUseCase> = Arc::new(SubtitlePipeline::new(
            StreamOrchestrator::new(extraction, chunk_size),
            TranscriptionRequester::new(transcription),
        ));
        Self { config, pipeline }
    }

    /// Context for one call, bounded by the configured pipeline deadline.
    pub fn call_context(&self) -> (CallContext, CancelHandle) {
        let ctx = match self.config.service.pipeline.deadline_ms {
            Some(deadline_ms) => CallContext::background().with_timeout(Duration::from_millis(deadline_ms)),
            None => CallContext::background(),
        };
        ctx.cancellable()
    }

    pub async fn run(&self, job: SubtitleJob) -> Result<PathBuf, Error> {
        let (ctx, cancel) = self.call_context();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling subtitle generation");
                cancel.cancel();
            }
        });

        let result = self.generate_file(&ctx, &job).await;
        interrupt.abort();
        result
    }

    pub async fn generate_file(&self, ctx: &CallContext, job: &SubtitleJob) -> Result<PathBuf, Error> {
        let data = tokio::fs::read(&job.input)
            .await
            .with_context(|| format!("failed to read `{}`", job.input.display()))?;
        let input = SubtitleInput {
            file_name: file_name(&job.input),
            sample_rate: job.sample_rate.clone(),
            language: Language::default(),
            data,
        };

        let subtitle = self.pipeline.generate(ctx, input).await.map_err(|err| {
            let stage = err.stage();
            Error::new(err).context(format!("subtitle {stage} stage failed"))
        })?;

        let output = job.output_path();
        tokio::fs::write(&output, &subtitle)
            .await
            .with_context(|| format!("failed to write `{}`", output.display()))?;
        tracing::info!(
            input = %job.input.display(),
            output = %output.display(),
            subtitle_bytes = subtitle.len(),
            "subtitle written"
        );
        Ok(output)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn channel_settings(config: &GrpcEndpointConfig) -> AudioChannelSettings {
    AudioChannelSettings {
        connect_timeout: Duration::from_millis(config.connect_timeout_ms.max(1)),
        request_timeout: Duration::from_millis(config.request_timeout_ms.max(1)),
        max_decoding_message_bytes: config.max_decoding_message_bytes,
        max_encoding_message_bytes: config.max_encoding_message_bytes,
    }
}

mod extract_audio;
mod generate_subtitle;
mod request_subtitle;

pub use extract_audio::StreamOrchestrator;
pub use generate_subtitle::{SubtitlePipeline, SubtitleUseCase};
pub use request_subtitle::{TranscriptionRequester, SUBTITLE_FORMAT, TRANSCRIPTION_LANGUAGE};

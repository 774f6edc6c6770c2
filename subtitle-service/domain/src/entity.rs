/// Size of each video chunk pushed through the extraction stream.
pub const VIDEO_CHUNK_SIZE_BYTES: i64 = 3 * 1024 * 1024;

/// Upper bound the transcription backend accepts for one upload. Not enforced
/// here; the pipeline only warns when an input goes past it.
pub const MAX_INPUT_BYTES: usize = 25 * 1024 * 1024;

/// Transcription language. Only Portuguese is recognized for now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    Portuguese,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Portuguese => "pt",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubtitleFormat {
    #[default]
    Srt,
}

impl SubtitleFormat {
    pub fn code(&self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.code()
    }
}

#[derive(Debug, Clone)]
pub struct SubtitleInput {
    pub file_name: String,
    pub sample_rate: String,
    pub language: Language,
    pub data: Vec<u8>,
}

/// One outbound frame of an extraction session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFrame {
    Metadata { sample_rate: String },
    Data(Vec<u8>),
}

/// Audio bytes accumulated from the extraction stream, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedAudio {
    pub data: Vec<u8>,
}

impl ExtractedAudio {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub file_name: String,
    pub language: Language,
    pub format: SubtitleFormat,
    pub audio: Vec<u8>,
}

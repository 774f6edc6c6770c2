use std::fmt;

use subtitle_domain::{ChunkingError, DomainError};
use thiserror::Error;

use crate::SessionState;

/// Outbound frame an extraction send failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRef {
    Metadata,
    Chunk(usize),
}

impl fmt::Display for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRef::Metadata => write!(f, "sample rate metadata"),
            FrameRef::Chunk(index) => write!(f, "video chunk {index}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("could not split data into chunks: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("could not open extraction stream: {0}")]
    StreamOpen(#[source] DomainError),

    #[error("could not send {frame}: {source}")]
    StreamSend {
        frame: FrameRef,
        #[source]
        source: DomainError,
    },

    #[error("could not close extraction stream: {0}")]
    StreamClose(#[source] DomainError),

    #[error("could not receive audio frame {frame_index}: {source}")]
    StreamReceive {
        frame_index: usize,
        #[source]
        source: DomainError,
    },

    #[error("invalid extraction stream transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

#[derive(Debug, Error)]
#[error("could not transcribe `{file_name}`: {source}")]
pub struct TranscriptionRequestError {
    pub file_name: String,
    #[source]
    pub source: DomainError,
}

/// Pipeline step a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Transcription,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extraction => write!(f, "extraction"),
            Stage::Transcription => write!(f, "transcription"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not extract audio: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("could not generate subtitle: {0}")]
    Transcription(#[from] TranscriptionRequestError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Extraction(_) => Stage::Extraction,
            PipelineError::Transcription(_) => Stage::Transcription,
        }
    }

    /// Underlying collaborator failure, if the error came from one.
    pub fn domain_error(&self) -> Option<&DomainError> {
        match self {
            PipelineError::Extraction(error) => match error {
                ExtractionError::StreamOpen(source)
                | ExtractionError::StreamClose(source)
                | ExtractionError::StreamSend { source, .. }
                | ExtractionError::StreamReceive { source, .. } => Some(source),
                ExtractionError::Chunking(_) | ExtractionError::InvalidTransition { .. } => None,
            },
            PipelineError::Transcription(error) => Some(&error.source),
        }
    }
}

use async_trait::async_trait;

use crate::{CallContext, DomainError, ExtractionFrame, TranscriptionRequest};

/// Opens bidirectional sessions against the audio-extraction service.
#[async_trait]
pub trait AudioExtractionPort: Send + Sync {
    async fn open(&self, ctx: &CallContext) -> Result<Box<dyn ExtractionStream>, DomainError>;
}

/// One open extraction session. Owned by a single call.
#[async_trait]
pub trait ExtractionStream: Send {
    async fn send(&mut self, ctx: &CallContext, frame: ExtractionFrame) -> Result<(), DomainError>;

    /// Signals that no more frames will be sent.
    async fn close_send(&mut self, ctx: &CallContext) -> Result<(), DomainError>;

    /// Next response payload, or `None` once the service ended the stream.
    async fn recv(&mut self, ctx: &CallContext) -> Result<Option<Vec<u8>>, DomainError>;
}

#[async_trait]
pub trait TranscriptionPort: Send + Sync {
    async fn transcribe(
        &self,
        ctx: &CallContext,
        request: TranscriptionRequest,
    ) -> Result<Vec<u8>, DomainError>;
}

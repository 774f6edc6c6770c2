use std::sync::Arc;

use subtitle_domain::{chunk, AudioExtractionPort, CallContext, ExtractedAudio};

use crate::{ExtractionError, StreamSession};

/// Pushes a media payload through the audio-extraction stream and collects
/// the audio it sends back.
pub struct StreamOrchestrator {
    extractor: Arc<dyn AudioExtractionPort>,
    chunk_size: i64,
}

impl StreamOrchestrator {
    pub fn new(extractor: Arc<dyn AudioExtractionPort>, chunk_size: i64) -> Self {
        Self {
            extractor,
            chunk_size,
        }
    }

    pub async fn extract_audio(
        &self,
        ctx: &CallContext,
        data: &[u8],
        sample_rate: &str,
    ) -> Result<ExtractedAudio, ExtractionError> {
        let chunks = chunk::split(data, self.chunk_size)?;

        let mut session = StreamSession::new();
        session.open(ctx, self.extractor.as_ref()).await?;

        tracing::debug!(
            session_id = %session.id(),
            input_bytes = data.len(),
            chunk_count = chunks.len(),
            chunk_size = self.chunk_size,
            sample_rate,
            "sending video to extraction stream"
        );

        // Sample rate travels once, ahead of the video data.
        session.send_metadata(ctx, sample_rate).await?;
        for chunk in chunks {
            session.send_chunk(ctx, chunk).await?;
        }
        session.close_send(ctx).await?;

        session.drain(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use subtitle_domain::{
        AudioExtractionPort, CallContext, DomainError, ExtractionFrame, ExtractionStream,
    };

    use super::StreamOrchestrator;
    use crate::ExtractionError;

    #[derive(Default)]
    struct RecordingPort {
        opened: AtomicUsize,
        frames: Arc<Mutex<Vec<ExtractionFrame>>>,
        replies: Vec<Vec<u8>>,
        hang_on_recv: bool,
    }

    struct RecordingStream {
        frames: Arc<Mutex<Vec<ExtractionFrame>>>,
        replies: Vec<Vec<u8>>,
        hang_on_recv: bool,
    }

    #[async_trait]
    impl AudioExtractionPort for RecordingPort {
        async fn open(&self, _ctx: &CallContext) -> Result<Box<dyn ExtractionStream>, DomainError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingStream {
                frames: self.frames.clone(),
                replies: self.replies.clone(),
                hang_on_recv: self.hang_on_recv,
            }))
        }
    }

    #[async_trait]
    impl ExtractionStream for RecordingStream {
        async fn send(
            &mut self,
            ctx: &CallContext,
            frame: ExtractionFrame,
        ) -> Result<(), DomainError> {
            let frames = self.frames.clone();
            ctx.run("send", async move {
                frames.lock().expect("lock").push(frame);
                Ok(())
            })
            .await
        }

        async fn close_send(&mut self, _ctx: &CallContext) -> Result<(), DomainError> {
            Ok(())
        }

        async fn recv(&mut self, ctx: &CallContext) -> Result<Option<Vec<u8>>, DomainError> {
            if self.hang_on_recv {
                return ctx.run("recv", std::future::pending()).await;
            }
            if self.replies.is_empty() {
                return Ok(None);
            }
            Ok(Some(self.replies.remove(0)))
        }
    }

    #[tokio::test]
    async fn metadata_goes_first_then_chunks_in_order() {
        let port = Arc::new(RecordingPort {
            replies: vec![b"AA".to_vec(), b"BB".to_vec()],
            ..RecordingPort::default()
        });
        let orchestrator = StreamOrchestrator::new(port.clone(), 4);

        let audio = orchestrator
            .extract_audio(&CallContext::background(), b"0123456789", "48000")
            .await
            .expect("extraction succeeds");

        assert_eq!(audio.data, b"AABB".to_vec());
        let frames = port.frames.lock().expect("lock").clone();
        assert_eq!(
            frames,
            vec![
                ExtractionFrame::Metadata {
                    sample_rate: "48000".to_string()
                },
                ExtractionFrame::Data(b"0123".to_vec()),
                ExtractionFrame::Data(b"4567".to_vec()),
                ExtractionFrame::Data(b"89".to_vec()),
            ]
        );
        let metadata_frames = frames
            .iter()
            .filter(|frame| matches!(frame, ExtractionFrame::Metadata { .. }))
            .count();
        assert_eq!(metadata_frames, 1);
    }

    #[tokio::test]
    async fn invalid_chunk_size_fails_before_opening_stream() {
        let port = Arc::new(RecordingPort::default());
        let orchestrator = StreamOrchestrator::new(port.clone(), 0);

        let error = orchestrator
            .extract_audio(&CallContext::background(), b"data", "16000")
            .await
            .expect_err("chunking fails");

        assert!(matches!(error, ExtractionError::Chunking(_)));
        assert_eq!(port.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_payload_still_sends_metadata() {
        let port = Arc::new(RecordingPort::default());
        let orchestrator = StreamOrchestrator::new(port.clone(), 8);

        let audio = orchestrator
            .extract_audio(&CallContext::background(), &[], "16000")
            .await
            .expect("extraction succeeds");

        assert!(audio.is_empty());
        assert_eq!(port.frames.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn expired_context_aborts_drain() {
        let port = Arc::new(RecordingPort {
            hang_on_recv: true,
            ..RecordingPort::default()
        });
        let orchestrator = StreamOrchestrator::new(port, 8);
        let ctx = CallContext::background().with_timeout(std::time::Duration::from_millis(20));

        let error = orchestrator
            .extract_audio(&ctx, b"payload", "16000")
            .await
            .expect_err("deadline hits");

        match error {
            ExtractionError::StreamReceive { source, .. } => {
                assert_eq!(source, DomainError::deadline_exceeded("recv"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

use std::mem;

use subtitle_domain::{
    AudioExtractionPort, CallContext, ExtractedAudio, ExtractionFrame, ExtractionStream,
};
use uuid::Uuid;

use crate::{ExtractionError, FrameRef};

/// Progress of one bidirectional extraction exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opened,
    MetadataSent,
    /// Number of chunk frames sent so far.
    Sending(usize),
    SendClosed,
    Draining,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    fn allows(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (*self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Opened) => true,
            (Opened, MetadataSent) => true,
            (MetadataSent, Sending(1)) => true,
            (Sending(sent), Sending(total)) => total == sent + 1,
            (MetadataSent | Sending(_), SendClosed) => true,
            (SendClosed, Draining) => true,
            (Draining, Completed) => true,
            _ => false,
        }
    }
}

/// Extraction exchange driven one step at a time.
///
/// Each step checks the transition it is about to make, so out-of-order use
/// (a chunk before the metadata frame, a send after close) is refused and
/// leaves the session `Failed`. Any collaborator failure does the same.
pub struct StreamSession {
    id: Uuid,
    state: SessionState,
    stream: Option<Box<dyn ExtractionStream>>,
    audio: Vec<u8>,
    frames_received: usize,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            stream: None,
            audio: Vec::new(),
            frames_received: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub async fn open(
        &mut self,
        ctx: &CallContext,
        port: &dyn AudioExtractionPort,
    ) -> Result<(), ExtractionError> {
        self.ensure(SessionState::Opened)?;
        match port.open(ctx).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = SessionState::Opened;
                tracing::debug!(session_id = %self.id, "extraction stream opened");
                Ok(())
            }
            Err(error) => Err(self.fail(ExtractionError::StreamOpen(error))),
        }
    }

    pub async fn send_metadata(
        &mut self,
        ctx: &CallContext,
        sample_rate: &str,
    ) -> Result<(), ExtractionError> {
        self.ensure(SessionState::MetadataSent)?;
        let frame = ExtractionFrame::Metadata {
            sample_rate: sample_rate.to_string(),
        };
        let result = self.stream_mut()?.send(ctx, frame).await;
        match result {
            Ok(()) => {
                self.state = SessionState::MetadataSent;
                Ok(())
            }
            Err(source) => Err(self.fail(ExtractionError::StreamSend {
                frame: FrameRef::Metadata,
                source,
            })),
        }
    }

    pub async fn send_chunk(
        &mut self,
        ctx: &CallContext,
        chunk: &[u8],
    ) -> Result<(), ExtractionError> {
        let index = match self.state {
            SessionState::Sending(sent) => sent,
            _ => 0,
        };
        let next = SessionState::Sending(index + 1);
        self.ensure(next)?;
        let result = self
            .stream_mut()?
            .send(ctx, ExtractionFrame::Data(chunk.to_vec()))
            .await;
        match result {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(source) => Err(self.fail(ExtractionError::StreamSend {
                frame: FrameRef::Chunk(index),
                source,
            })),
        }
    }

    pub async fn close_send(&mut self, ctx: &CallContext) -> Result<(), ExtractionError> {
        self.ensure(SessionState::SendClosed)?;
        let result = self.stream_mut()?.close_send(ctx).await;
        match result {
            Ok(()) => {
                tracing::debug!(session_id = %self.id, state = ?self.state, "extraction send side closed");
                self.state = SessionState::SendClosed;
                Ok(())
            }
            Err(source) => Err(self.fail(ExtractionError::StreamClose(source))),
        }
    }

    /// Receives until the service ends the stream and returns everything
    /// received, in arrival order.
    pub async fn drain(&mut self, ctx: &CallContext) -> Result<ExtractedAudio, ExtractionError> {
        self.ensure(SessionState::Draining)?;
        self.state = SessionState::Draining;

        loop {
            let result = self.stream_mut()?.recv(ctx).await;
            match result {
                Ok(Some(payload)) => {
                    self.frames_received += 1;
                    self.audio.extend_from_slice(&payload);
                }
                Ok(None) => break,
                Err(source) => {
                    let frame_index = self.frames_received;
                    return Err(self.fail(ExtractionError::StreamReceive {
                        frame_index,
                        source,
                    }));
                }
            }
        }

        self.ensure(SessionState::Completed)?;
        self.state = SessionState::Completed;
        self.stream = None;
        tracing::debug!(
            session_id = %self.id,
            frames_received = self.frames_received,
            audio_bytes = self.audio.len(),
            "extraction stream drained"
        );

        Ok(ExtractedAudio {
            data: mem::take(&mut self.audio),
        })
    }

    fn ensure(&mut self, next: SessionState) -> Result<(), ExtractionError> {
        if self.state.allows(next) {
            return Ok(());
        }
        let from = self.state;
        Err(self.fail(ExtractionError::InvalidTransition { from, to: next }))
    }

    fn stream_mut(&mut self) -> Result<&mut Box<dyn ExtractionStream>, ExtractionError> {
        let from = self.state;
        self.stream
            .as_mut()
            .ok_or(ExtractionError::InvalidTransition {
                from,
                to: SessionState::Opened,
            })
    }

    fn fail(&mut self, error: ExtractionError) -> ExtractionError {
        if !self.state.is_terminal() {
            tracing::debug!(session_id = %self.id, state = ?self.state, error = %error, "extraction stream failed");
            self.state = SessionState::Failed;
            self.stream = None;
            self.audio.clear();
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use subtitle_domain::{
        AudioExtractionPort, CallContext, DomainError, ExtractionFrame, ExtractionStream,
    };

    use super::{SessionState, StreamSession};
    use crate::{ExtractionError, FrameRef};

    #[derive(Default)]
    struct ScriptedStream {
        sent: Arc<Mutex<Vec<ExtractionFrame>>>,
        replies: Vec<Result<Option<Vec<u8>>, DomainError>>,
        fail_close: bool,
        /// Zero-based index of the data frame whose send is refused.
        fail_data_at: Option<usize>,
        data_sent: usize,
    }

    #[async_trait]
    impl ExtractionStream for ScriptedStream {
        async fn send(
            &mut self,
            _ctx: &CallContext,
            frame: ExtractionFrame,
        ) -> Result<(), DomainError> {
            if let ExtractionFrame::Data(_) = frame {
                if self.fail_data_at == Some(self.data_sent) {
                    return Err(DomainError::internal_error("boom"));
                }
                self.data_sent += 1;
            }
            self.sent.lock().expect("lock").push(frame);
            Ok(())
        }

        async fn close_send(&mut self, _ctx: &CallContext) -> Result<(), DomainError> {
            if self.fail_close {
                return Err(DomainError::external_service_error("audio", "close refused"));
            }
            Ok(())
        }

        async fn recv(&mut self, _ctx: &CallContext) -> Result<Option<Vec<u8>>, DomainError> {
            if self.replies.is_empty() {
                return Ok(None);
            }
            self.replies.remove(0)
        }
    }

    struct SinglePort(Mutex<Option<ScriptedStream>>);

    impl SinglePort {
        fn new(stream: ScriptedStream) -> Self {
            Self(Mutex::new(Some(stream)))
        }
    }

    #[async_trait]
    impl AudioExtractionPort for SinglePort {
        async fn open(&self, _ctx: &CallContext) -> Result<Box<dyn ExtractionStream>, DomainError> {
            let stream = self
                .0
                .lock()
                .expect("lock")
                .take()
                .ok_or_else(|| DomainError::internal_error("stream already taken"))?;
            Ok(Box::new(stream))
        }
    }

    #[tokio::test]
    async fn full_exchange_walks_every_state() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let port = SinglePort::new(ScriptedStream {
            sent: sent.clone(),
            replies: vec![Ok(Some(b"AA".to_vec())), Ok(Some(b"BB".to_vec()))],
            ..ScriptedStream::default()
        });
        let ctx = CallContext::background();
        let mut session = StreamSession::new();
        assert_eq!(session.state(), SessionState::Idle);

        session.open(&ctx, &port).await.expect("open");
        assert_eq!(session.state(), SessionState::Opened);
        session.send_metadata(&ctx, "44100").await.expect("metadata");
        session.send_chunk(&ctx, b"x").await.expect("chunk 0");
        session.send_chunk(&ctx, b"y").await.expect("chunk 1");
        assert_eq!(session.state(), SessionState::Sending(2));
        session.close_send(&ctx).await.expect("close");
        let audio = session.drain(&ctx).await.expect("drain");

        assert_eq!(audio.data, b"AABB".to_vec());
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(sent.lock().expect("lock").len(), 3);
    }

    #[tokio::test]
    async fn chunk_before_metadata_is_refused() {
        let port = SinglePort::new(ScriptedStream::default());
        let ctx = CallContext::background();
        let mut session = StreamSession::new();
        session.open(&ctx, &port).await.expect("open");

        let error = session.send_chunk(&ctx, b"x").await.expect_err("refused");

        assert!(matches!(
            error,
            ExtractionError::InvalidTransition {
                from: SessionState::Opened,
                to: SessionState::Sending(1)
            }
        ));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn metadata_cannot_be_sent_twice() {
        let port = SinglePort::new(ScriptedStream::default());
        let ctx = CallContext::background();
        let mut session = StreamSession::new();
        session.open(&ctx, &port).await.expect("open");
        session.send_metadata(&ctx, "16000").await.expect("metadata");

        let error = session
            .send_metadata(&ctx, "16000")
            .await
            .expect_err("second metadata refused");
        assert!(matches!(error, ExtractionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn send_after_close_is_refused() {
        let port = SinglePort::new(ScriptedStream::default());
        let ctx = CallContext::background();
        let mut session = StreamSession::new();
        session.open(&ctx, &port).await.expect("open");
        session.send_metadata(&ctx, "16000").await.expect("metadata");
        session.close_send(&ctx).await.expect("close");

        let error = session.send_chunk(&ctx, b"late").await.expect_err("refused");
        assert!(matches!(
            error,
            ExtractionError::InvalidTransition {
                from: SessionState::SendClosed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn close_failure_is_returned_and_fails_session() {
        let port = SinglePort::new(ScriptedStream {
            fail_close: true,
            ..ScriptedStream::default()
        });
        let ctx = CallContext::background();
        let mut session = StreamSession::new();
        session.open(&ctx, &port).await.expect("open");
        session.send_metadata(&ctx, "16000").await.expect("metadata");

        let error = session.close_send(&ctx).await.expect_err("close fails");

        assert!(matches!(error, ExtractionError::StreamClose(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(matches!(
            session.drain(&ctx).await,
            Err(ExtractionError::InvalidTransition {
                from: SessionState::Failed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn receive_failure_reports_frame_index() {
        let port = SinglePort::new(ScriptedStream {
            replies: vec![
                Ok(Some(b"AA".to_vec())),
                Err(DomainError::external_service_error("audio", "stream reset")),
            ],
            ..ScriptedStream::default()
        });
        let ctx = CallContext::background();
        let mut session = StreamSession::new();
        session.open(&ctx, &port).await.expect("open");
        session.send_metadata(&ctx, "16000").await.expect("metadata");
        session.close_send(&ctx).await.expect("close");

        let error = session.drain(&ctx).await.expect_err("recv fails");
        assert!(matches!(
            error,
            ExtractionError::StreamReceive { frame_index: 1, .. }
        ));
    }

    #[tokio::test]
    async fn send_failure_on_data_chunk_reports_its_index() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let port = SinglePort::new(ScriptedStream {
            sent: sent.clone(),
            fail_data_at: Some(2),
            ..ScriptedStream::default()
        });
        let ctx = CallContext::background();
        let mut session = StreamSession::new();
        session.open(&ctx, &port).await.expect("open");
        session.send_metadata(&ctx, "16000").await.expect("metadata");

        let mut outcome = Ok(());
        for chunk in subtitle_domain::chunk::split(b"abcdefgh", 2).expect("split") {
            outcome = session.send_chunk(&ctx, chunk).await;
            if outcome.is_err() {
                break;
            }
        }

        let error = outcome.expect_err("third chunk refused");
        assert!(matches!(
            error,
            ExtractionError::StreamSend {
                frame: FrameRef::Chunk(2),
                source: DomainError::Internal { .. },
            }
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(sent.lock().expect("lock").len(), 3);
    }

    #[tokio::test]
    async fn send_failure_on_metadata_is_tagged() {
        struct BrokenStream;

        #[async_trait]
        impl ExtractionStream for BrokenStream {
            async fn send(
                &mut self,
                _ctx: &CallContext,
                _frame: ExtractionFrame,
            ) -> Result<(), DomainError> {
                Err(DomainError::external_service_error("audio", "unavailable"))
            }

            async fn close_send(&mut self, _ctx: &CallContext) -> Result<(), DomainError> {
                Ok(())
            }

            async fn recv(
                &mut self,
                _ctx: &CallContext,
            ) -> Result<Option<Vec<u8>>, DomainError> {
                Ok(None)
            }
        }

        struct BrokenPort;

        #[async_trait]
        impl AudioExtractionPort for BrokenPort {
            async fn open(
                &self,
                _ctx: &CallContext,
            ) -> Result<Box<dyn ExtractionStream>, DomainError> {
                Ok(Box::new(BrokenStream))
            }
        }

        let ctx = CallContext::background();
        let mut session = StreamSession::new();
        session.open(&ctx, &BrokenPort).await.expect("open");
        let error = session.send_metadata(&ctx, "16000").await.expect_err("send fails");

        assert!(matches!(
            error,
            ExtractionError::StreamSend {
                frame: FrameRef::Metadata,
                ..
            }
        ));
    }
}

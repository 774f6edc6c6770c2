use std::time::Duration;

use async_trait::async_trait;
use audiostripper_grpc::{pb, AudioStripperClient};
use futures::channel::mpsc;
use futures::SinkExt;
use subtitle_domain::{
    AudioExtractionPort, CallContext, DomainError, ExtractionFrame, ExtractionStream,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Response, Status, Streaming};

type ExtractCall = JoinHandle<Result<Response<Streaming<pb::AudioData>>, Status>>;

/// Channel limits for the audio-extraction client.
#[derive(Debug, Clone, Copy)]
pub struct AudioChannelSettings {
    pub connect_timeout: Duration,
    /// Budget for one whole extraction session, from open to end of stream.
    pub request_timeout: Duration,
    pub max_decoding_message_bytes: usize,
    pub max_encoding_message_bytes: usize,
}

pub struct GrpcAudioExtraction {
    client: AudioStripperClient<Channel>,
    request_timeout: Duration,
}

impl GrpcAudioExtraction {
    pub fn new(client: AudioStripperClient<Channel>, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Dials the extraction service once and applies the message limits.
    pub async fn connect(
        endpoint_uri: &str,
        settings: AudioChannelSettings,
    ) -> Result<Self, DomainError> {
        let channel = Endpoint::from_shared(endpoint_uri.to_string())
            .map_err(|err| DomainError::internal_error(&format!("invalid audio endpoint: {err}")))?
            .connect_timeout(settings.connect_timeout)
            .tcp_nodelay(true)
            .connect()
            .await
            .map_err(|err| {
                DomainError::external_service_error(
                    "audio",
                    &format!("cannot reach {endpoint_uri}: {err}"),
                )
            })?;
        tracing::debug!(
            endpoint = endpoint_uri,
            request_timeout_ms = settings.request_timeout.as_millis() as u64,
            "audio extraction channel ready"
        );

        let client = AudioStripperClient::new(channel)
            .max_decoding_message_size(settings.max_decoding_message_bytes)
            .max_encoding_message_size(settings.max_encoding_message_bytes);
        Ok(Self::new(client, settings.request_timeout))
    }
}

#[async_trait]
impl AudioExtractionPort for GrpcAudioExtraction {
    async fn open(&self, ctx: &CallContext) -> Result<Box<dyn ExtractionStream>, DomainError> {
        let deadline = Instant::now() + self.request_timeout;
        let ctx = ctx.clone().with_deadline(deadline);
        let client = self.client.clone();

        ctx.run("open extraction stream", async move {
            // One slot: a frame is handed to the transport before the next is built.
            let (outbound, requests) = mpsc::channel::<pb::VideoData>(0);
            let mut client = client;
            // Response headers may only arrive once the upload is done, so the
            // call runs beside the sends instead of being awaited here.
            let call = tokio::spawn(async move { client.extract_audio(Request::new(requests)).await });

            Ok(Box::new(GrpcExtractionStream {
                outbound: Some(outbound),
                call: Some(call),
                inbound: None,
                deadline,
            }) as Box<dyn ExtractionStream>)
        })
        .await
    }
}

struct GrpcExtractionStream {
    outbound: Option<mpsc::Sender<pb::VideoData>>,
    call: Option<ExtractCall>,
    inbound: Option<Streaming<pb::AudioData>>,
    deadline: Instant,
}

impl GrpcExtractionStream {
    /// Waits for the call to be accepted and returns its response stream.
    async fn inbound(
        &mut self,
        ctx: &CallContext,
    ) -> Result<&mut Streaming<pb::AudioData>, DomainError> {
        if self.inbound.is_none() {
            let call = self
                .call
                .as_mut()
                .ok_or_else(|| DomainError::internal_error("extraction call already settled"))?;
            let settled = ctx
                .run("open extraction stream", async {
                    call.await.map_err(|err| {
                        DomainError::internal_error(&format!("extraction call task failed: {err}"))
                    })
                })
                .await;
            // An interrupted wait leaves the task running; anything else means
            // the handle is spent and must not be polled again.
            if !matches!(&settled, Err(error) if error.is_interrupted()) {
                self.call = None;
            }
            let response = settled?.map_err(map_status)?;
            self.inbound = Some(response.into_inner());
        }

        self.inbound
            .as_mut()
            .ok_or_else(|| DomainError::internal_error("extraction response stream missing"))
    }

    /// Explains why the server stopped taking frames.
    async fn rejection(&mut self, ctx: &CallContext) -> DomainError {
        match self.inbound(ctx).await {
            Ok(_) => DomainError::external_service_error(
                "audio",
                "server stopped accepting video frames",
            ),
            Err(error) => error,
        }
    }
}

#[async_trait]
impl ExtractionStream for GrpcExtractionStream {
    async fn send(&mut self, ctx: &CallContext, frame: ExtractionFrame) -> Result<(), DomainError> {
        let ctx = ctx.clone().with_deadline(self.deadline);
        let outbound = self
            .outbound
            .as_mut()
            .ok_or_else(|| DomainError::internal_error("extraction send side already closed"))?;
        let message = match frame {
            ExtractionFrame::Metadata { sample_rate } => pb::VideoData {
                data: Vec::new(),
                sample_rate,
            },
            ExtractionFrame::Data(data) => pb::VideoData {
                data,
                sample_rate: String::new(),
            },
        };

        let delivered = ctx
            .run("send video frame", async {
                Ok(outbound.send(message).await.is_ok())
            })
            .await?;
        if delivered {
            return Ok(());
        }
        self.outbound = None;
        Err(self.rejection(&ctx).await)
    }

    async fn close_send(&mut self, ctx: &CallContext) -> Result<(), DomainError> {
        let ctx = ctx.clone().with_deadline(self.deadline);
        let mut outbound = self
            .outbound
            .take()
            .ok_or_else(|| DomainError::internal_error("extraction send side already closed"))?;

        ctx.run("close extraction stream", async move {
            outbound.close().await.map_err(|err| {
                DomainError::external_service_error("audio", &format!("failed to close send side: {err}"))
            })
        })
        .await
    }

    async fn recv(&mut self, ctx: &CallContext) -> Result<Option<Vec<u8>>, DomainError> {
        let ctx = ctx.clone().with_deadline(self.deadline);
        let inbound = self.inbound(&ctx).await?;
        ctx.run("receive audio frame", async {
            inbound
                .message()
                .await
                .map(|frame| frame.map(|audio| audio.data))
                .map_err(map_status)
        })
        .await
    }
}

impl Drop for GrpcExtractionStream {
    fn drop(&mut self) {
        if let Some(call) = self.call.take() {
            call.abort();
        }
    }
}

/// Deadline and cancellation statuses keep their meaning; everything else is
/// a failure of the extraction service.
fn map_status(status: Status) -> DomainError {
    match status.code() {
        Code::DeadlineExceeded => DomainError::deadline_exceeded("audio extraction"),
        Code::Cancelled => DomainError::cancelled("audio extraction"),
        code => DomainError::external_service_error(
            "audio",
            &format!("gRPC {code}: {}", status.message()),
        ),
    }
}

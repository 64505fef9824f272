use crate::source::ByteStream;
use crate::storage::{ObjectSink, SinkWriter};
use crate::UploadError;
use async_channel::{Receiver, Sender};
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bounds applied to a single relay
#[derive(Clone, Debug)]
pub struct RelayLimits {
    pub max_bytes: u64,
    /// Chunks buffered between source and sink
    pub buffer_chunks: usize,
    /// Longest wait for the next source chunk
    pub stall_timeout: Option<Duration>,
}

/// Object the relay writes into
#[derive(Clone, Debug)]
pub struct UploadTarget {
    pub key: String,
    pub content_type: String,
}

/// What travels from the source pump to the sink task
enum Frame {
    Data(Bytes),
    /// The source was drained completely; only this finalizes the object
    End,
}

enum PumpError {
    Source(UploadError),
    /// The sink task went away, its own result carries the cause
    SinkGone,
}

/// Stream `body` into a new sink session for `target`.
///
/// The sink drains a bounded channel in its own task while the source is
/// pumped here, so memory use stays at `buffer_chunks` chunks whatever the
/// object size. Returns the number of bytes written once the source is
/// exhausted and the sink acknowledged completion.
pub async fn relay(
    body: Option<ByteStream>,
    sink: &dyn ObjectSink,
    target: &UploadTarget,
    limits: &RelayLimits,
) -> Result<u64, UploadError> {
    let Some(body) = body else {
        return Err(UploadError::EmptyResponseBody);
    };

    let writer = sink
        .begin_upload(&target.key, &target.content_type)
        .await?;

    let (tx, rx) = async_channel::bounded(limits.buffer_chunks.max(1));
    let cancel = CancellationToken::new();
    let store = tokio::spawn(drain_into_sink(writer, rx, cancel.clone()));

    let pumped = pump(body, tx, limits, &cancel).await;
    let stored = store
        .await
        .unwrap_or_else(|error| Err(UploadError::sink(error)));

    match (pumped, stored) {
        (Ok(bytes), Ok(())) => Ok(bytes),
        (Err(PumpError::Source(error)), _) => Err(error),
        (Err(PumpError::SinkGone), Err(error)) | (Ok(_), Err(error)) => Err(error),
        (Err(PumpError::SinkGone), Ok(())) => {
            Err(UploadError::sink("storage closed before the source was drained"))
        }
    }
}

async fn pump(
    mut body: ByteStream,
    tx: Sender<Frame>,
    limits: &RelayLimits,
    cancel: &CancellationToken,
) -> Result<u64, PumpError> {
    let mut total: u64 = 0;

    let result = loop {
        let next = match limits.stall_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let stalled = UploadError::SourceStalled(timeout);
                    break Err(PumpError::Source(stalled));
                }
            },
            None => body.next().await,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(error)) => {
                let failed = UploadError::SourceStream(error.to_string());
                break Err(PumpError::Source(failed));
            }
            None => break Ok(total),
        };

        total += chunk.len() as u64;
        if total > limits.max_bytes {
            warn!(streamed = total, limit = limits.max_bytes, "Source exceeded size limit");
            break Err(PumpError::Source(UploadError::PayloadTooLarge));
        }

        if tx.send(Frame::Data(chunk)).await.is_err() {
            break Err(PumpError::SinkGone);
        }
    };

    match result {
        Ok(total) => {
            if tx.send(Frame::End).await.is_err() {
                return Err(PumpError::SinkGone);
            }
            Ok(total)
        }
        Err(error) => {
            // skip whatever is still buffered
            cancel.cancel();
            Err(error)
        }
    }
}

async fn drain_into_sink(
    mut writer: Box<dyn SinkWriter>,
    rx: Receiver<Frame>,
    cancel: CancellationToken,
) -> Result<(), UploadError> {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            frame = rx.recv() => frame.ok(),
        };

        match frame {
            Some(Frame::Data(chunk)) => {
                if let Err(error) = writer.write(chunk).await {
                    abort(writer.as_mut()).await;
                    return Err(error);
                }
            }
            Some(Frame::End) => break,
            // cancelled, or the pump went away without finishing the source
            None => {
                abort(writer.as_mut()).await;
                return Err(UploadError::sink("upload aborted"));
            }
        }
    }

    if let Err(error) = writer.complete().await {
        abort(writer.as_mut()).await;
        return Err(error);
    }

    debug!("Sink acknowledged completion");
    Ok(())
}

async fn abort(writer: &mut dyn SinkWriter) {
    if let Err(error) = writer.abort().await {
        warn!(%error, "Failed to abort upload session");
    }
}

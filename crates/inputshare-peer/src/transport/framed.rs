//! The framed connection layer.
//!
//! Wraps any ordered byte stream (plain TCP or a TLS stream) with the wire
//! framing and splits it into two background tasks: a reader that
//! reassembles frames and pushes [`TransportEvent`]s toward the session,
//! and a writer that drains a bounded send queue. `send_frame` never
//! blocks: it either enqueues or reports [`SendError::QueueFull`], and the
//! session decides what to do with the rejected frame.
//!
//! Exactly one terminal state event is emitted per connection: `Cancelled`
//! when [`FramedConnection::cancel`] was called, `Failed` otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use inputshare_core::protocol::framing::{frame, FrameBuffer};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use super::{TransportEvent, TransportState};

/// Maximum frames waiting in the send queue. Coalescing keeps the steady
/// state far below this; hitting the bound means the link stalled.
pub const SEND_QUEUE_CAPACITY: usize = 256;

/// Error type for the non-blocking send path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The bounded queue is full. Coalesced motion can be re-absorbed and
    /// retried; anything else means the connection is effectively dead.
    #[error("send queue full")]
    QueueFull,
    /// The connection has been cancelled or has failed.
    #[error("connection closed")]
    Closed,
}

/// Cloneable, non-blocking handle for queueing outbound frames.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl FrameSender {
    /// Queues one frame payload (the length prefix is added by the writer).
    pub fn send_frame(&self, payload: Vec<u8>) -> Result<(), SendError> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// A running framed connection. Dropping it does not stop the tasks; call
/// [`cancel`](FramedConnection::cancel) (idempotent) to tear it down.
pub struct FramedConnection {
    sender: FrameSender,
    cancel_tx: watch::Sender<bool>,
    user_cancelled: Arc<AtomicBool>,
}

impl FramedConnection {
    /// Starts the reader and writer tasks over `stream`. Emits
    /// `State(Ready)` on `events` first, then frames in receipt order,
    /// then exactly one terminal state.
    pub fn start<S>(stream: S, events: mpsc::Sender<TransportEvent>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (queue_tx, queue_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let user_cancelled = Arc::new(AtomicBool::new(false));
        let write_failed = Arc::new(AtomicBool::new(false));

        tokio::spawn(writer_loop(
            write_half,
            queue_rx,
            cancel_rx.clone(),
            cancel_tx.clone(),
            Arc::clone(&write_failed),
        ));
        tokio::spawn(reader_loop(
            read_half,
            events,
            cancel_rx,
            Arc::clone(&user_cancelled),
            write_failed,
        ));

        Self {
            sender: FrameSender { tx: queue_tx },
            cancel_tx,
            user_cancelled,
        }
    }

    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// Tears the connection down. Idempotent; the terminal event is
    /// `Cancelled`.
    pub fn cancel(&self) {
        self.user_cancelled.store(true, Ordering::Relaxed);
        let _ = self.cancel_tx.send(true);
    }
}

async fn writer_loop<W>(
    mut writer: W,
    mut queue: mpsc::Receiver<Vec<u8>>,
    mut cancel: watch::Receiver<bool>,
    cancel_tx: watch::Sender<bool>,
    write_failed: Arc<AtomicBool>,
) where
    W: AsyncWrite + Send + Unpin + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            maybe_payload = queue.recv() => {
                let Some(payload) = maybe_payload else { break };
                let wire = frame(&payload);
                if let Err(e) = writer.write_all(&wire).await {
                    warn!("frame write failed: {e}");
                    write_failed.store(true, Ordering::Relaxed);
                    // Wake the reader so it reports the failure.
                    let _ = cancel_tx.send(true);
                    break;
                }
                if let Err(e) = writer.flush().await {
                    warn!("frame flush failed: {e}");
                    write_failed.store(true, Ordering::Relaxed);
                    let _ = cancel_tx.send(true);
                    break;
                }
                trace!(bytes = payload.len(), "frame sent");
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn reader_loop<R>(
    mut reader: R,
    events: mpsc::Sender<TransportEvent>,
    mut cancel: watch::Receiver<bool>,
    user_cancelled: Arc<AtomicBool>,
    write_failed: Arc<AtomicBool>,
) where
    R: AsyncRead + Send + Unpin + 'static,
{
    if events
        .send(TransportEvent::State(TransportState::Ready))
        .await
        .is_err()
    {
        return;
    }

    let mut buffer = FrameBuffer::new();
    let mut chunk = vec![0u8; 8 * 1024];

    let failed = loop {
        tokio::select! {
            _ = cancel.changed() => {
                break write_failed.load(Ordering::Relaxed);
            }
            read = reader.read(&mut chunk) => {
                match read {
                    Ok(0) => {
                        debug!("peer closed the stream");
                        break true;
                    }
                    Ok(n) => {
                        buffer.extend(&chunk[..n]);
                        match buffer.drain_frames() {
                            Ok(frames) => {
                                for f in frames {
                                    if events.send(TransportEvent::Frame(f)).await.is_err() {
                                        // Session is gone; nothing to report to.
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("framing violation: {e}");
                                break true;
                            }
                        }
                    }
                    Err(e) => {
                        debug!("stream read failed: {e}");
                        break true;
                    }
                }
            }
        }
    };

    let terminal = if user_cancelled.load(Ordering::Relaxed) {
        TransportState::Cancelled
    } else if failed {
        TransportState::Failed
    } else {
        TransportState::Cancelled
    };
    let _ = events.send(TransportEvent::State(terminal)).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! WebSocket streaming sessions.
//!
//! A session accepts one request envelope per subscription and pushes one
//! text frame per decoded payload object. The first error of any
//! subscription is written as `{"error", "status"}`, followed by a close
//! frame. Disconnect, error or server shutdown cancels every subscription
//! the session opened.

use crate::dispatch::{dispatch_stream, CallContext, StreamHandle};
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::request::RpcCall;
use crate::middleware::GatewayMetrics;
use crate::registry::key_fingerprint;
use crate::service::AppState;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Frames queued for the socket writer
#[derive(Debug)]
enum Frame {
    Value(Bytes),
    Error(GatewayError),
}

/// One streaming session
pub struct WebSocketHandler {
    state: AppState,
    connection_id: CorrelationId,
    session: CallContext,
}

impl WebSocketHandler {
    pub fn new(state: AppState) -> Self {
        let session = CallContext::from_token(state.shutdown.child_token());
        Self {
            state,
            connection_id: CorrelationId::new(),
            session,
        }
    }

    fn max_message_size(&self) -> usize {
        self.state.config.websocket.max_message_size
    }

    fn buffer(&self) -> usize {
        self.state.config.websocket.channel_buffer
    }

    /// Drive the session until the client leaves, an error is sent, or the
    /// server shuts down.
    pub async fn handle(self, socket: WebSocket) {
        info!(connection_id = %self.connection_id, "Streaming session opened");
        self.state.metrics.record_stream_open();

        let (sink, mut inbound) = socket.split();
        let (frame_tx, frame_rx) = mpsc::channel::<Frame>(self.buffer());
        let writer = tokio::spawn(write_frames(
            sink,
            frame_rx,
            self.session.clone(),
            Arc::clone(&self.state.metrics),
        ));

        loop {
            let msg = tokio::select! {
                biased;
                _ = self.session.done() => break,
                msg = inbound.next() => msg,
            };

            let raw: Vec<u8> = match msg {
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    // includes frames over the upgrade's size limit
                    debug!(connection_id = %self.connection_id, error = %e, "Socket read failed");
                    let e = GatewayError::InvalidRequest(format!("unreadable message: {}", e));
                    self.state.metrics.record_stream_error(&e);
                    let _ = frame_tx.send(Frame::Error(e)).await;
                    break;
                }
            };

            if let Err(e) = self.open_subscription(&raw, &frame_tx) {
                self.state.metrics.record_stream_error(&e);
                let _ = frame_tx.send(Frame::Error(e)).await;
                break;
            }
        }

        self.session.cancel();
        drop(frame_tx);
        let _ = writer.await;

        self.state.metrics.record_stream_close();
        info!(connection_id = %self.connection_id, "Streaming session closed");
    }

    fn open_subscription(&self, raw: &[u8], frames: &mpsc::Sender<Frame>) -> GatewayResult<()> {
        if raw.len() > self.max_message_size() {
            warn!(
                connection_id = %self.connection_id,
                size = raw.len(),
                max = self.max_message_size(),
                "Message exceeds size limit"
            );
            return Err(GatewayError::InvalidRequest(format!(
                "message too large: {} bytes (max: {})",
                raw.len(),
                self.max_message_size()
            )));
        }

        let call = RpcCall::from_slice(raw)?;
        let (record, conn) = self.state.registry.resolve(&call.key)?;
        debug!(
            connection_id = %self.connection_id,
            key_id = %key_fingerprint(&call.key),
            proc = %call.proc,
            "Opening subscription"
        );

        let handle = dispatch_stream(self.session.child(), conn, record, call, self.buffer());
        tokio::spawn(forward(
            handle,
            frames.clone(),
            Arc::clone(&self.state.metrics),
        ));
        Ok(())
    }
}

/// Pump one subscription's outputs and errors into the session's frames.
///
/// Values already queued are written before an error, so an error frame
/// never overtakes data the bus delivered ahead of it.
async fn forward(mut handle: StreamHandle, frames: mpsc::Sender<Frame>, metrics: Arc<GatewayMetrics>) {
    metrics.record_subscribe();
    let mut outputs_open = true;

    loop {
        tokio::select! {
            biased;
            out = handle.outputs.recv(), if outputs_open => match out {
                Some(value) => {
                    if frames.send(Frame::Value(value)).await.is_err() {
                        break;
                    }
                }
                None => outputs_open = false,
            },
            Some(e) = handle.errors.recv() => {
                metrics.record_stream_error(&e);
                let _ = frames.send(Frame::Error(e)).await;
                break;
            }
            else => break,
        }
    }

    metrics.record_unsubscribe();
}

/// Socket writer. Ends after an error frame, on a write failure, or once
/// every sender is gone, and cancels the session on the way out.
async fn write_frames<S>(
    mut sink: S,
    mut frames: mpsc::Receiver<Frame>,
    session: CallContext,
    metrics: Arc<GatewayMetrics>,
) where
    S: futures::Sink<Message> + Unpin,
{
    while let Some(frame) = frames.recv().await {
        match frame {
            Frame::Value(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
                metrics.record_stream_message();
            }
            Frame::Error(e) => {
                let _ = sink.send(Message::Text(e.to_frame().to_string())).await;
                let code = if e.status().is_client_error() {
                    close_code::POLICY
                } else {
                    close_code::ERROR
                };
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: e.status().canonical_reason().unwrap_or("error").into(),
                    })))
                    .await;
                break;
            }
        }
    }

    session.cancel();
    let _ = sink.close().await;
}

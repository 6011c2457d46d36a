//! # Permissioned RPC Dispatcher
//!
//! Runs one request envelope against a bus connection after checking the
//! key's capabilities.
//!
//! - [`dispatch_call`]: query and publish, one JSON result
//! - [`dispatch_stream`]: subscribe, one JSON value per payload object
//!
//! Both observe a [`CallContext`]. Once it fires, the only outcome is
//! `Cancelled` and nothing more is delivered.

use crate::codec;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::permissions::PermissionRecord;
use crate::domain::request::{Procedure, RpcCall};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use shared_bus::{BusConnection, BusError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cancellation signal plus an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context that only ends when cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that also ends after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_in(timeout)
    }

    /// Context ending when `token` is cancelled.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Same context, also ending after `timeout` from now.
    ///
    /// A timeout past the clock's range leaves the context without a
    /// deadline.
    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Child context: cancelled with its parent, or on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Cancelled)` once the context has fired.
    pub fn check(&self) -> GatewayResult<()> {
        if self.is_done() {
            Err(GatewayError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the context fires.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Run `fut` unless the context fires first.
    pub async fn run<T, F>(&self, fut: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.done() => Err(GatewayError::Cancelled),
            result = fut => result,
        }
    }
}

/// Run a single-result request.
///
/// Query returns a JSON array of every matching payload object; publish
/// returns an empty body. Anything else is `NoSuchMethod`.
pub async fn dispatch_call(
    ctx: &CallContext,
    conn: &dyn BusConnection,
    record: &PermissionRecord,
    call: &RpcCall,
) -> GatewayResult<Bytes> {
    ctx.check()?;

    let result = match call.proc {
        Procedure::Query => {
            authorize(record, call.proc)?;
            ctx.run(query(ctx, conn, call)).await
        }
        Procedure::Publish => {
            authorize(record, call.proc)?;
            ctx.run(publish(conn, call)).await
        }
        Procedure::Subscribe | Procedure::Unknown => {
            return Err(GatewayError::NoSuchMethod(call.proc.to_string()))
        }
    };

    // never hand back a result after the context fired
    ctx.check()?;
    result
}

fn authorize(record: &PermissionRecord, procedure: Procedure) -> GatewayResult<()> {
    if record.allows(procedure) {
        Ok(())
    } else {
        Err(GatewayError::PermissionDenied(procedure.as_str()))
    }
}

async fn query(ctx: &CallContext, conn: &dyn BusConnection, call: &RpcCall) -> GatewayResult<Bytes> {
    let uri = call.uri()?;
    let filter = call.ponum_filter()?;

    let mut messages = conn.query(uri).await?;
    let mut results = Vec::new();
    while let Some(msg) = messages.next().await {
        ctx.check()?;
        for po in msg.matching(filter.as_ref()) {
            results.push(codec::decode(po)?);
        }
    }

    debug!(uri, results = results.len(), "Query complete");
    to_json_bytes(&Value::Array(results))
}

async fn publish(conn: &dyn BusConnection, call: &RpcCall) -> GatewayResult<Bytes> {
    let uri = call.uri()?;
    let target = call.ponum()?;
    let persist = call.persist()?;
    let po = codec::encode(&target, call.contents()?)?;

    conn.publish(uri, vec![po], persist).await?;
    debug!(uri, ponum = %target, persist, "Published");
    Ok(Bytes::new())
}

fn to_json_bytes(value: &Value) -> GatewayResult<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| GatewayError::Internal(format!("failed to encode JSON: {}", e)))
}

/// A running subscription.
///
/// `outputs` yields JSON-encoded payload objects in bus order. `errors`
/// yields anything that went wrong; decode failures do not end the stream.
/// Both close when the task exits.
pub struct StreamHandle {
    pub outputs: mpsc::Receiver<Bytes>,
    pub errors: mpsc::Receiver<GatewayError>,
    pub task: JoinHandle<()>,
}

/// Start a streaming request. Only `Subscribe` is streamable.
pub fn dispatch_stream(
    ctx: CallContext,
    conn: Arc<dyn BusConnection>,
    record: PermissionRecord,
    call: RpcCall,
    buffer: usize,
) -> StreamHandle {
    let (out_tx, outputs) = mpsc::channel(buffer.max(1));
    let (err_tx, errors) = mpsc::channel(buffer.max(1));

    let task = tokio::spawn(async move {
        if let Err(e) = run_subscription(&ctx, conn.as_ref(), &record, &call, &out_tx, &err_tx).await
        {
            report(&err_tx, e);
        }
    });

    StreamHandle {
        outputs,
        errors,
        task,
    }
}

async fn run_subscription(
    ctx: &CallContext,
    conn: &dyn BusConnection,
    record: &PermissionRecord,
    call: &RpcCall,
    out_tx: &mpsc::Sender<Bytes>,
    err_tx: &mpsc::Sender<GatewayError>,
) -> GatewayResult<()> {
    ctx.check()?;

    if call.proc != Procedure::Subscribe {
        return Err(GatewayError::NoSuchMethod(call.proc.to_string()));
    }
    authorize(record, call.proc)?;

    let uri = call.uri()?;
    let filter = call.ponum_filter()?;
    let mut subscription = ctx
        .run(async { conn.subscribe(uri).await.map_err(GatewayError::from) })
        .await?;
    debug!(uri, "Subscription started");

    'stream: loop {
        let msg = tokio::select! {
            biased;
            _ = ctx.done() => break 'stream,
            msg = subscription.next() => msg,
        };

        let Some(msg) = msg else {
            debug!(uri, "Bus closed subscription");
            drop(subscription);
            return Err(GatewayError::UpstreamFailure(BusError::Closed));
        };

        for po in msg.matching(filter.as_ref()) {
            let encoded = match codec::decode(po).and_then(|v| to_json_bytes(&v)) {
                Ok(encoded) => encoded,
                Err(e) => {
                    report(err_tx, e);
                    continue;
                }
            };

            tokio::select! {
                biased;
                _ = ctx.done() => break 'stream,
                sent = out_tx.send(encoded) => {
                    if sent.is_err() {
                        break 'stream;
                    }
                }
            }
        }
    }

    // release on the bus before the task ends
    drop(subscription);
    debug!(uri, "Subscription released");
    Ok(())
}

fn report(err_tx: &mpsc::Sender<GatewayError>, e: GatewayError) {
    if let Err(mpsc::error::TrySendError::Full(e)) = err_tx.try_send(e) {
        warn!(error = %e, "Error channel full, dropping error");
    }
}

//! Host side of the plugin channel.
//!
//! # Responsibilities
//! - Hold the single persistent connection to the plugin process
//! - Multiplex concurrent compare calls over it by correlation id
//! - Expose the remote policy as an ordinary `Comparator`
//!
//! # Design Decisions
//! - A writer task owns the write half; callers hand it encoded frames
//! - A reader task owns the read half and routes replies to per-call
//!   oneshot senders
//! - When either half fails, the pending table is closed and every waiting
//!   call fails with `RpcError::Closed`; later calls fail immediately
//! - A reply that does not decode fails only its own call, when its id is
//!   readable, and the channel stays up

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::error::RpcError;
use super::wire::{frame_id, ReplyFrame, RequestFrame, Verdict, WireResponse};
use crate::comparator::{Comparator, Comparison, Response};

type ReplySender = oneshot::Sender<Result<Verdict, RpcError>>;

/// `None` once the channel has been torn down.
type PendingTable = Arc<Mutex<Option<HashMap<u64, ReplySender>>>>;

/// Multiplexing client for the compare protocol.
pub struct RpcClient {
    next_id: AtomicU64,
    pending: PendingTable,
    outbound: mpsc::UnboundedSender<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl RpcClient {
    /// Connect to a plugin over TCP.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self::from_halves(read_half, write_half))
    }

    /// Build a client over an already established byte stream.
    pub fn from_halves<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingTable = Arc::new(Mutex::new(Some(HashMap::new())));
        let (outbound, rx) = mpsc::unbounded_channel();

        let writer_task = tokio::spawn(writer_loop(writer, rx, pending.clone()));
        let reader_task = tokio::spawn(reader_loop(reader, pending.clone()));

        Self {
            next_id: AtomicU64::new(1),
            pending,
            outbound,
            tasks: vec![writer_task, reader_task],
        }
    }

    /// Send one compare call and wait for its reply.
    pub async fn compare(
        &self,
        newer: WireResponse,
        current: WireResponse,
    ) -> Result<Verdict, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&RequestFrame::compare(id, newer, current))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_mut() {
                Some(table) => {
                    table.insert(id, tx);
                }
                None => return Err(RpcError::Closed),
            }
        }

        if self.outbound.send(frame).is_err() {
            self.forget(id);
            return Err(RpcError::Closed);
        }

        rx.await.unwrap_or(Err(RpcError::Closed))
    }

    /// True once the connection has failed or been closed.
    pub fn is_closed(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    fn forget(&self, id: u64) {
        if let Some(table) = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            table.remove(&id);
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        close_pending(&self.pending);
    }
}

async fn writer_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<String>,
    pending: PendingTable,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(mut frame) = rx.recv().await {
        frame.push('\n');
        if let Err(e) = write_frame(&mut writer, &frame).await {
            tracing::warn!(error = %e, "Plugin channel write failed");
            break;
        }
    }
    close_pending(&pending);
}

async fn write_frame<W>(writer: &mut W, frame: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

async fn reader_loop<R>(reader: R, pending: PendingTable)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let reply: ReplyFrame = match serde_json::from_str(&line) {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::warn!(error = %e, frame = %line, "Unparseable frame from plugin");
                        if let Some(id) = frame_id(&line) {
                            fail_call(&pending, id, RpcError::MalformedReply(e.to_string()));
                        }
                        continue;
                    }
                };
                route_reply(&pending, reply);
            }
            Ok(None) => {
                tracing::debug!("Plugin channel closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Plugin channel read failed");
                break;
            }
        }
    }
    close_pending(&pending);
}

fn route_reply(pending: &PendingTable, reply: ReplyFrame) {
    let sender = pending
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .as_mut()
        .and_then(|table| table.remove(&reply.id));

    let Some(sender) = sender else {
        tracing::warn!(id = reply.id, "Reply for unknown call id");
        return;
    };

    let outcome = match (reply.result, reply.error) {
        (_, Some(message)) => Err(RpcError::Remote(message)),
        (Some(verdict), None) => Ok(verdict),
        (None, None) => Err(RpcError::EmptyReply),
    };
    let _ = sender.send(outcome);
}

fn fail_call(pending: &PendingTable, id: u64, error: RpcError) {
    let sender = pending
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .as_mut()
        .and_then(|table| table.remove(&id));
    if let Some(sender) = sender {
        let _ = sender.send(Err(error));
    }
}

fn close_pending(pending: &PendingTable) {
    let table = pending.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(table) = table {
        for (_, sender) in table {
            let _ = sender.send(Err(RpcError::Closed));
        }
    }
}

/// `Comparator` backed by an out-of-process plugin.
#[derive(Clone)]
pub struct RemoteComparator {
    client: Arc<RpcClient>,
}

impl RemoteComparator {
    pub fn new(client: RpcClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl Comparator for RemoteComparator {
    async fn compare(&self, newer: Arc<Response>, current: Arc<Response>) -> Comparison {
        let result = self
            .client
            .compare(WireResponse::from(&*newer), WireResponse::from(&*current))
            .await;

        match result {
            Ok(verdict) => verdict_to_comparison(newer, current, verdict),
            Err(e) => {
                tracing::warn!(error = %e, "Remote comparator call failed");
                Comparison::plugin_error(newer, current, e)
            }
        }
    }
}

/// Reattach the local responses to a remote verdict.
///
/// The difference text is authoritative: a mismatch without text gets a
/// placeholder, and a "match" that still carries text is a mismatch.
fn verdict_to_comparison(
    newer: Arc<Response>,
    current: Arc<Response>,
    verdict: Verdict,
) -> Comparison {
    if !verdict.matched && verdict.difference.is_empty() {
        return Comparison::from_difference(
            newer,
            current,
            "plugin reported a mismatch without a description",
        );
    }
    Comparison::from_difference(newer, current, verdict.difference)
}

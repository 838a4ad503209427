//! Plugin side of the channel: what a comparator plugin binary runs.
//!
//! # Responsibilities
//! - Refuse to run unless started by a host that set the magic cookie
//! - Listen on a loopback port and announce it with the handshake line
//! - Answer compare calls, concurrently, on every accepted connection
//!
//! # Usage
//! ```no_run
//! use proxiff::comparator::StatusOnlyComparator;
//!
//! #[tokio::main]
//! async fn main() {
//!     if let Err(e) = proxiff::plugin::serve(StatusOnlyComparator).await {
//!         eprintln!("{e}");
//!         std::process::exit(1);
//!     }
//! }
//! ```

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::error::PluginError;
use super::handshake::{Handshake, HandshakeConfig};
use super::wire::{frame_id, ReplyFrame, RequestFrame, Verdict, METHOD_COMPARE};
use crate::comparator::{Comparator, Response};

/// Serve `comparator` with the default handshake settings.
pub async fn serve<C>(comparator: C) -> Result<(), PluginError>
where
    C: Comparator + 'static,
{
    serve_with_config(comparator, &HandshakeConfig::default()).await
}

pub async fn serve_with_config<C>(comparator: C, config: &HandshakeConfig) -> Result<(), PluginError>
where
    C: Comparator + 'static,
{
    let cookie = std::env::var(&config.magic_cookie_key).ok();
    if !config.cookie_matches(cookie.as_deref()) {
        return Err(PluginError::CookieMismatch {
            key: config.magic_cookie_key.clone(),
        });
    }

    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let handshake = Handshake {
        protocol_version: config.protocol_version,
        ..Handshake::new(listener.local_addr()?)
    };

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{handshake}\n").as_bytes())
        .await?;
    stdout.flush().await?;

    tracing::debug!(address = %handshake.address, "Plugin listening");

    let comparator: Arc<dyn Comparator> = Arc::new(comparator);
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(peer = %peer, "Host connected");
        let (reader, writer) = stream.into_split();
        tokio::spawn(serve_connection(reader, writer, comparator.clone()));
    }
}

/// Answer compare calls arriving on one connection until it closes.
pub async fn serve_connection<R, W>(reader: R, mut writer: W, comparator: Arc<dyn Comparator>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<ReplyFrame>();

    let writer_task = tokio::spawn(async move {
        while let Some(reply) = rx.recv().await {
            let mut line = match serde_json::to_string(&reply) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode reply");
                    continue;
                }
            };
            line.push('\n');
            if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let frame: RequestFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                match frame_id(&line) {
                    Some(id) => {
                        let _ = tx.send(ReplyFrame::err(id, format!("malformed request: {e}")));
                    }
                    None => tracing::warn!(error = %e, "Dropping unparseable request frame"),
                }
                continue;
            }
        };

        let tx = tx.clone();
        let comparator = comparator.clone();
        tokio::spawn(async move {
            let reply = handle_request(frame, comparator.as_ref()).await;
            let _ = tx.send(reply);
        });
    }

    drop(tx);
    let _ = writer_task.await;
}

async fn handle_request(frame: RequestFrame, comparator: &dyn Comparator) -> ReplyFrame {
    if frame.method != METHOD_COMPARE {
        return ReplyFrame::err(frame.id, format!("unknown method {:?}", frame.method));
    }

    let newer = match Response::try_from(frame.params.newer) {
        Ok(r) => r,
        Err(e) => return ReplyFrame::err(frame.id, format!("newer: {e}")),
    };
    let current = match Response::try_from(frame.params.current) {
        Ok(r) => r,
        Err(e) => return ReplyFrame::err(frame.id, format!("current: {e}")),
    };

    let comparison = comparator.compare(Arc::new(newer), Arc::new(current)).await;
    ReplyFrame::ok(
        frame.id,
        Verdict {
            matched: comparison.matched(),
            difference: comparison.difference().to_string(),
        },
    )
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line-framed TCP intake.
//!
//! One task per connection. Every newline-terminated frame is one raw
//! request: either a plain JSON object/array or an encrypted
//! `client_id:iv:ciphertext` envelope (both are newline-free by
//! construction). The session acknowledges each frame with a one-line JSON
//! status object.
//!
//! TLS termination and the connect/token-issuance endpoints live outside
//! this server; this listener only feeds the ingestion handler.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loghub_proto::StatusCode;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ingest::{LogRequestHandler, RawRequest, Session};

pub struct IntakeServer {
    handler: Arc<LogRequestHandler>,
    listen_addr: String,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl IntakeServer {
    pub fn new(handler: Arc<LogRequestHandler>, listen_addr: impl Into<String>) -> Self {
        Self {
            handler,
            listen_addr: listen_addr.into(),
            local_addr: Mutex::new(None),
        }
    }

    /// Address actually bound; useful with a `:0` listen address.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|addr| *addr)
    }

    /// Accepts connections until cancelled. Connection tasks stop on their
    /// own when the peer closes or cancellation fires.
    pub async fn run(&self, cancel_token: CancellationToken) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        let bound = listener.local_addr()?;
        if let Ok(mut slot) = self.local_addr.lock() {
            *slot = Some(bound);
        }
        info!(addr = %bound, "log intake listening");

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    debug!("intake listener shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = Arc::clone(&self.handler);
                        let token = cancel_token.clone();
                        tokio::spawn(async move {
                            serve_connection(handler, stream, peer, token).await;
                        });
                    }
                    Err(error) => {
                        warn!(%error, "failed to accept connection");
                    }
                },
            }
        }
        Ok(())
    }
}

/// Write side of one connection, shared with the handler for acks.
struct TcpSession {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
}

#[async_trait]
impl Session for TcpSession {
    async fn write_status(&self, status: StatusCode) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        let line = format!("{{\"status\":{}}}\n", status.to_wire());
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }
}

async fn serve_connection(
    handler: Arc<LogRequestHandler>,
    stream: TcpStream,
    peer: SocketAddr,
    cancel_token: CancellationToken,
) {
    debug!(%peer, "connection opened");
    let (read_half, write_half) = stream.into_split();
    let session = TcpSession {
        writer: tokio::sync::Mutex::new(write_half),
    };

    // Byte-wise framing: frames need not be UTF-8.
    let mut frames = BufReader::new(read_half).split(b'\n');
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            frame = frames.next_segment() => match frame {
                Ok(Some(bytes)) => {
                    if bytes.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let raw = RawRequest::new(bytes, peer.ip().to_string());
                    handler.handle(raw, &session).await;
                }
                Ok(None) => break,
                Err(error) => {
                    debug!(%peer, %error, "connection read failed");
                    break;
                }
            },
        }
    }
    debug!(%peer, "connection closed");
}

//! RESP2 plumbing: a small server exposing a [`LocalStore`] to other nodes,
//! and the frame helpers the shared store client uses.

mod cmd;
mod connection;

use crate::local::LocalStore;
use bytes::{Bytes, BytesMut};
use redis_protocol::error::RedisProtocolError;
use redis_protocol::resp2::decode::decode_bytes_mut;
use redis_protocol::resp2::encode::extend_encode;
use redis_protocol::resp2::types::BytesFrame;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Bind `addr` and serve RESP2 clients from `store` until `shutdown` fires.
pub async fn run_resp_server(addr: &str, store: Arc<LocalStore>, shutdown: CancellationToken) {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => {
            tracing::info!(addr = %addr, "RESP server listening");
            l
        }
        Err(e) => {
            tracing::error!(error = %e, addr = %addr, "failed to bind RESP server");
            return;
        }
    };

    serve(listener, store, shutdown).await;
}

/// Accept loop over an already-bound listener.
pub async fn serve(listener: TcpListener, store: Arc<LocalStore>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("RESP server shutting down");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let store = Arc::clone(&store);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            tracing::debug!(peer = %peer, "RESP client connected");
                            tokio::select! {
                                _ = connection::handle_connection(stream, &store) => {}
                                _ = shutdown.cancelled() => {}
                            }
                            tracing::debug!(peer = %peer, "RESP client disconnected");
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "RESP accept error");
                    }
                }
            }
        }
    }
}

/// Build a command frame: an array of bulk strings.
pub(crate) fn command(args: impl IntoIterator<Item = Bytes>) -> BytesFrame {
    BytesFrame::Array(args.into_iter().map(BytesFrame::BulkString).collect())
}

/// Append the RESP2 encoding of `frame` to `out`.
pub(crate) fn encode_into(out: &mut BytesMut, frame: &BytesFrame) -> Result<(), RedisProtocolError> {
    // false = don't encode integers as bulk strings (standard RESP2)
    extend_encode(out, frame, false).map(|_| ())
}

/// Split one complete frame off the front of `buf`, if one is buffered.
pub(crate) fn take_frame(buf: &mut BytesMut) -> Result<Option<BytesFrame>, RedisProtocolError> {
    Ok(decode_bytes_mut(buf)?.map(|(frame, _, _)| frame))
}

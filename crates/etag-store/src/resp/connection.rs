use super::{cmd, encode_into, take_frame};
use crate::local::LocalStore;
use bytes::BytesMut;
use redis_protocol::resp2::types::BytesFrame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Handle a single RESP client connection: read frames, dispatch commands, write replies.
pub async fn handle_connection(mut stream: TcpStream, store: &LocalStore) {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        match stream.read_buf(&mut buf).await {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "RESP read error");
                break;
            }
        }

        // Pipelined clients may send several frames in one read.
        loop {
            let frame = match take_frame(&mut buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => break, // Need more data
                Err(e) => {
                    tracing::debug!(error = %e, "RESP decode error");
                    let mut out = BytesMut::new();
                    let err_frame = BytesFrame::Error("ERR protocol error".into());
                    if encode_into(&mut out, &err_frame).is_ok() {
                        let _ = stream.write_all(&out).await;
                    }
                    return;
                }
            };

            let reply = cmd::dispatch(&frame, store);

            let mut out = BytesMut::new();
            if let Err(e) = encode_into(&mut out, &reply) {
                tracing::debug!(error = %e, "RESP encode error");
                return;
            }
            if let Err(e) = stream.write_all(&out).await {
                tracing::debug!(error = %e, "RESP write error");
                return;
            }
        }
    }
}

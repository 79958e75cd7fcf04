use crate::resp::{command, encode_into, take_frame};
use crate::traits::{effective_ttl, BackendError, CacheBackend, DEFAULT_TTL};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use redis_protocol::resp2::types::BytesFrame;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;

/// One open RESP2 connection plus its unread input.
struct Connection {
    stream: TcpStream,
    buf: BytesMut,
}

impl Connection {
    async fn open(addr: &str) -> Result<Self, BackendError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(4096),
        })
    }

    async fn round_trip(&mut self, request: &BytesFrame) -> Result<BytesFrame, BackendError> {
        let mut out = BytesMut::new();
        encode_into(&mut out, request)?;
        self.stream.write_all(&out).await?;

        loop {
            if let Some(frame) = take_frame(&mut self.buf)? {
                return Ok(frame);
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(BackendError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
        }
    }
}

/// Connections for one kind of traffic, at most `permits` of them at a time.
struct Pool {
    idle: parking_lot::Mutex<Vec<Connection>>,
    permits: Semaphore,
}

impl Pool {
    fn new(size: usize) -> Self {
        Self {
            idle: parking_lot::Mutex::new(Vec::with_capacity(size)),
            permits: Semaphore::new(size),
        }
    }
}

/// Default number of connections per pool.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Cache backend living in a Redis-compatible server, shared by every node
/// pointed at it.
///
/// Lookups and writes use separate connection pools, so background writes
/// never queue ahead of the lookups a request is waiting on. Connections are
/// opened lazily. Any I/O, protocol or timeout failure drops the connection
/// it happened on; the next request opens a fresh one. The timeout covers the
/// whole call, including the wait for a free connection.
pub struct SharedStore {
    addr: String,
    timeout: Duration,
    default_ttl: Duration,
    reads: Pool,
    writes: Pool,
}

impl SharedStore {
    pub fn new(addr: impl Into<String>, timeout: Duration, default_ttl: Duration) -> Self {
        Self::with_pool_size(addr, timeout, default_ttl, DEFAULT_POOL_SIZE)
    }

    /// Like [`new`](Self::new) with `pool_size` connections for lookups and
    /// as many for writes.
    pub fn with_pool_size(
        addr: impl Into<String>,
        timeout: Duration,
        default_ttl: Duration,
        pool_size: usize,
    ) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            addr: addr.into(),
            timeout,
            default_ttl: effective_ttl(default_ttl, DEFAULT_TTL),
            reads: Pool::new(pool_size),
            writes: Pool::new(pool_size),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one command and wait for its reply, bounded by the configured timeout.
    async fn execute(&self, pool: &Pool, request: BytesFrame) -> Result<BytesFrame, BackendError> {
        let reply = tokio::time::timeout(self.timeout, self.send(pool, &request))
            .await
            .unwrap_or(Err(BackendError::Timeout(self.timeout)))?;

        match reply {
            BytesFrame::Error(msg) => Err(BackendError::Server(String::from(&*msg))),
            frame => Ok(frame),
        }
    }

    async fn send(&self, pool: &Pool, request: &BytesFrame) -> Result<BytesFrame, BackendError> {
        let _permit = pool
            .permits
            .acquire()
            .await
            .map_err(|_| BackendError::Unexpected("connection pool closed".into()))?;

        let idle = pool.idle.lock().pop();
        let mut conn = match idle {
            Some(conn) => conn,
            None => {
                tracing::debug!(addr = %self.addr, "opening shared store connection");
                Connection::open(&self.addr).await?
            }
        };

        // A connection is only reused after a complete round trip; one
        // abandoned mid-reply (error or timeout) is dropped here.
        match conn.round_trip(request).await {
            Ok(frame) => {
                pool.idle.lock().push(conn);
                Ok(frame)
            }
            Err(e) => {
                tracing::warn!(addr = %self.addr, error = %e, "dropping shared store connection");
                Err(e)
            }
        }
    }

    /// Round-trip a PING. Useful as a startup health check.
    pub async fn ping(&self) -> Result<(), BackendError> {
        match self.execute(&self.reads, command([Bytes::from_static(b"PING")])).await? {
            BytesFrame::SimpleString(s) if s == "PONG" => Ok(()),
            other => Err(BackendError::Unexpected(format!("{other:?}"))),
        }
    }
}

#[async_trait]
impl CacheBackend for SharedStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        let request = command([Bytes::from_static(b"GET"), Bytes::copy_from_slice(key.as_bytes())]);
        match self.execute(&self.reads, request).await? {
            BytesFrame::BulkString(value) => Ok(Some(value)),
            BytesFrame::Null => Ok(None),
            other => Err(BackendError::Unexpected(format!("{other:?}"))),
        }
    }

    async fn store(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BackendError> {
        let secs = effective_ttl(ttl, self.default_ttl).as_secs().max(1);
        let request = command([
            Bytes::from_static(b"SET"),
            Bytes::copy_from_slice(key.as_bytes()),
            value,
            Bytes::from_static(b"EX"),
            Bytes::from(secs.to_string()),
        ]);
        match self.execute(&self.writes, request).await? {
            BytesFrame::SimpleString(_) => Ok(()),
            other => Err(BackendError::Unexpected(format!("{other:?}"))),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        let request = command([Bytes::from_static(b"DEL"), Bytes::copy_from_slice(key.as_bytes())]);
        match self.execute(&self.writes, request).await? {
            BytesFrame::Integer(_) => Ok(()),
            other => Err(BackendError::Unexpected(format!("{other:?}"))),
        }
    }

    fn name(&self) -> &'static str {
        "shared"
    }
}

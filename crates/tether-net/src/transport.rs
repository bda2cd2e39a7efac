//! One established TCP connection carrying two logical channels.
//!
//! The text channel is newline-terminated UTF-8. The binary channel carries
//! whole [`FileBlob`]s as `[u64 BE length][bincode body]`. Both are read
//! through the same buffered reader, so whatever the line reader has already
//! buffered is still visible to the blob reader that follows it.
//!
//! A `Transport` only exists once connected. Closing it is final; a new
//! connection means a new `Transport`.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info};

use tether_shared::constants::{MAX_BLOB_OVERHEAD, MAX_FILE_SIZE, MAX_LINE_LEN};
use tether_shared::{FileBlob, ProtocolError};

use crate::error::TransportError;

/// A bound listening socket that will accept exactly one peer.
#[derive(Debug)]
pub struct TransportListener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl TransportListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = inner.local_addr()?;

        info!(addr = %local_addr, "Listening for a peer");

        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for one peer. The listening socket is released when this returns,
    /// whether a peer arrived or not.
    pub async fn accept(self, timeout: Duration) -> Result<Transport, TransportError> {
        match tokio::time::timeout(timeout, self.inner.accept()).await {
            Err(_) => {
                info!(addr = %self.local_addr, ?timeout, "No peer connected before timeout");
                Err(TransportError::AcceptTimeout(timeout))
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Ok(Ok((stream, peer))) => {
                info!(peer = %peer, "Accepted peer connection");
                Transport::from_stream(stream)
            }
        }
    }
}

pub struct Transport {
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: watch::Sender<bool>,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl Transport {
    /// Bind `0.0.0.0:port` and accept a single peer.
    pub async fn listen(port: u16, accept_timeout: Duration) -> Result<Self, TransportError> {
        let listener = TransportListener::bind((Ipv4Addr::UNSPECIFIED, port).into()).await?;
        listener.accept(accept_timeout).await
    }

    pub async fn dial(host: &str, port: u16) -> Result<Self, TransportError> {
        let stream =
            TcpStream::connect((host, port))
                .await
                .map_err(|source| TransportError::Connect {
                    addr: format!("{host}:{port}"),
                    source,
                })?;
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let (closed, _) = watch::channel(false);

        debug!(peer = %peer_addr, local = %local_addr, "Transport ready");

        Ok(Self {
            reader: Mutex::new(Some(BufReader::new(read_half))),
            writer: Mutex::new(Some(write_half)),
            closed,
            peer_addr,
            local_addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_open(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Exclusive access to the write side. Everything sent through one guard
    /// reaches the wire contiguously, which is what keeps a file marker and
    /// its blob adjacent.
    pub async fn sender(&self) -> SendGuard<'_> {
        SendGuard {
            writer: self.writer.lock().await,
            closed: self.closed.subscribe(),
        }
    }

    pub async fn send_line(&self, text: &str) -> Result<(), TransportError> {
        self.sender().await.send_line(text).await
    }

    pub async fn send_blob(&self, blob: &FileBlob) -> Result<(), TransportError> {
        self.sender().await.send_blob(blob).await
    }

    /// Read one line. `Ok(None)` means the peer closed the connection.
    pub async fn receive_line(&self) -> Result<Option<String>, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }

        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::Closed)?;

        tokio::select! {
            biased;
            _ = closed_signal(&mut closed) => Err(TransportError::Closed),
            line = read_line(reader) => line,
        }
    }

    /// Read exactly one blob frame.
    pub async fn receive_blob(&self) -> Result<FileBlob, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }

        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::Closed)?;

        tokio::select! {
            biased;
            _ = closed_signal(&mut closed) => Err(TransportError::Closed),
            blob = read_blob(reader) => blob,
        }
    }

    /// Close both directions. Pending reads and writes fail with
    /// [`TransportError::Closed`]. Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(peer = %self.peer_addr, error = %e, "Write shutdown failed");
            }
        }
        self.reader.lock().await.take();

        info!(peer = %self.peer_addr, "Transport closed");
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Holds the send lock for as long as it lives.
pub struct SendGuard<'a> {
    writer: MutexGuard<'a, Option<OwnedWriteHalf>>,
    closed: watch::Receiver<bool>,
}

impl SendGuard<'_> {
    pub async fn send_line(&mut self, text: &str) -> Result<(), TransportError> {
        if text.contains(|c| c == '\n' || c == '\r') {
            return Err(ProtocolError::InvalidLine("embedded line break".to_string()).into());
        }

        let mut buf = Vec::with_capacity(text.len() + 1);
        buf.extend_from_slice(text.as_bytes());
        buf.push(b'\n');
        self.write_all(&buf).await
    }

    pub async fn send_blob(&mut self, blob: &FileBlob) -> Result<(), TransportError> {
        let frame = BlobFrame::encode(blob)?;
        self.send_frame(&frame).await
    }

    pub async fn send_frame(&mut self, frame: &BlobFrame) -> Result<(), TransportError> {
        self.write_all(&frame.frame).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;

        tokio::select! {
            biased;
            _ = closed_signal(&mut self.closed) => Err(TransportError::Closed),
            res = async {
                writer.write_all(buf).await?;
                writer.flush().await
            } => res.map_err(TransportError::from),
        }
    }
}

/// A blob already serialized for the wire. Encoding up front means nothing
/// can fail between writing a file marker and writing its blob, except the
/// connection itself.
#[derive(Debug, Clone)]
pub struct BlobFrame {
    frame: Bytes,
}

impl BlobFrame {
    pub fn encode(blob: &FileBlob) -> Result<Self, TransportError> {
        let body = blob.to_bytes()?;
        let mut frame = BytesMut::with_capacity(8 + body.len());
        frame.put_u64(body.len() as u64);
        frame.extend_from_slice(&body);
        Ok(Self {
            frame: frame.freeze(),
        })
    }
}

async fn closed_signal(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn read_line(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<Option<String>, TransportError> {
    let mut buf = Vec::new();
    let limit = MAX_LINE_LEN as u64 + 1;
    let n = (&mut *reader)
        .take(limit)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() as u64 >= limit {
        return Err(ProtocolError::InvalidLine(format!(
            "line exceeds {MAX_LINE_LEN} bytes"
        ))
        .into());
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| ProtocolError::InvalidLine("not valid UTF-8".to_string()).into())
}

async fn read_blob(reader: &mut BufReader<OwnedReadHalf>) -> Result<FileBlob, TransportError> {
    let len = reader.read_u64().await?;
    let max = MAX_FILE_SIZE + MAX_BLOB_OVERHEAD;
    if len > max {
        return Err(ProtocolError::BlobTooLarge { size: len, max }.into());
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    let blob = FileBlob::from_bytes(&body)?;
    debug!(name = %blob.name, size = blob.size, "Received blob");
    Ok(blob)
}

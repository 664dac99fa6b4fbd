//! TCP transport for the client.
//!
//! Owns the raw socket and the telnet byte layer. A background read task
//! decodes incoming bytes through [`TelnetCodec`], answers option
//! negotiation, and forwards every decoded text chunk over a channel; a
//! background write task serializes outgoing lines and negotiation replies.
//! Protocol logic stays out of this layer — the dispatch loop consumes the
//! chunk channel and owns line framing via [`LineBuffer`].
//!
//! Failure semantics: any error inside the read loop ends it silently; the
//! consumer observes the chunk channel closing. Detecting a dropped
//! connection is the command layer's timeout path, not this layer's job.

use bytes::BytesMut;
use fianchetto_proto::TelnetCodec;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
};
use tracing::{debug, trace};

use crate::error::ClientError;

/// Capacity of the internal writer channel.
const WRITE_CAPACITY: usize = 32;

/// Read-buffer capacity for one socket read.
const READ_CAPACITY: usize = 4096;

/// One unit of outgoing work for the write task.
enum WriteOp {
    /// A command line; the line terminator is appended here.
    Line(String),
    /// Raw bytes (telnet negotiation replies), written as-is.
    Raw(Vec<u8>),
}

/// Cloneable handle for sending command lines to the server.
#[derive(Clone)]
pub struct TransportSender {
    tx: mpsc::Sender<WriteOp>,
}

impl TransportSender {
    /// Send one command line; the protocol line terminator is appended.
    pub async fn send_line(&self, line: &str) -> Result<(), ClientError> {
        self.tx
            .send(WriteOp::Line(line.to_string()))
            .await
            .map_err(|_| ClientError::ConnectionClosed)
    }
}

/// Handle to a connected transport.
///
/// `from_server` yields decoded text chunks in arrival order. Dropping the
/// transport does not close the connection; call [`Transport::stop`].
pub struct Transport {
    /// Decoded text chunks from the server.
    pub from_server: mpsc::Receiver<String>,
    sender: TransportSender,
    abort_read: tokio::task::AbortHandle,
    abort_write: tokio::task::AbortHandle,
}

impl Transport {
    /// Connect to the server and start the read/write tasks.
    pub async fn connect(
        host: &str,
        port: u16,
        chunk_capacity: usize,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            ClientError::Connect { host: host.to_string(), port, reason: e.to_string() }
        })?;
        let (read_half, write_half) = stream.into_split();

        let (write_tx, write_rx) = mpsc::channel::<WriteOp>(WRITE_CAPACITY);
        let (chunk_tx, chunk_rx) = mpsc::channel::<String>(chunk_capacity);

        let read_task = tokio::spawn(run_read(read_half, chunk_tx, write_tx.clone()));
        let write_task = tokio::spawn(run_write(write_half, write_rx));

        Ok(Self {
            from_server: chunk_rx,
            sender: TransportSender { tx: write_tx },
            abort_read: read_task.abort_handle(),
            abort_write: write_task.abort_handle(),
        })
    }

    /// A cloneable sender for outgoing command lines.
    #[must_use]
    pub fn sender(&self) -> TransportSender {
        self.sender.clone()
    }

    /// Stop both background tasks and drop the connection.
    pub fn stop(&self) {
        self.abort_read.abort();
        self.abort_write.abort();
    }
}

/// Read loop: socket bytes → telnet decode → chunk channel.
async fn run_read(
    mut read_half: OwnedReadHalf,
    chunks: mpsc::Sender<String>,
    writes: mpsc::Sender<WriteOp>,
) {
    let mut codec = TelnetCodec::new();
    let mut buf = BytesMut::with_capacity(READ_CAPACITY);

    loop {
        buf.clear();
        match read_half.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("server closed the connection");
                return;
            },
            Ok(n) => {
                let decoded = codec.decode(&buf[..n]);
                if !decoded.replies.is_empty()
                    && writes.send(WriteOp::Raw(decoded.replies)).await.is_err()
                {
                    return;
                }
                if !decoded.text.is_empty() && chunks.send(decoded.text).await.is_err() {
                    return;
                }
            },
            Err(e) => {
                debug!(error = %e, "read loop ended");
                return;
            },
        }
    }
}

/// Write loop: serialize lines and negotiation replies in order.
async fn run_write(mut write_half: OwnedWriteHalf, mut ops: mpsc::Receiver<WriteOp>) {
    while let Some(op) = ops.recv().await {
        let result = match op {
            WriteOp::Line(line) => {
                trace!(line = %line, "sending");
                let mut bytes = line.into_bytes();
                bytes.push(b'\n');
                write_half.write_all(&bytes).await
            },
            WriteOp::Raw(bytes) => write_half.write_all(&bytes).await,
        };
        if result.is_err() || write_half.flush().await.is_err() {
            debug!("write loop ended");
            return;
        }
    }
}

/// Accumulator for decoded text, owned by the dispatch loop.
///
/// Provides the three access patterns the command layer needs: oldest
/// complete line, everything buffered (including partial lines), and a
/// flush that discards buffered text to resynchronize after commands with
/// no useful trailing output.
#[derive(Debug, Default)]
pub struct LineBuffer {
    acc: String,
}

impl LineBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decoded chunk.
    pub fn push(&mut self, chunk: &str) {
        self.acc.push_str(chunk);
    }

    /// Remove and return the oldest complete line, if any.
    ///
    /// Carriage returns produced by the transport's ending swap are
    /// stripped from both ends; interior whitespace (game-list rows indent
    /// with spaces) is preserved.
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.acc.find('\n')?;
        let rest = self.acc.split_off(newline + 1);
        let mut line = std::mem::replace(&mut self.acc, rest);
        line.truncate(newline);
        Some(line.trim_matches('\r').to_string())
    }

    /// Drain and return everything buffered, including partial lines.
    pub fn take_all(&mut self) -> String {
        std::mem::take(&mut self.acc)
    }

    /// Discard everything buffered.
    pub fn flush(&mut self) {
        self.acc.clear();
    }
}

//! Multiplexed client transport.
//!
//! A [`ClientTransport`] owns one connection and lets many tasks call over
//! it at once. Each request gets a unique sequence id; a dedicated reader
//! task routes every response to the caller waiting on that id.
//!
//! ```text
//! task-1 ──send(seq=1)──┐
//! task-2 ──send(seq=2)──┼──→ one connection ──→ server
//! task-3 ──send(seq=3)──┘
//!
//! reader: ←── response(seq=2) → pending[2] → task-2 wakes up
//! ```
//!
//! A second background task writes a heartbeat frame at a fixed interval so
//! dead connections are noticed even when the transport is idle.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};

use crate::codec::Codec;
use crate::error::Result;
use crate::message::RpcMessage;
use crate::protocol::{read_frame, write_frame, CodecKind, Header, MsgType};

/// Interval between heartbeat frames.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

type PendingTable = DashMap<u32, oneshot::Sender<RpcMessage>>;

/// Everything the send lock protects: the write half and the seq counter.
///
/// Holding both behind one mutex serializes the whole send sequence - seq
/// bump, envelope encode, pending insert, frame write - so frames from
/// concurrent callers never interleave on the wire.
struct SendState {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    seq: u32,
}

/// A single multiplexed connection.
///
/// Construction spawns the reader and heartbeat tasks. A broken connection
/// is terminal for the transport: every pending caller receives a synthetic
/// error envelope, and subsequent sends fail. Replacement is the owner's
/// concern.
pub struct ClientTransport {
    codec: Codec,
    send: Mutex<SendState>,
    pending: Arc<PendingTable>,
}

impl ClientTransport {
    /// Wrap an open TCP connection.
    pub fn new(stream: TcpStream, codec: CodecKind) -> Arc<Self> {
        let (reader, writer) = stream.into_split();
        Self::from_parts(reader, writer, codec)
    }

    /// Wrap an arbitrary stream pair (in-memory duplexes in tests).
    pub fn from_parts<R, W>(reader: R, writer: W, codec: CodecKind) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: Arc<PendingTable> = Arc::new(DashMap::new());
        let transport = Arc::new(Self {
            codec: Codec::for_kind(codec),
            send: Mutex::new(SendState {
                writer: Box::new(writer),
                seq: 0,
            }),
            pending: pending.clone(),
        });

        tokio::spawn(reader_loop(reader, pending));
        tokio::spawn(heartbeat_loop(
            Arc::downgrade(&transport),
            HEARTBEAT_INTERVAL,
        ));

        transport
    }

    /// Serialize and send one request.
    ///
    /// Returns the assigned sequence id and the slot the response will be
    /// delivered into. The slot holds exactly one envelope, so the reader
    /// never blocks on delivery.
    pub async fn send<A>(
        &self,
        service_method: &str,
        args: &A,
    ) -> Result<(u32, oneshot::Receiver<RpcMessage>)>
    where
        A: Serialize + ?Sized,
    {
        let mut send = self.send.lock().await;

        // Wrapping at 2^32 is allowed; skipping ids still present in the
        // pending table is what actually guarantees uniqueness.
        loop {
            send.seq = send.seq.wrapping_add(1);
            if !self.pending.contains_key(&send.seq) {
                break;
            }
        }
        let seq = send.seq;

        let payload = serde_json::to_vec(args)?;
        let body = self
            .codec
            .encode(&RpcMessage::request(service_method, payload))?;
        let header = Header::new(self.codec.kind(), MsgType::Request, seq, body.len() as u32);

        // Register before writing: a response can arrive the instant the
        // frame is out, and it must find its waiter.
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);

        if let Err(err) = write_frame(&mut send.writer, &header, &body).await {
            self.pending.remove(&seq);
            return Err(err);
        }

        Ok((seq, rx))
    }

    /// Number of requests currently awaiting a response (diagnostics).
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Reads frames until the connection dies, routing each response to the
/// pending entry with the matching seq.
///
/// A single reader per connection is forced by byte-stream semantics:
/// frame boundaries only make sense to one sequential parser.
async fn reader_loop<R>(mut reader: R, pending: Arc<PendingTable>)
where
    R: AsyncRead + Send + Unpin,
{
    loop {
        let (header, body) = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!("transport reader exiting: {err}");
                fail_all_pending(&pending, &err.to_string());
                return;
            }
        };

        if header.msg_type != MsgType::Response {
            tracing::debug!("ignoring non-response frame (type {:?})", header.msg_type);
            continue;
        }

        let msg = match Codec::for_kind(header.codec).decode(&body) {
            Ok(msg) => msg,
            Err(err) => {
                tracing::warn!("undecodable response body: {err}");
                fail_all_pending(&pending, &err.to_string());
                return;
            }
        };

        match pending.remove(&header.seq) {
            // Send failure means the caller gave up (client-side timeout)
            // and dropped its receiver; that is not an error here.
            Some((_, tx)) => {
                let _ = tx.send(msg);
            }
            None => tracing::debug!("dropping response with unknown seq {}", header.seq),
        }
    }
}

/// Deliver a synthetic error envelope to every pending caller and clear the
/// table. Called once, by the reader, when the connection breaks.
fn fail_all_pending(pending: &PendingTable, error: &str) {
    let seqs: Vec<u32> = pending.iter().map(|entry| *entry.key()).collect();
    for seq in seqs {
        if let Some((_, tx)) = pending.remove(&seq) {
            let _ = tx.send(RpcMessage::error_reply(error));
        }
    }
}

/// Writes a body-less heartbeat frame on a fixed interval, under the send
/// lock like any other write. Exits silently on failure - the reader sees
/// the same dead connection and performs the cleanup.
async fn heartbeat_loop(transport: std::sync::Weak<ClientTransport>, interval: Duration) {
    let mut tick = tokio::time::interval(interval);
    tick.tick().await; // the first tick completes immediately
    loop {
        tick.tick().await;
        let Some(transport) = transport.upgrade() else {
            return;
        };
        let header = Header::heartbeat(transport.codec.kind());
        let mut send = transport.send.lock().await;
        if write_frame(&mut send.writer, &header, &[]).await.is_err() {
            return;
        }
    }
}

//! Aggregator Egress Client
//!
//! A connection to the aggregator carries one server stream of log
//! envelopes: the client writes a single subscription request line and then
//! reads newline-delimited envelopes until either side closes. The closer
//! owns the transport; closing it terminates an active stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_stream::Stream;
use uuid::Uuid;

/// Subscription request opening one envelope stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressRequest {
    pub shard_id: String,
    pub source_id: String,
}

/// One log record received from the aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Nanoseconds since the Unix epoch
    pub timestamp: i64,
    pub source_id: String,
    pub instance_id: String,
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum EgressError {
    #[error("egress client unavailable")]
    Unavailable,
    #[error("egress connection closed")]
    Closed,
    #[error("egress connection already has an active receiver")]
    ReceiverInUse,
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<Envelope, EgressError>> + Send>>;

/// Client side of the aggregator egress API
#[async_trait]
pub trait EgressStreamer: Send + Sync {
    /// Open the envelope stream for one application. A connection carries
    /// at most one receiver stream over its lifetime.
    async fn receiver(&self, request: EgressRequest) -> Result<EnvelopeStream, EgressError>;
}

/// Owns an egress connection's transport. Closing is idempotent.
pub trait Closer: Send + Sync {
    fn close(&self);
}

struct ConnInner {
    id: Uuid,
    addr: String,
    socket: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
    close_signal: Notify,
}

/// A live connection to one aggregator egress endpoint
#[derive(Clone)]
pub struct EgressConn {
    inner: Arc<ConnInner>,
}

/// Exclusive owner of an [`EgressConn`]'s transport
pub struct EgressCloser {
    inner: Arc<ConnInner>,
}

impl EgressConn {
    /// Wrap an established socket into a client handle and its closer.
    pub fn pair(addr: String, socket: TcpStream) -> (EgressCloser, EgressConn) {
        let inner = Arc::new(ConnInner {
            id: Uuid::new_v4(),
            addr,
            socket: Mutex::new(Some(socket)),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        });

        (
            EgressCloser {
                inner: Arc::clone(&inner),
            },
            EgressConn { inner },
        )
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Closer for EgressCloser {
    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // drop an unclaimed socket and wake an active receiver stream
        let taken = {
            let mut socket = self
                .inner
                .socket
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            socket.take()
        };
        drop(taken);
        self.inner.close_signal.notify_waiters();
    }
}

struct ReceiverState {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    // holding the write half keeps our side of the connection open
    _write: OwnedWriteHalf,
    inner: Arc<ConnInner>,
    done: bool,
}

#[async_trait]
impl EgressStreamer for EgressConn {
    async fn receiver(&self, request: EgressRequest) -> Result<EnvelopeStream, EgressError> {
        if self.is_closed() {
            return Err(EgressError::Closed);
        }

        let socket = {
            let mut slot = self
                .inner
                .socket
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.take().ok_or(EgressError::ReceiverInUse)?
        };

        let (read_half, mut write_half) = socket.into_split();

        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        write_half.write_all(&line).await?;

        let state = ReceiverState {
            lines: BufReader::new(read_half).lines(),
            _write: write_half,
            inner: Arc::clone(&self.inner),
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }

            let inner = Arc::clone(&state.inner);
            let mut closed = std::pin::pin!(inner.close_signal.notified());
            // register interest before re-checking the flag, so a close
            // racing this poll cannot be missed
            closed.as_mut().enable();
            if inner.closed.load(Ordering::SeqCst) {
                state.done = true;
                return Some((Err(EgressError::Closed), state));
            }

            let item = tokio::select! {
                _ = &mut closed => {
                    state.done = true;
                    Err(EgressError::Closed)
                }
                line = state.lines.next_line() => match line {
                    Ok(Some(line)) => match serde_json::from_str::<Envelope>(&line) {
                        Ok(envelope) => Ok(envelope),
                        Err(e) => {
                            state.done = true;
                            Err(EgressError::Malformed(e))
                        }
                    },
                    // clean end of stream from the aggregator
                    Ok(None) => return None,
                    Err(e) => {
                        state.done = true;
                        Err(EgressError::Io(e))
                    }
                }
            };

            Some((item, state))
        });

        Ok(Box::pin(stream))
    }
}

/// Placeholder client handed out before any slot has connected. Every call
/// fails cleanly so callers fall into their retry path instead of blocking.
pub struct StubEgressClient;

#[async_trait]
impl EgressStreamer for StubEgressClient {
    async fn receiver(&self, _request: EgressRequest) -> Result<EnvelopeStream, EgressError> {
        Err(EgressError::Unavailable)
    }
}

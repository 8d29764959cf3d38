//! A `Face` wraps one QUIC connection to a neighbor router. Each
//! forwarded packet travels its own unidirectional stream; a
//! background task accepts inbound streams and republishes decoded
//! packets as `FaceEvent`s. There is no request/response matching
//! here — that belongs to the PIT in `ccnf-core`, not the transport.

use crate::{CCNF_QUIC_MTU, DEFAULT_FRAGMENT_SIZE};
use anyhow::{anyhow, Context, Result};
use ccnf_common::metrics::TransportMetrics;
use ccnf_common::packet::Packet;
use ccnf_common::wire::{decode_packet, encode_packet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::fragmentation::{fragment_packet, needs_fragmentation};

/// Something that happened on a `Face`, surfaced to whoever owns the
/// transport (normally the node's dispatch loop).
#[derive(Debug)]
pub enum FaceEvent {
    PacketReceived(Packet),
    Closed,
    Error(String),
}

/// One QUIC connection to a neighbor, identified by the label the
/// owner assigned it (typically the peer's address).
pub struct Face {
    id: String,
    connection: quinn::Connection,
    closed: Arc<AtomicBool>,
    event_sender: mpsc::UnboundedSender<FaceEvent>,
    event_receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<FaceEvent>>,
    metrics: Arc<TransportMetrics>,
}

impl Face {
    pub fn new_from_connection(id: String, connection: quinn::Connection, metrics: Arc<TransportMetrics>) -> Arc<Self> {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let face = Arc::new(Self {
            id,
            connection,
            closed: Arc::new(AtomicBool::new(false)),
            event_sender,
            event_receiver: tokio::sync::Mutex::new(event_receiver),
            metrics,
        });
        face.metrics.faces_opened.increment();
        face.clone().spawn_accept_loop();
        face
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_address(&self) -> std::net::SocketAddr {
        self.connection.remote_address()
    }

    fn spawn_accept_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                match self.connection.accept_uni().await {
                    Ok(recv) => {
                        let face = self.clone();
                        tokio::spawn(async move { face.process_incoming_stream(recv).await });
                    }
                    Err(e) => {
                        if !self.closed.swap(true, Ordering::SeqCst) {
                            self.metrics.faces_closed.increment();
                            let _ = self.event_sender.send(FaceEvent::Closed);
                            log::debug!("face {} closed: {e}", self.id);
                        }
                        break;
                    }
                }
            }
        });
    }

    async fn process_incoming_stream(&self, mut recv: quinn::RecvStream) {
        let mut fragments = VecDeque::new();
        loop {
            match recv.read_chunk(CCNF_QUIC_MTU, true).await {
                Ok(Some(chunk)) => fragments.push_back(chunk.bytes),
                Ok(None) => break,
                Err(e) => {
                    let _ = self.event_sender.send(FaceEvent::Error(format!("stream read failed: {e}")));
                    return;
                }
            }
        }
        if fragments.is_empty() {
            return;
        }
        let assembled = if fragments.len() == 1 {
            fragments.pop_front().unwrap()
        } else {
            match crate::fragmentation::assemble_fragments(fragments) {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = self.event_sender.send(FaceEvent::Error(format!("reassembly failed: {e}")));
                    return;
                }
            }
        };
        match decode_packet(&assembled) {
            Ok(packet) => {
                self.metrics.packets_received.increment();
                let _ = self.event_sender.send(FaceEvent::PacketReceived(packet));
            }
            Err(e) => {
                self.metrics.decode_errors.increment();
                let _ = self.event_sender.send(FaceEvent::Error(format!("decode failed: {e}")));
            }
        }
    }

    /// Encodes and writes `packet` to a fresh unidirectional stream.
    /// Fails rather than panicking when the packet can't be encoded —
    /// an oversized ContentObject's content is ordinary user error, not
    /// a reason to bring the node down (spec.md §7).
    pub async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let bytes = encode_packet(packet).context("failed to encode packet")?;
        let mut send = self
            .connection
            .open_uni()
            .await
            .context("failed to open outbound stream")?;

        let result: Result<()> = async {
            if needs_fragmentation(bytes.len(), DEFAULT_FRAGMENT_SIZE) {
                for fragment in fragment_packet(&bytes, DEFAULT_FRAGMENT_SIZE) {
                    send.write_all(&fragment).await.context("failed to write fragment")?;
                }
            } else {
                send.write_all(&bytes).await.context("failed to write packet")?;
            }
            send.finish().await.context("failed to finish stream")?;
            Ok(())
        }
        .await;

        match &result {
            Ok(()) => self.metrics.packets_sent.increment(),
            Err(_) => self.metrics.send_errors.increment(),
        }
        result
    }

    /// Pulls the next event off this face, or `None` once it has
    /// closed and drained.
    pub async fn next_event(&self) -> Option<FaceEvent> {
        self.event_receiver.lock().await.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connection.close(0u32.into(), b"closed");
        self.metrics.faces_closed.increment();
        self.event_sender
            .send(FaceEvent::Closed)
            .map_err(|_| anyhow!("event channel already closed"))
    }
}

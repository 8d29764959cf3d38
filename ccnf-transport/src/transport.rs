//! High-level façade over `QuicServer`/`QuicClient`: one entry point
//! that owns every face this node has open and republishes their
//! events on a single channel.

use anyhow::{anyhow, Result};
use ccnf_common::metrics::TransportMetrics;
use ccnf_common::packet::Packet;
use std::{net::ToSocketAddrs, sync::Arc, time::Duration};
use tokio::sync::{mpsc, RwLock};

use crate::{
    face::{Face, FaceEvent},
    ClientOptions, QuicClient, QuicServer, ServerOptions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Client,
    Server,
    Dual,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub mode: TransportMode,
    pub server_options: Option<ServerOptions>,
    pub client_options: ClientOptions,
    pub event_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Client,
            server_options: None,
            client_options: ClientOptions::default(),
            event_buffer_size: 256,
        }
    }
}

#[derive(Debug)]
pub enum TransportEvent {
    FaceCreated(String),
    FaceClosed(String),
    PacketReceived { packet: Packet, face_id: String },
    Error(String),
}

/// Owns the client and/or server endpoint for one node and fans every
/// face's events into a single `TransportEvent` stream.
pub struct QuicTransport {
    client: Option<Arc<QuicClient>>,
    server: Option<Arc<QuicServer>>,
    faces: Arc<RwLock<Vec<Arc<Face>>>>,
    event_sender: mpsc::Sender<TransportEvent>,
    event_receiver: RwLock<Option<mpsc::Receiver<TransportEvent>>>,
    metrics: Arc<TransportMetrics>,
}

impl QuicTransport {
    pub async fn new(config: TransportConfig) -> Result<Self> {
        let (event_sender, event_receiver) = mpsc::channel(config.event_buffer_size);

        let client = match config.mode {
            TransportMode::Client | TransportMode::Dual => {
                Some(Arc::new(QuicClient::new(config.client_options.clone())?))
            }
            TransportMode::Server => None,
        };

        let server = match config.mode {
            TransportMode::Server | TransportMode::Dual => {
                let options = config
                    .server_options
                    .clone()
                    .ok_or_else(|| anyhow!("server options required in Server or Dual mode"))?;
                Some(Arc::new(QuicServer::new(options).await?))
            }
            TransportMode::Client => None,
        };

        let metrics = client
            .as_ref()
            .map(|c| c.metrics())
            .or_else(|| server.as_ref().map(|s| s.metrics()))
            .unwrap_or_else(|| Arc::new(TransportMetrics::new()));

        let transport = Self {
            client,
            server,
            faces: Arc::new(RwLock::new(Vec::new())),
            event_sender,
            event_receiver: RwLock::new(Some(event_receiver)),
            metrics,
        };

        if let Some(server) = &transport.server {
            server.run();
        }
        transport.spawn_event_pump();
        Ok(transport)
    }

    pub async fn connect<T: ToSocketAddrs + std::fmt::Debug>(&self, addr: T) -> Result<Arc<Face>> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| anyhow!("transport has no client endpoint (Server-only mode)"))?;
        let face = client.connect(addr).await?;
        self.faces.write().await.push(Arc::clone(&face));
        let _ = self.event_sender.send(TransportEvent::FaceCreated(face.id().to_string())).await;
        Ok(face)
    }

    pub async fn send(&self, packet: &Packet, face_id: &str) -> Result<()> {
        let faces = self.faces.read().await;
        let face = faces
            .iter()
            .find(|f| f.id() == face_id)
            .ok_or_else(|| anyhow!("no such face: {face_id}"))?;
        face.send_packet(packet).await
    }

    pub async fn next_event(&self) -> Option<TransportEvent> {
        self.event_receiver.write().await.as_mut()?.recv().await
    }

    pub fn metrics(&self) -> Arc<TransportMetrics> {
        Arc::clone(&self.metrics)
    }

    pub async fn faces(&self) -> Vec<Arc<Face>> {
        self.faces.read().await.clone()
    }

    pub async fn close(&self) -> Result<()> {
        for face in self.faces.read().await.iter() {
            face.close().await?;
        }
        if let Some(client) = &self.client {
            client.close().await?;
        }
        if let Some(server) = &self.server {
            server.stop().await?;
        }
        Ok(())
    }

    /// Polls every known face for its next event and republishes it,
    /// also absorbing faces the server has accepted since the last
    /// pass.
    fn spawn_event_pump(&self) {
        let faces = Arc::clone(&self.faces);
        let server = self.server.clone();
        let event_sender = self.event_sender.clone();

        tokio::spawn(async move {
            loop {
                if let Some(server) = &server {
                    let accepted = server.faces().await;
                    let mut known = faces.write().await;
                    for face in accepted {
                        if !known.iter().any(|f| f.id() == face.id()) {
                            let _ = event_sender.send(TransportEvent::FaceCreated(face.id().to_string())).await;
                            known.push(face);
                        }
                    }
                }

                let snapshot = faces.read().await.clone();
                for face in &snapshot {
                    if let Some(event) = tokio::time::timeout(Duration::from_millis(10), face.next_event()).await.ok().flatten() {
                        match event {
                            FaceEvent::PacketReceived(packet) => {
                                let _ = event_sender
                                    .send(TransportEvent::PacketReceived { packet, face_id: face.id().to_string() })
                                    .await;
                            }
                            FaceEvent::Closed => {
                                let _ = event_sender.send(TransportEvent::FaceClosed(face.id().to_string())).await;
                                faces.write().await.retain(|f| f.id() != face.id());
                            }
                            FaceEvent::Error(e) => {
                                let _ = event_sender.send(TransportEvent::Error(format!("face {}: {e}", face.id()))).await;
                            }
                        }
                    }
                }

                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
    }
}

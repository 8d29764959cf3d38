//! QUIC transport carrying the CCNF wire format between routers.
//!
//! Each neighbor link is one QUIC connection; each forwarded packet
//! rides its own unidirectional stream, self-framed by
//! `ccnf_common::wire`. Fragmentation below the QUIC MTU is handled
//! here; everything above packet delivery — PIT matching, FIB lookup,
//! NFP — belongs to `ccnf-core` and `ccnf-nfp`.

use anyhow::{anyhow, Context, Result};
use ccnf_common::metrics::TransportMetrics;
use log::{debug, info, warn};
use quinn::{ClientConfig, Endpoint, ServerConfig};
use std::{
    collections::HashMap,
    fmt::Debug,
    net::{SocketAddr, ToSocketAddrs},
    sync::Arc,
};
use tokio::sync::RwLock;

mod config;
mod face;
mod fragmentation;
mod transport;

pub use config::{ClientOptions, ServerOptions};
pub use face::{Face, FaceEvent};
pub use transport::{QuicTransport, TransportConfig, TransportEvent, TransportMode};

/// Default QUIC port for a CCNF router.
pub const CCNF_QUIC_PORT: u16 = 6363;

/// ALPN protocol string advertised over QUIC.
pub const CCNF_QUIC_ALPN: &[u8] = b"ccnf1";

/// The largest chunk a stream read will be filled with at once.
pub const CCNF_QUIC_MTU: usize = 1200;

/// Largest packet the wire format's `total_length` field can express.
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// Packets larger than this are split across several stream writes.
pub const DEFAULT_FRAGMENT_SIZE: usize = 1000;

/// A listening QUIC endpoint that turns inbound connections into
/// `Face`s.
#[derive(Clone)]
pub struct QuicServer {
    endpoint: Endpoint,
    #[allow(dead_code)]
    server_config: ServerConfig,
    address: SocketAddr,
    faces: Arc<RwLock<HashMap<String, Arc<Face>>>>,
    metrics: Arc<TransportMetrics>,
}

impl QuicServer {
    pub async fn new(options: ServerOptions) -> Result<Self> {
        let server_config = config::configure_server(&options)?;
        let endpoint = Endpoint::server(
            server_config.clone(),
            options.listen_addr.parse().context("invalid listen address")?,
        )?;
        let address = endpoint.local_addr()?;
        info!("ccnf quic server listening on {address}");

        Ok(Self {
            endpoint,
            server_config,
            address,
            faces: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(TransportMetrics::new()),
        })
    }

    pub fn run(&self) {
        let endpoint = self.endpoint.clone();
        let faces = Arc::clone(&self.faces);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            while let Some(incoming) = endpoint.accept().await {
                let faces = Arc::clone(&faces);
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    match incoming.await {
                        Ok(connection) => {
                            let remote = connection.remote_address();
                            info!("accepted connection from {remote}");
                            let face_id = format!("quic:{remote}");
                            let face = Face::new_from_connection(face_id.clone(), connection, metrics);
                            faces.write().await.insert(face_id, face);
                        }
                        Err(e) => warn!("inbound connection failed: {e}"),
                    }
                });
            }
        });
    }

    pub async fn faces(&self) -> Vec<Arc<Face>> {
        self.faces.read().await.values().cloned().collect()
    }

    pub fn metrics(&self) -> Arc<TransportMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub async fn stop(&self) -> Result<()> {
        for face in self.faces.read().await.values() {
            face.close().await?;
        }
        self.endpoint.close(0u32.into(), b"server shutting down");
        Ok(())
    }
}

/// An outbound QUIC endpoint that dials neighbors and turns each
/// connection into a `Face`.
#[derive(Clone)]
pub struct QuicClient {
    endpoint: Endpoint,
    #[allow(dead_code)]
    client_config: ClientConfig,
    faces: Arc<RwLock<HashMap<String, Arc<Face>>>>,
    metrics: Arc<TransportMetrics>,
}

impl QuicClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let client_config = config::configure_client(&options)?;
        let mut endpoint = Endpoint::client("0.0.0.0:0".parse()?)?;
        endpoint.set_default_client_config(client_config.clone());

        Ok(Self {
            endpoint,
            client_config,
            faces: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(TransportMetrics::new()),
        })
    }

    pub async fn connect<T: ToSocketAddrs + Debug>(&self, addr: T) -> Result<Arc<Face>> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow!("failed to resolve address {addr:?}"))?;
        debug!("connecting to {addr}");

        let connection = self
            .endpoint
            .connect(addr, "localhost")?
            .await
            .map_err(|e| anyhow!("connect to {addr} failed: {e}"))?;
        info!("connected to {addr}");

        let face_id = format!("quic:{addr}");
        let face = Face::new_from_connection(face_id.clone(), connection, Arc::clone(&self.metrics));
        self.faces.write().await.insert(face_id, Arc::clone(&face));
        Ok(face)
    }

    pub async fn faces(&self) -> Vec<Arc<Face>> {
        self.faces.read().await.values().cloned().collect()
    }

    pub fn metrics(&self) -> Arc<TransportMetrics> {
        Arc::clone(&self.metrics)
    }

    pub async fn close(&self) -> Result<()> {
        for face in self.faces.read().await.values() {
            face.close().await?;
        }
        self.endpoint.close(0u32.into(), b"client shutting down");
        Ok(())
    }
}

//! QUIC transport configuration: certificates, idle/keep-alive
//! timings, and ALPN setup for both client and server endpoints.

use anyhow::{Context, Result};
use quinn::{ClientConfig, ServerConfig, VarInt};
use rustls::{Certificate, PrivateKey};
use std::{
    fs::File,
    io::{BufReader, Seek},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::CCNF_QUIC_ALPN;

/// Server-side endpoint options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub listen_addr: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub idle_timeout_ms: Option<u64>,
    pub keep_alive_interval_ms: Option<u64>,
    /// Caps simultaneous unidirectional streams per neighbor
    /// connection — since every forwarded packet is one stream
    /// (`Face::send_packet`), this is really a bound on how many
    /// Interests/ContentObjects can be in flight to one neighbor at
    /// once, not a connection count.
    pub max_concurrent_streams: Option<u32>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:6363".to_string(),
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
            idle_timeout_ms: Some(30_000),
            keep_alive_interval_ms: Some(5_000),
            max_concurrent_streams: Some(1_000),
        }
    }
}

/// Client-side endpoint options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub ca_cert_path: Option<PathBuf>,
    pub idle_timeout_ms: Option<u64>,
    pub keep_alive_interval_ms: Option<u64>,
    pub verify_certificate: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            ca_cert_path: None,
            idle_timeout_ms: Some(30_000),
            keep_alive_interval_ms: Some(5_000),
            verify_certificate: true,
        }
    }
}

pub fn configure_server(options: &ServerOptions) -> Result<ServerConfig> {
    let cert = read_certificate(&options.cert_path)?;
    let key = read_private_key(&options.key_path)?;

    let mut server_crypto = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .context("failed to build server config from certificate")?;
    server_crypto.alpn_protocols = vec![CCNF_QUIC_ALPN.to_vec()];

    let mut server_config = ServerConfig::with_crypto(Arc::new(server_crypto));

    let transport_config = Arc::get_mut(&mut server_config.transport)
        .context("server transport config has outstanding references")?;
    if let Some(idle_timeout_ms) = options.idle_timeout_ms {
        transport_config.max_idle_timeout(Some(VarInt::from_u32(idle_timeout_ms as u32).into()));
    }
    if let Some(keep_alive_ms) = options.keep_alive_interval_ms {
        transport_config.keep_alive_interval(Some(Duration::from_millis(keep_alive_ms)));
    }
    if let Some(max_streams) = options.max_concurrent_streams {
        transport_config.max_concurrent_uni_streams(VarInt::from_u32(max_streams));
    }

    Ok(server_config)
}

pub fn configure_client(options: &ClientOptions) -> Result<ClientConfig> {
    let mut client_crypto = if options.verify_certificate {
        let builder = rustls::ClientConfig::builder().with_safe_defaults();
        if let Some(ca_path) = &options.ca_cert_path {
            let ca_cert = read_certificate(ca_path)?;
            let mut roots = rustls::RootCertStore::empty();
            roots.add(&ca_cert)?;
            builder.with_root_certificates(roots).with_no_client_auth()
        } else {
            let mut roots = rustls::RootCertStore::empty();
            roots.add_server_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.0.iter().map(|ta| {
                rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    } else {
        rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
            .with_no_client_auth()
    };
    client_crypto.enable_early_data = true;
    client_crypto.alpn_protocols = vec![CCNF_QUIC_ALPN.to_vec()];

    let mut client_config = ClientConfig::new(Arc::new(client_crypto));
    let mut transport_config = quinn::TransportConfig::default();
    if let Some(idle_timeout_ms) = options.idle_timeout_ms {
        transport_config.max_idle_timeout(Some(VarInt::from_u32(idle_timeout_ms as u32).into()));
    }
    if let Some(keep_alive_ms) = options.keep_alive_interval_ms {
        transport_config.keep_alive_interval(Some(Duration::from_millis(keep_alive_ms)));
    }
    client_config.transport_config(Arc::new(transport_config));

    Ok(client_config)
}

fn read_certificate<P: AsRef<Path>>(path: P) -> Result<Certificate> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("failed to open certificate file: {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader).map_err(|_| anyhow::anyhow!("failed to parse certificate"))?;
    certs
        .into_iter()
        .next()
        .map(Certificate)
        .ok_or_else(|| anyhow::anyhow!("no certificate found in {}", path.as_ref().display()))
}

fn read_private_key<P: AsRef<Path>>(path: P) -> Result<PrivateKey> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("failed to open key file: {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);

    if let Ok(keys) = rustls_pemfile::pkcs8_private_keys(&mut reader) {
        if let Some(key) = keys.into_iter().next() {
            return Ok(PrivateKey(key));
        }
    }
    reader.seek(std::io::SeekFrom::Start(0))?;
    if let Ok(keys) = rustls_pemfile::rsa_private_keys(&mut reader) {
        if let Some(key) = keys.into_iter().next() {
            return Ok(PrivateKey(key));
        }
    }
    Err(anyhow::anyhow!("no private key found in {}", path.as_ref().display()))
}

struct SkipServerVerification;

impl rustls::client::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

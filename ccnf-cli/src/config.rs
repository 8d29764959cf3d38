//! Node configuration: an optional TOML file loaded into a
//! `NodeConfig` aggregate, following the teacher's `ServerOptions`/
//! `ClientOptions` pattern of plain structs with `Default` impls.

use anyhow::{Context, Result};
use ccnf_core::config::{ContentStoreConfig, FibConfig, ForwarderConfig, PitConfig};
use ccnf_nfp::NfpConfig;
use ccnf_transport::{ClientOptions, ServerOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A bootstrap FIB entry applied when a node starts, before NFP has
/// learned anything. `neighbor` indexes into `connect_to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticRoute {
    pub prefix: String,
    pub neighbor: usize,
}

/// Content this node serves locally, answering matching Interests the
/// same way any other neighbor would.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServedContent {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub router_name: String,
    pub listen_addr: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub connect_to: Vec<String>,
    pub anchor_prefixes: Vec<String>,
    pub static_routes: Vec<StaticRoute>,
    pub served: Vec<ServedContent>,
    pub content_store_capacity: usize,
    pub pit_default_lifetime_ms: u64,
    pub hello_interval_ms: u64,
    pub advertise_interval_ms: u64,
    pub anchor_route_interval_ms: u64,
    pub neighbor_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let cs = ContentStoreConfig::default();
        let pit = PitConfig::default();
        let nfp = NfpConfig::default();
        Self {
            router_name: "/routers/node".to_string(),
            listen_addr: format!("0.0.0.0:{}", ccnf_transport::CCNF_QUIC_PORT),
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
            connect_to: Vec::new(),
            anchor_prefixes: Vec::new(),
            static_routes: Vec::new(),
            served: Vec::new(),
            content_store_capacity: cs.object_capacity,
            pit_default_lifetime_ms: pit.default_lifetime.as_millis() as u64,
            hello_interval_ms: nfp.hello_interval.as_millis() as u64,
            advertise_interval_ms: nfp.advertise_interval.as_millis() as u64,
            anchor_route_interval_ms: nfp.anchor_route_interval.as_millis() as u64,
            neighbor_timeout_ms: nfp.neighbor_timeout.as_millis() as u64,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    pub fn content_store_config(&self) -> ContentStoreConfig {
        ContentStoreConfig {
            object_capacity: self.content_store_capacity,
            ..ContentStoreConfig::default()
        }
    }

    pub fn pit_config(&self) -> PitConfig {
        PitConfig {
            default_lifetime: Duration::from_millis(self.pit_default_lifetime_ms),
            ..PitConfig::default()
        }
    }

    pub fn fib_config(&self) -> FibConfig {
        FibConfig::default()
    }

    pub fn forwarder_config(&self) -> ForwarderConfig {
        ForwarderConfig::default()
    }

    pub fn nfp_config(&self) -> NfpConfig {
        NfpConfig {
            hello_interval: Duration::from_millis(self.hello_interval_ms),
            advertise_interval: Duration::from_millis(self.advertise_interval_ms),
            anchor_route_interval: Duration::from_millis(self.anchor_route_interval_ms),
            neighbor_timeout: Duration::from_millis(self.neighbor_timeout_ms),
            ..NfpConfig::default()
        }
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            listen_addr: self.listen_addr.clone(),
            cert_path: self.cert_path.clone(),
            key_path: self.key_path.clone(),
            ..ServerOptions::default()
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            verify_certificate: false,
            ..ClientOptions::default()
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, text).with_context(|| format!("failed to write config file: {}", path.display()))
    }
}

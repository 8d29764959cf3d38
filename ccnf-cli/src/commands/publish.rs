//! Boots a node that serves one extra name locally, answering matching
//! Interests the same way any other neighbor's content would, until
//! interrupted.

use crate::config::{NodeConfig, ServedContent};
use crate::node::Node;
use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tokio::signal;

pub async fn publish_content(config_path: &Path, name: String, content: String, ttl: Duration) -> Result<()> {
    let mut config = if config_path.exists() { NodeConfig::load(config_path)? } else { NodeConfig::default() };
    config.served.push(ServedContent { name: name.clone(), content, ttl_ms: Some(ttl.as_millis() as u64) });

    let node = Node::start(&config).await?;
    println!("serving {name} (ttl {ttl:?}); press Ctrl+C to stop");

    signal::ctrl_c().await?;
    println!("shutting down");
    node.transport.close().await?;
    Ok(())
}

//! Boots a node from a config file, sends one Interest, and prints
//! whatever Data comes back (or the no-route/timeout outcome).

use crate::config::NodeConfig;
use crate::node::Node;
use crate::utils::{describe_content_size, elapsed_ms};
use anyhow::Result;
use ccnf_common::name::Name;
use std::path::Path;
use std::time::{Duration, Instant};

pub async fn send_interest(config_path: &Path, name_str: String, timeout: Duration) -> Result<()> {
    let config = if config_path.exists() { NodeConfig::load(config_path)? } else { NodeConfig::default() };
    let node = Node::start(&config).await?;

    let name = Name::from_uri(&name_str);
    println!("sending Interest for {name_str} (timeout {timeout:?})");
    let start = Instant::now();

    match node.express_interest(name, timeout).await {
        Ok(content_object) => {
            println!("received Data in {}", elapsed_ms(start));
            println!("  name: {}", content_object.name);
            println!("  content: {}", describe_content_size(content_object.content.len()));
            if let Ok(text) = std::str::from_utf8(&content_object.content) {
                println!("  as text: {text}");
            }
        }
        Err(e) => println!("failed: {e}"),
    }

    node.transport.close().await?;
    Ok(())
}

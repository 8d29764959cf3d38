//! Boots a full node and keeps it running, printing periodic
//! statistics, until interrupted.

use crate::config::NodeConfig;
use crate::node::Node;
use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tokio::signal;

pub async fn run_node(config_path: &Path, stats_interval: Duration) -> Result<()> {
    let config = if config_path.exists() { NodeConfig::load(config_path)? } else { NodeConfig::default() };
    let node = Node::start(&config).await?;
    println!("{} listening on {}", config.router_name, config.listen_addr);

    let mut interval = tokio::time::interval(stats_interval);
    interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = interval.tick() => super::stats::print_snapshot(&node),
            result = signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    println!("shutting down");
    node.transport.close().await?;
    Ok(())
}

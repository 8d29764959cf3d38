//! One-shot and periodic statistics snapshots, pulled from the
//! forwarder, NFP, and transport metric structs directly (no separate
//! metrics exporter in scope).

use crate::config::NodeConfig;
use crate::node::Node;
use crate::utils::print_section;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub async fn print_stats(config_path: &Path, settle: Duration) -> Result<()> {
    let config = if config_path.exists() { NodeConfig::load(config_path)? } else { NodeConfig::default() };
    let node = Node::start(&config).await?;

    tokio::time::sleep(settle).await;
    print_snapshot(&node);

    node.transport.close().await?;
    Ok(())
}

pub fn print_snapshot(node: &Arc<Node>) {
    print_section("forwarder");
    let fwd = node.forwarder.metrics();
    println!("fib routes:      {}", node.forwarder.fib().route_count());
    println!("pit entries:     {}", node.forwarder.pit().len());
    println!("packets in:      {}", fwd.packets_in.value());
    println!("packets out:     {}", fwd.packets_out.value());
    println!("interests:       fib hit {} / fib miss {}", fwd.interests_fib_hit.value(), fwd.interests_fib_miss.value());
    println!("content objects: pit hit {} / pit miss {}", fwd.content_objects_pit_hit.value(), fwd.content_objects_pit_miss.value());

    print_section("nfp");
    let nfp = node.protocol.metrics();
    println!("router:          {}", node.protocol.router_name());
    println!("neighbors up:    {}", nfp.neighbors_up.value());
    println!("neighbors down:  {}", nfp.neighbors_down.value());
    println!("routes learned:  {}", nfp.routes_installed.value());
    println!("routes withdrawn:{}", nfp.routes_withdrawn.value());

    print_section("transport");
    let transport = node.transport.metrics();
    println!("packets sent:    {}", transport.packets_sent.value());
    println!("packets recv:    {}", transport.packets_received.value());
    println!("send errors:     {}", transport.send_errors.value());
    println!("decode errors:   {}", transport.decode_errors.value());
}

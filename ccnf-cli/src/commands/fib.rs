//! Bootstrap route management. There is no live daemon to talk to, so
//! these commands edit the `static_routes` list in a node's config
//! file directly; the routes take effect the next time the node is
//! started with `run`.

use crate::config::{NodeConfig, StaticRoute};
use crate::FibCommands;
use anyhow::{Context, Result};
use std::path::Path;

pub async fn handle_command(cmd: FibCommands) -> Result<()> {
    match cmd {
        FibCommands::Add { prefix, neighbor, config } => add_route(&config, prefix, neighbor),
        FibCommands::Remove { prefix, config } => remove_route(&config, prefix),
        FibCommands::Show { config } => show_routes(&config),
    }
}

fn load_or_default(path: &Path) -> Result<NodeConfig> {
    if path.exists() {
        NodeConfig::load(path)
    } else {
        Ok(NodeConfig::default())
    }
}

fn add_route(path: &Path, prefix: String, neighbor: usize) -> Result<()> {
    let mut config = load_or_default(path)?;
    config.static_routes.push(StaticRoute { prefix: prefix.clone(), neighbor });
    config.save(path).with_context(|| format!("failed to write {}", path.display()))?;
    println!("added route {prefix} -> connect_to[{neighbor}]");
    Ok(())
}

fn remove_route(path: &Path, prefix: String) -> Result<()> {
    let mut config = NodeConfig::load(path)?;
    let before = config.static_routes.len();
    config.static_routes.retain(|route| route.prefix != prefix);
    let removed = before - config.static_routes.len();
    config.save(path)?;
    println!("removed {removed} route(s) matching {prefix}");
    Ok(())
}

fn show_routes(path: &Path) -> Result<()> {
    let config = load_or_default(path)?;
    println!("anchor prefixes:");
    for prefix in &config.anchor_prefixes {
        println!("  {prefix}");
    }
    println!("bootstrap routes:");
    for route in &config.static_routes {
        println!("  {} -> connect_to[{}]", route.prefix, route.neighbor);
    }
    Ok(())
}

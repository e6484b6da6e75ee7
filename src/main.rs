use anyhow::{Context, bail};
use distributed_mqueue::broker::client::Client;
use distributed_mqueue::cluster::heartbeat::HeartbeatMonitor;
use distributed_mqueue::cluster::load_balancer::LoadBalancer;
use distributed_mqueue::config::{BrokerConfig, HeartbeatConfig};
use distributed_mqueue::node::node::Node;
use distributed_mqueue::queue::types::Message;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

struct Args {
    id: String,
    bind: String,
    data_dir: PathBuf,
    queues: Vec<String>,
    peers: Vec<(String, String)>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--id <id>] [--data-dir <dir>] [--queue <name>]... [--peer <id>=<addr:port>]...",
            args[0]
        );
        eprintln!("Example: {} --bind :9101 --queue orders", args[0]);
        eprintln!(
            "Example: {} --bind :9102 --id node2 --peer node1=127.0.0.1:9101 --queue orders",
            args[0]
        );

        std::process::exit(1);
    }

    let args = parse_args(&args)?;

    tracing::info!("Starting node {} on {}", args.id, args.bind);
    tracing::info!("Data directory: {}", args.data_dir.display());

    // 1. Node (broker + RPC listener):
    let config = BrokerConfig::new(args.data_dir.join(&args.id));
    let node = Node::with_config(args.id.clone(), &args.bind, config).await?;

    // 2. Queues with a logging consumer each:
    let client = Client::new(node.broker.clone());
    let mut consumers = Vec::new();

    for name in &args.queues {
        node.broker.create_queue(name).await?;

        let node_id = node.id.clone();
        let handle = client
            .consume(name, move |msg: Message| {
                let node_id = node_id.clone();
                async move {
                    tracing::info!(
                        "[{}] consumed {} ({} bytes): {}",
                        node_id,
                        msg.id,
                        msg.body.len(),
                        String::from_utf8_lossy(&msg.body)
                    );
                }
            })
            .await?;
        consumers.push(handle);
    }

    // 3. Peers, load balancer and heartbeat:
    let load_balancer = Arc::new(LoadBalancer::new());
    let monitor = HeartbeatMonitor::new(load_balancer.clone(), HeartbeatConfig::default());

    for (peer_id, peer_addr) in &args.peers {
        if let Err(e) = node.connect_to_peer(peer_id.as_str(), peer_addr).await {
            tracing::warn!("Peer {} at {} unreachable: {}", peer_id, peer_addr, e);
            continue;
        }
        if let Some(peer) = node.peer(&peer_id.as_str().into()) {
            load_balancer.add_node(peer_id.as_str(), peer.clone());
            monitor.add_node(peer_id.as_str(), peer_addr, peer);
        }
    }

    let heartbeat = (!args.peers.is_empty()).then(|| monitor.clone().start());

    // 4. Spawn stats reporter:
    let stats_node = node.clone();
    let stats_balancer = load_balancer.clone();
    let stats = tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);

        loop {
            interval.tick().await;
            for name in stats_node.broker.queue_manager.queue_names().await {
                if let Ok(queue) = stats_node.broker.queue_manager.get_queue(&name).await {
                    let on_disk = queue.persisted_ids().await.map(|ids| ids.len()).unwrap_or(0);
                    tracing::info!(
                        "Queue stats: {} buffered={}/{} on_disk={}",
                        name,
                        queue.buffered(),
                        queue.capacity(),
                        on_disk
                    );
                }
            }
            if !stats_balancer.is_empty() {
                tracing::info!("Cluster stats: {} reachable peers", stats_balancer.len());
                for id in stats_balancer.node_ids() {
                    tracing::info!("  - {}", id);
                }
            }
        }
    });

    tracing::info!("Node {} ready at {}", node.id, node.dial_address());
    tracing::info!("Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    // 5. Teardown:
    stats.abort();
    monitor.stop();
    if let Some(handle) = heartbeat {
        let _ = handle.await;
    }
    for consumer in consumers {
        consumer.stop();
        consumer.join().await;
    }
    client.close();
    node.shutdown().await;

    Ok(())
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut id: Option<String> = None;
    let mut bind: Option<String> = None;
    let mut data_dir = PathBuf::from("data");
    let mut queues = Vec::new();
    let mut peers = Vec::new();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .cloned()
                .with_context(|| format!("{} needs a value", flag))
        };

        match flag {
            "--id" => {
                id = Some(value()?);
                i += 2;
            }
            "--bind" => {
                bind = Some(value()?);
                i += 2;
            }
            "--data-dir" => {
                data_dir = PathBuf::from(value()?);
                i += 2;
            }
            "--queue" => {
                queues.push(value()?);
                i += 2;
            }
            "--peer" => {
                let raw = value()?;
                let Some((peer_id, addr)) = raw.split_once('=') else {
                    bail!("--peer expects <id>=<addr:port>, got {}", raw);
                };
                peers.push((peer_id.to_string(), addr.to_string()));
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind = bind.context("--bind is required")?;
    let id = id.unwrap_or_else(|| format!("node-{}", bind.trim_start_matches(':').replace(':', "-")));

    Ok(Args {
        id,
        bind,
        data_dir,
        queues,
        peers,
    })
}

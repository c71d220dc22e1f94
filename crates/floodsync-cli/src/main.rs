//! Floodsync CLI
//!
//! Thin wrapper around floodsync-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Run the scripted local simulation (no networking involved)
//! floodsync demo
//!
//! # Host a chat node on a TCP port
//! floodsync chat --listen 127.0.0.1:7000 --data alice.json
//!
//! # Join it from another terminal
//! floodsync chat --peer 127.0.0.1:7000 --data bob.json
//! ```
//!
//! The chat transport is plain TCP: fine on a trusted network, but the
//! protocol expects the host to supply authenticated, private channels, so
//! anything beyond a demo should wrap the stream accordingly.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use floodsync_core::{Node, Sim, StreamChannel};

/// Floodsync - serverless replication of append-only note logs
#[derive(Parser)]
#[command(name = "floodsync")]
#[command(version = "0.1.0")]
#[command(about = "Floodsync - serverless note replication")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted multi-node simulation locally
    Demo,

    /// Line-oriented group chat over plain TCP
    Chat {
        /// Address to accept peer connections on
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Peer addresses to connect out to (repeatable)
        #[arg(long)]
        peer: Vec<SocketAddr>,

        /// Snapshot file: loaded at startup if present, saved on every
        /// published line
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Demo => run_demo(),
        Commands::Chat { listen, peer, data } => run_chat(listen, peer, data).await,
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Walk a small group through the situations the protocol is built for:
/// offline publishing, late joiners, a cycle, a partition, and a restart.
fn run_demo() -> Result<()> {
    let sim = Sim::new();
    let alice = Node::new();
    let bob = Node::new();
    let carol = Node::new();

    for (name, node) in [("alice", &alice), ("bob", &bob), ("carol", &carol)] {
        node.subscribe(move |note| println!("  [{name}] {note}"));
    }

    println!("alice publishes while everyone is offline:");
    alice.publish("hi");
    alice.publish("bye");

    println!("alice and bob connect:");
    sim.connect_nodes(&alice, &bob);
    sim.run_until_quiescent();

    println!("carol joins via bob, closing a cycle with alice:");
    carol.publish("carol was here");
    sim.connect_nodes(&bob, &carol);
    let ac = sim.connect_nodes(&alice, &carol);
    sim.run_until_quiescent();

    println!("the alice-carol link is cut; traffic reroutes via bob:");
    ac.close();
    carol.publish("still reachable");
    sim.run_until_quiescent();

    println!("bob restarts from a snapshot and catches up:");
    let pickled = bob.snapshot()?;
    drop(bob);
    let bob = Node::restore(&pickled)?;
    bob.subscribe(|note| println!("  [bob'] {note}"));
    alice.publish("welcome back");
    sim.connect_nodes(&alice, &bob);
    sim.run_until_quiescent();

    println!();
    for (name, node) in [("alice", &alice), ("bob", &bob), ("carol", &carol)] {
        let origins = node.origins();
        println!(
            "{name}: {} notes across {} origins",
            origins.note_count(),
            origins.origin_count()
        );
    }
    let converged = alice.origins() == bob.origins();
    println!(
        "alice and bob {}",
        if converged { "converged" } else { "diverged" }
    );
    Ok(())
}

async fn run_chat(
    listen: Option<SocketAddr>,
    peers: Vec<SocketAddr>,
    data: Option<PathBuf>,
) -> Result<()> {
    let node = match &data {
        Some(path) if path.exists() => {
            let pickled = std::fs::read_to_string(path)
                .with_context(|| format!("reading snapshot {}", path.display()))?;
            let node = Node::restore(&pickled).context("restoring snapshot")?;
            info!(identity = %node.identity(), "restored node from snapshot");
            node
        }
        _ => {
            let node = Node::new();
            info!(identity = %node.identity(), "created fresh node");
            node
        }
    };

    node.subscribe(|note| println!("{note}"));

    if let Some(addr) = listen {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        info!(%addr, "listening for peers");
        let node = node.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        info!(%remote, "peer connected");
                        node.connect(StreamChannel::spawn(stream));
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        break;
                    }
                }
            }
        });
    }

    for addr in peers {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connecting to {addr}"))?;
        info!(%addr, "connected to peer");
        node.connect(StreamChannel::spawn(stream));
    }

    let save = |node: &Node| -> Result<()> {
        if let Some(path) = &data {
            std::fs::write(path, node.snapshot()?)
                .with_context(|| format!("writing snapshot {}", path.display()))?;
        }
        Ok(())
    };

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        node.publish(line);
        save(&node)?;
    }
    save(&node)?;
    Ok(())
}

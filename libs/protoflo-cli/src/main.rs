// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! ProtoFlo CLI
//!
//! Command-line interface for the ProtoFlo runtime: register the runtime
//! with Flowhub, serve the WebSocket protocol for live editing, or run a
//! graph non-interactively.

use std::cell::RefCell;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

use protoflo::core::graph;
use protoflo::core::network::Network;
use protoflo::server::ws;

const DEFAULT_PORT: u16 = 3569;

#[derive(Parser)]
#[command(name = "protoflo")]
#[command(author, version, about = "ProtoFlo runtime CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register this runtime with Flowhub
    Register {
        /// User UUID to register the runtime for
        #[arg(long)]
        user: String,

        /// Label to use in the UI for this runtime
        #[arg(long, default_value = "ProtoFlo")]
        label: String,

        /// WebSocket IP for the runtime
        #[arg(long, default_value = "ws://localhost")]
        ip: String,

        /// WebSocket port for the runtime
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Start the WebSocket runtime
    Runtime {
        /// Address to bind to
        #[arg(long, default_value = "localhost")]
        ip: String,

        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Run a graph non-interactively; exits when the network ends
    Run {
        /// Graph file to run (.fbp or .json)
        #[arg(long)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    match cli.command {
        Commands::Register {
            user,
            label,
            ip,
            port,
        } => runtime.block_on(register(&user, &label, &ip, port)),
        Commands::Runtime { ip, port } => {
            let local = tokio::task::LocalSet::new();
            runtime.block_on(local.run_until(async move {
                ws::serve(&ip, port).await.context("runtime server failed")
            }))
        }
        Commands::Run { file } => {
            let local = tokio::task::LocalSet::new();
            runtime.block_on(local.run_until(run_graph(file)))
        }
    }
}

// ---------------------------------------------------------------------------
// register
// ---------------------------------------------------------------------------

/// PUT the runtime registration document to Flowhub.
async fn register(user: &str, label: &str, ip: &str, port: u16) -> Result<()> {
    let runtime_id = Uuid::new_v4().to_string();
    let document = json!({
        "type": "protoflo",
        "protocol": "websocket",
        "address": format!("{ip}:{port}"),
        "id": runtime_id,
        "label": label,
        "port": port,
        "user": user,
        "secret": "122223333",
    });

    let client = reqwest::Client::new();
    let response = client
        .put(format!("http://api.flowhub.io/runtimes/{runtime_id}"))
        .json(&document)
        .send()
        .await
        .context("Flowhub registration request failed")?;

    let status = response.status();
    if status != reqwest::StatusCode::CREATED {
        let body = response.text().await.unwrap_or_default();
        bail!("could not create runtime: {status} {body}");
    }

    println!("Runtime registered with ID {runtime_id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Load a graph file, run its network, and return once the network's `end`
/// event fires.
async fn run_graph(file: PathBuf) -> Result<()> {
    let graph = graph::load_file(&file, None)
        .with_context(|| format!("failed to load graph '{}'", file.display()))?;
    tracing::info!("running graph '{}' from {}", graph.name(), file.display());

    let network = Network::create(graph, false)
        .await
        .map_err(|err| anyhow::anyhow!("failed to start network: {err}"))?;

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let tx = RefCell::new(Some(tx));
    network.events().once("end", move |_| {
        if let Some(tx) = tx.borrow_mut().take() {
            let _ = tx.send(());
        }
    });

    rx.await.context("network ended without an end event")?;
    Ok(())
}

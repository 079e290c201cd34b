//! span-probes demo service
//!
//! An instrumented server whose `/` handler calls the service's own
//! `/downstream` route through an instrumented client, producing a
//! two-hop trace per request.
//!
//! # Architecture Overview
//!
//! ```text
//!     GET /  ──▶ HttpServer ──▶ inbound probe ──▶ handler
//!                                 (server span,      │
//!                                  new context)      ▼
//!                                             HttpClient::get ──▶ outbound probe
//!                                                    │            (child span,
//!                                                    │             B3 headers)
//!     GET /downstream ◀──────────────────────────────┘
//!         └─▶ inbound probe continues the trace from the headers
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use clap::Parser;
use tokio::net::TcpListener;

use span_probes::config::{load_config, AgentConfig, ConfigWatcher};
use span_probes::context;
use span_probes::http::{HttpClient, HttpServer, RequestArgs, REQUEST_EVENT};
use span_probes::lifecycle::{spawn_signal_handler, Shutdown};
use span_probes::observability::{logging, metrics};
use span_probes::probes::normalize_path;
use span_probes::Agent;

#[derive(Parser)]
#[command(name = "span-probes")]
#[command(about = "Demo service traced by span-probes", long_about = None)]
struct Args {
    /// Agent config file (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => AgentConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(service_name = %config.service_name, "span-probes v0.1.0 starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let agent = Arc::new(Agent::new(&config));
    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            let agent = agent.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(new_config) = updates.recv() => agent.apply_config(&new_config),
                        _ = stop.recv() => break,
                        else => break,
                    }
                }
            });
            Some(handle)
        }
        None => None,
    };

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let local_addr = listener.local_addr()?;

    let client = Arc::new(HttpClient::new(&config.client));
    agent.instrument_client(&client);

    let server = HttpServer::new(config.server.clone());
    agent.instrument_server(&server);

    let downstream = format!("http://{local_addr}/downstream");
    server.on(REQUEST_EVENT, move |req, res| {
        if normalize_path(&req.url) == "/downstream" {
            res.set_header("content-type", "text/plain");
            res.end("downstream ok\n");
            return;
        }

        let pending = client.get(RequestArgs::new(downstream.as_str()));
        context::spawn(async move {
            match pending.response().await {
                Ok(response) => {
                    res.set_status(response.status);
                    res.end(response.body);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Downstream call failed");
                    res.set_status(StatusCode::BAD_GATEWAY);
                    res.end(e.to_string());
                }
            }
        });
    });

    server.run(listener, shutdown.subscribe()).await?;

    if let Some(recorder) = agent.recorder() {
        tracing::info!(spans = recorder.finished_spans().len(), "Shutdown complete");
    }
    Ok(())
}

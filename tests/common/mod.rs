//! Shared utilities for integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use span_probes::config::{AgentConfig, UrlFilter};
use span_probes::context;
use span_probes::http::{HttpClient, HttpServer, RequestArgs, REQUEST_EVENT};
use span_probes::lifecycle::Shutdown;
use span_probes::trace::FinishedSpan;
use span_probes::Agent;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Start a backend that answers every request with `200 OK` and reports
/// the request headers it saw (names lowercased).
#[allow(dead_code)]
pub async fn start_recording_backend(addr: SocketAddr) -> mpsc::UnboundedReceiver<HashMap<String, String>> {
    let listener = TcpListener::bind(addr).await.unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }

                let text = String::from_utf8_lossy(&buf);
                let headers = text
                    .lines()
                    .skip(1)
                    .take_while(|line| !line.is_empty())
                    .filter_map(|line| line.split_once(':'))
                    .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                    .collect();
                let _ = tx.send(headers);

                let body = "recorded";
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    rx
}

/// A traced service running in the background.
#[allow(dead_code)]
pub struct TracedService {
    pub agent: Arc<Agent>,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl TracedService {
    pub fn spans(&self) -> Vec<FinishedSpan> {
        self.agent.recorder().map(|r| r.finished_spans()).unwrap_or_default()
    }

    pub fn span_named(&self, name: &str) -> FinishedSpan {
        self.spans()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no span named {name:?} in {:?}", self.spans()))
    }
}

/// Start an instrumented service on `addr`.
///
/// `GET /call?delay=<ms>` waits `delay` ms on a spawned task, checks that the
/// active span survived the wait (`x-context: same|lost`), then calls
/// `downstream` (default: its own `/leaf`) and relays the body. Any other
/// path answers with the path itself.
#[allow(dead_code)]
pub async fn start_traced_service(
    addr: SocketAddr,
    downstream: Option<String>,
    filters: Vec<UrlFilter>,
) -> TracedService {
    let mut config = AgentConfig::default();
    config.server.bind_address = addr.to_string();
    config.probes.filters = filters;

    let agent = Arc::new(Agent::new(&config));
    let shutdown = Shutdown::new();

    let client = Arc::new(HttpClient::new(&config.client));
    agent.instrument_client(&client);
    let server = HttpServer::new(config.server.clone());
    agent.instrument_server(&server);

    let downstream = downstream.unwrap_or_else(|| format!("http://{addr}/leaf"));
    server.on(REQUEST_EVENT, move |req, res| {
        if !req.url.starts_with("/call") {
            res.end(req.url.clone());
            return;
        }

        let delay = req
            .url
            .split_once("delay=")
            .and_then(|(_, ms)| ms.parse::<u64>().ok())
            .unwrap_or(0);
        let before = context::active_span().map(|s| s.context());
        let client = client.clone();
        let downstream = downstream.clone();

        context::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let after = context::active_span().map(|s| s.context());
            let verdict = if before.is_some() && before == after { "same" } else { "lost" };

            match client.get(RequestArgs::new(downstream.as_str())).response().await {
                Ok(response) => {
                    res.set_header("x-context", verdict);
                    res.end(response.body);
                }
                Err(e) => {
                    res.set_status(StatusCode::BAD_GATEWAY);
                    res.end(e.to_string());
                }
            }
        });
    });

    let listener = TcpListener::bind(addr).await.unwrap();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TracedService { agent, shutdown }
}

//! Top-level session: owns the mutex-guarded [`Store`], spawns the upstream
//! transport, and drives the two read loops that the interception pipeline
//! hangs off of.
//!
//! A single proxy instance serves exactly one client↔server pair, so one
//! mutex around the store is sufficient (spec.md §5) — there is no
//! multi-client fan-out to contend over it.

use serde_json::Value;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::time::{self, Duration};
use tracing::{debug, trace, warn};

use crate::config::ResolvedConfig;
use crate::error::ProxyError;
use crate::json::{short_digest, tools_hash};
use crate::metrics::RuntimeMetrics;
use crate::pending::PendingMap;
use crate::pipeline;
use crate::state::Store;
use crate::transport::UpstreamTransport;

/// How long to give the upstream to exit on its own after SIGINT/SIGTERM
/// before escalating to a kill.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// All the state one proxy instance needs for the lifetime of the upstream
/// child: configuration, the mutex-guarded store, and the negotiated-
/// capability flag flipped by `initialize`.
pub struct Session {
    pub store: Mutex<Store>,
    pub config: ResolvedConfig,
    pub session_id: String,
    pub server_id: String,
    pub metrics: RuntimeMetrics,
    negotiated: std::sync::atomic::AtomicBool,
}

impl Session {
    pub fn new(config: ResolvedConfig, upstream_command: &[String]) -> Self {
        let session_id = config.proxy.session_id.clone();
        let server_id = upstream_command.join(" ");
        Self {
            store: Mutex::new(Store::new()),
            config,
            session_id,
            server_id,
            metrics: RuntimeMetrics::default(),
            negotiated: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn negotiated(&self) -> bool {
        self.negotiated.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn set_negotiated(&self, value: bool) {
        self.negotiated.store(value, std::sync::atomic::Ordering::Relaxed);
    }

    /// `"{session}:{server}:{profileFingerprint}"` — the tools-hash scope
    /// key from spec.md §4.5. The profile fingerprint folds the upstream
    /// command into the scope so two different servers sharing a session id
    /// never collide.
    pub fn scope_key(&self) -> String {
        format!("{}:{}:{}", self.session_id, self.server_id, short_digest(&self.server_id))
    }

    /// Hash of session+command, used as the `server_fingerprint` binding in
    /// the tools-hash preimage when `bind_server_fingerprint` is set.
    pub fn server_fingerprint(&self) -> String {
        tools_hash(&serde_json::json!({"session": self.session_id, "command": self.server_id}))
    }
}

/// Runs one full proxy lifetime: spawns `upstream_command`, relays client
/// stdin / upstream stdout through [`pipeline`], and returns the exit code
/// to propagate (the upstream's own status, or `1` on spawn failure).
pub async fn run(config: ResolvedConfig, upstream_command: Vec<String>) -> i32 {
    let (transport, mut upstream_rx) = match UpstreamTransport::spawn(&upstream_command).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!("failed to spawn upstream: {err}");
            return 1;
        }
    };

    let session = Session::new(config, &upstream_command);
    let pending = PendingMap::new();

    let mut client_lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    // `None` means "stop relaying, but the upstream's own exit status (or a
    // brief grace period) decides the final code"; `Some(code)` means a
    // hard local failure that short-circuits straight to that code.
    let early_exit: Option<i32> = loop {
        tokio::select! {
            biased;

            _ = signal_wait() => {
                debug!("shutdown signal received, stopping upstream");
                break None;
            }

            line = client_lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if !handle_client_line(&session, &pending, &transport, &mut stdout, line).await {
                            break Some(1);
                        }
                    }
                    Ok(None) => {
                        debug!("client stdin closed");
                        break None;
                    }
                    Err(err) => {
                        warn!("error reading client stdin: {err}");
                        break Some(1);
                    }
                }
            }

            message = upstream_rx.recv() => {
                match message {
                    Some(message) => {
                        if !handle_upstream_message(&session, &pending, &mut stdout, message).await {
                            break Some(1);
                        }
                    }
                    None => {
                        debug!("upstream closed its stdout");
                        break None;
                    }
                }
            }
        }
    };

    let code = match early_exit {
        Some(code) => {
            transport.shutdown().await;
            code
        }
        None => {
            tokio::select! {
                status = transport.wait() => status,
                _ = time::sleep(SHUTDOWN_GRACE) => {
                    transport.shutdown().await;
                    1
                }
            }
        }
    };

    if session.config.proxy.stats {
        session.metrics.print_to_stderr();
    }
    code
}

async fn handle_client_line(
    session: &Session,
    pending: &PendingMap,
    transport: &UpstreamTransport,
    stdout: &mut io::Stdout,
    line: String,
) -> bool {
    let Ok(message) = serde_json::from_str::<Value>(&line) else {
        trace!("forwarding malformed client line verbatim");
        return transport.send_raw(&line).is_ok();
    };

    session.metrics.record_upstream_request(line.len());
    if session.config.proxy.trace_rpc {
        trace!(direction = "client->proxy", %message);
    }

    match pipeline::on_client_message(session, pending, message).await {
        pipeline::ClientAction::Forward(message) => transport.send(&message).is_ok(),
        pipeline::ClientAction::Respond(response) => write_line(stdout, &response).await,
    }
}

async fn handle_upstream_message(
    session: &Session,
    pending: &PendingMap,
    stdout: &mut io::Stdout,
    message: Value,
) -> bool {
    session
        .metrics
        .record_upstream_response(serde_json::to_string(&message).map(|s| s.len()).unwrap_or(0));
    if session.config.proxy.trace_rpc {
        trace!(direction = "upstream->client", %message);
    }
    let outgoing = pipeline::on_upstream_message(session, pending, message).await;
    write_line(stdout, &outgoing).await
}

async fn write_line(stdout: &mut io::Stdout, message: &Value) -> bool {
    let Ok(serialized) = serde_json::to_string(message) else {
        warn!("dropping response that failed to serialize");
        return true;
    };
    if stdout.write_all(serialized.as_bytes()).await.is_err() {
        return false;
    }
    if stdout.write_all(b"\n").await.is_err() {
        return false;
    }
    stdout.flush().await.is_ok()
}

#[cfg(unix)]
async fn signal_wait() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn signal_wait() {
    let _ = tokio::signal::ctrl_c().await;
}

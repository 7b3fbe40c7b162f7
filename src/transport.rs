//! Stdio transport to the spawned upstream MCP server.
//!
//! Shaped directly on the teacher's `mcp::jsonrpc::JsonRpcTransport`: a
//! writer task draining an mpsc channel into the child's stdin, a reader
//! task turning the child's stdout into framed JSON values, and a stderr
//! task that mirrors the child's stderr onto our own (spec.md §3: stderr is
//! forwarded verbatim, never parsed). Unlike the teacher, the proxy has no
//! per-call oneshot plumbing here — every upstream message, request or
//! response, is handed whole to the pipeline, which does its own id
//! bookkeeping via [`crate::pending`].

use std::process::Stdio;

use serde_json::Value;
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, Command},
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::warn;

use crate::error::ProxyError;

pub struct UpstreamTransport {
    writer: mpsc::UnboundedSender<String>,
    child: Mutex<Option<Child>>,
    tasks: Vec<JoinHandle<()>>,
}

impl UpstreamTransport {
    /// Spawns `command` (first element is the program, the rest its args)
    /// with piped stdio, and returns the transport plus a channel that
    /// yields every decoded JSON value the child writes to stdout.
    pub async fn spawn(command: &[String]) -> Result<(Self, mpsc::UnboundedReceiver<Value>), ProxyError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ProxyError::Transport("empty upstream command".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ProxyError::Spawn {
            command: format!("{program} {}", args.join(" ")),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProxyError::Transport("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProxyError::Transport("child stdout unavailable".into()))?;
        let stderr = child.stderr.take();

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        let writer_handle = tokio::spawn(writer_task(stdin, writer_rx));
        let reader_handle = tokio::spawn(reader_task(stdout, message_tx));

        let mut tasks = vec![writer_handle, reader_handle];
        if let Some(stderr) = stderr {
            tasks.push(tokio::spawn(stderr_task(stderr)));
        }

        Ok((
            Self {
                writer: writer_tx,
                child: Mutex::new(Some(child)),
                tasks,
            },
            message_rx,
        ))
    }

    /// Serializes and queues `message` for delivery to the child's stdin.
    /// Transparent forwarding point for both client requests/notifications
    /// and (rarely) proxy-originated messages.
    pub fn send(&self, message: &Value) -> Result<(), ProxyError> {
        let line = serde_json::to_string(message)?;
        self.send_raw(&line)
    }

    /// Queues an already-serialized line verbatim. Used for client input
    /// that failed to parse as JSON — spec.md §4.1 forwards those unchanged
    /// rather than dropping them.
    pub fn send_raw(&self, line: &str) -> Result<(), ProxyError> {
        self.writer
            .send(line.to_string())
            .map_err(|_| ProxyError::Transport("upstream writer channel closed".into()))
    }

    /// Waits for the child to exit and returns its status code, or `1` if it
    /// was already reaped (e.g. by [`Self::shutdown`]) or could not be
    /// waited on.
    pub async fn wait(&self) -> i32 {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return 1;
        };
        match child.wait().await {
            Ok(status) => status.code().unwrap_or(1),
            Err(_) => 1,
        }
    }

    pub async fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
        }
    }
}

async fn writer_task(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        if stdin.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if stdin.write_all(b"\n").await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
    let _ = stdin.shutdown().await;
}

async fn reader_task(stdout: tokio::process::ChildStdout, tx: mpsc::UnboundedSender<Value>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(&line) {
                    Ok(value) => {
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("upstream stdout line was not valid JSON: {err}"),
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!("error reading upstream stdout: {err}");
                break;
            }
        }
    }
}

async fn stderr_task(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    let mut stderr_out = io::stderr();
    while let Ok(Some(line)) = lines.next_line().await {
        if stderr_out.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if stderr_out.write_all(b"\n").await.is_err() {
            break;
        }
        let _ = stderr_out.flush().await;
    }
}

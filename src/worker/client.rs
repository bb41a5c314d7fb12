use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::error::{WorkerError, WorkerResult};
use super::protocol::{
    codes, DatasourceTarget, QueryParams, QueryResult, Reply, ReplyBody, Request, RUN_QUERY,
};
use crate::config::WorkerSettings;

/// Binary names tried when no worker path is configured.
const WORKER_CANDIDATES: &[&str] = &["keystone-worker", "./keystone-worker", "./bin/keystone-worker"];

/// Requests awaiting a reply, keyed by request id.
#[derive(Clone, Default)]
struct Pending(Arc<Mutex<HashMap<u64, oneshot::Sender<ReplyBody>>>>);

impl Pending {
    async fn register(&self, id: u64) -> oneshot::Receiver<ReplyBody> {
        let (tx, rx) = oneshot::channel();
        self.0.lock().await.insert(id, tx);
        rx
    }

    async fn forget(&self, id: u64) {
        self.0.lock().await.remove(&id);
    }

    async fn complete(&self, reply: Reply) {
        match self.0.lock().await.remove(&reply.id) {
            Some(tx) => {
                let _ = tx.send(reply.body);
            }
            None => tracing::debug!(id = reply.id, "reply for unknown or expired request"),
        }
    }

    async fn fail_all(&self, message: &str) {
        for (_, tx) in self.0.lock().await.drain() {
            let _ = tx.send(ReplyBody::failure(codes::WORKER_GONE, message));
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.0.lock().await.len()
    }
}

/// Handle to a long-running database worker.
///
/// Statistics queries from many candidates share one worker; each request
/// gets its own id, and a background task routes replies back to callers.
pub struct WorkerClient {
    stdin: Mutex<BufWriter<ChildStdin>>,
    pending: Pending,
    next_id: AtomicU64,
    timeout: Duration,
    reader: JoinHandle<()>,
    _child: Child,
}

impl WorkerClient {
    /// Start the worker named in settings, trying well-known locations when
    /// no path is set.
    pub async fn from_settings(settings: &WorkerSettings) -> WorkerResult<Self> {
        let path = match &settings.path {
            Some(path) => PathBuf::from(path),
            None => WORKER_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
                .ok_or_else(|| {
                    WorkerError::Spawn(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "keystone-worker not found; set worker.path",
                    ))
                })?,
        };
        Self::spawn(
            &path,
            &settings.args,
            Duration::from_secs(settings.timeout_seconds),
        )
        .await
    }

    pub async fn spawn<P: AsRef<Path>>(
        path: P,
        args: &[String],
        timeout: Duration,
    ) -> WorkerResult<Self> {
        let path = path.as_ref();
        let mut child = Command::new(path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(WorkerError::Spawn)?;

        let stdin = child.stdin.take().ok_or(WorkerError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(WorkerError::MissingPipe("stdout"))?;

        let pending = Pending::default();
        let reader = tokio::spawn(route_replies(stdout, pending.clone()));
        tracing::debug!(path = %path.display(), ?timeout, "database worker started");

        Ok(Self {
            stdin: Mutex::new(BufWriter::new(stdin)),
            pending,
            next_id: AtomicU64::new(1),
            timeout,
            reader,
            _child: child,
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> WorkerResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&Request { id, method, params })
            .map_err(WorkerError::Encode)?;
        line.push('\n');

        let rx = self.pending.register(id).await;
        if !self.is_alive() {
            self.pending.forget(id).await;
            return Err(WorkerError::Closed);
        }
        let written = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.forget(id).await;
            return Err(WorkerError::Write(e));
        }

        let body = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(body)) => body,
            Ok(Err(_)) => return Err(WorkerError::Closed),
            Err(_) => {
                self.pending.forget(id).await;
                return Err(WorkerError::TimedOut(self.timeout));
            }
        };

        match body {
            ReplyBody::Ok { data } => Ok(data),
            ReplyBody::Error { code, message } => Err(WorkerError::Remote { code, message }),
        }
    }

    /// Run one statement against a datasource.
    ///
    /// Statements are not inspected here; callers guard them first.
    pub async fn run_query(&self, target: &DatasourceTarget, sql: &str) -> WorkerResult<QueryResult> {
        let params = serde_json::to_value(QueryParams { target, sql }).map_err(WorkerError::Encode)?;
        let data = self.call(RUN_QUERY, params).await?;
        serde_json::from_value(data).map_err(WorkerError::Decode)
    }

    /// `false` once the worker's stdout has closed.
    pub fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }
}

/// Read replies until the worker goes away, then fail whatever is left.
async fn route_replies(stdout: ChildStdout, pending: Pending) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<Reply>(&line) {
                Ok(reply) => pending.complete(reply).await,
                Err(e) => tracing::warn!(error = %e, "ignoring malformed worker reply"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "worker stdout read failed");
                break;
            }
        }
    }
    pending.fail_all("database worker exited").await;
}

//! Provider Process Manager (C5, spec §4.6). Owns the lifecycle of external
//! provider subprocesses: spawn, port discovery, health check, init, caching,
//! and graceful-then-forceful shutdown.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::ProviderError;

use super::client::RpcProviderClient;
use super::rpc::{read_announced_port, RpcConnection};
use super::{Health, InitOptions};

const STDERR_RING_BUFFER_CAP: usize = 64 * 1024;

/// Bounded ring buffer for provider stderr, so a chatty provider can't grow
/// memory without bound (spec §5: "Shared-resource policy").
#[derive(Default)]
struct StderrRing {
    buf: std::collections::VecDeque<u8>,
    cap: usize,
}

impl StderrRing {
    fn new(cap: usize) -> Self {
        Self { buf: std::collections::VecDeque::with_capacity(cap), cap }
    }

    fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.buf.len() >= self.cap {
                self.buf.pop_front();
            }
            self.buf.push_back(b);
        }
    }

    fn as_string(&self) -> String {
        let bytes: Vec<u8> = self.buf.iter().copied().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

struct ProviderHandle {
    child: Mutex<Option<Child>>,
    client: Arc<RpcProviderClient>,
    stderr: Arc<Mutex<StderrRing>>,
}

pub struct ProviderProcessManager {
    handles: RwLock<HashMap<String, Arc<ProviderHandle>>>,
    alias_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    port_discovery_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Default for ProviderProcessManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(5))
    }
}

/// Outcome of a single provider's shutdown (spec §4.6: "timed-out providers
/// yield an informational (non-fatal) error").
#[derive(Debug)]
pub enum ShutdownOutcome {
    Graceful,
    ForcedAfterTimeout,
    /// The ambient context was cancelled while this provider's shutdown was
    /// still in flight (spec §5: "Cancellation aborts pending fetches"; the
    /// same ambient token governs every suspending operation, shutdown
    /// included). The process was force-terminated and reaped rather than
    /// left to finish on its own schedule.
    Cancelled,
    Error(ProviderError),
}

impl ProviderProcessManager {
    pub fn new(port_discovery_timeout: Duration, shutdown_timeout: Duration) -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            alias_locks: Mutex::new(HashMap::new()),
            port_discovery_timeout,
            shutdown_timeout,
        }
    }

    async fn alias_lock(&self, alias: &str) -> Arc<Mutex<()>> {
        let mut locks = self.alias_locks.lock().await;
        locks.entry(alias.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    #[instrument(skip(self, ctx, init_opts), fields(alias = %alias))]
    pub async fn get_provider(
        &self,
        ctx: &CancellationToken,
        alias: &str,
        binary_path: &Path,
        init_opts: InitOptions,
    ) -> Result<Arc<RpcProviderClient>, ProviderError> {
        if let Some(handle) = self.handles.read().await.get(alias) {
            return Ok(handle.client.clone());
        }

        let lock = self.alias_lock(alias).await;
        let _guard = lock.lock().await;

        // Double-checked: another caller may have finished init while we
        // waited for the alias lock.
        if let Some(handle) = self.handles.read().await.get(alias) {
            return Ok(handle.client.clone());
        }

        match self.spawn_and_init(ctx, alias, binary_path, init_opts).await {
            Ok(handle) => {
                let client = handle.client.clone();
                self.handles.write().await.insert(alias.to_string(), Arc::new(handle));
                Ok(client)
            }
            Err(err) => Err(err),
        }
    }

    async fn spawn_and_init(
        &self,
        ctx: &CancellationToken,
        alias: &str,
        binary_path: &Path,
        init_opts: InitOptions,
    ) -> Result<ProviderHandle, ProviderError> {
        if !binary_path.is_file() {
            return Err(ProviderError::BinaryMissing { path: binary_path.to_path_buf() });
        }

        let mut cmd = tokio::process::Command::new(binary_path);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        debug!(?cmd, "spawning provider process");
        let mut child =
            cmd.spawn().map_err(|source| ProviderError::Spawn { alias: alias.to_string(), source })?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");
        let stderr_ring = Arc::new(Mutex::new(StderrRing::new(STDERR_RING_BUFFER_CAP)));
        tokio::spawn(drain_stderr(stderr, stderr_ring.clone()));

        let lines = BufReader::new(stdout).lines();
        let port = match tokio::time::timeout(self.port_discovery_timeout, read_announced_port(lines)).await
        {
            Ok(Some(port)) => port,
            Ok(None) => {
                let stderr_text = self.reap(&mut child, &stderr_ring).await;
                return Err(ProviderError::EarlyExit { alias: alias.to_string(), stderr: stderr_text });
            }
            Err(_) => {
                let stderr_text = self.reap(&mut child, &stderr_ring).await;
                return Err(ProviderError::PortDiscoveryTimeout {
                    alias: alias.to_string(),
                    timeout_ms: self.port_discovery_timeout.as_millis() as u64,
                    stderr: stderr_text,
                });
            }
        };

        let stream = match tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
            Ok(s) => s,
            Err(source) => {
                self.reap(&mut child, &stderr_ring).await;
                return Err(ProviderError::Connect { alias: alias.to_string(), port, source });
            }
        };

        let client = RpcProviderClient::new(alias, RpcConnection::new(stream));

        if let Err(err) = client.health().await {
            self.reap(&mut child, &stderr_ring).await;
            return Err(err);
        }

        if let Err(err) = client.init(ctx, init_opts).await {
            self.reap(&mut child, &stderr_ring).await;
            return Err(err);
        }

        Ok(ProviderHandle { child: Mutex::new(Some(child)), client: Arc::new(client), stderr: stderr_ring })
    }

    /// Terminates and reaps a process that failed partway through startup,
    /// preventing zombies (design note: "on any error path during provider
    /// start, the owning handle must issue both a termination signal and a
    /// blocking wait").
    async fn reap(&self, child: &mut Child, stderr: &Arc<Mutex<StderrRing>>) -> String {
        let _ = child.start_kill();
        let _ = child.wait().await;
        stderr.lock().await.as_string()
    }

    /// Polls every cached provider's health, for diagnostics/observability
    /// callers (e.g. the CLI can print alias health before shutting down).
    /// Does not mutate handle state and never spawns or reaps a process.
    pub async fn health_snapshot(&self) -> HashMap<String, Result<Health, ProviderError>> {
        let handles: Vec<(String, Arc<ProviderHandle>)> =
            self.handles.read().await.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut snapshot = HashMap::with_capacity(handles.len());
        for (alias, handle) in handles {
            snapshot.insert(alias, handle.client.health().await);
        }
        snapshot
    }

    #[instrument(skip(self, ctx))]
    pub async fn shutdown(&self, ctx: &CancellationToken) -> HashMap<String, ShutdownOutcome> {
        let mut outcomes = HashMap::new();
        let handles: Vec<(String, Arc<ProviderHandle>)> =
            self.handles.read().await.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        for (alias, handle) in handles {
            let outcome = self.shutdown_one(ctx, &alias, &handle).await;
            outcomes.insert(alias, outcome);
        }
        self.handles.write().await.clear();
        outcomes
    }

    /// Forcibly terminates and reaps the handle's child process, if any.
    async fn force_kill(handle: &ProviderHandle) {
        let mut child_guard = handle.child.lock().await;
        if let Some(child) = child_guard.as_mut() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }

    async fn shutdown_one(
        &self,
        ctx: &CancellationToken,
        alias: &str,
        handle: &ProviderHandle,
    ) -> ShutdownOutcome {
        let shutdown_result = tokio::select! {
            result = tokio::time::timeout(self.shutdown_timeout, handle.client.shutdown()) => result,
            _ = ctx.cancelled() => {
                warn!(alias, "cancelled while waiting for shutdown RPC; terminating provider process");
                Self::force_kill(handle).await;
                return ShutdownOutcome::Cancelled;
            }
        };

        let mut child_guard = handle.child.lock().await;
        let Some(child) = child_guard.as_mut() else { return ShutdownOutcome::Graceful };

        match shutdown_result {
            Ok(Ok(())) => {
                let wait_result = tokio::select! {
                    result = tokio::time::timeout(self.shutdown_timeout, child.wait()) => result,
                    _ = ctx.cancelled() => {
                        warn!(alias, "cancelled while waiting for provider exit; terminating");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        return ShutdownOutcome::Cancelled;
                    }
                };
                match wait_result {
                    Ok(_) => ShutdownOutcome::Graceful,
                    Err(_) => {
                        warn!(alias, "provider did not exit after graceful shutdown RPC; terminating");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        ShutdownOutcome::ForcedAfterTimeout
                    }
                }
            }
            // Shutdown errors are always recoverable: the process is still
            // terminated so it never outlives the manager (spec §7).
            Ok(Err(err)) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                ShutdownOutcome::Error(err)
            }
            Err(_) => {
                warn!(alias, "shutdown RPC timed out; terminating provider process");
                let _ = child.start_kill();
                let _ = child.wait().await;
                ShutdownOutcome::ForcedAfterTimeout
            }
        }
    }
}

async fn drain_stderr(mut stderr: tokio::process::ChildStderr, ring: Arc<Mutex<StderrRing>>) {
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => ring.lock().await.push(&buf[..n]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::rpc::RpcConnection;

    fn manager_with_timeout(ms: u64) -> ProviderProcessManager {
        ProviderProcessManager::new(Duration::from_secs(10), Duration::from_millis(ms))
    }

    /// Spins up a bare TCP listener that accepts a connection and then never
    /// responds to anything sent on it, paired with a genuine long-lived
    /// child process — enough to exercise the forced-termination path
    /// without needing a real provider binary (spec §8.8).
    async fn unresponsive_provider_handle() -> ProviderHandle {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                // Hold the connection open but never read/write: the
                // provider process is alive but ignoring every RPC.
                let _stream = stream;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        });

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let client = RpcProviderClient::new("unresponsive", RpcConnection::new(stream));

        let child = tokio::process::Command::new("sleep")
            .arg("3600")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("spawn sleep");

        ProviderHandle {
            child: Mutex::new(Some(child)),
            client: Arc::new(client),
            stderr: Arc::new(Mutex::new(StderrRing::new(1024))),
        }
    }

    /// Seed scenario 8: a provider ignores the Shutdown RPC; after the
    /// configured timeout the process is force-terminated and the outcome
    /// reflects that, rather than compile treating it as a fatal error.
    #[tokio::test]
    async fn shutdown_force_terminates_unresponsive_provider() {
        let manager = manager_with_timeout(100);
        let handle = Arc::new(unresponsive_provider_handle().await);
        manager.handles.write().await.insert("unresponsive".to_string(), handle);

        let ctx = CancellationToken::new();
        let outcomes = manager.shutdown(&ctx).await;

        assert!(matches!(outcomes.get("unresponsive"), Some(ShutdownOutcome::ForcedAfterTimeout)));
        assert!(manager.handles.read().await.is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_shutdown_force_terminates_and_is_reported() {
        let manager = manager_with_timeout(3600_000);
        let handle = Arc::new(unresponsive_provider_handle().await);
        manager.handles.write().await.insert("unresponsive".to_string(), handle);

        let ctx = CancellationToken::new();
        ctx.cancel();
        let outcomes = manager.shutdown(&ctx).await;

        assert!(matches!(outcomes.get("unresponsive"), Some(ShutdownOutcome::Cancelled)));
        assert!(manager.handles.read().await.is_empty());
    }
}


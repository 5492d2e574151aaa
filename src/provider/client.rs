//! Provider Client (C4, spec §4.5-§4.6). A one-to-one wrapper over a single
//! provider RPC connection, implementing the [`Provider`] contract. Safe for
//! concurrent `fetch` calls: the connection is behind a `tokio::sync::Mutex`
//! since the wire protocol is strictly request/response (no pipelining), but
//! callers may still issue fetches concurrently — they simply queue.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::value::Value;

use super::rpc::{Request, Response, RpcConnection};
use super::{Health, HealthStatus, InitOptions, Provider, ProviderInfo};

pub struct RpcProviderClient {
    alias: String,
    conn: Arc<Mutex<RpcConnection>>,
}

impl RpcProviderClient {
    pub fn new(alias: impl Into<String>, conn: RpcConnection) -> Self {
        Self { alias: alias.into(), conn: Arc::new(Mutex::new(conn)) }
    }

    pub async fn health(&self) -> Result<Health, ProviderError> {
        let response = self.call(Request::Health).await?;
        match response {
            Response::Ok { result } => {
                let status = result.get("status").and_then(|v| v.as_str()).unwrap_or("");
                let message = result.get("message").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let status = if status.eq_ignore_ascii_case("ok") { HealthStatus::Ok } else { HealthStatus::NotReady };
                Ok(Health { status, message })
            }
            Response::Error { message } | Response::NotFound { message } => {
                Err(ProviderError::HealthCheck { alias: self.alias.clone(), message })
            }
        }
    }

    pub async fn shutdown(&self) -> Result<(), ProviderError> {
        match self.call(Request::Shutdown).await? {
            Response::Ok { .. } => Ok(()),
            Response::Error { message } | Response::NotFound { message } => {
                Err(ProviderError::Rpc { alias: self.alias.clone(), message })
            }
        }
    }

    async fn call(&self, request: Request) -> Result<Response, ProviderError> {
        let mut conn = self.conn.lock().await;
        conn.call(&self.alias, &request).await
    }
}

#[async_trait]
impl Provider for RpcProviderClient {
    async fn init(&self, ctx: &CancellationToken, opts: InitOptions) -> Result<(), ProviderError> {
        if ctx.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let config = serde_json::to_value(&opts.config)
            .map_err(|e| ProviderError::Init { alias: opts.alias.clone(), message: e.to_string() })?;
        let request = Request::Init {
            alias: opts.alias.clone(),
            config,
            source_file_path: opts.source_file_path.display().to_string(),
        };
        match self.call(request).await? {
            Response::Ok { .. } => Ok(()),
            Response::Error { message } | Response::NotFound { message } => {
                Err(ProviderError::Init { alias: self.alias.clone(), message })
            }
        }
    }

    async fn fetch(&self, ctx: &CancellationToken, path: &[String]) -> Result<Value, ProviderError> {
        if ctx.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let request = Request::Fetch { path: path.to_vec() };
        let response = tokio::select! {
            response = self.call(request) => response?,
            _ = ctx.cancelled() => return Err(ProviderError::Cancelled),
        };
        match response {
            Response::Ok { result } => Ok(Value::from(&result)),
            Response::NotFound { .. } => Err(ProviderError::PathNotFound {
                alias: self.alias.clone(),
                path: path.to_vec(),
                available: Vec::new(),
            }),
            Response::Error { message } => {
                Err(ProviderError::Fetch { alias: self.alias.clone(), path: path.to_vec(), message })
            }
        }
    }

    async fn info(&self) -> Option<ProviderInfo> {
        let response = self.call(Request::Info).await.ok()?;
        match response {
            Response::Ok { result } => Some(ProviderInfo {
                alias: result.get("alias")?.as_str()?.to_string(),
                version: result.get("version")?.as_str().unwrap_or_default().to_string(),
            }),
            _ => None,
        }
    }
}

//! The provider subsystem (C4-C8, spec §4.5-§4.8, §4.6, §6).
//!
//! A [`Provider`] is a data adapter with `init`/`fetch`/`info` semantics,
//! usually backed by an external subprocess reached over local TCP RPC
//! ([`rpc`], [`client`], [`manager`]), but may also be an in-process
//! constructor registered directly with the [`registry`] (the built-in `var`
//! provider, or embedded test doubles).

pub mod alias;
pub mod client;
pub mod lockfile;
pub mod manager;
pub mod registry;
pub mod rpc;
pub mod variables;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::value::{Map, Value};

/// Options passed to [`Provider::init`] (spec §4.5).
#[derive(Clone, Debug)]
pub struct InitOptions {
    pub alias: String,
    pub config: Map,
    pub source_file_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderInfo {
    pub alias: String,
    pub version: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    NotReady,
}

#[derive(Clone, Debug)]
pub struct Health {
    pub status: HealthStatus,
    pub message: String,
}

/// The Provider contract (spec §4.5). Implementations MUST tolerate
/// concurrent `fetch` calls and MUST honour `ctx` cancellation.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn init(&self, ctx: &CancellationToken, opts: InitOptions) -> Result<(), ProviderError>;

    async fn fetch(&self, ctx: &CancellationToken, path: &[String]) -> Result<Value, ProviderError>;

    async fn info(&self) -> Option<ProviderInfo> {
        None
    }
}

/// An in-process constructor, for embedded/testing providers and the
/// built-in `var` provider (spec §4.8 step 1).
pub type InProcessConstructor = std::sync::Arc<dyn Fn() -> std::sync::Arc<dyn Provider> + Send + Sync>;

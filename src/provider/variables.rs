//! The built-in `var` provider (spec §4.8 step 1, `SPEC_FULL.md` §3.5): an
//! in-process provider over the variables declared in its own `[source]`
//! config block, with no subprocess involved.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::utils::{navigate, NavigateError};
use crate::value::{Map, Value};

use super::{InProcessConstructor, InitOptions, Provider, ProviderInfo};

pub const TYPE_NAME: &str = "var";

pub struct VariablesProvider {
    variables: RwLock<Map>,
}

impl VariablesProvider {
    pub fn new() -> Self {
        Self { variables: RwLock::new(Map::new()) }
    }

    pub fn constructor() -> InProcessConstructor {
        Arc::new(|| Arc::new(VariablesProvider::new()) as Arc<dyn Provider>)
    }
}

impl Default for VariablesProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for VariablesProvider {
    async fn init(&self, ctx: &CancellationToken, opts: InitOptions) -> Result<(), ProviderError> {
        if ctx.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        *self.variables.write().await = opts.config;
        Ok(())
    }

    async fn fetch(&self, ctx: &CancellationToken, path: &[String]) -> Result<Value, ProviderError> {
        if ctx.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let variables = self.variables.read().await;
        let root = Value::Map(variables.clone());
        navigate(&root, path).cloned().map_err(|err| match err {
            NavigateError::KeyNotFound { available, .. } => {
                ProviderError::PathNotFound { alias: TYPE_NAME.to_string(), path: path.to_vec(), available }
            }
            NavigateError::NavigateThroughScalar { .. } => {
                ProviderError::NavigateThroughScalar { alias: TYPE_NAME.to_string(), path: path.to_vec() }
            }
        })
    }

    async fn info(&self) -> Option<ProviderInfo> {
        Some(ProviderInfo { alias: TYPE_NAME.to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
    }
}

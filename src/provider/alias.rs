//! Alias Registry (C7, spec §4.8). Maps each declared source alias to a
//! lazily-constructed, memoized [`Provider`] instance. Construction happens
//! at most once per alias even under concurrent resolvers racing to fetch
//! through the same alias for the first time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::value::Map;

use super::registry::ProviderTypeRegistry;
use super::{InitOptions, Provider};

struct PendingAlias {
    type_name: String,
    config: Map,
    source_file_path: PathBuf,
}

pub struct AliasRegistry {
    registry: Arc<ProviderTypeRegistry>,
    pending: RwLock<HashMap<String, PendingAlias>>,
    resolved: RwLock<HashMap<String, Arc<dyn Provider>>>,
    /// Guards the *act* of constructing a given alias's provider; distinct
    /// from the maps above so that callers resolving different aliases never
    /// block on each other.
    creation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AliasRegistry {
    pub fn new(registry: Arc<ProviderTypeRegistry>) -> Self {
        Self {
            registry,
            pending: RwLock::new(HashMap::new()),
            resolved: RwLock::new(HashMap::new()),
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Declares an alias from a `[source]` block. Re-registering the same
    /// alias replaces its pending declaration as long as it hasn't already
    /// been resolved.
    pub async fn register(&self, alias: impl Into<String>, type_name: impl Into<String>, config: Map, source_file_path: PathBuf) {
        let alias = alias.into();
        self.pending
            .write()
            .await
            .insert(alias, PendingAlias { type_name: type_name.into(), config, source_file_path });
    }

    /// Declares an alias only if it has no pending declaration yet (and
    /// hasn't already been resolved). Used by the compile orchestrator when
    /// folding `[source]` blocks across files, where a duplicate alias is
    /// skipped rather than overwritten (first-wins; the instance that ends
    /// up cached is whichever declaration won this race).
    ///
    /// Returns `true` if this call's declaration was the one that stuck.
    pub async fn register_if_absent(
        &self,
        alias: impl Into<String>,
        type_name: impl Into<String>,
        config: Map,
        source_file_path: PathBuf,
    ) -> bool {
        let alias = alias.into();
        if self.resolved.read().await.contains_key(&alias) {
            return false;
        }
        let mut pending = self.pending.write().await;
        if pending.contains_key(&alias) {
            return false;
        }
        pending.insert(alias, PendingAlias { type_name: type_name.into(), config, source_file_path });
        true
    }

    pub async fn registered_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.pending.read().await.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Snapshot of every declared alias's `init` config, keyed by alias and
    /// sorted by construction of the returned [`BTreeMap`]. Used by the
    /// validator to detect dependency cycles among provider configs before
    /// any provider is actually constructed.
    pub async fn pending_configs(&self) -> std::collections::BTreeMap<String, Map> {
        self.pending.read().await.iter().map(|(alias, pending)| (alias.clone(), pending.config.clone())).collect()
    }

    async fn creation_lock(&self, alias: &str) -> Arc<Mutex<()>> {
        let mut locks = self.creation_locks.lock().await;
        locks.entry(alias.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn get_provider(&self, ctx: &CancellationToken, alias: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        if let Some(provider) = self.resolved.read().await.get(alias) {
            return Ok(provider.clone());
        }

        let lock = self.creation_lock(alias).await;
        let _guard = lock.lock().await;

        if let Some(provider) = self.resolved.read().await.get(alias) {
            return Ok(provider.clone());
        }

        let (type_name, config, source_file_path) = {
            let pending = self.pending.read().await;
            let entry = pending
                .get(alias)
                .ok_or_else(|| ProviderError::NotFound { alias: alias.to_string() })?;
            (entry.type_name.clone(), entry.config.clone(), entry.source_file_path.clone())
        };

        let init_opts = InitOptions { alias: alias.to_string(), config, source_file_path };
        let provider = self.registry.resolve(ctx, &type_name, alias, init_opts).await?;
        self.resolved.write().await.insert(alias.to_string(), provider.clone());
        Ok(provider)
    }
}

//! Provider Type Registry (C6, spec §4.8). Resolves a provider *type* name
//! (as declared in a `[source]` block, e.g. `http`, `var`) to a constructed,
//! initialized [`Provider`] instance — either an in-process constructor
//! registered directly, or a subprocess resolved through the lockfile and
//! spawned by the [`super::manager::ProviderProcessManager`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

use super::lockfile::Lockfile;
use super::manager::ProviderProcessManager;
use super::{InProcessConstructor, InitOptions, Provider};

pub struct ProviderTypeRegistry {
    in_process: HashMap<String, InProcessConstructor>,
    lockfile: Option<Lockfile>,
    manager: Arc<ProviderProcessManager>,
}

impl ProviderTypeRegistry {
    pub fn new(manager: Arc<ProviderProcessManager>) -> Self {
        Self { in_process: HashMap::new(), lockfile: None, manager }
    }

    pub fn with_lockfile(mut self, lockfile: Lockfile) -> Self {
        self.lockfile = Some(lockfile);
        self
    }

    pub fn register_in_process(&mut self, type_name: impl Into<String>, ctor: InProcessConstructor) {
        self.in_process.insert(type_name.into(), ctor);
    }

    /// Constructs and initializes a provider instance for `alias`, declared
    /// with provider type `type_name`. In-process types are constructed and
    /// initialized directly; everything else is resolved through the
    /// lockfile and handed to the process manager, which performs spawn,
    /// health check, and init as one sequence (spec §4.6).
    pub async fn resolve(
        &self,
        ctx: &CancellationToken,
        type_name: &str,
        alias: &str,
        init_opts: InitOptions,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        if let Some(ctor) = self.in_process.get(type_name) {
            let provider = ctor();
            provider.init(ctx, init_opts).await?;
            return Ok(provider);
        }

        let Some(lockfile) = &self.lockfile else {
            return Err(ProviderError::TypeNotRegistered { type_name: type_name.to_string() });
        };

        let binary_path = lockfile.resolve_binary(type_name)?;
        let client = self.manager.get_provider(ctx, alias, &binary_path, init_opts).await?;
        Ok(client as Arc<dyn Provider>)
    }
}

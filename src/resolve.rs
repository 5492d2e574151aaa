//! Reference Resolver (C11, spec §4.11). Walks a merged data tree and
//! replaces every [`crate::value::Placeholder`] with the value a provider
//! fetch yields. A placeholder's `path` is forwarded verbatim to
//! `provider.fetch` (spec §4.5: "path-segments are opaque strings; semantics
//! are provider-defined") — the resolver never assumes a provider's root is
//! one big navigable map and never does its own local navigation into it.
//! Whatever the provider hands back is itself walked recursively (map→map,
//! list→list, placeholder→resolve again), since a provider is free to
//! return a value that contains further `@alias:path` placeholders (a
//! provider whose root is the surrounding data tree, for instance). What
//! comes back decides the mode: an empty/`"."` path or a `Value::Map` result
//! is map mode (sibling overrides win); anything else is property mode
//! (overrides don't apply). Per-`(alias, path)` fetches are memoized for the
//! run so N references to the same path cost one fetch.
//!
//! Sibling map entries are walked through a bounded worker pool
//! (`max_concurrent_providers`, spec §5 "bounded worker pool") rather than one
//! at a time — independent references in the same map have no ordering
//! dependency on each other, only the cycle stack and fetch cache need to be
//! shared, and both are already behind locks.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::cycle::CycleStack;
use crate::diagnostic::Diagnostic;
use crate::error::{ProviderError, ResolveError};
use crate::merge::merge_overrides;
use crate::provider::alias::AliasRegistry;
use crate::value::{Map, Placeholder, Value};

pub struct Resolver<'a> {
    aliases: &'a AliasRegistry,
    /// Keyed by `"{alias}:{path.join(\".\")}"` (spec §4.11 step 3: "per-run
    /// fetch cache keyed by (alias, full path, mode)"). `mode` isn't tracked
    /// as a separate cache axis: a provider's fetch is required to be
    /// deterministic within a run (spec §4.5), so a given `(alias, path)`
    /// always yields the same shape, and the mode is read straight off the
    /// cached value rather than recomputed or stored redundantly.
    fetch_cache: Mutex<HashMap<String, Arc<Value>>>,
    semaphore: Arc<Semaphore>,
    /// When set, a per-placeholder resolution failure is downgraded to a
    /// warning (substituting `null`) instead of aborting the whole resolve
    /// call (spec §4.11 step 1, §7 "Resolution errors are recoverable per
    /// placeholder when allow_missing_provider").
    allow_missing_provider: bool,
    warnings: Mutex<Vec<Diagnostic>>,
    /// Per-fetch deadline (spec §6 `per_provider_fetch_timeout`). Applied
    /// around the single provider fetch that seeds a `(alias, path)` cache
    /// entry; a timed-out fetch is reported the same way any other provider
    /// failure is (fatal, or recoverable under `allow_missing_provider`).
    fetch_timeout: Option<Duration>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        aliases: &'a AliasRegistry,
        max_concurrent: usize,
        allow_missing_provider: bool,
        fetch_timeout: Option<Duration>,
    ) -> Self {
        Self {
            aliases,
            fetch_cache: Mutex::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            allow_missing_provider,
            warnings: Mutex::new(Vec::new()),
            fetch_timeout,
        }
    }

    pub async fn resolve(&self, ctx: &CancellationToken, data: &Map) -> Result<Map, ResolveError> {
        let stack = CycleStack::new();
        self.resolve_map(ctx, data, &stack).await
    }

    /// Warnings accumulated by `allow_missing_provider` substitutions. Call
    /// after `resolve` returns.
    pub async fn take_warnings(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.warnings.lock().await)
    }

    /// Fetches `path` from `alias`'s provider, or returns the cached response
    /// from a prior fetch at the same `(alias, path)` (spec §4.11 steps 3-4).
    /// The path is forwarded to the provider as-is; this never fetches the
    /// provider's root and navigates locally, since the provider alone knows
    /// how to interpret its own path segments (spec §4.5).
    async fn fetch_path(&self, ctx: &CancellationToken, alias: &str, path: &[String]) -> Result<Arc<Value>, ResolveError> {
        let key = fetch_cache_key(alias, path);
        if let Some(cached) = self.fetch_cache.lock().await.get(&key) {
            return Ok(cached.clone());
        }
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        // Re-check under the permit: another task may have populated the
        // cache while we waited for a slot.
        if let Some(cached) = self.fetch_cache.lock().await.get(&key) {
            return Ok(cached.clone());
        }
        let provider = self.aliases.get_provider(ctx, alias).await?;
        let fetched = match self.fetch_timeout {
            Some(timeout) => tokio::time::timeout(timeout, provider.fetch(ctx, path))
                .await
                .map_err(|_| ResolveError::Provider(ProviderError::Fetch {
                    alias: alias.to_string(),
                    path: path.to_vec(),
                    message: format!("timed out after {timeout:?}"),
                }))??,
            None => provider.fetch(ctx, path).await?,
        };
        let value = Arc::new(fetched);
        self.fetch_cache.lock().await.insert(key, value.clone());
        Ok(value)
    }

    /// Resolves every entry of `map` concurrently (bounded by
    /// `max_concurrent_providers` via the root-fetch semaphore), rather than
    /// one key at a time — siblings have no ordering dependency on each
    /// other, only the shared cycle stack and fetch cache need coordinating,
    /// and both are already guarded by locks. Each entry gets its own clone
    /// of the cycle stack: siblings don't share a call chain, so a cycle
    /// detected while resolving one key must not poison resolution of
    /// another key that happens to reuse the same alias.
    fn resolve_map<'b>(
        &'b self,
        ctx: &'b CancellationToken,
        map: &'b Map,
        stack: &'b CycleStack<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Map, ResolveError>> + 'b>> {
        Box::pin(async move {
            let futures = map.iter().map(|(k, v)| {
                let mut branch_stack = stack.clone();
                async move { Ok::<_, ResolveError>((k.clone(), self.resolve_value(ctx, v, &mut branch_stack).await?)) }
            });
            let results = futures::future::join_all(futures).await;
            let mut out = Map::new();
            for result in results {
                let (k, v) = result?;
                out.insert(k, v);
            }
            Ok(out)
        })
    }

    fn resolve_value<'b>(
        &'b self,
        ctx: &'b CancellationToken,
        value: &'b Value,
        stack: &'b mut CycleStack<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ResolveError>> + 'b>> {
        Box::pin(async move {
            match value {
                Value::Map(m) => Ok(Value::Map(self.resolve_map(ctx, m, stack).await?)),
                Value::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.resolve_value(ctx, item, stack).await?);
                    }
                    Ok(Value::List(out))
                }
                Value::Placeholder(p) => self.resolve_placeholder(ctx, p, stack).await,
                other => Ok(other.clone()),
            }
        })
    }

    async fn resolve_placeholder(
        &self,
        ctx: &CancellationToken,
        p: &Placeholder,
        stack: &mut CycleStack<String>,
    ) -> Result<Value, ResolveError> {
        let key = fetch_cache_key(&p.alias, &p.path);
        if let Err(chain) = stack.push(key) {
            let err = ResolveError::Cycle { chain };
            return self.recover_or_propagate(p, err).await;
        }
        let result = self.resolve_placeholder_inner(ctx, p, stack).await;
        stack.pop();
        match result {
            Ok(v) => Ok(v),
            Err(e) => self.recover_or_propagate(p, e.wrap(p.alias.clone(), p.path.join("."), p.span.clone())).await,
        }
    }

    /// Applies the `allow_missing_provider` recovery policy: substitute
    /// `null` and record a warning instead of failing the whole run.
    async fn recover_or_propagate(&self, p: &Placeholder, err: ResolveError) -> Result<Value, ResolveError> {
        if !self.allow_missing_provider {
            return Err(err);
        }
        self.warnings.lock().await.push(Diagnostic::warning_at(err.to_string(), p.span.clone()));
        Ok(Value::Null)
    }

    /// Recursive because the cache is keyed per fetch, so a call chain that
    /// loops back through this function (a chained/self-referential
    /// placeholder) still goes through `resolve_placeholder`'s cycle-stack
    /// push/pop on every hop.
    fn resolve_placeholder_inner<'b>(
        &'b self,
        ctx: &'b CancellationToken,
        p: &'b Placeholder,
        stack: &'b mut CycleStack<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ResolveError>> + 'b>> {
        Box::pin(async move {
            let fetched = self.fetch_path(ctx, &p.alias, &p.path).await?;

            // The provider already navigated to `p.path` itself; what it
            // handed back may contain further placeholders (e.g. a provider
            // whose root is the surrounding data tree, spec.md §8.6's
            // self-referential cycle scenario), so resolve it the same way
            // any other map/list/placeholder in the tree would be resolved,
            // sharing this call's cycle stack.
            let resolved = self.resolve_value(ctx, fetched.as_ref(), stack).await?;

            // Mode is read off what came back (spec §4.11 step 5): a map
            // result (root mode's whole root, or map mode) accepts sibling
            // overrides; anything else is property mode, where overrides
            // don't apply (spec §4.11 step 8 only defines override semantics
            // for map mode).
            match (&resolved, &p.overrides) {
                (Value::Map(m), Some(overrides)) => Ok(Value::Map(merge_overrides(m, overrides))),
                _ => Ok(resolved),
            }
        })
    }
}

fn fetch_cache_key(alias: &str, path: &[String]) -> String {
    format!("{alias}:{}", path.join("."))
}

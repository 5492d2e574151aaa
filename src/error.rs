//! Error taxonomy (spec §7). Fatal errors short-circuit a stage and propagate
//! as `Result::Err`; recoverable issues never appear here — they're collected
//! into [`crate::snapshot::CompilationResult`] as diagnostics instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::span::SourceSpan;

pub type Result<T, E = NomosError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum NomosError {
    #[error(transparent)]
    Discover(#[from] DiscoverError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Lockfile(#[from] LockfileError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("invalid compile options: {0}")]
    Options(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("failed to stat path {path}: {source}")]
    Stat { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to read directory {path}: {source}")]
    ReadDir { path: PathBuf, #[source] source: std::io::Error },
    #[error("{path} is not a .csl file")]
    NotCsl { path: PathBuf },
    #[error("path does not exist: {path}")]
    NotFound { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{file}:{line}:{col}: {message}")]
    Syntax { file: PathBuf, line: u32, col: u32, message: String },
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

/// Provider lifecycle errors (spec §4.6, §7). The manager always attempts to
/// reap the subprocess before surfacing one of these.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no provider registered for alias `{alias}`")]
    NotFound { alias: String },
    #[error("provider type `{type_name}` is not registered and no remote resolver is configured; run `nomos init` to install provider binaries")]
    TypeNotRegistered { type_name: String },
    #[error("provider binary not found: {path}")]
    BinaryMissing { path: PathBuf },
    #[error("failed to spawn provider process for alias `{alias}`: {source}")]
    Spawn { alias: String, #[source] source: std::io::Error },
    #[error("timed out waiting for provider `{alias}` to print PROVIDER_PORT=<port> within {timeout_ms}ms; stderr:\n{stderr}")]
    PortDiscoveryTimeout { alias: String, timeout_ms: u64, stderr: String },
    #[error("provider `{alias}` exited before announcing a port; stderr:\n{stderr}")]
    EarlyExit { alias: String, stderr: String },
    #[error("failed to connect to provider `{alias}` on 127.0.0.1:{port}: {source}")]
    Connect { alias: String, port: u16, #[source] source: std::io::Error },
    #[error("health check failed for provider `{alias}`: {message}")]
    HealthCheck { alias: String, message: String },
    #[error("init failed for provider `{alias}`: {message}")]
    Init { alias: String, message: String },
    #[error("fetch failed for provider `{alias}` at path {path:?}: {message}")]
    Fetch { alias: String, path: Vec<String>, message: String },
    #[error("provider `{alias}` has no value at path {path:?}; available keys: {available:?}")]
    PathNotFound { alias: String, path: Vec<String>, available: Vec<String> },
    #[error("cannot navigate into scalar value for provider `{alias}` at path {path:?}")]
    NavigateThroughScalar { alias: String, path: Vec<String> },
    #[error("rpc transport error with provider `{alias}`: {message}")]
    Rpc { alias: String, message: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Lockfile(#[from] LockfileError),
}

#[derive(Debug, Error)]
pub enum LockfileError {
    #[error("lockfile not found at {path}")]
    Missing { path: PathBuf },
    #[error("failed to parse lockfile {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
    #[error("no lockfile entry found for provider type `{type_name}`")]
    EntryNotFound { type_name: String },
    #[error("lockfile entry for `{type_name}` is missing a checksum field; regenerate the lockfile (e.g. `nomos providers lock`) to pin an integrity hash")]
    ChecksumMissing { type_name: String },
    #[error("checksum mismatch for provider `{type_name}` binary {path}: expected {expected}, found {found}")]
    ChecksumMismatch { type_name: String, path: PathBuf, expected: String, found: String },
    #[error("provider binary missing at {path} for type `{type_name}`")]
    BinaryMissing { type_name: String, path: PathBuf },
    #[error("malformed checksum field for `{type_name}`: expected `sha256:<64 hex chars>`, got `{value}`")]
    ChecksumMalformed { type_name: String, value: String },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no provider registered for import alias `{alias}`")]
    MissingProvider { alias: String },
    #[error("import at {span} has no path segments")]
    MissingPath { span: SourceSpan },
    #[error("import cycle detected: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },
    #[error("import `{alias}:{path}` resolved to a non-map value; imports must yield a map")]
    NotAMap { alias: String, path: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("resolving @{alias}:{path} at {span}: {source}")]
    Envelope { alias: String, path: String, span: SourceSpan, #[source] source: Box<ResolveError> },
    #[error("unresolved reference to alias `{alias}`{suggestion}")]
    UnresolvedAlias { alias: String, suggestion: String },
    #[error("reference cycle detected: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ResolveError {
    pub fn wrap(self, alias: impl Into<String>, path: impl Into<String>, span: SourceSpan) -> Self {
        Self::Envelope { alias: alias.into(), path: path.into(), span, source: Box::new(self) }
    }
}

//! Compile Orchestrator (C12, spec §4.12). Sequences every other component
//! into the single public entry point: discover files, parse them, fold
//! their data with provenance, register declared providers, validate,
//! resolve references, and assemble a [`Snapshot`]. `compile` never panics
//! and never returns early on a recoverable issue — every problem found
//! along the way is collected into the returned [`CompilationResult`]
//! instead.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::ast::{config_to_map, FileAst};
use crate::convert::convert;
use crate::cycle::CycleStack;
use crate::diagnostic::{format_diagnostics, Diagnostic};
use crate::discover::discover;
use crate::error::ParseError;
use crate::import::resolve_imports;
use crate::merge::{merge, merge_overrides, ProvenanceMap};
use crate::parser::parse;
use crate::provider::alias::AliasRegistry;
use crate::provider::registry::ProviderTypeRegistry;
use crate::provider::variables;
use crate::resolve::Resolver;
use crate::snapshot::{CompilationResult, Metadata, Snapshot};
use crate::utils::default_max_concurrent_providers;
use crate::validate::{validate_alias_dependency_cycles, validate_unresolved_aliases};
use crate::value::Map;

/// The alias the built-in `var` provider is registered under when
/// [`CompileOptions::variables`] is set (spec §6).
pub const VARIABLES_ALIAS: &str = "var";

/// Options accepted by [`compile`] (spec §6 "Configuration options"). Built
/// through [`CompileOptions::builder`], mirroring the teacher's
/// `ProjectBuilder` pattern: the two options with no sensible default
/// (`path`, `alias_registry`) are constructor arguments, everything else is a
/// chainable setter with a spec-mandated default.
#[derive(Clone)]
pub struct CompileOptions {
    path: PathBuf,
    alias_registry: Arc<AliasRegistry>,
    type_registry: Option<Arc<ProviderTypeRegistry>>,
    variables: Option<Map>,
    allow_missing_provider: bool,
    per_provider_fetch_timeout: Option<Duration>,
    max_concurrent_providers: usize,
}

impl CompileOptions {
    pub fn builder(path: impl Into<PathBuf>, alias_registry: Arc<AliasRegistry>) -> CompileOptionsBuilder {
        CompileOptionsBuilder {
            opts: CompileOptions {
                path: path.into(),
                alias_registry,
                type_registry: None,
                variables: None,
                allow_missing_provider: false,
                per_provider_fetch_timeout: None,
                max_concurrent_providers: default_max_concurrent_providers(),
            },
        }
    }
}

pub struct CompileOptionsBuilder {
    opts: CompileOptions,
}

impl CompileOptionsBuilder {
    /// Declares this compile's provider type registry. Its absence disables
    /// import resolution and source-declaration bootstrap with an explicit,
    /// named error per declaration that would otherwise need it, rather than
    /// a silent skip (spec §4.12).
    pub fn type_registry(mut self, registry: Arc<ProviderTypeRegistry>) -> Self {
        self.opts.type_registry = Some(registry);
        self
    }

    pub fn variables(mut self, variables: Map) -> Self {
        self.opts.variables = Some(variables);
        self
    }

    pub fn allow_missing_provider(mut self, allow: bool) -> Self {
        self.opts.allow_missing_provider = allow;
        self
    }

    pub fn per_provider_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.opts.per_provider_fetch_timeout = Some(timeout);
        self
    }

    pub fn max_concurrent_providers(mut self, n: usize) -> Self {
        self.opts.max_concurrent_providers = n.max(1);
        self
    }

    pub fn build(self) -> CompileOptions {
        self.opts
    }
}

/// Running state threaded through the stages below; split out of `compile`
/// itself so each stage can be a plain function instead of one long body.
struct Run {
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    sources_text: HashMap<PathBuf, String>,
}

impl Run {
    fn new() -> Self {
        Self { errors: Vec::new(), warnings: Vec::new(), sources_text: HashMap::new() }
    }

    fn has_fatal(&self) -> bool {
        self.errors.iter().any(Diagnostic::is_error)
    }

    fn finish(
        self,
        data: Map,
        provenance: ProvenanceMap,
        input_files: Vec<PathBuf>,
        aliases: Vec<String>,
        started_at: SystemTime,
    ) -> CompilationResult {
        let metadata = Metadata {
            input_files,
            provider_aliases: aliases,
            started_at,
            ended_at: SystemTime::now(),
            provenance,
            errors: self.errors.iter().map(|d| d.message.clone()).collect(),
            warnings: self.warnings.iter().map(|d| d.message.clone()).collect(),
        };
        CompilationResult { snapshot: Snapshot { data, metadata }, errors: self.errors, warnings: self.warnings }
    }
}

/// Renders a [`CompilationResult`]'s diagnostics against the original source
/// text. Kept here rather than in `diagnostic` since it needs the per-run
/// source map that only the orchestrator assembles while parsing.
pub fn render(result: &CompilationResult, sources: &HashMap<PathBuf, String>) -> String {
    format_diagnostics(&result.all_diagnostics(), sources)
}

/// Runs the full compile pipeline (spec §4.12). Total: every recoverable
/// failure is collected into the returned result rather than aborting the
/// call.
#[instrument(skip_all, fields(path = %opts.path.display()))]
pub async fn compile(ctx: &CancellationToken, opts: CompileOptions) -> CompilationResult {
    let started_at = SystemTime::now();
    let mut run = Run::new();

    if opts.path.as_os_str().is_empty() {
        run.errors.push(Diagnostic::error("compile options: `path` must not be empty"));
        return run.finish(Map::new(), ProvenanceMap::new(), Vec::new(), Vec::new(), started_at);
    }

    let files = match discover(&opts.path) {
        Ok(files) => files,
        Err(err) => {
            run.errors.push(Diagnostic::error(err.to_string()));
            return run.finish(Map::new(), ProvenanceMap::new(), Vec::new(), Vec::new(), started_at);
        }
    };

    if let Some(variables) = &opts.variables {
        opts.alias_registry.register(VARIABLES_ALIAS, variables::TYPE_NAME, variables.clone(), opts.path.clone()).await;
    }

    let Some(asts) = parse_all(&files, &mut run) else {
        return run.finish(Map::new(), ProvenanceMap::new(), files, Vec::new(), started_at);
    };

    if ctx.is_cancelled() {
        run.errors.push(Diagnostic::error("compile cancelled before provider registration"));
        return run.finish(Map::new(), ProvenanceMap::new(), files, Vec::new(), started_at);
    }

    register_sources(&opts, &files, &asts, &mut run).await;

    let (data, provenance) = fold_files(ctx, &opts, &files, &asts, &mut run).await;

    let aliases = opts.alias_registry.registered_aliases().await;

    if run.has_fatal() {
        return run.finish(data, provenance, files, aliases, started_at);
    }

    let unresolved = validate_unresolved_aliases(&data, &aliases);
    let configs = opts.alias_registry.pending_configs().await;
    let cycles = validate_alias_dependency_cycles(&configs);
    if !unresolved.is_empty() || !cycles.is_empty() {
        // Spec §4.12 step 7: short-circuit, no resolution attempted.
        for e in unresolved.into_iter().chain(cycles) {
            run.errors.push(Diagnostic::error(e.to_string()));
        }
        return run.finish(data, provenance, files, aliases, started_at);
    }

    let resolver = Resolver::new(
        opts.alias_registry.as_ref(),
        opts.max_concurrent_providers,
        opts.allow_missing_provider,
        opts.per_provider_fetch_timeout,
    );
    let resolved = match resolver.resolve(ctx, &data).await {
        Ok(resolved) => {
            run.warnings.extend(resolver.take_warnings().await);
            resolved
        }
        Err(err) => {
            run.warnings.extend(resolver.take_warnings().await);
            run.errors.push(Diagnostic::error(err.to_string()));
            data
        }
    };

    run.finish(resolved, provenance, files, aliases, started_at)
}

/// Stage 4 (spec §4.12): parse every file, collecting syntax/IO errors as
/// fatal diagnostics. Returns `None` once any file failed to parse — the
/// snapshot cannot be built without every AST, so the remaining stages never
/// run (spec: "Parse failures for any file are fatal").
fn parse_all(files: &[PathBuf], run: &mut Run) -> Option<Vec<FileAst>> {
    let mut asts = Vec::with_capacity(files.len());
    for file in files {
        match std::fs::read_to_string(file) {
            Ok(text) => match parse(&text, file) {
                Ok(ast) => {
                    run.sources_text.insert(file.clone(), text);
                    asts.push(ast);
                }
                Err(err) => run.errors.push(parse_error_diagnostic(err)),
            },
            Err(source) => {
                run.errors.push(Diagnostic::error(ParseError::Io { path: file.clone(), source }.to_string()))
            }
        }
    }
    if run.has_fatal() {
        None
    } else {
        Some(asts)
    }
}

fn parse_error_diagnostic(err: ParseError) -> Diagnostic {
    match &err {
        ParseError::Syntax { file, line, col, .. } => {
            let span = crate::span::SourceSpan::new(file.clone(), *line, *col, *col + 1, 0, 0);
            Diagnostic::error_at(err.to_string(), span)
        }
        ParseError::Io { .. } => Diagnostic::error(err.to_string()),
    }
}

/// Stage 6 (spec §4.12): extract every `[source]` declaration across all
/// files and register it with the alias registry, first-wins on duplicates.
/// Reports an explicit, named error (not a silent no-op) for every `source`
/// declaration when no type registry was supplied — spec §4.12: "its absence
/// disables import resolution and source-declaration bootstrap with an
/// explicit, named error."
async fn register_sources(opts: &CompileOptions, files: &[PathBuf], asts: &[FileAst], run: &mut Run) {
    if opts.type_registry.is_none() {
        for ast in asts {
            for decl in &ast.sources {
                run.errors.push(Diagnostic::error_at(
                    format!("`source {}` requires a `type_registry` in CompileOptions; none was supplied", decl.alias),
                    decl.span.clone(),
                ));
            }
        }
        return;
    }

    for (file, ast) in files.iter().zip(asts) {
        for decl in &ast.sources {
            let config = config_to_map(&decl.config, file);
            let stuck = opts
                .alias_registry
                .register_if_absent(decl.alias.clone(), decl.type_name.clone(), config, file.clone())
                .await;
            if !stuck {
                warn!(alias = %decl.alias, file = %file.display(), "duplicate source alias ignored (first declaration wins)");
            }
        }
    }
}

/// Stages 3 and 5 of spec §4.12 (consolidated per the supplemental decision
/// recorded in `DESIGN.md`): for every file, in lexicographic order,
/// materialize its imports and fold them under the file's own data, then fold
/// the combined per-file map onto the running accumulator with provenance.
async fn fold_files(
    ctx: &CancellationToken,
    opts: &CompileOptions,
    files: &[PathBuf],
    asts: &[FileAst],
    run: &mut Run,
) -> (Map, ProvenanceMap) {
    let mut data = Map::new();
    let mut provenance = ProvenanceMap::new();
    let mut prev_file = PathBuf::new();
    let mut import_stack: CycleStack<String> = CycleStack::new();

    for (file, ast) in files.iter().zip(asts) {
        let mut file_data = Map::new();

        if !ast.imports.is_empty() {
            if opts.type_registry.is_some() {
                match resolve_imports(ctx, &ast.imports, file, &opts.alias_registry, &mut import_stack).await {
                    Ok(imports) => {
                        for (_, imported) in imports {
                            file_data = merge_overrides(&file_data, &imported);
                        }
                    }
                    Err(err) => run.errors.push(Diagnostic::error(err.to_string())),
                }
            } else if let Some(first) = ast.imports.first() {
                run.errors.push(Diagnostic::error_at(
                    format!("`import {}` requires a `type_registry` in CompileOptions; none was supplied", first.alias),
                    first.span.clone(),
                ));
            }
        }

        let own_data = convert(ast, file.clone());
        file_data = merge_overrides(&file_data, &own_data);

        data = merge(&data, &file_data, &prev_file, file, &mut provenance);
        prev_file = file.clone();
    }

    (data, provenance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::manager::ProviderProcessManager;
    use crate::value::Value;
    use std::fs;

    fn manager() -> Arc<ProviderProcessManager> {
        Arc::new(ProviderProcessManager::new(Duration::from_secs(5), Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn empty_path_is_a_fatal_diagnostic() {
        let mut registry = ProviderTypeRegistry::new(manager());
        registry.register_in_process(variables::TYPE_NAME, variables::VariablesProvider::constructor());
        let aliases = Arc::new(AliasRegistry::new(Arc::new(registry)));
        let opts = CompileOptions::builder("", aliases).build();
        let ctx = CancellationToken::new();
        let result = compile(&ctx, opts).await;
        assert!(result.has_errors());
    }

    #[tokio::test]
    async fn compiles_plain_file_with_no_providers() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.csl");
        fs::write(&file, "name: \"hello\"\nport: 8080\n").unwrap();

        let mut registry = ProviderTypeRegistry::new(manager());
        registry.register_in_process(variables::TYPE_NAME, variables::VariablesProvider::constructor());
        let aliases = Arc::new(AliasRegistry::new(Arc::new(registry)));
        let opts = CompileOptions::builder(dir.path(), aliases).build();
        let ctx = CancellationToken::new();
        let result = compile(&ctx, opts).await;

        assert!(!result.has_errors(), "unexpected errors: {:?}", result.errors);
        assert_eq!(result.snapshot.data.get("name"), Some(&Value::String("hello".into())));
        assert_eq!(result.snapshot.metadata.input_files.len(), 1);
    }

    #[tokio::test]
    async fn variables_resolve_through_var_alias() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.csl");
        fs::write(&file, "port: @var:port\n").unwrap();

        let mut registry = ProviderTypeRegistry::new(manager());
        registry.register_in_process(variables::TYPE_NAME, variables::VariablesProvider::constructor());
        let aliases = Arc::new(AliasRegistry::new(Arc::new(registry)));

        let mut vars = Map::new();
        vars.insert("port".into(), Value::Number(crate::value::Number::Int(9090)));

        let opts = CompileOptions::builder(dir.path(), aliases.clone())
            .type_registry(Arc::new(ProviderTypeRegistry::new(manager())))
            .variables(vars)
            .build();
        let ctx = CancellationToken::new();
        let result = compile(&ctx, opts).await;

        assert!(!result.has_errors(), "unexpected errors: {:?}", result.errors);
        assert_eq!(result.snapshot.data.get("port"), Some(&Value::Number(crate::value::Number::Int(9090))));
    }

    #[tokio::test]
    async fn missing_type_registry_reports_explicit_error_for_source_decl() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.csl");
        fs::write(&file, "source cfg: http \"1.0.0\" {\n  url: \"https://example.com\"\n}\n\nname: \"x\"\n").unwrap();

        let mut registry = ProviderTypeRegistry::new(manager());
        registry.register_in_process(variables::TYPE_NAME, variables::VariablesProvider::constructor());
        let aliases = Arc::new(AliasRegistry::new(Arc::new(registry)));
        let opts = CompileOptions::builder(dir.path(), aliases).build();
        let ctx = CancellationToken::new();
        let result = compile(&ctx, opts).await;

        assert!(result.has_errors());
        assert!(result.errors.iter().any(|d| d.message.contains("type_registry")));
    }

    #[tokio::test]
    async fn unresolved_alias_short_circuits_before_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.csl");
        fs::write(&file, "port: @missing:port\n").unwrap();

        let mut registry = ProviderTypeRegistry::new(manager());
        registry.register_in_process(variables::TYPE_NAME, variables::VariablesProvider::constructor());
        let aliases = Arc::new(AliasRegistry::new(Arc::new(registry)));
        let opts = CompileOptions::builder(dir.path(), aliases).build();
        let ctx = CancellationToken::new();
        let result = compile(&ctx, opts).await;

        assert!(result.has_errors());
        assert!(result.errors.iter().any(|d| d.message.contains("unresolved reference")));
    }
}

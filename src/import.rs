//! Import Resolver (C9, spec §4.9). An `[import]` block folds an external
//! provider-backed map directly into a file's data, at the declared position,
//! before that file's own sections are merged in. Reuses [`crate::cycle`] for
//! cycle detection across a chain of imports that loop back on each other.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::ast::ImportDecl;
use crate::cycle::CycleStack;
use crate::error::ImportError;
use crate::provider::alias::AliasRegistry;
use crate::value::{Map, Value};

fn cycle_key(file: &Path, import: &ImportDecl) -> String {
    format!("{}|{}:{}", file.display(), import.alias, import.path.join("."))
}

/// Resolves one `[import]` declaration to the map it designates. `stack`
/// tracks the chain of (file, alias, path) triples currently being resolved,
/// across recursive imports-of-imports, so a loop back to an entry already on
/// the stack is reported rather than recursing forever.
#[instrument(skip(ctx, aliases, stack), fields(alias = %import.alias, path = %import.path.join(".")))]
pub async fn resolve_import(
    ctx: &CancellationToken,
    import: &ImportDecl,
    file: &Path,
    aliases: &AliasRegistry,
    stack: &mut CycleStack<String>,
) -> Result<Map, ImportError> {
    if import.path.is_empty() {
        return Err(ImportError::MissingPath { span: import.span.clone() });
    }

    let key = cycle_key(file, import);
    if let Err(chain) = stack.push(key.clone()) {
        return Err(ImportError::Cycle { chain });
    }

    let result = resolve_import_inner(ctx, import, aliases).await;
    stack.pop();
    result
}

async fn resolve_import_inner(
    ctx: &CancellationToken,
    import: &ImportDecl,
    aliases: &AliasRegistry,
) -> Result<Map, ImportError> {
    let provider = aliases
        .get_provider(ctx, &import.alias)
        .await
        .map_err(|err| match err {
            crate::error::ProviderError::NotFound { alias } => ImportError::MissingProvider { alias },
            other => ImportError::Provider(other),
        })?;

    let fetched = provider.fetch(ctx, &import.path).await?;
    match fetched {
        Value::Map(map) => Ok(map),
        _ => Err(ImportError::NotAMap { alias: import.alias.clone(), path: import.path.join(".") }),
    }
}

/// Resolves every import in a file, in declaration order, returning each
/// import's map alongside its declaration for the caller to fold into the
/// file's data tree ahead of its own sections.
pub async fn resolve_imports(
    ctx: &CancellationToken,
    imports: &[ImportDecl],
    file: &Path,
    aliases: &AliasRegistry,
    stack: &mut CycleStack<String>,
) -> Result<Vec<(ImportDecl, Map)>, ImportError> {
    let mut out = Vec::with_capacity(imports.len());
    for import in imports {
        let map = resolve_import(ctx, import, file, aliases, stack).await?;
        out.push((import.clone(), map));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceSpan;

    #[test]
    fn cycle_key_includes_file_alias_and_path() {
        let import = ImportDecl {
            alias: "cfg".into(),
            path: vec!["base".into(), "db".into()],
            span: SourceSpan::synthetic("a.csl"),
        };
        assert_eq!(cycle_key(Path::new("a.csl"), &import), "a.csl|cfg:base.db");
    }
}

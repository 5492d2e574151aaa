//! `nomos` CLI front end (`cli` feature). Compiles a `.csl` source or
//! directory and prints the resulting snapshot as JSON, with diagnostics
//! rendered to stderr.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nomos_compiler::provider::alias::AliasRegistry;
use nomos_compiler::provider::lockfile::Lockfile;
use nomos_compiler::provider::manager::ProviderProcessManager;
use nomos_compiler::provider::registry::ProviderTypeRegistry;
use nomos_compiler::provider::variables::VariablesProvider;
use nomos_compiler::{compile, render, CompileOptions};

#[derive(Parser)]
#[command(name = "nomos", about = "Compile Nomos configuration sources")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a `.csl` file or directory and print the resulting snapshot.
    Compile {
        /// Path to a `.csl` file or a directory of `.csl` files.
        path: PathBuf,
        /// Path to a provider lockfile (`nomos.lock.json`).
        #[arg(long)]
        lockfile: Option<PathBuf>,
        /// Continue past missing providers, substituting `null`.
        #[arg(long)]
        allow_missing_provider: bool,
        /// Per-root-fetch timeout, in seconds.
        #[arg(long)]
        fetch_timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Compile { path, lockfile, allow_missing_provider, fetch_timeout_secs } => {
            run_compile(path, lockfile, allow_missing_provider, fetch_timeout_secs).await
        }
    }
}

async fn run_compile(
    path: PathBuf,
    lockfile: Option<PathBuf>,
    allow_missing_provider: bool,
    fetch_timeout_secs: Option<u64>,
) -> ExitCode {
    let manager = Arc::new(ProviderProcessManager::default());
    let mut registry = ProviderTypeRegistry::new(manager.clone());
    registry.register_in_process(
        nomos_compiler::provider::variables::TYPE_NAME,
        VariablesProvider::constructor(),
    );

    let registry = match lockfile {
        Some(path) => match Lockfile::load(&path) {
            Ok(lockfile) => registry.with_lockfile(lockfile),
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => registry,
    };

    let registry = Arc::new(registry);
    let aliases = Arc::new(AliasRegistry::new(registry.clone()));

    let mut builder = CompileOptions::builder(path, aliases)
        .type_registry(registry)
        .allow_missing_provider(allow_missing_provider);
    if let Some(secs) = fetch_timeout_secs {
        builder = builder.per_provider_fetch_timeout(Duration::from_secs(secs));
    }
    let opts = builder.build();

    let ctx = CancellationToken::new();
    let result = compile(&ctx, opts).await;

    let sources: HashMap<PathBuf, String> = result
        .snapshot
        .metadata
        .input_files
        .iter()
        .filter_map(|p| std::fs::read_to_string(p).ok().map(|t| (p.clone(), t)))
        .collect();

    if !result.errors.is_empty() || !result.warnings.is_empty() {
        eprintln!("{}", render(&result, &sources));
    }

    let Ok(json) = serde_json::to_string_pretty(&result.snapshot) else {
        eprintln!("error: failed to serialize snapshot");
        return ExitCode::FAILURE;
    };
    println!("{json}");

    for (alias, health) in manager.health_snapshot().await {
        match health {
            Ok(health) => tracing::debug!(alias, status = ?health.status, message = %health.message, "provider health"),
            Err(err) => tracing::debug!(alias, error = %err, "provider health check failed"),
        }
    }
    manager.shutdown(&ctx).await;

    if result.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

//! Benchmarks the compile pipeline (discover -> parse -> fold -> validate)
//! over a batch of plain, provider-free sources, the way the teacher
//! benchmarks batched solc invocations.

#[macro_use]
extern crate criterion;

use std::sync::Arc;

use criterion::Criterion;
use nomos_compiler::provider::alias::AliasRegistry;
use nomos_compiler::provider::manager::ProviderProcessManager;
use nomos_compiler::provider::registry::ProviderTypeRegistry;
use nomos_compiler::{compile, CompileOptions};
use tokio_util::sync::CancellationToken;

fn sample_source(index: usize) -> String {
    format!(
        "database: {{\n  host: \"db-{index}.internal\"\n  port: {port}\n  replicas: [\"a\", \"b\", \"c\"]\n}}\n\ncache: {{\n  ttl_seconds: {ttl}\n  backend: \"redis\"\n}}\n",
        port = 5432 + index,
        ttl = 60 * (index + 1),
    )
}

fn write_batch(dir: &tempfile::TempDir, count: usize) {
    for i in 0..count {
        std::fs::write(dir.path().join(format!("service-{i}.csl")), sample_source(i)).unwrap();
    }
}

fn compile_many_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    write_batch(&dir, 50);

    let manager = Arc::new(ProviderProcessManager::new(
        std::time::Duration::from_secs(5),
        std::time::Duration::from_secs(5),
    ));
    let registry = Arc::new(ProviderTypeRegistry::new(manager));
    let aliases = Arc::new(AliasRegistry::new(registry));

    let mut group = c.benchmark_group("compile many");
    group.sample_size(10);
    group.bench_function("fifty_plain_files", |b| {
        b.iter(|| {
            let opts = CompileOptions::builder(dir.path(), aliases.clone()).build();
            runtime.block_on(async { compile(&CancellationToken::new(), opts).await })
        });
    });
    group.finish();
}

criterion_group!(benches, compile_many_benchmark);
criterion_main!(benches);

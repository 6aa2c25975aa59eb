use agentry::factory::{BuiltinModule, FactoryResolver, NamedAgent, ResolvedAgent};
use agentry_schema::{AgentConfig, FactoryParams};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_create_agent(c: &mut Criterion) {
    let resolver = FactoryResolver::default();
    resolver.register_factory("tickets", |_: &FactoryParams| {
        Ok(Box::new(NamedAgent::new("TicketsAgent", "")) as ResolvedAgent)
    });

    let catalog_cfg = AgentConfig::new("echo")
        .with_module(BuiltinModule::Echo.module_name())
        .with_function("create_echo_agent")
        .with_param("name", "BenchEcho");
    let override_cfg = AgentConfig::new("tickets");

    // Warm the module cache so the loop measures hits only.
    let _ = resolver.create_agent(&catalog_cfg);

    c.bench_function("factory_catalog_cache_hit", |b| {
        b.iter(|| black_box(resolver.create_agent(&catalog_cfg).ok()));
    });

    c.bench_function("factory_override_hit", |b| {
        b.iter(|| black_box(resolver.create_agent(&override_cfg).ok()));
    });
}

criterion_group!(benches, bench_create_agent);
criterion_main!(benches);

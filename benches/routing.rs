use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rustf_dispatch::context::Context;
use rustf_dispatch::http::Request;
use rustf_dispatch::routing::{BoxFuture, CompiledPattern, Method, Route, RouteTable, Router};
use std::sync::Arc;

fn mock_handler(_ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move { Ok(()) })
}

fn table_with(count: usize) -> RouteTable {
    let mut table = RouteTable::new();
    for i in 0..count {
        let pattern = CompiledPattern::compile(&format!("/section{}/:id/items/:item", i)).unwrap();
        let handler: rustf_dispatch::routing::RouteHandler = mock_handler;
        table.push(Route::new(Method::Get, pattern, Arc::new(handler), Vec::new()));
    }
    table
}

fn benchmark_pattern_compile(c: &mut Criterion) {
    c.bench_function("pattern_compile_static", |b| {
        b.iter(|| CompiledPattern::compile(black_box("/api/users/profile")).unwrap())
    });

    c.bench_function("pattern_compile_params", |b| {
        b.iter(|| CompiledPattern::compile(black_box("/blog/:year/:month/:slug")).unwrap())
    });
}

fn benchmark_table_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_find_last");
    for count in [10usize, 100, 500] {
        let table = table_with(count);
        let path = format!("/section{}/42/items/7", count - 1);
        group.bench_with_input(BenchmarkId::from_parameter(count), &path, |b, path| {
            b.iter(|| black_box(table.find("GET", black_box(path))))
        });
    }
    group.finish();

    let table = table_with(100);
    c.bench_function("table_find_miss", |b| {
        b.iter(|| black_box(table.find("GET", black_box("/nowhere/1"))))
    });
}

fn benchmark_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let router = Router::new();
    for i in 0..50 {
        router
            .get(&format!("/section{}/:id", i), mock_handler, vec![])
            .unwrap();
    }
    let api = router.group("/api", vec![]);
    api.get("/users/:id", mock_handler, vec![]).unwrap();

    c.bench_function("dispatch_group_route", |b| {
        b.iter(|| rt.block_on(router.dispatch(Request::new("GET", black_box("/api/users/9")))))
    });

    c.bench_function("dispatch_not_found", |b| {
        b.iter(|| rt.block_on(router.dispatch(Request::new("GET", black_box("/missing")))))
    });
}

criterion_group!(
    benches,
    benchmark_pattern_compile,
    benchmark_table_lookup,
    benchmark_dispatch
);
criterion_main!(benches);

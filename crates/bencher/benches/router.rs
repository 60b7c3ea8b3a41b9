use std::hint::black_box;
use bencher::{RouteTable, TestCase};
use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use gk::{Engine, Router, handler_fn};
use http::{Method, Request, StatusCode};

static STATIC_ROUTES: RouteTable = RouteTable::new("static.txt", include_str!("../resources/routes/static.txt"));
static API_ROUTES: RouteTable = RouteTable::new("api.txt", include_str!("../resources/routes/api.txt"));
static LARGE_ROUTES: RouteTable = RouteTable::new("large.txt", include_str!("../resources/routes/large.txt"));

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::small("static_routes", STATIC_ROUTES),
        TestCase::normal("api_routes", API_ROUTES),
        TestCase::large("versioned_api_routes", LARGE_ROUTES),
    ]
}

fn method(name: &str) -> Method {
    Method::from_bytes(name.as_bytes()).expect("route table should only contain valid methods")
}

fn build_router(table: &RouteTable) -> Router {
    let mut router = Router::new();
    for (name, pattern) in table.routes() {
        router.add_route(method(name), pattern, handler_fn(|_ctx| {})).expect("route table should only contain valid patterns");
    }
    router
}

fn build_engine(table: &RouteTable) -> Engine {
    let mut engine = Engine::new();
    engine.use_middleware(|ctx| ctx.next());
    for (name, pattern) in table.routes() {
        engine
            .add_route(method(name), pattern, |ctx| ctx.status(StatusCode::OK))
            .expect("route table should only contain valid patterns");
    }
    engine
}

fn benchmark_match_route(criterion: &mut Criterion) {
    let test_cases = create_test_cases();
    let mut group = criterion.benchmark_group("match_route");

    for case in test_cases {
        let router = build_router(case.table());
        let requests = case.table().requests().into_iter().map(|(name, path)| (method(name), path)).collect::<Vec<_>>();

        group.sample_size(case.group().sample_size());
        group.throughput(Throughput::Elements(requests.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &requests, |b, requests| {
            b.iter(|| {
                for (method, path) in requests {
                    black_box(router.match_route(method, path).expect("every sample path should match"));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_serve(criterion: &mut Criterion) {
    let test_cases = create_test_cases();
    let mut group = criterion.benchmark_group("serve");

    for case in test_cases {
        let engine = build_engine(case.table());
        let requests = case.table().requests();

        group.sample_size(case.group().sample_size());
        group.throughput(Throughput::Elements(requests.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &requests, |b, requests| {
            b.iter_batched(
                || {
                    requests
                        .iter()
                        .map(|(name, path)| Request::builder().method(method(name)).uri(path.as_str()).body(Bytes::new()).expect("sample request should be valid"))
                        .collect::<Vec<_>>()
                },
                |requests| {
                    for request in requests {
                        black_box(engine.serve(request));
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(router, benchmark_match_route, benchmark_serve);
criterion_main!(router);

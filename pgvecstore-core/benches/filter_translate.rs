//! Benchmarks for filter parsing, translation and statement building.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pgvecstore_core::filter::translate;
use pgvecstore_core::index::{HnswConfig, IndexConfig, IndexDescriptor};
use pgvecstore_core::{
    DistanceMetric, Filter, HybridConfig, Params, QueryBuilder, QueryParams, VectorTypeRef,
};
use rand::Rng;
use serde_json::json;

fn wide_filter(clauses: usize) -> Filter {
    let mut rng = rand::thread_rng();
    (1..clauses).fold(Filter::field("field_0").eq(rng.gen_range(0..100)), |acc, i| {
        let field = format!("field_{i}");
        let clause = match i % 4 {
            0 => Filter::field(&field).gt(rng.gen_range(0..100)),
            1 => Filter::field(&field).contained_in(vec!["a", "b", "c"]),
            2 => Filter::field(&field).contains("needle"),
            _ => Filter::field(&field).exists(),
        };
        acc.and(clause)
    })
}

fn bench_translate(c: &mut Criterion) {
    let mut group = c.benchmark_group("translate");

    for clauses in [1, 8, 32, 128].iter() {
        let filter = wide_filter(*clauses);
        group.bench_with_input(BenchmarkId::from_parameter(clauses), clauses, |bench, _| {
            bench.iter(|| {
                let mut params = Params::new();
                translate(black_box(&filter), &mut params).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let value = json!({
        "$and": [
            {"category": {"$in": ["rust", "go", "zig"]}},
            {"year": {"$gte": 2020, "$lt": 2025}},
            {"$or": [{"tags": {"$all": ["async", "db"]}}, {"title": {"$regex": "^intro", "$options": "i"}}]},
            {"authors": {"$elemMatch": {"name": "ada", "role": {"$ne": "reviewer"}}}}
        ]
    });

    c.bench_function("parse_nested_filter", |bench| {
        bench.iter(|| Filter::from_json(black_box(&value)).unwrap())
    });
}

fn bench_hybrid_statement(c: &mut Criterion) {
    let descriptor = IndexDescriptor {
        name: "docs".into(),
        dimension: 768,
        metric: DistanceMetric::Cosine,
        config: IndexConfig::Hnsw(HnswConfig::new(16, 64)),
        count: 0,
        full_text_language: Some("english".into()),
    };
    let vector_type = VectorTypeRef::unqualified();
    let mut rng = rand::thread_rng();
    let query: Vec<f32> = (0..768).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let params = QueryParams::hybrid(query, "rust async runtime", HybridConfig::default())
        .with_filter(wide_filter(8));

    c.bench_function("build_hybrid_statement", |bench| {
        bench.iter(|| {
            QueryBuilder::new("public", &descriptor, &vector_type, 40)
                .build(black_box(&params))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_translate, bench_parse, bench_hybrid_statement);
criterion_main!(benches);

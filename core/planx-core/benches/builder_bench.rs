// Builder benchmarks
//
// Section 1: SQL text to syntax tree
// Section 2: syntax tree to plan

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use planx_core::{CompileContext, MemCatalog, PlanBuilder, SessionVars, SqlParser};

const QUERIES: &[&str] = &[
    "SELECT a, b FROM t WHERE a = 10",
    "SELECT /*+ USE_INDEX(t, c_d_e) */ c, d FROM t WHERE c > 1 AND d < 5 ORDER BY c LIMIT 20",
    "SELECT b, SUM(a) FROM t2 GROUP BY b HAVING SUM(a) > 3",
    "SELECT t.a, t2.b FROM t JOIN t2 ON t.a = t2.a",
    "SELECT a FROM t WHERE a IN (SELECT a FROM t2)",
    "INSERT INTO t2 (a, b) VALUES (1, 2), (3, 4)",
    "UPDATE t SET b = b + 1 WHERE a = 1",
    "DELETE FROM t2 WHERE b IS NULL",
];

// ═══════════════════════════════════════════════════════════════════════════
// Section 1: Parsing
// ═══════════════════════════════════════════════════════════════════════════

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(QUERIES.len() as u64));
    let parser = SqlParser::new();

    group.bench_function("mixed", |b| {
        b.iter(|| {
            for sql in QUERIES {
                let _ = parser.parse(black_box(sql));
            }
        })
    });

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 2: Plan building
// ═══════════════════════════════════════════════════════════════════════════

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.throughput(Throughput::Elements(QUERIES.len() as u64));
    let catalog = MemCatalog::mock();
    let parser = SqlParser::new();
    let stmts: Vec<_> = QUERIES.iter().filter_map(|sql| parser.parse_one(sql).ok()).collect();

    group.bench_function("mixed", |b| {
        b.iter(|| {
            for stmt in &stmts {
                let mut ctx = CompileContext::new(SessionVars::new().with_current_db("test"));
                let _ = PlanBuilder::new(&mut ctx, &catalog).build(black_box(stmt));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_build);
criterion_main!(benches);

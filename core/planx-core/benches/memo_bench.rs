// Memo benchmarks
//
// Section 1: group insertion and duplicate rejection
// Section 2: plan-to-memo conversion and key derivation

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use planx_core::memo::{Group, GroupExpr, GroupId};
use planx_core::planner::plan::LogicalOperator;
use planx_core::planner::schema::Schema;
use planx_core::{CompileContext, LogicalPlan, MemCatalog, Memo, Plan, PlanBuilder, SessionVars, SqlParser};

// ═══════════════════════════════════════════════════════════════════════════
// Section 1: Group membership
// ═══════════════════════════════════════════════════════════════════════════

fn limit_expr(count: u64) -> GroupExpr {
    GroupExpr::with_children(LogicalOperator::Limit { offset: 0, count }, [GroupId(0)])
}

fn bench_group_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_insert");

    for size in [16u64, 256, 4096] {
        let exprs: Vec<GroupExpr> = (0..size).map(limit_expr).collect();
        group.bench_with_input(BenchmarkId::new("distinct", size), &exprs, |b, exprs| {
            b.iter(|| {
                let mut g = Group::new_with_schema(GroupExpr::new(LogicalOperator::MaxOneRow), Schema::default());
                for expr in exprs {
                    g.insert(black_box(expr.clone()));
                }
                g.len()
            })
        });

        let mut full = Group::new_with_schema(GroupExpr::new(LogicalOperator::MaxOneRow), Schema::default());
        for expr in &exprs {
            full.insert(expr.clone());
        }
        group.bench_with_input(BenchmarkId::new("duplicate", size), &exprs, |b, exprs| {
            b.iter(|| exprs.iter().filter(|e| full.exists(black_box(e))).count())
        });
    }

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 2: Conversion and key derivation
// ═══════════════════════════════════════════════════════════════════════════

fn compiled(sql: &str) -> Option<LogicalPlan> {
    let catalog = MemCatalog::mock();
    let stmt = SqlParser::new().parse_one(sql).ok()?;
    let mut ctx = CompileContext::new(SessionVars::new().with_current_db("test"));
    match PlanBuilder::new(&mut ctx, &catalog).build(&stmt).ok()? {
        Plan::Logical(plan) => Some(plan),
        _ => None,
    }
}

fn bench_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("memo_convert");
    let queries = [
        ("point", "select a from t where a = 10"),
        ("group_by", "select b, sum(a) from t2 group by b"),
        (
            "join",
            "select t.a, t2.b from t join t2 on t.a = t2.a where t.b > 1 order by t.a limit 10",
        ),
    ];

    for (name, sql) in queries {
        let Some(plan) = compiled(sql) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::new("convert", name), &plan, |b, plan| {
            b.iter(|| {
                let mut memo = Memo::new();
                memo.convert_to_group(black_box(plan))
            })
        });
        group.bench_with_input(BenchmarkId::new("convert_and_keys", name), &plan, |b, plan| {
            b.iter(|| {
                let mut memo = Memo::new();
                let root = memo.convert_to_group(black_box(plan));
                memo.build_key_info(root);
                memo.group(root).prop.schema.keys.len()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_group_insert, bench_convert);
criterion_main!(benches);

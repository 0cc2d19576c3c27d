// End-to-end compile tests: SQL text through the parser, the builder and the memo.

use planx_core::ast::{IndexHint, IndexHintType, SelectField, SelectStmt, Statement, TableName, TableRef};
use planx_core::memo::Operand;
use planx_core::planner::LogicalOperator;
use planx_core::{
    CompileContext, ErrorKind, LogicalPlan, MemCatalog, Memo, Plan, PlanBuilder, PlanError, PlanResult, SessionVars,
    SqlParser,
};

fn context() -> CompileContext {
    planx_core::logging::init_test();
    CompileContext::new(SessionVars::new().with_current_db("test"))
}

fn compile_with(ctx: &mut CompileContext, sql: &str) -> PlanResult<Plan> {
    let catalog = MemCatalog::mock();
    let stmt = SqlParser::new().parse_one(sql)?;
    PlanBuilder::new(ctx, &catalog).build(&stmt)
}

fn compile(sql: &str) -> PlanResult<Plan> {
    compile_with(&mut context(), sql)
}

fn logical(sql: &str) -> PlanResult<LogicalPlan> {
    match compile(sql)? {
        Plan::Logical(plan) => Ok(plan),
        other => Err(PlanError::Internal(format!("expected a logical plan, got {}", other.name()))),
    }
}

#[test]
fn test_primary_key_point_lookup_keys() -> PlanResult<()> {
    let plan = logical("select a from t where a = 10")?;
    let mut memo = Memo::new();
    let root = memo.convert_to_group(&plan);
    memo.build_key_info(root);

    let group = memo.group(root);
    assert!(group.prop.max_one_row);
    assert_eq!(group.prop.schema.keys.len(), 1);
    assert_eq!(group.prop.schema.keys[0].len(), 1);
    // The key is the `a` output column.
    assert_eq!(group.prop.schema.keys[0][0], group.prop.schema.columns[0]);
    Ok(())
}

#[test]
fn test_group_by_column_is_a_key() -> PlanResult<()> {
    let plan = logical("select b, sum(a) from t2 group by b")?;
    let mut memo = Memo::new();
    let root = memo.convert_to_group(&plan);
    memo.build_key_info(root);

    let group = memo.group(root);
    assert!(!group.prop.max_one_row);
    assert_eq!(group.prop.schema.keys.len(), 1);
    // The key is the `b` output column.
    let key = &group.prop.schema.keys[0];
    assert_eq!(key.len(), 1);
    assert_eq!(key[0], group.prop.schema.columns[0]);
    Ok(())
}

#[test]
fn test_memo_gives_repeated_compiles_their_own_groups() -> PlanResult<()> {
    let plan = logical("select a, b from t where b > 1 order by a limit 5")?;
    let mut memo = Memo::new();
    let first = memo.convert_to_group(&plan);
    assert_eq!(memo.len(), plan.node_count());
    assert_ne!(memo.convert_to_group(&plan), first);
    assert_eq!(memo.len(), 2 * plan.node_count());

    for (_, group) in memo.groups() {
        assert_eq!(group.len(), 1);
        assert!(group.first_elem(Operand::Any).is_some());
    }
    Ok(())
}

#[test]
fn test_self_join_of_derived_tables_keeps_both_sides() -> PlanResult<()> {
    let plan = logical("select a.x, b.x from (select 1 as x) a join (select 1 as x) b on a.x = b.x")?;
    let mut memo = Memo::new();
    let root = memo.convert_to_group(&plan);
    memo.build_key_info(root);
    assert_eq!(memo.len(), plan.node_count());

    let (id, join) = memo
        .groups()
        .find_map(|(id, g)| match &g.first_elem(Operand::Join)?.op {
            LogicalOperator::Join(info) => Some((id, info.clone())),
            _ => None,
        })
        .ok_or_else(|| PlanError::Internal("no join group".into()))?;
    let children = memo.group(id).first_elem(Operand::Join).map(|e| e.children().to_vec()).unwrap_or_default();
    assert_eq!(children.len(), 2);
    assert_ne!(children[0], children[1]);

    let left = &memo.group(children[0]).prop.schema;
    let right = &memo.group(children[1]).prop.schema;
    assert_eq!(join.eq_conditions.len(), 1);
    let (l, r) = &join.eq_conditions[0];
    assert!(left.contains(l));
    assert!(right.contains(r));
    assert!(!left.contains(r));
    Ok(())
}

#[test]
fn test_insert_wrong_value_count_names_the_row() {
    let err = compile("insert into t2 (a) values (1, 2)").unwrap_err();
    assert!(matches!(err, PlanError::WrongValueCountOnRow(1)));
    assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    assert_eq!(err.code(), 1136);

    let err = compile("insert into t2 (a, b) values (1, 2), (3, 4), (5)").unwrap_err();
    assert!(matches!(err, PlanError::WrongValueCountOnRow(3)));
}

#[test]
fn test_insert_select_into_generated_column() {
    let err = compile("insert into gen (c) select a from t").unwrap_err();
    assert!(matches!(err, PlanError::BadGeneratedColumn { .. }));
    assert_eq!(err.code(), 3105);

    let plan = compile("insert into gen (a) select a from t").unwrap();
    assert!(matches!(plan, Plan::Insert(_)));
}

#[test]
fn test_force_index_syntax_fails_but_comment_warns() -> PlanResult<()> {
    // The parser has no syntax-level index hints, so build that tree by hand.
    let stmt = Statement::Select(SelectStmt {
        fields: vec![SelectField::Wildcard(None)],
        from: Some(TableRef::Table {
            name: TableName::new("t"),
            alias: None,
            index_hints: vec![IndexHint::scan(IndexHintType::Force, &["missing_idx"])],
            partitions: Vec::new(),
        }),
        ..Default::default()
    });
    let catalog = MemCatalog::mock();
    let mut ctx = context();
    let err = PlanBuilder::new(&mut ctx, &catalog).build(&stmt).unwrap_err();
    assert!(matches!(err, PlanError::KeyDoesNotExist { .. }));
    assert_eq!(err.code(), 1176);

    let mut ctx = context();
    let plan = compile_with(&mut ctx, "select /*+ FORCE_INDEX(t, missing_idx) */ * from t")?;
    assert!(matches!(plan, Plan::Logical(_)));
    assert_eq!(ctx.warnings().len(), 1);
    assert!(matches!(ctx.warnings()[0], PlanError::KeyDoesNotExist { .. }));
    Ok(())
}

#[test]
fn test_unknown_column_is_name_resolution() {
    let err = compile("select zz from t").unwrap_err();
    assert!(matches!(err, PlanError::UnknownColumn { .. }));
    assert_eq!(err.kind(), ErrorKind::NameResolution);
    assert_eq!(err.code(), 1054);
}

#[test]
fn test_missing_table() {
    let err = compile("select * from no_such_table").unwrap_err();
    assert!(matches!(err, PlanError::TableNotExists { .. }));
    assert_eq!(err.code(), 1146);
}

#[test]
fn test_union_column_count_mismatch() {
    let err = compile("select a, b from t union select a from t2").unwrap_err();
    assert!(matches!(err, PlanError::WrongNumberOfColumnsInSelect));
}

#[test]
fn test_dml_statements_compile() -> PlanResult<()> {
    assert!(matches!(compile("update t set b = b + 1 where a = 1")?, Plan::Update(_)));
    assert!(matches!(compile("delete from t2 where a = 1")?, Plan::Delete(_)));
    assert!(matches!(compile("replace into t2 (a, b) values (1, 2)")?, Plan::Insert(_)));
    assert!(matches!(
        compile("insert into t2 (a, b) values (1, 2) on duplicate key update b = 3")?,
        Plan::Insert(_)
    ));
    Ok(())
}

#[test]
fn test_explain_wraps_the_inner_plan() -> PlanResult<()> {
    assert!(matches!(compile("explain select a from t")?, Plan::Explain(_)));
    Ok(())
}

#[test]
fn test_unknown_system_variable() {
    let err = compile("set @@no_such_var = 1").unwrap_err();
    assert!(matches!(err, PlanError::UnknownSystemVar(_)));
}

#[test]
fn test_unsupported_sql_is_reported() {
    let err = compile("select a from t except select a from t2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedConstruct);
    assert_eq!(err.code(), 1235);
}

//! SET, DO, PREPARE/EXECUTE, ANALYZE, SPLIT REGION, DDL and simple statements.

use crate::ast::{
    AnalyzeOpt, AnalyzeOptionType, AnalyzeTableStmt, ColumnDef, DdlStmt, Expr, GrantLevel,
    GrantLevelType, PrepareStmt, SimpleStmt, SplitRegionStmt, VariableAssignment,
};
use crate::catalog::{ColumnInfo, IndexInfo, SchemaState, TableInfo};
use crate::error::{PlanError, PlanResult};
use crate::logging::BUILDER_TARGET;
use crate::planner::builder::PlanBuilder;
use crate::planner::builder::select::resolve_partitions;
use crate::planner::expression::{Expression, is_disallowed_in_generated_column};
use crate::planner::plan::{
    AnalyzeColumnsTask, AnalyzeIndexTask, AnalyzeOptions, AnalyzePlan, EXTRA_HANDLE_ID,
    EXTRA_HANDLE_NAME, LogicalOperator, LogicalPlan, Plan, SplitRegionPlan, VarAssignment,
};
use crate::planner::schema::{Column, FieldName, Schema};
use crate::types::{DataType, Datum, FieldType};
use std::sync::Arc;
use tracing::debug;

const MAX_ANALYZE_BUCKETS: u64 = 1024;
const MAX_ANALYZE_SAMPLES: u64 = 100_000;
/// Largest CM sketch (width * depth) that fits one transaction entry.
const CM_SKETCH_SIZE_LIMIT: u64 = 1_258_291;

/// One physical table (or partition) an ANALYZE task covers.
struct PhysicalTarget {
    id: i64,
    partition_name: String,
}

impl PlanBuilder<'_> {
    pub(crate) fn build_set(&mut self, vars: &[VariableAssignment]) -> PlanResult<Plan> {
        let mut assignments = Vec::with_capacity(vars.len());
        for var in vars {
            if var.is_system && self.ctx.vars.system_var(&var.name).is_none() {
                return Err(PlanError::UnknownSystemVar(var.name.clone()));
            }
            let mut assign = VarAssignment {
                name: var.name.clone(),
                expr: None,
                is_default: false,
                is_global: var.is_global,
                is_system: var.is_system,
                extend_value: var.extend_value.clone().map(Expression::constant),
            };
            match &var.value {
                Expr::Default(None) => assign.is_default = true,
                // `SET sql_mode = ANSI`: a bare word is a string value.
                Expr::Column(name) if name.table.is_none() && name.schema.is_none() => {
                    assign.expr = Some(Expression::constant(Datum::String(name.name.clone())));
                }
                value => {
                    let (expr, _) = self.rewrite(value, LogicalPlan::table_dual(1), None, true)?;
                    assign.expr = Some(expr);
                }
            }
            assignments.push(assign);
        }
        Ok(Plan::Set(assignments))
    }

    /// `DO expr, ...`: a projection over a one-row dual that is evaluated even
    /// though nobody reads its output.
    pub(crate) fn build_do(&mut self, exprs: &[Expr]) -> PlanResult<Plan> {
        let mut plan = LogicalPlan::table_dual(1);
        let mut out = Vec::with_capacity(exprs.len());
        let mut columns = Vec::with_capacity(exprs.len());
        for e in exprs {
            let (expr, next) = self.rewrite(e, plan, None, true)?;
            plan = next;
            columns.push(Column::new(self.ctx.alloc_column_id(), expr.ret_type().clone()));
            out.push(expr);
        }
        let names = vec![FieldName::default(); columns.len()];
        Ok(Plan::Logical(LogicalPlan::new(
            LogicalOperator::Projection {
                exprs: out,
                calculate_no_delay: true,
            },
            vec![plan],
            Schema::new(columns),
            names,
        )))
    }

    pub(crate) fn build_prepare(&self, stmt: &PrepareStmt) -> Plan {
        let sql_text = match &stmt.sql_var {
            Some(var) => self.ctx.vars.user_var(var).unwrap_or("NULL").to_string(),
            None => stmt.sql_text.clone().unwrap_or_default(),
        };
        Plan::Prepare {
            name: stmt.name.clone(),
            sql_text,
        }
    }

    pub(crate) fn build_execute(&mut self, name: &str, using_vars: &[Expr]) -> PlanResult<Plan> {
        let empty = Schema::default();
        let using_vars = using_vars
            .iter()
            .map(|e| self.rewrite_scalar(e, &empty, &[]))
            .collect::<PlanResult<Vec<_>>>()?;
        Ok(Plan::Execute {
            name: name.to_string(),
            using_vars,
        })
    }

    // ════════════════════════════════════════════
    // ANALYZE
    // ════════════════════════════════════════════

    pub(crate) fn build_analyze(&mut self, stmt: &AnalyzeTableStmt) -> PlanResult<Plan> {
        let opts = handle_analyze_options(&stmt.options)?;
        let mut plan = AnalyzePlan {
            col_tasks: Vec::new(),
            idx_tasks: Vec::new(),
            opts,
            fast: self.ctx.vars.enable_fast_analyze,
        };
        if stmt.index_flag {
            let name = stmt
                .tables
                .first()
                .ok_or_else(|| PlanError::Analyze("ANALYZE INDEX needs a table".to_string()))?;
            let db = self.db_or_current(name.schema.as_deref())?;
            let table = self.is.table_by_name(&db, &name.name)?;
            check_analyzable(&table)?;
            let targets = physical_targets(&table, &stmt.partitions)?;
            if stmt.index_names.is_empty() {
                analyze_all_indexes(&table, &targets, &mut plan);
            } else {
                analyze_indexes(&table, &stmt.index_names, &targets, &mut plan)?;
            }
        } else {
            for name in &stmt.tables {
                let db = self.db_or_current(name.schema.as_deref())?;
                let table = self.is.table_by_name(&db, &name.name)?;
                check_analyzable(&table)?;
                let targets = physical_targets(&table, &stmt.partitions)?;
                analyze_table(&table, &targets, &mut plan);
            }
        }
        debug!(
            target: BUILDER_TARGET,
            col_tasks = plan.col_tasks.len(),
            idx_tasks = plan.idx_tasks.len(),
            "analyze"
        );
        Ok(Plan::Analyze(plan))
    }

    // ════════════════════════════════════════════
    // SPLIT REGION
    // ════════════════════════════════════════════

    pub(crate) fn build_split_region(&mut self, stmt: &SplitRegionStmt) -> PlanResult<Plan> {
        let db = self.db_or_current(stmt.table.schema.as_deref())?;
        let table = self.is.table_by_name(&db, &stmt.table.name)?;
        resolve_partitions(&table, &stmt.partitions)?;
        let (schema, names) = self.result_schema(&[
            ("TOTAL_SPLIT_REGION", DataType::LongLong),
            ("SCATTER_FINISH_RATIO", DataType::Double),
        ]);
        let mut plan = SplitRegionPlan {
            table: Arc::clone(&table),
            partition_names: stmt.partitions.clone(),
            index: None,
            lower: Vec::new(),
            upper: Vec::new(),
            num: 0,
            value_lists: Vec::new(),
            schema,
            names,
        };
        match &stmt.index_name {
            Some(index) => self.build_split_index_region(&db, stmt, index, &mut plan)?,
            None => self.build_split_table_region(&db, stmt, &mut plan)?,
        }
        Ok(Plan::SplitRegion(Box::new(plan)))
    }

    fn build_split_index_region(
        &mut self,
        db: &str,
        stmt: &SplitRegionStmt,
        index_name: &str,
        plan: &mut SplitRegionPlan,
    ) -> PlanResult<()> {
        let table = Arc::clone(&plan.table);
        let index = table
            .find_index(index_name)
            .ok_or_else(|| PlanError::key_does_not_exist(index_name, &table.name))?;
        let index_cols = index
            .columns
            .iter()
            .map(|ic| {
                table.columns.get(ic.offset).ok_or_else(|| {
                    PlanError::Internal(format!("index {} points past the column list", index.name))
                })
            })
            .collect::<PlanResult<Vec<_>>>()?;
        let (row_schema, row_names) = self.table_row_schema(db, &table);
        plan.index = Some(index.clone());

        let opt = &stmt.split_opt;
        if !opt.value_lists.is_empty() {
            for (i, list) in opt.value_lists.iter().enumerate() {
                if list.len() > index_cols.len() {
                    return Err(PlanError::WrongValueCountOnRow(i + 1));
                }
                let values = list
                    .iter()
                    .zip(&index_cols)
                    .map(|(e, col)| self.split_value(e, col, &row_schema, &row_names))
                    .collect::<PlanResult<Vec<_>>>()?;
                plan.value_lists.push(values);
            }
            return Ok(());
        }

        for (bound, which) in [(&opt.lower, "lower"), (&opt.upper, "upper")] {
            if bound.is_empty() {
                return Err(PlanError::SplitRegion(format!(
                    "Split index `{}` region {which} value count should more than 0",
                    index.name
                )));
            }
            if bound.len() > index_cols.len() {
                return Err(PlanError::SplitRegion(format!(
                    "Split index `{}` region column count doesn't match value count at {which}",
                    index.name
                )));
            }
            let values = bound
                .iter()
                .zip(&index_cols)
                .map(|(e, col)| self.split_value(e, col, &row_schema, &row_names))
                .collect::<PlanResult<Vec<_>>>()?;
            if which == "lower" {
                plan.lower = values;
            } else {
                plan.upper = values;
            }
        }
        plan.num = self.check_split_num(opt.num, "index")?;
        Ok(())
    }

    fn build_split_table_region(
        &mut self,
        db: &str,
        stmt: &SplitRegionStmt,
        plan: &mut SplitRegionPlan,
    ) -> PlanResult<()> {
        let table = Arc::clone(&plan.table);
        let handle = match table.pk_handle_column() {
            Some(col) => col.clone(),
            None => {
                let mut info = ColumnInfo::new(
                    EXTRA_HANDLE_NAME,
                    FieldType::new(DataType::LongLong).with_not_null(),
                );
                info.id = EXTRA_HANDLE_ID;
                info
            }
        };
        let (row_schema, row_names) = self.table_row_schema(db, &table);

        let opt = &stmt.split_opt;
        if !opt.value_lists.is_empty() {
            for (i, list) in opt.value_lists.iter().enumerate() {
                let [value] = list.as_slice() else {
                    return Err(PlanError::WrongValueCountOnRow(i + 1));
                };
                let value = self.split_value(value, &handle, &row_schema, &row_names)?;
                plan.value_lists.push(vec![value]);
            }
            return Ok(());
        }

        for (bound, which) in [(&opt.lower, "lower"), (&opt.upper, "upper")] {
            let [value] = bound.as_slice() else {
                return Err(PlanError::SplitRegion(format!(
                    "Split table region {which} value count should be 1"
                )));
            };
            let value = self.split_value(value, &handle, &row_schema, &row_names)?;
            if which == "lower" {
                plan.lower = vec![value];
            } else {
                plan.upper = vec![value];
            }
        }
        plan.num = self.check_split_num(opt.num, "table")?;
        Ok(())
    }

    fn check_split_num(&self, num: i64, kind: &str) -> PlanResult<i64> {
        let max = self.ctx.vars.split_region_max_num;
        if u64::try_from(num).is_ok_and(|n| n > max) {
            return Err(PlanError::SplitRegion(format!(
                "Split {kind} region num exceeded the limit {max}"
            )));
        }
        if num < 1 {
            return Err(PlanError::SplitRegion(format!(
                "Split {kind} region num should more than 0"
            )));
        }
        Ok(num)
    }

    /// A split boundary must fold to a constant of the column's type.
    fn split_value(
        &mut self,
        expr: &Expr,
        col: &ColumnInfo,
        schema: &Schema,
        names: &[FieldName],
    ) -> PlanResult<Datum> {
        let value = match expr {
            Expr::Value(d) => d.clone(),
            _ => match self.rewrite_scalar(expr, schema, names)? {
                Expression::Constant(c) => c.value,
                _ => return Err(PlanError::SplitRegion("Expect constant values".to_string())),
            },
        };
        value.convert_to(&col.field_type, &col.name)
    }

    // ════════════════════════════════════════════
    // DDL and simple statements
    // ════════════════════════════════════════════

    /// DDL passes through after name checks; the returned statement has the
    /// session defaults filled in.
    pub(crate) fn build_ddl(&mut self, stmt: &DdlStmt) -> PlanResult<Plan> {
        let mut stmt = stmt.clone();
        match &mut stmt {
            DdlStmt::AlterDatabase { name } => {
                if name.is_none() {
                    let current = self.ctx.current_db();
                    if current.is_empty() {
                        return Err(PlanError::NoDb);
                    }
                    *name = Some(current.to_string());
                }
            }
            DdlStmt::CreateView(view) => {
                let select = self.build_query(&view.select);
                self.ctx.handle_helper.pop_map();
                let select = select?;
                if view.columns.is_empty() {
                    view.columns = select.names.iter().map(|n| n.col_name.clone()).collect();
                }
                if view.columns.len() != select.schema.len() {
                    return Err(PlanError::ViewWrongList);
                }
            }
            DdlStmt::CreateTable(create) => check_generated_columns(&create.columns, &[])?,
            DdlStmt::AlterTable {
                table,
                add_columns,
                drop_columns,
            } => {
                let db = self.db_or_current(table.schema.as_deref())?;
                let info = self.is.table_by_name(&db, &table.name)?;
                let kept: Vec<ColumnInfo> = info
                    .public_columns()
                    .filter(|c| !drop_columns.iter().any(|d| d.eq_ignore_ascii_case(&c.name)))
                    .cloned()
                    .collect();
                check_generated_columns(add_columns, &kept)?;
            }
            DdlStmt::CreateDatabase { .. }
            | DdlStmt::DropDatabase { .. }
            | DdlStmt::DropTable { .. }
            | DdlStmt::TruncateTable(_)
            | DdlStmt::RenameTable { .. }
            | DdlStmt::CreateIndex { .. }
            | DdlStmt::DropIndex { .. } => {}
        }
        Ok(Plan::Ddl(stmt))
    }

    pub(crate) fn build_simple(&mut self, stmt: &SimpleStmt) -> PlanResult<Plan> {
        match stmt {
            SimpleStmt::Grant { level, .. } | SimpleStmt::Revoke { level, .. } => {
                self.check_grant_level(level)?;
            }
            SimpleStmt::Use { db } if db.is_empty() => return Err(PlanError::NoDb),
            _ => {}
        }
        Ok(Plan::Simple(stmt.clone()))
    }

    fn check_grant_level(&self, level: &GrantLevel) -> PlanResult<()> {
        let no_db = level.db.as_deref().is_none_or(str::is_empty);
        if level.level == GrantLevelType::Table && no_db && self.ctx.current_db().is_empty() {
            return Err(PlanError::NoDb);
        }
        Ok(())
    }
}

fn handle_analyze_options(opts: &[AnalyzeOpt]) -> PlanResult<AnalyzeOptions> {
    let mut out = AnalyzeOptions::default();
    for opt in opts {
        let limit = match opt.tp {
            AnalyzeOptionType::NumBuckets => MAX_ANALYZE_BUCKETS,
            AnalyzeOptionType::CmSketchWidth | AnalyzeOptionType::CmSketchDepth => CM_SKETCH_SIZE_LIMIT,
            AnalyzeOptionType::NumSamples => MAX_ANALYZE_SAMPLES,
        };
        if opt.value == 0 || opt.value > limit {
            return Err(PlanError::Analyze(format!(
                "value of analyze option {} should be positive and not larger than {limit}",
                opt.tp.as_str()
            )));
        }
        match opt.tp {
            AnalyzeOptionType::NumBuckets => out.num_buckets = opt.value,
            AnalyzeOptionType::CmSketchWidth => out.cmsketch_width = opt.value,
            AnalyzeOptionType::CmSketchDepth => out.cmsketch_depth = opt.value,
            AnalyzeOptionType::NumSamples => out.num_samples = opt.value,
        }
    }
    if out.cmsketch_width.saturating_mul(out.cmsketch_depth) > CM_SKETCH_SIZE_LIMIT {
        return Err(PlanError::Analyze(format!(
            "cm sketch size(depth * width) should not larger than {CM_SKETCH_SIZE_LIMIT}"
        )));
    }
    Ok(out)
}

fn check_analyzable(table: &TableInfo) -> PlanResult<()> {
    if table.is_view() {
        return Err(PlanError::Analyze(format!(
            "analyze {} is not supported now.",
            table.name
        )));
    }
    Ok(())
}

/// The table itself, or the named (default: every) partition.
fn physical_targets(table: &TableInfo, partitions: &[String]) -> PlanResult<Vec<PhysicalTarget>> {
    if table.partitions.is_empty() {
        if !partitions.is_empty() {
            return Err(PlanError::Partition(
                "Partition management on a not partitioned table is not possible".to_string(),
            ));
        }
        return Ok(vec![PhysicalTarget {
            id: table.id,
            partition_name: String::new(),
        }]);
    }
    if partitions.is_empty() {
        return Ok(table
            .partitions
            .iter()
            .map(|p| PhysicalTarget {
                id: p.id,
                partition_name: p.name.clone(),
            })
            .collect());
    }
    partitions
        .iter()
        .map(|name| {
            table
                .partitions
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .map(|p| PhysicalTarget {
                    id: p.id,
                    partition_name: p.name.clone(),
                })
                .ok_or_else(|| {
                    PlanError::Partition(format!(
                        "can not found the specified partition name {name} in the table definition"
                    ))
                })
        })
        .collect()
}

fn public_indexes(table: &TableInfo) -> impl Iterator<Item = &IndexInfo> {
    table
        .indices
        .iter()
        .filter(|idx| idx.state == SchemaState::Public)
}

fn index_task(table: &TableInfo, index: &IndexInfo, target: &PhysicalTarget) -> AnalyzeIndexTask {
    AnalyzeIndexTask {
        table_name: table.name.clone(),
        partition_name: target.partition_name.clone(),
        physical_id: target.id,
        index: index.clone(),
    }
}

fn column_task(
    table: &TableInfo,
    pk_info: Option<&ColumnInfo>,
    cols_info: &[ColumnInfo],
    target: &PhysicalTarget,
) -> AnalyzeColumnsTask {
    AnalyzeColumnsTask {
        table_name: table.name.clone(),
        partition_name: target.partition_name.clone(),
        physical_id: target.id,
        pk_info: pk_info.cloned(),
        cols_info: cols_info.to_vec(),
    }
}

fn analyze_table(table: &TableInfo, targets: &[PhysicalTarget], plan: &mut AnalyzePlan) {
    let pk = table.pk_handle_column();
    // Virtual generated columns have nothing stored to sample.
    let cols: Vec<ColumnInfo> = table
        .public_columns()
        .filter(|c| !(table.pk_is_handle && c.primary_key))
        .filter(|c| !c.is_generated() || c.generated_stored)
        .cloned()
        .collect();
    for index in public_indexes(table) {
        plan.idx_tasks
            .extend(targets.iter().map(|t| index_task(table, index, t)));
    }
    if !cols.is_empty() || pk.is_some() {
        plan.col_tasks
            .extend(targets.iter().map(|t| column_task(table, pk, &cols, t)));
    }
}

fn analyze_indexes(
    table: &TableInfo,
    names: &[String],
    targets: &[PhysicalTarget],
    plan: &mut AnalyzePlan,
) -> PlanResult<()> {
    for name in names {
        if name.eq_ignore_ascii_case("primary")
            && let Some(pk) = table.pk_handle_column()
        {
            plan.col_tasks
                .extend(targets.iter().map(|t| column_task(table, Some(pk), &[], t)));
            continue;
        }
        let index = public_indexes(table)
            .find(|idx| idx.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                PlanError::Analyze(format!(
                    "Analyze index '{name}' doesn't exist in table '{}'",
                    table.name
                ))
            })?;
        plan.idx_tasks
            .extend(targets.iter().map(|t| index_task(table, index, t)));
    }
    Ok(())
}

fn analyze_all_indexes(table: &TableInfo, targets: &[PhysicalTarget], plan: &mut AnalyzePlan) {
    for index in public_indexes(table) {
        plan.idx_tasks
            .extend(targets.iter().map(|t| index_task(table, index, t)));
    }
    if let Some(pk) = table.pk_handle_column() {
        plan.col_tasks
            .extend(targets.iter().map(|t| column_task(table, Some(pk), &[], t)));
    }
}

/// Generated columns of `defs` may only read known, non auto-increment
/// columns and may not call non-deterministic functions.
fn check_generated_columns(defs: &[ColumnDef], existing: &[ColumnInfo]) -> PlanResult<()> {
    for def in defs {
        let Some(expr) = def.generated_expr() else {
            continue;
        };
        let mut disallowed = false;
        expr.walk(&mut |e| {
            if let Expr::Function { name, .. } = e
                && is_disallowed_in_generated_column(name)
            {
                disallowed = true;
            }
        });
        if disallowed {
            return Err(PlanError::GeneratedColumnFunctionIsNotAllowed(def.name.clone()));
        }
        for col in expr.column_names() {
            let auto_increment = if let Some(d) = defs.iter().find(|d| d.name.eq_ignore_ascii_case(&col.name)) {
                d.is_auto_increment()
            } else if let Some(c) = existing.iter().find(|c| c.name.eq_ignore_ascii_case(&col.name)) {
                c.auto_increment
            } else {
                return Err(PlanError::UnknownGeneratedField(col.name.clone()));
            };
            if auto_increment {
                return Err(PlanError::GeneratedColumnRefAutoInc(def.name.clone()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        ColumnOption, CreateTableStmt, CreateViewStmt, Query, SelectField, SelectStmt,
        SplitOption, Statement, TableName, TableRef,
    };
    use crate::catalog::MemCatalog;
    use crate::config::SessionVars;
    use crate::planner::context::CompileContext;

    fn build_with(vars: SessionVars, stmt: Statement) -> PlanResult<Plan> {
        let catalog = MemCatalog::mock();
        let mut ctx = CompileContext::new(vars);
        PlanBuilder::new(&mut ctx, &catalog).build(&stmt)
    }

    fn build(stmt: Statement) -> PlanResult<Plan> {
        build_with(SessionVars::new().with_current_db("test"), stmt)
    }

    fn set_var(name: &str, value: Expr, is_system: bool) -> VariableAssignment {
        VariableAssignment {
            name: name.into(),
            value,
            is_global: false,
            is_system,
            extend_value: None,
        }
    }

    fn analyze(table: &str) -> AnalyzeTableStmt {
        AnalyzeTableStmt {
            tables: vec![TableName::new(table)],
            ..Default::default()
        }
    }

    fn split(table: &str, index: Option<&str>, opt: SplitOption) -> Statement {
        Statement::SplitRegion(SplitRegionStmt {
            table: TableName::new(table),
            index_name: index.map(str::to_string),
            partitions: Vec::new(),
            split_opt: opt,
        })
    }

    #[test]
    fn test_set_statement() {
        let stmt = Statement::Set(vec![
            set_var("sql_mode", Expr::col("ANSI"), true),
            set_var("autocommit", Expr::Default(None), true),
            set_var("x", Expr::binary(crate::ast::BinaryOp::Plus, Expr::int(1), Expr::int(2)), false),
        ]);
        let Plan::Set(vars) = build(stmt).unwrap() else {
            panic!("expected a set plan");
        };
        assert_eq!(vars[0].expr, Some(Expression::constant(Datum::String("ANSI".into()))));
        assert!(vars[1].is_default && vars[1].expr.is_none());
        assert!(matches!(vars[2].expr, Some(Expression::ScalarFunction(_))));

        let err = build(Statement::Set(vec![set_var("no_such_var", Expr::int(1), true)])).unwrap_err();
        assert_eq!(err.to_string(), "Unknown system variable 'no_such_var'");
    }

    #[test]
    fn test_do_statement() {
        let plan = build(Statement::Do(vec![Expr::int(1), Expr::string("x")])).unwrap();
        let logical = plan.as_logical().unwrap();
        assert!(matches!(
            logical.op,
            LogicalOperator::Projection { calculate_no_delay: true, .. }
        ));
        assert_eq!(logical.schema.len(), 2);
        assert_eq!(logical.children[0].name(), "TableDual");
    }

    #[test]
    fn test_prepare_from_user_var() {
        let mut vars = SessionVars::new();
        vars.user_vars.insert("stmt".into(), "select 1".into());
        let prepare = |sql_var: Option<&str>| {
            Statement::Prepare(PrepareStmt {
                name: "p".into(),
                sql_text: Some("select 2".into()),
                sql_var: sql_var.map(str::to_string),
            })
        };
        let Plan::Prepare { sql_text, .. } = build_with(vars.clone(), prepare(Some("STMT"))).unwrap() else {
            panic!("expected prepare");
        };
        assert_eq!(sql_text, "select 1");
        let Plan::Prepare { sql_text, .. } = build_with(vars.clone(), prepare(Some("missing"))).unwrap() else {
            panic!("expected prepare");
        };
        assert_eq!(sql_text, "NULL");
        let Plan::Prepare { sql_text, .. } = build_with(vars, prepare(None)).unwrap() else {
            panic!("expected prepare");
        };
        assert_eq!(sql_text, "select 2");
    }

    #[test]
    fn test_execute_rewrites_using_vars() {
        let stmt = Statement::Execute {
            name: "p".into(),
            using_vars: vec![Expr::int(7)],
        };
        let Plan::Execute { using_vars, .. } = build(stmt).unwrap() else {
            panic!("expected execute");
        };
        assert_eq!(using_vars, vec![Expression::constant(Datum::Int(7))]);
    }

    #[test]
    fn test_analyze_table_tasks() {
        let Plan::Analyze(plan) = build(Statement::Analyze(analyze("t"))).unwrap() else {
            panic!("expected analyze");
        };
        // Five indexes on one physical table, plus one column task with the handle.
        assert_eq!(plan.idx_tasks.len(), 5);
        assert_eq!(plan.col_tasks.len(), 1);
        assert_eq!(plan.col_tasks[0].pk_info.as_ref().unwrap().name, "a");
        assert_eq!(plan.col_tasks[0].cols_info.len(), 7);
        assert_eq!(plan.opts, AnalyzeOptions::default());

        let Plan::Analyze(plan) = build(Statement::Analyze(analyze("gen"))).unwrap() else {
            panic!("expected analyze");
        };
        let names: Vec<&str> = plan.col_tasks[0].cols_info.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "d", "e"]);
    }

    #[test]
    fn test_analyze_partitions() {
        let Plan::Analyze(plan) = build(Statement::Analyze(analyze("pt"))).unwrap() else {
            panic!("expected analyze");
        };
        let ids: Vec<i64> = plan.col_tasks.iter().map(|t| t.physical_id).collect();
        assert_eq!(ids, vec![51, 52]);
        assert_eq!(plan.idx_tasks.len(), 2);

        let mut stmt = analyze("pt");
        stmt.partitions = vec!["p9".into()];
        let err = build(Statement::Analyze(stmt)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "can not found the specified partition name p9 in the table definition"
        );

        let mut stmt = analyze("t2");
        stmt.partitions = vec!["p0".into()];
        assert!(matches!(build(Statement::Analyze(stmt)), Err(PlanError::Partition(_))));
    }

    #[test]
    fn test_analyze_index() {
        let mut stmt = analyze("t");
        stmt.index_flag = true;
        stmt.index_names = vec!["PRIMARY".into(), "e".into()];
        let Plan::Analyze(plan) = build(Statement::Analyze(stmt.clone())).unwrap() else {
            panic!("expected analyze");
        };
        assert_eq!(plan.col_tasks.len(), 1);
        assert!(plan.col_tasks[0].cols_info.is_empty());
        assert_eq!(plan.idx_tasks[0].index.name, "e");

        stmt.index_names = vec!["nope".into()];
        let err = build(Statement::Analyze(stmt.clone())).unwrap_err();
        assert_eq!(err.to_string(), "Analyze index 'nope' doesn't exist in table 't'");

        stmt.index_names.clear();
        let Plan::Analyze(plan) = build(Statement::Analyze(stmt)).unwrap() else {
            panic!("expected analyze");
        };
        assert_eq!(plan.idx_tasks.len(), 5);
        assert_eq!(plan.col_tasks.len(), 1);
    }

    #[test]
    fn test_analyze_options_and_views() {
        let mut stmt = analyze("t");
        stmt.options = vec![AnalyzeOpt {
            tp: AnalyzeOptionType::NumBuckets,
            value: 2048,
        }];
        let err = build(Statement::Analyze(stmt.clone())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value of analyze option BUCKETS should be positive and not larger than 1024"
        );

        stmt.options = vec![
            AnalyzeOpt {
                tp: AnalyzeOptionType::CmSketchWidth,
                value: 1_000_000,
            },
            AnalyzeOpt {
                tp: AnalyzeOptionType::CmSketchDepth,
                value: 10,
            },
        ];
        let err = build(Statement::Analyze(stmt)).unwrap_err();
        assert!(err.to_string().starts_with("cm sketch size(depth * width)"));

        let err = build(Statement::Analyze(analyze("v"))).unwrap_err();
        assert_eq!(err.to_string(), "analyze v is not supported now.");
    }

    #[test]
    fn test_split_table_region() {
        let opt = SplitOption {
            lower: vec![Expr::int(0)],
            upper: vec![Expr::string("100")],
            num: 10,
            value_lists: Vec::new(),
        };
        let Plan::SplitRegion(plan) = build(split("t", None, opt.clone())).unwrap() else {
            panic!("expected split region");
        };
        assert_eq!(plan.upper, vec![Datum::Int(100)]);
        assert_eq!(plan.names[0].col_name, "TOTAL_SPLIT_REGION");

        let too_many = SplitOption { num: 5000, ..opt.clone() };
        let err = build(split("t", None, too_many)).unwrap_err();
        assert_eq!(err.to_string(), "Split table region num exceeded the limit 1000");

        let no_upper = SplitOption { upper: Vec::new(), ..opt };
        let err = build(split("t", None, no_upper)).unwrap_err();
        assert_eq!(err.to_string(), "Split table region upper value count should be 1");

        let lists = SplitOption {
            value_lists: vec![vec![Expr::int(1)], vec![Expr::int(2), Expr::int(3)]],
            ..Default::default()
        };
        assert!(matches!(
            build(split("t2", None, lists)),
            Err(PlanError::WrongValueCountOnRow(2))
        ));
    }

    #[test]
    fn test_split_index_region() {
        let opt = SplitOption {
            lower: vec![Expr::int(1)],
            upper: vec![Expr::int(9), Expr::int(9), Expr::int(9), Expr::int(9)],
            num: 4,
            value_lists: Vec::new(),
        };
        let err = build(split("t", Some("c_d_e"), opt.clone())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Split index `c_d_e` region column count doesn't match value count at upper"
        );

        let ok = SplitOption {
            upper: vec![Expr::int(9)],
            ..opt.clone()
        };
        let Plan::SplitRegion(plan) = build(split("t", Some("c_d_e"), ok)).unwrap() else {
            panic!("expected split region");
        };
        assert_eq!(plan.index.as_ref().unwrap().name, "c_d_e");
        assert_eq!(plan.num, 4);

        let err = build(split("t", Some("nope"), opt)).unwrap_err();
        assert!(matches!(err, PlanError::KeyDoesNotExist { .. }));

        let column_ref = SplitOption {
            value_lists: vec![vec![Expr::col("c")]],
            ..Default::default()
        };
        let err = build(split("t", Some("c_d_e"), column_ref)).unwrap_err();
        assert_eq!(err.to_string(), "Expect constant values");
    }

    #[test]
    fn test_create_view_fills_columns() {
        let select = Query::Select(Box::new(SelectStmt {
            fields: vec![
                SelectField::Expr {
                    expr: Expr::col("a"),
                    alias: Some("x".into()),
                },
                SelectField::Expr {
                    expr: Expr::col("b"),
                    alias: None,
                },
            ],
            from: Some(TableRef::table("t")),
            ..Default::default()
        }));
        let view = |columns: Vec<String>| {
            Statement::Ddl(DdlStmt::CreateView(CreateViewStmt {
                view: TableName::new("v2"),
                or_replace: false,
                columns,
                select: Box::new(select.clone()),
            }))
        };
        let Plan::Ddl(DdlStmt::CreateView(created)) = build(view(Vec::new())).unwrap() else {
            panic!("expected create view");
        };
        assert_eq!(created.columns, vec!["x", "b"]);

        let err = build(view(vec!["only".into()])).unwrap_err();
        assert!(matches!(err, PlanError::ViewWrongList));
    }

    #[test]
    fn test_generated_column_ddl_checks() {
        let def = |name: &str, options: Vec<ColumnOption>| ColumnDef {
            name: name.into(),
            field_type: FieldType::new(DataType::Long),
            options,
        };
        let generated = |expr: Expr| ColumnOption::Generated { expr, stored: false };
        let create = |columns: Vec<ColumnDef>| {
            Statement::Ddl(DdlStmt::CreateTable(CreateTableStmt {
                table: TableName::new("n"),
                if_not_exists: false,
                columns,
                constraints: Vec::new(),
            }))
        };

        let now = Expr::Function {
            name: "NOW".into(),
            args: Vec::new(),
        };
        let err = build(create(vec![def("a", vec![]), def("g", vec![generated(now)])])).unwrap_err();
        assert!(matches!(err, PlanError::GeneratedColumnFunctionIsNotAllowed(c) if c == "g"));

        let err = build(create(vec![def("g", vec![generated(Expr::col("zz"))])])).unwrap_err();
        assert_eq!(err.to_string(), "Unknown column 'zz' in 'generated column function'");

        let err = build(create(vec![
            def("id", vec![ColumnOption::AutoIncrement]),
            def("g", vec![generated(Expr::col("id"))]),
        ]))
        .unwrap_err();
        assert!(matches!(err, PlanError::GeneratedColumnRefAutoInc(c) if c == "g"));

        let alter = Statement::Ddl(DdlStmt::AlterTable {
            table: TableName::new("gen"),
            add_columns: vec![def("g2", vec![generated(Expr::col("id"))])],
            drop_columns: Vec::new(),
        });
        assert!(matches!(build(alter), Err(PlanError::GeneratedColumnRefAutoInc(_))));

        let alter = Statement::Ddl(DdlStmt::AlterTable {
            table: TableName::new("gen"),
            add_columns: vec![def("g2", vec![generated(Expr::col("a"))])],
            drop_columns: vec!["a".into()],
        });
        assert!(matches!(build(alter), Err(PlanError::UnknownGeneratedField(_))));
    }

    #[test]
    fn test_alter_database_uses_current_db() {
        let stmt = Statement::Ddl(DdlStmt::AlterDatabase { name: None });
        let Plan::Ddl(DdlStmt::AlterDatabase { name }) = build(stmt.clone()).unwrap() else {
            panic!("expected alter database");
        };
        assert_eq!(name.as_deref(), Some("test"));
        assert!(matches!(build_with(SessionVars::new(), stmt), Err(PlanError::NoDb)));
    }

    #[test]
    fn test_simple_statements_need_database() {
        let grant = Statement::Simple(SimpleStmt::Grant {
            privileges: vec!["SELECT".into()],
            level: GrantLevel {
                level: GrantLevelType::Table,
                db: None,
                table: Some("t".into()),
            },
            users: vec!["u".into()],
        });
        assert!(build(grant.clone()).is_ok());
        assert!(matches!(build_with(SessionVars::new(), grant), Err(PlanError::NoDb)));

        let use_empty = Statement::Simple(SimpleStmt::Use { db: String::new() });
        assert!(matches!(build(use_empty), Err(PlanError::NoDb)));

        let plan = build(Statement::Simple(SimpleStmt::Begin)).unwrap();
        assert_eq!(plan.name(), "Simple");
    }
}

//! SELECT, UNION and FROM-clause compilation.

use crate::ast::{
    BinaryOp, ColumnName, Expr, IndexHint, JoinConstraint, JoinKind, Limit, OrderByItem, Query,
    SelectField, SelectLock, SelectStmt, TableName, TableRef, UnionStmt,
};
use crate::catalog::{ColumnInfo, TableInfo, ViewInfo};
use crate::config::StoreType;
use crate::error::{PlanError, PlanResult};
use crate::logging::BUILDER_TARGET;
use crate::planner::builder::PlanBuilder;
use crate::planner::clause::Clause;
use crate::planner::expression::{AggFuncDesc, Expression, new_function, split_cnf};
use crate::planner::handle_cols::HandleMap;
use crate::planner::hints::{
    HintTableInfo, TableHintInfo, filter_path_by_isolation_read, get_possible_access_paths,
};
use crate::planner::plan::{
    ByItem, DataSource, EXTRA_HANDLE_ID, EXTRA_HANDLE_NAME, JoinInfo, JoinType, LogicalOperator,
    LogicalPlan,
};
use crate::planner::rewrite::AggMapper;
use crate::planner::schema::{Column, FieldName, Schema, find_field_name};
use crate::types::{DataType, Datum, FieldType};
use std::sync::Arc;
use tracing::{trace, warn};

/// One select-list entry after `*` expansion.
#[derive(Debug, Clone)]
pub(crate) enum ProjField {
    Ast { expr: Expr, alias: Option<String> },
    /// A column taken from the input by `*`.
    Input { col: Column, name: FieldName },
}

impl PlanBuilder<'_> {
    pub(crate) fn build_query(&mut self, query: &Query) -> PlanResult<LogicalPlan> {
        match query {
            Query::Select(sel) => self.build_select(sel),
            Query::Union(u) => self.build_union(u),
        }
    }

    /// Compile one select block. Leaves the block's handle map on the stack.
    pub(crate) fn build_select(&mut self, sel: &SelectStmt) -> PlanResult<LogicalPlan> {
        let hints = TableHintInfo::from_hints(&sel.hints, self.ctx.current_db());
        self.ctx.table_hints.push(hints);
        let result = self.build_select_block(sel);
        if let Some(hints) = self.ctx.table_hints.pop() {
            for warning in hints.unmatched_warnings() {
                warn!(target: BUILDER_TARGET, "{warning}");
                self.ctx.append_warning(warning);
            }
        }
        result
    }

    fn build_select_block(&mut self, sel: &SelectStmt) -> PlanResult<LogicalPlan> {
        let mut plan = match &sel.from {
            Some(from) => self.build_result_set_node(from)?,
            None => {
                self.ctx.handle_helper.push_map(HandleMap::new());
                LogicalPlan::table_dual(1)
            }
        };
        let fields = unfold_wildcards(&sel.fields, &plan, sel.from.is_some())?;

        if let Some(cond) = &sel.where_clause {
            plan = self.build_selection(plan, cond, None, Clause::Where)?;
        }
        if sel.lock != SelectLock::None {
            let handle_cols = self.ctx.handle_helper.tail_map();
            plan = LogicalPlan::unary(
                LogicalOperator::Lock {
                    lock: sel.lock,
                    handle_cols,
                },
                plan,
            );
        }

        let has_agg = sel.has_aggregation();
        let having = sel.having.as_ref().map(|h| substitute_aliases(h, &fields));
        let order_by: Vec<OrderByItem> = sel
            .order_by
            .iter()
            .map(|item| OrderByItem {
                expr: substitute_aliases(&item.expr, &fields),
                desc: item.desc,
            })
            .collect();

        let mut agg_mapper = AggMapper::new();
        if has_agg {
            let aggs = collect_aggregates(&fields, having.as_ref(), &order_by)?;
            let group_by = self.resolve_group_by(&sel.group_by, &fields, &plan)?;
            let (agg_plan, mapper) = self.build_aggregation(plan, &aggs, group_by)?;
            plan = agg_plan;
            agg_mapper = mapper;
        }
        let mapper = has_agg.then_some(&agg_mapper);

        if let Some(having) = &having {
            plan = self.build_selection(plan, having, mapper, Clause::Having)?;
        }

        self.ctx.clauses.push(Clause::FieldList);
        let projected = self.build_projection_exprs(plan, &fields, mapper);
        self.ctx.clauses.pop();
        let (mut exprs, mut names, mut plan) = projected?;
        let visible = exprs.len();

        let mut order_targets = Vec::new();
        if !order_by.is_empty() {
            self.ctx.clauses.push(Clause::OrderBy);
            let resolved = self.resolve_order_by(&order_by, visible, &mut exprs, &mut names, plan, mapper);
            self.ctx.clauses.pop();
            let (targets, rest) = resolved?;
            order_targets = targets;
            plan = rest;
        }

        plan = self.build_projection_node(plan, exprs, names);
        if sel.distinct {
            plan = self.build_distinct(plan);
        }
        if !order_targets.is_empty() {
            let by_items = order_targets
                .iter()
                .map(|&(idx, desc)| ByItem {
                    expr: Expression::Column(plan.schema.columns[idx].clone()),
                    desc,
                })
                .collect();
            plan = LogicalPlan::unary(LogicalOperator::Sort { by_items }, plan);
        }
        if let Some(limit) = sel.limit {
            plan = build_limit(plan, limit);
        }
        if plan.schema.len() > visible {
            plan = self.trim_auxiliary(plan, visible);
        }
        Ok(plan)
    }

    /// WHERE / HAVING: one condition per top-level conjunct.
    pub(crate) fn build_selection(
        &mut self,
        plan: LogicalPlan,
        cond: &Expr,
        mapper: Option<&AggMapper>,
        clause: Clause,
    ) -> PlanResult<LogicalPlan> {
        self.ctx.clauses.push(clause);
        let result = self.build_selection_conditions(plan, cond, mapper);
        self.ctx.clauses.pop();
        let (conditions, plan) = result?;
        if conditions.is_empty() {
            return Ok(plan);
        }
        Ok(LogicalPlan::unary(LogicalOperator::Selection { conditions }, plan))
    }

    fn build_selection_conditions(
        &mut self,
        mut plan: LogicalPlan,
        cond: &Expr,
        mapper: Option<&AggMapper>,
    ) -> PlanResult<(Vec<Expression>, LogicalPlan)> {
        let mut conjuncts = Vec::new();
        split_conjuncts(cond, &mut conjuncts);
        let mut conditions = Vec::with_capacity(conjuncts.len());
        for conjunct in conjuncts {
            let (expr, next) = self.rewrite(conjunct, plan, mapper, true)?;
            plan = next;
            conditions.extend(split_cnf(expr));
        }
        Ok((conditions, plan))
    }

    fn build_projection_exprs(
        &mut self,
        mut plan: LogicalPlan,
        fields: &[ProjField],
        mapper: Option<&AggMapper>,
    ) -> PlanResult<(Vec<Expression>, Vec<FieldName>, LogicalPlan)> {
        let mut exprs = Vec::with_capacity(fields.len());
        let mut names = Vec::with_capacity(fields.len());
        for field in fields {
            match field {
                ProjField::Input { col, name } => {
                    let idx = plan.schema.column_index(col.unique_id).ok_or_else(|| {
                        PlanError::unknown_column(name.to_string(), Clause::FieldList.message())
                    })?;
                    exprs.push(Expression::Column(plan.schema.columns[idx].clone()));
                    names.push(plan.names[idx].clone());
                }
                ProjField::Ast { expr, alias } => {
                    let (out, next) = self.rewrite(expr, plan, mapper, true)?;
                    plan = next;
                    names.push(projection_name(expr, alias.as_deref(), &out, &plan));
                    exprs.push(out);
                }
            }
        }
        Ok((exprs, names, plan))
    }

    /// Wrap `plan` in a projection with fresh output columns.
    pub(crate) fn build_projection_node(
        &mut self,
        plan: LogicalPlan,
        exprs: Vec<Expression>,
        names: Vec<FieldName>,
    ) -> LogicalPlan {
        let columns = exprs
            .iter()
            .map(|e| Column::new(self.ctx.alloc_column_id(), e.ret_type().clone()))
            .collect();
        let schema = Schema::new(columns);
        let passthrough: Vec<Option<Column>> = exprs.iter().map(|e| e.as_column().cloned()).collect();
        self.ctx.handle_helper.project_tail(&passthrough, &schema);
        LogicalPlan::new(
            LogicalOperator::Projection {
                exprs,
                calculate_no_delay: false,
            },
            vec![plan],
            schema,
            names,
        )
    }

    /// Output positions (and direction) of every ORDER BY item. Items that
    /// are not in the select list are appended to `exprs` as hidden columns.
    fn resolve_order_by(
        &mut self,
        items: &[OrderByItem],
        visible: usize,
        exprs: &mut Vec<Expression>,
        names: &mut Vec<FieldName>,
        mut plan: LogicalPlan,
        mapper: Option<&AggMapper>,
    ) -> PlanResult<(Vec<(usize, bool)>, LogicalPlan)> {
        let clause = Clause::OrderBy.message();
        let mut targets = Vec::with_capacity(items.len());
        for item in items {
            if let Some(pos) = position_of(&item.expr) {
                if pos == 0 || pos > visible {
                    return Err(PlanError::unknown_column(pos.to_string(), clause));
                }
                targets.push((pos - 1, item.desc));
                continue;
            }
            if let Expr::Column(name) = &item.expr {
                if let Some(idx) = find_field_name(&names[..visible], name, clause)? {
                    targets.push((idx, item.desc));
                    continue;
                }
            }
            let (expr, next) = self.rewrite(&item.expr, plan, mapper, true)?;
            plan = next;
            let idx = match exprs.iter().position(|e| *e == expr) {
                Some(idx) => idx,
                None => {
                    exprs.push(expr);
                    names.push(FieldName {
                        hidden: true,
                        ..FieldName::new(item.expr.to_string())
                    });
                    exprs.len() - 1
                }
            };
            targets.push((idx, item.desc));
        }
        Ok((targets, plan))
    }

    /// Drop hidden ORDER BY helper columns, keeping column identity.
    fn trim_auxiliary(&mut self, plan: LogicalPlan, visible: usize) -> LogicalPlan {
        let columns: Vec<Column> = plan.schema.columns[..visible].to_vec();
        let names = plan.names[..visible].to_vec();
        let exprs = columns.iter().cloned().map(Expression::Column).collect();
        let schema = Schema::new(columns.clone());
        let passthrough: Vec<Option<Column>> = columns.into_iter().map(Some).collect();
        self.ctx.handle_helper.project_tail(&passthrough, &schema);
        LogicalPlan::new(
            LogicalOperator::Projection {
                exprs,
                calculate_no_delay: false,
            },
            vec![plan],
            schema,
            names,
        )
    }

    fn resolve_group_by(
        &mut self,
        items: &[Expr],
        fields: &[ProjField],
        plan: &LogicalPlan,
    ) -> PlanResult<Vec<Expression>> {
        self.ctx.clauses.push(Clause::GroupBy);
        let result = self.resolve_group_by_items(items, fields, plan);
        self.ctx.clauses.pop();
        result
    }

    fn resolve_group_by_items(
        &mut self,
        items: &[Expr],
        fields: &[ProjField],
        plan: &LogicalPlan,
    ) -> PlanResult<Vec<Expression>> {
        let clause = Clause::GroupBy.message();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let target: &Expr = if let Some(pos) = position_of(item) {
                match fields.get(pos.wrapping_sub(1)) {
                    Some(ProjField::Ast { expr, .. }) => expr,
                    Some(ProjField::Input { col, .. }) => {
                        out.push(Expression::Column(col.clone()));
                        continue;
                    }
                    None => return Err(PlanError::unknown_column(pos.to_string(), clause)),
                }
            } else if let Expr::Column(name) = item {
                let in_from = name.table.is_some() || find_field_name(&plan.names, name, clause)?.is_some();
                match alias_target(name, fields) {
                    Some(expr) if !in_from => expr,
                    _ => item,
                }
            } else {
                item
            };
            if target.has_aggregate() {
                return Err(PlanError::InvalidGroupFuncUse);
            }
            out.push(self.rewrite_scalar(target, &plan.schema, &plan.names)?);
        }
        Ok(out)
    }

    /// Aggregate every call in `aggs`, passing input columns through as
    /// first-row values that keep their column ids.
    fn build_aggregation(
        &mut self,
        plan: LogicalPlan,
        aggs: &[Expr],
        group_by: Vec<Expression>,
    ) -> PlanResult<(LogicalPlan, AggMapper)> {
        let mut agg_funcs = Vec::with_capacity(aggs.len() + plan.schema.len());
        let mut columns = Vec::with_capacity(agg_funcs.capacity());
        let mut names = Vec::with_capacity(agg_funcs.capacity());
        let mut mapper = AggMapper::with_capacity(aggs.len());

        for agg in aggs {
            let Expr::Aggregate {
                func,
                args,
                distinct,
            } = agg
            else {
                continue;
            };
            let mut resolved = Vec::with_capacity(args.len().max(1));
            if args.is_empty() {
                resolved.push(Expression::constant(Datum::Int(1)));
            }
            for arg in args {
                resolved.push(self.rewrite_scalar(arg, &plan.schema, &plan.names)?);
            }
            let desc = AggFuncDesc::new(*func, resolved, *distinct);
            let col = Column::new(self.ctx.alloc_column_id(), desc.ret_type.clone());
            mapper.push((agg.clone(), col.clone()));
            agg_funcs.push(desc);
            columns.push(col);
            names.push(FieldName::default());
        }
        for (col, name) in plan.schema.columns.iter().zip(&plan.names) {
            agg_funcs.push(AggFuncDesc::first_row(col.clone()));
            columns.push(col.clone());
            names.push(name.clone());
        }

        self.ctx.handle_helper.pop_map();
        self.ctx.handle_helper.push_map(HandleMap::new());
        let agg = LogicalPlan::new(
            LogicalOperator::Aggregation {
                agg_funcs,
                group_by,
            },
            vec![plan],
            Schema::new(columns),
            names,
        );
        Ok((agg, mapper))
    }

    /// DISTINCT as a grouping on every output column.
    pub(crate) fn build_distinct(&mut self, plan: LogicalPlan) -> LogicalPlan {
        let agg_funcs = plan
            .schema
            .columns
            .iter()
            .cloned()
            .map(AggFuncDesc::first_row)
            .collect();
        let group_by = plan
            .schema
            .columns
            .iter()
            .cloned()
            .map(Expression::Column)
            .collect();
        self.ctx.handle_helper.pop_map();
        self.ctx.handle_helper.push_map(HandleMap::new());
        LogicalPlan::unary(
            LogicalOperator::Aggregation {
                agg_funcs,
                group_by,
            },
            plan,
        )
    }

    // ──────────────────────────────────────────
    // FROM clause
    // ──────────────────────────────────────────

    pub(crate) fn build_result_set_node(&mut self, node: &TableRef) -> PlanResult<LogicalPlan> {
        match node {
            TableRef::Table {
                name,
                alias,
                index_hints,
                partitions,
            } => self.build_data_source(name, alias.as_deref(), index_hints, partitions),
            TableRef::Derived { query, alias } => {
                let mut plan = self.build_query(query)?;
                for name in &mut plan.names {
                    name.tbl_name = alias.clone();
                    name.db_name.clear();
                }
                Ok(plan)
            }
            TableRef::Join {
                left,
                right,
                kind,
                constraint,
            } => self.build_join(left, right, *kind, constraint),
        }
    }

    fn build_join(
        &mut self,
        left: &TableRef,
        right: &TableRef,
        kind: JoinKind,
        constraint: &JoinConstraint,
    ) -> PlanResult<LogicalPlan> {
        let left_plan = self.build_result_set_node(left)?;
        let right_plan = self.build_result_set_node(right)?;
        check_unique_tables(&left_plan.names, &right_plan.names)?;

        let right_map = self.ctx.handle_helper.pop_map();
        let left_map = self.ctx.handle_helper.pop_map();
        self.ctx.handle_helper.merge_and_push(&left_map, &right_map);

        let join_type = match kind {
            JoinKind::Inner | JoinKind::Cross => JoinType::Inner,
            JoinKind::LeftOuter => JoinType::LeftOuter,
            JoinKind::RightOuter => JoinType::RightOuter,
        };
        let mut join = JoinInfo::new(join_type);
        let current_db = self.ctx.current_db().to_string();
        let lhs = extract_table_alias(&left_plan, &current_db);
        let rhs = extract_table_alias(&right_plan, &current_db);
        if let Some(hints) = self.ctx.table_hints.last_mut() {
            let both = [lhs.clone(), rhs.clone()];
            join.prefer.merge = hints.prefer_merge_join(&both);
            join.prefer.hash = hints.prefer_hash_join(&both);
            join.prefer.inl_left = hints.prefer_inl_join(&[lhs]);
            join.prefer.inl_right = hints.prefer_inl_join(&[rhs]);
        }

        let schema = Schema::merge(&left_plan.schema, &right_plan.schema);
        let mut names = left_plan.names.clone();
        names.extend(right_plan.names.iter().cloned());

        match constraint {
            JoinConstraint::None => {}
            JoinConstraint::On(expr) => {
                self.ctx.clauses.push(Clause::On);
                let cond = self.rewrite_scalar(expr, &schema, &names);
                self.ctx.clauses.pop();
                join.attach_conditions(split_cnf(cond?), &left_plan.schema, &right_plan.schema);
            }
            JoinConstraint::Using(cols) => {
                let mut conds = Vec::with_capacity(cols.len());
                let left_len = left_plan.names.len();
                for col in cols {
                    let name = ColumnName::new(col.clone());
                    let l = find_field_name(&left_plan.names, &name, "from clause")?
                        .ok_or_else(|| PlanError::unknown_column(col.clone(), "from clause"))?;
                    let r = find_field_name(&right_plan.names, &name, "from clause")?
                        .ok_or_else(|| PlanError::unknown_column(col.clone(), "from clause"))?;
                    conds.push(new_function(
                        "eq",
                        vec![
                            Expression::Column(left_plan.schema.columns[l].clone()),
                            Expression::Column(right_plan.schema.columns[r].clone()),
                        ],
                    )?);
                    // The padded side's copy is only reachable when qualified.
                    if join_type == JoinType::RightOuter {
                        names[l].redundant = true;
                    } else {
                        names[left_len + r].redundant = true;
                    }
                }
                join.attach_conditions(conds, &left_plan.schema, &right_plan.schema);
            }
        }

        Ok(LogicalPlan::new(
            LogicalOperator::Join(join),
            vec![left_plan, right_plan],
            schema,
            names,
        ))
    }

    fn build_data_source(
        &mut self,
        name: &TableName,
        alias: Option<&str>,
        index_hints: &[IndexHint],
        partitions: &[String],
    ) -> PlanResult<LogicalPlan> {
        let db = self.db_or_current(name.schema.as_deref())?;
        let table = self.is.table_by_name(&db, &name.name)?;
        if let Some(view) = &table.view {
            return self.build_data_source_from_view(&db, &table, view, alias);
        }
        let alias_name = alias.unwrap_or(&table.name).to_string();
        let partition_ids = resolve_partitions(&table, partitions)?;

        let paths = get_possible_access_paths(self.ctx, index_hints, &table, &db, &alias_name)?;
        let access_paths = filter_path_by_isolation_read(self.ctx, paths, &db)?;

        let hint_table = [Some(HintTableInfo::new(db.clone(), alias_name.clone()))];
        let mut preferred_store = None;
        if let Some(hints) = self.ctx.table_hints.last_mut() {
            if hints.prefer_tiflash(&hint_table) {
                preferred_store = Some(StoreType::TiFlash);
            } else if hints.prefer_tikv(&hint_table) {
                preferred_store = Some(StoreType::TiKV);
            }
        }
        if preferred_store == Some(StoreType::TiFlash)
            && !access_paths.iter().any(|p| p.store_type == StoreType::TiFlash)
        {
            let msg = format!(
                "No available path for table {db}.{} with the store type tiflash of the hint /*+ read_from_storage */, please check the status of the table replica and variable value of tidb_isolation_read_engines({})",
                table.name,
                self.ctx.vars.isolation_read_engines_str()
            );
            self.ctx.append_warning(PlanError::OptimizerHint(msg));
            preferred_store = None;
        }

        let mut columns = Vec::with_capacity(table.columns.len() + 1);
        let mut schema_cols = Vec::with_capacity(table.columns.len() + 1);
        let mut names = Vec::with_capacity(table.columns.len() + 1);
        let mut handle_col = None;
        for info in table.public_columns() {
            let col = Column::new(self.ctx.alloc_column_id(), info.field_type.clone()).with_origin(info.id);
            if table.pk_is_handle && info.primary_key {
                handle_col = Some(col.clone());
            }
            names.push(FieldName::table_column(&db, &alias_name, &table.name, &info.name));
            schema_cols.push(col);
            columns.push(info.clone());
        }
        if handle_col.is_none() {
            let mut info = ColumnInfo::new(EXTRA_HANDLE_NAME, FieldType::new(DataType::LongLong).with_not_null());
            info.id = EXTRA_HANDLE_ID;
            info.offset = columns.len();
            let col = Column::new(self.ctx.alloc_column_id(), info.field_type.clone()).with_origin(EXTRA_HANDLE_ID);
            names.push(FieldName {
                hidden: true,
                ..FieldName::table_column(&db, &alias_name, &table.name, EXTRA_HANDLE_NAME)
            });
            schema_cols.push(col.clone());
            columns.push(info);
            handle_col = Some(col);
        }

        let mut map = HandleMap::new();
        if let Some(col) = &handle_col {
            map.insert(table.id, vec![col.clone()]);
        }
        self.ctx.handle_helper.push_map(map);
        trace!(target: BUILDER_TARGET, table = %table.name, paths = access_paths.len(), "data source");

        let ds = DataSource {
            table: Arc::clone(&table),
            db_name: db,
            table_as_name: alias.map(str::to_string),
            columns,
            access_paths,
            handle_col,
            partition_ids,
            preferred_store,
        };
        Ok(LogicalPlan::leaf(
            LogicalOperator::DataSource(Box::new(ds)),
            Schema::new(schema_cols),
            names,
        ))
    }

    fn build_data_source_from_view(
        &mut self,
        db: &str,
        table: &TableInfo,
        view: &ViewInfo,
        alias: Option<&str>,
    ) -> PlanResult<LogicalPlan> {
        // The view body resolves unqualified names in the view's database.
        let saved_db = std::mem::replace(&mut self.ctx.vars.current_db, db.to_string());
        let built = self.build_query(&view.select);
        self.ctx.vars.current_db = saved_db;
        let plan = built?;

        if plan.schema.len() != view.columns.len() {
            return Err(PlanError::ViewWrongList);
        }
        let tbl_name = alias.unwrap_or(&table.name);
        let exprs = plan.schema.columns.iter().cloned().map(Expression::Column).collect();
        let names = view
            .columns
            .iter()
            .map(|col| FieldName::table_column(db, tbl_name, &table.name, col))
            .collect();
        Ok(self.build_projection_node(plan, exprs, names))
    }

    pub(crate) fn build_union(&mut self, union: &UnionStmt) -> PlanResult<LogicalPlan> {
        let mut children = Vec::with_capacity(union.selects.len());
        for sel in &union.selects {
            let child = self.build_select(sel)?;
            self.ctx.handle_helper.pop_map();
            children.push(child);
        }
        let Some(first) = children.first() else {
            return Err(PlanError::Internal("union without select blocks".into()));
        };
        let width = first.schema.len();
        if children.iter().any(|c| c.schema.len() != width) {
            return Err(PlanError::WrongNumberOfColumnsInSelect);
        }

        let mut columns = Vec::with_capacity(width);
        for i in 0..width {
            let ft = union_field_type(children.iter().map(|c| &c.schema.columns[i].ret_type));
            columns.push(Column::new(self.ctx.alloc_column_id(), ft));
        }
        let names = first
            .names
            .iter()
            .map(|n| FieldName::new(n.col_name.clone()))
            .collect();
        let mut plan = LogicalPlan::new(LogicalOperator::Union, children, Schema::new(columns), names);
        self.ctx.handle_helper.push_map(HandleMap::new());
        if !union.all {
            plan = self.build_distinct(plan);
        }

        if !union.order_by.is_empty() {
            self.ctx.clauses.push(Clause::GlobalOrderBy);
            let items = self.resolve_union_order_by(&union.order_by, &plan);
            self.ctx.clauses.pop();
            plan = LogicalPlan::unary(LogicalOperator::Sort { by_items: items? }, plan);
        }
        if let Some(limit) = union.limit {
            plan = build_limit(plan, limit);
        }
        Ok(plan)
    }

    fn resolve_union_order_by(&mut self, items: &[OrderByItem], plan: &LogicalPlan) -> PlanResult<Vec<ByItem>> {
        let clause = Clause::GlobalOrderBy.message();
        let mut by_items = Vec::with_capacity(items.len());
        for item in items {
            let expr = match position_of(&item.expr) {
                Some(pos) if pos >= 1 && pos <= plan.schema.len() => {
                    Expression::Column(plan.schema.columns[pos - 1].clone())
                }
                Some(pos) => return Err(PlanError::unknown_column(pos.to_string(), clause)),
                None => self.rewrite_scalar(&item.expr, &plan.schema, &plan.names)?,
            };
            by_items.push(ByItem { expr, desc: item.desc });
        }
        Ok(by_items)
    }
}

fn build_limit(plan: LogicalPlan, limit: Limit) -> LogicalPlan {
    LogicalPlan::unary(
        LogicalOperator::Limit {
            offset: limit.offset,
            count: limit.count,
        },
        plan,
    )
}

fn split_conjuncts<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            split_conjuncts(left, out);
            split_conjuncts(right, out);
        }
        other => out.push(other),
    }
}

/// `n` for a positional reference such as `ORDER BY 2`.
fn position_of(expr: &Expr) -> Option<usize> {
    match expr {
        Expr::Value(Datum::Int(n)) => usize::try_from(*n).ok(),
        Expr::Value(Datum::Uint(n)) => usize::try_from(*n).ok(),
        _ => None,
    }
}

fn alias_target<'f>(name: &ColumnName, fields: &'f [ProjField]) -> Option<&'f Expr> {
    if name.table.is_some() {
        return None;
    }
    fields.iter().find_map(|f| match f {
        ProjField::Ast {
            expr,
            alias: Some(alias),
        } if alias.eq_ignore_ascii_case(&name.name) => Some(expr),
        _ => None,
    })
}

/// Replace unqualified references to select-list aliases with the aliased
/// expression (HAVING and ORDER BY see the select list).
fn substitute_aliases(expr: &Expr, fields: &[ProjField]) -> Expr {
    match expr {
        Expr::Column(name) => match alias_target(name, fields) {
            Some(target) if !matches!(target, Expr::Column(c) if c == name) => target.clone(),
            _ => expr.clone(),
        },
        Expr::Unary { op, expr: inner } => Expr::Unary {
            op: *op,
            expr: Box::new(substitute_aliases(inner, fields)),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: Box::new(substitute_aliases(left, fields)),
            right: Box::new(substitute_aliases(right, fields)),
        },
        Expr::IsNull { expr: inner, negated } => Expr::IsNull {
            expr: Box::new(substitute_aliases(inner, fields)),
            negated: *negated,
        },
        Expr::Function { name, args } => Expr::Function {
            name: name.clone(),
            args: args.iter().map(|a| substitute_aliases(a, fields)).collect(),
        },
        other => other.clone(),
    }
}

fn unfold_wildcards(fields: &[SelectField], plan: &LogicalPlan, has_from: bool) -> PlanResult<Vec<ProjField>> {
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        match field {
            SelectField::Expr { expr, alias } => out.push(ProjField::Ast {
                expr: expr.clone(),
                alias: alias.clone(),
            }),
            SelectField::Wildcard(table) => {
                if !has_from {
                    return Err(PlanError::InvalidValue("No tables used".to_string()));
                }
                let before = out.len();
                for (col, name) in plan.schema.columns.iter().zip(&plan.names) {
                    if name.hidden {
                        continue;
                    }
                    let selected = match table {
                        None => !name.redundant,
                        Some(t) => {
                            name.tbl_name.eq_ignore_ascii_case(&t.name)
                                && t.schema.as_ref().is_none_or(|db| name.db_name.eq_ignore_ascii_case(db))
                        }
                    };
                    if selected {
                        out.push(ProjField::Input {
                            col: col.clone(),
                            name: name.clone(),
                        });
                    }
                }
                if let Some(t) = table {
                    if out.len() == before {
                        return Err(PlanError::UnknownTable {
                            table: t.to_string(),
                            clause: Clause::FieldList.message().to_string(),
                        });
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Every distinct aggregate call of the select list, HAVING and ORDER BY.
fn collect_aggregates(
    fields: &[ProjField],
    having: Option<&Expr>,
    order_by: &[OrderByItem],
) -> PlanResult<Vec<Expr>> {
    let mut exprs: Vec<&Expr> = fields
        .iter()
        .filter_map(|f| match f {
            ProjField::Ast { expr, .. } => Some(expr),
            ProjField::Input { .. } => None,
        })
        .collect();
    exprs.extend(having);
    exprs.extend(order_by.iter().map(|item| &item.expr));

    let mut aggs: Vec<Expr> = Vec::new();
    let mut nested = false;
    for expr in exprs {
        expr.walk(&mut |e| {
            if let Expr::Aggregate { args, .. } = e {
                if args.iter().any(Expr::has_aggregate) {
                    nested = true;
                }
                if !aggs.contains(e) {
                    aggs.push(e.clone());
                }
            }
        });
    }
    if nested {
        return Err(PlanError::InvalidGroupFuncUse);
    }
    Ok(aggs)
}

fn projection_name(expr: &Expr, alias: Option<&str>, out: &Expression, input: &LogicalPlan) -> FieldName {
    let source = out
        .as_column()
        .and_then(|c| input.schema.column_index(c.unique_id))
        .filter(|_| matches!(expr, Expr::Column(_)))
        .map(|idx| &input.names[idx]);
    let col_name = match (alias, expr) {
        (Some(alias), _) => alias.to_string(),
        (None, Expr::Column(name)) => name.name.clone(),
        (None, other) => other.to_string(),
    };
    match source {
        Some(src) => FieldName {
            db_name: src.db_name.clone(),
            tbl_name: src.tbl_name.clone(),
            orig_tbl_name: src.orig_tbl_name.clone(),
            col_name,
            orig_col_name: src.orig_col_name.clone(),
            hidden: false,
            redundant: false,
        },
        None => FieldName::new(col_name),
    }
}

/// The hint table of a join side when all its columns come from one table.
fn extract_table_alias(plan: &LogicalPlan, current_db: &str) -> Option<HintTableInfo> {
    let mut visible = plan.names.iter().filter(|n| !n.hidden);
    let first = visible.next()?;
    if first.tbl_name.is_empty() {
        return None;
    }
    let same = visible.all(|n| {
        n.tbl_name.eq_ignore_ascii_case(&first.tbl_name) && n.db_name.eq_ignore_ascii_case(&first.db_name)
    });
    if !same {
        return None;
    }
    let db = if first.db_name.is_empty() {
        current_db
    } else {
        &first.db_name
    };
    Some(HintTableInfo::new(db, first.tbl_name.clone()))
}

fn check_unique_tables(left: &[FieldName], right: &[FieldName]) -> PlanResult<()> {
    for l in left.iter().filter(|n| !n.tbl_name.is_empty()) {
        let clash = right.iter().any(|r| {
            r.tbl_name.eq_ignore_ascii_case(&l.tbl_name) && r.db_name.eq_ignore_ascii_case(&l.db_name)
        });
        if clash {
            return Err(PlanError::NonUniqTable(l.tbl_name.clone()));
        }
    }
    Ok(())
}

pub(super) fn resolve_partitions(table: &TableInfo, names: &[String]) -> PlanResult<Vec<i64>> {
    if table.partitions.is_empty() {
        if !names.is_empty() {
            return Err(PlanError::Partition(
                "PARTITION () clause on non partitioned table".to_string(),
            ));
        }
        return Ok(Vec::new());
    }
    if names.is_empty() {
        return Ok(table.partitions.iter().map(|p| p.id).collect());
    }
    names
        .iter()
        .map(|name| {
            table
                .partitions
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .map(|p| p.id)
                .ok_or_else(|| {
                    PlanError::Partition(format!("Unknown partition '{name}' in table '{}'", table.name))
                })
        })
        .collect()
}

/// Result type of a UNION column.
fn union_field_type<'a>(types: impl Iterator<Item = &'a FieldType>) -> FieldType {
    let types: Vec<&FieldType> = types.collect();
    let Some(first) = types.first() else {
        return FieldType::default();
    };
    let tp = if types.iter().all(|t| t.tp == first.tp) {
        first.tp
    } else if types.iter().any(|t| t.tp.is_string()) {
        DataType::Varchar
    } else if types.iter().all(|t| t.tp.is_integer()) {
        DataType::LongLong
    } else {
        DataType::Double
    };
    let mut ft = FieldType::new(tp);
    ft.flen = types.iter().map(|t| t.flen).max().unwrap_or(ft.flen);
    ft.not_null = types.iter().all(|t| t.not_null);
    ft
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AggFunc, Statement};
    use crate::catalog::MemCatalog;
    use crate::config::SessionVars;
    use crate::planner::context::CompileContext;
    use crate::planner::plan::Plan;

    fn build(stmt: Statement) -> PlanResult<(LogicalPlan, CompileContext)> {
        let catalog = MemCatalog::mock();
        let mut ctx = CompileContext::new(SessionVars::new().with_current_db("test"));
        let plan = PlanBuilder::new(&mut ctx, &catalog).build(&stmt)?;
        match plan {
            Plan::Logical(p) => Ok((p, ctx)),
            other => panic!("expected a logical plan, got {}", other.name()),
        }
    }

    fn select(fields: Vec<SelectField>, from: &str) -> SelectStmt {
        SelectStmt {
            fields,
            from: Some(TableRef::table(from)),
            ..Default::default()
        }
    }

    fn field(expr: Expr) -> SelectField {
        SelectField::Expr { expr, alias: None }
    }

    #[test]
    fn test_wildcard_skips_hidden_row_id() {
        let (plan, _) = build(Statement::Select(select(vec![SelectField::Wildcard(None)], "t2"))).unwrap();
        assert_eq!(plan.name(), "Projection");
        let cols: Vec<&str> = plan.names.iter().map(|n| n.col_name.as_str()).collect();
        assert_eq!(cols, vec!["a", "b"]);
        // The scan itself carries the row id.
        assert_eq!(plan.children[0].schema.len(), 3);
    }

    #[test]
    fn test_where_builds_selection() {
        let mut sel = select(vec![field(Expr::col("a"))], "t");
        sel.where_clause = Some(Expr::binary(
            BinaryOp::And,
            Expr::eq(Expr::col("a"), Expr::int(10)),
            Expr::binary(BinaryOp::Gt, Expr::col("b"), Expr::int(1)),
        ));
        let (plan, _) = build(Statement::Select(sel)).unwrap();
        let LogicalOperator::Selection { conditions } = &plan.children[0].op else {
            panic!("expected selection");
        };
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn test_unknown_column_names_clause() {
        let mut sel = select(vec![field(Expr::col("a"))], "t");
        sel.where_clause = Some(Expr::eq(Expr::col("zz"), Expr::int(1)));
        let err = build(Statement::Select(sel)).unwrap_err();
        assert_eq!(err.to_string(), "Unknown column 'zz' in 'where clause'");
    }

    #[test]
    fn test_group_by_alias_and_position() {
        let sum = Expr::Aggregate {
            func: AggFunc::Sum,
            args: vec![Expr::col("a")],
            distinct: false,
        };
        let mut sel = select(
            vec![
                SelectField::Expr {
                    expr: Expr::col("b"),
                    alias: Some("bb".into()),
                },
                field(sum),
            ],
            "t2",
        );
        sel.group_by = vec![Expr::col("bb")];
        let (plan, _) = build(Statement::Select(sel.clone())).unwrap();
        let LogicalOperator::Aggregation { group_by, agg_funcs } = &plan.children[0].op else {
            panic!("expected aggregation");
        };
        assert_eq!(group_by.len(), 1);
        // sum plus first_row for a, b and the row id
        assert_eq!(agg_funcs.len(), 4);

        sel.group_by = vec![Expr::int(1)];
        assert!(build(Statement::Select(sel.clone())).is_ok());
        sel.group_by = vec![Expr::int(3)];
        let err = build(Statement::Select(sel)).unwrap_err();
        assert_eq!(err.to_string(), "Unknown column '3' in 'group statement'");
    }

    #[test]
    fn test_aggregate_in_where_rejected() {
        let mut sel = select(vec![field(Expr::col("a"))], "t");
        sel.where_clause = Some(Expr::binary(
            BinaryOp::Gt,
            Expr::Aggregate {
                func: AggFunc::Count,
                args: vec![],
                distinct: false,
            },
            Expr::int(1),
        ));
        assert!(matches!(
            build(Statement::Select(sel)),
            Err(PlanError::InvalidGroupFuncUse)
        ));
    }

    #[test]
    fn test_order_by_hidden_column_is_trimmed() {
        let mut sel = select(vec![field(Expr::col("a"))], "t");
        sel.order_by = vec![OrderByItem {
            expr: Expr::col("b"),
            desc: true,
        }];
        let (plan, _) = build(Statement::Select(sel)).unwrap();
        assert_eq!(plan.name(), "Projection");
        assert_eq!(plan.schema.len(), 1);
        assert_eq!(plan.children[0].name(), "Sort");
        assert_eq!(plan.children[0].schema.len(), 2);
    }

    #[test]
    fn test_join_using_and_duplicate_alias() {
        let join = TableRef::Join {
            left: Box::new(TableRef::table("t")),
            right: Box::new(TableRef::table("t2")),
            kind: JoinKind::Inner,
            constraint: JoinConstraint::Using(vec!["a".into()]),
        };
        let sel = SelectStmt {
            fields: vec![field(Expr::col("a"))],
            from: Some(join),
            ..Default::default()
        };
        let (plan, _) = build(Statement::Select(sel)).unwrap();
        let LogicalOperator::Join(info) = &plan.children[0].op else {
            panic!("expected join");
        };
        assert_eq!(info.eq_conditions.len(), 1);

        let dup = TableRef::Join {
            left: Box::new(TableRef::table("t")),
            right: Box::new(TableRef::table("t")),
            kind: JoinKind::Cross,
            constraint: JoinConstraint::None,
        };
        let sel = SelectStmt {
            fields: vec![SelectField::Wildcard(None)],
            from: Some(dup),
            ..Default::default()
        };
        assert!(matches!(
            build(Statement::Select(sel)),
            Err(PlanError::NonUniqTable(_))
        ));
    }

    #[test]
    fn test_union_column_count_mismatch() {
        let u = UnionStmt {
            selects: vec![
                select(vec![field(Expr::col("a"))], "t"),
                select(vec![field(Expr::col("a")), field(Expr::col("b"))], "t2"),
            ],
            all: true,
            order_by: vec![],
            limit: None,
        };
        assert!(matches!(
            build(Statement::Union(u)),
            Err(PlanError::WrongNumberOfColumnsInSelect)
        ));
    }

    #[test]
    fn test_union_distinct_adds_aggregation() {
        let u = UnionStmt {
            selects: vec![
                select(vec![field(Expr::col("a"))], "t"),
                select(vec![field(Expr::col("a"))], "t2"),
            ],
            all: false,
            order_by: vec![],
            limit: Some(Limit { count: 5, offset: 0 }),
        };
        let (plan, _) = build(Statement::Union(u)).unwrap();
        assert_eq!(plan.name(), "Limit");
        assert_eq!(plan.children[0].name(), "Aggregation");
        assert_eq!(plan.children[0].children[0].name(), "UnionAll");
    }

    #[test]
    fn test_view_expands_to_projection() {
        let (plan, _) = build(Statement::Select(select(vec![SelectField::Wildcard(None)], "v"))).unwrap();
        let view = &plan.children[0];
        assert_eq!(view.name(), "Projection");
        assert_eq!(view.names[0].tbl_name, "v");
        assert_eq!(view.names[0].orig_tbl_name, "v");
    }

    #[test]
    fn test_correlated_subquery_builds_apply() {
        let inner = SelectStmt {
            fields: vec![field(Expr::col("a"))],
            from: Some(TableRef::table("t2")),
            where_clause: Some(Expr::eq(Expr::col("t2.b"), Expr::col("t.b"))),
            ..Default::default()
        };
        let mut sel = select(vec![field(Expr::col("a"))], "t");
        sel.where_clause = Some(Expr::Exists {
            query: Box::new(Query::Select(Box::new(inner))),
            negated: false,
        });
        let (plan, _) = build(Statement::Select(sel)).unwrap();
        let selection = &plan.children[0];
        assert_eq!(selection.name(), "Selection");
        let LogicalOperator::Apply { join, corr_cols } = &selection.children[0].op else {
            panic!("expected apply, got {}", selection.children[0].name());
        };
        assert_eq!(join.join_type, JoinType::LeftOuterSemi);
        assert_eq!(corr_cols.len(), 1);
    }

    #[test]
    fn test_comment_join_hint_unmatched_warns() {
        let mut sel = select(vec![field(Expr::col("a"))], "t");
        sel.hints = vec![crate::ast::OptimizerHint::HashJoin(vec![crate::ast::HintTable::new("nope")])];
        let (_, ctx) = build(Statement::Select(sel)).unwrap();
        assert_eq!(ctx.warnings().len(), 1);
        assert!(ctx.warnings()[0].to_string().contains("HASH_JOIN(nope)"));
    }
}

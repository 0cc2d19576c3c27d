//! Scalar expression rewriting.
//!
//! Turns an [`ast::Expr`] into a typed [`Expression`] bound to the columns of
//! an input plan. Names resolve against the input first and then against
//! enclosing query blocks (innermost first), which yields correlated columns.
//! Subqueries wrap the input plan in a join or apply, so rewriting consumes
//! the input plan and hands back the possibly-extended one.

use crate::ast::{self, BinaryOp, ColumnName, Expr, Query, UnaryOp};
use crate::catalog::ColumnInfo;
use crate::error::{PlanError, PlanResult};
use crate::planner::builder::PlanBuilder;
use crate::planner::context::OuterScope;
use crate::planner::expression::{Constant, Expression, ScalarFunction, new_function};
use crate::planner::plan::{JoinInfo, JoinType, LogicalOperator, LogicalPlan};
use crate::planner::schema::{Column, FieldName, Schema, find_field_name};
use crate::types::{DataType, Datum, FieldType};

/// Aggregate calls already computed by an aggregation below, with the column
/// holding each result.
pub(crate) type AggMapper = Vec<(Expr, Column)>;

struct RewriteState<'m> {
    plan: LogicalPlan,
    agg_mapper: Option<&'m AggMapper>,
    allow_subquery: bool,
}

impl PlanBuilder<'_> {
    /// Rewrite `expr` against `plan`.
    ///
    /// Returns the expression and the plan it must be evaluated on, which
    /// differs from the input when `expr` contains subqueries.
    pub(crate) fn rewrite(
        &mut self,
        expr: &Expr,
        plan: LogicalPlan,
        agg_mapper: Option<&AggMapper>,
        allow_subquery: bool,
    ) -> PlanResult<(Expression, LogicalPlan)> {
        let mut st = RewriteState {
            plan,
            agg_mapper,
            allow_subquery,
        };
        let out = self.rewrite_node(expr, &mut st)?;
        Ok((out, st.plan))
    }

    /// Rewrite an expression that only reads `schema`; subqueries are rejected.
    pub(crate) fn rewrite_scalar(
        &mut self,
        expr: &Expr,
        schema: &Schema,
        names: &[FieldName],
    ) -> PlanResult<Expression> {
        let input = LogicalPlan::leaf(
            LogicalOperator::TableDual { row_count: 1 },
            schema.clone(),
            names.to_vec(),
        );
        let (out, _) = self.rewrite(expr, input, None, false)?;
        Ok(out)
    }

    fn clause_message(&self) -> &'static str {
        let msg = self.ctx.current_clause().message();
        if msg.is_empty() { "field list" } else { msg }
    }

    /// Resolve `name` in `input` and then in the enclosing scopes.
    pub(crate) fn resolve_column(&self, name: &ColumnName, input: &LogicalPlan) -> PlanResult<Expression> {
        let clause = self.clause_message();
        if let Some(idx) = find_field_name(&input.names, name, clause)? {
            return Ok(Expression::Column(input.schema.columns[idx].clone()));
        }
        for scope in self.ctx.outer_scopes.iter().rev() {
            if let Some(idx) = find_field_name(&scope.names, name, clause)? {
                return Ok(Expression::CorrelatedColumn(scope.schema.columns[idx].clone()));
            }
        }
        Err(PlanError::unknown_column(name.to_string(), clause))
    }

    fn rewrite_node(&mut self, expr: &Expr, st: &mut RewriteState<'_>) -> PlanResult<Expression> {
        match expr {
            Expr::Column(name) => self.resolve_column(name, &st.plan),
            Expr::Value(v) => Ok(Expression::constant(v.clone())),
            Expr::Default(Some(name)) => self.eval_default_expr(name, &st.plan),
            Expr::Default(None) => Err(PlanError::InvalidValue(
                "DEFAULT is only allowed as a value of INSERT, UPDATE or SET".to_string(),
            )),
            Expr::Unary { op, expr } => {
                let arg = self.rewrite_node(expr, st)?;
                match op {
                    UnaryOp::Plus => Ok(arg),
                    UnaryOp::Not => new_function("not", vec![arg]),
                    UnaryOp::Minus => new_function("unaryminus", vec![arg]),
                    UnaryOp::BitNeg => new_function("bitneg", vec![arg]),
                }
            }
            Expr::Binary { op, left, right } => {
                if let (Expr::Row(l), Expr::Row(r)) = (left.as_ref(), right.as_ref()) {
                    return self.rewrite_row_compare(*op, l, r, st);
                }
                if matches!(left.as_ref(), Expr::Row(_)) || matches!(right.as_ref(), Expr::Row(_)) {
                    return Err(PlanError::OperandColumns(1));
                }
                let l = self.rewrite_node(left, st)?;
                let r = self.rewrite_node(right, st)?;
                new_function(op.func_name(), vec![l, r])
            }
            Expr::IsNull { expr, negated } => {
                let arg = self.rewrite_node(expr, st)?;
                let is_null = new_function("isnull", vec![arg])?;
                if *negated { new_function("not", vec![is_null]) } else { Ok(is_null) }
            }
            Expr::InList { expr, list, negated } => {
                let mut args = Vec::with_capacity(list.len() + 1);
                args.push(self.rewrite_node(expr, st)?);
                for item in list {
                    if matches!(item, Expr::Row(_)) {
                        return Err(PlanError::OperandColumns(1));
                    }
                    args.push(self.rewrite_node(item, st)?);
                }
                let in_expr = new_function("in", args)?;
                if *negated { new_function("not", vec![in_expr]) } else { Ok(in_expr) }
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let e = self.rewrite_node(expr, st)?;
                let lo = self.rewrite_node(low, st)?;
                let hi = self.rewrite_node(high, st)?;
                if *negated {
                    let lt = new_function("lt", vec![e.clone(), lo])?;
                    let gt = new_function("gt", vec![e, hi])?;
                    new_function("or", vec![lt, gt])
                } else {
                    let ge = new_function("ge", vec![e.clone(), lo])?;
                    let le = new_function("le", vec![e, hi])?;
                    new_function("and", vec![ge, le])
                }
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let e = self.rewrite_node(expr, st)?;
                let p = self.rewrite_node(pattern, st)?;
                let like = new_function("like", vec![e, p])?;
                if *negated { new_function("not", vec![like]) } else { Ok(like) }
            }
            Expr::Case {
                operand,
                branches,
                else_expr,
            } => {
                let operand = match operand {
                    Some(op) => Some(self.rewrite_node(op, st)?),
                    None => None,
                };
                let mut args = Vec::with_capacity(branches.len() * 2 + 1);
                for (when, then) in branches {
                    let mut cond = self.rewrite_node(when, st)?;
                    if let Some(op) = &operand {
                        cond = new_function("eq", vec![op.clone(), cond])?;
                    }
                    args.push(cond);
                    args.push(self.rewrite_node(then, st)?);
                }
                if let Some(e) = else_expr {
                    args.push(self.rewrite_node(e, st)?);
                }
                // Result type follows the first THEN branch.
                let ret_type = args
                    .get(1)
                    .map(|a| a.ret_type().clone().nullable())
                    .unwrap_or_default();
                Ok(Expression::ScalarFunction(ScalarFunction {
                    name: "case".to_string(),
                    args,
                    ret_type,
                }))
            }
            Expr::Function { name, args } => {
                let mut out = Vec::with_capacity(args.len());
                for arg in args {
                    out.push(self.rewrite_node(arg, st)?);
                }
                new_function(name, out)
            }
            Expr::Aggregate { .. } => {
                let mapped = st
                    .agg_mapper
                    .and_then(|m| m.iter().find(|(e, _)| e == expr))
                    .map(|(_, col)| col.clone());
                match mapped {
                    Some(col) => Ok(Expression::Column(col)),
                    None => Err(PlanError::InvalidGroupFuncUse),
                }
            }
            Expr::Subquery(query) => self.rewrite_scalar_subquery(query, st),
            Expr::Exists { query, negated } => {
                let join_type = if *negated {
                    JoinType::AntiLeftOuterSemi
                } else {
                    JoinType::LeftOuterSemi
                };
                self.rewrite_semi_subquery(query, None, join_type, st)
            }
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => {
                let lhs = self.rewrite_node(expr, st)?;
                let join_type = if *negated {
                    JoinType::AntiLeftOuterSemi
                } else {
                    JoinType::LeftOuterSemi
                };
                self.rewrite_semi_subquery(query, Some(lhs), join_type, st)
            }
            Expr::UserVar(name) => new_function(
                "getvar",
                vec![Expression::constant(Datum::String(name.to_ascii_lowercase()))],
            ),
            Expr::SystemVar { name, .. } => match self.ctx.vars.system_var(name) {
                Some(value) => Ok(Expression::constant(Datum::String(value.to_string()))),
                None => Err(PlanError::UnknownSystemVar(name.clone())),
            },
            Expr::ParamMarker(idx) => Ok(Expression::Constant(Constant {
                value: Datum::Null,
                ret_type: FieldType::default(),
                param_marker: Some(*idx),
            })),
            Expr::Row(_) => Err(PlanError::OperandColumns(1)),
        }
    }

    fn rewrite_row_compare(
        &mut self,
        op: BinaryOp,
        left: &[Expr],
        right: &[Expr],
        st: &mut RewriteState<'_>,
    ) -> PlanResult<Expression> {
        if left.len() != right.len() {
            return Err(PlanError::OperandColumns(left.len()));
        }
        let (func, combine) = match op {
            BinaryOp::Eq => ("eq", "and"),
            BinaryOp::NullEq => ("nulleq", "and"),
            BinaryOp::NotEq => ("ne", "or"),
            _ => {
                return Err(PlanError::not_supported(
                    format!("row comparison with '{}'", op.func_name()),
                    "compare the row elements one by one",
                ));
            }
        };
        let mut parts = Vec::with_capacity(left.len());
        for (l, r) in left.iter().zip(right) {
            let l = self.rewrite_node(l, st)?;
            let r = self.rewrite_node(r, st)?;
            parts.push(new_function(func, vec![l, r])?);
        }
        let mut iter = parts.into_iter();
        let Some(mut acc) = iter.next() else {
            return Err(PlanError::OperandColumns(1));
        };
        for part in iter {
            acc = new_function(combine, vec![acc, part])?;
        }
        Ok(acc)
    }

    /// Compile `query` as a subquery of `outer`.
    pub(crate) fn build_subquery(&mut self, query: &Query, outer: &LogicalPlan) -> PlanResult<LogicalPlan> {
        self.ctx.outer_scopes.push(OuterScope {
            schema: outer.schema.clone(),
            names: outer.names.clone(),
        });
        let result = self.build_query(query);
        self.ctx.outer_scopes.pop();
        let plan = result?;
        // The subquery's row identity is not visible to the outer block.
        self.ctx.handle_helper.pop_map();
        Ok(plan)
    }

    fn check_subquery_allowed(&self, st: &RewriteState<'_>) -> PlanResult<()> {
        if st.allow_subquery {
            Ok(())
        } else {
            Err(PlanError::not_supported(
                "subquery in this context",
                "move the subquery into a derived table",
            ))
        }
    }

    fn rewrite_scalar_subquery(&mut self, query: &Query, st: &mut RewriteState<'_>) -> PlanResult<Expression> {
        self.check_subquery_allowed(st)?;
        let sub = self.build_subquery(query, &st.plan)?;
        if sub.schema.len() != 1 {
            return Err(PlanError::OperandColumns(1));
        }
        let schema = sub.schema.clone();
        let names = sub.names.clone();
        let one_row = LogicalPlan::new(LogicalOperator::MaxOneRow, vec![sub], schema, names);
        let outer = std::mem::replace(&mut st.plan, LogicalPlan::table_dual(0));
        let joined = build_apply_or_join(outer, one_row, JoinInfo::new(JoinType::LeftOuter), None);
        let out = joined
            .schema
            .columns
            .last()
            .cloned()
            .map(Expression::Column)
            .ok_or_else(|| PlanError::Internal("scalar subquery produced no column".into()));
        st.plan = joined;
        out
    }

    fn rewrite_semi_subquery(
        &mut self,
        query: &Query,
        lhs: Option<Expression>,
        join_type: JoinType,
        st: &mut RewriteState<'_>,
    ) -> PlanResult<Expression> {
        self.check_subquery_allowed(st)?;
        let sub = self.build_subquery(query, &st.plan)?;
        let mut join = JoinInfo::new(join_type);
        if let Some(lhs) = lhs {
            if sub.schema.len() != 1 {
                return Err(PlanError::OperandColumns(1));
            }
            let rhs = Expression::Column(sub.schema.columns[0].clone());
            let cond = new_function("eq", vec![lhs, rhs])?;
            join.attach_conditions(vec![cond], &st.plan.schema, &sub.schema);
        }
        let aux = Column::new(
            self.ctx.alloc_column_id(),
            FieldType::new(DataType::LongLong).with_flen(1),
        );
        let outer = std::mem::replace(&mut st.plan, LogicalPlan::table_dual(0));
        st.plan = build_apply_or_join(outer, sub, join, Some(aux.clone()));
        Ok(Expression::Column(aux))
    }

    /// `DEFAULT(col)`: the default of the base column `col` reads.
    fn eval_default_expr(&mut self, name: &ColumnName, input: &LogicalPlan) -> PlanResult<Expression> {
        let clause = self.clause_message();
        let idx = find_field_name(&input.names, name, clause)?
            .ok_or_else(|| PlanError::unknown_column(name.to_string(), clause))?;
        let field = &input.names[idx];
        let db = if field.db_name.is_empty() {
            self.ctx.current_db().to_string()
        } else {
            field.db_name.clone()
        };
        let table = self.is.table_by_name(&db, &field.orig_tbl_name)?;
        let col = table
            .find_column(&field.orig_col_name)
            .ok_or_else(|| PlanError::unknown_column(name.to_string(), clause))?;
        self.get_default_value(col)
    }

    /// Default of `col` as a constant of the column's type.
    ///
    /// A NOT NULL column without a default fails in strict mode and falls
    /// back to the type's zero value otherwise.
    pub(crate) fn get_default_value(&mut self, col: &ColumnInfo) -> PlanResult<Expression> {
        let value = if col.is_generated() || col.auto_increment {
            Datum::Null
        } else if col.has_default {
            col.default_value.clone().unwrap_or(Datum::Null)
        } else if col.field_type.not_null {
            if self.ctx.vars.strict_sql_mode {
                return Err(PlanError::NoDefaultValue(col.name.clone()));
            }
            self.ctx.append_warning(PlanError::NoDefaultValue(col.name.clone()));
            zero_value(&col.field_type)
        } else {
            Datum::Null
        };
        Ok(Expression::Constant(Constant {
            value,
            ret_type: col.field_type.clone(),
            param_marker: None,
        }))
    }

    /// `DEFAULT(name)` inside an INSERT value list.
    pub(crate) fn find_default_value(&mut self, cols: &[ColumnInfo], name: &ColumnName) -> PlanResult<Expression> {
        match cols.iter().find(|c| c.name.eq_ignore_ascii_case(&name.name)) {
            Some(col) => self.get_default_value(col),
            None => Err(PlanError::unknown_column(name.name.clone(), "field_list")),
        }
    }
}

fn zero_value(ft: &FieldType) -> Datum {
    match ft.tp {
        t if t.is_integer() => {
            if ft.unsigned {
                Datum::Uint(0)
            } else {
                Datum::Int(0)
            }
        }
        DataType::Double => Datum::Float(0.0),
        DataType::NewDecimal => Datum::Decimal("0".to_string()),
        DataType::Blob => Datum::Bytes(Vec::new()),
        DataType::Date => Datum::String("0000-00-00".to_string()),
        DataType::Datetime => Datum::String("0000-00-00 00:00:00".to_string()),
        DataType::Json => Datum::String("null".to_string()),
        DataType::Null => Datum::Null,
        _ => Datum::String(String::new()),
    }
}

/// Correlated columns read anywhere in `plan` that belong to `outer`.
pub(crate) fn extract_correlated_cols(plan: &LogicalPlan, outer: &Schema) -> Vec<Column> {
    let mut out: Vec<Column> = Vec::new();
    collect_correlated(plan, &mut out);
    out.retain(|c| outer.contains(c));
    out.dedup_by_key(|c| c.unique_id);
    out
}

fn collect_correlated(plan: &LogicalPlan, out: &mut Vec<Column>) {
    let mut push_all = |exprs: &[Expression]| {
        for e in exprs {
            out.extend(e.correlated_columns().into_iter().cloned());
        }
    };
    match &plan.op {
        LogicalOperator::Selection { conditions } => push_all(conditions),
        LogicalOperator::Projection { exprs, .. } => push_all(exprs),
        LogicalOperator::Aggregation { agg_funcs, group_by } => {
            push_all(group_by);
            for agg in agg_funcs {
                push_all(&agg.args);
            }
        }
        LogicalOperator::Join(join) | LogicalOperator::Apply { join, .. } => {
            push_all(&join.left_conditions);
            push_all(&join.right_conditions);
            push_all(&join.other_conditions);
        }
        LogicalOperator::Sort { by_items } => {
            for item in by_items {
                push_all(std::slice::from_ref(&item.expr));
            }
        }
        _ => {}
    }
    for child in &plan.children {
        collect_correlated(child, out);
    }
}

/// Join `outer` with `inner`; an apply when `inner` reads outer columns.
///
/// `aux` is the flag column appended by the outer-semi join kinds.
pub(crate) fn build_apply_or_join(
    outer: LogicalPlan,
    inner: LogicalPlan,
    join: JoinInfo,
    aux: Option<Column>,
) -> LogicalPlan {
    let corr_cols = extract_correlated_cols(&inner, &outer.schema);
    let (mut schema, mut names) = match join.join_type {
        JoinType::Semi | JoinType::AntiSemi | JoinType::LeftOuterSemi | JoinType::AntiLeftOuterSemi => {
            (Schema::new(outer.schema.columns.clone()), outer.names.clone())
        }
        _ => {
            let mut names = outer.names.clone();
            names.extend(inner.names.iter().cloned());
            (Schema::merge(&outer.schema, &inner.schema), names)
        }
    };
    if let Some(aux) = aux {
        schema.append(aux);
        names.push(FieldName {
            hidden: true,
            ..Default::default()
        });
    }
    let op = if corr_cols.is_empty() {
        LogicalOperator::Join(join)
    } else {
        LogicalOperator::Apply { join, corr_cols }
    };
    LogicalPlan::new(op, vec![outer, inner], schema, names)
}

/// Names of every column the expression tree reads, lower-cased.
pub(crate) fn referenced_column_names(expr: &ast::Expr) -> Vec<String> {
    expr.column_names()
        .into_iter()
        .map(|c| c.name.to_ascii_lowercase())
        .collect()
}

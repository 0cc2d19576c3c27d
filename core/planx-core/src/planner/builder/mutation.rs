//! UPDATE and DELETE.
//!
//! Both compile their table references like a SELECT FROM clause, filter and
//! order the rows, and then read the handle map of the block to learn which
//! columns identify the rows they modify.

use crate::ast::{Assignment as AstAssignment, DeleteStmt, Expr, Limit, OrderByItem, UpdateStmt};
use crate::catalog::TableInfo;
use crate::error::{PlanError, PlanResult};
use crate::logging::BUILDER_TARGET;
use crate::planner::builder::PlanBuilder;
use crate::planner::clause::Clause;
use crate::planner::expression::{Assignment, Expression};
use crate::planner::plan::{ByItem, DeletePlan, LogicalOperator, LogicalPlan, Plan, UpdatePlan};
use crate::planner::schema::{FieldName, Schema, find_field_name};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

impl PlanBuilder<'_> {
    pub(crate) fn build_update(&mut self, stmt: &UpdateStmt) -> PlanResult<Plan> {
        let plan = self.build_result_set_node(&stmt.table_refs)?;
        let plan = self.build_dml_filter(plan, stmt.where_clause.as_ref(), &stmt.order_by, stmt.limit)?;

        self.ctx.clauses.push(Clause::FieldList);
        let built = self.build_update_lists(&stmt.assignments, plan);
        self.ctx.clauses.pop();
        let (ordered_list, select_plan) = built?;

        let tbl_id_to_handle = self.ctx.handle_helper.pop_map();
        let tbl_id_to_table: BTreeMap<i64, Arc<TableInfo>> = tbl_id_to_handle
            .keys()
            .filter_map(|id| self.is.table_by_id(*id).map(|t| (*id, t)))
            .collect();
        debug!(
            target: BUILDER_TARGET,
            assignments = ordered_list.len(),
            tables = tbl_id_to_table.len(),
            "update plan"
        );
        Ok(Plan::Update(Box::new(UpdatePlan {
            select_plan,
            ordered_list,
            tbl_id_to_handle,
            tbl_id_to_table,
        })))
    }

    pub(crate) fn build_delete(&mut self, stmt: &DeleteStmt) -> PlanResult<Plan> {
        let is_multi_table = !stmt.targets.is_empty();
        let plan = self.build_result_set_node(&stmt.table_refs)?;
        let select_plan = self.build_dml_filter(plan, stmt.where_clause.as_ref(), &stmt.order_by, stmt.limit)?;

        let mut tbl_id_to_handle = self.ctx.handle_helper.pop_map();
        if is_multi_table {
            let mut target_ids = BTreeSet::new();
            for target in &stmt.targets {
                let field = select_plan
                    .names
                    .iter()
                    .find(|n| {
                        n.tbl_name.eq_ignore_ascii_case(&target.name)
                            && target.schema.as_ref().is_none_or(|db| n.db_name.eq_ignore_ascii_case(db))
                    })
                    .ok_or_else(|| PlanError::UnknownTable {
                        table: target.name.clone(),
                        clause: "MULTI DELETE".to_string(),
                    })?;
                let table = self.is.table_by_name(&field.db_name, &field.orig_tbl_name)?;
                target_ids.insert(table.id);
            }
            tbl_id_to_handle.retain(|id, _| target_ids.contains(id));
        }
        Ok(Plan::Delete(Box::new(DeletePlan {
            select_plan,
            is_multi_table,
            tbl_id_to_handle,
        })))
    }

    /// WHERE, ORDER BY and LIMIT of a DML statement.
    fn build_dml_filter(
        &mut self,
        mut plan: LogicalPlan,
        where_clause: Option<&Expr>,
        order_by: &[OrderByItem],
        limit: Option<Limit>,
    ) -> PlanResult<LogicalPlan> {
        if let Some(cond) = where_clause {
            plan = self.build_selection(plan, cond, None, Clause::Where)?;
        }
        if !order_by.is_empty() {
            self.ctx.clauses.push(Clause::OrderBy);
            let items: PlanResult<Vec<ByItem>> = order_by
                .iter()
                .map(|item| {
                    Ok(ByItem {
                        expr: self.rewrite_scalar(&item.expr, &plan.schema, &plan.names)?,
                        desc: item.desc,
                    })
                })
                .collect();
            self.ctx.clauses.pop();
            plan = LogicalPlan::unary(LogicalOperator::Sort { by_items: items? }, plan);
        }
        if let Some(limit) = limit {
            plan = LogicalPlan::unary(
                LogicalOperator::Limit {
                    offset: limit.offset,
                    count: limit.count,
                },
                plan,
            );
        }
        Ok(plan)
    }

    /// Resolve SET targets, compile their values and add re-evaluation of
    /// generated columns that read an updated column.
    fn build_update_lists(
        &mut self,
        list: &[AstAssignment],
        mut plan: LogicalPlan,
    ) -> PlanResult<(Vec<Assignment>, LogicalPlan)> {
        let clause = Clause::FieldList.message();
        let mut targets = Vec::with_capacity(list.len());
        // (db, table alias) -> lower-cased updated columns
        let mut modified: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
        for assign in list {
            let idx = find_field_name(&plan.names, &assign.column, clause)?
                .ok_or_else(|| PlanError::unknown_column(assign.column.to_string(), clause))?;
            let field = plan.names[idx].clone();
            let table = self.is.table_by_name(&field.db_name, &field.orig_tbl_name)?;
            let info = table
                .find_column(&field.orig_col_name)
                .ok_or_else(|| PlanError::unknown_column(assign.column.to_string(), clause))?;
            if info.is_generated() {
                if matches!(assign.expr, Expr::Default(None)) {
                    continue;
                }
                return Err(PlanError::bad_generated_column(&info.name, &table.name));
            }
            modified
                .entry((field.db_name.to_ascii_lowercase(), field.tbl_name.to_ascii_lowercase()))
                .or_default()
                .insert(info.name.to_ascii_lowercase());
            targets.push((idx, assign, info.clone()));
        }

        let mut ordered = Vec::with_capacity(targets.len());
        for (idx, assign, info) in targets {
            let col = plan.schema.columns[idx].clone();
            let col_name = plan.names[idx].clone();
            let expr = match &assign.expr {
                Expr::Default(None) => self.get_default_value(&info)?,
                other => {
                    let (expr, next) = self.rewrite(other, plan, None, true)?;
                    plan = next;
                    expr
                }
            };
            ordered.push(Assignment {
                col,
                col_name,
                expr: expr.cast_to(&info.field_type),
            });
        }

        for ((db, alias), cols) in &modified {
            self.append_dependent_generated(&plan, db, alias, cols, &mut ordered)?;
        }
        Ok((ordered, plan))
    }

    fn append_dependent_generated(
        &mut self,
        plan: &LogicalPlan,
        db: &str,
        alias: &str,
        modified: &BTreeSet<String>,
        ordered: &mut Vec<Assignment>,
    ) -> PlanResult<()> {
        let positions: Vec<usize> = plan
            .names
            .iter()
            .enumerate()
            .filter(|(_, n)| n.db_name.eq_ignore_ascii_case(db) && n.tbl_name.eq_ignore_ascii_case(alias))
            .map(|(i, _)| i)
            .collect();
        let Some(&first) = positions.first() else {
            return Ok(());
        };
        let table = self.is.table_by_name(&plan.names[first].db_name, &plan.names[first].orig_tbl_name)?;

        // Generated expressions name bare columns of their own table.
        let schema = Schema::new(positions.iter().map(|&i| plan.schema.columns[i].clone()).collect());
        let names: Vec<FieldName> = positions
            .iter()
            .map(|&i| FieldName {
                tbl_name: String::new(),
                db_name: String::new(),
                ..plan.names[i].clone()
            })
            .collect();

        for info in table.public_columns() {
            let Some(gen_expr) = &info.generated_expr else {
                continue;
            };
            if !info.dependences.iter().any(|d| modified.contains(d)) {
                continue;
            }
            let Some(pos) = names.iter().position(|n| n.orig_col_name.eq_ignore_ascii_case(&info.name)) else {
                continue;
            };
            let expr: Expression = self.rewrite_scalar(gen_expr, &schema, &names)?.cast_to(&info.field_type);
            ordered.push(Assignment {
                col: schema.columns[pos].clone(),
                col_name: plan.names[positions[pos]].clone(),
                expr,
            });
        }
        Ok(())
    }
}

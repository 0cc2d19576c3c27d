//! INSERT / REPLACE.

use crate::ast::{Assignment as AstAssignment, ColumnName, Expr, InsertSource, InsertStmt, Query};
use crate::catalog::{ColumnInfo, TableInfo};
use crate::error::{PlanError, PlanResult};
use crate::logging::BUILDER_TARGET;
use crate::planner::builder::PlanBuilder;
use crate::planner::expression::{Assignment, Expression};
use crate::planner::plan::{InsertGeneratedColumns, InsertPlan, Plan};
use crate::planner::rewrite::referenced_column_names;
use crate::planner::schema::{Column, FieldName, Schema, find_field_name};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

const FIELD_LIST: &str = "field list";

impl PlanBuilder<'_> {
    pub(crate) fn build_insert(&mut self, stmt: &InsertStmt) -> PlanResult<Plan> {
        let db = self.db_or_current(stmt.table.schema.as_deref())?;
        let table = self.is.table_by_name(&db, &stmt.table.name)?;
        if table.is_view() {
            let verb = if stmt.is_replace { "replace" } else { "insert" };
            return Err(PlanError::InvalidValue(format!(
                "{verb} into view {} is not supported now.",
                table.name
            )));
        }

        let (table_schema, table_names) = self.table_row_schema(&db, &table);
        let mut plan = InsertPlan {
            table: Arc::clone(&table),
            db_name: db,
            columns: Vec::new(),
            table_schema,
            table_names,
            is_replace: stmt.is_replace,
            lists: Vec::new(),
            set_list: Vec::new(),
            on_duplicate: Vec::new(),
            select_plan: None,
            schema_for_on_duplicate: Schema::default(),
            names_for_on_duplicate: Vec::new(),
            gen_cols: InsertGeneratedColumns::default(),
            need_fill_default_value: false,
            all_assignments_are_constant: false,
        };

        let on_dup_cols = resolve_on_duplicate(&stmt.on_duplicate, &table, &plan.table_names)?;
        match &stmt.source {
            InsertSource::Set(list) => self.build_set_values_of_insert(list, &mut plan)?,
            InsertSource::Values(rows) => self.build_values_list_of_insert(stmt, rows, &mut plan)?,
            InsertSource::Select(query) => self.build_select_plan_of_insert(stmt, query, &mut plan)?,
        }
        plan.gen_cols = self.resolve_generated_columns(&table, &plan.table_schema, &plan.table_names, &on_dup_cols)?;
        plan.on_duplicate = self.build_on_duplicate(&stmt.on_duplicate, &plan)?;

        debug!(
            target: BUILDER_TARGET,
            table = %table.name,
            columns = plan.columns.len(),
            rows = plan.lists.len(),
            "insert plan"
        );
        Ok(Plan::Insert(Box::new(plan)))
    }

    /// Fresh columns for every public column of `table`, in table order.
    pub(crate) fn table_row_schema(&mut self, db: &str, table: &TableInfo) -> (Schema, Vec<FieldName>) {
        let mut columns = Vec::with_capacity(table.columns.len());
        let mut names = Vec::with_capacity(table.columns.len());
        for info in table.public_columns() {
            columns.push(Column::new(self.ctx.alloc_column_id(), info.field_type.clone()).with_origin(info.id));
            names.push(FieldName::table_column(db, &table.name, &table.name, &info.name));
        }
        (Schema::new(columns), names)
    }

    fn build_set_values_of_insert(&mut self, list: &[AstAssignment], plan: &mut InsertPlan) -> PlanResult<()> {
        let table = Arc::clone(&plan.table);
        let mut targets = Vec::with_capacity(list.len());
        for assign in list {
            let idx = find_field_name(&plan.table_names, &assign.column, FIELD_LIST)?
                .ok_or_else(|| PlanError::InvalidValue(format!("Can't find column {}", assign.column)))?;
            let info = column_at(&table, idx)?;
            if info.is_generated() && !matches!(assign.expr, Expr::Default(None)) {
                return Err(PlanError::bad_generated_column(&info.name, &table.name));
            }
            targets.push(idx);
        }

        plan.all_assignments_are_constant = true;
        for (assign, idx) in list.iter().zip(targets) {
            let info = column_at(&table, idx)?;
            plan.columns.push(info.clone());
            if info.is_generated() {
                continue;
            }
            let expr = self.insert_value_expr(&assign.expr, info, plan)?;
            if !expr.is_row_constant() {
                plan.all_assignments_are_constant = false;
            }
            plan.set_list.push(Assignment {
                col: plan.table_schema.columns[idx].clone(),
                col_name: plan.table_names[idx].clone(),
                expr,
            });
        }
        Ok(())
    }

    fn build_values_list_of_insert(
        &mut self,
        stmt: &InsertStmt,
        rows: &[Vec<Expr>],
        plan: &mut InsertPlan,
    ) -> PlanResult<()> {
        let table = Arc::clone(&plan.table);
        let affected = get_affect_cols(stmt, &table)?;

        // `VALUES ()` without a column list inserts a row of defaults.
        let first_len = rows.first().map_or(0, Vec::len);
        if (!stmt.columns.is_empty() || first_len > 0) && first_len != affected.len() {
            return Err(PlanError::WrongValueCountOnRow(1));
        }

        plan.all_assignments_are_constant = true;
        let mut lists = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if i > 0 && rows[i - 1].len() != row.len() {
                return Err(PlanError::WrongValueCountOnRow(i + 1));
            }
            let mut exprs = Vec::with_capacity(row.len());
            for (item, info) in row.iter().zip(&affected) {
                if info.is_generated() {
                    if !matches!(item, Expr::Default(None)) {
                        return Err(PlanError::bad_generated_column(&info.name, &table.name));
                    }
                    // DEFAULT for a generated column has no value expression.
                    plan.all_assignments_are_constant = false;
                    continue;
                }
                let expr = self.insert_value_expr(item, info, plan)?;
                if !expr.is_row_constant() {
                    plan.all_assignments_are_constant = false;
                }
                exprs.push(expr);
            }
            lists.push(exprs);
        }
        plan.columns = affected;
        plan.lists = lists;
        Ok(())
    }

    /// A value of a VALUES or SET list.
    fn insert_value_expr(&mut self, item: &Expr, info: &ColumnInfo, plan: &mut InsertPlan) -> PlanResult<Expression> {
        match item {
            Expr::Default(None) => self.get_default_value(info),
            Expr::Default(Some(name)) => self.find_default_value(&plan.table.columns, name),
            other => {
                if !referenced_column_names(other).is_empty() {
                    plan.need_fill_default_value = true;
                }
                self.rewrite_scalar(other, &plan.table_schema, &plan.table_names)
            }
        }
    }

    fn build_select_plan_of_insert(
        &mut self,
        stmt: &InsertStmt,
        query: &Query,
        plan: &mut InsertPlan,
    ) -> PlanResult<()> {
        let table = Arc::clone(&plan.table);
        let affected = get_affect_cols(stmt, &table)?;
        let select_plan = self.build_query(query)?;
        self.ctx.handle_helper.pop_map();

        if select_plan.schema.len() != affected.len() {
            return Err(PlanError::WrongValueCountOnRow(1));
        }
        if let Some(info) = affected.iter().find(|c| c.is_generated()) {
            return Err(PlanError::bad_generated_column(&info.name, &table.name));
        }

        // The selected row reshaped to the table's column order; target
        // columns the SELECT does not provide get unnamed placeholders.
        let width = plan.table_schema.len();
        let mut new_row: Vec<Option<Column>> = vec![None; width];
        let mut new_names: Vec<FieldName> = vec![FieldName::default(); width];
        for (i, info) in affected.iter().enumerate() {
            let offset = table
                .public_columns()
                .position(|c| c.id == info.id)
                .ok_or_else(|| PlanError::Internal(format!("column {} is not public", info.name)))?;
            let mut col = select_plan.schema.columns[i].clone();
            col.ret_type = info.field_type.clone();
            new_row[offset] = Some(col);
            new_names[offset] = select_plan.names[i].clone();
        }
        let new_row: Vec<Column> = new_row
            .into_iter()
            .zip(&plan.table_schema.columns)
            .map(|(slot, table_col)| {
                slot.unwrap_or_else(|| Column::new(self.ctx.alloc_column_id(), table_col.ret_type.clone()))
            })
            .collect();

        plan.schema_for_on_duplicate = Schema::merge(&plan.table_schema, &Schema::new(new_row));
        plan.names_for_on_duplicate = plan.table_names.iter().cloned().chain(new_names).collect();
        plan.need_fill_default_value = affected.len() != width;
        plan.columns = affected;
        plan.select_plan = Some(select_plan);
        Ok(())
    }

    fn build_on_duplicate(&mut self, list: &[AstAssignment], plan: &InsertPlan) -> PlanResult<Vec<Assignment>> {
        let (schema, names) = if plan.select_plan.is_some() {
            (&plan.schema_for_on_duplicate, plan.names_for_on_duplicate.as_slice())
        } else {
            (&plan.table_schema, plan.table_names.as_slice())
        };
        let mut out = Vec::with_capacity(list.len());
        for assign in list {
            let idx = find_field_name(&plan.table_names, &assign.column, FIELD_LIST)?
                .ok_or_else(|| PlanError::unknown_column(assign.column.to_string(), FIELD_LIST))?;
            let info = column_at(&plan.table, idx)?;
            if info.is_generated() {
                continue;
            }
            let expr = match &assign.expr {
                Expr::Default(None) => self.get_default_value(info)?,
                Expr::Default(Some(name)) => self.find_default_value(&plan.table.columns, name)?,
                other => self.rewrite_scalar(other, schema, names)?,
            };
            out.push(Assignment {
                col: plan.table_schema.columns[idx].clone(),
                col_name: plan.table_names[idx].clone(),
                expr,
            });
        }
        Ok(out)
    }

    /// Compile the expression of every generated column of `table`.
    ///
    /// `schema`/`names` expose the table row. Columns whose dependencies are
    /// assigned by ON DUPLICATE KEY UPDATE (`on_dup_cols`) are re-evaluated
    /// there too.
    pub(crate) fn resolve_generated_columns(
        &mut self,
        table: &TableInfo,
        schema: &Schema,
        names: &[FieldName],
        on_dup_cols: &BTreeSet<String>,
    ) -> PlanResult<InsertGeneratedColumns> {
        let mut out = InsertGeneratedColumns::default();
        for (idx, info) in table.public_columns().enumerate() {
            let Some(gen_expr) = &info.generated_expr else {
                continue;
            };
            for dep in &info.dependences {
                let dep_col = table
                    .find_column(dep)
                    .ok_or_else(|| PlanError::UnknownGeneratedField(dep.clone()))?;
                if dep_col.auto_increment {
                    return Err(PlanError::GeneratedColumnRefAutoInc(info.name.clone()));
                }
            }
            let expr = self
                .rewrite_scalar(gen_expr, schema, names)?
                .cast_to(&info.field_type);
            out.columns.push(names[idx].clone());
            out.exprs.push(expr.clone());
            if info.dependences.iter().any(|d| on_dup_cols.contains(d)) {
                out.on_duplicates.push(Assignment {
                    col: schema.columns[idx].clone(),
                    col_name: names[idx].clone(),
                    expr,
                });
            }
        }
        Ok(out)
    }
}

/// Lower-cased names of the columns ON DUPLICATE KEY UPDATE assigns.
///
/// Generated columns may only be reset to DEFAULT and are left out.
fn resolve_on_duplicate(
    list: &[AstAssignment],
    table: &TableInfo,
    names: &[FieldName],
) -> PlanResult<BTreeSet<String>> {
    let mut cols = BTreeSet::new();
    for assign in list {
        let idx = find_field_name(names, &assign.column, FIELD_LIST)?
            .ok_or_else(|| PlanError::unknown_column(assign.column.to_string(), FIELD_LIST))?;
        let info = column_at(table, idx)?;
        if info.is_generated() {
            if matches!(assign.expr, Expr::Default(None)) {
                continue;
            }
            return Err(PlanError::bad_generated_column(&info.name, &table.name));
        }
        cols.insert(info.name.to_ascii_lowercase());
    }
    Ok(cols)
}

/// Columns an INSERT writes: the explicit list, or every public column.
fn get_affect_cols(stmt: &InsertStmt, table: &TableInfo) -> PlanResult<Vec<ColumnInfo>> {
    if stmt.columns.is_empty() {
        return Ok(table.public_columns().cloned().collect());
    }
    let mut seen = BTreeSet::new();
    let mut cols = Vec::with_capacity(stmt.columns.len());
    for name in &stmt.columns {
        if !seen.insert(name.name.to_ascii_lowercase()) {
            return Err(PlanError::FieldSpecifiedTwice(name.name.clone()));
        }
        let info = find_public_column(table, name)?;
        cols.push(info.clone());
    }
    Ok(cols)
}

fn find_public_column<'t>(table: &'t TableInfo, name: &ColumnName) -> PlanResult<&'t ColumnInfo> {
    table
        .public_columns()
        .find(|c| c.name.eq_ignore_ascii_case(&name.name))
        .ok_or_else(|| PlanError::unknown_column(name.name.clone(), FIELD_LIST))
}

/// The public column at position `idx` of the table row.
fn column_at(table: &TableInfo, idx: usize) -> PlanResult<&ColumnInfo> {
    table
        .public_columns()
        .nth(idx)
        .ok_or_else(|| PlanError::Internal(format!("no column at offset {idx} of {}", table.name)))
}

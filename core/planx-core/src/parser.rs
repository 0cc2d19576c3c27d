//! SQL text front-end.
//!
//! [`SqlParser`] runs the MySQL dialect of `sqlparser` and lowers its tree
//! into [`crate::ast`]. Optimizer hints live in `/*+ ... */` comments, which
//! `sqlparser` discards, so they are recovered by a separate scan of the text
//! and attached to the SELECT block whose keyword they follow.

use crate::ast::{
    AggFunc, Assignment, BinaryOp, ColumnDef, ColumnName, ColumnOption, ConstraintKind,
    CreateTableStmt, CreateViewStmt, DdlStmt, DeleteStmt, ExplainStmt, Expr, HintTable,
    InsertSource, InsertStmt, JoinConstraint, JoinKind, Limit, OptimizerHint, OrderByItem, Query,
    SelectField, SelectLock, SelectStmt, SimpleStmt, Statement, TableConstraint, TableName,
    TableRef, UnaryOp, UnionStmt, UpdateStmt, VariableAssignment,
};
use crate::config::StoreType;
use crate::error::{PlanError, PlanResult};
use crate::logging::BUILDER_TARGET;
use crate::types::{DataType, Datum, FieldType};
use ahash::AHashMap;
use sqlparser::ast as sql;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

/// SQL parser: sqlparser-rs plus lowering into the planner's syntax tree.
pub struct SqlParser {
    dialect: MySqlDialect,
}

impl SqlParser {
    pub fn new() -> Self {
        Self {
            dialect: MySqlDialect {},
        }
    }

    /// Parse without lowering.
    pub fn parse_raw(&self, sql: &str) -> PlanResult<Vec<sql::Statement>> {
        Parser::parse_sql(&self.dialect, sql).map_err(|e| PlanError::SqlParse {
            message: e.to_string(),
            sql: sql.to_string(),
        })
    }

    /// Parse every statement in `sql` and lower it.
    pub fn parse(&self, sql: &str) -> PlanResult<Vec<Statement>> {
        let raw = self.parse_raw(sql)?;
        let mut lowering = Lowering::new(sql);
        raw.iter().map(|stmt| lowering.statement(stmt)).collect()
    }

    /// Parse text that must hold exactly one statement.
    pub fn parse_one(&self, sql: &str) -> PlanResult<Statement> {
        let mut stmts = self.parse(sql)?;
        if stmts.len() != 1 {
            return Err(PlanError::SqlParse {
                message: format!("expected one statement, found {}", stmts.len()),
                sql: sql.to_string(),
            });
        }
        stmts.pop().ok_or_else(|| PlanError::Internal("statement list emptied".into()))
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported(feature: impl Into<String>) -> PlanError {
    PlanError::not_supported(feature, "rewrite the statement or build the syntax tree directly")
}

// ════════════════════════════════════════════
// Lowering
// ════════════════════════════════════════════

/// Per-parse state: hints waiting for their SELECT block, and counters
/// that follow the textual order of SELECT keywords and `?` markers.
struct Lowering<'a> {
    sql: &'a str,
    hints: AHashMap<usize, Vec<OptimizerHint>>,
    next_select: usize,
    next_param: usize,
}

impl<'a> Lowering<'a> {
    fn new(sql: &'a str) -> Self {
        Self {
            sql,
            hints: scan_hints(sql),
            next_select: 0,
            next_param: 0,
        }
    }

    fn statement(&mut self, stmt: &sql::Statement) -> PlanResult<Statement> {
        let lowered = match stmt {
            sql::Statement::Query(query) => Statement::from(self.query(query)?),
            sql::Statement::Insert(insert) => self.insert(insert)?,
            sql::Statement::Update {
                table,
                assignments,
                from,
                selection,
                ..
            } => {
                if from.is_some() {
                    return Err(unsupported("UPDATE ... FROM"));
                }
                let table_refs = self.table_with_joins(table)?;
                let assignments = self.assignments(assignments)?;
                let where_clause = self.opt_expr(selection.as_ref())?;
                Statement::Update(UpdateStmt {
                    table_refs,
                    assignments,
                    where_clause,
                    order_by: Vec::new(),
                    limit: None,
                })
            }
            sql::Statement::Delete(delete) => self.delete(delete)?,
            sql::Statement::SetVariable {
                variables, value, ..
            } => {
                let names: Vec<&sql::ObjectName> = match variables {
                    sql::OneOrManyWithParens::One(name) => vec![name],
                    sql::OneOrManyWithParens::Many(names) => names.iter().collect(),
                };
                if names.len() != value.len() {
                    return Err(unsupported("SET with mismatched variable and value lists"));
                }
                let mut vars = Vec::with_capacity(names.len());
                for (name, value) in names.into_iter().zip(value) {
                    vars.push(variable_assignment(&name.to_string(), self.expr(value)?));
                }
                Statement::Set(vars)
            }
            sql::Statement::Explain {
                analyze,
                statement,
                format,
                ..
            } => {
                let format = match format {
                    None => "row".to_string(),
                    Some(sql::AnalyzeFormat::GRAPHVIZ) => "dot".to_string(),
                    Some(other) => other.to_string().to_ascii_lowercase(),
                };
                Statement::Explain(ExplainStmt {
                    stmt: Box::new(self.statement(statement)?),
                    format,
                    analyze: *analyze,
                })
            }
            sql::Statement::CreateTable(create) => self.create_table(create)?,
            sql::Statement::CreateView {
                name,
                columns,
                query,
                or_replace,
                materialized,
                ..
            } => {
                if *materialized {
                    return Err(unsupported("CREATE MATERIALIZED VIEW"));
                }
                Statement::Ddl(DdlStmt::CreateView(CreateViewStmt {
                    view: table_name(name)?,
                    or_replace: *or_replace,
                    columns: columns.iter().map(|c| c.name.value.clone()).collect(),
                    select: Box::new(self.query(query)?),
                }))
            }
            sql::Statement::CreateDatabase {
                db_name,
                if_not_exists,
                ..
            } => Statement::Ddl(DdlStmt::CreateDatabase {
                name: db_name.to_string(),
                if_not_exists: *if_not_exists,
            }),
            sql::Statement::CreateIndex(index) => {
                let name = index
                    .name
                    .as_ref()
                    .map(|n| n.to_string())
                    .ok_or_else(|| unsupported("CREATE INDEX without a name"))?;
                let columns = index
                    .columns
                    .iter()
                    .map(|c| match &c.expr {
                        sql::Expr::Identifier(ident) => Ok(ident.value.clone()),
                        other => Err(unsupported(format!("expression index on {other}"))),
                    })
                    .collect::<PlanResult<Vec<_>>>()?;
                Statement::Ddl(DdlStmt::CreateIndex {
                    name,
                    table: table_name(&index.table_name)?,
                    columns,
                    unique: index.unique,
                })
            }
            sql::Statement::AlterTable {
                name, operations, ..
            } => {
                let mut add_columns = Vec::new();
                let mut drop_columns = Vec::new();
                for op in operations {
                    match op {
                        sql::AlterTableOperation::AddColumn { column_def, .. } => {
                            add_columns.push(self.column_def(column_def)?)
                        }
                        sql::AlterTableOperation::DropColumn { column_name, .. } => {
                            drop_columns.push(column_name.value.clone())
                        }
                        other => return Err(unsupported(format!("ALTER TABLE operation: {other}"))),
                    }
                }
                Statement::Ddl(DdlStmt::AlterTable {
                    table: table_name(name)?,
                    add_columns,
                    drop_columns,
                })
            }
            sql::Statement::Drop {
                object_type,
                if_exists,
                names,
                ..
            } => match object_type.to_string().as_str() {
                "TABLE" | "VIEW" => Statement::Ddl(DdlStmt::DropTable {
                    tables: names.iter().map(table_name).collect::<PlanResult<_>>()?,
                    if_exists: *if_exists,
                }),
                "DATABASE" | "SCHEMA" => {
                    let [name] = names.as_slice() else {
                        return Err(unsupported("DROP DATABASE with several names"));
                    };
                    Statement::Ddl(DdlStmt::DropDatabase {
                        name: name.to_string(),
                        if_exists: *if_exists,
                    })
                }
                other => return Err(unsupported(format!("DROP {other}"))),
            },
            sql::Statement::Use { .. } => {
                // `USE db` prints back as `USE db`; the name is the last word.
                let text = stmt.to_string();
                let db = text
                    .split_whitespace()
                    .last()
                    .unwrap_or_default()
                    .trim_matches('`')
                    .to_string();
                Statement::Simple(SimpleStmt::Use { db })
            }
            sql::Statement::StartTransaction { .. } => Statement::Simple(SimpleStmt::Begin),
            sql::Statement::Commit { .. } => Statement::Simple(SimpleStmt::Commit),
            sql::Statement::Rollback { .. } => Statement::Simple(SimpleStmt::Rollback),
            sql::Statement::Deallocate { name, .. } => Statement::Deallocate {
                name: name.to_string(),
            },
            sql::Statement::Kill { modifier, id, .. } => Statement::Simple(SimpleStmt::Kill {
                connection_id: *id,
                query: matches!(modifier, Some(sql::KillType::Query)),
            }),
            other => {
                let text = other.to_string();
                let head: String = text.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
                return Err(unsupported(format!("statement: {head}")));
            }
        };
        debug!(target: BUILDER_TARGET, kind = lowered.kind_name(), "lowered statement");
        Ok(lowered)
    }

    // ---- queries ----

    fn query(&mut self, query: &sql::Query) -> PlanResult<Query> {
        if query.with.is_some() {
            return Err(unsupported("WITH clause"));
        }
        let mut body = self.set_expr(&query.body)?;
        let order_by = match &query.order_by {
            Some(order_by) => self.order_by(&order_by.exprs)?,
            None => Vec::new(),
        };
        let limit = limit(query.limit.as_ref(), query.offset.as_ref().map(|o| &o.value))?;
        let lock = select_lock(&query.locks)?;
        match &mut body {
            Query::Select(select) => {
                if !order_by.is_empty() {
                    select.order_by = order_by;
                }
                if limit.is_some() {
                    select.limit = limit;
                }
                if lock != SelectLock::None {
                    select.lock = lock;
                }
            }
            Query::Union(union) => {
                if lock != SelectLock::None {
                    return Err(unsupported("locking clause on UNION"));
                }
                if !order_by.is_empty() {
                    union.order_by = order_by;
                }
                if limit.is_some() {
                    union.limit = limit;
                }
            }
        }
        Ok(body)
    }

    fn set_expr(&mut self, body: &sql::SetExpr) -> PlanResult<Query> {
        match body {
            sql::SetExpr::Select(select) => Ok(Query::Select(Box::new(self.select(select)?))),
            sql::SetExpr::Query(query) => self.query(query),
            sql::SetExpr::SetOperation {
                op: sql::SetOperator::Union,
                ..
            } => {
                let mut selects = Vec::new();
                let mut all = true;
                self.union_arms(body, &mut selects, &mut all)?;
                Ok(Query::Union(Box::new(UnionStmt {
                    selects,
                    all,
                    order_by: Vec::new(),
                    limit: None,
                })))
            }
            sql::SetExpr::SetOperation { op, .. } => Err(unsupported(format!("set operation {op}"))),
            other => Err(unsupported(format!("query body {other}"))),
        }
    }

    /// Flatten a left-deep UNION chain into its SELECT blocks.
    fn union_arms(&mut self, body: &sql::SetExpr, selects: &mut Vec<SelectStmt>, all: &mut bool) -> PlanResult<()> {
        match body {
            sql::SetExpr::SetOperation {
                op: sql::SetOperator::Union,
                set_quantifier,
                left,
                right,
            } => {
                if !matches!(set_quantifier, sql::SetQuantifier::All) {
                    *all = false;
                }
                self.union_arms(left, selects, all)?;
                self.union_arms(right, selects, all)
            }
            other => {
                match self.set_expr(other)? {
                    Query::Select(select) => selects.push(*select),
                    Query::Union(union) => {
                        *all &= union.all;
                        selects.extend(union.selects);
                    }
                }
                Ok(())
            }
        }
    }

    fn select(&mut self, select: &sql::Select) -> PlanResult<SelectStmt> {
        let ordinal = self.next_select;
        self.next_select += 1;
        let hints = self.hints.remove(&ordinal).unwrap_or_default();

        let distinct = match &select.distinct {
            None => false,
            Some(sql::Distinct::Distinct) => true,
            Some(sql::Distinct::On(_)) => return Err(unsupported("DISTINCT ON")),
        };

        let mut fields = Vec::with_capacity(select.projection.len());
        for item in &select.projection {
            fields.push(match item {
                sql::SelectItem::UnnamedExpr(expr) => SelectField::Expr {
                    expr: self.expr(expr)?,
                    alias: None,
                },
                sql::SelectItem::ExprWithAlias { expr, alias } => SelectField::Expr {
                    expr: self.expr(expr)?,
                    alias: Some(alias.value.clone()),
                },
                sql::SelectItem::Wildcard(_) => SelectField::Wildcard(None),
                sql::SelectItem::QualifiedWildcard(name, _) => SelectField::Wildcard(Some(table_name(name)?)),
            });
        }

        let from = self.from(&select.from)?;
        let where_clause = self.opt_expr(select.selection.as_ref())?;
        let group_by = match &select.group_by {
            sql::GroupByExpr::Expressions(exprs, modifiers) => {
                if !modifiers.is_empty() {
                    return Err(unsupported("GROUP BY modifiers"));
                }
                self.exprs(exprs)?
            }
            sql::GroupByExpr::All(_) => return Err(unsupported("GROUP BY ALL")),
        };
        let having = self.opt_expr(select.having.as_ref())?;

        Ok(SelectStmt {
            distinct,
            fields,
            from,
            where_clause,
            group_by,
            having,
            order_by: Vec::new(),
            limit: None,
            lock: SelectLock::None,
            hints,
        })
    }

    fn order_by(&mut self, items: &[sql::OrderByExpr]) -> PlanResult<Vec<OrderByItem>> {
        items
            .iter()
            .map(|item| {
                Ok(OrderByItem {
                    expr: self.expr(&item.expr)?,
                    desc: item.asc == Some(false),
                })
            })
            .collect()
    }

    // ---- table references ----

    /// Comma-separated FROM items become cross joins.
    fn from(&mut self, tables: &[sql::TableWithJoins]) -> PlanResult<Option<TableRef>> {
        let mut result: Option<TableRef> = None;
        for table in tables {
            let right = self.table_with_joins(table)?;
            result = Some(match result {
                None => right,
                Some(left) => TableRef::Join {
                    left: Box::new(left),
                    right: Box::new(right),
                    kind: JoinKind::Cross,
                    constraint: JoinConstraint::None,
                },
            });
        }
        Ok(result)
    }

    fn table_with_joins(&mut self, table: &sql::TableWithJoins) -> PlanResult<TableRef> {
        let mut left = self.table_factor(&table.relation)?;
        for join in &table.joins {
            let right = self.table_factor(&join.relation)?;
            let (kind, constraint) = match &join.join_operator {
                sql::JoinOperator::Inner(c) => (JoinKind::Inner, self.join_constraint(c)?),
                sql::JoinOperator::LeftOuter(c) => (JoinKind::LeftOuter, self.join_constraint(c)?),
                sql::JoinOperator::RightOuter(c) => (JoinKind::RightOuter, self.join_constraint(c)?),
                sql::JoinOperator::CrossJoin => (JoinKind::Cross, JoinConstraint::None),
                other => return Err(unsupported(format!("join type {other:?}"))),
            };
            left = TableRef::Join {
                left: Box::new(left),
                right: Box::new(right),
                kind,
                constraint,
            };
        }
        Ok(left)
    }

    fn join_constraint(&mut self, constraint: &sql::JoinConstraint) -> PlanResult<JoinConstraint> {
        Ok(match constraint {
            sql::JoinConstraint::On(expr) => JoinConstraint::On(self.expr(expr)?),
            sql::JoinConstraint::Using(cols) => {
                JoinConstraint::Using(cols.iter().map(|c| c.to_string().trim_matches('`').to_string()).collect())
            }
            sql::JoinConstraint::None => JoinConstraint::None,
            sql::JoinConstraint::Natural => return Err(unsupported("NATURAL JOIN")),
        })
    }

    fn table_factor(&mut self, factor: &sql::TableFactor) -> PlanResult<TableRef> {
        match factor {
            sql::TableFactor::Table {
                name,
                alias,
                partitions,
                ..
            } => Ok(TableRef::Table {
                name: table_name(name)?,
                alias: alias.as_ref().map(|a| a.name.value.clone()),
                // The pinned parser has no syntax for index hints.
                index_hints: Vec::new(),
                partitions: partitions.iter().map(|p| p.value.clone()).collect(),
            }),
            sql::TableFactor::Derived { subquery, alias, .. } => {
                let Some(alias) = alias else {
                    return Err(PlanError::SqlParse {
                        message: "Every derived table must have its own alias".into(),
                        sql: self.sql.to_string(),
                    });
                };
                Ok(TableRef::Derived {
                    query: Box::new(self.query(subquery)?),
                    alias: alias.name.value.clone(),
                })
            }
            sql::TableFactor::NestedJoin { table_with_joins, .. } => self.table_with_joins(table_with_joins),
            other => Err(unsupported(format!("table reference {other}"))),
        }
    }

    // ---- DML ----

    fn insert(&mut self, insert: &sql::Insert) -> PlanResult<Statement> {
        let table = table_name(&insert.table_name)?;
        let columns = insert.columns.iter().map(|c| ColumnName::new(c.value.clone())).collect();
        let Some(source) = &insert.source else {
            return Err(unsupported("INSERT without VALUES or SELECT"));
        };
        let source = match source.body.as_ref() {
            sql::SetExpr::Values(values) => {
                let mut rows = Vec::with_capacity(values.rows.len());
                for row in &values.rows {
                    rows.push(self.exprs(row)?);
                }
                InsertSource::Values(rows)
            }
            _ => InsertSource::Select(Box::new(self.query(source)?)),
        };
        let on_duplicate = match &insert.on {
            None => Vec::new(),
            Some(sql::OnInsert::DuplicateKeyUpdate(assignments)) => self.assignments(assignments)?,
            Some(other) => return Err(unsupported(format!("INSERT {other}"))),
        };
        Ok(Statement::Insert(InsertStmt {
            is_replace: insert.replace_into,
            table,
            columns,
            source,
            on_duplicate,
        }))
    }

    fn delete(&mut self, delete: &sql::Delete) -> PlanResult<Statement> {
        let from = match &delete.from {
            sql::FromTable::WithFromKeyword(tables) | sql::FromTable::WithoutKeyword(tables) => tables,
        };
        let (table_refs, targets) = match &delete.using {
            // DELETE FROM t1 USING t1 JOIN t2
            Some(using) => {
                let targets = from
                    .iter()
                    .map(|t| match &t.relation {
                        sql::TableFactor::Table { name, .. } => table_name(name),
                        other => Err(unsupported(format!("DELETE target {other}"))),
                    })
                    .collect::<PlanResult<Vec<_>>>()?;
                (self.from(using)?, targets)
            }
            None => {
                let targets = delete.tables.iter().map(table_name).collect::<PlanResult<Vec<_>>>()?;
                (self.from(from)?, targets)
            }
        };
        let table_refs = table_refs.ok_or_else(|| unsupported("DELETE without a table"))?;
        let where_clause = self.opt_expr(delete.selection.as_ref())?;
        let order_by = self.order_by(&delete.order_by)?;
        let limit = limit(delete.limit.as_ref(), None)?;
        Ok(Statement::Delete(DeleteStmt {
            table_refs,
            targets,
            where_clause,
            order_by,
            limit,
        }))
    }

    fn assignments(&mut self, assignments: &[sql::Assignment]) -> PlanResult<Vec<Assignment>> {
        assignments
            .iter()
            .map(|a| {
                let column = match &a.target {
                    sql::AssignmentTarget::ColumnName(name) => column_name(&name.0)?,
                    sql::AssignmentTarget::Tuple(_) => return Err(unsupported("tuple assignment")),
                };
                Ok(Assignment {
                    column,
                    expr: self.expr(&a.value)?,
                })
            })
            .collect()
    }

    // ---- DDL ----

    fn create_table(&mut self, create: &sql::CreateTable) -> PlanResult<Statement> {
        if create.query.is_some() {
            return Err(unsupported("CREATE TABLE ... AS SELECT"));
        }
        let columns = create
            .columns
            .iter()
            .map(|c| self.column_def(c))
            .collect::<PlanResult<Vec<_>>>()?;
        let mut constraints = Vec::with_capacity(create.constraints.len());
        for constraint in &create.constraints {
            let (kind, name, cols) = match constraint {
                sql::TableConstraint::PrimaryKey { name, columns, .. } => (ConstraintKind::PrimaryKey, name, columns),
                sql::TableConstraint::Unique { name, columns, .. } => (ConstraintKind::Unique, name, columns),
                sql::TableConstraint::Index { name, columns, .. } => (ConstraintKind::Index, name, columns),
                other => return Err(unsupported(format!("table constraint {other}"))),
            };
            constraints.push(TableConstraint {
                kind,
                name: name.as_ref().map(|n| n.value.clone()),
                columns: cols.iter().map(|c| c.value.clone()).collect(),
            });
        }
        Ok(Statement::Ddl(DdlStmt::CreateTable(CreateTableStmt {
            table: table_name(&create.name)?,
            if_not_exists: create.if_not_exists,
            columns,
            constraints,
        })))
    }

    fn column_def(&mut self, def: &sql::ColumnDef) -> PlanResult<ColumnDef> {
        let mut field_type = field_type(&def.data_type)?;
        let mut options = Vec::with_capacity(def.options.len());
        for opt in &def.options {
            match &opt.option {
                sql::ColumnOption::Null => options.push(ColumnOption::Null),
                sql::ColumnOption::NotNull => {
                    field_type.not_null = true;
                    options.push(ColumnOption::NotNull);
                }
                sql::ColumnOption::Default(expr) => options.push(ColumnOption::Default(self.expr(expr)?)),
                sql::ColumnOption::Unique { is_primary: true, .. } => {
                    field_type.not_null = true;
                    options.push(ColumnOption::PrimaryKey);
                }
                sql::ColumnOption::Unique { .. } => options.push(ColumnOption::Unique),
                sql::ColumnOption::Comment(text) => options.push(ColumnOption::Comment(text.clone())),
                sql::ColumnOption::Generated {
                    generation_expr: Some(expr),
                    generation_expr_mode,
                    ..
                } => options.push(ColumnOption::Generated {
                    expr: self.expr(expr)?,
                    stored: matches!(generation_expr_mode, Some(sql::GeneratedExpressionMode::Stored)),
                }),
                sql::ColumnOption::DialectSpecific(_) if opt.option.to_string().eq_ignore_ascii_case("AUTO_INCREMENT") => {
                    options.push(ColumnOption::AutoIncrement)
                }
                other => debug!(target: BUILDER_TARGET, option = %other, "column option ignored"),
            }
        }
        Ok(ColumnDef {
            name: def.name.value.clone(),
            field_type,
            options,
        })
    }

    // ---- expressions ----

    fn opt_expr(&mut self, expr: Option<&sql::Expr>) -> PlanResult<Option<Expr>> {
        expr.map(|e| self.expr(e)).transpose()
    }

    fn exprs(&mut self, exprs: &[sql::Expr]) -> PlanResult<Vec<Expr>> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn boxed(&mut self, expr: &sql::Expr) -> PlanResult<Box<Expr>> {
        Ok(Box::new(self.expr(expr)?))
    }

    fn expr(&mut self, expr: &sql::Expr) -> PlanResult<Expr> {
        Ok(match expr {
            sql::Expr::Identifier(ident) => identifier(ident),
            sql::Expr::CompoundIdentifier(parts) => compound_identifier(parts)?,
            sql::Expr::Value(value) => self.value(value)?,
            sql::Expr::Nested(inner) => self.expr(inner)?,
            sql::Expr::UnaryOp { op, expr } => {
                let op = match op {
                    sql::UnaryOperator::Not => UnaryOp::Not,
                    sql::UnaryOperator::Minus => UnaryOp::Minus,
                    sql::UnaryOperator::Plus => UnaryOp::Plus,
                    sql::UnaryOperator::PGBitwiseNot => UnaryOp::BitNeg,
                    other => return Err(unsupported(format!("unary operator {other}"))),
                };
                Expr::Unary {
                    op,
                    expr: self.boxed(expr)?,
                }
            }
            sql::Expr::BinaryOp { left, op, right } => Expr::Binary {
                op: binary_op(op)?,
                left: self.boxed(left)?,
                right: self.boxed(right)?,
            },
            sql::Expr::IsNull(inner) => Expr::IsNull {
                expr: self.boxed(inner)?,
                negated: false,
            },
            sql::Expr::IsNotNull(inner) => Expr::IsNull {
                expr: self.boxed(inner)?,
                negated: true,
            },
            sql::Expr::InList { expr, list, negated } => Expr::InList {
                expr: self.boxed(expr)?,
                list: self.exprs(list)?,
                negated: *negated,
            },
            sql::Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => Expr::InSubquery {
                expr: self.boxed(expr)?,
                query: Box::new(self.query(subquery)?),
                negated: *negated,
            },
            sql::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => Expr::Between {
                expr: self.boxed(expr)?,
                low: self.boxed(low)?,
                high: self.boxed(high)?,
                negated: *negated,
            },
            sql::Expr::Like {
                negated,
                expr,
                pattern,
                ..
            } => Expr::Like {
                expr: self.boxed(expr)?,
                pattern: self.boxed(pattern)?,
                negated: *negated,
            },
            sql::Expr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => {
                let operand = operand.as_deref().map(|o| self.boxed(o)).transpose()?;
                let mut branches = Vec::with_capacity(conditions.len());
                for (when, then) in conditions.iter().zip(results) {
                    branches.push((self.expr(when)?, self.expr(then)?));
                }
                let else_expr = else_result.as_deref().map(|e| self.boxed(e)).transpose()?;
                Expr::Case {
                    operand,
                    branches,
                    else_expr,
                }
            }
            sql::Expr::Function(func) => self.function(func)?,
            sql::Expr::Subquery(query) => Expr::Subquery(Box::new(self.query(query)?)),
            sql::Expr::Exists { subquery, negated } => Expr::Exists {
                query: Box::new(self.query(subquery)?),
                negated: *negated,
            },
            sql::Expr::Tuple(items) => Expr::Row(self.exprs(items)?),
            other => return Err(unsupported(format!("expression {other}"))),
        })
    }

    fn value(&mut self, value: &sql::Value) -> PlanResult<Expr> {
        Ok(Expr::Value(match value {
            sql::Value::Number(text, _) => number(text)?,
            sql::Value::SingleQuotedString(s) | sql::Value::DoubleQuotedString(s) => Datum::String(s.clone()),
            sql::Value::Boolean(b) => Datum::Int(i64::from(*b)),
            sql::Value::Null => Datum::Null,
            sql::Value::HexStringLiteral(hex) => Datum::Bytes(decode_hex(hex)?),
            sql::Value::Placeholder(_) => {
                let idx = self.next_param;
                self.next_param += 1;
                return Ok(Expr::ParamMarker(idx));
            }
            other => return Err(unsupported(format!("literal {other}"))),
        }))
    }

    fn function(&mut self, func: &sql::Function) -> PlanResult<Expr> {
        if func.over.is_some() {
            return Err(unsupported("window functions"));
        }
        let name = func.name.to_string();
        let mut args = Vec::new();
        let mut distinct = false;
        match &func.args {
            sql::FunctionArguments::None => {}
            sql::FunctionArguments::Subquery(_) => return Err(unsupported("subquery as function arguments")),
            sql::FunctionArguments::List(list) => {
                distinct = matches!(list.duplicate_treatment, Some(sql::DuplicateTreatment::Distinct));
                for arg in &list.args {
                    match arg {
                        sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Expr(e)) => args.push(self.expr(e)?),
                        // count(*)
                        sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Wildcard) => {}
                        other => return Err(unsupported(format!("function argument {other}"))),
                    }
                }
            }
        }

        if name.eq_ignore_ascii_case("default") {
            return match args.as_slice() {
                [Expr::Column(col)] => Ok(Expr::Default(Some(col.clone()))),
                _ => Err(unsupported("DEFAULT() takes one column")),
            };
        }
        if let Some(agg) = AggFunc::from_name(&name) {
            return Ok(Expr::Aggregate {
                func: agg,
                args,
                distinct,
            });
        }
        if distinct {
            return Err(unsupported(format!("DISTINCT in {name}()")));
        }
        Ok(Expr::Function {
            name: name.to_ascii_lowercase(),
            args,
        })
    }
}

// ════════════════════════════════════════════
// Leaf conversions
// ════════════════════════════════════════════

fn table_name(name: &sql::ObjectName) -> PlanResult<TableName> {
    match name.0.as_slice() {
        [table] => Ok(TableName::new(table.value.clone())),
        [schema, table] => Ok(TableName::with_schema(schema.value.clone(), table.value.clone())),
        _ => Err(unsupported(format!("table name {name}"))),
    }
}

fn column_name(parts: &[sql::Ident]) -> PlanResult<ColumnName> {
    match parts {
        [col] => Ok(ColumnName::new(col.value.clone())),
        [table, col] => Ok(ColumnName::qualified(table.value.clone(), col.value.clone())),
        [schema, table, col] => Ok(ColumnName {
            schema: Some(schema.value.clone()),
            table: Some(table.value.clone()),
            name: col.value.clone(),
        }),
        _ => Err(unsupported("column name with more than three parts")),
    }
}

/// `@x` is a user variable, `@@x` a session variable, an unquoted
/// `DEFAULT` the default marker, anything else a column.
fn identifier(ident: &sql::Ident) -> Expr {
    let value = ident.value.as_str();
    if ident.quote_style.is_none() {
        if let Some(name) = value.strip_prefix("@@") {
            return Expr::SystemVar {
                name: name.to_ascii_lowercase(),
                global: false,
            };
        }
        if let Some(name) = value.strip_prefix('@') {
            return Expr::UserVar(name.to_ascii_lowercase());
        }
        if value.eq_ignore_ascii_case("default") {
            return Expr::Default(None);
        }
    }
    Expr::Column(ColumnName::new(value))
}

fn compound_identifier(parts: &[sql::Ident]) -> PlanResult<Expr> {
    if let [scope, name] = parts
        && scope.quote_style.is_none()
        && scope.value.starts_with("@@")
    {
        return Ok(Expr::SystemVar {
            name: name.value.to_ascii_lowercase(),
            global: scope.value.eq_ignore_ascii_case("@@global"),
        });
    }
    Ok(Expr::Column(column_name(parts)?))
}

fn variable_assignment(target: &str, value: Expr) -> VariableAssignment {
    let lower = target.to_ascii_lowercase();
    let (name, is_system, is_global) = if let Some(rest) = lower.strip_prefix("@@global.") {
        (rest.to_string(), true, true)
    } else if let Some(rest) = lower
        .strip_prefix("@@session.")
        .or_else(|| lower.strip_prefix("@@local."))
        .or_else(|| lower.strip_prefix("@@"))
    {
        (rest.to_string(), true, false)
    } else if let Some(rest) = lower.strip_prefix('@') {
        (rest.to_string(), false, false)
    } else {
        (lower.clone(), true, false)
    };
    VariableAssignment {
        name,
        value,
        is_global,
        is_system,
        extend_value: None,
    }
}

fn binary_op(op: &sql::BinaryOperator) -> PlanResult<BinaryOp> {
    use sql::BinaryOperator as B;
    Ok(match op {
        B::And => BinaryOp::And,
        B::Or => BinaryOp::Or,
        B::Xor => BinaryOp::Xor,
        B::Eq => BinaryOp::Eq,
        B::Spaceship => BinaryOp::NullEq,
        B::NotEq => BinaryOp::NotEq,
        B::Lt => BinaryOp::Lt,
        B::LtEq => BinaryOp::LtEq,
        B::Gt => BinaryOp::Gt,
        B::GtEq => BinaryOp::GtEq,
        B::Plus => BinaryOp::Plus,
        B::Minus => BinaryOp::Minus,
        B::Multiply => BinaryOp::Mul,
        B::Divide => BinaryOp::Div,
        B::MyIntegerDivide => BinaryOp::IntDiv,
        B::Modulo => BinaryOp::Mod,
        B::BitwiseAnd => BinaryOp::BitAnd,
        B::BitwiseOr => BinaryOp::BitOr,
        B::BitwiseXor => BinaryOp::BitXor,
        B::PGBitwiseShiftLeft => BinaryOp::ShiftLeft,
        B::PGBitwiseShiftRight => BinaryOp::ShiftRight,
        other => return Err(unsupported(format!("operator {other}"))),
    })
}

/// Integers stay integers; a decimal point makes a decimal, an exponent a
/// double.
fn number(text: &str) -> PlanResult<Datum> {
    if text.contains(['e', 'E']) {
        return text
            .parse::<f64>()
            .map(Datum::Float)
            .map_err(|_| PlanError::InvalidValue(format!("Incorrect number '{text}'")));
    }
    if text.contains('.') {
        return Ok(Datum::Decimal(text.to_string()));
    }
    if let Ok(v) = text.parse::<i64>() {
        return Ok(Datum::Int(v));
    }
    if let Ok(v) = text.parse::<u64>() {
        return Ok(Datum::Uint(v));
    }
    // Out of the 64-bit range: keep it exact.
    Ok(Datum::Decimal(text.to_string()))
}

fn decode_hex(hex: &str) -> PlanResult<Vec<u8>> {
    let padded = if hex.len() % 2 == 1 {
        format!("0{hex}")
    } else {
        hex.to_string()
    };
    (0..padded.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&padded[i..i + 2], 16)
                .map_err(|_| PlanError::InvalidValue(format!("Incorrect hex literal '{hex}'")))
        })
        .collect()
}

fn limit(count: Option<&sql::Expr>, offset: Option<&sql::Expr>) -> PlanResult<Option<Limit>> {
    if count.is_none() && offset.is_none() {
        return Ok(None);
    }
    let count = count.map(extract_u64).transpose()?.unwrap_or(u64::MAX);
    let offset = offset.map(extract_u64).transpose()?.unwrap_or(0);
    Ok(Some(Limit { count, offset }))
}

fn extract_u64(expr: &sql::Expr) -> PlanResult<u64> {
    match expr {
        sql::Expr::Value(sql::Value::Number(n, _)) => n
            .parse::<u64>()
            .map_err(|_| PlanError::InvalidValue(format!("Incorrect arguments to LIMIT: {n}"))),
        other => Err(unsupported(format!("non-literal LIMIT {other}"))),
    }
}

fn select_lock(locks: &[sql::LockClause]) -> PlanResult<SelectLock> {
    match locks {
        [] => Ok(SelectLock::None),
        [lock] => match (&lock.lock_type, &lock.nonblock) {
            (sql::LockType::Update, None) => Ok(SelectLock::ForUpdate),
            (sql::LockType::Update, Some(sql::NonBlock::Nowait)) => Ok(SelectLock::ForUpdateNoWait),
            (sql::LockType::Share, None) => Ok(SelectLock::InShareMode),
            _ => Err(unsupported(format!("locking clause {lock}"))),
        },
        _ => Err(unsupported("several locking clauses")),
    }
}

/// Map a declared SQL type onto the storage types, by its printed form so
/// every spelling of a family (INT, INTEGER, INT(11) UNSIGNED) lands together.
fn field_type(data_type: &sql::DataType) -> PlanResult<FieldType> {
    let text = data_type.to_string().to_ascii_uppercase();
    let (head, args) = match text.split_once('(') {
        Some((head, rest)) => (head, rest.split([',', ')']).next()),
        None => (text.as_str(), None),
    };
    let base = head.split_whitespace().next().unwrap_or_default();
    let tp = match base {
        "TINYINT" | "BOOL" | "BOOLEAN" => DataType::Tiny,
        "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" => DataType::Long,
        "BIGINT" => DataType::LongLong,
        "FLOAT" | "DOUBLE" | "REAL" => DataType::Double,
        "DECIMAL" | "DEC" | "NUMERIC" => DataType::NewDecimal,
        "CHAR" | "CHARACTER" | "VARCHAR" | "NVARCHAR" | "STRING" => DataType::Varchar,
        "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB"
        | "BINARY" | "VARBINARY" => DataType::Blob,
        "DATE" => DataType::Date,
        "DATETIME" | "TIMESTAMP" => DataType::Datetime,
        "JSON" => DataType::Json,
        "BIT" => DataType::Bit,
        _ => return Err(PlanError::UnsupportedType(text.clone())),
    };
    let mut ft = FieldType::new(tp);
    if let Some(flen) = args.and_then(|a| a.trim().parse::<i32>().ok()) {
        ft = ft.with_flen(flen);
    }
    if text.contains("UNSIGNED") {
        ft = ft.with_unsigned();
    }
    Ok(ft)
}

// ════════════════════════════════════════════
// Optimizer hint comments
// ════════════════════════════════════════════

/// Find `/*+ ... */` comments and key them by the ordinal of the SELECT
/// keyword they follow. Comments after any other token are ignored.
fn scan_hints(sql: &str) -> AHashMap<usize, Vec<OptimizerHint>> {
    let mut out: AHashMap<usize, Vec<OptimizerHint>> = AHashMap::new();
    let bytes = sql.as_bytes();
    let mut i = 0;
    let mut selects = 0usize;
    let mut last_word_was_select = false;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
                last_word_was_select = false;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let body_start = i + 2;
                let end = sql[body_start..].find("*/").map_or(bytes.len(), |p| body_start + p);
                if bytes.get(body_start) == Some(&b'+') && last_word_was_select {
                    let hints = parse_hint_body(&sql[body_start + 1..end]);
                    out.entry(selects - 1).or_default().extend(hints);
                }
                i = end + 2;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = sql[i..].find('\n').map_or(bytes.len(), |p| i + p + 1);
            }
            b'#' => {
                i = sql[i..].find('\n').map_or(bytes.len(), |p| i + p + 1);
            }
            c if c.is_ascii_alphanumeric() || c == b'_' || c == b'@' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'@') {
                    i += 1;
                }
                last_word_was_select = sql[start..i].eq_ignore_ascii_case("select");
                if last_word_was_select {
                    selects += 1;
                }
            }
            c if c.is_ascii_whitespace() => i += 1,
            _ => {
                last_word_was_select = false;
                i += 1;
            }
        }
    }
    out
}

/// `NAME(args) NAME(args) ...`
fn parse_hint_body(body: &str) -> Vec<OptimizerHint> {
    let mut hints = Vec::new();
    let mut rest = body.trim_start_matches([' ', '\t', '\n', '\r', ',']);
    while !rest.is_empty() {
        let name_end = rest.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(rest.len());
        let name = &rest[..name_end];
        let after = rest[name_end..].trim_start();
        let Some(args_body) = after.strip_prefix('(') else {
            warn!(target: BUILDER_TARGET, hint = name, "malformed optimizer hint");
            break;
        };
        let Some(close) = args_body.find(')') else {
            warn!(target: BUILDER_TARGET, hint = name, "unterminated optimizer hint");
            break;
        };
        // READ_FROM_STORAGE nests brackets, never parentheses.
        let args = &args_body[..close];
        if name.eq_ignore_ascii_case("READ_FROM_STORAGE") {
            hints.extend(read_from_storage(args));
        } else {
            match hint_from(name, args) {
                Some(hint) => hints.push(hint),
                None => warn!(target: BUILDER_TARGET, hint = name, "unknown optimizer hint ignored"),
            }
        }
        rest = args_body[close + 1..].trim_start_matches([' ', '\t', '\n', '\r', ',']);
    }
    hints
}

fn hint_table(text: &str) -> HintTable {
    // `t@sel_1` names a query block; blocks are matched positionally here.
    let text = text.split('@').next().unwrap_or_default().trim().trim_matches('`');
    match text.split_once('.') {
        Some((db, table)) => HintTable {
            db: Some(db.to_string()),
            table: table.to_string(),
        },
        None => HintTable::new(text),
    }
}

fn hint_list(args: &str) -> Vec<String> {
    args.split(',').map(|s| s.trim().trim_matches('`').to_string()).filter(|s| !s.is_empty()).collect()
}

fn hint_from(name: &str, args: &str) -> Option<OptimizerHint> {
    let upper = name.to_ascii_uppercase();
    let tables = || hint_list(args).iter().map(|t| hint_table(t)).collect::<Vec<_>>();
    let index_hint = || {
        let mut list = hint_list(args);
        if list.is_empty() {
            return None;
        }
        let table = hint_table(&list.remove(0));
        Some((table, list))
    };
    Some(match upper.as_str() {
        "USE_INDEX" => {
            let (table, indexes) = index_hint()?;
            OptimizerHint::UseIndex { table, indexes }
        }
        "FORCE_INDEX" => {
            let (table, indexes) = index_hint()?;
            OptimizerHint::ForceIndex { table, indexes }
        }
        "IGNORE_INDEX" => {
            let (table, indexes) = index_hint()?;
            OptimizerHint::IgnoreIndex { table, indexes }
        }
        "HASH_JOIN" | "TIDB_HJ" => OptimizerHint::HashJoin(tables()),
        "MERGE_JOIN" | "SM_JOIN" | "TIDB_SMJ" => OptimizerHint::MergeJoin(tables()),
        "INL_JOIN" | "TIDB_INLJ" => OptimizerHint::InlJoin(tables()),
        _ => return None,
    })
}

/// `TIFLASH[t1, t2], TIKV[t3]`, one hint per store.
fn read_from_storage(args: &str) -> Vec<OptimizerHint> {
    let mut out = Vec::new();
    let mut rest = args.trim();
    while let Some(open) = rest.find('[') {
        let store_name = rest[..open].trim().trim_start_matches(',').trim();
        let Some(close) = rest[open..].find(']') else {
            break;
        };
        let list = &rest[open + 1..open + close];
        match StoreType::parse(store_name) {
            Some(store) => out.push(OptimizerHint::ReadFromStorage {
                store,
                tables: hint_list(list).iter().map(|t| hint_table(t)).collect(),
            }),
            None => warn!(target: BUILDER_TARGET, store = store_name, "unknown storage in hint"),
        }
        rest = &rest[open + close + 1..];
    }
    out
}

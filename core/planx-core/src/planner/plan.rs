//! Plan trees produced by the builder.
//!
//! Relational statements compile into a [`LogicalPlan`] tree. Everything else
//! (DML wrappers, SET, SHOW-like utilities, DDL passthrough) compiles into
//! one of the [`Plan`] variants, some of which embed a logical subtree.

use crate::ast::{DdlStmt, SelectLock, ShowType, SimpleStmt, TableName};
use crate::catalog::{ColumnInfo, IndexInfo, TableInfo};
use crate::config::StoreType;
use crate::planner::expression::{AggFuncDesc, Assignment, Expression};
use crate::planner::handle_cols::HandleMap;
use crate::planner::hints::AccessPath;
use crate::planner::schema::{Column, FieldName, Schema};
use crate::types::Datum;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Name of the hidden row id column of tables without a handle primary key.
pub const EXTRA_HANDLE_NAME: &str = "_tidb_rowid";

/// Catalog id used for the hidden row id column.
pub const EXTRA_HANDLE_ID: i64 = -1;

// ════════════════════════════════════════════
// Operator payloads
// ════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub table: Arc<TableInfo>,
    pub db_name: String,
    /// Alias the table is visible under, if any.
    pub table_as_name: Option<String>,
    /// Catalog columns in schema order.
    pub columns: Vec<ColumnInfo>,
    pub access_paths: Vec<AccessPath>,
    /// Row handle column in the output schema.
    pub handle_col: Option<Column>,
    /// Physical partitions to read; empty for a non-partitioned table.
    pub partition_ids: Vec<i64>,
    /// Engine requested by a READ_FROM_STORAGE hint.
    pub preferred_store: Option<StoreType>,
}

impl DataSource {
    pub fn alias(&self) -> &str {
        self.table_as_name.as_deref().unwrap_or(&self.table.name)
    }
}

impl Hash for DataSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.id.hash(state);
        self.db_name.hash(state);
        self.table_as_name.hash(state);
        for col in &self.columns {
            col.id.hash(state);
        }
        self.access_paths.hash(state);
        self.handle_col.hash(state);
        self.partition_ids.hash(state);
        self.preferred_store.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    Semi,
    AntiSemi,
    LeftOuterSemi,
    AntiLeftOuterSemi,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner join",
            JoinType::LeftOuter => "left outer join",
            JoinType::RightOuter => "right outer join",
            JoinType::Semi => "semi join",
            JoinType::AntiSemi => "anti semi join",
            JoinType::LeftOuterSemi => "left outer semi join",
            JoinType::AntiLeftOuterSemi => "anti left outer semi join",
        }
    }

    /// Output is the left schema only (plus an auxiliary flag column for the
    /// outer-semi kinds).
    pub fn is_semi(&self) -> bool {
        matches!(
            self,
            JoinType::Semi | JoinType::AntiSemi | JoinType::LeftOuterSemi | JoinType::AntiLeftOuterSemi
        )
    }
}

/// Join algorithms requested by hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JoinPrefer {
    pub hash: bool,
    pub merge: bool,
    pub inl_left: bool,
    pub inl_right: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinInfo {
    pub join_type: JoinType,
    /// `left = right` pairs usable as join keys.
    pub eq_conditions: Vec<(Column, Column)>,
    pub left_conditions: Vec<Expression>,
    pub right_conditions: Vec<Expression>,
    pub other_conditions: Vec<Expression>,
    pub prefer: JoinPrefer,
}

impl JoinInfo {
    pub fn new(join_type: JoinType) -> Self {
        Self {
            join_type,
            eq_conditions: Vec::new(),
            left_conditions: Vec::new(),
            right_conditions: Vec::new(),
            other_conditions: Vec::new(),
            prefer: JoinPrefer::default(),
        }
    }

    /// Sort `conditions` into eq/left/right/other by the columns they read.
    pub fn attach_conditions(&mut self, conditions: Vec<Expression>, left: &Schema, right: &Schema) {
        for cond in conditions {
            if let Some((l, r)) = eq_columns(&cond) {
                if left.contains(l) && right.contains(r) {
                    self.eq_conditions.push((l.clone(), r.clone()));
                    continue;
                }
                if left.contains(r) && right.contains(l) {
                    self.eq_conditions.push((r.clone(), l.clone()));
                    continue;
                }
            }
            let cols = cond.columns();
            if !cols.is_empty() && cols.iter().all(|c| left.contains(c)) {
                self.left_conditions.push(cond);
            } else if !cols.is_empty() && cols.iter().all(|c| right.contains(c)) {
                self.right_conditions.push(cond);
            } else {
                self.other_conditions.push(cond);
            }
        }
    }
}

fn eq_columns(cond: &Expression) -> Option<(&Column, &Column)> {
    let Expression::ScalarFunction(f) = cond else {
        return None;
    };
    if f.name != "eq" {
        return None;
    }
    match (f.args.first()?, f.args.get(1)?) {
        (Expression::Column(l), Expression::Column(r)) => Some((l, r)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByItem {
    pub expr: Expression,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShowContents {
    pub tp: ShowType,
    pub db: String,
    pub table: Option<TableName>,
    pub full: bool,
    pub user: Option<String>,
}

/// One relational operator.
#[derive(Debug, Clone, PartialEq, Hash)]
pub enum LogicalOperator {
    DataSource(Box<DataSource>),
    TableDual {
        row_count: usize,
    },
    Selection {
        conditions: Vec<Expression>,
    },
    Projection {
        exprs: Vec<Expression>,
        /// Evaluate even when no row is read (DO statements).
        calculate_no_delay: bool,
    },
    Aggregation {
        agg_funcs: Vec<AggFuncDesc>,
        group_by: Vec<Expression>,
    },
    Join(JoinInfo),
    /// Join whose right side reads correlated columns of the left.
    Apply {
        join: JoinInfo,
        corr_cols: Vec<Column>,
    },
    MaxOneRow,
    Limit {
        offset: u64,
        count: u64,
    },
    Sort {
        by_items: Vec<ByItem>,
    },
    Union,
    Lock {
        lock: SelectLock,
        handle_cols: HandleMap,
    },
    Show(ShowContents),
    ShowDdlJobs {
        job_number: i64,
    },
}

impl LogicalOperator {
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOperator::DataSource(_) => "DataSource",
            LogicalOperator::TableDual { .. } => "TableDual",
            LogicalOperator::Selection { .. } => "Selection",
            LogicalOperator::Projection { .. } => "Projection",
            LogicalOperator::Aggregation { .. } => "Aggregation",
            LogicalOperator::Join(_) => "Join",
            LogicalOperator::Apply { .. } => "Apply",
            LogicalOperator::MaxOneRow => "MaxOneRow",
            LogicalOperator::Limit { .. } => "Limit",
            LogicalOperator::Sort { .. } => "Sort",
            LogicalOperator::Union => "UnionAll",
            LogicalOperator::Lock { .. } => "Lock",
            LogicalOperator::Show(_) => "Show",
            LogicalOperator::ShowDdlJobs { .. } => "ShowDDLJobs",
        }
    }
}

fn write_exprs<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Operator info shown by EXPLAIN.
impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::DataSource(ds) => write!(f, "table:{}", ds.alias()),
            LogicalOperator::TableDual { row_count } => write!(f, "rows:{row_count}"),
            LogicalOperator::Selection { conditions } => write_exprs(f, conditions),
            LogicalOperator::Projection { exprs, .. } => write_exprs(f, exprs),
            LogicalOperator::Aggregation {
                agg_funcs,
                group_by,
            } => {
                if !group_by.is_empty() {
                    write!(f, "group by:")?;
                    write_exprs(f, group_by)?;
                    write!(f, ", ")?;
                }
                write!(f, "funcs:")?;
                write_exprs(f, agg_funcs)
            }
            LogicalOperator::Join(join) | LogicalOperator::Apply { join, .. } => {
                write!(f, "{}", join.join_type.as_str())?;
                if !join.eq_conditions.is_empty() {
                    write!(f, ", equal:[")?;
                    for (i, (l, r)) in join.eq_conditions.iter().enumerate() {
                        if i > 0 {
                            write!(f, " ")?;
                        }
                        write!(f, "eq({l}, {r})")?;
                    }
                    write!(f, "]")?;
                }
                if !join.other_conditions.is_empty() {
                    write!(f, ", other cond:")?;
                    write_exprs(f, &join.other_conditions)?;
                }
                Ok(())
            }
            LogicalOperator::MaxOneRow | LogicalOperator::Union => Ok(()),
            LogicalOperator::Limit { offset, count } => write!(f, "offset:{offset}, count:{count}"),
            LogicalOperator::Sort { by_items } => {
                for (i, item) in by_items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.expr)?;
                    if item.desc {
                        write!(f, ":desc")?;
                    }
                }
                Ok(())
            }
            LogicalOperator::Lock { lock, .. } => write!(f, "{lock:?}"),
            LogicalOperator::Show(show) => write!(f, "{:?}", show.tp),
            LogicalOperator::ShowDdlJobs { job_number } => write!(f, "jobs:{job_number}"),
        }
    }
}

// ════════════════════════════════════════════
// Logical plan tree
// ════════════════════════════════════════════

/// A relational operator with its inputs and output shape.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalPlan {
    pub op: LogicalOperator,
    pub children: Vec<LogicalPlan>,
    pub schema: Schema,
    /// Parallel to `schema.columns`.
    pub names: Vec<FieldName>,
    /// Set by key derivation: the operator returns at most one row.
    pub max_one_row: bool,
}

impl LogicalPlan {
    pub fn new(
        op: LogicalOperator,
        children: Vec<LogicalPlan>,
        schema: Schema,
        names: Vec<FieldName>,
    ) -> Self {
        debug_assert_eq!(schema.len(), names.len(), "schema and names out of step");
        Self {
            op,
            children,
            schema,
            names,
            max_one_row: false,
        }
    }

    pub fn leaf(op: LogicalOperator, schema: Schema, names: Vec<FieldName>) -> Self {
        Self::new(op, Vec::new(), schema, names)
    }

    /// Wrap `child` in an operator that passes its columns through.
    pub fn unary(op: LogicalOperator, child: LogicalPlan) -> Self {
        let schema = Schema::new(child.schema.columns.clone());
        let names = child.names.clone();
        Self::new(op, vec![child], schema, names)
    }

    /// Single-row dual with no columns.
    pub fn table_dual(row_count: usize) -> Self {
        Self::leaf(LogicalOperator::TableDual { row_count }, Schema::default(), Vec::new())
    }

    pub fn name(&self) -> &'static str {
        self.op.name()
    }

    pub fn child(&self, idx: usize) -> Option<&LogicalPlan> {
        self.children.get(idx)
    }

    /// Count of operators in the tree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(LogicalPlan::node_count).sum::<usize>()
    }

    /// Rows for the `row` explain format, pre-order with the tree drawn in
    /// the id column.
    pub fn explain_rows(&self) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        let mut next_id = 1;
        self.explain_into(&mut rows, "", true, true, &mut next_id);
        rows
    }

    fn explain_into(
        &self,
        rows: &mut Vec<Vec<String>>,
        indent: &str,
        is_last: bool,
        is_root: bool,
        next_id: &mut usize,
    ) {
        let branch = if is_root {
            ""
        } else if is_last {
            "└─"
        } else {
            "├─"
        };
        let id = *next_id;
        *next_id += 1;
        let access = match &self.op {
            LogicalOperator::DataSource(ds) => format!("table:{}", ds.alias()),
            _ => String::new(),
        };
        rows.push(vec![
            format!("{indent}{branch}{}_{id}", self.name()),
            "N/A".to_string(),
            "root".to_string(),
            access,
            self.op.to_string(),
        ]);
        let child_indent = if is_root {
            String::new()
        } else if is_last {
            format!("{indent}  ")
        } else {
            format!("{indent}│ ")
        };
        let n = self.children.len();
        for (i, child) in self.children.iter().enumerate() {
            child.explain_into(rows, &child_indent, i + 1 == n, false, next_id);
        }
    }

    /// The tree in graphviz dot syntax.
    pub fn explain_dot(&self) -> String {
        let mut out = String::from("\ndigraph LogicalPlan {\n");
        let mut next_id = 1;
        self.dot_into(&mut out, &mut next_id);
        out.push_str("}\n");
        out
    }

    fn dot_into(&self, out: &mut String, next_id: &mut usize) -> String {
        let label = format!("{}_{}", self.name(), *next_id);
        *next_id += 1;
        for child in &self.children {
            let child_label = child.dot_into(out, next_id);
            out.push_str(&format!("\"{label}\" -> \"{child_label}\"\n"));
        }
        if self.children.is_empty() {
            out.push_str(&format!("\"{label}\"\n"));
        }
        label
    }
}

// ════════════════════════════════════════════
// Statement plans
// ════════════════════════════════════════════

/// Generated columns of an INSERT target and their compiled expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertGeneratedColumns {
    pub columns: Vec<FieldName>,
    pub exprs: Vec<Expression>,
    /// Generated columns re-evaluated by ON DUPLICATE KEY UPDATE.
    pub on_duplicates: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    pub table: Arc<TableInfo>,
    pub db_name: String,
    /// Affected columns in statement order.
    pub columns: Vec<ColumnInfo>,
    pub table_schema: Schema,
    pub table_names: Vec<FieldName>,
    pub is_replace: bool,
    /// VALUES rows. Generated columns given DEFAULT have no slot, so a row
    /// can be shorter than `columns`.
    pub lists: Vec<Vec<Expression>>,
    pub set_list: Vec<Assignment>,
    pub on_duplicate: Vec<Assignment>,
    pub select_plan: Option<LogicalPlan>,
    pub schema_for_on_duplicate: Schema,
    pub names_for_on_duplicate: Vec<FieldName>,
    pub gen_cols: InsertGeneratedColumns,
    /// Some value reads another column, so defaults must be filled first.
    pub need_fill_default_value: bool,
    pub all_assignments_are_constant: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    pub select_plan: LogicalPlan,
    pub ordered_list: Vec<Assignment>,
    pub tbl_id_to_handle: HandleMap,
    pub tbl_id_to_table: BTreeMap<i64, Arc<TableInfo>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletePlan {
    pub select_plan: LogicalPlan,
    pub is_multi_table: bool,
    pub tbl_id_to_handle: HandleMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarAssignment {
    pub name: String,
    /// `None` for `SET x = DEFAULT`.
    pub expr: Option<Expression>,
    pub is_default: bool,
    pub is_global: bool,
    pub is_system: bool,
    pub extend_value: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExplainPlan {
    /// `None` when EXPLAIN FOR CONNECTION finds a process without a plan.
    pub target: Option<Arc<Plan>>,
    pub format: String,
    pub analyze: bool,
    pub schema: Schema,
    pub names: Vec<FieldName>,
}

impl ExplainPlan {
    /// Rendered result rows for the logical target.
    pub fn rows(&self) -> Vec<Vec<String>> {
        let Some(target) = &self.target else {
            return Vec::new();
        };
        let Plan::Logical(plan) = target.as_ref() else {
            return vec![vec![target.name().to_string()]];
        };
        if self.format.eq_ignore_ascii_case("dot") {
            return vec![vec![plan.explain_dot()]];
        }
        let extra = self.schema.len().saturating_sub(5);
        plan.explain_rows()
            .into_iter()
            .map(|mut row| {
                row.extend(std::iter::repeat_n("N/A".to_string(), extra));
                row
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeOptions {
    pub num_buckets: u64,
    pub cmsketch_width: u64,
    pub cmsketch_depth: u64,
    pub num_samples: u64,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            num_buckets: 256,
            cmsketch_width: 2048,
            cmsketch_depth: 5,
            num_samples: 10_000,
        }
    }
}

/// Columns (and the handle) of one physical table to analyze.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeColumnsTask {
    pub table_name: String,
    pub partition_name: String,
    pub physical_id: i64,
    pub pk_info: Option<ColumnInfo>,
    pub cols_info: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeIndexTask {
    pub table_name: String,
    pub partition_name: String,
    pub physical_id: i64,
    pub index: IndexInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzePlan {
    pub col_tasks: Vec<AnalyzeColumnsTask>,
    pub idx_tasks: Vec<AnalyzeIndexTask>,
    pub opts: AnalyzeOptions,
    pub fast: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitRegionPlan {
    pub table: Arc<TableInfo>,
    pub partition_names: Vec<String>,
    /// `None` splits table rows by handle.
    pub index: Option<IndexInfo>,
    pub lower: Vec<Datum>,
    pub upper: Vec<Datum>,
    pub num: i64,
    pub value_lists: Vec<Vec<Datum>>,
    pub schema: Schema,
    pub names: Vec<FieldName>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdminPlan {
    ShowNextRowId { table: TableName },
    ShowDdl,
    CancelDdlJobs { job_ids: Vec<i64> },
    ShowDdlJobQueries { job_ids: Vec<i64> },
}

/// Output of compiling one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Logical(LogicalPlan),
    Insert(Box<InsertPlan>),
    Update(Box<UpdatePlan>),
    Delete(Box<DeletePlan>),
    Set(Vec<VarAssignment>),
    Execute {
        name: String,
        using_vars: Vec<Expression>,
    },
    Prepare {
        name: String,
        sql_text: String,
    },
    Deallocate {
        name: String,
    },
    Explain(ExplainPlan),
    Analyze(AnalyzePlan),
    SplitRegion(Box<SplitRegionPlan>),
    Admin {
        plan: AdminPlan,
        schema: Schema,
        names: Vec<FieldName>,
    },
    LoadStats {
        path: String,
    },
    Ddl(DdlStmt),
    Simple(SimpleStmt),
}

impl Plan {
    pub fn name(&self) -> &'static str {
        match self {
            Plan::Logical(p) => p.name(),
            Plan::Insert(_) => "Insert",
            Plan::Update(_) => "Update",
            Plan::Delete(_) => "Delete",
            Plan::Set(_) => "Set",
            Plan::Execute { .. } => "Execute",
            Plan::Prepare { .. } => "Prepare",
            Plan::Deallocate { .. } => "Deallocate",
            Plan::Explain(_) => "Explain",
            Plan::Analyze(_) => "Analyze",
            Plan::SplitRegion(_) => "SplitRegion",
            Plan::Admin { .. } => "Admin",
            Plan::LoadStats { .. } => "LoadStats",
            Plan::Ddl(_) => "DDL",
            Plan::Simple(_) => "Simple",
        }
    }

    /// Result-set schema; `None` for statements that return no rows.
    pub fn schema(&self) -> Option<&Schema> {
        match self {
            Plan::Logical(p) => Some(&p.schema),
            Plan::Explain(e) => Some(&e.schema),
            Plan::SplitRegion(s) => Some(&s.schema),
            Plan::Admin { schema, .. } => Some(schema),
            _ => None,
        }
    }

    pub fn names(&self) -> &[FieldName] {
        match self {
            Plan::Logical(p) => &p.names,
            Plan::Explain(e) => &e.names,
            Plan::SplitRegion(s) => &s.names,
            Plan::Admin { names, .. } => names,
            _ => &[],
        }
    }

    pub fn as_logical(&self) -> Option<&LogicalPlan> {
        match self {
            Plan::Logical(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::expression::new_function;
    use crate::types::{DataType, FieldType};

    fn col(id: u64) -> Column {
        Column::new(id, FieldType::new(DataType::Long))
    }

    #[test]
    fn test_attach_conditions() {
        let left = Schema::new(vec![col(1), col(2)]);
        let right = Schema::new(vec![col(3)]);
        let eq = new_function("eq", vec![Expression::Column(col(3)), Expression::Column(col(1))]).unwrap();
        let l = new_function("gt", vec![Expression::Column(col(2)), Expression::constant(Datum::Int(1))]).unwrap();
        let other = new_function("lt", vec![Expression::Column(col(2)), Expression::Column(col(3))]).unwrap();

        let mut join = JoinInfo::new(JoinType::Inner);
        join.attach_conditions(vec![eq, l, other], &left, &right);
        assert_eq!(join.eq_conditions, vec![(col(1), col(3))]);
        assert_eq!(join.left_conditions.len(), 1);
        assert!(join.right_conditions.is_empty());
        assert_eq!(join.other_conditions.len(), 1);
    }

    #[test]
    fn test_explain_rows_tree() {
        let dual = LogicalPlan::table_dual(1);
        let limit = LogicalPlan::new(
            LogicalOperator::Limit { offset: 0, count: 1 },
            vec![dual],
            Schema::default(),
            Vec::new(),
        );
        let rows = limit.explain_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "Limit_1");
        assert_eq!(rows[0][4], "offset:0, count:1");
        assert_eq!(rows[1][0], "└─TableDual_2");
        assert_eq!(limit.node_count(), 2);
        assert!(limit.explain_dot().contains("\"Limit_1\" -> \"TableDual_2\""));
    }
}

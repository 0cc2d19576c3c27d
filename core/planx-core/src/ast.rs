//! Statement syntax tree consumed by the plan builder.
//!
//! The tree is closed: every statement and expression kind the builder knows
//! about is a variant here, so dispatch over it is checked for exhaustiveness.
//! [`crate::parser::SqlParser`] lowers SQL text into it; callers embedding
//! their own front-end can construct it directly.

use crate::config::StoreType;
use crate::types::{Datum, FieldType};
use std::fmt;

// ════════════════════════════════════════════
// Names
// ════════════════════════════════════════════

/// Possibly qualified column reference (`db.tbl.col`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ColumnName {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub name: String,
}

impl ColumnName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: Some(table.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{schema}.")?;
        }
        if let Some(table) = &self.table {
            write!(f, "{table}.")?;
        }
        write!(f, "{}", self.name)
    }
}

/// Possibly qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

// ════════════════════════════════════════════
// Expressions
// ════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    BitNeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Xor,
    Eq,
    NullEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Mul,
    Div,
    IntDiv,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOp {
    /// Builtin function name the operator compiles to.
    pub fn func_name(&self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Eq => "eq",
            BinaryOp::NullEq => "nulleq",
            BinaryOp::NotEq => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::LtEq => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::GtEq => "ge",
            BinaryOp::Plus => "plus",
            BinaryOp::Minus => "minus",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::IntDiv => "intdiv",
            BinaryOp::Mod => "mod",
            BinaryOp::BitAnd => "bitand",
            BinaryOp::BitOr => "bitor",
            BinaryOp::BitXor => "bitxor",
            BinaryOp::ShiftLeft => "leftshift",
            BinaryOp::ShiftRight => "rightshift",
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Eq => "=",
            BinaryOp::NullEq => "<=>",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::IntDiv => "div",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NullEq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }
}

/// Aggregate function names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    GroupConcat,
    FirstRow,
    BitOr,
    BitXor,
    BitAnd,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::GroupConcat => "group_concat",
            AggFunc::FirstRow => "firstrow",
            AggFunc::BitOr => "bit_or",
            AggFunc::BitXor => "bit_xor",
            AggFunc::BitAnd => "bit_and",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "count" => AggFunc::Count,
            "sum" => AggFunc::Sum,
            "avg" => AggFunc::Avg,
            "min" => AggFunc::Min,
            "max" => AggFunc::Max,
            "group_concat" => AggFunc::GroupConcat,
            "bit_or" => AggFunc::BitOr,
            "bit_xor" => AggFunc::BitXor,
            "bit_and" => AggFunc::BitAnd,
            _ => return None,
        })
    }
}

/// Scalar expression syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnName),
    Value(Datum),
    /// `DEFAULT` or `DEFAULT(col)`.
    Default(Option<ColumnName>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// Aggregate call; `count(*)` has no arguments.
    Aggregate {
        func: AggFunc,
        args: Vec<Expr>,
        distinct: bool,
    },
    Subquery(Box<Query>),
    Exists {
        query: Box<Query>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        query: Box<Query>,
        negated: bool,
    },
    UserVar(String),
    SystemVar {
        name: String,
        global: bool,
    },
    ParamMarker(usize),
    Row(Vec<Expr>),
}

impl Expr {
    pub fn col(name: &str) -> Self {
        match name.split_once('.') {
            Some((table, col)) => Expr::Column(ColumnName::qualified(table, col)),
            None => Expr::Column(ColumnName::new(name)),
        }
    }

    pub fn int(v: i64) -> Self {
        Expr::Value(Datum::Int(v))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Value(Datum::String(s.into()))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    /// Whether an aggregate call appears outside any nested subquery.
    pub fn has_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expr::Aggregate { .. }) {
                found = true;
            }
        });
        found
    }

    /// Whether a subquery appears anywhere in the expression.
    pub fn has_subquery(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(
                e,
                Expr::Subquery(_) | Expr::Exists { .. } | Expr::InSubquery { .. }
            ) {
                found = true;
            }
        });
        found
    }

    /// Pre-order visit that does not descend into subqueries.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } => expr.walk(f),
            Expr::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::InList { expr, list, .. } => {
                expr.walk(f);
                list.iter().for_each(|e| e.walk(f));
            }
            Expr::Between { expr, low, high, .. } => {
                expr.walk(f);
                low.walk(f);
                high.walk(f);
            }
            Expr::Like { expr, pattern, .. } => {
                expr.walk(f);
                pattern.walk(f);
            }
            Expr::Case {
                operand,
                branches,
                else_expr,
            } => {
                if let Some(op) = operand {
                    op.walk(f);
                }
                for (when, then) in branches {
                    when.walk(f);
                    then.walk(f);
                }
                if let Some(e) = else_expr {
                    e.walk(f);
                }
            }
            Expr::Function { args, .. } | Expr::Aggregate { args, .. } | Expr::Row(args) => {
                args.iter().for_each(|e| e.walk(f))
            }
            Expr::InSubquery { expr, .. } => expr.walk(f),
            Expr::Column(_)
            | Expr::Value(_)
            | Expr::Default(_)
            | Expr::Subquery(_)
            | Expr::Exists { .. }
            | Expr::UserVar(_)
            | Expr::SystemVar { .. }
            | Expr::ParamMarker(_) => {}
        }
    }

    /// Collect every column name referenced outside subqueries.
    pub fn column_names(&self) -> Vec<&ColumnName> {
        let mut out = Vec::new();
        collect_columns(self, &mut out);
        out
    }
}

fn collect_columns<'a>(expr: &'a Expr, out: &mut Vec<&'a ColumnName>) {
    match expr {
        Expr::Column(c) => out.push(c),
        Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } | Expr::InSubquery { expr, .. } => {
            collect_columns(expr, out)
        }
        Expr::Binary { left, right, .. } => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expr::InList { expr, list, .. } => {
            collect_columns(expr, out);
            list.iter().for_each(|e| collect_columns(e, out));
        }
        Expr::Between { expr, low, high, .. } => {
            collect_columns(expr, out);
            collect_columns(low, out);
            collect_columns(high, out);
        }
        Expr::Like { expr, pattern, .. } => {
            collect_columns(expr, out);
            collect_columns(pattern, out);
        }
        Expr::Case {
            operand,
            branches,
            else_expr,
        } => {
            if let Some(op) = operand {
                collect_columns(op, out);
            }
            for (when, then) in branches {
                collect_columns(when, out);
                collect_columns(then, out);
            }
            if let Some(e) = else_expr {
                collect_columns(e, out);
            }
        }
        Expr::Function { args, .. } | Expr::Aggregate { args, .. } | Expr::Row(args) => {
            args.iter().for_each(|e| collect_columns(e, out))
        }
        _ => {}
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Value(Datum::String(s)) => write!(f, "{s}"),
            Expr::Value(v) => write!(f, "{v}"),
            Expr::Default(None) => write!(f, "DEFAULT"),
            Expr::Default(Some(c)) => write!(f, "DEFAULT({c})"),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "not {expr}"),
                UnaryOp::Minus => write!(f, "-{expr}"),
                UnaryOp::Plus => write!(f, "+{expr}"),
                UnaryOp::BitNeg => write!(f, "~{expr}"),
            },
            Expr::Binary { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::IsNull { expr, negated } => {
                write!(f, "{expr} is {}null", if *negated { "not " } else { "" })
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                write!(f, "{expr} {}in (", if *negated { "not " } else { "" })?;
                write_list(f, list)?;
                write!(f, ")")
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => write!(
                f,
                "{expr} {}between {low} and {high}",
                if *negated { "not " } else { "" }
            ),
            Expr::Like {
                expr,
                pattern,
                negated,
            } => write!(
                f,
                "{expr} {}like {pattern}",
                if *negated { "not " } else { "" }
            ),
            Expr::Case { .. } => write!(f, "case"),
            Expr::Function { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Aggregate {
                func,
                args,
                distinct,
            } => {
                write!(f, "{}(", func.name())?;
                if *distinct {
                    write!(f, "distinct ")?;
                }
                if args.is_empty() {
                    write!(f, "*")?;
                } else {
                    write_list(f, args)?;
                }
                write!(f, ")")
            }
            Expr::Subquery(_) => write!(f, "(subquery)"),
            Expr::Exists { negated, .. } => {
                write!(f, "{}exists (subquery)", if *negated { "not " } else { "" })
            }
            Expr::InSubquery { expr, negated, .. } => write!(
                f,
                "{expr} {}in (subquery)",
                if *negated { "not " } else { "" }
            ),
            Expr::UserVar(name) => write!(f, "@{name}"),
            Expr::SystemVar { name, global } => {
                write!(f, "@@{}{name}", if *global { "global." } else { "" })
            }
            Expr::ParamMarker(_) => write!(f, "?"),
            Expr::Row(items) => {
                write!(f, "row(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
        }
    }
}

// ════════════════════════════════════════════
// Query blocks
// ════════════════════════════════════════════

/// A query block usable as a subquery, derived table or INSERT source.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(Box<SelectStmt>),
    Union(Box<UnionStmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    /// `*` or `tbl.*`.
    Wildcard(Option<TableName>),
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub desc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub count: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectLock {
    #[default]
    None,
    ForUpdate,
    ForUpdateNoWait,
    InShareMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexHintType {
    Use,
    Force,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexHintScope {
    Scan,
    Join,
    OrderBy,
    GroupBy,
}

/// `USE | FORCE | IGNORE INDEX [FOR ...] (names)` attached to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHint {
    pub hint_type: IndexHintType,
    pub scope: IndexHintScope,
    /// `None` for `USE INDEX ()`.
    pub index_names: Option<Vec<String>>,
}

impl IndexHint {
    pub fn scan(hint_type: IndexHintType, names: &[&str]) -> Self {
        Self {
            hint_type,
            scope: IndexHintScope::Scan,
            index_names: Some(names.iter().map(|s| s.to_string()).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HintTable {
    pub db: Option<String>,
    pub table: String,
}

impl HintTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            db: None,
            table: table.into(),
        }
    }
}

/// Comment-embedded optimizer hint (`/*+ ... */`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizerHint {
    UseIndex { table: HintTable, indexes: Vec<String> },
    ForceIndex { table: HintTable, indexes: Vec<String> },
    IgnoreIndex { table: HintTable, indexes: Vec<String> },
    HashJoin(Vec<HintTable>),
    MergeJoin(Vec<HintTable>),
    InlJoin(Vec<HintTable>),
    ReadFromStorage { store: StoreType, tables: Vec<HintTable> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinConstraint {
    None,
    On(Expr),
    Using(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Table {
        name: TableName,
        alias: Option<String>,
        index_hints: Vec<IndexHint>,
        partitions: Vec<String>,
    },
    Derived {
        query: Box<Query>,
        alias: String,
    },
    Join {
        left: Box<TableRef>,
        right: Box<TableRef>,
        kind: JoinKind,
        constraint: JoinConstraint,
    },
}

impl TableRef {
    pub fn table(name: &str) -> Self {
        TableRef::Table {
            name: TableName::new(name),
            alias: None,
            index_hints: Vec::new(),
            partitions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStmt {
    pub distinct: bool,
    pub fields: Vec<SelectField>,
    pub from: Option<TableRef>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
    pub lock: SelectLock,
    pub hints: Vec<OptimizerHint>,
}

impl SelectStmt {
    /// Whether the block aggregates (GROUP BY or an aggregate call).
    pub fn has_aggregation(&self) -> bool {
        if !self.group_by.is_empty() {
            return true;
        }
        let in_fields = self.fields.iter().any(|f| match f {
            SelectField::Expr { expr, .. } => expr.has_aggregate(),
            SelectField::Wildcard(_) => false,
        });
        in_fields
            || self.having.as_ref().is_some_and(Expr::has_aggregate)
            || self.order_by.iter().any(|item| item.expr.has_aggregate())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionStmt {
    pub selects: Vec<SelectStmt>,
    /// `UNION ALL` everywhere when true.
    pub all: bool,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
}

// ════════════════════════════════════════════
// DML
// ════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: ColumnName,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Set(Vec<Assignment>),
    Select(Box<Query>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub is_replace: bool,
    pub table: TableName,
    pub columns: Vec<ColumnName>,
    pub source: InsertSource,
    pub on_duplicate: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table_refs: TableRef,
    pub assignments: Vec<Assignment>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table_refs: TableRef,
    /// Target tables of a multi-table delete; empty for the single-table form.
    pub targets: Vec<TableName>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
}

// ════════════════════════════════════════════
// Utility statements
// ════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShowType {
    Engines,
    Databases,
    Tables,
    TableStatus,
    OpenTables,
    Columns,
    Index,
    Variables,
    Status,
    Warnings,
    Errors,
    Charset,
    Collation,
    CreateTable,
    CreateView,
    CreateDatabase,
    CreateUser,
    Grants,
    ProcessList,
    StatsMeta,
    StatsHistograms,
    StatsBuckets,
    StatsHealthy,
    Profiles,
    MasterStatus,
    Privileges,
    Bindings,
    AnalyzeStatus,
    Builtins,
    Regions,
    Triggers,
    Events,
    ProcedureStatus,
    DrainerStatus,
    PumpStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowStmt {
    pub tp: ShowType,
    pub db: Option<String>,
    pub table: Option<TableName>,
    pub full: bool,
    pub user: Option<String>,
    pub pattern: Option<String>,
    pub where_clause: Option<Expr>,
}

impl ShowStmt {
    pub fn new(tp: ShowType) -> Self {
        Self {
            tp,
            db: None,
            table: None,
            full: false,
            user: None,
            pattern: None,
            where_clause: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableAssignment {
    pub name: String,
    pub value: Expr,
    pub is_global: bool,
    pub is_system: bool,
    /// Collation for `SET NAMES ... COLLATE ...`.
    pub extend_value: Option<Datum>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrepareStmt {
    pub name: String,
    pub sql_text: Option<String>,
    pub sql_var: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExplainStmt {
    pub stmt: Box<Statement>,
    pub format: String,
    pub analyze: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyzeOptionType {
    NumBuckets,
    CmSketchWidth,
    CmSketchDepth,
    NumSamples,
}

impl AnalyzeOptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzeOptionType::NumBuckets => "BUCKETS",
            AnalyzeOptionType::CmSketchWidth => "CMSKETCH WIDTH",
            AnalyzeOptionType::CmSketchDepth => "CMSKETCH DEPTH",
            AnalyzeOptionType::NumSamples => "SAMPLES",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzeOpt {
    pub tp: AnalyzeOptionType,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyzeTableStmt {
    pub tables: Vec<TableName>,
    pub partitions: Vec<String>,
    pub index_names: Vec<String>,
    /// `ANALYZE TABLE t INDEX [...]`.
    pub index_flag: bool,
    pub incremental: bool,
    pub options: Vec<AnalyzeOpt>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplitOption {
    pub lower: Vec<Expr>,
    pub upper: Vec<Expr>,
    pub num: i64,
    pub value_lists: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitRegionStmt {
    pub table: TableName,
    pub index_name: Option<String>,
    pub partitions: Vec<String>,
    pub split_opt: SplitOption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminType {
    ShowNextRowId,
    ShowDdl,
    ShowDdlJobs,
    CancelDdlJobs,
    ShowDdlJobQueries,
    CheckTable,
    RecoverIndex,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminStmt {
    pub tp: AdminType,
    pub tables: Vec<TableName>,
    pub job_ids: Vec<i64>,
    pub job_number: i64,
    pub where_clause: Option<Expr>,
}

impl AdminStmt {
    pub fn new(tp: AdminType) -> Self {
        Self {
            tp,
            tables: Vec::new(),
            job_ids: Vec::new(),
            job_number: 0,
            where_clause: None,
        }
    }
}

// ════════════════════════════════════════════
// DDL
// ════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnOption {
    PrimaryKey,
    NotNull,
    Null,
    AutoIncrement,
    Unique,
    Default(Expr),
    Generated { expr: Expr, stored: bool },
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub field_type: FieldType,
    pub options: Vec<ColumnOption>,
}

impl ColumnDef {
    pub fn generated_expr(&self) -> Option<&Expr> {
        self.options.iter().find_map(|opt| match opt {
            ColumnOption::Generated { expr, .. } => Some(expr),
            _ => None,
        })
    }

    pub fn is_auto_increment(&self) -> bool {
        self.options.contains(&ColumnOption::AutoIncrement)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Index,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableConstraint {
    pub kind: ConstraintKind,
    pub name: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub table: TableName,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateViewStmt {
    pub view: TableName,
    pub or_replace: bool,
    /// Explicit column list; empty means "take the select's names".
    pub columns: Vec<String>,
    pub select: Box<Query>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DdlStmt {
    CreateDatabase { name: String, if_not_exists: bool },
    DropDatabase { name: String, if_exists: bool },
    /// `name: None` alters the session's current database.
    AlterDatabase { name: Option<String> },
    CreateTable(CreateTableStmt),
    DropTable { tables: Vec<TableName>, if_exists: bool },
    TruncateTable(TableName),
    RenameTable { from: TableName, to: TableName },
    AlterTable {
        table: TableName,
        add_columns: Vec<ColumnDef>,
        drop_columns: Vec<String>,
    },
    CreateIndex {
        name: String,
        table: TableName,
        columns: Vec<String>,
        unique: bool,
    },
    DropIndex { name: String, table: TableName },
    CreateView(CreateViewStmt),
}

// ════════════════════════════════════════════
// Simple statements
// ════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantLevelType {
    Global,
    Db,
    Table,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantLevel {
    pub level: GrantLevelType,
    pub db: Option<String>,
    pub table: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimpleStmt {
    Use { db: String },
    Begin,
    Commit,
    Rollback,
    Flush,
    Grant {
        privileges: Vec<String>,
        level: GrantLevel,
        users: Vec<String>,
    },
    Revoke {
        privileges: Vec<String>,
        level: GrantLevel,
        users: Vec<String>,
    },
    CreateUser { users: Vec<String> },
    DropUser { users: Vec<String> },
    AlterUser { users: Vec<String> },
    SetPassword { user: Option<String> },
    Kill { connection_id: u64, query: bool },
    DropStats { table: TableName },
    GrantRole { roles: Vec<String>, users: Vec<String> },
    RevokeRole { roles: Vec<String>, users: Vec<String> },
    SetRole { roles: Vec<String> },
    SetDefaultRole { roles: Vec<String>, users: Vec<String> },
    Shutdown,
}

// ════════════════════════════════════════════
// Statements
// ════════════════════════════════════════════

/// Top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStmt),
    Union(UnionStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Show(ShowStmt),
    Set(Vec<VariableAssignment>),
    Do(Vec<Expr>),
    Execute { name: String, using_vars: Vec<Expr> },
    Prepare(PrepareStmt),
    Deallocate { name: String },
    Explain(ExplainStmt),
    ExplainFor { connection_id: u64, format: String },
    Analyze(AnalyzeTableStmt),
    SplitRegion(SplitRegionStmt),
    Admin(AdminStmt),
    LoadStats { path: String },
    Ddl(DdlStmt),
    Simple(SimpleStmt),
    /// Parsed but never planned here; rejected by the builder.
    LoadData { path: String, table: TableName },
    /// Parsed but never planned here; rejected by the builder.
    Trace(Box<Statement>),
}

impl Statement {
    /// Node type name used in "unsupported" diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Select(_) => "SelectStmt",
            Statement::Union(_) => "UnionStmt",
            Statement::Insert(_) => "InsertStmt",
            Statement::Update(_) => "UpdateStmt",
            Statement::Delete(_) => "DeleteStmt",
            Statement::Show(_) => "ShowStmt",
            Statement::Set(_) => "SetStmt",
            Statement::Do(_) => "DoStmt",
            Statement::Execute { .. } => "ExecuteStmt",
            Statement::Prepare(_) => "PrepareStmt",
            Statement::Deallocate { .. } => "DeallocateStmt",
            Statement::Explain(_) => "ExplainStmt",
            Statement::ExplainFor { .. } => "ExplainForStmt",
            Statement::Analyze(_) => "AnalyzeTableStmt",
            Statement::SplitRegion(_) => "SplitRegionStmt",
            Statement::Admin(_) => "AdminStmt",
            Statement::LoadStats { .. } => "LoadStatsStmt",
            Statement::Ddl(_) => "DDLStmt",
            Statement::Simple(_) => "SimpleStmt",
            Statement::LoadData { .. } => "LoadDataStmt",
            Statement::Trace(_) => "TraceStmt",
        }
    }
}

impl From<Query> for Statement {
    fn from(q: Query) -> Self {
        match q {
            Query::Select(s) => Statement::Select(*s),
            Query::Union(u) => Statement::Union(*u),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_display() {
        let e = Expr::Aggregate {
            func: AggFunc::Sum,
            args: vec![Expr::col("a")],
            distinct: false,
        };
        assert_eq!(e.to_string(), "sum(a)");

        let e = Expr::eq(Expr::col("t.a"), Expr::int(10));
        assert_eq!(e.to_string(), "t.a = 10");
    }

    #[test]
    fn test_has_aggregate_skips_subquery() {
        let sub = Query::Select(Box::new(SelectStmt {
            fields: vec![SelectField::Expr {
                expr: Expr::Aggregate {
                    func: AggFunc::Count,
                    args: vec![],
                    distinct: false,
                },
                alias: None,
            }],
            ..Default::default()
        }));
        let e = Expr::Subquery(Box::new(sub));
        assert!(!e.has_aggregate());
        assert!(e.has_subquery());
    }

    #[test]
    fn test_column_names() {
        let e = Expr::binary(
            BinaryOp::Plus,
            Expr::col("a"),
            Expr::Function {
                name: "abs".into(),
                args: vec![Expr::col("t.b")],
            },
        );
        let names: Vec<String> = e.column_names().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["a", "t.b"]);
    }
}

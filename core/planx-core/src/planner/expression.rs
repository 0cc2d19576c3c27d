//! Resolved scalar expressions.
//!
//! Unlike [`crate::ast::Expr`], every column here is bound to a [`Column`] of
//! some input schema and every node carries its result type.

use crate::ast::AggFunc;
use crate::error::{PlanError, PlanResult};
use crate::planner::schema::{Column, FieldName};
use crate::types::{DataType, Datum, FieldType};
use std::fmt;

/// Functions a generated column expression may not call.
pub const GENERATED_COLUMN_DISALLOWED_FUNCS: &[&str] = &[
    "connection_id",
    "current_user",
    "database",
    "found_rows",
    "get_lock",
    "is_free_lock",
    "is_used_lock",
    "last_insert_id",
    "load_file",
    "master_pos_wait",
    "rand",
    "release_lock",
    "row_count",
    "schema",
    "session_user",
    "sleep",
    "system_user",
    "user",
    "uuid",
    "uuid_short",
    "curdate",
    "current_date",
    "current_time",
    "current_timestamp",
    "curtime",
    "localtime",
    "localtimestamp",
    "now",
    "sysdate",
    "unix_timestamp",
    "utc_date",
    "utc_time",
    "utc_timestamp",
];

pub fn is_disallowed_in_generated_column(name: &str) -> bool {
    GENERATED_COLUMN_DISALLOWED_FUNCS
        .iter()
        .any(|f| f.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constant {
    pub value: Datum,
    pub ret_type: FieldType,
    /// Set for `?` placeholders of prepared statements.
    pub param_marker: Option<usize>,
}

impl Constant {
    pub fn new(value: Datum) -> Self {
        Self {
            ret_type: value.field_type(),
            value,
            param_marker: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScalarFunction {
    pub name: String,
    pub args: Vec<Expression>,
    pub ret_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    Column(Column),
    /// A column of an enclosing query block.
    CorrelatedColumn(Column),
    Constant(Constant),
    ScalarFunction(ScalarFunction),
}

impl Expression {
    pub fn constant(value: Datum) -> Self {
        Expression::Constant(Constant::new(value))
    }

    pub fn null() -> Self {
        Self::constant(Datum::Null)
    }

    pub fn ret_type(&self) -> &FieldType {
        match self {
            Expression::Column(c) | Expression::CorrelatedColumn(c) => &c.ret_type,
            Expression::Constant(c) => &c.ret_type,
            Expression::ScalarFunction(f) => &f.ret_type,
        }
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Expression::Column(c) => Some(c),
            _ => None,
        }
    }

    /// Constant or correlated column: fixed for any one row of the block.
    pub fn is_row_constant(&self) -> bool {
        matches!(
            self,
            Expression::Constant(_) | Expression::CorrelatedColumn(_)
        )
    }

    /// Every non-correlated column the expression reads.
    pub fn columns(&self) -> Vec<&Column> {
        let mut out = Vec::new();
        self.collect(&mut out, false);
        out
    }

    pub fn correlated_columns(&self) -> Vec<&Column> {
        let mut out = Vec::new();
        self.collect(&mut out, true);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Column>, correlated: bool) {
        match self {
            Expression::Column(c) if !correlated => out.push(c),
            Expression::CorrelatedColumn(c) if correlated => out.push(c),
            Expression::ScalarFunction(f) => f.args.iter().for_each(|a| a.collect(out, correlated)),
            _ => {}
        }
    }

    /// Wrap in a cast unless the type already matches.
    pub fn cast_to(self, ft: &FieldType) -> Expression {
        if self.ret_type().tp == ft.tp {
            return self;
        }
        Expression::ScalarFunction(ScalarFunction {
            name: "cast".to_string(),
            args: vec![self],
            ret_type: ft.clone(),
        })
    }

    /// `(column, other)` when this is `column = other` in either orientation.
    pub fn as_column_eq(&self) -> Option<(&Column, &Expression)> {
        let Expression::ScalarFunction(f) = self else {
            return None;
        };
        if f.name != "eq" || f.args.len() != 2 {
            return None;
        }
        match (&f.args[0], &f.args[1]) {
            (Expression::Column(c), other) => Some((c, other)),
            (other, Expression::Column(c)) => Some((c, other)),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Column(c) => write!(f, "{c}"),
            Expression::CorrelatedColumn(c) => write!(f, "{c}(corr)"),
            Expression::Constant(c) => match &c.param_marker {
                Some(idx) => write!(f, "?{idx}"),
                None => write!(f, "{}", c.value),
            },
            Expression::ScalarFunction(func) => {
                write!(f, "{}(", func.name)?;
                for (i, arg) in func.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

fn bool_type() -> FieldType {
    FieldType::new(DataType::LongLong).with_flen(1)
}

fn all_not_null(args: &[Expression]) -> bool {
    args.iter().all(|a| a.ret_type().not_null)
}

fn arithmetic_type(args: &[Expression]) -> FieldType {
    let tps: Vec<DataType> = args.iter().map(|a| a.ret_type().tp).collect();
    let tp = if tps.iter().any(|t| matches!(t, DataType::Double) || t.is_string()) {
        DataType::Double
    } else if tps.iter().any(|t| matches!(t, DataType::NewDecimal)) {
        DataType::NewDecimal
    } else {
        DataType::LongLong
    };
    FieldType::new(tp)
}

fn first_arg_type(args: &[Expression]) -> FieldType {
    args.iter()
        .map(|a| a.ret_type().clone())
        .find(|t| t.tp != DataType::Null)
        .unwrap_or_default()
}

/// Build a typed builtin call. Unknown names fail `FunctionNotExists`.
pub fn new_function(name: &str, args: Vec<Expression>) -> PlanResult<Expression> {
    let lower = name.to_ascii_lowercase();
    let not_null = all_not_null(&args);
    let mut ret_type = match lower.as_str() {
        "eq" | "ne" | "lt" | "le" | "gt" | "ge" | "nulleq" | "and" | "or" | "xor" | "not"
        | "isnull" | "like" | "in" | "istrue" | "isfalse" => bool_type(),
        "plus" | "minus" | "mul" | "unaryminus" | "abs" => arithmetic_type(&args),
        "div" => {
            let ft = arithmetic_type(&args);
            if ft.tp == DataType::Double {
                ft
            } else {
                FieldType::new(DataType::NewDecimal)
            }
        }
        "intdiv" | "mod" | "round" | "floor" | "ceil" | "ceiling" | "length" | "char_length"
        | "sleep" | "get_lock" | "release_lock" | "is_free_lock" | "is_used_lock"
        | "master_pos_wait" | "unix_timestamp" | "year" | "month" | "day" | "hour" | "minute"
        | "second" | "sign" => FieldType::new(DataType::LongLong),
        "bitand" | "bitor" | "bitxor" | "leftshift" | "rightshift" | "bitneg"
        | "connection_id" | "last_insert_id" | "found_rows" | "row_count" | "uuid_short" => {
            FieldType::new(DataType::LongLong).with_unsigned()
        }
        "rand" | "sqrt" | "power" | "pow" | "exp" | "ln" | "log" => FieldType::new(DataType::Double),
        "concat" | "concat_ws" | "upper" | "lower" | "substring" | "substr" | "trim" | "ltrim"
        | "rtrim" | "replace" | "lpad" | "rpad" | "left" | "right" | "reverse" | "repeat"
        | "database" | "schema" | "user" | "current_user" | "session_user" | "system_user"
        | "uuid" | "version" | "getvar" | "format" | "hex" | "curtime" | "current_time"
        | "utc_time" => FieldType::new(DataType::Varchar),
        "load_file" => FieldType::new(DataType::Blob),
        "now" | "current_timestamp" | "sysdate" | "localtime" | "localtimestamp"
        | "utc_timestamp" => FieldType::new(DataType::Datetime),
        "curdate" | "current_date" | "utc_date" => FieldType::new(DataType::Date),
        "if" => first_arg_type(args.get(1..).unwrap_or(&[])),
        "ifnull" | "coalesce" | "nullif" | "case" | "greatest" | "least" => first_arg_type(&args),
        "json_extract" | "json_object" | "json_array" => FieldType::new(DataType::Json),
        _ => return Err(PlanError::FunctionNotExists(name.to_string())),
    };
    ret_type.not_null = not_null && !matches!(lower.as_str(), "nullif" | "getvar" | "load_file");
    if matches!(lower.as_str(), "isnull" | "nulleq" | "istrue" | "isfalse") {
        ret_type.not_null = true;
    }
    Ok(Expression::ScalarFunction(ScalarFunction {
        name: lower,
        args,
        ret_type,
    }))
}

/// Fold a condition list into one `and` chain.
pub fn compose_cnf(conditions: Vec<Expression>) -> Option<Expression> {
    conditions.into_iter().reduce(|acc, cond| {
        Expression::ScalarFunction(ScalarFunction {
            name: "and".to_string(),
            ret_type: bool_type(),
            args: vec![acc, cond],
        })
    })
}

/// Split an `and` chain into its conjuncts.
pub fn split_cnf(expr: Expression) -> Vec<Expression> {
    match expr {
        Expression::ScalarFunction(f) if f.name == "and" => {
            f.args.into_iter().flat_map(split_cnf).collect()
        }
        other => vec![other],
    }
}

/// Resolved aggregate call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggFuncDesc {
    pub func: AggFunc,
    pub args: Vec<Expression>,
    pub distinct: bool,
    pub ret_type: FieldType,
}

impl AggFuncDesc {
    pub fn new(func: AggFunc, args: Vec<Expression>, distinct: bool) -> Self {
        let arg_type = args.first().map(|a| a.ret_type().clone()).unwrap_or_default();
        let ret_type = match func {
            AggFunc::Count => FieldType::new(DataType::LongLong).with_not_null(),
            AggFunc::Sum | AggFunc::Avg => match arg_type.tp {
                DataType::Double => FieldType::new(DataType::Double),
                _ => FieldType::new(DataType::NewDecimal),
            },
            AggFunc::Min | AggFunc::Max => arg_type.nullable(),
            AggFunc::FirstRow => arg_type,
            AggFunc::GroupConcat => FieldType::new(DataType::Varchar),
            AggFunc::BitOr | AggFunc::BitXor | AggFunc::BitAnd => {
                FieldType::new(DataType::LongLong).with_unsigned().with_not_null()
            }
        };
        Self {
            func,
            args,
            distinct,
            ret_type,
        }
    }

    pub fn first_row(col: Column) -> Self {
        Self::new(AggFunc::FirstRow, vec![Expression::Column(col)], false)
    }
}

impl fmt::Display for AggFuncDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func.name())?;
        if self.distinct {
            write!(f, "distinct ")?;
        }
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// `col = expr` of an UPDATE or ON DUPLICATE KEY UPDATE list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub col: Column,
    pub col_name: FieldName,
    pub expr: Expression,
}

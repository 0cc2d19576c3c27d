//! Error types for the plan builder.
//!
//! All public APIs return `PlanResult<T>`. The memo layer has no error type of
//! its own; its invariants are guarded by debug assertions.

use thiserror::Error;

/// Coarse classification of a compile failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown or ambiguous column/table reference.
    NameResolution,
    /// Value-count mismatch, illegal write to a generated column and friends.
    SchemaViolation,
    /// A syntax-level hint that names something that does not exist.
    Hint,
    /// Statement or expression kind the builder does not handle.
    UnsupportedConstruct,
    Other,
}

/// Unified error type for statement compilation.
#[derive(Debug, Error)]
pub enum PlanError {
    // ===== name resolution =====
    #[error("Unknown column '{column}' in '{clause}'")]
    UnknownColumn { column: String, clause: String },

    #[error("Column '{column}' in {clause} is ambiguous")]
    AmbiguousColumn { column: String, clause: String },

    #[error("Table '{schema}.{table}' doesn't exist")]
    TableNotExists { schema: String, table: String },

    #[error("Unknown table '{table}' in {clause}")]
    UnknownTable { table: String, clause: String },

    #[error("No database selected")]
    NoDb,

    #[error("Unknown system variable '{0}'")]
    UnknownSystemVar(String),

    #[error("Invalid use of group function")]
    InvalidGroupFuncUse,

    #[error("Not unique table/alias: '{0}'")]
    NonUniqTable(String),

    #[error("FUNCTION {0} does not exist")]
    FunctionNotExists(String),

    // ===== schema violations =====
    #[error("Column count doesn't match value count at row {0}")]
    WrongValueCountOnRow(usize),

    #[error("The value specified for generated column '{column}' in table '{table}' is not allowed.")]
    BadGeneratedColumn { column: String, table: String },

    #[error("Generated column '{0}' cannot refer to auto-increment column.")]
    GeneratedColumnRefAutoInc(String),

    #[error("Expression of generated column '{0}' contains a disallowed function.")]
    GeneratedColumnFunctionIsNotAllowed(String),

    #[error("Unknown column '{0}' in 'generated column function'")]
    UnknownGeneratedField(String),

    #[error("Column '{0}' specified twice")]
    FieldSpecifiedTwice(String),

    #[error("Field '{0}' doesn't have a default value")]
    NoDefaultValue(String),

    #[error("View's SELECT and view's field list have different column counts")]
    ViewWrongList,

    #[error("The used SELECT statements have a different number of columns")]
    WrongNumberOfColumnsInSelect,

    #[error("Operand should contain {0} column(s)")]
    OperandColumns(usize),

    #[error("{0}")]
    ValueCount(String),

    #[error("{0}")]
    InvalidValue(String),

    // ===== hints =====
    #[error("Key '{key}' doesn't exist in table '{table}'")]
    KeyDoesNotExist { key: String, table: String },

    /// Recorded as a warning only; never returned from `build`.
    #[error("{0}")]
    OptimizerHint(String),

    #[error(
        "Can not find access path matching 'tidb_isolation_read_engines'(value: '{engines}'). Available values are '{available}'."
    )]
    NoAccessPath { engines: String, available: String },

    // ===== unsupported =====
    #[error("Unsupported type {0}")]
    UnsupportedType(String),

    #[error("SQL feature not supported: {feature}\nHint: {hint}")]
    NotSupported { feature: String, hint: String },

    // ===== other =====
    #[error("SQL parse error: {message}\nSQL: {sql}")]
    SqlParse { message: String, sql: String },

    #[error("Unknown thread id: {0}")]
    NoSuchThread(u64),

    #[error("{0}")]
    Analyze(String),

    #[error("{0}")]
    SplitRegion(String),

    #[error("{0}")]
    Partition(String),

    #[error("Internal : {0}")]
    Internal(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl PlanError {
    pub fn unknown_column(column: impl Into<String>, clause: impl Into<String>) -> Self {
        Self::UnknownColumn {
            column: column.into(),
            clause: clause.into(),
        }
    }

    pub fn ambiguous_column(column: impl Into<String>, clause: impl Into<String>) -> Self {
        Self::AmbiguousColumn {
            column: column.into(),
            clause: clause.into(),
        }
    }

    pub fn bad_generated_column(column: impl Into<String>, table: impl Into<String>) -> Self {
        Self::BadGeneratedColumn {
            column: column.into(),
            table: table.into(),
        }
    }

    pub fn key_does_not_exist(key: impl Into<String>, table: impl Into<String>) -> Self {
        Self::KeyDoesNotExist {
            key: key.into(),
            table: table.into(),
        }
    }

    pub fn not_supported(feature: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::NotSupported {
            feature: feature.into(),
            hint: hint.into(),
        }
    }

    /// Maps the error into the compile-failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownColumn { .. }
            | Self::AmbiguousColumn { .. }
            | Self::TableNotExists { .. }
            | Self::UnknownTable { .. }
            | Self::NoDb
            | Self::UnknownSystemVar(_)
            | Self::InvalidGroupFuncUse
            | Self::NonUniqTable(_)
            | Self::FunctionNotExists(_) => ErrorKind::NameResolution,

            Self::WrongValueCountOnRow(_)
            | Self::BadGeneratedColumn { .. }
            | Self::GeneratedColumnRefAutoInc(_)
            | Self::GeneratedColumnFunctionIsNotAllowed(_)
            | Self::UnknownGeneratedField(_)
            | Self::FieldSpecifiedTwice(_)
            | Self::NoDefaultValue(_)
            | Self::ViewWrongList
            | Self::WrongNumberOfColumnsInSelect
            | Self::OperandColumns(_)
            | Self::ValueCount(_)
            | Self::InvalidValue(_) => ErrorKind::SchemaViolation,

            Self::KeyDoesNotExist { .. } | Self::NoAccessPath { .. } | Self::OptimizerHint(_) => {
                ErrorKind::Hint
            }

            Self::UnsupportedType(_) | Self::NotSupported { .. } => ErrorKind::UnsupportedConstruct,

            Self::SqlParse { .. }
            | Self::NoSuchThread(_)
            | Self::Analyze(_)
            | Self::SplitRegion(_)
            | Self::Partition(_)
            | Self::Internal(_)
            | Self::Config(_)
            | Self::Json { .. }
            | Self::Io { .. } => ErrorKind::Other,
        }
    }

    /// MySQL protocol error code for this error.
    pub fn code(&self) -> u16 {
        match self {
            Self::UnknownColumn { .. } | Self::UnknownGeneratedField(_) => 1054,
            Self::AmbiguousColumn { .. } => 1052,
            Self::TableNotExists { .. } => 1146,
            Self::UnknownTable { .. } => 1109,
            Self::NoDb => 1046,
            Self::UnknownSystemVar(_) => 1193,
            Self::InvalidGroupFuncUse => 1111,
            Self::NonUniqTable(_) => 1066,
            Self::FunctionNotExists(_) => 1305,
            Self::WrongValueCountOnRow(_) => 1136,
            Self::BadGeneratedColumn { .. } => 3105,
            Self::GeneratedColumnRefAutoInc(_) => 3109,
            Self::GeneratedColumnFunctionIsNotAllowed(_) => 3102,
            Self::FieldSpecifiedTwice(_) => 1110,
            Self::NoDefaultValue(_) => 1364,
            Self::ViewWrongList => 1353,
            Self::WrongNumberOfColumnsInSelect => 1222,
            Self::OperandColumns(_) => 1241,
            Self::KeyDoesNotExist { .. } => 1176,
            Self::NoSuchThread(_) => 1094,
            Self::NotSupported { .. } | Self::UnsupportedType(_) => 1235,
            _ => 1105,
        }
    }
}

/// Result alias used throughout the crate.
pub type PlanResult<T> = Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlanError::unknown_column("t.c", "where clause");
        assert_eq!(err.to_string(), "Unknown column 't.c' in 'where clause'");

        let err = PlanError::WrongValueCountOnRow(1);
        assert_eq!(
            err.to_string(),
            "Column count doesn't match value count at row 1"
        );

        let err = PlanError::bad_generated_column("c", "t");
        assert!(err.to_string().contains("generated column 'c'"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            PlanError::ambiguous_column("a", "field list").kind(),
            ErrorKind::NameResolution
        );
        assert_eq!(
            PlanError::WrongValueCountOnRow(2).kind(),
            ErrorKind::SchemaViolation
        );
        assert_eq!(
            PlanError::key_does_not_exist("idx", "t").kind(),
            ErrorKind::Hint
        );
        assert_eq!(
            PlanError::UnsupportedType("LoadData".into()).kind(),
            ErrorKind::UnsupportedConstruct
        );
    }

    #[test]
    fn test_error_code() {
        assert_eq!(PlanError::WrongValueCountOnRow(1).code(), 1136);
        assert_eq!(PlanError::bad_generated_column("c", "t").code(), 3105);
        assert_eq!(PlanError::key_does_not_exist("i", "t").code(), 1176);
        assert_eq!(PlanError::Internal("x".into()).code(), 1105);
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: PlanError = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}

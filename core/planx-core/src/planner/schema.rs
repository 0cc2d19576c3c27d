//! Output schema of a logical operator.
//!
//! A [`Schema`] is an ordered list of [`Column`]s plus the candidate keys known
//! for it. Output names live beside the schema as a parallel `Vec<FieldName>`
//! so that a projection can rename without touching column identity.

use crate::ast::ColumnName;
use crate::error::{PlanError, PlanResult};
use crate::types::FieldType;
use std::fmt;

/// Per-compile unique column identifier.
pub type ColumnId = u64;

/// One output column. Identity is `unique_id`; the type travels with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub unique_id: ColumnId,
    pub ret_type: FieldType,
    /// Catalog column id when the column reads a base table column.
    pub origin: Option<i64>,
}

impl Column {
    pub fn new(unique_id: ColumnId, ret_type: FieldType) -> Self {
        Self {
            unique_id,
            ret_type,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: i64) -> Self {
        self.origin = Some(origin);
        self
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Column#{}", self.unique_id)
    }
}

/// A set of columns that together determine a row.
pub type KeyInfo = Vec<Column>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Schema {
    pub columns: Vec<Column>,
    pub keys: Vec<KeyInfo>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            keys: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn append(&mut self, col: Column) {
        self.columns.push(col);
    }

    pub fn contains(&self, col: &Column) -> bool {
        self.column_index(col.unique_id).is_some()
    }

    pub fn column_index(&self, id: ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| c.unique_id == id)
    }

    /// Concatenate two schemas; keys are not carried over.
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let mut columns = Vec::with_capacity(left.len() + right.len());
        columns.extend(left.columns.iter().cloned());
        columns.extend(right.columns.iter().cloned());
        Schema::new(columns)
    }

    /// Whether `cols` (in any order) equals one of the recorded keys.
    pub fn is_unique_key(&self, cols: &[Column]) -> bool {
        self.keys.iter().any(|key| {
            key.len() == cols.len() && key.iter().all(|k| cols.iter().any(|c| c.unique_id == k.unique_id))
        })
    }

    /// Record `key` unless an identical key is already present.
    pub fn add_key(&mut self, key: KeyInfo) {
        if !key.is_empty() && !self.is_unique_key(&key) {
            self.keys.push(key);
        }
    }

    /// Ids of every key, each sorted; convenient for assertions.
    pub fn key_ids(&self) -> Vec<Vec<ColumnId>> {
        self.keys
            .iter()
            .map(|k| {
                let mut ids: Vec<ColumnId> = k.iter().map(|c| c.unique_id).collect();
                ids.sort_unstable();
                ids
            })
            .collect()
    }
}

/// Output label of a column: where it came from and what it is called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldName {
    pub db_name: String,
    pub tbl_name: String,
    pub orig_tbl_name: String,
    pub col_name: String,
    pub orig_col_name: String,
    /// Not expanded by `*` (the extra row id column).
    pub hidden: bool,
    /// Right side of a USING/NATURAL join; reachable only when qualified.
    pub redundant: bool,
}

impl FieldName {
    pub fn new(col_name: impl Into<String>) -> Self {
        let col_name = col_name.into();
        Self {
            orig_col_name: col_name.clone(),
            col_name,
            ..Default::default()
        }
    }

    pub fn table_column(db: &str, tbl: &str, orig_tbl: &str, col: &str) -> Self {
        Self {
            db_name: db.to_string(),
            tbl_name: tbl.to_string(),
            orig_tbl_name: orig_tbl.to_string(),
            col_name: col.to_string(),
            orig_col_name: col.to_string(),
            hidden: false,
            redundant: false,
        }
    }

    fn matches(&self, name: &ColumnName) -> bool {
        if let Some(db) = &name.schema {
            if !self.db_name.eq_ignore_ascii_case(db) {
                return false;
            }
        }
        if let Some(tbl) = &name.table {
            if !self.tbl_name.eq_ignore_ascii_case(tbl) {
                return false;
            }
        } else if self.redundant {
            return false;
        }
        self.col_name.eq_ignore_ascii_case(&name.name)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tbl_name.is_empty() {
            write!(f, "{}", self.col_name)
        } else {
            write!(f, "{}.{}", self.tbl_name, self.col_name)
        }
    }
}

/// Position of the field `name` refers to, or `None` when nothing matches.
///
/// More than one match is an ambiguity error naming `clause`.
pub fn find_field_name(
    names: &[FieldName],
    name: &ColumnName,
    clause: &str,
) -> PlanResult<Option<usize>> {
    let mut found = None;
    for (idx, field) in names.iter().enumerate() {
        if field.matches(name) {
            if found.is_some() {
                return Err(PlanError::ambiguous_column(name.to_string(), clause));
            }
            found = Some(idx);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn col(id: ColumnId) -> Column {
        Column::new(id, FieldType::new(DataType::Long))
    }

    #[test]
    fn test_find_field_name() {
        let names = vec![
            FieldName::table_column("test", "t", "t", "a"),
            FieldName::table_column("test", "t2", "t2", "a"),
            FieldName::table_column("test", "t2", "t2", "b"),
        ];
        assert_eq!(
            find_field_name(&names, &ColumnName::qualified("t2", "A"), "where clause").unwrap(),
            Some(1)
        );
        assert_eq!(
            find_field_name(&names, &ColumnName::new("b"), "where clause").unwrap(),
            Some(2)
        );
        assert_eq!(
            find_field_name(&names, &ColumnName::new("z"), "where clause").unwrap(),
            None
        );
        let err = find_field_name(&names, &ColumnName::new("a"), "field list").unwrap_err();
        assert_eq!(err.to_string(), "Column 'a' in field list is ambiguous");
    }

    #[test]
    fn test_redundant_needs_qualifier() {
        let mut right = FieldName::table_column("test", "t2", "t2", "a");
        right.redundant = true;
        let names = vec![FieldName::table_column("test", "t", "t", "a"), right];
        assert_eq!(
            find_field_name(&names, &ColumnName::new("a"), "field list").unwrap(),
            Some(0)
        );
        assert_eq!(
            find_field_name(&names, &ColumnName::qualified("t2", "a"), "field list").unwrap(),
            Some(1)
        );
    }

    #[test]
    fn test_unique_key_any_order() {
        let mut schema = Schema::new(vec![col(1), col(2), col(3)]);
        schema.add_key(vec![col(2), col(1)]);
        schema.add_key(vec![col(1), col(2)]);
        assert_eq!(schema.keys.len(), 1);
        assert!(schema.is_unique_key(&[col(1), col(2)]));
        assert!(!schema.is_unique_key(&[col(1)]));
        assert_eq!(schema.key_ids(), vec![vec![1, 2]]);
    }
}

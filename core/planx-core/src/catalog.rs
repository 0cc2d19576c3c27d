//! Read-only schema snapshot consumed by the builder.
//!
//! A statement compiles against one immutable [`InfoSchema`]; nothing in the
//! planner mutates it.

use crate::ast::{self, ColumnOption, ConstraintKind, CreateTableStmt, Expr, Query};
use crate::error::{PlanError, PlanResult};
use crate::types::{DataType, Datum, FieldType};
use ahash::AHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// DDL state of a schema object. Only `Public` objects are visible to reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchemaState {
    None,
    DeleteOnly,
    WriteOnly,
    WriteReorg,
    #[default]
    Public,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub id: i64,
    pub name: String,
    pub offset: usize,
    pub field_type: FieldType,
    pub default_value: Option<Datum>,
    pub has_default: bool,
    pub auto_increment: bool,
    pub primary_key: bool,
    pub generated_expr: Option<Expr>,
    pub generated_stored: bool,
    /// Lower-cased names of the columns the generation expression reads.
    pub dependences: BTreeSet<String>,
    pub state: SchemaState,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: 0,
            name: name.into(),
            offset: 0,
            field_type,
            default_value: None,
            has_default: false,
            auto_increment: false,
            primary_key: false,
            generated_expr: None,
            generated_stored: false,
            dependences: BTreeSet::new(),
            state: SchemaState::Public,
        }
    }

    pub fn is_generated(&self) -> bool {
        self.generated_expr.is_some()
    }

    pub fn with_default(mut self, value: Datum) -> Self {
        self.default_value = Some(value);
        self.has_default = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.field_type.not_null = true;
        self
    }

    pub fn generated(mut self, expr: Expr, stored: bool) -> Self {
        self.dependences = expr
            .column_names()
            .into_iter()
            .map(|c| c.name.to_ascii_lowercase())
            .collect();
        self.generated_expr = Some(expr);
        self.generated_stored = stored;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexColumn {
    pub name: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexInfo {
    pub id: i64,
    pub name: String,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub primary: bool,
    pub state: SchemaState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDefinition {
    pub id: i64,
    pub name: String,
}

/// Stored definition of a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewInfo {
    pub select: Query,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub id: i64,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indices: Vec<IndexInfo>,
    /// The integer primary key doubles as the row handle.
    pub pk_is_handle: bool,
    pub view: Option<ViewInfo>,
    pub partitions: Vec<PartitionDefinition>,
    pub tiflash_replica_available: bool,
    pub is_cluster_table: bool,
}

impl TableInfo {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            columns: Vec::new(),
            indices: Vec::new(),
            pk_is_handle: false,
            view: None,
            partitions: Vec::new(),
            tiflash_replica_available: false,
            is_cluster_table: false,
        }
    }

    /// Append a column, assigning its id and offset.
    pub fn column(mut self, mut col: ColumnInfo) -> Self {
        col.offset = self.columns.len();
        col.id = col.offset as i64 + 1;
        self.columns.push(col);
        self
    }

    /// Declare a single integer column as the handle primary key.
    pub fn handle_pk(mut self, name: &str) -> Self {
        if let Some(col) = self.columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(name)) {
            col.primary_key = true;
            col.field_type.not_null = true;
            self.pk_is_handle = true;
        }
        self
    }

    pub fn index(mut self, name: &str, columns: &[&str], unique: bool) -> Self {
        let cols = columns
            .iter()
            .filter_map(|c| {
                self.find_column(c).map(|info| IndexColumn {
                    name: info.name.clone(),
                    offset: info.offset,
                })
            })
            .collect();
        self.indices.push(IndexInfo {
            id: self.indices.len() as i64 + 1,
            name: name.to_string(),
            columns: cols,
            unique,
            primary: false,
            state: SchemaState::Public,
        });
        self
    }

    pub fn is_view(&self) -> bool {
        self.view.is_some()
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexInfo> {
        self.indices.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// The handle column when the primary key is the handle.
    pub fn pk_handle_column(&self) -> Option<&ColumnInfo> {
        if !self.pk_is_handle {
            return None;
        }
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Columns visible to statements.
    pub fn public_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.state == SchemaState::Public)
    }

    /// Build table metadata from a parsed `CREATE TABLE`.
    pub fn from_create_stmt(id: i64, stmt: &CreateTableStmt) -> Self {
        let mut table = TableInfo::new(id, stmt.table.name.clone());
        let mut pk_cols: Vec<String> = Vec::new();
        for def in &stmt.columns {
            let mut col = ColumnInfo::new(def.name.clone(), def.field_type.clone());
            for opt in &def.options {
                match opt {
                    ColumnOption::PrimaryKey => {
                        pk_cols.push(def.name.clone());
                        col.field_type.not_null = true;
                    }
                    ColumnOption::NotNull => col.field_type.not_null = true,
                    ColumnOption::Null => col.field_type.not_null = false,
                    ColumnOption::AutoIncrement => col.auto_increment = true,
                    ColumnOption::Default(Expr::Value(v)) => {
                        col.default_value = Some(v.clone());
                        col.has_default = true;
                    }
                    ColumnOption::Default(_) => col.has_default = true,
                    ColumnOption::Generated { expr, stored } => {
                        col = col.generated(expr.clone(), *stored);
                    }
                    ColumnOption::Unique | ColumnOption::Comment(_) => {}
                }
            }
            table = table.column(col);
            if def.options.contains(&ColumnOption::Unique) {
                table = table.index(&def.name, &[def.name.as_str()], true);
            }
        }
        for cons in &stmt.constraints {
            let cols: Vec<&str> = cons.columns.iter().map(String::as_str).collect();
            match cons.kind {
                ConstraintKind::PrimaryKey => pk_cols.extend(cons.columns.iter().cloned()),
                ConstraintKind::Unique | ConstraintKind::Index => {
                    let name = cons.name.clone().unwrap_or_else(|| cons.columns.join("_"));
                    table = table.index(&name, &cols, cons.kind == ConstraintKind::Unique);
                }
            }
        }
        let single_int_pk = pk_cols.len() == 1
            && table
                .find_column(&pk_cols[0])
                .is_some_and(|c| c.field_type.tp.is_integer());
        if single_int_pk {
            table = table.handle_pk(&pk_cols[0]);
        } else if !pk_cols.is_empty() {
            let cols: Vec<&str> = pk_cols.iter().map(String::as_str).collect();
            table = table.index("PRIMARY", &cols, true);
            for name in &pk_cols {
                if let Some(col) = table
                    .columns
                    .iter_mut()
                    .find(|c| c.name.eq_ignore_ascii_case(name))
                {
                    col.primary_key = true;
                    col.field_type.not_null = true;
                }
            }
            if let Some(idx) = table.indices.last_mut() {
                idx.primary = true;
            }
        }
        table
    }
}

/// Immutable schema snapshot.
pub trait InfoSchema: Send + Sync {
    fn table_by_name(&self, schema: &str, table: &str) -> PlanResult<Arc<TableInfo>>;
    fn table_by_id(&self, id: i64) -> Option<Arc<TableInfo>>;
    fn schema_exists(&self, schema: &str) -> bool;
}

/// In-memory [`InfoSchema`].
#[derive(Debug, Default, Clone)]
pub struct MemCatalog {
    tables: AHashMap<(String, String), Arc<TableInfo>>,
    by_id: AHashMap<i64, Arc<TableInfo>>,
    schemas: BTreeSet<String>,
}

impl MemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_schema(&mut self, schema: &str) {
        self.schemas.insert(schema.to_ascii_lowercase());
    }

    pub fn add_table(&mut self, schema: &str, table: TableInfo) {
        let table = Arc::new(table);
        self.add_schema(schema);
        self.by_id.insert(table.id, Arc::clone(&table));
        self.tables.insert(
            (schema.to_ascii_lowercase(), table.name.to_ascii_lowercase()),
            table,
        );
    }

    pub fn next_table_id(&self) -> i64 {
        self.by_id.keys().copied().max().unwrap_or(0) + 1
    }

    /// Catalog used across the crate's tests.
    ///
    /// Database `test` holds `t` (handle primary key `a`, several indexes),
    /// keyless `t2`, `gen` with generated columns, view `v`, partitioned `pt`,
    /// `flash` with a TiFlash replica, `s` with a unique not-null index and
    /// the broken `gen_autoinc`/`gen_unknown`. `information_schema` holds the
    /// cluster table `cluster_info`.
    pub fn mock() -> Self {
        let int = || FieldType::new(DataType::Long);
        let bigint = || FieldType::new(DataType::LongLong);
        let mut catalog = MemCatalog::new();
        catalog.add_schema("mysql");

        let t = TableInfo::new(1, "t")
            .column(ColumnInfo::new("a", bigint()))
            .column(ColumnInfo::new("b", int()))
            .column(ColumnInfo::new("c", int()))
            .column(ColumnInfo::new("d", int()))
            .column(ColumnInfo::new("e", int()))
            .column(ColumnInfo::new("c_str", FieldType::new(DataType::Varchar).with_flen(20)))
            .column(ColumnInfo::new("f", int()))
            .column(ColumnInfo::new("g", int()))
            .handle_pk("a")
            .index("c_d_e", &["c", "d", "e"], false)
            .index("e", &["e"], false)
            .index("f", &["f"], true)
            .index("g", &["g"], false)
            .index("f_g", &["f", "g"], true);
        catalog.add_table("test", t);

        let t2 = TableInfo::new(2, "t2")
            .column(ColumnInfo::new("a", int()))
            .column(ColumnInfo::new("b", int()));
        catalog.add_table("test", t2);

        let plus_one = Expr::binary(ast::BinaryOp::Plus, Expr::col("a"), Expr::int(1));
        let double_b = Expr::binary(ast::BinaryOp::Mul, Expr::col("b"), Expr::int(2));
        let gen_table = TableInfo::new(3, "gen")
            .column(ColumnInfo::new("id", bigint()).auto_increment())
            .column(ColumnInfo::new("a", int()))
            .column(ColumnInfo::new("b", int()).with_default(Datum::Int(0)))
            .column(ColumnInfo::new("c", int()).generated(plus_one, false))
            .column(ColumnInfo::new("d", int()).not_null())
            .column(ColumnInfo::new("e", bigint()).generated(double_b, true))
            .handle_pk("id");
        catalog.add_table("test", gen_table);

        // Metadata that predates the DDL checks: generated columns that read an
        // auto-increment column or a column that no longer exists.
        let from_id = Expr::binary(ast::BinaryOp::Plus, Expr::col("id"), Expr::int(1));
        let gen_autoinc = TableInfo::new(9, "gen_autoinc")
            .column(ColumnInfo::new("id", bigint()).auto_increment())
            .column(ColumnInfo::new("x", bigint()).generated(from_id, false))
            .handle_pk("id");
        catalog.add_table("test", gen_autoinc);

        let dangling = Expr::binary(ast::BinaryOp::Plus, Expr::col("zz"), Expr::int(1));
        let gen_unknown = TableInfo::new(10, "gen_unknown")
            .column(ColumnInfo::new("a", int()))
            .column(ColumnInfo::new("y", int()).generated(dangling, false));
        catalog.add_table("test", gen_unknown);

        let mut v = TableInfo::new(4, "v")
            .column(ColumnInfo::new("a", bigint()))
            .column(ColumnInfo::new("b", int()));
        v.view = Some(ViewInfo {
            select: Query::Select(Box::new(ast::SelectStmt {
                fields: vec![
                    ast::SelectField::Expr {
                        expr: Expr::col("a"),
                        alias: None,
                    },
                    ast::SelectField::Expr {
                        expr: Expr::col("b"),
                        alias: None,
                    },
                ],
                from: Some(ast::TableRef::table("t")),
                ..Default::default()
            })),
            columns: vec!["a".into(), "b".into()],
        });
        catalog.add_table("test", v);

        let mut pt = TableInfo::new(5, "pt")
            .column(ColumnInfo::new("id", bigint()))
            .column(ColumnInfo::new("v", int()))
            .handle_pk("id")
            .index("v", &["v"], false);
        pt.partitions = vec![
            PartitionDefinition { id: 51, name: "p0".into() },
            PartitionDefinition { id: 52, name: "p1".into() },
        ];
        catalog.add_table("test", pt);

        let mut flash = TableInfo::new(6, "flash")
            .column(ColumnInfo::new("a", bigint()))
            .column(ColumnInfo::new("b", int()))
            .handle_pk("a")
            .index("b", &["b"], false);
        flash.tiflash_replica_available = true;
        catalog.add_table("test", flash);

        let s = TableInfo::new(7, "s")
            .column(ColumnInfo::new("a", int()))
            .column(ColumnInfo::new("b", int()).not_null())
            .index("ub", &["b"], true);
        catalog.add_table("test", s);

        let mut cluster = TableInfo::new(8, "cluster_info")
            .column(ColumnInfo::new("type", FieldType::new(DataType::Varchar)))
            .column(ColumnInfo::new("instance", FieldType::new(DataType::Varchar)));
        cluster.is_cluster_table = true;
        catalog.add_table("information_schema", cluster);

        catalog
    }
}

impl InfoSchema for MemCatalog {
    fn table_by_name(&self, schema: &str, table: &str) -> PlanResult<Arc<TableInfo>> {
        self.tables
            .get(&(schema.to_ascii_lowercase(), table.to_ascii_lowercase()))
            .cloned()
            .ok_or_else(|| PlanError::TableNotExists {
                schema: schema.to_string(),
                table: table.to_string(),
            })
    }

    fn table_by_id(&self, id: i64) -> Option<Arc<TableInfo>> {
        self.by_id.get(&id).cloned()
    }

    fn schema_exists(&self, schema: &str) -> bool {
        self.schemas.contains(&schema.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ColumnDef, TableConstraint, TableName};

    #[test]
    fn test_mock_lookup() {
        let catalog = MemCatalog::mock();
        let t = catalog.table_by_name("test", "T").unwrap();
        assert!(t.pk_is_handle);
        assert_eq!(t.pk_handle_column().unwrap().name, "a");
        assert_eq!(catalog.table_by_id(t.id).unwrap().name, "t");
        assert!(matches!(
            catalog.table_by_name("test", "nope"),
            Err(PlanError::TableNotExists { .. })
        ));
        assert!(catalog.schema_exists("TEST"));
    }

    #[test]
    fn test_generated_dependences() {
        let catalog = MemCatalog::mock();
        let gen_table = catalog.table_by_name("test", "gen").unwrap();
        let c = gen_table.find_column("c").unwrap();
        assert!(c.is_generated());
        assert!(c.dependences.contains("a"));
    }

    #[test]
    fn test_from_create_stmt_composite_pk() {
        let stmt = CreateTableStmt {
            table: TableName::new("k"),
            if_not_exists: false,
            columns: vec![
                ColumnDef {
                    name: "x".into(),
                    field_type: FieldType::new(DataType::Long),
                    options: vec![],
                },
                ColumnDef {
                    name: "y".into(),
                    field_type: FieldType::new(DataType::Varchar),
                    options: vec![ColumnOption::Unique],
                },
            ],
            constraints: vec![TableConstraint {
                kind: ConstraintKind::PrimaryKey,
                name: None,
                columns: vec!["x".into(), "y".into()],
            }],
        };
        let info = TableInfo::from_create_stmt(9, &stmt);
        assert!(!info.pk_is_handle);
        let pk = info.find_index("primary").unwrap();
        assert!(pk.primary && pk.unique);
        assert_eq!(pk.columns.len(), 2);
        assert!(info.find_index("y").unwrap().unique);
    }
}

//! Access-path enumeration and optimizer hint bookkeeping.
//!
//! Index hints come from two places: syntax attached to a table reference
//! (`t FORCE INDEX (idx)`) and comment hints on the select block
//! (`/*+ FORCE_INDEX(t, idx) */`). Both restrict the candidate paths the same
//! way; they differ only in what happens when an index does not exist.

use crate::ast::{HintTable, IndexHint, IndexHintScope, IndexHintType, OptimizerHint};
use crate::catalog::{IndexInfo, SchemaState, TableInfo};
use crate::config::StoreType;
use crate::error::{PlanError, PlanResult};
use crate::logging::BUILDER_TARGET;
use crate::planner::context::CompileContext;
use tracing::warn;

/// Schemas whose tables are never filtered by isolation-read engines.
const SYSTEM_SCHEMAS: &[&str] = &[
    "mysql",
    "information_schema",
    "performance_schema",
    "metrics_schema",
];

/// One way to read a table: a full table scan or an index scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPath {
    /// `None` for the table path.
    pub index: Option<IndexInfo>,
    pub store_type: StoreType,
    /// Chosen by a USE/FORCE hint; preferred regardless of cost.
    pub forced: bool,
}

impl AccessPath {
    pub fn table(store_type: StoreType) -> Self {
        Self {
            index: None,
            store_type,
            forced: false,
        }
    }

    pub fn index(index: IndexInfo) -> Self {
        Self {
            index: Some(index),
            store_type: StoreType::TiKV,
            forced: false,
        }
    }

    pub fn is_table_path(&self) -> bool {
        self.index.is_none()
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index.as_ref().map(|i| i.name.as_str())
    }
}

/// A table named by a join or storage hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintTableInfo {
    pub db_name: String,
    pub tbl_name: String,
    pub matched: bool,
}

impl HintTableInfo {
    pub fn new(db_name: impl Into<String>, tbl_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            tbl_name: tbl_name.into(),
            matched: false,
        }
    }

    fn from_hint(table: &HintTable, current_db: &str) -> Self {
        let db = table.db.clone().unwrap_or_else(|| current_db.to_string());
        Self::new(db, table.table.clone())
    }

    fn same_table(&self, other: &HintTableInfo) -> bool {
        self.db_name.eq_ignore_ascii_case(&other.db_name)
            && self.tbl_name.eq_ignore_ascii_case(&other.tbl_name)
    }
}

/// A comment-level index hint bound to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHintInfo {
    pub db_name: String,
    pub tbl_name: String,
    pub hint: IndexHint,
    pub matched: bool,
}

impl IndexHintInfo {
    fn hint_type_str(&self) -> &'static str {
        match self.hint.hint_type {
            IndexHintType::Use => "use_index",
            IndexHintType::Force => "force_index",
            IndexHintType::Ignore => "ignore_index",
        }
    }
}

/// Comment hints of one select block.
#[derive(Debug, Clone, Default)]
pub struct TableHintInfo {
    pub hash_join_tables: Vec<HintTableInfo>,
    pub merge_join_tables: Vec<HintTableInfo>,
    pub inl_join_tables: Vec<HintTableInfo>,
    pub tiflash_tables: Vec<HintTableInfo>,
    pub tikv_tables: Vec<HintTableInfo>,
    pub index_hints: Vec<IndexHintInfo>,
}

impl TableHintInfo {
    pub fn from_hints(hints: &[OptimizerHint], current_db: &str) -> Self {
        let tables = |list: &[HintTable]| -> Vec<HintTableInfo> {
            list.iter()
                .map(|t| HintTableInfo::from_hint(t, current_db))
                .collect()
        };
        let mut info = TableHintInfo::default();
        for hint in hints {
            match hint {
                OptimizerHint::HashJoin(list) => info.hash_join_tables.extend(tables(list)),
                OptimizerHint::MergeJoin(list) => info.merge_join_tables.extend(tables(list)),
                OptimizerHint::InlJoin(list) => info.inl_join_tables.extend(tables(list)),
                OptimizerHint::ReadFromStorage { store, tables: list } => match store {
                    StoreType::TiFlash => info.tiflash_tables.extend(tables(list)),
                    _ => info.tikv_tables.extend(tables(list)),
                },
                OptimizerHint::UseIndex { table, indexes }
                | OptimizerHint::ForceIndex { table, indexes }
                | OptimizerHint::IgnoreIndex { table, indexes } => {
                    let hint_type = match hint {
                        OptimizerHint::UseIndex { .. } => IndexHintType::Use,
                        OptimizerHint::ForceIndex { .. } => IndexHintType::Force,
                        _ => IndexHintType::Ignore,
                    };
                    // An empty list means "use no index" for USE and FORCE.
                    let index_names = if indexes.is_empty() && hint_type != IndexHintType::Ignore {
                        None
                    } else {
                        Some(indexes.clone())
                    };
                    let table = HintTableInfo::from_hint(table, current_db);
                    info.index_hints.push(IndexHintInfo {
                        db_name: table.db_name,
                        tbl_name: table.tbl_name,
                        hint: IndexHint {
                            hint_type,
                            scope: IndexHintScope::Scan,
                            index_names,
                        },
                        matched: false,
                    });
                }
            }
        }
        info
    }

    pub fn prefer_hash_join(&mut self, tables: &[Option<HintTableInfo>]) -> bool {
        match_table_name(tables, &mut self.hash_join_tables)
    }

    pub fn prefer_merge_join(&mut self, tables: &[Option<HintTableInfo>]) -> bool {
        match_table_name(tables, &mut self.merge_join_tables)
    }

    pub fn prefer_inl_join(&mut self, tables: &[Option<HintTableInfo>]) -> bool {
        match_table_name(tables, &mut self.inl_join_tables)
    }

    pub fn prefer_tiflash(&mut self, tables: &[Option<HintTableInfo>]) -> bool {
        match_table_name(tables, &mut self.tiflash_tables)
    }

    pub fn prefer_tikv(&mut self, tables: &[Option<HintTableInfo>]) -> bool {
        match_table_name(tables, &mut self.tikv_tables)
    }

    /// Warnings for every hint that never matched a table of the block.
    pub fn unmatched_warnings(&self) -> Vec<PlanError> {
        let mut warnings = Vec::new();
        for hint in self.index_hints.iter().filter(|h| !h.matched) {
            let indexes = hint
                .hint
                .index_names
                .as_deref()
                .unwrap_or_default()
                .join(", ");
            warnings.push(PlanError::OptimizerHint(format!(
                "{}({}) is inapplicable, check whether the table({}.{}) exists",
                hint.hint_type_str(),
                indexes,
                hint.db_name,
                hint.tbl_name
            )));
        }
        for (hint_type, tables) in [
            ("inl_join", &self.inl_join_tables),
            ("merge_join", &self.merge_join_tables),
            ("hash_join", &self.hash_join_tables),
        ] {
            let unmatched = extract_unmatched_tables(tables);
            if !unmatched.is_empty() {
                warnings.push(PlanError::OptimizerHint(format!(
                    "There are no matching table names for ({}) in optimizer hint {}. Maybe you can use the table alias name",
                    unmatched.join(", "),
                    restore_join_hint(hint_type, tables)
                )));
            }
        }
        for (store, tables) in [("TIFLASH", &self.tiflash_tables), ("TIKV", &self.tikv_tables)] {
            let unmatched = extract_unmatched_tables(tables);
            if !unmatched.is_empty() {
                warnings.push(PlanError::OptimizerHint(format!(
                    "There are no matching table names for ({}) in optimizer hint /*+ READ_FROM_STORAGE({}[{}]) */. Maybe you can use the table alias name",
                    unmatched.join(", "),
                    store,
                    tables.iter().map(|t| t.tbl_name.as_str()).collect::<Vec<_>>().join(", ")
                )));
            }
        }
        warnings
    }
}

/// Mark every hint entry naming one of `tables`; true when any matched.
fn match_table_name(tables: &[Option<HintTableInfo>], hint_tables: &mut [HintTableInfo]) -> bool {
    let mut matched = false;
    for table in tables.iter().flatten() {
        if let Some(entry) = hint_tables.iter_mut().find(|e| e.same_table(table)) {
            entry.matched = true;
            matched = true;
        }
    }
    matched
}

/// Render `/*+ HINT(t1, t2) */` for warning messages.
pub fn restore_join_hint(hint_type: &str, tables: &[HintTableInfo]) -> String {
    let names: Vec<String> = tables.iter().map(|t| t.tbl_name.to_ascii_lowercase()).collect();
    format!("/*+ {}({}) */", hint_type.to_ascii_uppercase(), names.join(", "))
}

pub fn extract_unmatched_tables(tables: &[HintTableInfo]) -> Vec<String> {
    tables
        .iter()
        .filter(|t| !t.matched)
        .map(|t| t.tbl_name.clone())
        .collect()
}

fn is_primary_index(name: &str) -> bool {
    name.eq_ignore_ascii_case("primary")
}

/// Position of the path serving `index_name`; `primary` means the table path
/// when the primary key is the handle.
fn path_by_index_name(paths: &[AccessPath], index_name: &str, table: &TableInfo) -> Option<usize> {
    let mut table_path = None;
    for (i, path) in paths.iter().enumerate() {
        match &path.index {
            None => {
                if table_path.is_none() {
                    table_path = Some(i);
                }
            }
            Some(idx) if idx.name.eq_ignore_ascii_case(index_name) => return Some(i),
            Some(_) => {}
        }
    }
    if is_primary_index(index_name) && table.pk_is_handle {
        return table_path;
    }
    None
}

/// Candidate access paths for `table` under the given hints.
///
/// `tbl_name` is the name the table is visible under in the block (its alias
/// if any); comment hints are matched against it. A syntax-level hint naming
/// a missing index fails with `KeyDoesNotExist`; the same from a comment hint
/// is recorded as a warning.
pub fn get_possible_access_paths(
    ctx: &mut CompileContext,
    syntax_hints: &[IndexHint],
    table: &TableInfo,
    db_name: &str,
    tbl_name: &str,
) -> PlanResult<Vec<AccessPath>> {
    let base_store = if table.is_cluster_table {
        StoreType::TiDB
    } else {
        StoreType::TiKV
    };
    let mut public_paths = vec![AccessPath::table(base_store)];
    if table.tiflash_replica_available {
        public_paths.push(AccessPath::table(StoreType::TiFlash));
    }
    public_paths.extend(
        table
            .indices
            .iter()
            .filter(|idx| idx.state == SchemaState::Public)
            .cloned()
            .map(AccessPath::index),
    );

    let syntax_len = syntax_hints.len();
    let mut hints: Vec<IndexHint> = syntax_hints.to_vec();
    if let Some(block_hints) = ctx.table_hints.last_mut() {
        for info in block_hints.index_hints.iter_mut() {
            if info.db_name.eq_ignore_ascii_case(db_name) && info.tbl_name.eq_ignore_ascii_case(tbl_name) {
                info.matched = true;
                hints.push(info.hint.clone());
            }
        }
    }

    let mut has_scan_hint = false;
    let mut has_use_or_force = false;
    let mut available: Vec<usize> = Vec::new();
    let mut ignored: Vec<usize> = Vec::new();

    for (i, hint) in hints.iter().enumerate() {
        if hint.scope != IndexHintScope::Scan {
            continue;
        }
        has_scan_hint = true;

        let Some(names) = &hint.index_names else {
            // `USE INDEX ()`: no index at all, read the table.
            if hint.hint_type != IndexHintType::Ignore {
                has_use_or_force = true;
                public_paths[0].forced = true;
                available.push(0);
            }
            continue;
        };
        for name in names {
            let Some(pos) = path_by_index_name(&public_paths, name, table) else {
                let err = PlanError::key_does_not_exist(name.clone(), table.name.clone());
                if i < syntax_len {
                    return Err(err);
                }
                warn!(target: BUILDER_TARGET, table = %table.name, index = %name, "index hint ignored");
                ctx.append_warning(err);
                continue;
            };
            if hint.hint_type == IndexHintType::Ignore {
                ignored.push(pos);
                continue;
            }
            has_use_or_force = true;
            public_paths[pos].forced = true;
            available.push(pos);
        }
    }

    let mut paths: Vec<AccessPath> = if !has_scan_hint || !has_use_or_force {
        public_paths.clone()
    } else {
        available.iter().map(|&i| public_paths[i].clone()).collect()
    };

    if !ignored.is_empty() {
        let ignored_paths: Vec<AccessPath> = ignored.iter().map(|&i| public_paths[i].clone()).collect();
        paths.retain(|path| match path.index_name() {
            None => true,
            Some(name) => path_by_index_name(&ignored_paths, name, table).is_none(),
        });
    }

    if paths.is_empty() {
        paths.push(AccessPath::table(StoreType::TiKV));
    }
    Ok(paths)
}

/// Drop paths whose engine the session may not read from.
pub fn filter_path_by_isolation_read(
    ctx: &CompileContext,
    mut paths: Vec<AccessPath>,
    db_name: &str,
) -> PlanResult<Vec<AccessPath>> {
    if SYSTEM_SCHEMAS.iter().any(|s| s.eq_ignore_ascii_case(db_name)) {
        return Ok(paths);
    }
    let engines = &ctx.vars.isolation_read_engines;
    let mut available: Vec<&'static str> = Vec::new();
    for path in paths.iter().rev() {
        let name = path.store_type.as_str();
        if !available.contains(&name) {
            available.push(name);
        }
    }
    paths.retain(|p| engines.contains(&p.store_type));
    if paths.is_empty() {
        return Err(PlanError::NoAccessPath {
            engines: ctx.vars.isolation_read_engines_str(),
            available: available.join(", "),
        });
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InfoSchema, MemCatalog};
    use crate::config::SessionVars;

    fn setup() -> (CompileContext, std::sync::Arc<TableInfo>) {
        let catalog = MemCatalog::mock();
        let t = catalog.table_by_name("test", "t").unwrap();
        (CompileContext::new(SessionVars::new().with_current_db("test")), t)
    }

    #[test]
    fn test_no_hints_all_public_paths() {
        let (mut ctx, t) = setup();
        let paths = get_possible_access_paths(&mut ctx, &[], &t, "test", "t").unwrap();
        assert_eq!(paths.len(), 1 + t.indices.len());
        assert!(paths[0].is_table_path());
        assert!(paths.iter().all(|p| !p.forced));
    }

    #[test]
    fn test_force_index_syntax_missing_fails() {
        let (mut ctx, t) = setup();
        let hint = IndexHint::scan(IndexHintType::Force, &["missing_idx"]);
        let err = get_possible_access_paths(&mut ctx, &[hint], &t, "test", "t").unwrap_err();
        assert_eq!(err.to_string(), "Key 'missing_idx' doesn't exist in table 't'");
    }

    #[test]
    fn test_force_index_comment_missing_warns() {
        let (mut ctx, t) = setup();
        ctx.table_hints.push(TableHintInfo::from_hints(
            &[OptimizerHint::ForceIndex {
                table: HintTable::new("t"),
                indexes: vec!["missing_idx".into()],
            }],
            "test",
        ));
        let paths = get_possible_access_paths(&mut ctx, &[], &t, "test", "t").unwrap();
        assert_eq!(paths.len(), 1 + t.indices.len());
        assert_eq!(ctx.warnings().len(), 1);
    }

    #[test]
    fn test_force_and_ignore() {
        let (mut ctx, t) = setup();
        let hints = [
            IndexHint::scan(IndexHintType::Force, &["c_d_e", "f"]),
            IndexHint::scan(IndexHintType::Ignore, &["f"]),
        ];
        let paths = get_possible_access_paths(&mut ctx, &hints, &t, "test", "t").unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].index_name(), Some("c_d_e"));
        assert!(paths[0].forced);
    }

    #[test]
    fn test_primary_means_table_path() {
        let (mut ctx, t) = setup();
        let hints = [IndexHint::scan(IndexHintType::Use, &["PRIMARY"])];
        let paths = get_possible_access_paths(&mut ctx, &hints, &t, "test", "t").unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].is_table_path() && paths[0].forced);
    }

    #[test]
    fn test_ignore_everything_falls_back_to_table() {
        let (mut ctx, t) = setup();
        let hints = [IndexHint {
            hint_type: IndexHintType::Use,
            scope: IndexHintScope::Scan,
            index_names: None,
        }];
        let paths = get_possible_access_paths(&mut ctx, &hints, &t, "test", "t").unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].is_table_path());
    }

    #[test]
    fn test_isolation_read_filter() {
        let (mut ctx, t) = setup();
        ctx.vars.isolation_read_engines = [StoreType::TiFlash].into_iter().collect();
        let paths = get_possible_access_paths(&mut ctx, &[], &t, "test", "t").unwrap();
        let err = filter_path_by_isolation_read(&ctx, paths, "test").unwrap_err();
        assert!(err.to_string().contains("Available values are 'tikv'"));

        let catalog = MemCatalog::mock();
        let flash = catalog.table_by_name("test", "flash").unwrap();
        let paths = get_possible_access_paths(&mut ctx, &[], &flash, "test", "flash").unwrap();
        let paths = filter_path_by_isolation_read(&ctx, paths, "test").unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].store_type, StoreType::TiFlash);
    }

    #[test]
    fn test_unmatched_join_hint_warning() {
        let mut info = TableHintInfo::from_hints(
            &[OptimizerHint::HashJoin(vec![HintTable::new("t"), HintTable::new("x")])],
            "test",
        );
        assert!(info.prefer_hash_join(&[Some(HintTableInfo::new("test", "T")), None]));
        let warnings = info.unmatched_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].to_string(),
            "There are no matching table names for (x) in optimizer hint /*+ HASH_JOIN(t, x) */. Maybe you can use the table alias name"
        );
    }
}

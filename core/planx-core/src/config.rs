//! Session-level settings that influence compilation.
//!
//! Loaded from JSON (file or string) and optionally overridden by
//! `PLANX_*` environment variables.

use crate::error::{PlanError, PlanResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::Path;

/// Storage engine an access path reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    TiKV,
    TiFlash,
    TiDB,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::TiKV => "tikv",
            StoreType::TiFlash => "tiflash",
            StoreType::TiDB => "tidb",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tikv" => Some(StoreType::TiKV),
            "tiflash" => Some(StoreType::TiFlash),
            "tidb" => Some(StoreType::TiDB),
            _ => None,
        }
    }
}

/// Default upper bound of regions a single SPLIT statement may create.
pub const DEFAULT_SPLIT_REGION_MAX_NUM: u64 = 1000;

/// System variables the builder accepts in `SET`.
const KNOWN_SYSTEM_VARS: &[(&str, &str)] = &[
    ("autocommit", "1"),
    ("sql_mode", "STRICT_TRANS_TABLES"),
    ("time_zone", "SYSTEM"),
    ("tx_isolation", "REPEATABLE-READ"),
    ("transaction_isolation", "REPEATABLE-READ"),
    ("max_execution_time", "0"),
    ("names", ""),
    ("character_set_client", "utf8mb4"),
    ("character_set_results", "utf8mb4"),
    ("tidb_isolation_read_engines", "tikv,tiflash,tidb"),
    ("tidb_enable_fast_analyze", "0"),
    ("tidb_snapshot", ""),
];

/// Per-session compile settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionVars {
    pub current_db: String,
    pub current_user: String,
    pub strict_sql_mode: bool,
    pub isolation_read_engines: BTreeSet<StoreType>,
    pub split_region_max_num: u64,
    pub enable_fast_analyze: bool,
    pub user_vars: BTreeMap<String, String>,
    pub system_vars: BTreeMap<String, String>,
}

impl Default for SessionVars {
    fn default() -> Self {
        Self {
            current_db: String::new(),
            current_user: "root".to_string(),
            strict_sql_mode: true,
            isolation_read_engines: [StoreType::TiKV, StoreType::TiFlash, StoreType::TiDB]
                .into_iter()
                .collect(),
            split_region_max_num: DEFAULT_SPLIT_REGION_MAX_NUM,
            enable_fast_analyze: false,
            user_vars: BTreeMap::new(),
            system_vars: KNOWN_SYSTEM_VARS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl SessionVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_current_db(mut self, db: impl Into<String>) -> Self {
        self.current_db = db.into();
        self
    }

    /// Parse settings from a JSON document; missing fields keep defaults.
    pub fn from_json(json: &str) -> PlanResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> PlanResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> PlanResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply `PLANX_*` environment overrides.
    pub fn apply_env(&mut self) -> PlanResult<()> {
        if let Ok(db) = env::var("PLANX_CURRENT_DB") {
            self.current_db = db;
        }
        if let Ok(value) = env::var("PLANX_STRICT_SQL_MODE") {
            self.strict_sql_mode = value.eq_ignore_ascii_case("true") || value == "1";
        }
        if let Ok(value) = env::var("PLANX_ISOLATION_READ_ENGINES") {
            self.isolation_read_engines = parse_engines(&value)?;
        }
        if let Ok(value) = env::var("PLANX_SPLIT_REGION_MAX_NUM") {
            self.split_region_max_num = value.trim().parse().map_err(|_| {
                PlanError::Config(format!("invalid PLANX_SPLIT_REGION_MAX_NUM: {value}"))
            })?;
        }
        Ok(())
    }

    pub fn system_var(&self, name: &str) -> Option<&str> {
        self.system_vars
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn user_var(&self, name: &str) -> Option<&str> {
        self.user_vars
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Comma-separated engine list, as shown in error messages.
    pub fn isolation_read_engines_str(&self) -> String {
        self.isolation_read_engines
            .iter()
            .map(StoreType::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn parse_engines(value: &str) -> PlanResult<BTreeSet<StoreType>> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            StoreType::parse(s)
                .ok_or_else(|| PlanError::Config(format!("unknown storage engine '{}'", s.trim())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let vars = SessionVars::default();
        assert!(vars.strict_sql_mode);
        assert_eq!(vars.isolation_read_engines.len(), 3);
        assert_eq!(vars.split_region_max_num, DEFAULT_SPLIT_REGION_MAX_NUM);
        assert_eq!(vars.system_var("AUTOCOMMIT"), Some("1"));
    }

    #[test]
    fn test_from_json_partial() {
        let vars = SessionVars::from_json(
            r#"{"current_db": "test", "isolation_read_engines": ["tiflash"]}"#,
        )
        .unwrap();
        assert_eq!(vars.current_db, "test");
        assert!(vars.isolation_read_engines.contains(&StoreType::TiFlash));
        assert!(!vars.isolation_read_engines.contains(&StoreType::TiKV));
        assert!(vars.strict_sql_mode);
    }

    #[test]
    fn test_json_roundtrip_file() {
        let path = std::env::temp_dir().join("planx_session_vars_test.json");
        let vars = SessionVars::new().with_current_db("db1");
        fs::write(&path, vars.to_json().unwrap()).unwrap();

        let loaded = SessionVars::load_from_file(&path).unwrap();
        assert_eq!(loaded, vars);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_parse_engines() {
        let engines = parse_engines("tikv, TiDB").unwrap();
        assert_eq!(engines.len(), 2);
        assert!(parse_engines("tikv,mystery").is_err());
        assert_eq!(StoreType::parse("TIFLASH"), Some(StoreType::TiFlash));
        assert_eq!(StoreType::TiKV.as_str(), "tikv");
    }
}

//! # planx: query compilation core
//!
//! Turns parsed SQL statements into logical plans and copies those plans
//! into an equivalence-class memo for cost-based search.
//!
//! ## Quick start
//!
//! ```rust
//! use planx_core::{CompileContext, MemCatalog, Memo, Plan, PlanBuilder, SessionVars, SqlParser};
//!
//! # fn main() -> planx_core::PlanResult<()> {
//! let catalog = MemCatalog::mock();
//! let stmt = SqlParser::new().parse_one("SELECT b, SUM(a) FROM t2 GROUP BY b")?;
//!
//! let mut ctx = CompileContext::new(SessionVars::new().with_current_db("test"));
//! let plan = PlanBuilder::new(&mut ctx, &catalog).build(&stmt)?;
//!
//! if let Plan::Logical(logical) = plan {
//!     let mut memo = Memo::new();
//!     let root = memo.convert_to_group(&logical);
//!     memo.build_key_info(root);
//!     assert_eq!(memo.group(root).prop.schema.keys.len(), 1);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! SQL text → SqlParser → ast::Statement → PlanBuilder → Plan
//!          → Memo::convert_to_group → Group / GroupExpr
//! ```
//!
//! ## Modules
//!
//! - [`parser`]: SQL text to [`ast`], optimizer hint comments included
//! - [`planner`]: name resolution and logical plan construction
//! - [`memo`]: groups of equivalent expressions, key derivation
//! - [`catalog`]: table metadata consulted while building
//! - [`config`]: session variables
//! - [`error`]: [`PlanError`] and its MySQL error codes

pub mod ast;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod memo;
pub mod parser;
pub mod planner;
pub mod types;

// ===== Re-exports =====
pub use catalog::{InfoSchema, MemCatalog, TableInfo};
pub use config::{SessionVars, StoreType};
pub use error::{ErrorKind, PlanError, PlanResult};
pub use memo::{Group, GroupExpr, GroupId, Memo, Operand};
pub use parser::SqlParser;
pub use planner::{CompileContext, LogicalPlan, Plan, PlanBuilder};
pub use types::{DataType, Datum, FieldType};

//! Statement compilation into logical plans.
//!
//! - [`schema`]: columns, schemas and output names
//! - [`expression`]: resolved scalar expressions
//! - [`plan`]: logical operators and statement plans
//! - [`context`]: per-compile state (column ids, clause stack, hints, warnings)
//! - [`builder`]: the [`PlanBuilder`] itself
//! - [`key_info`]: candidate-key derivation shared with the memo

pub mod builder;
pub mod clause;
pub mod context;
pub mod expression;
pub mod handle_cols;
pub mod hints;
pub mod key_info;
pub mod plan;
pub(crate) mod rewrite;
pub mod schema;

pub use builder::PlanBuilder;
pub use clause::Clause;
pub use context::{CompileContext, ProcessInfo, SessionManager};
pub use expression::Expression;
pub use plan::{LogicalOperator, LogicalPlan, Plan};
pub use schema::{Column, ColumnId, FieldName, Schema};

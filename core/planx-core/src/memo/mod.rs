//! Equivalence-class memo for cost-based search.
//!
//! A [`Memo`] holds [`Group`]s; each group is a set of logically equivalent
//! [`GroupExpr`]s whose inputs are other groups. Search rules add members to
//! groups, and a driver caches the best [`Implementation`] per required
//! [`PhysicalProperty`] on each group.
//!
//! A memo belongs to one compile and is not shared between threads.

pub mod group;
pub mod group_expr;
pub mod implementation;
#[allow(clippy::module_inception)]
pub mod memo;
pub mod property;

pub use group::{Group, GroupProp};
pub use group_expr::{GroupExpr, GroupId, Operand};
pub use implementation::{BaseImplementation, Implementation, PhysicalPlan};
pub use memo::Memo;
pub use property::{PhysicalProperty, SortItem, TaskType};

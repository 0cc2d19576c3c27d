//! Per-compile state threaded through the builder.
//!
//! One [`CompileContext`] lives for exactly one statement. It owns the column
//! id counter, the clause stack, hint tables and the warning list, so nothing
//! in the planner touches process-wide mutable state.

use crate::config::SessionVars;
use crate::error::PlanError;
use crate::planner::clause::{Clause, ClauseStack};
use crate::planner::handle_cols::HandleColHelper;
use crate::planner::hints::TableHintInfo;
use crate::planner::plan::Plan;
use crate::planner::schema::{ColumnId, FieldName, Schema};
use std::fmt;
use std::sync::Arc;

/// A connection as seen by EXPLAIN FOR CONNECTION.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub id: u64,
    pub user: String,
    pub db: String,
    /// Plan of the statement the connection is running.
    pub plan: Option<Arc<Plan>>,
}

/// Lookup of other sessions' state, supplied by the server.
pub trait SessionManager: Send + Sync {
    fn process_info(&self, id: u64) -> Option<ProcessInfo>;
}

/// Name-resolution scope of an enclosing query block.
#[derive(Debug, Clone)]
pub(crate) struct OuterScope {
    pub schema: Schema,
    pub names: Vec<FieldName>,
}

pub struct CompileContext {
    pub vars: SessionVars,
    next_column_id: ColumnId,
    warnings: Vec<PlanError>,
    pub(crate) clauses: ClauseStack,
    pub(crate) table_hints: Vec<TableHintInfo>,
    pub(crate) outer_scopes: Vec<OuterScope>,
    pub(crate) handle_helper: HandleColHelper,
    pub(crate) session_manager: Option<Arc<dyn SessionManager>>,
}

impl fmt::Debug for CompileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileContext")
            .field("current_db", &self.vars.current_db)
            .field("next_column_id", &self.next_column_id)
            .field("warnings", &self.warnings.len())
            .field("clause", &self.clauses.current())
            .finish()
    }
}

impl CompileContext {
    pub fn new(vars: SessionVars) -> Self {
        Self {
            vars,
            next_column_id: 0,
            warnings: Vec::new(),
            clauses: ClauseStack::default(),
            table_hints: Vec::new(),
            outer_scopes: Vec::new(),
            handle_helper: HandleColHelper::default(),
            session_manager: None,
        }
    }

    pub fn with_session_manager(mut self, manager: Arc<dyn SessionManager>) -> Self {
        self.session_manager = Some(manager);
        self
    }

    /// Next column id; ids start at 1 and are unique within this compile.
    pub fn alloc_column_id(&mut self) -> ColumnId {
        self.next_column_id += 1;
        self.next_column_id
    }

    pub fn append_warning(&mut self, warning: PlanError) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[PlanError] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<PlanError> {
        std::mem::take(&mut self.warnings)
    }

    pub fn current_clause(&self) -> Clause {
        self.clauses.current()
    }

    pub fn current_db(&self) -> &str {
        &self.vars.current_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_ids_monotonic() {
        let mut ctx = CompileContext::new(SessionVars::default());
        let a = ctx.alloc_column_id();
        let b = ctx.alloc_column_id();
        assert_eq!(a, 1);
        assert!(b > a);
    }

    #[test]
    fn test_warnings_drain() {
        let mut ctx = CompileContext::new(SessionVars::default());
        ctx.append_warning(PlanError::OptimizerHint("x".into()));
        assert_eq!(ctx.warnings().len(), 1);
        assert_eq!(ctx.take_warnings().len(), 1);
        assert!(ctx.warnings().is_empty());
    }
}

//! Statement compilation.
//!
//! [`PlanBuilder`] walks one [`Statement`] and produces a [`Plan`]. The
//! handlers are split by statement family:
//! - `select`: SELECT, UNION and everything a FROM clause can hold
//! - `insert`: INSERT/REPLACE and generated-column resolution
//! - `mutation`: UPDATE and DELETE
//! - `show`: SHOW, ADMIN and EXPLAIN
//! - `misc`: SET, DO, PREPARE/EXECUTE, ANALYZE, SPLIT REGION, DDL, simple statements

mod insert;
mod misc;
mod mutation;
mod select;
mod show;

use crate::ast::Statement;
use crate::catalog::InfoSchema;
use crate::error::{PlanError, PlanResult};
use crate::logging::BUILDER_TARGET;
use crate::planner::context::CompileContext;
use crate::planner::plan::Plan;
use tracing::{debug, instrument};

pub struct PlanBuilder<'a> {
    pub(crate) ctx: &'a mut CompileContext,
    pub(crate) is: &'a dyn InfoSchema,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(ctx: &'a mut CompileContext, is: &'a dyn InfoSchema) -> Self {
        Self { ctx, is }
    }

    /// Compile one statement.
    #[instrument(skip_all, fields(kind = stmt.kind_name()))]
    pub fn build(&mut self, stmt: &Statement) -> PlanResult<Plan> {
        debug!(target: BUILDER_TARGET, kind = stmt.kind_name(), "building statement");
        match stmt {
            Statement::Admin(s) => self.build_admin(s),
            Statement::Deallocate { name } => Ok(Plan::Deallocate { name: name.clone() }),
            Statement::Delete(s) => self.build_delete(s),
            Statement::Execute { name, using_vars } => self.build_execute(name, using_vars),
            Statement::Explain(s) => self.build_explain(s),
            Statement::ExplainFor {
                connection_id,
                format,
            } => self.build_explain_for(*connection_id, format),
            Statement::Insert(s) => self.build_insert(s),
            Statement::LoadStats { path } => Ok(Plan::LoadStats { path: path.clone() }),
            Statement::Prepare(s) => Ok(self.build_prepare(s)),
            Statement::Select(s) => self.build_select(s).map(Plan::Logical),
            Statement::Union(u) => self.build_union(u).map(Plan::Logical),
            Statement::Update(s) => self.build_update(s),
            Statement::Show(s) => self.build_show(s).map(Plan::Logical),
            Statement::Do(exprs) => self.build_do(exprs),
            Statement::Set(vars) => self.build_set(vars),
            Statement::Analyze(s) => self.build_analyze(s),
            Statement::Simple(s) => self.build_simple(s),
            Statement::Ddl(s) => self.build_ddl(s),
            Statement::SplitRegion(s) => self.build_split_region(s),
            Statement::LoadData { .. } | Statement::Trace(_) => {
                Err(PlanError::UnsupportedType(stmt.kind_name().to_string()))
            }
        }
    }

    /// Database named by `schema`, or the session's current one.
    pub(crate) fn db_or_current(&self, schema: Option<&str>) -> PlanResult<String> {
        let db = schema.unwrap_or(self.ctx.current_db());
        if db.is_empty() {
            return Err(PlanError::NoDb);
        }
        Ok(db.to_string())
    }
}

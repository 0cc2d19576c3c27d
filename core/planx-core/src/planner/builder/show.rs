//! SHOW, ADMIN and EXPLAIN.

use crate::ast::{AdminStmt, AdminType, ExplainStmt, ShowStmt, ShowType, Statement};
use crate::error::{PlanError, PlanResult};
use crate::planner::builder::PlanBuilder;
use crate::planner::clause::Clause;
use crate::planner::expression::{Expression, new_function};
use crate::planner::plan::{AdminPlan, ExplainPlan, LogicalOperator, LogicalPlan, Plan, ShowContents};
use crate::planner::schema::{Column, FieldName, Schema};
use crate::types::{DataType, Datum, FieldType};
use std::sync::Arc;

use DataType::{Datetime, Double, Long, LongLong, Tiny, Varchar};

impl PlanBuilder<'_> {
    /// Result columns with fresh ids.
    pub(crate) fn result_schema(&mut self, cols: &[(&str, DataType)]) -> (Schema, Vec<FieldName>) {
        let columns = cols
            .iter()
            .map(|(_, tp)| Column::new(self.ctx.alloc_column_id(), FieldType::new(*tp)))
            .collect();
        let names = cols.iter().map(|(name, _)| FieldName::new(*name)).collect();
        (Schema::new(columns), names)
    }

    pub(crate) fn build_show(&mut self, show: &ShowStmt) -> PlanResult<LogicalPlan> {
        let db = match show.tp {
            ShowType::Tables | ShowType::TableStatus => self.db_or_current(show.db.as_deref())?,
            ShowType::Columns | ShowType::Index | ShowType::CreateTable | ShowType::CreateView => {
                let schema = show
                    .table
                    .as_ref()
                    .and_then(|t| t.schema.as_deref())
                    .or(show.db.as_deref());
                self.db_or_current(schema)?
            }
            _ => show.db.clone().unwrap_or_default(),
        };
        let contents = ShowContents {
            tp: show.tp,
            db,
            table: show.table.clone(),
            full: show.full,
            user: show.user.clone(),
        };
        let cols = show_columns(&contents);
        let layout: Vec<(&str, DataType)> = cols.iter().map(|(n, t)| (n.as_str(), *t)).collect();
        let (schema, names) = self.result_schema(&layout);
        let mut plan = LogicalPlan::leaf(LogicalOperator::Show(contents), schema, names);

        let mut filtered = false;
        if let Some(pattern) = &show.pattern {
            let first = plan
                .schema
                .columns
                .first()
                .cloned()
                .ok_or_else(|| PlanError::Internal("show statement without columns".into()))?;
            let cond = new_function(
                "like",
                vec![
                    Expression::Column(first),
                    Expression::constant(Datum::String(pattern.clone())),
                ],
            )?;
            plan = LogicalPlan::unary(LogicalOperator::Selection { conditions: vec![cond] }, plan);
            filtered = true;
        }
        if let Some(cond) = &show.where_clause {
            plan = self.build_selection(plan, cond, None, Clause::Show)?;
            filtered = true;
        }
        if filtered {
            // Hide the filter's internal columns behind fresh output columns.
            let exprs = plan.schema.columns.iter().cloned().map(Expression::Column).collect();
            let names = plan.names.clone();
            plan = self.build_projection_node(plan, exprs, names);
        }
        Ok(plan)
    }

    pub(crate) fn build_admin(&mut self, stmt: &AdminStmt) -> PlanResult<Plan> {
        let (plan, cols): (AdminPlan, &[(&str, DataType)]) = match stmt.tp {
            AdminType::ShowNextRowId => {
                let table = stmt
                    .tables
                    .first()
                    .cloned()
                    .ok_or_else(|| PlanError::InvalidValue("ADMIN SHOW NEXT_ROW_ID needs a table".into()))?;
                (
                    AdminPlan::ShowNextRowId { table },
                    &[
                        ("DB_NAME", Varchar),
                        ("TABLE_NAME", Varchar),
                        ("COLUMN_NAME", Varchar),
                        ("NEXT_GLOBAL_ROW_ID", LongLong),
                    ],
                )
            }
            AdminType::ShowDdl => (
                AdminPlan::ShowDdl,
                &[
                    ("SCHEMA_VER", LongLong),
                    ("OWNER_ID", Varchar),
                    ("OWNER_ADDRESS", Varchar),
                    ("RUNNING_JOBS", Varchar),
                    ("SELF_ID", Varchar),
                    ("QUERY", Varchar),
                ],
            ),
            AdminType::ShowDdlJobs => return self.build_show_ddl_jobs(stmt).map(Plan::Logical),
            AdminType::CancelDdlJobs => (
                AdminPlan::CancelDdlJobs {
                    job_ids: stmt.job_ids.clone(),
                },
                &[("JOB_ID", Varchar), ("RESULT", Varchar)],
            ),
            AdminType::ShowDdlJobQueries => (
                AdminPlan::ShowDdlJobQueries {
                    job_ids: stmt.job_ids.clone(),
                },
                &[("QUERY", Varchar)],
            ),
            AdminType::CheckTable | AdminType::RecoverIndex => {
                return Err(PlanError::UnsupportedType(format!("AdminStmt({:?})", stmt.tp)));
            }
        };
        let (schema, names) = self.result_schema(cols);
        Ok(Plan::Admin { plan, schema, names })
    }

    fn build_show_ddl_jobs(&mut self, stmt: &AdminStmt) -> PlanResult<LogicalPlan> {
        let (schema, names) = self.result_schema(&[
            ("JOB_ID", LongLong),
            ("DB_NAME", Varchar),
            ("TABLE_NAME", Varchar),
            ("JOB_TYPE", Varchar),
            ("SCHEMA_STATE", Varchar),
            ("SCHEMA_ID", LongLong),
            ("TABLE_ID", LongLong),
            ("ROW_COUNT", LongLong),
            ("START_TIME", Varchar),
            ("END_TIME", Varchar),
            ("STATE", Varchar),
        ]);
        let plan = LogicalPlan::leaf(
            LogicalOperator::ShowDdlJobs {
                job_number: stmt.job_number,
            },
            schema,
            names,
        );
        match &stmt.where_clause {
            Some(cond) => self.build_selection(plan, cond, None, Clause::Where),
            None => Ok(plan),
        }
    }

    pub(crate) fn build_explain(&mut self, stmt: &ExplainStmt) -> PlanResult<Plan> {
        let target = match stmt.stmt.as_ref() {
            Statement::Show(show) => Plan::Logical(self.build_show(show)?),
            other => self.build(other)?,
        };
        self.build_explain_plan(Some(Arc::new(target)), &stmt.format, stmt.analyze)
    }

    pub(crate) fn build_explain_for(&mut self, connection_id: u64, format: &str) -> PlanResult<Plan> {
        let process = self
            .ctx
            .session_manager
            .as_ref()
            .and_then(|m| m.process_info(connection_id))
            .ok_or(PlanError::NoSuchThread(connection_id))?;
        match process.plan {
            Some(target) => self.build_explain_plan(Some(target), format, false),
            None => Ok(Plan::Explain(ExplainPlan {
                target: None,
                format: format.to_string(),
                analyze: false,
                schema: Schema::default(),
                names: Vec::new(),
            })),
        }
    }

    fn build_explain_plan(&mut self, target: Option<Arc<Plan>>, format: &str, analyze: bool) -> PlanResult<Plan> {
        let mut cols: Vec<(&str, DataType)> = match format.to_ascii_lowercase().as_str() {
            "row" => vec![
                ("id", Varchar),
                ("estRows", Varchar),
                ("task", Varchar),
                ("access object", Varchar),
                ("operator info", Varchar),
            ],
            "dot" => vec![("dot contents", Varchar)],
            _ => {
                return Err(PlanError::InvalidValue(format!(
                    "explain format '{format}' is not supported now"
                )));
            }
        };
        if analyze && cols.len() > 1 {
            cols.extend([
                ("actRows", Varchar),
                ("execution info", Varchar),
                ("memory", Varchar),
                ("disk", Varchar),
            ]);
        }
        let (schema, names) = self.result_schema(&cols);
        Ok(Plan::Explain(ExplainPlan {
            target,
            format: format.to_string(),
            analyze,
            schema,
            names,
        }))
    }
}

/// Result columns of one SHOW kind.
fn show_columns(show: &ShowContents) -> Vec<(String, DataType)> {
    fn varchar(names: &[&str]) -> Vec<(String, DataType)> {
        names.iter().map(|n| (n.to_string(), Varchar)).collect()
    }
    fn typed(cols: &[(&str, DataType)]) -> Vec<(String, DataType)> {
        cols.iter().map(|(n, t)| (n.to_string(), *t)).collect()
    }

    match show.tp {
        ShowType::Engines => varchar(&["Engine", "Support", "Comment", "Transactions", "XA", "Savepoints"]),
        ShowType::Databases => varchar(&["Database"]),
        ShowType::OpenTables => typed(&[
            ("Database", Varchar),
            ("Table", Varchar),
            ("In_use", Long),
            ("Name_locked", Long),
        ]),
        ShowType::Tables => {
            let mut cols = vec![(format!("Tables_in_{}", show.db), Varchar)];
            if show.full {
                cols.push(("Table_type".to_string(), Varchar));
            }
            cols
        }
        ShowType::TableStatus => typed(&[
            ("Name", Varchar),
            ("Engine", Varchar),
            ("Version", LongLong),
            ("Row_format", Varchar),
            ("Rows", LongLong),
            ("Avg_row_length", LongLong),
            ("Data_length", LongLong),
            ("Max_data_length", LongLong),
            ("Index_length", LongLong),
            ("Data_free", LongLong),
            ("Auto_increment", LongLong),
            ("Create_time", Datetime),
            ("Update_time", Datetime),
            ("Check_time", Datetime),
            ("Collation", Varchar),
            ("Checksum", Varchar),
            ("Create_options", Varchar),
            ("Comment", Varchar),
        ]),
        ShowType::Columns if show.full => varchar(&[
            "Field",
            "Type",
            "Collation",
            "Null",
            "Key",
            "Default",
            "Extra",
            "Privileges",
            "Comment",
        ]),
        ShowType::Columns => varchar(&["Field", "Type", "Null", "Key", "Default", "Extra"]),
        ShowType::Warnings | ShowType::Errors => {
            typed(&[("Level", Varchar), ("Code", Long), ("Message", Varchar)])
        }
        ShowType::Charset => typed(&[
            ("Charset", Varchar),
            ("Description", Varchar),
            ("Default collation", Varchar),
            ("Maxlen", LongLong),
        ]),
        ShowType::Variables | ShowType::Status => varchar(&["Variable_name", "Value"]),
        ShowType::Collation => typed(&[
            ("Collation", Varchar),
            ("Charset", Varchar),
            ("Id", LongLong),
            ("Default", Varchar),
            ("Compiled", Varchar),
            ("Sortlen", LongLong),
        ]),
        ShowType::CreateTable => varchar(&["Table", "Create Table"]),
        ShowType::CreateUser => {
            let user = show.user.as_deref().unwrap_or("CURRENT_USER");
            vec![(format!("CREATE USER for {user}"), Varchar)]
        }
        ShowType::CreateView => varchar(&["View", "Create View", "character_set_client", "collation_connection"]),
        ShowType::CreateDatabase => varchar(&["Database", "Create Database"]),
        ShowType::DrainerStatus | ShowType::PumpStatus => typed(&[
            ("NodeID", Varchar),
            ("Address", Varchar),
            ("State", Varchar),
            ("Max_Commit_Ts", LongLong),
            ("Update_Time", Varchar),
        ]),
        ShowType::Grants => match &show.user {
            Some(user) => vec![(format!("Grants for {user}"), Varchar)],
            None => varchar(&["Grants for User"]),
        },
        ShowType::Index => typed(&[
            ("Table", Varchar),
            ("Non_unique", LongLong),
            ("Key_name", Varchar),
            ("Seq_in_index", LongLong),
            ("Column_name", Varchar),
            ("Collation", Varchar),
            ("Cardinality", LongLong),
            ("Sub_part", LongLong),
            ("Packed", Varchar),
            ("Null", Varchar),
            ("Index_type", Varchar),
            ("Comment", Varchar),
            ("Index_comment", Varchar),
            ("Visible", Varchar),
        ]),
        ShowType::ProcessList => typed(&[
            ("Id", LongLong),
            ("User", Varchar),
            ("Host", Varchar),
            ("db", Varchar),
            ("Command", Varchar),
            ("Time", Long),
            ("State", Varchar),
            ("Info", Varchar),
        ]),
        ShowType::StatsMeta => typed(&[
            ("Db_name", Varchar),
            ("Table_name", Varchar),
            ("Partition_name", Varchar),
            ("Update_time", Datetime),
            ("Modify_count", LongLong),
            ("Row_count", LongLong),
        ]),
        ShowType::StatsHistograms => typed(&[
            ("Db_name", Varchar),
            ("Table_name", Varchar),
            ("Partition_name", Varchar),
            ("Column_name", Varchar),
            ("Is_index", Tiny),
            ("Update_time", Datetime),
            ("Distinct_count", LongLong),
            ("Null_count", LongLong),
            ("Avg_col_size", Double),
            ("Correlation", Double),
        ]),
        ShowType::StatsBuckets => typed(&[
            ("Db_name", Varchar),
            ("Table_name", Varchar),
            ("Partition_name", Varchar),
            ("Column_name", Varchar),
            ("Is_index", Tiny),
            ("Bucket_id", LongLong),
            ("Count", LongLong),
            ("Repeats", LongLong),
            ("Lower_Bound", Varchar),
            ("Upper_Bound", Varchar),
        ]),
        ShowType::StatsHealthy => typed(&[
            ("Db_name", Varchar),
            ("Table_name", Varchar),
            ("Partition_name", Varchar),
            ("Healthy", LongLong),
        ]),
        ShowType::Profiles => typed(&[("Query_ID", Long), ("Duration", Double), ("Query", Varchar)]),
        ShowType::MasterStatus => typed(&[
            ("File", Varchar),
            ("Position", LongLong),
            ("Binlog_Do_DB", Varchar),
            ("Binlog_Ignore_DB", Varchar),
            ("Executed_Gtid_Set", Varchar),
        ]),
        ShowType::Privileges => varchar(&["Privilege", "Context", "Comment"]),
        ShowType::Bindings => typed(&[
            ("Original_sql", Varchar),
            ("Bind_sql", Varchar),
            ("Default_db", Varchar),
            ("Status", Varchar),
            ("Create_time", Datetime),
            ("Update_time", Datetime),
            ("Charset", Varchar),
            ("Collation", Varchar),
        ]),
        ShowType::AnalyzeStatus => typed(&[
            ("Table_schema", Varchar),
            ("Table_name", Varchar),
            ("Partition_name", Varchar),
            ("Job_info", Varchar),
            ("Processed_rows", LongLong),
            ("Start_time", Datetime),
            ("State", Varchar),
        ]),
        ShowType::Builtins => varchar(&["Supported_builtin_functions"]),
        ShowType::Regions => typed(&[
            ("REGION_ID", LongLong),
            ("START_KEY", Varchar),
            ("END_KEY", Varchar),
            ("LEADER_ID", LongLong),
            ("LEADER_STORE_ID", LongLong),
            ("PEERS", Varchar),
            ("SCATTERING", LongLong),
            ("WRITTEN_BYTES", LongLong),
            ("READ_BYTES", LongLong),
            ("APPROXIMATE_SIZE(MB)", LongLong),
            ("APPROXIMATE_KEYS", LongLong),
        ]),
        ShowType::Triggers => varchar(&[
            "Trigger",
            "Event",
            "Table",
            "Statement",
            "Timing",
            "Created",
            "sql_mode",
            "Definer",
            "character_set_client",
            "collation_connection",
            "Database Collation",
        ]),
        ShowType::Events => varchar(&[
            "Db",
            "Name",
            "Definer",
            "Time zone",
            "Type",
            "Execute at",
            "Interval value",
            "Interval field",
            "Starts",
            "Ends",
            "Status",
            "Originator",
            "character_set_client",
            "collation_connection",
            "Database Collation",
        ]),
        ShowType::ProcedureStatus => varchar(&[
            "Db",
            "Name",
            "Type",
            "Definer",
            "Modified",
            "Created",
            "Security_type",
            "Comment",
            "character_set_client",
            "collation_connection",
            "Database Collation",
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, TableName};
    use crate::catalog::MemCatalog;
    use crate::config::SessionVars;
    use crate::planner::context::{CompileContext, ProcessInfo, SessionManager};

    struct OneProcess;

    impl SessionManager for OneProcess {
        fn process_info(&self, id: u64) -> Option<ProcessInfo> {
            let plan = (id == 2).then(|| Arc::new(Plan::Logical(LogicalPlan::table_dual(1))));
            (id <= 2).then(|| ProcessInfo {
                id,
                user: "root".into(),
                db: "test".into(),
                plan,
            })
        }
    }

    fn build_in(db: &str, stmt: Statement) -> PlanResult<Plan> {
        let catalog = MemCatalog::mock();
        let mut ctx = CompileContext::new(SessionVars::new().with_current_db(db))
            .with_session_manager(Arc::new(OneProcess));
        PlanBuilder::new(&mut ctx, &catalog).build(&stmt)
    }

    #[test]
    fn test_show_tables_needs_database() {
        let plan = build_in("test", Statement::Show(ShowStmt::new(ShowType::Tables))).unwrap();
        assert_eq!(plan.names()[0].col_name, "Tables_in_test");

        let err = build_in("", Statement::Show(ShowStmt::new(ShowType::TableStatus))).unwrap_err();
        assert!(matches!(err, PlanError::NoDb));
    }

    #[test]
    fn test_show_pattern_adds_selection_and_projection() {
        let mut show = ShowStmt::new(ShowType::Variables);
        show.pattern = Some("sql%".into());
        let plan = build_in("test", Statement::Show(show)).unwrap();
        let logical = plan.as_logical().unwrap();
        assert_eq!(logical.name(), "Projection");
        assert_eq!(logical.children[0].name(), "Selection");
        assert_eq!(logical.names[1].col_name, "Value");
        assert_ne!(
            logical.schema.columns[0].unique_id,
            logical.children[0].schema.columns[0].unique_id
        );
    }

    #[test]
    fn test_show_where_resolves_result_columns() {
        let mut show = ShowStmt::new(ShowType::Columns);
        show.table = Some(TableName::new("t"));
        show.where_clause = Some(Expr::eq(Expr::col("Field"), Expr::string("a")));
        assert!(build_in("test", Statement::Show(show.clone())).is_ok());

        show.where_clause = Some(Expr::eq(Expr::col("nope"), Expr::string("a")));
        assert_eq!(
            build_in("test", Statement::Show(show)).unwrap_err().to_string(),
            "Unknown column 'nope' in 'show statement'"
        );
    }

    #[test]
    fn test_admin_schemas() {
        let plan = build_in("test", Statement::Admin(AdminStmt::new(AdminType::ShowDdl))).unwrap();
        assert_eq!(plan.names().len(), 6);
        assert_eq!(plan.schema().unwrap().columns[0].ret_type.tp, LongLong);

        let mut jobs = AdminStmt::new(AdminType::ShowDdlJobs);
        jobs.where_clause = Some(Expr::eq(Expr::col("STATE"), Expr::string("done")));
        let plan = build_in("test", Statement::Admin(jobs)).unwrap();
        assert_eq!(plan.name(), "Selection");
        assert_eq!(plan.names().len(), 11);

        let err = build_in("test", Statement::Admin(AdminStmt::new(AdminType::CheckTable))).unwrap_err();
        assert!(matches!(err, PlanError::UnsupportedType(_)));
    }

    #[test]
    fn test_explain_formats() {
        let explain = |format: &str, analyze: bool| {
            Statement::Explain(ExplainStmt {
                stmt: Box::new(Statement::Show(ShowStmt::new(ShowType::Databases))),
                format: format.into(),
                analyze,
            })
        };
        let plan = build_in("test", explain("row", false)).unwrap();
        assert_eq!(plan.names().len(), 5);
        let plan = build_in("test", explain("row", true)).unwrap();
        assert_eq!(plan.names().len(), 9);
        let plan = build_in("test", explain("dot", false)).unwrap();
        assert_eq!(plan.names()[0].col_name, "dot contents");
        let err = build_in("test", explain("json", false)).unwrap_err();
        assert_eq!(err.to_string(), "explain format 'json' is not supported now");
    }

    #[test]
    fn test_explain_for_connection() {
        let stmt = |id| Statement::ExplainFor {
            connection_id: id,
            format: "row".into(),
        };
        assert!(matches!(build_in("test", stmt(9)), Err(PlanError::NoSuchThread(9))));

        let Plan::Explain(empty) = build_in("test", stmt(1)).unwrap() else {
            panic!("expected explain");
        };
        assert!(empty.target.is_none());
        assert!(empty.rows().is_empty());

        let Plan::Explain(found) = build_in("test", stmt(2)).unwrap() else {
            panic!("expected explain");
        };
        assert_eq!(found.rows().len(), 1);
    }
}

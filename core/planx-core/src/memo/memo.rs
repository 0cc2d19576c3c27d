//! Arena of groups.

use super::group::Group;
use super::group_expr::{GroupExpr, GroupId, Operand};
use crate::logging::MEMO_TARGET;
use crate::planner::key_info::ChildProp;
use crate::planner::plan::LogicalPlan;
use crate::planner::schema::Schema;
use smallvec::SmallVec;
use tracing::{instrument, trace};

/// Every group of one compile, addressed by [`GroupId`].
///
/// Converting a plan gives each subtree its own group. Two subtrees that
/// print alike can still produce different columns, so they are never merged.
#[derive(Debug, Default)]
pub struct Memo {
    groups: Vec<Group>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// # Panics
    /// If `id` was not issued by this memo.
    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    /// # Panics
    /// If `id` was not issued by this memo.
    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        &mut self.groups[id.0]
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &Group)> {
        self.groups.iter().enumerate().map(|(i, g)| (GroupId(i), g))
    }

    /// Create a group holding only `expr`.
    pub fn add_group(&mut self, expr: GroupExpr, schema: Schema) -> GroupId {
        let id = GroupId(self.groups.len());
        debug_assert!(
            expr.children().iter().all(|c| c.0 < self.groups.len()),
            "child group out of range"
        );
        trace!(target: MEMO_TARGET, group = %id, expr = %expr, "new group");
        self.groups.push(Group::new_with_schema(expr, schema));
        id
    }

    /// Add `expr` as another member of group `id`. The caller vouches that
    /// it yields the group's schema and rows.
    pub fn insert_expr(&mut self, id: GroupId, expr: GroupExpr) -> bool {
        debug_assert!(
            expr.children().iter().all(|c| c.0 < self.groups.len()),
            "child group out of range"
        );
        self.groups[id.0].insert(expr)
    }

    /// Copy a plan tree into the memo, children first, and return the
    /// group of its root. Every plan node gets a new group.
    #[instrument(skip_all)]
    pub fn convert_to_group(&mut self, plan: &LogicalPlan) -> GroupId {
        let children: SmallVec<[GroupId; 2]> =
            plan.children.iter().map(|child| self.convert_to_group(child)).collect();
        let expr = GroupExpr::with_children(plan.op.clone(), children);
        self.add_group(expr, plan.schema.clone())
    }

    /// Derive keys for group `id` and everything below it. Groups that
    /// already ran keep their result.
    pub fn build_key_info(&mut self, id: GroupId) {
        if self.groups[id.0].prop.keys_built {
            return;
        }
        let Some(children) = self.groups[id.0]
            .first_elem(Operand::Any)
            .map(|expr| expr.children().to_vec())
        else {
            return;
        };
        for &child in &children {
            self.build_key_info(child);
        }
        let derived: Vec<(Schema, bool)> = children
            .iter()
            .map(|c| {
                let prop = &self.groups[c.0].prop;
                (prop.schema.clone(), prop.max_one_row)
            })
            .collect();
        let props: Vec<ChildProp<'_>> = derived
            .iter()
            .map(|(schema, max_one_row)| ChildProp {
                schema,
                max_one_row: *max_one_row,
            })
            .collect();
        self.groups[id.0].build_key_info(&props);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AggFunc, Expr, SelectField, SelectStmt, Statement, TableRef};
    use crate::catalog::MemCatalog;
    use crate::config::SessionVars;
    use crate::parser::SqlParser;
    use crate::planner::context::CompileContext;
    use crate::planner::expression::Expression;
    use crate::planner::plan::{LogicalOperator, Plan};
    use crate::planner::schema::Column;
    use crate::planner::PlanBuilder;

    fn logical(stmt: Statement) -> LogicalPlan {
        let catalog = MemCatalog::mock();
        let mut ctx = CompileContext::new(SessionVars::new().with_current_db("test"));
        match PlanBuilder::new(&mut ctx, &catalog).build(&stmt).unwrap() {
            Plan::Logical(p) => p,
            other => panic!("expected a logical plan, got {}", other.name()),
        }
    }

    fn field(expr: Expr) -> SelectField {
        SelectField::Expr { expr, alias: None }
    }

    fn pk_equals_constant() -> LogicalPlan {
        logical(Statement::Select(SelectStmt {
            fields: vec![field(Expr::col("a"))],
            from: Some(TableRef::table("t")),
            where_clause: Some(Expr::eq(Expr::col("a"), Expr::int(10))),
            ..Default::default()
        }))
    }

    fn group_by_b() -> LogicalPlan {
        let sum = Expr::Aggregate {
            func: AggFunc::Sum,
            args: vec![Expr::col("a")],
            distinct: false,
        };
        logical(Statement::Select(SelectStmt {
            fields: vec![field(Expr::col("b")), field(sum)],
            from: Some(TableRef::table("t2")),
            group_by: vec![Expr::col("b")],
            ..Default::default()
        }))
    }

    #[test]
    fn test_convert_to_group_mirrors_tree() {
        let plan = pk_equals_constant();
        let mut memo = Memo::new();
        let root = memo.convert_to_group(&plan);
        assert_eq!(memo.len(), plan.node_count());
        assert_eq!(root, GroupId(memo.len() - 1));

        let top = memo.group(root);
        assert_eq!(top.len(), 1);
        let expr = top.first_elem(Operand::Any).unwrap();
        assert_eq!(expr.operand(), Operand::Projection);
        assert_eq!(expr.children().len(), 1);
        assert_eq!(top.prop.schema, plan.schema);
    }

    /// Columns an operator reads from its inputs.
    fn input_columns(op: &LogicalOperator) -> Vec<Column> {
        let mut exprs: Vec<&Expression> = Vec::new();
        match op {
            LogicalOperator::Selection { conditions } => exprs.extend(conditions),
            LogicalOperator::Projection { exprs: proj, .. } => exprs.extend(proj),
            LogicalOperator::Aggregation { agg_funcs, group_by } => {
                exprs.extend(group_by);
                exprs.extend(agg_funcs.iter().flat_map(|f| &f.args));
            }
            LogicalOperator::Sort { by_items } => exprs.extend(by_items.iter().map(|b| &b.expr)),
            LogicalOperator::Join(join) => {
                exprs.extend(&join.left_conditions);
                exprs.extend(&join.right_conditions);
                exprs.extend(&join.other_conditions);
            }
            _ => {}
        }
        exprs.into_iter().flat_map(|e| e.columns()).cloned().collect()
    }

    /// Every member reads only columns its child groups produce, and join
    /// keys come from the side they name.
    fn assert_columns_resolve(memo: &Memo) -> usize {
        let mut checked_eq = 0;
        for (id, group) in memo.groups() {
            for expr in group.iter() {
                let children: Vec<&Schema> = expr.children().iter().map(|c| &memo.group(*c).prop.schema).collect();
                let visible = children.iter().fold(Schema::default(), |acc, s| Schema::merge(&acc, s));
                for col in input_columns(&expr.op) {
                    assert!(visible.contains(&col), "{id}: {expr} reads a column its inputs lack");
                }
                if let LogicalOperator::Join(join) = &expr.op {
                    for (left, right) in &join.eq_conditions {
                        assert!(children[0].contains(left), "{id}: left key not in left child");
                        assert!(children[1].contains(right), "{id}: right key not in right child");
                        checked_eq += 1;
                    }
                }
            }
        }
        checked_eq
    }

    #[test]
    fn test_convert_to_group_gives_each_subtree_a_group() {
        let plan = pk_equals_constant();
        let mut memo = Memo::new();
        let first = memo.convert_to_group(&plan);
        let second = memo.convert_to_group(&plan);
        assert_ne!(first, second);
        assert_eq!(memo.len(), 2 * plan.node_count());
    }

    #[test]
    fn test_lookalike_subtrees_keep_their_own_columns() {
        let stmt = SqlParser::new()
            .parse_one("select a.x, b.x from (select 1 as x) a join (select 1 as x) b on a.x = b.x")
            .unwrap();
        let plan = logical(stmt);
        let mut memo = Memo::new();
        memo.convert_to_group(&plan);

        assert_eq!(memo.len(), plan.node_count());
        assert!(assert_columns_resolve(&memo) >= 1);
        let join = memo
            .groups()
            .flat_map(|(_, g)| g.iter())
            .find(|e| e.operand() == Operand::Join)
            .unwrap();
        assert_ne!(join.children()[0], join.children()[1]);
    }

    #[test]
    fn test_insert_expr_adds_members() {
        let mut memo = Memo::new();
        let dual = memo.add_group(GroupExpr::new(LogicalOperator::TableDual { row_count: 1 }), Schema::default());
        let limit = GroupExpr::with_children(LogicalOperator::Limit { offset: 0, count: 1 }, [dual]);
        let target = memo.add_group(GroupExpr::new(LogicalOperator::MaxOneRow), Schema::default());

        assert!(memo.insert_expr(target, limit.clone()));
        assert!(!memo.insert_expr(target, limit));
        assert_eq!(memo.group(target).len(), 2);
        assert_eq!(memo.len(), 2);
    }

    #[test]
    fn test_build_key_info() {
        // Primary key pinned by a constant.
        let mut memo = Memo::new();
        let group1 = memo.convert_to_group(&pk_equals_constant());
        memo.build_key_info(group1);
        assert_eq!(memo.group(group1).prop.schema.keys.len(), 1);
        assert!(memo.group(group1).prop.max_one_row);

        // Grouping columns form a key.
        let group2 = memo.convert_to_group(&group_by_b());
        memo.build_key_info(group2);
        let schema2 = memo.group(group2).prop.schema.clone();
        assert_eq!(schema2.keys.len(), 1);
        assert!(!memo.group(group2).prop.max_one_row);

        // A new group inherits its only child's keys.
        let sel = GroupExpr::with_children(LogicalOperator::Selection { conditions: Vec::new() }, [group2]);
        let new_group1 = memo.add_group(sel, schema2.clone());
        memo.build_key_info(new_group1);
        assert_eq!(memo.group(new_group1).prop.schema.keys.len(), 1);

        // Limit 1 returns at most one row.
        let limit = GroupExpr::with_children(LogicalOperator::Limit { offset: 0, count: 1 }, [group2]);
        let new_group2 = memo.add_group(limit, schema2);
        memo.build_key_info(new_group2);
        assert!(memo.group(new_group2).prop.max_one_row);
        assert_eq!(memo.group(new_group2).prop.schema.keys.len(), 1);
    }

    #[test]
    fn test_build_key_info_is_cached() {
        let mut memo = Memo::new();
        let root = memo.convert_to_group(&group_by_b());
        memo.build_key_info(root);
        memo.group_mut(root).prop.schema.keys.clear();
        memo.build_key_info(root);
        assert!(memo.group(root).prop.schema.keys.is_empty());

        memo.group_mut(root).prop.keys_built = false;
        memo.build_key_info(root);
        assert_eq!(memo.group(root).prop.schema.keys.len(), 1);
    }
}

//! Candidate-key and single-row derivation.
//!
//! [`derive_key_info`] computes the keys of one operator from its children's
//! already-derived schemas. It is shared by [`LogicalPlan::build_key_info`]
//! and by memo groups, which run it against one representative member.

use crate::planner::expression::Expression;
use crate::planner::plan::{JoinInfo, JoinType, LogicalOperator, LogicalPlan};
use crate::planner::schema::{Column, KeyInfo, Schema};

/// What a parent needs to know about one derived child.
#[derive(Debug, Clone, Copy)]
pub struct ChildProp<'a> {
    pub schema: &'a Schema,
    pub max_one_row: bool,
}

/// Whether the operator defines its own output columns. Other operators pass
/// their single child's columns (and keys) through.
pub fn produces_schema(op: &LogicalOperator) -> bool {
    !matches!(
        op,
        LogicalOperator::Selection { .. }
            | LogicalOperator::Limit { .. }
            | LogicalOperator::Sort { .. }
            | LogicalOperator::Lock { .. }
            | LogicalOperator::MaxOneRow
    )
}

/// Row-count bound implied by the children alone.
fn has_max_one_row(op: &LogicalOperator, children: &[ChildProp<'_>]) -> bool {
    let Some(first) = children.first() else {
        return false;
    };
    match op {
        LogicalOperator::Lock { .. }
        | LogicalOperator::Limit { .. }
        | LogicalOperator::Sort { .. }
        | LogicalOperator::Selection { .. }
        | LogicalOperator::Apply { .. }
        | LogicalOperator::Projection { .. }
        | LogicalOperator::Aggregation { .. } => first.max_one_row,
        LogicalOperator::MaxOneRow => true,
        LogicalOperator::Join(join) => {
            if join.join_type.is_semi() {
                first.max_one_row
            } else {
                children.iter().all(|c| c.max_one_row)
            }
        }
        _ => false,
    }
}

/// Derive `schema.keys` for `op` and return whether it yields at most one row.
///
/// For a non-producing operator the caller must have copied the single
/// child's keys into `schema` beforehand.
pub fn derive_key_info(op: &LogicalOperator, schema: &mut Schema, children: &[ChildProp<'_>]) -> bool {
    if produces_schema(op) {
        schema.keys.clear();
    }
    let mut max_one_row = has_max_one_row(op, children);

    match op {
        LogicalOperator::DataSource(ds) => {
            for path in &ds.access_paths {
                let Some(index) = &path.index else {
                    continue;
                };
                if !index.unique {
                    continue;
                }
                let mut key = Vec::with_capacity(index.columns.len());
                for idx_col in &index.columns {
                    let pos = ds
                        .columns
                        .iter()
                        .position(|c| c.name.eq_ignore_ascii_case(&idx_col.name));
                    match pos {
                        // NULLs may repeat under a unique index.
                        Some(i) if ds.columns[i].field_type.not_null => key.push(schema.columns[i].clone()),
                        _ => {
                            key.clear();
                            break;
                        }
                    }
                }
                schema.add_key(key);
            }
            if ds.table.pk_is_handle {
                if let Some(i) = ds.columns.iter().position(|c| c.primary_key) {
                    let key = vec![schema.columns[i].clone()];
                    schema.add_key(key);
                }
            }
        }
        LogicalOperator::Selection { conditions } => {
            if let Some(child) = children.first() {
                if pins_a_key(conditions, child.schema) {
                    max_one_row = true;
                }
            }
        }
        LogicalOperator::Projection { exprs, .. } => {
            if let Some(child) = children.first() {
                // Output position of every expression that is a bare column.
                let passthrough: Vec<Option<&Column>> = exprs.iter().map(Expression::as_column).collect();
                for key in &child.schema.keys {
                    let mapped: Option<KeyInfo> = key
                        .iter()
                        .map(|k| {
                            passthrough
                                .iter()
                                .position(|c| c.is_some_and(|c| c.unique_id == k.unique_id))
                                .map(|i| schema.columns[i].clone())
                        })
                        .collect();
                    if let Some(mapped) = mapped {
                        schema.add_key(mapped);
                    }
                }
            }
        }
        LogicalOperator::Aggregation { group_by, .. } => {
            if let Some(child) = children.first() {
                for key in &child.schema.keys {
                    if let Some(mapped) = map_by_id(key, schema) {
                        schema.add_key(mapped);
                    }
                }
            }
            let group_cols: Vec<&Column> = group_by.iter().filter_map(Expression::as_column).collect();
            if !group_by.is_empty() && group_cols.len() == group_by.len() {
                let owned: Vec<Column> = group_cols.into_iter().cloned().collect();
                if let Some(key) = map_by_id(&owned, schema) {
                    schema.add_key(key);
                }
            }
            if group_by.is_empty() {
                max_one_row = true;
            }
        }
        LogicalOperator::Join(join) | LogicalOperator::Apply { join, .. } => {
            join_keys(join, schema, children);
        }
        LogicalOperator::Limit { count, .. } => {
            if *count == 1 {
                max_one_row = true;
            }
        }
        LogicalOperator::TableDual { row_count } => {
            max_one_row = *row_count == 1;
        }
        LogicalOperator::MaxOneRow
        | LogicalOperator::Sort { .. }
        | LogicalOperator::Lock { .. }
        | LogicalOperator::Union
        | LogicalOperator::Show(_)
        | LogicalOperator::ShowDdlJobs { .. } => {}
    }
    max_one_row
}

/// `key` re-expressed with `schema`'s columns, if every member is present.
fn map_by_id(key: &[Column], schema: &Schema) -> Option<KeyInfo> {
    key.iter()
        .map(|k| schema.column_index(k.unique_id).map(|i| schema.columns[i].clone()))
        .collect()
}

/// Equality conditions fix every column of some key to a constant or a
/// correlated value.
fn pins_a_key(conditions: &[Expression], child: &Schema) -> bool {
    let pinned: Vec<&Column> = conditions
        .iter()
        .filter_map(Expression::as_column_eq)
        .filter(|(_, other)| other.is_row_constant())
        .map(|(col, _)| col)
        .collect();
    child.keys.iter().any(|key| {
        key.iter()
            .all(|k| pinned.iter().any(|p| p.unique_id == k.unique_id))
    })
}

fn join_keys(join: &JoinInfo, schema: &mut Schema, children: &[ChildProp<'_>]) {
    let (Some(left), Some(right)) = (children.first(), children.get(1)) else {
        return;
    };
    match join.join_type {
        JoinType::Semi | JoinType::AntiSemi | JoinType::LeftOuterSemi | JoinType::AntiLeftOuterSemi => {
            for key in &left.schema.keys {
                schema.add_key(key.clone());
            }
        }
        JoinType::Inner | JoinType::LeftOuter | JoinType::RightOuter => {
            // Without equalities the product duplicates rows on both sides.
            if join.eq_conditions.is_empty() {
                return;
            }
            let single_key = |keys: &[KeyInfo], col: &Column| {
                keys.iter()
                    .any(|k| k.len() == 1 && k[0].unique_id == col.unique_id)
            };
            let mut l_ok = false;
            let mut r_ok = false;
            for (l, r) in &join.eq_conditions {
                l_ok |= single_key(&left.schema.keys, l);
                r_ok |= single_key(&right.schema.keys, r);
            }
            // An outer join pads the inner side with NULLs.
            if l_ok && join.join_type != JoinType::LeftOuter {
                for key in &right.schema.keys {
                    schema.add_key(key.clone());
                }
            }
            if r_ok && join.join_type != JoinType::RightOuter {
                for key in &left.schema.keys {
                    schema.add_key(key.clone());
                }
            }
        }
    }
}

impl LogicalPlan {
    /// Derive keys and the single-row flag for the whole tree, children first.
    pub fn build_key_info(&mut self) {
        for child in &mut self.children {
            child.build_key_info();
        }
        if self.children.len() == 1 && !produces_schema(&self.op) {
            self.schema.keys = self.children[0].schema.keys.clone();
        }
        let props: Vec<ChildProp<'_>> = self
            .children
            .iter()
            .map(|c| ChildProp {
                schema: &c.schema,
                max_one_row: c.max_one_row,
            })
            .collect();
        self.max_one_row = derive_key_info(&self.op, &mut self.schema, &props);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::expression::new_function;
    use crate::planner::schema::FieldName;
    use crate::types::{DataType, Datum, FieldType};

    fn col(id: u64) -> Column {
        Column::new(id, FieldType::new(DataType::Long))
    }

    fn leaf_with_key(ids: &[u64], key: &[u64]) -> LogicalPlan {
        let schema = Schema::new(ids.iter().map(|&i| col(i)).collect());
        let names = ids.iter().map(|i| FieldName::new(format!("c{i}"))).collect();
        // Hand-set key on a childless node, standing in for a keyed scan.
        let mut plan = LogicalPlan::leaf(LogicalOperator::Union, schema, names);
        plan.schema.keys = vec![key.iter().map(|&i| col(i)).collect()];
        plan
    }

    #[test]
    fn test_selection_pins_composite_key() {
        let child_schema = leaf_with_key(&[1, 2, 3], &[1, 2]).schema;
        let c1 = new_function("eq", vec![Expression::Column(col(1)), Expression::constant(Datum::Int(1))]).unwrap();
        let c2 = new_function("eq", vec![Expression::constant(Datum::Int(2)), Expression::Column(col(2))]).unwrap();

        let op = LogicalOperator::Selection {
            conditions: vec![c1.clone()],
        };
        let mut schema = child_schema.clone();
        let props = [ChildProp {
            schema: &child_schema,
            max_one_row: false,
        }];
        assert!(!derive_key_info(&op, &mut schema, &props));

        let op = LogicalOperator::Selection {
            conditions: vec![c1, c2],
        };
        assert!(derive_key_info(&op, &mut schema, &props));
        assert_eq!(schema.key_ids(), vec![vec![1, 2]]);
    }

    #[test]
    fn test_projection_maps_keys() {
        let child = leaf_with_key(&[1, 2], &[2]);
        let schema = Schema::new(vec![col(10), col(11)]);
        let names = vec![FieldName::new("x"), FieldName::new("y")];
        let exprs = vec![
            Expression::Column(col(2)),
            new_function("plus", vec![Expression::Column(col(1)), Expression::constant(Datum::Int(1))]).unwrap(),
        ];
        let mut proj = LogicalPlan::new(
            LogicalOperator::Projection {
                exprs,
                calculate_no_delay: false,
            },
            vec![child],
            schema,
            names,
        );
        proj.children[0].schema.keys = vec![vec![col(2)]];
        let child_schema = proj.children[0].schema.clone();
        let props = [ChildProp {
            schema: &child_schema,
            max_one_row: false,
        }];
        derive_key_info(&proj.op, &mut proj.schema, &props);
        assert_eq!(proj.schema.key_ids(), vec![vec![10]]);
    }

    #[test]
    fn test_limit_one_and_dual() {
        let mut plan = LogicalPlan::new(
            LogicalOperator::Limit { offset: 0, count: 1 },
            vec![LogicalPlan::table_dual(0)],
            Schema::default(),
            Vec::new(),
        );
        plan.build_key_info();
        assert!(plan.max_one_row);
        assert!(!plan.children[0].max_one_row);

        let mut dual = LogicalPlan::table_dual(1);
        dual.build_key_info();
        assert!(dual.max_one_row);
    }

    #[test]
    fn test_inner_join_keeps_keys_on_unique_eq() {
        let left = Schema {
            columns: vec![col(1), col(2)],
            keys: vec![vec![col(1)]],
        };
        let right = Schema {
            columns: vec![col(3), col(4)],
            keys: vec![vec![col(3)]],
        };
        let mut join = JoinInfo::new(JoinType::Inner);
        join.eq_conditions.push((col(1), col(4)));
        let mut schema = Schema::merge(&left, &right);
        let props = [
            ChildProp {
                schema: &left,
                max_one_row: false,
            },
            ChildProp {
                schema: &right,
                max_one_row: false,
            },
        ];
        derive_key_info(&LogicalOperator::Join(join.clone()), &mut schema, &props);
        // Left side joins on its key, so right keys survive.
        assert_eq!(schema.key_ids(), vec![vec![3]]);

        join.join_type = JoinType::LeftOuter;
        derive_key_info(&LogicalOperator::Join(join), &mut schema, &props);
        assert!(schema.keys.is_empty());
    }
}

//! Row-identity tracking for mutation planning.
//!
//! Plans are built bottom-up, so the helper keeps a stack of
//! `table id -> handle columns` maps:
//! - a table scan pushes a fresh map,
//! - a join pops both children's maps and pushes their merge,
//! - aggregation and union pop and push an empty map,
//! - a finished subquery pops its map.

use crate::planner::schema::{Column, Schema};
use std::collections::BTreeMap;

pub type HandleMap = BTreeMap<i64, Vec<Column>>;

#[derive(Debug, Default)]
pub struct HandleColHelper {
    stack: Vec<HandleMap>,
}

impl HandleColHelper {
    pub fn push_map(&mut self, map: HandleMap) {
        self.stack.push(map);
    }

    /// Pop the active map; an empty stack yields an empty map.
    pub fn pop_map(&mut self) -> HandleMap {
        self.stack.pop().unwrap_or_default()
    }

    /// Push a deep merge of two maps; columns of shared tables are appended.
    pub fn merge_and_push(&mut self, left: &HandleMap, right: &HandleMap) {
        let mut merged = left.clone();
        for (id, cols) in right {
            merged.entry(*id).or_default().extend(cols.iter().cloned());
        }
        self.push_map(merged);
    }

    pub fn tail_map(&self) -> HandleMap {
        self.stack.last().cloned().unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Re-point the active map at a projection's output.
    ///
    /// Each handle column must pass through `exprs` unchanged (at `out`'s
    /// matching position); otherwise row identity is lost and the map is
    /// replaced with an empty one.
    pub fn project_tail(&mut self, passthrough: &[Option<Column>], out: &Schema) {
        let Some(tail) = self.stack.last_mut() else {
            return;
        };
        let mut remapped = HandleMap::new();
        for (id, cols) in tail.iter() {
            let mut new_cols = Vec::with_capacity(cols.len());
            for col in cols {
                let pos = passthrough
                    .iter()
                    .position(|p| p.as_ref().is_some_and(|c| c.unique_id == col.unique_id));
                match pos {
                    Some(pos) => new_cols.push(out.columns[pos].clone()),
                    None => {
                        *tail = HandleMap::new();
                        return;
                    }
                }
            }
            remapped.insert(*id, new_cols);
        }
        *tail = remapped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, FieldType};

    fn col(id: u64) -> Column {
        Column::new(id, FieldType::new(DataType::LongLong))
    }

    #[test]
    fn test_merge_is_deep_copy() {
        let mut helper = HandleColHelper::default();
        let left: HandleMap = [(1, vec![col(1)])].into_iter().collect();
        let right: HandleMap = [(1, vec![col(5)]), (2, vec![col(7)])].into_iter().collect();
        helper.merge_and_push(&left, &right);

        let merged = helper.pop_map();
        assert_eq!(merged[&1].len(), 2);
        assert_eq!(merged[&2][0].unique_id, 7);
        // inputs untouched
        assert_eq!(left[&1].len(), 1);
        assert_eq!(helper.depth(), 0);
    }

    #[test]
    fn test_project_tail() {
        let mut helper = HandleColHelper::default();
        helper.push_map([(1, vec![col(1)])].into_iter().collect());

        let out = Schema::new(vec![col(10), col(11)]);
        helper.project_tail(&[None, Some(col(1))], &out);
        assert_eq!(helper.tail_map()[&1][0].unique_id, 11);

        helper.project_tail(&[Some(col(10)), None], &out);
        assert!(helper.tail_map().is_empty());
    }
}

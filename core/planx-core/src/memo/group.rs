//! An equivalence class of group expressions.

use super::group_expr::{GroupExpr, Operand};
use super::implementation::Implementation;
use super::property::PhysicalProperty;
use crate::logging::MEMO_TARGET;
use crate::planner::key_info::{derive_key_info, produces_schema, ChildProp};
use crate::planner::schema::Schema;
use ahash::AHashMap;
use smallvec::SmallVec;
use tracing::trace;

/// Logical properties shared by every member of a group.
#[derive(Debug, Clone, Default)]
pub struct GroupProp {
    pub schema: Schema,
    pub max_one_row: bool,
    /// Key derivation has run for this group.
    pub keys_built: bool,
}

/// A set of logically equivalent expressions.
///
/// Members live in insertion-ordered slots. Deleting a member leaves a
/// tombstone so slot positions stay stable; a per-operand index points at
/// the earliest live member of each kind and moves forward on delete.
#[derive(Debug)]
pub struct Group {
    slots: Vec<Option<GroupExpr>>,
    live: usize,
    fingerprints: AHashMap<u64, SmallVec<[usize; 1]>>,
    first_by_operand: AHashMap<Operand, usize>,
    impls: AHashMap<PhysicalProperty, Box<dyn Implementation>>,
    pub prop: GroupProp,
    pub explored: bool,
}

impl Group {
    /// A group whose only member is `expr`.
    pub fn new_with_schema(expr: GroupExpr, schema: Schema) -> Self {
        let mut group = Self {
            slots: Vec::new(),
            live: 0,
            fingerprints: AHashMap::new(),
            first_by_operand: AHashMap::new(),
            impls: AHashMap::new(),
            prop: GroupProp {
                schema,
                ..Default::default()
            },
            explored: false,
        };
        group.insert(expr);
        group
    }

    fn position(&self, expr: &GroupExpr) -> Option<usize> {
        self.fingerprints.get(&expr.fingerprint())?.iter().copied().find(|&i| {
            self.slots[i].as_ref().is_some_and(|member| member == expr)
        })
    }

    /// Add `expr` unless an equal member is already present.
    pub fn insert(&mut self, expr: GroupExpr) -> bool {
        if self.position(&expr).is_some() {
            return false;
        }
        let idx = self.slots.len();
        self.fingerprints.entry(expr.fingerprint()).or_default().push(idx);
        self.first_by_operand.entry(expr.operand()).or_insert(idx);
        trace!(target: MEMO_TARGET, expr = %expr, slot = idx, "group insert");
        self.slots.push(Some(expr));
        self.live += 1;
        true
    }

    /// Remove `expr` if it is a member.
    pub fn delete(&mut self, expr: &GroupExpr) {
        let Some(idx) = self.position(expr) else {
            return;
        };
        if let Some(bucket) = self.fingerprints.get_mut(&expr.fingerprint()) {
            bucket.retain(|i| *i != idx);
            if bucket.is_empty() {
                self.fingerprints.remove(&expr.fingerprint());
            }
        }
        self.slots[idx] = None;
        self.live -= 1;

        let operand = expr.operand();
        if self.first_by_operand.get(&operand) == Some(&idx) {
            let next = self.slots[idx + 1..]
                .iter()
                .position(|slot| slot.as_ref().is_some_and(|m| m.operand() == operand))
                .map(|offset| idx + 1 + offset);
            match next {
                Some(next) => {
                    self.first_by_operand.insert(operand, next);
                }
                None => {
                    self.first_by_operand.remove(&operand);
                }
            }
        }
    }

    /// Drop every member.
    pub fn delete_all(&mut self) {
        self.slots.clear();
        self.live = 0;
        self.fingerprints.clear();
        self.first_by_operand.clear();
    }

    pub fn exists(&self, expr: &GroupExpr) -> bool {
        self.position(expr).is_some()
    }

    /// Earliest surviving member whose kind matches `operand`.
    pub fn first_elem(&self, operand: Operand) -> Option<&GroupExpr> {
        let idx = match operand {
            // Every live slot's kind has a first index at or before it.
            Operand::Any => self.first_by_operand.values().min().copied()?,
            _ => *self.first_by_operand.get(&operand)?,
        };
        let member = self.slots[idx].as_ref();
        debug_assert!(member.is_some(), "operand index points at a tombstone");
        member
    }

    /// Live members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GroupExpr> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GroupExpr> {
        self.slots.iter_mut().flatten()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Distinct fingerprints among live members.
    pub fn fingerprint_count(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn get_impl(&self, prop: &PhysicalProperty) -> Option<&dyn Implementation> {
        self.impls.get(prop).map(|imp| imp.as_ref())
    }

    /// Cache `imp` for `prop`, replacing whatever was there.
    pub fn insert_impl(&mut self, prop: PhysicalProperty, imp: Box<dyn Implementation>) {
        self.impls.insert(prop, imp);
    }

    /// Mark the group and all of its members unexplored.
    pub fn reset_explored(&mut self) {
        self.explored = false;
        for member in self.iter_mut() {
            member.explored = false;
        }
    }

    /// Derive keys from the first live member, given its children's
    /// derived properties in child order. Every member is equivalent, so
    /// one representative is enough.
    pub fn build_key_info(&mut self, children: &[ChildProp<'_>]) {
        let Some(idx) = self.first_by_operand.values().min().copied() else {
            return;
        };
        let Some(expr) = self.slots[idx].as_ref() else {
            return;
        };
        debug_assert_eq!(expr.children().len(), children.len(), "child props out of step");
        if let [child] = children
            && !produces_schema(&expr.op)
        {
            self.prop.schema.keys = child.schema.keys.clone();
        }
        self.prop.max_one_row = derive_key_info(&expr.op, &mut self.prop.schema, children);
        self.prop.keys_built = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memo::group_expr::GroupId;
    use crate::memo::implementation::{BaseImplementation, PhysicalPlan};
    use crate::memo::property::SortItem;
    use crate::planner::expression::Expression;
    use crate::planner::plan::LogicalOperator;
    use crate::planner::schema::Column;
    use crate::types::{DataType, Datum, FieldType};

    fn limit(count: u64) -> GroupExpr {
        GroupExpr::new(LogicalOperator::Limit { offset: 0, count })
    }

    fn proj(value: i64) -> GroupExpr {
        GroupExpr::new(LogicalOperator::Projection {
            exprs: vec![Expression::constant(Datum::Int(value))],
            calculate_no_delay: false,
        })
    }

    fn dual() -> GroupExpr {
        GroupExpr::new(LogicalOperator::TableDual { row_count: 1 })
    }

    #[test]
    fn test_new_group() {
        let g = Group::new_with_schema(dual(), Schema::default());
        assert_eq!(g.len(), 1);
        assert_eq!(g.fingerprint_count(), 1);
        assert!(!g.explored);
        assert!(!g.prop.keys_built);
    }

    #[test]
    fn test_group_insert() {
        let expr = dual();
        let mut g = Group::new_with_schema(expr.clone(), Schema::default());
        assert!(!g.insert(expr.clone()));
        assert_eq!(g.len(), 1);

        let mut forced = expr.clone();
        forced.set_fingerprint(expr.fingerprint().wrapping_add(1));
        assert!(g.insert(forced));
        assert_eq!(g.len(), 2);
        assert_eq!(g.fingerprint_count(), 2);
    }

    #[test]
    fn test_fingerprint_collision_falls_back_to_equality() {
        let a = limit(1);
        let mut b = limit(2);
        b.set_fingerprint(a.fingerprint());
        let mut g = Group::new_with_schema(a.clone(), Schema::default());
        assert!(g.insert(b.clone()));
        assert_eq!(g.len(), 2);
        assert_eq!(g.fingerprint_count(), 1);

        g.delete(&b);
        assert!(g.exists(&a));
        assert!(!g.exists(&b));
    }

    #[test]
    fn test_group_delete() {
        let expr = dual();
        let mut g = Group::new_with_schema(expr.clone(), Schema::default());
        assert_eq!(g.len(), 1);

        g.delete(&expr);
        assert_eq!(g.len(), 0);
        assert!(g.is_empty());

        g.delete(&expr);
        assert_eq!(g.len(), 0);
    }

    #[test]
    fn test_group_delete_all() {
        let a = limit(1);
        let b = proj(1);
        let mut g = Group::new_with_schema(a.clone(), Schema::default());
        assert!(g.insert(b.clone()));
        assert_eq!(g.len(), 2);

        g.delete_all();
        assert_eq!(g.len(), 0);
        assert_eq!(g.fingerprint_count(), 0);
        assert!(!g.exists(&a));
        assert!(!g.exists(&b));
        for operand in [Operand::Any, Operand::Limit, Operand::Projection] {
            assert!(g.first_elem(operand).is_none());
        }
    }

    #[test]
    fn test_group_exists() {
        let expr = dual();
        let mut g = Group::new_with_schema(expr.clone(), Schema::default());
        assert!(g.exists(&expr));

        g.delete(&expr);
        assert!(!g.exists(&expr));
    }

    #[test]
    fn test_group_get_first_elem() {
        let (e0, e1, e2, e3, e4) = (proj(0), limit(1), proj(2), limit(3), proj(4));
        let mut g = Group::new_with_schema(e0.clone(), Schema::default());
        for e in [&e1, &e2, &e3, &e4] {
            assert!(g.insert(e.clone()));
        }

        assert_eq!(g.first_elem(Operand::Projection), Some(&e0));
        assert_eq!(g.first_elem(Operand::Limit), Some(&e1));
        assert_eq!(g.first_elem(Operand::Any), Some(&e0));
        assert!(g.first_elem(Operand::Join).is_none());
    }

    #[test]
    fn test_first_elem_after_delete() {
        let (e0, e1, e2, e3, e4) = (proj(0), limit(1), proj(2), limit(3), proj(4));
        let mut g = Group::new_with_schema(e0.clone(), Schema::default());
        for e in [&e1, &e2, &e3, &e4] {
            g.insert(e.clone());
        }

        g.delete(&e0);
        assert_eq!(g.first_elem(Operand::Projection), Some(&e2));
        assert_eq!(g.first_elem(Operand::Any), Some(&e1));

        g.delete(&e3);
        assert_eq!(g.first_elem(Operand::Limit), Some(&e1));
        g.delete(&e1);
        assert!(g.first_elem(Operand::Limit).is_none());
        assert_eq!(g.first_elem(Operand::Any), Some(&e2));

        // Re-inserting puts the member at the back of discovery order.
        g.insert(e0.clone());
        assert_eq!(g.first_elem(Operand::Projection), Some(&e2));
        let order: Vec<&GroupExpr> = g.iter().collect();
        assert_eq!(order, vec![&e2, &e4, &e0]);
    }

    #[test]
    fn test_get_insert_group_impl() {
        let mut g = Group::new_with_schema(limit(1), Schema::default());
        let empty = PhysicalProperty::default();
        assert!(g.get_impl(&empty).is_none());

        let plan = PhysicalPlan::new("Limit", Schema::default());
        g.insert_impl(empty.clone(), Box::new(BaseImplementation::new(plan)));
        assert_eq!(g.get_impl(&PhysicalProperty::default()).map(|i| i.plan().name.as_str()), Some("Limit"));

        let ordered = PhysicalProperty::sorted_by(vec![SortItem {
            col: Column::new(1, FieldType::new(DataType::Long)),
            desc: false,
        }]);
        assert!(g.get_impl(&ordered).is_none());

        let mut cheaper = BaseImplementation::new(PhysicalPlan::new("TopN", Schema::default()));
        cheaper.set_cost(1.0);
        g.insert_impl(empty.clone(), Box::new(cheaper));
        assert_eq!(g.get_impl(&empty).map(|i| i.cost()), Some(1.0));
    }

    #[test]
    fn test_reset_explored() {
        let mut g = Group::new_with_schema(limit(1), Schema::default());
        g.insert(limit(2));
        g.explored = true;
        for member in g.iter_mut() {
            member.explored = true;
        }
        g.reset_explored();
        assert!(!g.explored);
        assert!(g.iter().all(|m| !m.explored));
    }

    #[test]
    fn test_build_key_info_passes_child_keys_through() {
        let col = Column::new(1, FieldType::new(DataType::Long));
        let mut child = Schema::new(vec![col.clone()]);
        child.add_key(vec![col.clone()]);

        let expr = GroupExpr::with_children(LogicalOperator::Limit { offset: 0, count: 1 }, [GroupId(0)]);
        let mut g = Group::new_with_schema(expr, Schema::new(vec![col]));
        g.build_key_info(&[ChildProp {
            schema: &child,
            max_one_row: false,
        }]);
        assert!(g.prop.keys_built);
        assert!(g.prop.max_one_row);
        assert_eq!(g.prop.schema.key_ids(), vec![vec![1]]);
    }
}

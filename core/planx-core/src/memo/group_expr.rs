//! One operator of an equivalence class, with its inputs given as groups.

use crate::planner::plan::LogicalOperator;
use ahash::RandomState;
use smallvec::SmallVec;
use std::fmt;

/// Index of a [`super::Group`] inside its [`super::Memo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// Operator kind used to look members up; `Any` matches every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Any,
    Join,
    Aggregation,
    Projection,
    Selection,
    Apply,
    MaxOneRow,
    TableDual,
    DataSource,
    UnionAll,
    Sort,
    Lock,
    Limit,
    Show,
}

impl Operand {
    pub fn matches(self, other: Operand) -> bool {
        self == Operand::Any || other == Operand::Any || self == other
    }
}

impl From<&LogicalOperator> for Operand {
    fn from(op: &LogicalOperator) -> Self {
        match op {
            LogicalOperator::DataSource(_) => Operand::DataSource,
            LogicalOperator::TableDual { .. } => Operand::TableDual,
            LogicalOperator::Selection { .. } => Operand::Selection,
            LogicalOperator::Projection { .. } => Operand::Projection,
            LogicalOperator::Aggregation { .. } => Operand::Aggregation,
            LogicalOperator::Join(_) => Operand::Join,
            LogicalOperator::Apply { .. } => Operand::Apply,
            LogicalOperator::MaxOneRow => Operand::MaxOneRow,
            LogicalOperator::Limit { .. } => Operand::Limit,
            LogicalOperator::Sort { .. } => Operand::Sort,
            LogicalOperator::Union => Operand::UnionAll,
            LogicalOperator::Lock { .. } => Operand::Lock,
            LogicalOperator::Show(_) | LogicalOperator::ShowDdlJobs { .. } => Operand::Show,
        }
    }
}

// Fixed seeds: fingerprints must agree across groups and memos in one process.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

fn fingerprint_of(op: &LogicalOperator, children: &[GroupId]) -> u64 {
    let state = RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]);
    state.hash_one((Operand::from(op), op, children))
}

/// A logical operator whose children are groups rather than subtrees.
///
/// Two expressions are equal when their operators (payload included) and
/// child groups are equal; the fingerprint is a hash of exactly that, so
/// equal expressions always share a fingerprint.
#[derive(Debug, Clone)]
pub struct GroupExpr {
    pub op: LogicalOperator,
    children: SmallVec<[GroupId; 2]>,
    /// Every rule has been tried on this expression.
    pub explored: bool,
    fingerprint: u64,
}

impl GroupExpr {
    pub fn new(op: LogicalOperator) -> Self {
        Self::with_children(op, [])
    }

    pub fn with_children(op: LogicalOperator, children: impl IntoIterator<Item = GroupId>) -> Self {
        let children: SmallVec<[GroupId; 2]> = children.into_iter().collect();
        let fingerprint = fingerprint_of(&op, &children);
        Self {
            op,
            children,
            explored: false,
            fingerprint,
        }
    }

    pub fn children(&self) -> &[GroupId] {
        &self.children
    }

    /// Replace the inputs; the fingerprint follows.
    pub fn set_children(&mut self, children: impl IntoIterator<Item = GroupId>) {
        self.children = children.into_iter().collect();
        self.fingerprint = fingerprint_of(&self.op, &self.children);
    }

    pub fn operand(&self) -> Operand {
        Operand::from(&self.op)
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Force a fingerprint, to exercise collision handling.
    #[cfg(test)]
    pub(crate) fn set_fingerprint(&mut self, fingerprint: u64) {
        self.fingerprint = fingerprint;
    }
}

impl PartialEq for GroupExpr {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.children == other.children
    }
}

impl fmt::Display for GroupExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op.name())?;
        if !self.children.is_empty() {
            write!(f, "(")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(count: u64) -> LogicalOperator {
        LogicalOperator::Limit { offset: 0, count }
    }

    #[test]
    fn test_fingerprint_covers_payload_and_children() {
        let a = GroupExpr::new(limit(1));
        let b = GroupExpr::new(limit(1));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a, b);

        let c = GroupExpr::new(limit(2));
        assert_ne!(a.fingerprint(), c.fingerprint());

        let mut d = GroupExpr::with_children(limit(1), [GroupId(0)]);
        assert_ne!(a.fingerprint(), d.fingerprint());
        d.set_children([GroupId(1)]);
        assert_eq!(
            d.fingerprint(),
            GroupExpr::with_children(limit(1), [GroupId(1)]).fingerprint()
        );
        assert_eq!(d.to_string(), "Limit(G1)");
    }

    #[test]
    fn test_operand_matching() {
        assert_eq!(GroupExpr::new(LogicalOperator::MaxOneRow).operand(), Operand::MaxOneRow);
        assert_eq!(Operand::from(&LogicalOperator::Union), Operand::UnionAll);
        assert!(Operand::Any.matches(Operand::Limit));
        assert!(Operand::Limit.matches(Operand::Limit));
        assert!(!Operand::Limit.matches(Operand::Projection));
    }
}

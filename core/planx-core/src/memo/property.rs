//! Physical requirements a candidate plan must satisfy.

use crate::planner::schema::Column;
use std::fmt;

/// Where a physical plan fragment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskType {
    #[default]
    Root,
    /// Pushed to the storage layer, single read.
    CopSingleRead,
    /// Index read followed by a table lookup.
    CopDoubleRead,
}

/// One ordering requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortItem {
    pub col: Column,
    pub desc: bool,
}

/// Lookup key of a group's implementation cache; compared structurally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PhysicalProperty {
    pub items: Vec<SortItem>,
    pub task_type: TaskType,
    /// The ordering must be produced by an enforcer if nothing provides it.
    pub enforced: bool,
}

impl PhysicalProperty {
    pub fn sorted_by(items: Vec<SortItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// No ordering requirement.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Every item sorts in the same direction.
    pub fn all_same_order(&self) -> bool {
        self.items.windows(2).all(|w| w[0].desc == w[1].desc)
    }
}

impl fmt::Display for PhysicalProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prop{{cols: [")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", item.col)?;
            if item.desc {
                write!(f, " desc")?;
            }
        }
        write!(f, "], task: {:?}}}", self.task_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, FieldType};

    fn item(id: u64, desc: bool) -> SortItem {
        SortItem {
            col: Column::new(id, FieldType::new(DataType::Long)),
            desc,
        }
    }

    #[test]
    fn test_structural_equality() {
        let a = PhysicalProperty::sorted_by(vec![item(1, false)]);
        let b = PhysicalProperty::sorted_by(vec![item(1, false)]);
        assert_eq!(a, b);
        assert_ne!(a, PhysicalProperty::sorted_by(vec![item(1, true)]));
        assert_ne!(a, PhysicalProperty::default());
        assert!(PhysicalProperty::default().is_empty());
    }

    #[test]
    fn test_same_order_and_display() {
        let prop = PhysicalProperty::sorted_by(vec![item(1, true), item(2, true)]);
        assert!(prop.all_same_order());
        assert_eq!(prop.to_string(), "Prop{cols: [Column#1 desc, Column#2 desc], task: Root}");
        let mixed = PhysicalProperty::sorted_by(vec![item(1, true), item(2, false)]);
        assert!(!mixed.all_same_order());
    }
}

//! Physical realizations cached on a group.

use crate::planner::schema::Schema;
use std::fmt;

/// A physical plan fragment. Operator selection belongs to the search driver;
/// this only carries enough shape to assemble and inspect a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalPlan {
    pub name: String,
    pub schema: Schema,
    pub children: Vec<PhysicalPlan>,
}

impl PhysicalPlan {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            children: Vec::new(),
        }
    }

    pub fn set_children(&mut self, children: Vec<PhysicalPlan>) {
        self.children = children;
    }
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.children.is_empty() {
            write!(f, "(")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// One costed physical realization of a group under some required property.
pub trait Implementation: fmt::Debug + Send {
    /// Cost of this node given the row count it produces and its inputs.
    fn calc_cost(&mut self, out_count: f64, children: &[&dyn Implementation]) -> f64;
    fn set_cost(&mut self, cost: f64);
    fn cost(&self) -> f64;
    fn plan(&self) -> &PhysicalPlan;
    /// Make the children's plans the inputs of this one.
    fn attach_children(&mut self, children: &[&dyn Implementation]);
    /// Cost budget left for the children once this node is paid for.
    fn scale_cost_limit(&self, cost_limit: f64) -> f64;
}

/// Implementation whose own cost is zero: it costs what its inputs cost.
#[derive(Debug, Clone)]
pub struct BaseImplementation {
    plan: PhysicalPlan,
    cost: f64,
}

impl BaseImplementation {
    pub fn new(plan: PhysicalPlan) -> Self {
        Self { plan, cost: 0.0 }
    }
}

impl Implementation for BaseImplementation {
    fn calc_cost(&mut self, _out_count: f64, children: &[&dyn Implementation]) -> f64 {
        self.cost = children.iter().map(|c| c.cost()).sum();
        self.cost
    }

    fn set_cost(&mut self, cost: f64) {
        self.cost = cost;
    }

    fn cost(&self) -> f64 {
        self.cost
    }

    fn plan(&self) -> &PhysicalPlan {
        &self.plan
    }

    fn attach_children(&mut self, children: &[&dyn Implementation]) {
        let plans = children.iter().map(|c| c.plan().clone()).collect();
        self.plan.set_children(plans);
    }

    fn scale_cost_limit(&self, cost_limit: f64) -> f64 {
        cost_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_implementation_sums_children() {
        let mut scan = BaseImplementation::new(PhysicalPlan::new("TableScan", Schema::default()));
        scan.set_cost(10.0);
        let mut sel = BaseImplementation::new(PhysicalPlan::new("Selection", Schema::default()));
        sel.set_cost(2.5);

        let mut join = BaseImplementation::new(PhysicalPlan::new("HashJoin", Schema::default()));
        let children: [&dyn Implementation; 2] = [&scan, &sel];
        assert_eq!(join.calc_cost(100.0, &children), 12.5);
        assert_eq!(join.cost(), 12.5);
        assert_eq!(join.scale_cost_limit(50.0), 50.0);

        join.attach_children(&children);
        assert_eq!(join.plan().to_string(), "HashJoin(TableScan,Selection)");
    }
}

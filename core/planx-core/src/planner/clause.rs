//! Which clause the builder is compiling; only used to word errors.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clause {
    #[default]
    Unknown,
    FieldList,
    Having,
    On,
    OrderBy,
    Where,
    GroupBy,
    Show,
    GlobalOrderBy,
}

impl Clause {
    pub fn message(&self) -> &'static str {
        match self {
            Clause::Unknown => "",
            Clause::FieldList => "field list",
            Clause::Having => "having clause",
            Clause::On => "on clause",
            Clause::OrderBy => "order clause",
            Clause::Where => "where clause",
            Clause::GroupBy => "group statement",
            Clause::Show => "show statement",
            Clause::GlobalOrderBy => "global ORDER clause",
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Stack of clauses entered while compiling nested blocks.
#[derive(Debug, Default)]
pub struct ClauseStack {
    stack: Vec<Clause>,
}

impl ClauseStack {
    pub fn push(&mut self, clause: Clause) {
        self.stack.push(clause);
    }

    pub fn pop(&mut self) -> Option<Clause> {
        self.stack.pop()
    }

    pub fn current(&self) -> Clause {
        self.stack.last().copied().unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_stack() {
        let mut stack = ClauseStack::default();
        assert_eq!(stack.current(), Clause::Unknown);
        stack.push(Clause::Where);
        stack.push(Clause::FieldList);
        assert_eq!(stack.current().to_string(), "field list");
        stack.pop();
        assert_eq!(stack.current(), Clause::Where);
        assert_eq!(Clause::GroupBy.message(), "group statement");
        assert_eq!(Clause::GlobalOrderBy.message(), "global ORDER clause");
    }
}

use crate::component::ComponentPath;

use super::builder::Graph;

/// Differences between the live graph and a newly built one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDiff {
    /// New paths, in the topological order of the new graph.
    pub added: Vec<ComponentPath>,
    /// Paths that persist with different argument expressions, in the topological order of the new graph.
    pub modified: Vec<ComponentPath>,
    /// Paths that persist with identical argument expressions, in the topological order of the new graph.
    pub unchanged: Vec<ComponentPath>,
    /// Paths that disappear, in reverse topological order of the old graph (dependents first).
    pub removed: Vec<ComponentPath>,
}

impl GraphDiff {
    /// Compares two graphs.
    ///
    /// The kind is part of the path, so a persisting path always has the same kind.
    pub fn compute(old: &Graph, new: &Graph) -> Self {
        let mut diff = GraphDiff::default();
        for &i in new.topological_order() {
            let node = new.node(i);
            match old.find(node.path()) {
                None => diff.added.push(node.path().clone()),
                Some(j) if old.node(j).decl.arguments != node.decl.arguments => {
                    diff.modified.push(node.path().clone())
                }
                Some(_) => diff.unchanged.push(node.path().clone()),
            }
        }
        for &j in old.topological_order().iter().rev() {
            let path = old.node(j).path();
            if new.find(path).is_none() {
                diff.removed.push(path.clone());
            }
        }
        diff
    }

    /// Returns true if the graphs have the same nodes with the same arguments.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

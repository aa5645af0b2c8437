use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::component::registry::Registry;
use crate::component::{ComponentDefinition, ComponentPath, Stability};

use super::decl::ComponentDecl;
use super::error::{ConfigError, CycleError, GraphError, LoadError};

/// A validated, acyclic graph of component declarations.
///
/// Nodes are stored in declaration order and identified by their index.
/// Edges are pairs of indices `(dependency, dependent)`: the dependent has an argument
/// that references the exports of the dependency.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    by_path: FxHashMap<ComponentPath, usize>,
    edges: Vec<(usize, usize)>,
    order: Vec<usize>,
}

#[derive(Debug)]
pub struct GraphNode {
    pub decl: ComponentDecl,
    pub definition: Arc<ComponentDefinition>,
    dependencies: Vec<usize>,
    dependents: Vec<usize>,
    rank: usize,
}

impl GraphNode {
    pub fn path(&self) -> &ComponentPath {
        &self.decl.path
    }

    /// Indices of the nodes referenced by this node.
    pub fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }

    /// Indices of the nodes that reference this node.
    pub fn dependents(&self) -> &[usize] {
        &self.dependents
    }

    /// Position of the node in the topological order.
    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl Graph {
    /// Creates a graph without any node.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a graph from declarations.
    ///
    /// # Errors
    /// Returns every structural error that has been found: configuration errors,
    /// unknown kinds, kinds below the minimum stability level, and dependency cycles.
    pub fn build(
        decls: Vec<ComponentDecl>,
        registry: &Registry,
        min_stability: Stability,
    ) -> Result<Graph, LoadError> {
        let mut errors: Vec<GraphError> = Vec::new();

        // index the declarations, skipping the duplicates
        let mut by_path = FxHashMap::default();
        let mut kept = Vec::with_capacity(decls.len());
        for decl in decls {
            if by_path.contains_key(&decl.path) {
                errors.push(ConfigError::DuplicatePath(decl.path).into());
                continue;
            }
            by_path.insert(decl.path.clone(), kept.len());
            kept.push(decl);
        }
        let decls = kept;

        // resolve the kinds
        let mut definitions = Vec::with_capacity(decls.len());
        for decl in &decls {
            let def = resolve_kind(decl, registry, min_stability, &mut errors);
            if let Some(def) = &def {
                check_arguments(decl, def, &mut errors);
            }
            definitions.push(def);
        }

        // resolve the references
        let mut edges = Vec::new();
        let mut seen_edges = FxHashSet::default();
        for (i, decl) in decls.iter().enumerate() {
            for r in decl.references() {
                let Some(&target) = by_path.get(&r.component) else {
                    errors.push(
                        ConfigError::UnknownReference {
                            path: decl.path.clone(),
                            target: r.component.clone(),
                        }
                        .into(),
                    );
                    continue;
                };
                if let Some(def) = &definitions[target] {
                    if !def.exports.accepts_field(&r.export) {
                        errors.push(
                            ConfigError::UnknownExport {
                                path: decl.path.clone(),
                                target: r.component.clone(),
                                export: r.export.clone(),
                            }
                            .into(),
                        );
                    }
                }
                if seen_edges.insert((target, i)) {
                    edges.push((target, i));
                }
            }
        }

        let mut dependencies = vec![Vec::new(); decls.len()];
        let mut dependents = vec![Vec::new(); decls.len()];
        for &(from, to) in &edges {
            dependencies[to].push(from);
            dependents[from].push(to);
        }

        for cycle in find_cycles(&dependents) {
            errors.push(
                CycleError {
                    paths: cycle.into_iter().map(|i| decls[i].path.clone()).collect(),
                }
                .into(),
            );
        }

        if !errors.is_empty() {
            return Err(LoadError { errors });
        }

        let order = topological_order(&dependencies, &dependents);
        let mut ranks = vec![0; decls.len()];
        for (rank, &i) in order.iter().enumerate() {
            ranks[i] = rank;
        }

        let definitions: Vec<Arc<ComponentDefinition>> = definitions.into_iter().flatten().collect();
        debug_assert_eq!(definitions.len(), decls.len());
        let nodes = decls
            .into_iter()
            .zip(definitions)
            .zip(dependencies.into_iter().zip(dependents))
            .zip(ranks)
            .map(|(((decl, definition), (dependencies, dependents)), rank)| GraphNode {
                decl,
                definition,
                dependencies,
                dependents,
                rank,
            })
            .collect();

        Ok(Graph {
            nodes,
            by_path,
            edges,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn node(&self, index: usize) -> &GraphNode {
        &self.nodes[index]
    }

    /// Finds the index of a node by its path.
    pub fn find(&self, path: &ComponentPath) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    /// Iterates on the nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    /// Edges, as `(dependency, dependent)` pairs of node indices.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Node indices in topological order: every node comes after its dependencies.
    /// Independent nodes are ordered by declaration.
    pub fn topological_order(&self) -> &[usize] {
        &self.order
    }

    /// Node index at the given topological `rank`.
    pub fn at_rank(&self, rank: usize) -> usize {
        self.order[rank]
    }
}

fn resolve_kind(
    decl: &ComponentDecl,
    registry: &Registry,
    min_stability: Stability,
    errors: &mut Vec<GraphError>,
) -> Option<Arc<ComponentDefinition>> {
    let Some(def) = registry.lookup(&decl.path.kind) else {
        errors.push(GraphError::UnknownKind {
            path: decl.path.clone(),
        });
        return None;
    };
    if !def.stability.permitted_by(min_stability) {
        errors.push(GraphError::Stability {
            path: decl.path.clone(),
            stability: def.stability,
            min: min_stability,
        });
        return None;
    }
    if def.stability == Stability::Deprecated {
        log::warn!("{}: component kind `{}` is deprecated", decl.path, def.name);
    }
    Some(def.clone())
}

fn check_arguments(decl: &ComponentDecl, def: &ComponentDefinition, errors: &mut Vec<GraphError>) {
    for (name, expr) in &decl.arguments {
        let Some(field) = def.arguments.field(name) else {
            if !def.arguments.is_open() {
                errors.push(
                    ConfigError::UnknownArgument {
                        path: decl.path.clone(),
                        argument: name.clone(),
                    }
                    .into(),
                );
            }
            continue;
        };
        if let Some(actual) = expr.static_kind() {
            if !field.kind.accepts(actual) {
                errors.push(
                    ConfigError::ArgumentKind {
                        path: decl.path.clone(),
                        argument: name.clone(),
                        expected: field.kind,
                        actual,
                    }
                    .into(),
                );
            }
        }
    }
    for field in def.arguments.fields().iter().filter(|f| f.required) {
        if !decl.arguments.contains_key(field.name) {
            errors.push(
                ConfigError::MissingArgument {
                    path: decl.path.clone(),
                    argument: field.name.to_owned(),
                }
                .into(),
            );
        }
    }
}

/// Finds the cycles of the graph.
///
/// Returns one cycle per strongly connected component that has at least two nodes,
/// or a node that depends on itself. The cycle is a shortest one through the smallest
/// index of the component, starting from it, each node followed by one of its successors.
/// Other cycles in the same component are not reported.
fn find_cycles(successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut cycles: Vec<Vec<usize>> = strongly_connected(successors)
        .into_iter()
        .filter(|scc| scc.len() > 1 || successors[scc[0]].contains(&scc[0]))
        .map(|scc| shortest_cycle(successors, &scc))
        .collect();
    cycles.sort_unstable_by_key(|c| c[0]);
    cycles
}

/// Tarjan's algorithm, with an explicit call stack.
///
/// Each component is sorted by index.
fn strongly_connected(successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = successors.len();
    let mut next_index = 0;
    let mut index: Vec<Option<usize>> = vec![None; n];
    let mut lowlink = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut components = Vec::new();
    // (node, position of the next successor to visit)
    let mut calls: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if index[root].is_some() {
            continue;
        }
        calls.push((root, 0));
        while let Some(&mut (v, ref mut next)) = calls.last_mut() {
            if *next == 0 && index[v].is_none() {
                index[v] = Some(next_index);
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            if let Some(&w) = successors[v].get(*next) {
                *next += 1;
                match index[w] {
                    None => calls.push((w, 0)),
                    Some(w_index) if on_stack[w] => lowlink[v] = lowlink[v].min(w_index),
                    Some(_) => (),
                }
                continue;
            }

            // every successor of v has been visited
            calls.pop();
            if let Some(&(parent, _)) = calls.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if Some(lowlink[v]) == index[v] {
                let mut scc = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                scc.sort_unstable();
                components.push(scc);
            }
        }
    }
    components
}

/// Breadth-first search of a shortest cycle through `scc[0]`, inside `scc`.
fn shortest_cycle(successors: &[Vec<usize>], scc: &[usize]) -> Vec<usize> {
    let start = scc[0];
    let members: FxHashSet<usize> = scc.iter().copied().collect();
    let mut parent: FxHashMap<usize, usize> = FxHashMap::default();
    let mut queue = VecDeque::from([start]);
    while let Some(v) = queue.pop_front() {
        for &w in &successors[v] {
            if w == start {
                let (mut cycle, mut node) = (vec![v], v);
                while let Some(&p) = parent.get(&node) {
                    cycle.push(p);
                    node = p;
                }
                cycle.reverse();
                return cycle;
            }
            if members.contains(&w) && !parent.contains_key(&w) {
                parent.insert(w, v);
                queue.push_back(w);
            }
        }
    }
    // not reached: every member of a component is on a cycle through `start`
    scc.to_vec()
}

/// Kahn's algorithm, picking the ready node with the smallest index first.
fn topological_order(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|(_, n)| **n == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(Reverse(v)) = ready.pop() {
        order.push(v);
        for &w in &dependents[v] {
            remaining[w] -= 1;
            if remaining[w] == 0 {
                ready.push(Reverse(w));
            }
        }
    }
    order
}

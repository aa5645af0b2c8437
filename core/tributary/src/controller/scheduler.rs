//! Lifecycle of the nodes: build, update, propagation and teardown.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::FutureExt;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::component::registry::Registry;
use crate::component::{BuildContext, BuildError, ComponentPath, Stability};
use crate::graph::{ComponentDecl, Graph, GraphDiff, LoadError};
use crate::service::Services;
use crate::value::Value;

use super::error::NodeError;
use super::exports::{ExportPublisher, NodeKey};
use super::messages::TaskExit;
use super::node::{Node, NodeInfo, NodeState, NodeTask};

/// Outcome of a successful configuration load.
///
/// The configuration has been accepted, but some nodes may have failed.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Nodes that failed to build or to update.
    pub failures: Vec<Arc<NodeError>>,
    /// Removed nodes that did not stop within the grace period.
    pub shutdown_timeouts: Vec<NodeError>,
    /// Nodes that are waiting for the exports of their dependencies.
    pub pending: Vec<ComponentPath>,
}

impl LoadReport {
    /// Returns true if no node has failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.shutdown_timeouts.is_empty()
    }
}

/// Owns the live graph. All its methods run on the controller task.
pub(crate) struct Scheduler {
    registry: Arc<Registry>,
    services: Arc<Services>,
    min_stability: Stability,
    grace_period: Duration,
    data_path: PathBuf,

    graph: Graph,
    /// Runtime state, same indices as the nodes of `graph`.
    nodes: Vec<Node>,
    by_key: FxHashMap<NodeKey, usize>,
    next_key: u64,

    notify_tx: mpsc::UnboundedSender<NodeKey>,
    exit_tx: mpsc::UnboundedSender<TaskExit>,
}

/// Topological ranks of the nodes to evaluate, smallest first.
type WorkSet = BTreeSet<usize>;

pub(crate) struct SchedulerSettings {
    pub min_stability: Stability,
    pub grace_period: Duration,
    pub data_path: PathBuf,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        services: Arc<Services>,
        settings: SchedulerSettings,
        notify_tx: mpsc::UnboundedSender<NodeKey>,
        exit_tx: mpsc::UnboundedSender<TaskExit>,
    ) -> Self {
        Self {
            registry,
            services,
            min_stability: settings.min_stability,
            grace_period: settings.grace_period,
            data_path: settings.data_path,
            graph: Graph::empty(),
            nodes: Vec::new(),
            by_key: FxHashMap::default(),
            next_key: 1,
            notify_tx,
            exit_tx,
        }
    }

    /// Replaces the configuration.
    ///
    /// If the new graph cannot be built, returns the errors and leaves the live graph untouched.
    /// Otherwise: tears down the removed nodes (dependents first), then evaluates the new nodes,
    /// the modified nodes and the nodes that are not running, in topological order.
    pub async fn load(
        &mut self,
        decls: Vec<ComponentDecl>,
        notifications: &mut mpsc::UnboundedReceiver<NodeKey>,
    ) -> Result<LoadReport, LoadError> {
        let new_graph = Graph::build(decls, &self.registry, self.min_stability)?;
        let diff = GraphDiff::compute(&self.graph, &new_graph);
        log::info!(
            "Loading configuration: {} added, {} modified, {} removed, {} unchanged.",
            diff.added.len(),
            diff.modified.len(),
            diff.removed.len(),
            diff.unchanged.len()
        );

        let mut report = LoadReport::default();
        let mut previous: FxHashMap<ComponentPath, Node> =
            self.nodes.drain(..).map(|n| (n.path.clone(), n)).collect();
        for path in &diff.removed {
            if let Some(node) = previous.remove(path) {
                if let Err(e) = self.teardown(node).await {
                    report.shutdown_timeouts.push(e);
                }
            }
        }

        let mut nodes = Vec::with_capacity(new_graph.len());
        for gnode in new_graph.nodes() {
            let node = match previous.remove(gnode.path()) {
                Some(node) => node,
                None => {
                    let key = NodeKey(self.next_key);
                    self.next_key += 1;
                    Node::new(key, gnode.path().clone())
                }
            };
            nodes.push(node);
        }
        debug_assert!(previous.is_empty(), "every old node must be kept or removed");

        self.graph = new_graph;
        self.nodes = nodes;
        self.by_key = self.nodes.iter().enumerate().map(|(i, n)| (n.key, i)).collect();

        let changed: FxHashSet<&ComponentPath> = diff.added.iter().chain(&diff.modified).collect();
        let mut work = WorkSet::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let not_running = matches!(node.state, NodeState::Unbuilt | NodeState::Failed);
            if not_running || changed.contains(&node.path) {
                work.insert(self.graph.node(i).rank());
            }
        }
        self.process(work, notifications, &mut report.failures);

        report.pending = self
            .nodes
            .iter()
            .filter(|n| n.state == NodeState::Unbuilt)
            .map(|n| n.path.clone())
            .collect();
        Ok(report)
    }

    /// Re-evaluates the dependents of nodes whose exports have changed.
    pub fn propagate(&mut self, key: NodeKey, notifications: &mut mpsc::UnboundedReceiver<NodeKey>) {
        let mut work = WorkSet::new();
        self.schedule_dependents(key, &mut work);
        let mut failures = Vec::new();
        self.process(work, notifications, &mut failures);
    }

    /// Handles the end of a node task.
    pub fn task_exited(&mut self, exit: TaskExit) {
        let TaskExit { key, path, result } = exit;
        let running = self.by_key.get(&key).and_then(|&i| self.nodes.get_mut(i)).filter(|node| {
            // a cancelled task has been asked to stop
            node.task.as_ref().is_some_and(|t| !t.token.is_cancelled())
        });
        let Some(node) = running else {
            match result {
                Ok(()) => log::debug!("{path} stopped."),
                Err(e) => log::warn!("{path} stopped with an error: {e:#}"),
            }
            return;
        };
        node.task = None;
        node.component = None;
        let error = match result {
            Ok(()) => NodeError::Exited { path },
            Err(source) => NodeError::Run { path, source },
        };
        node.fail(error);
    }

    /// Describes every node, in topological order.
    pub fn list(&self) -> Vec<NodeInfo> {
        self.graph
            .topological_order()
            .iter()
            .map(|&i| self.info(i))
            .collect()
    }

    /// Describes one node.
    pub fn node(&self, path: &ComponentPath) -> Option<NodeInfo> {
        self.graph.find(path).map(|i| self.info(i))
    }

    /// Tears the whole graph down, dependents first.
    ///
    /// Returns the paths of the nodes that did not stop within the grace period.
    pub async fn shutdown(&mut self) -> Vec<ComponentPath> {
        let order: Vec<usize> = self.graph.topological_order().iter().rev().copied().collect();
        let mut nodes: Vec<Option<Node>> = self.nodes.drain(..).map(Some).collect();
        let mut timeouts = Vec::new();
        for i in order {
            if let Some(node) = nodes[i].take() {
                if let Err(e) = self.teardown(node).await {
                    timeouts.push(e.path().clone());
                }
            }
        }
        self.graph = Graph::empty();
        self.by_key.clear();
        timeouts
    }

    fn info(&self, i: usize) -> NodeInfo {
        let dependencies = self
            .graph
            .node(i)
            .dependencies()
            .iter()
            .map(|&d| self.graph.node(d).path().clone())
            .collect();
        self.nodes[i].info(dependencies)
    }

    /// Evaluates the nodes of the work set in topological order, until the set is empty.
    ///
    /// The dependents of the nodes that publish new exports are added to the set.
    /// A node is evaluated at most once per rank extraction, with the latest exports of its dependencies.
    fn process(
        &mut self,
        mut work: WorkSet,
        notifications: &mut mpsc::UnboundedReceiver<NodeKey>,
        failures: &mut Vec<Arc<NodeError>>,
    ) {
        self.drain_notifications(notifications, &mut work);
        while let Some(rank) = work.pop_first() {
            let i = self.graph.at_rank(rank);
            if let Some(error) = self.evaluate(i) {
                failures.push(error);
            }
            self.drain_notifications(notifications, &mut work);
        }
    }

    fn drain_notifications(&mut self, notifications: &mut mpsc::UnboundedReceiver<NodeKey>, work: &mut WorkSet) {
        while let Ok(key) = notifications.try_recv() {
            self.schedule_dependents(key, work);
        }
    }

    fn schedule_dependents(&self, key: NodeKey, work: &mut WorkSet) {
        let Some(&i) = self.by_key.get(&key) else {
            // removed from the graph
            return;
        };
        if !self.nodes[i].exports.take_dirty() {
            return;
        }
        for &d in self.graph.node(i).dependents() {
            work.insert(self.graph.node(d).rank());
        }
    }

    /// Evaluates the arguments of a node, then builds or updates it.
    fn evaluate(&mut self, i: usize) -> Option<Arc<NodeError>> {
        let decl = &self.graph.node(i).decl;
        let arguments = decl.evaluate(&mut |r| {
            let j = self.graph.find(&r.component)?;
            let exports = self.nodes[j].exports.snapshot()?;
            Some(exports.get(&r.export).cloned().unwrap_or(Value::Null))
        });
        let Some(arguments) = arguments else {
            log::debug!("{} is waiting for the exports of its dependencies.", decl.path);
            return None;
        };

        let (state, built) = (self.nodes[i].state, self.nodes[i].component.is_some());
        match (state, built) {
            (NodeState::Terminating | NodeState::Terminated, _) => None,
            (_, false) => self.build(i, arguments),
            (_, true) => self.update(i, arguments),
        }
    }

    fn build(&mut self, i: usize, arguments: Value) -> Option<Arc<NodeError>> {
        let definition = self.graph.node(i).definition.clone();
        let node = &mut self.nodes[i];
        log::debug!("Building {}...", node.path);
        node.state = NodeState::Building;

        let ctx = BuildContext {
            id: node.path.clone(),
            exports: ExportPublisher::new(node.exports.clone(), node.key, self.notify_tx.clone()),
            services: self.services.clone(),
            data_path: self.data_path.join(node.path.to_string()),
        };
        let built = std::panic::catch_unwind(AssertUnwindSafe(|| definition.build(ctx, arguments.clone())))
            .unwrap_or_else(|panic| Err(BuildError::invalid(anyhow!("build panicked: {}", panic_message(&*panic)))));

        match built {
            Ok(component) => {
                let token = CancellationToken::new();
                let run = component.clone().run(token.clone());
                let exit_tx = self.exit_tx.clone();
                let (key, path) = (node.key, node.path.clone());
                let handle = tokio::spawn(async move {
                    let result = match AssertUnwindSafe(run).catch_unwind().await {
                        Ok(res) => res,
                        Err(panic) => Err(anyhow!("task panicked: {}", panic_message(&*panic))),
                    };
                    // the controller may be gone during the shutdown
                    let _ = exit_tx.send(TaskExit { key, path, result });
                });

                node.task = Some(NodeTask { token, handle });
                node.component = Some(component);
                node.arguments = Some(arguments);
                node.error = None;
                node.builds += 1;
                node.state = NodeState::Running;
                log::info!("Component {} is running.", node.path);
                None
            }
            Err(source) => {
                let path = node.path.clone();
                Some(node.fail(NodeError::Build { path, source }))
            }
        }
    }

    fn update(&mut self, i: usize, arguments: Value) -> Option<Arc<NodeError>> {
        let node = &mut self.nodes[i];
        if node.arguments.as_ref() == Some(&arguments) {
            if node.state == NodeState::Failed {
                // a rejected update was reverted: the component still runs with these arguments
                log::info!("{} is back to its last applied arguments.", node.path);
                node.error = None;
                node.state = NodeState::Running;
            } else {
                log::trace!("{}: arguments unchanged, no update.", node.path);
            }
            return None;
        }
        let component = node.component.clone()?;
        log::debug!("Updating {}...", node.path);
        node.state = NodeState::Updating;

        let updated = std::panic::catch_unwind(AssertUnwindSafe(|| component.update(arguments.clone())))
            .unwrap_or_else(|panic| Err(anyhow!("update panicked: {}", panic_message(&*panic))));
        match updated {
            Ok(()) => {
                node.arguments = Some(arguments);
                node.error = None;
                node.updates += 1;
                node.state = NodeState::Running;
                None
            }
            Err(source) => {
                // the task keeps running with the previous arguments
                let path = node.path.clone();
                Some(node.fail(NodeError::Update { path, source }))
            }
        }
    }

    /// Stops the task of a node, waiting at most for the grace period.
    async fn teardown(&self, mut node: Node) -> Result<(), NodeError> {
        log::debug!("Stopping {}...", node.path);
        node.state = NodeState::Terminating;
        let mut result = Ok(());
        if let Some(NodeTask { token, mut handle }) = node.task.take() {
            token.cancel();
            match tokio::time::timeout(self.grace_period, &mut handle).await {
                Ok(Ok(())) => (),
                Ok(Err(e)) => log::error!("The task of {} could not be joined: {e}", node.path),
                Err(_) => {
                    handle.abort();
                    let error = NodeError::ShutdownTimeout {
                        path: node.path.clone(),
                        grace: self.grace_period,
                    };
                    log::warn!("{error}");
                    result = Err(error);
                }
            }
        }
        node.component = None;
        node.state = NodeState::Terminated;
        result
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

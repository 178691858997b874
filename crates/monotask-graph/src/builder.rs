use std::collections::{HashMap, HashSet};

use petgraph::{graph::NodeIndex, Graph};
use tracing::debug;

use crate::{
    pipeline::{Pipeline, PipelineEntry},
    task_id::{DepRef, TaskId},
    workspace::{WorkspaceGraph, WorkspaceName},
    GraphError,
};

/// One node of the task graph: the synthetic root, or a materialized task.
/// Mirrors the teacher's `engine::TaskNode` split so a single root node can
/// anchor `--parallel` rewiring (§4.5 step 4) without a special case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskNode {
    Root,
    Task(TaskId),
}

impl std::fmt::Display for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskNode::Root => write!(f, "___ROOT___"),
            TaskNode::Task(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Building;
#[derive(Debug, Default)]
pub struct Built;

/// Type-state task graph: `Engine<Building>` is mutable and used only during
/// [`GraphBuilder::build`]; [`Engine::seal`] freezes it into `Engine<Built>`,
/// which is read-only for the rest of the run (scheduler, summary, CLI
/// `--graph` rendering). Grounded on `engine/mod.rs`'s `Engine<S>`.
#[derive(Debug)]
pub struct Engine<S = Built> {
    marker: std::marker::PhantomData<S>,
    graph: Graph<TaskNode, ()>,
    root: NodeIndex,
    lookup: HashMap<TaskId, NodeIndex>,
    definitions: HashMap<TaskId, PipelineEntry>,
}

impl Engine<Building> {
    fn new() -> Self {
        let mut graph = Graph::default();
        let root = graph.add_node(TaskNode::Root);
        Self {
            marker: std::marker::PhantomData,
            graph,
            root,
            lookup: HashMap::new(),
            definitions: HashMap::new(),
        }
    }

    fn index_for(&mut self, id: &TaskId) -> NodeIndex {
        if let Some(index) = self.lookup.get(id) {
            return *index;
        }
        let index = self.graph.add_node(TaskNode::Task(id.clone()));
        self.lookup.insert(id.clone(), index);
        index
    }

    fn connect_to_root(&mut self, id: &TaskId) {
        let index = self.index_for(id);
        self.graph.add_edge(index, self.root, ());
    }

    fn add_edge(&mut self, from: &TaskId, to: &TaskId) {
        let from_index = self.index_for(from);
        let to_index = self.index_for(to);
        self.graph.add_edge(from_index, to_index, ());
    }

    fn seal(self) -> Engine<Built> {
        Engine {
            marker: std::marker::PhantomData,
            graph: self.graph,
            root: self.root,
            lookup: self.lookup,
            definitions: self.definitions,
        }
    }
}

impl Engine<Built> {
    pub fn contains(&self, id: &TaskId) -> bool {
        self.lookup.contains_key(id)
    }

    pub fn definition(&self, id: &TaskId) -> Option<&PipelineEntry> {
        self.definitions.get(id)
    }

    /// Direct dependencies of `id` (outgoing edges), excluding the root.
    pub fn dependencies(&self, id: &TaskId) -> Vec<&TaskId> {
        let Some(index) = self.lookup.get(id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(*index, petgraph::Direction::Outgoing)
            .filter_map(|n| match self.graph.node_weight(n) {
                Some(TaskNode::Task(dep)) => Some(dep),
                _ => None,
            })
            .collect()
    }

    /// Direct dependents of `id` (incoming edges), excluding the root.
    pub fn dependents(&self, id: &TaskId) -> Vec<&TaskId> {
        let Some(index) = self.lookup.get(id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(*index, petgraph::Direction::Incoming)
            .filter_map(|n| match self.graph.node_weight(n) {
                Some(TaskNode::Task(dep)) => Some(dep),
                _ => None,
            })
            .collect()
    }

    /// A stable linear ordering: topological, ties broken by `id` (spec.md
    /// §4.5's required output). Dependencies sort before dependents since
    /// edges point from a task to what it depends on.
    pub fn stable_order(&self) -> Result<Vec<TaskId>, GraphError> {
        let sorted = petgraph::algo::toposort(&self.graph, None).map_err(|cycle| {
            let node = self.graph.node_weight(cycle.node_id()).cloned();
            GraphError::Cycle(node.map(|n| n.to_string()).unwrap_or_default())
        })?;

        // toposort yields dependents-before-dependencies (root-ward first);
        // reverse so dependencies come first, matching "B before A" in §8.
        let mut ids: Vec<TaskId> = sorted
            .into_iter()
            .rev()
            .filter_map(|index| match self.graph.node_weight(index) {
                Some(TaskNode::Task(id)) => Some(id.clone()),
                _ => None,
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn task_graph(&self) -> &Graph<TaskNode, ()> {
        &self.graph
    }

    /// Validates spec.md §3's global invariants that apply to a frozen
    /// graph: acyclic (checked by [`Self::stable_order`] at build time
    /// already, re-checked here defensively) and no persistent task has
    /// dependents.
    pub fn validate(&self) -> Result<(), Vec<GraphError>> {
        let mut errors = Vec::new();
        for (id, definition) in &self.definitions {
            if definition.persistent && !self.dependents(id).is_empty() {
                let dependents: Vec<String> =
                    self.dependents(id).into_iter().map(|d| d.to_string()).collect();
                errors.push(GraphError::PersistentTaskHasDependents {
                    task: id.to_string(),
                    dependents,
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Parameters and algorithm for turning a workspace graph + pipeline into a
/// frozen task graph. Grounded on `engine::EngineBuilder` (the
/// `build`-by-steps shape), generalized to spec.md §4.5's five-step
/// algorithm.
pub struct GraphBuilder<'a> {
    workspaces: &'a WorkspaceGraph,
    pipeline: &'a Pipeline,
    targets: &'a [String],
    scope: HashSet<WorkspaceName>,
    parallel: bool,
    only: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        workspaces: &'a WorkspaceGraph,
        pipeline: &'a Pipeline,
        targets: &'a [String],
    ) -> Self {
        Self {
            workspaces,
            pipeline,
            targets,
            scope: workspaces.names().cloned().collect(),
            parallel: false,
            only: false,
        }
    }

    pub fn with_scope(mut self, scope: HashSet<WorkspaceName>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_only(mut self, only: bool) -> Self {
        self.only = only;
        self
    }

    pub fn build(self) -> Result<Engine<Built>, GraphError> {
        let mut engine = Engine::<Building>::new();

        // Step 1: materialize P#T for each target task and in-scope package.
        let mut frontier: Vec<TaskId> = Vec::new();
        for target in self.targets {
            for package in &self.scope {
                let id = TaskId::new(package.clone(), target.clone());
                match self.pipeline.resolve(&id) {
                    Some(entry) => {
                        engine.index_for(&id);
                        engine.definitions.insert(id.clone(), entry.clone());
                        frontier.push(id);
                    }
                    None if self.workspaces.has_script(package, target) => {
                        return Err(GraphError::UnknownTask(id.to_string()));
                    }
                    None => {
                        debug!(task = %id, "no pipeline entry or script, skipping package for task");
                    }
                }
            }
        }

        // Step 2: expand depends_on transitively over the frontier.
        let mut queue = frontier.clone();
        let mut visited: HashSet<TaskId> = frontier.iter().cloned().collect();
        while let Some(id) = queue.pop() {
            let Some(entry) = self.pipeline.resolve(&id).cloned() else {
                continue;
            };
            engine.definitions.entry(id.clone()).or_insert(entry.clone());

            for dep_ref in &entry.depends_on {
                let deps = self.expand_dep_ref(&id, dep_ref)?;
                for dep in deps {
                    engine.add_edge(&id, &dep);
                    if visited.insert(dep.clone()) {
                        queue.push(dep);
                    }
                }
            }
        }

        // Step 3: validate referenced nodes exist and carry a definition;
        // acyclicity and persistent/dependents are checked after sealing.
        for id in engine.lookup.keys() {
            if !engine.definitions.contains_key(id) {
                return Err(GraphError::MissingDefinition(id.to_string()));
            }
        }

        let mut sealed = engine.seal();

        // Step 4: --parallel drops all edges except those anchoring to root.
        if self.parallel {
            let ids: Vec<TaskId> = sealed.lookup.keys().cloned().collect();
            let mut rebuilt = Engine::<Building>::new();
            for id in &ids {
                rebuilt.connect_to_root(id);
                if let Some(def) = sealed.definitions.remove(id) {
                    rebuilt.definitions.insert(id.clone(), def);
                }
            }
            sealed = rebuilt.seal();
        }

        // Step 5: --only prunes nodes whose task name isn't a target.
        if self.only {
            let keep: HashSet<&str> = self.targets.iter().map(String::as_str).collect();
            sealed.graph.retain_nodes(|graph, index| match &graph[index] {
                TaskNode::Root => true,
                TaskNode::Task(id) => keep.contains(id.task.as_str()),
            });
            sealed.lookup.retain(|id, _| keep.contains(id.task.as_str()));
            sealed.definitions.retain(|id, _| keep.contains(id.task.as_str()));
        }

        sealed.stable_order()?;
        if let Err(errors) = sealed.validate() {
            return Err(errors.into_iter().next().expect("non-empty error list"));
        }

        Ok(sealed)
    }

    fn expand_dep_ref(&self, from: &TaskId, dep_ref: &DepRef) -> Result<Vec<TaskId>, GraphError> {
        match dep_ref {
            DepRef::Same(task) => Ok(vec![TaskId::new(from.package.clone(), task.clone())]),
            DepRef::Explicit(id) => {
                if !self.workspaces.contains(&id.package) {
                    return Err(GraphError::MissingPackage(id.package.to_string()));
                }
                Ok(vec![id.clone()])
            }
            DepRef::Topological(task) => Ok(self
                .workspaces
                .transitive_internal_deps(&from.package)
                .into_iter()
                .map(|dep_package| TaskId::new(dep_package, task.clone()))
                .collect()),
        }
    }
}

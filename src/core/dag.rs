//! Workflow graph validation and ready-frontier computation.
//!
//! `validate` and `ready_tasks` are pure functions over a task list. The
//! `WorkflowGraph` wraps a validated list in a petgraph `DiGraph` for the
//! structural queries the engine needs (dependents, predicted waves).

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Validate a task set.
///
/// Checks, in order: task ids are unique, no timeout override is zero,
/// every dependency names an existing task, and the dependency relation is
/// acyclic. Cycles are found with a
/// depth-first traversal that tracks the current recursion stack, so the
/// returned error carries the offending path.
pub fn validate(tasks: &[Task]) -> Result<()> {
    let mut seen: HashSet<&TaskId> = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen.insert(&task.id) {
            return Err(Error::DuplicateId(task.id.clone()));
        }
        if task.timeout_ms == Some(0) {
            return Err(Error::InvalidTimeout(task.id.clone()));
        }
    }

    for task in tasks {
        for dep in &task.dependencies {
            if !seen.contains(dep) {
                return Err(Error::UnknownDependency {
                    task_id: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
    let mut marks: HashMap<&TaskId, Mark> = HashMap::with_capacity(tasks.len());
    let mut stack: Vec<&TaskId> = Vec::new();

    for task in tasks {
        if !marks.contains_key(&task.id) {
            if let Some(path) = find_cycle(&task.id, &by_id, &mut marks, &mut stack) {
                return Err(Error::CycleDetected { path });
            }
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

fn find_cycle<'a>(
    id: &'a TaskId,
    by_id: &HashMap<&'a TaskId, &'a Task>,
    marks: &mut HashMap<&'a TaskId, Mark>,
    stack: &mut Vec<&'a TaskId>,
) -> Option<Vec<TaskId>> {
    marks.insert(id, Mark::OnStack);
    stack.push(id);

    if let Some(&task) = by_id.get(id) {
        for dep in &task.dependencies {
            match marks.get(dep) {
                Some(Mark::OnStack) => {
                    let start = stack.iter().position(|s| *s == dep).unwrap_or(0);
                    let mut path: Vec<TaskId> =
                        stack[start..].iter().map(|s| (*s).clone()).collect();
                    path.push(dep.clone());
                    return Some(path);
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(path) = find_cycle(dep, by_id, marks, stack) {
                        return Some(path);
                    }
                }
            }
        }
    }

    stack.pop();
    marks.insert(id, Mark::Done);
    None
}

/// Every task not in `completed` whose dependencies are all in `completed`.
pub fn ready_tasks(completed: &HashSet<TaskId>, tasks: &[Task]) -> BTreeSet<TaskId> {
    tasks
        .iter()
        .filter(|task| !completed.contains(&task.id))
        .filter(|task| task.dependencies.iter().all(|dep| completed.contains(dep)))
        .map(|task| task.id.clone())
        .collect()
}

/// A validated workflow task graph.
///
/// Edges point from a dependency to its dependent, so a task's incoming
/// neighbors are what it waits on.
pub struct WorkflowGraph {
    graph: DiGraph<TaskId, ()>,
    index: HashMap<TaskId, NodeIndex>,
    tasks: Vec<Task>,
}

impl WorkflowGraph {
    /// Validate `tasks` and build the graph.
    pub fn new(tasks: Vec<Task>) -> Result<Self> {
        validate(&tasks)?;

        let mut graph = DiGraph::with_capacity(tasks.len(), tasks.len());
        let mut index = HashMap::with_capacity(tasks.len());
        for task in &tasks {
            index.insert(task.id.clone(), graph.add_node(task.id.clone()));
        }
        for task in &tasks {
            let to = index[&task.id];
            for dep in &task.dependencies {
                graph.add_edge(index[dep], to, ());
            }
        }

        Ok(Self {
            graph,
            index,
            tasks,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    /// Tasks that directly depend on `id`.
    pub fn dependents(&self, id: &TaskId) -> BTreeSet<TaskId> {
        match self.index.get(id) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => BTreeSet::new(),
        }
    }

    /// Every task that depends on `id`, directly or transitively.
    pub fn transitive_dependents(&self, id: &TaskId) -> BTreeSet<TaskId> {
        let Some(&start) = self.index.get(id) else {
            return BTreeSet::new();
        };
        let mut out = BTreeSet::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                out.insert(self.graph[node].clone());
            }
        }
        out
    }

    pub fn ready_tasks(&self, completed: &HashSet<TaskId>) -> BTreeSet<TaskId> {
        ready_tasks(completed, &self.tasks)
    }

    /// Task ids ordered so that every task follows its dependencies.
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| Error::CycleDetected {
            path: vec![self.graph[cycle.node_id()].clone()],
        })?;
        Ok(sorted.into_iter().map(|n| self.graph[n].clone()).collect())
    }

    /// The waves the engine will run when every task succeeds.
    pub fn levels(&self) -> Vec<BTreeSet<TaskId>> {
        let mut completed = HashSet::with_capacity(self.tasks.len());
        let mut levels = Vec::new();
        loop {
            let ready = self.ready_tasks(&completed);
            if ready.is_empty() {
                break;
            }
            completed.extend(ready.iter().cloned());
            levels.push(ready);
        }
        levels
    }
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("tasks", &self.graph.node_count())
            .field("dependencies", &self.graph.edge_count())
            .finish()
    }
}

//! Dependency graph of a routing decision
//!
//! Validates the decision's edges and computes a deterministic topological
//! rank for every task. Ties between tasks that become ready together are
//! broken by their position in the decision.

use crate::router::RoutingDecision;
use sdk::errors::EngineError;
use std::collections::{BTreeSet, HashMap};

/// Validated task graph, indexed by task position in the decision
#[derive(Debug, Clone)]
pub struct TaskGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
    rank: Vec<usize>,
}

impl TaskGraph {
    /// Build and validate the graph for a decision
    ///
    /// Rejects duplicate ids, self-edges, edges to unknown tasks and cycles.
    pub fn build(decision: &RoutingDecision) -> Result<Self, EngineError> {
        if decision.tasks.is_empty() {
            return Err(EngineError::InvalidDecision(
                "decision contains no tasks".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(decision.tasks.len());
        for (position, task) in decision.tasks.iter().enumerate() {
            if index.insert(task.id.clone(), position).is_some() {
                return Err(EngineError::InvalidDecision(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }

        let count = decision.tasks.len();
        let mut deps = vec![Vec::new(); count];
        let mut dependents = vec![Vec::new(); count];
        for (position, task) in decision.tasks.iter().enumerate() {
            for dep in &task.depends_on {
                if dep == &task.id {
                    return Err(EngineError::InvalidDecision(format!(
                        "task '{}' depends on itself",
                        task.id
                    )));
                }
                let Some(&upstream) = index.get(dep) else {
                    return Err(EngineError::InvalidDecision(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.id, dep
                    )));
                };
                if !deps[position].contains(&upstream) {
                    deps[position].push(upstream);
                    dependents[upstream].push(position);
                }
            }
        }

        // Kahn's algorithm; the ready set is ordered by decision position
        let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &child in &dependents[next] {
                remaining[child] -= 1;
                if remaining[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        if order.len() != count {
            let stuck: Vec<&str> = (0..count)
                .filter(|&i| remaining[i] > 0)
                .map(|i| decision.tasks[i].id.as_str())
                .collect();
            return Err(EngineError::InvalidDecision(format!(
                "dependency cycle among tasks: {}",
                stuck.join(", ")
            )));
        }

        let mut rank = vec![0; count];
        for (position, &task) in order.iter().enumerate() {
            rank[task] = position;
        }

        Ok(Self {
            ids: decision.tasks.iter().map(|t| t.id.clone()).collect(),
            index,
            deps,
            dependents,
            order,
            rank,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, task: usize) -> &str {
        &self.ids[task]
    }

    pub fn position(&self, task_id: &str) -> Option<usize> {
        self.index.get(task_id).copied()
    }

    /// Direct prerequisites of a task
    pub fn deps(&self, task: usize) -> &[usize] {
        &self.deps[task]
    }

    /// Tasks that directly depend on `task`
    pub fn dependents(&self, task: usize) -> &[usize] {
        &self.dependents[task]
    }

    /// Deterministic topological order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Position of a task in [`TaskGraph::order`]
    pub fn rank(&self, task: usize) -> usize {
        self.rank[task]
    }

    /// Whether no other task depends on this one
    pub fn is_top_level(&self, task: usize) -> bool {
        self.dependents[task].is_empty()
    }

    /// Every task reachable downstream of `task`, in topological order
    pub fn descendants(&self, task: usize) -> Vec<usize> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![task];
        while let Some(current) = stack.pop() {
            for &child in &self.dependents[current] {
                if seen.insert(self.rank[child]) {
                    stack.push(child);
                }
            }
        }
        seen.into_iter().map(|rank| self.order[rank]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::TaskSpec;
    use proptest::prelude::*;
    use sdk::types::{AgentKind, TaskParams};

    fn spec(id: &str, deps: &[&str]) -> TaskSpec {
        let mut task = TaskSpec::new(id, AgentKind::new(id), TaskParams::new());
        for dep in deps {
            task = task.depends_on(*dep);
        }
        task
    }

    fn decision(tasks: Vec<TaskSpec>) -> RoutingDecision {
        RoutingDecision::new("s1", "request", tasks)
    }

    fn order_ids(graph: &TaskGraph) -> Vec<&str> {
        graph.order().iter().map(|&i| graph.id(i)).collect()
    }

    #[test]
    fn test_prerequisite_runs_first() {
        let graph = TaskGraph::build(&decision(vec![
            spec("blog", &["research"]),
            spec("research", &[]),
            spec("image", &[]),
        ]))
        .unwrap();

        assert_eq!(order_ids(&graph), vec!["research", "image", "blog"]);
        assert!(graph.is_top_level(graph.position("blog").unwrap()));
        assert!(!graph.is_top_level(graph.position("research").unwrap()));
    }

    #[test]
    fn test_rejects_cycle() {
        let err = TaskGraph::build(&decision(vec![spec("a", &["b"]), spec("b", &["a"])]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDecision(msg) if msg.contains("cycle")));
    }

    #[test]
    fn test_rejects_self_edge_unknown_dep_and_duplicates() {
        assert!(matches!(
            TaskGraph::build(&decision(vec![spec("a", &["a"])])),
            Err(EngineError::InvalidDecision(_))
        ));
        assert!(matches!(
            TaskGraph::build(&decision(vec![spec("a", &["ghost"])])),
            Err(EngineError::InvalidDecision(_))
        ));
        assert!(matches!(
            TaskGraph::build(&decision(vec![spec("a", &[]), spec("a", &[])])),
            Err(EngineError::InvalidDecision(_))
        ));
        assert!(matches!(
            TaskGraph::build(&decision(vec![])),
            Err(EngineError::InvalidDecision(_))
        ));
    }

    #[test]
    fn test_descendants_follow_chain() {
        let graph = TaskGraph::build(&decision(vec![
            spec("a", &[]),
            spec("b", &["a"]),
            spec("c", &["b"]),
            spec("d", &[]),
        ]))
        .unwrap();

        let desc: Vec<&str> = graph
            .descendants(0)
            .into_iter()
            .map(|i| graph.id(i))
            .collect();
        assert_eq!(desc, vec!["b", "c"]);
        assert!(graph.descendants(3).is_empty());
    }

    proptest! {
        // Edges only point to earlier positions, so every generated graph is acyclic
        #[test]
        fn prop_order_respects_every_edge(
            edges in prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..3), 1..10)
        ) {
            let tasks: Vec<TaskSpec> = edges
                .iter()
                .enumerate()
                .map(|(i, picks)| {
                    let mut task = TaskSpec::new(format!("t{i}"), AgentKind::new("k"), TaskParams::new());
                    if i > 0 {
                        for pick in picks {
                            task = task.depends_on(format!("t{}", pick.index(i)));
                        }
                    }
                    task
                })
                .collect();

            let graph = TaskGraph::build(&decision(tasks)).unwrap();
            prop_assert_eq!(graph.order().len(), graph.len());
            for task in 0..graph.len() {
                for &dep in graph.deps(task) {
                    prop_assert!(graph.rank(dep) < graph.rank(task));
                }
            }

            let again = TaskGraph::build(&decision(
                (0..graph.len()).map(|i| {
                    let mut t = TaskSpec::new(graph.id(i), AgentKind::new("k"), TaskParams::new());
                    for &d in graph.deps(i) { t = t.depends_on(graph.id(d)); }
                    t
                }).collect()
            )).unwrap();
            prop_assert_eq!(again.order(), graph.order());
        }
    }
}

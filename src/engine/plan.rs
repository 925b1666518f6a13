// ABOUTME: Dependency graph management and wave-based execution planning
// ABOUTME: Topological ordering of workflow steps with exact cycle reporting

use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::{Direction, Graph};
use std::collections::{HashMap, HashSet};

use super::error::{ExecutionError, Result};
use crate::workflow::Workflow;

#[derive(Debug)]
pub struct DependencyGraph {
    graph: Graph<String, ()>,
    step_indices: HashMap<String, NodeIndex>,
    /// Node indices in declaration order, so planning stays deterministic.
    ordered: Vec<NodeIndex>,
}

/// A sequence of waves. Every step in a wave has all of its dependencies in
/// strictly earlier waves; waves execute sequentially, steps within a wave
/// concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub waves: Vec<Vec<String>>,
    pub total_steps: usize,
}

impl DependencyGraph {
    pub fn from_workflow(workflow: &Workflow) -> Result<Self> {
        let mut graph = Graph::new();
        let mut step_indices = HashMap::new();
        let mut ordered = Vec::with_capacity(workflow.steps.len());

        for step_id in workflow.steps.keys() {
            let node = graph.add_node(step_id.clone());
            step_indices.insert(step_id.clone(), node);
            ordered.push(node);
        }

        for (step_id, step) in &workflow.steps {
            let step_node = step_indices[step_id];
            for dependency in &step.depends_on {
                match step_indices.get(dependency) {
                    // Edge points dependency -> dependent.
                    Some(&dep_node) => {
                        graph.add_edge(dep_node, step_node, ());
                    }
                    None => {
                        return Err(ExecutionError::Definition(
                            crate::workflow::DefinitionError::UnknownDependency {
                                step: step_id.clone(),
                                dependency: dependency.clone(),
                            },
                        ));
                    }
                }
            }
        }

        Ok(Self {
            graph,
            step_indices,
            ordered,
        })
    }

    /// Build the wave plan, or fail naming exactly the steps on cycles.
    pub fn create_plan(&self) -> Result<ExecutionPlan> {
        let cyclic = self.cyclic_steps();
        if !cyclic.is_empty() {
            return Err(ExecutionError::CycleDetected { steps: cyclic });
        }

        let mut waves = Vec::new();
        let mut placed: HashSet<NodeIndex> = HashSet::new();
        let mut remaining: Vec<NodeIndex> = self.ordered.clone();

        while !remaining.is_empty() {
            let mut wave_nodes = Vec::new();
            for &node in &remaining {
                let ready = self
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .all(|dep| placed.contains(&dep));
                if ready {
                    wave_nodes.push(node);
                }
            }

            // Unreachable once cycles are ruled out.
            if wave_nodes.is_empty() {
                let stuck = remaining
                    .iter()
                    .map(|&node| self.graph[node].clone())
                    .collect();
                return Err(ExecutionError::CycleDetected { steps: stuck });
            }

            remaining.retain(|node| !wave_nodes.contains(node));
            let mut wave = Vec::with_capacity(wave_nodes.len());
            for node in wave_nodes {
                placed.insert(node);
                wave.push(self.graph[node].clone());
            }
            waves.push(wave);
        }

        Ok(ExecutionPlan {
            waves,
            total_steps: self.step_indices.len(),
        })
    }

    /// Steps lying on a dependency cycle, in declaration order.
    fn cyclic_steps(&self) -> Vec<String> {
        let mut on_cycle: HashSet<NodeIndex> = HashSet::new();
        for component in tarjan_scc(&self.graph) {
            if component.len() > 1 {
                on_cycle.extend(component);
            }
        }
        for &node in &self.ordered {
            if self.graph.find_edge(node, node).is_some() {
                on_cycle.insert(node);
            }
        }

        self.ordered
            .iter()
            .filter(|node| on_cycle.contains(node))
            .map(|&node| self.graph[node].clone())
            .collect()
    }

    pub fn dependencies_of(&self, step_id: &str) -> Vec<String> {
        self.neighbors(step_id, Direction::Incoming)
    }

    pub fn dependents_of(&self, step_id: &str) -> Vec<String> {
        self.neighbors(step_id, Direction::Outgoing)
    }

    fn neighbors(&self, step_id: &str, direction: Direction) -> Vec<String> {
        match self.step_indices.get(step_id) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, direction)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Steps with no dependencies; wave 0 of any valid plan.
    pub fn root_steps(&self) -> Vec<String> {
        self.ordered
            .iter()
            .filter(|&&node| {
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|&node| self.graph[node].clone())
            .collect()
    }
}

impl ExecutionPlan {
    pub fn depth(&self) -> usize {
        self.waves.len()
    }

    pub fn max_parallelism(&self) -> usize {
        self.waves.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn contains_step(&self, step_id: &str) -> bool {
        self.wave_of(step_id).is_some()
    }

    pub fn wave_of(&self, step_id: &str) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.iter().any(|s| s == step_id))
    }
}

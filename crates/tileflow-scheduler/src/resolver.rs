//! Intra-workflow dependency tracking
//!
//! Per workflow: outstanding-predecessor counts plus a successor index.
//! Jobs are promoted to ready when their count reaches zero; failure and
//! cancellation cascade along the successor edges.

use std::collections::HashMap;

#[derive(Debug, Default)]
struct WorkflowGraph {
    /// job_id -> number of predecessors not yet SUCCEEDED
    outstanding: HashMap<String, usize>,
    /// job_id -> jobs that depend on it
    successors: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
pub struct DependencyResolver {
    graphs: HashMap<String, WorkflowGraph>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validated workflow's dependency graph
    pub fn register_workflow<'a, I>(&mut self, workflow_id: &str, jobs: I)
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let mut graph = WorkflowGraph::default();
        for (job_id, depends_on) in jobs {
            graph.outstanding.insert(job_id.to_string(), depends_on.len());
            for predecessor in depends_on {
                graph
                    .successors
                    .entry(predecessor.clone())
                    .or_default()
                    .push(job_id.to_string());
            }
        }
        self.graphs.insert(workflow_id.to_string(), graph);
    }

    /// Jobs with no predecessors at submission time
    pub fn initially_ready(&self, workflow_id: &str) -> Vec<String> {
        self.graphs
            .get(workflow_id)
            .map(|graph| {
                graph
                    .outstanding
                    .iter()
                    .filter(|(_, count)| **count == 0)
                    .map(|(job_id, _)| job_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record a success; returns the successors whose last predecessor this
    /// was, in other words the newly-ready jobs
    pub fn on_succeeded(&mut self, workflow_id: &str, job_id: &str) -> Vec<String> {
        let Some(graph) = self.graphs.get_mut(workflow_id) else {
            return Vec::new();
        };
        let mut ready = Vec::new();
        let successors = graph.successors.get(job_id).cloned().unwrap_or_default();
        for successor in successors {
            if let Some(count) = graph.outstanding.get_mut(&successor) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push(successor);
                }
            }
        }
        ready
    }

    /// Direct successors of a job
    pub fn successors(&self, workflow_id: &str, job_id: &str) -> Vec<String> {
        self.graphs
            .get(workflow_id)
            .and_then(|graph| graph.successors.get(job_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn remove_workflow(&mut self, workflow_id: &str) {
        self.graphs.remove(workflow_id);
    }
}

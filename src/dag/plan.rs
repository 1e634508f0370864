// src/dag/plan.rs

//! Would-be execution order, computed without executing anything.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::job::Job;
use crate::errors::{HopdagError, Result};
use crate::types::JobId;

/// Jobs grouped in waves: wave *n* holds the jobs whose longest requirement
/// chain has length *n*. Jobs in one wave never depend on each other, so a
/// run may execute each wave concurrently (and often overlaps waves).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub label: String,
    pub waves: Vec<Vec<JobId>>,
}

impl ExecutionPlan {
    /// Build from jobs in declaration order. Requirements on unknown jobs
    /// are ignored; cycles are an error.
    pub fn compute(label: &str, jobs: &[&Job]) -> Result<Self> {
        // Edge direction: requirement -> job.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for job in jobs {
            graph.add_node(job.id());
        }
        for job in jobs {
            for dep in job.required() {
                if graph.contains_node(dep.as_str()) {
                    graph.add_edge(dep.as_str(), job.id(), ());
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            HopdagError::Cycle(vec![cycle.node_id().to_string()])
        })?;

        let mut level: HashMap<&str, usize> = HashMap::new();
        for id in order {
            let depth = graph
                .neighbors_directed(id, petgraph::Direction::Incoming)
                .filter_map(|dep| level.get(dep).map(|l| l + 1))
                .max()
                .unwrap_or(0);
            level.insert(id, depth);
        }

        let mut waves: Vec<Vec<JobId>> = Vec::new();
        for job in jobs {
            let depth = level.get(job.id()).copied().unwrap_or(0);
            if waves.len() <= depth {
                waves.resize_with(depth + 1, Vec::new);
            }
            waves[depth].push(job.id().to_string());
        }

        Ok(Self {
            label: label.to_string(),
            waves,
        })
    }

    pub fn job_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "plan for {} ({} jobs)", self.label, self.job_count())?;
        for (idx, wave) in self.waves.iter().enumerate() {
            writeln!(f, "  wave {}: {}", idx + 1, wave.join(", "))?;
        }
        Ok(())
    }
}

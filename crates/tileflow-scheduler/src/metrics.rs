//! Dashboard metrics view
//!
//! Read-only snapshot over the scheduler core, computed under the shared
//! read lock so it observes a consistent point in time.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tileflow_core::{JobStatus, UtcDateTime};
use utoipa::ToSchema;

use crate::engine::SchedulerCore;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkerStats {
    /// Jobs currently RUNNING across the system
    pub total: usize,
    /// The MAX_WORKERS cap
    pub limit: usize,
    pub per_tenant: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueDepthStats {
    /// Jobs waiting in branch queues
    pub total: usize,
    pub per_tenant: BTreeMap<String, usize>,
    /// Keyed `{tenant}/{branch}`
    pub per_branch: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActiveUserStats {
    pub count: usize,
    /// The MAX_ACTIVE_USERS cap
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardSnapshot {
    pub active_workers: WorkerStats,
    pub queue_depth: QueueDepthStats,
    pub active_users: ActiveUserStats,
    /// Mean latency of completions in the sliding window, in minutes
    pub job_latency_minutes: f64,
    pub system_health: SystemHealth,
}

pub(crate) fn collect(core: &SchedulerCore, now: UtcDateTime) -> DashboardSnapshot {
    let mut per_tenant_workers: BTreeMap<String, usize> = BTreeMap::new();
    for workflow in core.registry.workflows() {
        let running = workflow
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .count();
        if running > 0 {
            *per_tenant_workers
                .entry(workflow.tenant_id.clone())
                .or_default() += running;
        }
    }

    let mut per_tenant_depth: BTreeMap<String, usize> = BTreeMap::new();
    let mut per_branch_depth: BTreeMap<String, usize> = BTreeMap::new();
    for (branch_key, depth) in core.branches.depths() {
        if depth == 0 {
            continue;
        }
        *per_tenant_depth
            .entry(branch_key.tenant_id.clone())
            .or_default() += depth;
        per_branch_depth.insert(branch_key.to_string(), depth);
    }

    DashboardSnapshot {
        active_workers: WorkerStats {
            total: core.running,
            limit: core.settings.max_workers,
            per_tenant: per_tenant_workers,
        },
        queue_depth: QueueDepthStats {
            total: core.branches.total_depth(),
            per_tenant: per_tenant_depth,
            per_branch: per_branch_depth,
        },
        active_users: ActiveUserStats {
            count: core.admission.active_count(),
            limit: core.admission.cap(),
        },
        job_latency_minutes: core.latency.average_minutes(now),
        system_health: structural_health(core),
    }
}

/// Structural self-test over the live state
///
/// Verifies: at most one RUNNING job per (tenant, branch); the global
/// RUNNING count within the worker cap; active tenants within the admission
/// cap; every RUNNING job's predecessors SUCCEEDED.
fn structural_health(core: &SchedulerCore) -> SystemHealth {
    if !core.healthy {
        return SystemHealth::Unhealthy;
    }

    let mut running_branches = HashSet::new();
    let mut running_total = 0usize;
    let mut live_tenants = HashSet::new();

    for workflow in core.registry.workflows() {
        for job in &workflow.jobs {
            match job.status {
                JobStatus::Running => {
                    running_total += 1;
                    if !running_branches.insert(job.branch_key()) {
                        return SystemHealth::Unhealthy;
                    }
                    let blocked = job.depends_on.iter().any(|dep| {
                        workflow
                            .job(dep)
                            .map(|predecessor| predecessor.status != JobStatus::Succeeded)
                            .unwrap_or(true)
                    });
                    if blocked {
                        return SystemHealth::Unhealthy;
                    }
                    live_tenants.insert(workflow.tenant_id.clone());
                }
                JobStatus::Pending => {
                    live_tenants.insert(workflow.tenant_id.clone());
                }
                _ => {}
            }
        }
    }

    if running_total > core.settings.max_workers
        || live_tenants.len() > core.settings.max_active_users
    {
        return SystemHealth::Unhealthy;
    }
    SystemHealth::Healthy
}

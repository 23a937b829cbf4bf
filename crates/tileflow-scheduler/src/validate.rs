//! Workflow submission validation
//!
//! Every rule is checked before any state is written; the first violation
//! is returned as a typed `validation_failed` error.

use std::collections::{HashMap, HashSet};

use tileflow_core::{ControlError, ExecutorRegistry, WorkflowSpec};

/// Validate a submission against the structural rules
///
/// Workflow-id uniqueness is checked by the registry under the same lock;
/// everything else lives here.
pub fn validate_submission(
    spec: &WorkflowSpec,
    executors: &ExecutorRegistry,
) -> Result<(), ControlError> {
    if spec.jobs.is_empty() {
        return Err(ControlError::validation("workflow has no jobs"));
    }

    let mut seen = HashSet::new();
    for job in &spec.jobs {
        if job.job_id.is_empty() {
            return Err(ControlError::validation("job id must be non-empty"));
        }
        if !seen.insert(job.job_id.as_str()) {
            return Err(ControlError::validation(format!(
                "duplicate job id '{}'",
                job.job_id
            )));
        }
        if job.branch.is_empty() {
            return Err(ControlError::validation(format!(
                "job '{}' has an empty branch",
                job.job_id
            )));
        }
        if job.image_path.is_empty() {
            return Err(ControlError::validation(format!(
                "job '{}' has an empty image path",
                job.job_id
            )));
        }
        if !executors.supports(job.job_type) {
            return Err(ControlError::validation(format!(
                "no executor registered for job type '{}'",
                job.job_type
            )));
        }
    }

    let dependencies: HashMap<&str, &[String]> = spec
        .jobs
        .iter()
        .map(|job| (job.job_id.as_str(), job.depends_on.as_slice()))
        .collect();

    for job in &spec.jobs {
        for dependency in &job.depends_on {
            if !dependencies.contains_key(dependency.as_str()) {
                return Err(ControlError::validation(format!(
                    "job '{}' depends on unknown job '{}'",
                    job.job_id, dependency
                )));
            }
        }
    }

    detect_cycle(&dependencies)?;
    Ok(())
}

/// DFS cycle detection over the dependency edges
fn detect_cycle(dependencies: &HashMap<&str, &[String]>) -> Result<(), ControlError> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();

    for job_id in dependencies.keys() {
        if !visited.contains(*job_id)
            && has_cycle(job_id, dependencies, &mut visited, &mut rec_stack)
        {
            return Err(ControlError::validation(format!(
                "dependency cycle detected involving job '{}'",
                job_id
            )));
        }
    }
    Ok(())
}

fn has_cycle<'a>(
    job_id: &'a str,
    dependencies: &HashMap<&'a str, &'a [String]>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
) -> bool {
    visited.insert(job_id);
    rec_stack.insert(job_id);

    if let Some(deps) = dependencies.get(job_id) {
        for dep in deps.iter() {
            if !visited.contains(dep.as_str()) {
                if has_cycle(dep.as_str(), dependencies, visited, rec_stack) {
                    return true;
                }
            } else if rec_stack.contains(dep.as_str()) {
                return true;
            }
        }
    }

    rec_stack.remove(job_id);
    false
}

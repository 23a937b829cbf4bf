//! Tenant admission control
//!
//! Bounds the number of tenants with pending or running work. Admission is
//! evaluated at workflow submission; a tenant that is already active is
//! always admitted again without reserving a second slot.

use std::collections::HashSet;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admitted,
    Rejected,
}

#[derive(Debug)]
pub struct TenantAdmission {
    cap: usize,
    active: HashSet<String>,
}

impl TenantAdmission {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            active: HashSet::new(),
        }
    }

    pub fn try_admit(&mut self, tenant_id: &str) -> AdmissionDecision {
        if self.active.contains(tenant_id) {
            return AdmissionDecision::Admitted;
        }
        if self.active.len() >= self.cap {
            debug!(tenant_id, cap = self.cap, "tenant admission rejected");
            return AdmissionDecision::Rejected;
        }
        self.active.insert(tenant_id.to_string());
        debug!(tenant_id, active = self.active.len(), "tenant admitted");
        AdmissionDecision::Admitted
    }

    /// Remove a tenant once it has no pending or running jobs left
    pub fn release(&mut self, tenant_id: &str) {
        if self.active.remove(tenant_id) {
            debug!(tenant_id, active = self.active.len(), "tenant released");
        }
    }

    pub fn is_active(&self, tenant_id: &str) -> bool {
        self.active.contains(tenant_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

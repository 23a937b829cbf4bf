//! Tenant identity extractor
//!
//! Stateless operations carry the tenant in the `X-User-ID` request
//! header. A missing or empty header is rejected before the handler runs.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tileflow_core::problem::Problem;
use tileflow_core::ControlError;

pub const TENANT_HEADER: &str = "x-user-id";

/// Extracted tenant id, guaranteed non-empty
#[derive(Debug, Clone)]
pub struct Tenant(pub String);

impl Tenant {
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = Problem;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();
        if tenant_id.is_empty() {
            return Err(Problem::from(ControlError::TenantMissing));
        }
        Ok(Tenant(tenant_id.to_string()))
    }
}

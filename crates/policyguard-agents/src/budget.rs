//! Per-stage time budgets

use policyguard_core::{ServiceError, ServiceResult};
use std::future::Future;
use std::time::Duration;

/// Run a service call, mapping an exceeded budget to [`ServiceError::Timeout`]
pub async fn within_budget<T, F>(budget: Duration, call: F) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>>,
{
    tokio::time::timeout(budget, call)
        .await
        .unwrap_or(Err(ServiceError::Timeout))
}

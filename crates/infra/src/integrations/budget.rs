//! Budget collaborator boundary.
//!
//! This core does not own budget data; it asks an external collaborator for
//! remaining spend capacity. Collaborator failure degrades the check to an
//! explicit unknown outcome at the caller, it never blocks validation.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use procflow_core::{DepartmentId, TenantId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BudgetError {
    #[error("budget provider unavailable: {0}")]
    Unavailable(String),

    #[error("no budget configured for department")]
    NotConfigured,
}

/// Reports remaining spend capacity for a department, optionally narrowed to
/// a category. Amounts are in smallest currency unit.
pub trait BudgetProvider: Send + Sync {
    fn available(
        &self,
        tenant_id: TenantId,
        department_id: DepartmentId,
        category: Option<&str>,
    ) -> Result<u64, BudgetError>;
}

/// In-memory provider for tests/dev.
///
/// Category-specific amounts take precedence over the department-wide one;
/// `fail_with` switches the provider into failure mode to exercise degraded
/// paths.
#[derive(Debug, Default)]
pub struct InMemoryBudgetProvider {
    remaining: RwLock<HashMap<(TenantId, DepartmentId, Option<String>), u64>>,
    fail_reason: RwLock<Option<String>>,
}

impl InMemoryBudgetProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_remaining(
        &self,
        tenant_id: TenantId,
        department_id: DepartmentId,
        category: Option<&str>,
        amount: u64,
    ) {
        if let Ok(mut remaining) = self.remaining.write() {
            remaining.insert((tenant_id, department_id, category.map(str::to_string)), amount);
        }
    }

    pub fn fail_with(&self, reason: impl Into<String>) {
        if let Ok(mut fail_reason) = self.fail_reason.write() {
            *fail_reason = Some(reason.into());
        }
    }
}

impl BudgetProvider for InMemoryBudgetProvider {
    fn available(
        &self,
        tenant_id: TenantId,
        department_id: DepartmentId,
        category: Option<&str>,
    ) -> Result<u64, BudgetError> {
        if let Ok(fail_reason) = self.fail_reason.read() {
            if let Some(reason) = fail_reason.as_ref() {
                return Err(BudgetError::Unavailable(reason.clone()));
            }
        }

        let remaining = self
            .remaining
            .read()
            .map_err(|_| BudgetError::Unavailable("lock poisoned".to_string()))?;

        if let Some(category) = category {
            if let Some(amount) =
                remaining.get(&(tenant_id, department_id, Some(category.to_string())))
            {
                return Ok(*amount);
            }
        }
        remaining
            .get(&(tenant_id, department_id, None))
            .copied()
            .ok_or(BudgetError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_budget_takes_precedence() {
        let provider = InMemoryBudgetProvider::new();
        let tenant_id = TenantId::new();
        let department_id = DepartmentId::new();

        provider.set_remaining(tenant_id, department_id, None, 100_000);
        provider.set_remaining(tenant_id, department_id, Some("it-hardware"), 25_000);

        assert_eq!(
            provider.available(tenant_id, department_id, Some("it-hardware")),
            Ok(25_000)
        );
        assert_eq!(
            provider.available(tenant_id, department_id, Some("office-supplies")),
            Ok(100_000)
        );
        assert_eq!(provider.available(tenant_id, department_id, None), Ok(100_000));
    }

    #[test]
    fn unconfigured_department_is_not_configured() {
        let provider = InMemoryBudgetProvider::new();
        assert_eq!(
            provider.available(TenantId::new(), DepartmentId::new(), None),
            Err(BudgetError::NotConfigured)
        );
    }

    #[test]
    fn failure_mode_reports_unavailable() {
        let provider = InMemoryBudgetProvider::new();
        let tenant_id = TenantId::new();
        let department_id = DepartmentId::new();
        provider.set_remaining(tenant_id, department_id, None, 100_000);
        provider.fail_with("connection refused");

        assert!(matches!(
            provider.available(tenant_id, department_id, None),
            Err(BudgetError::Unavailable(_))
        ));
    }
}

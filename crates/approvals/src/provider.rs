//! Rule configuration and role resolution collaborators.

use std::collections::HashMap;
use std::sync::RwLock;

use procflow_core::{DepartmentId, TenantId, UserId};
use procflow_requisitions::RequisitionType;

use crate::condition::{RuleCondition, RuleConfigError};
use crate::rule::{ApprovalRule, RuleApprover};

/// Read-only source of approval rules.
pub trait RuleConfigurationProvider: Send + Sync {
    /// All configured rules for a process type. Condition filtering happens
    /// at materialization, against the requisition's facts.
    fn approval_rules(
        &self,
        tenant_id: TenantId,
        process_type: RequisitionType,
    ) -> Vec<ApprovalRule>;
}

/// Resolves a role reference to its designated approver for a department.
pub trait RoleResolver: Send + Sync {
    fn resolve(&self, tenant_id: TenantId, role: &str, department_id: DepartmentId)
    -> Option<UserId>;
}

/// In-memory rule configuration for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRuleProvider {
    rules: RwLock<Vec<(TenantId, ApprovalRule)>>,
}

impl InMemoryRuleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: TenantId, rule: ApprovalRule) {
        if let Ok(mut rules) = self.rules.write() {
            rules.push((tenant_id, rule));
        }
    }

    /// Ingest a rule whose condition still uses the textual configuration
    /// form.
    ///
    /// A malformed condition is logged and the rule dropped (fail-closed: the
    /// rule does not apply), so bad configuration can never block requisition
    /// creation. The error is returned for configuration tooling to surface.
    pub fn insert_with_expr(
        &self,
        tenant_id: TenantId,
        name: impl Into<String>,
        process_type: RequisitionType,
        condition_expr: &str,
        approvers: Vec<RuleApprover>,
    ) -> Result<(), RuleConfigError> {
        let name = name.into();
        match RuleCondition::parse(condition_expr) {
            Ok(condition) => {
                self.insert(
                    tenant_id,
                    ApprovalRule {
                        name,
                        process_type,
                        condition,
                        approvers,
                    },
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    rule = %name,
                    condition = condition_expr,
                    error = %err,
                    "dropping approval rule with malformed condition"
                );
                Err(err)
            }
        }
    }
}

impl RuleConfigurationProvider for InMemoryRuleProvider {
    fn approval_rules(
        &self,
        tenant_id: TenantId,
        process_type: RequisitionType,
    ) -> Vec<ApprovalRule> {
        match self.rules.read() {
            Ok(rules) => rules
                .iter()
                .filter(|(t, rule)| *t == tenant_id && rule.process_type == process_type)
                .map(|(_, rule)| rule.clone())
                .collect(),
            Err(_) => vec![],
        }
    }
}

/// In-memory role directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRoleResolver {
    assignments: RwLock<HashMap<(TenantId, String, DepartmentId), UserId>>,
}

impl InMemoryRoleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(
        &self,
        tenant_id: TenantId,
        role: impl Into<String>,
        department_id: DepartmentId,
        user_id: UserId,
    ) {
        if let Ok(mut assignments) = self.assignments.write() {
            assignments.insert((tenant_id, role.into(), department_id), user_id);
        }
    }
}

impl RoleResolver for InMemoryRoleResolver {
    fn resolve(
        &self,
        tenant_id: TenantId,
        role: &str,
        department_id: DepartmentId,
    ) -> Option<UserId> {
        self.assignments
            .read()
            .ok()?
            .get(&(tenant_id, role.to_string(), department_id))
            .copied()
    }
}

//! Approval plan materialization.

use procflow_core::{DepartmentId, TenantId};
use procflow_requisitions::{PlannedApproval, RequisitionType};

use crate::condition::RequisitionFacts;
use crate::provider::{RoleResolver, RuleConfigurationProvider};
use crate::rule::ApproverRef;

/// Materialize approval slots for a requisition being created.
///
/// Each rule whose process type matches and whose condition evaluates `true`
/// contributes one slot per approver it names, carrying that approver's level
/// and required flag. Rules contribute independently; no deduplication
/// happens across rules here. Role references resolve per department; an
/// unresolvable role drops its slot with a warning rather than failing
/// creation.
pub fn materialize_approvals(
    rules: &dyn RuleConfigurationProvider,
    roles: &dyn RoleResolver,
    tenant_id: TenantId,
    process_type: RequisitionType,
    department_id: DepartmentId,
    facts: &RequisitionFacts,
) -> Vec<PlannedApproval> {
    let mut plan = Vec::new();

    for rule in rules.approval_rules(tenant_id, process_type) {
        if !rule.condition.evaluate(facts) {
            continue;
        }

        for slot in &rule.approvers {
            let approver_id = match &slot.approver {
                ApproverRef::User(user_id) => *user_id,
                ApproverRef::Role(role) => {
                    match roles.resolve(tenant_id, role, department_id) {
                        Some(user_id) => user_id,
                        None => {
                            tracing::warn!(
                                rule = %rule.name,
                                role = %role,
                                "skipping approval slot: role has no designated approver for department"
                            );
                            continue;
                        }
                    }
                }
            };

            plan.push(PlannedApproval {
                approver_id,
                level: slot.level,
                required: slot.required,
            });
        }
    }

    plan
}

use serde::{Deserialize, Serialize};

use procflow_core::UserId;
use procflow_requisitions::RequisitionType;

use crate::condition::RuleCondition;

/// Who must approve: a concrete user, or a role resolved per department when
/// the plan is materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproverRef {
    User(UserId),
    Role(String),
}

/// One approver slot in a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleApprover {
    pub approver: ApproverRef,
    /// Ordering level; ascending = earlier in the chain.
    pub level: u32,
    pub required: bool,
}

/// Externally configured approval rule.
///
/// Read-only to the requisition core: rules are matched by process type,
/// gated by their condition, and expanded into approval records at creation
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub name: String,
    pub process_type: RequisitionType,
    pub condition: RuleCondition,
    pub approvers: Vec<RuleApprover>,
}

//! Conditional approval rules for requisitions.
//!
//! Rules are external configuration: a process type, a condition over the
//! requisition's computed attributes, and an ordered list of approver slots.
//! This crate owns the typed condition language, the configuration/role
//! collaborator traits, and the materialization of approval plans at
//! requisition creation time.

pub mod condition;
pub mod plan;
pub mod provider;
pub mod rule;

pub use condition::{CompareOp, RequisitionFacts, RuleCondition, RuleConfigError, RuleField};
pub use plan::materialize_approvals;
pub use provider::{
    InMemoryRoleResolver, InMemoryRuleProvider, RoleResolver, RuleConfigurationProvider,
};
pub use rule::{ApprovalRule, ApproverRef, RuleApprover};

//! External collaborator boundaries.
//!
//! Capability traits with in-memory implementations for tests/dev. All of
//! them are best-effort with respect to the requisition's durable state:
//! their failure is recorded, never rolled back into a committed transition.

pub mod audit;
pub mod budget;
pub mod workflow;

pub use audit::{AuditEntry, AuditRecorder, InMemoryAuditRecorder, TracingAuditRecorder};
pub use budget::{BudgetError, BudgetProvider, InMemoryBudgetProvider};
pub use workflow::{
    DisabledWorkflowEngine, InMemoryWorkflowEngine, WorkflowContext, WorkflowEngine, WorkflowStart,
};

//! Application service for the procurement requisition lifecycle.
//!
//! `RequisitionService` orchestrates the domain aggregate, the event store,
//! approval-rule materialization, sequence allocation, and the best-effort
//! collaborators (workflow engine, event bus, audit trail, budget provider).

pub mod error;
pub mod requisition_service;
pub mod wiring;

pub use error::ServiceError;
pub use requisition_service::{BudgetCheck, RequisitionService, ValidationReport};
pub use wiring::{InMemoryHandles, InMemoryRequisitionService, build_in_memory_service};

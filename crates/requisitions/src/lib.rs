//! Requisition domain module (procurement requisitions, event-sourced).
//!
//! This crate contains business rules for purchase requisitions and their
//! approval lifecycle, implemented purely as deterministic domain logic
//! (no IO, no HTTP, no storage).

pub mod number;
pub mod requisition;
pub mod validation;

pub use number::RequisitionNumber;
pub use requisition::{
    ApprovalRecord, ApprovalRecorded, ApprovalStatus, ApproveRequisition, CancelRequisition,
    CreateRequisition, LineItem, PlannedApproval, Priority, RejectRequisition, RejectionRecorded,
    Requisition, RequisitionApproved, RequisitionCancelled, RequisitionCommand, RequisitionCreated,
    RequisitionEvent, RequisitionId, RequisitionRejected, RequisitionStatus, RequisitionSubmitted,
    RequisitionType, SubmitRequisition, total_amount,
};
pub use validation::{CreateRequisitionInput, LineItemInput, RequisitionDraft, creation_violations};

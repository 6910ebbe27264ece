//! Projection implementations (read model builders).
//!
//! Projections consume committed domain events and build query-optimized
//! read models. They are rebuildable from the event stream, tenant-isolated,
//! and idempotent (safe for at-least-once delivery).

pub mod requisitions;

pub use requisitions::{
    Pagination, REQUISITION_AGGREGATE_TYPE, RequisitionFilter, RequisitionPage,
    RequisitionProjectionError, RequisitionReadModel, RequisitionsProjection, SortBy, SortOrder,
};

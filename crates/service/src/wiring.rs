//! In-memory wiring for tests/dev.
//!
//! Builds the full stack the way a deployment would: store + bus + a
//! background pump feeding committed events into the projection, with
//! in-memory collaborators behind the capability traits.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use procflow_approvals::{InMemoryRoleResolver, InMemoryRuleProvider};
use procflow_events::{EventBus, EventEnvelope, InMemoryEventBus};
use procflow_infra::command_dispatcher::CommandDispatcher;
use procflow_infra::event_store::InMemoryEventStore;
use procflow_infra::integrations::{
    InMemoryAuditRecorder, InMemoryBudgetProvider, WorkflowEngine,
};
use procflow_infra::projections::{RequisitionReadModel, RequisitionsProjection};
use procflow_infra::read_model::InMemoryTenantStore;
use procflow_infra::sequence::InMemorySequenceAllocator;
use procflow_requisitions::RequisitionId;

use crate::requisition_service::RequisitionService;

pub type InMemoryRequisitionService = RequisitionService<
    Arc<InMemoryEventStore>,
    Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
    Arc<InMemoryTenantStore<RequisitionId, RequisitionReadModel>>,
>;

/// Handles to the wired in-memory stack; collaborators stay reachable so
/// tests can seed rules/budgets and inspect the audit trail.
pub struct InMemoryHandles {
    pub service: Arc<InMemoryRequisitionService>,
    pub store: Arc<InMemoryEventStore>,
    pub projection:
        Arc<RequisitionsProjection<Arc<InMemoryTenantStore<RequisitionId, RequisitionReadModel>>>>,
    pub rules: Arc<InMemoryRuleProvider>,
    pub roles: Arc<InMemoryRoleResolver>,
    pub audit: Arc<InMemoryAuditRecorder>,
    pub budget: Arc<InMemoryBudgetProvider>,
}

/// Build the full in-memory stack.
///
/// The projection pump thread is detached; it exits when the bus is dropped.
pub fn build_in_memory_service(workflow: Arc<dyn WorkflowEngine>) -> InMemoryHandles {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());

    let rm_store: Arc<InMemoryTenantStore<RequisitionId, RequisitionReadModel>> =
        Arc::new(InMemoryTenantStore::new());
    let projection = Arc::new(RequisitionsProjection::new(rm_store));

    // Background subscriber: bus -> projection. Subscribed before the service
    // exists, so no committed event can be missed.
    {
        let subscription = bus.subscribe();
        let projection = projection.clone();
        std::thread::spawn(move || {
            while let Ok(envelope) = subscription.recv() {
                if let Err(err) = projection.apply_envelope(&envelope) {
                    tracing::warn!("projection apply failed: {err}");
                }
            }
        });
    }

    let rules = Arc::new(InMemoryRuleProvider::new());
    let roles = Arc::new(InMemoryRoleResolver::new());
    let sequences = Arc::new(InMemorySequenceAllocator::new());
    let audit = Arc::new(InMemoryAuditRecorder::new());
    let budget = Arc::new(InMemoryBudgetProvider::new());

    let dispatcher = CommandDispatcher::new(store.clone(), bus.clone());
    let service = Arc::new(RequisitionService::new(
        dispatcher,
        store.clone(),
        projection.clone(),
        rules.clone(),
        roles.clone(),
        sequences,
        workflow,
        audit.clone(),
        budget.clone(),
    ));

    InMemoryHandles {
        service,
        store,
        projection,
        rules,
        roles,
        audit,
        budget,
    }
}

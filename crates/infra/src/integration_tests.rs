//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Command → EventStore → EventBus → Projection → ReadModel
//!
//! Verifies:
//! - Commands produce events that update read models correctly
//! - Tenant isolation is preserved
//! - Optimistic concurrency conflicts are detected
//! - Failed commands leave no partial state behind

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use procflow_core::{AggregateId, DepartmentId, ExpectedVersion, TenantId, UserId};
    use procflow_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use procflow_requisitions::{
        ApproveRequisition, CreateRequisition, LineItem, PlannedApproval, Priority, Requisition,
        RequisitionCommand, RequisitionId, RequisitionNumber, RequisitionStatus, RequisitionType,
        SubmitRequisition,
    };

    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::projections::requisitions::{
        REQUISITION_AGGREGATE_TYPE, RequisitionReadModel, RequisitionsProjection,
    };
    use crate::read_model::InMemoryTenantStore;

    type TestDispatcher = CommandDispatcher<
        Arc<InMemoryEventStore>,
        Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>,
    >;
    type TestProjection =
        RequisitionsProjection<Arc<InMemoryTenantStore<RequisitionId, RequisitionReadModel>>>;

    fn setup() -> (TestDispatcher, Arc<TestProjection>, Arc<InMemoryEventStore>) {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
            Arc::new(InMemoryEventBus::new());
        let dispatcher = CommandDispatcher::new(store.clone(), bus.clone());
        let rm_store: Arc<InMemoryTenantStore<RequisitionId, RequisitionReadModel>> =
            Arc::new(InMemoryTenantStore::new());
        let projection = Arc::new(RequisitionsProjection::new(rm_store));

        // Subscribe to the bus BEFORE any events are published.
        let projection_clone = projection.clone();
        let bus_clone = bus.clone();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
        std::thread::spawn(move || {
            let sub = bus_clone.subscribe();
            let _ = ready_tx.send(());
            while let Ok(env) = sub.recv() {
                if let Err(e) = projection_clone.apply_envelope(&env) {
                    eprintln!("failed to apply envelope: {e:?}");
                }
            }
        });
        // Ensure the subscriber is ready before returning.
        let _ = ready_rx.recv_timeout(std::time::Duration::from_secs(1));

        (dispatcher, projection, store)
    }

    /// The subscriber thread processes events asynchronously.
    fn wait_for_processing() {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    fn line_item(line_no: u32, quantity: u32, estimated_unit_price: u64) -> LineItem {
        LineItem {
            line_no,
            product_id: None,
            description: format!("item {line_no}"),
            quantity,
            unit_price: None,
            estimated_unit_price,
            currency: "USD".to_string(),
            unit_of_measure: "each".to_string(),
            category: "general".to_string(),
            requested_delivery_date: Some(Utc::now() + Duration::days(14)),
            notes: None,
            suggested_supplier_ids: vec![],
        }
    }

    fn create_cmd(
        tenant_id: TenantId,
        requisition_id: RequisitionId,
        approval_plan: Vec<PlannedApproval>,
    ) -> RequisitionCommand {
        RequisitionCommand::CreateRequisition(CreateRequisition {
            tenant_id,
            requisition_id,
            requisition_number: RequisitionNumber::new(2025, 1).unwrap(),
            requestor_id: UserId::new(),
            title: "Standing desk order".to_string(),
            description: None,
            department_id: DepartmentId::new(),
            priority: Priority::Normal,
            requisition_type: RequisitionType::Stock,
            required_by: Utc::now() + Duration::days(30),
            justification: None,
            items: vec![line_item(1, 10, 25), line_item(2, 5, 60)],
            approval_plan,
            occurred_at: Utc::now(),
        })
    }

    fn dispatch(
        dispatcher: &TestDispatcher,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
        command: RequisitionCommand,
    ) -> Result<crate::command_dispatcher::Dispatched, DispatchError> {
        dispatcher.dispatch::<Requisition>(
            tenant_id,
            requisition_id.0,
            REQUISITION_AGGREGATE_TYPE,
            command,
            |_, id| Requisition::empty(RequisitionId::new(id)),
        )
    }

    #[test]
    fn create_command_updates_read_model() {
        let (dispatcher, projection, _store) = setup();
        let tenant_id = TenantId::new();
        let requisition_id = RequisitionId::new(AggregateId::new());

        let dispatched = dispatch(
            &dispatcher,
            tenant_id,
            requisition_id,
            create_cmd(tenant_id, requisition_id, vec![]),
        )
        .unwrap();
        assert_eq!(dispatched.events.len(), 1);
        assert!(dispatched.publish_failures.is_empty());

        wait_for_processing();

        let rm = projection.get(tenant_id, &requisition_id).unwrap();
        assert_eq!(rm.requisition_number, "REQ-2025-001");
        assert_eq!(rm.status, RequisitionStatus::Draft);
        assert_eq!(rm.total_amount, 550);
        assert_eq!(rm.line_count, 2);
        assert_eq!(rm.pending_approvals, 0);
    }

    #[test]
    fn full_lifecycle_is_reflected_in_read_model() {
        let (dispatcher, projection, _store) = setup();
        let tenant_id = TenantId::new();
        let requisition_id = RequisitionId::new(AggregateId::new());
        let approver = UserId::new();

        dispatch(
            &dispatcher,
            tenant_id,
            requisition_id,
            create_cmd(
                tenant_id,
                requisition_id,
                vec![PlannedApproval {
                    approver_id: approver,
                    level: 1,
                    required: true,
                }],
            ),
        )
        .unwrap();

        dispatch(
            &dispatcher,
            tenant_id,
            requisition_id,
            RequisitionCommand::SubmitRequisition(SubmitRequisition {
                tenant_id,
                requisition_id,
                submitted_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let dispatched = dispatch(
            &dispatcher,
            tenant_id,
            requisition_id,
            RequisitionCommand::ApproveRequisition(ApproveRequisition {
                tenant_id,
                requisition_id,
                approver_id: approver,
                comments: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        // Final required approval commits the decision and the promotion together.
        assert_eq!(dispatched.events.len(), 2);

        wait_for_processing();

        let rm = projection.get(tenant_id, &requisition_id).unwrap();
        assert_eq!(rm.status, RequisitionStatus::Approved);
        assert!(rm.submitted_at.is_some());
        assert!(rm.approved_at.is_some());
        assert_eq!(rm.pending_approvals, 0);
    }

    #[test]
    fn tenant_isolation_preserved() {
        let (dispatcher, projection, _store) = setup();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let requisition_a = RequisitionId::new(AggregateId::new());
        let requisition_b = RequisitionId::new(AggregateId::new());

        dispatch(
            &dispatcher,
            tenant_a,
            requisition_a,
            create_cmd(tenant_a, requisition_a, vec![]),
        )
        .unwrap();
        dispatch(
            &dispatcher,
            tenant_b,
            requisition_b,
            create_cmd(tenant_b, requisition_b, vec![]),
        )
        .unwrap();

        wait_for_processing();

        assert_eq!(projection.list(tenant_a).len(), 1);
        assert_eq!(projection.list(tenant_b).len(), 1);
        assert!(projection.get(tenant_a, &requisition_b).is_none());
        assert!(projection.get(tenant_b, &requisition_a).is_none());
    }

    #[test]
    fn stale_append_is_rejected() {
        let (dispatcher, _projection, store) = setup();
        let tenant_id = TenantId::new();
        let requisition_id = RequisitionId::new(AggregateId::new());

        let dispatched = dispatch(
            &dispatcher,
            tenant_id,
            requisition_id,
            create_cmd(tenant_id, requisition_id, vec![]),
        )
        .unwrap();

        // Replay the committed batch against its original expected version:
        // the stream has moved on, so the optimistic check must fail.
        let stale = dispatched.events[0].clone();
        let err = store
            .append(
                vec![crate::event_store::UncommittedEvent {
                    event_id: uuid::Uuid::now_v7(),
                    tenant_id: stale.tenant_id,
                    aggregate_id: stale.aggregate_id,
                    aggregate_type: stale.aggregate_type,
                    event_type: stale.event_type,
                    event_version: stale.event_version,
                    occurred_at: stale.occurred_at,
                    payload: stale.payload,
                }],
                ExpectedVersion::Exact(0),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            crate::event_store::EventStoreError::Concurrency(_)
        ));
    }

    #[test]
    fn rejected_command_leaves_no_state_behind() {
        let (dispatcher, projection, store) = setup();
        let tenant_id = TenantId::new();
        let requisition_id = RequisitionId::new(AggregateId::new());

        let mut cmd = create_cmd(tenant_id, requisition_id, vec![]);
        if let RequisitionCommand::CreateRequisition(ref mut create) = cmd {
            create.items.clear();
            create.title = String::new();
        }

        let err = dispatch(&dispatcher, tenant_id, requisition_id, cmd).unwrap_err();
        match err {
            DispatchError::Validation(violations) => {
                assert!(violations.contains(&"title must not be empty".to_string()));
                assert!(violations.contains(&"at least one line item is required".to_string()));
            }
            other => panic!("expected Validation, got {other:?}"),
        }

        wait_for_processing();
        assert!(store.load_stream(tenant_id, requisition_id.0).unwrap().is_empty());
        assert!(projection.get(tenant_id, &requisition_id).is_none());
    }
}

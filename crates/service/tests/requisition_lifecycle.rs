//! Black-box tests for the requisition lifecycle, driven through the
//! application service against the fully wired in-memory stack.

use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};

use procflow_approvals::{ApprovalRule, ApproverRef, RuleApprover, RuleCondition};
use procflow_core::{DepartmentId, TenantId, UserId};
use procflow_infra::event_store::EventStore;
use procflow_infra::integrations::{InMemoryWorkflowEngine, WorkflowEngine};
use procflow_infra::projections::{Pagination, RequisitionFilter, SortBy, SortOrder};
use procflow_requisitions::{
    ApprovalStatus, CreateRequisitionInput, LineItemInput, Priority, RequisitionStatus,
    RequisitionType,
};
use procflow_service::{BudgetCheck, InMemoryHandles, ServiceError, build_in_memory_service};

fn setup() -> InMemoryHandles {
    procflow_observability::init();
    build_in_memory_service(Arc::new(InMemoryWorkflowEngine::new()))
}

fn setup_with_engine(engine: Arc<dyn WorkflowEngine>) -> InMemoryHandles {
    procflow_observability::init();
    build_in_memory_service(engine)
}

/// The projection pump runs on a background thread.
fn wait_for_projection() {
    std::thread::sleep(std::time::Duration::from_millis(75));
}

fn line(quantity: u32, estimated_unit_price: u64) -> LineItemInput {
    LineItemInput {
        product_id: None,
        description: "27-inch monitor".to_string(),
        quantity,
        unit_price: None,
        estimated_unit_price,
        currency: "USD".to_string(),
        unit_of_measure: "each".to_string(),
        category: "it-hardware".to_string(),
        requested_delivery_date: Some(Utc::now() + Duration::days(14)),
        notes: None,
        suggested_supplier_ids: vec![],
    }
}

fn input(
    title: &str,
    department_id: DepartmentId,
    items: Vec<LineItemInput>,
) -> CreateRequisitionInput {
    CreateRequisitionInput {
        title: title.to_string(),
        description: None,
        department_id: Some(department_id),
        priority: Priority::Normal,
        requisition_type: RequisitionType::Direct,
        required_by: Some(Utc::now() + Duration::days(30)),
        justification: None,
        items,
    }
}

fn always_rule(approvers: Vec<(UserId, u32, bool)>) -> ApprovalRule {
    ApprovalRule {
        name: "chain".to_string(),
        process_type: RequisitionType::Direct,
        condition: RuleCondition::Always,
        approvers: approvers
            .into_iter()
            .map(|(user, level, required)| RuleApprover {
                approver: ApproverRef::User(user),
                level,
                required,
            })
            .collect(),
    }
}

#[test]
fn create_computes_total_and_allocates_first_number() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();
    let requestor = UserId::new();

    let requisition = handles
        .service
        .create_requisition(
            tenant_id,
            input("Monitors", department_id, vec![line(10, 25), line(5, 60)]),
            requestor,
        )
        .unwrap();

    assert_eq!(requisition.status(), RequisitionStatus::Draft);
    assert_eq!(requisition.total_amount(), 550);
    assert_eq!(
        requisition.requisition_number().unwrap().to_string(),
        format!("REQ-{}-001", Utc::now().year())
    );
    assert_eq!(requisition.requestor_id(), Some(requestor));
    assert_eq!(requisition.items().len(), 2);
}

#[test]
fn invalid_create_persists_nothing_and_burns_no_sequence() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();

    let err = handles
        .service
        .create_requisition(
            tenant_id,
            input("  ", department_id, vec![]),
            UserId::new(),
        )
        .unwrap_err();
    match err {
        ServiceError::Validation(violations) => {
            assert!(violations.contains(&"title must not be empty".to_string()));
            assert!(violations.contains(&"at least one line item is required".to_string()));
        }
        other => panic!("expected Validation, got {other:?}"),
    }

    wait_for_projection();
    assert!(handles.projection.list(tenant_id).is_empty());

    // The rejected request allocated nothing: the first valid creation still
    // receives sequence 001.
    let requisition = handles
        .service
        .create_requisition(
            tenant_id,
            input("Monitors", department_id, vec![line(1, 100)]),
            UserId::new(),
        )
        .unwrap();
    assert!(
        requisition
            .requisition_number()
            .unwrap()
            .to_string()
            .ends_with("-001")
    );
}

#[test]
fn threshold_rule_below_cutoff_creates_no_approval_records() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();

    handles
        .rules
        .insert_with_expr(
            tenant_id,
            "large direct spend",
            RequisitionType::Direct,
            "totalAmount > 1000",
            vec![RuleApprover {
                approver: ApproverRef::User(UserId::new()),
                level: 1,
                required: true,
            }],
        )
        .unwrap();

    // 10×25 + 5×60 = 550, below the 1000 threshold.
    let requisition = handles
        .service
        .create_requisition(
            tenant_id,
            input("Monitors", department_id, vec![line(10, 25), line(5, 60)]),
            UserId::new(),
        )
        .unwrap();

    assert!(requisition.approvals().is_empty());
}

#[test]
fn full_lifecycle_in_any_approval_order() {
    let engine = Arc::new(InMemoryWorkflowEngine::new());
    let handles = setup_with_engine(engine.clone());
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();
    let manager = UserId::new();
    let controller = UserId::new();
    let observer = UserId::new();

    handles.rules.insert(
        tenant_id,
        always_rule(vec![
            (manager, 1, true),
            (controller, 2, true),
            (observer, 2, false),
        ]),
    );

    let requisition = handles
        .service
        .create_requisition(
            tenant_id,
            input("Monitors", department_id, vec![line(4, 300)]),
            UserId::new(),
        )
        .unwrap();
    let requisition_id = requisition.id_typed();
    assert_eq!(requisition.approvals().len(), 3);

    let submitted = handles
        .service
        .submit_requisition(tenant_id, requisition_id, UserId::new())
        .unwrap();
    assert_eq!(submitted.status(), RequisitionStatus::Submitted);
    assert!(submitted.submitted_at().is_some());
    assert_eq!(engine.started().len(), 1);

    // Approvals land out of level order; ordering must not matter.
    let after_controller = handles
        .service
        .approve_requisition(tenant_id, requisition_id, controller, None)
        .unwrap();
    assert_eq!(after_controller.status(), RequisitionStatus::Submitted);

    let approved = handles
        .service
        .approve_requisition(
            tenant_id,
            requisition_id,
            manager,
            Some("within budget".to_string()),
        )
        .unwrap();
    assert_eq!(approved.status(), RequisitionStatus::Approved);
    assert!(approved.approved_at().is_some());

    // The optional record stays pending without blocking promotion.
    let pending: Vec<_> = approved
        .approvals()
        .iter()
        .filter(|r| r.status == ApprovalStatus::Pending)
        .collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].approver_id, observer);
}

#[test]
fn illegal_transitions_conflict_and_mutate_nothing() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();

    let requisition = handles
        .service
        .create_requisition(
            tenant_id,
            input("Monitors", department_id, vec![line(1, 100)]),
            UserId::new(),
        )
        .unwrap();
    let requisition_id = requisition.id_typed();

    // Approving a draft conflicts.
    let err = handles
        .service
        .approve_requisition(tenant_id, requisition_id, UserId::new(), None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    handles
        .service
        .submit_requisition(tenant_id, requisition_id, UserId::new())
        .unwrap();

    // Submitting twice conflicts and leaves the requisition unchanged.
    let before = handles
        .service
        .get_requisition(tenant_id, requisition_id)
        .unwrap();
    let err = handles
        .service
        .submit_requisition(tenant_id, requisition_id, UserId::new())
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    let after = handles
        .service
        .get_requisition(tenant_id, requisition_id)
        .unwrap();
    assert_eq!(before, after);
}

#[test]
fn unknown_requisition_is_not_found() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let missing = procflow_requisitions::RequisitionId::new(procflow_core::AggregateId::new());

    assert!(matches!(
        handles
            .service
            .submit_requisition(tenant_id, missing, UserId::new()),
        Err(ServiceError::NotFound)
    ));
    assert!(matches!(
        handles.service.get_requisition(tenant_id, missing),
        Err(ServiceError::NotFound)
    ));
}

#[test]
fn approver_without_pending_record_is_unauthorized() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();
    let manager = UserId::new();

    handles
        .rules
        .insert(tenant_id, always_rule(vec![(manager, 1, true)]));

    let requisition = handles
        .service
        .create_requisition(
            tenant_id,
            input("Monitors", department_id, vec![line(1, 100)]),
            UserId::new(),
        )
        .unwrap();
    let requisition_id = requisition.id_typed();
    handles
        .service
        .submit_requisition(tenant_id, requisition_id, UserId::new())
        .unwrap();

    let err = handles
        .service
        .approve_requisition(tenant_id, requisition_id, UserId::new(), None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized));

    // Nothing changed for the real approver.
    let unchanged = handles
        .service
        .get_requisition(tenant_id, requisition_id)
        .unwrap();
    assert_eq!(unchanged.status(), RequisitionStatus::Submitted);
    assert_eq!(unchanged.approvals()[0].status, ApprovalStatus::Pending);
}

#[test]
fn workflow_failure_degrades_but_submission_commits() {
    let handles = setup_with_engine(Arc::new(InMemoryWorkflowEngine::failing(
        "workflow engine unreachable",
    )));
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();
    let user = UserId::new();

    let requisition = handles
        .service
        .create_requisition(
            tenant_id,
            input("Monitors", department_id, vec![line(1, 100)]),
            user,
        )
        .unwrap();

    let submitted = handles
        .service
        .submit_requisition(tenant_id, requisition.id_typed(), user)
        .unwrap();
    assert_eq!(submitted.status(), RequisitionStatus::Submitted);

    let actions: Vec<String> = handles
        .audit
        .entries()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert!(actions.contains(&"workflow.start_failed".to_string()));
    assert!(actions.contains(&"requisition.submitted".to_string()));
}

#[test]
fn concurrent_final_approvals_promote_exactly_once() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();
    let first = UserId::new();
    let second = UserId::new();

    handles
        .rules
        .insert(tenant_id, always_rule(vec![(first, 1, true), (second, 2, true)]));

    let requisition = handles
        .service
        .create_requisition(
            tenant_id,
            input("Monitors", department_id, vec![line(1, 100)]),
            UserId::new(),
        )
        .unwrap();
    let requisition_id = requisition.id_typed();
    handles
        .service
        .submit_requisition(tenant_id, requisition_id, UserId::new())
        .unwrap();

    // Both approvers complete their records concurrently.
    let threads: Vec<_> = [first, second]
        .into_iter()
        .map(|approver| {
            let service = handles.service.clone();
            std::thread::spawn(move || {
                service.approve_requisition(tenant_id, requisition_id, approver, None)
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap().unwrap();
    }

    // Both callers converge on the same final state.
    let final_state = handles
        .service
        .get_requisition(tenant_id, requisition_id)
        .unwrap();
    assert_eq!(final_state.status(), RequisitionStatus::Approved);
    assert!(final_state.approved_at().is_some());

    // Exactly one promotion event was appended.
    let stream = handles
        .store
        .load_stream(tenant_id, requisition_id.0)
        .unwrap();
    let promotions = stream
        .iter()
        .filter(|e| e.event_type == "requisitions.requisition.approved")
        .count();
    assert_eq!(promotions, 1);
}

#[test]
fn concurrent_creates_allocate_distinct_increasing_numbers() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();

    let threads: Vec<_> = (0..6)
        .map(|_| {
            let service = handles.service.clone();
            std::thread::spawn(move || {
                service
                    .create_requisition(
                        tenant_id,
                        input("Monitors", department_id, vec![line(1, 100)]),
                        UserId::new(),
                    )
                    .map(|r| r.requisition_number().unwrap().sequence())
            })
        })
        .collect();

    let mut sequences: Vec<u32> = threads
        .into_iter()
        .map(|t| t.join().unwrap().unwrap())
        .collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn query_filters_sorts_and_paginates() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();
    let requestor = UserId::new();

    let small = handles
        .service
        .create_requisition(
            tenant_id,
            input("Printer toner", department_id, vec![line(1, 100)]),
            requestor,
        )
        .unwrap();
    handles
        .service
        .create_requisition(
            tenant_id,
            input("Desk chairs", department_id, vec![line(2, 100)]),
            requestor,
        )
        .unwrap();
    handles
        .service
        .create_requisition(
            tenant_id,
            input("Rack servers", department_id, vec![line(3, 100)]),
            requestor,
        )
        .unwrap();
    handles
        .service
        .submit_requisition(tenant_id, small.id_typed(), requestor)
        .unwrap();

    wait_for_projection();

    // Status filter.
    let submitted = handles.service.query_requisitions(
        tenant_id,
        &RequisitionFilter {
            status: Some(RequisitionStatus::Submitted),
            ..Default::default()
        },
        SortBy::CreatedAt,
        SortOrder::Desc,
        Pagination::default(),
    );
    assert_eq!(submitted.total, 1);
    assert_eq!(submitted.items[0].title, "Printer toner");

    // Free-text search.
    let searched = handles.service.query_requisitions(
        tenant_id,
        &RequisitionFilter {
            search: Some("chairs".to_string()),
            ..Default::default()
        },
        SortBy::CreatedAt,
        SortOrder::Desc,
        Pagination::default(),
    );
    assert_eq!(searched.total, 1);
    assert_eq!(searched.items[0].title, "Desk chairs");

    // Sort by amount, descending.
    let by_amount = handles.service.query_requisitions(
        tenant_id,
        &RequisitionFilter::default(),
        SortBy::TotalAmount,
        SortOrder::Desc,
        Pagination::default(),
    );
    assert_eq!(by_amount.items[0].total_amount, 300);

    // Pagination: total counts all matches, the page is clipped.
    let page = handles.service.query_requisitions(
        tenant_id,
        &RequisitionFilter::default(),
        SortBy::RequisitionNumber,
        SortOrder::Asc,
        Pagination {
            page: 2,
            page_size: 2,
        },
    );
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 1);
}

#[test]
fn open_requisition_with_shared_leading_keyword_is_flagged() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();
    let requestor = UserId::new();

    let original = handles
        .service
        .create_requisition(
            tenant_id,
            input("Laptop order Q3", department_id, vec![line(5, 1_000)]),
            requestor,
        )
        .unwrap();
    handles
        .service
        .submit_requisition(tenant_id, original.id_typed(), requestor)
        .unwrap();

    let duplicate = handles
        .service
        .create_requisition(
            tenant_id,
            input("Laptop refresh", department_id, vec![line(3, 1_000)]),
            requestor,
        )
        .unwrap();

    wait_for_projection();

    let report = handles
        .service
        .validate_requisition(tenant_id, duplicate.id_typed())
        .unwrap();
    assert!(!report.valid);
    assert!(
        report
            .errors
            .iter()
            .any(|e| e.starts_with("possible duplicate of")),
        "expected a duplicate flag, got {:?}",
        report.errors
    );

    // A different department with the same title keyword is not flagged.
    let elsewhere = handles
        .service
        .create_requisition(
            tenant_id,
            input("Laptop spares", DepartmentId::new(), vec![line(1, 1_000)]),
            requestor,
        )
        .unwrap();
    wait_for_projection();
    let report = handles
        .service
        .validate_requisition(tenant_id, elsewhere.id_typed())
        .unwrap();
    assert!(report.valid, "unexpected errors: {:?}", report.errors);
}

#[test]
fn budget_check_reports_within_exceeded_and_unknown() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();

    let requisition = handles
        .service
        .create_requisition(
            tenant_id,
            input("Monitors", department_id, vec![line(10, 25), line(5, 60)]),
            UserId::new(),
        )
        .unwrap();
    let requisition_id = requisition.id_typed();

    handles.budget.set_remaining(tenant_id, department_id, None, 1_000);
    let check = handles
        .service
        .check_budget_availability(tenant_id, requisition_id)
        .unwrap();
    assert_eq!(check, BudgetCheck::Within { remaining: 1_000 });
    assert_eq!(check.available(), Some(true));

    handles.budget.set_remaining(tenant_id, department_id, None, 100);
    let check = handles
        .service
        .check_budget_availability(tenant_id, requisition_id)
        .unwrap();
    assert_eq!(check, BudgetCheck::Exceeded { remaining: 100 });

    handles.budget.fail_with("connection refused");
    let check = handles
        .service
        .check_budget_availability(tenant_id, requisition_id)
        .unwrap();
    assert!(matches!(check, BudgetCheck::Unknown { .. }));
    assert_eq!(check.available(), None);
}

#[test]
fn rejection_and_cancellation_are_terminal() {
    let handles = setup();
    let tenant_id = TenantId::new();
    let department_id = DepartmentId::new();
    let approver = UserId::new();

    handles
        .rules
        .insert(tenant_id, always_rule(vec![(approver, 1, true)]));

    // Reject path.
    let requisition = handles
        .service
        .create_requisition(
            tenant_id,
            input("Monitors", department_id, vec![line(1, 100)]),
            UserId::new(),
        )
        .unwrap();
    let requisition_id = requisition.id_typed();
    handles
        .service
        .submit_requisition(tenant_id, requisition_id, UserId::new())
        .unwrap();
    let rejected = handles
        .service
        .reject_requisition(
            tenant_id,
            requisition_id,
            approver,
            Some("wrong supplier".to_string()),
        )
        .unwrap();
    assert_eq!(rejected.status(), RequisitionStatus::Rejected);
    assert_eq!(rejected.approvals()[0].status, ApprovalStatus::Rejected);

    let err = handles
        .service
        .cancel_requisition(tenant_id, requisition_id, UserId::new(), None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // Cancel path, straight from draft.
    let draft = handles
        .service
        .create_requisition(
            tenant_id,
            input("Keyboards", department_id, vec![line(1, 100)]),
            UserId::new(),
        )
        .unwrap();
    let cancelled = handles
        .service
        .cancel_requisition(
            tenant_id,
            draft.id_typed(),
            UserId::new(),
            Some("no longer needed".to_string()),
        )
        .unwrap();
    assert_eq!(cancelled.status(), RequisitionStatus::Cancelled);
}

//! The requisition lifecycle operations.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use serde_json::{Value as JsonValue, json};

use procflow_approvals::{
    RequisitionFacts, RoleResolver, RuleConfigurationProvider, materialize_approvals,
};
use procflow_core::{Aggregate, AggregateId, TenantId, UserId};
use procflow_events::{EventBus, EventEnvelope};
use procflow_infra::command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
use procflow_infra::event_store::EventStore;
use procflow_infra::integrations::{
    AuditRecorder, BudgetProvider, WorkflowContext, WorkflowEngine, WorkflowStart,
};
use procflow_infra::projections::{
    Pagination, REQUISITION_AGGREGATE_TYPE, RequisitionFilter, RequisitionPage,
    RequisitionReadModel, RequisitionsProjection, SortBy, SortOrder,
};
use procflow_infra::read_model::TenantStore;
use procflow_infra::sequence::{SequenceAllocator, allocate_number};
use procflow_requisitions::{
    ApproveRequisition, CancelRequisition, CreateRequisition, CreateRequisitionInput, LineItem,
    RejectRequisition, Requisition, RequisitionCommand, RequisitionDraft, RequisitionEvent,
    RequisitionId, RequisitionStatus, SubmitRequisition, creation_violations, total_amount,
};

use crate::error::ServiceError;

/// Bounded retries for optimistic-concurrency conflicts.
///
/// Each retry reloads the stream, so the loser of a race re-decides against
/// the winner's committed state. This is the guard for concurrent approvals
/// completing the last outstanding records: exactly one dispatch appends the
/// promotion event, the other observes it on retry.
const MAX_CONFLICT_RETRIES: u32 = 5;

const ENTITY_TYPE: &str = "requisition";

/// Pass/fail validation result with display-ready reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Outcome of a budget availability check.
///
/// Collaborator failure is an explicit `Unknown`, not a blocked validation;
/// policy for unknowns belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetCheck {
    Within { remaining: u64 },
    Exceeded { remaining: u64 },
    Unknown { reason: String },
}

impl BudgetCheck {
    /// `Some(true)`/`Some(false)` when the collaborator answered, `None` when
    /// the check degraded.
    pub fn available(&self) -> Option<bool> {
        match self {
            BudgetCheck::Within { .. } => Some(true),
            BudgetCheck::Exceeded { .. } => Some(false),
            BudgetCheck::Unknown { .. } => None,
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        match self {
            BudgetCheck::Within { remaining } | BudgetCheck::Exceeded { remaining } => {
                Some(*remaining)
            }
            BudgetCheck::Unknown { .. } => None,
        }
    }
}

/// Application service for the requisition lifecycle.
pub struct RequisitionService<ES, EB, RS>
where
    ES: EventStore + Clone,
    EB: EventBus<EventEnvelope<JsonValue>>,
    RS: TenantStore<RequisitionId, RequisitionReadModel>,
{
    dispatcher: CommandDispatcher<ES, EB>,
    store: ES,
    projection: Arc<RequisitionsProjection<RS>>,
    rules: Arc<dyn RuleConfigurationProvider>,
    roles: Arc<dyn RoleResolver>,
    sequences: Arc<dyn SequenceAllocator>,
    workflow: Arc<dyn WorkflowEngine>,
    audit: Arc<dyn AuditRecorder>,
    budget: Arc<dyn BudgetProvider>,
}

impl<ES, EB, RS> RequisitionService<ES, EB, RS>
where
    ES: EventStore + Clone,
    EB: EventBus<EventEnvelope<JsonValue>>,
    RS: TenantStore<RequisitionId, RequisitionReadModel>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dispatcher: CommandDispatcher<ES, EB>,
        store: ES,
        projection: Arc<RequisitionsProjection<RS>>,
        rules: Arc<dyn RuleConfigurationProvider>,
        roles: Arc<dyn RoleResolver>,
        sequences: Arc<dyn SequenceAllocator>,
        workflow: Arc<dyn WorkflowEngine>,
        audit: Arc<dyn AuditRecorder>,
        budget: Arc<dyn BudgetProvider>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            projection,
            rules,
            roles,
            sequences,
            workflow,
            audit,
            budget,
        }
    }

    /// Create a requisition: validate in full, derive the total, materialize
    /// the approval plan, allocate a sequence number, and commit everything
    /// as one append. Nothing is allocated or persisted for invalid input.
    pub fn create_requisition(
        &self,
        tenant_id: TenantId,
        input: CreateRequisitionInput,
        requestor_id: UserId,
    ) -> Result<Requisition, ServiceError> {
        let now = Utc::now();

        let CreateRequisitionInput {
            title,
            description,
            department_id,
            priority,
            requisition_type,
            required_by,
            justification,
            items,
        } = input;

        let items: Vec<LineItem> = items
            .into_iter()
            .enumerate()
            .map(|(idx, line)| line.into_line_item(idx as u32 + 1))
            .collect();

        let draft = RequisitionDraft {
            title: &title,
            department_id,
            required_by,
            items: &items,
            now,
        };
        let violations = creation_violations(&draft);
        if !violations.is_empty() {
            return Err(ServiceError::Validation(violations));
        }
        let (Some(department_id), Some(required_by)) = (department_id, required_by) else {
            // Unreachable after the check above; kept total instead of panicking.
            return Err(ServiceError::Validation(vec![
                "department is required".to_string(),
            ]));
        };

        let total = total_amount(&items);
        let facts = RequisitionFacts {
            total_amount: total,
        };
        let approval_plan = materialize_approvals(
            self.rules.as_ref(),
            self.roles.as_ref(),
            tenant_id,
            requisition_type,
            department_id,
            &facts,
        );
        let planned_records = approval_plan.len();

        let requisition_number = allocate_number(self.sequences.as_ref(), tenant_id, now.year())
            .map_err(|err| ServiceError::System(err.to_string()))?;

        let requisition_id = RequisitionId::new(AggregateId::new());
        let dispatched = self.dispatch_once(
            tenant_id,
            requisition_id,
            RequisitionCommand::CreateRequisition(CreateRequisition {
                tenant_id,
                requisition_id,
                requisition_number,
                requestor_id,
                title,
                description,
                department_id,
                priority,
                requisition_type,
                required_by,
                justification,
                items,
                approval_plan,
                occurred_at: now,
            }),
        )?;
        self.record_degradations(requisition_id, requestor_id, &dispatched);

        self.audit.log_event(
            "requisition.created",
            ENTITY_TYPE,
            &requisition_id.to_string(),
            requestor_id,
            json!({
                "requisition_number": requisition_number.to_string(),
                "total_amount": total,
                "approval_records": planned_records,
            }),
        );

        self.load(tenant_id, requisition_id)
    }

    /// Submit a draft requisition and best-effort start the external
    /// workflow. A workflow failure is recorded, never unwound into the
    /// committed submission.
    pub fn submit_requisition(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
        user_id: UserId,
    ) -> Result<Requisition, ServiceError> {
        let dispatched = self.dispatch_with_retry(
            tenant_id,
            requisition_id,
            RequisitionCommand::SubmitRequisition(SubmitRequisition {
                tenant_id,
                requisition_id,
                submitted_by: user_id,
                occurred_at: Utc::now(),
            }),
        )?;
        self.record_degradations(requisition_id, user_id, &dispatched);

        let requisition = self.load(tenant_id, requisition_id)?;

        let context = WorkflowContext {
            tenant_id,
            requisition_id,
            requisition_number: requisition
                .requisition_number()
                .map(|n| n.to_string())
                .unwrap_or_default(),
            process_type: requisition.requisition_type(),
            initiated_by: user_id,
            total_amount: requisition.total_amount(),
        };
        match self.workflow.start_workflow(context) {
            WorkflowStart::Started { instance_id } => {
                self.audit.log_event(
                    "workflow.started",
                    ENTITY_TYPE,
                    &requisition_id.to_string(),
                    user_id,
                    json!({ "instance_id": instance_id.to_string() }),
                );
            }
            WorkflowStart::Skipped { reason } => {
                tracing::debug!(requisition_id = %requisition_id, reason = %reason, "workflow start skipped");
            }
            WorkflowStart::Failed { reason } => {
                tracing::warn!(requisition_id = %requisition_id, reason = %reason, "workflow start failed after submission");
                self.audit.log_event(
                    "workflow.start_failed",
                    ENTITY_TYPE,
                    &requisition_id.to_string(),
                    user_id,
                    json!({ "error": reason }),
                );
            }
        }

        self.audit.log_event(
            "requisition.submitted",
            ENTITY_TYPE,
            &requisition_id.to_string(),
            user_id,
            json!({}),
        );

        Ok(requisition)
    }

    /// Record one approver's approval; promotes the requisition when every
    /// required record is approved.
    pub fn approve_requisition(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
        approver_id: UserId,
        comments: Option<String>,
    ) -> Result<Requisition, ServiceError> {
        let dispatched = self.dispatch_with_retry(
            tenant_id,
            requisition_id,
            RequisitionCommand::ApproveRequisition(ApproveRequisition {
                tenant_id,
                requisition_id,
                approver_id,
                comments,
                occurred_at: Utc::now(),
            }),
        )?;
        self.record_degradations(requisition_id, approver_id, &dispatched);

        let promoted = dispatched
            .events
            .iter()
            .any(|e| e.event_type == "requisitions.requisition.approved");
        self.audit.log_event(
            if promoted {
                "requisition.approved"
            } else {
                "requisition.approval_recorded"
            },
            ENTITY_TYPE,
            &requisition_id.to_string(),
            approver_id,
            json!({}),
        );

        self.load(tenant_id, requisition_id)
    }

    /// Record one approver's rejection; the requisition becomes terminal.
    pub fn reject_requisition(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
        approver_id: UserId,
        comments: Option<String>,
    ) -> Result<Requisition, ServiceError> {
        let dispatched = self.dispatch_with_retry(
            tenant_id,
            requisition_id,
            RequisitionCommand::RejectRequisition(RejectRequisition {
                tenant_id,
                requisition_id,
                approver_id,
                comments,
                occurred_at: Utc::now(),
            }),
        )?;
        self.record_degradations(requisition_id, approver_id, &dispatched);

        self.audit.log_event(
            "requisition.rejected",
            ENTITY_TYPE,
            &requisition_id.to_string(),
            approver_id,
            json!({}),
        );

        self.load(tenant_id, requisition_id)
    }

    /// Cancel a draft or submitted requisition.
    pub fn cancel_requisition(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
        user_id: UserId,
        reason: Option<String>,
    ) -> Result<Requisition, ServiceError> {
        let dispatched = self.dispatch_with_retry(
            tenant_id,
            requisition_id,
            RequisitionCommand::CancelRequisition(CancelRequisition {
                tenant_id,
                requisition_id,
                cancelled_by: user_id,
                reason: reason.clone(),
                occurred_at: Utc::now(),
            }),
        )?;
        self.record_degradations(requisition_id, user_id, &dispatched);

        self.audit.log_event(
            "requisition.cancelled",
            ENTITY_TYPE,
            &requisition_id.to_string(),
            user_id,
            json!({ "reason": reason }),
        );

        self.load(tenant_id, requisition_id)
    }

    /// Rehydrate a requisition from its stream.
    pub fn get_requisition(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
    ) -> Result<Requisition, ServiceError> {
        self.load(tenant_id, requisition_id)
    }

    /// Filter, sort and paginate the tenant's requisitions (read model).
    pub fn query_requisitions(
        &self,
        tenant_id: TenantId,
        filter: &RequisitionFilter,
        sort_by: SortBy,
        sort_order: SortOrder,
        page: Pagination,
    ) -> RequisitionPage {
        self.projection
            .query(tenant_id, filter, sort_by, sort_order, page)
    }

    /// Structural checks plus the near-duplicate heuristic.
    pub fn validate_requisition(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
    ) -> Result<ValidationReport, ServiceError> {
        let requisition = self.load(tenant_id, requisition_id)?;
        let now = Utc::now();
        let mut errors = Vec::new();

        if requisition.items().is_empty() {
            errors.push("requisition has no line items".to_string());
        }
        if requisition.total_amount() == 0 {
            errors.push("total amount must be positive".to_string());
        }
        match requisition.required_by() {
            Some(required_by) if required_by > now => {}
            _ => errors.push("required-by date must be in the future".to_string()),
        }

        // Near-duplicate heuristic: an open requisition in the same
        // department, created in the trailing 30 days, whose title shares
        // this one's leading keyword. Permissive on purpose: a false flag is
        // cheaper than a missed duplicate order.
        if let (Some(department_id), Some(keyword)) = (
            requisition.department_id(),
            leading_keyword(requisition.title()),
        ) {
            let cutoff = now - chrono::Duration::days(30);
            for other in self.projection.list(tenant_id) {
                if other.requisition_id == requisition_id {
                    continue;
                }
                if other.department_id != department_id {
                    continue;
                }
                if !matches!(
                    other.status,
                    RequisitionStatus::Submitted | RequisitionStatus::Approved
                ) {
                    continue;
                }
                if other.created_at < cutoff {
                    continue;
                }
                if leading_keyword(&other.title).as_deref() == Some(keyword.as_str()) {
                    errors.push(format!(
                        "possible duplicate of {} ({})",
                        other.requisition_number, other.title
                    ));
                }
            }
        }

        Ok(ValidationReport {
            valid: errors.is_empty(),
            errors,
        })
    }

    /// Ask the budget collaborator whether the requisition's total fits the
    /// department's remaining capacity.
    pub fn check_budget_availability(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
    ) -> Result<BudgetCheck, ServiceError> {
        let requisition = self.load(tenant_id, requisition_id)?;
        let Some(department_id) = requisition.department_id() else {
            return Err(ServiceError::System(
                "requisition has no department".to_string(),
            ));
        };

        match self.budget.available(tenant_id, department_id, None) {
            Ok(remaining) if requisition.total_amount() <= remaining => {
                Ok(BudgetCheck::Within { remaining })
            }
            Ok(remaining) => Ok(BudgetCheck::Exceeded { remaining }),
            Err(err) => {
                tracing::warn!(requisition_id = %requisition_id, "budget check degraded: {err}");
                Ok(BudgetCheck::Unknown {
                    reason: err.to_string(),
                })
            }
        }
    }

    fn dispatch_once(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
        command: RequisitionCommand,
    ) -> Result<Dispatched, ServiceError> {
        self.dispatcher
            .dispatch::<Requisition>(
                tenant_id,
                requisition_id.0,
                REQUISITION_AGGREGATE_TYPE,
                command,
                |_, id| Requisition::empty(RequisitionId::new(id)),
            )
            .map_err(ServiceError::from)
    }

    fn dispatch_with_retry(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
        command: RequisitionCommand,
    ) -> Result<Dispatched, ServiceError> {
        let mut attempts = 0;
        loop {
            match self.dispatcher.dispatch::<Requisition>(
                tenant_id,
                requisition_id.0,
                REQUISITION_AGGREGATE_TYPE,
                command.clone(),
                |_, id| Requisition::empty(RequisitionId::new(id)),
            ) {
                Err(DispatchError::Concurrency(msg)) if attempts < MAX_CONFLICT_RETRIES => {
                    attempts += 1;
                    tracing::debug!(
                        requisition_id = %requisition_id,
                        attempt = attempts,
                        "optimistic conflict, retrying: {msg}"
                    );
                }
                other => return other.map_err(ServiceError::from),
            }
        }
    }

    fn record_degradations(
        &self,
        requisition_id: RequisitionId,
        actor_id: UserId,
        dispatched: &Dispatched,
    ) {
        for failure in &dispatched.publish_failures {
            self.audit.log_event(
                "event.publish_failed",
                ENTITY_TYPE,
                &requisition_id.to_string(),
                actor_id,
                json!({ "error": failure }),
            );
        }
    }

    fn load(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
    ) -> Result<Requisition, ServiceError> {
        let mut stream = self
            .store
            .load_stream(tenant_id, requisition_id.0)
            .map_err(|err| ServiceError::System(err.to_string()))?;
        if stream.is_empty() {
            return Err(ServiceError::NotFound);
        }
        stream.sort_by_key(|e| e.sequence_number);

        let mut requisition = Requisition::empty(requisition_id);
        for stored in stream {
            let event: RequisitionEvent = serde_json::from_value(stored.payload)
                .map_err(|err| ServiceError::System(err.to_string()))?;
            requisition.apply(&event);
        }
        Ok(requisition)
    }
}

/// First whitespace-separated token of a title, lowercased.
fn leading_keyword(title: &str) -> Option<String> {
    title.split_whitespace().next().map(|word| word.to_lowercase())
}

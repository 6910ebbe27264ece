use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procflow_core::{
    Aggregate, AggregateId, AggregateRoot, DepartmentId, DomainError, TenantId, UserId, ValueObject,
};
use procflow_events::Event;

use crate::number::RequisitionNumber;
use crate::validation::{RequisitionDraft, creation_violations};

/// Requisition identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequisitionId(pub AggregateId);

impl RequisitionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RequisitionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Requisition status lifecycle.
///
/// `Approved`, `Rejected` and `Cancelled` are terminal; no approval record
/// changes status once a requisition reaches one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequisitionStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Cancelled,
}

/// Requestor-assigned urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

/// Procurement process type; approval rules are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequisitionType {
    Stock,
    Direct,
    Service,
    Asset,
}

/// Decision state of a single approval record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// One requested product/service line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_no: u32,
    pub product_id: Option<AggregateId>,
    pub description: String,
    pub quantity: u32,
    /// Confirmed unit price, if already known (smallest currency unit).
    pub unit_price: Option<u64>,
    /// Estimated unit price in smallest currency unit (e.g. cents).
    pub estimated_unit_price: u64,
    pub currency: String,
    pub unit_of_measure: String,
    pub category: String,
    pub requested_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub suggested_supplier_ids: Vec<AggregateId>,
}

impl LineItem {
    /// Estimated line total in smallest currency unit.
    pub fn line_total(&self) -> u64 {
        self.estimated_unit_price * u64::from(self.quantity)
    }
}

impl ValueObject for LineItem {}

/// Estimated total over a set of line items.
pub fn total_amount(items: &[LineItem]) -> u64 {
    items.iter().map(LineItem::line_total).sum()
}

/// One approver slot materialized from the approval rules at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedApproval {
    pub approver_id: UserId,
    /// Ordering level; ascending = earlier in the chain.
    pub level: u32,
    pub required: bool,
}

/// One approver's pending/decided vote within the approval chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approver_id: UserId,
    /// Ordering level; ascending = earlier in the chain.
    pub level: u32,
    pub required: bool,
    pub status: ApprovalStatus,
    pub comments: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Aggregate root: Requisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requisition {
    id: RequisitionId,
    tenant_id: Option<TenantId>,
    requisition_number: Option<RequisitionNumber>,
    title: String,
    description: Option<String>,
    requestor_id: Option<UserId>,
    department_id: Option<DepartmentId>,
    priority: Priority,
    requisition_type: RequisitionType,
    status: RequisitionStatus,
    /// Derived: Σ estimated line totals, in smallest currency unit.
    total_amount: u64,
    currency: String,
    required_by: Option<DateTime<Utc>>,
    justification: Option<String>,
    items: Vec<LineItem>,
    approvals: Vec<ApprovalRecord>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Requisition {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RequisitionId) -> Self {
        Self {
            id,
            tenant_id: None,
            requisition_number: None,
            title: String::new(),
            description: None,
            requestor_id: None,
            department_id: None,
            priority: Priority::Normal,
            requisition_type: RequisitionType::Stock,
            status: RequisitionStatus::Draft,
            total_amount: 0,
            currency: String::new(),
            required_by: None,
            justification: None,
            items: Vec::new(),
            approvals: Vec::new(),
            created_at: None,
            updated_at: None,
            submitted_at: None,
            approved_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RequisitionId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn requisition_number(&self) -> Option<RequisitionNumber> {
        self.requisition_number
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn requestor_id(&self) -> Option<UserId> {
        self.requestor_id
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn requisition_type(&self) -> RequisitionType {
        self.requisition_type
    }

    pub fn status(&self) -> RequisitionStatus {
        self.status
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn required_by(&self) -> Option<DateTime<Utc>> {
        self.required_by
    }

    pub fn justification(&self) -> Option<&str> {
        self.justification.as_deref()
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn approvals(&self) -> &[ApprovalRecord] {
        &self.approvals
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }
}

impl AggregateRoot for Requisition {
    type Id = RequisitionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRequisition.
///
/// Carries the already-allocated requisition number and the approval plan
/// materialized from the rules, so one command decides the whole aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequisition {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub requisition_number: RequisitionNumber,
    pub requestor_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub department_id: DepartmentId,
    pub priority: Priority,
    pub requisition_type: RequisitionType,
    pub required_by: DateTime<Utc>,
    pub justification: Option<String>,
    pub items: Vec<LineItem>,
    pub approval_plan: Vec<PlannedApproval>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitRequisition (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequisition {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveRequisition (one approver's decision).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRequisition {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub approver_id: UserId,
    pub comments: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectRequisition (one approver's decision).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRequisition {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub approver_id: UserId,
    pub comments: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelRequisition (owner/administrative action).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequisition {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub cancelled_by: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequisitionCommand {
    CreateRequisition(CreateRequisition),
    SubmitRequisition(SubmitRequisition),
    ApproveRequisition(ApproveRequisition),
    RejectRequisition(RejectRequisition),
    CancelRequisition(CancelRequisition),
}

/// Event: RequisitionCreated.
///
/// Header, line items and the (already merged) approval plan travel in one
/// event, so creation is a single atomic append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionCreated {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub requisition_number: RequisitionNumber,
    pub requestor_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub department_id: DepartmentId,
    pub priority: Priority,
    pub requisition_type: RequisitionType,
    pub required_by: DateTime<Utc>,
    pub justification: Option<String>,
    pub items: Vec<LineItem>,
    pub approvals: Vec<PlannedApproval>,
    /// Derived at decision time: Σ estimated line totals.
    pub total_amount: u64,
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionSubmitted {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ApprovalRecorded (one approver approved their record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecorded {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub approver_id: UserId,
    pub level: u32,
    pub comments: Option<String>,
    /// Requisition status after this decision is taken into account.
    pub resulting_status: RequisitionStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionApproved (every required record is approved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionApproved {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RejectionRecorded (one approver rejected their record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionRecorded {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub approver_id: UserId,
    pub level: u32,
    pub comments: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionRejected {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionCancelled {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub cancelled_by: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequisitionEvent {
    RequisitionCreated(RequisitionCreated),
    RequisitionSubmitted(RequisitionSubmitted),
    ApprovalRecorded(ApprovalRecorded),
    RequisitionApproved(RequisitionApproved),
    RejectionRecorded(RejectionRecorded),
    RequisitionRejected(RequisitionRejected),
    RequisitionCancelled(RequisitionCancelled),
}

impl Event for RequisitionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequisitionEvent::RequisitionCreated(_) => "requisitions.requisition.created",
            RequisitionEvent::RequisitionSubmitted(_) => "requisitions.requisition.submitted",
            RequisitionEvent::ApprovalRecorded(_) => "requisitions.requisition.approval_recorded",
            RequisitionEvent::RequisitionApproved(_) => "requisitions.requisition.approved",
            RequisitionEvent::RejectionRecorded(_) => "requisitions.requisition.rejection_recorded",
            RequisitionEvent::RequisitionRejected(_) => "requisitions.requisition.rejected",
            RequisitionEvent::RequisitionCancelled(_) => "requisitions.requisition.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequisitionEvent::RequisitionCreated(e) => e.occurred_at,
            RequisitionEvent::RequisitionSubmitted(e) => e.occurred_at,
            RequisitionEvent::ApprovalRecorded(e) => e.occurred_at,
            RequisitionEvent::RequisitionApproved(e) => e.occurred_at,
            RequisitionEvent::RejectionRecorded(e) => e.occurred_at,
            RequisitionEvent::RequisitionRejected(e) => e.occurred_at,
            RequisitionEvent::RequisitionCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Requisition {
    type Command = RequisitionCommand;
    type Event = RequisitionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RequisitionEvent::RequisitionCreated(e) => {
                self.id = e.requisition_id;
                self.tenant_id = Some(e.tenant_id);
                self.requisition_number = Some(e.requisition_number);
                self.title = e.title.clone();
                self.description = e.description.clone();
                self.requestor_id = Some(e.requestor_id);
                self.department_id = Some(e.department_id);
                self.priority = e.priority;
                self.requisition_type = e.requisition_type;
                self.status = RequisitionStatus::Draft;
                self.total_amount = e.total_amount;
                self.currency = e.currency.clone();
                self.required_by = Some(e.required_by);
                self.justification = e.justification.clone();
                self.items = e.items.clone();
                self.approvals = e
                    .approvals
                    .iter()
                    .map(|p| ApprovalRecord {
                        approver_id: p.approver_id,
                        level: p.level,
                        required: p.required,
                        status: ApprovalStatus::Pending,
                        comments: None,
                        decided_at: None,
                    })
                    .collect();
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            RequisitionEvent::RequisitionSubmitted(e) => {
                self.status = RequisitionStatus::Submitted;
                self.submitted_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
            }
            RequisitionEvent::ApprovalRecorded(e) => {
                if let Some(record) = self
                    .approvals
                    .iter_mut()
                    .find(|r| r.approver_id == e.approver_id && r.level == e.level)
                {
                    record.status = ApprovalStatus::Approved;
                    record.comments = e.comments.clone();
                    record.decided_at = Some(e.occurred_at);
                }
                self.updated_at = Some(e.occurred_at);
            }
            RequisitionEvent::RequisitionApproved(e) => {
                self.status = RequisitionStatus::Approved;
                self.approved_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
            }
            RequisitionEvent::RejectionRecorded(e) => {
                if let Some(record) = self
                    .approvals
                    .iter_mut()
                    .find(|r| r.approver_id == e.approver_id && r.level == e.level)
                {
                    record.status = ApprovalStatus::Rejected;
                    record.comments = e.comments.clone();
                    record.decided_at = Some(e.occurred_at);
                }
                self.updated_at = Some(e.occurred_at);
            }
            RequisitionEvent::RequisitionRejected(e) => {
                self.status = RequisitionStatus::Rejected;
                self.updated_at = Some(e.occurred_at);
            }
            RequisitionEvent::RequisitionCancelled(e) => {
                self.status = RequisitionStatus::Cancelled;
                self.updated_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RequisitionCommand::CreateRequisition(cmd) => self.handle_create(cmd),
            RequisitionCommand::SubmitRequisition(cmd) => self.handle_submit(cmd),
            RequisitionCommand::ApproveRequisition(cmd) => self.handle_approve(cmd),
            RequisitionCommand::RejectRequisition(cmd) => self.handle_reject(cmd),
            RequisitionCommand::CancelRequisition(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Requisition {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_requisition_id(&self, requisition_id: RequisitionId) -> Result<(), DomainError> {
        if self.id != requisition_id {
            return Err(DomainError::invariant("requisition_id mismatch"));
        }
        Ok(())
    }

    /// First pending record for an approver: lowest level wins, insertion
    /// order breaks ties.
    fn first_pending_for(&self, approver_id: UserId) -> Option<&ApprovalRecord> {
        self.approvals
            .iter()
            .filter(|r| r.approver_id == approver_id && r.status == ApprovalStatus::Pending)
            .min_by_key(|r| r.level)
    }

    /// Would every required record be approved once (approver, level) flips?
    fn required_complete_after(&self, approver_id: UserId, level: u32) -> bool {
        self.approvals.iter().filter(|r| r.required).all(|r| {
            r.status == ApprovalStatus::Approved
                || (r.approver_id == approver_id && r.level == level)
        })
    }

    fn handle_create(&self, cmd: &CreateRequisition) -> Result<Vec<RequisitionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("requisition already exists"));
        }

        let draft = RequisitionDraft {
            title: &cmd.title,
            department_id: Some(cmd.department_id),
            required_by: Some(cmd.required_by),
            items: &cmd.items,
            now: cmd.occurred_at,
        };
        let violations = creation_violations(&draft);
        if !violations.is_empty() {
            return Err(DomainError::validation_all(violations));
        }

        let currency = cmd.items[0].currency.clone();

        Ok(vec![RequisitionEvent::RequisitionCreated(RequisitionCreated {
            tenant_id: cmd.tenant_id,
            requisition_id: cmd.requisition_id,
            requisition_number: cmd.requisition_number,
            requestor_id: cmd.requestor_id,
            title: cmd.title.clone(),
            description: cmd.description.clone(),
            department_id: cmd.department_id,
            priority: cmd.priority,
            requisition_type: cmd.requisition_type,
            required_by: cmd.required_by,
            justification: cmd.justification.clone(),
            items: cmd.items.clone(),
            approvals: merge_approval_plan(&cmd.approval_plan),
            total_amount: total_amount(&cmd.items),
            currency,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitRequisition) -> Result<Vec<RequisitionEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_requisition_id(cmd.requisition_id)?;

        if self.status != RequisitionStatus::Draft {
            return Err(DomainError::conflict(
                "only draft requisitions can be submitted",
            ));
        }

        Ok(vec![RequisitionEvent::RequisitionSubmitted(
            RequisitionSubmitted {
                tenant_id: cmd.tenant_id,
                requisition_id: cmd.requisition_id,
                submitted_by: cmd.submitted_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_approve(
        &self,
        cmd: &ApproveRequisition,
    ) -> Result<Vec<RequisitionEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_requisition_id(cmd.requisition_id)?;

        if self.status != RequisitionStatus::Submitted {
            return Err(DomainError::conflict(
                "only submitted requisitions can be approved",
            ));
        }

        let record = self
            .first_pending_for(cmd.approver_id)
            .ok_or(DomainError::Unauthorized)?;
        let level = record.level;

        let completes = self.required_complete_after(cmd.approver_id, level);
        let resulting_status = if completes {
            RequisitionStatus::Approved
        } else {
            RequisitionStatus::Submitted
        };

        let mut events = vec![RequisitionEvent::ApprovalRecorded(ApprovalRecorded {
            tenant_id: cmd.tenant_id,
            requisition_id: cmd.requisition_id,
            approver_id: cmd.approver_id,
            level,
            comments: cmd.comments.clone(),
            resulting_status,
            occurred_at: cmd.occurred_at,
        })];

        if completes {
            events.push(RequisitionEvent::RequisitionApproved(RequisitionApproved {
                tenant_id: cmd.tenant_id,
                requisition_id: cmd.requisition_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_reject(&self, cmd: &RejectRequisition) -> Result<Vec<RequisitionEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_requisition_id(cmd.requisition_id)?;

        if self.status != RequisitionStatus::Submitted {
            return Err(DomainError::conflict(
                "only submitted requisitions can be rejected",
            ));
        }

        let record = self
            .first_pending_for(cmd.approver_id)
            .ok_or(DomainError::Unauthorized)?;
        let level = record.level;

        // A rejection terminates the whole requisition.
        Ok(vec![
            RequisitionEvent::RejectionRecorded(RejectionRecorded {
                tenant_id: cmd.tenant_id,
                requisition_id: cmd.requisition_id,
                approver_id: cmd.approver_id,
                level,
                comments: cmd.comments.clone(),
                occurred_at: cmd.occurred_at,
            }),
            RequisitionEvent::RequisitionRejected(RequisitionRejected {
                tenant_id: cmd.tenant_id,
                requisition_id: cmd.requisition_id,
                occurred_at: cmd.occurred_at,
            }),
        ])
    }

    fn handle_cancel(&self, cmd: &CancelRequisition) -> Result<Vec<RequisitionEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_requisition_id(cmd.requisition_id)?;

        match self.status {
            RequisitionStatus::Draft | RequisitionStatus::Submitted => {}
            _ => {
                return Err(DomainError::conflict(
                    "only draft or submitted requisitions can be cancelled",
                ));
            }
        }

        Ok(vec![RequisitionEvent::RequisitionCancelled(
            RequisitionCancelled {
                tenant_id: cmd.tenant_id,
                requisition_id: cmd.requisition_id,
                cancelled_by: cmd.cancelled_by,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

/// Collapse duplicate (approver, level) pairs contributed by independent
/// rules. One decision acts on exactly one record, so a duplicated pair could
/// never become fully approved; `required` survives if any contributor set it.
fn merge_approval_plan(plan: &[PlannedApproval]) -> Vec<PlannedApproval> {
    let mut merged: Vec<PlannedApproval> = Vec::with_capacity(plan.len());
    for entry in plan {
        match merged
            .iter_mut()
            .find(|p| p.approver_id == entry.approver_id && p.level == entry.level)
        {
            Some(existing) => existing.required = existing.required || entry.required,
            None => merged.push(*entry),
        }
    }
    merged
}

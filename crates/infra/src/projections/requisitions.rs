use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use procflow_core::{AggregateId, DepartmentId, TenantId, UserId};
use procflow_events::EventEnvelope;
use procflow_requisitions::{
    Priority, RequisitionEvent, RequisitionId, RequisitionStatus, RequisitionType,
};

use crate::read_model::TenantStore;

/// Aggregate type tag carried by requisition event envelopes.
pub const REQUISITION_AGGREGATE_TYPE: &str = "requisitions.requisition";

/// Query-optimized view of a requisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequisitionReadModel {
    pub requisition_id: RequisitionId,
    pub requisition_number: String,
    pub title: String,
    pub description: Option<String>,
    pub requestor_id: UserId,
    pub department_id: DepartmentId,
    pub priority: Priority,
    pub requisition_type: RequisitionType,
    pub status: RequisitionStatus,
    /// Smallest currency unit.
    pub total_amount: u64,
    pub currency: String,
    pub required_by: DateTime<Utc>,
    pub line_count: u32,
    /// Approval records still awaiting a decision.
    pub pending_approvals: u32,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Query filter; all clauses are conjunctive and optional.
#[derive(Debug, Clone, Default)]
pub struct RequisitionFilter {
    pub status: Option<RequisitionStatus>,
    pub priority: Option<Priority>,
    pub requisition_type: Option<RequisitionType>,
    pub requestor_id: Option<UserId>,
    pub department_id: Option<DepartmentId>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Case-insensitive substring over number, title and description.
    pub search: Option<String>,
}

impl RequisitionFilter {
    fn matches(&self, rm: &RequisitionReadModel) -> bool {
        if self.status.is_some_and(|s| rm.status != s) {
            return false;
        }
        if self.priority.is_some_and(|p| rm.priority != p) {
            return false;
        }
        if self.requisition_type.is_some_and(|t| rm.requisition_type != t) {
            return false;
        }
        if self.requestor_id.is_some_and(|u| rm.requestor_id != u) {
            return false;
        }
        if self.department_id.is_some_and(|d| rm.department_id != d) {
            return false;
        }
        if self.created_after.is_some_and(|t| rm.created_at < t) {
            return false;
        }
        if self.created_before.is_some_and(|t| rm.created_at > t) {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = rm.requisition_number.to_lowercase().contains(&needle)
                || rm.title.to_lowercase().contains(&needle)
                || rm
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// 1-based page + capped page size.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
        }
    }
}

impl Pagination {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(50).clamp(1, 1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    CreatedAt,
    TotalAmount,
    RequisitionNumber,
    Priority,
    RequiredBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Paginated query result.
#[derive(Debug, Clone)]
pub struct RequisitionPage {
    pub items: Vec<RequisitionReadModel>,
    /// Matching rows across all pages.
    pub total: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum RequisitionProjectionError {
    #[error("failed to deserialize requisition event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: committed requisition events → [`RequisitionReadModel`]s.
#[derive(Debug)]
pub struct RequisitionsProjection<S>
where
    S: TenantStore<RequisitionId, RequisitionReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> RequisitionsProjection<S>
where
    S: TenantStore<RequisitionId, RequisitionReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey {
                    tenant_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    tenant_id,
                    aggregate_id,
                },
                seq,
            );
        }
    }

    pub fn get(
        &self,
        tenant_id: TenantId,
        requisition_id: &RequisitionId,
    ) -> Option<RequisitionReadModel> {
        self.store.get(tenant_id, requisition_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<RequisitionReadModel> {
        self.store.list(tenant_id)
    }

    /// Filter, sort and paginate the tenant's requisitions.
    pub fn query(
        &self,
        tenant_id: TenantId,
        filter: &RequisitionFilter,
        sort_by: SortBy,
        sort_order: SortOrder,
        page: Pagination,
    ) -> RequisitionPage {
        let mut matches: Vec<RequisitionReadModel> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|rm| filter.matches(rm))
            .collect();
        let total = matches.len() as u64;

        match sort_by {
            SortBy::CreatedAt => matches.sort_by_key(|rm| rm.created_at),
            SortBy::TotalAmount => matches.sort_by_key(|rm| rm.total_amount),
            SortBy::RequisitionNumber => matches.sort_by(|a, b| {
                a.requisition_number.cmp(&b.requisition_number)
            }),
            SortBy::Priority => matches.sort_by_key(|rm| rm.priority),
            SortBy::RequiredBy => matches.sort_by_key(|rm| rm.required_by),
        }
        if sort_order == SortOrder::Desc {
            matches.reverse();
        }

        let offset = (page.page - 1) as usize * page.page_size as usize;
        let items = matches
            .into_iter()
            .skip(offset)
            .take(page.page_size as usize)
            .collect();

        RequisitionPage { items, total }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), RequisitionProjectionError> {
        if envelope.aggregate_type() != REQUISITION_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(RequisitionProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate delivery; already applied.
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(RequisitionProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: RequisitionEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| RequisitionProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, requisition_id) = event_scope(&ev);
        if event_tenant != tenant_id {
            return Err(RequisitionProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if requisition_id.0 != aggregate_id {
            return Err(RequisitionProjectionError::TenantIsolation(
                "event requisition_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            RequisitionEvent::RequisitionCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.requisition_id,
                    RequisitionReadModel {
                        requisition_id: e.requisition_id,
                        requisition_number: e.requisition_number.to_string(),
                        title: e.title,
                        description: e.description,
                        requestor_id: e.requestor_id,
                        department_id: e.department_id,
                        priority: e.priority,
                        requisition_type: e.requisition_type,
                        status: RequisitionStatus::Draft,
                        total_amount: e.total_amount,
                        currency: e.currency,
                        required_by: e.required_by,
                        line_count: e.items.len() as u32,
                        pending_approvals: e.approvals.len() as u32,
                        created_at: e.occurred_at,
                        submitted_at: None,
                        approved_at: None,
                    },
                );
            }
            RequisitionEvent::RequisitionSubmitted(e) => {
                self.mutate(tenant_id, e.requisition_id, |rm| {
                    rm.status = RequisitionStatus::Submitted;
                    rm.submitted_at = Some(e.occurred_at);
                });
            }
            RequisitionEvent::ApprovalRecorded(e) => {
                self.mutate(tenant_id, e.requisition_id, |rm| {
                    rm.pending_approvals = rm.pending_approvals.saturating_sub(1);
                });
            }
            RequisitionEvent::RequisitionApproved(e) => {
                self.mutate(tenant_id, e.requisition_id, |rm| {
                    rm.status = RequisitionStatus::Approved;
                    rm.approved_at = Some(e.occurred_at);
                });
            }
            RequisitionEvent::RejectionRecorded(e) => {
                self.mutate(tenant_id, e.requisition_id, |rm| {
                    rm.pending_approvals = rm.pending_approvals.saturating_sub(1);
                });
            }
            RequisitionEvent::RequisitionRejected(e) => {
                self.mutate(tenant_id, e.requisition_id, |rm| {
                    rm.status = RequisitionStatus::Rejected;
                });
            }
            RequisitionEvent::RequisitionCancelled(e) => {
                self.mutate(tenant_id, e.requisition_id, |rm| {
                    rm.status = RequisitionStatus::Cancelled;
                });
            }
        }

        self.update_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn mutate(
        &self,
        tenant_id: TenantId,
        requisition_id: RequisitionId,
        f: impl FnOnce(&mut RequisitionReadModel),
    ) {
        match self.store.get(tenant_id, &requisition_id) {
            Some(mut rm) => {
                f(&mut rm);
                self.store.upsert(tenant_id, requisition_id, rm);
            }
            None => {
                // Only possible when applying a partial stream (cursor resumed
                // past the creation event without its read model).
                tracing::warn!(%requisition_id, "event for unknown requisition read model; skipping");
            }
        }
    }

    /// Drop and rebuild read models for every tenant present in `envelopes`.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), RequisitionProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.store.clear_tenant(t);
                if let Ok(mut cursors) = self.cursors.write() {
                    cursors.retain(|k, _| k.tenant_id != t);
                }
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

fn event_scope(event: &RequisitionEvent) -> (TenantId, RequisitionId) {
    match event {
        RequisitionEvent::RequisitionCreated(e) => (e.tenant_id, e.requisition_id),
        RequisitionEvent::RequisitionSubmitted(e) => (e.tenant_id, e.requisition_id),
        RequisitionEvent::ApprovalRecorded(e) => (e.tenant_id, e.requisition_id),
        RequisitionEvent::RequisitionApproved(e) => (e.tenant_id, e.requisition_id),
        RequisitionEvent::RejectionRecorded(e) => (e.tenant_id, e.requisition_id),
        RequisitionEvent::RequisitionRejected(e) => (e.tenant_id, e.requisition_id),
        RequisitionEvent::RequisitionCancelled(e) => (e.tenant_id, e.requisition_id),
    }
}

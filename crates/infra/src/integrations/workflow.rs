//! External workflow engine boundary.

use std::sync::Mutex;

use uuid::Uuid;

use procflow_core::{TenantId, UserId};
use procflow_requisitions::{RequisitionId, RequisitionType};

/// Context handed to the workflow engine when a requisition is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowContext {
    pub tenant_id: TenantId,
    pub requisition_id: RequisitionId,
    pub requisition_number: String,
    pub process_type: RequisitionType,
    pub initiated_by: UserId,
    /// Smallest currency unit.
    pub total_amount: u64,
}

/// Outcome of a workflow start. Degradation is an explicit, testable variant
/// rather than a silently-returning stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowStart {
    Started { instance_id: Uuid },
    Skipped { reason: String },
    Failed { reason: String },
}

/// Best-effort workflow collaborator.
///
/// Implementations report failure as [`WorkflowStart::Failed`]; nothing may
/// unwind into the caller, whose state transition has already committed.
pub trait WorkflowEngine: Send + Sync {
    fn start_workflow(&self, context: WorkflowContext) -> WorkflowStart;
}

/// In-memory engine for tests/dev.
///
/// Records started instances; construct with [`InMemoryWorkflowEngine::failing`]
/// to exercise degradation paths.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowEngine {
    started: Mutex<Vec<(WorkflowContext, Uuid)>>,
    fail_reason: Option<String>,
}

impl InMemoryWorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            fail_reason: Some(reason.into()),
        }
    }

    pub fn started(&self) -> Vec<(WorkflowContext, Uuid)> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl WorkflowEngine for InMemoryWorkflowEngine {
    fn start_workflow(&self, context: WorkflowContext) -> WorkflowStart {
        if let Some(reason) = &self.fail_reason {
            return WorkflowStart::Failed {
                reason: reason.clone(),
            };
        }

        let instance_id = Uuid::now_v7();
        if let Ok(mut started) = self.started.lock() {
            started.push((context, instance_id));
        }
        WorkflowStart::Started { instance_id }
    }
}

/// Engine used when no workflow subsystem is wired.
#[derive(Debug, Default)]
pub struct DisabledWorkflowEngine;

impl WorkflowEngine for DisabledWorkflowEngine {
    fn start_workflow(&self, _context: WorkflowContext) -> WorkflowStart {
        WorkflowStart::Skipped {
            reason: "workflow engine disabled".to_string(),
        }
    }
}

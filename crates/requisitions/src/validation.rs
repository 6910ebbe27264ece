//! Creation-time validation.
//!
//! Structural rules are expressed as a list of independent checks that are
//! always evaluated in full, so a caller receives every violation in one
//! response rather than the first one found. The same list runs at the
//! service boundary (before a sequence number is allocated) and inside the
//! aggregate's own command check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procflow_core::{AggregateId, DepartmentId};

use crate::requisition::{LineItem, Priority, RequisitionType};

/// Creation request as accepted at the service boundary.
///
/// Fields the domain requires are optional here precisely so their absence is
/// reported as a validation violation instead of a type error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequisitionInput {
    pub title: String,
    pub description: Option<String>,
    pub department_id: Option<DepartmentId>,
    pub priority: Priority,
    pub requisition_type: RequisitionType,
    pub required_by: Option<DateTime<Utc>>,
    pub justification: Option<String>,
    pub items: Vec<LineItemInput>,
}

/// One requested line as accepted at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
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

impl LineItemInput {
    pub fn into_line_item(self, line_no: u32) -> LineItem {
        LineItem {
            line_no,
            product_id: self.product_id,
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            estimated_unit_price: self.estimated_unit_price,
            currency: self.currency,
            unit_of_measure: self.unit_of_measure,
            category: self.category,
            requested_delivery_date: self.requested_delivery_date,
            notes: self.notes,
            suggested_supplier_ids: self.suggested_supplier_ids,
        }
    }
}

/// Borrowed view of a creation request.
///
/// Both the service (validating raw input) and the aggregate (re-checking a
/// command) build one of these, so there is exactly one list of rules.
#[derive(Debug, Clone, Copy)]
pub struct RequisitionDraft<'a> {
    pub title: &'a str,
    pub department_id: Option<DepartmentId>,
    pub required_by: Option<DateTime<Utc>>,
    pub items: &'a [LineItem],
    pub now: DateTime<Utc>,
}

type Check = fn(&RequisitionDraft<'_>) -> Vec<String>;

/// Every check runs; ordering only affects message order.
const CHECKS: &[Check] = &[
    title_present,
    department_present,
    required_by_in_future,
    items_present,
    item_rules,
    single_currency,
];

/// Run the full check list and collect every violation.
pub fn creation_violations(draft: &RequisitionDraft<'_>) -> Vec<String> {
    CHECKS.iter().flat_map(|check| check(draft)).collect()
}

fn title_present(draft: &RequisitionDraft<'_>) -> Vec<String> {
    if draft.title.trim().is_empty() {
        vec!["title must not be empty".to_string()]
    } else {
        vec![]
    }
}

fn department_present(draft: &RequisitionDraft<'_>) -> Vec<String> {
    if draft.department_id.is_none() {
        vec!["department is required".to_string()]
    } else {
        vec![]
    }
}

fn required_by_in_future(draft: &RequisitionDraft<'_>) -> Vec<String> {
    match draft.required_by {
        None => vec!["required-by date is required".to_string()],
        Some(required_by) if required_by <= draft.now => {
            vec!["required-by date must be strictly in the future".to_string()]
        }
        Some(_) => vec![],
    }
}

fn items_present(draft: &RequisitionDraft<'_>) -> Vec<String> {
    if draft.items.is_empty() {
        vec!["at least one line item is required".to_string()]
    } else {
        vec![]
    }
}

fn item_rules(draft: &RequisitionDraft<'_>) -> Vec<String> {
    let mut violations = Vec::new();
    for (idx, item) in draft.items.iter().enumerate() {
        let line = idx + 1;
        if item.description.trim().is_empty() {
            violations.push(format!("line {line}: description must not be empty"));
        }
        if item.quantity == 0 {
            violations.push(format!("line {line}: quantity must be positive"));
        }
        if item.estimated_unit_price == 0 {
            violations.push(format!("line {line}: estimated unit price must be positive"));
        }
        if item.category.trim().is_empty() {
            violations.push(format!("line {line}: category is required"));
        }
        if item.requested_delivery_date.is_none() {
            violations.push(format!("line {line}: requested delivery date is required"));
        }
    }
    violations
}

fn single_currency(draft: &RequisitionDraft<'_>) -> Vec<String> {
    let mut currencies: Vec<&str> = draft.items.iter().map(|i| i.currency.as_str()).collect();
    currencies.sort_unstable();
    currencies.dedup();
    if currencies.len() > 1 {
        vec!["line items must share a single currency".to_string()]
    } else {
        vec![]
    }
}

//! Year-scoped requisition sequence allocation.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use procflow_core::TenantId;
use procflow_requisitions::RequisitionNumber;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("sequence allocation failed: {0}")]
    Allocation(String),
}

/// Allocates unique, strictly increasing sequence values scoped to a
/// (tenant, calendar year) pair; the counter restarts at 1 each year.
///
/// Read-then-increment without serialization is incorrect under concurrent
/// callers: implementations must serialize allocation (a mutex-guarded
/// counter here, a database sequence in a persistent backend). Allocated
/// values are never reused, so a value burned by a failed creation leaves a
/// gap; the contract is uniqueness and strict increase, not density.
pub trait SequenceAllocator: Send + Sync {
    fn next_in_year(&self, tenant_id: TenantId, year: i32) -> Result<u32, SequenceError>;
}

/// In-memory allocator for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySequenceAllocator {
    counters: Mutex<HashMap<(TenantId, i32), u32>>,
}

impl InMemorySequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceAllocator for InMemorySequenceAllocator {
    fn next_in_year(&self, tenant_id: TenantId, year: i32) -> Result<u32, SequenceError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| SequenceError::Allocation("lock poisoned".to_string()))?;

        let counter = counters.entry((tenant_id, year)).or_insert(0);
        *counter = counter
            .checked_add(1)
            .ok_or_else(|| SequenceError::Allocation(format!("sequence exhausted for year {year}")))?;
        Ok(*counter)
    }
}

/// Allocate the next requisition number for a year.
pub fn allocate_number(
    allocator: &dyn SequenceAllocator,
    tenant_id: TenantId,
    year: i32,
) -> Result<RequisitionNumber, SequenceError> {
    let sequence = allocator.next_in_year(tenant_id, year)?;
    RequisitionNumber::new(year, sequence)
        .map_err(|err| SequenceError::Allocation(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn sequences_start_at_one_and_increase() {
        let allocator = InMemorySequenceAllocator::new();
        let tenant_id = TenantId::new();

        assert_eq!(allocator.next_in_year(tenant_id, 2025).unwrap(), 1);
        assert_eq!(allocator.next_in_year(tenant_id, 2025).unwrap(), 2);
        assert_eq!(allocator.next_in_year(tenant_id, 2025).unwrap(), 3);
    }

    #[test]
    fn sequences_restart_per_year() {
        let allocator = InMemorySequenceAllocator::new();
        let tenant_id = TenantId::new();

        assert_eq!(allocator.next_in_year(tenant_id, 2025).unwrap(), 1);
        assert_eq!(allocator.next_in_year(tenant_id, 2025).unwrap(), 2);
        assert_eq!(allocator.next_in_year(tenant_id, 2026).unwrap(), 1);
    }

    #[test]
    fn sequences_are_tenant_scoped() {
        let allocator = InMemorySequenceAllocator::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        assert_eq!(allocator.next_in_year(tenant_a, 2025).unwrap(), 1);
        assert_eq!(allocator.next_in_year(tenant_b, 2025).unwrap(), 1);
    }

    #[test]
    fn allocated_numbers_carry_the_textual_contract() {
        let allocator = InMemorySequenceAllocator::new();
        let tenant_id = TenantId::new();

        let number = allocate_number(&allocator, tenant_id, 2025).unwrap();
        assert_eq!(number.to_string(), "REQ-2025-001");
    }

    #[test]
    fn concurrent_allocation_yields_distinct_increasing_values() {
        let allocator = Arc::new(InMemorySequenceAllocator::new());
        let tenant_id = TenantId::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| allocator.next_in_year(tenant_id, 2025).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        all.sort_unstable();
        let expected: Vec<u32> = (1..=400).collect();
        assert_eq!(all, expected, "values must be exactly 1..=N with no duplicates");
    }
}

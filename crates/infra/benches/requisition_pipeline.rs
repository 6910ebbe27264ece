use criterion::{Criterion, Throughput, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::{Duration, Utc};

use procflow_core::{AggregateId, DepartmentId, TenantId, UserId};
use procflow_events::{EventEnvelope, InMemoryEventBus};
use procflow_infra::command_dispatcher::CommandDispatcher;
use procflow_infra::event_store::InMemoryEventStore;
use procflow_infra::projections::REQUISITION_AGGREGATE_TYPE;
use procflow_infra::sequence::{InMemorySequenceAllocator, SequenceAllocator};
use procflow_requisitions::{
    CreateRequisition, LineItem, Priority, Requisition, RequisitionCommand, RequisitionId,
    RequisitionNumber, RequisitionType,
};

fn line_item(line_no: u32) -> LineItem {
    LineItem {
        line_no,
        product_id: None,
        description: format!("item {line_no}"),
        quantity: 10,
        unit_price: None,
        estimated_unit_price: 2_500,
        currency: "USD".to_string(),
        unit_of_measure: "each".to_string(),
        category: "general".to_string(),
        requested_delivery_date: Some(Utc::now() + Duration::days(14)),
        notes: None,
        suggested_supplier_ids: vec![],
    }
}

fn create_cmd(tenant_id: TenantId, requisition_id: RequisitionId) -> RequisitionCommand {
    RequisitionCommand::CreateRequisition(CreateRequisition {
        tenant_id,
        requisition_id,
        requisition_number: RequisitionNumber::new(2025, 1).unwrap(),
        requestor_id: UserId::new(),
        title: "Benchmark requisition".to_string(),
        description: None,
        department_id: DepartmentId::new(),
        priority: Priority::Normal,
        requisition_type: RequisitionType::Stock,
        required_by: Utc::now() + Duration::days(30),
        justification: None,
        items: (1..=5).map(line_item).collect(),
        approval_plan: vec![],
        occurred_at: Utc::now(),
    })
}

fn bench_create_dispatch(c: &mut Criterion) {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
        Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store, bus);
    let tenant_id = TenantId::new();

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));
    group.bench_function("create_requisition", |b| {
        b.iter(|| {
            let requisition_id = RequisitionId::new(AggregateId::new());
            dispatcher
                .dispatch::<Requisition>(
                    tenant_id,
                    requisition_id.0,
                    REQUISITION_AGGREGATE_TYPE,
                    create_cmd(tenant_id, requisition_id),
                    |_, id| Requisition::empty(RequisitionId::new(id)),
                )
                .unwrap();
        })
    });
    group.finish();
}

fn bench_sequence_allocation(c: &mut Criterion) {
    let allocator = InMemorySequenceAllocator::new();
    let tenant_id = TenantId::new();

    let mut group = c.benchmark_group("sequence");
    group.throughput(Throughput::Elements(1));
    group.bench_function("next_in_year", |b| {
        b.iter(|| allocator.next_in_year(tenant_id, 2025).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_create_dispatch, bench_sequence_allocation);
criterion_main!(benches);

//! Command execution pipeline (application-level orchestration).
//!
//! One place implements the event-sourcing lifecycle for every aggregate:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//! 2. Rehydrate aggregate (apply history)
//! 3. Handle command (pure decision logic, produces events)
//! 4. Append events (optimistic concurrency against the loaded version)
//! 5. Publish committed events to the bus (best-effort, post-commit)
//! ```
//!
//! The append in step 4 is the atomic transaction of an operation: all events
//! a command decided commit together or not at all. Two concurrent commands
//! against the same stream both load the same version; exactly one append
//! succeeds, the other fails with [`DispatchError::Concurrency`] and can be
//! retried against the refreshed stream.
//!
//! Publication failures in step 5 do not roll anything back: the events are
//! durable, delivery is at-least-once, and the failures are reported on the
//! [`Dispatched`] outcome for the caller to record.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use procflow_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use procflow_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale stream version). Retryable.
    Concurrency(String),
    /// Tenant isolation violation (cross-tenant stream mixing).
    TenantIsolation(String),
    /// Domain validation failure; carries every violation.
    Validation(Vec<String>),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Illegal state transition (domain-level, not retryable).
    Conflict(String),
    /// Domain authorization failure.
    Unauthorized,
    /// Domain-level not found.
    NotFound,
    /// Failed to deserialize historical event payloads.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(violations) => DispatchError::Validation(violations),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(vec![msg]),
        }
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug)]
pub struct Dispatched {
    /// Committed events, with assigned sequence numbers.
    pub events: Vec<StoredEvent>,
    /// Events that committed but could not be published to the bus.
    /// The append is durable either way; the caller records the degradation.
    pub publish_failures: Vec<String>,
}

impl Dispatched {
    /// New stream version after this dispatch.
    pub fn stream_version(&self) -> u64 {
        self.events.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Composes an [`EventStore`] and an [`EventBus`], so tests run against
/// in-memory implementations and a persistent backend slots in behind the
/// same traits.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline.
    ///
    /// The `make_aggregate` closure creates the empty aggregate instance for
    /// rehydration, keeping the dispatcher generic over aggregate types.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Dispatched, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: procflow_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (tenant-scoped)
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                events: vec![],
                publish_failures: vec![],
            });
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (post-commit, best-effort)
        let mut publish_failures = Vec::new();
        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    event_type = %stored.event_type,
                    "event publication failed after commit: {err:?}"
                );
                publish_failures.push(format!("{}: {err:?}", stored.event_type));
            }
        }

        Ok(Dispatched {
            events: committed,
            publish_failures,
        })
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce tenant isolation even if a buggy backend returns cross-tenant
    // data, and require strictly increasing sequence numbers.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

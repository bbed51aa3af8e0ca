#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use peoplehub_core::{AggregateId, AggregateRoot, ModuleName};
use peoplehub_events::{
    BusError, DomainEvent, EventBuffer, EventBus, EventDispatcher, EventEnvelope, EventRegistry,
    HasDomainEvents, IntegrationEvent,
};
use peoplehub_infra::{
    CommitBatch, DurableStore, InMemoryStore, StoreError, StoredState, UnitOfWork,
};

pub fn module() -> ModuleName {
    ModuleName::new("hr").unwrap()
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(minute as i64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregates
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: AggregateId,
    pub name: String,
    pub grade: u32,
    #[serde(skip)]
    events: EventBuffer,
}

impl Employee {
    pub fn hire(name: &str, occurred_at: DateTime<Utc>) -> Self {
        let mut employee = Self {
            id: AggregateId::new(),
            name: name.to_string(),
            grade: 0,
            events: EventBuffer::new(),
        };
        employee.add_event(EmployeeHired {
            employee_id: employee.id,
            name: employee.name.clone(),
            occurred_at,
        });
        employee
    }

    pub fn promote(&mut self, occurred_at: DateTime<Utc>) {
        self.grade += 1;
        self.add_event(EmployeePromoted {
            employee_id: self.id,
            grade: self.grade,
            occurred_at,
        });
    }
}

impl AggregateRoot for Employee {
    const AGGREGATE_TYPE: &'static str = "hr.employee";

    fn id(&self) -> AggregateId {
        self.id
    }
}

impl HasDomainEvents for Employee {
    fn event_buffer(&self) -> &EventBuffer {
        &self.events
    }

    fn event_buffer_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: AggregateId,
    pub employee_id: AggregateId,
    #[serde(skip)]
    events: EventBuffer,
}

impl Contract {
    pub fn draft(employee_id: AggregateId, occurred_at: DateTime<Utc>) -> Self {
        let mut contract = Self {
            id: AggregateId::new(),
            employee_id,
            events: EventBuffer::new(),
        };
        contract.add_event(ContractDrafted {
            contract_id: contract.id,
            employee_id,
            occurred_at,
        });
        contract
    }
}

impl AggregateRoot for Contract {
    const AGGREGATE_TYPE: &'static str = "hr.contract";

    fn id(&self) -> AggregateId {
        self.id
    }
}

impl HasDomainEvents for Contract {
    fn event_buffer(&self) -> &EventBuffer {
        &self.events
    }

    fn event_buffer_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EmployeeHired {
    pub employee_id: AggregateId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for EmployeeHired {
    fn event_type(&self) -> &'static str {
        "hr.employee.hired"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[derive(Debug, Clone)]
pub struct EmployeePromoted {
    pub employee_id: AggregateId,
    pub grade: u32,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for EmployeePromoted {
    fn event_type(&self) -> &'static str {
        "hr.employee.promoted"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[derive(Debug, Clone)]
pub struct ContractDrafted {
    pub contract_id: AggregateId,
    pub employee_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for ContractDrafted {
    fn event_type(&self) -> &'static str {
        "hr.contract.drafted"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Integration events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeHiredV1 {
    pub employee_id: AggregateId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

impl IntegrationEvent for EmployeeHiredV1 {
    const EVENT_TYPE: &'static str = "hr.employee.hired";

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeePromotedV1 {
    pub employee_id: AggregateId,
    pub grade: u32,
    pub occurred_at: DateTime<Utc>,
}

impl IntegrationEvent for EmployeePromotedV1 {
    const EVENT_TYPE: &'static str = "hr.employee.promoted";

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDraftedV1 {
    pub contract_id: AggregateId,
    pub employee_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

impl IntegrationEvent for ContractDraftedV1 {
    const EVENT_TYPE: &'static str = "hr.contract.drafted";

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Hired → enqueue + draft a contract (which raises ContractDrafted);
/// Promoted → enqueue; ContractDrafted → enqueue.
pub fn handlers(dispatcher: &mut EventDispatcher<UnitOfWork>) {
    dispatcher
        .on::<EmployeeHired, _>(|e, uow| {
            uow.enqueue(&EmployeeHiredV1 {
                employee_id: e.employee_id,
                name: e.name.clone(),
                occurred_at: e.occurred_at,
            })?;
            uow.track(Contract::draft(e.employee_id, e.occurred_at))?;
            Ok(())
        })
        .on::<EmployeePromoted, _>(|e, uow| {
            uow.enqueue(&EmployeePromotedV1 {
                employee_id: e.employee_id,
                grade: e.grade,
                occurred_at: e.occurred_at,
            })?;
            Ok(())
        })
        .on::<ContractDrafted, _>(|e, uow| {
            uow.enqueue(&ContractDraftedV1 {
                contract_id: e.contract_id,
                employee_id: e.employee_id,
                occurred_at: e.occurred_at,
            })?;
            Ok(())
        });
}

pub fn dispatcher() -> Arc<EventDispatcher<UnitOfWork>> {
    let mut dispatcher = EventDispatcher::new();
    handlers(&mut dispatcher);
    Arc::new(dispatcher)
}

pub fn registry() -> Arc<EventRegistry> {
    let mut registry = EventRegistry::new();
    registry
        .register::<EmployeeHiredV1>()
        .register::<EmployeePromotedV1>()
        .register::<ContractDraftedV1>();
    Arc::new(registry)
}

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────

/// Durable store whose commits can be made to fail on demand.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: Arc<InMemoryStore>,
    fail_commits: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_commits: AtomicBool::new(false),
        }
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DurableStore for FlakyStore {
    async fn commit(&self, batch: CommitBatch) -> Result<usize, StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.commit(batch).await
    }

    async fn load_state(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<StoredState>, StoreError> {
        self.inner.load_state(aggregate_type, aggregate_id).await
    }
}

/// Bus that replays scripted results (then succeeds) and records publishes.
#[derive(Debug, Default)]
pub struct ScriptedBus {
    script: Mutex<VecDeque<Result<(), BusError>>>,
    published: Mutex<Vec<EventEnvelope>>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(results: impl IntoIterator<Item = Result<(), BusError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn published(&self) -> Vec<EventEnvelope> {
        self.published.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventBus for ScriptedBus {
    async fn publish(
        &self,
        envelope: &EventEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), BusError> {
        if cancel.is_cancelled() {
            return Err(BusError::Cancelled);
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.published.lock().unwrap().push(envelope.clone());
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

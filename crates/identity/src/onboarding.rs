//! Onboarding checklist aggregate.
//!
//! Created by the identity module's own handler when an account is registered,
//! in the same unit of work as the account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use peoplehub_core::{AggregateId, AggregateRoot, DomainError, DomainResult};
use peoplehub_events::{DomainEvent, EventBuffer, HasDomainEvents};

use crate::account::AccountId;

/// Tasks every new account starts with.
pub const DEFAULT_TASKS: &[&str] = &["sign_contract", "setup_payroll", "equipment_handover"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingChecklist {
    id: AggregateId,
    account_id: AccountId,
    open: Vec<String>,
    done: Vec<String>,
    #[serde(skip)]
    events: EventBuffer,
}

impl OnboardingChecklist {
    /// Start onboarding for `account_id`; raises [`OnboardingStarted`].
    pub fn start(account_id: AccountId, occurred_at: DateTime<Utc>) -> Self {
        let mut checklist = Self {
            id: AggregateId::new(),
            account_id,
            open: DEFAULT_TASKS.iter().map(|t| t.to_string()).collect(),
            done: Vec::new(),
            events: EventBuffer::new(),
        };
        checklist.add_event(OnboardingStarted {
            checklist_id: checklist.id,
            account_id,
            tasks: checklist.open.clone(),
            occurred_at,
        });
        checklist
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn open_tasks(&self) -> &[String] {
        &self.open
    }

    pub fn is_complete(&self) -> bool {
        self.open.is_empty()
    }

    /// Tick off an open task. Completion raises no integration-relevant
    /// event, so nothing is buffered.
    pub fn complete_task(&mut self, task: &str) -> DomainResult<()> {
        let Some(index) = self.open.iter().position(|t| t == task) else {
            return Err(DomainError::invariant(format!("task '{task}' is not open")));
        };
        let task = self.open.remove(index);
        self.done.push(task);
        Ok(())
    }
}

impl AggregateRoot for OnboardingChecklist {
    const AGGREGATE_TYPE: &'static str = "identity.onboarding";

    fn id(&self) -> AggregateId {
        self.id
    }
}

impl HasDomainEvents for OnboardingChecklist {
    fn event_buffer(&self) -> &EventBuffer {
        &self.events
    }

    fn event_buffer_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
}

#[derive(Debug, Clone)]
pub struct OnboardingStarted {
    pub checklist_id: AggregateId,
    pub account_id: AccountId,
    pub tasks: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for OnboardingStarted {
    fn event_type(&self) -> &'static str {
        "identity.onboarding.started"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

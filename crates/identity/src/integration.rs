//! Integration events published by the identity module.
//!
//! These are the wire contract other modules consume; the `EVENT_TYPE` tags
//! are stored in outbox rows and must stay stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use peoplehub_core::AggregateId;
use peoplehub_events::IntegrationEvent;

use crate::account::AccountId;
use crate::roles::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRegisteredV1 {
    pub account_id: AccountId,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignedV1 {
    pub account_id: AccountId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRevokedV1 {
    pub account_id: AccountId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSuspendedV1 {
    pub account_id: AccountId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountReactivatedV1 {
    pub account_id: AccountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingStartedV1 {
    pub checklist_id: AggregateId,
    pub account_id: AccountId,
    pub tasks: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

macro_rules! integration_event {
    ($t:ty, $tag:literal) => {
        impl IntegrationEvent for $t {
            const EVENT_TYPE: &'static str = $tag;

            fn occurred_at(&self) -> DateTime<Utc> {
                self.occurred_at
            }
        }
    };
}

integration_event!(AccountRegisteredV1, "identity.account.registered");
integration_event!(RoleAssignedV1, "identity.account.role_assigned");
integration_event!(RoleRevokedV1, "identity.account.role_revoked");
integration_event!(AccountSuspendedV1, "identity.account.suspended");
integration_event!(AccountReactivatedV1, "identity.account.reactivated");
integration_event!(OnboardingStartedV1, "identity.onboarding.started");

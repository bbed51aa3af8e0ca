//! Account aggregate.
//!
//! An account is the identity of one employee in the back office. Business
//! methods validate, mutate state and raise a domain event; they never touch
//! storage or the outbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use peoplehub_core::{AggregateId, AggregateRoot, DomainError, DomainResult};
use peoplehub_events::{DomainEvent, EventBuffer, HasDomainEvents};

use crate::roles::Role;

/// Strongly-typed account identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

peoplehub_core::impl_uuid_newtype!(AccountId, "AccountId");

impl From<AccountId> for AggregateId {
    fn from(id: AccountId) -> Self {
        AggregateId::from_uuid(id.0)
    }
}

impl From<AggregateId> for AccountId {
    fn from(id: AggregateId) -> Self {
        AccountId(*id.as_uuid())
    }
}

/// Lifecycle status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Suspended,
}

impl core::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Suspended => write!(f, "suspended"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Employee account.
///
/// ## Invariants
///
/// - The email is non-empty, contains `@` and is stored lowercased.
/// - A role is held at most once.
/// - A suspended account cannot be granted roles.
/// - Roles can only be granted by an actor who holds that role or `admin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    email: String,
    display_name: String,
    roles: Vec<Role>,
    status: AccountStatus,
    #[serde(skip)]
    events: EventBuffer,
}

impl Account {
    /// Register a new account; raises [`AccountRegistered`].
    pub fn register(
        id: AccountId,
        email: &str,
        display_name: &str,
        initial_roles: Vec<Role>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        let mut roles: Vec<Role> = Vec::with_capacity(initial_roles.len());
        for role in initial_roles {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        let mut account = Self {
            id,
            email: email.to_lowercase(),
            display_name: display_name.to_string(),
            roles,
            status: AccountStatus::Active,
            events: EventBuffer::new(),
        };
        account.add_event(AccountRegistered {
            account_id: id,
            email: account.email.clone(),
            display_name: account.display_name.clone(),
            roles: account.roles.clone(),
            occurred_at,
        });
        Ok(account)
    }

    pub fn account_id(&self) -> AccountId {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Grant `role`; `actor_roles` are the roles of whoever performs the grant.
    pub fn assign_role(
        &mut self,
        role: Role,
        actor_roles: &[Role],
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_not_suspended()?;

        if self.has_role(&role) {
            return Err(DomainError::invariant("role already assigned"));
        }

        // No privilege escalation: the actor must hold the role, unless admin.
        let allowed = actor_roles.iter().any(|r| r.is_admin() || *r == role);
        if !allowed {
            return Err(DomainError::unauthorized());
        }

        self.roles.push(role.clone());
        self.add_event(RoleAssigned {
            account_id: self.id,
            role,
            occurred_at,
        });
        Ok(())
    }

    pub fn revoke_role(&mut self, role: Role, occurred_at: DateTime<Utc>) -> DomainResult<()> {
        if !self.has_role(&role) {
            return Err(DomainError::invariant("role not assigned"));
        }

        self.roles.retain(|r| *r != role);
        self.add_event(RoleRevoked {
            account_id: self.id,
            role,
            occurred_at,
        });
        Ok(())
    }

    pub fn suspend(&mut self, reason: &str, occurred_at: DateTime<Utc>) -> DomainResult<()> {
        if self.status == AccountStatus::Suspended {
            return Err(DomainError::invariant("account already suspended"));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("suspension reason cannot be empty"));
        }

        self.status = AccountStatus::Suspended;
        self.add_event(AccountSuspended {
            account_id: self.id,
            reason: reason.to_string(),
            occurred_at,
        });
        Ok(())
    }

    pub fn reactivate(&mut self, occurred_at: DateTime<Utc>) -> DomainResult<()> {
        if self.status == AccountStatus::Active {
            return Err(DomainError::invariant("account already active"));
        }

        self.status = AccountStatus::Active;
        self.add_event(AccountReactivated {
            account_id: self.id,
            occurred_at,
        });
        Ok(())
    }

    fn ensure_not_suspended(&self) -> DomainResult<()> {
        if self.status == AccountStatus::Suspended {
            return Err(DomainError::invariant("account is suspended"));
        }
        Ok(())
    }
}

impl AggregateRoot for Account {
    const AGGREGATE_TYPE: &'static str = "identity.account";

    fn id(&self) -> AggregateId {
        self.id.into()
    }
}

impl HasDomainEvents for Account {
    fn event_buffer(&self) -> &EventBuffer {
        &self.events
    }

    fn event_buffer_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Raised when an account is registered.
#[derive(Debug, Clone)]
pub struct AccountRegistered {
    pub account_id: AccountId,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RoleAssigned {
    pub account_id: AccountId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RoleRevoked {
    pub account_id: AccountId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AccountSuspended {
    pub account_id: AccountId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AccountReactivated {
    pub account_id: AccountId,
    pub occurred_at: DateTime<Utc>,
}

macro_rules! domain_event {
    ($t:ty, $tag:literal) => {
        impl DomainEvent for $t {
            fn event_type(&self) -> &'static str {
                $tag
            }

            fn occurred_at(&self) -> DateTime<Utc> {
                self.occurred_at
            }
        }
    };
}

domain_event!(AccountRegistered, "identity.account.registered");
domain_event!(RoleAssigned, "identity.account.role_assigned");
domain_event!(RoleRevoked, "identity.account.role_revoked");
domain_event!(AccountSuspended, "identity.account.suspended");
domain_event!(AccountReactivated, "identity.account.reactivated");

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered() -> Account {
        let mut account = Account::register(
            AccountId::new(),
            " Alice@Example.com ",
            "Alice Smith",
            vec![Role::new("employee")],
            now(),
        )
        .unwrap();
        account.clear_events();
        account
    }

    #[test]
    fn register_normalizes_and_raises_event() {
        let account = Account::register(
            AccountId::new(),
            " Alice@Example.com ",
            " Alice Smith ",
            vec![Role::new("employee"), Role::new("employee")],
            now(),
        )
        .unwrap();

        assert_eq!(account.email(), "alice@example.com");
        assert_eq!(account.display_name(), "Alice Smith");
        assert_eq!(account.roles().len(), 1);
        assert_eq!(account.status(), AccountStatus::Active);

        let events = account.events();
        assert_eq!(events.len(), 1);
        let e = events[0].event().downcast_ref::<AccountRegistered>().unwrap();
        assert_eq!(e.account_id, account.account_id());
        assert_eq!(e.email, "alice@example.com");
    }

    #[test]
    fn register_rejects_invalid_email() {
        let result = Account::register(AccountId::new(), "invalid-email", "Alice", vec![], now());
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn register_rejects_blank_display_name() {
        let result = Account::register(AccountId::new(), "a@b.c", "   ", vec![], now());
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn admin_can_assign_any_role() {
        let mut account = registered();
        account
            .assign_role(Role::new("payroll"), &[Role::admin()], now())
            .unwrap();

        assert!(account.has_role(&Role::new("payroll")));
        assert_eq!(account.events()[0].event_type(), "identity.account.role_assigned");
    }

    #[test]
    fn actor_holding_role_can_assign_it() {
        let mut account = registered();
        account
            .assign_role(Role::new("manager"), &[Role::new("manager")], now())
            .unwrap();
        assert!(account.has_role(&Role::new("manager")));
    }

    #[test]
    fn privilege_escalation_is_rejected() {
        let mut account = registered();
        let err = account
            .assign_role(Role::admin(), &[Role::new("manager")], now())
            .unwrap_err();

        assert_eq!(err, DomainError::Unauthorized);
        assert!(account.events().is_empty());
    }

    #[test]
    fn duplicate_role_is_rejected() {
        let mut account = registered();
        let err = account
            .assign_role(Role::new("employee"), &[Role::admin()], now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn suspended_account_cannot_gain_roles() {
        let mut account = registered();
        account.suspend("left the company", now()).unwrap();

        let err = account
            .assign_role(Role::new("payroll"), &[Role::admin()], now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn revoke_requires_assigned_role() {
        let mut account = registered();
        assert!(account.revoke_role(Role::new("payroll"), now()).is_err());

        account.revoke_role(Role::new("employee"), now()).unwrap();
        assert!(account.roles().is_empty());
    }

    #[test]
    fn suspend_and_reactivate_cycle() {
        let mut account = registered();

        assert!(account.reactivate(now()).is_err());
        account.suspend("investigation", now()).unwrap();
        assert!(account.suspend("again", now()).is_err());
        account.reactivate(now()).unwrap();

        let types: Vec<_> = account.events().iter().map(|p| p.event_type()).collect();
        assert_eq!(
            types,
            vec!["identity.account.suspended", "identity.account.reactivated"]
        );
        assert_eq!(account.status(), AccountStatus::Active);
    }

    #[test]
    fn state_round_trips_without_buffered_events() {
        let account = Account::register(AccountId::new(), "a@b.c", "A", vec![], now()).unwrap();
        let json = serde_json::to_value(&account).unwrap();
        let restored: Account = serde_json::from_value(json).unwrap();

        assert_eq!(restored.account_id(), account.account_id());
        assert!(restored.events().is_empty());
    }

    #[test]
    fn account_id_converts_to_aggregate_id() {
        let id = AccountId::new();
        let aggregate: AggregateId = id.into();
        assert_eq!(AccountId::from(aggregate), id);
    }
}

//! Wiring of the identity module into the commit and relay pipeline.

use tracing::debug;

use peoplehub_core::{DomainResult, ModuleName};
use peoplehub_events::{EventDispatcher, EventRegistry};
use peoplehub_infra::UnitOfWork;

use crate::account::{
    AccountReactivated, AccountRegistered, AccountSuspended, RoleAssigned, RoleRevoked,
};
use crate::integration::{
    AccountReactivatedV1, AccountRegisteredV1, AccountSuspendedV1, OnboardingStartedV1,
    RoleAssignedV1, RoleRevokedV1,
};
use crate::onboarding::{OnboardingChecklist, OnboardingStarted};

pub const MODULE_NAME: &str = "identity";

pub fn module_name() -> DomainResult<ModuleName> {
    ModuleName::new(MODULE_NAME)
}

/// Register the module's local handlers.
///
/// Every domain event is mapped to its integration event on the outbox.
/// Registration additionally starts an onboarding checklist, whose own event
/// is dispatched later in the same commit.
pub fn register_handlers(dispatcher: &mut EventDispatcher<UnitOfWork>) {
    dispatcher
        .on::<AccountRegistered, _>(|e, uow| {
            uow.enqueue(&AccountRegisteredV1 {
                account_id: e.account_id,
                email: e.email.clone(),
                display_name: e.display_name.clone(),
                roles: e.roles.clone(),
                occurred_at: e.occurred_at,
            })?;
            uow.track(OnboardingChecklist::start(e.account_id, e.occurred_at))?;
            debug!(account_id = %e.account_id, "onboarding started");
            Ok(())
        })
        .on::<RoleAssigned, _>(|e, uow| {
            uow.enqueue(&RoleAssignedV1 {
                account_id: e.account_id,
                role: e.role.clone(),
                occurred_at: e.occurred_at,
            })?;
            Ok(())
        })
        .on::<RoleRevoked, _>(|e, uow| {
            uow.enqueue(&RoleRevokedV1 {
                account_id: e.account_id,
                role: e.role.clone(),
                occurred_at: e.occurred_at,
            })?;
            Ok(())
        })
        .on::<AccountSuspended, _>(|e, uow| {
            uow.enqueue(&AccountSuspendedV1 {
                account_id: e.account_id,
                reason: e.reason.clone(),
                occurred_at: e.occurred_at,
            })?;
            Ok(())
        })
        .on::<AccountReactivated, _>(|e, uow| {
            uow.enqueue(&AccountReactivatedV1 {
                account_id: e.account_id,
                occurred_at: e.occurred_at,
            })?;
            Ok(())
        })
        .on::<OnboardingStarted, _>(|e, uow| {
            uow.enqueue(&OnboardingStartedV1 {
                checklist_id: e.checklist_id,
                account_id: e.account_id,
                tasks: e.tasks.clone(),
                occurred_at: e.occurred_at,
            })?;
            Ok(())
        });
}

/// Register decoders for every integration event this module publishes.
pub fn register_integration_events(registry: &mut EventRegistry) {
    registry
        .register::<AccountRegisteredV1>()
        .register::<RoleAssignedV1>()
        .register::<RoleRevokedV1>()
        .register::<AccountSuspendedV1>()
        .register::<AccountReactivatedV1>()
        .register::<OnboardingStartedV1>();
}

//! Account application service.
//!
//! Each operation opens a unit of work, runs one business method and commits.
//! Integration events reach the outbox through the handlers registered in
//! [`register_handlers`](crate::module::register_handlers).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument};

use peoplehub_core::{DomainError, ModuleName};
use peoplehub_infra::{CommitError, CommitOrchestrator, DurableStore, UnitOfWork};

use crate::account::{Account, AccountId};
use crate::roles::Role;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("account {0} not found")]
    NotFound(AccountId),

    #[error(transparent)]
    Commit(#[from] CommitError),
}

pub struct AccountService<S> {
    module: ModuleName,
    orchestrator: Arc<CommitOrchestrator<S>>,
}

impl<S> AccountService<S>
where
    S: DurableStore,
{
    pub fn new(module: ModuleName, orchestrator: Arc<CommitOrchestrator<S>>) -> Self {
        Self {
            module,
            orchestrator,
        }
    }

    #[instrument(skip(self, display_name, roles), err)]
    pub async fn register(
        &self,
        email: &str,
        display_name: &str,
        roles: Vec<Role>,
        occurred_at: DateTime<Utc>,
    ) -> Result<AccountId, ServiceError> {
        let id = AccountId::new();
        let account = Account::register(id, email, display_name, roles, occurred_at)?;

        let mut uow = self.unit_of_work();
        uow.track(account)?;
        self.orchestrator.commit(&mut uow).await?;

        info!(account_id = %id, "account registered");
        Ok(id)
    }

    #[instrument(skip(self, actor_roles), err)]
    pub async fn assign_role(
        &self,
        id: AccountId,
        role: Role,
        actor_roles: &[Role],
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.modify(id, |account| account.assign_role(role, actor_roles, occurred_at))
            .await
    }

    #[instrument(skip(self), err)]
    pub async fn revoke_role(
        &self,
        id: AccountId,
        role: Role,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.modify(id, |account| account.revoke_role(role, occurred_at))
            .await
    }

    #[instrument(skip(self), err)]
    pub async fn suspend(
        &self,
        id: AccountId,
        reason: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.modify(id, |account| account.suspend(reason, occurred_at))
            .await
    }

    #[instrument(skip(self), err)]
    pub async fn reactivate(
        &self,
        id: AccountId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.modify(id, |account| account.reactivate(occurred_at))
            .await
    }

    fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(self.module.clone())
    }

    async fn modify<F>(&self, id: AccountId, change: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut Account) -> Result<(), DomainError>,
    {
        let mut uow = self.unit_of_work();
        let account = self
            .orchestrator
            .load::<Account>(&mut uow, id.into())
            .await?
            .ok_or(ServiceError::NotFound(id))?;
        change(account)?;
        self.orchestrator.commit(&mut uow).await?;
        Ok(())
    }
}

impl<S> core::fmt::Debug for AccountService<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccountService")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use peoplehub_events::EventDispatcher;
    use peoplehub_infra::{InMemoryStore, OutboxStore};

    use super::*;
    use crate::module::{module_name, register_handlers};

    fn service() -> (Arc<InMemoryStore>, AccountService<Arc<InMemoryStore>>) {
        let store = Arc::new(InMemoryStore::new());
        let mut dispatcher = EventDispatcher::new();
        register_handlers(&mut dispatcher);
        let orchestrator = CommitOrchestrator::new(Arc::clone(&store), Arc::new(dispatcher));
        (store, AccountService::new(module_name().unwrap(), Arc::new(orchestrator)))
    }

    #[tokio::test]
    async fn register_writes_account_checklist_and_two_messages() {
        let (store, service) = service();
        service
            .register("bob@example.com", "Bob", vec![Role::new("employee")], Utc::now())
            .await
            .unwrap();

        assert_eq!(store.state_count(), 2);
        let types: Vec<_> = store
            .messages(&module_name().unwrap())
            .into_iter()
            .map(|m| m.message_type)
            .collect();
        assert_eq!(
            types,
            vec!["identity.account.registered", "identity.onboarding.started"]
        );
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let (_, service) = service();
        let id = AccountId::new();
        let err = service.reactivate(id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn rejected_change_writes_nothing() {
        let (store, service) = service();
        let id = service
            .register("c@example.com", "Carol", vec![], Utc::now())
            .await
            .unwrap();

        let err = service
            .assign_role(id, Role::admin(), &[Role::new("employee")], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Unauthorized)));

        let stats = store.stats(&module_name().unwrap(), 5).await.unwrap();
        assert_eq!(stats.pending, 2);
    }

    #[tokio::test]
    async fn lifecycle_operations_enqueue_in_order() {
        let (store, service) = service();
        let id = service
            .register("d@example.com", "Dan", vec![Role::new("employee")], Utc::now())
            .await
            .unwrap();

        service
            .assign_role(id, Role::new("payroll"), &[Role::admin()], Utc::now())
            .await
            .unwrap();
        service
            .revoke_role(id, Role::new("employee"), Utc::now())
            .await
            .unwrap();
        service.suspend(id, "leave", Utc::now()).await.unwrap();
        service.reactivate(id, Utc::now()).await.unwrap();

        let types: Vec<_> = store
            .messages(&module_name().unwrap())
            .into_iter()
            .map(|m| m.message_type)
            .collect();
        assert_eq!(types.len(), 6);
        assert_eq!(types[5], "identity.account.reactivated");
    }
}

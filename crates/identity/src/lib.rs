//! `peoplehub-identity`: employee accounts, role assignment and onboarding.
//!
//! The module raises domain events from its aggregates, turns them into
//! integration events through local handlers, and relies on the infra outbox to
//! publish them.

pub mod account;
pub mod integration;
pub mod module;
pub mod onboarding;
pub mod roles;
pub mod service;

pub use account::{Account, AccountId, AccountStatus};
pub use module::{MODULE_NAME, module_name, register_handlers, register_integration_events};
pub use onboarding::OnboardingChecklist;
pub use roles::Role;
pub use service::{AccountService, ServiceError};

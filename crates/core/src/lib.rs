//! `peoplehub-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, module names, the aggregate root contract and the domain error
//! model shared by every module.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod module;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, MessageId};
pub use module::ModuleName;

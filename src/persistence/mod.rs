//! Data access collaborator.
//!
//! The hub only needs a simple CRUD surface over alarms and notifications.
//! `Repository` and `UnitOfWork` describe it; `memory` is the built-in
//! implementation and `schema` registers each entity's storage layout.

pub mod memory;
pub mod schema;

use thiserror::Error;

use crate::domain::{Alarm, Notification};

pub use memory::{InMemoryRepository, InMemoryUnitOfWork};
pub use schema::{Entity, EntitySchema, ENTITY_SCHEMAS};

/// Primary key of a stored row.
pub type EntityId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("{entity} with id {id} was not found")]
    NotFound { entity: &'static str, id: EntityId },
}

/// CRUD access to one entity type.
pub trait Repository<E: Entity>: Send + Sync {
    fn insert(&self, entity: E) -> EntityId;
    fn get(&self, id: EntityId) -> Result<E, PersistenceError>;
    fn get_all(&self) -> Vec<(EntityId, E)>;
    fn update(&self, id: EntityId, entity: E) -> Result<(), PersistenceError>;
    fn delete(&self, id: EntityId) -> Result<(), PersistenceError>;
    fn count(&self) -> usize;
}

/// Outcome of committing pending changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveChangesResult {
    pub affected: usize,
}

/// Groups repositories that commit together.
pub trait UnitOfWork: Send + Sync {
    fn alarms(&self) -> &dyn Repository<Alarm>;
    fn notifications(&self) -> &dyn Repository<Notification>;
    fn save_changes(&self) -> SaveChangesResult;
}

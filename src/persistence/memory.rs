//! In-memory repository and unit of work.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::{Alarm, Notification};
use crate::persistence::schema::Entity;
use crate::persistence::{EntityId, PersistenceError, Repository, SaveChangesResult, UnitOfWork};

/// A DashMap-backed repository for one entity type.
#[derive(Debug)]
pub struct InMemoryRepository<E: Entity> {
    rows: DashMap<EntityId, E>,
    next_id: AtomicU64,
    pending: Arc<AtomicUsize>,
}

impl<E: Entity> InMemoryRepository<E> {
    fn new(pending: Arc<AtomicUsize>) -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicU64::new(1),
            pending,
        }
    }

    fn not_found(id: EntityId) -> PersistenceError {
        PersistenceError::NotFound {
            entity: E::schema().entity,
            id,
        }
    }
}

impl<E: Entity> Repository<E> for InMemoryRepository<E> {
    fn insert(&self, entity: E) -> EntityId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rows.insert(id, entity);
        self.pending.fetch_add(1, Ordering::Relaxed);
        id
    }

    fn get(&self, id: EntityId) -> Result<E, PersistenceError> {
        self.rows
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Self::not_found(id))
    }

    fn get_all(&self) -> Vec<(EntityId, E)> {
        let mut all: Vec<_> = self
            .rows
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    fn update(&self, id: EntityId, entity: E) -> Result<(), PersistenceError> {
        let mut row = self.rows.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        *row = entity;
        self.pending.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, id: EntityId) -> Result<(), PersistenceError> {
        self.rows.remove(&id).ok_or_else(|| Self::not_found(id))?;
        self.pending.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn count(&self) -> usize {
        self.rows.len()
    }
}

/// Unit of work over in-memory repositories.
#[derive(Debug)]
pub struct InMemoryUnitOfWork {
    alarms: InMemoryRepository<Alarm>,
    notifications: InMemoryRepository<Notification>,
    pending: Arc<AtomicUsize>,
}

impl InMemoryUnitOfWork {
    pub fn new() -> Self {
        let pending = Arc::new(AtomicUsize::new(0));
        Self {
            alarms: InMemoryRepository::new(pending.clone()),
            notifications: InMemoryRepository::new(pending.clone()),
            pending,
        }
    }
}

impl Default for InMemoryUnitOfWork {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitOfWork for InMemoryUnitOfWork {
    fn alarms(&self) -> &dyn Repository<Alarm> {
        &self.alarms
    }

    fn notifications(&self) -> &dyn Repository<Notification> {
        &self.notifications
    }

    fn save_changes(&self) -> SaveChangesResult {
        SaveChangesResult {
            affected: self.pending.swap(0, Ordering::AcqRel),
        }
    }
}

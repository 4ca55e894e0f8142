//! In-process adapters for the repository, entity store, and authorization seams.
//!
//! Used by the API service until a durable backend is wired in, and by tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use super::domain::{
    ActorId, ChangeItemId, ChangeRequest, ChangeRequestId, EntityFields, EntityId, EntityType,
    FieldPath, FieldValue,
};
use super::repository::{ChangeRequestRepository, RepositoryError};
use super::store::{AuthorizationProvider, EntityStore, EntityStoreError, Permission, WriteOutcome};

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("repository lock poisoned".to_string())
}

/// A slot is emptied when its request is withdrawn so late writers see it gone.
type RequestSlot = Arc<Mutex<Option<ChangeRequest>>>;

#[derive(Default)]
struct Tables {
    requests: HashMap<ChangeRequestId, RequestSlot>,
    item_index: HashMap<ChangeItemId, ChangeRequestId>,
}

/// Request store with one lock per request, so decisions on different
/// requests never contend.
#[derive(Default, Clone)]
pub struct InMemoryChangeRequestRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryChangeRequestRepository {
    fn slot(&self, id: &ChangeRequestId) -> Result<Option<RequestSlot>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.requests.get(id).cloned())
    }

    /// Drop the request while leaving its items indexed.
    #[cfg(test)]
    pub(crate) fn orphan_items_of(&self, id: &ChangeRequestId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables.requests.remove(id);
        Ok(())
    }

    /// Point an item at a request that does not hold it.
    #[cfg(test)]
    pub(crate) fn misindex_item(
        &self,
        item_id: &ChangeItemId,
        request_id: &ChangeRequestId,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables
            .item_index
            .insert(item_id.clone(), request_id.clone());
        Ok(())
    }
}

impl ChangeRequestRepository for InMemoryChangeRequestRepository {
    fn insert(&self, request: ChangeRequest) -> Result<ChangeRequest, RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if tables.requests.contains_key(&request.id)
            || request
                .items()
                .iter()
                .any(|item| tables.item_index.contains_key(&item.id))
        {
            return Err(RepositoryError::Conflict);
        }

        for item in request.items() {
            tables
                .item_index
                .insert(item.id.clone(), request.id.clone());
        }
        tables.requests.insert(
            request.id.clone(),
            Arc::new(Mutex::new(Some(request.clone()))),
        );
        Ok(request)
    }

    fn fetch(&self, id: &ChangeRequestId) -> Result<Option<ChangeRequest>, RepositoryError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(None);
        };
        let guard = slot.lock().map_err(|_| poisoned())?;
        Ok(guard.clone())
    }

    fn locate_item(
        &self,
        item_id: &ChangeItemId,
    ) -> Result<Option<ChangeRequestId>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.item_index.get(item_id).cloned())
    }

    fn modify<T, E, F>(&self, id: &ChangeRequestId, mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut ChangeRequest) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let slot = self.slot(id)?.ok_or(RepositoryError::NotFound)?;
        let mut guard = slot.lock().map_err(|_| poisoned())?;
        let stored = guard.as_mut().ok_or(RepositoryError::NotFound)?;

        let mut working = stored.clone();
        let value = mutation(&mut working)?;
        *stored = working;
        Ok(value)
    }

    fn remove<E, F>(&self, id: &ChangeRequestId, guard: F) -> Result<ChangeRequest, E>
    where
        F: FnOnce(&ChangeRequest) -> Result<(), E>,
        E: From<RepositoryError>,
    {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let slot = tables
            .requests
            .get(id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        let mut stored = slot.lock().map_err(|_| poisoned())?;
        let current = stored.as_ref().ok_or(RepositoryError::NotFound)?;
        guard(current)?;

        let removed = stored.take().ok_or(RepositoryError::NotFound)?;
        for item in removed.items() {
            tables.item_index.remove(&item.id);
        }
        tables.requests.remove(id);
        Ok(removed)
    }

    fn scan(&self) -> Result<Vec<ChangeRequest>, RepositoryError> {
        let slots: Vec<RequestSlot> = {
            let tables = self.tables.read().map_err(|_| poisoned())?;
            tables.requests.values().cloned().collect()
        };

        let mut requests = Vec::with_capacity(slots.len());
        for slot in slots {
            let guard = slot.lock().map_err(|_| poisoned())?;
            if let Some(request) = guard.as_ref() {
                requests.push(request.clone());
            }
        }
        Ok(requests)
    }
}

#[derive(Debug, Default, Clone)]
struct EntityRecord {
    fields: EntityFields,
    applied_items: HashSet<ChangeItemId>,
}

#[derive(Default)]
struct EntityTables {
    entities: HashMap<(EntityType, EntityId), EntityRecord>,
    applied_writes: usize,
}

/// Entity store keeping the set of item ids already applied to each entity.
#[derive(Default, Clone)]
pub struct InMemoryEntityStore {
    inner: Arc<Mutex<EntityTables>>,
}

fn entity_lock_poisoned() -> EntityStoreError {
    EntityStoreError::Unavailable("entity lock poisoned".to_string())
}

impl InMemoryEntityStore {
    pub fn with_entity(
        self,
        entity_type: EntityType,
        entity_id: &str,
        fields: EntityFields,
    ) -> Result<Self, EntityStoreError> {
        self.put_entity(entity_type, EntityId(entity_id.to_string()), fields)?;
        Ok(self)
    }

    /// Seed or replace an entity outside the approval flow.
    pub fn put_entity(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        fields: EntityFields,
    ) -> Result<(), EntityStoreError> {
        let mut inner = self.inner.lock().map_err(|_| entity_lock_poisoned())?;
        inner.entities.insert(
            (entity_type, entity_id),
            EntityRecord {
                fields,
                applied_items: HashSet::new(),
            },
        );
        Ok(())
    }

    /// Number of writes that actually changed an entity.
    pub fn applied_writes(&self) -> Result<usize, EntityStoreError> {
        let inner = self.inner.lock().map_err(|_| entity_lock_poisoned())?;
        Ok(inner.applied_writes)
    }
}

impl EntityStore for InMemoryEntityStore {
    fn read(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<EntityFields>, EntityStoreError> {
        let inner = self.inner.lock().map_err(|_| entity_lock_poisoned())?;
        Ok(inner
            .entities
            .get(&(entity_type, entity_id.clone()))
            .map(|record| record.fields.clone()))
    }

    fn write_field(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
        field_path: &FieldPath,
        value: &FieldValue,
        item_id: &ChangeItemId,
    ) -> Result<WriteOutcome, EntityStoreError> {
        let mut inner = self.inner.lock().map_err(|_| entity_lock_poisoned())?;
        let record = inner
            .entities
            .get_mut(&(entity_type, entity_id.clone()))
            .ok_or_else(|| EntityStoreError::MissingEntity {
                entity_type,
                entity_id: entity_id.clone(),
            })?;

        if !record.applied_items.insert(item_id.clone()) {
            return Ok(WriteOutcome::AlreadyApplied);
        }

        if value.is_null() {
            record.fields.remove(field_path);
        } else {
            record.fields.insert(field_path.clone(), value.clone());
        }
        inner.applied_writes += 1;
        Ok(WriteOutcome::Applied)
    }
}

/// Fixed actor → permission grants.
#[derive(Debug, Default, Clone)]
pub struct StaticAuthorization {
    grants: HashMap<ActorId, BTreeSet<Permission>>,
}

impl StaticAuthorization {
    pub fn grant(mut self, actor: &str, permissions: &[Permission]) -> Self {
        self.grants
            .entry(ActorId(actor.to_string()))
            .or_default()
            .extend(permissions.iter().copied());
        self
    }
}

impl AuthorizationProvider for StaticAuthorization {
    fn has_permission(&self, actor: &ActorId, permission: Permission) -> bool {
        self.grants
            .get(actor)
            .map(|permissions| permissions.contains(&permission))
            .unwrap_or(false)
    }
}

//! Shared instances for owner-bound handlers.
//!
//! A command may be bound to an owner type. The first time any command of
//! that type is registered or invoked, the type's factory runs once and the
//! resulting instance is shared by every command of the type, for the
//! lifetime of the engine.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::debug;

use crate::error::{InstanceError, InstanceResult};
use crate::handler::Instance;

/// A type whose methods serve as command handlers.
pub trait CommandGroup: Send + Sync + Sized + 'static {
    /// Builds the shared instance.
    fn create() -> anyhow::Result<Self>;
}

/// Type-erased description of an owner type.
#[derive(Clone, Copy)]
pub struct OwnerType {
    id: TypeId,
    name: &'static str,
    factory: fn() -> anyhow::Result<Instance>,
}

impl OwnerType {
    /// Describes a [`CommandGroup`] type.
    pub fn of<T: CommandGroup>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            factory: || T::create().map(|v| Arc::new(v) as Instance),
        }
    }

    /// Describes a type constructed through [`Default`].
    pub fn of_default<T: Default + Send + Sync + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            factory: || Ok(Arc::new(T::default()) as Instance),
        }
    }

    /// Returns the owner's `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the owner's type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn construct(&self) -> InstanceResult<Instance> {
        match catch_unwind(AssertUnwindSafe(self.factory)) {
            Ok(Ok(instance)) => Ok(instance),
            Ok(Err(e)) => Err(InstanceError::Construction {
                owner: self.name,
                reason: format!("{e:#}"),
            }),
            Err(_) => Err(InstanceError::Panicked { owner: self.name }),
        }
    }
}

impl PartialEq for OwnerType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OwnerType {}

impl fmt::Debug for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnerType").field(&self.name).finish()
    }
}

/// At most one instance per owner type.
#[derive(Default)]
pub struct HandlerInstanceCache {
    instances: RwLock<HashMap<TypeId, Instance>>,
}

impl HandlerInstanceCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instance for `owner`, constructing it on first use.
    ///
    /// Concurrent first uses construct exactly once. A failed construction
    /// caches nothing, so the next call retries.
    pub fn get_or_create(&self, owner: &OwnerType) -> InstanceResult<Instance> {
        if let Some(instance) = self.instances.read().get(&owner.id) {
            return Ok(Arc::clone(instance));
        }

        // Only one upgradable reader at a time: this serializes constructors.
        let guard = self.instances.upgradable_read();
        if let Some(instance) = guard.get(&owner.id) {
            return Ok(Arc::clone(instance));
        }

        let instance = owner.construct()?;
        debug!(owner = owner.name, "Created handler instance");

        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        guard.insert(owner.id, Arc::clone(&instance));
        Ok(instance)
    }

    /// Returns the cached instance of `T`, if any.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.instances
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|i| i.downcast::<T>().ok())
    }

    /// Returns `true` if an instance of `owner` is cached.
    pub fn contains(&self, owner: &OwnerType) -> bool {
        self.instances.read().contains_key(&owner.id)
    }

    /// Returns the number of cached instances.
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

impl fmt::Debug for HandlerInstanceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInstanceCache")
            .field("instances", &self.len())
            .finish()
    }
}

//! In-memory application store for testing.
//!
//! Single-process, no durability. Per-application serialization uses one
//! `tokio::sync::Mutex` per application id; the owned guard travels inside
//! the [`LockedApplication`] permit and releases on drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use capstan_core::ApplicationId;

use super::{ApplicationStore, LockedApplication, StorePermit};
use crate::application::Application;
use crate::error::{Error, Result};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// Permit backed by an owned tokio mutex guard.
struct MemoryPermit {
    _guard: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for MemoryPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MemoryPermit")
    }
}

impl StorePermit for MemoryPermit {}

/// In-memory application store.
#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    applications: RwLock<HashMap<ApplicationId, Application>>,
    locks: Mutex<HashMap<ApplicationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl InMemoryApplicationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of applications currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn application_count(&self) -> Result<usize> {
        Ok(self.applications.read().map_err(poison_err)?.len())
    }

    fn lock_handle(&self, id: &ApplicationId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(poison_err)?;
        Ok(locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    async fn lock(&self, id: &ApplicationId) -> Result<Option<LockedApplication>> {
        let handle = self.lock_handle(id)?;
        let guard = handle.lock_owned().await;
        // Read under the lock so the snapshot is current.
        let application = {
            let applications = self.applications.read().map_err(poison_err)?;
            applications.get(id).cloned()
        };
        Ok(application.map(|application| {
            LockedApplication::new(application, Box::new(MemoryPermit { _guard: guard }))
        }))
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn get(&self, id: &ApplicationId) -> Result<Option<Application>> {
        Ok(self
            .applications
            .read()
            .map_err(poison_err)?
            .get(id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Application>> {
        Ok(self
            .applications
            .read()
            .map_err(poison_err)?
            .values()
            .cloned()
            .collect())
    }

    async fn create(&self, application: Application) -> Result<()> {
        let mut applications = self.applications.write().map_err(poison_err)?;
        applications.insert(application.id().clone(), application);
        Ok(())
    }

    async fn lock_or_throw(&self, id: &ApplicationId) -> Result<LockedApplication> {
        self.lock(id).await?.ok_or_else(|| Error::UnknownApplication {
            application: id.clone(),
        })
    }

    async fn lock_if_present(&self, id: &ApplicationId) -> Result<Option<LockedApplication>> {
        self.lock(id).await
    }

    async fn store(&self, locked: LockedApplication) -> Result<()> {
        let (application, permit) = locked.into_parts();
        {
            let mut applications = self.applications.write().map_err(poison_err)?;
            applications.insert(application.id().clone(), application);
        }
        drop(permit);
        Ok(())
    }
}

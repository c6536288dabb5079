//! The application repository seam.
//!
//! All persistent state the trigger touches is owned by the application
//! store. Mutation follows one protocol: acquire the per-application lock
//! ([`ApplicationStore::lock_or_throw`]), rebuild the aggregate through its
//! `with_*` methods, and persist it with [`ApplicationStore::store`] while
//! the lock is held. Dropping a [`LockedApplication`] without storing
//! discards the mutation and releases the lock, so failed operations leave
//! no partial state behind.

pub mod memory;

use async_trait::async_trait;

use capstan_core::ApplicationId;

use crate::application::Application;
use crate::error::{Error, Result};

/// An implementation-defined token proving the application lock is held.
///
/// Dropping the permit releases the lock.
pub trait StorePermit: Send + Sync + std::fmt::Debug {}

/// An application read under its lock, ready for mutation.
#[derive(Debug)]
pub struct LockedApplication {
    application: Application,
    permit: Box<dyn StorePermit>,
}

impl LockedApplication {
    /// Wraps an application with its lock permit. For store implementations.
    #[must_use]
    pub fn new(application: Application, permit: Box<dyn StorePermit>) -> Self {
        Self {
            application,
            permit,
        }
    }

    /// Returns the locked application's identity.
    #[must_use]
    pub fn id(&self) -> &ApplicationId {
        self.application.id()
    }

    /// Returns the application as read under the lock.
    #[must_use]
    pub const fn application(&self) -> &Application {
        &self.application
    }

    /// Applies a mutation to the locked application.
    #[must_use]
    pub fn update(mut self, f: impl FnOnce(Application) -> Application) -> Self {
        self.application = f(self.application);
        self
    }

    /// Splits into the aggregate and the permit. For store implementations.
    #[must_use]
    pub fn into_parts(self) -> (Application, Box<dyn StorePermit>) {
        (self.application, self.permit)
    }
}

/// The application repository.
///
/// Implementations persist applications and serialize all mutation of one
/// application through a per-application lock with guaranteed release.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Returns the application with the given id, if it exists.
    async fn get(&self, id: &ApplicationId) -> Result<Option<Application>>;

    /// Returns the application with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownApplication`] if it does not exist.
    async fn require(&self, id: &ApplicationId) -> Result<Application> {
        self.get(id).await?.ok_or_else(|| Error::UnknownApplication {
            application: id.clone(),
        })
    }

    /// Returns every application, in unspecified order.
    async fn list(&self) -> Result<Vec<Application>>;

    /// Adds a new application.
    ///
    /// Applications are created by the platform's provisioning flow; the
    /// trigger itself never creates them.
    async fn create(&self, application: Application) -> Result<()>;

    /// Acquires the application's lock and reads it for mutation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownApplication`] if it does not exist.
    async fn lock_or_throw(&self, id: &ApplicationId) -> Result<LockedApplication>;

    /// Acquires the application's lock if the application exists.
    async fn lock_if_present(&self, id: &ApplicationId) -> Result<Option<LockedApplication>>;

    /// Persists a locked application and releases its lock.
    async fn store(&self, locked: LockedApplication) -> Result<()>;
}

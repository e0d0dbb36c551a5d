//! Look-aside cache from user id to role set.
//!
//! Entries are filled on miss through an injected [`RoleLoader`] and leave
//! the cache on explicit invalidation or, when configured, after a TTL.
//! Concurrent misses for one user share a single load. A load that overlaps
//! an invalidation still answers its caller but is not stored.

use crate::error::{IdentityError, Result};
use crate::models::{RoleSet, UserId};
use crate::repository::{bounded, CredentialStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Source of truth consulted on a cache miss.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleLoader: Send + Sync {
    async fn load_roles(&self, user_id: UserId) -> Result<RoleSet>;
}

/// Loads roles of active users from the credential store.
pub struct StoreRoleLoader {
    store: Arc<dyn CredentialStore>,
    store_timeout: Duration,
}

impl StoreRoleLoader {
    pub fn new(store: Arc<dyn CredentialStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }
}

#[async_trait]
impl RoleLoader for StoreRoleLoader {
    async fn load_roles(&self, user_id: UserId) -> Result<RoleSet> {
        let mut tx = bounded(self.store_timeout, "begin", self.store.begin()).await?;
        let user = bounded(self.store_timeout, "find_user_by_id", tx.find_user_by_id(user_id)).await;
        let released = bounded(self.store_timeout, "rollback", tx.rollback()).await;

        let user = user?.ok_or(IdentityError::UserNotFound)?;
        released?;
        Ok(user.roles)
    }
}

#[derive(Debug, Clone)]
struct CachedRoles {
    roles: RoleSet,
    loaded_at: Instant,
}

/// A caller's share of the single in-flight load for one user.
///
/// Dropping it, including when the caller's future is cancelled, removes the
/// gate once no other caller holds it.
struct Flight<'a> {
    inflight: &'a DashMap<UserId, Arc<Mutex<()>>>,
    user_id: UserId,
    gate: Arc<Mutex<()>>,
}

impl<'a> Flight<'a> {
    fn join(inflight: &'a DashMap<UserId, Arc<Mutex<()>>>, user_id: UserId) -> Self {
        let gate = Arc::clone(
            inflight
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        Self {
            inflight,
            user_id,
            gate,
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        // The map and this flight hold the only references.
        self.inflight.remove_if(&self.user_id, |_, g| {
            Arc::ptr_eq(g, &self.gate) && Arc::strong_count(g) <= 2
        });
    }
}

pub struct RoleCache {
    loader: Arc<dyn RoleLoader>,
    ttl: Option<Duration>,
    entries: DashMap<UserId, CachedRoles>,
    inflight: DashMap<UserId, Arc<Mutex<()>>>,
    /// Bumped on every invalidation; loads that straddle a bump are not stored.
    generation: AtomicU64,
}

impl RoleCache {
    /// `ttl = None` keeps entries until invalidated.
    pub fn new(loader: Arc<dyn RoleLoader>, ttl: Option<Duration>) -> Self {
        Self {
            loader,
            ttl,
            entries: DashMap::new(),
            inflight: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn get_roles(&self, user_id: UserId) -> Result<RoleSet> {
        if let Some(roles) = self.fresh(user_id) {
            debug!(user_id = %user_id, "Role cache hit");
            return Ok(roles);
        }

        let flight = Flight::join(&self.inflight, user_id);
        let _permit = flight.gate.lock().await;
        self.load_through(user_id).await
    }

    async fn load_through(&self, user_id: UserId) -> Result<RoleSet> {
        // Another flight may have filled the entry while this one waited.
        if let Some(roles) = self.fresh(user_id) {
            debug!(user_id = %user_id, "Role cache filled by concurrent load");
            return Ok(roles);
        }

        debug!(user_id = %user_id, "Role cache miss");
        let generation = self.generation.load(Ordering::Acquire);
        let roles = self.loader.load_roles(user_id).await?;

        if self.generation.load(Ordering::Acquire) == generation {
            self.entries.insert(
                user_id,
                CachedRoles {
                    roles: roles.clone(),
                    loaded_at: Instant::now(),
                },
            );
        } else {
            debug!(user_id = %user_id, "Discarding role load that raced an invalidation");
        }

        Ok(roles)
    }

    fn fresh(&self, user_id: UserId) -> Option<RoleSet> {
        let entry = self.entries.get(&user_id)?;
        match self.ttl {
            Some(ttl) if entry.loaded_at.elapsed() >= ttl => None,
            _ => Some(entry.roles.clone()),
        }
    }

    /// Drop the entry for `user_id`. Must follow every committed role change.
    pub fn invalidate(&self, user_id: UserId) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if self.entries.remove(&user_id).is_some() {
            info!(user_id = %user_id, "Role cache entry invalidated");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use super::{CredentialStore, StoreError, StoreResult, StoreTransaction};
use crate::models::{
    ConfirmationId, ConfirmationToken, RecordState, RoleSet, TokenState, User, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Store operations that can be made to fail on demand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Begin,
    FindUserByEmail,
    FindUserById,
    InsertUser,
    UpdatePassword,
    UpdateRoles,
    SoftDeleteUser,
    InsertConfirmation,
    FindConfirmation,
    ConsumeConfirmation,
    Commit,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::FindUserByEmail => "find_user_by_email",
            Self::FindUserById => "find_user_by_id",
            Self::InsertUser => "insert_user",
            Self::UpdatePassword => "update_password",
            Self::UpdateRoles => "update_roles",
            Self::SoftDeleteUser => "soft_delete_user",
            Self::InsertConfirmation => "insert_confirmation",
            Self::FindConfirmation => "find_confirmation",
            Self::ConsumeConfirmation => "consume_confirmation",
            Self::Commit => "commit",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    users: HashMap<UserId, User>,
    confirmations: HashMap<ConfirmationId, ConfirmationToken>,
}

/// In-memory credential store for testing and development.
///
/// Transactions are serialized: each holds the store lock until it commits,
/// rolls back or is dropped, and writes to a private copy that replaces the
/// shared state only on commit.
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    state: Arc<AsyncMutex<StoreState>>,
    faults: Arc<Mutex<HashSet<StoreOperation>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `operation` fail until cleared.
    pub fn fail_on(&self, operation: StoreOperation) {
        self.faults.lock().insert(operation);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Raw user row, including soft-deleted ones.
    pub async fn user_record(&self, id: UserId) -> Option<User> {
        self.state.lock().await.users.get(&id).cloned()
    }

    /// Raw confirmation row, including consumed ones.
    pub async fn confirmation_record(&self, id: ConfirmationId) -> Option<ConfirmationToken> {
        self.state.lock().await.confirmations.get(&id).cloned()
    }

    pub async fn confirmation_count(&self) -> usize {
        self.state.lock().await.confirmations.len()
    }

    fn check(faults: &Mutex<HashSet<StoreOperation>>, operation: StoreOperation) -> StoreResult<()> {
        if faults.lock().contains(&operation) {
            return Err(StoreError::Injected(operation.as_str()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Self::check(&self.faults, StoreOperation::Begin)?;

        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();

        Ok(Box::new(InMemoryTransaction {
            guard,
            staged,
            faults: Arc::clone(&self.faults),
        }))
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    staged: StoreState,
    faults: Arc<Mutex<HashSet<StoreOperation>>>,
}

impl InMemoryTransaction {
    fn check(&self, operation: StoreOperation) -> StoreResult<()> {
        InMemoryCredentialStore::check(&self.faults, operation)
    }

    fn active_user_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.staged.users.get_mut(&id).filter(|user| user.is_active())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        self.check(StoreOperation::FindUserByEmail)?;
        Ok(self
            .staged
            .users
            .values()
            .find(|user| user.is_active() && user.email == email)
            .cloned())
    }

    async fn find_user_by_id(&mut self, id: UserId) -> StoreResult<Option<User>> {
        self.check(StoreOperation::FindUserById)?;
        Ok(self.staged.users.get(&id).filter(|user| user.is_active()).cloned())
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        self.check(StoreOperation::InsertUser)?;

        let taken = self
            .staged
            .users
            .values()
            .any(|existing| existing.is_active() && existing.email == user.email);
        if taken || self.staged.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
        }

        self.staged.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_password(&mut self, id: UserId, password_hash: &str) -> StoreResult<bool> {
        self.check(StoreOperation::UpdatePassword)?;
        Ok(match self.active_user_mut(id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                true
            }
            None => false,
        })
    }

    async fn update_roles(&mut self, id: UserId, roles: &RoleSet) -> StoreResult<bool> {
        self.check(StoreOperation::UpdateRoles)?;
        Ok(match self.active_user_mut(id) {
            Some(user) => {
                user.roles = roles.clone();
                true
            }
            None => false,
        })
    }

    async fn soft_delete_user(&mut self, id: UserId, at: DateTime<Utc>) -> StoreResult<bool> {
        self.check(StoreOperation::SoftDeleteUser)?;
        Ok(match self.active_user_mut(id) {
            Some(user) => {
                user.state = RecordState::Deleted { at };
                true
            }
            None => false,
        })
    }

    async fn insert_confirmation(&mut self, token: &ConfirmationToken) -> StoreResult<()> {
        self.check(StoreOperation::InsertConfirmation)?;

        if self.staged.confirmations.contains_key(&token.id) {
            return Err(StoreError::Conflict(format!("confirmation {} already exists", token.id)));
        }

        self.staged.confirmations.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_confirmation(
        &mut self,
        id: ConfirmationId,
    ) -> StoreResult<Option<ConfirmationToken>> {
        self.check(StoreOperation::FindConfirmation)?;
        Ok(self
            .staged
            .confirmations
            .get(&id)
            .filter(|token| token.is_active())
            .cloned())
    }

    async fn consume_confirmation(
        &mut self,
        id: ConfirmationId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.check(StoreOperation::ConsumeConfirmation)?;
        Ok(match self.staged.confirmations.get_mut(&id) {
            Some(token) if token.is_active() && token.user_id == user_id => {
                token.state = TokenState::Consumed { at };
                true
            }
            _ => false,
        })
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.check(StoreOperation::Commit)?;
        let InMemoryTransaction { mut guard, staged, .. } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User::new(email, "hash".to_string(), RoleSet::new(["patient"]))
    }

    async fn seed(store: &InMemoryCredentialStore, user: &User) {
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(user).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = InMemoryCredentialStore::new();
        let alice = user("alice@clinic.test");
        seed(&store, &alice).await;

        {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.update_password(alice.id, "new-hash").await.unwrap());
            tx.rollback().await.unwrap();
        }
        {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.update_password(alice.id, "dropped-hash").await.unwrap());
        }

        let stored = store.user_record(alice.id).await.unwrap();
        assert_eq!(stored.password_hash, "hash");
    }

    #[tokio::test]
    async fn test_soft_deleted_user_is_invisible() {
        let store = InMemoryCredentialStore::new();
        let alice = user("alice@clinic.test");
        seed(&store, &alice).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.soft_delete_user(alice.id, Utc::now()).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_user_by_email("alice@clinic.test").await.unwrap().is_none());
        assert!(tx.find_user_by_id(alice.id).await.unwrap().is_none());
        assert!(!tx.update_password(alice.id, "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_sensitive() {
        let store = InMemoryCredentialStore::new();
        seed(&store, &user("Alice@clinic.test")).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_user_by_email("alice@clinic.test").await.unwrap().is_none());
        assert!(tx.find_user_by_email("Alice@clinic.test").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_active_email_conflicts() {
        let store = InMemoryCredentialStore::new();
        seed(&store, &user("alice@clinic.test")).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx.insert_user(&user("alice@clinic.test")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let store = InMemoryCredentialStore::new();
        store.fail_on(StoreOperation::FindUserByEmail);

        let mut tx = store.begin().await.unwrap();
        let result = tx.find_user_by_email("alice@clinic.test").await;
        assert!(matches!(result, Err(StoreError::Injected("find_user_by_email"))));

        store.clear_faults();
        assert!(tx.find_user_by_email("alice@clinic.test").await.is_ok());
    }
}

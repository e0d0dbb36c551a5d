//! PostgreSQL-backed credential store
//!
//! Users live in `users`, confirmation tokens in `action_verification`.
//! Both tables soft-delete through a nullable `deleted_at` column; every
//! lookup filters on `deleted_at IS NULL`.

use super::{CredentialStore, StoreError, StoreResult, StoreTransaction};
use crate::models::{
    ConfirmationId, ConfirmationPurpose, ConfirmationToken, RecordState, RoleSet, TokenState,
    User, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

/// PostgreSQL-backed credential store
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        info!("Credential store migrations applied");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    password: String,
    role: Json<Vec<String>>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.user_id),
            email: row.email,
            password_hash: row.password,
            roles: RoleSet::from(row.role.0),
            created_at: row.created_at,
            state: RecordState::from_deleted_at(row.deleted_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ConfirmationRow {
    acve_id: Uuid,
    user_id: Uuid,
    verification: String,
    #[sqlx(rename = "type")]
    purpose: String,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<ConfirmationRow> for ConfirmationToken {
    type Error = StoreError;

    fn try_from(row: ConfirmationRow) -> Result<Self, Self::Error> {
        let purpose = row
            .purpose
            .parse::<ConfirmationPurpose>()
            .map_err(StoreError::Decode)?;

        Ok(Self {
            id: ConfirmationId::from_uuid(row.acve_id),
            user_id: UserId::from_uuid(row.user_id),
            purpose,
            secret_hash: row.verification,
            created_at: row.created_at,
            state: TokenState::from_deleted_at(row.deleted_at),
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, email, password, role, created_at, deleted_at
            FROM users
            WHERE email = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(User::from))
    }

    async fn find_user_by_id(&mut self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, email, password, role, created_at, deleted_at
            FROM users
            WHERE user_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(User::from))
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        debug!(user_id = %user.id, "Inserting user");

        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, password, role, created_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(Json(user.roles.as_slice()))
        .bind(user.created_at)
        .bind(user.state.deleted_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("user {} already exists", user.id))
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn update_password(&mut self, id: UserId, password_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET password = $1 WHERE user_id = $2 AND deleted_at IS NULL",
        )
        .bind(password_hash)
        .bind(id.as_uuid())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_roles(&mut self, id: UserId, roles: &RoleSet) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET role = $1 WHERE user_id = $2 AND deleted_at IS NULL",
        )
        .bind(Json(roles.as_slice()))
        .bind(id.as_uuid())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete_user(&mut self, id: UserId, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = $1 WHERE user_id = $2 AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(id.as_uuid())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_confirmation(&mut self, token: &ConfirmationToken) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO action_verification (acve_id, user_id, verification, type, created_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id.as_uuid())
        .bind(token.user_id.as_uuid())
        .bind(&token.secret_hash)
        .bind(token.purpose.as_str())
        .bind(token.created_at)
        .bind(token.state.consumed_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("confirmation {} already exists", token.id))
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn find_confirmation(
        &mut self,
        id: ConfirmationId,
    ) -> StoreResult<Option<ConfirmationToken>> {
        let row = sqlx::query_as::<_, ConfirmationRow>(
            r#"
            SELECT acve_id, user_id, verification, type, created_at, deleted_at
            FROM action_verification
            WHERE acve_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(ConfirmationToken::try_from).transpose()
    }

    async fn consume_confirmation(
        &mut self,
        id: ConfirmationId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE action_verification
            SET deleted_at = $1
            WHERE acve_id = $2 AND user_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(at)
        .bind(id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

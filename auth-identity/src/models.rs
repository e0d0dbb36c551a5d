use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque user identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Public identity of a confirmation token, embedded in reset links.
/// Never equal to the owning user's id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationId(Uuid);

impl ConfirmationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConfirmationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConfirmationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConfirmationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// =============================================================================
// ROLES
// =============================================================================

/// Ordered sequence of role names held by a user.
///
/// Role names double as permissions: a route requiring `["doctor", "verified"]`
/// is satisfied only by a role set containing both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(Vec<String>);

impl RoleSet {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.iter().any(|r| r == role)
    }

    /// Conjunctive permission check.
    ///
    /// Every required entry must be present. An empty requirement is never
    /// satisfied.
    pub fn can<S: AsRef<str>>(&self, required: &[S]) -> bool {
        !required.is_empty() && required.iter().all(|p| self.contains(p.as_ref()))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for RoleSet {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

// =============================================================================
// RECORD LIFECYCLE
// =============================================================================

/// Soft-delete state of a user record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordState {
    Active,
    Deleted { at: DateTime<Utc> },
}

impl RecordState {
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => Self::Deleted { at },
            None => Self::Active,
        }
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active => None,
            Self::Deleted { at } => Some(*at),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Single-use state of a confirmation token.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TokenState {
    Active,
    Consumed { at: DateTime<Utc> },
}

impl TokenState {
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => Self::Consumed { at },
            None => Self::Active,
        }
    }

    pub fn consumed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active => None,
            Self::Consumed { at } => Some(*at),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

// =============================================================================
// USER
// =============================================================================

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    /// Unique among active users, compared case-sensitively as stored.
    pub email: String,
    /// Argon2 PHC string. Never serialized outward; see [`UserProfile`].
    pub password_hash: String,
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
    pub state: RecordState,
}

impl User {
    pub fn new(email: impl Into<String>, password_hash: String, roles: RoleSet) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            password_hash,
            roles,
            created_at: Utc::now(),
            state: RecordState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            roles: self.roles.clone(),
            created_at: self.created_at,
        }
    }
}

/// Outward view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "userID")]
    pub id: UserId,
    pub email: String,
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// CONFIRMATION TOKEN
// =============================================================================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmationPurpose {
    #[serde(rename = "email-verify")]
    EmailVerify,
    #[serde(rename = "password-reset")]
    PasswordReset,
}

impl ConfirmationPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailVerify => "email-verify",
            Self::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for ConfirmationPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfirmationPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email-verify" => Ok(Self::EmailVerify),
            "password-reset" => Ok(Self::PasswordReset),
            other => Err(format!("unknown confirmation purpose '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationToken {
    pub id: ConfirmationId,
    pub user_id: UserId,
    pub purpose: ConfirmationPurpose,
    /// Argon2 hash of the out-of-band secret.
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    pub state: TokenState,
}

impl ConfirmationToken {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

// =============================================================================
// SESSION CLAIMS
// =============================================================================

/// Claim set carried inside a signed session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userID")]
    pub user_id: UserId,

    pub email: String,

    /// Issuer
    pub iss: String,

    /// Issued at (seconds since epoch)
    pub iat: i64,

    /// Expiration (seconds since epoch)
    pub exp: i64,
}

impl Claims {
    /// Build claims for `user` issued at `now` and living for `ttl`.
    ///
    /// Fails with `TokenSigning` when the expiry is not representable.
    pub fn for_user(
        user: &User,
        issuer: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> crate::error::Result<Self> {
        let expires = now.checked_add_signed(ttl).ok_or_else(|| {
            crate::error::IdentityError::TokenSigning("token expiry out of range".to_string())
        })?;

        Ok(Self {
            user_id: user.id,
            email: user.email.clone(),
            iss: issuer.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        })
    }

    /// Expired once the expiry instant lies strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp < now.timestamp()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

// =============================================================================
// SERVICE RESPONSES
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub user: UserProfile,
    pub roles: RoleSet,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of the best-effort notification that follows a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Delivered,
    Failed { reason: String },
}

impl NotificationOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// A reset token was persisted. `notification` reports delivery of the link
/// separately; the token exists whatever it says.
#[derive(Debug, Clone, Serialize)]
pub struct ResetRequested {
    pub confirmation_id: ConfirmationId,
    pub notification: NotificationOutcome,
}

/// The password change is committed. `notification` reports only the
/// post-commit alert and never implies the reset failed.
#[derive(Debug, Clone, Serialize)]
pub struct ResetCompleted {
    pub user_id: UserId,
    pub notification: NotificationOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_can_requires_every_permission() {
        let roles = RoleSet::new(["a", "b"]);

        assert!(roles.can(&["a", "b"]));
        assert!(roles.can(&["b"]));
        assert!(!roles.can(&["a", "b", "c"]));
    }

    #[test]
    fn test_can_denies_empty_requirement() {
        let roles = RoleSet::new(["admin"]);
        let required: [&str; 0] = [];

        assert!(!roles.can(&required));
    }

    #[test]
    fn test_doctor_needs_verified() {
        let unverified = RoleSet::new(["doctor"]);
        let verified = RoleSet::new(["doctor", "verified"]);

        assert!(!unverified.can(&["doctor", "verified"]));
        assert!(verified.can(&["doctor", "verified"]));
    }

    #[test]
    fn test_purpose_round_trips_through_str() {
        for purpose in [ConfirmationPurpose::EmailVerify, ConfirmationPurpose::PasswordReset] {
            assert_eq!(purpose.as_str().parse::<ConfirmationPurpose>(), Ok(purpose));
        }
        assert!("email".parse::<ConfirmationPurpose>().is_err());
    }

    #[test]
    fn test_claims_expiry_boundary() {
        let user = User::new("a@b.test", String::new(), RoleSet::empty());
        let now = Utc::now();
        let claims = Claims::for_user(&user, "issuer", now, chrono::Duration::hours(72)).unwrap();

        assert!(!claims.is_expired_at(now));
        assert!(!claims.is_expired_at(now + chrono::Duration::hours(72)));
        assert!(claims.is_expired_at(now + chrono::Duration::hours(72) + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_unrepresentable_expiry_is_error() {
        let user = User::new("a@b.test", String::new(), RoleSet::empty());
        let result = Claims::for_user(&user, "issuer", DateTime::<Utc>::MAX_UTC, chrono::Duration::hours(1));

        assert!(matches!(result, Err(crate::error::IdentityError::TokenSigning(_))));
    }

    #[test]
    fn test_profile_never_carries_hash() {
        let user = User::new("a@b.test", "$argon2id$secret".to_string(), RoleSet::new(["patient"]));
        let json = serde_json::to_string(&user.profile()).unwrap();

        assert!(!json.contains("argon2"));
        assert!(json.contains("\"userID\""));
    }

    proptest! {
        #[test]
        fn prop_can_matches_conjunction(
            held in proptest::collection::vec("[a-d]", 0..5),
            required in proptest::collection::vec("[a-d]", 0..5),
        ) {
            let roles = RoleSet::new(held.clone());
            let expected = !required.is_empty() && required.iter().all(|r| held.contains(r));
            prop_assert_eq!(roles.can(&required), expected);
        }
    }
}

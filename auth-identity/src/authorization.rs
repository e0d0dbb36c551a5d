use crate::error::{IdentityError, Result};
use crate::models::{Claims, RoleSet, UserId};
use crate::role_cache::RoleCache;
use crate::tokens::TokenCodec;
use std::sync::Arc;
use tracing::warn;

/// Permission set a protected route declares statically.
///
/// ```
/// use auth_identity::RequiredPermissions;
///
/// const VIEW_PATIENT: RequiredPermissions = RequiredPermissions::new(&["doctor", "verified"]);
/// assert_eq!(VIEW_PATIENT.as_slice(), &["doctor", "verified"]);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequiredPermissions(&'static [&'static str]);

impl RequiredPermissions {
    pub const fn new(permissions: &'static [&'static str]) -> Self {
        Self(permissions)
    }

    pub fn as_slice(&self) -> &'static [&'static str] {
        self.0
    }
}

/// Caller identity after a successful authorization.
#[derive(Debug, Clone)]
pub struct AuthorizedSubject {
    pub claims: Claims,
    pub roles: RoleSet,
}

impl AuthorizedSubject {
    pub fn user_id(&self) -> UserId {
        self.claims.user_id
    }
}

/// Token check followed by a conjunctive role check.
pub struct Authorizer {
    codec: TokenCodec,
    roles: Arc<RoleCache>,
}

impl Authorizer {
    pub fn new(codec: TokenCodec, roles: Arc<RoleCache>) -> Self {
        Self { codec, roles }
    }

    /// Grant only when every required permission is among the caller's roles.
    ///
    /// Token failures surface as `InvalidToken` or `ExpiredToken`; a valid
    /// caller lacking a permission gets `Forbidden`. An empty requirement is
    /// never granted.
    pub async fn authorize(&self, token: &str, required: &[&str]) -> Result<AuthorizedSubject> {
        let claims = self.codec.verify(token)?;
        let roles = self.roles.get_roles(claims.user_id).await?;

        if !roles.can(required) {
            warn!(
                user_id = %claims.user_id,
                required = ?required,
                held = ?roles.as_slice(),
                "Authorization denied"
            );
            return Err(IdentityError::Forbidden);
        }

        Ok(AuthorizedSubject { claims, roles })
    }

    pub fn role_cache(&self) -> &Arc<RoleCache> {
        &self.roles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::models::User;
    use crate::role_cache::MockRoleLoader;

    fn authorizer_with_roles(roles: &'static [&'static str]) -> (Authorizer, String) {
        let codec = TokenCodec::new(&TokenConfig::new("0123456789abcdef0123456789abcdef")).unwrap();
        let user = User::new("doc@clinic.test", String::new(), RoleSet::empty());
        let token = codec.sign(&codec.claims_for(&user).unwrap()).unwrap();

        let mut loader = MockRoleLoader::new();
        loader
            .expect_load_roles()
            .returning(move |_| Ok(RoleSet::new(roles.iter().copied())));
        let cache = Arc::new(RoleCache::new(Arc::new(loader), None));

        (Authorizer::new(codec, cache), token)
    }

    #[tokio::test]
    async fn test_conjunctive_grant_and_deny() {
        let (authorizer, token) = authorizer_with_roles(&["a", "b"]);

        assert!(authorizer.authorize(&token, &["a", "b"]).await.is_ok());
        assert!(matches!(
            authorizer.authorize(&token, &["a", "b", "c"]).await,
            Err(IdentityError::Forbidden)
        ));
        assert!(matches!(
            authorizer.authorize(&token, &[]).await,
            Err(IdentityError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_doctor_must_be_verified() {
        let (unverified, token) = authorizer_with_roles(&["doctor"]);
        assert!(matches!(
            unverified.authorize(&token, &["doctor", "verified"]).await,
            Err(IdentityError::Forbidden)
        ));

        let (verified, token) = authorizer_with_roles(&["doctor", "verified"]);
        let subject = verified.authorize(&token, &["doctor", "verified"]).await.unwrap();
        assert_eq!(subject.roles, RoleSet::new(["doctor", "verified"]));
    }

    #[tokio::test]
    async fn test_bad_token_skips_role_lookup() {
        let codec = TokenCodec::new(&TokenConfig::new("0123456789abcdef0123456789abcdef")).unwrap();
        let mut loader = MockRoleLoader::new();
        loader.expect_load_roles().never();
        let authorizer = Authorizer::new(codec, Arc::new(RoleCache::new(Arc::new(loader), None)));

        assert!(matches!(
            authorizer.authorize("garbage", &["doctor"]).await,
            Err(IdentityError::InvalidToken)
        ));
    }
}

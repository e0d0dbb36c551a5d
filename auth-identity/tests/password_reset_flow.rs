//! End-to-end credential flows over the in-memory store
//!
//! Drives IdentityService the way the HTTP layer does: sign in, recover,
//! reset, and authorize against route permissions.

use async_trait::async_trait;
use auth_identity::{
    ConfirmationId, ConfirmationPurpose, IdentityConfig, IdentityError, IdentityService,
    InMemoryCredentialStore, NotificationOutcome, Notifier, NotifyError, PasswordResetCompleted,
    PasswordResetRequested, RequiredPermissions, RoleSet, UserProfile,
};
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use std::sync::Arc;

/// Notifier that keeps every message so tests can read the reset link.
#[derive(Default)]
struct RecordingNotifier {
    requested: Mutex<Vec<PasswordResetRequested>>,
    completed: Mutex<Vec<PasswordResetCompleted>>,
    fail_completed: bool,
}

impl RecordingNotifier {
    /// Confirmation id and secret parsed back out of the latest link.
    fn last_link(&self) -> (ConfirmationId, String) {
        let requested = self.requested.lock();
        let url = requested.last().unwrap().confirmation_url.expose_secret().clone();
        let mut segments = url.rsplit('/');
        let secret = segments.next().unwrap().to_string();
        let id = segments.next().unwrap().parse().unwrap();
        (id, secret)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_password_reset_requested(
        &self,
        details: &PasswordResetRequested,
    ) -> Result<(), NotifyError> {
        self.requested.lock().push(details.clone());
        Ok(())
    }

    async fn send_password_reset_completed(
        &self,
        details: &PasswordResetCompleted,
    ) -> Result<(), NotifyError> {
        self.completed.lock().push(details.clone());
        if self.fail_completed {
            return Err(NotifyError::Transport("mailbox full".to_string()));
        }
        Ok(())
    }
}

struct Harness {
    store: InMemoryCredentialStore,
    notifier: Arc<RecordingNotifier>,
    service: IdentityService,
    doctor: UserProfile,
}

async fn harness_with(notifier: RecordingNotifier) -> Harness {
    let mut config = IdentityConfig::with_secret("an-hmac-secret-that-is-long-enough!!");
    config.hashing.memory_kib = 1024;
    config.hashing.iterations = 1;
    config.app_url = "https://clinic.test".to_string();

    let store = InMemoryCredentialStore::new();
    let notifier = Arc::new(notifier);
    let service = IdentityService::new(Arc::new(store.clone()), notifier.clone(), config).unwrap();

    let doctor = service
        .create_user("dr.house@clinic.test", "vicodin", RoleSet::new(["doctor"]))
        .await
        .unwrap();

    Harness {
        store,
        notifier,
        service,
        doctor,
    }
}

async fn harness() -> Harness {
    harness_with(RecordingNotifier::default()).await
}

#[tokio::test]
async fn test_login_token_decodes_to_user() {
    let h = harness().await;

    let login = h.service.login("dr.house@clinic.test", "vicodin").await.unwrap();
    let subject = h.service.authorize(&login.token, &["doctor"]).await.unwrap();

    assert_eq!(subject.user_id(), h.doctor.id);
    assert_eq!(subject.claims.email, "dr.house@clinic.test");
    assert_eq!(login.roles, RoleSet::new(["doctor"]));
}

#[tokio::test]
async fn test_wrong_password_leaves_hash_untouched() {
    let h = harness().await;
    let before = h.store.user_record(h.doctor.id).await.unwrap().password_hash;

    let result = h.service.login("dr.house@clinic.test", "aspirin").await;

    assert!(matches!(result, Err(IdentityError::InvalidCredentials)));
    let after = h.store.user_record(h.doctor.id).await.unwrap().password_hash;
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_reset_then_replay_is_rejected() {
    let h = harness().await;

    let requested = h.service.request_password_reset("dr.house@clinic.test").await.unwrap();
    assert!(requested.notification.is_delivered());
    let (id, secret) = h.notifier.last_link();
    assert_eq!(id, requested.confirmation_id);

    let completed = h.service.apply_password_reset(id, &secret, "new-vicodin").await.unwrap();
    assert_eq!(completed.user_id, h.doctor.id);
    assert!(completed.notification.is_delivered());
    assert_eq!(h.notifier.completed.lock().len(), 1);

    let replay = h.service.apply_password_reset(id, &secret, "third-try").await;
    assert!(matches!(replay, Err(IdentityError::InvalidResetToken)));

    assert!(h.service.login("dr.house@clinic.test", "new-vicodin").await.is_ok());
    assert!(matches!(
        h.service.login("dr.house@clinic.test", "vicodin").await,
        Err(IdentityError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_recover_unknown_email_sends_nothing() {
    let h = harness().await;

    let result = h.service.request_password_reset("nobody@clinic.test").await;

    assert!(matches!(result, Err(IdentityError::UserNotFound)));
    assert!(h.notifier.requested.lock().is_empty());
    assert_eq!(h.store.confirmation_count().await, 0);
}

#[tokio::test]
async fn test_wrong_secret_keeps_old_password() {
    let h = harness().await;

    h.service.request_password_reset("dr.house@clinic.test").await.unwrap();
    let (id, _) = h.notifier.last_link();

    let result = h.service.apply_password_reset(id, "not-the-secret", "new-vicodin").await;

    assert!(matches!(result, Err(IdentityError::VerificationMismatch)));
    assert!(h.service.login("dr.house@clinic.test", "vicodin").await.is_ok());
    assert!(h.notifier.completed.lock().is_empty());
}

#[tokio::test]
async fn test_failed_alert_does_not_undo_reset() {
    let h = harness_with(RecordingNotifier {
        fail_completed: true,
        ..Default::default()
    })
    .await;

    h.service.request_password_reset("dr.house@clinic.test").await.unwrap();
    let (id, secret) = h.notifier.last_link();

    let completed = h.service.apply_password_reset(id, &secret, "new-vicodin").await.unwrap();

    assert!(matches!(completed.notification, NotificationOutcome::Failed { .. }));
    assert!(h.service.login("dr.house@clinic.test", "new-vicodin").await.is_ok());
}

#[tokio::test]
async fn test_session_survives_password_reset() {
    let h = harness().await;
    let login = h.service.login("dr.house@clinic.test", "vicodin").await.unwrap();

    h.service.request_password_reset("dr.house@clinic.test").await.unwrap();
    let (id, secret) = h.notifier.last_link();
    h.service.apply_password_reset(id, &secret, "new-vicodin").await.unwrap();

    // No revocation list: the old token stays valid until it expires.
    assert!(h.service.authorize(&login.token, &["doctor"]).await.is_ok());
}

#[tokio::test]
async fn test_verified_doctor_route() {
    const VIEW_PATIENT: RequiredPermissions = RequiredPermissions::new(&["doctor", "verified"]);
    let h = harness().await;
    let login = h.service.login("dr.house@clinic.test", "vicodin").await.unwrap();

    assert!(matches!(
        h.service.authorize(&login.token, VIEW_PATIENT.as_slice()).await,
        Err(IdentityError::Forbidden)
    ));

    h.service
        .update_roles(h.doctor.id, RoleSet::new(["doctor", "verified"]))
        .await
        .unwrap();

    let subject = h.service.authorize(&login.token, VIEW_PATIENT.as_slice()).await.unwrap();
    assert!(subject.roles.contains("verified"));
}

#[tokio::test]
async fn test_empty_requirement_never_granted() {
    let h = harness().await;
    let login = h.service.login("dr.house@clinic.test", "vicodin").await.unwrap();

    assert!(matches!(
        h.service.authorize(&login.token, &[]).await,
        Err(IdentityError::Forbidden)
    ));
}

#[tokio::test]
async fn test_email_verify_token_issuable() {
    let h = harness().await;

    let issued = h
        .service
        .confirmations()
        .issue(h.doctor.id, ConfirmationPurpose::EmailVerify)
        .await
        .unwrap();

    let record = h.store.confirmation_record(issued.id).await.unwrap();
    assert_eq!(record.purpose, ConfirmationPurpose::EmailVerify);
    assert!(record.is_active());
}

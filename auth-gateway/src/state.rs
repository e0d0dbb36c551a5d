use auth_identity::IdentityService;
use std::sync::Arc;

/// Shared handler state. Cloned per request; the service itself is shared.
#[derive(Clone)]
pub struct GatewayState {
    identity: Arc<IdentityService>,
}

impl GatewayState {
    pub fn new(identity: Arc<IdentityService>) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &IdentityService {
        &self.identity
    }
}

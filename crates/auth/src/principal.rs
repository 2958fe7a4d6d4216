use passport_core::IdentityId;

/// The identity behind a validated access token.
///
/// Only [`crate::TokenIssuer::authenticate`] can produce one, so holding an
/// `AuthenticatedCaller` proves the id came from a verified, unexpired token
/// rather than from client input. Self-service operations take this instead of
/// a bare id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AuthenticatedCaller {
    identity_id: IdentityId,
}

impl AuthenticatedCaller {
    pub(crate) fn new(identity_id: IdentityId) -> Self {
        Self { identity_id }
    }

    pub fn identity_id(&self) -> IdentityId {
        self.identity_id
    }
}

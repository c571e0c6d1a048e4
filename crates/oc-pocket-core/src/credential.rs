//! Bearer credential holder and provider callbacks.

use std::sync::{Arc, RwLock};

use crate::PairingPayload;

/// Yields the current bearer token, polled once per request.
///
/// Must return promptly: no network calls inside.
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Yields the default directory scope, polled once per request.
///
/// Must return promptly: no network calls inside.
pub type DirectoryProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Shared, replaceable bearer token.
///
/// Cloning shares the underlying slot, so a token replaced after re-pairing
/// (or cleared after a rejection) is seen by every client built from
/// [`Credential::token_provider`].
#[derive(Clone, Default)]
pub struct Credential {
    token: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("present", &self.token().is_some())
            .finish()
    }
}

impl Credential {
    /// Create an empty credential.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a credential holding `token`.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let credential = Self::new();
        credential.replace(token);
        credential
    }

    /// Derive the credential from a decoded pairing payload.
    #[must_use]
    pub fn from_payload(payload: &PairingPayload) -> Self {
        Self::with_token(payload.token.clone())
    }

    /// Current token, if any.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the token (re-pair).
    pub fn replace(&self, token: impl Into<String>) {
        let token = token.into();
        match self.token.write() {
            Ok(mut guard) => *guard = Some(token),
            Err(poisoned) => *poisoned.into_inner() = Some(token),
        }
    }

    /// Forget the token (server rejected it).
    pub fn clear(&self) {
        match self.token.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// Provider function reading this credential on every call.
    #[must_use]
    pub fn token_provider(&self) -> TokenProvider {
        let credential = self.clone();
        Arc::new(move || credential.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_sees_rotation_and_clear() {
        let payload = PairingPayload::new("http://h", "first", None);
        let credential = Credential::from_payload(&payload);
        let provider = credential.token_provider();

        assert_eq!(provider().as_deref(), Some("first"));

        credential.replace("second");
        assert_eq!(provider().as_deref(), Some("second"));

        credential.clear();
        assert_eq!(provider(), None);
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let credential = Credential::with_token("super-secret");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("present: true"));
    }
}

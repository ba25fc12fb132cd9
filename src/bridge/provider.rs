//! The external identity provider boundary.
//!
//! The provider is modeled as an explicit event-listener interface instead of
//! ambient SDK callbacks so the bridge's behavior under interleaving can be
//! unit-tested without a real provider. The contract: every event reports the
//! provider's *current* truth, the first event resolves the session's loading
//! state, and events may arrive zero or more times over the process lifetime.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::broadcast;

use crate::session::identity::Principal;

/// Errors from the identity provider. Always logged, never fatal: the bridge
/// degrades to an unset session instead of propagating these into renders.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Token fetch failed: {0}")]
    Token(String),

    #[error("Sign-out failed: {0}")]
    SignOut(String),

    #[error("Provider does not support this operation: {0}")]
    Unsupported(String),
}

/// A state change reported by the provider's subscription stream.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// The provider reports an authenticated principal (external login,
    /// startup confirmation, or token refresh).
    SignedIn(Principal),
    /// The provider reports no authenticated principal.
    SignedOut,
}

/// Interface to the external identity provider.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subscribe to sign-in state changes. Dropping the receiver is the
    /// unsubscribe.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;

    /// Request a fresh bearer token for a principal.
    async fn bearer_token(&self, principal: &Principal) -> Result<String, ProviderError>;

    /// Sign the principal out with the provider. Best-effort: callers tear
    /// down the local session regardless of the outcome.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Whether this provider's event stream is authoritative over cached
    /// sessions. When false, a restored session is confirmed immediately
    /// instead of waiting for a first event that will never come.
    fn authoritative(&self) -> bool {
        true
    }

    /// Provider identifier used in the backend exchange path
    /// (`POST /{name}-login`) and in logs.
    fn name(&self) -> &str;
}

// =============================================================================
// NullProvider
// =============================================================================

/// Placeholder for deployments without an external identity provider.
///
/// Emits no events and is not authoritative: the restored session stands
/// until the backend rejects its token, and all sessions come from the
/// password login flow.
pub struct NullProvider {
    // Kept so subscribers block instead of observing a closed channel.
    tx: broadcast::Sender<ProviderEvent>,
}

impl Default for NullProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NullProvider {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(8);
        Self { tx }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for NullProvider {
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.tx.subscribe()
    }

    async fn bearer_token(&self, _principal: &Principal) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported(
            "no identity provider configured".to_string(),
        ))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn authoritative(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "none"
    }
}

// =============================================================================
// ChannelProvider
// =============================================================================

/// Broadcast-backed provider for tests and embedded integrations.
///
/// Events are emitted by the owner via [`ChannelProvider::emit`]; bearer
/// tokens are scripted per principal id, and sign-out can be made to fail to
/// exercise the best-effort logout path.
pub struct ChannelProvider {
    tx: broadcast::Sender<ProviderEvent>,
    tokens: RwLock<HashMap<String, String>>,
    fail_sign_out: AtomicBool,
    sign_out_calls: AtomicUsize,
}

impl Default for ChannelProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelProvider {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self {
            tx,
            tokens: RwLock::new(HashMap::new()),
            fail_sign_out: AtomicBool::new(false),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: ProviderEvent) {
        // Send only fails when there are no subscribers, which is fine: the
        // provider reports current truth, it does not queue for late joiners.
        let _ = self.tx.send(event);
    }

    /// Script the bearer token returned for a principal id.
    pub fn set_token(&self, principal_id: impl Into<String>, token: impl Into<String>) {
        self.tokens
            .write()
            .expect("token map poisoned")
            .insert(principal_id.into(), token.into());
    }

    /// Make subsequent sign-out calls fail.
    pub fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    /// Number of sign-out attempts observed.
    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IdentityProvider for ChannelProvider {
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.tx.subscribe()
    }

    async fn bearer_token(&self, principal: &Principal) -> Result<String, ProviderError> {
        self.tokens
            .read()
            .expect("token map poisoned")
            .get(&principal.id)
            .cloned()
            .ok_or_else(|| ProviderError::Token(format!("no token for principal {}", principal.id)))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            Err(ProviderError::SignOut("provider unreachable".to_string()))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_provider_has_no_token() {
        let provider = NullProvider::new();
        let principal = Principal::new("u1");
        assert!(provider.bearer_token(&principal).await.is_err());
        assert!(!provider.authoritative());
    }

    #[tokio::test]
    async fn test_null_provider_sign_out_is_ok() {
        let provider = NullProvider::new();
        assert!(provider.sign_out().await.is_ok());
    }

    #[tokio::test]
    async fn test_channel_provider_delivers_events() {
        let provider = ChannelProvider::new();
        let mut rx = provider.subscribe();
        provider.emit(ProviderEvent::SignedOut);
        match rx.recv().await.unwrap() {
            ProviderEvent::SignedOut => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_channel_provider_scripted_tokens() {
        let provider = ChannelProvider::new();
        provider.set_token("u1", "bearer-1");
        let tok = provider.bearer_token(&Principal::new("u1")).await.unwrap();
        assert_eq!(tok, "bearer-1");
        assert!(provider.bearer_token(&Principal::new("u2")).await.is_err());
    }

    #[tokio::test]
    async fn test_channel_provider_failable_sign_out() {
        let provider = ChannelProvider::new();
        assert!(provider.sign_out().await.is_ok());
        provider.fail_sign_out(true);
        assert!(provider.sign_out().await.is_err());
        assert_eq!(provider.sign_out_calls(), 2);
    }
}

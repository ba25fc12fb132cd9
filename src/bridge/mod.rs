//! Reconciles the identity provider's event stream with the session store
//! and performs the backend credential exchange.
//!
//! # Concurrency contract
//!
//! Provider events arrive on their own channel and may interleave with
//! explicit `login`/`logout` calls. The bridge makes no ordering promises
//! beyond "each session mutation is atomic with respect to storage": the most
//! recently *completed* operation wins, because the provider only ever
//! reports current truth.

pub mod backend;
pub mod provider;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::bridge::backend::BackendClient;
use crate::bridge::provider::{IdentityProvider, ProviderEvent};
use crate::error::AppError;
use crate::session::SessionStore;
use crate::session::identity::{Identity, Principal};

pub struct IdentityBridge {
    sessions: Arc<SessionStore>,
    provider: Arc<dyn IdentityProvider>,
    backend: BackendClient,
}

impl IdentityBridge {
    pub fn new(
        sessions: Arc<SessionStore>,
        provider: Arc<dyn IdentityProvider>,
        backend: BackendClient,
    ) -> Self {
        Self {
            sessions,
            provider,
            backend,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Drive the provider subscription until the stream closes.
    ///
    /// For a non-authoritative provider (no external identity source) the
    /// restored session is confirmed up front; otherwise the first event
    /// resolves the loading state.
    pub async fn run(self: Arc<Self>) {
        if !self.provider.authoritative() {
            debug!(provider = self.provider.name(), "Provider is not authoritative; trusting cached session");
            self.sessions.mark_resolved();
        }
        let mut rx = self.provider.subscribe();
        loop {
            match rx.recv().await {
                Ok(event) => self.on_provider_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Provider event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Provider event stream closed");
    }

    /// Single entry point for provider state changes.
    ///
    /// A reported principal is committed only after both the provider token
    /// fetch and the backend exchange succeed; any failure leaves the session
    /// unset rather than half-populated. Either way the session resolves.
    pub async fn on_provider_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::SignedOut => {
                debug!(provider = self.provider.name(), "Provider reports signed out");
                self.sessions.clear();
            }
            ProviderEvent::SignedIn(principal) => {
                match self.establish(&principal).await {
                    Ok(identity) => {
                        debug!(user_id = %identity.id, "Provider sign-in reconciled");
                    }
                    Err(e) => {
                        warn!(
                            provider = self.provider.name(),
                            principal = %principal.id,
                            error = %e,
                            "Provider sign-in could not be completed; leaving session unset"
                        );
                        self.sessions.clear();
                    }
                }
            }
        }
    }

    /// Exchange a provider principal for an application token and commit it.
    async fn establish(&self, principal: &Principal) -> Result<Identity, AppError> {
        let bearer = self.provider.bearer_token(principal).await?;
        let exchange = self
            .backend
            .provider_login(self.provider.name(), principal, &bearer)
            .await?;

        // The backend's user record is authoritative but may be sparse;
        // missing display fields fall back to what the provider reported.
        let mut merged: Principal = exchange.user.into();
        if merged.email.is_none() {
            merged.email = principal.email.clone();
        }
        if merged.display_name.is_none() {
            merged.display_name = principal.display_name.clone();
        }
        if merged.avatar_url.is_none() {
            merged.avatar_url = principal.avatar_url.clone();
        }

        Ok(self.sessions.set(&merged, &exchange.token))
    }

    /// Password login against the application backend.
    ///
    /// Required fields are validated locally before any network call; backend
    /// rejections surface the server's message verbatim. The session is only
    /// touched on success.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AppError> {
        if email.trim().is_empty() {
            return Err(AppError::BadRequest("Email is required".to_string()));
        }
        if password.is_empty() {
            return Err(AppError::BadRequest("Password is required".to_string()));
        }

        let exchange = self.backend.login(email, password).await?;
        let principal: Principal = exchange.user.into();
        let identity = self.sessions.set(&principal, &exchange.token);
        info!(user_id = %identity.id, "Login succeeded");
        Ok(identity)
    }

    /// Account registration against the application backend. Same local
    /// validation and error contract as [`login`].
    ///
    /// [`login`]: IdentityBridge::login
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("Name is required".to_string()));
        }
        if email.trim().is_empty() {
            return Err(AppError::BadRequest("Email is required".to_string()));
        }
        if password.is_empty() {
            return Err(AppError::BadRequest("Password is required".to_string()));
        }

        let exchange = self.backend.register(name, email, password).await?;
        let principal: Principal = exchange.user.into();
        let identity = self.sessions.set(&principal, &exchange.token);
        info!(user_id = %identity.id, "Registration succeeded");
        Ok(identity)
    }

    /// Sign out with the provider (best-effort), then unconditionally tear
    /// down the local session. Provider connectivity can never block logout.
    pub async fn logout(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!(provider = self.provider.name(), error = %e, "Provider sign-out failed; clearing local session anyway");
        }
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::provider::{ChannelProvider, NullProvider};
    use crate::session::SessionPhase;
    use crate::session::identity::{AdminAllowlist, Role};
    use crate::session::storage::{MemorySessionStorage, SESSION_KEY, SessionStorage};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AVATAR: &str = "/assets/avatar-default.png";

    fn sessions_with(storage: MemorySessionStorage, admins: &[&str]) -> Arc<SessionStore> {
        Arc::new(SessionStore::new(
            Arc::new(storage),
            AdminAllowlist::new(admins.iter().copied()),
            AVATAR,
        ))
    }

    fn backend_for(server: &MockServer) -> BackendClient {
        BackendClient::new(server.uri(), Duration::from_secs(5))
    }

    /// A backend no request should ever reach.
    fn unreachable_backend() -> BackendClient {
        BackendClient::new("http://127.0.0.1:1", Duration::from_millis(200))
    }

    fn mock_login_response(id: &str, email: &str, token: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user": {"_id": id, "email": email},
            "token": token
        }))
    }

    #[tokio::test]
    async fn test_login_empty_email_rejected_locally() {
        let sessions = sessions_with(MemorySessionStorage::new(), &[]);
        let bridge =
            IdentityBridge::new(sessions, Arc::new(NullProvider::new()), unreachable_backend());

        let err = bridge.login("", "pw").await.unwrap_err();
        assert_eq!(err.to_string(), "Email is required");
    }

    #[tokio::test]
    async fn test_login_empty_password_rejected_locally() {
        let sessions = sessions_with(MemorySessionStorage::new(), &[]);
        let bridge = IdentityBridge::new(
            sessions.clone(),
            Arc::new(NullProvider::new()),
            unreachable_backend(),
        );

        let err = bridge.login("a@b.com", "").await.unwrap_err();
        assert_eq!(err.to_string(), "Password is required");
        // Session untouched.
        assert!(sessions.current().identity.is_none());
    }

    #[tokio::test]
    async fn test_login_success_sets_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(mock_login_response("u1", "a@b.com", "app-token"))
            .mount(&server)
            .await;

        let sessions = sessions_with(MemorySessionStorage::new(), &["a@b.com"]);
        let bridge = IdentityBridge::new(
            sessions.clone(),
            Arc::new(NullProvider::new()),
            backend_for(&server),
        );

        let identity = bridge.login("a@b.com", "pw").await.unwrap();
        assert_eq!(identity.role, Role::Admin);
        assert_eq!(identity.access_token, "app-token");
        assert_eq!(sessions.current().identity, Some(identity));
    }

    #[tokio::test]
    async fn test_login_rejection_leaves_session_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let sessions = sessions_with(MemorySessionStorage::new(), &[]);
        let bridge = IdentityBridge::new(
            sessions.clone(),
            Arc::new(NullProvider::new()),
            backend_for(&server),
        );

        let err = bridge.login("a@b.com", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
        assert!(sessions.current().identity.is_none());
    }

    #[tokio::test]
    async fn test_provider_signed_out_clears_and_resolves() {
        let sessions = sessions_with(MemorySessionStorage::new(), &[]);
        let bridge = IdentityBridge::new(
            sessions.clone(),
            Arc::new(ChannelProvider::new()),
            unreachable_backend(),
        );

        bridge.on_provider_event(ProviderEvent::SignedOut).await;
        let session = sessions.current();
        assert!(session.identity.is_none());
        assert_eq!(session.phase, SessionPhase::ConfirmedByProvider);
    }

    #[tokio::test]
    async fn test_provider_signed_in_exchanges_and_sets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channel-login"))
            .respond_with(mock_login_response("u1", "a@b.com", "exchanged"))
            .mount(&server)
            .await;

        let provider = Arc::new(ChannelProvider::new());
        provider.set_token("u1", "bearer");

        let sessions = sessions_with(MemorySessionStorage::new(), &[]);
        let bridge = IdentityBridge::new(sessions.clone(), provider, backend_for(&server));

        let principal = Principal::new("u1").with_email("a@b.com");
        bridge
            .on_provider_event(ProviderEvent::SignedIn(principal))
            .await;

        let identity = sessions.current().identity.unwrap();
        assert_eq!(identity.access_token, "exchanged");
        assert_eq!(identity.role, Role::Customer);
    }

    #[tokio::test]
    async fn test_provider_token_failure_leaves_session_unset() {
        // No scripted token: bearer_token fails before any backend call.
        let provider = Arc::new(ChannelProvider::new());
        let sessions = sessions_with(MemorySessionStorage::new(), &[]);
        let bridge = IdentityBridge::new(sessions.clone(), provider, unreachable_backend());

        bridge
            .on_provider_event(ProviderEvent::SignedIn(Principal::new("u1")))
            .await;

        let session = sessions.current();
        assert!(session.identity.is_none());
        assert!(!session.is_loading(), "failure still resolves the session");
    }

    #[tokio::test]
    async fn test_provider_exchange_failure_never_commits_partial_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channel-login"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let provider = Arc::new(ChannelProvider::new());
        provider.set_token("u1", "bearer");

        let sessions = sessions_with(MemorySessionStorage::new(), &[]);
        let bridge = IdentityBridge::new(sessions.clone(), provider, backend_for(&server));

        bridge
            .on_provider_event(ProviderEvent::SignedIn(
                Principal::new("u1").with_email("a@b.com"),
            ))
            .await;

        assert!(sessions.current().identity.is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_provider_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(mock_login_response("u1", "a@b.com", "tok"))
            .mount(&server)
            .await;

        let storage = MemorySessionStorage::new();
        let provider = Arc::new(ChannelProvider::new());
        provider.fail_sign_out(true);

        let sessions = sessions_with(storage.clone(), &[]);
        let bridge = IdentityBridge::new(sessions.clone(), provider.clone(), backend_for(&server));

        bridge.login("a@b.com", "pw").await.unwrap();
        assert!(sessions.current().identity.is_some());

        bridge.logout().await;
        assert_eq!(provider.sign_out_calls(), 1);
        assert!(sessions.current().identity.is_none());
        assert!(!storage.exists(SESSION_KEY).unwrap());
    }

    #[tokio::test]
    async fn test_provider_sign_out_during_login_last_write_wins() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(mock_login_response("u1", "a@b.com", "tok"))
            .mount(&server)
            .await;

        let sessions = sessions_with(MemorySessionStorage::new(), &[]);
        let bridge = IdentityBridge::new(
            sessions.clone(),
            Arc::new(ChannelProvider::new()),
            backend_for(&server),
        );

        // The provider reports signed-out while the login exchange is in
        // flight; the login completes afterwards and wins.
        bridge.on_provider_event(ProviderEvent::SignedOut).await;
        let identity = bridge.login("a@b.com", "pw").await.unwrap();
        assert_eq!(sessions.current().identity, Some(identity));
    }

    #[tokio::test]
    async fn test_run_with_null_provider_resolves_cached_session() {
        let storage = MemorySessionStorage::new();
        {
            let warm = sessions_with(storage.clone(), &[]);
            warm.set(&Principal::new("u1").with_email("a@b.com"), "tok");
        }

        let sessions = sessions_with(storage, &[]);
        assert!(sessions.current().is_loading());

        let bridge = Arc::new(IdentityBridge::new(
            sessions.clone(),
            Arc::new(NullProvider::new()),
            unreachable_backend(),
        ));
        tokio::spawn(bridge.run());

        let mut rx = sessions.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| !s.is_loading()))
            .await
            .expect("session should resolve")
            .expect("watch channel open");
        assert!(sessions.current().identity.is_some());
    }

    #[tokio::test]
    async fn test_run_drives_events_from_stream() {
        let provider = Arc::new(ChannelProvider::new());
        let sessions = sessions_with(MemorySessionStorage::new(), &[]);
        let bridge = Arc::new(IdentityBridge::new(
            sessions.clone(),
            provider.clone(),
            unreachable_backend(),
        ));
        let handle = tokio::spawn(bridge.run());

        // Give the run loop a moment to subscribe before emitting.
        tokio::time::sleep(Duration::from_millis(20)).await;
        provider.emit(ProviderEvent::SignedOut);

        let mut rx = sessions.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| !s.is_loading()))
            .await
            .expect("event should resolve the session")
            .expect("watch channel open");
        assert!(sessions.current().identity.is_none());
        handle.abort();
    }
}

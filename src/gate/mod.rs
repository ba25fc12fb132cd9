//! Role-gated access decisions for protected routes.
//!
//! The decision itself ([`decide`]) is a pure function of a session snapshot
//! and a guard spec, so every combination of phase, identity, and role is
//! testable without a router. [`RouteGuard`] adapts the decision to axum
//! middleware: allowed requests proceed with the [`Identity`] in request
//! extensions, denied requests are redirected, and unresolved sessions get a
//! placeholder page instead of a premature redirect.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::session::identity::{Identity, Role};
use crate::session::{Session, SessionStore};

/// Declarative guard requirements for one route.
#[derive(Debug, Clone)]
pub struct RouteGuardSpec {
    /// Roles permitted past the gate. Empty means any authenticated identity.
    pub allowed_roles: Vec<Role>,
    /// Redirect target when no identity is present.
    pub redirect_unauthenticated: String,
    /// Redirect target when the identity's role is not permitted.
    pub redirect_unauthorized: String,
}

impl Default for RouteGuardSpec {
    fn default() -> Self {
        Self {
            allowed_roles: Vec::new(),
            redirect_unauthenticated: "/login".to_string(),
            redirect_unauthorized: "/error".to_string(),
        }
    }
}

impl RouteGuardSpec {
    /// Any authenticated identity passes.
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Only the given roles pass.
    pub fn roles(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed_roles: allowed.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn redirect_unauthenticated(mut self, target: impl Into<String>) -> Self {
        self.redirect_unauthenticated = target.into();
        self
    }

    pub fn redirect_unauthorized(mut self, target: impl Into<String>) -> Self {
        self.redirect_unauthorized = target.into();
        self
    }
}

/// Outcome of gating one request against one guard spec.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderDecision {
    /// The session has not resolved; show a placeholder, never redirect.
    Loading,
    /// The identity passed the gate.
    Allowed(Identity),
    /// No identity; redirect to the sign-in page.
    Unauthenticated { redirect: String },
    /// Authenticated but the role is not permitted here.
    Unauthorized { redirect: String },
}

/// Pure gate decision.
///
/// While the session is loading no final decision is possible, so the answer
/// is always [`RenderDecision::Loading`] regardless of the cached identity.
/// A premature redirect here would bounce users with a valid session to the
/// login page on every cold start.
pub fn decide(session: &Session, spec: &RouteGuardSpec) -> RenderDecision {
    if session.is_loading() {
        return RenderDecision::Loading;
    }
    match &session.identity {
        None => RenderDecision::Unauthenticated {
            redirect: spec.redirect_unauthenticated.clone(),
        },
        Some(identity) => {
            if spec.allowed_roles.is_empty() || spec.allowed_roles.contains(&identity.role) {
                RenderDecision::Allowed(identity.clone())
            } else {
                RenderDecision::Unauthorized {
                    redirect: spec.redirect_unauthorized.clone(),
                }
            }
        }
    }
}

/// Served while the session is still resolving. The refresh retries the same
/// URL once the provider has reported.
const LOADING_PAGE: &str = "<!doctype html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"utf-8\">\n  <meta http-equiv=\"refresh\" content=\"1\">\n  <title>Loading</title>\n</head>\n<body>\n  <p>Checking your session&hellip;</p>\n</body>\n</html>\n";

/// Middleware adapter over [`decide`] for one guarded route (or subtree).
#[derive(Clone)]
pub struct RouteGuard {
    sessions: Arc<SessionStore>,
    spec: Arc<RouteGuardSpec>,
}

impl RouteGuard {
    pub fn new(sessions: Arc<SessionStore>, spec: RouteGuardSpec) -> Self {
        Self {
            sessions,
            spec: Arc::new(spec),
        }
    }

    /// Gate one request. Allowed requests carry the [`Identity`] in their
    /// extensions for downstream extractors.
    pub async fn handle(self, mut request: Request, next: Next) -> Response {
        match decide(&self.sessions.current(), &self.spec) {
            RenderDecision::Loading => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                LOADING_PAGE,
            )
                .into_response(),
            RenderDecision::Allowed(identity) => {
                request.extensions_mut().insert(identity);
                next.run(request).await
            }
            RenderDecision::Unauthenticated { redirect }
            | RenderDecision::Unauthorized { redirect } => {
                Redirect::to(&redirect).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPhase;
    use crate::session::identity::Principal;

    fn identity_with_role(role: Role) -> Identity {
        Identity::from_principal(
            &Principal::new("u1").with_email("a@b.com"),
            "tok",
            role,
            "/assets/avatar-default.png",
        )
    }

    fn session(identity: Option<Identity>, phase: SessionPhase) -> Session {
        Session { identity, phase }
    }

    #[test]
    fn test_loading_always_wins() {
        // Even a cached admin identity gets no final answer while loading.
        let cached = session(
            Some(identity_with_role(Role::Admin)),
            SessionPhase::RestoredFromCache,
        );
        let spec = RouteGuardSpec::roles([Role::Admin]);
        assert_eq!(decide(&cached, &spec), RenderDecision::Loading);

        let anonymous = session(None, SessionPhase::RestoredFromCache);
        assert_eq!(decide(&anonymous, &spec), RenderDecision::Loading);
    }

    #[test]
    fn test_anonymous_redirects_to_login() {
        let s = session(None, SessionPhase::ConfirmedByProvider);
        let decision = decide(&s, &RouteGuardSpec::authenticated());
        assert_eq!(
            decision,
            RenderDecision::Unauthenticated {
                redirect: "/login".to_string()
            }
        );
    }

    #[test]
    fn test_wrong_role_redirects_to_error() {
        let s = session(
            Some(identity_with_role(Role::Customer)),
            SessionPhase::ConfirmedByProvider,
        );
        let decision = decide(&s, &RouteGuardSpec::roles([Role::Admin]));
        assert_eq!(
            decision,
            RenderDecision::Unauthorized {
                redirect: "/error".to_string()
            }
        );
    }

    #[test]
    fn test_matching_role_is_allowed() {
        let identity = identity_with_role(Role::Admin);
        let s = session(Some(identity.clone()), SessionPhase::ConfirmedByProvider);
        let decision = decide(&s, &RouteGuardSpec::roles([Role::Admin]));
        assert_eq!(decision, RenderDecision::Allowed(identity));
    }

    #[test]
    fn test_empty_role_list_admits_any_authenticated() {
        let customer = session(
            Some(identity_with_role(Role::Customer)),
            SessionPhase::ConfirmedByProvider,
        );
        let admin = session(
            Some(identity_with_role(Role::Admin)),
            SessionPhase::ConfirmedByProvider,
        );
        let spec = RouteGuardSpec::authenticated();
        assert!(matches!(decide(&customer, &spec), RenderDecision::Allowed(_)));
        assert!(matches!(decide(&admin, &spec), RenderDecision::Allowed(_)));
    }

    #[test]
    fn test_custom_redirect_targets() {
        let spec = RouteGuardSpec::roles([Role::Admin])
            .redirect_unauthenticated("/signin")
            .redirect_unauthorized("/denied");

        let anonymous = session(None, SessionPhase::ConfirmedByProvider);
        assert_eq!(
            decide(&anonymous, &spec),
            RenderDecision::Unauthenticated {
                redirect: "/signin".to_string()
            }
        );

        let customer = session(
            Some(identity_with_role(Role::Customer)),
            SessionPhase::ConfirmedByProvider,
        );
        assert_eq!(
            decide(&customer, &spec),
            RenderDecision::Unauthorized {
                redirect: "/denied".to_string()
            }
        );
    }

    mod middleware {
        use super::*;
        use crate::session::identity::AdminAllowlist;
        use crate::session::storage::MemorySessionStorage;
        use axum::routing::get;
        use axum::{Extension, Router, middleware};
        use tower::ServiceExt;

        async fn whoami(Extension(identity): Extension<Identity>) -> String {
            identity.display_name
        }

        fn guarded_app(store: Arc<SessionStore>, spec: RouteGuardSpec) -> Router {
            let guard = RouteGuard::new(store, spec);
            Router::new().route("/admin", get(whoami)).layer(
                middleware::from_fn(move |req, next| guard.clone().handle(req, next)),
            )
        }

        fn store_with(admins: &[&str]) -> Arc<SessionStore> {
            Arc::new(SessionStore::new(
                Arc::new(MemorySessionStorage::new()),
                AdminAllowlist::new(admins.iter().copied()),
                "/assets/avatar-default.png",
            ))
        }

        async fn get_path(app: Router, path: &str) -> axum::http::Response<axum::body::Body> {
            app.oneshot(
                axum::http::Request::builder()
                    .uri(path)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
        }

        #[tokio::test]
        async fn test_loading_serves_placeholder_not_redirect() {
            let store = store_with(&[]);
            assert!(store.current().is_loading());
            let app = guarded_app(store, RouteGuardSpec::roles([Role::Admin]));

            let response = get_path(app, "/admin").await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(header::LOCATION).is_none());
        }

        #[tokio::test]
        async fn test_anonymous_request_is_redirected() {
            let store = store_with(&[]);
            store.mark_resolved();
            let app = guarded_app(store, RouteGuardSpec::roles([Role::Admin]));

            let response = get_path(app, "/admin").await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(
                response.headers().get(header::LOCATION).unwrap(),
                "/login"
            );
        }

        #[tokio::test]
        async fn test_customer_is_redirected_to_error() {
            let store = store_with(&[]);
            store.set(&Principal::new("u1").with_email("a@b.com"), "tok");
            let app = guarded_app(store, RouteGuardSpec::roles([Role::Admin]));

            let response = get_path(app, "/admin").await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(
                response.headers().get(header::LOCATION).unwrap(),
                "/error"
            );
        }

        #[tokio::test]
        async fn test_admin_passes_and_identity_is_injected() {
            let store = store_with(&["a@b.com"]);
            store.set(
                &Principal::new("u1")
                    .with_email("a@b.com")
                    .with_display_name("Ada"),
                "tok",
            );
            let app = guarded_app(store, RouteGuardSpec::roles([Role::Admin]));

            let response = get_path(app, "/admin").await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = axum::body::to_bytes(response.into_body(), 1024)
                .await
                .unwrap();
            assert_eq!(&body[..], b"Ada");
        }
    }
}

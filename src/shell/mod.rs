//! Server-rendered page shell: route table, navigation chrome, and the
//! login/register/logout form flows.
//!
//! All pages render from embedded minijinja templates. Protected subtrees are
//! wrapped in a [`RouteGuard`] so the gate decision happens before any
//! handler runs; handlers on guarded routes receive the [`Identity`] from
//! request extensions.

pub mod templates;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Extension, Form, Router, middleware};
use minijinja::{Environment, context};
use serde::Deserialize;

use crate::AppState;
use crate::gate::{RouteGuard, RouteGuardSpec};
use crate::session::identity::{Identity, Role};

// ---------------------------------------------------------------------------
// Chrome visibility
// ---------------------------------------------------------------------------

/// Path prefixes whose pages render without the navigation chrome: the
/// credential forms, the error page, and the focused work surfaces.
pub const CHROME_SUPPRESSED: &[&str] = &[
    "/login",
    "/register",
    "/error",
    "/admin",
    "/agent",
    "/customer",
];

/// Whether the navigation chrome is shown on a path. Matches the suppressed
/// entries exactly or as a path-segment prefix, so `/admin/users` is
/// suppressed but `/administrivia` is not.
pub fn chrome_visible(path: &str) -> bool {
    !CHROME_SUPPRESSED.iter().copied().any(|p| {
        path == p
            || path
                .strip_prefix(p)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

// ---------------------------------------------------------------------------
// Template engine
// ---------------------------------------------------------------------------

/// Build a minijinja environment with all embedded templates registered.
fn template_env() -> Environment<'static> {
    let mut env = Environment::new();
    env.add_template("layout", templates::LAYOUT)
        .expect("layout template");
    env.add_template("home", templates::HOME).expect("home template");
    env.add_template("login", templates::LOGIN)
        .expect("login template");
    env.add_template("register", templates::REGISTER)
        .expect("register template");
    env.add_template("account", templates::ACCOUNT)
        .expect("account template");
    env.add_template("customer", templates::CUSTOMER)
        .expect("customer template");
    env.add_template("admin", templates::ADMIN)
        .expect("admin template");
    env.add_template("agent", templates::AGENT)
        .expect("agent template");
    env.add_template("error", templates::ERROR)
        .expect("error template");
    env
}

/// Render a template by name with the given minijinja context.
fn render(template_name: &str, ctx: minijinja::Value) -> Response {
    let env = template_env();
    match env.get_template(template_name) {
        Ok(tmpl) => match tmpl.render(ctx) {
            Ok(html) => Html(html).into_response(),
            Err(err) => {
                tracing::error!(template = template_name, error = %err, "Template render error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html("<h1>Template Error</h1>".to_string()),
                )
                    .into_response()
            }
        },
        Err(err) => {
            tracing::error!(template = template_name, error = %err, "Template not found");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h1>Template Not Found</h1>".to_string()),
            )
                .into_response()
        }
    }
}

/// Template-facing view of an identity. The access token never reaches a
/// template context.
fn user_value(identity: &Identity) -> minijinja::Value {
    context! {
        display_name => identity.display_name,
        email => identity.email,
        avatar_url => identity.avatar_url,
        role => identity.role.as_str(),
    }
}

/// Current identity for unguarded pages (home, the forms). The cached
/// identity is good enough for chrome personalization; gating decisions never
/// come through here.
fn current_user(state: &AppState) -> Option<minijinja::Value> {
    state
        .sessions
        .current()
        .identity
        .as_ref()
        .map(user_value)
}

// ---------------------------------------------------------------------------
// Public router builder
// ---------------------------------------------------------------------------

/// Build the shell router.
///
/// Route table: `/`, `/login`, `/register`, and `/error` are public;
/// `/account` and `/customer` admit any authenticated identity; `/admin` and
/// `/agent` are admin-only.
pub fn build_router(state: AppState) -> Router {
    let authenticated = RouteGuard::new(state.sessions.clone(), RouteGuardSpec::authenticated());
    let admin_only = RouteGuard::new(state.sessions.clone(), RouteGuardSpec::roles([Role::Admin]));

    let member_routes = Router::new()
        .route("/account", get(account_page))
        .route("/customer", get(customer_page))
        .layer(middleware::from_fn(move |req, next| {
            authenticated.clone().handle(req, next)
        }));

    let admin_routes = Router::new()
        .route("/admin", get(admin_page))
        .route("/agent", get(agent_page))
        .layer(middleware::from_fn(move |req, next| {
            admin_only.clone().handle(req, next)
        }));

    Router::new()
        .route("/", get(home_page))
        .route("/login", get(login_page).post(login_submit))
        .route("/register", get(register_page).post(register_submit))
        .route("/logout", post(logout_submit))
        .route("/error", get(error_page))
        .merge(member_routes)
        .merge(admin_routes)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Page handlers
// ---------------------------------------------------------------------------

async fn home_page(State(state): State<AppState>) -> Response {
    render(
        "home",
        context! { chrome => chrome_visible("/"), user => current_user(&state) },
    )
}

async fn login_page() -> Response {
    render("login", context! { chrome => chrome_visible("/login") })
}

async fn register_page() -> Response {
    render("register", context! { chrome => chrome_visible("/register") })
}

async fn error_page() -> Response {
    render("error", context! { chrome => chrome_visible("/error") })
}

async fn account_page(Extension(identity): Extension<Identity>) -> Response {
    render(
        "account",
        context! { chrome => chrome_visible("/account"), user => user_value(&identity) },
    )
}

async fn customer_page(Extension(identity): Extension<Identity>) -> Response {
    render(
        "customer",
        context! { chrome => chrome_visible("/customer"), user => user_value(&identity) },
    )
}

async fn admin_page(Extension(identity): Extension<Identity>) -> Response {
    render(
        "admin",
        context! { chrome => chrome_visible("/admin"), user => user_value(&identity) },
    )
}

async fn agent_page(Extension(identity): Extension<Identity>) -> Response {
    render(
        "agent",
        context! { chrome => chrome_visible("/agent"), user => user_value(&identity) },
    )
}

// ---------------------------------------------------------------------------
// Form handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct RegisterForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// Handle the login form. On success redirect to the account page; on
/// failure re-render the form with the error message (the backend's own
/// message where it provided one).
async fn login_submit(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match state.bridge.login(&form.email, &form.password).await {
        Ok(_) => Redirect::to("/account").into_response(),
        Err(err) => {
            let mut response = render(
                "login",
                context! {
                    chrome => chrome_visible("/login"),
                    error => err.to_string(),
                    email => form.email,
                },
            );
            *response.status_mut() = err.status_code();
            response
        }
    }
}

/// Handle the registration form. Same redirect/re-render contract as login.
async fn register_submit(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Response {
    match state
        .bridge
        .register(&form.name, &form.email, &form.password)
        .await
    {
        Ok(_) => Redirect::to("/account").into_response(),
        Err(err) => {
            let mut response = render(
                "register",
                context! {
                    chrome => chrome_visible("/register"),
                    error => err.to_string(),
                    name => form.name,
                    email => form.email,
                },
            );
            *response.status_mut() = err.status_code();
            response
        }
    }
}

async fn logout_submit(State(state): State<AppState>) -> Response {
    state.bridge.logout().await;
    Redirect::to("/").into_response()
}

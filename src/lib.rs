pub mod bridge;
pub mod config;
pub mod error;
pub mod gate;
pub mod session;
pub mod shell;

use std::sync::Arc;

use crate::bridge::IdentityBridge;
use crate::config::Config;
use crate::session::SessionStore;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub bridge: Arc<IdentityBridge>,
}

//! The process-wide session: at most one authenticated identity, observable
//! through a watch channel, persisted across restarts.
//!
//! # Two-phase loading
//!
//! At construction the store synchronously restores the last persisted
//! identity so the very first render has a best-effort identity without
//! waiting on the network. The session stays in
//! [`SessionPhase::RestoredFromCache`] until the identity provider reports
//! for the first time (or the bridge decides no provider will); until then no
//! authorization decision is final.
//!
//! # Consistency
//!
//! Every mutation persists to durable storage before notifying subscribers,
//! under a single write lock, so interleaved `set`/`clear` calls are each
//! atomic with respect to storage and the last completed write wins.

pub mod identity;
pub mod storage;

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::session::identity::{AdminAllowlist, Identity, Principal};
use crate::session::storage::{SESSION_KEY, SessionStorage, TOKEN_KEY};

/// Whether the current identity has been confirmed by the provider stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Only the persisted cache has been consulted; the provider has not yet
    /// reported. Equivalent to `isLoading == true`.
    RestoredFromCache,
    /// The first provider resolution (or an explicit login/logout) has
    /// completed.
    ConfirmedByProvider,
}

/// Observable snapshot of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub phase: SessionPhase,
}

impl Session {
    pub fn is_loading(&self) -> bool {
        self.phase == SessionPhase::RestoredFromCache
    }

    /// Role of the current caller; `Guest` when unauthenticated.
    pub fn role(&self) -> identity::Role {
        self.identity
            .as_ref()
            .map_or(identity::Role::Guest, |id| id.role)
    }
}

/// Single source of truth for the current [`Identity`].
///
/// Owned by the application root and shared via `Arc`; tests construct
/// isolated instances over a [`storage::MemorySessionStorage`].
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    allowlist: AdminAllowlist,
    default_avatar: String,
    /// Serializes persist-then-notify sequences so each mutation is atomic
    /// with respect to storage.
    write_lock: Mutex<()>,
    tx: watch::Sender<Session>,
}

impl SessionStore {
    /// Create the store, synchronously restoring the persisted identity.
    ///
    /// Absent, unreadable, or malformed persisted records all restore as "no
    /// session" and never propagate an error.
    pub fn new(
        storage: Arc<dyn SessionStorage>,
        allowlist: AdminAllowlist,
        default_avatar: impl Into<String>,
    ) -> Self {
        let restored = restore_identity(storage.as_ref(), &allowlist);
        if let Some(identity) = &restored {
            debug!(user_id = %identity.id, "Session restored from cache");
        }
        let (tx, _rx) = watch::channel(Session {
            identity: restored,
            phase: SessionPhase::RestoredFromCache,
        });
        Self {
            storage,
            allowlist,
            default_avatar: default_avatar.into(),
            write_lock: Mutex::new(()),
            tx,
        }
    }

    /// Current snapshot. Readers must use this (or [`subscribe`]) and never
    /// reach into storage directly.
    ///
    /// [`subscribe`]: SessionStore::subscribe
    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    /// Watch receiver notified on every `set`/`clear`/`mark_resolved`.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Commit an authenticated principal with its application token.
    ///
    /// The role is derived from the allow-list rule; the merged record is
    /// persisted (both the identity record and the raw token key) before
    /// subscribers are notified. Also confirms the session.
    pub fn set(&self, principal: &Principal, token: &str) -> Identity {
        let role = self.allowlist.role_for(principal.email.as_deref());
        let identity = Identity::from_principal(principal, token, role, &self.default_avatar);

        let _guard = self.write_lock.lock().expect("session write lock poisoned");
        self.persist(&identity);
        self.tx.send_replace(Session {
            identity: Some(identity.clone()),
            phase: SessionPhase::ConfirmedByProvider,
        });
        info!(user_id = %identity.id, role = %identity.role, "Session established");
        identity
    }

    /// Remove the identity from memory and storage. Idempotent. Also
    /// confirms the session (a cleared session is a resolved one).
    pub fn clear(&self) {
        let _guard = self.write_lock.lock().expect("session write lock poisoned");
        for key in [SESSION_KEY, TOKEN_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Failed to delete persisted session key");
            }
        }
        let had_identity = self.tx.borrow().identity.is_some();
        self.tx.send_replace(Session {
            identity: None,
            phase: SessionPhase::ConfirmedByProvider,
        });
        if had_identity {
            info!("Session cleared");
        }
    }

    /// Flip the loading flag without touching the identity. Used when the
    /// provider's first resolution confirms the cached state, or when no
    /// provider is configured at all.
    pub fn mark_resolved(&self) {
        let _guard = self.write_lock.lock().expect("session write lock poisoned");
        self.tx.send_if_modified(|session| {
            if session.phase == SessionPhase::RestoredFromCache {
                session.phase = SessionPhase::ConfirmedByProvider;
                true
            } else {
                false
            }
        });
    }

    /// Persistence failures are logged and swallowed: the in-memory session
    /// stays authoritative, and the next successful write repairs storage.
    fn persist(&self, identity: &Identity) {
        match serde_json::to_string(identity) {
            Ok(json) => {
                if let Err(e) = self.storage.save(SESSION_KEY, &json) {
                    warn!(error = %e, "Failed to persist session record");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize session record"),
        }
        if let Err(e) = self.storage.save(TOKEN_KEY, &identity.access_token) {
            warn!(error = %e, "Failed to persist token");
        }
    }
}

/// Read and parse the persisted identity, treating every failure mode as "no
/// session". The stored role is discarded and re-derived from the allow-list
/// so a tampered record never grants access.
fn restore_identity(storage: &dyn SessionStorage, allowlist: &AdminAllowlist) -> Option<Identity> {
    let raw = match storage.load(SESSION_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "Failed to read persisted session, treating as none");
            return None;
        }
    };

    match serde_json::from_str::<Identity>(&raw) {
        Ok(mut identity) => {
            identity.role = allowlist.role_for(identity.email.as_deref());
            Some(identity)
        }
        Err(e) => {
            warn!(error = %e, "Persisted session is malformed, treating as none");
            None
        }
    }
}

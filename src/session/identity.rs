//! Identity, role derivation, and the provider principal.
//!
//! The role is always *derived* here from the identity's email against the
//! configured admin allow-list. No client-visible payload (provider principal
//! or backend response) is ever trusted to carry a role claim.

use serde::{Deserialize, Serialize};

/// Authorization tier derived from an Identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// No identity at all.
    Guest,
    /// Default for any authenticated identity.
    Customer,
    /// Email matches a configured admin entry.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured set of admin emails.
///
/// Generalizes a single hardcoded address to an injectable set so the rule is
/// testable. Matching is a case-sensitive exact comparison.
#[derive(Debug, Clone, Default)]
pub struct AdminAllowlist {
    emails: Vec<String>,
}

impl AdminAllowlist {
    pub fn new(emails: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            emails: emails.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, email: &str) -> bool {
        self.emails.iter().any(|e| e == email)
    }

    /// Derive the role for an authenticated identity.
    ///
    /// Returns `Admin` iff the email exactly matches an allow-list entry,
    /// `Customer` otherwise. Identities without an email are customers.
    pub fn role_for(&self, email: Option<&str>) -> Role {
        match email {
            Some(e) if self.contains(e) => Role::Admin,
            _ => Role::Customer,
        }
    }
}

/// The identity provider's representation of an authenticated user, as
/// delivered to the application. Also produced from the backend's user record
/// after a credential exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque stable identifier from the provider.
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            display_name: None,
            avatar_url: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

/// An authenticated principal as the application sees it.
///
/// The whole record (including the token) is what gets persisted; the role is
/// re-derived from the allow-list on every set and on restore, so a stale or
/// tampered stored role never grants access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub display_name: String,
    pub avatar_url: String,
    /// Opaque bearer credential for the application backend.
    pub access_token: String,
    pub role: Role,
}

impl Identity {
    /// Build an Identity from a principal, applying the documented fallbacks:
    /// display name falls back to the local part of the email (then to the
    /// id), avatar falls back to the configured default asset.
    pub fn from_principal(
        principal: &Principal,
        access_token: impl Into<String>,
        role: Role,
        default_avatar: &str,
    ) -> Self {
        let display_name = principal
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                principal
                    .email
                    .as_deref()
                    .map(|e| e.split('@').next().unwrap_or(e).to_string())
            })
            .unwrap_or_else(|| principal.id.clone());

        let avatar_url = principal
            .avatar_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| default_avatar.to_string());

        Self {
            id: principal.id.clone(),
            email: principal.email.clone(),
            display_name,
            avatar_url,
            access_token: access_token.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

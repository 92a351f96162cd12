#![warn(missing_docs)]
//! # spa-auth-access
//!
//! ## Purpose
//! Role-based gating for view-layer collaborators.
//!
//! ## Responsibilities
//! - Provide the pure [`is_authorized`] predicate over a [`UserProfile`].
//! - Project a [`SessionSnapshot`] through the standard [`Gate`]s.
//! - Map login/register/logout controls onto session operations.
//!
//! ## Data flow
//! [`spa_auth_session::AuthSession::snapshot`] -> [`Gate::allows`] -> render or
//! hide. Controls call [`AuthAction::perform`] and hand the returned
//! [`Redirect`] to the host.
//!
//! ## Ownership and lifetimes
//! Predicates borrow the profile/snapshot; nothing here holds session state.
//!
//! ## Error model
//! Predicates are infallible. [`AuthAction::perform`] propagates
//! [`AuthError`] from the session.
//!
//! ## Security and privacy notes
//! Gating is a presentation concern. The backend must enforce authorization
//! independently.

use spa_auth_core::{Redirect, UserProfile};
use spa_auth_session::{AuthError, AuthSession, SessionSnapshot};

/// Returns `true` when someone is logged in and, if `required_role` is given,
/// holds that role.
///
/// A role matches the `role` attribute or any entry of the `roles`
/// collection.
pub fn is_authorized(user: &UserProfile, required_role: Option<&str>) -> bool {
    if user.is_empty() {
        return false;
    }

    match required_role {
        Some(role) => has_role(user, role),
        None => true,
    }
}

/// Returns `true` when `user` holds `role` through either role claim.
pub fn has_role(user: &UserProfile, role: &str) -> bool {
    user.role() == Some(role) || user.roles().contains(&role)
}

/// Rendering condition for a gated region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Visible when a user is known and optionally holds one role.
    Authorization {
        /// Required role, if any.
        role: Option<String>,
    },
    /// Visible when authenticated and holding any listed role (empty list
    /// means no role requirement).
    RequireAuth {
        /// Accepted roles.
        roles: Vec<String>,
    },
    /// Visible only while nobody is authenticated.
    Unauthenticated,
}

impl Gate {
    /// Evaluates the gate against a session snapshot.
    pub fn allows(&self, snapshot: &SessionSnapshot) -> bool {
        match self {
            Self::Authorization { role } => is_authorized(&snapshot.user, role.as_deref()),
            Self::RequireAuth { roles } => {
                snapshot.is_authenticated
                    && (roles.is_empty() || roles.iter().any(|role| has_role(&snapshot.user, role)))
            }
            Self::Unauthenticated => !snapshot.is_authenticated,
        }
    }
}

/// Session operation bound to a view control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    /// Login with caller state.
    Login {
        /// State echoed back to the success hook.
        state: String,
    },
    /// Register with caller state.
    Register {
        /// State echoed back to the success hook.
        state: String,
    },
    /// Logout.
    Logout,
}

impl AuthAction {
    /// Default caption for the control.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Login { .. } => "Login",
            Self::Register { .. } => "Register Now",
            Self::Logout => "Logout",
        }
    }

    /// Runs the operation and returns the navigation target.
    ///
    /// # Errors
    /// Propagates [`AuthError`] from the session.
    pub async fn perform(&self, session: &AuthSession) -> Result<Redirect, AuthError> {
        match self {
            Self::Login { state } => session.login(state),
            Self::Register { state } => session.register(state),
            Self::Logout => session.logout().await,
        }
    }
}

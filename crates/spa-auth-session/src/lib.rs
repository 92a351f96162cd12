#![warn(missing_docs)]
//! # spa-auth-session
//!
//! ## Purpose
//! Implements the browser-side authentication session: redirects out to the
//! identity provider, completion of the redirect round trip, rehydration from
//! cookies, and pull-based token refresh.
//!
//! ## Responsibilities
//! - Issue login/register/logout [`Redirect`]s with CSRF state and PKCE.
//! - Complete an authorization-code redirect only when the returned `state`
//!   matches the pending one.
//! - Rehydrate the user from the `user` cookie or the backend `me` endpoint,
//!   exactly once per mount.
//! - De-duplicate concurrent refresh calls.
//!
//! ## Data flow
//! Page load -> [`AuthSession::mount`] reads the URL query and cookies ->
//! [`BackendTransport`] exchange or fetch -> in-memory [`SessionSnapshot`]
//! updated -> redirect hooks fire once.
//!
//! ## Ownership and lifetimes
//! One [`AuthSession`] per mounted host owns the in-memory state. Cookies,
//! transport, and randomness are shared collaborators behind `Arc`. No
//! lock is held across an `.await`.
//!
//! ## Error model
//! Failures during mount are routed to [`RedirectHooks`] and logged; they never
//! escape [`AuthSession::mount`]. Caller-facing operations return
//! [`AuthError`] only for construction and URL-building faults, plus
//! backend errors for [`AuthSession::refresh_token`].
//!
//! ## Security and privacy notes
//! Codes, verifiers, nonces, and cookie values are never logged. A redirect
//! whose `state` does not match the pending value never reaches the backend.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use spa_auth_core::{MemoryCookieStore, SessionConfig, UserProfile};
//! use spa_auth_session::{
//!     AuthError, AuthSession, BackendTransport, TokenExchangeRequest, TokenExchangeResponse,
//! };
//! use url::Url;
//!
//! struct Offline;
//!
//! #[async_trait]
//! impl BackendTransport for Offline {
//!     async fn exchange_code(
//!         &self,
//!         _endpoint: &Url,
//!         _request: &TokenExchangeRequest,
//!     ) -> Result<TokenExchangeResponse, AuthError> {
//!         Err(AuthError::Transport("offline".to_string()))
//!     }
//!     async fn fetch_user(&self, _endpoint: &Url) -> Result<UserProfile, AuthError> {
//!         Err(AuthError::Transport("offline".to_string()))
//!     }
//!     async fn refresh(&self, _endpoint: &Url) -> Result<(), AuthError> {
//!         Ok(())
//!     }
//!     async fn logout(&self, _endpoint: &Url) -> Result<(), AuthError> {
//!         Ok(())
//!     }
//! }
//!
//! let config = SessionConfig::new(
//!     "https://idp.example.test",
//!     "client",
//!     "https://api.example.test",
//!     "https://app.example.test",
//! );
//! let session = AuthSession::new(config, Arc::new(Offline), Arc::new(MemoryCookieStore::new()))
//!     .unwrap();
//! let redirect = session.login("after-login").unwrap();
//! assert!(redirect.as_str().starts_with("https://idp.example.test/oauth2/authorize?"));
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spa_auth_core::{CookieStore, CoreError, LoginTarget, Redirect, SessionConfig, UserProfile};
use spa_auth_pkce::{RandomSource, ThreadRandom, generate_pkce, random_identifier};
use spa_auth_urls::{
    AuthorizeParams, RedirectKind, UrlBuildError, authorize_url, logout_url, server_url,
};
use thiserror::Error;
use url::Url;

/// Body posted to the backend token-exchange endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenExchangeRequest {
    /// Authorization code returned by the provider.
    pub code: String,
    /// PKCE verifier written before the redirect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    /// OAuth client identifier.
    pub client_id: String,
    /// Redirect URI the code was issued for.
    pub redirect_uri: String,
}

/// Successful token-exchange response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenExchangeResponse {
    /// Authenticated principal.
    pub user: UserProfile,
}

/// Backend calls made by the session.
///
/// Implementations send browser credentials (cookies) with every request and
/// map non-success HTTP statuses to [`AuthError::Status`].
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Redeems an authorization code.
    async fn exchange_code(
        &self,
        endpoint: &Url,
        request: &TokenExchangeRequest,
    ) -> Result<TokenExchangeResponse, AuthError>;

    /// Fetches the current user profile.
    async fn fetch_user(&self, endpoint: &Url) -> Result<UserProfile, AuthError>;

    /// Asks the backend to refresh the access token.
    async fn refresh(&self, endpoint: &Url) -> Result<(), AuthError>;

    /// Notifies the backend of logout.
    async fn logout(&self, endpoint: &Url) -> Result<(), AuthError>;
}

type SuccessHook = Arc<dyn Fn(&str) + Send + Sync>;
type FailureHook = Arc<dyn Fn(&AuthError) + Send + Sync>;

/// Callbacks fired when a redirect round trip resolves.
#[derive(Clone, Default)]
pub struct RedirectHooks {
    on_success: Option<SuccessHook>,
    on_failure: Option<FailureHook>,
}

impl RedirectHooks {
    /// Creates hooks that do nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the caller-supplied state after a successful round trip.
    pub fn on_success(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Called once per failed round trip.
    pub fn on_failure(mut self, hook: impl Fn(&AuthError) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    fn notify_success(&self, caller_state: &str) {
        if let Some(hook) = &self.on_success {
            hook(caller_state);
        }
    }

    fn notify_failure(&self, error: &AuthError) {
        if let Some(hook) = &self.on_failure {
            hook(error);
        }
    }
}

impl fmt::Debug for RedirectHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectHooks")
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

/// Coarse position in the authentication flow for this page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// No session is known.
    Unauthenticated,
    /// A login/register redirect was issued from this context.
    PendingRedirect,
    /// A code exchange or profile fetch is in flight.
    ExchangingOrFetching,
    /// A user is known.
    Authenticated,
    /// The last round trip failed. The user is treated as unauthenticated.
    Failed,
}

/// Read-only view of the session for view-layer collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Current user; empty when unknown.
    pub user: UserProfile,
    /// Explicitly tracked authentication flag.
    pub is_authenticated: bool,
    /// `true` while any backend round trip is outstanding.
    pub is_loading: bool,
    /// Flow position.
    pub phase: AuthPhase,
}

/// What [`AuthSession::mount`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// Mount already ran for this session.
    AlreadyMounted,
    /// No session evidence; nothing was fetched.
    Anonymous,
    /// User adopted from the `user` cookie.
    CachedUser,
    /// User fetched from the backend `me` endpoint.
    FetchedUser,
    /// Authorization code exchanged for a user.
    Exchanged,
    /// Returned `state` did not match the pending state.
    Rejected,
    /// Backend or provider failure.
    Failed,
}

/// What [`AuthSession::refresh_token`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Access token is not close to expiry.
    NotNeeded,
    /// Refresh request completed.
    Refreshed,
    /// Another refresh was already in flight; this call waited for it.
    Joined,
}

/// Backend error categories surfaced to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// 5xx from the backend.
    Server,
    /// Refresh rejected with 401/403.
    InvalidRefreshToken,
    /// 404 from the backend.
    NotFound,
    /// Anything else.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MountProgress {
    Idle,
    Running,
    Done,
}

#[derive(Debug)]
struct SessionState {
    user: UserProfile,
    is_authenticated: bool,
    in_flight: usize,
    phase: AuthPhase,
}

impl SessionState {
    fn fresh() -> Self {
        Self {
            user: UserProfile::new(),
            is_authenticated: false,
            in_flight: 0,
            phase: AuthPhase::Unauthenticated,
        }
    }
}

/// Query parameters that signal the end of a provider redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthParams {
    /// `code` parameter.
    pub code: Option<String>,
    /// `state` parameter.
    pub state: Option<String>,
    /// `error` parameter.
    pub error: Option<String>,
}

impl AuthParams {
    /// Extracts auth parameters from a page URL.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    /// Returns `true` when any of `code`, `state`, `error` is present.
    pub fn is_present(&self) -> bool {
        self.code.is_some() || self.state.is_some() || self.error.is_some()
    }
}

/// Shared handle given to view-layer collaborators.
pub type AuthHandle = Arc<AuthSession>;

/// Authentication session state machine.
pub struct AuthSession {
    config: SessionConfig,
    hooks: RedirectHooks,
    transport: Arc<dyn BackendTransport>,
    cookies: Arc<dyn CookieStore>,
    random: Arc<dyn RandomSource>,
    state: Mutex<SessionState>,
    mount: Mutex<MountProgress>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl AuthSession {
    /// Creates a session in the `Unauthenticated` phase.
    ///
    /// # Errors
    /// Returns [`AuthError::Config`] when `config` fails validation.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn BackendTransport>,
        cookies: Arc<dyn CookieStore>,
    ) -> Result<Self, AuthError> {
        config.validate()?;

        Ok(Self {
            config,
            hooks: RedirectHooks::default(),
            transport,
            cookies,
            random: Arc::new(ThreadRandom),
            state: Mutex::new(SessionState::fresh()),
            mount: Mutex::new(MountProgress::Idle),
            refresh_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Installs redirect hooks.
    pub fn with_hooks(mut self, hooks: RedirectHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Replaces the randomness source used for nonces and verifiers.
    pub fn with_random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns a copy of the observable state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock_state();
        SessionSnapshot {
            user: state.user.clone(),
            is_authenticated: state.is_authenticated,
            is_loading: state.in_flight > 0,
            phase: state.phase,
        }
    }

    /// Returns the current user.
    pub fn user(&self) -> UserProfile {
        self.lock_state().user.clone()
    }

    /// Returns `true` once a user has been established.
    pub fn is_authenticated(&self) -> bool {
        self.lock_state().is_authenticated
    }

    /// Returns `true` while a backend call is outstanding.
    pub fn is_loading(&self) -> bool {
        self.lock_state().in_flight > 0
    }

    /// Returns the current flow phase.
    pub fn phase(&self) -> AuthPhase {
        self.lock_state().phase
    }

    /// Starts a login redirect.
    ///
    /// Writes the pending state (and PKCE verifier) cookies, then returns the
    /// navigation target. A previous pending login is superseded.
    ///
    /// # Errors
    /// Returns [`AuthError::Url`] when the redirect URL cannot be built. No
    /// cookies are written in that case.
    pub fn login(&self, caller_state: &str) -> Result<Redirect, AuthError> {
        self.begin_redirect(RedirectKind::Login, caller_state)
    }

    /// Starts a registration redirect. Same contract as [`AuthSession::login`].
    ///
    /// # Errors
    /// Returns [`AuthError::Url`] when the redirect URL cannot be built.
    pub fn register(&self, caller_state: &str) -> Result<Redirect, AuthError> {
        self.begin_redirect(RedirectKind::Register, caller_state)
    }

    fn begin_redirect(&self, kind: RedirectKind, caller_state: &str) -> Result<Redirect, AuthError> {
        let nonce = random_identifier(self.random.as_ref());
        let pending_state = format!("{nonce}:{caller_state}");

        let pkce = (self.config.use_pkce
            && self.config.login_target == LoginTarget::IdentityProvider)
            .then(|| generate_pkce(self.random.as_ref()));

        let url = authorize_url(
            &self.config,
            kind,
            AuthorizeParams {
                state: &pending_state,
                code_challenge: pkce.as_ref().map(|pair| pair.challenge.as_str()),
            },
        )?;

        let names = &self.config.cookies;
        self.cookies.set(&names.pending_state, &pending_state);
        match &pkce {
            Some(pair) => self.cookies.set(&names.code_verifier, &pair.verifier),
            None => self.cookies.remove(&names.code_verifier),
        }

        self.lock_state().phase = AuthPhase::PendingRedirect;
        tracing::info!(
            kind = ?kind,
            login_target = ?self.config.login_target,
            pkce = pkce.is_some(),
            "issuing auth redirect"
        );

        Ok(Redirect::new(url))
    }

    /// Ends the session and returns the provider logout redirect.
    ///
    /// Clears the `user`, pending-state, and verifier cookies, then notifies
    /// the backend within the request timeout. A failed notification is
    /// logged and does not stop the redirect.
    ///
    /// # Errors
    /// Returns [`AuthError::Url`] when a logout URL cannot be built.
    pub async fn logout(&self) -> Result<Redirect, AuthError> {
        let names = &self.config.cookies;
        let hint = self
            .config
            .id_token_hint
            .clone()
            .or_else(|| self.cookies.get(&names.id_token));

        self.cookies.remove(&names.user);
        self.cookies.remove(&names.pending_state);
        self.cookies.remove(&names.code_verifier);
        {
            let mut state = self.lock_state();
            state.user = UserProfile::new();
            state.is_authenticated = false;
            state.phase = AuthPhase::Unauthenticated;
        }

        let redirect = logout_url(&self.config, hint.as_deref())?;
        let endpoint = server_url(&self.config, &self.config.paths.logout)?;

        let notified = {
            let _loading = self.begin_loading();
            self.with_timeout(self.transport.logout(&endpoint)).await
        };
        match notified {
            Ok(()) => tracing::info!("backend acknowledged logout"),
            Err(error) => tracing::warn!(%error, "backend logout notification failed"),
        }

        Ok(Redirect::new(redirect))
    }

    /// Refreshes the access token if it is near expiry, using the wall clock.
    ///
    /// # Errors
    /// See [`AuthSession::refresh_token_at`].
    pub async fn refresh_token(&self) -> Result<RefreshOutcome, AuthError> {
        self.refresh_token_at(unix_time_ms()).await
    }

    /// Refreshes the access token if it is near expiry at `now_ms`.
    ///
    /// Refresh is due when the expiry cookie is absent, unparseable, or earlier
    /// than `now_ms + refresh_lead_ms`. A call made while another refresh is in
    /// flight waits for it and returns [`RefreshOutcome::Joined`] without a
    /// second request.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidRefreshToken`] on 401/403, or the
    /// transport/timeout error otherwise.
    pub async fn refresh_token_at(&self, now_ms: u64) -> Result<RefreshOutcome, AuthError> {
        let _gate = match self.refresh_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                let _joined = self.refresh_gate.lock().await;
                tracing::debug!("joined in-flight token refresh");
                return Ok(RefreshOutcome::Joined);
            }
        };

        if !self.refresh_due(now_ms) {
            return Ok(RefreshOutcome::NotNeeded);
        }

        let endpoint = server_url(&self.config, &self.config.paths.token_refresh)?;
        let result = {
            let _loading = self.begin_loading();
            self.with_timeout(self.transport.refresh(&endpoint)).await
        };

        match result {
            Ok(()) => {
                tracing::debug!("access token refreshed");
                Ok(RefreshOutcome::Refreshed)
            }
            Err(AuthError::Status(status @ (401 | 403))) => {
                tracing::warn!(status, "refresh token rejected");
                Err(AuthError::InvalidRefreshToken)
            }
            Err(error) => {
                tracing::warn!(%error, "token refresh failed");
                Err(error)
            }
        }
    }

    fn refresh_due(&self, now_ms: u64) -> bool {
        let Some(raw) = self.cookies.get(&self.config.cookies.access_token_expires) else {
            return true;
        };

        match raw.trim().parse::<u64>() {
            Ok(expires_at_ms) => expires_at_ms < now_ms.saturating_add(self.config.refresh_lead_ms),
            Err(_) => true,
        }
    }

    /// Re-derives session state for this page load.
    ///
    /// Runs at most once per session; later calls return
    /// [`MountOutcome::AlreadyMounted`]. Precedence:
    /// 1. `code` (or `error`) in `current_url` with a pending state cookie:
    ///    complete the redirect round trip.
    /// 2. A parseable `user` cookie: adopt it without a backend call. A
    ///    malformed one is discarded.
    /// 3. An ID-token or access-token-expiry cookie: fetch the profile.
    /// 4. Otherwise stay anonymous.
    pub async fn mount(&self, current_url: &Url) -> MountOutcome {
        {
            let mut progress = self.mount.lock().unwrap_or_else(PoisonError::into_inner);
            if *progress != MountProgress::Idle {
                tracing::debug!("mount already attempted for this session");
                return MountOutcome::AlreadyMounted;
            }
            *progress = MountProgress::Running;
        }

        let outcome = self.rehydrate(current_url).await;

        *self.mount.lock().unwrap_or_else(PoisonError::into_inner) = MountProgress::Done;
        tracing::info!(outcome = ?outcome, "session mounted");
        outcome
    }

    async fn rehydrate(&self, current_url: &Url) -> MountOutcome {
        let names = &self.config.cookies;
        let params = AuthParams::from_url(current_url);
        let pending = self.cookies.get(&names.pending_state);

        if let Some(pending) = pending.as_deref() {
            if let Some(code) = params.code.as_deref() {
                return self.complete_exchange(code, params.state.as_deref(), pending).await;
            }
            if let Some(error) = params.error.as_deref() {
                self.clear_transient_cookies();
                self.fail(AuthError::Provider(error.to_string()));
                return MountOutcome::Failed;
            }
        } else if params.is_present() {
            tracing::debug!("auth params present without a pending state; ignoring");
        }

        if let Some(raw) = self.cookies.get(&names.user) {
            match UserProfile::from_cookie_value(&raw) {
                Some(user) => {
                    self.adopt_user(user, false);
                    return MountOutcome::CachedUser;
                }
                None => {
                    tracing::debug!("discarding malformed user cookie");
                    self.cookies.remove(&names.user);
                }
            }
        }

        let logged_in = self.cookies.get(&names.id_token).is_some()
            || self.cookies.get(&names.access_token_expires).is_some();
        if logged_in {
            return self.fetch_profile(pending.as_deref()).await;
        }

        MountOutcome::Anonymous
    }

    async fn complete_exchange(
        &self,
        code: &str,
        returned_state: Option<&str>,
        pending: &str,
    ) -> MountOutcome {
        if returned_state != Some(pending) {
            tracing::warn!("returned state does not match pending state; refusing exchange");
            self.clear_transient_cookies();
            self.fail(AuthError::StateMismatch);
            return MountOutcome::Rejected;
        }

        let pkce_expected =
            self.config.use_pkce && self.config.login_target == LoginTarget::IdentityProvider;
        let code_verifier = self.cookies.get(&self.config.cookies.code_verifier);
        if pkce_expected && code_verifier.is_none() {
            self.clear_transient_cookies();
            self.fail(AuthError::MissingCodeVerifier);
            return MountOutcome::Failed;
        }

        let endpoint = match server_url(&self.config, &self.config.paths.token_exchange) {
            Ok(endpoint) => endpoint,
            Err(error) => {
                self.clear_transient_cookies();
                self.fail(error.into());
                return MountOutcome::Failed;
            }
        };
        let request = TokenExchangeRequest {
            code: code.to_string(),
            code_verifier,
            client_id: self.config.client_id.clone(),
            redirect_uri: self.config.redirect_uri.clone(),
        };

        self.lock_state().phase = AuthPhase::ExchangingOrFetching;
        let result = {
            let _loading = self.begin_loading();
            self.with_timeout(self.transport.exchange_code(&endpoint, &request))
                .await
        };
        self.clear_transient_cookies();

        match result {
            Ok(response) => {
                self.adopt_user(response.user, true);
                self.hooks.notify_success(caller_state(pending));
                MountOutcome::Exchanged
            }
            Err(error) => {
                self.fail(error);
                MountOutcome::Failed
            }
        }
    }

    async fn fetch_profile(&self, pending: Option<&str>) -> MountOutcome {
        let endpoint = match server_url(&self.config, &self.config.paths.me) {
            Ok(endpoint) => endpoint,
            Err(error) => {
                self.fail_fetch(error.into(), pending);
                return MountOutcome::Failed;
            }
        };

        self.lock_state().phase = AuthPhase::ExchangingOrFetching;
        let result = {
            let _loading = self.begin_loading();
            self.with_timeout(self.transport.fetch_user(&endpoint)).await
        };

        match result {
            Ok(user) => {
                self.adopt_user(user, true);
                if let Some(pending) = pending {
                    self.clear_transient_cookies();
                    self.hooks.notify_success(caller_state(pending));
                }
                MountOutcome::FetchedUser
            }
            Err(error) => {
                self.fail_fetch(error, pending);
                MountOutcome::Failed
            }
        }
    }

    fn fail_fetch(&self, error: AuthError, pending: Option<&str>) {
        if pending.is_some() {
            self.clear_transient_cookies();
            self.fail(error);
        } else {
            tracing::warn!(%error, "profile fetch failed");
            self.mark_failed();
        }
    }

    fn adopt_user(&self, user: UserProfile, persist: bool) {
        if persist {
            match user.to_cookie_value() {
                Ok(raw) => self.cookies.set(&self.config.cookies.user, &raw),
                Err(error) => tracing::warn!(%error, "could not persist user cookie"),
            }
        }

        let mut state = self.lock_state();
        state.user = user;
        state.is_authenticated = true;
        state.phase = AuthPhase::Authenticated;
    }

    fn fail(&self, error: AuthError) {
        tracing::warn!(%error, "auth redirect failed");
        self.mark_failed();
        self.hooks.notify_failure(&error);
    }

    fn mark_failed(&self) {
        let mut state = self.lock_state();
        state.user = UserProfile::new();
        state.is_authenticated = false;
        state.phase = AuthPhase::Failed;
    }

    fn clear_transient_cookies(&self) {
        self.cookies.remove(&self.config.cookies.pending_state);
        self.cookies.remove(&self.config.cookies.code_verifier);
    }

    async fn with_timeout<T>(
        &self,
        request: impl Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        let limit = self.config.request_timeout;
        tokio::time::timeout(limit, request)
            .await
            .map_err(|_| AuthError::Timeout(limit))?
    }

    fn begin_loading(&self) -> LoadingGuard<'_> {
        self.lock_state().in_flight += 1;
        LoadingGuard { state: &self.state }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Decrements the in-flight counter even if the request future is dropped.
struct LoadingGuard<'a> {
    state: &'a Mutex<SessionState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Returns the caller-supplied part of a pending state (after the first `:`).
pub fn caller_state(pending: &str) -> &str {
    pending.split_once(':').map_or("", |(_, state)| state)
}

/// Current Unix time in milliseconds.
pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Errors produced by the session and its transport.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] CoreError),
    /// A redirect or endpoint URL could not be built.
    #[error("url construction failed: {0}")]
    Url(#[from] UrlBuildError),
    /// Network-level failure.
    #[error("backend transport failure: {0}")]
    Transport(String),
    /// Backend answered with a non-success status.
    #[error("backend returned status {0}")]
    Status(u16),
    /// Backend payload did not match the expected shape.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
    /// Backend did not answer in time.
    #[error("backend request timed out after {0:?}")]
    Timeout(Duration),
    /// Returned `state` does not match the pending login.
    #[error("returned state does not match the pending login")]
    StateMismatch,
    /// PKCE verifier cookie disappeared before the exchange.
    #[error("pkce code verifier cookie is missing")]
    MissingCodeVerifier,
    /// Identity provider redirected back with an `error` parameter.
    #[error("identity provider returned error: {0}")]
    Provider(String),
    /// Backend rejected the refresh token.
    #[error("refresh token is invalid or expired")]
    InvalidRefreshToken,
}

impl AuthError {
    /// Classifies backend failures.
    pub fn backend_kind(&self) -> BackendErrorKind {
        match self {
            Self::Status(status) if *status >= 500 => BackendErrorKind::Server,
            Self::Status(404) => BackendErrorKind::NotFound,
            Self::InvalidRefreshToken => BackendErrorKind::InvalidRefreshToken,
            _ => BackendErrorKind::Unknown,
        }
    }
}

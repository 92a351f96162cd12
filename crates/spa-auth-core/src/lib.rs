#![warn(missing_docs)]
//! # spa-auth-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `spa-auth` workspace.
//!
//! ## Responsibilities
//! - Hold the immutable per-session configuration and its documented defaults.
//! - Represent the opaque authenticated-user profile.
//! - Define the cookie store boundary and an in-memory implementation.
//! - Describe navigation side effects as plain [`Redirect`] values.
//!
//! ## Data flow
//! Host code builds a [`SessionConfig`] once and hands it, together with a
//! [`CookieStore`], to the session state machine. The state machine reads and
//! writes cookies by the names in [`CookieNames`] and produces [`UserProfile`]
//! values and [`Redirect`] instructions.
//!
//! ## Ownership and lifetimes
//! Configuration and profiles own their strings so they can be shared behind
//! `Arc` without borrowing from transient request buffers.
//!
//! ## Error model
//! Invalid configuration and malformed profile payloads return [`CoreError`].
//!
//! ## Security and privacy notes
//! Cookie values are treated as opaque. Nothing in this crate logs them.
//!
//! ## Example
//! ```rust
//! use spa_auth_core::{CookieStore, MemoryCookieStore, UserProfile};
//!
//! let cookies = MemoryCookieStore::from_cookie_header(r#"user={"name":"trent anderson"}"#);
//! let raw = cookies.get("user").unwrap();
//! let user = UserProfile::from_cookie_value(&raw).unwrap();
//! assert_eq!(user.get("name").and_then(|v| v.as_str()), Some("trent anderson"));
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// Scope requested when the host does not configure one.
pub const DEFAULT_SCOPE: &str = "openid offline_access";

/// Default lead window before access-token expiry that triggers a refresh.
pub const DEFAULT_REFRESH_LEAD_MS: u64 = 60_000;

/// Default upper bound for one backend round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where `login`/`register` send the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginTarget {
    /// Build the full OAuth authorize/register URL on the identity provider.
    #[default]
    IdentityProvider,
    /// Hand off to the backend, which drives the provider round trip itself.
    Server,
}

/// Path overrides for identity-provider and backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPaths {
    /// Provider authorize endpoint.
    pub authorize: String,
    /// Provider registration endpoint.
    pub provider_register: String,
    /// Provider end-session endpoint.
    pub provider_logout: String,
    /// Backend login hand-off (used with [`LoginTarget::Server`]).
    pub login: String,
    /// Backend registration hand-off (used with [`LoginTarget::Server`]).
    pub register: String,
    /// Backend logout notification.
    pub logout: String,
    /// Backend token refresh.
    pub token_refresh: String,
    /// Backend current-user profile.
    pub me: String,
    /// Backend authorization-code exchange.
    pub token_exchange: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            authorize: "/oauth2/authorize".to_string(),
            provider_register: "/oauth2/register".to_string(),
            provider_logout: "/oauth2/logout".to_string(),
            login: "/app/login".to_string(),
            register: "/app/register".to_string(),
            logout: "/app/logout".to_string(),
            token_refresh: "/app/token-refresh".to_string(),
            me: "/app/me".to_string(),
            token_exchange: "/token-exchange".to_string(),
        }
    }
}

/// Cookie names read and written by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieNames {
    /// JSON-serialized user profile.
    pub user: String,
    /// `<nonce>:<callerState>` written before a login/register redirect.
    pub pending_state: String,
    /// PKCE verifier written before a login/register redirect.
    pub code_verifier: String,
    /// Backend-owned access-token expiry (Unix epoch milliseconds).
    pub access_token_expires: String,
    /// Backend-owned ID token, used as logout hint and login signal.
    pub id_token: String,
}

impl Default for CookieNames {
    fn default() -> Self {
        Self {
            user: "user".to_string(),
            pending_state: "lastState".to_string(),
            code_verifier: "codeVerifier".to_string(),
            access_token_expires: "access_token_expires".to_string(),
            id_token: "id_token".to_string(),
        }
    }
}

/// Immutable per-session configuration.
///
/// Every optional field has a documented default, so callers only supply the
/// four required endpoints and identifiers through [`SessionConfig::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Identity-provider base URL, for example `https://sandbox.fusionauth.io`.
    pub base_url: String,
    /// OAuth client identifier.
    pub client_id: String,
    /// Backend server base URL.
    pub server_url: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Requested scope. Defaults to [`DEFAULT_SCOPE`].
    pub scope: String,
    /// Static ID-token hint for logout. Falls back to the ID-token cookie.
    pub id_token_hint: Option<String>,
    /// Whether login/register attach a PKCE challenge. Defaults to `true`.
    pub use_pkce: bool,
    /// Redirect destination for login/register.
    pub login_target: LoginTarget,
    /// Endpoint path overrides.
    pub paths: EndpointPaths,
    /// Cookie name overrides.
    pub cookies: CookieNames,
    /// Refresh when expiry is closer than this. Defaults to [`DEFAULT_REFRESH_LEAD_MS`].
    pub refresh_lead_ms: u64,
    /// Per-request timeout. Defaults to [`DEFAULT_REQUEST_TIMEOUT`].
    pub request_timeout: Duration,
}

impl SessionConfig {
    /// Creates a configuration with defaults for every optional field.
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        server_url: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: client_id.into(),
            server_url: server_url.into(),
            redirect_uri: redirect_uri.into(),
            scope: DEFAULT_SCOPE.to_string(),
            id_token_hint: None,
            use_pkce: true,
            login_target: LoginTarget::default(),
            paths: EndpointPaths::default(),
            cookies: CookieNames::default(),
            refresh_lead_ms: DEFAULT_REFRESH_LEAD_MS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Overrides the requested scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets a static ID-token hint for logout.
    pub fn with_id_token_hint(mut self, hint: impl Into<String>) -> Self {
        self.id_token_hint = Some(hint.into());
        self
    }

    /// Selects the login/register redirect destination.
    pub fn with_login_target(mut self, target: LoginTarget) -> Self {
        self.login_target = target;
        self
    }

    /// Enables or disables PKCE.
    pub fn with_pkce(mut self, use_pkce: bool) -> Self {
        self.use_pkce = use_pkce;
        self
    }

    /// Replaces endpoint path overrides.
    pub fn with_paths(mut self, paths: EndpointPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Replaces cookie names.
    pub fn with_cookie_names(mut self, cookies: CookieNames) -> Self {
        self.cookies = cookies;
        self
    }

    /// Overrides the refresh lead window.
    pub fn with_refresh_lead_ms(mut self, lead_ms: u64) -> Self {
        self.refresh_lead_ms = lead_ms;
        self
    }

    /// Overrides the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Validates required fields.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidConfig`] when the client id or scope is
    /// blank, when a URL is not absolute `http`/`https`, when the request
    /// timeout is zero, or when a cookie name is empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.client_id.trim().is_empty() {
            return Err(CoreError::InvalidConfig("client_id is empty".to_string()));
        }
        if self.scope.trim().is_empty() {
            return Err(CoreError::InvalidConfig("scope is empty".to_string()));
        }

        validate_http_url("base_url", &self.base_url)?;
        validate_http_url("server_url", &self.server_url)?;
        validate_http_url("redirect_uri", &self.redirect_uri)?;

        if self.request_timeout.is_zero() {
            return Err(CoreError::InvalidConfig(
                "request_timeout must be greater than zero".to_string(),
            ));
        }

        let names = [
            &self.cookies.user,
            &self.cookies.pending_state,
            &self.cookies.code_verifier,
            &self.cookies.access_token_expires,
            &self.cookies.id_token,
        ];
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(CoreError::InvalidConfig(
                "cookie names must be non-empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, raw: &str) -> Result<(), CoreError> {
    let parsed = Url::parse(raw)
        .map_err(|error| CoreError::InvalidConfig(format!("{field} is not a valid url: {error}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::InvalidConfig(format!(
            "{field} must use http or https"
        )));
    }

    Ok(())
}

/// Opaque authenticated-user profile.
///
/// An empty profile means "no known user". Keys and values are whatever the
/// backend returned; only `role` and `roles` are interpreted, by the access
/// predicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Map<String, Value>);

impl UserProfile {
    /// Creates an empty profile.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps an already-decoded JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Converts a JSON value into a profile.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidUser`] when `value` is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CoreError::InvalidUser(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parses the `user` cookie value.
    ///
    /// Returns `None` for anything that is not a JSON object, including the
    /// literal `undefined` some clients write.
    pub fn from_cookie_value(raw: &str) -> Option<Self> {
        serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|value| Self::from_value(value).ok())
    }

    /// Serializes the profile for the `user` cookie.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON serialization fails.
    pub fn to_cookie_value(&self) -> Result<String, CoreError> {
        serde_json::to_string(&self.0).map_err(CoreError::Codec)
    }

    /// Returns `true` when no claims are known.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns one claim.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the single-role attribute when it is a string.
    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(Value::as_str)
    }

    /// Returns string entries of the `roles` collection.
    pub fn roles(&self) -> Vec<&str> {
        self.0
            .get("roles")
            .and_then(Value::as_array)
            .map(|roles| roles.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Borrows the underlying claims.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for UserProfile {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Key-value cookie boundary.
///
/// Implementations use interior mutability so one store can be shared by the
/// session and the HTTP transport.
pub trait CookieStore: Send + Sync {
    /// Returns the cookie value, if present.
    fn get(&self, name: &str) -> Option<String>;

    /// Writes a cookie, replacing any previous value.
    fn set(&self, name: &str, value: &str);

    /// Deletes a cookie. Deleting a missing cookie is a no-op.
    fn remove(&self, name: &str);

    /// Returns every cookie as `(name, value)` pairs.
    fn entries(&self) -> Vec<(String, String)>;
}

/// Process-local cookie jar used by tests and native hosts.
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryCookieStore {
    /// Creates an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `document.cookie`-style header (`a=b; c=d`).
    ///
    /// Values are percent-decoded. Segments without `=` or with an empty name
    /// are skipped.
    pub fn from_cookie_header(header: &str) -> Self {
        let values = header
            .split(';')
            .filter_map(|segment| segment.trim().split_once('='))
            .filter(|(name, _)| !name.trim().is_empty())
            .map(|(name, value)| (name.trim().to_string(), decode_cookie_value(value.trim())))
            .collect();

        Self {
            values: Mutex::new(values),
        }
    }

    /// Renders the jar as a `Cookie` request header value.
    pub fn to_cookie_header(&self) -> String {
        cookie_header(&self.entries())
    }
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
    }

    fn remove(&self, name: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    fn entries(&self) -> Vec<(String, String)> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// Joins cookie pairs into a `Cookie` header value.
///
/// Values are percent-encoded so `;`, `,`, spaces, and quotes inside a value
/// cannot split it or smuggle in another cookie.
pub fn cookie_header(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Percent-decodes one cookie value. Invalid UTF-8 escapes leave the raw
/// value untouched.
pub fn decode_cookie_value(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |value| value.into_owned())
}

/// Full-page navigation the host must perform.
///
/// The session never touches a browser API directly; it hands this value back
/// and the host decides how to navigate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Absolute navigation target.
    pub url: Url,
}

impl Redirect {
    /// Wraps a navigation target.
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Returns the target as a string.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Error type for configuration and profile validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// User payload is not a JSON object.
    #[error("invalid user payload: {0}")]
    InvalidUser(String),
    /// JSON encoding/decoding error.
    #[error("user codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

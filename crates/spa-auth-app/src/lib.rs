#![warn(missing_docs)]
//! # spa-auth-app
//!
//! ## Purpose
//! Wires the `spa-auth` session to real collaborators: an HTTP backend, an
//! environment-driven configuration, and structured logging.
//!
//! ## Responsibilities
//! - Load [`SessionConfig`] from `SPA_AUTH_*` environment variables.
//! - Provide [`ReqwestTransport`], which sends the cookie jar with every
//!   backend request and absorbs `Set-Cookie` responses.
//! - Install the `tracing` subscriber.
//! - Strip secrets from URLs and free text before they reach logs.
//!
//! ## Data flow
//! Env -> [`session_config_from_env`] -> [`build_session`] with
//! [`ReqwestTransport`] -> host calls `mount`/`login`/`logout`/`refresh_token`
//! and performs the returned redirects.
//!
//! ## Ownership and lifetimes
//! The transport and the session share one cookie store through `Arc`, the
//! native analogue of a browser's cookie jar.
//!
//! ## Error model
//! Environment and startup failures are wrapped in [`AppError`]. Runtime
//! backend failures stay [`AuthError`] so the session can route them.
//!
//! ## Security and privacy notes
//! - Log lines pass through [`redact_url`]/[`redact_sensitive`].
//! - The transport never logs request bodies or cookie values.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, SET_COOKIE};
use spa_auth_core::{
    CookieStore, CoreError, DEFAULT_REFRESH_LEAD_MS, DEFAULT_REQUEST_TIMEOUT, LoginTarget,
    SessionConfig, UserProfile, cookie_header, decode_cookie_value,
};
use spa_auth_session::{
    AuthError, AuthHandle, AuthSession, BackendTransport, RedirectHooks, TokenExchangeRequest,
    TokenExchangeResponse,
};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("SPA_AUTH_VERSION");

/// TCP connect timeout for backend requests.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const REDACTED: &str = "<redacted>";

const SENSITIVE_KEYS: &[&str] = &[
    "code",
    "code_verifier",
    "code_challenge",
    "state",
    "id_token_hint",
    "id_token",
    "access_token",
    "refresh_token",
    "password",
    "authorization",
    "cookie",
];

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Builds [`SessionConfig`] from process environment variables.
///
/// # Errors
/// See [`session_config_from_lookup`].
pub fn session_config_from_env() -> Result<SessionConfig, AppError> {
    session_config_from_lookup(|key| std::env::var(key).ok())
}

/// Builds [`SessionConfig`] from a key lookup.
///
/// Required:
/// - `SPA_AUTH_BASE_URL`, `SPA_AUTH_CLIENT_ID`, `SPA_AUTH_SERVER_URL`,
///   `SPA_AUTH_REDIRECT_URI`
///
/// Optional:
/// - `SPA_AUTH_SCOPE`: default `openid offline_access`
/// - `SPA_AUTH_ID_TOKEN_HINT`
/// - `SPA_AUTH_LOGIN_TARGET`: `identity_provider` (default) or `server`
/// - `SPA_AUTH_PKCE`: `true` (default) / `false`
/// - `SPA_AUTH_REQUEST_TIMEOUT_SECS`: default 10
/// - `SPA_AUTH_REFRESH_LEAD_MS`: default 60000
///
/// # Errors
/// Returns [`AppError::MissingEnv`] for absent required keys,
/// [`AppError::InvalidEnv`] for unparseable optional keys, and
/// [`AppError::Config`] when the assembled configuration fails validation.
pub fn session_config_from_lookup<F>(lookup: F) -> Result<SessionConfig, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |key: &str| {
        lookup(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::MissingEnv(key.to_string()))
    };

    let mut config = SessionConfig::new(
        required("SPA_AUTH_BASE_URL")?,
        required("SPA_AUTH_CLIENT_ID")?,
        required("SPA_AUTH_SERVER_URL")?,
        required("SPA_AUTH_REDIRECT_URI")?,
    );

    if let Some(scope) = lookup("SPA_AUTH_SCOPE") {
        config.scope = scope;
    }
    config.id_token_hint = lookup("SPA_AUTH_ID_TOKEN_HINT");
    config.login_target = parse_login_target(lookup("SPA_AUTH_LOGIN_TARGET").as_deref())?;
    config.use_pkce = parse_flag("SPA_AUTH_PKCE", lookup("SPA_AUTH_PKCE").as_deref(), true)?;
    config.request_timeout = Duration::from_secs(parse_u64(
        "SPA_AUTH_REQUEST_TIMEOUT_SECS",
        lookup("SPA_AUTH_REQUEST_TIMEOUT_SECS").as_deref(),
        DEFAULT_REQUEST_TIMEOUT.as_secs(),
    )?);
    config.refresh_lead_ms = parse_u64(
        "SPA_AUTH_REFRESH_LEAD_MS",
        lookup("SPA_AUTH_REFRESH_LEAD_MS").as_deref(),
        DEFAULT_REFRESH_LEAD_MS,
    )?;

    config.validate()?;
    Ok(config)
}

fn parse_login_target(raw: Option<&str>) -> Result<LoginTarget, AppError> {
    match raw.map(str::trim).unwrap_or("identity_provider") {
        "identity_provider" | "idp" => Ok(LoginTarget::IdentityProvider),
        "server" => Ok(LoginTarget::Server),
        other => Err(AppError::InvalidEnv {
            var: "SPA_AUTH_LOGIN_TARGET".to_string(),
            reason: format!("unknown login target '{other}' (expected 'identity_provider' or 'server')"),
        }),
    }
}

fn parse_flag(var: &str, raw: Option<&str>, default: bool) -> Result<bool, AppError> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(AppError::InvalidEnv {
            var: var.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_u64(var: &str, raw: Option<&str>, default: u64) -> Result<u64, AppError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|error| AppError::InvalidEnv {
            var: var.to_string(),
            reason: format!("{error}"),
        }),
    }
}

/// Builds a shared session handle.
///
/// # Errors
/// Returns [`AppError::Auth`] when the configuration is rejected.
pub fn build_session(
    config: SessionConfig,
    transport: Arc<dyn BackendTransport>,
    cookies: Arc<dyn CookieStore>,
    hooks: RedirectHooks,
) -> Result<AuthHandle, AppError> {
    let session = AuthSession::new(config, transport, cookies)?.with_hooks(hooks);
    Ok(Arc::new(session))
}

/// HTTP backend transport.
///
/// Every request carries the shared cookie jar as a `Cookie` header, and any
/// `Set-Cookie` headers in responses are written back to the jar.
pub struct ReqwestTransport {
    http: reqwest::Client,
    cookies: Arc<dyn CookieStore>,
}

impl ReqwestTransport {
    /// Creates a transport with the given overall request timeout.
    ///
    /// # Errors
    /// Returns [`AppError::HttpClient`] when the client cannot be built.
    pub fn new(cookies: Arc<dyn CookieStore>, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|error| AppError::HttpClient(error.to_string()))?;
        Ok(Self { http, cookies })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, AuthError> {
        let header = cookie_header(&self.cookies.entries());
        let request = if header.is_empty() {
            request
        } else {
            request.header(COOKIE, header)
        };

        let response = request
            .send()
            .await
            .map_err(|error| AuthError::Transport(error.to_string()))?;
        self.absorb_set_cookies(response.headers());

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), url = %redact_url(response.url()), "backend rejected request");
            return Err(AuthError::Status(status.as_u16()));
        }

        Ok(response)
    }

    fn absorb_set_cookies(&self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            match parse_set_cookie(raw) {
                Some(SetCookie::Set { name, value }) => self.cookies.set(&name, &value),
                Some(SetCookie::Delete { name }) => self.cookies.remove(&name),
                None => {}
            }
        }
    }
}

#[async_trait]
impl BackendTransport for ReqwestTransport {
    async fn exchange_code(
        &self,
        endpoint: &Url,
        request: &TokenExchangeRequest,
    ) -> Result<TokenExchangeResponse, AuthError> {
        let response = self.send(self.http.post(endpoint.clone()).json(request)).await?;
        response
            .json::<TokenExchangeResponse>()
            .await
            .map_err(|error| AuthError::InvalidResponse(error.to_string()))
    }

    async fn fetch_user(&self, endpoint: &Url) -> Result<UserProfile, AuthError> {
        let response = self.send(self.http.get(endpoint.clone())).await?;
        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|error| AuthError::InvalidResponse(error.to_string()))?;
        UserProfile::from_value(body).map_err(|error| AuthError::InvalidResponse(error.to_string()))
    }

    async fn refresh(&self, endpoint: &Url) -> Result<(), AuthError> {
        self.send(self.http.post(endpoint.clone())).await?;
        Ok(())
    }

    async fn logout(&self, endpoint: &Url) -> Result<(), AuthError> {
        self.send(self.http.post(endpoint.clone())).await?;
        Ok(())
    }
}

/// Cookie instruction parsed from one `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetCookie {
    /// Store `name=value`.
    Set {
        /// Cookie name.
        name: String,
        /// Cookie value.
        value: String,
    },
    /// Delete `name` (empty value or `Max-Age=0`).
    Delete {
        /// Cookie name.
        name: String,
    },
}

/// Parses a `Set-Cookie` header, percent-decoding the value. Attributes other
/// than `Max-Age=0` are ignored.
pub fn parse_set_cookie(raw: &str) -> Option<SetCookie> {
    let mut segments = raw.split(';');
    let (name, value) = segments.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let value = value.trim();
    let expired = segments.any(|attribute| {
        attribute
            .trim()
            .split_once('=')
            .is_some_and(|(key, value)| key.trim().eq_ignore_ascii_case("max-age") && value.trim() == "0")
    });

    if value.is_empty() || expired {
        Some(SetCookie::Delete {
            name: name.to_string(),
        })
    } else {
        Some(SetCookie::Set {
            name: name.to_string(),
            value: decode_cookie_value(value),
        })
    }
}

/// Returns `url` with sensitive query values replaced.
pub fn redact_url(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if is_sensitive_key(&key) {
                "redacted".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// Redacts values of sensitive `key=value` pairs in free text.
pub fn redact_sensitive(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(position) = rest.find('=') {
        let (before, after) = rest.split_at(position);
        let after = &after[1..];
        let key_start = before
            .char_indices()
            .rev()
            .find(|(_, c)| !is_key_char(*c))
            .map_or(0, |(index, c)| index + c.len_utf8());
        let sensitive = is_sensitive_key(&before[key_start..]);

        // Sensitive values run to a hard delimiter so `Bearer <token>` is covered.
        let value_end = after
            .find(|c: char| matches!(c, '&' | ';' | ',' | '\n') || (!sensitive && c.is_whitespace()))
            .unwrap_or(after.len());

        output.push_str(before);
        output.push('=');
        if sensitive {
            output.push_str(REDACTED);
        } else {
            output.push_str(&after[..value_end]);
        }
        rest = &after[value_end..];
    }

    output.push_str(rest);
    output
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS
        .iter()
        .any(|sensitive| key.eq_ignore_ascii_case(sensitive))
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Required environment variable is absent or blank.
    #[error("missing required environment variable {0}")]
    MissingEnv(String),
    /// Environment variable could not be parsed.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Parse failure detail.
        reason: String,
    },
    /// Assembled configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] CoreError),
    /// Session error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// HTTP client construction failed.
    #[error("http client build failed: {0}")]
    HttpClient(String),
}

#![warn(missing_docs)]
//! # spa-auth-urls
//!
//! ## Purpose
//! Composes identity-provider and backend URLs from configuration.
//!
//! ## Responsibilities
//! - Join a base URL and a path and append a form-encoded query string.
//! - Build login/register URLs carrying OAuth, PKCE, and CSRF parameters.
//! - Build the provider logout URL.
//!
//! ## Data flow
//! [`SessionConfig`] + dynamic values (state, challenge, hint) -> builders ->
//! [`Url`] handed to the session as a redirect target or request endpoint.
//!
//! ## Ownership and lifetimes
//! Builders borrow configuration and return owned [`Url`] values.
//!
//! ## Error model
//! Unparseable joins return [`UrlBuildError`]. Validated configuration never
//! produces one.
//!
//! ## Security and privacy notes
//! Query values are percent-encoded with `application/x-www-form-urlencoded`
//! rules, the same encoding browsers apply to `URLSearchParams`.

use spa_auth_core::{LoginTarget, SessionConfig};
use thiserror::Error;
use url::Url;

/// Which redirect flow a URL is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Sign-in.
    Login,
    /// Account registration.
    Register,
}

/// Dynamic values that go into a login/register URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizeParams<'a> {
    /// Full CSRF state (`<nonce>:<callerState>`).
    pub state: &'a str,
    /// PKCE challenge, when PKCE is enabled.
    pub code_challenge: Option<&'a str>,
}

/// Joins `base` and `path` and appends `query`.
///
/// A trailing `/` on `base` and a missing leading `/` on `path` are both
/// tolerated. An empty `query` adds no `?`.
///
/// # Errors
/// Returns [`UrlBuildError::Parse`] when the joined string is not a URL.
pub fn build_url(base: &str, path: &str, query: &[(&str, &str)]) -> Result<Url, UrlBuildError> {
    let base = base.trim_end_matches('/');
    let joined = if path.is_empty() || path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };

    let mut url = Url::parse(&joined).map_err(|error| UrlBuildError::Parse {
        url: joined.clone(),
        reason: error.to_string(),
    })?;

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter().copied());
    }

    Ok(url)
}

/// Builds a backend URL from `server_url` and a configured path.
///
/// # Errors
/// Propagates [`build_url`] failures.
pub fn server_url(config: &SessionConfig, path: &str) -> Result<Url, UrlBuildError> {
    build_url(&config.server_url, path, &[])
}

/// Builds the login or registration redirect.
///
/// With [`LoginTarget::IdentityProvider`] the URL targets the provider's
/// authorize/register endpoint and carries `client_id`, `scope`,
/// `response_type=code`, `redirect_uri`, the PKCE challenge (when present),
/// and `state`. With [`LoginTarget::Server`] it targets the backend hand-off
/// path with `client_id`, `redirect_uri`, `scope`, and `state`.
///
/// # Errors
/// Propagates [`build_url`] failures.
pub fn authorize_url(
    config: &SessionConfig,
    kind: RedirectKind,
    params: AuthorizeParams<'_>,
) -> Result<Url, UrlBuildError> {
    match config.login_target {
        LoginTarget::IdentityProvider => {
            let path = match kind {
                RedirectKind::Login => &config.paths.authorize,
                RedirectKind::Register => &config.paths.provider_register,
            };

            let mut query = vec![
                ("client_id", config.client_id.as_str()),
                ("scope", config.scope.as_str()),
                ("response_type", "code"),
                ("redirect_uri", config.redirect_uri.as_str()),
            ];
            if let Some(challenge) = params.code_challenge {
                query.push(("code_challenge", challenge));
                query.push(("code_challenge_method", "S256"));
            }
            query.push(("state", params.state));

            build_url(&config.base_url, path, &query)
        }
        LoginTarget::Server => {
            let path = match kind {
                RedirectKind::Login => &config.paths.login,
                RedirectKind::Register => &config.paths.register,
            };

            build_url(
                &config.server_url,
                path,
                &[
                    ("client_id", config.client_id.as_str()),
                    ("redirect_uri", config.redirect_uri.as_str()),
                    ("scope", config.scope.as_str()),
                    ("state", params.state),
                ],
            )
        }
    }
}

/// Builds the provider end-session redirect.
///
/// `id_token_hint` is always present; an unknown hint is sent empty.
///
/// # Errors
/// Propagates [`build_url`] failures.
pub fn logout_url(config: &SessionConfig, id_token_hint: Option<&str>) -> Result<Url, UrlBuildError> {
    build_url(
        &config.base_url,
        &config.paths.provider_logout,
        &[
            ("client_id", config.client_id.as_str()),
            ("post_logout_redirect_uri", config.redirect_uri.as_str()),
            ("id_token_hint", id_token_hint.unwrap_or_default()),
        ],
    )
}

/// URL construction errors.
#[derive(Debug, Error)]
pub enum UrlBuildError {
    /// Joined base and path did not parse.
    #[error("cannot build url from '{url}': {reason}")]
    Parse {
        /// Joined string that failed to parse.
        url: String,
        /// Parser message.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    //! Unit tests for URL composition.

    use super::*;

    const ZERO_STATE: &str = "00000000000000000000000000000000000000000000000000000000:state";

    fn config() -> SessionConfig {
        SessionConfig::new(
            "https://sandbox.fusionauth.io",
            "85a03867-dccf-4882-adde-1a79aeec50df",
            "http://localhost:9000",
            "http://localhost",
        )
    }

    #[test]
    fn joins_and_encodes_query() {
        let url = build_url("http://localhost:9000/", "app/me", &[("a b", "c/d:e")])
            .expect("url should build");
        assert_eq!(url.as_str(), "http://localhost:9000/app/me?a+b=c%2Fd%3Ae");

        let bare = build_url("http://localhost:9000", "/app/me", &[]).expect("url should build");
        assert_eq!(bare.as_str(), "http://localhost:9000/app/me");
    }

    #[test]
    fn provider_login_url_carries_pkce_and_state() {
        let url = authorize_url(
            &config(),
            RedirectKind::Login,
            AuthorizeParams {
                state: ZERO_STATE,
                code_challenge: Some("vQOsFCjw6ob0uDpzH_x5Z7uChm2FRTIviI0vboV__Bg"),
            },
        )
        .expect("url should build");

        assert_eq!(
            url.as_str(),
            "https://sandbox.fusionauth.io/oauth2/authorize?client_id=85a03867-dccf-4882-adde-1a79aeec50df&scope=openid+offline_access&response_type=code&redirect_uri=http%3A%2F%2Flocalhost&code_challenge=vQOsFCjw6ob0uDpzH_x5Z7uChm2FRTIviI0vboV__Bg&code_challenge_method=S256&state=00000000000000000000000000000000000000000000000000000000%3Astate"
        );
    }

    #[test]
    fn register_without_pkce_omits_challenge() {
        let config = config().with_pkce(false);
        let url = authorize_url(
            &config,
            RedirectKind::Register,
            AuthorizeParams {
                state: "n:s",
                code_challenge: None,
            },
        )
        .expect("url should build");

        assert_eq!(url.path(), "/oauth2/register");
        assert!(url.query_pairs().all(|(key, _)| key != "code_challenge"));
    }

    #[test]
    fn server_target_uses_backend_handoff() {
        let config = config().with_login_target(LoginTarget::Server);
        let url = authorize_url(
            &config,
            RedirectKind::Login,
            AuthorizeParams {
                state: "n:s",
                code_challenge: None,
            },
        )
        .expect("url should build");

        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(9000));
        assert_eq!(url.path(), "/app/login");
    }

    #[test]
    fn logout_url_matches_provider_contract() {
        let url = logout_url(&config(), Some("token_hint")).expect("url should build");
        assert_eq!(
            url.as_str(),
            "https://sandbox.fusionauth.io/oauth2/logout?client_id=85a03867-dccf-4882-adde-1a79aeec50df&post_logout_redirect_uri=http%3A%2F%2Flocalhost&id_token_hint=token_hint"
        );
    }
}

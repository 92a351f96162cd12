//! Shared fixtures for app integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use spa_auth_core::{MemoryCookieStore, SessionConfig, UserProfile};
use spa_auth_pkce::RandomSource;
use spa_auth_session::{
    AuthError, AuthSession, BackendTransport, RedirectHooks, TokenExchangeRequest,
    TokenExchangeResponse,
};
use url::Url;

/// Nonce produced by [`ZeroRandom`].
#[allow(dead_code)]
pub const ZERO_NONCE: &str = "00000000000000000000000000000000000000000000000000000000";

/// Challenge derived from the [`ZERO_NONCE`] verifier.
#[allow(dead_code)]
pub const ZERO_CHALLENGE: &str = "vQOsFCjw6ob0uDpzH_x5Z7uChm2FRTIviI0vboV__Bg";

/// Sandbox configuration shared by the integration tests.
#[allow(dead_code)]
pub fn test_config() -> SessionConfig {
    SessionConfig::new(
        "https://sandbox.fusionauth.io",
        "85a03867-dccf-4882-adde-1a79aeec50df",
        "http://localhost:9000",
        "http://localhost",
    )
}

/// Deterministic randomness: every byte is zero.
#[allow(dead_code)]
pub struct ZeroRandom;

impl RandomSource for ZeroRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        dest.fill(0);
    }
}

/// In-test backend with per-endpoint counters.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockBackend {
    /// User returned by token exchange; `None` answers 500.
    pub exchange_user: Option<Value>,
    /// User returned by `/app/me`; `None` answers 500.
    pub me_user: Option<Value>,
    /// Status returned by refresh; `None` means success.
    pub refresh_status: Option<u16>,
    /// Scheduler yields before any call completes.
    pub yields: usize,
    /// Exchange calls observed.
    pub exchange_calls: AtomicUsize,
    /// Profile fetches observed.
    pub fetch_calls: AtomicUsize,
    /// Refresh calls observed.
    pub refresh_calls: AtomicUsize,
    /// Logout notifications observed.
    pub logout_calls: AtomicUsize,
    /// Last exchange body and endpoint.
    pub last_exchange: Mutex<Option<(Url, TokenExchangeRequest)>>,
}

#[allow(dead_code)]
impl MockBackend {
    /// Total calls across every endpoint.
    pub fn total_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
            + self.fetch_calls.load(Ordering::SeqCst)
            + self.refresh_calls.load(Ordering::SeqCst)
            + self.logout_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        for _ in 0..self.yields {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl BackendTransport for MockBackend {
    async fn exchange_code(
        &self,
        endpoint: &Url,
        request: &TokenExchangeRequest,
    ) -> Result<TokenExchangeResponse, AuthError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        *self.last_exchange.lock().expect("exchange lock should not poison") =
            Some((endpoint.clone(), request.clone()));

        let user = self.exchange_user.clone().ok_or(AuthError::Status(500))?;
        Ok(TokenExchangeResponse {
            user: UserProfile::from_value(user).map_err(|error| AuthError::InvalidResponse(error.to_string()))?,
        })
    }

    async fn fetch_user(&self, _endpoint: &Url) -> Result<UserProfile, AuthError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let user = self.me_user.clone().ok_or(AuthError::Status(500))?;
        UserProfile::from_value(user).map_err(|error| AuthError::InvalidResponse(error.to_string()))
    }

    async fn refresh(&self, _endpoint: &Url) -> Result<(), AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        match self.refresh_status {
            Some(status) => Err(AuthError::Status(status)),
            None => Ok(()),
        }
    }

    async fn logout(&self, _endpoint: &Url) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hook invocations captured by [`recording_hooks`].
#[allow(dead_code)]
#[derive(Default)]
pub struct HookLog {
    /// Caller states passed to the success hook.
    pub successes: Mutex<Vec<String>>,
    /// Rendered errors passed to the failure hook.
    pub failures: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl HookLog {
    /// Success hook calls so far.
    pub fn successes(&self) -> Vec<String> {
        self.successes.lock().expect("hook lock should not poison").clone()
    }

    /// Failure hook calls so far.
    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().expect("hook lock should not poison").clone()
    }
}

/// Hooks that append to a shared [`HookLog`].
#[allow(dead_code)]
pub fn recording_hooks() -> (RedirectHooks, Arc<HookLog>) {
    let log = Arc::new(HookLog::default());
    let on_success = Arc::clone(&log);
    let on_failure = Arc::clone(&log);
    let hooks = RedirectHooks::new()
        .on_success(move |state| {
            on_success
                .successes
                .lock()
                .expect("hook lock should not poison")
                .push(state.to_string());
        })
        .on_failure(move |error| {
            on_failure
                .failures
                .lock()
                .expect("hook lock should not poison")
                .push(error.to_string());
        });
    (hooks, log)
}

/// Session over a cookie jar seeded from a `Cookie` header.
#[allow(dead_code)]
pub fn session_with(
    config: SessionConfig,
    cookie_header: &str,
    backend: Arc<MockBackend>,
    hooks: RedirectHooks,
) -> (AuthSession, Arc<MemoryCookieStore>) {
    let jar = Arc::new(MemoryCookieStore::from_cookie_header(cookie_header));
    let session = AuthSession::new(config, backend, jar.clone())
        .expect("test config should validate")
        .with_hooks(hooks)
        .with_random_source(Arc::new(ZeroRandom));
    (session, jar)
}

/// Current page URL fixture.
#[allow(dead_code)]
pub fn page(url: &str) -> Url {
    Url::parse(url).expect("page url fixture should parse")
}

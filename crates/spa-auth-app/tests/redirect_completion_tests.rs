//! Integration tests for completing the provider redirect round trip.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{MockBackend, ZERO_NONCE, page, recording_hooks, session_with, test_config};
use serde_json::json;
use spa_auth_access::Gate;
use spa_auth_core::CookieStore;
use spa_auth_session::{AuthPhase, MountOutcome};

#[tokio::test]
async fn redirect_completion_tests_exchanges_code_and_reports_caller_state() {
    let backend = Arc::new(MockBackend {
        exchange_user: Some(json!({"email": "richard@example.com", "role": "admin"})),
        ..MockBackend::default()
    });
    let (hooks, log) = recording_hooks();
    let cookies = format!("lastState={ZERO_NONCE}:mystate; codeVerifier={ZERO_NONCE}");
    let (session, jar) = session_with(test_config(), &cookies, backend.clone(), hooks);

    let outcome = session
        .mount(&page(&format!("http://localhost/?code=here&state={ZERO_NONCE}%3Amystate")))
        .await;

    assert_eq!(outcome, MountOutcome::Exchanged);
    assert_eq!(session.user().role(), Some("admin"));
    assert!(session.is_authenticated());
    assert_eq!(session.phase(), AuthPhase::Authenticated);
    assert_eq!(log.successes(), vec!["mystate".to_string()]);
    assert!(log.failures().is_empty());
    assert_eq!(jar.get("lastState"), None);
    assert_eq!(jar.get("codeVerifier"), None);
    assert!(jar.get("user").is_some());

    let (endpoint, request) = backend
        .last_exchange
        .lock()
        .expect("exchange lock should not poison")
        .clone()
        .expect("exchange should be recorded");
    assert_eq!(endpoint.as_str(), "http://localhost:9000/token-exchange");
    assert_eq!(request.code, "here");
    assert_eq!(request.code_verifier.as_deref(), Some(ZERO_NONCE));
    assert_eq!(request.client_id, "85a03867-dccf-4882-adde-1a79aeec50df");
    assert_eq!(request.redirect_uri, "http://localhost");

    let gate = Gate::Authorization {
        role: Some("admin".to_string()),
    };
    assert!(gate.allows(&session.snapshot()));
}

#[tokio::test]
async fn redirect_completion_tests_rejects_mismatched_state() {
    let backend = Arc::new(MockBackend {
        exchange_user: Some(json!({"role": "admin"})),
        ..MockBackend::default()
    });
    let (hooks, log) = recording_hooks();
    let (session, jar) = session_with(test_config(), "lastState=abc:xyz", backend.clone(), hooks);

    let outcome = session
        .mount(&page("http://localhost/?code=here&state=different"))
        .await;

    assert_eq!(outcome, MountOutcome::Rejected);
    assert_eq!(backend.exchange_calls.load(Ordering::SeqCst), 0);
    assert!(session.user().is_empty());
    assert!(!session.is_authenticated());
    assert!(log.successes().is_empty());
    assert_eq!(log.failures().len(), 1);
    assert_eq!(jar.get("lastState"), None);
}

#[tokio::test]
async fn redirect_completion_tests_requires_verifier_when_pkce_enabled() {
    let backend = Arc::new(MockBackend::default());
    let (hooks, log) = recording_hooks();
    let (session, _jar) = session_with(test_config(), "lastState=n:s", backend.clone(), hooks);

    let outcome = session.mount(&page("http://localhost/?code=here&state=n%3As")).await;

    assert_eq!(outcome, MountOutcome::Failed);
    assert_eq!(backend.exchange_calls.load(Ordering::SeqCst), 0);
    assert_eq!(log.failures(), vec!["pkce code verifier cookie is missing".to_string()]);
}

#[tokio::test]
async fn redirect_completion_tests_exchanges_without_verifier_when_pkce_disabled() {
    let backend = Arc::new(MockBackend {
        exchange_user: Some(json!({"email": "a@example.com"})),
        ..MockBackend::default()
    });
    let (hooks, log) = recording_hooks();
    let config = test_config().with_pkce(false);
    let (session, _jar) = session_with(config, "lastState=n:", backend.clone(), hooks);

    let outcome = session.mount(&page("http://localhost/?code=here&state=n%3A")).await;

    assert_eq!(outcome, MountOutcome::Exchanged);
    let (_, request) = backend
        .last_exchange
        .lock()
        .expect("exchange lock should not poison")
        .clone()
        .expect("exchange should be recorded");
    assert_eq!(request.code_verifier, None);
    assert_eq!(log.successes(), vec![String::new()]);
}

#[tokio::test]
async fn redirect_completion_tests_reports_provider_error() {
    let backend = Arc::new(MockBackend::default());
    let (hooks, log) = recording_hooks();
    let (session, jar) = session_with(test_config(), "lastState=n:s; codeVerifier=v", backend.clone(), hooks);

    let outcome = session
        .mount(&page("http://localhost/?error=access_denied&state=n%3As"))
        .await;

    assert_eq!(outcome, MountOutcome::Failed);
    assert_eq!(backend.total_calls(), 0);
    assert_eq!(
        log.failures(),
        vec!["identity provider returned error: access_denied".to_string()]
    );
    assert_eq!(jar.get("lastState"), None);
    assert_eq!(jar.get("codeVerifier"), None);
}

#[tokio::test]
async fn redirect_completion_tests_exchange_failure_fires_failure_hook_once() {
    let backend = Arc::new(MockBackend::default());
    let (hooks, log) = recording_hooks();
    let (session, jar) = session_with(test_config(), "lastState=n:s; codeVerifier=v", backend.clone(), hooks);
    let url = page("http://localhost/?code=here&state=n%3As");

    assert_eq!(session.mount(&url).await, MountOutcome::Failed);
    assert_eq!(session.mount(&url).await, MountOutcome::AlreadyMounted);

    assert_eq!(backend.exchange_calls.load(Ordering::SeqCst), 1);
    assert_eq!(log.failures(), vec!["backend returned status 500".to_string()]);
    assert_eq!(session.phase(), AuthPhase::Failed);
    assert_eq!(jar.get("lastState"), None);
}

#[tokio::test]
async fn redirect_completion_tests_code_without_pending_state_is_ignored() {
    let backend = Arc::new(MockBackend {
        exchange_user: Some(json!({"role": "admin"})),
        ..MockBackend::default()
    });
    let (hooks, log) = recording_hooks();
    let (session, _jar) = session_with(
        test_config(),
        r#"user={"email":"cached@example.com"}"#,
        backend.clone(),
        hooks,
    );

    let outcome = session.mount(&page("http://localhost/?code=here&state=n%3As")).await;

    assert_eq!(outcome, MountOutcome::CachedUser);
    assert_eq!(backend.total_calls(), 0);
    assert!(log.successes().is_empty());
    assert!(log.failures().is_empty());
}

#[tokio::test]
async fn redirect_completion_tests_reports_loading_during_exchange() {
    let backend = Arc::new(MockBackend {
        exchange_user: Some(json!({"role": "admin"})),
        yields: 4,
        ..MockBackend::default()
    });
    let (hooks, _log) = recording_hooks();
    let (session, _jar) = session_with(test_config(), "lastState=n:s; codeVerifier=v", backend, hooks);
    let url = page("http://localhost/?code=here&state=n%3As");

    let (outcome, (loading, phase)) = tokio::join!(session.mount(&url), async {
        tokio::task::yield_now().await;
        (session.is_loading(), session.phase())
    });

    assert!(loading);
    assert_eq!(phase, AuthPhase::ExchangingOrFetching);
    assert_eq!(outcome, MountOutcome::Exchanged);
    assert!(!session.is_loading());
}

#![warn(missing_docs)]
//! # spa-auth-app binary
//!
//! Command-line driver for the auth session. The cookie jar is read from
//! `SPA_AUTH_COOKIES` and printed back after each command so consecutive
//! invocations can carry it forward like a browser would.

use std::process::ExitCode;
use std::sync::Arc;

use spa_auth_access::{AuthAction, Gate};
use spa_auth_app::{
    AppError, ReqwestTransport, app_version, build_session, init_tracing, redact_url,
    session_config_from_env,
};
use spa_auth_core::{CookieStore, MemoryCookieStore};
use spa_auth_session::RedirectHooks;
use url::Url;

const USAGE: &str = "usage: spa-auth-app <version|login [state]|register [state]|mount <url>|refresh|logout>";

/// CLI entry point.
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("spa-auth-app: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<(), AppError> {
    let command = args.first().map(String::as_str).unwrap_or("version");
    if command == "version" {
        println!("spa-auth-app {}", app_version());
        return Ok(());
    }

    let config = session_config_from_env()?;
    let jar = Arc::new(MemoryCookieStore::from_cookie_header(
        &std::env::var("SPA_AUTH_COOKIES").unwrap_or_default(),
    ));
    let cookies: Arc<dyn CookieStore> = jar.clone();
    let transport = Arc::new(ReqwestTransport::new(cookies.clone(), config.request_timeout)?);
    let hooks = RedirectHooks::new()
        .on_success(|state| println!("redirect completed (state: {state})"))
        .on_failure(|error| eprintln!("redirect failed: {error}"));
    let session = build_session(config, transport, cookies, hooks)?;

    let state = || args.get(1).cloned().unwrap_or_default();
    let action = match command {
        "login" => Some(AuthAction::Login { state: state() }),
        "register" => Some(AuthAction::Register { state: state() }),
        "logout" => Some(AuthAction::Logout),
        _ => None,
    };

    if let Some(action) = action {
        let redirect = action.perform(&session).await?;
        tracing::info!(action = action.label(), url = %redact_url(&redirect.url), "redirect ready");
        println!("{}", redirect.as_str());
    } else if command == "mount" {
        let raw = args.get(1).ok_or_else(|| AppError::InvalidEnv {
            var: "url".to_string(),
            reason: USAGE.to_string(),
        })?;
        let current = Url::parse(raw).map_err(|error| AppError::InvalidEnv {
            var: "url".to_string(),
            reason: error.to_string(),
        })?;
        let outcome = session.mount(&current).await;
        let snapshot = session.snapshot();
        println!("outcome={outcome:?} phase={:?}", snapshot.phase);
        println!(
            "authenticated={} signed_in={}",
            snapshot.is_authenticated,
            Gate::Authorization { role: None }.allows(&snapshot)
        );
    } else if command == "refresh" {
        let outcome = session.refresh_token().await?;
        println!("refresh={outcome:?}");
    } else {
        eprintln!("{USAGE}");
        return Ok(());
    }

    println!("SPA_AUTH_COOKIES='{}'", jar.to_cookie_header());
    Ok(())
}

//! Browser based Spotify login.
//!
//! `authorize` serves the redirect URI locally, prints the Spotify authorization
//! URL and waits for Spotify to redirect the browser back with a code. The
//! callback result travels through a oneshot channel owned by the call.

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, Uri},
    routing::get,
};
use serde::Deserialize;
use tokio::sync::{Notify, oneshot};
use url::Url;

use crate::spotify_rs::auth::{
    ExchangeCodeForTokenError, SPOTIFY_TOKEN_URL, SpotifyApiCredentials,
    exchange_code_for_token, initiate_oauth,
};
use crate::spotify_rs::client::SpotifyClient;
use crate::spotify_rs::types::{OAuthSession, SpotifyTokenResponse};

#[derive(Debug, thiserror::Error)]
pub enum AuthorizeError {
    #[error("Invalid redirect URI '{uri}': {reason}")]
    InvalidRedirectUri { uri: String, reason: String },
    #[error("Failed to bind callback listener on {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
    #[error("State mismatch: {received} != {expected}")]
    StateMismatch { expected: String, received: String },
    #[error("Authorization denied: {0}")]
    Denied(String),
    #[error("Callback did not contain an authorization code")]
    MissingCode,
    #[error("Couldn't get token: {0}")]
    TokenExchange(#[from] ExchangeCodeForTokenError),
    #[error("Callback listener stopped before authorization completed")]
    ListenerClosed,
}

type CallbackOutcome = Result<SpotifyTokenResponse, AuthorizeError>;

struct CallbackState {
    credentials: SpotifyApiCredentials,
    session: OAuthSession,
    token_url: String,
    outcome: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

impl CallbackState {
    fn complete(&self, outcome: CallbackOutcome) {
        let sender = match self.outcome.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(sender) => {
                // The receiver only disappears when `authorize` was dropped
                let _ = sender.send(outcome);
            }
            None => tracing::debug!("Ignoring repeated authorization callback"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    let received = params.state.unwrap_or_default();
    if received != state.session.state {
        tracing::error!("State mismatch: {} != {}", received, state.session.state);
        state.complete(Err(AuthorizeError::StateMismatch {
            expected: state.session.state.clone(),
            received,
        }));
        return (StatusCode::NOT_FOUND, "State mismatch");
    }

    if let Some(error) = params.error {
        state.complete(Err(AuthorizeError::Denied(error)));
        return (StatusCode::FORBIDDEN, "Authorization denied");
    }

    let Some(code) = params.code else {
        state.complete(Err(AuthorizeError::MissingCode));
        return (StatusCode::BAD_REQUEST, "Missing authorization code");
    };

    let exchanged =
        exchange_code_for_token(&state.token_url, &state.credentials, &state.session, &code)
            .await;
    match exchanged {
        Ok(token) => {
            state.complete(Ok(token));
            (StatusCode::OK, "Login Completed!")
        }
        Err(error) => {
            tracing::error!("Couldn't get token: {}", error);
            state.complete(Err(error.into()));
            (StatusCode::FORBIDDEN, "Couldn't get token")
        }
    }
}

async fn handle_other(uri: Uri) -> StatusCode {
    tracing::info!("Got request for: {}", uri);
    StatusCode::NOT_FOUND
}

fn callback_router(callback_path: &str, state: Arc<CallbackState>) -> Router {
    Router::new()
        .route(callback_path, get(handle_callback))
        .fallback(handle_other)
        .with_state(state)
}

/// Where the callback listener binds and which path it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CallbackAddress {
    host: String,
    port: u16,
    path: String,
}

fn callback_address(redirect_uri: &str) -> Result<CallbackAddress, AuthorizeError> {
    let invalid = |reason: &str| AuthorizeError::InvalidRedirectUri {
        uri: redirect_uri.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(redirect_uri).map_err(|error| invalid(&error.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid("the local callback listener only speaks http"));
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid("missing port"))?;

    Ok(CallbackAddress {
        host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
        port,
        path: url.path().to_string(),
    })
}

/// Run the authorization code flow and return a client for the logged in user.
pub async fn authorize(
    credentials: &SpotifyApiCredentials,
) -> Result<SpotifyClient, AuthorizeError> {
    let address = callback_address(&credentials.redirect_uri)?;
    let (response, session) = initiate_oauth(&credentials.client_id, &credentials.redirect_uri);

    let (sender, receiver) = oneshot::channel();
    let state = Arc::new(CallbackState {
        credentials: credentials.clone(),
        session,
        token_url: SPOTIFY_TOKEN_URL.to_string(),
        outcome: Mutex::new(Some(sender)),
    });
    let router = callback_router(&address.path, state);

    let listener = tokio::net::TcpListener::bind((address.host.as_str(), address.port))
        .await
        .map_err(|source| AuthorizeError::Bind {
            address: format!("{}:{}", address.host, address.port),
            source,
        })?;
    tracing::debug!(host = %address.host, port = address.port, "Callback listener ready");

    let shutdown = Arc::new(Notify::new());
    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await
        })
    };

    println!(
        "Please log in to Spotify by visiting the following page in your browser: {}",
        response.auth_url
    );

    let outcome = receiver.await;
    shutdown.notify_one();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::warn!("Callback listener failed: {}", error),
        Err(error) => tracing::warn!("Callback listener task failed: {}", error),
    }

    let token = outcome.map_err(|_| AuthorizeError::ListenerClosed)??;
    tracing::info!(scope = %token.scope, "Spotify authorization completed");
    Ok(SpotifyClient::new(token.access_token))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{Form, Json, body::Body, http::Request, routing::post};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn test_state(token_url: &str) -> (Arc<CallbackState>, oneshot::Receiver<CallbackOutcome>) {
        let (sender, receiver) = oneshot::channel();
        let state = Arc::new(CallbackState {
            credentials: SpotifyApiCredentials {
                client_id: "id".into(),
                client_secret: None,
                redirect_uri: "http://localhost:8080/callback".into(),
            },
            session: OAuthSession {
                code_verifier: "verifier".into(),
                state: "expected".into(),
            },
            token_url: token_url.to_string(),
            outcome: Mutex::new(Some(sender)),
        });
        (state, receiver)
    }

    async fn call(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    async fn token_server() -> String {
        async fn token(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
            if form.get("code").map(String::as_str) == Some("good") {
                (
                    StatusCode::OK,
                    Json(json!({
                        "access_token": "access",
                        "token_type": "Bearer",
                        "expires_in": 3600,
                        "refresh_token": null,
                        "scope": "user-library-read"
                    })),
                )
            } else {
                (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})))
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/token", post(token)))
                .await
                .unwrap();
        });
        format!("http://{}/token", addr)
    }

    #[tokio::test]
    async fn test_callback_with_wrong_state_is_rejected() {
        let (state, receiver) = test_state("http://127.0.0.1:1/unused");
        let router = callback_router("/callback", state);

        let status = call(router, "/callback?code=abc&state=forged").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(matches!(
            receiver.await.unwrap(),
            Err(AuthorizeError::StateMismatch { received, .. }) if received == "forged"
        ));
    }

    #[tokio::test]
    async fn test_callback_with_denied_access() {
        let (state, receiver) = test_state("http://127.0.0.1:1/unused");
        let router = callback_router("/callback", state);

        let status = call(router, "/callback?error=access_denied&state=expected").await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(matches!(
            receiver.await.unwrap(),
            Err(AuthorizeError::Denied(reason)) if reason == "access_denied"
        ));
    }

    #[tokio::test]
    async fn test_callback_without_code() {
        let (state, receiver) = test_state("http://127.0.0.1:1/unused");
        let router = callback_router("/callback", state);

        let status = call(router, "/callback?state=expected").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(matches!(
            receiver.await.unwrap(),
            Err(AuthorizeError::MissingCode)
        ));
    }

    #[tokio::test]
    async fn test_callback_exchanges_code() {
        let token_url = token_server().await;
        let (state, receiver) = test_state(&token_url);
        let router = callback_router("/callback", state);

        let status = call(router, "/callback?code=good&state=expected").await;

        assert_eq!(status, StatusCode::OK);
        let token = receiver.await.unwrap().unwrap();
        assert_eq!(token.access_token, "access");
    }

    #[tokio::test]
    async fn test_callback_with_rejected_code() {
        let token_url = token_server().await;
        let (state, receiver) = test_state(&token_url);
        let router = callback_router("/callback", state);

        let status = call(router, "/callback?code=bad&state=expected").await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(matches!(
            receiver.await.unwrap(),
            Err(AuthorizeError::TokenExchange(
                ExchangeCodeForTokenError::InvalidCode { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_other_paths_are_not_found() {
        let (state, _receiver) = test_state("http://127.0.0.1:1/unused");
        let router = callback_router("/callback", state);

        assert_eq!(call(router, "/favicon.ico").await, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_callback_address() {
        assert_eq!(
            callback_address("http://localhost:8080/callback").unwrap(),
            CallbackAddress {
                host: "localhost".into(),
                port: 8080,
                path: "/callback".into(),
            }
        );
        assert_eq!(callback_address("http://127.0.0.1/cb").unwrap().port, 80);
        assert!(matches!(
            callback_address("https://example.com/callback"),
            Err(AuthorizeError::InvalidRedirectUri { .. })
        ));
        assert!(callback_address("not a url").is_err());
    }
}

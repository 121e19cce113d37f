// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Primary RPC Listener
//!
//! The vault's remote calls, served as `POST` requests to their fully
//! qualified call names with JSON bodies. Authentication travels as
//! `authorization: Bearer <token>` metadata.
//!
//! | Call | Auth | Shape |
//! |---|---|---|
//! | `/vault.v1.AccountService/RegisterAccount` | no | unary |
//! | `/vault.v1.AccountService/Login` | no | unary |
//! | `/vault.v1.SecretService/CreateSecret` | yes | unary |
//! | `/vault.v1.SecretService/GetSecret` | yes | unary |
//! | `/vault.v1.SecretService/ListSecrets` | yes | unary |
//! | `/vault.v1.SecretService/UpdateSecret` | yes | unary |
//! | `/vault.v1.SecretService/DeleteSecret` | yes | unary |
//! | `/vault.v1.SecretService/UpdateSecretData` | yes | client stream |
//! | `/vault.v1.SecretService/GetSecretData` | yes | server stream |

use axum::{middleware, routing::post, Router};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
};

use crate::auth::AuthRequirements;
use crate::state::AppState;

pub mod accounts;
pub mod interceptor;
pub mod secrets;
pub mod validate;

pub use interceptor::AuthGate;

/// Fully qualified call names.
pub mod calls {
    pub const REGISTER_ACCOUNT: &str = "/vault.v1.AccountService/RegisterAccount";
    pub const LOGIN: &str = "/vault.v1.AccountService/Login";

    pub const CREATE_SECRET: &str = "/vault.v1.SecretService/CreateSecret";
    pub const GET_SECRET: &str = "/vault.v1.SecretService/GetSecret";
    pub const LIST_SECRETS: &str = "/vault.v1.SecretService/ListSecrets";
    pub const UPDATE_SECRET: &str = "/vault.v1.SecretService/UpdateSecret";
    pub const DELETE_SECRET: &str = "/vault.v1.SecretService/DeleteSecret";
    pub const UPDATE_SECRET_DATA: &str = "/vault.v1.SecretService/UpdateSecretData";
    pub const GET_SECRET_DATA: &str = "/vault.v1.SecretService/GetSecretData";

    /// Metadata header naming the target secret of a streamed call.
    pub const SECRET_ID_HEADER: &str = "x-secret-id";

    pub const SECRET_CALLS: [&str; 7] = [
        CREATE_SECRET,
        GET_SECRET,
        LIST_SECRETS,
        UPDATE_SECRET,
        DELETE_SECRET,
        UPDATE_SECRET_DATA,
        GET_SECRET_DATA,
    ];

    pub fn is_streamed(call: &str) -> bool {
        call == UPDATE_SECRET_DATA || call == GET_SECRET_DATA
    }

    pub fn is_unary(call: &str) -> bool {
        matches!(
            call,
            REGISTER_ACCOUNT
                | LOGIN
                | CREATE_SECRET
                | GET_SECRET
                | LIST_SECRETS
                | UPDATE_SECRET
                | DELETE_SECRET
        )
    }
}

/// Build the primary RPC router with the full interceptor chain.
pub fn router(state: AppState, requirements: AuthRequirements) -> Router {
    let gate = AuthGate::new(state.accounts.tokens().clone(), requirements);

    let routes = Router::new()
        .route(calls::REGISTER_ACCOUNT, post(accounts::register_account))
        .route(calls::LOGIN, post(accounts::login))
        .route(calls::CREATE_SECRET, post(secrets::create_secret))
        .route(calls::GET_SECRET, post(secrets::get_secret))
        .route(calls::LIST_SECRETS, post(secrets::list_secrets))
        .route(calls::UPDATE_SECRET, post(secrets::update_secret))
        .route(calls::DELETE_SECRET, post(secrets::delete_secret))
        .route(calls::UPDATE_SECRET_DATA, post(secrets::update_secret_data))
        .route(calls::GET_SECRET_DATA, post(secrets::get_secret_data))
        .with_state(state);

    with_interceptors(routes, gate)
}

/// Wrap `routes` in the interceptor chain, outermost stage first.
pub fn with_interceptors(routes: Router, gate: AuthGate) -> Router {
    routes.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(middleware::from_fn(interceptor::log_call))
            .layer(CatchPanicLayer::custom(interceptor::handle_panic))
            .layer(middleware::from_fn(interceptor::validate_call))
            .layer(middleware::from_fn_with_state(
                gate,
                interceptor::authenticate_call,
            )),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenIssuer;
    use crate::models::{CreateSecretResponse, ListSecretsResponse, SecretView, TokenResponse};
    use crate::retry::RetryPolicy;
    use crate::service::{AccountService, SecretService};
    use crate::storage::{Database, RedbAccountStore, RedbSecretStore};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn app() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("vault.redb")).unwrap();
        let tokens = TokenIssuer::new(b"test-key", Duration::from_secs(300));
        let state = AppState::new(
            AccountService::new(Arc::new(RedbAccountStore::new(db.clone())), tokens),
            SecretService::new(Arc::new(RedbSecretStore::new(db))),
            CancellationToken::new(),
        )
        .with_retry(RetryPolicy::none());
        (router(state, AuthRequirements::vault_defaults()), dir)
    }

    fn call(name: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(name)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(app: &Router, login: &str) -> String {
        let response = app
            .clone()
            .oneshot(call(
                calls::REGISTER_ACCOUNT,
                None,
                json!({"login": login, "password": "pw"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: TokenResponse = serde_json::from_value(json_body(response).await).unwrap();
        body.token
    }

    async fn create(app: &Router, token: &str, name: &str) -> uuid::Uuid {
        let response = app
            .clone()
            .oneshot(call(
                calls::CREATE_SECRET,
                Some(token),
                json!({"name": name, "secret_type": "text", "data": "aGVsbG8="}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: CreateSecretResponse = serde_json::from_value(json_body(response).await).unwrap();
        body.id
    }

    #[tokio::test]
    async fn register_login_and_duplicate() {
        let (app, _dir) = app();
        register(&app, "alice").await;

        let response = app
            .clone()
            .oneshot(call(
                calls::REGISTER_ACCOUNT,
                None,
                json!({"login": "alice", "password": "other"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["code"], "already_exists");

        let response = app
            .clone()
            .oneshot(call(calls::LOGIN, None, json!({"login": "alice", "password": "pw"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_login_are_indistinguishable() {
        let (app, _dir) = app();
        register(&app, "alice").await;

        let wrong = app
            .clone()
            .oneshot(call(calls::LOGIN, None, json!({"login": "alice", "password": "x"})))
            .await
            .unwrap();
        let unknown = app
            .clone()
            .oneshot(call(calls::LOGIN, None, json!({"login": "bob", "password": "x"})))
            .await
            .unwrap();

        assert_eq!(wrong.status(), unknown.status());
        assert_eq!(json_body(wrong).await, json_body(unknown).await);
    }

    #[tokio::test]
    async fn secret_calls_require_a_token() {
        let (app, _dir) = app();
        let response = app
            .clone()
            .oneshot(call(calls::LIST_SECRETS, None, json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "missing_auth_header");

        let response = app
            .clone()
            .oneshot(call(calls::LIST_SECRETS, Some("garbage"), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "invalid_token");
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected_before_auth() {
        let (app, _dir) = app();
        // No token at all: validation still answers first.
        let response = app
            .clone()
            .oneshot(call(calls::CREATE_SECRET, None, json!({"name": ""})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "invalid_argument");

        let response = app
            .clone()
            .oneshot(call(calls::GET_SECRET, None, json!({"id": "not-a-uuid"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn secrets_are_invisible_to_other_accounts() {
        let (app, _dir) = app();
        let alice = register(&app, "alice").await;
        let mallory = register(&app, "mallory").await;
        let id = create(&app, &alice, "db").await;

        let response = app
            .clone()
            .oneshot(call(calls::GET_SECRET, Some(&mallory), json!({ "id": id })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(call(calls::GET_SECRET, Some(&alice), json!({ "id": id })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view: SecretView = serde_json::from_value(json_body(response).await).unwrap();
        assert_eq!(view.data, b"hello");
    }

    #[tokio::test]
    async fn list_never_carries_payload() {
        let (app, _dir) = app();
        let alice = register(&app, "alice").await;
        create(&app, &alice, "one").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        create(&app, &alice, "two").await;

        let response = app
            .clone()
            .oneshot(call(calls::LIST_SECRETS, Some(&alice), json!({})))
            .await
            .unwrap();
        let value = json_body(response).await;
        for entry in value["secrets"].as_array().unwrap() {
            assert!(entry.get("data").is_none());
        }
        let listed: ListSecretsResponse = serde_json::from_value(value).unwrap();
        let names: Vec<&str> = listed.secrets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["two", "one"]);
    }

    #[tokio::test]
    async fn payload_streams_through_both_directions() {
        let (app, _dir) = app();
        let alice = register(&app, "alice").await;
        let id = create(&app, &alice, "blob").await;

        let upload = Request::builder()
            .method("POST")
            .uri(calls::UPDATE_SECRET_DATA)
            .header(header::AUTHORIZATION, format!("Bearer {alice}"))
            .header(calls::SECRET_ID_HEADER, id.to_string())
            .body(Body::from(" world"))
            .unwrap();
        let response = app.clone().oneshot(upload).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["bytes_written"], 6);

        let download = Request::builder()
            .method("POST")
            .uri(calls::GET_SECRET_DATA)
            .header(header::AUTHORIZATION, format!("Bearer {alice}"))
            .header(calls::SECRET_ID_HEADER, id.to_string())
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(download).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn streamed_call_without_secret_id_is_invalid() {
        let (app, _dir) = app();
        let alice = register(&app, "alice").await;
        let request = Request::builder()
            .method("POST")
            .uri(calls::GET_SECRET_DATA)
            .header(header::AUTHORIZATION, format!("Bearer {alice}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn panicking_handler_becomes_internal_error() {
        async fn boom() -> &'static str {
            panic!("handler exploded")
        }

        let gate = AuthGate::new(
            TokenIssuer::new(b"k", Duration::from_secs(60)),
            AuthRequirements::vault_defaults(),
        );
        let app = with_interceptors(Router::new().route("/test.v1.Crash/Boom", post(boom)), gate);

        let response = app
            .clone()
            .oneshot(call("/test.v1.Crash/Boom", None, json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json_body(response).await;
        assert_eq!(body["code"], "internal");
        assert!(!body.to_string().contains("exploded"));

        // The service keeps answering after the crash.
        let response = app
            .oneshot(call("/test.v1.Crash/Boom", None, json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

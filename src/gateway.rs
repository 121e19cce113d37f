// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # HTTP Gateway
//!
//! REST surface translated onto the primary RPC listener. Every route is a
//! thin forwarder: it picks the call, shapes the JSON body (or streams the
//! raw payload), passes the caller's `authorization` header through, and
//! relays the upstream status and body as-is. Nothing is validated or
//! authorized here; the RPC interceptor chain does that once for both
//! surfaces.
//!
//! | Route | Call |
//! |-------|------|
//! | `POST /v1/accounts/register` | `RegisterAccount` |
//! | `POST /v1/accounts/login` | `Login` |
//! | `GET /v1/secrets` | `ListSecrets` |
//! | `POST /v1/secrets` | `CreateSecret` |
//! | `GET /v1/secrets/{id}` | `GetSecret` |
//! | `PUT /v1/secrets/{id}` | `UpdateSecret` |
//! | `DELETE /v1/secrets/{id}` | `DeleteSecret` |
//! | `GET /v1/secrets/{id}/data` | `GetSecretData` |
//! | `PUT /v1/secrets/{id}/data` | `UpdateSecretData` |

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::Response,
    routing::{get, post},
    Router,
};
use futures::TryStreamExt;
use serde_json::{Map, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use url::Url;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::models::{
    CreateSecretRequest, CreateSecretResponse, Credentials, ListSecretsResponse, SecretIdRequest,
    SecretSummary, SecretType, SecretView, TokenResponse, UpdateSecretDataResponse,
    UpdateSecretResponse,
};
use crate::rpc::calls;
use crate::rpc::interceptor::{MAX_UNARY_BODY_BYTES, REQUEST_ID_HEADER};

/// Forwarding target shared by every gateway route.
#[derive(Clone)]
pub struct GatewayState {
    client: reqwest::Client,
    upstream: Url,
}

impl GatewayState {
    pub fn new(client: reqwest::Client, upstream: Url) -> Self {
        Self { client, upstream }
    }

    fn call_url(&self, call: &str) -> Result<Url, ApiError> {
        self.upstream.join(call.trim_start_matches('/')).map_err(|e| {
            tracing::error!(call, error = %e, "cannot build upstream url");
            ApiError::internal()
        })
    }

    /// Send one call upstream and relay whatever comes back.
    async fn forward(
        &self,
        call: &'static str,
        headers: &HeaderMap,
        secret_id: Option<Uuid>,
        content_type: &'static str,
        body: reqwest::Body,
    ) -> Result<Response, ApiError> {
        let mut request = self
            .client
            .post(self.call_url(call)?)
            .header(CONTENT_TYPE, content_type)
            .body(body);

        for name in [AUTHORIZATION.as_str(), REQUEST_ID_HEADER] {
            if let Some(value) = headers.get(name) {
                request = request.header(name, value.as_bytes());
            }
        }
        if let Some(id) = secret_id {
            request = request.header(calls::SECRET_ID_HEADER, id.to_string());
        }

        let upstream = request.send().await.map_err(|e| {
            tracing::warn!(call, error = %e, "upstream call failed");
            ApiError::unavailable("upstream unavailable")
        })?;

        let status =
            StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = Response::builder().status(status);
        if let Some(value) = upstream.headers().get(CONTENT_TYPE) {
            if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
                response = response.header(CONTENT_TYPE, value);
            }
        }

        let body = Body::from_stream(upstream.bytes_stream().inspect_err(move |e| {
            tracing::warn!(call, error = %e, "upstream body aborted");
        }));
        response.body(body).map_err(|e| {
            tracing::error!(call, error = %e, "cannot assemble relayed response");
            ApiError::internal()
        })
    }

    async fn forward_json(
        &self,
        call: &'static str,
        headers: &HeaderMap,
        body: impl Into<reqwest::Body>,
    ) -> Result<Response, ApiError> {
        self.forward(call, headers, None, "application/json", body.into())
            .await
    }
}

fn id_body(id: Uuid) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(&SecretIdRequest { id }).map_err(|e| {
        tracing::error!(error = %e, "cannot encode id body");
        ApiError::internal()
    })
}

// =============================================================================
// Accounts
// =============================================================================

#[utoipa::path(
    post,
    path = "/v1/accounts/register",
    tag = "Accounts",
    request_body = Credentials,
    responses(
        (status = 200, description = "Account created", body = TokenResponse),
        (status = 400, description = "Malformed credentials", body = ErrorBody),
        (status = 409, description = "Login already taken", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    state
        .forward_json(calls::REGISTER_ACCOUNT, &headers, body)
        .await
}

#[utoipa::path(
    post,
    path = "/v1/accounts/login",
    tag = "Accounts",
    request_body = Credentials,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Wrong credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    state.forward_json(calls::LOGIN, &headers, body).await
}

// =============================================================================
// Secrets
// =============================================================================

#[utoipa::path(
    get,
    path = "/v1/secrets",
    tag = "Secrets",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's secrets, newest first, without payloads", body = ListSecretsResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody)
    )
)]
pub async fn list_secrets(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state
        .forward_json(calls::LIST_SECRETS, &headers, &b"{}"[..])
        .await
}

#[utoipa::path(
    post,
    path = "/v1/secrets",
    tag = "Secrets",
    security(("bearer_auth" = [])),
    request_body = CreateSecretRequest,
    responses(
        (status = 200, description = "Secret created", body = CreateSecretResponse),
        (status = 400, description = "Invalid secret", body = ErrorBody),
        (status = 401, description = "Unauthorized", body = ErrorBody)
    )
)]
pub async fn create_secret(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    state
        .forward_json(calls::CREATE_SECRET, &headers, body)
        .await
}

#[utoipa::path(
    get,
    path = "/v1/secrets/{id}",
    tag = "Secrets",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Secret id")),
    responses(
        (status = 200, description = "Secret with payload", body = SecretView),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "Secret not found", body = ErrorBody)
    )
)]
pub async fn get_secret(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state
        .forward_json(calls::GET_SECRET, &headers, id_body(id)?)
        .await
}

/// Body of `PUT /v1/secrets/{id}`: the update fields without the id.
#[derive(utoipa::ToSchema)]
pub struct SecretPatch {
    pub name: Option<String>,
    pub secret_type: Option<SecretType>,
    #[schema(value_type = Option<String>, format = Byte)]
    pub metadata: Option<Vec<u8>>,
    pub comment: Option<String>,
}

#[utoipa::path(
    put,
    path = "/v1/secrets/{id}",
    tag = "Secrets",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Secret id")),
    request_body = SecretPatch,
    responses(
        (status = 200, description = "Update outcome", body = UpdateSecretResponse),
        (status = 400, description = "Invalid update", body = ErrorBody),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "Secret not found", body = ErrorBody)
    )
)]
pub async fn update_secret(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut fields: Map<String, Value> = if body.is_empty() {
        Map::new()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::invalid_argument(format!("body must be a JSON object: {e}")))?
    };
    fields.insert("id".to_string(), Value::String(id.to_string()));

    let body = serde_json::to_vec(&fields).map_err(|e| {
        tracing::error!(error = %e, "cannot encode update body");
        ApiError::internal()
    })?;
    state
        .forward_json(calls::UPDATE_SECRET, &headers, body)
        .await
}

#[utoipa::path(
    delete,
    path = "/v1/secrets/{id}",
    tag = "Secrets",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Secret id")),
    responses(
        (status = 200, description = "Secret deleted"),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "Secret not found", body = ErrorBody)
    )
)]
pub async fn delete_secret(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state
        .forward_json(calls::DELETE_SECRET, &headers, id_body(id)?)
        .await
}

#[utoipa::path(
    get,
    path = "/v1/secrets/{id}/data",
    tag = "Secrets",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Secret id")),
    responses(
        (status = 200, description = "Raw payload stream", content_type = "application/octet-stream"),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "Secret not found", body = ErrorBody)
    )
)]
pub async fn get_secret_data(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state
        .forward(
            calls::GET_SECRET_DATA,
            &headers,
            Some(id),
            "application/octet-stream",
            reqwest::Body::from(Vec::new()),
        )
        .await
}

#[utoipa::path(
    put,
    path = "/v1/secrets/{id}/data",
    tag = "Secrets",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Secret id")),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Payload appended", body = UpdateSecretDataResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "Secret not found", body = ErrorBody)
    )
)]
pub async fn update_secret_data(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let chunks = reqwest::Body::wrap_stream(body.into_data_stream());
    state
        .forward(
            calls::UPDATE_SECRET_DATA,
            &headers,
            Some(id),
            "application/octet-stream",
            chunks,
        )
        .await
}

// =============================================================================
// Router
// =============================================================================

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        register,
        login,
        list_secrets,
        create_secret,
        get_secret,
        update_secret,
        delete_secret,
        get_secret_data,
        update_secret_data
    ),
    components(schemas(
        Credentials,
        TokenResponse,
        CreateSecretRequest,
        CreateSecretResponse,
        SecretView,
        SecretSummary,
        SecretType,
        SecretPatch,
        ListSecretsResponse,
        UpdateSecretResponse,
        UpdateSecretDataResponse,
        ErrorBody
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "Accounts", description = "Registration and login"),
        (name = "Secrets", description = "Per-account secret storage")
    )
)]
pub struct GatewayDoc;

pub fn router(state: GatewayState) -> Router {
    let v1_routes = Router::new()
        .route("/accounts/register", post(register))
        .route("/accounts/login", post(login))
        .route("/secrets", get(list_secrets).post(create_secret))
        .route(
            "/secrets/{id}",
            get(get_secret).put(update_secret).delete(delete_secret),
        )
        .route(
            "/secrets/{id}/data",
            get(get_secret_data).put(update_secret_data),
        )
        .layer(DefaultBodyLimit::max(MAX_UNARY_BODY_BYTES))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", GatewayDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::to_bytes,
        extract::Request,
        http::Method,
        response::IntoResponse,
    };
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    /// Upstream double echoing what the gateway sent.
    async fn echo_upstream() -> Url {
        async fn echo(request: Request) -> Response {
            let (parts, body) = request.into_parts();
            let header = |name: &str| {
                parts
                    .headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string()
            };
            let body = to_bytes(body, usize::MAX).await.unwrap();
            let echoed = serde_json::json!({
                "path": parts.uri.path(),
                "authorization": header("authorization"),
                "secret_id": header(calls::SECRET_ID_HEADER),
                "body": String::from_utf8_lossy(&body),
            });
            (StatusCode::ACCEPTED, axum::Json(echoed)).into_response()
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().fallback(echo))
                .await
                .unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    async fn send(app: Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, "Bearer abc")
            .body(body)
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn forwards_list_with_authorization() {
        let app = router(GatewayState::new(reqwest::Client::new(), echo_upstream().await));

        let (status, echoed) = send(app, Method::GET, "/v1/secrets", Body::empty()).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(echoed["path"], calls::LIST_SECRETS);
        assert_eq!(echoed["authorization"], "Bearer abc");
        assert_eq!(echoed["body"], "{}");
    }

    #[tokio::test]
    async fn update_injects_path_id() {
        let app = router(GatewayState::new(reqwest::Client::new(), echo_upstream().await));
        let id = Uuid::new_v4();

        let (_, echoed) = send(
            app,
            Method::PUT,
            &format!("/v1/secrets/{id}"),
            Body::from(r#"{"name":"renamed"}"#),
        )
        .await;

        assert_eq!(echoed["path"], calls::UPDATE_SECRET);
        let sent: Value = serde_json::from_str(echoed["body"].as_str().unwrap()).unwrap();
        assert_eq!(sent["id"], id.to_string());
        assert_eq!(sent["name"], "renamed");
    }

    #[tokio::test]
    async fn data_upload_streams_with_secret_id() {
        let app = router(GatewayState::new(reqwest::Client::new(), echo_upstream().await));
        let id = Uuid::new_v4();

        let (_, echoed) = send(
            app,
            Method::PUT,
            &format!("/v1/secrets/{id}/data"),
            Body::from("raw payload"),
        )
        .await;

        assert_eq!(echoed["path"], calls::UPDATE_SECRET_DATA);
        assert_eq!(echoed["secret_id"], id.to_string());
        assert_eq!(echoed["body"], "raw payload");
    }

    #[tokio::test]
    async fn non_object_update_body_is_rejected_locally() {
        let app = router(GatewayState::new(reqwest::Client::new(), echo_upstream().await));
        let (status, body) = send(
            app,
            Method::PUT,
            &format!("/v1/secrets/{}", Uuid::new_v4()),
            Body::from("[1,2]"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_argument");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let upstream = Url::parse(&format!("http://{addr}/")).unwrap();
        let app = router(GatewayState::new(reqwest::Client::new(), upstream));

        let (status, body) = send(app, Method::GET, "/v1/secrets", Body::empty()).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "unavailable");
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = GatewayDoc::openapi();
        for path in [
            "/v1/accounts/register",
            "/v1/accounts/login",
            "/v1/secrets",
            "/v1/secrets/{id}",
            "/v1/secrets/{id}/data",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}

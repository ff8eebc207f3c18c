// Integration tests for the provider connection API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tower::ServiceExt;
use vitals::api::{create_router, AppState, OAuthSuccessResponse, ProviderStatus, ProvidersResponse, TokenResponse};
use vitals::config::ProviderSettings;
use vitals::credentials::{CredentialRecord, MemoryStore, TokenStore};
use vitals::oauth::{ProviderConfig, StateManager};
use vitals::token::{Refresher, TokenAccessor, TokenState};

const CALLBACK_BASE: &str = "http://localhost:8501";

fn provider(name: &str, token_url: &str) -> ProviderConfig {
    let settings = ProviderSettings {
        client_id: Some(format!("{}-client", name)),
        client_secret: Some(format!("{}-secret", name)),
        token_url: Some(token_url.to_string()),
        ..ProviderSettings::default()
    };
    ProviderConfig::resolve_with(name, &settings, |_| None).unwrap()
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    state_manager: StateManager,
}

fn create_test_app(token_url: &str, api_token: Option<&str>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let refresher = Refresher::new(std::time::Duration::from_secs(5)).unwrap();
    let accessor = Arc::new(TokenAccessor::new(
        store.clone(),
        refresher,
        Duration::seconds(60),
    ));
    let state_manager = StateManager::new(600);

    let state = AppState::new(
        accessor,
        vec![provider("strava", token_url), provider("google_fit", token_url)],
        state_manager.clone(),
        format!("{}/", CALLBACK_BASE),
        api_token.map(|t| t.to_string()),
    );

    TestApp {
        router: create_router(state),
        store,
        state_manager,
    }
}

fn stored_record(expires_in: i64) -> CredentialRecord {
    CredentialRecord {
        access_token: "stored_access".to_string(),
        refresh_token: "stored_refresh".to_string(),
        expires_at: DateTime::from_timestamp(Utc::now().timestamp() + expires_in, 0),
        token_type: Some("Bearer".to_string()),
        client_id: None,
        token_endpoint: None,
        scopes: Vec::new(),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_list_providers_not_connected() {
    let app = create_test_app("http://127.0.0.1:9/token", None);

    let response = app.router.oneshot(get("/api/providers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: ProvidersResponse = json_body(response).await;
    let names: Vec<&str> = body.providers.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["google_fit", "strava"]);
    assert!(body
        .providers
        .iter()
        .all(|p| p.state == TokenState::NoCredential && !p.connected));
}

#[tokio::test]
async fn test_get_provider_status_connected() {
    let app = create_test_app("http://127.0.0.1:9/token", None);
    app.store.save("strava_tokens", &stored_record(3600)).unwrap();

    let response = app.router.oneshot(get("/api/providers/strava")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status: ProviderStatus = json_body(response).await;
    assert_eq!(status.name, "strava");
    assert_eq!(status.slot, "strava_tokens");
    assert_eq!(status.state, TokenState::Valid);
    assert!(status.connected);
}

#[tokio::test]
async fn test_unknown_provider_not_found() {
    let app = create_test_app("http://127.0.0.1:9/token", None);

    let response = app.router.oneshot(get("/api/providers/fitbit")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json: serde_json::Value = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("fitbit"));
}

#[tokio::test]
async fn test_token_not_connected() {
    let app = create_test_app("http://127.0.0.1:9/token", None);

    let response = app
        .router
        .oneshot(get("/api/providers/strava/token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_token_valid_returned() {
    let app = create_test_app("http://127.0.0.1:9/token", None);
    app.store.save("strava_tokens", &stored_record(3600)).unwrap();

    let response = app
        .router
        .oneshot(get("/api/providers/strava/token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let token: TokenResponse = json_body(response).await;
    assert_eq!(token.access_token, "stored_access");
    assert_eq!(token.token_type, "Bearer");
    assert!(token.expires_at.is_some());
}

#[tokio::test]
async fn test_token_refresh_failure_is_bad_gateway() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#)
        .expect(1)
        .create_async()
        .await;

    let app = create_test_app(&format!("{}/token", server.url()), None);
    let before = stored_record(-10);
    app.store.save("google_fit_tokens", &before).unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get("/api/providers/google_fit/token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.store.load("google_fit_tokens").unwrap(), before);

    let response = app
        .router
        .oneshot(get("/api/providers/google_fit"))
        .await
        .unwrap();
    let status: ProviderStatus = json_body(response).await;
    assert_eq!(status.state, TokenState::RefreshFailed);
    assert!(status.last_error.unwrap().contains("invalid_grant"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_disconnect_removes_credentials() {
    let app = create_test_app("http://127.0.0.1:9/token", None);
    app.store.save("strava_tokens", &stored_record(3600)).unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/providers/strava")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(app.store.load("strava_tokens").is_none());

    // Disconnecting again is not an error
    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/providers/strava")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_api_token_required_when_configured() {
    let app = create_test_app("http://127.0.0.1:9/token", Some("dashboard-secret"));

    let response = app
        .router
        .clone()
        .oneshot(get("/api/providers"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/providers")
                .header("Authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/providers")
                .header("Authorization", "Bearer dashboard-secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Browser-driven OAuth start stays open
    let response = app
        .router
        .oneshot(get("/api/providers/strava/oauth/start"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_oauth_start_redirects_with_state() {
    let app = create_test_app("http://127.0.0.1:9/token", None);

    let response = app
        .router
        .oneshot(get("/api/providers/strava/oauth/start"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = response.headers()["location"].to_str().unwrap();
    let url = reqwest::Url::parse(location).unwrap();
    assert_eq!(url.host_str(), Some("www.strava.com"));

    let params: std::collections::HashMap<String, String> =
        url.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "strava-client");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["approval_prompt"], "force");
    assert_eq!(
        params["redirect_uri"],
        "http://localhost:8501/api/providers/strava/oauth/callback"
    );
    assert_eq!(app.state_manager.count(), 1);
    assert!(app.state_manager.validate_and_consume(&params["state"]).is_some());
}

#[tokio::test]
async fn test_oauth_callback_provider_error() {
    let app = create_test_app("http://127.0.0.1:9/token", None);

    let response = app
        .router
        .oneshot(get(
            "/api/providers/strava/oauth/callback?error=access_denied&error_description=User+cancelled",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json: serde_json::Value = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("access_denied"));
}

#[tokio::test]
async fn test_oauth_callback_missing_code() {
    let app = create_test_app("http://127.0.0.1:9/token", None);

    let response = app
        .router
        .oneshot(get("/api/providers/strava/oauth/callback?state=abc"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oauth_callback_invalid_state() {
    let app = create_test_app("http://127.0.0.1:9/token", None);

    let response = app
        .router
        .oneshot(get("/api/providers/strava/oauth/callback?code=abc&state=forged"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_oauth_callback_state_for_other_provider() {
    let app = create_test_app("http://127.0.0.1:9/token", None);
    let state = app.state_manager.create_state("google_fit");

    let response = app
        .router
        .oneshot(get(&format!(
            "/api/providers/strava/oauth/callback?code=abc&state={}",
            state
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oauth_callback_exchange_failure() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(r#"{"message":"Bad Request","errors":[{"field":"code","code":"invalid"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let app = create_test_app(&format!("{}/token", server.url()), None);
    let state = app.state_manager.create_state("strava");

    let response = app
        .router
        .oneshot(get(&format!(
            "/api/providers/strava/oauth/callback?code=bad&state={}",
            state
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(app.store.load("strava_tokens").is_none());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_oauth_callback_stores_credentials() {
    let expires_at = Utc::now().timestamp() + 21600;
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            mockito::Matcher::UrlEncoded("code".into(), "auth-code-1".into()),
            mockito::Matcher::UrlEncoded(
                "redirect_uri".into(),
                "http://localhost:8501/api/providers/strava/oauth/callback".into(),
            ),
            mockito::Matcher::UrlEncoded("client_secret".into(), "strava-secret".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"token_type":"Bearer","expires_at":{},"expires_in":21600,"refresh_token":"r-1","access_token":"a-1","athlete":{{"id":1}}}}"#,
            expires_at
        ))
        .expect(1)
        .create_async()
        .await;

    let app = create_test_app(&format!("{}/token", server.url()), None);
    let state = app.state_manager.create_state("strava");

    let response = app
        .router
        .clone()
        .oneshot(get(&format!(
            "/api/providers/strava/oauth/callback?code=auth-code-1&state={}&scope=read,activity:read_all",
            state
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: OAuthSuccessResponse = json_body(response).await;
    assert!(body.success);
    assert_eq!(body.provider, "strava");

    let stored = app.store.load("strava_tokens").unwrap();
    assert_eq!(stored.access_token, "a-1");
    assert_eq!(stored.refresh_token, "r-1");
    assert_eq!(stored.expires_at.unwrap().timestamp(), expires_at);

    // State is single-use
    let response = app
        .router
        .oneshot(get(&format!(
            "/api/providers/strava/oauth/callback?code=auth-code-1&state={}",
            state
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_oauth_callback_unknown_provider_not_found() {
    let app = create_test_app("http://127.0.0.1:9/token", None);
    let strava_state = app.state_manager.create_state("strava");

    let response = app
        .router
        .clone()
        .oneshot(get(
            "/api/providers/withings/oauth/callback?error=access_denied",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .oneshot(get(&format!(
            "/api/providers/withings/oauth/callback?code=abc&state={}",
            strava_state
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Another provider's pending authorization is left alone
    let entry = app.state_manager.validate_and_consume(&strava_state).unwrap();
    assert_eq!(entry.provider, "strava");
}

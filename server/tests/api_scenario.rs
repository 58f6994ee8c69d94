/// End-to-end requests through the router on an in-memory store.
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode};
use server::AppState;
use server::database::MemoryUserStore;
use server::handlers::http::{HttpResponse, Router, build_router};
use shared::config::parse_config;
use shared::types::{TokenResponse, UserProfile};

const CONFIG: &str = r#"
[server]
bind = "127.0.0.1"
port = 0

[storage]
backend = "memory"

[auth]
jwt_secret = "scenario-secret-that-is-long-enough-for-hs256"

[auth.hashing]
memory_kib = 64
iterations = 1
parallelism = 1
"#;

struct Api {
    router: Router,
    state: AppState,
}

impl Api {
    fn new() -> Self {
        let config = parse_config(CONFIG).unwrap();
        let state = AppState::from_config(&config, Arc::new(MemoryUserStore::new())).unwrap();
        Self {
            router: build_router(),
            state,
        }
    }

    async fn send(&self, req: Request<Bytes>) -> (StatusCode, HttpResponse) {
        let res = self.router.route(req, self.state.clone()).await.unwrap();
        (res.status(), res)
    }

    async fn register(&self, body: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/account/register")
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body.to_string()))
            .unwrap();
        let (status, res) = self.send(req).await;
        (status, text(res).await)
    }

    async fn token(&self, form: &str) -> (StatusCode, HttpResponse) {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/token")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::from(form.to_string()))
            .unwrap();
        self.send(req).await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let (status, res) = self.send(builder.body(Bytes::new()).unwrap()).await;
        (status, text(res).await)
    }

    async fn signed_in(&self) -> String {
        let (status, _) = self
            .register(r#"{"username":"alice-99","password":"hunter2","email":"a@b.com"}"#)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, res) = self
            .token("grant_type=password&username=alice-99&password=hunter2")
            .await;
        assert_eq!(status, StatusCode::OK);
        let body: TokenResponse = serde_json::from_str(&text(res).await).unwrap();
        body.access_token
    }
}

async fn text(res: HttpResponse) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn register_sign_in_and_list() {
    let api = Api::new();

    let (status, body) = api
        .register(r#"{"username":"alice-99","password":"hunter2","email":"a@b.com"}"#)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let (status, res) = api
        .token("grant_type=password&username=alice-99&password=hunter2")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res.headers()[CACHE_CONTROL], "must-revalidate");
    let grant: TokenResponse = serde_json::from_str(&text(res).await).unwrap();
    assert_eq!(grant.token_type, "Bearer");

    let (status, body) = api.get("/api/users", Some(&grant.access_token)).await;
    assert_eq!(status, StatusCode::OK);
    let users: Vec<UserProfile> = serde_json::from_str(&body).unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "alice-99");
    assert!(!body.contains("argon2"));

    let (status, body) = api
        .get(&format!("/api/users/{}", users[0].id), Some(&grant.access_token))
        .await;
    assert_eq!(status, StatusCode::OK);
    let one: UserProfile = serde_json::from_str(&body).unwrap();
    assert_eq!(one, users[0]);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let api = Api::new();

    let (status, body) = api.get("/api/users", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Authentication failed");

    let (status, _) = api.get("/api/users/1", Some("not.a.token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_and_invalid_registrations() {
    let api = Api::new();
    let _ = api.signed_in().await;

    let (status, body) = api
        .register(r#"{"username":"alice-99","password":"other","email":"c@d.com"}"#)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Username already exists");

    let (status, body) = api
        .register(r#"{"username":"-alice","password":"pw","email":"a@b.com"}"#)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid username");

    let (status, _) = api.register("not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_grant_rejections() {
    let api = Api::new();
    let _ = api.signed_in().await;

    let (status, res) = api
        .token("grant_type=password&username=alice-99&password=wrong")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(text(res).await, "Invalid credentials");

    let (status, res) = api
        .token("grant_type=password&username=ghost&password=hunter2")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(text(res).await, "Invalid credentials");

    let (status, res) = api.token("grant_type=client_credentials").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        text(res).await,
        "Unsupported grant type 'client_credentials'"
    );
}

#[tokio::test]
async fn listing_edges() {
    let api = Api::new();
    let token = api.signed_in().await;

    let (status, body) = api.get("/api/users?offset=-1", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "offset must be greater than or equal to '0'");

    let (status, _) = api.get("/api/users?offset=5", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = api.get("/api/users/424242", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Non-digit ids never reach the handler.
    let (status, _) = api.get("/api/users/abc", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_paths_and_methods() {
    let api = Api::new();

    let (status, _) = api.get("/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = api.get("/api/token", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

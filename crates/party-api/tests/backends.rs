//! The API against stand-ins for the Facebook Graph and Google Geocoding
//! services, served on local ports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;

use party_api::facebook::{FacebookVerifier, GraphVerifier};
use party_api::geocode::{Geocoder, GoogleGeocoder};
use party_api::{AppStateInner, router};
use party_db::Database;

/// Access token -> Facebook user id. Removing an entry revokes the token.
#[derive(Clone, Default)]
struct FakeFacebook {
    tokens: Arc<Mutex<HashMap<String, String>>>,
}

impl FakeFacebook {
    fn grant(&self, token: &str, fb_user_id: &str) {
        self.tokens.lock().unwrap().insert(token.into(), fb_user_id.into());
    }

    fn revoke(&self, token: &str) {
        self.tokens.lock().unwrap().remove(token);
    }
}

async fn fake_me(State(fb): State<FakeFacebook>, Query(params): Query<HashMap<String, String>>) -> Response {
    let owner = params
        .get("access_token")
        .and_then(|token| fb.tokens.lock().unwrap().get(token).cloned());
    match owner {
        Some(id) => Json(json!({ "id": id, "name": "Graph User" })).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "Error validating access token" } })),
        )
            .into_response(),
    }
}

async fn fake_geocode(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("address").map(String::as_str) {
        Some("629 S Woodlawn Ave") => Json(json!({
            "status": "OK",
            "results": [{
                "formatted_address": "629 South Woodlawn Avenue",
                "geometry": { "location": { "lat": 39.1617, "lng": -86.5264 } }
            }]
        })),
        _ => Json(json!({ "status": "REQUEST_DENIED", "results": [] })),
    }
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn app(fb: FakeFacebook) -> Router {
    let base = serve(
        Router::new()
            .route("/me", get(fake_me))
            .route("/geocode/json", get(fake_geocode))
            .with_state(fb),
    )
    .await;

    let http = reqwest::Client::new();
    router(Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: "test-secret".into(),
        geocoder: Geocoder::Google(GoogleGeocoder::with_endpoint(
            http.clone(),
            "test-key".into(),
            format!("{}/geocode/json", base),
        )),
        facebook: FacebookVerifier::Graph(GraphVerifier::with_base_url(http, base)),
        admin_emails: Vec::new(),
    }))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get_or_create(app: &Router, fb_user_id: &str, token: &str) -> (StatusCode, Value) {
    let req = Request::post("/api/auth/facebook/getorcreate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "user_id": fb_user_id, "access_token": token }).to_string(),
        ))
        .unwrap();
    send(app, req).await
}

fn with_facebook_token(builder: axum::http::request::Builder, token: &str) -> axum::http::request::Builder {
    builder
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header("Passport-Auth-Strategy", "facebook")
}

async fn whoami(app: &Router, token: &str) -> (StatusCode, Value) {
    let req = with_facebook_token(Request::post("/api/auth/test/requireslogin"), token)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

#[tokio::test]
async fn revoked_facebook_token_stops_working() {
    let fb = FakeFacebook::default();
    let app = app(fb.clone()).await;
    fb.grant("token-a", "1001");

    let (status, user) = get_or_create(&app, "1001", "token-a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["name"], "Graph User");

    let (status, me) = whoami(&app, "token-a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["_id"], user["_id"]);

    fb.revoke("token-a");
    let (status, body) = whoami(&app, "token-a").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errorCode"], "UNAUTHORIZED");
}

#[tokio::test]
async fn refreshed_facebook_token_maps_to_same_user() {
    let fb = FakeFacebook::default();
    let app = app(fb.clone()).await;
    fb.grant("token-a", "1001");
    let (_, user) = get_or_create(&app, "1001", "token-a").await;

    fb.revoke("token-a");
    fb.grant("token-b", "1001");
    let (status, me) = whoami(&app, "token-b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["_id"], user["_id"]);

    let (status, _) = whoami(&app, "token-a").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn facebook_token_of_unlinked_user_is_rejected() {
    let fb = FakeFacebook::default();
    let app = app(fb.clone()).await;
    fb.grant("token-c", "3003");

    let (status, body) = whoami(&app, "token-c").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "No account linked to this Facebook user");
}

#[tokio::test]
async fn claimed_facebook_id_must_match_token() {
    let fb = FakeFacebook::default();
    let app = app(fb.clone()).await;
    fb.grant("token-a", "1001");

    let (status, body) = get_or_create(&app, "2002", "token-a").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errorCode"], "UNAUTHORIZED");

    let (status, _) = get_or_create(&app, "1001", "unknown-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn google_geocoding_drives_party_creation() {
    let fb = FakeFacebook::default();
    let app = app(fb.clone()).await;
    fb.grant("token-a", "1001");
    get_or_create(&app, "1001", "token-a").await;

    let post = |address: &str| {
        with_facebook_token(Request::post("/api/parties"), "token-a")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "formattedAddress": address,
                    "startTime": Utc::now().timestamp_millis(),
                    "university": "Indiana University",
                })
                .to_string(),
            ))
            .unwrap()
    };

    let (status, party) = send(&app, post("629 S Woodlawn Ave")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(party["formattedAddress"], "629 South Woodlawn Avenue");
    assert_eq!(party["latitude"], 39.1617);

    let (status, body) = send(&app, post("somewhere the key is refused")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], "UNKNOWN");
}

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

const GRAPH_API_URL: &str = "https://graph.facebook.com";

#[derive(Debug, Clone, Deserialize)]
pub struct FacebookProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum FacebookError {
    #[error("token rejected by Facebook")]
    Rejected,
    #[error("token belongs to a different Facebook user")]
    Mismatch,
    #[error("this verifier cannot resolve a bare token")]
    Unsupported,
    #[error("Facebook unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Checks Facebook access tokens.
pub enum FacebookVerifier {
    /// Ask the Graph API who owns the token.
    Graph(GraphVerifier),
    /// Accept whatever the client claims. Development and tests only.
    Trust,
}

impl FacebookVerifier {
    /// Verify that `access_token` belongs to `claimed_user_id`.
    pub async fn verify(&self, claimed_user_id: &str, access_token: &str) -> Result<FacebookProfile, FacebookError> {
        match self {
            FacebookVerifier::Graph(graph) => {
                let profile = graph.me(access_token).await?;
                if profile.id != claimed_user_id {
                    warn!("Facebook token for {} presented as {}", profile.id, claimed_user_id);
                    return Err(FacebookError::Mismatch);
                }
                Ok(profile)
            }
            FacebookVerifier::Trust => Ok(FacebookProfile {
                id: claimed_user_id.to_string(),
                name: None,
                email: None,
            }),
        }
    }

    /// Find out which Facebook user owns `access_token`.
    pub async fn resolve(&self, access_token: &str) -> Result<FacebookProfile, FacebookError> {
        match self {
            FacebookVerifier::Graph(graph) => graph.me(access_token).await,
            FacebookVerifier::Trust => Err(FacebookError::Unsupported),
        }
    }
}

pub struct GraphVerifier {
    http: reqwest::Client,
    base_url: String,
}

impl GraphVerifier {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, GRAPH_API_URL.to_string())
    }

    pub fn with_base_url(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    async fn me(&self, access_token: &str) -> Result<FacebookProfile, FacebookError> {
        let resp = self
            .http
            .get(format!("{}/me", self.base_url.trim_end_matches('/')))
            .query(&[("fields", "id,name,email"), ("access_token", access_token)])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(FacebookError::Rejected);
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn fake_me(Query(params): Query<HashMap<String, String>>) -> Response {
        match params.get("access_token").map(String::as_str) {
            Some("token-1001") => Json(json!({ "id": "1001", "name": "Graph User" })).into_response(),
            _ => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "message": "Invalid OAuth access token." } })),
            )
                .into_response(),
        }
    }

    async fn graph() -> FacebookVerifier {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/me", get(fake_me));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FacebookVerifier::Graph(GraphVerifier::with_base_url(
            reqwest::Client::new(),
            format!("http://{}/", addr),
        ))
    }

    #[tokio::test]
    async fn graph_confirms_claimed_user() {
        let verifier = graph().await;
        let profile = verifier.verify("1001", "token-1001").await.unwrap();
        assert_eq!(profile.id, "1001");
        assert_eq!(profile.name.as_deref(), Some("Graph User"));
        assert_eq!(profile.email, None);
    }

    #[tokio::test]
    async fn graph_rejects_token_of_another_user() {
        let verifier = graph().await;
        assert!(matches!(verifier.verify("2002", "token-1001").await, Err(FacebookError::Mismatch)));
    }

    #[tokio::test]
    async fn graph_rejects_unknown_token() {
        let verifier = graph().await;
        assert!(matches!(verifier.verify("1001", "revoked").await, Err(FacebookError::Rejected)));
        assert!(matches!(verifier.resolve("revoked").await, Err(FacebookError::Rejected)));
        assert_eq!(verifier.resolve("token-1001").await.unwrap().id, "1001");
    }

    #[tokio::test]
    async fn trust_cannot_resolve_tokens() {
        let verifier = FacebookVerifier::Trust;
        assert_eq!(verifier.verify("42", "anything").await.unwrap().id, "42");
        assert!(matches!(verifier.resolve("anything").await, Err(FacebookError::Unsupported)));
    }
}

//! HTTP client for the identity service.

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{debug, warn};

use crate::contract::{Identity, IdentityProvider};
use crate::error::{AgentError, AgentResult};
use crate::http_client::{Endpoint, JsonClient};

/// Validates bearer tokens with `GET {base}/api/auth/validate`.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: JsonClient,
    endpoint: Endpoint,
}

impl HttpIdentityProvider {
    pub fn new(base_url: &str, timeout: Duration) -> AgentResult<Self> {
        Ok(Self {
            client: JsonClient::new(timeout),
            endpoint: Endpoint::parse(base_url)?,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn validate_token(&self, token: &str) -> AgentResult<Identity> {
        let path = self.endpoint.path("/api/auth/validate");
        let response = match self
            .client
            .get(&self.endpoint.authority, &path, Some(token))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "identity service call failed");
                return Err(AgentError::IdentityUnavailable(e.to_string()));
            }
        };

        match response.status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AgentError::InvalidToken),
            status if status.is_success() => {
                let identity: Identity = response
                    .json()
                    .map_err(|e| AgentError::IdentityUnavailable(e.to_string()))?;
                debug!(user_id = %identity.user_id, "token validated");
                Ok(identity)
            }
            status => Err(AgentError::IdentityUnavailable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                response.text()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use serde_json::json;

    use super::*;

    async fn validate(headers: HeaderMap) -> axum::response::Response {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer good") => {
                axum::Json(json!({"id": "u1", "roles": ["SERVICE_ACCOUNT"]})).into_response()
            }
            Some("Bearer broken") => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            _ => StatusCode::UNAUTHORIZED.into_response(),
        }
    }

    #[tokio::test]
    async fn distinguishes_rejection_from_outage() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let router = Router::new().route("/api/auth/validate", get(validate));
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let identity = HttpIdentityProvider::new(&base, Duration::from_secs(2)).unwrap();

        let user = identity.validate_token("good").await.unwrap();
        assert_eq!(user.user_id, "u1");
        assert!(user.is_service_account());

        assert!(matches!(
            identity.validate_token("bad").await,
            Err(AgentError::InvalidToken)
        ));
        assert!(matches!(
            identity.validate_token("broken").await,
            Err(AgentError::IdentityUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let identity = HttpIdentityProvider::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            identity.validate_token("any").await,
            Err(AgentError::IdentityUnavailable(_))
        ));
    }
}
